use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::config::TranscriptionConfig;

#[async_trait]
pub trait SpeechToText: Send + Sync {
    async fn transcribe(&self, audio: Vec<u8>) -> anyhow::Result<String>;
}

/// AssemblyAI-style client: upload, create a transcript, poll until done.
#[derive(Clone)]
pub struct AssemblyAi {
    http: reqwest::Client,
    config: TranscriptionConfig,
}

impl AssemblyAi {
    pub fn new(config: TranscriptionConfig) -> Self {
        Self { http: reqwest::Client::new(), config }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn authorized(&self, rb: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.api_key {
            Some(key) => rb.header(reqwest::header::AUTHORIZATION, key),
            None => rb,
        }
    }

    async fn poll(&self, id: &str) -> anyhow::Result<String> {
        loop {
            let resp = self.authorized(self.http.get(self.url(&format!("/transcript/{id}")))).send().await?;
            let transcript: Transcript = checked(resp).await?.json().await?;
            match transcript.status.as_str() {
                "completed" => return Ok(transcript.text.unwrap_or_default()),
                "error" => anyhow::bail!(
                    "transcription failed: {}",
                    transcript.error.unwrap_or_else(|| "unknown error".into())
                ),
                status => {
                    debug!(%id, status, "transcript pending");
                    tokio::time::sleep(self.config.poll_interval).await;
                }
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    upload_url: String,
}

#[derive(Debug, Deserialize)]
struct Transcript {
    id: String,
    status: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

async fn checked(resp: reqwest::Response) -> anyhow::Result<reqwest::Response> {
    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        anyhow::bail!("transcription service returned {}: {}", status, body);
    }
    Ok(resp)
}

#[async_trait]
impl SpeechToText for AssemblyAi {
    async fn transcribe(&self, audio: Vec<u8>) -> anyhow::Result<String> {
        let bytes = audio.len();
        let resp = self.authorized(self.http.post(self.url("/upload")).body(audio)).send().await?;
        let upload: UploadResponse = checked(resp).await?.json().await?;

        let custom_spelling: Vec<_> = self
            .config
            .custom_spelling
            .iter()
            .map(|(from, to)| json!({ "from": from, "to": to }))
            .collect();
        let body = json!({
            "audio_url": upload.upload_url,
            "word_boost": self.config.word_boost,
            "custom_spelling": custom_spelling,
        });
        let resp = self.authorized(self.http.post(self.url("/transcript")).json(&body)).send().await?;
        let created: Transcript = checked(resp).await?.json().await?;
        debug!(id = %created.id, bytes, "transcript requested");

        let timeout: Duration = self.config.timeout;
        tokio::time::timeout(timeout, self.poll(&created.id))
            .await
            .map_err(|_| anyhow::anyhow!("transcription timed out after {}s", timeout.as_secs()))?
    }
}

/// Returns the same text for any audio.
#[cfg(test)]
pub struct FixedTranscript(pub String);

#[cfg(test)]
#[async_trait]
impl SpeechToText for FixedTranscript {
    async fn transcribe(&self, _audio: Vec<u8>) -> anyhow::Result<String> {
        Ok(self.0.clone())
    }
}
