//! Network deployment CRUD. Not offered to the model; reached through the
//! HTTP API only.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{ReportingClient, ReportingError};

const NETWORKS: &str = "/deployments/v2/networks";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewNetwork {
    pub name: String,
    pub ip_address: String,
    pub prefix_length: u8,
    pub is_dynamic: bool,
    pub status: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix_length: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_dynamic: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl ReportingClient {
    pub async fn list_network_deployments(&self) -> Result<Value, ReportingError> {
        self.get(NETWORKS, &[]).await
    }

    pub async fn create_network_deployment(&self, network: &NewNetwork) -> Result<Value, ReportingError> {
        let url = self.url(NETWORKS);
        self.send_authorized(|token| self.http.post(&url).json(network).bearer_auth(token)).await
    }

    pub async fn update_network_deployment(&self, id: &str, update: &NetworkUpdate) -> Result<Value, ReportingError> {
        let url = self.url(&format!("{NETWORKS}/{id}"));
        self.send_authorized(|token| self.http.put(&url).json(update).bearer_auth(token)).await
    }

    pub async fn get_network_deployment(&self, id: &str) -> Result<Value, ReportingError> {
        self.get(&format!("{NETWORKS}/{id}"), &[]).await
    }

    pub async fn delete_network_deployment(&self, id: &str) -> Result<Value, ReportingError> {
        let url = self.url(&format!("{NETWORKS}/{id}"));
        self.send_authorized(|token| self.http.delete(&url).bearer_auth(token)).await
    }
}
