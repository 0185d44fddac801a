use serde::Serialize;
use serde_json::Value;

use super::params::IdentitySearch;
use super::{DataEnvelope, Rejection, Reply, ReportingClient, ReportingError};

const IDENTITIES: &str = "/reports/v2/identities";

/// The only identity fields ever handed back to the model.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ResolvedIdentity {
    pub id: Value,
    pub label: Value,
}

impl ReportingClient {
    /// Resolves a name or email to exactly one identity.
    pub async fn resolve_identity(&self, params: IdentitySearch) -> Result<Reply<ResolvedIdentity>, ReportingError> {
        let Some(term) = params.search else {
            return Ok(Rejection::new("No name or email provided. Ask the user who to search for").into());
        };
        let query = [
            ("search", format!("*%{}%*", term.to_lowercase())),
            ("limit", "10".to_string()),
            ("offset", "0".to_string()),
            ("from", "0".to_string()),
            ("to", "0".to_string()),
        ];
        let envelope: DataEnvelope<Value> = self.get(IDENTITIES, &query).await?;
        let mut matches = envelope.data;
        match matches.len() {
            0 => Ok(Rejection::new("No identity found. Check name or email with the user").into()),
            1 => {
                let only = matches.remove(0);
                Ok(Reply::Data(ResolvedIdentity {
                    id: only.get("id").cloned().unwrap_or(Value::Null),
                    label: only.get("label").cloned().unwrap_or(Value::Null),
                }))
            }
            _ => Ok(Rejection::with_candidates(
                "Multiple identities found. Please ask the user to select one of these",
                matches,
            )
            .into()),
        }
    }
}
