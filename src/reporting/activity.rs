use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::params::{ActivitySearch, InfectedLookupQuery, parse_identity_ids, require_range};
use super::{DataEnvelope, Reply, ReportingClient, ReportingError, categories};

const DNS_ACTIVITY: &str = "/reports/v2/activity/dns";
const PAGE_LIMIT: &str = "50";

/// Raw DNS activity row. Only the fields we surface are decoded.
#[derive(Debug, Deserialize)]
struct RemoteActivity {
    #[serde(default)]
    domain: Option<String>,
    #[serde(default)]
    verdict: Option<String>,
    #[serde(default)]
    identities: Vec<Value>,
    #[serde(default)]
    externalip: Option<String>,
    #[serde(default)]
    blockedapplications: Vec<Value>,
    #[serde(default)]
    threats: Vec<Value>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ActivitySummary {
    pub domain: Option<String>,
    pub verdict: Option<String>,
    pub identities: Vec<Value>,
    #[serde(rename = "externalIp")]
    pub external_ip: Option<String>,
    pub blockedapplications: Vec<Value>,
    pub threats: Vec<Value>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct InfectedLookup {
    pub blockedapplications: Vec<Value>,
    pub identities: Vec<Value>,
    pub domain: Option<String>,
}

impl ReportingClient {
    pub async fn search_activities(&self, params: ActivitySearch) -> Result<Reply<Vec<ActivitySummary>>, ReportingError> {
        let identity_ids = match parse_identity_ids(params.identity_ids.as_deref()) {
            Ok(ids) => ids,
            Err(rejection) => return Ok(rejection.into()),
        };
        let codes = match params.category.as_deref().map(categories::resolve_codes).transpose() {
            Ok(codes) => codes,
            Err(rejection) => return Ok(rejection.into()),
        };
        let (from, to) = match require_range(params.start_date.as_deref(), params.end_date.as_deref()) {
            Ok(range) => range,
            Err(rejection) => return Ok(rejection.into()),
        };

        let mut query = vec![
            ("order", "desc".to_string()),
            ("from", from.to_string()),
            ("to", to.to_string()),
            ("limit", PAGE_LIMIT.to_string()),
        ];
        if let Some(domain) = params.domain {
            query.push(("domain", domain));
        }
        if let Some(codes) = codes {
            query.push(("categories", codes.iter().map(u32::to_string).collect::<Vec<_>>().join(",")));
        }
        if let Some(verdict) = params.verdict {
            query.push(("verdict", verdict.to_lowercase()));
        }
        if let Some(ids) = identity_ids {
            query.push(("identityids", ids));
        }

        let envelope: DataEnvelope<RemoteActivity> = self.get(DNS_ACTIVITY, &query).await?;
        debug!(rows = envelope.data.len(), "activity search returned");
        Ok(Reply::Data(
            envelope
                .data
                .into_iter()
                .map(|a| ActivitySummary {
                    domain: a.domain,
                    verdict: a.verdict,
                    identities: a.identities,
                    external_ip: a.externalip,
                    blockedapplications: a.blockedapplications,
                    threats: a.threats,
                })
                .collect(),
        ))
    }

    /// Blocked lookups only; the verdict filter is fixed server-side.
    pub async fn list_infected_lookups(&self, params: InfectedLookupQuery) -> Result<Reply<Vec<InfectedLookup>>, ReportingError> {
        let (from, to) = match require_range(params.start_date.as_deref(), params.end_date.as_deref()) {
            Ok(range) => range,
            Err(rejection) => return Ok(rejection.into()),
        };
        let identity_ids = match parse_identity_ids(params.identity_ids.as_deref()) {
            Ok(ids) => ids,
            Err(rejection) => return Ok(rejection.into()),
        };

        let mut query = vec![
            ("from", from.to_string()),
            ("to", to.to_string()),
            ("limit", PAGE_LIMIT.to_string()),
            ("verdict", "blocked".to_string()),
            ("order", "desc".to_string()),
        ];
        if let Some(ids) = identity_ids {
            query.push(("identityids", ids));
        }

        let envelope: DataEnvelope<RemoteActivity> = self.get(DNS_ACTIVITY, &query).await?;
        Ok(Reply::Data(
            envelope
                .data
                .into_iter()
                .map(|a| InfectedLookup {
                    blockedapplications: a.blockedapplications,
                    identities: a.identities,
                    domain: a.domain,
                })
                .collect(),
        ))
    }
}
