use serde_json::Value;

use super::params::{DateRange, require_range};
use super::{DataEnvelope, NO_DATA_MESSAGE, Reply, ReportingClient, ReportingError};

const TOP_THREATS: &str = "/reports/v2/top-threats";
const TOP_THREAT_TYPES: &str = "/reports/v2/top-threat-types";

impl ReportingClient {
    pub async fn get_top_threats(&self, range: DateRange) -> Result<Reply<Vec<Value>>, ReportingError> {
        self.ranking(TOP_THREATS, range).await
    }

    pub async fn get_top_threat_types(&self, range: DateRange) -> Result<Reply<Vec<Value>>, ReportingError> {
        self.ranking(TOP_THREAT_TYPES, range).await
    }

    /// Ranking rows are passed through untouched.
    async fn ranking(&self, path: &str, range: DateRange) -> Result<Reply<Vec<Value>>, ReportingError> {
        let (from, to) = match require_range(range.start_date.as_deref(), range.end_date.as_deref()) {
            Ok(range) => range,
            Err(rejection) => return Ok(rejection.into()),
        };
        let query = [("from", from.to_string()), ("to", to.to_string()), ("limit", "50".to_string())];
        let envelope: DataEnvelope<Value> = self.get(path, &query).await?;
        if envelope.data.is_empty() {
            return Ok(Reply::Empty(NO_DATA_MESSAGE.to_string()));
        }
        Ok(Reply::Data(envelope.data))
    }
}
