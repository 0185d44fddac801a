use serde_json::{Value, json};

use super::params::DestinationListRequest;
use super::{Rejection, Reply, ReportingClient, ReportingError};

const DESTINATION_LISTS: &str = "/policies/v2/destinationlists";

impl ReportingClient {
    /// Creates a single-domain destination list. Blocks unless told otherwise.
    pub async fn create_destination_list(&self, params: DestinationListRequest) -> Result<Reply<Value>, ReportingError> {
        let Some(domain) = params.domain else {
            return Ok(Rejection::new("No domain provided. Ask the user which domain to add").into());
        };
        let access = params.access.unwrap_or_else(|| "block".into()).to_lowercase();
        if access != "allow" && access != "block" {
            return Ok(Rejection::new(format!("Invalid access '{access}'. Use either allow or block")).into());
        }
        let name = params.name.unwrap_or_else(|| format!("{access} {domain}"));
        let body = json!({
            "access": access,
            "isGlobal": false,
            "name": name,
            "destinations": [{ "destination": domain, "type": "domain" }],
        });

        let url = self.url(DESTINATION_LISTS);
        let created: Value = self.send_authorized(|token| self.http.post(&url).json(&body).bearer_auth(token)).await?;
        Ok(Reply::Data(created))
    }
}
