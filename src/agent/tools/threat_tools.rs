use async_trait::async_trait;
use serde_json::{Map, Value};

use super::{END_DATE, START_DATE, Tool, ToolContext, ToolDescriptor, ToolError, decode_args};
use crate::reporting::params::DateRange;

static TOP_THREATS: ToolDescriptor = ToolDescriptor {
    name: "getTopThreats",
    description: "Rank the threats seen most often in a date range",
    parameters: &[START_DATE, END_DATE],
};

static TOP_THREAT_TYPES: ToolDescriptor = ToolDescriptor {
    name: "getTopThreatTypes",
    description: "Rank the threat types seen most often in a date range",
    parameters: &[START_DATE, END_DATE],
};

pub struct TopThreatsTool;

#[async_trait]
impl Tool for TopThreatsTool {
    fn descriptor(&self) -> &'static ToolDescriptor { &TOP_THREATS }

    async fn run(&self, ctx: ToolContext<'_>, args: Map<String, Value>) -> Result<Vec<Value>, ToolError> {
        let range: DateRange = decode_args(args)?;
        let reply = ctx.reporting.get_top_threats(range).await?;
        reply.into_outputs().map_err(ToolError::Encode)
    }
}

pub struct TopThreatTypesTool;

#[async_trait]
impl Tool for TopThreatTypesTool {
    fn descriptor(&self) -> &'static ToolDescriptor { &TOP_THREAT_TYPES }

    async fn run(&self, ctx: ToolContext<'_>, args: Map<String, Value>) -> Result<Vec<Value>, ToolError> {
        let range: DateRange = decode_args(args)?;
        let reply = ctx.reporting.get_top_threat_types(range).await?;
        reply.into_outputs().map_err(ToolError::Encode)
    }
}
