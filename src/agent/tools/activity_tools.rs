use async_trait::async_trait;
use serde_json::{Map, Value};

use super::{END_DATE, IDENTITY_IDS, ParamKind, ParamSpec, START_DATE, Tool, ToolContext, ToolDescriptor, ToolError, decode_args};
use crate::reporting::params::{ActivitySearch, InfectedLookupQuery};

static ACTIVITY_SEARCH: ToolDescriptor = ToolDescriptor {
    name: "lookupActivitiesSearch",
    description: "Search DNS lookup activity in a date range. Each activity names the user and the domain they looked up, the verdict, and any threats",
    parameters: &[
        IDENTITY_IDS,
        START_DATE,
        END_DATE,
        ParamSpec {
            name: "domain",
            kind: ParamKind::Str,
            description: "Comma separated domains to search for. Each must end in a valid TLD; append .com when none was given",
            required: false,
        },
        ParamSpec {
            name: "category",
            kind: ParamKind::Str,
            description: "Comma separated activity categories to search for",
            required: false,
        },
        ParamSpec {
            name: "verdict",
            kind: ParamKind::Str,
            description: "Whether the lookup was allowed or blocked",
            required: false,
        },
    ],
};

static INFECTED_LOOKUPS: ToolDescriptor = ToolDescriptor {
    name: "listInfectedLookups",
    description: "List blocked lookups of infected domains. Each entry names the user and the infected site they tried to visit",
    parameters: &[IDENTITY_IDS, START_DATE, END_DATE],
};

pub struct ActivitySearchTool;

#[async_trait]
impl Tool for ActivitySearchTool {
    fn descriptor(&self) -> &'static ToolDescriptor { &ACTIVITY_SEARCH }

    async fn run(&self, ctx: ToolContext<'_>, args: Map<String, Value>) -> Result<Vec<Value>, ToolError> {
        let params: ActivitySearch = decode_args(args)?;
        let reply = ctx.reporting.search_activities(params).await?;
        reply.into_outputs().map_err(ToolError::Encode)
    }
}

pub struct InfectedLookupsTool;

#[async_trait]
impl Tool for InfectedLookupsTool {
    fn descriptor(&self) -> &'static ToolDescriptor { &INFECTED_LOOKUPS }

    async fn run(&self, ctx: ToolContext<'_>, args: Map<String, Value>) -> Result<Vec<Value>, ToolError> {
        let params: InfectedLookupQuery = decode_args(args)?;
        let reply = ctx.reporting.list_infected_lookups(params).await?;
        reply.into_outputs().map_err(ToolError::Encode)
    }
}
