use async_trait::async_trait;
use serde_json::{Map, Value};

use super::{ParamKind, ParamSpec, Tool, ToolContext, ToolDescriptor, ToolError, decode_args};
use crate::reporting::params::DestinationListRequest;

static CREATE_DESTINATION_LIST: ToolDescriptor = ToolDescriptor {
    name: "createDestinationList",
    description: "Create a destination list that allows or blocks a domain",
    parameters: &[
        ParamSpec {
            name: "domain",
            kind: ParamKind::Str,
            description: "The domain to put on the list",
            required: true,
        },
        ParamSpec {
            name: "access",
            kind: ParamKind::Str,
            description: "allow or block; defaults to block",
            required: false,
        },
        ParamSpec {
            name: "name",
            kind: ParamKind::Str,
            description: "Name for the new list",
            required: false,
        },
    ],
};

pub struct CreateDestinationListTool;

#[async_trait]
impl Tool for CreateDestinationListTool {
    fn descriptor(&self) -> &'static ToolDescriptor { &CREATE_DESTINATION_LIST }

    async fn run(&self, ctx: ToolContext<'_>, args: Map<String, Value>) -> Result<Vec<Value>, ToolError> {
        let params: DestinationListRequest = decode_args(args)?;
        let reply = ctx.reporting.create_destination_list(params).await?;
        reply.into_outputs().map_err(ToolError::Encode)
    }
}
