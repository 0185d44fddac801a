use async_trait::async_trait;
use serde_json::{Map, Value};

use super::{ParamKind, ParamSpec, Tool, ToolContext, ToolDescriptor, ToolError, decode_args};
use crate::reporting::params::IdentitySearch;

static IDENTITY_LOOKUP: ToolDescriptor = ToolDescriptor {
    name: "getIdentityId",
    description: "Find the identity id of a user from their name or email",
    parameters: &[ParamSpec {
        name: "search",
        kind: ParamKind::Str,
        description: "Name or email of the user to look up",
        required: true,
    }],
};

pub struct IdentityLookupTool;

#[async_trait]
impl Tool for IdentityLookupTool {
    fn descriptor(&self) -> &'static ToolDescriptor { &IDENTITY_LOOKUP }

    async fn run(&self, ctx: ToolContext<'_>, args: Map<String, Value>) -> Result<Vec<Value>, ToolError> {
        let params: IdentitySearch = decode_args(args)?;
        let reply = ctx.reporting.resolve_identity(params).await?;
        reply.into_outputs().map_err(ToolError::Encode)
    }
}
