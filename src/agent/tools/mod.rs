use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::reporting::{ReportingClient, ReportingError};

pub mod activity_tools;
pub mod destination_tools;
pub mod identity_tools;
pub mod threat_tools;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum ParamKind {
    Str,
}

impl ParamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamKind::Str => "str",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub description: &'static str,
    pub required: bool,
}

/// What the model is told about a tool. Defined statically, never mutated.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: &'static [ParamSpec],
}

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    #[error("invalid arguments: {0}")]
    InvalidArguments(serde_json::Error),
    #[error(transparent)]
    Reporting(#[from] ReportingError),
    #[error("could not encode tool output: {0}")]
    Encode(serde_json::Error),
}

#[derive(Clone, Copy)]
pub struct ToolContext<'a> {
    pub reporting: &'a ReportingClient,
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn descriptor(&self) -> &'static ToolDescriptor;

    fn name(&self) -> &'static str {
        self.descriptor().name
    }

    /// Returns the output records fed back to the model.
    async fn run(&self, ctx: ToolContext<'_>, args: Map<String, Value>) -> Result<Vec<Value>, ToolError>;
}

pub(crate) fn decode_args<T: DeserializeOwned>(args: Map<String, Value>) -> Result<T, ToolError> {
    serde_json::from_value(Value::Object(args)).map_err(ToolError::InvalidArguments)
}

pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self { Self { tools: Vec::new() } }

    /// Every reporting query the model may call, in manifest order.
    pub fn with_default_tools() -> Self {
        let mut r = Self::new();
        r.register(Box::new(activity_tools::ActivitySearchTool));
        r.register(Box::new(activity_tools::InfectedLookupsTool));
        r.register(Box::new(destination_tools::CreateDestinationListTool));
        r.register(Box::new(threat_tools::TopThreatTypesTool));
        r.register(Box::new(identity_tools::IdentityLookupTool));
        r.register(Box::new(threat_tools::TopThreatsTool));
        r
    }

    pub fn register(&mut self, t: Box<dyn Tool>) { self.tools.push(t); }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.iter().map(|b| b.as_ref()).find(|t| t.name() == name)
    }

    pub fn descriptors(&self) -> Vec<&'static ToolDescriptor> {
        self.tools.iter().map(|t| t.descriptor()).collect()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self { Self::with_default_tools() }
}

pub(crate) const START_DATE: ParamSpec = ParamSpec {
    name: "startDate",
    kind: ParamKind::Str,
    description: "ISO-8601 date or timestamp where the reporting window starts",
    required: true,
};

pub(crate) const END_DATE: ParamSpec = ParamSpec {
    name: "endDate",
    kind: ParamKind::Str,
    description: "ISO-8601 date or timestamp where the reporting window ends",
    required: true,
};

pub(crate) const IDENTITY_IDS: ParamSpec = ParamSpec {
    name: "identityIds",
    kind: ParamKind::Str,
    description: "Comma separated identity ids of the users to filter on. Names and emails are not ids; resolve them with the identity lookup first",
    required: false,
};

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn default_registry_names_are_unique_and_resolvable() {
        let registry = ToolRegistry::with_default_tools();
        let names: Vec<_> = registry.descriptors().iter().map(|d| d.name).collect();
        assert_eq!(
            names,
            vec![
                "lookupActivitiesSearch",
                "listInfectedLookups",
                "createDestinationList",
                "getTopThreatTypes",
                "getIdentityId",
                "getTopThreats",
            ]
        );
        assert_eq!(names.iter().collect::<HashSet<_>>().len(), names.len());
        for name in names {
            assert_eq!(registry.get(name).map(|t| t.name()), Some(name));
        }
        assert!(registry.get("listNetworkDeployments").is_none());
    }

    #[test]
    fn date_parameters_are_required_everywhere() {
        let registry = ToolRegistry::with_default_tools();
        for d in registry.descriptors() {
            for p in d.parameters.iter().filter(|p| p.name == "startDate" || p.name == "endDate") {
                assert!(p.required, "{}.{} should be required", d.name, p.name);
            }
        }
    }
}
