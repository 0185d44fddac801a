use serde::{Deserialize, Serialize};

use crate::config::AppConfig;

/// Sampling temperature for every model call. Tool selection and phrasing
/// must not drift between identical inputs.
pub const MODEL_TEMPERATURE: f32 = 0.0;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ConversationSettings {
    pub model: Option<String>,
    pub max_tool_rounds: Option<u32>,
    pub default_window_days: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ConversationSettingsPatch {
    pub model: Option<String>,
    pub max_tool_rounds: Option<u32>,
    pub default_window_days: Option<u32>,
}

impl ConversationSettings {
    pub fn apply_patch(&mut self, patch: ConversationSettingsPatch) {
        if let Some(model) = patch.model {
            self.model = Some(model);
        }
        if let Some(rounds) = patch.max_tool_rounds {
            self.max_tool_rounds = Some(rounds);
        }
        if let Some(days) = patch.default_window_days {
            self.default_window_days = Some(days);
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GlobalDefaults {
    pub model: String,
    pub max_tool_rounds: Option<u32>,
    pub default_window_days: u32,
}

impl GlobalDefaults {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            model: config.chat_model.model.clone(),
            max_tool_rounds: config.max_tool_rounds,
            default_window_days: config.default_window_days,
        }
    }
}

impl Default for GlobalDefaults {
    fn default() -> Self {
        Self { model: "command-r-plus".into(), max_tool_rounds: Some(10), default_window_days: 30 }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EffectiveSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tool_rounds: Option<u32>,
    pub default_window_days: u32,
}

pub fn resolve_effective_settings(global: &GlobalDefaults, conversation: &ConversationSettings) -> EffectiveSettings {
    let model = conversation.model.clone().unwrap_or_else(|| global.model.clone());

    // zero on a conversation lifts the cap, same as MAX_TOOL_ROUNDS=0 globally
    let max_tool_rounds = match conversation.max_tool_rounds {
        Some(0) => None,
        Some(n) => Some(n),
        None => global.max_tool_rounds,
    };

    EffectiveSettings {
        model,
        temperature: MODEL_TEMPERATURE,
        max_tool_rounds,
        default_window_days: conversation.default_window_days.unwrap_or(global.default_window_days),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precedence_conversation_over_global() {
        let global = GlobalDefaults {
            model: "global-model".into(),
            max_tool_rounds: Some(10),
            default_window_days: 30,
        };
        let conversation = ConversationSettings {
            model: Some("conversation-model".into()),
            max_tool_rounds: None,
            default_window_days: Some(7),
        };

        let eff = resolve_effective_settings(&global, &conversation);

        assert_eq!(eff.model, "conversation-model");
        assert_eq!(eff.max_tool_rounds, Some(10)); // from global
        assert_eq!(eff.default_window_days, 7);
        assert_eq!(eff.temperature, 0.0);
    }

    #[test]
    fn zero_rounds_means_unbounded() {
        let conversation = ConversationSettings { max_tool_rounds: Some(0), ..Default::default() };
        let eff = resolve_effective_settings(&GlobalDefaults::default(), &conversation);
        assert_eq!(eff.max_tool_rounds, None);
    }

    #[test]
    fn patch_only_touches_present_fields() {
        let mut settings = ConversationSettings {
            model: Some("a".into()),
            max_tool_rounds: Some(3),
            default_window_days: None,
        };
        settings.apply_patch(ConversationSettingsPatch {
            default_window_days: Some(14),
            ..Default::default()
        });
        assert_eq!(settings.model.as_deref(), Some("a"));
        assert_eq!(settings.max_tool_rounds, Some(3));
        assert_eq!(settings.default_window_days, Some(14));
    }
}
