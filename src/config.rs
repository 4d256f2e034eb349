use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::{
    error::{FlowError, FlowErrorLocation, Result},
    model::EdgeStyle,
};

pub const DEFAULT_START_STEP_ID: &str = "flow-start";
pub const DEFAULT_END_STEP_ID: &str = "user-onboard";
/// Shortest random id suffix accepted from a config file.
pub const MIN_ID_SUFFIX_LENGTH: usize = 4;

/// Keys looked up inside an `action` descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ActionKeys {
    /// Candidate success-reference keys, first string value wins.
    pub next: Vec<String>,
    pub failure: String,
}

impl Default for ActionKeys {
    fn default() -> Self {
        ActionKeys {
            next: vec!["onSuccess".to_string(), "next".to_string()],
            failure: "onFailure".to_string(),
        }
    }
}

impl ActionKeys {
    /// First non-empty success reference in `action`, if any.
    pub fn next_ref<'a>(&self, action: &'a serde_json::Value) -> Option<&'a str> {
        self.next
            .iter()
            .filter_map(|key| action.get(key).and_then(serde_json::Value::as_str))
            .find(|s| !s.trim().is_empty())
    }

    pub fn failure_ref<'a>(&self, action: &'a serde_json::Value) -> Option<&'a str> {
        action
            .get(&self.failure)
            .and_then(serde_json::Value::as_str)
            .filter(|s| !s.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ComposerConfig {
    pub start_step_id: String,
    pub end_step_id: String,
    pub start_step_type: String,
    pub end_step_type: String,
    pub view_step_type: String,
    pub action_keys: ActionKeys,
    pub action_element_types: Vec<String>,
    pub id_placeholder: String,
    pub fallback_id_prefix: String,
    pub id_suffix_length: usize,
    pub default_template: String,
    pub edge_style: EdgeStyle,
}

impl Default for ComposerConfig {
    fn default() -> Self {
        ComposerConfig {
            start_step_id: DEFAULT_START_STEP_ID.to_string(),
            end_step_id: DEFAULT_END_STEP_ID.to_string(),
            start_step_type: "START".to_string(),
            end_step_type: "END".to_string(),
            view_step_type: "VIEW".to_string(),
            action_keys: ActionKeys::default(),
            action_element_types: vec![
                "ACTION".to_string(),
                "BUTTON".to_string(),
                "RESEND_BUTTON".to_string(),
            ],
            id_placeholder: "ID".to_string(),
            fallback_id_prefix: "resource".to_string(),
            id_suffix_length: 7,
            default_template: "BASIC".to_string(),
            edge_style: EdgeStyle::default(),
        }
    }
}

impl ComposerConfig {
    /// Load a config file, accepting JSON by default and TOML when the `toml` feature is enabled.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let location = || FlowErrorLocation::at_path(path.display().to_string());
        let txt = fs::read_to_string(path).map_err(|e| FlowError::Io {
            message: format!("unable to read config: {e}"),
            location: location().with_source_path(Some(path)),
        })?;

        #[cfg(feature = "toml")]
        {
            if path.extension().and_then(|e| e.to_str()) == Some("toml") {
                let config: Self = toml::from_str(&txt).map_err(|e| FlowError::Config {
                    message: e.to_string(),
                    location: location().with_source_path(Some(path)),
                })?;
                return config.validated(path);
            }
        }

        let config: Self = serde_json::from_str(&txt).map_err(|e| FlowError::Config {
            message: e.to_string(),
            location: FlowErrorLocation::at_path_with_position(
                path.display().to_string(),
                Some(e.line()),
                Some(e.column()),
            )
            .with_source_path(Some(path)),
        })?;
        config.validated(path)
    }

    fn validated(self, path: &Path) -> Result<Self> {
        let bad = |message: &str| FlowError::Config {
            message: message.to_string(),
            location: FlowErrorLocation::at_path(path.display().to_string())
                .with_source_path(Some(path)),
        };
        if self.start_step_id.trim().is_empty() || self.end_step_id.trim().is_empty() {
            return Err(bad("startStepId and endStepId must not be empty"));
        }
        if self.start_step_id == self.end_step_id {
            return Err(bad("startStepId and endStepId must differ"));
        }
        if self.action_keys.next.is_empty() {
            return Err(bad("actionKeys.next needs at least one key"));
        }
        if self.id_suffix_length < MIN_ID_SUFFIX_LENGTH {
            return Err(bad(&format!(
                "idSuffixLength must be at least {MIN_ID_SUFFIX_LENGTH}"
            )));
        }
        if self.id_placeholder.trim().is_empty() {
            return Err(bad("idPlaceholder must not be empty"));
        }
        Ok(self)
    }

    /// Whether an element type counts as an action trigger (case-insensitive).
    pub fn is_action_element(&self, element_type: &str) -> bool {
        self.action_element_types
            .iter()
            .any(|t| t.eq_ignore_ascii_case(element_type))
    }

    /// Whether a reference is the symbolic End type rather than a concrete id.
    pub fn is_end_symbol(&self, reference: &str) -> bool {
        reference.eq_ignore_ascii_case(&self.end_step_type)
    }
}
