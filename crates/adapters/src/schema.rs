//! Declarative config schemas with field-level validation.
//!
//! Each adapter ships a [`ConfigSchema`]: an ordered list of field specs with
//! type constraints, defaults, UI hints, and optional environment-variable
//! mappings. Validation merges caller-supplied values over the defaults
//! (shallow — a caller value replaces a default wholesale, never deep-merges)
//! and then checks every known field, collecting all issues instead of
//! stopping at the first.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use thiserror::Error;

/// Presentation hints for a config field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UiHint {
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,
    /// Sensitive values are masked in UIs and never logged.
    #[serde(default)]
    pub sensitive: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
}

/// The value type and constraints of a config field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldKind {
    Text {
        #[serde(default)]
        min_len: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_len: Option<usize>,
    },
    Integer {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min: Option<i64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max: Option<i64>,
    },
    Boolean,
    /// One of a fixed set of string values.
    Choice { options: Vec<String> },
}

/// One field of an adapter's config schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    #[serde(default)]
    pub required: bool,
    /// Applied when the caller omits the field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    pub ui: UiHint,
    /// Container environment variable this field maps to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env_var: Option<String>,
}

/// A single field-level validation problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigIssue {
    pub field: String,
    pub message: String,
}

/// Validation failure carrying every collected issue.
#[derive(Debug, Error)]
#[error("config validation failed: {}", summarize(.issues))]
pub struct ValidationFailure {
    pub issues: Vec<ConfigIssue>,
}

fn summarize(issues: &[ConfigIssue]) -> String {
    issues
        .iter()
        .map(|i| format!("{}: {}", i.field, i.message))
        .collect::<Vec<_>>()
        .join("; ")
}

/// An adapter's configuration schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigSchema {
    pub fields: Vec<FieldSpec>,
}

impl ConfigSchema {
    pub fn new(fields: Vec<FieldSpec>) -> Self {
        Self { fields }
    }

    /// The default config object (fields with declared defaults only).
    pub fn defaults(&self) -> Map<String, Value> {
        self.fields
            .iter()
            .filter_map(|f| f.default.clone().map(|v| (f.name.clone(), v)))
            .collect()
    }

    /// field name -> environment variable, for fields that declare one.
    pub fn env_mapping(&self) -> HashMap<String, String> {
        self.fields
            .iter()
            .filter_map(|f| f.env_var.clone().map(|e| (f.name.clone(), e)))
            .collect()
    }

    /// Merge caller config over defaults, then validate.
    ///
    /// Unknown caller fields are dropped. The returned map contains only
    /// schema-known fields.
    pub fn merge_and_validate(
        &self,
        caller: Option<&Map<String, Value>>,
    ) -> Result<Map<String, Value>, ValidationFailure> {
        let mut merged = self.defaults();
        if let Some(caller) = caller {
            for field in &self.fields {
                if let Some(value) = caller.get(&field.name) {
                    merged.insert(field.name.clone(), value.clone());
                }
            }
        }

        let mut issues = Vec::new();
        for field in &self.fields {
            match merged.get(&field.name) {
                None | Some(Value::Null) => {
                    if field.required {
                        issues.push(ConfigIssue {
                            field: field.name.clone(),
                            message: "is required".to_string(),
                        });
                    }
                    merged.remove(&field.name);
                }
                Some(value) => {
                    if let Some(message) = check_value(&field.kind, value) {
                        issues.push(ConfigIssue {
                            field: field.name.clone(),
                            message,
                        });
                    }
                }
            }
        }

        if issues.is_empty() {
            Ok(merged)
        } else {
            Err(ValidationFailure { issues })
        }
    }
}

fn check_value(kind: &FieldKind, value: &Value) -> Option<String> {
    match kind {
        FieldKind::Text { min_len, max_len } => match value.as_str() {
            None => Some("expected a string".to_string()),
            Some(s) => {
                if s.chars().count() < *min_len {
                    Some(format!("must be at least {min_len} characters"))
                } else if max_len.is_some_and(|max| s.chars().count() > max) {
                    Some(format!("must be at most {} characters", max_len.unwrap()))
                } else {
                    None
                }
            }
        },
        FieldKind::Integer { min, max } => match value.as_i64() {
            None => Some("expected an integer".to_string()),
            Some(n) => {
                if min.is_some_and(|m| n < m) {
                    Some(format!("must be >= {}", min.unwrap()))
                } else if max.is_some_and(|m| n > m) {
                    Some(format!("must be <= {}", max.unwrap()))
                } else {
                    None
                }
            }
        },
        FieldKind::Boolean => {
            if value.is_boolean() {
                None
            } else {
                Some("expected a boolean".to_string())
            }
        }
        FieldKind::Choice { options } => match value.as_str() {
            Some(s) if options.iter().any(|o| o == s) => None,
            _ => Some(format!("must be one of: {}", options.join(", "))),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> ConfigSchema {
        ConfigSchema::new(vec![
            FieldSpec {
                name: "agent_name".to_string(),
                kind: FieldKind::Text {
                    min_len: 1,
                    max_len: Some(50),
                },
                required: true,
                default: Some(json!("Assistant")),
                ui: UiHint {
                    label: "Agent Name".to_string(),
                    ..UiHint::default()
                },
                env_var: None,
            },
            FieldSpec {
                name: "persona".to_string(),
                kind: FieldKind::Text {
                    min_len: 0,
                    max_len: Some(2000),
                },
                required: false,
                default: None,
                ui: UiHint {
                    label: "Persona".to_string(),
                    ..UiHint::default()
                },
                env_var: None,
            },
            FieldSpec {
                name: "api_session_key".to_string(),
                kind: FieldKind::Text {
                    min_len: 1,
                    max_len: None,
                },
                required: false,
                default: None,
                ui: UiHint {
                    label: "API Session Key".to_string(),
                    sensitive: true,
                    ..UiHint::default()
                },
                env_var: Some("CHAT_API_SESSION_KEY".to_string()),
            },
        ])
    }

    #[test]
    fn defaults_apply_when_caller_omits() {
        let validated = schema().merge_and_validate(None).unwrap();
        assert_eq!(validated.get("agent_name"), Some(&json!("Assistant")));
        assert!(!validated.contains_key("persona"));
    }

    #[test]
    fn caller_values_override_defaults() {
        let mut caller = Map::new();
        caller.insert("agent_name".to_string(), json!("Pat"));
        let validated = schema().merge_and_validate(Some(&caller)).unwrap();
        assert_eq!(validated.get("agent_name"), Some(&json!("Pat")));
    }

    #[test]
    fn unknown_fields_are_dropped() {
        let mut caller = Map::new();
        caller.insert("mystery".to_string(), json!(42));
        let validated = schema().merge_and_validate(Some(&caller)).unwrap();
        assert!(!validated.contains_key("mystery"));
    }

    #[test]
    fn violations_are_collected_per_field() {
        let mut caller = Map::new();
        caller.insert("agent_name".to_string(), json!(""));
        caller.insert("persona".to_string(), json!(123));
        let err = schema().merge_and_validate(Some(&caller)).unwrap_err();
        assert_eq!(err.issues.len(), 2);
        assert!(err.issues.iter().any(|i| i.field == "agent_name"));
        assert!(err.issues.iter().any(|i| i.field == "persona"));
    }

    #[test]
    fn env_mapping_covers_declared_fields_only() {
        let mapping = schema().env_mapping();
        assert_eq!(
            mapping.get("api_session_key").map(String::as_str),
            Some("CHAT_API_SESSION_KEY")
        );
        assert_eq!(mapping.len(), 1);
    }
}
