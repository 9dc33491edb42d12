//! Builtin adapter: a multi-channel chat relay gateway.
//!
//! The workload is a long-running gateway process speaking to several chat
//! platforms; credentials arrive via config, the persona via a staged file.

use crate::adapter::{
    AdapterCategory, AdapterMeta, AgentAdapter, ConfigChangeAction, ConfigChangeContext,
    CreateArtifacts, InitialFile, LifecycleContext,
};
use crate::error::AdapterError;
use crate::schema::{ConfigSchema, FieldKind, FieldSpec, UiHint};
use async_trait::async_trait;
use podhost_types::{
    ContainerSpec, HealthCheckSpec, PlatformContext, PortProtocol, PortSpec, ResourceSpec,
    RestartPolicy, VolumeSpec,
};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

const GATEWAY_PORT: u16 = 18789;
const DATA_MOUNT: &str = "/home/agent";

/// Substitute platform placeholders in a templated string.
fn apply_template(value: &str, platform: &PlatformContext) -> String {
    value
        .replace("{{platform.domain}}", &platform.domain)
        .replace("{{pod.data_dir}}", &platform.data_dir)
}

fn text_field(
    name: &str,
    label: &str,
    group: &str,
    max_len: usize,
    sensitive: bool,
    env_var: Option<&str>,
) -> FieldSpec {
    FieldSpec {
        name: name.to_string(),
        kind: FieldKind::Text {
            min_len: 1,
            max_len: Some(max_len),
        },
        required: false,
        default: None,
        ui: UiHint {
            label: label.to_string(),
            help: None,
            sensitive,
            group: Some(group.to_string()),
        },
        env_var: env_var.map(str::to_string),
    }
}

/// The chat relay gateway adapter.
pub struct ChatRelayAdapter {
    meta: AdapterMeta,
    spec: ContainerSpec,
    schema: ConfigSchema,
}

impl Default for ChatRelayAdapter {
    fn default() -> Self {
        Self::with_image("chatrelay:production")
    }
}

impl ChatRelayAdapter {
    /// Build the adapter against a specific gateway image.
    pub fn with_image(image: impl Into<String>) -> Self {
        let spec = ContainerSpec {
            image: image.into(),
            command: Some(
                [
                    "node",
                    "dist/index.js",
                    "gateway",
                    "--bind",
                    "lan",
                    "--port",
                    "18789",
                    "--allow-unconfigured",
                ]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            ),
            environment: BTreeMap::from([
                ("HOME".to_string(), DATA_MOUNT.to_string()),
                ("TERM".to_string(), "xterm-256color".to_string()),
                ("NODE_ENV".to_string(), "production".to_string()),
            ]),
            volumes: Vec::new(),
            ports: vec![PortSpec {
                container: GATEWAY_PORT,
                protocol: PortProtocol::Tcp,
                primary: true,
                websocket: true,
            }],
            health_check: HealthCheckSpec {
                command: vec![
                    "CMD".to_string(),
                    "wget".to_string(),
                    "-qO-".to_string(),
                    format!("http://127.0.0.1:{GATEWAY_PORT}/health"),
                ],
                interval_seconds: 30,
                timeout_seconds: 10,
                retries: 3,
                start_period_seconds: 15,
            },
            resources: ResourceSpec {
                memory_mb: 512,
                cpus: 1.0,
            },
            restart_policy: RestartPolicy::UnlessStopped,
            user: Some("agent".to_string()),
        };

        let schema = ConfigSchema::new(vec![
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
                    help: None,
                    sensitive: false,
                    group: Some("Identity".to_string()),
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
                    label: "Persona (PERSONA.md)".to_string(),
                    help: None,
                    sensitive: false,
                    group: Some("Identity".to_string()),
                },
                env_var: None,
            },
            text_field(
                "api_session_key",
                "Model API Session Key",
                "AI Model",
                512,
                true,
                Some("CHAT_API_SESSION_KEY"),
            ),
            text_field(
                "telegram_bot_token",
                "Telegram Bot Token",
                "Messaging",
                256,
                true,
                None,
            ),
            text_field(
                "discord_bot_token",
                "Discord Bot Token",
                "Messaging",
                256,
                true,
                None,
            ),
        ]);

        Self {
            meta: AdapterMeta {
                id: "chatrelay".to_string(),
                label: "Chat Relay Gateway".to_string(),
                description: "Multi-channel AI assistant gateway for messaging platforms"
                    .to_string(),
                version: "1.0.0".to_string(),
                category: AdapterCategory::AiAssistant,
                tags: ["ai", "chatbot", "telegram", "discord"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
                logo: None,
            },
            spec,
            schema,
        }
    }

    fn gateway_config_json(config: &Map<String, Value>) -> String {
        let mut root = Map::new();
        root.insert("gateway".to_string(), json!({ "port": GATEWAY_PORT }));
        if let Some(token) = config.get("telegram_bot_token").and_then(Value::as_str) {
            root.insert(
                "telegram".to_string(),
                json!({ "default": { "bot_token": token } }),
            );
        }
        if let Some(token) = config.get("discord_bot_token").and_then(Value::as_str) {
            root.insert(
                "discord".to_string(),
                json!({ "default": { "bot_token": token } }),
            );
        }
        serde_json::to_string_pretty(&Value::Object(root)).unwrap_or_else(|_| "{}".to_string())
    }
}

#[async_trait]
impl AgentAdapter for ChatRelayAdapter {
    fn meta(&self) -> &AdapterMeta {
        &self.meta
    }

    fn container_spec(&self) -> &ContainerSpec {
        &self.spec
    }

    fn config_schema(&self) -> &ConfigSchema {
        &self.schema
    }

    async fn on_before_create(
        &self,
        ctx: LifecycleContext<'_>,
    ) -> Result<CreateArtifacts, AdapterError> {
        let mut initial_files = vec![InitialFile {
            path: ".chatrelay/config.json".to_string(),
            content: Self::gateway_config_json(ctx.config),
        }];

        if let Some(persona) = ctx.config.get("persona").and_then(Value::as_str) {
            initial_files.push(InitialFile {
                path: "workspace/PERSONA.md".to_string(),
                content: persona.to_string(),
            });
        }

        Ok(CreateArtifacts { initial_files })
    }

    async fn on_config_change(
        &self,
        ctx: ConfigChangeContext<'_>,
    ) -> Result<ConfigChangeAction, AdapterError> {
        // Credential changes only take effect on process restart; persona
        // edits are picked up live from the staged file.
        if ctx.changed_fields.iter().any(|f| f == "api_session_key") {
            return Ok(ConfigChangeAction::Restart);
        }
        Ok(ConfigChangeAction::None)
    }

    fn resolve_container_spec(
        &self,
        config: &Map<String, Value>,
        platform: &PlatformContext,
    ) -> Result<ContainerSpec, AdapterError> {
        let agent_name = config
            .get("agent_name")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                AdapterError::SpecResolution("validated config is missing agent_name".to_string())
            })?;

        let mut spec = self.spec.clone();

        spec.command = spec
            .command
            .map(|parts| parts.iter().map(|p| apply_template(p, platform)).collect());

        spec.environment
            .insert("AGENT_NAME".to_string(), agent_name.to_string());
        spec.environment
            .insert("PLATFORM_DOMAIN".to_string(), platform.domain.clone());

        for (field, env_var) in self.schema.env_mapping() {
            if let Some(value) = config.get(&field).and_then(Value::as_str) {
                if !value.is_empty() {
                    spec.environment.insert(env_var, value.to_string());
                }
            }
        }

        spec.volumes = vec![VolumeSpec {
            container_path: DATA_MOUNT.to_string(),
            source: platform.data_dir.clone(),
            persistent: true,
        }];

        Ok(spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn platform() -> PlatformContext {
        PlatformContext::new("pods.example.com", "/var/lib/podhost/abc")
    }

    fn validated(entries: &[(&str, Value)]) -> Map<String, Value> {
        let mut caller = Map::new();
        for (k, v) in entries {
            caller.insert(k.to_string(), v.clone());
        }
        ChatRelayAdapter::default()
            .config_schema()
            .merge_and_validate(Some(&caller))
            .unwrap()
    }

    #[test]
    fn resolve_maps_env_and_mounts_data_dir() {
        let adapter = ChatRelayAdapter::default();
        let config = validated(&[("api_session_key", json!("sk-123"))]);
        let spec = adapter.resolve_container_spec(&config, &platform()).unwrap();

        assert_eq!(
            spec.environment.get("CHAT_API_SESSION_KEY").map(String::as_str),
            Some("sk-123")
        );
        assert_eq!(
            spec.environment.get("AGENT_NAME").map(String::as_str),
            Some("Assistant")
        );
        assert_eq!(
            spec.environment.get("PLATFORM_DOMAIN").map(String::as_str),
            Some("pods.example.com")
        );
        assert_eq!(spec.volumes.len(), 1);
        assert_eq!(spec.volumes[0].source, "/var/lib/podhost/abc");
        assert_eq!(spec.primary_port(), Some(GATEWAY_PORT));
    }

    #[test]
    fn template_substitution_applies_to_command() {
        let adapter = ChatRelayAdapter::default();
        let mut spec = adapter.container_spec().clone();
        spec.command
            .as_mut()
            .unwrap()
            .push("--domain={{platform.domain}}".to_string());

        let rendered = apply_template("--domain={{platform.domain}}", &platform());
        assert_eq!(rendered, "--domain=pods.example.com");
    }

    #[tokio::test]
    async fn pre_create_stages_gateway_config_and_persona() {
        let adapter = ChatRelayAdapter::default();
        let config = validated(&[
            ("persona", json!("Be helpful.")),
            ("telegram_bot_token", json!("tg-token")),
        ]);
        let pod = test_pod();
        let ctx = LifecycleContext {
            pod: &pod,
            config: &config,
            platform: &platform(),
        };

        let artifacts = adapter.on_before_create(ctx).await.unwrap();
        assert_eq!(artifacts.initial_files.len(), 2);
        assert_eq!(artifacts.initial_files[0].path, ".chatrelay/config.json");
        assert!(artifacts.initial_files[0].content.contains("tg-token"));
        assert_eq!(artifacts.initial_files[1].path, "workspace/PERSONA.md");
    }

    #[tokio::test]
    async fn credential_change_requests_restart() {
        let adapter = ChatRelayAdapter::default();
        let config = validated(&[]);
        let previous = validated(&[]);
        let pod = test_pod();
        let changed = vec!["api_session_key".to_string()];
        let ctx = ConfigChangeContext {
            pod: &pod,
            config: &config,
            previous_config: &previous,
            changed_fields: &changed,
            platform: &platform(),
        };

        assert_eq!(
            adapter.on_config_change(ctx).await.unwrap(),
            ConfigChangeAction::Restart
        );
    }

    fn test_pod() -> podhost_types::Pod {
        use chrono::Utc;
        use podhost_types::{ActualStatus, DesiredStatus, PodId, TenantId};

        podhost_types::Pod {
            id: PodId::generate(),
            tenant_id: TenantId::generate(),
            name: "relay".to_string(),
            adapter_id: "chatrelay".to_string(),
            subdomain: "relay-abc123".to_string(),
            desired_status: DesiredStatus::Running,
            actual_status: ActualStatus::Pending,
            container_id: None,
            gateway_token: "token".to_string(),
            data_dir: "/var/lib/podhost/abc".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }
}
