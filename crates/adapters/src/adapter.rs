//! The adapter capability trait and lifecycle hook contexts.

use crate::error::AdapterError;
use crate::schema::ConfigSchema;
use async_trait::async_trait;
use podhost_types::{ContainerSpec, PlatformContext, Pod};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Broad workload category, for catalog UIs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AdapterCategory {
    AiAssistant,
    AiWorkflow,
    Custom,
}

/// Descriptive metadata for an adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdapterMeta {
    pub id: String,
    pub label: String,
    pub description: String,
    pub version: String,
    pub category: AdapterCategory,
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo: Option<String>,
}

/// Context passed to pre-create and pre-delete hooks.
pub struct LifecycleContext<'a> {
    pub pod: &'a Pod,
    pub config: &'a Map<String, Value>,
    pub platform: &'a PlatformContext,
}

/// Context passed to the config-change hook.
pub struct ConfigChangeContext<'a> {
    pub pod: &'a Pod,
    pub config: &'a Map<String, Value>,
    pub previous_config: &'a Map<String, Value>,
    pub changed_fields: &'a [String],
    pub platform: &'a PlatformContext,
}

/// What the platform should do after a config change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConfigChangeAction {
    None,
    HotReload,
    Restart,
    Recreate,
}

/// A file the pre-create hook wants staged into the pod's data directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitialFile {
    /// Relative to the pod's data directory.
    pub path: String,
    pub content: String,
}

/// Output of the pre-create hook.
#[derive(Debug, Default)]
pub struct CreateArtifacts {
    pub initial_files: Vec<InitialFile>,
}

/// A pluggable workload descriptor.
///
/// Hooks have do-nothing default implementations; adapters override only what
/// they need. `resolve_container_spec` must be pure with respect to platform
/// state: same config + context, same spec.
#[async_trait]
pub trait AgentAdapter: Send + Sync {
    fn meta(&self) -> &AdapterMeta;

    /// The default container spec before config resolution.
    fn container_spec(&self) -> &ContainerSpec;

    fn config_schema(&self) -> &ConfigSchema;

    /// Runs before the pod record is persisted; may stage initial files.
    async fn on_before_create(
        &self,
        _ctx: LifecycleContext<'_>,
    ) -> Result<CreateArtifacts, AdapterError> {
        Ok(CreateArtifacts::default())
    }

    /// Runs before the reconciler tears down the pod's container.
    async fn on_before_delete(&self, _ctx: LifecycleContext<'_>) -> Result<(), AdapterError> {
        Ok(())
    }

    /// Decides how the platform reacts to a config update.
    async fn on_config_change(
        &self,
        _ctx: ConfigChangeContext<'_>,
    ) -> Result<ConfigChangeAction, AdapterError> {
        Ok(ConfigChangeAction::None)
    }

    /// Resolve the final container spec from validated config and platform
    /// context.
    fn resolve_container_spec(
        &self,
        config: &Map<String, Value>,
        platform: &PlatformContext,
    ) -> Result<ContainerSpec, AdapterError>;
}
