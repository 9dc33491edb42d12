//! Pod service: the write path for desired state.
//!
//! Only this service writes `desired_status`; the reconciler owns
//! `actual_status` and `container_id`. Create is the one multi-step flow: it
//! validates config against the adapter schema, picks a unique subdomain,
//! persists the pod transactionally, then stages adapter-provided files into
//! the pod's data directory.

use crate::crypto::{looks_encrypted, EncryptionKey};
use crate::error::CoreError;
use chrono::{DateTime, Utc};
use podhost_adapters::{AdapterRegistry, CreateArtifacts, LifecycleContext};
use podhost_runtime::{ContainerRuntime, LogOptions};
use podhost_store::{PodDetail, PodStore, PodWithStatus};
use podhost_types::{
    ActualStatus, DesiredStatus, EventType, PlatformContext, Pod, PodEvent, PodId,
    PodStatusRecord, TenantId,
};
use rand::RngCore;
use serde_json::{Map, Value};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

const SUBDOMAIN_MAX_LEN: usize = 32;
const SUBDOMAIN_ATTEMPTS: usize = 10;

/// Input to [`PodService::create`].
#[derive(Debug, Clone)]
pub struct CreatePodRequest {
    pub tenant_id: TenantId,
    pub name: String,
    pub adapter_id: String,
    pub config: Option<Map<String, Value>>,
}

pub struct PodService {
    store: Arc<dyn PodStore>,
    runtime: Arc<dyn ContainerRuntime>,
    registry: Arc<AdapterRegistry>,
    domain: String,
    data_root: String,
    encryption_key: Option<EncryptionKey>,
}

impl PodService {
    pub fn new(
        store: Arc<dyn PodStore>,
        runtime: Arc<dyn ContainerRuntime>,
        registry: Arc<AdapterRegistry>,
        domain: impl Into<String>,
        data_root: impl Into<String>,
        encryption_key: Option<EncryptionKey>,
    ) -> Self {
        Self {
            store,
            runtime,
            registry,
            domain: domain.into(),
            data_root: data_root.into(),
            encryption_key,
        }
    }

    /// Creates a pod with desired status `running`.
    ///
    /// The pod row, its config, the initial pending snapshot, and the
    /// `created` event are committed as one transaction. File staging happens
    /// after the commit; a staging failure surfaces as an error but leaves
    /// the committed record in place for the operator to inspect.
    pub async fn create(&self, req: CreatePodRequest) -> Result<Pod, CoreError> {
        let name = req.name.trim();
        if name.is_empty() {
            return Err(CoreError::validation("Pod name must not be empty"));
        }
        let adapter = self
            .registry
            .get(&req.adapter_id)
            .ok_or_else(|| CoreError::validation(format!("Unknown adapter: {}", req.adapter_id)))?;
        if !self.store.tenant_exists(&req.tenant_id).await? {
            return Err(CoreError::NotFound {
                entity: "tenant",
                id: req.tenant_id.to_string(),
            });
        }

        let config = adapter
            .config_schema()
            .merge_and_validate(req.config.as_ref())?;

        let subdomain = self.generate_subdomain(name).await?;
        let id = PodId::generate();
        let now = Utc::now();
        let pod = Pod {
            id,
            tenant_id: req.tenant_id,
            name: name.to_string(),
            adapter_id: req.adapter_id.clone(),
            subdomain,
            desired_status: DesiredStatus::Running,
            actual_status: ActualStatus::Pending,
            container_id: None,
            gateway_token: generate_gateway_token(),
            data_dir: format!("{}/{}", self.data_root.trim_end_matches('/'), id),
            created_at: now,
            updated_at: now,
        };

        let platform = PlatformContext::new(&self.domain, &pod.data_dir);
        let artifacts = adapter
            .on_before_create(LifecycleContext {
                pod: &pod,
                config: &config,
                platform: &platform,
            })
            .await?;

        let stored_token = match &self.encryption_key {
            Some(key) => key.encrypt(&pod.gateway_token)?,
            None => pod.gateway_token.clone(),
        };
        self.store.insert_pod(&pod, &stored_token, &config).await?;

        if let Err(err) = self.stage_initial_files(&pod, &artifacts).await {
            // The committed record stays; clean up whatever landed on disk.
            if let Err(rm_err) = tokio::fs::remove_dir_all(&pod.data_dir).await {
                warn!(pod_id = %pod.id, error = %rm_err, "failed to clean up data dir");
            }
            return Err(err);
        }

        info!(pod_id = %pod.id, tenant_id = %pod.tenant_id, adapter = %pod.adapter_id,
              subdomain = %pod.subdomain, "pod created");
        Ok(pod)
    }

    pub async fn start(&self, id: &PodId) -> Result<(), CoreError> {
        self.set_desired(id, DesiredStatus::Running, EventType::Started, "Pod requested to start")
            .await
    }

    pub async fn stop(&self, id: &PodId) -> Result<(), CoreError> {
        self.set_desired(id, DesiredStatus::Stopped, EventType::Stopped, "Pod requested to stop")
            .await
    }

    /// Marks the pod for deletion; the reconciler tears down the container and
    /// removes the record on its next pass.
    pub async fn delete(&self, id: &PodId) -> Result<(), CoreError> {
        self.set_desired(id, DesiredStatus::Deleted, EventType::Deleted, "Pod requested to delete")
            .await
    }

    async fn set_desired(
        &self,
        id: &PodId,
        status: DesiredStatus,
        event_type: EventType,
        message: &str,
    ) -> Result<(), CoreError> {
        self.store.update_desired_status(id, status).await?;
        self.store.append_event(id, event_type, Some(message)).await?;
        info!(pod_id = %id, desired = %status, "desired status updated");
        Ok(())
    }

    pub async fn list(&self, tenant: Option<&TenantId>) -> Result<Vec<PodWithStatus>, CoreError> {
        let mut pods = self.store.list_pods(tenant).await?;
        for entry in &mut pods {
            entry.pod.gateway_token = self.readable_token(&entry.pod.gateway_token)?;
        }
        Ok(pods)
    }

    pub async fn get(&self, id: &PodId) -> Result<PodDetail, CoreError> {
        let mut detail = self
            .store
            .get_pod(id)
            .await?
            .ok_or_else(|| CoreError::NotFound {
                entity: "pod",
                id: id.to_string(),
            })?;
        detail.pod.gateway_token = self.readable_token(&detail.pod.gateway_token)?;
        Ok(detail)
    }

    pub async fn logs(&self, id: &PodId, opts: &LogOptions) -> Result<String, CoreError> {
        let detail = self
            .store
            .get_pod(id)
            .await?
            .ok_or_else(|| CoreError::NotFound {
                entity: "pod",
                id: id.to_string(),
            })?;
        let container_id = detail
            .pod
            .container_id
            .ok_or_else(|| CoreError::validation("Pod has no container"))?;
        Ok(self.runtime.container_logs(&container_id, opts).await?)
    }

    pub async fn list_events(&self, id: &PodId, limit: i64) -> Result<Vec<PodEvent>, CoreError> {
        Ok(self.store.list_events(id, limit).await?)
    }

    /// Status snapshots updated at or after `since`, for feed consumers.
    pub async fn list_status_changes_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<PodStatusRecord>, CoreError> {
        Ok(self.store.status_changes_since(since).await?)
    }

    /// Tokens sealed at rest come back plaintext; tokens stored before a key
    /// was configured pass through unchanged. A sealed token with no key to
    /// open it is an error, never silently returned.
    fn readable_token(&self, stored: &str) -> Result<String, CoreError> {
        if !looks_encrypted(stored) {
            return Ok(stored.to_string());
        }
        match &self.encryption_key {
            Some(key) => Ok(key.decrypt(stored)?),
            None => Err(CoreError::Internal(
                "gateway token is encrypted but no encryption key is configured".to_string(),
            )),
        }
    }

    /// Picks a globally unique subdomain from the pod name plus a random
    /// suffix, retrying on collision before falling back to an id fragment.
    async fn generate_subdomain(&self, name: &str) -> Result<String, CoreError> {
        let base = slugify(name);
        for _ in 0..SUBDOMAIN_ATTEMPTS {
            let mut suffix = [0u8; 3];
            rand::thread_rng().fill_bytes(&mut suffix);
            let candidate = format!("{base}-{}", hex::encode(suffix));
            if !self.store.subdomain_exists(&candidate).await? {
                return Ok(candidate);
            }
        }
        let fragment = uuid::Uuid::new_v4().simple().to_string();
        Ok(format!("{base}-{}", &fragment[..8]))
    }

    async fn stage_initial_files(
        &self,
        pod: &Pod,
        artifacts: &CreateArtifacts,
    ) -> Result<(), CoreError> {
        let root = PathBuf::from(&pod.data_dir);
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| CoreError::Internal(format!("failed to create data dir: {e}")))?;

        for file in &artifacts.initial_files {
            let target = resolve_within(&root, &file.path).ok_or_else(|| {
                CoreError::Internal(format!("initial file escapes data dir: {}", file.path))
            })?;
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| CoreError::Internal(format!("failed to stage files: {e}")))?;
            }
            tokio::fs::write(&target, &file.content)
                .await
                .map_err(|e| CoreError::Internal(format!("failed to stage files: {e}")))?;
        }
        Ok(())
    }
}

fn generate_gateway_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Joins a relative path under `root`, rejecting absolute paths and any
/// parent-directory components.
fn resolve_within(root: &Path, relative: &str) -> Option<PathBuf> {
    let path = Path::new(relative);
    let mut resolved = root.to_path_buf();
    for component in path.components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::CurDir => {}
            _ => return None,
        }
    }
    Some(resolved)
}

/// Lowercases and collapses a pod name into a DNS-label-friendly slug.
fn slugify(name: &str) -> String {
    let mut slug = String::new();
    let mut last_dash = false;
    for ch in name.chars() {
        let ch = ch.to_ascii_lowercase();
        if ch.is_ascii_alphanumeric() {
            slug.push(ch);
            last_dash = false;
        } else if !last_dash && !slug.is_empty() {
            slug.push('-');
            last_dash = true;
        }
    }
    let slug = slug.trim_end_matches('-');
    let mut slug = slug.to_string();
    slug.truncate(SUBDOMAIN_MAX_LEN);
    let slug = slug.trim_end_matches('-').to_string();
    if slug.is_empty() {
        "pod".to_string()
    } else {
        slug
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_normalizes_names() {
        assert_eq!(slugify("Support Bot"), "support-bot");
        assert_eq!(slugify("  --Weird__ Name!!  "), "weird-name");
        assert_eq!(slugify("???"), "pod");
        assert_eq!(slugify(""), "pod");
    }

    #[test]
    fn slugify_caps_length() {
        let long = "a".repeat(100);
        assert_eq!(slugify(&long).len(), SUBDOMAIN_MAX_LEN);
    }

    #[test]
    fn resolve_within_rejects_escapes() {
        let root = Path::new("/var/lib/podhost/p1");
        assert_eq!(
            resolve_within(root, "workspace/PERSONA.md"),
            Some(PathBuf::from("/var/lib/podhost/p1/workspace/PERSONA.md"))
        );
        assert!(resolve_within(root, "../outside").is_none());
        assert!(resolve_within(root, "/etc/passwd").is_none());
        assert!(resolve_within(root, "ok/../../bad").is_none());
    }

    #[test]
    fn gateway_tokens_are_long_and_distinct() {
        let a = generate_gateway_token();
        let b = generate_gateway_token();
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
    }
}
