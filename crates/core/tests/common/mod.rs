//! Shared harness for core integration tests: an in-memory store, a fake
//! container engine, and a wired-up service + reconciler pair.

use async_trait::async_trait;
use chrono::Utc;
use podhost_adapters::{AdapterRegistry, AgentAdapter, ChatRelayAdapter};
use podhost_core::{CreatePodRequest, EncryptionKey, PodService, Reconciler};
use podhost_runtime::{
    ContainerRef, ContainerRuntime, ContainerState, ContainerStatus, LogOptions, RuntimeContext,
    RuntimeError,
};
use podhost_store::{InMemoryPodStore, PodStore};
use podhost_types::{ContainerSpec, Pod, PodId, Tenant, TenantId};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const TEST_DOMAIN: &str = "pods.example.com";
pub const TEST_NETWORK: &str = "podhost-net";

#[derive(Clone)]
struct FakeContainer {
    id: String,
    running: bool,
    status: ContainerStatus,
}

#[derive(Default)]
struct FakeState {
    by_pod: HashMap<PodId, FakeContainer>,
    next_id: u32,
    fail_create: HashSet<PodId>,
    anonymous: HashSet<PodId>,
}

/// In-process stand-in for the container engine. Containers live in a map
/// keyed by pod id, mirroring how the real gateway finds them by label.
#[derive(Default)]
pub struct FakeRuntime {
    state: Mutex<FakeState>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make container creation fail for one pod.
    pub fn fail_create_for(&self, pod_id: PodId) {
        self.state.lock().unwrap().fail_create.insert(pod_id);
    }

    /// Make lookups for this pod return a container without an id.
    pub fn hide_container_id(&self, pod_id: PodId) {
        self.state.lock().unwrap().anonymous.insert(pod_id);
    }

    pub fn container_id(&self, pod_id: &PodId) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .by_pod
            .get(pod_id)
            .map(|c| c.id.clone())
    }

    pub fn has_container(&self, pod_id: &PodId) -> bool {
        self.state.lock().unwrap().by_pod.contains_key(pod_id)
    }

    pub fn is_running(&self, pod_id: &PodId) -> bool {
        self.state
            .lock()
            .unwrap()
            .by_pod
            .get(pod_id)
            .is_some_and(|c| c.running)
    }
}

fn find_mut<'a>(
    state: &'a mut FakeState,
    container_id: &str,
) -> Result<&'a mut FakeContainer, RuntimeError> {
    state
        .by_pod
        .values_mut()
        .find(|c| c.id == container_id)
        .ok_or_else(|| RuntimeError::Engine(format!("no such container: {container_id}")))
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn create_container(
        &self,
        pod: &Pod,
        _spec: &ContainerSpec,
        _ctx: &RuntimeContext,
    ) -> Result<String, RuntimeError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_create.contains(&pod.id) {
            return Err(RuntimeError::Engine("image pull failed".to_string()));
        }
        state.next_id += 1;
        let id = format!("ctr-{:04}", state.next_id);
        state.by_pod.insert(
            pod.id,
            FakeContainer {
                id: id.clone(),
                running: false,
                status: ContainerStatus::Created,
            },
        );
        Ok(id)
    }

    async fn start_container(&self, id: &str) -> Result<(), RuntimeError> {
        let mut state = self.state.lock().unwrap();
        let container = find_mut(&mut state, id)?;
        container.running = true;
        container.status = ContainerStatus::Running;
        Ok(())
    }

    async fn stop_container(&self, id: &str) -> Result<(), RuntimeError> {
        let mut state = self.state.lock().unwrap();
        let container = find_mut(&mut state, id)?;
        container.running = false;
        container.status = ContainerStatus::Exited;
        Ok(())
    }

    async fn remove_container(&self, id: &str, _force: bool) -> Result<(), RuntimeError> {
        let mut state = self.state.lock().unwrap();
        find_mut(&mut state, id)?;
        state.by_pod.retain(|_, c| c.id != id);
        Ok(())
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerState, RuntimeError> {
        let mut state = self.state.lock().unwrap();
        let container = find_mut(&mut state, id)?;
        Ok(ContainerState {
            status: container.status,
            running: container.running,
        })
    }

    async fn container_for_pod(
        &self,
        pod_id: &PodId,
    ) -> Result<Option<ContainerRef>, RuntimeError> {
        let state = self.state.lock().unwrap();
        Ok(state.by_pod.get(pod_id).map(|c| ContainerRef {
            id: if state.anonymous.contains(pod_id) {
                None
            } else {
                Some(c.id.clone())
            },
        }))
    }

    async fn container_logs(&self, id: &str, _opts: &LogOptions) -> Result<String, RuntimeError> {
        let mut state = self.state.lock().unwrap();
        find_mut(&mut state, id)?;
        Ok(format!("gateway listening ({id})\n"))
    }
}

pub struct Harness {
    pub store: Arc<InMemoryPodStore>,
    pub runtime: Arc<FakeRuntime>,
    pub service: PodService,
    pub reconciler: Reconciler,
    pub tenant: Tenant,
    pub data_root: String,
}

pub async fn harness() -> Harness {
    harness_with_key(None).await
}

pub async fn harness_with_key(key: Option<EncryptionKey>) -> Harness {
    build_harness(key, vec![Arc::new(ChatRelayAdapter::default())]).await
}

/// Harness wired with a caller-supplied adapter set instead of the default.
#[allow(dead_code)]
pub async fn harness_with_adapters(adapters: Vec<Arc<dyn AgentAdapter>>) -> Harness {
    build_harness(None, adapters).await
}

async fn build_harness(key: Option<EncryptionKey>, adapters: Vec<Arc<dyn AgentAdapter>>) -> Harness {
    let store = Arc::new(InMemoryPodStore::new());
    let runtime = Arc::new(FakeRuntime::new());

    let mut registry = AdapterRegistry::new();
    for adapter in adapters {
        registry.register(adapter);
    }
    let registry = Arc::new(registry);

    let data_root = std::env::temp_dir()
        .join(format!("podhost-test-{}", uuid::Uuid::new_v4().simple()))
        .display()
        .to_string();

    let service = PodService::new(
        store.clone() as Arc<dyn PodStore>,
        runtime.clone() as Arc<dyn ContainerRuntime>,
        registry.clone(),
        TEST_DOMAIN,
        &data_root,
        key,
    );
    let reconciler = Reconciler::new(
        store.clone() as Arc<dyn PodStore>,
        runtime.clone() as Arc<dyn ContainerRuntime>,
        registry,
        RuntimeContext {
            network: TEST_NETWORK.to_string(),
            domain: TEST_DOMAIN.to_string(),
        },
        Duration::from_secs(30),
    );

    let now = Utc::now();
    let tenant = Tenant {
        id: TenantId::generate(),
        name: "acme".to_string(),
        email: None,
        created_at: now,
        updated_at: now,
    };
    store.insert_tenant(&tenant).await.unwrap();

    Harness {
        store,
        runtime,
        service,
        reconciler,
        tenant,
        data_root,
    }
}

impl Harness {
    pub async fn create_pod(&self, name: &str) -> Pod {
        self.service
            .create(CreatePodRequest {
                tenant_id: self.tenant.id,
                name: name.to_string(),
                adapter_id: "chatrelay".to_string(),
                config: None,
            })
            .await
            .unwrap()
    }
}
