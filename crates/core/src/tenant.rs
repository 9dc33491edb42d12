//! Tenant service.

use crate::error::CoreError;
use chrono::Utc;
use podhost_store::PodStore;
use podhost_types::{Tenant, TenantId};
use std::sync::Arc;
use tracing::info;

pub struct TenantService {
    store: Arc<dyn PodStore>,
}

impl TenantService {
    pub fn new(store: Arc<dyn PodStore>) -> Self {
        Self { store }
    }

    pub async fn create(&self, name: &str, email: Option<&str>) -> Result<Tenant, CoreError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CoreError::validation("Tenant name must not be empty"));
        }
        let now = Utc::now();
        let tenant = Tenant {
            id: TenantId::generate(),
            name: name.to_string(),
            email: email.map(str::to_string),
            created_at: now,
            updated_at: now,
        };
        self.store.insert_tenant(&tenant).await?;
        info!(tenant_id = %tenant.id, name = %tenant.name, "tenant created");
        Ok(tenant)
    }

    pub async fn list(&self) -> Result<Vec<Tenant>, CoreError> {
        Ok(self.store.list_tenants().await?)
    }

    pub async fn get(&self, id: &TenantId) -> Result<Tenant, CoreError> {
        self.store
            .get_tenant(id)
            .await?
            .ok_or_else(|| CoreError::NotFound {
                entity: "tenant",
                id: id.to_string(),
            })
    }

    /// Deletes a tenant; refused while pods still reference it.
    pub async fn delete(&self, id: &TenantId) -> Result<(), CoreError> {
        self.store.delete_tenant(id).await?;
        info!(tenant_id = %id, "tenant deleted");
        Ok(())
    }
}
