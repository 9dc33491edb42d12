//! PostgreSQL store backend.

use crate::error::StoreError;
use crate::traits::{ContainerIdUpdate, PodDetail, PodStore, PodWithStatus, ReconcilablePod};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use podhost_types::{
    ActualStatus, DesiredStatus, EventType, Pod, PodConfig, PodEvent, PodId, PodStatusRecord,
    Tenant, TenantId,
};
use serde_json::{Map, Value};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use std::time::Duration;
use uuid::Uuid;

/// Production store on PostgreSQL.
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect(database_url)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the schema when it does not exist yet. Statements are
    /// idempotent so startup can always run this.
    pub async fn initialize_schema(&self) -> Result<(), StoreError> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS tenants (
                id UUID PRIMARY KEY,
                name TEXT NOT NULL,
                email TEXT,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS pods (
                id UUID PRIMARY KEY,
                tenant_id UUID NOT NULL REFERENCES tenants(id),
                name TEXT NOT NULL,
                adapter_id TEXT NOT NULL,
                subdomain TEXT NOT NULL UNIQUE,
                desired_status TEXT NOT NULL DEFAULT 'running',
                actual_status TEXT NOT NULL DEFAULT 'pending',
                container_id TEXT,
                gateway_token TEXT NOT NULL,
                data_dir TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS pod_configs (
                pod_id UUID PRIMARY KEY REFERENCES pods(id) ON DELETE CASCADE,
                config JSONB NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS pod_status (
                pod_id UUID PRIMARY KEY REFERENCES pods(id) ON DELETE CASCADE,
                phase TEXT NOT NULL,
                ready BOOLEAN NOT NULL DEFAULT FALSE,
                message TEXT,
                last_health_at TIMESTAMPTZ,
                memory_mb INTEGER,
                cpu_percent REAL,
                storage_mb INTEGER,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS pod_events (
                id BIGSERIAL PRIMARY KEY,
                pod_id UUID NOT NULL REFERENCES pods(id) ON DELETE CASCADE,
                event_type TEXT NOT NULL,
                message TEXT,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_pods_tenant ON pods(tenant_id)",
            "CREATE INDEX IF NOT EXISTS idx_pod_events_pod ON pod_events(pod_id)",
            "CREATE INDEX IF NOT EXISTS idx_pod_status_updated ON pod_status(updated_at)",
        ];
        for statement in statements {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }
}

fn tenant_from_row(row: &PgRow) -> Result<Tenant, StoreError> {
    Ok(Tenant {
        id: TenantId::from_uuid(row.try_get::<Uuid, _>("id")?),
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn pod_from_row(row: &PgRow) -> Result<Pod, StoreError> {
    let desired: String = row.try_get("desired_status")?;
    let actual: String = row.try_get("actual_status")?;
    Ok(Pod {
        id: PodId::from_uuid(row.try_get::<Uuid, _>("id")?),
        tenant_id: TenantId::from_uuid(row.try_get::<Uuid, _>("tenant_id")?),
        name: row.try_get("name")?,
        adapter_id: row.try_get("adapter_id")?,
        subdomain: row.try_get("subdomain")?,
        desired_status: desired.parse()?,
        actual_status: actual.parse()?,
        container_id: row.try_get("container_id")?,
        gateway_token: row.try_get("gateway_token")?,
        data_dir: row.try_get("data_dir")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Status columns come in aliased so they can ride along a pods join.
fn status_from_joined_row(row: &PgRow, pod_id: PodId) -> Result<Option<PodStatusRecord>, StoreError> {
    let phase: Option<String> = row.try_get("status_phase")?;
    let Some(phase) = phase else {
        return Ok(None);
    };
    Ok(Some(PodStatusRecord {
        pod_id,
        phase,
        ready: row.try_get("status_ready")?,
        message: row.try_get("status_message")?,
        last_health_at: row.try_get("last_health_at")?,
        memory_mb: row.try_get("memory_mb")?,
        cpu_percent: row.try_get("cpu_percent")?,
        storage_mb: row.try_get("storage_mb")?,
        updated_at: row.try_get("status_updated_at")?,
    }))
}

fn status_from_row(row: &PgRow) -> Result<PodStatusRecord, StoreError> {
    Ok(PodStatusRecord {
        pod_id: PodId::from_uuid(row.try_get::<Uuid, _>("pod_id")?),
        phase: row.try_get("phase")?,
        ready: row.try_get("ready")?,
        message: row.try_get("message")?,
        last_health_at: row.try_get("last_health_at")?,
        memory_mb: row.try_get("memory_mb")?,
        cpu_percent: row.try_get("cpu_percent")?,
        storage_mb: row.try_get("storage_mb")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn event_from_row(row: &PgRow) -> Result<PodEvent, StoreError> {
    let event_type: String = row.try_get("event_type")?;
    Ok(PodEvent {
        id: row.try_get("id")?,
        pod_id: PodId::from_uuid(row.try_get::<Uuid, _>("pod_id")?),
        event_type: event_type.parse()?,
        message: row.try_get("message")?,
        created_at: row.try_get("created_at")?,
    })
}

fn config_from_value(value: Value) -> Result<Map<String, Value>, StoreError> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::InvalidData(format!(
            "pod config is not a JSON object: {other}"
        ))),
    }
}

const POD_WITH_STATUS_SELECT: &str = r#"
    SELECT p.id, p.tenant_id, p.name, p.adapter_id, p.subdomain,
           p.desired_status, p.actual_status, p.container_id,
           p.gateway_token, p.data_dir, p.created_at, p.updated_at,
           s.phase AS status_phase, s.ready AS status_ready,
           s.message AS status_message, s.last_health_at,
           s.memory_mb, s.cpu_percent, s.storage_mb,
           s.updated_at AS status_updated_at
    FROM pods p
    LEFT JOIN pod_status s ON s.pod_id = p.id
"#;

#[async_trait]
impl PodStore for PostgresStore {
    async fn insert_tenant(&self, tenant: &Tenant) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO tenants (id, name, email, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(*tenant.id.as_uuid())
        .bind(&tenant.name)
        .bind(&tenant.email)
        .bind(tenant.created_at)
        .bind(tenant.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_tenants(&self) -> Result<Vec<Tenant>, StoreError> {
        let rows = sqlx::query("SELECT * FROM tenants ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(tenant_from_row).collect()
    }

    async fn get_tenant(&self, id: &TenantId) -> Result<Option<Tenant>, StoreError> {
        let row = sqlx::query("SELECT * FROM tenants WHERE id = $1")
            .bind(*id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(tenant_from_row).transpose()
    }

    async fn tenant_exists(&self, id: &TenantId) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT 1 FROM tenants WHERE id = $1")
            .bind(*id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn delete_tenant(&self, id: &TenantId) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        // Lock the tenant row so a concurrent pod create cannot land between
        // the emptiness check and the delete.
        let locked = sqlx::query("SELECT id FROM tenants WHERE id = $1 FOR UPDATE")
            .bind(*id.as_uuid())
            .fetch_optional(&mut *tx)
            .await?;
        if locked.is_none() {
            return Err(StoreError::NotFound {
                entity: "tenant",
                id: id.to_string(),
            });
        }

        let pod = sqlx::query("SELECT id FROM pods WHERE tenant_id = $1 LIMIT 1")
            .bind(*id.as_uuid())
            .fetch_optional(&mut *tx)
            .await?;
        if pod.is_some() {
            return Err(StoreError::Conflict(format!(
                "tenant {id} still has pods"
            )));
        }

        sqlx::query("DELETE FROM tenants WHERE id = $1")
            .bind(*id.as_uuid())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn insert_pod(
        &self,
        pod: &Pod,
        stored_gateway_token: &str,
        config: &Map<String, Value>,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO pods (id, tenant_id, name, adapter_id, subdomain,
                               desired_status, actual_status, container_id,
                               gateway_token, data_dir, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        )
        .bind(*pod.id.as_uuid())
        .bind(*pod.tenant_id.as_uuid())
        .bind(&pod.name)
        .bind(&pod.adapter_id)
        .bind(&pod.subdomain)
        .bind(pod.desired_status.as_str())
        .bind(pod.actual_status.as_str())
        .bind(&pod.container_id)
        .bind(stored_gateway_token)
        .bind(&pod.data_dir)
        .bind(pod.created_at)
        .bind(pod.updated_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO pod_configs (pod_id, config, updated_at) VALUES ($1, $2, $3)",
        )
        .bind(*pod.id.as_uuid())
        .bind(Value::Object(config.clone()))
        .bind(pod.created_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO pod_status (pod_id, phase, ready, message, updated_at)
             VALUES ($1, $2, FALSE, $3, $4)",
        )
        .bind(*pod.id.as_uuid())
        .bind(ActualStatus::Pending.as_str())
        .bind("Awaiting reconciler")
        .bind(pod.created_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO pod_events (pod_id, event_type, message, created_at)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(*pod.id.as_uuid())
        .bind(EventType::Created.as_str())
        .bind("Pod created")
        .bind(pod.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn update_desired_status(
        &self,
        id: &PodId,
        status: DesiredStatus,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE pods SET desired_status = $2, updated_at = $3 WHERE id = $1",
        )
        .bind(*id.as_uuid())
        .bind(status.as_str())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "pod",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    async fn write_observation(
        &self,
        id: &PodId,
        status: ActualStatus,
        container_id: ContainerIdUpdate,
        message: Option<&str>,
    ) -> Result<(), StoreError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let result = match container_id {
            ContainerIdUpdate::Keep => {
                sqlx::query("UPDATE pods SET actual_status = $2, updated_at = $3 WHERE id = $1")
                    .bind(*id.as_uuid())
                    .bind(status.as_str())
                    .bind(now)
                    .execute(&mut *tx)
                    .await?
            }
            ContainerIdUpdate::Set(ref cid) => {
                sqlx::query(
                    "UPDATE pods SET actual_status = $2, container_id = $3, updated_at = $4
                     WHERE id = $1",
                )
                .bind(*id.as_uuid())
                .bind(status.as_str())
                .bind(cid)
                .bind(now)
                .execute(&mut *tx)
                .await?
            }
            ContainerIdUpdate::Clear => {
                sqlx::query(
                    "UPDATE pods SET actual_status = $2, container_id = NULL, updated_at = $3
                     WHERE id = $1",
                )
                .bind(*id.as_uuid())
                .bind(status.as_str())
                .bind(now)
                .execute(&mut *tx)
                .await?
            }
        };
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "pod",
                id: id.to_string(),
            });
        }

        sqlx::query(
            "INSERT INTO pod_status (pod_id, phase, ready, message, updated_at)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (pod_id) DO UPDATE
             SET phase = EXCLUDED.phase, ready = EXCLUDED.ready,
                 message = EXCLUDED.message, updated_at = EXCLUDED.updated_at",
        )
        .bind(*id.as_uuid())
        .bind(status.as_str())
        .bind(status.is_ready())
        .bind(message)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn append_event(
        &self,
        id: &PodId,
        event_type: EventType,
        message: Option<&str>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO pod_events (pod_id, event_type, message, created_at)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(*id.as_uuid())
        .bind(event_type.as_str())
        .bind(message)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_pods(&self, tenant: Option<&TenantId>) -> Result<Vec<PodWithStatus>, StoreError> {
        let rows = match tenant {
            Some(tenant_id) => {
                let sql =
                    format!("{POD_WITH_STATUS_SELECT} WHERE p.tenant_id = $1 ORDER BY p.created_at DESC");
                sqlx::query(&sql)
                    .bind(*tenant_id.as_uuid())
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                let sql = format!("{POD_WITH_STATUS_SELECT} ORDER BY p.created_at DESC");
                sqlx::query(&sql).fetch_all(&self.pool).await?
            }
        };
        rows.iter()
            .map(|row| {
                let pod = pod_from_row(row)?;
                let status = status_from_joined_row(row, pod.id)?;
                Ok(PodWithStatus { pod, status })
            })
            .collect()
    }

    async fn get_pod(&self, id: &PodId) -> Result<Option<PodDetail>, StoreError> {
        let sql = format!("{POD_WITH_STATUS_SELECT} WHERE p.id = $1");
        let row = sqlx::query(&sql)
            .bind(*id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let pod = pod_from_row(&row)?;
        let status = status_from_joined_row(&row, pod.id)?;

        let config_row =
            sqlx::query("SELECT config, updated_at FROM pod_configs WHERE pod_id = $1")
                .bind(*id.as_uuid())
                .fetch_optional(&self.pool)
                .await?;
        let config = config_row
            .map(|row| -> Result<_, StoreError> {
                Ok(PodConfig {
                    pod_id: pod.id,
                    config: config_from_value(row.try_get::<Value, _>("config")?)?,
                    updated_at: row.try_get("updated_at")?,
                })
            })
            .transpose()?;

        Ok(Some(PodDetail { pod, status, config }))
    }

    async fn list_reconcilable(&self) -> Result<Vec<ReconcilablePod>, StoreError> {
        let rows = sqlx::query(
            "SELECT p.*, c.config FROM pods p
             LEFT JOIN pod_configs c ON c.pod_id = p.id
             ORDER BY p.created_at ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| {
                let pod = pod_from_row(row)?;
                let config = row
                    .try_get::<Option<Value>, _>("config")?
                    .map(config_from_value)
                    .transpose()?;
                Ok(ReconcilablePod { pod, config })
            })
            .collect()
    }

    async fn subdomain_exists(&self, subdomain: &str) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT 1 FROM pods WHERE subdomain = $1")
            .bind(subdomain)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn status_changes_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<PodStatusRecord>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM pod_status WHERE updated_at >= $1 ORDER BY updated_at ASC",
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(status_from_row).collect()
    }

    async fn list_events(&self, id: &PodId, limit: i64) -> Result<Vec<PodEvent>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM pod_events WHERE pod_id = $1 ORDER BY id DESC LIMIT $2",
        )
        .bind(*id.as_uuid())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(event_from_row).collect()
    }
}
