//! PostgreSQL deployment store implementation.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, QueryBuilder, Row};

use crate::config::DatabaseConfig;
use crate::error::{HubError, HubResult};
use crate::types::{
    AutoscalePolicy, DeploymentDraft, DeploymentEvent, DeploymentId, DeploymentRecord, EnvVars,
    EventId, Model, ModelId, ModelVersion, ModelVersionId, NewEvent, ResourceLimits,
    UsageCounters, UserId,
};

use super::{DeploymentFilter, DeploymentStore, ModelCatalog};

const DEPLOYMENT_COLUMNS: &str = r#"
    id, owner_id, name, description, kind, model_id, model_version_id,
    cpu_cores, memory_mb, min_replicas, max_replicas, env, health_check_path,
    autoscale_enabled, scale_up_threshold, scale_down_threshold,
    status, endpoint_url, error_message, generation,
    created_at, updated_at, deployed_at,
    request_count, avg_response_time, last_request_at, last_health_check
"#;

const EVENT_COLUMNS: &str = "id, deployment_id, level, message, component, metadata, created_at";

/// PostgreSQL-backed deployment store and model catalogue.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connect to PostgreSQL and create a new store.
    ///
    /// The required tables are created if they don't exist.
    pub async fn new(config: &DatabaseConfig) -> HubResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect(&config.url)
            .await?;

        Self::from_pool(pool).await
    }

    /// Create a store from an existing connection pool.
    pub async fn from_pool(pool: PgPool) -> HubResult<Self> {
        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    /// Ensure the required tables exist.
    async fn ensure_schema(&self) -> HubResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS models (
                id BIGSERIAL PRIMARY KEY,
                owner_id BIGINT NOT NULL,
                name TEXT NOT NULL,
                framework TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS model_versions (
                id BIGSERIAL PRIMARY KEY,
                model_id BIGINT NOT NULL REFERENCES models(id) ON DELETE CASCADE,
                version TEXT NOT NULL,
                artifact_path TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Model references carry no foreign key: a version may disappear
        // under a live deployment, which then fails on its next attempt.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS model_deployments (
                id BIGSERIAL PRIMARY KEY,
                owner_id BIGINT NOT NULL,
                name TEXT NOT NULL,
                description TEXT,
                kind TEXT NOT NULL,
                model_id BIGINT NOT NULL,
                model_version_id BIGINT NOT NULL,
                cpu_cores DOUBLE PRECISION NOT NULL,
                memory_mb INTEGER NOT NULL,
                min_replicas INTEGER NOT NULL,
                max_replicas INTEGER NOT NULL,
                env JSONB NOT NULL DEFAULT '{}'::jsonb,
                health_check_path TEXT NOT NULL,
                autoscale_enabled BOOLEAN NOT NULL,
                scale_up_threshold DOUBLE PRECISION NOT NULL,
                scale_down_threshold DOUBLE PRECISION NOT NULL,
                status TEXT NOT NULL,
                endpoint_url TEXT,
                error_message TEXT,
                generation BIGINT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL,
                deployed_at TIMESTAMPTZ,
                request_count BIGINT NOT NULL DEFAULT 0,
                avg_response_time DOUBLE PRECISION,
                last_request_at TIMESTAMPTZ,
                last_health_check TIMESTAMPTZ,
                UNIQUE (owner_id, name)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS deployment_logs (
                id BIGSERIAL PRIMARY KEY,
                deployment_id BIGINT NOT NULL
                    REFERENCES model_deployments(id) ON DELETE CASCADE,
                level TEXT NOT NULL,
                message TEXT NOT NULL,
                component TEXT NOT NULL,
                metadata JSONB NOT NULL DEFAULT '{}'::jsonb,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_model_deployments_owner_created
            ON model_deployments (owner_id, created_at DESC)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_deployment_logs_deployment_created
            ON deployment_logs (deployment_id, created_at DESC, id DESC)
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Parse a row into a DeploymentRecord.
    fn row_to_record(row: &PgRow) -> HubResult<DeploymentRecord> {
        let kind: String = row.try_get("kind")?;
        let status: String = row.try_get("status")?;
        let env: serde_json::Value = row.try_get("env")?;

        let env: EnvVars = serde_json::from_value(env)
            .map_err(|e| HubError::Serialisation(format!("failed to deserialise env: {e}")))?;

        Ok(DeploymentRecord {
            id: DeploymentId::new(row.try_get("id")?),
            owner_id: UserId::new(row.try_get("owner_id")?),
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            kind: kind.parse().map_err(HubError::Serialisation)?,
            model_id: ModelId::new(row.try_get("model_id")?),
            model_version_id: ModelVersionId::new(row.try_get("model_version_id")?),
            resources: ResourceLimits {
                cpu_cores: row.try_get("cpu_cores")?,
                memory_mb: to_u32(row.try_get("memory_mb")?)?,
                min_replicas: to_u32(row.try_get("min_replicas")?)?,
                max_replicas: to_u32(row.try_get("max_replicas")?)?,
            },
            env,
            health_check_path: row.try_get("health_check_path")?,
            autoscale: AutoscalePolicy {
                enabled: row.try_get("autoscale_enabled")?,
                scale_up_threshold: row.try_get("scale_up_threshold")?,
                scale_down_threshold: row.try_get("scale_down_threshold")?,
            },
            status: status.parse().map_err(HubError::Serialisation)?,
            endpoint_url: row.try_get("endpoint_url")?,
            error_message: row.try_get("error_message")?,
            generation: to_u64(row.try_get("generation")?)?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            deployed_at: row.try_get("deployed_at")?,
            usage: UsageCounters {
                request_count: to_u64(row.try_get("request_count")?)?,
                avg_response_time_ms: row.try_get("avg_response_time")?,
                last_request_at: row.try_get("last_request_at")?,
                last_health_check: row.try_get("last_health_check")?,
            },
        })
    }

    fn row_to_event(row: &PgRow) -> HubResult<DeploymentEvent> {
        let level: String = row.try_get("level")?;

        Ok(DeploymentEvent {
            id: EventId::new(row.try_get("id")?),
            deployment_id: DeploymentId::new(row.try_get("deployment_id")?),
            level: level.parse().map_err(HubError::Serialisation)?,
            message: row.try_get("message")?,
            component: row.try_get("component")?,
            metadata: row.try_get("metadata")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_version(row: &PgRow) -> HubResult<ModelVersion> {
        Ok(ModelVersion {
            id: ModelVersionId::new(row.try_get("id")?),
            model_id: ModelId::new(row.try_get("model_id")?),
            version: row.try_get("version")?,
            artifact_path: row.try_get("artifact_path")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

fn to_u32(value: i32) -> HubResult<u32> {
    u32::try_from(value)
        .map_err(|_| HubError::Serialisation(format!("negative value {value} in column")))
}

fn to_u64(value: i64) -> HubResult<u64> {
    u64::try_from(value)
        .map_err(|_| HubError::Serialisation(format!("negative value {value} in column")))
}

fn to_i32(value: u32) -> HubResult<i32> {
    i32::try_from(value).map_err(|_| HubError::validation(format!("value {value} out of range")))
}

fn to_i64(value: u64) -> HubResult<i64> {
    i64::try_from(value).map_err(|_| HubError::validation(format!("value {value} out of range")))
}

fn env_json(env: &EnvVars) -> HubResult<serde_json::Value> {
    serde_json::to_value(env)
        .map_err(|e| HubError::Serialisation(format!("failed to serialise env: {e}")))
}

/// Map unique violations on `(owner_id, name)` to a conflict.
fn map_name_conflict(err: sqlx::Error, name: &str) -> HubError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            HubError::conflict(format!("deployment name '{name}' already exists"))
        }
        _ => HubError::Database(err),
    }
}

#[async_trait]
impl DeploymentStore for PostgresStore {
    async fn insert(&self, draft: &DeploymentDraft) -> HubResult<DeploymentRecord> {
        let spec = &draft.spec;
        let created_at: DateTime<Utc> = draft.created_at;

        let row = sqlx::query(
            r#"
            INSERT INTO model_deployments (
                owner_id, name, description, kind, model_id, model_version_id,
                cpu_cores, memory_mb, min_replicas, max_replicas, env, health_check_path,
                autoscale_enabled, scale_up_threshold, scale_down_threshold,
                status, generation, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15,
                    'pending', 1, $16, $16)
            RETURNING id
            "#,
        )
        .bind(draft.owner_id.get())
        .bind(&spec.name)
        .bind(&spec.description)
        .bind(spec.kind.as_str())
        .bind(spec.model_id.get())
        .bind(draft.model_version_id.get())
        .bind(spec.resources.cpu_cores)
        .bind(to_i32(spec.resources.memory_mb)?)
        .bind(to_i32(spec.resources.min_replicas)?)
        .bind(to_i32(spec.resources.max_replicas)?)
        .bind(env_json(&spec.env)?)
        .bind(&spec.health_check_path)
        .bind(spec.autoscale.enabled)
        .bind(spec.autoscale.scale_up_threshold)
        .bind(spec.autoscale.scale_down_threshold)
        .bind(created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_name_conflict(e, &spec.name))?;

        let id = DeploymentId::new(row.try_get("id")?);
        Ok(draft.clone().into_record(id))
    }

    async fn get(&self, id: DeploymentId) -> HubResult<Option<DeploymentRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {DEPLOYMENT_COLUMNS} FROM model_deployments WHERE id = $1"
        ))
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_record).transpose()
    }

    async fn update(&self, record: &DeploymentRecord) -> HubResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE model_deployments SET
                name = $2, description = $3, kind = $4, model_id = $5, model_version_id = $6,
                cpu_cores = $7, memory_mb = $8, min_replicas = $9, max_replicas = $10,
                env = $11, health_check_path = $12,
                autoscale_enabled = $13, scale_up_threshold = $14, scale_down_threshold = $15,
                status = $16, endpoint_url = $17, error_message = $18, generation = $19,
                updated_at = $20, deployed_at = $21,
                request_count = $22, avg_response_time = $23,
                last_request_at = $24, last_health_check = $25
            WHERE id = $1
            "#,
        )
        .bind(record.id.get())
        .bind(&record.name)
        .bind(&record.description)
        .bind(record.kind.as_str())
        .bind(record.model_id.get())
        .bind(record.model_version_id.get())
        .bind(record.resources.cpu_cores)
        .bind(to_i32(record.resources.memory_mb)?)
        .bind(to_i32(record.resources.min_replicas)?)
        .bind(to_i32(record.resources.max_replicas)?)
        .bind(env_json(&record.env)?)
        .bind(&record.health_check_path)
        .bind(record.autoscale.enabled)
        .bind(record.autoscale.scale_up_threshold)
        .bind(record.autoscale.scale_down_threshold)
        .bind(record.status.as_str())
        .bind(&record.endpoint_url)
        .bind(&record.error_message)
        .bind(to_i64(record.generation)?)
        .bind(record.updated_at)
        .bind(record.deployed_at)
        .bind(to_i64(record.usage.request_count)?)
        .bind(record.usage.avg_response_time_ms)
        .bind(record.usage.last_request_at)
        .bind(record.usage.last_health_check)
        .execute(&self.pool)
        .await
        .map_err(|e| map_name_conflict(e, &record.name))?;

        if result.rows_affected() == 0 {
            return Err(HubError::not_found(format!("deployment {}", record.id)));
        }

        Ok(())
    }

    async fn delete(&self, id: DeploymentId) -> HubResult<()> {
        let result = sqlx::query("DELETE FROM model_deployments WHERE id = $1")
            .bind(id.get())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(HubError::not_found(format!("deployment {id}")));
        }

        Ok(())
    }

    async fn list(&self, filter: &DeploymentFilter) -> HubResult<Vec<DeploymentRecord>> {
        let mut query: QueryBuilder<'_, Postgres> = QueryBuilder::new(format!(
            "SELECT {DEPLOYMENT_COLUMNS} FROM model_deployments WHERE 1=1"
        ));

        if let Some(owner_id) = filter.owner_id {
            query.push(" AND owner_id = ").push_bind(owner_id.get());
        }

        if let Some(status) = filter.status {
            query.push(" AND status = ").push_bind(status.as_str());
        }

        query.push(" ORDER BY created_at DESC, id DESC");

        if let Some(limit) = filter.limit {
            query.push(" LIMIT ").push_bind(i64::from(limit));
        }

        if let Some(offset) = filter.offset {
            query.push(" OFFSET ").push_bind(i64::from(offset));
        }

        let rows = query.build().fetch_all(&self.pool).await?;

        rows.iter().map(Self::row_to_record).collect()
    }

    async fn append_event(&self, event: &NewEvent) -> HubResult<DeploymentEvent> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO deployment_logs (deployment_id, level, message, component, metadata)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {EVENT_COLUMNS}
            "#
        ))
        .bind(event.deployment_id.get())
        .bind(event.level.as_str())
        .bind(&event.message)
        .bind(&event.component)
        .bind(&event.metadata)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
                HubError::not_found(format!("deployment {}", event.deployment_id))
            }
            _ => HubError::Database(e),
        })?;

        Self::row_to_event(&row)
    }

    async fn list_events(
        &self,
        id: DeploymentId,
        limit: u32,
    ) -> HubResult<Vec<DeploymentEvent>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {EVENT_COLUMNS}
            FROM deployment_logs
            WHERE deployment_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2
            "#
        ))
        .bind(id.get())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_event).collect()
    }

    async fn ping(&self) -> HubResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl ModelCatalog for PostgresStore {
    async fn get_model(&self, id: ModelId) -> HubResult<Option<Model>> {
        let row = sqlx::query("SELECT id, owner_id, name, framework FROM models WHERE id = $1")
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| -> HubResult<Model> {
            Ok(Model {
                id: ModelId::new(row.try_get("id")?),
                owner_id: UserId::new(row.try_get("owner_id")?),
                name: row.try_get("name")?,
                framework: row.try_get("framework")?,
            })
        })
        .transpose()
    }

    async fn get_version(&self, id: ModelVersionId) -> HubResult<Option<ModelVersion>> {
        let row = sqlx::query(
            r#"
            SELECT id, model_id, version, artifact_path, created_at
            FROM model_versions
            WHERE id = $1
            "#,
        )
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_version).transpose()
    }

    async fn latest_version(&self, model_id: ModelId) -> HubResult<Option<ModelVersion>> {
        let row = sqlx::query(
            r#"
            SELECT id, model_id, version, artifact_path, created_at
            FROM model_versions
            WHERE model_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(model_id.get())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_version).transpose()
    }
}

impl std::fmt::Debug for PostgresStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresStore").finish_non_exhaustive()
    }
}
