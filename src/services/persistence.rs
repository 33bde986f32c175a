//! Persistence Gateway
//!
//! External key-value collaborator holding durable agent records, keyed by
//! agent id with a secondary index by signer. Persistence is best-effort:
//! the in-memory registry never fails a request because a write here failed,
//! and a fully offline deployment still serves the core agent set.

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use thiserror::Error;

use crate::models::AgentProfile;

/// Errors surfaced by a persistence backend
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Durable store for agent profiles: get/put/scan by agent id, scan by signer
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<AgentProfile>, PersistenceError>;
    async fn put(&self, profile: &AgentProfile) -> Result<(), PersistenceError>;
    async fn scan(&self) -> Result<Vec<AgentProfile>, PersistenceError>;
    async fn scan_by_signer(&self, signer: &str) -> Result<Vec<AgentProfile>, PersistenceError>;
}

/// Postgres-backed gateway storing profiles as JSONB documents
#[derive(Debug, Clone)]
pub struct PostgresGateway {
    pool: PgPool,
}

impl PostgresGateway {
    /// Connect and ensure the backing table exists
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, PersistenceError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS agent_profiles (
                agent_id TEXT PRIMARY KEY,
                signer TEXT NOT NULL,
                profile JSONB NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_agent_profiles_signer ON agent_profiles (signer)",
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool })
    }

    fn decode_row(row: &sqlx::postgres::PgRow) -> Result<AgentProfile, PersistenceError> {
        let value: serde_json::Value = row.get("profile");
        Ok(serde_json::from_value(value)?)
    }
}

#[async_trait]
impl PersistenceGateway for PostgresGateway {
    async fn get(&self, id: &str) -> Result<Option<AgentProfile>, PersistenceError> {
        let row = sqlx::query("SELECT profile FROM agent_profiles WHERE agent_id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::decode_row).transpose()
    }

    async fn put(&self, profile: &AgentProfile) -> Result<(), PersistenceError> {
        let value = serde_json::to_value(profile)?;
        sqlx::query(
            r#"
            INSERT INTO agent_profiles (agent_id, signer, profile, updated_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (agent_id)
            DO UPDATE SET signer = EXCLUDED.signer, profile = EXCLUDED.profile, updated_at = NOW()
            "#,
        )
        .bind(&profile.id)
        .bind(&profile.signer)
        .bind(value)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn scan(&self) -> Result<Vec<AgentProfile>, PersistenceError> {
        let rows = sqlx::query("SELECT profile FROM agent_profiles ORDER BY agent_id")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::decode_row).collect()
    }

    async fn scan_by_signer(&self, signer: &str) -> Result<Vec<AgentProfile>, PersistenceError> {
        let rows =
            sqlx::query("SELECT profile FROM agent_profiles WHERE signer = $1 ORDER BY agent_id")
                .bind(signer)
                .fetch_all(&self.pool)
                .await?;

        rows.iter().map(Self::decode_row).collect()
    }
}

/// No-op gateway for in-memory-only deployments
#[derive(Debug, Clone, Default)]
pub struct NullGateway;

#[async_trait]
impl PersistenceGateway for NullGateway {
    async fn get(&self, _id: &str) -> Result<Option<AgentProfile>, PersistenceError> {
        Ok(None)
    }

    async fn put(&self, _profile: &AgentProfile) -> Result<(), PersistenceError> {
        Ok(())
    }

    async fn scan(&self) -> Result<Vec<AgentProfile>, PersistenceError> {
        Ok(Vec::new())
    }

    async fn scan_by_signer(&self, _signer: &str) -> Result<Vec<AgentProfile>, PersistenceError> {
        Ok(Vec::new())
    }
}

/// In-memory gateway used by tests exercising hydration and write-through
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub struct MemoryGateway {
    records: std::sync::Arc<tokio::sync::RwLock<std::collections::HashMap<String, AgentProfile>>>,
}

#[cfg(test)]
#[async_trait]
impl PersistenceGateway for MemoryGateway {
    async fn get(&self, id: &str) -> Result<Option<AgentProfile>, PersistenceError> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn put(&self, profile: &AgentProfile) -> Result<(), PersistenceError> {
        self.records
            .write()
            .await
            .insert(profile.id.clone(), profile.clone());
        Ok(())
    }

    async fn scan(&self) -> Result<Vec<AgentProfile>, PersistenceError> {
        let mut profiles: Vec<AgentProfile> = self.records.read().await.values().cloned().collect();
        profiles.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(profiles)
    }

    async fn scan_by_signer(&self, signer: &str) -> Result<Vec<AgentProfile>, PersistenceError> {
        let mut profiles: Vec<AgentProfile> = self
            .records
            .read()
            .await
            .values()
            .filter(|p| p.signer == signer)
            .cloned()
            .collect();
        profiles.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(profiles)
    }
}
