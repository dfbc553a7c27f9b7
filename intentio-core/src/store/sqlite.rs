//! SQLite-backed personalization store.
//!
//! Durable drop-in for [`MemoryStore`](crate::store::MemoryStore) behind the
//! same trait. Sample vectors and profile payloads are stored as JSON text
//! columns; `train`'s readiness check and profile install run inside one
//! transaction, which is this backend's critical section.
//!
//! A single connection guards all access, so cross-user writes serialise at
//! the database — the per-user-parallelism guarantee belongs to the default
//! in-memory backend, and deployments pick their trade-off here.

use std::collections::HashMap;
use std::path::Path;

use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info, warn};

use crate::error::{IntentioError, Result};
use crate::features::{centroid, FeatureVector};
use crate::store::{
    derive_state, gate_satisfied, OnboardingState, PersonalizationStore, PersonalizedProfile,
    MIN_SAMPLES_PER_INTENT,
};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS onboarding_samples (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    label TEXT NOT NULL,
    features TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_samples_user_label
    ON onboarding_samples(user_id, label);
CREATE TABLE IF NOT EXISTS personalization_profiles (
    user_id TEXT PRIMARY KEY,
    payload TEXT NOT NULL,
    trained_at TEXT NOT NULL
);
";

fn storage_err(e: impl std::fmt::Display) -> IntentioError {
    IntentioError::Storage(e.to_string())
}

/// Durable `PersonalizationStore` over a SQLite database.
pub struct SqliteStore {
    min_samples: usize,
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (and initialise) a store at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(storage_err)?;
        conn.execute_batch(SCHEMA).map_err(storage_err)?;
        info!(path = %path.display(), "sqlite personalization store opened");
        Ok(Self {
            min_samples: MIN_SAMPLES_PER_INTENT,
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database — used by tests and ephemeral deployments.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(storage_err)?;
        conn.execute_batch(SCHEMA).map_err(storage_err)?;
        Ok(Self {
            min_samples: MIN_SAMPLES_PER_INTENT,
            conn: Mutex::new(conn),
        })
    }

    fn counts_for(conn: &Connection, user_id: &str) -> Result<HashMap<String, usize>> {
        let mut stmt = conn
            .prepare(
                "SELECT label, COUNT(*) FROM onboarding_samples
                 WHERE user_id = ?1 GROUP BY label",
            )
            .map_err(storage_err)?;
        let rows = stmt
            .query_map(params![user_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })
            .map_err(storage_err)?;

        let mut counts = HashMap::new();
        for row in rows {
            let (label, n) = row.map_err(storage_err)?;
            counts.insert(label, n.max(0) as usize);
        }
        Ok(counts)
    }

    fn samples_for(
        conn: &Connection,
        user_id: &str,
        label: &str,
    ) -> Result<Vec<FeatureVector>> {
        let mut stmt = conn
            .prepare(
                "SELECT features FROM onboarding_samples
                 WHERE user_id = ?1 AND label = ?2 ORDER BY id",
            )
            .map_err(storage_err)?;
        let rows = stmt
            .query_map(params![user_id, label], |row| row.get::<_, String>(0))
            .map_err(storage_err)?;

        let mut samples = Vec::new();
        for row in rows {
            let json = row.map_err(storage_err)?;
            samples.push(serde_json::from_str(&json).map_err(storage_err)?);
        }
        Ok(samples)
    }

    fn profile_row(conn: &Connection, user_id: &str) -> Result<Option<PersonalizedProfile>> {
        let payload: Option<String> = conn
            .query_row(
                "SELECT payload FROM personalization_profiles WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(storage_err)?;

        payload
            .map(|json| serde_json::from_str(&json).map_err(storage_err))
            .transpose()
    }
}

impl PersonalizationStore for SqliteStore {
    fn add_sample(&self, user_id: &str, label: &str, features: &FeatureVector) -> Result<usize> {
        let conn = self.conn.lock();
        let json = serde_json::to_string(features).map_err(storage_err)?;
        conn.execute(
            "INSERT INTO onboarding_samples (user_id, label, features, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![user_id, label, json, Utc::now().to_rfc3339()],
        )
        .map_err(storage_err)?;

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM onboarding_samples WHERE user_id = ?1 AND label = ?2",
                params![user_id, label],
                |row| row.get(0),
            )
            .map_err(storage_err)?;
        debug!(user_id, label, count, "onboarding sample persisted");
        Ok(count.max(0) as usize)
    }

    fn sample_count(&self, user_id: &str, label: &str) -> Result<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM onboarding_samples WHERE user_id = ?1 AND label = ?2",
                params![user_id, label],
                |row| row.get(0),
            )
            .map_err(storage_err)?;
        Ok(count.max(0) as usize)
    }

    fn train(&self, user_id: &str) -> Result<bool> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(storage_err)?;

        let counts = Self::counts_for(&tx, user_id)?;
        if !gate_satisfied(&counts, self.min_samples) {
            warn!(
                user_id,
                min_samples = self.min_samples,
                ?counts,
                "training gate not satisfied"
            );
            return Ok(false);
        }

        let mut centroids = HashMap::new();
        for label in counts.keys() {
            let samples = Self::samples_for(&tx, user_id, label)?;
            centroids.insert(label.clone(), centroid(&samples));
        }

        let mut trained_intents: Vec<String> = counts.keys().cloned().collect();
        trained_intents.sort();
        let total_samples = counts.values().sum();
        let trained_at = Utc::now();

        let profile = PersonalizedProfile {
            user_id: user_id.to_string(),
            trained_intents,
            total_samples,
            trained_at,
            centroids,
        };
        let payload = serde_json::to_string(&profile).map_err(storage_err)?;
        tx.execute(
            "INSERT OR REPLACE INTO personalization_profiles (user_id, payload, trained_at)
             VALUES (?1, ?2, ?3)",
            params![user_id, payload, trained_at.to_rfc3339()],
        )
        .map_err(storage_err)?;
        tx.commit().map_err(storage_err)?;

        info!(user_id, total_samples, "personalized profile trained");
        Ok(true)
    }

    fn is_onboarded(&self, user_id: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM personalization_profiles WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(storage_err)?;
        Ok(found.is_some())
    }

    fn profile(&self, user_id: &str) -> Result<Option<PersonalizedProfile>> {
        let conn = self.conn.lock();
        Self::profile_row(&conn, user_id)
    }

    fn onboarding_state(&self, user_id: &str) -> Result<OnboardingState> {
        let conn = self.conn.lock();
        let counts = Self::counts_for(&conn, user_id)?;
        let has_profile = Self::profile_row(&conn, user_id)?.is_some();
        Ok(derive_state(&counts, has_profile, self.min_samples))
    }
}
