//! Durable, namespaced result cache on a local SQLite file.
//!
//! Every entry is addressed by `(namespace, key)`: post summaries by post id,
//! discussion aggregates and fetched post lists by request fingerprint. Reads
//! never fail the caller: a missing, stale, version-mismatched or corrupt
//! entry is a miss. Writes are single-statement upserts, so concurrent writers
//! to the same key resolve as last-write-wins.

use chrono::{DateTime, TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use snooze_core::{
    CacheError, CoreError, DiscussionSummary, PostSummary, RedditPost, RequestFingerprint,
};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

#[cfg(test)]
mod tests;

/// Version of the stored payload layout. Entries written under another
/// version are treated as misses.
pub const SCHEMA_VERSION: i64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheNamespace {
    PostSummary,
    Discussion,
    Posts,
}

impl CacheNamespace {
    pub const ALL: [CacheNamespace; 3] = [
        CacheNamespace::PostSummary,
        CacheNamespace::Discussion,
        CacheNamespace::Posts,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CacheNamespace::PostSummary => "post_summary",
            CacheNamespace::Discussion => "discussion",
            CacheNamespace::Posts => "posts",
        }
    }

    /// Accepts both singular and plural category names.
    pub fn parse(name: &str) -> Result<Self, CacheError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "post_summary" | "post_summaries" | "summaries" => Ok(CacheNamespace::PostSummary),
            "discussion" | "discussions" => Ok(CacheNamespace::Discussion),
            "posts" | "post" => Ok(CacheNamespace::Posts),
            _ => Err(CacheError::UnknownNamespace {
                name: name.to_string(),
            }),
        }
    }
}

impl fmt::Display for CacheNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamespaceStats {
    pub namespace: CacheNamespace,
    pub entry_count: u64,
    pub payload_bytes: u64,
    pub oldest: Option<DateTime<Utc>>,
    pub newest: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub namespaces: Vec<NamespaceStats>,
}

impl CacheStats {
    pub fn get(&self, namespace: CacheNamespace) -> Option<&NamespaceStats> {
        self.namespaces.iter().find(|s| s.namespace == namespace)
    }

    pub fn total_entries(&self) -> u64 {
        self.namespaces.iter().map(|s| s.entry_count).sum()
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn millis_to_datetime(millis: Option<i64>) -> Option<DateTime<Utc>> {
    millis.and_then(|m| Utc.timestamp_millis_opt(m).single())
}

#[derive(Debug, Clone)]
pub struct CacheStore {
    pub(crate) pool: SqlitePool,
    database_url: String,
}

impl CacheStore {
    /// Open (creating if needed) the cache database and apply migrations.
    pub async fn open(database_url: &str) -> Result<Self, CoreError> {
        let store = Self::connect(database_url).await?;
        store.run_migrations().await?;
        Ok(store)
    }

    /// Private in-memory cache, mostly useful for tests and dry runs.
    pub async fn in_memory() -> Result<Self, CoreError> {
        Self::open("sqlite::memory:").await
    }

    pub async fn connect(database_url: &str) -> Result<Self, CoreError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| CacheError::ConnectionFailed {
                reason: format!("invalid database url '{}': {}", database_url, e),
            })?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let filename = options.clone().get_filename().to_path_buf();
        let in_memory = database_url.contains(":memory:") || filename.as_os_str().is_empty();

        if !in_memory {
            if let Some(parent) = filename.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        // An in-memory database lives only as long as its single connection.
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(8)
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| CacheError::ConnectionFailed {
                reason: e.to_string(),
            })?;

        info!("Opened cache store at {}", database_url);
        Ok(Self {
            pool,
            database_url: database_url.to_string(),
        })
    }

    pub async fn run_migrations(&self) -> Result<(), CoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| CacheError::MigrationFailed {
                migration: e.to_string(),
            })?;
        debug!("Cache migrations applied");
        Ok(())
    }

    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Read an entry. Any failure is logged and reported as a miss.
    pub async fn get<T: DeserializeOwned>(
        &self,
        namespace: CacheNamespace,
        key: &str,
        max_age: Option<Duration>,
    ) -> Option<T> {
        match self.try_get(namespace, key, max_age).await {
            Ok(value) => value,
            Err(e) => {
                warn!("Treating cache entry {}/{} as a miss: {}", namespace, key, e);
                None
            }
        }
    }

    /// Read an entry, distinguishing a clean miss from an unreadable entry.
    pub async fn try_get<T: DeserializeOwned>(
        &self,
        namespace: CacheNamespace,
        key: &str,
        max_age: Option<Duration>,
    ) -> Result<Option<T>, CacheError> {
        let row = sqlx::query(
            "SELECT payload, schema_version, updated_at FROM cache_entries
             WHERE namespace = ? AND cache_key = ?",
        )
        .bind(namespace.as_str())
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let schema_version: i64 = row.try_get("schema_version")?;
        if schema_version != SCHEMA_VERSION {
            debug!(
                "Cache entry {}/{} has schema version {}, expected {}",
                namespace, key, schema_version, SCHEMA_VERSION
            );
            return Ok(None);
        }

        if let Some(max_age) = max_age {
            let updated_at: i64 = row.try_get("updated_at")?;
            let age_ms = now_millis().saturating_sub(updated_at);
            if age_ms > i64::try_from(max_age.as_millis()).unwrap_or(i64::MAX) {
                debug!("Cache entry {}/{} is stale ({} ms old)", namespace, key, age_ms);
                return Ok(None);
            }
        }

        let payload: String = row.try_get("payload")?;
        serde_json::from_str(&payload)
            .map(Some)
            .map_err(|e| CacheError::CorruptEntry {
                namespace: namespace.to_string(),
                key: key.to_string(),
                reason: e.to_string(),
            })
    }

    /// Durably write an entry, replacing any previous value under the same key.
    pub async fn put<T: Serialize + ?Sized>(
        &self,
        namespace: CacheNamespace,
        key: &str,
        value: &T,
    ) -> Result<(), CoreError> {
        let payload = serde_json::to_string(value)?;

        sqlx::query(
            "INSERT INTO cache_entries (namespace, cache_key, payload, schema_version, updated_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT (namespace, cache_key) DO UPDATE SET
                 payload = excluded.payload,
                 schema_version = excluded.schema_version,
                 updated_at = excluded.updated_at",
        )
        .bind(namespace.as_str())
        .bind(key)
        .bind(&payload)
        .bind(SCHEMA_VERSION)
        .bind(now_millis())
        .execute(&self.pool)
        .await
        .map_err(CacheError::from)?;

        debug!("Cached {}/{} ({} bytes)", namespace, key, payload.len());
        Ok(())
    }

    pub async fn remove(&self, namespace: CacheNamespace, key: &str) -> Result<bool, CoreError> {
        let result = sqlx::query("DELETE FROM cache_entries WHERE namespace = ? AND cache_key = ?")
            .bind(namespace.as_str())
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(CacheError::from)?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete entries, optionally restricted to one namespace and/or to
    /// entries older than `older_than`. Returns the number removed.
    pub async fn clear(
        &self,
        namespace: Option<CacheNamespace>,
        older_than: Option<Duration>,
    ) -> Result<u64, CoreError> {
        let cutoff = older_than.map(|age| {
            now_millis().saturating_sub(i64::try_from(age.as_millis()).unwrap_or(i64::MAX))
        });

        let result = match (namespace, cutoff) {
            (Some(ns), Some(cutoff)) => {
                sqlx::query("DELETE FROM cache_entries WHERE namespace = ? AND updated_at < ?")
                    .bind(ns.as_str())
                    .bind(cutoff)
                    .execute(&self.pool)
                    .await
            }
            (Some(ns), None) => {
                sqlx::query("DELETE FROM cache_entries WHERE namespace = ?")
                    .bind(ns.as_str())
                    .execute(&self.pool)
                    .await
            }
            (None, Some(cutoff)) => {
                sqlx::query("DELETE FROM cache_entries WHERE updated_at < ?")
                    .bind(cutoff)
                    .execute(&self.pool)
                    .await
            }
            (None, None) => {
                sqlx::query("DELETE FROM cache_entries")
                    .execute(&self.pool)
                    .await
            }
        }
        .map_err(CacheError::from)?;

        let removed = result.rows_affected();
        info!("Cleared {} cache entries", removed);
        Ok(removed)
    }

    pub async fn stats(&self) -> Result<CacheStats, CoreError> {
        let rows = sqlx::query(
            "SELECT namespace,
                    COUNT(*) AS entry_count,
                    COALESCE(SUM(LENGTH(payload)), 0) AS payload_bytes,
                    MIN(updated_at) AS oldest,
                    MAX(updated_at) AS newest
             FROM cache_entries
             GROUP BY namespace",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(CacheError::from)?;

        let mut namespaces: Vec<NamespaceStats> = CacheNamespace::ALL
            .iter()
            .map(|ns| NamespaceStats {
                namespace: *ns,
                entry_count: 0,
                payload_bytes: 0,
                oldest: None,
                newest: None,
            })
            .collect();

        for row in rows {
            let name: String = row.try_get("namespace").map_err(CacheError::from)?;
            let Ok(namespace) = CacheNamespace::parse(&name) else {
                warn!("Ignoring entries in unknown cache namespace '{}'", name);
                continue;
            };
            let entry_count: i64 = row.try_get("entry_count").map_err(CacheError::from)?;
            let payload_bytes: i64 = row.try_get("payload_bytes").map_err(CacheError::from)?;
            let oldest: Option<i64> = row.try_get("oldest").map_err(CacheError::from)?;
            let newest: Option<i64> = row.try_get("newest").map_err(CacheError::from)?;

            if let Some(stats) = namespaces.iter_mut().find(|s| s.namespace == namespace) {
                stats.entry_count = entry_count.max(0) as u64;
                stats.payload_bytes = payload_bytes.max(0) as u64;
                stats.oldest = millis_to_datetime(oldest);
                stats.newest = millis_to_datetime(newest);
            }
        }

        Ok(CacheStats { namespaces })
    }

    pub async fn get_post_summary(
        &self,
        post_id: &str,
        max_age: Option<Duration>,
    ) -> Option<PostSummary> {
        self.get(CacheNamespace::PostSummary, post_id, max_age).await
    }

    pub async fn put_post_summary(&self, summary: &PostSummary) -> Result<(), CoreError> {
        self.put(CacheNamespace::PostSummary, &summary.post_id, summary)
            .await
    }

    pub async fn get_discussion(
        &self,
        key: &RequestFingerprint,
        max_age: Option<Duration>,
    ) -> Option<DiscussionSummary> {
        self.get(CacheNamespace::Discussion, key.as_str(), max_age)
            .await
    }

    pub async fn put_discussion(
        &self,
        key: &RequestFingerprint,
        discussion: &DiscussionSummary,
    ) -> Result<(), CoreError> {
        self.put(CacheNamespace::Discussion, key.as_str(), discussion)
            .await
    }

    pub async fn get_posts(
        &self,
        key: &RequestFingerprint,
        max_age: Option<Duration>,
    ) -> Option<Vec<RedditPost>> {
        self.get(CacheNamespace::Posts, key.as_str(), max_age).await
    }

    pub async fn put_posts(
        &self,
        key: &RequestFingerprint,
        posts: &[RedditPost],
    ) -> Result<(), CoreError> {
        self.put(CacheNamespace::Posts, key.as_str(), posts).await
    }
}
