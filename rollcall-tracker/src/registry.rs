//! Identity registry
//!
//! Maps a person's name to a stable id derived from the name itself:
//! `USR` followed by the leading hex digits of the SHA-256 of the trimmed
//! name. The same name always yields the same id, across restarts and
//! across machines. In the unlikely event that two names share a prefix,
//! the later one gets a longer slice of its digest.
//!
//! The durable table is the source of truth; an in-memory map in front of
//! it saves a query per recognition event.

use crate::db::identities;
use crate::error::{Error, Result};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::Mutex;
use tracing::{info, warn};

const ID_PREFIX: &str = "USR";

/// Hex digits of the digest used for a fresh id
const BASE_ID_DIGITS: usize = 8;

/// An enrolled person
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub name: String,
    pub id: String,
    /// When the name was first seen; `None` if the stored value is unreadable
    pub enrolled_at: Option<NaiveDateTime>,
}

/// Candidate id for `name` using `digits` hex digits of its digest
fn id_with_digits(name: &str, digits: usize) -> String {
    let digest = format!("{:X}", Sha256::digest(name.trim().as_bytes()));
    let digits = digits.min(digest.len());
    format!("{}{}", ID_PREFIX, &digest[..digits])
}

/// Deterministic id for a name, before any collision handling
pub fn derive_id(name: &str) -> String {
    id_with_digits(name, BASE_ID_DIGITS)
}

/// Name to id directory backed by the `identities` table
#[derive(Debug)]
pub struct IdentityRegistry {
    pool: SqlitePool,
    by_name: RwLock<HashMap<String, Identity>>,
    allocation: Mutex<()>,
}

impl IdentityRegistry {
    /// Load every known identity from the database
    pub async fn open(pool: SqlitePool) -> Result<Self> {
        let known = identities::list(&pool).await?;
        info!("Loaded {} enrolled identities", known.len());
        let by_name = known
            .into_iter()
            .map(|identity| (identity.name.clone(), identity))
            .collect();
        Ok(Self {
            pool,
            by_name: RwLock::new(by_name),
            allocation: Mutex::new(()),
        })
    }

    fn cache(&self) -> RwLockReadGuard<'_, HashMap<String, Identity>> {
        self.by_name.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn cache_mut(&self) -> RwLockWriteGuard<'_, HashMap<String, Identity>> {
        self.by_name.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Return the identity for `name`, enrolling it if unseen
    pub async fn resolve(&self, name: &str, enrolled_at: NaiveDateTime) -> Result<Identity> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidInput("identity name is empty".to_string()));
        }

        if let Some(identity) = self.cache().get(name) {
            return Ok(identity.clone());
        }

        // Serialize allocation so two producers enrolling the same new
        // name cannot race each other through the collision loop
        let _allocating = self.allocation.lock().await;
        if let Some(identity) = self.cache().get(name) {
            return Ok(identity.clone());
        }

        let identity = self.enroll(name, enrolled_at).await?;
        self.cache_mut().insert(identity.name.clone(), identity.clone());
        Ok(identity)
    }

    async fn enroll(&self, name: &str, enrolled_at: NaiveDateTime) -> Result<Identity> {
        // Another process sharing the database may have enrolled it already
        if let Some(existing) = identities::find_by_name(&self.pool, name).await? {
            return Ok(existing);
        }

        for digits in (BASE_ID_DIGITS..=64).step_by(4) {
            let candidate = Identity {
                name: name.to_string(),
                id: id_with_digits(name, digits),
                enrolled_at: Some(enrolled_at),
            };
            identities::insert_if_free(&self.pool, &candidate).await?;

            // Either our row or a concurrent writer's row for this name
            if let Some(stored) = identities::find_by_name(&self.pool, name).await? {
                if stored.id == candidate.id {
                    info!(name, id = %stored.id, "Enrolled new identity");
                }
                return Ok(stored);
            }
            warn!(name, id = %candidate.id, "Identity id collision, extending id");
        }

        Err(Error::InvalidInput(format!(
            "no free identity id for '{}'",
            name
        )))
    }

    /// Identity for `name` if enrolled
    pub async fn lookup(&self, name: &str) -> Result<Option<Identity>> {
        let name = name.trim();
        if let Some(identity) = self.cache().get(name) {
            return Ok(Some(identity.clone()));
        }
        let found = identities::find_by_name(&self.pool, name).await?;
        if let Some(identity) = &found {
            self.cache_mut().insert(identity.name.clone(), identity.clone());
        }
        Ok(found)
    }

    /// Identity holding `id`, if any
    pub async fn lookup_id(&self, id: &str) -> Result<Option<Identity>> {
        if let Some(identity) = self.cache().values().find(|identity| identity.id == id) {
            return Ok(Some(identity.clone()));
        }
        identities::find_by_id(&self.pool, id).await
    }

    /// Every enrolled identity, sorted by name
    pub async fn list(&self) -> Result<Vec<Identity>> {
        identities::list(&self.pool).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_schema;
    use chrono::NaiveDate;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        create_schema(&pool).await.unwrap();
        pool
    }

    fn enrolled() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 12, 2)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_derive_id_shape() {
        let id = derive_id("Alice");
        assert_eq!(id.len(), 3 + BASE_ID_DIGITS);
        assert!(id.starts_with("USR"));
        assert!(id[3..].chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
        assert_eq!(derive_id("Alice"), derive_id("  Alice "));
        assert_ne!(derive_id("Alice"), derive_id("Bob"));
    }

    #[test]
    fn test_longer_ids_extend_the_base_id() {
        let base = derive_id("Alice");
        let longer = id_with_digits("Alice", 12);
        assert!(longer.starts_with(&base));
        assert_eq!(longer.len(), base.len() + 4);
    }

    #[tokio::test]
    async fn test_resolve_is_stable() {
        let registry = IdentityRegistry::open(memory_pool().await).await.unwrap();
        let first = registry.resolve("Alice", enrolled()).await.unwrap();
        let second = registry.resolve(" Alice", enrolled()).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.id, derive_id("Alice"));
        assert_eq!(first.enrolled_at, Some(enrolled()));
    }

    #[tokio::test]
    async fn test_resolve_rejects_blank_name() {
        let registry = IdentityRegistry::open(memory_pool().await).await.unwrap();
        assert!(matches!(
            registry.resolve("   ", enrolled()).await,
            Err(Error::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_id_collision_gets_longer_id() {
        let pool = memory_pool().await;
        // Squat on Bob's base id under another name
        identities::insert_if_free(
            &pool,
            &Identity {
                name: "Squatter".to_string(),
                id: derive_id("Bob"),
                enrolled_at: Some(enrolled()),
            },
        )
        .await
        .unwrap();

        let registry = IdentityRegistry::open(pool).await.unwrap();
        let bob = registry.resolve("Bob", enrolled()).await.unwrap();
        assert_eq!(bob.id, id_with_digits("Bob", 12));
        assert_eq!(registry.lookup_id(&derive_id("Bob")).await.unwrap().unwrap().name, "Squatter");
    }

    #[tokio::test]
    async fn test_lookup_and_list() {
        let registry = IdentityRegistry::open(memory_pool().await).await.unwrap();
        assert!(registry.lookup("Carol").await.unwrap().is_none());

        registry.resolve("Carol", enrolled()).await.unwrap();
        registry.resolve("Alice", enrolled()).await.unwrap();

        assert!(registry.lookup("Carol").await.unwrap().is_some());
        let names: Vec<String> = registry
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|identity| identity.name)
            .collect();
        assert_eq!(names, vec!["Alice", "Carol"]);
    }
}
