/// User directory service
///
/// Email and uid lookups are cached for a short TTL because the same
/// profiles are resolved over and over while rendering team views.
/// Misses are cached too (negative caching) so a burst of lookups for
/// an unregistered email costs one query, not one per lookup.
///
/// # Example
///
/// ```no_run
/// # use std::sync::Arc;
/// # use std::time::Duration;
/// # use synchro_core::services::UserDirectory;
/// # use synchro_core::store::memory::MemoryStore;
/// # async fn demo() {
/// let store = Arc::new(MemoryStore::new());
/// let directory = UserDirectory::with_cache_ttl(store, Duration::from_secs(60));
/// let user = directory.find_by_email("alice@example.com").await;
/// # }
/// ```

use std::sync::Arc;
use std::time::Duration;

use crate::cache::{CacheStats, TimedCache};
use crate::entities::{AuthIdentity, User};
use crate::error::CoreResult;
use crate::store::{collections, DocumentStore, Filter, Query};

/// Default time-to-live for directory cache entries.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// Directory of user profiles with a TTL cache in front.
pub struct UserDirectory {
    store: Arc<dyn DocumentStore>,
    /// Keyed by normalized email or by uid; `None` is a cached miss.
    cache: TimedCache<String, Option<User>>,
}

impl UserDirectory {
    /// Creates a directory with the default cache TTL.
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self::with_cache_ttl(store, DEFAULT_CACHE_TTL)
    }

    /// Creates a directory with an explicit cache TTL. Tests pass a
    /// short or long TTL here instead of patching a global.
    pub fn with_cache_ttl(store: Arc<dyn DocumentStore>, ttl: Duration) -> Self {
        UserDirectory {
            store,
            cache: TimedCache::new(ttl),
        }
    }

    /// Finds a profile by email, consulting the cache first.
    ///
    /// The email is trimmed and lowercased before both the cache probe
    /// and the store query. Returns `Ok(None)` for unknown emails, and
    /// caches that answer.
    pub async fn find_by_email(&self, email: &str) -> CoreResult<Option<User>> {
        let key = email.trim().to_lowercase();
        if key.is_empty() {
            return Ok(None);
        }

        if let Some(cached) = self.cache.get(&key) {
            tracing::debug!(email = %key, "user lookup served from cache");
            return Ok(cached);
        }

        let query = Query::new().filter(Filter::eq("email", key.clone())).limit(1);
        let records = self.store.query(collections::USERS, query).await?;
        let user = match records.first() {
            Some(record) => Some(User::from_record(record)?),
            None => None,
        };

        self.cache.put(key, user.clone());
        Ok(user)
    }

    /// Finds a profile by uid, consulting the cache first. Misses are
    /// cached like email misses.
    pub async fn find_by_id(&self, uid: &str) -> CoreResult<Option<User>> {
        if let Some(cached) = self.cache.get(&uid.to_string()) {
            tracing::debug!(%uid, "user lookup served from cache");
            return Ok(cached);
        }

        let user = match self.store.get(collections::USERS, uid).await? {
            Some(record) => Some(User::from_record(&record)?),
            None => None,
        };

        self.cache.put(uid.to_string(), user.clone());
        Ok(user)
    }

    /// Ensures a profile document exists for a signed-in identity.
    ///
    /// Reads the store directly (never the cache, which may hold a
    /// stale miss from before sign-up). If no document exists, writes
    /// the default profile; an existing document is never overwritten.
    pub async fn ensure(&self, identity: &AuthIdentity) -> CoreResult<User> {
        if let Some(record) = self.store.get(collections::USERS, &identity.uid).await? {
            return Ok(User::from_record(&record)?);
        }

        tracing::info!(uid = %identity.uid, "creating default profile on first sign-in");
        let record = self
            .store
            .insert_with_id(
                collections::USERS,
                &identity.uid,
                identity.default_profile_doc(),
            )
            .await?;
        let user = User::from_record(&record)?;

        // A stale negative entry for this identity must not outlive
        // the profile it denies.
        self.cache.put(identity.uid.clone(), Some(user.clone()));
        Ok(user)
    }

    /// Prefix search over emails and display names for the invite
    /// picker. Terms shorter than two characters return nothing.
    pub async fn search(&self, term: &str, limit: usize) -> CoreResult<Vec<User>> {
        let term = term.trim();
        if term.chars().count() < 2 {
            return Ok(Vec::new());
        }

        let by_email = Query::new()
            .filter(Filter::prefix("email", &term.to_lowercase()))
            .limit(limit);
        let by_name = Query::new()
            .filter(Filter::prefix("displayName", term))
            .limit(limit);

        let mut users = Vec::new();
        for records in [
            self.store.query(collections::USERS, by_email).await?,
            self.store.query(collections::USERS, by_name).await?,
        ] {
            for record in &records {
                let user = User::from_record(record)?;
                if !users.iter().any(|u: &User| u.uid == user.uid) {
                    users.push(user);
                }
            }
        }

        users.sort_by(|a, b| {
            a.display_name
                .cmp(&b.display_name)
                .then_with(|| a.uid.cmp(&b.uid))
        });
        users.truncate(limit);
        Ok(users)
    }

    /// Drops every cache entry. The next lookup of any key goes to
    /// the store.
    pub fn invalidate_cache(&self) {
        self.cache.invalidate_all();
    }

    /// Cache occupancy snapshot for debugging.
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}
