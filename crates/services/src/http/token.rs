use std::sync::{Arc, PoisonError, RwLock};

use storage::{KeyValueStore, StorageError, keys};

/// The bearer token, persisted under `access_token` and cached in memory.
///
/// The cache is what outbound requests use by default; `set` and `clear`
/// update it in the same call that writes the store.
pub struct TokenStore {
    kv: Arc<dyn KeyValueStore>,
    cached: RwLock<Option<Option<String>>>,
}

impl TokenStore {
    #[must_use]
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self {
            kv,
            cached: RwLock::new(None),
        }
    }

    /// Current token, loading it from the store on first use.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the store cannot be read.
    pub async fn get(&self) -> Result<Option<String>, StorageError> {
        let cached = self
            .cached
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(cached) = cached {
            return Ok(cached);
        }
        let stored = self.kv.get(keys::ACCESS_TOKEN).await?;
        let mut cached = self.cached.write().unwrap_or_else(PoisonError::into_inner);
        // A `set` or `clear` that finished while the store was read wins.
        Ok(cached.get_or_insert(stored).clone())
    }

    /// # Errors
    ///
    /// Returns `StorageError` if the token cannot be persisted; the cache is
    /// left untouched in that case.
    pub async fn set(&self, token: &str) -> Result<(), StorageError> {
        self.kv.set(keys::ACCESS_TOKEN, token).await?;
        *self.cached.write().unwrap_or_else(PoisonError::into_inner) = Some(Some(token.to_string()));
        Ok(())
    }

    /// Forget the token. The in-memory copy is dropped even if the store
    /// write fails.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the persisted token cannot be removed.
    pub async fn clear(&self) -> Result<(), StorageError> {
        *self.cached.write().unwrap_or_else(PoisonError::into_inner) = Some(None);
        self.kv.remove(keys::ACCESS_TOKEN).await
    }
}
