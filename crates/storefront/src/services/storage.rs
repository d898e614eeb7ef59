//! Key-value storage scoped to one visitor.
//!
//! Production uses the `tower-sessions` [`Session`] (Postgres-backed).
//! Unit tests use [`MemoryStorage`].

use std::future::Future;

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tower_sessions::Session;

/// Errors reading or writing visitor storage.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("session error: {0}")]
    Session(#[from] tower_sessions::session::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("storage lock poisoned")]
    Poisoned,
}

/// Per-visitor key-value storage.
pub trait SessionStorage: Send + Sync {
    /// Read and deserialize a value. Missing keys yield `None`.
    fn load<T>(&self, key: &str) -> impl Future<Output = Result<Option<T>, StorageError>> + Send
    where
        T: DeserializeOwned + Send;

    /// Serialize and write a value, replacing any previous one.
    fn store<T>(&self, key: &str, value: &T) -> impl Future<Output = Result<(), StorageError>> + Send
    where
        T: Serialize + Sync;

    /// Remove a key. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> impl Future<Output = Result<(), StorageError>> + Send;
}

impl SessionStorage for Session {
    async fn load<T>(&self, key: &str) -> Result<Option<T>, StorageError>
    where
        T: DeserializeOwned + Send,
    {
        Ok(self.get::<T>(key).await?)
    }

    async fn store<T>(&self, key: &str, value: &T) -> Result<(), StorageError>
    where
        T: Serialize + Sync,
    {
        Ok(self.insert(key, value).await?)
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.remove_value(key).await?;
        Ok(())
    }
}

impl<S: SessionStorage> SessionStorage for &S {
    fn load<T>(&self, key: &str) -> impl Future<Output = Result<Option<T>, StorageError>> + Send
    where
        T: DeserializeOwned + Send,
    {
        (**self).load(key)
    }

    fn store<T>(&self, key: &str, value: &T) -> impl Future<Output = Result<(), StorageError>> + Send
    where
        T: Serialize + Sync,
    {
        (**self).store(key, value)
    }

    fn remove(&self, key: &str) -> impl Future<Output = Result<(), StorageError>> + Send {
        (**self).remove(key)
    }
}

/// In-memory storage for tests.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemoryStorage {
    values: std::sync::Mutex<std::collections::HashMap<String, serde_json::Value>>,
}

#[cfg(test)]
impl MemoryStorage {
    /// Whether a key is present.
    pub fn contains(&self, key: &str) -> bool {
        self.values
            .lock()
            .map(|values| values.contains_key(key))
            .unwrap_or(false)
    }
}

#[cfg(test)]
impl SessionStorage for MemoryStorage {
    async fn load<T>(&self, key: &str) -> Result<Option<T>, StorageError>
    where
        T: DeserializeOwned + Send,
    {
        let value = self
            .values
            .lock()
            .map_err(|_| StorageError::Poisoned)?
            .get(key)
            .cloned();
        value
            .map(serde_json::from_value)
            .transpose()
            .map_err(StorageError::from)
    }

    async fn store<T>(&self, key: &str, value: &T) -> Result<(), StorageError>
    where
        T: Serialize + Sync,
    {
        let value = serde_json::to_value(value)?;
        self.values
            .lock()
            .map_err(|_| StorageError::Poisoned)?
            .insert(key.to_owned(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.values
            .lock()
            .map_err(|_| StorageError::Poisoned)?
            .remove(key);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_storage_roundtrip() {
        let storage = MemoryStorage::default();
        assert_eq!(storage.load::<u32>("n").await.unwrap(), None);

        storage.store("n", &7_u32).await.unwrap();
        assert_eq!(storage.load::<u32>("n").await.unwrap(), Some(7));

        storage.remove("n").await.unwrap();
        assert!(!storage.contains("n"));
        storage.remove("n").await.unwrap();
    }

    #[tokio::test]
    async fn test_session_storage_roundtrip() {
        let store = std::sync::Arc::new(tower_sessions::MemoryStore::default());
        let session = Session::new(None, store, None);

        session.store("greeting", &"hello").await.unwrap();
        let loaded: Option<String> = SessionStorage::load(&session, "greeting").await.unwrap();
        assert_eq!(loaded.as_deref(), Some("hello"));

        SessionStorage::remove(&session, "greeting").await.unwrap();
        let loaded: Option<String> = SessionStorage::load(&session, "greeting").await.unwrap();
        assert_eq!(loaded, None);
    }
}
