use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::client::ApiClient;
use crate::error::ConfigError;

/// Named collection of clients, shut down together.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: DashMap<String, ApiClient>,
}

impl ClientRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `client` under its name.
    ///
    /// # Errors
    /// Returns [`ConfigError::DuplicateClient`] if the name is taken.
    pub fn register(&self, client: ApiClient) -> Result<(), ConfigError> {
        match self.clients.entry(client.name().to_owned()) {
            Entry::Occupied(entry) => Err(ConfigError::DuplicateClient(entry.key().clone())),
            Entry::Vacant(entry) => {
                tracing::debug!(client = %client.name(), "registered API client");
                entry.insert(client);
                Ok(())
            }
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<ApiClient> {
        self.clients.get(name).map(|entry| entry.value().clone())
    }

    pub fn remove(&self, name: &str) -> Option<ApiClient> {
        self.clients.remove(name).map(|(_, client)| client)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Removes every client and shuts it down.
    pub async fn shutdown_all(&self) {
        let names: Vec<String> = self.clients.iter().map(|e| e.key().clone()).collect();
        for name in names {
            if let Some((_, client)) = self.clients.remove(&name) {
                client.shutdown().await;
            }
        }
    }
}
