//! Per-network cache of shared clients.

use std::{collections::HashMap, future::Future, sync::Arc};
use tokio::sync::RwLock;

/// Clients keyed by network slug, shared behind an `Arc`
pub struct ClientStorage<T> {
	clients: RwLock<HashMap<String, Arc<T>>>,
}

impl<T> ClientStorage<T> {
	pub fn new() -> Self {
		Self {
			clients: RwLock::new(HashMap::new()),
		}
	}

	pub async fn get(&self, slug: &str) -> Option<Arc<T>> {
		self.clients.read().await.get(slug).cloned()
	}

	pub async fn len(&self) -> usize {
		self.clients.read().await.len()
	}

	pub async fn is_empty(&self) -> bool {
		self.clients.read().await.is_empty()
	}

	/// Returns the cached client for `slug`, building it with `create` on a miss.
	///
	/// Creation runs under the write lock, so concurrent callers for a cold slug build it
	/// once. A failed creation leaves nothing cached.
	pub async fn get_or_try_insert_with<F, Fut, E>(&self, slug: &str, create: F) -> Result<Arc<T>, E>
	where
		F: FnOnce() -> Fut,
		Fut: Future<Output = Result<T, E>>,
	{
		if let Some(client) = self.get(slug).await {
			return Ok(client);
		}

		let mut clients = self.clients.write().await;
		if let Some(client) = clients.get(slug) {
			return Ok(client.clone());
		}
		let client = Arc::new(create().await?);
		clients.insert(slug.to_string(), client.clone());
		Ok(client)
	}
}

impl<T> Default for ClientStorage<T> {
	fn default() -> Self {
		Self::new()
	}
}
