//! Node set pool.
//!
//! Node sets are created lazily on first use and cached per network slug, so every module
//! of a network shares the same connections.

use anyhow::Context;
use async_trait::async_trait;
use std::{sync::Arc, time::Duration};

use crate::{
	models::{BlockChainType, Network},
	services::blockchain::{
		requester::NodeSet,
		transports::{BlockchainTransport, ConnectionCheck, HttpTransportClient},
	},
	utils::client_storage::ClientStorage,
};

/// URL type of the secondary REST endpoint of chains that split RPC and REST
pub const REST_URL_TYPE: &str = "rest";

#[async_trait]
pub trait ClientPoolTrait: Send + Sync {
	type Transport: BlockchainTransport + 'static;

	async fn get_node_set(
		&self,
		network: &Network,
	) -> Result<Arc<NodeSet<Self::Transport>>, anyhow::Error>;
}

/// Caches one [`NodeSet`] of HTTP transports per network
pub struct ClientPool {
	storage: ClientStorage<NodeSet<HttpTransportClient>>,
}

impl ClientPool {
	pub fn new() -> Self {
		Self {
			storage: ClientStorage::new(),
		}
	}

	pub async fn get_client_count(&self) -> usize {
		self.storage.len().await
	}

	async fn create_node_set(
		network: &Network,
	) -> Result<NodeSet<HttpTransportClient>, anyhow::Error> {
		let check = ConnectionCheck::for_chain(network.network_type);
		let timeout = Duration::from_millis(network.request_timeout_ms());

		let primary = HttpTransportClient::new(network, check.clone())
			.await
			.with_context(|| format!("Failed to connect to any node of {}", network.slug))?;

		let nodes = network
			.weighted_rpc_urls()
			.into_iter()
			.take(network.consensus_node_count())
			.map(|rpc_url| HttpTransportClient::for_url(rpc_url.url.as_str(), check.clone(), timeout))
			.collect::<Result<Vec<_>, _>>()?;

		let mut node_set = NodeSet::new(primary, nodes, network.max_concurrency(), timeout);

		if let Some(rest_url) = network
			.rpc_urls
			.iter()
			.filter(|rpc_url| rpc_url.type_ == REST_URL_TYPE)
			.max_by_key(|rpc_url| rpc_url.weight)
		{
			let rest_check = match network.network_type {
				BlockChainType::Cosmos => ConnectionCheck::rest("/cosmos/base/tendermint/v1beta1/node_info"),
				_ => check.clone(),
			};
			node_set = node_set.with_rest(HttpTransportClient::for_url(
				rest_url.url.as_str(),
				rest_check,
				timeout,
			)?);
		}

		tracing::info!(
			network = %network.slug,
			consensus_nodes = node_set.nodes.len(),
			max_concurrency = node_set.limit,
			"Created node set"
		);
		Ok(node_set)
	}
}

impl Default for ClientPool {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl ClientPoolTrait for ClientPool {
	type Transport = HttpTransportClient;

	async fn get_node_set(
		&self,
		network: &Network,
	) -> Result<Arc<NodeSet<Self::Transport>>, anyhow::Error> {
		self.storage
			.get_or_try_insert_with(&network.slug, || Self::create_node_set(network))
			.await
	}
}
