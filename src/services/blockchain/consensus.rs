//! Block identity verification across independent nodes.
//!
//! Every node taking part in verification is asked for the identity of the same block.
//! The first node's answer is the reference; any other answer with a different hash is a
//! consensus failure. A majority is never picked: disagreement usually means a
//! reorganization is in flight and the block must not be processed yet.

use futures::{stream, StreamExt};
use sha2::{Digest, Sha256};
use std::{collections::HashMap, future::Future, sync::Arc};

use crate::{
	models::{BlockAux, BlockContext, BlockId},
	services::{blockchain::transports::BlockchainTransport, indexer::IndexerError},
};

/// What one node reports about a block
#[derive(Debug, Clone, PartialEq)]
pub struct BlockIdentity {
	/// Canonical identity token, the only part compared across nodes
	pub hash: String,
	pub time: Option<String>,
	pub transaction_count: Option<usize>,
	pub aux: BlockAux,
}

impl BlockIdentity {
	pub fn new(hash: impl Into<String>, time: Option<String>) -> Self {
		Self {
			hash: hash.into(),
			time,
			transaction_count: None,
			aux: BlockAux::None,
		}
	}

	/// Identity of a height that holds no block (skipped slot, null round)
	pub fn empty() -> Self {
		Self {
			hash: String::new(),
			time: None,
			transaction_count: None,
			aux: BlockAux::Empty,
		}
	}

	pub fn with_transaction_count(mut self, count: usize) -> Self {
		self.transaction_count = Some(count);
		self
	}

	pub fn with_aux(mut self, aux: BlockAux) -> Self {
		self.aux = aux;
		self
	}

	pub fn into_context(self, block_id: BlockId) -> BlockContext {
		if matches!(self.aux, BlockAux::Empty) {
			return BlockContext {
				block_time: self.time,
				..BlockContext::empty(block_id)
			};
		}
		BlockContext {
			block_id,
			block_hash: Some(self.hash),
			block_time: self.time,
			transaction_count: self.transaction_count,
			aux: self.aux,
		}
	}
}

/// Lower-case hex SHA-256 over the `|`-joined parts
pub fn composite_identity<S: AsRef<str>>(parts: &[S]) -> String {
	let joined = parts
		.iter()
		.map(|part| part.as_ref())
		.collect::<Vec<_>>()
		.join("|");
	hex::encode(Sha256::digest(joined.as_bytes()))
}

/// Fetches the identity from every node and requires them all to agree
///
/// Fetch failures propagate unchanged, so an unreachable node stays a requester error.
pub async fn verify_block_identity<T, F, Fut>(
	nodes: &[Arc<T>],
	limit: usize,
	fetch: F,
) -> Result<BlockIdentity, IndexerError>
where
	T: BlockchainTransport,
	F: Fn(Arc<T>) -> Fut,
	Fut: Future<Output = Result<BlockIdentity, IndexerError>>,
{
	if nodes.is_empty() {
		return Err(IndexerError::developer_error(
			"No nodes configured for identity verification",
			None,
			None,
		));
	}

	let mut identities: Vec<(usize, BlockIdentity)> = stream::iter(nodes.iter().cloned().enumerate())
		.map(|(index, node)| {
			let pending = fetch(node);
			async move { pending.await.map(|identity| (index, identity)) }
		})
		.buffer_unordered(limit.max(1))
		.collect::<Vec<_>>()
		.await
		.into_iter()
		.collect::<Result<_, _>>()?;
	identities.sort_by_key(|(index, _)| *index);

	let mut identities = identities.into_iter();
	let (_, reference) = match identities.next() {
		Some(first) => first,
		None => {
			return Err(IndexerError::integrity_error(
				"No identity returned",
				None,
				None,
			))
		}
	};

	for (index, identity) in identities {
		if identity.hash != reference.hash {
			let reference_url = nodes[0].get_current_url().await;
			let other_url = nodes[index].get_current_url().await;
			return Err(IndexerError::consensus_error(
				"Nodes disagree on block identity",
				None,
				Some(HashMap::from([
					("node_a".to_string(), reference_url),
					("hash_a".to_string(), reference.hash.clone()),
					("node_b".to_string(), other_url),
					("hash_b".to_string(), identity.hash),
				])),
			));
		}
	}

	tracing::debug!(
		hash = %reference.hash,
		nodes = nodes.len(),
		"Block identity verified"
	);
	Ok(reference)
}
