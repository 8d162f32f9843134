//! Node communication.
//!
//! - Transports: one HTTP transport with endpoint rotation for JSON-RPC and REST nodes
//! - Requester: single and bounded batch calls with response unwrapping
//! - Consensus: block identity verification across independent nodes
//! - Pool: node sets cached per network

pub mod consensus;
mod pool;
pub mod requester;
mod transports;

pub use consensus::{composite_identity, verify_block_identity, BlockIdentity};
pub use pool::{ClientPool, ClientPoolTrait, REST_URL_TYPE};
pub use requester::{NodeSet, RpcCall, RpcOutcome};
pub use transports::{
	BlockchainTransport, ConnectionCheck, EndpointManager, HttpTransportClient, RestMethod,
	RestRequest, RotatingTransport, TransientErrorRetryStrategy, TransportError,
};
