//! # ipfs-harness
//!
//! Multi-node integration test harness for IPFS daemons.
//!
//! This crate drives the daemon binary under test as a black box:
//! - Spawning and supervising daemon processes (one per node)
//! - Per-test temp roots and conflict-free swarm ports
//! - Config editing (in-place JSON or through `ipfs config`)
//! - Readiness polling on the `api` / `gateway` files
//! - HTTP clients for the RPC API and the gateway
//! - Peering topologies and parallel fan-out over node groups
//!
//! ```rust,ignore
//! use ipfs_harness::Harness;
//!
//! #[tokio::test(flavor = "multi_thread")]
//! async fn add_hello_world() {
//!     let h = Harness::new().unwrap();
//!     let node = h.new_node().unwrap();
//!     node.init(&[]).await.unwrap().start_daemon(&[]).await.unwrap();
//!     let cid = node.ipfs_add_str("hello world", &[]).await.unwrap();
//!     assert_eq!(cid, "Qmf412jQZiuVUtdgnB36FXFX7xg5V6KEbSJ4dpQuhkLyfD");
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod assertions;
pub mod buffer;
pub mod cluster;
pub mod config;
pub mod error;
pub mod harness;
pub mod http_client;
pub mod logging;
pub mod node;
pub mod node_config;
pub mod nodes;
pub mod peer;
pub mod peering;
pub mod ports;
pub mod process;
pub mod runner;
pub mod transport;
pub mod wait;

#[cfg(test)]
pub(crate) mod test_support;

pub use buffer::Buffer;
pub use cluster::Cluster;
pub use config::HarnessConfig;
pub use error::{ConfigError, HarnessError, Result};
pub use harness::Harness;
pub use http_client::{with_header, with_host, HttpClient, HttpRequest, HttpResponse};
pub use node::Node;
pub use node_config::NodeConfig;
pub use nodes::Nodes;
pub use peer::PeerId;
pub use peering::{create_peer_nodes, PeeringEdge};
pub use ports::new_rand_port;
pub use runner::{CmdOpt, RunMode, RunRequest, RunResult, Runner};
pub use wait::eventually;
