//! End-to-end scenarios.
//!
//! - `add` - content addressing through the CLI
//! - `peering` - static peering and swarm control
//! - `gateway` - gateway responses (webui, byte ranges)
//! - `rpc` - RPC readiness and authorization
//! - `harness_contract` - isolation, cleanup, reap and fan-out guarantees

pub mod add;
pub mod gateway;
pub mod harness_contract;
pub mod peering;
