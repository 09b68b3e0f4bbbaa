//! revtun-core: Shared types and seams for the revtun reverse tunnel
//!
//! This crate provides the pieces both sides of the tunnel agree on: the
//! wire-level channel names, the error taxonomy, agent configuration, and
//! the trait seams behind which the SSH transport library and the
//! credential/authority store live.

pub mod addr;
pub mod authority;
pub mod config;
pub mod error;
pub mod logging;
pub mod proto;
pub mod transport;

pub use addr::NetAddr;
pub use error::{AgentError, AuthorityError, ConfigError, TransportError};
