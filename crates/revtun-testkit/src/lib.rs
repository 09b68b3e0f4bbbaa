//! revtun-testkit: Test infrastructure for revtun
//!
//! Provides:
//! - `TestProxy` / `MemTransport`: in-memory transport for exercising the
//!   agent without a network or a real SSH stack
//! - `StaticAuthorityClient`: scriptable credential-store double
//! - `TestAuthority` and key fixtures for host-certificate scenarios

mod authority_client;
mod keys;
mod mem_transport;

pub use authority_client::StaticAuthorityClient;
pub use keys::{generate_keypair, TestAuthority};
pub use mem_transport::{AuthAttempt, MemTransport, OpenedChannel, ProxyConn, TestProxy};
