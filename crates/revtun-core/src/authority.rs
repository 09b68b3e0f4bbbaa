//! Credential/authority store seam
//!
//! The store is external to the agent: it knows the currently trusted
//! host-class certificate authorities and how to reach the site's local
//! control-plane endpoint. Authorities rotate, so lookups are made fresh
//! per connection attempt and never cached across attempts.

use std::io;

use async_trait::async_trait;
use ssh_key::public::KeyData;
use ssh_key::PublicKey;

use crate::error::AuthorityError;
use crate::transport::ByteStream;

/// A certificate authority trusted to sign proxy host certificates
#[derive(Debug, Clone)]
pub struct CertAuthority {
    id: String,
    checkers: Vec<PublicKey>,
}

impl CertAuthority {
    /// Create an authority from its identifier and checker keys
    pub fn new(id: impl Into<String>, checkers: Vec<PublicKey>) -> Self {
        Self {
            id: id.into(),
            checkers,
        }
    }

    /// Authority identifier, e.g. its domain name
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Public keys that validate signatures made by this authority
    pub fn checkers(&self) -> &[PublicKey] {
        &self.checkers
    }
}

/// Byte-exact key comparison.
///
/// `KeyData` equality is equality of the SSH wire encoding, which is the
/// comparison host-certificate validation is defined in terms of.
pub fn keys_equal(a: &KeyData, b: &KeyData) -> bool {
    a == b
}

/// Handle to the external credential store
#[async_trait]
pub trait AuthorityClient: Send + Sync {
    /// Current set of host-class certificate authorities.
    ///
    /// Callers must fetch per connection attempt; caching across attempts
    /// breaks key rotation.
    async fn host_authorities(&self) -> Result<Vec<CertAuthority>, AuthorityError>;

    /// Open a new connection to the site's local control-plane endpoint
    async fn dial_control_plane(&self) -> io::Result<Box<dyn ByteStream>>;
}
