//! Host-key verification
//!
//! The agent authenticates the proxy, not the other way around: the key
//! the proxy presents must be an OpenSSH certificate signed by one of the
//! host-class authorities the credential store currently trusts.
//! Authorities rotate, so the set is fetched per connection attempt and
//! never cached.

use std::sync::Arc;

use async_trait::async_trait;
use ssh_key::public::KeyData;
use ssh_key::PublicKey;

use revtun_core::authority::{keys_equal, AuthorityClient};
use revtun_core::error::TransportError;
use revtun_core::transport::{HostKey, VerifyHostKey};

/// Default verifier: accept iff the presented key is a certificate whose
/// signing key matches a checker of some currently-known host authority
pub struct CertChainVerifier {
    authority: Arc<dyn AuthorityClient>,
}

impl CertChainVerifier {
    pub fn new(authority: Arc<dyn AuthorityClient>) -> Self {
        Self { authority }
    }
}

#[async_trait]
impl VerifyHostKey for CertChainVerifier {
    async fn verify(&self, hostport: &str, key: &HostKey) -> Result<(), TransportError> {
        let HostKey::Certificate(cert) = key else {
            return Err(TransportError::Auth(
                "expected a host certificate".to_string(),
            ));
        };
        let authorities = self.authority.host_authorities().await.map_err(|err| {
            TransportError::Auth(format!("failed to fetch host authorities: {err}"))
        })?;
        for ca in &authorities {
            tracing::debug!(authority = ca.id(), host = hostport, "checking signature");
            for checker in ca.checkers() {
                if keys_equal(checker.key_data(), cert.signature_key()) {
                    tracing::debug!(authority = ca.id(), host = hostport, "matched signing key");
                    return Ok(());
                }
            }
        }
        Err(TransportError::NotFound(
            "no matching keys found when checking server's host signature".to_string(),
        ))
    }
}

/// Pins a single key exchanged out of band; the ad-hoc agent flavor
/// installs this in place of the certificate chain
pub struct PinnedKeyVerifier {
    pinned: KeyData,
}

impl PinnedKeyVerifier {
    pub fn new(key: PublicKey) -> Self {
        Self {
            pinned: key.key_data().clone(),
        }
    }
}

#[async_trait]
impl VerifyHostKey for PinnedKeyVerifier {
    async fn verify(&self, _hostport: &str, key: &HostKey) -> Result<(), TransportError> {
        let presented = match key {
            HostKey::Public(key) => key.key_data(),
            HostKey::Certificate(cert) => cert.public_key(),
        };
        if keys_equal(presented, &self.pinned) {
            Ok(())
        } else {
            Err(TransportError::Auth(
                "presented host key does not match the pinned key".to_string(),
            ))
        }
    }
}
