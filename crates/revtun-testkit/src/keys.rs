//! Key and certificate fixtures
//!
//! Ed25519 keypairs and OpenSSH host certificates for host-key
//! verification scenarios.

use rand_core::OsRng;
use ssh_key::certificate::{Builder as CertBuilder, CertType};
use ssh_key::{Algorithm, Certificate, PrivateKey};

use revtun_core::authority::CertAuthority;

// Far-future expiry so fixture certificates never age out mid-test.
const VALID_BEFORE: u64 = 1 << 35;

/// Generate a fresh Ed25519 keypair
pub fn generate_keypair() -> PrivateKey {
    PrivateKey::random(&mut OsRng, Algorithm::Ed25519).expect("generate ed25519 keypair")
}

/// A signing authority that mints proxy host certificates
pub struct TestAuthority {
    id: String,
    key: PrivateKey,
}

impl TestAuthority {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            key: generate_keypair(),
        }
    }

    /// The authority as the credential store exposes it
    pub fn cert_authority(&self) -> CertAuthority {
        CertAuthority::new(&self.id, vec![self.key.public_key().clone()])
    }

    /// Mint a host certificate over `subject`'s public key
    pub fn issue_host_cert(&self, subject: &PrivateKey, principal: &str) -> Certificate {
        let mut builder = CertBuilder::new_with_random_nonce(
            &mut OsRng,
            subject.public_key().key_data().clone(),
            0,
            VALID_BEFORE,
        )
        .expect("certificate builder");
        builder.cert_type(CertType::Host).expect("cert type");
        builder.key_id(principal).expect("key id");
        builder.valid_principal(principal).expect("principal");
        builder.sign(&self.key).expect("sign host certificate")
    }
}
