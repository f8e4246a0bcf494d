//! Login-phase cryptography: the proxy's RSA keypair and the encryption
//! handshake helpers around it.

use anyhow::Context;
use rsa::{pkcs8::EncodePublicKey, Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};

/// The keypair offered to online-mode clients in `EncryptionRequest`.
/// Generated once at startup; Mojang clients expect 1024-bit RSA.
pub struct ServerKeyPair {
    private_key: RsaPrivateKey,
    public_key_der: Vec<u8>,
}

impl ServerKeyPair {
    pub fn generate() -> anyhow::Result<Self> {
        let mut rng = rand::thread_rng();
        let private_key =
            RsaPrivateKey::new(&mut rng, 1024).context("generating server keypair")?;
        let public_key_der = RsaPublicKey::from(&private_key)
            .to_public_key_der()
            .context("encoding public key")?
            .into_vec();
        Ok(Self {
            private_key,
            public_key_der,
        })
    }

    /// X.509 SubjectPublicKeyInfo encoding, as the wire carries it.
    pub fn public_key_der(&self) -> &[u8] {
        &self.public_key_der
    }

    /// Unwraps a client's PKCS#1 v1.5 encrypted blob (shared secret or
    /// verify token).
    pub fn decrypt(&self, ciphertext: &[u8]) -> anyhow::Result<Vec<u8>> {
        self.private_key
            .decrypt(Pkcs1v15Encrypt, ciphertext)
            .context("RSA decryption failed")
    }
}

/// A fresh 4-byte verify token for one encryption request.
pub fn generate_verify_token() -> [u8; 4] {
    rand::random()
}

/// Constant-time equality for the verify-token check.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
