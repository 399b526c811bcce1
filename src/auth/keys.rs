use rsa::pkcs1::{EncodeRsaPublicKey, LineEnding};
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};

use crate::error::HandshakeError;

/// Process-lifetime RSA key pair used for the user API key exchange.
#[derive(Clone)]
pub struct KeyPair {
    private: RsaPrivateKey,
    public_pem: String,
}

impl KeyPair {
    pub fn generate(bits: usize) -> Result<Self, HandshakeError> {
        let mut rng = rand::thread_rng();
        let private = RsaPrivateKey::new(&mut rng, bits)
            .map_err(|e| HandshakeError::KeyGeneration(e.to_string()))?;
        let public_pem = RsaPublicKey::from(&private)
            .to_pkcs1_pem(LineEnding::LF)
            .map_err(|e| HandshakeError::KeyGeneration(e.to_string()))?;
        Ok(Self {
            private,
            public_pem,
        })
    }

    /// Public key as PKCS#1 PEM, the form the forum expects.
    pub fn public_key_pem(&self) -> &str {
        &self.public_pem
    }

    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, HandshakeError> {
        self.private
            .decrypt(Pkcs1v15Encrypt, ciphertext)
            .map_err(|e| HandshakeError::Decryption(e.to_string()))
    }

    #[cfg(test)]
    pub(crate) fn encrypt(&self, plaintext: &[u8]) -> Vec<u8> {
        let mut rng = rand::thread_rng();
        RsaPublicKey::from(&self.private)
            .encrypt(&mut rng, Pkcs1v15Encrypt, plaintext)
            .expect("test payload fits the key")
    }
}
