//! SecureString cipher seam.
//!
//! The codec never performs key exchange itself; the owning session layer
//! negotiates a session key (MS-PSRP public key exchange) and hands the
//! codec an implementation of [`CryptoProvider`]. Serializing a
//! SecureString without a provider is a caller error, not something the
//! codec can recover from.

use crate::error::Result;

/// Pluggable cipher used for `<SS>` element content.
///
/// `encrypt` receives the UTF-16LE bytes of the plaintext string and must
/// return the ciphertext that will be base64-encoded onto the wire;
/// `decrypt` is the exact inverse.
pub trait CryptoProvider: Send + Sync {
    fn encrypt(&self, data: &[u8]) -> Result<Vec<u8>>;
    fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>>;
}

#[cfg(feature = "crypto")]
pub use self::session::SessionCipher;

#[cfg(feature = "crypto")]
mod session {
    use super::CryptoProvider;
    use crate::error::{PsrpError, Result};
    use chacha20poly1305::aead::{Aead, KeyInit};
    use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
    use rand::RngCore;

    const NONCE_LEN: usize = 12;

    /// ChaCha20-Poly1305 AEAD provider keyed with a negotiated session key.
    ///
    /// Each encryption draws a fresh random nonce and prepends it to the
    /// ciphertext so the peer can decrypt statelessly.
    pub struct SessionCipher {
        cipher: ChaCha20Poly1305,
    }

    impl SessionCipher {
        pub fn new(key: &[u8; 32]) -> Self {
            Self {
                cipher: ChaCha20Poly1305::new(Key::from_slice(key)),
            }
        }
    }

    impl CryptoProvider for SessionCipher {
        fn encrypt(&self, data: &[u8]) -> Result<Vec<u8>> {
            let mut nonce = [0u8; NONCE_LEN];
            rand::rng().fill_bytes(&mut nonce);

            let ciphertext = self
                .cipher
                .encrypt(Nonce::from_slice(&nonce), data)
                .map_err(|_| PsrpError::Crypto("encryption failed".to_string()))?;

            let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
            out.extend_from_slice(&nonce);
            out.extend_from_slice(&ciphertext);
            Ok(out)
        }

        fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>> {
            if data.len() < NONCE_LEN {
                return Err(PsrpError::Crypto(
                    "ciphertext shorter than nonce".to_string(),
                ));
            }

            let (nonce, ciphertext) = data.split_at(NONCE_LEN);
            self.cipher
                .decrypt(Nonce::from_slice(nonce), ciphertext)
                .map_err(|_| PsrpError::Crypto("decryption failed".to_string()))
        }
    }

}
