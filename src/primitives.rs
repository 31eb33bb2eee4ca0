//! Primitive cryptographic operations used by the plugin.

use chacha20poly1305::{
    aead::{self, Aead, KeyInit},
    ChaCha20Poly1305, Key, Nonce,
};
use hkdf::Hkdf;
use secrecy::Secret;
use sha2::Sha256;

pub mod p256;

/// `encrypt[key](plaintext)` - encrypts a message with a one-time key.
///
/// ChaCha20-Poly1305 from RFC 7539 with a zero nonce.
pub(crate) fn aead_encrypt(key: &[u8; 32], plaintext: &[u8]) -> Result<Vec<u8>, aead::Error> {
    let c = ChaCha20Poly1305::new(Key::from_slice(key));
    c.encrypt(&Nonce::default(), plaintext)
}

/// `decrypt[key](ciphertext)` - decrypts a message of an expected fixed size.
///
/// ChaCha20-Poly1305 from RFC 7539 with a zero nonce.
pub(crate) fn aead_decrypt(key: &[u8; 32], ciphertext: &[u8]) -> Result<Vec<u8>, aead::Error> {
    let c = ChaCha20Poly1305::new(Key::from_slice(key));
    c.decrypt(&Nonce::default(), ciphertext)
}

/// `HKDF[salt, label](key, 32)`
///
/// HKDF from RFC 5869 with SHA-256.
pub(crate) fn hkdf(salt: &[u8], label: &[u8], ikm: &[u8]) -> Secret<[u8; 32]> {
    let mut okm = [0; 32];
    Hkdf::<Sha256>::new(Some(salt), ikm)
        .expand(label, &mut okm)
        .expect("okm is the correct length");
    Secret::new(okm)
}
