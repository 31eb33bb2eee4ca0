//! P-256 public keys in their compressed encoding.

use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::EncodedPoint;

/// Length of a compressed SEC1 point.
const COMPRESSED_BYTES: usize = 33;

/// A NIST P-256 public key.
///
/// Always valid: only points on the curve can be constructed. The compressed encoding
/// is what appears in recipient strings, key tags and HKDF salts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublicKey {
    point: p256::PublicKey,
    compressed: EncodedPoint,
}

impl PublicKey {
    /// Parses a compressed SEC1 encoding.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != COMPRESSED_BYTES {
            return None;
        }
        p256::PublicKey::from_sec1_bytes(bytes)
            .ok()
            .map(PublicKey::from_pubkey)
    }

    pub(crate) fn from_pubkey(point: p256::PublicKey) -> Self {
        PublicKey {
            compressed: point.to_encoded_point(true),
            point,
        }
    }

    /// Returns the compressed SEC1 encoding of this key.
    pub fn as_bytes(&self) -> &[u8] {
        self.compressed.as_bytes()
    }

    pub(crate) fn as_pubkey(&self) -> &p256::PublicKey {
        &self.point
    }
}
