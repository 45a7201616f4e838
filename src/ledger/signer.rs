/// Watcher credential: key parsing, address derivation and transaction signing
///
/// Sui signs the Blake2b-256 digest of the intent-prefixed transaction bytes
/// and expects the serialized signature `flag || signature || public key`.
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use blake2::{digest::consts::U32, Blake2b, Digest};
use ed25519_dalek::{Signer, SigningKey};
use std::fmt;

use crate::error::SigningError;
use crate::ledger::models::{SignedTransaction, UnsignedTransaction};

type Blake2b256 = Blake2b<U32>;

/// Signature scheme flag for Ed25519
pub const ED25519_FLAG: u8 = 0x00;

/// Intent prefix: TransactionData scope, version 0, Sui app
const TRANSACTION_INTENT: [u8; 3] = [0, 0, 0];

const BECH32_HRP: &str = "suiprivkey";

pub struct WatcherSigner {
    key: SigningKey,
    address: String,
}

impl fmt::Debug for WatcherSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatcherSigner")
            .field("address", &self.address)
            .field("key", &"<redacted>")
            .finish()
    }
}

impl WatcherSigner {
    /// Parse a credential in `suiprivkey…` bech32, base64, or hex form
    pub fn from_encoded(encoded: &str) -> Result<Self, SigningError> {
        let encoded = encoded.trim();

        let secret = if encoded.starts_with(BECH32_HRP) {
            let (hrp, data) = bech32::decode(encoded)
                .map_err(|e| SigningError::InvalidEncoding(format!("bech32: {}", e)))?;
            if hrp.as_str() != BECH32_HRP {
                return Err(SigningError::InvalidEncoding(format!(
                    "unexpected bech32 prefix {}",
                    hrp
                )));
            }
            Self::strip_flag(&data)?
        } else if let Some(hex_str) = encoded.strip_prefix("0x") {
            let bytes = hex::decode(hex_str)
                .map_err(|e| SigningError::InvalidEncoding(format!("hex: {}", e)))?;
            Self::strip_flag(&bytes)?
        } else {
            let bytes = BASE64
                .decode(encoded)
                .map_err(|e| SigningError::InvalidEncoding(format!("base64: {}", e)))?;
            Self::strip_flag(&bytes)?
        };

        Ok(Self::from_secret(secret))
    }

    pub fn from_secret(secret: [u8; 32]) -> Self {
        let key = SigningKey::from_bytes(&secret);
        let address = derive_address(&key.verifying_key().to_bytes());
        Self { key, address }
    }

    /// Accepts `flag || secret` (33 bytes), a bare secret (32 bytes), or a
    /// legacy `secret || public` keypair (64 bytes)
    fn strip_flag(bytes: &[u8]) -> Result<[u8; 32], SigningError> {
        let secret = match bytes.len() {
            33 => {
                if bytes[0] != ED25519_FLAG {
                    return Err(SigningError::UnsupportedScheme(bytes[0]));
                }
                &bytes[1..]
            }
            32 => bytes,
            64 => &bytes[..32],
            other => return Err(SigningError::InvalidLength(other)),
        };

        secret
            .try_into()
            .map_err(|_| SigningError::InvalidLength(secret.len()))
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn public_key(&self) -> [u8; 32] {
        self.key.verifying_key().to_bytes()
    }

    /// Sign base64 transaction bytes produced by the ledger
    pub fn sign(&self, tx: UnsignedTransaction) -> Result<SignedTransaction, SigningError> {
        let tx_bytes = BASE64
            .decode(&tx.tx_bytes)
            .map_err(|e| SigningError::InvalidTransaction(e.to_string()))?;

        let digest = intent_digest(&tx_bytes);
        let signature = self.key.sign(&digest);

        let mut serialized = Vec::with_capacity(1 + 64 + 32);
        serialized.push(ED25519_FLAG);
        serialized.extend_from_slice(&signature.to_bytes());
        serialized.extend_from_slice(&self.public_key());

        Ok(SignedTransaction {
            tx_bytes: tx.tx_bytes,
            signature: BASE64.encode(serialized),
        })
    }
}

/// Blake2b-256 over the intent message for transaction data
pub fn intent_digest(tx_bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Blake2b256::new();
    hasher.update(TRANSACTION_INTENT);
    hasher.update(tx_bytes);
    hasher.finalize().into()
}

/// Address = Blake2b-256(flag || public key), hex encoded
pub fn derive_address(public_key: &[u8; 32]) -> String {
    let mut hasher = Blake2b256::new();
    hasher.update([ED25519_FLAG]);
    hasher.update(public_key);
    let hash: [u8; 32] = hasher.finalize().into();
    format!("0x{}", hex::encode(hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bech32::{Bech32, Hrp};
    use ed25519_dalek::{Signature, VerifyingKey};

    const SECRET: [u8; 32] = [7u8; 32];

    #[test]
    fn test_credential_formats_agree() {
        let mut flagged = vec![ED25519_FLAG];
        flagged.extend_from_slice(&SECRET);

        let bech = bech32::encode::<Bech32>(Hrp::parse(BECH32_HRP).unwrap(), &flagged).unwrap();
        let b64 = BASE64.encode(&flagged);
        let b64_bare = BASE64.encode(SECRET);
        let hexed = format!("0x{}", hex::encode(SECRET));

        let expected = WatcherSigner::from_secret(SECRET);
        for encoded in [bech, b64, b64_bare, hexed] {
            let signer = WatcherSigner::from_encoded(&encoded).unwrap();
            assert_eq!(signer.address(), expected.address());
        }
    }

    #[test]
    fn test_rejects_other_schemes() {
        let mut flagged = vec![0x01];
        flagged.extend_from_slice(&SECRET);
        let result = WatcherSigner::from_encoded(&BASE64.encode(&flagged));
        assert!(matches!(result, Err(SigningError::UnsupportedScheme(0x01))));

        let result = WatcherSigner::from_encoded(&BASE64.encode([1u8; 10]));
        assert!(matches!(result, Err(SigningError::InvalidLength(10))));
    }

    #[test]
    fn test_address_shape() {
        let signer = WatcherSigner::from_secret(SECRET);
        assert!(signer.address().starts_with("0x"));
        assert_eq!(signer.address().len(), 66);
    }

    #[test]
    fn test_signature_verifies_over_intent_digest() {
        let signer = WatcherSigner::from_secret(SECRET);
        let tx_bytes = vec![1u8, 2, 3, 4];

        let signed = signer
            .sign(UnsignedTransaction {
                tx_bytes: BASE64.encode(&tx_bytes),
            })
            .unwrap();

        let raw = BASE64.decode(&signed.signature).unwrap();
        assert_eq!(raw.len(), 97);
        assert_eq!(raw[0], ED25519_FLAG);
        assert_eq!(&raw[65..], &signer.public_key());

        let sig_bytes: [u8; 64] = raw[1..65].try_into().unwrap();
        let verifying = VerifyingKey::from_bytes(&signer.public_key()).unwrap();
        verifying
            .verify_strict(&intent_digest(&tx_bytes), &Signature::from_bytes(&sig_bytes))
            .unwrap();
    }

    #[test]
    fn test_debug_redacts_key() {
        let signer = WatcherSigner::from_secret(SECRET);
        let rendered = format!("{:?}", signer);
        assert!(rendered.contains("redacted"));
        assert!(!rendered.contains(&hex::encode(SECRET)));
    }
}
