//! Chain Signature Verifier
//!
//! Verifies signed messages against a claimed chain family and public
//! identity. Supports EVM personal-message signatures (secp256k1 recovery)
//! and Solana detached Ed25519 signatures.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use ed25519_dalek::{Signature as Ed25519Signature, Verifier, VerifyingKey as Ed25519VerifyingKey};
use k256::ecdsa::{RecoveryId, Signature as K256Signature, VerifyingKey as K256VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use sha3::{Digest, Keccak256};
use thiserror::Error;

use crate::models::ChainId;

/// Errors that can occur during signature verification.
///
/// These never escape the public entry points: callers receive a
/// [`Verification`] outcome so a malformed proof becomes a 4xx hint,
/// never a crash.
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("Unsupported chain family: {0}")]
    UnsupportedChain(String),

    #[error("Invalid signature format: {0}")]
    InvalidFormat(String),

    #[error("Invalid signature length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("Invalid public identity: {0}")]
    InvalidIdentity(String),

    #[error("Signature verification failed")]
    VerificationFailed,

    #[error("Recovered signer {recovered} does not match {claimed}")]
    SignerMismatch { recovered: String, claimed: String },
}

/// Outcome of a verification attempt
#[derive(Debug, Clone)]
pub struct Verification {
    pub verified: bool,
    pub reason: Option<String>,
}

impl Verification {
    fn ok() -> Self {
        Self {
            verified: true,
            reason: None,
        }
    }

    fn failed(reason: String) -> Self {
        Self {
            verified: false,
            reason: Some(reason),
        }
    }
}

/// One implementation per chain family; dispatch goes through [`ChainId`].
pub trait ChainVerifier: Send + Sync {
    fn verify(&self, signer: &str, message: &str, signature: &str) -> Result<(), ChainError>;
}

impl ChainId {
    pub fn verifier(&self) -> &'static dyn ChainVerifier {
        match self {
            Self::Evm => &EvmVerifier,
            Self::Solana => &SolanaVerifier,
        }
    }
}

/// Verify a signature for a chain named by string.
///
/// All failure modes, including an unsupported chain value, collapse to
/// `verified: false` with a reason.
pub fn verify_signature(chain: &str, signer: &str, message: &str, signature: &str) -> Verification {
    match chain.parse::<ChainId>() {
        Ok(chain) => verify_for(chain, signer, message, signature),
        Err(()) => Verification::failed(ChainError::UnsupportedChain(chain.to_string()).to_string()),
    }
}

/// Verify a signature for an already-resolved chain family
pub fn verify_for(
    chain: ChainId,
    signer: &str,
    message: &str,
    signature: &str,
) -> Verification {
    match chain.verifier().verify(signer, message, signature) {
        Ok(()) => Verification::ok(),
        Err(e) => Verification::failed(e.to_string()),
    }
}

/// Chain family a payment network settles on
pub fn chain_for_network(network: &str) -> Option<ChainId> {
    match network {
        "base" | "base-sepolia" | "ethereum" | "sepolia" => Some(ChainId::Evm),
        "solana" | "solana-devnet" | "solana-mainnet" => Some(ChainId::Solana),
        _ => None,
    }
}

/// EVM personal-message verifier: EIP-191 prefix, Keccak-256, secp256k1
/// address recovery compared case-insensitively against the claimed address.
pub struct EvmVerifier;

impl ChainVerifier for EvmVerifier {
    fn verify(&self, signer: &str, message: &str, signature: &str) -> Result<(), ChainError> {
        let sig_hex = signature.strip_prefix("0x").unwrap_or(signature);
        let sig_bytes = hex::decode(sig_hex)
            .map_err(|e| ChainError::InvalidFormat(format!("invalid hex signature: {e}")))?;

        if sig_bytes.len() != 65 {
            return Err(ChainError::InvalidLength {
                expected: 65,
                actual: sig_bytes.len(),
            });
        }

        let recovery_byte = match sig_bytes[64] {
            v @ (0 | 1) => v,
            v @ (27 | 28) => v - 27,
            v => {
                return Err(ChainError::InvalidFormat(format!(
                    "invalid recovery id byte: {v}"
                )))
            }
        };
        let recovery_id = RecoveryId::try_from(recovery_byte)
            .map_err(|e| ChainError::InvalidFormat(format!("invalid recovery id: {e}")))?;

        let sig = K256Signature::from_slice(&sig_bytes[..64])
            .map_err(|e| ChainError::InvalidFormat(format!("invalid ECDSA signature: {e}")))?;

        let prehash = personal_message_hash(message);
        let recovered = K256VerifyingKey::recover_from_prehash(&prehash, &sig, recovery_id)
            .map_err(|_| ChainError::VerificationFailed)?;

        let recovered_address = evm_address(&recovered);
        let claimed = signer.strip_prefix("0x").unwrap_or(signer);
        let recovered_hex = recovered_address.strip_prefix("0x").unwrap_or(&recovered_address);

        if recovered_hex.eq_ignore_ascii_case(claimed) {
            Ok(())
        } else {
            Err(ChainError::SignerMismatch {
                recovered: recovered_address,
                claimed: signer.to_string(),
            })
        }
    }
}

/// Keccak-256 over the EIP-191 personal-message envelope
pub fn personal_message_hash(message: &str) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(format!("\x19Ethereum Signed Message:\n{}", message.len()));
    hasher.update(message.as_bytes());
    hasher.finalize().into()
}

/// Hex address derived from an uncompressed secp256k1 public key
pub fn evm_address(key: &K256VerifyingKey) -> String {
    let point = key.to_encoded_point(false);
    let digest = Keccak256::digest(&point.as_bytes()[1..]);
    format!("0x{}", hex::encode(&digest[12..]))
}

/// Solana verifier: base58 Ed25519 public key, 64-byte detached signature
/// (base58 or base64) over the UTF-8 message bytes. Direct check, no recovery.
pub struct SolanaVerifier;

impl ChainVerifier for SolanaVerifier {
    fn verify(&self, signer: &str, message: &str, signature: &str) -> Result<(), ChainError> {
        let key_bytes = bs58::decode(signer)
            .into_vec()
            .map_err(|e| ChainError::InvalidIdentity(format!("invalid base58 key: {e}")))?;

        let key_array: [u8; 32] = key_bytes.try_into().map_err(|v: Vec<u8>| {
            ChainError::InvalidLength {
                expected: 32,
                actual: v.len(),
            }
        })?;

        let verifying_key = Ed25519VerifyingKey::from_bytes(&key_array)
            .map_err(|e| ChainError::InvalidIdentity(format!("invalid Ed25519 key: {e}")))?;

        let sig_bytes = decode_solana_signature(signature)?;
        let sig_array: [u8; 64] = sig_bytes.try_into().map_err(|v: Vec<u8>| {
            ChainError::InvalidLength {
                expected: 64,
                actual: v.len(),
            }
        })?;

        let sig = Ed25519Signature::from_bytes(&sig_array);
        verifying_key
            .verify(message.as_bytes(), &sig)
            .map_err(|_| ChainError::VerificationFailed)
    }
}

/// Signatures arrive base58 from Solana tooling and base64 from browser
/// wallets; accept either encoding.
fn decode_solana_signature(signature: &str) -> Result<Vec<u8>, ChainError> {
    if let Ok(bytes) = bs58::decode(signature).into_vec() {
        if bytes.len() == 64 {
            return Ok(bytes);
        }
    }
    STANDARD
        .decode(signature)
        .map_err(|e| ChainError::InvalidFormat(format!("signature is neither base58 nor base64: {e}")))
}

#[cfg(test)]
pub mod test_keys {
    //! Keypair and signing helpers shared by the crate's test suites.

    use super::*;
    use ed25519_dalek::{Signer as _, SigningKey as Ed25519SigningKey};
    use k256::ecdsa::SigningKey as K256SigningKey;
    use rand::rngs::OsRng;

    /// Generate an EVM keypair, returning the signing key and 0x-prefixed address
    pub fn evm_keypair() -> (K256SigningKey, String) {
        let signing_key = K256SigningKey::random(&mut OsRng);
        let address = evm_address(signing_key.verifying_key());
        (signing_key, address)
    }

    /// Produce a 65-byte `r||s||v` personal-message signature, hex encoded
    pub fn evm_sign(signing_key: &K256SigningKey, message: &str) -> String {
        let prehash = personal_message_hash(message);
        let (sig, recovery_id) = signing_key
            .sign_prehash_recoverable(&prehash)
            .expect("sign prehash");
        let mut bytes = sig.to_bytes().to_vec();
        bytes.push(27 + recovery_id.to_byte());
        format!("0x{}", hex::encode(bytes))
    }

    /// Generate a Solana keypair, returning the signing key and base58 public key
    pub fn solana_keypair() -> (Ed25519SigningKey, String) {
        let signing_key = Ed25519SigningKey::generate(&mut OsRng);
        let public_key = bs58::encode(signing_key.verifying_key().as_bytes()).into_string();
        (signing_key, public_key)
    }

    /// Produce a base58 detached signature over the message bytes
    pub fn solana_sign(signing_key: &Ed25519SigningKey, message: &str) -> String {
        let sig = signing_key.sign(message.as_bytes());
        bs58::encode(sig.to_bytes()).into_string()
    }
}
