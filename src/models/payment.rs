use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// State machine for one paid operation.
///
/// `Settled` is an external fact reported out-of-band; the registry records it
/// for audit bookkeeping but never observes the chain itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentState {
    None,
    Challenged,
    Verified,
    Settled,
}

/// Decoded payment proof carried in the payment header.
///
/// Pure data: validity is a function of these fields plus the expected charge
/// for the operation being paid for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PaymentProof {
    pub scheme: String,
    pub network: String,
    pub asset: String,
    pub amount: String,
    pub pay_to: String,
    pub signer: String,
    /// Epoch milliseconds the proof was produced at
    pub timestamp: i64,
    pub nonce: String,
    pub signature: String,
    /// Exact string the signature covers
    pub message: String,
}

/// Errors decoding a payment header into a [`PaymentProof`]
#[derive(Debug, Error)]
pub enum PaymentHeaderError {
    #[error("Invalid base64: {0}")]
    InvalidBase64(#[from] base64::DecodeError),
    #[error("Invalid payment JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

impl PaymentProof {
    /// Encode as the base64 JSON header value
    pub fn to_header(&self) -> String {
        // Serialization of a plain struct cannot fail
        let json = serde_json::to_vec(self).unwrap_or_default();
        STANDARD.encode(json)
    }

    /// Decode a base64 JSON header value
    pub fn from_header(header: &str) -> Result<Self, PaymentHeaderError> {
        let bytes = STANDARD.decode(header.trim())?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// One acceptable way to pay for an operation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirements {
    pub scheme: String,
    pub network: String,
    pub asset: String,
    pub amount: String,
    pub pay_to: String,
    pub description: String,
}

/// Machine-readable 402 challenge body; multiple chains offered at once
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentChallenge {
    pub error: String,
    pub accepts: Vec<PaymentRequirements>,
}
