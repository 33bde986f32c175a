//! Payment Challenge/Verifier
//!
//! x402 challenge/response gate for paid operations. A request with no
//! payment header is in state `None` and receives a 402 challenge
//! (`Challenged`); a request with a header moves to `Verified` only when
//! every check passes — structure, scheme, network, asset, amount, payee,
//! timestamp skew and finally the chain signature. `Settled` is recorded
//! later from an out-of-band completion report carrying the transaction
//! hash; this service never watches the chain itself.

use chrono::{Duration, Utc};
use thiserror::Error;

use crate::config::Config;
use crate::models::{PaymentChallenge, PaymentProof, PaymentRequirements};
use crate::services::chain;

/// Custom request header carrying the base64 JSON payment proof
pub const PAYMENT_HEADER: &str = "X-Payment";

/// Errors rejecting a payment proof; each names the failing check
#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("Malformed payment header: {0}")]
    MalformedHeader(String),

    #[error("Unsupported payment scheme: {0}")]
    UnsupportedScheme(String),

    #[error("Unsupported payment network: {0}")]
    UnsupportedNetwork(String),

    #[error("Unsupported payment asset: {0}")]
    UnsupportedAsset(String),

    #[error("Payment amount mismatch: expected {expected}, got {actual}")]
    AmountMismatch { expected: String, actual: String },

    #[error("Payment directed to {actual}, expected {expected}")]
    PayToMismatch { expected: String, actual: String },

    #[error("Payment timestamp outside the accepted {skew_secs}s window")]
    TimestampSkew { skew_secs: i64 },

    #[error("Payment message does not cover the {0}")]
    MessageBinding(&'static str),

    #[error("Payment signature invalid: {0}")]
    SignatureInvalid(String),
}

impl PaymentError {
    /// Name of the failing check, surfaced as the rejection hint
    pub fn check(&self) -> &'static str {
        match self {
            Self::MalformedHeader(_) => "header",
            Self::UnsupportedScheme(_) => "scheme",
            Self::UnsupportedNetwork(_) => "network",
            Self::UnsupportedAsset(_) => "asset",
            Self::AmountMismatch { .. } => "amount",
            Self::PayToMismatch { .. } => "payTo",
            Self::TimestampSkew { .. } => "timestamp",
            Self::MessageBinding(_) => "message",
            Self::SignatureInvalid(_) => "signature",
        }
    }
}

/// Configuration for payment verification
#[derive(Debug, Clone)]
pub struct PaymentConfig {
    /// Accepted clock skew on proof timestamps
    pub skew: Duration,
    pub evm_network: String,
    pub evm_pay_to: String,
    pub solana_network: String,
    pub solana_pay_to: String,
    pub asset: String,
}

impl PaymentConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            skew: Duration::seconds(config.payment_skew_secs),
            evm_network: "base-sepolia".to_string(),
            evm_pay_to: config.evm_pay_to.clone(),
            solana_network: "solana-devnet".to_string(),
            solana_pay_to: config.solana_pay_to.clone(),
            asset: "USDC".to_string(),
        }
    }
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Challenge construction and proof verification for paid routes
#[derive(Debug, Clone)]
pub struct PaymentService {
    config: PaymentConfig,
}

impl PaymentService {
    pub fn new(config: PaymentConfig) -> Self {
        Self { config }
    }

    /// Build the 402 challenge for an operation priced at `amount`,
    /// offering every supported chain simultaneously.
    pub fn challenge(&self, amount: &str, description: &str) -> PaymentChallenge {
        PaymentChallenge {
            error: "Payment required".to_string(),
            accepts: vec![
                PaymentRequirements {
                    scheme: "exact".to_string(),
                    network: self.config.evm_network.clone(),
                    asset: self.config.asset.clone(),
                    amount: amount.to_string(),
                    pay_to: self.config.evm_pay_to.clone(),
                    description: description.to_string(),
                },
                PaymentRequirements {
                    scheme: "exact".to_string(),
                    network: self.config.solana_network.clone(),
                    asset: self.config.asset.clone(),
                    amount: amount.to_string(),
                    pay_to: self.config.solana_pay_to.clone(),
                    description: description.to_string(),
                },
            ],
        }
    }

    /// Verify an inbound payment header against the expected charge.
    ///
    /// Returns the decoded proof in the `Verified` state, or the first
    /// failing check. Verification failures are caller-correctable 4xx
    /// conditions, never escalated to 500.
    pub fn verify(
        &self,
        header_value: &str,
        expected_amount: &str,
    ) -> Result<PaymentProof, PaymentError> {
        let proof = PaymentProof::from_header(header_value)
            .map_err(|e| PaymentError::MalformedHeader(e.to_string()))?;

        if proof.scheme != "exact" {
            return Err(PaymentError::UnsupportedScheme(proof.scheme));
        }

        let chain_id = chain::chain_for_network(&proof.network)
            .ok_or_else(|| PaymentError::UnsupportedNetwork(proof.network.clone()))?;

        if !proof.asset.eq_ignore_ascii_case(&self.config.asset) {
            return Err(PaymentError::UnsupportedAsset(proof.asset));
        }

        if !amounts_equal(&proof.amount, expected_amount) {
            return Err(PaymentError::AmountMismatch {
                expected: expected_amount.to_string(),
                actual: proof.amount,
            });
        }

        let expected_pay_to = match chain_id {
            crate::models::ChainId::Evm => &self.config.evm_pay_to,
            crate::models::ChainId::Solana => &self.config.solana_pay_to,
        };
        if !proof.pay_to.eq_ignore_ascii_case(expected_pay_to) {
            return Err(PaymentError::PayToMismatch {
                expected: expected_pay_to.clone(),
                actual: proof.pay_to,
            });
        }

        let now_ms = Utc::now().timestamp_millis();
        let skew_ms = self.config.skew.num_milliseconds();
        if (now_ms - proof.timestamp).abs() > skew_ms {
            return Err(PaymentError::TimestampSkew {
                skew_secs: self.config.skew.num_seconds(),
            });
        }

        // The signed message must cover the economic content of the proof,
        // otherwise any old signature from the payer would replay here.
        if !proof.message.contains(&proof.amount) {
            return Err(PaymentError::MessageBinding("amount"));
        }
        if !proof.message.contains(&proof.nonce) {
            return Err(PaymentError::MessageBinding("nonce"));
        }

        let outcome =
            chain::verify_for(chain_id, &proof.signer, &proof.message, &proof.signature);
        if !outcome.verified {
            return Err(PaymentError::SignatureInvalid(
                outcome
                    .reason
                    .unwrap_or_else(|| "signature did not verify".to_string()),
            ));
        }

        Ok(proof)
    }
}

fn amounts_equal(actual: &str, expected: &str) -> bool {
    if actual == expected {
        return true;
    }
    match (actual.parse::<f64>(), expected.parse::<f64>()) {
        (Ok(a), Ok(e)) => (a - e).abs() < 1e-12,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::chain::test_keys::*;

    fn service() -> PaymentService {
        PaymentService::new(PaymentConfig::default())
    }

    fn evm_proof(amount: &str) -> PaymentProof {
        let (signing_key, address) = evm_keypair();
        let nonce = uuid::Uuid::new_v4().to_string();
        let message = format!("pay {amount} USDC to agentmesh nonce {nonce}");
        let signature = evm_sign(&signing_key, &message);
        PaymentProof {
            scheme: "exact".to_string(),
            network: "base-sepolia".to_string(),
            asset: "USDC".to_string(),
            amount: amount.to_string(),
            pay_to: PaymentConfig::default().evm_pay_to,
            signer: address,
            timestamp: Utc::now().timestamp_millis(),
            nonce,
            signature,
            message,
        }
    }

    fn solana_proof(amount: &str) -> PaymentProof {
        let (signing_key, public_key) = solana_keypair();
        let nonce = uuid::Uuid::new_v4().to_string();
        let message = format!("pay {amount} USDC to agentmesh nonce {nonce}");
        let signature = solana_sign(&signing_key, &message);
        PaymentProof {
            scheme: "exact".to_string(),
            network: "solana-devnet".to_string(),
            asset: "USDC".to_string(),
            amount: amount.to_string(),
            pay_to: PaymentConfig::default().solana_pay_to,
            signer: public_key,
            timestamp: Utc::now().timestamp_millis(),
            nonce,
            signature,
            message,
        }
    }

    #[test]
    fn test_challenge_offers_both_chains() {
        let challenge = service().challenge("0.03", "nutrition_planning at pro tier");
        assert_eq!(challenge.accepts.len(), 2);

        let networks: Vec<&str> = challenge
            .accepts
            .iter()
            .map(|r| r.network.as_str())
            .collect();
        assert!(networks.contains(&"base-sepolia"));
        assert!(networks.contains(&"solana-devnet"));
        assert!(challenge.accepts.iter().all(|r| r.amount == "0.03"));
        assert!(challenge.accepts.iter().all(|r| r.scheme == "exact"));
    }

    #[test]
    fn test_verify_evm_proof() {
        let proof = evm_proof("0.03");
        let header = proof.to_header();
        let verified = service().verify(&header, "0.03").expect("verify");
        assert_eq!(verified, proof);
    }

    #[test]
    fn test_verify_solana_proof() {
        let proof = solana_proof("0.01");
        let header = proof.to_header();
        assert!(service().verify(&header, "0.01").is_ok());
    }

    #[test]
    fn test_round_trip_through_header_is_lossless() {
        let proof = evm_proof("0.05");
        let decoded = PaymentProof::from_header(&proof.to_header()).expect("decode");
        assert_eq!(decoded, proof);
    }

    #[test]
    fn test_malformed_header_named() {
        let err = service().verify("%%%not-base64%%%", "0.01").unwrap_err();
        assert_eq!(err.check(), "header");
    }

    #[test]
    fn test_unsupported_scheme_named() {
        let mut proof = evm_proof("0.01");
        proof.scheme = "stream".to_string();
        let err = service().verify(&proof.to_header(), "0.01").unwrap_err();
        assert_eq!(err.check(), "scheme");
    }

    #[test]
    fn test_unsupported_network_named() {
        let mut proof = evm_proof("0.01");
        proof.network = "dogechain".to_string();
        let err = service().verify(&proof.to_header(), "0.01").unwrap_err();
        assert_eq!(err.check(), "network");
    }

    #[test]
    fn test_amount_mismatch_named() {
        let proof = evm_proof("0.01");
        let err = service().verify(&proof.to_header(), "0.03").unwrap_err();
        assert_eq!(err.check(), "amount");
        assert!(err.to_string().contains("0.03"));
    }

    #[test]
    fn test_equivalent_amount_representations_accepted() {
        let proof = evm_proof("0.030");
        // Message binding still references "0.030"
        assert!(service().verify(&proof.to_header(), "0.03").is_ok());
    }

    #[test]
    fn test_pay_to_mismatch_named() {
        let mut proof = evm_proof("0.01");
        proof.pay_to = "0x0000000000000000000000000000000000000001".to_string();
        let err = service().verify(&proof.to_header(), "0.01").unwrap_err();
        assert_eq!(err.check(), "payTo");
    }

    #[test]
    fn test_stale_timestamp_named() {
        let mut proof = evm_proof("0.01");
        proof.timestamp = Utc::now().timestamp_millis() - 3_600_000;
        let err = service().verify(&proof.to_header(), "0.01").unwrap_err();
        assert_eq!(err.check(), "timestamp");
    }

    #[test]
    fn test_future_timestamp_named() {
        let mut proof = evm_proof("0.01");
        proof.timestamp = Utc::now().timestamp_millis() + 3_600_000;
        let err = service().verify(&proof.to_header(), "0.01").unwrap_err();
        assert_eq!(err.check(), "timestamp");
    }

    #[test]
    fn test_unbound_message_rejected() {
        let (signing_key, address) = evm_keypair();
        let message = "hello world".to_string();
        let signature = evm_sign(&signing_key, &message);
        let mut proof = evm_proof("0.01");
        proof.signer = address;
        proof.message = message;
        proof.signature = signature;

        let err = service().verify(&proof.to_header(), "0.01").unwrap_err();
        assert_eq!(err.check(), "message");
    }

    #[test]
    fn test_zero_signature_rejected_at_verification() {
        // A deliberately invalid all-zero signature must never verify
        let mut proof = solana_proof("0.01");
        proof.signature = bs58::encode([0u8; 64]).into_string();

        let err = service().verify(&proof.to_header(), "0.01").unwrap_err();
        assert_eq!(err.check(), "signature");
    }

    #[test]
    fn test_wrong_signer_rejected() {
        let (_, other_address) = evm_keypair();
        let mut proof = evm_proof("0.01");
        proof.signer = other_address;

        let err = service().verify(&proof.to_header(), "0.01").unwrap_err();
        assert_eq!(err.check(), "signature");
    }
}
