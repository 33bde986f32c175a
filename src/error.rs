use actix_web::{HttpResponse, ResponseError};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

use crate::models::PaymentChallenge;

/// Application-level error type
#[derive(Debug)]
pub enum AppError {
    /// Missing or malformed required fields
    Validation(String),
    /// Unknown agent or booking
    NotFound(String),
    /// Capacity exhausted or duplicate id with a mismatched signer
    Conflict {
        message: String,
        next_available: Option<DateTime<Utc>>,
    },
    /// Signature or payment proof failed; hint names the failing check
    Verification {
        message: String,
        hint: Option<String>,
    },
    /// Paid route called without a payment header
    PaymentRequired(PaymentChallenge),
    /// Persistence or specialist-endpoint failure
    Upstream(String),
    /// Internal server error
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<String>,
    #[serde(
        rename = "nextAvailable",
        skip_serializing_if = "Option::is_none",
        with = "chrono::serde::ts_milliseconds_option"
    )]
    next_available: Option<DateTime<Utc>>,
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation(msg) => write!(f, "{msg}"),
            Self::NotFound(msg) => write!(f, "{msg}"),
            Self::Conflict { message, .. } => write!(f, "{message}"),
            Self::Verification { message, .. } => write!(f, "{message}"),
            Self::PaymentRequired(challenge) => write!(f, "{}", challenge.error),
            Self::Upstream(msg) => write!(f, "Upstream failure: {msg}"),
            Self::Internal(msg) => write!(f, "Internal error: {msg}"),
        }
    }
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        match self {
            Self::Validation(msg) => HttpResponse::BadRequest().json(ErrorBody {
                error: msg.clone(),
                hint: None,
                next_available: None,
            }),
            Self::NotFound(msg) => HttpResponse::NotFound().json(ErrorBody {
                error: msg.clone(),
                hint: None,
                next_available: None,
            }),
            Self::Conflict {
                message,
                next_available,
            } => HttpResponse::Conflict().json(ErrorBody {
                error: message.clone(),
                hint: next_available
                    .map(|_| "Retry once the advertised nextAvailable time passes".to_string()),
                next_available: *next_available,
            }),
            Self::Verification { message, hint } => HttpResponse::BadRequest().json(ErrorBody {
                error: message.clone(),
                hint: hint.clone(),
                next_available: None,
            }),
            Self::PaymentRequired(challenge) => {
                HttpResponse::PaymentRequired().json(challenge.clone())
            }
            Self::Upstream(msg) | Self::Internal(msg) => {
                HttpResponse::InternalServerError().json(ErrorBody {
                    error: msg.clone(),
                    hint: None,
                    next_available: None,
                })
            }
        }
    }
}

impl From<crate::services::registry::RegistryError> for AppError {
    fn from(err: crate::services::registry::RegistryError) -> Self {
        use crate::services::registry::RegistryError;
        match err {
            RegistryError::MissingField(_) | RegistryError::InvalidField { .. } => {
                Self::Validation(err.to_string())
            }
            RegistryError::AgentNotFound(_) => Self::NotFound(err.to_string()),
            RegistryError::TierNotConfigured { .. } => Self::Validation(err.to_string()),
            RegistryError::TierOrdering(_) => Self::Validation(err.to_string()),
            RegistryError::VerificationFailed(_) => Self::Verification {
                message: err.to_string(),
                hint: Some("Provide a signed identity proof from the registered signer".to_string()),
            },
            RegistryError::ReregistrationProofRequired(_) => Self::Verification {
                message: err.to_string(),
                hint: Some(
                    "Re-registering an existing id requires a fresh signed identity proof"
                        .to_string(),
                ),
            },
            RegistryError::SignerMismatch(_) => Self::Conflict {
                message: err.to_string(),
                next_available: None,
            },
            RegistryError::CapacityExhausted { next_available, .. } => {
                let message = err.to_string();
                Self::Conflict {
                    message,
                    next_available,
                }
            }
        }
    }
}

impl From<crate::services::booking::BookingError> for AppError {
    fn from(err: crate::services::booking::BookingError) -> Self {
        use crate::services::booking::BookingError;
        match err {
            BookingError::AgentNotFound(_) | BookingError::BookingNotFound(_) => {
                Self::NotFound(err.to_string())
            }
            BookingError::TierNotOffered { .. } | BookingError::CapabilityNotOffered { .. } => {
                Self::Validation(err.to_string())
            }
            BookingError::NoSlotsAvailable { next_available, .. } => {
                let message = err.to_string();
                Self::Conflict {
                    message,
                    next_available,
                }
            }
            BookingError::BookingExpired(_) => Self::Validation(err.to_string()),
            BookingError::AlreadyCompleted(_) => Self::Conflict {
                message: err.to_string(),
                next_available: None,
            },
            BookingError::Registry(inner) => inner.into(),
        }
    }
}

impl From<crate::services::payment::PaymentError> for AppError {
    fn from(err: crate::services::payment::PaymentError) -> Self {
        let hint = Some(format!("Payment proof failed the {} check", err.check()));
        Self::Verification {
            message: err.to_string(),
            hint,
        }
    }
}
