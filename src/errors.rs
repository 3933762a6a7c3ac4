//! Typed error hierarchy for leadcall.
//!
//! Four enums cover the subsystems:
//! - `StoreError`: lead store backends
//! - `TelephonyError`: call origination against the telephony provider
//! - `TextGenError`: generative text backend (always swallowed by the adapter)
//! - `CallError`: outbound call initiation, the union the HTTP layer maps to status codes

use thiserror::Error;

/// Errors from a lead store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{backend} store is not configured: {reason}")]
    NotConfigured {
        backend: &'static str,
        reason: String,
    },

    #[error("Lead {id} not found")]
    LeadNotFound { id: String },

    #[error("Database error: {0}")]
    Database(#[source] anyhow::Error),

    #[error("HTTP error talking to {backend}: {source}")]
    Http {
        backend: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{backend} returned an unexpected response: {message}")]
    Backend {
        backend: &'static str,
        message: String,
    },
}

impl StoreError {
    /// True when the backend was never set up, as opposed to failing at runtime.
    pub fn is_not_configured(&self) -> bool {
        matches!(self, StoreError::NotConfigured { .. })
    }
}

/// Errors from the telephony provider.
#[derive(Debug, Error)]
pub enum TelephonyError {
    #[error(
        "Telephony is not configured. Please set TWILIO_ACCOUNT_SID, TWILIO_AUTH_TOKEN and TWILIO_PHONE_NUMBER."
    )]
    NotConfigured,

    #[error("Failed to reach telephony provider: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Telephony provider rejected the call (status {status}): {message}")]
    Rejected { status: u16, message: String },
}

/// Errors from the generative text backend.
#[derive(Debug, Error)]
pub enum TextGenError {
    #[error("Text generation request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Text generation backend returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Text generation returned no content")]
    EmptyResponse,

    #[error("Could not parse generated output: {0}")]
    Parse(String),
}

/// Errors from outbound call initiation.
#[derive(Debug, Error)]
pub enum CallError {
    #[error("Phone must be in E.164 format (e.g. +14155552671)")]
    InvalidPhone { input: String },

    #[error("{0}")]
    NotConfigured(String),

    #[error(transparent)]
    Telephony(TelephonyError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<TelephonyError> for CallError {
    fn from(err: TelephonyError) -> Self {
        match err {
            TelephonyError::NotConfigured => CallError::NotConfigured(err.to_string()),
            other => CallError::Telephony(other),
        }
    }
}

impl CallError {
    /// Validation failures are the caller's fault; everything else is ours or the provider's.
    pub fn is_validation(&self) -> bool {
        matches!(self, CallError::InvalidPhone { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_lead_not_found_carries_id() {
        let err = StoreError::LeadNotFound { id: "abc".into() };
        assert!(err.to_string().contains("abc"));
        assert!(!err.is_not_configured());
    }

    #[test]
    fn store_error_not_configured_is_distinct() {
        let err = StoreError::NotConfigured {
            backend: "sheets",
            reason: "GOOGLE_SHEET_ID missing".into(),
        };
        assert!(err.is_not_configured());
        assert!(err.to_string().contains("sheets"));
    }

    #[test]
    fn telephony_not_configured_maps_to_call_not_configured() {
        let err: CallError = TelephonyError::NotConfigured.into();
        match &err {
            CallError::NotConfigured(msg) => assert!(msg.contains("TWILIO_ACCOUNT_SID")),
            _ => panic!("Expected NotConfigured"),
        }
        assert!(!err.is_validation());
    }

    #[test]
    fn telephony_rejection_stays_a_provider_error() {
        let err: CallError = TelephonyError::Rejected {
            status: 400,
            message: "invalid To".into(),
        }
        .into();
        assert!(matches!(err, CallError::Telephony(TelephonyError::Rejected { status: 400, .. })));
        assert!(err.to_string().contains("invalid To"));
    }

    #[test]
    fn invalid_phone_is_validation() {
        let err = CallError::InvalidPhone {
            input: "555".into(),
        };
        assert!(err.is_validation());
        assert!(err.to_string().contains("E.164"));
    }

    #[test]
    fn store_error_converts_into_call_error() {
        let err: CallError = StoreError::LeadNotFound { id: "x".into() }.into();
        assert!(matches!(err, CallError::Store(StoreError::LeadNotFound { .. })));
    }

    #[test]
    fn all_error_types_implement_std_error_trait() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&StoreError::LeadNotFound { id: "1".into() });
        assert_std_error(&TelephonyError::NotConfigured);
        assert_std_error(&TextGenError::EmptyResponse);
        assert_std_error(&CallError::NotConfigured("x".into()));
    }
}
