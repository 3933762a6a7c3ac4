//! Telephony provider seam.
//!
//! The outbound initiator only needs one capability from the provider: place a call to a
//! number and have the provider fetch the voice document from a callback URL.

pub mod twilio;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::TelephonyConfig;
use crate::errors::TelephonyError;

pub use twilio::TwilioClient;

pub type SharedTelephony = Arc<dyn TelephonyProvider>;

#[async_trait]
pub trait TelephonyProvider: Send + Sync {
    /// Whether credentials and a caller number are present.
    fn is_configured(&self) -> bool;

    /// Place a call to `to`; the provider will POST to `callback_url` when answered.
    /// Returns the provider's call identifier.
    async fn originate(&self, to: &str, callback_url: &str) -> Result<String, TelephonyError>;
}

/// Provider used when no credentials are configured. Every call attempt fails with
/// `TelephonyError::NotConfigured`.
pub struct Unconfigured;

#[async_trait]
impl TelephonyProvider for Unconfigured {
    fn is_configured(&self) -> bool {
        false
    }

    async fn originate(&self, _to: &str, _callback_url: &str) -> Result<String, TelephonyError> {
        Err(TelephonyError::NotConfigured)
    }
}

/// Twilio when configured, otherwise the unconfigured stand-in.
pub fn from_config(config: &TelephonyConfig) -> SharedTelephony {
    match TwilioClient::from_config(config) {
        Some(client) => Arc::new(client),
        None => {
            tracing::warn!(
                "Twilio not configured. Set TWILIO_ACCOUNT_SID, TWILIO_AUTH_TOKEN and TWILIO_PHONE_NUMBER"
            );
            Arc::new(Unconfigured)
        }
    }
}
