//! Outbound call initiation: validate the number, create the lead, dial.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::errors::CallError;
use crate::store::SharedStore;
use crate::telephony::SharedTelephony;
use crate::voice::CallState;

static NON_DIAL_CHARS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\d+]").unwrap());

static E164: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\+\d+$").unwrap());

/// Normalize user input to E.164: drop formatting, require a leading `+`.
pub fn to_e164(input: &str) -> Result<String, CallError> {
    let cleaned = NON_DIAL_CHARS.replace_all(input.trim(), "").into_owned();
    if E164.is_match(&cleaned) {
        Ok(cleaned)
    } else {
        Err(CallError::InvalidPhone {
            input: input.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallPlaced {
    pub call_sid: String,
    pub lead_id: String,
}

#[derive(Clone)]
pub struct CallInitiator {
    store: SharedStore,
    telephony: SharedTelephony,
}

impl CallInitiator {
    pub fn new(store: SharedStore, telephony: SharedTelephony) -> Self {
        Self { store, telephony }
    }

    pub fn telephony_configured(&self) -> bool {
        self.telephony.is_configured()
    }

    /// Create a lead for `phone` and ask the provider to call it back on the entry webhook.
    ///
    /// The lead is created before dialing and is kept if dialing fails. Invalid numbers
    /// fail before anything is written or dialed.
    pub async fn initiate(
        &self,
        phone: &str,
        name: Option<&str>,
        base_url: &str,
    ) -> Result<CallPlaced, CallError> {
        let phone_number = to_e164(phone)?;
        let lead_id = self.store.create_lead(&phone_number, name).await?;
        tracing::info!(%lead_id, "Lead created for outbound call");

        let callback = CallState::new(&lead_id).with_name(name).entry_url(base_url);
        let call_sid = match self.telephony.originate(&phone_number, &callback).await {
            Ok(sid) => sid,
            Err(e) => {
                tracing::error!(%lead_id, error = %e, "Call origination failed");
                return Err(e.into());
            }
        };
        tracing::info!(%lead_id, %call_sid, "Call placed");
        Ok(CallPlaced { call_sid, lead_id })
    }
}
