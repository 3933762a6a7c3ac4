use async_trait::async_trait;
use serde::Deserialize;

use super::TelephonyProvider;
use crate::config::TelephonyConfig;
use crate::errors::TelephonyError;

/// Successful `Calls.json` response (subset of fields we care about).
#[derive(Debug, Deserialize)]
struct CallResource {
    sid: String,
}

/// Error body Twilio returns on 4xx/5xx.
#[derive(Debug, Deserialize)]
struct TwilioErrorBody {
    #[serde(default)]
    message: Option<String>,
}

pub struct TwilioClient {
    client: reqwest::Client,
    api_base: String,
    account_sid: String,
    auth_token: String,
    from_number: String,
}

impl TwilioClient {
    /// `None` unless the account SID, auth token and caller number are all present.
    pub fn from_config(config: &TelephonyConfig) -> Option<Self> {
        Some(Self {
            client: reqwest::Client::new(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            account_sid: config.account_sid.clone()?,
            auth_token: config.auth_token.clone()?,
            from_number: config.from_number.clone()?,
        })
    }

    fn calls_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Calls.json",
            self.api_base, self.account_sid
        )
    }
}

#[async_trait]
impl TelephonyProvider for TwilioClient {
    fn is_configured(&self) -> bool {
        true
    }

    async fn originate(&self, to: &str, callback_url: &str) -> Result<String, TelephonyError> {
        let resp = self
            .client
            .post(self.calls_url())
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[
                ("To", to),
                ("From", self.from_number.as_str()),
                ("Url", callback_url),
                ("Method", "POST"),
            ])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<TwilioErrorBody>(&body)
                .ok()
                .and_then(|b| b.message)
                .unwrap_or(body);
            tracing::error!(status = status.as_u16(), %message, "Twilio rejected call");
            return Err(TelephonyError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let call: CallResource = resp.json().await?;
        tracing::info!(call_sid = %call.sid, "Outbound call initiated");
        Ok(call.sid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        Form, Json, Router,
        extract::{Path, State},
        http::{HeaderMap, StatusCode},
        response::IntoResponse,
        routing::post,
    };
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    type Captured = Arc<Mutex<Vec<(String, HashMap<String, String>, bool)>>>;

    async fn create_call(
        State(captured): State<Captured>,
        Path(sid): Path<String>,
        headers: HeaderMap,
        Form(form): Form<HashMap<String, String>>,
    ) -> impl IntoResponse {
        let authed = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("Basic "));
        let to = form.get("To").cloned().unwrap_or_default();
        captured.lock().unwrap().push((sid, form, authed));
        if to == "+10000000000" {
            let message = "The 'To' number is not a valid phone number.";
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "code": 21211, "message": message })),
            );
        }
        (StatusCode::CREATED, Json(json!({ "sid": "CA0123456789" })))
    }

    async fn start_fake() -> Option<(String, Captured)> {
        let captured: Captured = Arc::new(Mutex::new(Vec::new()));
        let app = Router::new()
            .route("/2010-04-01/Accounts/{sid}/Calls.json", post(create_call))
            .with_state(captured.clone());
        let listener = match tokio::net::TcpListener::bind("127.0.0.1:0").await {
            Ok(l) => l,
            Err(e) => {
                eprintln!("Skipping twilio test (sandbox): {:?}", e);
                return None;
            }
        };
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        Some((format!("http://{}", addr), captured))
    }

    fn client_for(base: &str) -> TwilioClient {
        TwilioClient::from_config(&TelephonyConfig {
            account_sid: Some("AC123".into()),
            auth_token: Some("secret".into()),
            from_number: Some("+15550001111".into()),
            api_base: base.to_string(),
        })
        .unwrap()
    }

    #[test]
    fn test_from_config_requires_all_fields() {
        let config = TelephonyConfig {
            account_sid: Some("AC123".into()),
            auth_token: None,
            from_number: Some("+15550001111".into()),
            ..Default::default()
        };
        assert!(TwilioClient::from_config(&config).is_none());
    }

    #[tokio::test]
    async fn test_originate_posts_call_form() {
        let Some((base, captured)) = start_fake().await else { return };
        let client = client_for(&base);
        let sid = client
            .originate("+14155552671", "https://app.test/voice?leadId=L1")
            .await
            .unwrap();
        assert_eq!(sid, "CA0123456789");

        let calls = captured.lock().unwrap();
        assert_eq!(calls.len(), 1);
        let (account, form, authed) = &calls[0];
        assert_eq!(account, "AC123");
        assert!(authed);
        assert_eq!(form["To"], "+14155552671");
        assert_eq!(form["From"], "+15550001111");
        assert_eq!(form["Url"], "https://app.test/voice?leadId=L1");
        assert_eq!(form["Method"], "POST");
    }

    #[tokio::test]
    async fn test_rejection_surfaces_provider_message() {
        let Some((base, _)) = start_fake().await else { return };
        let err = client_for(&base)
            .originate("+10000000000", "https://app.test/voice")
            .await
            .unwrap_err();
        match err {
            TelephonyError::Rejected { status, message } => {
                assert_eq!(status, 400);
                assert!(message.contains("not a valid phone number"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unreachable_provider_is_http_error() {
        let err = client_for("http://127.0.0.1:1")
            .originate("+14155552671", "https://app.test/voice")
            .await
            .unwrap_err();
        assert!(matches!(err, TelephonyError::Http(_)));
    }
}
