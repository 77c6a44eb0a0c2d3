use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::prompt::ChatMessage;

// ── Transport seam ────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

/// One outbound POST. Abstracted so tests can count invocations and simulate
/// a transport that never resolves.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn post(&self, url: &str, api_key: &str, body: &Value) -> Result<TransportResponse>;
}

pub struct HttpTransport {
    http: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post(&self, url: &str, api_key: &str, body: &Value) -> Result<TransportResponse> {
        let resp = self
            .http
            .post(url)
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {api_key}"))
            .json(body)
            .send()
            .await?;
        let status = resp.status().as_u16();
        let body = resp.text().await?;
        Ok(TransportResponse { status, body })
    }
}

// ── Completion client ─────────────────────────────────────────────────────────

/// Wall-clock budget for one completion request.
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

pub struct CompletionClient<T: Transport> {
    transport: T,
}

impl<T: Transport> CompletionClient<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    /// Issue one completion request. Single attempt, no retry.
    ///
    /// Preconditions (api key, url, model) are checked before any network
    /// I/O. The request races a 30-second timer; the loser is abandoned, not
    /// cancelled at the transport level. Returns the parsed response body —
    /// callers extract the message content with [`extract_content`].
    pub async fn complete(&self, messages: &[ChatMessage], config: &Config) -> Result<Value> {
        if config.api_key.is_empty() {
            return Err(Error::Configuration("API key is not configured".to_string()));
        }
        if config.api_url.is_empty() {
            return Err(Error::Configuration("API URL is not configured".to_string()));
        }
        if config.model.is_empty() {
            return Err(Error::Configuration("model is not configured".to_string()));
        }

        let body = serde_json::json!({
            "model": config.model,
            "messages": messages,
            "temperature": config.temperature,
            "max_tokens": config.max_tokens,
        });

        let request = self.transport.post(&config.api_url, &config.api_key, &body);
        let resp = match tokio::time::timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS), request)
            .await
        {
            Ok(resp) => resp?,
            Err(_) => return Err(Error::Timeout(REQUEST_TIMEOUT_SECS)),
        };

        if !(200..300).contains(&resp.status) {
            return Err(Error::Provider(provider_error_message(
                resp.status,
                &resp.body,
            )));
        }

        serde_json::from_str(&resp.body)
            .map_err(|e| Error::MalformedResponse(format!("response body is not JSON: {e}")))
    }
}

/// Pull `choices[0].message.content` out of a provider response. An absent
/// path is a caller-observable defect, not something to swallow.
pub fn extract_content(response: &Value) -> Result<&str> {
    response
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            Error::MalformedResponse(
                "response has no choices[0].message.content".to_string(),
            )
        })
}

/// Human-readable message for a non-2xx response: the provider's
/// `error.message` field when the body parses, else "<status> <reason>".
fn provider_error_message(status: u16, body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        if let Some(message) = value.pointer("/error/message").and_then(Value::as_str) {
            return message.to_string();
        }
    }
    let reason = reqwest::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("Unknown Status");
    format!("{status} {reason}")
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::Role;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Records every call; replies with a canned response.
    struct RecordingTransport {
        calls: AtomicUsize,
        reply: TransportResponse,
        last_body: Mutex<Option<Value>>,
    }

    impl RecordingTransport {
        fn replying(status: u16, body: &str) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                reply: TransportResponse {
                    status,
                    body: body.to_string(),
                },
                last_body: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn post(&self, _url: &str, _key: &str, body: &Value) -> Result<TransportResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_body.lock().unwrap() = Some(body.clone());
            Ok(self.reply.clone())
        }
    }

    /// A transport that never resolves.
    struct HangingTransport;

    #[async_trait]
    impl Transport for HangingTransport {
        async fn post(&self, _url: &str, _key: &str, _body: &Value) -> Result<TransportResponse> {
            std::future::pending().await
        }
    }

    fn configured() -> Config {
        Config {
            api_key: "k".to_string(),
            api_url: "https://x".to_string(),
            model: "m".to_string(),
            ..Config::default()
        }
    }

    fn ok_body(content: &str) -> String {
        serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": content}}]
        })
        .to_string()
    }

    #[tokio::test]
    async fn missing_api_key_fails_before_any_network_call() {
        let transport = RecordingTransport::replying(200, &ok_body("unused"));
        let mut config = configured();
        config.api_key.clear();

        let client = CompletionClient::new(transport);
        let err = client.complete(&[], &config).await.unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert_eq!(client.transport.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_url_and_model_also_fail_early() {
        for strip in [
            (|c: &mut Config| c.api_url.clear()) as fn(&mut Config),
            |c: &mut Config| c.model.clear(),
        ] {
            let mut config = configured();
            strip(&mut config);
            let client = CompletionClient::new(RecordingTransport::replying(200, "{}"));
            let err = client.complete(&[], &config).await.unwrap_err();
            assert!(matches!(err, Error::Configuration(_)));
            assert_eq!(client.transport.calls.load(Ordering::SeqCst), 0);
        }
    }

    #[tokio::test]
    async fn request_body_carries_model_temperature_and_max_tokens() {
        let client = CompletionClient::new(RecordingTransport::replying(200, &ok_body("hi")));
        let messages = vec![ChatMessage::new(Role::User, "ping")];
        client.complete(&messages, &configured()).await.unwrap();

        let body = client.transport.last_body.lock().unwrap().clone().unwrap();
        assert_eq!(body["model"], "m");
        assert_eq!(body["temperature"], 0.7);
        assert_eq!(body["max_tokens"], 1024);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "ping");
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_transport_surfaces_timeout_at_thirty_seconds() {
        let client = CompletionClient::new(HangingTransport);
        let err = client.complete(&[], &configured()).await.unwrap_err();
        assert!(matches!(err, Error::Timeout(REQUEST_TIMEOUT_SECS)));
    }

    #[tokio::test]
    async fn provider_error_message_extracted_from_body() {
        let client = CompletionClient::new(RecordingTransport::replying(
            401,
            r#"{"error": {"message": "Incorrect API key provided"}}"#,
        ));
        let err = client.complete(&[], &configured()).await.unwrap_err();
        match err {
            Error::Provider(msg) => assert_eq!(msg, "Incorrect API key provided"),
            other => panic!("expected Provider, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unparseable_error_body_falls_back_to_status_line() {
        let client =
            CompletionClient::new(RecordingTransport::replying(500, "<html>oops</html>"));
        let err = client.complete(&[], &configured()).await.unwrap_err();
        match err {
            Error::Provider(msg) => assert_eq!(msg, "500 Internal Server Error"),
            other => panic!("expected Provider, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn success_returns_parsed_body() {
        let client = CompletionClient::new(RecordingTransport::replying(200, &ok_body("答复")));
        let value = client.complete(&[], &configured()).await.unwrap();
        assert_eq!(extract_content(&value).unwrap(), "答复");
    }

    #[test]
    fn extract_content_flags_malformed_responses() {
        for raw in [
            serde_json::json!({}),
            serde_json::json!({"choices": []}),
            serde_json::json!({"choices": [{"message": {}}]}),
            serde_json::json!({"choices": [{"message": {"content": 42}}]}),
        ] {
            assert!(matches!(
                extract_content(&raw),
                Err(Error::MalformedResponse(_))
            ));
        }
    }
}
