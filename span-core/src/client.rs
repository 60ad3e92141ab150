//! HTTP implementation of [`RelayApi`] used by agents and controllers.
//!
//! Every request carries a connect timeout and an overall timeout; running
//! out of either surfaces as [`SpanError::TransientNetwork`]. Error bodies
//! from the relay are mapped back onto the variant the relay reported.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::trace;

use crate::api::RelayApi;
use crate::error::{ErrorBody, SpanError};
use crate::protocol::{
    Command, FetchFrameResponse, Frame, PublishAck, PublishFrameRequest, QueuedCommand,
    RegisterRequest, RegisterResponse, SessionId, SessionSummary,
};
use crate::relay::PublishOutcome;

#[derive(Clone)]
pub struct RelayClient {
    http: Client,
    base_url: String,
}

impl RelayClient {
    pub fn new(
        base_url: impl Into<String>,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self, SpanError> {
        let http = Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .build()?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// URL of a per-session route. Ids the relay could never have issued
    /// are refused here, since they would not route to a session at all.
    fn session_url(&self, prefix: &str, id: &SessionId) -> Result<String, SpanError> {
        let raw = id.as_str();
        if raw.is_empty() || !raw.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(SpanError::UnknownSession(raw.to_string()));
        }
        Ok(self.url(&format!("{prefix}/{raw}")))
    }
}

/// Decode a success body, or map the relay's error response.
async fn decode<T: DeserializeOwned>(res: Response) -> Result<T, SpanError> {
    let status = res.status();
    if status.is_success() {
        return Ok(res.json::<T>().await?);
    }
    let body = res.text().await.unwrap_or_default();
    Err(error_from_response(status, &body))
}

/// Map a non-2xx status and its body onto [`SpanError`].
pub fn error_from_response(status: StatusCode, body: &str) -> SpanError {
    if let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) {
        return parsed.into_error();
    }
    // Every session route answers 404 only for an unknown id, so a 404 the
    // router produced itself means the same thing.
    if status == StatusCode::NOT_FOUND {
        return SpanError::UnknownSession(format!("relay returned {status}"));
    }
    if status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
    {
        SpanError::TransientNetwork(format!("relay returned {status}"))
    } else {
        SpanError::MalformedPayload(format!("relay returned {status}: {body}"))
    }
}

#[async_trait]
impl RelayApi for RelayClient {
    async fn register(&self, request: RegisterRequest) -> Result<SessionId, SpanError> {
        let res = self
            .http
            .post(self.url("/api/register"))
            .json(&request)
            .send()
            .await?;
        let body: RegisterResponse = decode(res).await?;
        Ok(body.session_id)
    }

    async fn drain_commands(&self, id: &SessionId) -> Result<Vec<QueuedCommand>, SpanError> {
        let res = self
            .http
            .get(self.session_url("/api/commands", id)?)
            .send()
            .await?;
        let commands: Vec<QueuedCommand> = decode(res).await?;
        trace!(session = %id, count = commands.len(), "drained");
        Ok(commands)
    }

    async fn publish_frame(&self, id: &SessionId, frame: Frame) -> Result<PublishOutcome, SpanError> {
        let body = PublishFrameRequest::from_frame(id.clone(), &frame);
        let res = self.http.post(self.url("/api/screen")).json(&body).send().await?;
        let ack: PublishAck = decode(res).await?;
        Ok(if ack.accepted {
            PublishOutcome::Stored
        } else {
            PublishOutcome::Stale
        })
    }

    async fn enqueue_command(&self, id: &SessionId, command: Command) -> Result<(), SpanError> {
        let res = self
            .http
            .post(self.session_url("/api/command", id)?)
            .json(&command)
            .send()
            .await?;
        let _: serde_json::Value = decode(res).await?;
        Ok(())
    }

    async fn fetch_frame(&self, id: &SessionId) -> Result<Option<Frame>, SpanError> {
        let res = self
            .http
            .get(self.session_url("/api/screen", id)?)
            .send()
            .await?;
        let body: FetchFrameResponse = decode(res).await?;
        body.frame.map(|view| view.into_frame()).transpose()
    }

    async fn list_sessions(&self) -> Result<Vec<SessionSummary>, SpanError> {
        let res = self.http.get(self.url("/api/sessions")).send().await?;
        decode(res).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_is_normalized() {
        let client = RelayClient::new(
            "http://relay.local:8080/",
            Duration::from_secs(1),
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(client.base_url(), "http://relay.local:8080");
        assert_eq!(client.url("/api/sessions"), "http://relay.local:8080/api/sessions");
    }

    #[test]
    fn relay_error_bodies_map_back() {
        let body = r#"{"error":"unknown_session","message":"AB12CD"}"#;
        assert_eq!(
            error_from_response(StatusCode::NOT_FOUND, body),
            SpanError::UnknownSession("AB12CD".into())
        );
        let body = r#"{"error":"resource_exhausted","message":"session limit reached"}"#;
        assert!(matches!(
            error_from_response(StatusCode::SERVICE_UNAVAILABLE, body),
            SpanError::ResourceExhausted(_)
        ));
    }

    #[test]
    fn bare_statuses_are_classified() {
        assert!(matches!(
            error_from_response(StatusCode::BAD_GATEWAY, "<html>"),
            SpanError::TransientNetwork(_)
        ));
        assert!(matches!(
            error_from_response(StatusCode::METHOD_NOT_ALLOWED, ""),
            SpanError::MalformedPayload(_)
        ));
    }

    #[test]
    fn bodyless_404_is_unknown_session() {
        assert!(matches!(
            error_from_response(StatusCode::NOT_FOUND, ""),
            SpanError::UnknownSession(_)
        ));
        assert!(matches!(
            error_from_response(StatusCode::NOT_FOUND, "Not Found"),
            SpanError::UnknownSession(_)
        ));
    }

    #[tokio::test]
    async fn unroutable_ids_fail_without_a_request() {
        // Nothing listens on port 9; reaching the network would be transient.
        let client = RelayClient::new(
            "http://127.0.0.1:9",
            Duration::from_millis(200),
            Duration::from_millis(500),
        )
        .unwrap();
        for raw in ["", "   ", "AB/CD", "AB?x=1", "ÄB12"] {
            let id = SessionId::new(raw);
            assert!(
                matches!(client.fetch_frame(&id).await, Err(SpanError::UnknownSession(_))),
                "fetch {raw:?}"
            );
            assert!(
                matches!(client.drain_commands(&id).await, Err(SpanError::UnknownSession(_))),
                "drain {raw:?}"
            );
            assert!(matches!(
                client.enqueue_command(&id, Command::scroll(1)).await,
                Err(SpanError::UnknownSession(_))
            ));
        }
        assert_eq!(
            client.session_url("/api/screen", &SessionId::new("ab12cd")).unwrap(),
            "http://127.0.0.1:9/api/screen/AB12CD"
        );
    }

    #[tokio::test]
    async fn unreachable_relay_is_transient() {
        // Port 9 (discard) on localhost is closed on any sane test host.
        let client = RelayClient::new(
            "http://127.0.0.1:9",
            Duration::from_millis(200),
            Duration::from_millis(500),
        )
        .unwrap();
        assert!(matches!(
            client.list_sessions().await,
            Err(SpanError::TransientNetwork(_))
        ));
    }
}
