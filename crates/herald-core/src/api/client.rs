//! GraphQL client over reqwest

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::debug;

use super::types::{
    ChatCallState, ChatData, GraphQlRequest, GraphQlResponse, OngoingCall, RefreshSessionData,
    CHAT_ITEMS, CHAT_ONGOING_CALL, REFRESH_SESSION,
};
use super::{ApiError, RemoteApi};
use crate::config::ApiConfig;
use crate::constants::api;
use crate::storage::TokenPair;

/// Client for the messenger GraphQL endpoint
pub struct GraphQlClient {
    http_client: Client,
    config: ApiConfig,
}

impl GraphQlClient {
    pub fn new(config: ApiConfig) -> Result<Self, ApiError> {
        let http_client = Client::builder()
            .user_agent(api::USER_AGENT)
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            http_client,
            config,
        })
    }

    /// POST one operation and unwrap its `data`
    async fn execute<T: DeserializeOwned>(
        &self,
        operation: &str,
        query: &str,
        variables: serde_json::Value,
        bearer: Option<&str>,
    ) -> Result<T, ApiError> {
        let mut request = self
            .http_client
            .post(self.config.endpoint.clone())
            .header("Content-Type", "application/json")
            .json(&GraphQlRequest { query, variables });

        if let Some(secret) = bearer {
            request = request.bearer_auth(secret);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        let envelope: GraphQlResponse<T> = serde_json::from_slice(&bytes)?;
        debug!(operation, status = status.as_u16(), "GraphQL response");

        if !envelope.errors.is_empty() {
            let messages = envelope
                .errors
                .iter()
                .map(|e| e.message.as_str())
                .collect::<Vec<_>>()
                .join("; ");
            return Err(ApiError::GraphQl(messages));
        }

        envelope
            .data
            .ok_or_else(|| ApiError::GraphQl(format!("{operation} returned no data")))
    }
}

#[async_trait]
impl RemoteApi for GraphQlClient {
    async fn refresh_session(&self, refresh_secret: &str) -> Result<TokenPair, ApiError> {
        let data: RefreshSessionData = self
            .execute(
                "refreshSession",
                REFRESH_SESSION,
                json!({ "secret": refresh_secret }),
                None,
            )
            .await?;
        TokenPair::try_from(data.refresh_session)
    }

    async fn chat_exists(&self, access_secret: &str, chat_id: &str) -> Result<bool, ApiError> {
        let data: ChatData<serde_json::Value> = self
            .execute(
                "chat.items",
                CHAT_ITEMS,
                json!({ "id": chat_id }),
                Some(access_secret),
            )
            .await?;
        Ok(data.chat.is_some())
    }

    async fn ongoing_call(
        &self,
        access_secret: &str,
        chat_id: &str,
    ) -> Result<Option<OngoingCall>, ApiError> {
        let data: ChatData<ChatCallState> = self
            .execute(
                "chat.ongoingCall",
                CHAT_ONGOING_CALL,
                json!({ "id": chat_id }),
                Some(access_secret),
            )
            .await?;
        Ok(data.chat.and_then(|chat| chat.ongoing_call))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    use url::Url;

    use super::*;

    struct Captured {
        authorization: Option<String>,
        body: serde_json::Value,
    }

    /// Serve exactly one request with `status` and `body`, reporting what was received
    fn serve_once(status: u16, response_body: &'static str) -> (Url, mpsc::Receiver<Captured>) {
        let server = tiny_http::Server::http("127.0.0.1:0").unwrap();
        let port = server.server_addr().to_ip().unwrap().port();
        let (tx, rx) = mpsc::channel();

        thread::spawn(move || {
            if let Ok(Some(mut request)) = server.recv_timeout(Duration::from_secs(10)) {
                let authorization = request
                    .headers()
                    .iter()
                    .find(|h| h.field.equiv("Authorization"))
                    .map(|h| h.value.as_str().to_string());
                let mut raw = String::new();
                let _ = request.as_reader().read_to_string(&mut raw);
                let body = serde_json::from_str(&raw).unwrap_or_default();
                let _ = tx.send(Captured {
                    authorization,
                    body,
                });

                let response = tiny_http::Response::from_string(response_body)
                    .with_status_code(status)
                    .with_header(
                        tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..])
                            .unwrap(),
                    );
                let _ = request.respond(response);
            }
        });

        let url = Url::parse(&format!("http://127.0.0.1:{port}/api/graphql")).unwrap();
        (url, rx)
    }

    fn client(url: Url) -> GraphQlClient {
        GraphQlClient::new(ApiConfig::new(url).with_timeout(Duration::from_secs(5))).unwrap()
    }

    #[tokio::test]
    async fn test_refresh_session_sends_secret_as_variable() {
        let (url, rx) = serve_once(
            200,
            r#"{"data": {"refreshSession": {
                "__typename": "CreateSessionOk",
                "accessToken": {"secret": "a2", "expiresAt": "2030-01-01T00:00:00Z"},
                "refreshToken": {"secret": "r2", "expiresAt": "2030-02-01T00:00:00Z"},
                "session": {"id": "s", "userAgent": "ua", "ip": "1.2.3.4", "lastActivatedAt": "2029-12-31T00:00:00Z"},
                "user": {"id": "me"}
            }}}"#,
        );

        let pair = client(url).refresh_session("r1").await.unwrap();
        assert_eq!(pair.access.secret, "a2");
        assert_eq!(pair.user_id, "me");

        let captured = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(captured.body["variables"]["secret"], "r1");
        assert!(captured.authorization.is_none());
    }

    #[tokio::test]
    async fn test_chat_exists_uses_bearer_token() {
        let (url, rx) = serve_once(200, r#"{"data": {"chat": {"items": {"__typename": "ChatItemsConnection"}}}}"#);

        assert!(client(url).chat_exists("secret-access", "chat-1").await.unwrap());

        let captured = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(
            captured.authorization.as_deref(),
            Some("Bearer secret-access")
        );
        assert_eq!(captured.body["variables"]["id"], "chat-1");
    }

    #[tokio::test]
    async fn test_missing_chat_is_not_an_error() {
        let (url, _rx) = serve_once(200, r#"{"data": {"chat": null}}"#);
        assert!(!client(url).chat_exists("t", "gone").await.unwrap());
    }

    #[tokio::test]
    async fn test_graphql_errors_are_reported() {
        let (url, _rx) = serve_once(200, r#"{"data": null, "errors": [{"message": "unauthorized"}]}"#);
        match client(url).ongoing_call("t", "chat").await {
            Err(ApiError::GraphQl(message)) => assert!(message.contains("unauthorized")),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_http_status_is_reported() {
        let (url, _rx) = serve_once(502, "bad gateway");
        let err = client(url).chat_exists("t", "chat").await.unwrap_err();
        assert!(matches!(err, ApiError::Status { status: 502, .. }));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_malformed_body_is_decode_error() {
        let (url, _rx) = serve_once(200, "{not json");
        let err = client(url).chat_exists("t", "chat").await.unwrap_err();
        assert!(matches!(err, ApiError::Decode(_)));
    }
}
