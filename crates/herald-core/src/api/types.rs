//! GraphQL documents and wire types
//!
//! Only the handful of fields the background pipeline needs are modelled.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ApiError;
use crate::storage::{Session, Token, TokenPair};

pub const REFRESH_SESSION: &str = "
mutation RefreshSession($secret: RefreshTokenSecret!) {
    refreshSession(secret: $secret) {
        __typename
        ... on CreateSessionOk {
            accessToken { secret expiresAt }
            refreshToken { secret expiresAt }
            session { id userAgent ip lastActivatedAt }
            user { id }
        }
        ... on RefreshSessionError {
            code
        }
    }
}";

pub const CHAT_ITEMS: &str = "
query ChatItems($id: ChatId!) {
    chat(id: $id) {
        items(first: 1) {
            __typename
        }
    }
}";

pub const CHAT_ONGOING_CALL: &str = "
query ChatOngoingCall($id: ChatId!) {
    chat(id: $id) {
        ongoingCall {
            id
            members {
                user { id }
            }
        }
    }
}";

/// JSON-over-HTTP GraphQL request body
#[derive(Debug, Serialize)]
pub struct GraphQlRequest<'a> {
    pub query: &'a str,
    pub variables: Value,
}

/// GraphQL response envelope
#[derive(Debug, Deserialize)]
pub struct GraphQlResponse<T> {
    pub data: Option<T>,
    #[serde(default)]
    pub errors: Vec<GraphQlErrorEntry>,
}

#[derive(Debug, Deserialize)]
pub struct GraphQlErrorEntry {
    pub message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshSessionData {
    pub refresh_session: RefreshSessionPayload,
}

/// `refreshSession` result union, flattened
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshSessionPayload {
    #[serde(rename = "__typename")]
    pub typename: String,
    pub access_token: Option<RemoteToken>,
    pub refresh_token: Option<RemoteToken>,
    pub session: Option<RemoteSession>,
    pub user: Option<RemoteUser>,
    pub code: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteToken {
    pub secret: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteSession {
    pub id: String,
    #[serde(default)]
    pub user_agent: String,
    #[serde(default)]
    pub ip: String,
    pub last_activated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteUser {
    pub id: String,
}

impl TryFrom<RefreshSessionPayload> for TokenPair {
    type Error = ApiError;

    fn try_from(payload: RefreshSessionPayload) -> Result<Self, Self::Error> {
        if payload.typename != "CreateSessionOk" {
            return Err(ApiError::Rejected(
                payload.code.unwrap_or(payload.typename),
            ));
        }

        match (payload.access_token, payload.refresh_token, payload.user) {
            (Some(access), Some(refresh), Some(user)) => Ok(TokenPair {
                access: Token {
                    secret: access.secret,
                    expire_at: access.expires_at,
                },
                refresh: Token {
                    secret: refresh.secret,
                    expire_at: refresh.expires_at,
                },
                user_id: user.id,
                session: payload.session.map(|s| Session {
                    id: s.id,
                    user_agent: s.user_agent,
                    ip: s.ip,
                    last_activated_at: s.last_activated_at,
                }),
            }),
            _ => Err(ApiError::GraphQl(
                "CreateSessionOk is missing token or user fields".to_string(),
            )),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ChatData<T> {
    pub chat: Option<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatCallState {
    pub ongoing_call: Option<OngoingCall>,
}

/// Call currently running in a chat
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OngoingCall {
    pub id: String,
    #[serde(default)]
    pub members: Vec<CallMember>,
}

impl OngoingCall {
    pub fn has_member(&self, user_id: &str) -> bool {
        self.members.iter().any(|m| m.user.id == user_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CallMember {
    pub user: RemoteUser,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_session_ok_becomes_token_pair() {
        let json = r#"{
            "refreshSession": {
                "__typename": "CreateSessionOk",
                "accessToken": {"secret": "new-access", "expiresAt": "2030-01-01T00:00:00Z"},
                "refreshToken": {"secret": "new-refresh", "expiresAt": "2030-02-01T00:00:00Z"},
                "session": {"id": "s1", "userAgent": "ua", "ip": "10.0.0.1", "lastActivatedAt": "2029-12-31T23:00:00Z"},
                "user": {"id": "me"}
            }
        }"#;
        let data: RefreshSessionData = serde_json::from_str(json).unwrap();
        let pair = TokenPair::try_from(data.refresh_session).unwrap();
        assert_eq!(pair.access.secret, "new-access");
        assert_eq!(pair.refresh.secret, "new-refresh");
        assert_eq!(pair.user_id, "me");
        assert_eq!(pair.session.unwrap().ip, "10.0.0.1");
    }

    #[test]
    fn test_error_member_is_rejected() {
        let json = r#"{"refreshSession": {"__typename": "RefreshSessionError", "code": "UNKNOWN_REFRESH_TOKEN"}}"#;
        let data: RefreshSessionData = serde_json::from_str(json).unwrap();
        match TokenPair::try_from(data.refresh_session) {
            Err(ApiError::Rejected(code)) => assert_eq!(code, "UNKNOWN_REFRESH_TOKEN"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_ongoing_call_membership() {
        let json = r#"{"chat": {"ongoingCall": {"id": "c1", "members": [
            {"user": {"id": "alice"}}, {"user": {"id": "me"}}
        ]}}}"#;
        let data: ChatData<ChatCallState> = serde_json::from_str(json).unwrap();
        let call = data.chat.unwrap().ongoing_call.unwrap();
        assert!(call.has_member("me"));
        assert!(!call.has_member("bob"));
    }
}
