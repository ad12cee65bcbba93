use crate::error::Result;
use crate::transport::WsMessage;
use async_trait::async_trait;
use serde_json::{json, Value};

/// Sequence id carried by the authentication challenge
pub const CHALLENGE_SEQ: i64 = 1;

/// Sequence id of the unsolicited `hello` event
pub const HELLO_SEQ: i64 = 0;

/// Action tag of the authentication challenge frame
pub const CHALLENGE_ACTION: &str = "authentication_challenge";

/// Outcome of evaluating one handshake reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthVerdict {
    Accepted,
    Rejected(String),
}

/// Trait for providing the websocket authentication handshake
///
/// Implement this trait to define how the client authenticates
/// a freshly opened session.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Get the challenge frame to send after the session opens
    ///
    /// Called once per session, including after every reconnection.
    async fn challenge(&self) -> Result<WsMessage>;

    /// Decide whether a decoded reply completes the handshake
    fn evaluate(&self, response: &Value) -> AuthVerdict;
}

/// Bearer-token challenge used by Mattermost servers
#[derive(Debug, Clone)]
pub struct TokenChallenge {
    token: String,
}

impl TokenChallenge {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl AuthProvider for TokenChallenge {
    async fn challenge(&self) -> Result<WsMessage> {
        let frame = json!({
            "seq": CHALLENGE_SEQ,
            "action": CHALLENGE_ACTION,
            "data": { "token": self.token },
        });
        Ok(WsMessage::Text(frame.to_string()))
    }

    fn evaluate(&self, response: &Value) -> AuthVerdict {
        let int_field = |key: &str| response.get(key).and_then(Value::as_i64);
        let str_field = |key: &str| response.get(key).and_then(Value::as_str);

        // Older servers echo the challenge id in `seq`, newer ones in `seq_reply`
        let acks_challenge =
            int_field("seq") == Some(CHALLENGE_SEQ) || int_field("seq_reply") == Some(CHALLENGE_SEQ);
        if str_field("status") == Some("OK") && acks_challenge {
            return AuthVerdict::Accepted;
        }

        if str_field("event") == Some("hello") && int_field("seq") == Some(HELLO_SEQ) {
            return AuthVerdict::Accepted;
        }

        match str_field("status") {
            Some(status) => AuthVerdict::Rejected(format!("server replied with status {status}")),
            None => AuthVerdict::Rejected(format!("unexpected frame: {response}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_challenge_frame_shape() {
        let auth = TokenChallenge::new("secret-token");
        let frame = auth.challenge().await.unwrap();
        let value: Value = serde_json::from_str(frame.as_text().unwrap()).unwrap();

        assert_eq!(value["seq"].as_i64(), Some(1));
        assert_eq!(value["action"], "authentication_challenge");
        assert_eq!(value["data"]["token"], "secret-token");
    }

    #[test]
    fn test_accepts_both_ack_field_names() {
        let auth = TokenChallenge::new("t");
        assert_eq!(auth.evaluate(&json!({"status": "OK", "seq": 1})), AuthVerdict::Accepted);
        assert_eq!(
            auth.evaluate(&json!({"status": "OK", "seq_reply": 1})),
            AuthVerdict::Accepted
        );
    }

    #[test]
    fn test_accepts_hello_with_seq_zero() {
        let auth = TokenChallenge::new("t");
        let hello = json!({
            "event": "hello",
            "seq": 0,
            "data": {"connection_id": "abc", "server_version": "9.0"},
        });
        assert_eq!(auth.evaluate(&hello), AuthVerdict::Accepted);
    }

    #[test]
    fn test_rejects_other_shapes() {
        let auth = TokenChallenge::new("t");
        let rejected = [
            json!({"status": "FAIL", "seq_reply": 1}),
            json!({"status": "OK", "seq": 2}),
            json!({"status": "OK"}),
            json!({"event": "hello", "seq": 3}),
            json!({"event": "posted", "seq": 0}),
            json!({"seq": 1}),
            json!("OK"),
        ];
        for frame in rejected {
            assert!(
                matches!(auth.evaluate(&frame), AuthVerdict::Rejected(_)),
                "frame should be rejected: {frame}"
            );
        }
    }
}
