//! Feed authentication settings.
//!
//! ```toml
//! [feeds.auth]
//! method = "digest"
//! user = "alice"
//! pass = "secret"
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// HTTP authentication scheme.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMethod {
    /// RFC 7617 Basic.
    #[default]
    Basic,
    /// RFC 7616 Digest.
    Digest,
    /// `Authorization: Bearer <pass>`.
    Bearer,
}

/// Credentials for one feed.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedAuth {
    /// Scheme to use.
    #[serde(default)]
    pub method: AuthMethod,
    /// User name. Unused for bearer tokens.
    #[serde(default)]
    pub user: String,
    /// Password, or the token for [`AuthMethod::Bearer`].
    pub pass: String,
    /// Send credentials with the first request instead of waiting for a 401.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub send_immediately: Option<bool>,
}

impl FeedAuth {
    /// Basic credentials.
    pub fn basic(user: impl Into<String>, pass: impl Into<String>) -> Self {
        Self {
            method: AuthMethod::Basic,
            user: user.into(),
            pass: pass.into(),
            send_immediately: None,
        }
    }

    /// Digest credentials.
    pub fn digest(user: impl Into<String>, pass: impl Into<String>) -> Self {
        Self {
            method: AuthMethod::Digest,
            ..Self::basic(user, pass)
        }
    }

    /// A bearer token.
    pub fn bearer(token: impl Into<String>) -> Self {
        Self {
            method: AuthMethod::Bearer,
            ..Self::basic(String::new(), token)
        }
    }

    /// Builder method to override when credentials are sent.
    pub fn with_send_immediately(mut self, send: bool) -> Self {
        self.send_immediately = Some(send);
        self
    }

    /// Whether the first request already carries credentials.
    ///
    /// Defaults to true for basic and bearer, false for digest, which needs
    /// the server's challenge first.
    pub fn sends_immediately(&self) -> bool {
        self.send_immediately
            .unwrap_or(!matches!(self.method, AuthMethod::Digest))
    }
}

impl fmt::Debug for FeedAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeedAuth")
            .field("method", &self.method)
            .field("user", &self.user)
            .field("pass", &"<redacted>")
            .field("send_immediately", &self.send_immediately)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_immediately_defaults() {
        assert!(FeedAuth::basic("u", "p").sends_immediately());
        assert!(FeedAuth::bearer("tok").sends_immediately());
        assert!(!FeedAuth::digest("u", "p").sends_immediately());
        assert!(
            !FeedAuth::basic("u", "p")
                .with_send_immediately(false)
                .sends_immediately()
        );
        assert!(
            FeedAuth::digest("u", "p")
                .with_send_immediately(true)
                .sends_immediately()
        );
    }

    #[test]
    fn deserializes_with_defaults() {
        let auth: FeedAuth = serde_json::from_str(r#"{"user": "alice", "pass": "s3cret"}"#).unwrap();
        assert_eq!(auth.method, AuthMethod::Basic);
        assert!(auth.send_immediately.is_none());

        let auth: FeedAuth =
            serde_json::from_str(r#"{"method": "bearer", "pass": "tok"}"#).unwrap();
        assert_eq!(auth, FeedAuth::bearer("tok"));
    }

    #[test]
    fn debug_hides_password() {
        let debug = format!("{:?}", FeedAuth::basic("alice", "s3cret"));
        assert!(debug.contains("alice"));
        assert!(!debug.contains("s3cret"));
    }
}
