use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// OAuth2 credential set for the storage provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_uri: String,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub scopes: BTreeSet<String>,
    /// `None` when the provider did not report a lifetime.
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credential {
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| at <= Utc::now())
    }

    pub fn is_valid(&self) -> bool {
        !self.access_token.is_empty() && !self.is_expired()
    }

    pub fn has_refresh_token(&self) -> bool {
        self.refresh_token
            .as_deref()
            .is_some_and(|token| !token.is_empty())
    }

    pub fn is_refreshable(&self) -> bool {
        self.is_expired() && self.has_refresh_token()
    }

    /// Builds a credential from a token endpoint response.
    ///
    /// `previous_refresh_token` is carried over when the endpoint omits a new one,
    /// which is the usual answer to a refresh grant.
    pub fn from_token_response(
        response: TokenResponse,
        previous_refresh_token: Option<String>,
        token_uri: &str,
        client_id: &str,
        client_secret: &str,
        requested_scopes: &BTreeSet<String>,
    ) -> Self {
        let scopes = match response.scope {
            Some(scope) => scope.split_whitespace().map(str::to_string).collect(),
            None => requested_scopes.clone(),
        };

        Self {
            access_token: response.access_token,
            refresh_token: response
                .refresh_token
                .filter(|t| !t.is_empty())
                .or(previous_refresh_token),
            token_uri: token_uri.to_string(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            scopes,
            expires_at: response
                .expires_in
                .map(|secs| Utc::now() + Duration::seconds(secs as i64)),
        }
    }

    /// Short, log-safe prefix of the access token.
    pub fn token_preview(&self) -> &str {
        let end = self
            .access_token
            .char_indices()
            .nth(8)
            .map(|(i, _)| i)
            .unwrap_or(self.access_token.len());
        &self.access_token[..end]
    }
}

/// Anti-forgery state plus PKCE verifier for an in-flight authorization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAuthorization {
    pub state: String,
    pub code_verifier: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionData {
    pub credential: Option<Credential>,
    pub pending: Option<PendingAuthorization>,
}

#[derive(Debug, Serialize)]
pub struct TokenRequest {
    pub grant_type: String,
    pub client_id: String,
    pub client_secret: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_verifier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OAuthCallback {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

#[cfg(test)]
pub(crate) fn test_credential(token_uri: &str) -> Credential {
    Credential {
        access_token: "ya29.valid-access-token".to_string(),
        refresh_token: Some("1//refresh".to_string()),
        token_uri: token_uri.to_string(),
        client_id: "test-client".to_string(),
        client_secret: "test-secret".to_string(),
        scopes: BTreeSet::from(["https://www.googleapis.com/auth/drive".to_string()]),
        expires_at: Some(Utc::now() + Duration::hours(1)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_validity() {
        let mut credential = test_credential("https://oauth2.googleapis.com/token");
        assert!(credential.is_valid());
        assert!(!credential.is_refreshable());

        credential.expires_at = Some(Utc::now() - Duration::minutes(1));
        assert!(!credential.is_valid());
        assert!(credential.is_refreshable());

        credential.refresh_token = Some(String::new());
        assert!(!credential.is_refreshable());

        credential.refresh_token = None;
        assert!(!credential.is_refreshable());
    }

    #[test]
    fn test_credential_without_expiry_is_valid() {
        let mut credential = test_credential("https://oauth2.googleapis.com/token");
        credential.expires_at = None;
        assert!(credential.is_valid());
        assert!(!credential.is_refreshable());

        credential.access_token.clear();
        assert!(!credential.is_valid());
    }

    #[test]
    fn test_from_token_response_keeps_previous_refresh_token() {
        let response: TokenResponse = serde_json::from_str(
            r#"{"access_token": "new", "expires_in": 3599, "token_type": "Bearer"}"#,
        )
        .unwrap();
        let scopes = BTreeSet::from(["scope-a".to_string()]);

        let credential = Credential::from_token_response(
            response,
            Some("old-refresh".into()),
            "https://token",
            "id",
            "secret",
            &scopes,
        );

        assert_eq!(credential.access_token, "new");
        assert_eq!(credential.refresh_token.as_deref(), Some("old-refresh"));
        assert_eq!(credential.scopes, scopes);
        assert!(credential.is_valid());
    }

    #[test]
    fn test_from_token_response_uses_granted_scopes() {
        let response: TokenResponse = serde_json::from_str(
            r#"{"access_token": "new", "refresh_token": "fresh", "scope": "b a"}"#,
        )
        .unwrap();

        let credential = Credential::from_token_response(
            response,
            Some("old".into()),
            "https://token",
            "id",
            "secret",
            &BTreeSet::new(),
        );

        assert_eq!(credential.refresh_token.as_deref(), Some("fresh"));
        assert_eq!(
            credential.scopes.into_iter().collect::<Vec<_>>(),
            vec!["a".to_string(), "b".to_string()]
        );
        assert!(credential.expires_at.is_none());
    }

    #[test]
    fn test_token_preview_is_short() {
        let credential = test_credential("https://token");
        assert_eq!(credential.token_preview(), "ya29.val");
    }

    #[test]
    fn test_token_request_skips_absent_fields() {
        let request = TokenRequest {
            grant_type: "refresh_token".into(),
            client_id: "id".into(),
            client_secret: "secret".into(),
            code: None,
            redirect_uri: None,
            code_verifier: None,
            refresh_token: Some("r".into()),
        };

        let encoded = serde_urlencoded::to_string(&request).unwrap();
        assert_eq!(
            encoded,
            "grant_type=refresh_token&client_id=id&client_secret=secret&refresh_token=r"
        );
    }
}
