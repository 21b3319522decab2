//! Request gate for transfer routes.
//!
//! A session-held credential takes precedence. Without one, the request may
//! carry its own credential in headers; that credential lives only for the
//! request and never touches the session store. When the provider rejects
//! it and the client sent a refresh token, it is refreshed once in place.

use crate::{
    auth::{refresh_credential, session_id},
    error::{AppError, Result},
    types::Credential,
    AppState,
};
use axum::{async_trait, extract::FromRequestParts, http::request::Parts, http::HeaderMap};
use axum_extra::{
    extract::CookieJar,
    headers::{authorization::Bearer, Authorization, HeaderMapExt},
};
use std::collections::BTreeSet;
use std::future::Future;
use tracing::{debug, info, warn};

pub const REFRESH_TOKEN_HEADER: &str = "x-refresh-token";
pub const TOKEN_URI_HEADER: &str = "x-token-uri";
pub const CLIENT_ID_HEADER: &str = "x-client-id";
pub const CLIENT_SECRET_HEADER: &str = "x-client-secret";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    Session,
    Refreshed,
    Headers,
}

/// Credential resolved for one guarded request.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub credential: Credential,
    pub source: CredentialSource,
}

impl AuthContext {
    pub fn access_token(&self) -> &str {
        &self.credential.access_token
    }

    /// Runs `op` with the current access token.
    ///
    /// A header credential the provider answers with 401 is refreshed through
    /// its own token endpoint and `op` retried once. The refreshed credential
    /// is never stored.
    pub async fn run<T, F, Fut>(&mut self, state: &AppState, op: F) -> Result<T>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        match op(self.credential.access_token.clone()).await {
            Err(AppError::Unauthenticated)
                if self.source == CredentialSource::Headers
                    && self.credential.has_refresh_token() =>
            {
                info!(
                    "Provider rejected header credential {}..., refreshing",
                    self.credential.token_preview()
                );
                self.credential = refresh_credential(&state.http_client, &self.credential).await?;
                self.source = CredentialSource::Refreshed;
                op(self.credential.access_token.clone()).await
            }
            result => result,
        }
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Builds a request-scoped credential from `Authorization: Bearer` and the
/// `X-*` companion headers.
pub fn credential_from_headers(headers: &HeaderMap, state: &AppState) -> Option<Credential> {
    let bearer = headers.typed_get::<Authorization<Bearer>>()?;
    let access_token = bearer.token().trim().to_string();
    if access_token.is_empty() {
        return None;
    }

    Some(Credential {
        access_token,
        refresh_token: header_value(headers, REFRESH_TOKEN_HEADER),
        token_uri: header_value(headers, TOKEN_URI_HEADER)
            .unwrap_or_else(|| state.config.token_url.clone()),
        client_id: header_value(headers, CLIENT_ID_HEADER)
            .unwrap_or_else(|| state.config.client_id.clone()),
        client_secret: header_value(headers, CLIENT_SECRET_HEADER)
            .unwrap_or_else(|| state.config.client_secret.clone()),
        scopes: BTreeSet::new(),
        expires_at: None,
    })
}

/// Resolves a usable credential or rejects with [`AppError::Unauthenticated`]
/// ([`AppError::TokenRefresh`] when a session refresh fails).
pub async fn authorize_request(
    state: &AppState,
    jar: &CookieJar,
    headers: &HeaderMap,
) -> Result<AuthContext> {
    let session_id = session_id(jar);
    let session_credential = session_id
        .as_deref()
        .and_then(|id| state.session_store.credential(id))
        .filter(|c| !c.access_token.is_empty());

    if let (Some(id), Some(credential)) = (session_id.as_deref(), session_credential) {
        if credential.is_valid() {
            debug!("Admitting session credential {}...", credential.token_preview());
            return Ok(AuthContext {
                credential,
                source: CredentialSource::Session,
            });
        }

        if !credential.is_refreshable() {
            warn!("Session credential expired without refresh token");
            return Err(AppError::Unauthenticated);
        }

        // A failed refresh leaves the expired credential in place.
        let refreshed = refresh_credential(&state.http_client, &credential).await?;
        state.session_store.store_credential(id, refreshed.clone());
        info!("Session credential refreshed");
        return Ok(AuthContext {
            credential: refreshed,
            source: CredentialSource::Refreshed,
        });
    }

    let credential = credential_from_headers(headers, state).ok_or(AppError::Unauthenticated)?;
    debug!("Admitting header credential {}...", credential.token_preview());
    Ok(AuthContext {
        credential,
        source: CredentialSource::Headers,
    })
}

#[async_trait]
impl FromRequestParts<AppState> for AuthContext {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let jar = CookieJar::from_headers(&parts.headers);
        authorize_request(state, &jar, &parts.headers).await
    }
}
