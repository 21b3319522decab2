use crate::{
    error::{AppError, Result},
    session::SessionStore,
    token_mirror,
    types::{Credential, OAuthCallback, PendingAuthorization, TokenRequest, TokenResponse},
    AppState,
};
use axum::{
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Redirect},
    Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use base64::Engine;
use rand::Rng;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use tracing::{debug, error, info, warn};

pub const SESSION_COOKIE_NAME: &str = "drive_session";

pub fn generate_code_verifier() -> String {
    let random_bytes: Vec<u8> = (0..64).map(|_| rand::thread_rng().gen()).collect();
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(random_bytes)
}

pub fn generate_code_challenge(verifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(verifier.as_bytes());
    let result = hasher.finalize();
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(result)
}

pub fn generate_state() -> String {
    let random_bytes: Vec<u8> = (0..32).map(|_| rand::thread_rng().gen()).collect();
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(random_bytes)
}

fn session_cookie(session_id: String) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE_NAME, session_id))
        .http_only(true)
        .secure(false) // Set to true in production with HTTPS
        .same_site(SameSite::Lax)
        .path("/")
        .build()
}

/// Returns the session id from the cookie jar if the store issued it,
/// otherwise mints a new one and sets its cookie.
pub fn ensure_session(store: &SessionStore, jar: CookieJar) -> (CookieJar, String) {
    if let Some(id) = session_id(&jar) {
        if store.get(&id).is_some() {
            return (jar, id);
        }
        debug!("Ignoring unknown session cookie");
    }

    let session_id = SessionStore::generate_session_id();
    (jar.add(session_cookie(session_id.clone())), session_id)
}

pub fn session_id(jar: &CookieJar) -> Option<String> {
    jar.get(SESSION_COOKIE_NAME)
        .map(|cookie| cookie.value().to_string())
}

pub fn authorization_url(state: &AppState, oauth_state: &str, code_challenge: &str) -> String {
    let scope = state.config.scopes.join(" ");
    let auth_params = vec![
        ("response_type", "code"),
        ("client_id", state.config.client_id.as_str()),
        ("redirect_uri", state.config.redirect_uri.as_str()),
        ("scope", scope.as_str()),
        ("state", oauth_state),
        ("access_type", "offline"),
        ("include_granted_scopes", "true"),
        ("prompt", "consent"),
        ("code_challenge", code_challenge),
        ("code_challenge_method", "S256"),
    ];

    let query = serde_urlencoded::to_string(auth_params).unwrap_or_default();
    format!("{}?{}", state.config.auth_url, query)
}

// Begin the authorization-code flow
pub async fn authorize(State(state): State<AppState>, jar: CookieJar) -> impl IntoResponse {
    let (jar, session_id) = ensure_session(&state.session_store, jar);

    let verifier = generate_code_verifier();
    let challenge = generate_code_challenge(&verifier);
    let oauth_state = generate_state();

    state.session_store.store_pending(
        &session_id,
        PendingAuthorization {
            state: oauth_state.clone(),
            code_verifier: verifier,
        },
    );

    let auth_url = authorization_url(&state, &oauth_state, &challenge);
    info!("Redirecting to OAuth authorization");
    debug!(
        "Auth params: client_id={}, redirect_uri={}",
        state.config.client_id, state.config.redirect_uri
    );

    (jar, Redirect::to(&auth_url))
}

// Complete the flow: validate state, exchange the code, store the credential under a fresh session
pub async fn oauth2callback(
    State(state): State<AppState>,
    Query(params): Query<OAuthCallback>,
    jar: CookieJar,
) -> Result<impl IntoResponse> {
    if let Some(error) = params.error {
        error!("OAuth error: {} - {:?}", error, params.error_description);
        return Err(AppError::OAuth(format!(
            "{}: {}",
            error,
            params.error_description.unwrap_or_default()
        )));
    }

    let session_id = session_id(&jar).ok_or(AppError::InvalidState)?;
    let pending = state
        .session_store
        .take_pending(&session_id)
        .ok_or(AppError::InvalidState)?;

    let returned_state = params
        .state
        .ok_or_else(|| AppError::OAuth("Missing state parameter".into()))?;
    if returned_state != pending.state {
        warn!("OAuth state mismatch for session");
        return Err(AppError::InvalidState);
    }

    let code = params
        .code
        .ok_or_else(|| AppError::OAuth("Missing authorization code".into()))?;

    let token_request = TokenRequest {
        grant_type: "authorization_code".to_string(),
        client_id: state.config.client_id.clone(),
        client_secret: state.config.client_secret.clone(),
        code: Some(code),
        redirect_uri: Some(state.config.redirect_uri.clone()),
        code_verifier: Some(pending.code_verifier),
        refresh_token: None,
    };

    let token_response = exchange_tokens(&state.http_client, &state.config.token_url, &token_request)
        .await
        .map_err(AppError::TokenExchange)?;

    let requested: BTreeSet<String> = state.config.scopes.iter().cloned().collect();
    let credential = Credential::from_token_response(
        token_response,
        None,
        &state.config.token_url,
        &state.config.client_id,
        &state.config.client_secret,
        &requested,
    );

    if let Some(path) = &state.config.token_mirror_path {
        if let Err(e) = token_mirror::write(path, &credential) {
            error!("Failed to mirror tokens: {:#}", e);
        }
    }

    let authorized_id = SessionStore::generate_session_id();
    state.session_store.remove(&session_id);
    state.session_store.store_credential(&authorized_id, credential);
    info!("Authorization complete");

    Ok((jar.add(session_cookie(authorized_id)), Redirect::to("/")))
}

/// Exchanges a refresh token for a new credential at the credential's own token endpoint.
pub async fn refresh_credential(
    http_client: &reqwest::Client,
    credential: &Credential,
) -> Result<Credential> {
    let refresh_token = credential
        .refresh_token
        .clone()
        .filter(|t| !t.is_empty())
        .ok_or(AppError::Unauthenticated)?;

    let token_request = TokenRequest {
        grant_type: "refresh_token".to_string(),
        client_id: credential.client_id.clone(),
        client_secret: credential.client_secret.clone(),
        code: None,
        redirect_uri: None,
        code_verifier: None,
        refresh_token: Some(refresh_token.clone()),
    };

    let token_response = exchange_tokens(http_client, &credential.token_uri, &token_request)
        .await
        .map_err(AppError::TokenRefresh)?;

    info!("Refreshed access token");
    Ok(Credential::from_token_response(
        token_response,
        Some(refresh_token),
        &credential.token_uri,
        &credential.client_id,
        &credential.client_secret,
        &credential.scopes,
    ))
}

/// Posts a form-encoded grant to `token_url`. Errors carry a loggable reason.
pub async fn exchange_tokens(
    client: &reqwest::Client,
    token_url: &str,
    request: &TokenRequest,
) -> std::result::Result<TokenResponse, String> {
    debug!("Exchanging {} grant at: {}", request.grant_type, token_url);

    let response = client
        .post(token_url)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .form(request)
        .send()
        .await
        .map_err(|e| e.to_string())?;

    if !response.status().is_success() {
        let status = response.status();
        let error_text = response.text().await.unwrap_or_default();
        error!("Token endpoint returned {}: {}", status, error_text);
        return Err(format!("{}: {}", status, error_text));
    }

    response
        .json::<TokenResponse>()
        .await
        .map_err(|e| format!("Failed to parse token response: {}", e))
}

// Entry point: reports session status, refreshing an expired credential when possible
pub async fn index(State(state): State<AppState>, jar: CookieJar) -> Result<impl IntoResponse> {
    let Some(session_id) = session_id(&jar) else {
        return Ok(Json(json!({ "authenticated": false, "authorize": "/authorize" })));
    };
    let Some(credential) = state.session_store.credential(&session_id) else {
        return Ok(Json(json!({ "authenticated": false, "authorize": "/authorize" })));
    };

    if credential.is_valid() {
        return Ok(Json(json!({
            "authenticated": true,
            "upload_form": "/upload_to_folder_form",
            "download_form": "/download_form"
        })));
    }

    if credential.is_refreshable() {
        let refreshed = refresh_credential(&state.http_client, &credential).await?;
        state.session_store.store_credential(&session_id, refreshed);
        return Ok(Json(json!({ "authenticated": true, "refreshed": true })));
    }

    Ok(Json(json!({
        "authenticated": false,
        "expired": true,
        "authorize": "/authorize"
    })))
}
