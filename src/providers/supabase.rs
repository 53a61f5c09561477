use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument};

use crate::core::identity::{
    AuthError, AuthorizeRequest, IdentityProvider, OAuthTokens, PendingAccount,
};
use crate::core::session::Session;

/// Lifetime assumed when the provider does not report one.
const DEFAULT_EXPIRES_IN: i64 = 3600;

/// Identity provider backed by the Supabase auth (GoTrue) REST API.
pub struct SupabaseAuthProvider {
    base_url: String,
    anon_key: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: UserResponse,
}

impl From<TokenResponse> for Session {
    fn from(token: TokenResponse) -> Self {
        let expires_at = token
            .expires_at
            .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
            .unwrap_or_else(|| {
                Utc::now() + Duration::seconds(token.expires_in.unwrap_or(DEFAULT_EXPIRES_IN))
            });
        Session {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_at,
            user_id: token.user.id,
        }
    }
}

/// Sign-up returns a bare user while confirmation is pending, a full token
/// payload when the project auto-confirms.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SignUpResponse {
    Session(TokenResponse),
    User(UserResponse),
}

#[derive(Debug, Default, Deserialize)]
struct ErrorResponse {
    msg: Option<String>,
    error_description: Option<String>,
    message: Option<String>,
    error: Option<String>,
}

impl ErrorResponse {
    fn into_message(self) -> Option<String> {
        self.msg
            .or(self.error_description)
            .or(self.message)
            .or(self.error)
    }
}

async fn error_message(response: Response) -> String {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    serde_json::from_str::<ErrorResponse>(&text)
        .ok()
        .and_then(ErrorResponse::into_message)
        .unwrap_or_else(|| format!("HTTP error: {status}"))
}

/// Maps a non-success response. With `credentials` set, client errors mean
/// the provider rejected what was presented rather than failed.
async fn rejection(response: Response, credentials: bool) -> AuthError {
    let status = response.status();
    let message = error_message(response).await;
    debug!(%status, %message, "Identity provider rejected request");
    if credentials && status.is_client_error() && status != StatusCode::TOO_MANY_REQUESTS {
        AuthError::AuthenticationFailed(message)
    } else {
        AuthError::Provider(message)
    }
}

async fn parse_json<T: serde::de::DeserializeOwned>(response: Response) -> Result<T, AuthError> {
    let text = response
        .text()
        .await
        .map_err(|e| AuthError::Provider(format!("Failed to read response: {e}")))?;
    serde_json::from_str(&text)
        .map_err(|e| AuthError::Provider(format!("Failed to parse identity response: {e}")))
}

impl SupabaseAuthProvider {
    pub fn new(base_url: &str, anon_key: &str) -> Result<Self, AuthError> {
        let client = reqwest::Client::builder()
            .user_agent("tasaverde/0.1")
            .build()
            .map_err(|e| AuthError::Provider(e.to_string()))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
            client,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.base_url, path)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, AuthError> {
        request
            .header("apikey", &self.anon_key)
            .send()
            .await
            .map_err(|e| AuthError::Provider(format!("Request error: {e}")))
    }

    async fn token_grant(
        &self,
        grant_type: &str,
        body: serde_json::Value,
    ) -> Result<Session, AuthError> {
        let url = format!("{}?grant_type={}", self.endpoint("token"), grant_type);
        debug!("Requesting {} grant from {}", grant_type, url);
        let response = self.send(self.client.post(&url).json(&body)).await?;

        if !response.status().is_success() {
            return Err(rejection(response, true).await);
        }
        let token: TokenResponse = parse_json(response).await?;
        Ok(token.into())
    }
}

#[async_trait]
impl IdentityProvider for SupabaseAuthProvider {
    #[instrument(name = "SupabaseSignUp", skip(self, password))]
    async fn sign_up(&self, email: &str, password: &str) -> Result<PendingAccount, AuthError> {
        let response = self
            .send(
                self.client
                    .post(self.endpoint("signup"))
                    .json(&json!({ "email": email, "password": password })),
            )
            .await?;

        if !response.status().is_success() {
            return Err(rejection(response, false).await);
        }
        let user = match parse_json::<SignUpResponse>(response).await? {
            SignUpResponse::Session(token) => token.user,
            SignUpResponse::User(user) => user,
        };
        Ok(PendingAccount {
            user_id: user.id,
            email: user.email.unwrap_or_else(|| email.to_string()),
        })
    }

    #[instrument(name = "SupabaseSignIn", skip(self, password))]
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, AuthError> {
        self.token_grant("password", json!({ "email": email, "password": password }))
            .await
    }

    async fn authorize_url(&self, request: &AuthorizeRequest) -> Result<String, AuthError> {
        // The URL is only handed back, never followed, so skipping the
        // browser redirect needs nothing from the server.
        let url = url::Url::parse_with_params(
            &self.endpoint("authorize"),
            &[
                ("provider", request.provider.as_str()),
                ("redirect_to", request.redirect_to.as_str()),
            ],
        )
        .map_err(|e| AuthError::Provider(format!("Invalid authorize URL: {e}")))?;
        debug!(skip_browser_redirect = request.skip_browser_redirect, %url, "Built authorize URL");
        Ok(url.to_string())
    }

    #[instrument(name = "SupabaseSetSession", skip_all)]
    async fn set_session(&self, tokens: &OAuthTokens) -> Result<Session, AuthError> {
        let response = self
            .send(
                self.client
                    .get(self.endpoint("user"))
                    .bearer_auth(&tokens.access_token),
            )
            .await?;

        if !response.status().is_success() {
            return Err(rejection(response, false).await);
        }
        let user: UserResponse = parse_json(response).await?;
        let expires_in = tokens.expires_in.unwrap_or(DEFAULT_EXPIRES_IN);
        Ok(Session {
            access_token: tokens.access_token.clone(),
            refresh_token: tokens.refresh_token.clone(),
            expires_at: Utc::now() + Duration::seconds(expires_in),
            user_id: user.id,
        })
    }

    #[instrument(name = "SupabaseRefresh", skip_all)]
    async fn refresh_session(&self, refresh_token: &str) -> Result<Session, AuthError> {
        self.token_grant("refresh_token", json!({ "refresh_token": refresh_token }))
            .await
    }

    #[instrument(name = "SupabaseSignOut", skip_all)]
    async fn sign_out(&self, access_token: &str) -> Result<(), AuthError> {
        let response = self
            .send(
                self.client
                    .post(self.endpoint("logout"))
                    .bearer_auth(access_token),
            )
            .await?;

        if !response.status().is_success() {
            return Err(rejection(response, false).await);
        }
        Ok(())
    }

    #[instrument(name = "SupabaseResetPassword", skip(self))]
    async fn reset_password(&self, email: &str) -> Result<(), AuthError> {
        let response = self
            .send(
                self.client
                    .post(self.endpoint("recover"))
                    .json(&json!({ "email": email })),
            )
            .await?;

        if !response.status().is_success() {
            return Err(rejection(response, false).await);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const ANON_KEY: &str = "anon-key";

    fn token_body(expires_at: i64) -> serde_json::Value {
        json!({
            "access_token": "access-1",
            "token_type": "bearer",
            "expires_in": 3600,
            "expires_at": expires_at,
            "refresh_token": "refresh-1",
            "user": { "id": "user-1", "email": "ana@example.com" }
        })
    }

    async fn provider(mock_server: &MockServer) -> SupabaseAuthProvider {
        SupabaseAuthProvider::new(&mock_server.uri(), ANON_KEY).unwrap()
    }

    #[tokio::test]
    async fn test_password_sign_in() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/token"))
            .and(query_param("grant_type", "password"))
            .and(header("apikey", ANON_KEY))
            .and(body_json(
                json!({ "email": "ana@example.com", "password": "secret1" }),
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body(1_900_000_000)))
            .expect(1)
            .mount(&mock_server)
            .await;

        let session = provider(&mock_server)
            .await
            .sign_in_with_password("ana@example.com", "secret1")
            .await
            .unwrap();

        assert_eq!(session.access_token, "access-1");
        assert_eq!(session.refresh_token, "refresh-1");
        assert_eq!(session.user_id, "user-1");
        assert_eq!(session.expires_at.timestamp(), 1_900_000_000);
    }

    #[tokio::test]
    async fn test_bad_credentials_are_authentication_failures() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "code": 400,
                "error_code": "invalid_credentials",
                "msg": "Invalid login credentials"
            })))
            .mount(&mock_server)
            .await;

        let err = provider(&mock_server)
            .await
            .sign_in_with_password("ana@example.com", "wrong-pass")
            .await
            .unwrap_err();
        assert_eq!(
            err,
            AuthError::AuthenticationFailed("Invalid login credentials".to_string())
        );
    }

    #[tokio::test]
    async fn test_server_errors_are_provider_errors() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/token"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;

        let err = provider(&mock_server)
            .await
            .sign_in_with_password("ana@example.com", "secret1")
            .await
            .unwrap_err();
        assert_eq!(
            err,
            AuthError::Provider("HTTP error: 500 Internal Server Error".to_string())
        );
    }

    #[tokio::test]
    async fn test_sign_up_pending_confirmation() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/signup"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "user-9",
                "email": "ana@example.com",
                "confirmation_sent_at": "2026-01-15T12:00:00Z"
            })))
            .mount(&mock_server)
            .await;

        let account = provider(&mock_server)
            .await
            .sign_up("ana@example.com", "secret1")
            .await
            .unwrap();
        assert_eq!(account.user_id, "user-9");
        assert_eq!(account.email, "ana@example.com");
    }

    #[tokio::test]
    async fn test_sign_up_error_message_is_verbatim() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/signup"))
            .respond_with(ResponseTemplate::new(422).set_body_json(json!({
                "error_code": "user_already_exists",
                "msg": "User already registered"
            })))
            .mount(&mock_server)
            .await;

        let err = provider(&mock_server)
            .await
            .sign_up("ana@example.com", "secret1")
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::Provider("User already registered".to_string()));
    }

    #[tokio::test]
    async fn test_authorize_url() {
        let mock_server = MockServer::start().await;
        let url = provider(&mock_server)
            .await
            .authorize_url(&AuthorizeRequest {
                provider: "google".to_string(),
                redirect_to: "tasaverde://auth/callback".to_string(),
                skip_browser_redirect: true,
            })
            .await
            .unwrap();

        let parsed = url::Url::parse(&url).unwrap();
        assert_eq!(parsed.path(), "/auth/v1/authorize");
        let pairs: Vec<(String, String)> = parsed.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("provider".to_string(), "google".to_string())));
        assert!(pairs.contains(&(
            "redirect_to".to_string(),
            "tasaverde://auth/callback".to_string()
        )));
    }

    #[tokio::test]
    async fn test_set_session_validates_access_token() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/v1/user"))
            .and(header("authorization", "Bearer oauth-access"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "id": "user-7" })),
            )
            .mount(&mock_server)
            .await;

        let session = provider(&mock_server)
            .await
            .set_session(&OAuthTokens {
                access_token: "oauth-access".to_string(),
                refresh_token: "oauth-refresh".to_string(),
                expires_in: Some(120),
            })
            .await
            .unwrap();

        assert_eq!(session.user_id, "user-7");
        assert_eq!(session.refresh_token, "oauth-refresh");
        assert!(!session.is_expired());
        assert!(session.expires_within(Duration::seconds(121)));
    }

    #[tokio::test]
    async fn test_set_session_rejected_is_provider_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/v1/user"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "msg": "invalid JWT"
            })))
            .mount(&mock_server)
            .await;

        let err = provider(&mock_server)
            .await
            .set_session(&OAuthTokens {
                access_token: "bad".to_string(),
                refresh_token: "bad".to_string(),
                expires_in: None,
            })
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::Provider("invalid JWT".to_string()));
    }

    #[tokio::test]
    async fn test_refresh_uses_refresh_grant() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/token"))
            .and(query_param("grant_type", "refresh_token"))
            .and(body_json(json!({ "refresh_token": "refresh-0" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body(1_900_000_000)))
            .mount(&mock_server)
            .await;

        let session = provider(&mock_server)
            .await
            .refresh_session("refresh-0")
            .await
            .unwrap();
        assert_eq!(session.refresh_token, "refresh-1");
    }

    #[tokio::test]
    async fn test_sign_out_and_recover() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/logout"))
            .and(header("authorization", "Bearer access-1"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/recover"))
            .and(body_json(json!({ "email": "ana@example.com" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&mock_server)
            .await;

        let provider = provider(&mock_server).await;
        provider.sign_out("access-1").await.unwrap();
        provider.reset_password("ana@example.com").await.unwrap();
    }
}
