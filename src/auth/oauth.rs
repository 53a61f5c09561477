//! Token extraction from implicit-grant redirects

use crate::core::identity::OAuthTokens;
use tracing::warn;
use url::form_urlencoded;

/// Extracts the session tokens from the fragment of an implicit-grant
/// callback URL, e.g. `tasaverde://auth/callback#access_token=..&refresh_token=..`.
///
/// Tokens in the query string are ignored. Returns `None` unless both tokens
/// are present and non-empty.
pub fn parse_implicit_grant(callback_url: &str) -> Option<OAuthTokens> {
    let (_, fragment) = callback_url.split_once('#')?;

    let mut access_token = None;
    let mut refresh_token = None;
    let mut expires_in = None;
    let mut error_description = None;

    for (key, value) in form_urlencoded::parse(fragment.as_bytes()) {
        match key.as_ref() {
            "access_token" => access_token = Some(value.into_owned()),
            "refresh_token" => refresh_token = Some(value.into_owned()),
            "expires_in" => expires_in = value.parse::<i64>().ok(),
            "error_description" => error_description = Some(value.into_owned()),
            _ => {}
        }
    }

    if let Some(description) = error_description {
        warn!(%description, "OAuth redirect carried an error");
    }

    match (access_token, refresh_token) {
        (Some(access_token), Some(refresh_token))
            if !access_token.is_empty() && !refresh_token.is_empty() =>
        {
            Some(OAuthTokens {
                access_token,
                refresh_token,
                expires_in,
            })
        }
        _ => None,
    }
}

/// True if `url` landed on the app's callback scheme.
pub fn matches_callback(url: &str, callback_url: &str) -> bool {
    match callback_url.split_once("://") {
        Some((scheme, _)) => url
            .split_once("://")
            .is_some_and(|(landed, _)| landed.eq_ignore_ascii_case(scheme)),
        None => url.starts_with(callback_url),
    }
}
