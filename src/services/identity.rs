use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;

use crate::core::config::Settings;
use crate::core::security::{self, SecurityError};

/// Who a bearer token belongs to. Role flags are not part of the identity;
/// they come from the user directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Identity {
    pub(crate) id: String,
    pub(crate) email: String,
    pub(crate) name: String,
}

#[derive(Debug, Error)]
pub(crate) enum IdentityError {
    #[error("invalid token: {0}")]
    InvalidToken(#[from] SecurityError),
    #[error("userinfo request failed: {0}")]
    Userinfo(#[from] reqwest::Error),
    #[error("token carries no email")]
    MissingEmail,
}

#[async_trait]
pub(crate) trait IdentityResolver: Send + Sync {
    async fn resolve(&self, token: &str) -> Result<Identity, IdentityError>;
}

#[derive(Debug, Deserialize)]
struct UserInfo {
    email: Option<String>,
    name: Option<String>,
}

/// Verifies the token locally and, when the claims lack a profile, asks the
/// provider's userinfo endpoint.
#[derive(Clone)]
pub(crate) struct JwtIdentityResolver {
    settings: Settings,
    client: Client,
}

impl JwtIdentityResolver {
    pub(crate) fn new(settings: Settings) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.identity().timeout_seconds))
            .build()?;
        Ok(Self { settings, client })
    }

    async fn fetch_userinfo(&self, url: &str, token: &str) -> Result<UserInfo, IdentityError> {
        let info = self
            .client
            .get(url)
            .bearer_auth(token)
            .send()
            .await?
            .error_for_status()?
            .json::<UserInfo>()
            .await?;
        Ok(info)
    }
}

#[async_trait]
impl IdentityResolver for JwtIdentityResolver {
    async fn resolve(&self, token: &str) -> Result<Identity, IdentityError> {
        let claims = security::verify_token(token, &self.settings)?;
        let mut email = claims.email;
        let mut name = claims.name;

        if email.is_none() || name.is_none() {
            if let Some(url) = &self.settings.identity().userinfo_url {
                let info = self.fetch_userinfo(url, token).await?;
                email = email.or(info.email);
                name = name.or(info.name);
            }
        }

        identity_from_profile(claims.sub, email, name)
    }
}

fn identity_from_profile(
    id: String,
    email: Option<String>,
    name: Option<String>,
) -> Result<Identity, IdentityError> {
    let email = email
        .map(|value| value.trim().to_ascii_lowercase())
        .filter(|value| !value.is_empty())
        .ok_or(IdentityError::MissingEmail)?;
    let name = name
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| email.clone());

    Ok(Identity { id, email, name })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;

    #[test]
    fn profile_email_is_lowercased_and_name_falls_back() {
        let identity =
            identity_from_profile("u1".to_string(), Some(" Ada@Example.EDU ".to_string()), None)
                .expect("identity");

        assert_eq!(identity.email, "ada@example.edu");
        assert_eq!(identity.name, "ada@example.edu");
    }

    #[test]
    fn profile_without_email_is_rejected() {
        let result = identity_from_profile("u1".to_string(), None, Some("Ada".to_string()));
        assert!(matches!(result, Err(IdentityError::MissingEmail)));
    }

    #[tokio::test]
    async fn resolves_signed_token_without_userinfo() {
        let _guard = test_support::env_lock().await;
        test_support::set_test_env();
        let settings = Settings::load().expect("settings");
        let token = security::create_access_token(
            "auth0|42",
            "Student@Example.edu",
            "Student One",
            &settings,
            None,
        )
        .expect("token");

        let resolver = JwtIdentityResolver::new(settings).expect("resolver");
        let identity = resolver.resolve(&token).await.expect("identity");

        assert_eq!(
            identity,
            Identity {
                id: "auth0|42".to_string(),
                email: "student@example.edu".to_string(),
                name: "Student One".to_string(),
            }
        );
        assert!(resolver.resolve("not-a-token").await.is_err());
    }
}
