use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::config::Settings;

#[derive(Debug, Error)]
pub(crate) enum SecurityError {
    #[cfg(test)]
    #[error("jwt encoding failed")]
    JwtEncoding,
    #[error("jwt decoding failed: {0}")]
    JwtDecoding(jsonwebtoken::errors::Error),
    #[error("unsupported jwt algorithm: {0}")]
    UnsupportedAlgorithm(String),
}

/// Claims we read from provider-issued bearer tokens. Profile claims are
/// optional because some providers only expose them through userinfo.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Claims {
    pub(crate) sub: String,
    pub(crate) exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) iss: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) aud: Option<String>,
}

#[cfg(test)]
pub(crate) fn create_access_token(
    subject: &str,
    email: &str,
    name: &str,
    settings: &Settings,
    expires_in: Option<time::Duration>,
) -> Result<String, SecurityError> {
    use jsonwebtoken::{encode, EncodingKey, Header};
    use time::{Duration, OffsetDateTime};

    let algorithm = algorithm_from_settings(settings)?;
    let expire = OffsetDateTime::now_utc()
        + expires_in.unwrap_or_else(|| {
            Duration::minutes(settings.security().access_token_expire_minutes as i64)
        });

    let claims = Claims {
        sub: subject.to_string(),
        exp: expire.unix_timestamp(),
        email: Some(email.to_string()),
        name: Some(name.to_string()),
        iss: settings.identity().issuer.clone(),
        aud: settings.identity().audience.clone(),
    };

    encode(
        &Header::new(algorithm),
        &claims,
        &EncodingKey::from_secret(settings.security().secret_key.as_bytes()),
    )
    .map_err(|_| SecurityError::JwtEncoding)
}

pub(crate) fn verify_token(token: &str, settings: &Settings) -> Result<Claims, SecurityError> {
    let algorithm = algorithm_from_settings(settings)?;
    let mut validation = Validation::new(algorithm);
    validation.validate_exp = true;
    validation.required_spec_claims.insert("exp".to_string());
    validation.required_spec_claims.insert("sub".to_string());

    match &settings.identity().issuer {
        Some(issuer) => {
            validation.set_issuer(&[issuer]);
            validation.required_spec_claims.insert("iss".to_string());
        }
        None => validation.iss = None,
    }
    match &settings.identity().audience {
        Some(audience) => {
            validation.set_audience(&[audience]);
            validation.required_spec_claims.insert("aud".to_string());
        }
        None => validation.validate_aud = false,
    }

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(settings.security().secret_key.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(SecurityError::JwtDecoding)
}

fn algorithm_from_settings(settings: &Settings) -> Result<Algorithm, SecurityError> {
    match settings.security().algorithm.as_str() {
        "HS256" => Ok(Algorithm::HS256),
        "HS384" => Ok(Algorithm::HS384),
        "HS512" => Ok(Algorithm::HS512),
        other => Err(SecurityError::UnsupportedAlgorithm(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;

    #[tokio::test]
    async fn token_carries_profile_claims() {
        let _guard = test_support::env_lock().await;
        test_support::set_test_env();
        let settings = Settings::load().expect("settings");

        let token = create_access_token(
            "auth0|123",
            "student@example.edu",
            "Student",
            &settings,
            Some(time::Duration::minutes(1)),
        )
        .expect("token");
        let claims = verify_token(&token, &settings).expect("claims");

        assert_eq!(claims.sub, "auth0|123");
        assert_eq!(claims.email.as_deref(), Some("student@example.edu"));
        assert_eq!(claims.name.as_deref(), Some("Student"));
    }

    #[tokio::test]
    async fn expired_token_is_rejected() {
        let _guard = test_support::env_lock().await;
        test_support::set_test_env();
        let settings = Settings::load().expect("settings");

        let token = create_access_token(
            "auth0|123",
            "student@example.edu",
            "Student",
            &settings,
            Some(time::Duration::minutes(-10)),
        )
        .expect("token");

        assert!(verify_token(&token, &settings).is_err());
    }

    #[tokio::test]
    async fn issuer_mismatch_is_rejected() {
        let _guard = test_support::env_lock().await;
        test_support::set_test_env();
        let settings = Settings::load().expect("settings");
        let token =
            create_access_token("auth0|123", "s@example.edu", "S", &settings, None).expect("token");

        std::env::set_var("IDENTITY_ISSUER", "https://issuer.example/");
        let strict = Settings::load();
        std::env::remove_var("IDENTITY_ISSUER");

        let strict = strict.expect("settings");
        assert!(verify_token(&token, &strict).is_err());
    }

    #[tokio::test]
    async fn configured_audience_is_required() {
        let _guard = test_support::env_lock().await;
        test_support::set_test_env();
        let settings = Settings::load().expect("settings");
        let bare =
            create_access_token("auth0|123", "s@example.edu", "S", &settings, None).expect("token");

        std::env::set_var("IDENTITY_AUDIENCE", "alaaska-api");
        std::env::set_var("IDENTITY_ISSUER", "https://issuer.example/");
        let strict = Settings::load();
        std::env::remove_var("IDENTITY_AUDIENCE");
        std::env::remove_var("IDENTITY_ISSUER");
        let strict = strict.expect("settings");

        assert!(verify_token(&bare, &strict).is_err());
        let scoped =
            create_access_token("auth0|123", "s@example.edu", "S", &strict, None).expect("token");
        let claims = verify_token(&scoped, &strict).expect("claims");
        assert_eq!(claims.aud.as_deref(), Some("alaaska-api"));
    }
}
