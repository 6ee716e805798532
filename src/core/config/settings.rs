use super::parsing::{
    env_optional, env_or_default, parse_bool, parse_cors_origins, parse_environment, parse_f64,
    parse_rate_limit_backend, parse_u16, parse_u32, parse_u64, parse_usize,
};
use super::secret::load_or_create_dev_secret;
use super::types::{
    AdminSettings, AiSettings, ApiSettings, ConfigError, CorsSettings, DatabaseSettings,
    ExportSettings, IdentitySettings, RateLimitSettings, RedisSettings, RuntimeSettings,
    SecuritySettings, ServerHost, ServerPort, ServerSettings, Settings, TelemetrySettings,
};

impl Settings {
    pub(crate) fn load() -> Result<Self, ConfigError> {
        let host = env_or_default("ALAASKA_HOST", "0.0.0.0");
        let port = env_or_default("ALAASKA_PORT", "8000");

        let environment =
            parse_environment(env_optional("ALAASKA_ENV").or_else(|| env_optional("ENVIRONMENT")));
        let strict_config =
            env_optional("ALAASKA_STRICT_CONFIG").map(|value| parse_bool(&value)).unwrap_or(false)
                || environment.is_production();

        let project_name = env_or_default("PROJECT_NAME", "ALAASKA API");
        let version = env_or_default("VERSION", env!("CARGO_PKG_VERSION"));
        let api_v1_str = env_or_default("API_V1_STR", "/api/v1");
        let max_body_bytes =
            parse_usize("MAX_BODY_BYTES", env_or_default("MAX_BODY_BYTES", "1000000"))?;

        let secret_key = match env_optional("SECRET_KEY") {
            Some(value) => value,
            None if strict_config => return Err(ConfigError::MissingSecret("SECRET_KEY")),
            None => load_or_create_dev_secret(),
        };
        let access_token_expire_minutes = parse_u64(
            "ACCESS_TOKEN_EXPIRE_MINUTES",
            env_or_default("ACCESS_TOKEN_EXPIRE_MINUTES", "60"),
        )?;
        let algorithm = env_or_default("ALGORITHM", "HS256");

        let identity_issuer = env_optional("IDENTITY_ISSUER");
        let identity_audience = env_optional("IDENTITY_AUDIENCE");
        let identity_userinfo_url = env_optional("IDENTITY_USERINFO_URL");
        let identity_timeout_seconds = parse_u64(
            "IDENTITY_TIMEOUT_SECONDS",
            env_or_default("IDENTITY_TIMEOUT_SECONDS", "60"),
        )?;

        let cors_origins = parse_cors_origins(
            env_optional("BACKEND_CORS_ORIGINS").or_else(|| env_optional("FRONTEND_URL")),
        )?;

        let postgres_server = env_or_default("POSTGRES_SERVER", "localhost");
        let postgres_port = parse_u16("POSTGRES_PORT", env_or_default("POSTGRES_PORT", "5432"))?;
        let postgres_user = env_or_default("POSTGRES_USER", "alaaska");
        let postgres_password = env_or_default("POSTGRES_PASSWORD", "");
        let postgres_db = env_or_default("POSTGRES_DB", "alaaska_db");
        let database_url = env_optional("DATABASE_URL");
        let max_connections =
            parse_u32("DB_MAX_CONNECTIONS", env_or_default("DB_MAX_CONNECTIONS", "20"))?;

        let redis_host = env_or_default("REDIS_HOST", "localhost");
        let redis_port = parse_u16("REDIS_PORT", env_or_default("REDIS_PORT", "6379"))?;
        let redis_db = parse_u16("REDIS_DB", env_or_default("REDIS_DB", "0"))?;
        let redis_password = env_or_default("REDIS_PASSWORD", "");

        let openai_api_key = env_or_default("OPENAI_API_KEY", "");
        let openai_base_url = env_or_default("OPENAI_BASE_URL", "https://api.openai.com/v1");
        let ai_model = env_or_default("MODEL_ID", "gpt-4o-mini");
        let summarize_model = env_or_default("SUMMARIZE_MODEL_ID", &ai_model);
        let ai_max_tokens = parse_u32("AI_MAX_TOKENS", env_or_default("AI_MAX_TOKENS", "2000"))?;
        let ai_temperature =
            parse_f64("AI_TEMPERATURE", env_or_default("AI_TEMPERATURE", "0.7"))?;
        let summarize_temperature =
            parse_f64("SUMMARIZE_TEMPERATURE", env_or_default("SUMMARIZE_TEMPERATURE", "0.3"))?;
        let ai_request_timeout =
            parse_u64("AI_REQUEST_TIMEOUT", env_or_default("AI_REQUEST_TIMEOUT", "120"))?;

        let rate_limit_backend = parse_rate_limit_backend(env_optional("RATE_LIMIT_BACKEND"))?;
        let chat_start_per_window = parse_u64(
            "RATE_LIMIT_CHAT_START",
            env_or_default("RATE_LIMIT_CHAT_START", "5"),
        )?;
        let chat_per_window =
            parse_u64("RATE_LIMIT_CHAT", env_or_default("RATE_LIMIT_CHAT", "20"))?;
        let window_seconds = parse_u64(
            "RATE_LIMIT_WINDOW_SECONDS",
            env_or_default("RATE_LIMIT_WINDOW_SECONDS", "60"),
        )?;

        let frontend_url = env_or_default("FRONTEND_URL", "http://localhost:3000");
        let first_admin_email =
            env_optional("FIRST_ADMIN_EMAIL").map(|value| value.to_ascii_lowercase());

        let log_level = env_or_default("ALAASKA_LOG_LEVEL", "info");
        let json = env_optional("ALAASKA_LOG_JSON").map(|value| parse_bool(&value)).unwrap_or(false);
        let prometheus_enabled =
            env_optional("PROMETHEUS_ENABLED").map(|value| parse_bool(&value)).unwrap_or(false);

        let settings = Self {
            server: ServerSettings {
                host: ServerHost::parse(host)?,
                port: ServerPort::parse(port)?,
            },
            runtime: RuntimeSettings { environment, strict_config },
            api: ApiSettings { project_name, version, api_v1_str, max_body_bytes },
            security: SecuritySettings { secret_key, access_token_expire_minutes, algorithm },
            identity: IdentitySettings {
                issuer: identity_issuer,
                audience: identity_audience,
                userinfo_url: identity_userinfo_url,
                timeout_seconds: identity_timeout_seconds,
            },
            cors: CorsSettings { origins: cors_origins },
            database: DatabaseSettings {
                postgres_server,
                postgres_port,
                postgres_user,
                postgres_password,
                postgres_db,
                database_url,
                max_connections,
            },
            redis: RedisSettings {
                host: redis_host,
                port: redis_port,
                db: redis_db,
                password: redis_password,
            },
            ai: AiSettings {
                openai_api_key,
                openai_base_url,
                ai_model,
                summarize_model,
                ai_max_tokens,
                ai_temperature,
                summarize_temperature,
                ai_request_timeout,
            },
            rate_limit: RateLimitSettings {
                backend: rate_limit_backend,
                chat_start_per_window,
                chat_per_window,
                window_seconds,
            },
            export: ExportSettings { frontend_url },
            admin: AdminSettings { first_admin_email },
            telemetry: TelemetrySettings { log_level, json, prometheus_enabled },
        };

        settings.validate()?;
        Ok(settings)
    }

    pub(crate) fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host.0, self.server.port.0)
    }

    pub(crate) fn server_host(&self) -> &str {
        &self.server.host.0
    }

    pub(crate) fn server_port(&self) -> u16 {
        self.server.port.0
    }

    pub(crate) fn api(&self) -> &ApiSettings {
        &self.api
    }

    pub(crate) fn security(&self) -> &SecuritySettings {
        &self.security
    }

    pub(crate) fn identity(&self) -> &IdentitySettings {
        &self.identity
    }

    pub(crate) fn cors(&self) -> &CorsSettings {
        &self.cors
    }

    pub(crate) fn database(&self) -> &DatabaseSettings {
        &self.database
    }

    pub(crate) fn redis(&self) -> &RedisSettings {
        &self.redis
    }

    pub(crate) fn ai(&self) -> &AiSettings {
        &self.ai
    }

    pub(crate) fn rate_limit(&self) -> &RateLimitSettings {
        &self.rate_limit
    }

    pub(crate) fn export(&self) -> &ExportSettings {
        &self.export
    }

    pub(crate) fn admin(&self) -> &AdminSettings {
        &self.admin
    }

    pub(crate) fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    pub(crate) fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.rate_limit.window_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "RATE_LIMIT_WINDOW_SECONDS",
                value: "0".to_string(),
            });
        }

        if !(0.0..=2.0).contains(&self.ai.ai_temperature) {
            return Err(ConfigError::InvalidValue {
                field: "AI_TEMPERATURE",
                value: self.ai.ai_temperature.to_string(),
            });
        }

        if !(self.runtime.strict_config || self.runtime.environment.is_production()) {
            return Ok(());
        }

        if self.database.database_url.is_none() && self.database.postgres_password.is_empty() {
            return Err(ConfigError::MissingSecret("POSTGRES_PASSWORD"));
        }
        if self.ai.openai_api_key.is_empty() {
            return Err(ConfigError::MissingSecret("OPENAI_API_KEY"));
        }
        if self.identity.issuer.is_none() {
            return Err(ConfigError::MissingSecret("IDENTITY_ISSUER"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::RateLimitBackend;
    use crate::test_support;

    #[tokio::test]
    async fn defaults_load_in_development() {
        let _guard = test_support::env_lock().await;
        test_support::set_test_env();

        let settings = Settings::load().expect("settings");
        assert_eq!(settings.api().api_v1_str, "/api/v1");
        assert_eq!(settings.rate_limit().chat_start_per_window, 5);
        assert_eq!(settings.rate_limit().chat_per_window, 20);
        assert_eq!(settings.rate_limit().window_seconds, 60);
        assert_eq!(settings.rate_limit().backend, RateLimitBackend::Memory);
    }

    #[tokio::test]
    async fn strict_config_requires_secrets() {
        let _guard = test_support::env_lock().await;
        test_support::set_test_env();
        std::env::set_var("ALAASKA_STRICT_CONFIG", "1");
        std::env::remove_var("OPENAI_API_KEY");

        let result = Settings::load();
        std::env::set_var("ALAASKA_STRICT_CONFIG", "0");

        assert!(matches!(result, Err(ConfigError::MissingSecret(_))));
    }

    #[tokio::test]
    async fn zero_rate_limit_window_is_rejected() {
        let _guard = test_support::env_lock().await;
        test_support::set_test_env();
        std::env::set_var("RATE_LIMIT_WINDOW_SECONDS", "0");

        let result = Settings::load();
        std::env::remove_var("RATE_LIMIT_WINDOW_SECONDS");

        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { field: "RATE_LIMIT_WINDOW_SECONDS", .. })
        ));
    }
}
