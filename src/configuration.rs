use std::fmt;

use crate::error::AuthError;

/// Minimum signing secret length for HMAC-SHA-256 (bytes)
pub const MIN_SECRET_LENGTH: usize = 32;
/// One week
pub const MAX_ACCESS_TOKEN_EXPIRY_MINUTES: i64 = 7 * 24 * 60;
pub const MAX_REFRESH_TOKEN_EXPIRY_DAYS: i64 = 365;

#[derive(serde::Deserialize, Clone, Debug)]
pub struct Settings {
    pub jwt: JwtSettings,
    #[serde(default)]
    pub hashing: HashingSettings,
    pub database: DatabaseSettings,
}

#[derive(serde::Deserialize, Clone)]
pub struct DatabaseSettings {
    pub username: String,
    pub password: String,
    pub port: u16,
    pub host: String,
    pub database_name: String,
}

impl DatabaseSettings {
    pub fn connection_string(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, self.database_name
        )
    }

    pub fn connection_string_without_db(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}",
            self.username, self.password, self.host, self.port
        )
    }
}

impl fmt::Debug for DatabaseSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseSettings")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database_name", &self.database_name)
            .finish()
    }
}

/// How rotation ("refresh") tokens are checked on refresh
#[derive(serde::Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RotationPolicy {
    /// Only the 64-byte base64 shape is checked. Any well-formed value can
    /// refresh any extractable access token.
    ShapeOnly,
    /// The token must match a stored, unrevoked, unexpired record issued to
    /// the same subject. Each token is single-use.
    #[default]
    Bound,
}

/// JWT authentication settings
#[derive(serde::Deserialize, Clone)]
pub struct JwtSettings {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub access_token_expiry_minutes: i64,
    #[serde(default = "default_refresh_token_expiry_days")]
    pub refresh_token_expiry_days: i64,
    #[serde(default)]
    pub rotation_policy: RotationPolicy,
}

fn default_refresh_token_expiry_days() -> i64 {
    7
}

impl JwtSettings {
    /// Reject settings the token service cannot run with
    pub fn validate(&self) -> Result<(), AuthError> {
        if self.secret.trim().is_empty() {
            return Err(AuthError::Configuration("jwt.secret is missing".to_string()));
        }
        if self.secret.len() < MIN_SECRET_LENGTH {
            return Err(AuthError::Configuration(format!(
                "jwt.secret must be at least {} bytes",
                MIN_SECRET_LENGTH
            )));
        }
        if self.issuer.trim().is_empty() {
            return Err(AuthError::Configuration("jwt.issuer is missing".to_string()));
        }
        if self.audience.trim().is_empty() {
            return Err(AuthError::Configuration("jwt.audience is missing".to_string()));
        }
        if !(1..=MAX_ACCESS_TOKEN_EXPIRY_MINUTES).contains(&self.access_token_expiry_minutes) {
            return Err(AuthError::Configuration(format!(
                "jwt.access_token_expiry_minutes must be between 1 and {}",
                MAX_ACCESS_TOKEN_EXPIRY_MINUTES
            )));
        }
        if !(1..=MAX_REFRESH_TOKEN_EXPIRY_DAYS).contains(&self.refresh_token_expiry_days) {
            return Err(AuthError::Configuration(format!(
                "jwt.refresh_token_expiry_days must be between 1 and {}",
                MAX_REFRESH_TOKEN_EXPIRY_DAYS
            )));
        }
        Ok(())
    }

    pub fn access_token_expiry_seconds(&self) -> i64 {
        self.access_token_expiry_minutes * 60
    }
}

impl fmt::Debug for JwtSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtSettings")
            .field("secret", &"<redacted>")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("access_token_expiry_minutes", &self.access_token_expiry_minutes)
            .field("refresh_token_expiry_days", &self.refresh_token_expiry_days)
            .field("rotation_policy", &self.rotation_policy)
            .finish()
    }
}

/// Password hashing settings
#[derive(serde::Deserialize, Clone, Debug)]
pub struct HashingSettings {
    pub cost: u32,
}

impl Default for HashingSettings {
    fn default() -> Self {
        Self {
            cost: bcrypt::DEFAULT_COST,
        }
    }
}

impl HashingSettings {
    pub fn validate(&self) -> Result<(), AuthError> {
        if !(4..=31).contains(&self.cost) {
            return Err(AuthError::Configuration(format!(
                "hashing.cost must be between 4 and 31, got {}",
                self.cost
            )));
        }
        Ok(())
    }
}

/// Load settings from `configuration.{yaml,toml,json}` and `APP_*` env vars.
///
/// e.g. `APP_JWT__SECRET=...` overrides `jwt.secret`.
pub fn get_configuration() -> Result<Settings, config::ConfigError> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("configuration").required(false))
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;
    settings.try_deserialize::<Settings>()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_jwt() -> JwtSettings {
        JwtSettings {
            secret: "test-secret-key-at-least-32-characters-long".to_string(),
            issuer: "forum".to_string(),
            audience: "forum-clients".to_string(),
            access_token_expiry_minutes: 15,
            refresh_token_expiry_days: 7,
            rotation_policy: RotationPolicy::Bound,
        }
    }

    #[test]
    fn test_valid_jwt_settings() {
        assert!(valid_jwt().validate().is_ok());
    }

    #[test]
    fn test_short_secret_rejected() {
        let mut config = valid_jwt();
        config.secret = "too-short".to_string();
        assert!(matches!(config.validate(), Err(AuthError::Configuration(_))));
    }

    #[test]
    fn test_missing_issuer_and_audience_rejected() {
        let mut config = valid_jwt();
        config.issuer = "  ".to_string();
        assert!(config.validate().is_err());

        let mut config = valid_jwt();
        config.audience = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_non_positive_ttl_rejected() {
        let mut config = valid_jwt();
        config.access_token_expiry_minutes = 0;
        assert!(config.validate().is_err());

        config.access_token_expiry_minutes = -5;
        assert!(config.validate().is_err());

        let mut config = valid_jwt();
        config.refresh_token_expiry_days = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_oversized_ttl_rejected() {
        let mut config = valid_jwt();
        config.access_token_expiry_minutes = MAX_ACCESS_TOKEN_EXPIRY_MINUTES;
        assert!(config.validate().is_ok());
        config.access_token_expiry_minutes = MAX_ACCESS_TOKEN_EXPIRY_MINUTES + 1;
        assert!(matches!(config.validate(), Err(AuthError::Configuration(_))));
        config.access_token_expiry_minutes = i64::MAX / 60 + 1;
        assert!(matches!(config.validate(), Err(AuthError::Configuration(_))));

        let mut config = valid_jwt();
        config.refresh_token_expiry_days = MAX_REFRESH_TOKEN_EXPIRY_DAYS;
        assert!(config.validate().is_ok());
        config.refresh_token_expiry_days = i64::MAX;
        assert!(matches!(config.validate(), Err(AuthError::Configuration(_))));
    }

    #[test]
    fn test_expiry_seconds() {
        assert_eq!(valid_jwt().access_token_expiry_seconds(), 900);
    }

    #[test]
    fn test_debug_redacts_secret() {
        let rendered = format!("{:?}", valid_jwt());
        assert!(!rendered.contains("test-secret-key"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_hashing_cost_bounds() {
        assert!(HashingSettings::default().validate().is_ok());
        assert!(HashingSettings { cost: 3 }.validate().is_err());
        assert!(HashingSettings { cost: 32 }.validate().is_err());
    }

    #[test]
    fn test_rotation_policy_deserializes_snake_case() {
        let policy: RotationPolicy = serde_json::from_str("\"shape_only\"").unwrap();
        assert_eq!(policy, RotationPolicy::ShapeOnly);
        assert_eq!(RotationPolicy::default(), RotationPolicy::Bound);
    }
}
