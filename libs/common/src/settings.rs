//! Layered service settings
//!
//! Sources, later ones winning:
//! 1. built-in defaults
//! 2. `config/default.toml`
//! 3. `config/<service>.toml`
//! 4. `config/<APP_ENV>.toml`
//! 5. `DEALDROP__*` environment variables (`DEALDROP__LOCKOUT__MAX_ATTEMPTS=3`)
//!
//! Every file is optional. Connection strings and JWT keys are not part of
//! this struct; they keep their dedicated `from_env` loaders.

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::SettingsError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub session: SessionSettings,
    pub lockout: LockoutSettings,
    pub rate_limits: RateLimitSettings,
    pub submissions: SubmissionSettings,
    pub password_reset: PasswordResetSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    /// Falls back to the service's own default port when unset
    pub port: Option<u16>,
    pub cors_origins: Vec<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: None,
            cors_origins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Lifetime of a session record; matches the refresh token lifetime
    pub ttl_seconds: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            ttl_seconds: 604_800,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LockoutSettings {
    pub max_attempts: u32,
    /// Failed attempts older than this no longer count
    pub window_seconds: u64,
    pub lockout_seconds: u64,
}

impl Default for LockoutSettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            window_seconds: 900,
            lockout_seconds: 900,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitRule {
    pub max_requests: u32,
    pub window_seconds: u64,
}

impl RateLimitRule {
    pub const fn new(max_requests: u32, window_seconds: u64) -> Self {
        Self {
            max_requests,
            window_seconds,
        }
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    pub submissions: RateLimitRule,
    pub contact: RateLimitRule,
    pub coupon_use: RateLimitRule,
    pub search: RateLimitRule,
    pub user_mutations: RateLimitRule,
    pub admin_mutations: RateLimitRule,
    pub registration: RateLimitRule,
    pub password_reset: RateLimitRule,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            submissions: RateLimitRule::new(5, 3600),
            contact: RateLimitRule::new(5, 3600),
            coupon_use: RateLimitRule::new(30, 60),
            search: RateLimitRule::new(60, 60),
            user_mutations: RateLimitRule::new(60, 60),
            admin_mutations: RateLimitRule::new(120, 60),
            registration: RateLimitRule::new(5, 3600),
            password_reset: RateLimitRule::new(3, 900),
        }
    }
}

impl RateLimitSettings {
    fn rules(&self) -> [(&'static str, RateLimitRule); 8] {
        [
            ("rate_limits.submissions", self.submissions),
            ("rate_limits.contact", self.contact),
            ("rate_limits.coupon_use", self.coupon_use),
            ("rate_limits.search", self.search),
            ("rate_limits.user_mutations", self.user_mutations),
            ("rate_limits.admin_mutations", self.admin_mutations),
            ("rate_limits.registration", self.registration),
            ("rate_limits.password_reset", self.password_reset),
        ]
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SubmissionSettings {
    /// Category used when a promoted coupon draft names none
    pub default_category_slug: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PasswordResetSettings {
    pub token_ttl_seconds: u64,
    /// Link sent by email; the token is appended as `?token=`
    pub reset_url: String,
}

impl Default for PasswordResetSettings {
    fn default() -> Self {
        Self {
            token_ttl_seconds: 3600,
            reset_url: "http://localhost:3000/reset-password".to_string(),
        }
    }
}

impl Settings {
    /// Load settings for the named service
    pub fn load(service: &str) -> Result<Self, SettingsError> {
        let app_env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let settings: Settings = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", service)).required(false))
            .add_source(File::with_name(&format!("config/{}", app_env)).required(false))
            .add_source(
                Environment::with_prefix("DEALDROP")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("server.cors_origins"),
            )
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    /// Reject values that would disable a protection outright
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.lockout.max_attempts == 0 {
            return Err(SettingsError::Invalid {
                key: "lockout.max_attempts",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.lockout.window_seconds == 0 || self.lockout.lockout_seconds == 0 {
            return Err(SettingsError::Invalid {
                key: "lockout",
                reason: "window and lockout durations must be positive".to_string(),
            });
        }
        if self.session.ttl_seconds == 0 {
            return Err(SettingsError::Invalid {
                key: "session.ttl_seconds",
                reason: "must be positive".to_string(),
            });
        }
        for (key, rule) in self.rate_limits.rules() {
            if rule.max_requests == 0 || rule.window_seconds == 0 {
                return Err(SettingsError::Invalid {
                    key,
                    reason: "max_requests and window_seconds must be positive".to_string(),
                });
            }
        }
        Ok(())
    }
}
