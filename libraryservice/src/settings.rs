use anyhow::Context;
use config::{Config, Environment, File};
use serde::Deserialize;

/// Service configuration.
/// Built from defaults, an optional `libraryservice.toml` and `LIBRARY__*` environment variables,
/// e.g. `LIBRARY__DATABASE__HOSTNAME=db`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub session: SessionSettings,
    pub smtp: SmtpSettings,
    pub frontend_url: String,
    pub sweeps: SweepSettings,
    pub bootstrap_admin: Option<BootstrapAdminSettings>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub use_in_memory: bool,
    pub hostname: String,
    pub username: String,
    pub password: String,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            use_in_memory: false,
            hostname: "127.0.0.1".to_string(),
            username: "postgres".to_string(),
            password: "postgres".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub jwt_secret: String,
    pub jwt_expire_hours: i64,
    pub cookie_expire_days: i64,
    /// Adds the `Secure` attribute to the session cookie
    pub secure_cookie: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            jwt_secret: "change-me".to_string(),
            jwt_expire_hours: 72,
            cookie_expire_days: 3,
            secure_cookie: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SmtpSettings {
    /// When disabled emails are only logged
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
}

impl Default for SmtpSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            host: "localhost".to_string(),
            port: 465,
            username: String::new(),
            password: String::new(),
            from: "Library Management System <noreply@library.local>".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SweepSettings {
    pub overdue_interval_seconds: u64,
    pub unverified_interval_seconds: u64,
}

impl Default for SweepSettings {
    fn default() -> Self {
        Self {
            overdue_interval_seconds: 24 * 60 * 60,
            unverified_interval_seconds: 5 * 60,
        }
    }
}

/// Admin account created on startup when no verified account uses the email
#[derive(Debug, Clone, Deserialize)]
pub struct BootstrapAdminSettings {
    pub name: String,
    pub email: String,
    pub password: String,
}

impl Settings {
    pub fn load() -> anyhow::Result<Self> {
        let settings: Settings = Config::builder()
            .add_source(File::with_name("libraryservice").required(false))
            .add_source(
                Environment::with_prefix("LIBRARY")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Failed to parse configuration")?;

        if settings.session.jwt_secret == SessionSettings::default().jwt_secret {
            tracing::warn!("session.jwt_secret is the built-in default, set LIBRARY__SESSION__JWT_SECRET");
        }
        if settings.frontend_url.is_empty() {
            tracing::warn!("frontend_url is not set, password reset links will be relative");
        }
        Ok(settings)
    }
}

#[cfg(test)]
mod settings_tests {
    use super::*;

    #[test]
    fn test_defaults_without_any_source() {
        let settings: Settings = Config::builder()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(settings.server.port, 8080);
        assert!(!settings.database.use_in_memory);
        assert_eq!(settings.sweeps.overdue_interval_seconds, 86400);
        assert_eq!(settings.sweeps.unverified_interval_seconds, 300);
        assert!(settings.bootstrap_admin.is_none());
    }

    #[test]
    fn test_nested_overrides() {
        let settings: Settings = Config::builder()
            .set_override("database.use_in_memory", true)
            .unwrap()
            .set_override("session.cookie_expire_days", 7)
            .unwrap()
            .set_override("bootstrap_admin.name", "Root")
            .unwrap()
            .set_override("bootstrap_admin.email", "root@library.local")
            .unwrap()
            .set_override("bootstrap_admin.password", "rootpass1")
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert!(settings.database.use_in_memory);
        assert_eq!(settings.session.cookie_expire_days, 7);
        assert_eq!(settings.session.jwt_expire_hours, 72);
        assert_eq!(settings.bootstrap_admin.unwrap().email, "root@library.local");
    }
}
