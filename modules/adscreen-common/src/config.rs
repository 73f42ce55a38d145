use crate::error::AdScreenError;

/// Secrets and environment-specific values. Limits, timeouts and storage
/// layout live in the TOML [`FileConfig`](crate::FileConfig).
#[derive(Debug, Clone)]
pub struct AppConfig {
    // Database
    pub database_url: String,

    // Ad library snapshot access
    pub fb_access_token: String,

    // Object storage
    pub gcs_access_token: Option<String>,
}

impl AppConfig {
    /// Load from the process environment, reading `.env` first if present.
    pub fn from_env() -> Result<Self, AdScreenError> {
        dotenvy::dotenv().ok();

        let config = Self {
            database_url: required_env("DATABASE_URL")?,
            fb_access_token: required_env("FB_ACCESS_TOKEN")?,
            gcs_access_token: std::env::var("GCS_ACCESS_TOKEN")
                .ok()
                .filter(|v| !v.is_empty()),
        };

        config.log_keys();
        Ok(config)
    }

    fn log_keys(&self) {
        tracing::info!("Config loaded:");
        tracing::info!("  DATABASE_URL: {}", preview(&self.database_url));
        tracing::info!("  FB_ACCESS_TOKEN: {}", preview(&self.fb_access_token));
        tracing::info!("  GCS_ACCESS_TOKEN: {}", preview_opt(&self.gcs_access_token));
    }
}

/// First few characters of a secret, for logs.
pub fn preview(val: &str) -> String {
    let n = val.char_indices().nth(5).map(|(i, _)| i).unwrap_or(val.len());
    format!("{}...({} chars)", &val[..n], val.len())
}

fn preview_opt(val: &Option<String>) -> String {
    match val {
        Some(v) if !v.is_empty() => preview(v),
        _ => "<not set>".to_string(),
    }
}

fn required_env(key: &str) -> Result<String, AdScreenError> {
    std::env::var(key).map_err(|_| AdScreenError::MissingEnv(key.to_string()))
}
