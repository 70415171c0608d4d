use std::path::PathBuf;

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `120`). Multipart uploads
    /// are spooled inside this window.
    pub request_timeout_secs: u64,
    /// How long shutdown waits for in-flight uploads (default: `10`).
    pub shutdown_timeout_secs: u64,
    /// Where multipart uploads are written before the orchestrator reads them.
    pub spool_dir: PathBuf,
    /// Largest accepted request body, in MiB (default: `10240`).
    pub max_upload_mb: u64,
    /// Ping period for dashboard WebSocket subscribers (default: `30`).
    pub ws_heartbeat_secs: u64,
    /// Base URL of the survey backend. `None` selects the in-memory backend.
    pub backend_url: Option<String>,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default                    |
    /// |------------------------|----------------------------|
    /// | `HOST`                 | `0.0.0.0`                  |
    /// | `PORT`                 | `3000`                     |
    /// | `CORS_ORIGINS`         | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS` | `120`                      |
    /// | `SHUTDOWN_TIMEOUT_SECS`| `10`                       |
    /// | `SPOOL_DIR`            | `storage/uploads`          |
    /// | `MAX_UPLOAD_MB`        | `10240`                    |
    /// | `WS_HEARTBEAT_SECS`    | `30`                       |
    /// | `BACKEND_URL`          | unset (in-memory backend)  |
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let host = lookup("HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port = parse_or(&lookup, "PORT", 3000u16);

        let cors_origins: Vec<String> = lookup("CORS_ORIGINS")
            .unwrap_or_else(|| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs = parse_or(&lookup, "REQUEST_TIMEOUT_SECS", 120u64);
        let shutdown_timeout_secs = parse_or(&lookup, "SHUTDOWN_TIMEOUT_SECS", 10u64);
        let spool_dir = lookup("SPOOL_DIR")
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| "storage/uploads".into())
            .into();
        let max_upload_mb = parse_or(&lookup, "MAX_UPLOAD_MB", 10_240u64);
        let ws_heartbeat_secs = parse_or(&lookup, "WS_HEARTBEAT_SECS", 30u64).max(1);
        let backend_url = lookup("BACKEND_URL")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            shutdown_timeout_secs,
            spool_dir,
            max_upload_mb,
            ws_heartbeat_secs,
            backend_url,
        }
    }

    /// Body limit in bytes for the axum `DefaultBodyLimit` layer.
    pub fn max_upload_bytes(&self) -> usize {
        usize::try_from(self.max_upload_mb.saturating_mul(1024 * 1024)).unwrap_or(usize::MAX)
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy + std::fmt::Debug,
{
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, ?default, "Invalid value, using default");
            default
        }),
    }
}
