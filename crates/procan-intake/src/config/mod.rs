use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the intake service.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub collaborators: CollaboratorConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let format = match optional("APP_LOG_FORMAT").as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Compact,
        };

        let timeout_secs = env::var("COLLABORATOR_TIMEOUT_SECS")
            .unwrap_or_else(|_| "10".to_string())
            .parse::<u64>()
            .ok()
            .filter(|secs| *secs > 0)
            .ok_or(ConfigError::InvalidTimeout)?;

        let public_origin = optional("PUBLIC_ORIGIN")
            .unwrap_or_else(|| "http://localhost:3000".to_string())
            .trim_end_matches('/')
            .to_string();

        let stripe = optional("STRIPE_SECRET_KEY").map(|secret_key| StripeConfig {
            secret_key,
            webhook_secret: optional("STRIPE_WEBHOOK_SECRET"),
            api_base: optional("STRIPE_API_BASE")
                .unwrap_or_else(|| "https://api.stripe.com".to_string()),
        });

        let supabase = match (optional("SUPABASE_URL"), optional("SUPABASE_SERVICE_ROLE_KEY")) {
            (Some(url), Some(service_key)) => Some(SupabaseConfig {
                url: url.trim_end_matches('/').to_string(),
                service_key,
            }),
            (None, None) => None,
            _ => return Err(ConfigError::IncompleteSupabase),
        };

        let geocoder = GeocoderConfig {
            base_url: optional("GEOCODER_BASE_URL")
                .unwrap_or_else(|| "https://nominatim.openstreetmap.org".to_string()),
            user_agent: optional("GEOCODER_USER_AGENT")
                .unwrap_or_else(|| "ProCanIntake/1.0 (support@procansanitation.com)".to_string()),
        };

        let email = optional("RESEND_API_KEY").map(|api_key| EmailConfig {
            api_key,
            api_base: optional("RESEND_API_BASE")
                .unwrap_or_else(|| "https://api.resend.com".to_string()),
            from: optional("EMAIL_FROM")
                .unwrap_or_else(|| "ProCan Sanitation <orders@procansanitation.com>".to_string()),
            notify_to: optional("EMAIL_NOTIFY_TO"),
        });

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level, format },
            collaborators: CollaboratorConfig {
                timeout: Duration::from_secs(timeout_secs),
                public_origin,
                stripe,
                supabase,
                geocoder,
                email,
                staff_token: optional("ROUTE_SCHEDULER_TOKEN"),
            },
        })
    }
}

fn optional(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub format: LogFormat,
}

/// Credentials and endpoints for the third-party services the intake flow talks to.
///
/// Sections are `None` when their credentials are absent so the service can fall back to
/// in-memory stand-ins during local development.
#[derive(Debug, Clone)]
pub struct CollaboratorConfig {
    pub timeout: Duration,
    pub public_origin: String,
    pub stripe: Option<StripeConfig>,
    pub supabase: Option<SupabaseConfig>,
    pub geocoder: GeocoderConfig,
    pub email: Option<EmailConfig>,
    pub staff_token: Option<String>,
}

#[derive(Clone)]
pub struct StripeConfig {
    pub secret_key: String,
    pub webhook_secret: Option<String>,
    pub api_base: String,
}

impl fmt::Debug for StripeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StripeConfig")
            .field("api_base", &self.api_base)
            .field("webhook_secret", &self.webhook_secret.as_ref().map(|_| "<redacted>"))
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
pub struct SupabaseConfig {
    pub url: String,
    pub service_key: String,
}

impl fmt::Debug for SupabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SupabaseConfig")
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct GeocoderConfig {
    pub base_url: String,
    pub user_agent: String,
}

#[derive(Clone)]
pub struct EmailConfig {
    pub api_key: String,
    pub api_base: String,
    pub from: String,
    pub notify_to: Option<String>,
}

impl fmt::Debug for EmailConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmailConfig")
            .field("from", &self.from)
            .field("notify_to", &self.notify_to)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidTimeout,
    IncompleteSupabase,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidTimeout => {
                write!(f, "COLLABORATOR_TIMEOUT_SECS must be a positive integer")
            }
            ConfigError::IncompleteSupabase => write!(
                f,
                "SUPABASE_URL and SUPABASE_SERVICE_ROLE_KEY must be set together"
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidTimeout
            | ConfigError::IncompleteSupabase => None,
        }
    }
}
