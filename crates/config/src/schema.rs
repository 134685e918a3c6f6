use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Public OAuth client id used by the GitHub Copilot editor integrations.
pub const DEFAULT_CLIENT_ID: &str = "Iv1.b507a08c87ecfe98";
/// OAuth scope requested when neither the credential nor the config sets one.
pub const DEFAULT_SCOPE: &str = "read:user workflow repo";
/// GitHub device code request endpoint.
pub const DEFAULT_DEVICE_CODE_URL: &str = "https://github.com/login/device/code";
/// GitHub OAuth token endpoint.
pub const DEFAULT_TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
/// Endpoint exchanging a GitHub token for a short-lived Copilot API token.
pub const DEFAULT_COPILOT_TOKEN_URL: &str = "https://api.github.com/copilot_internal/v2/token";
/// GitHub Copilot API base URL.
pub const DEFAULT_COPILOT_API_BASE_URL: &str = "https://api.githubcopilot.com";

/// Prefix for environment overrides (`GHGATE_GITHUB__CLIENT_ID`, ...).
pub const ENV_PREFIX: &str = "GHGATE_";

fn default_port() -> u16 {
    8018
}
fn default_host() -> String {
    "127.0.0.1".to_string()
}

/// Output format for log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `EnvFilter` directive; `RUST_LOG` takes precedence when set.
    pub level: String,
    pub format: LogFormat,
    /// Optional log file; rotated daily.
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
            file: None,
        }
    }
}

/// Outbound HTTP client settings shared by every upstream call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Whole-request timeout in seconds.
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
    /// Optional outbound proxy (`http://`, `https://` or `socks5://`).
    pub proxy_url: Option<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            connect_timeout_secs: 10,
            proxy_url: None,
        }
    }
}

/// GitHub OAuth device flow settings.
///
/// These are the process-wide defaults; a credential may override each of
/// them (see [`crate::OAuthSettings::resolve`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GithubConfig {
    /// Set to an empty string to require a per-credential client id.
    pub client_id: String,
    pub scope: String,
    pub device_code_url: String,
    pub token_url: String,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            client_id: DEFAULT_CLIENT_ID.to_string(),
            scope: DEFAULT_SCOPE.to_string(),
            device_code_url: DEFAULT_DEVICE_CODE_URL.to_string(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
        }
    }
}

/// Copilot token exchange and API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CopilotConfig {
    pub token_url: String,
    pub api_base_url: String,
    /// Cached tokens are treated as expired this many seconds early.
    pub refresh_buffer_secs: u64,
    /// Credential used by the chat and model routes when a request names none.
    pub default_credential: Option<String>,
}

impl Default for CopilotConfig {
    fn default() -> Self {
        Self {
            token_url: DEFAULT_COPILOT_TOKEN_URL.to_string(),
            api_base_url: DEFAULT_COPILOT_API_BASE_URL.to_string(),
            refresh_buffer_secs: 300,
            default_credential: None,
        }
    }
}

/// Model listing behaviour.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    /// Serve `fallback` instead of an error when the upstream listing fails.
    pub fallback_on_error: bool,
    pub fallback: Vec<String>,
}

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Listen port (defaults to 8018).
    #[serde(default = "default_port")]
    pub port: u16,
    /// Listen address (defaults to `127.0.0.1`).
    #[serde(default = "default_host")]
    pub host: String,
    /// `SQLite` database path (defaults to `~/.ghgate/credentials.db`).
    #[serde(default)]
    pub db: Option<PathBuf>,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub github: GithubConfig,
    #[serde(default)]
    pub copilot: CopilotConfig,
    #[serde(default)]
    pub models: ModelsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            db: None,
            log: LogConfig::default(),
            http: HttpConfig::default(),
            github: GithubConfig::default(),
            copilot: CopilotConfig::default(),
            models: ModelsConfig::default(),
        }
    }
}

impl Config {
    /// Parses configuration from a YAML string, merged with defaults.
    ///
    /// Environment variables are not consulted.
    ///
    /// # Errors
    ///
    /// Returns a [`figment::Error`] if the YAML is invalid or extraction fails.
    #[allow(clippy::result_large_err)]
    pub fn from_yaml(yaml: &str) -> Result<Self, figment::Error> {
        use figment::{
            Figment,
            providers::{Format as _, Serialized, Yaml},
        };
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Yaml::string(yaml))
            .extract()
    }

    /// Loads configuration from a file path, merged with defaults and
    /// `GHGATE_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns a [`figment::Error`] if the file cannot be read or parsed.
    #[allow(clippy::result_large_err)]
    pub fn from_file(path: &Path) -> Result<Self, figment::Error> {
        Self::load(Some(path))
    }

    /// Loads configuration with precedence: environment > file > defaults.
    ///
    /// A missing file is an error only when `path` is given.
    ///
    /// # Errors
    ///
    /// Returns a [`figment::Error`] if a source cannot be parsed.
    #[allow(clippy::result_large_err)]
    pub fn load(path: Option<&Path>) -> Result<Self, figment::Error> {
        use figment::{
            Figment,
            providers::{Env, Format as _, Serialized, Yaml},
        };
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file_exact(path));
        }
        figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
    }

    /// The listen address as `host:port`.
    #[must_use]
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_YAML: &str = r#"
port: 9000
host: "0.0.0.0"
github:
  client_id: "Iv1.yaml"
copilot:
  refresh_buffer_secs: 120
  default_credential: "cred-main"
models:
  fallback_on_error: true
  fallback: ["gpt-4o", "claude-sonnet-4"]
log:
  format: json
"#;

    #[test]
    fn test_default_config() {
        let c = Config::default();
        assert_eq!(c.port, 8018);
        assert_eq!(c.host, "127.0.0.1");
        assert_eq!(c.github.client_id, DEFAULT_CLIENT_ID);
        assert_eq!(c.github.scope, "read:user workflow repo");
        assert_eq!(c.copilot.refresh_buffer_secs, 300);
        assert!(!c.models.fallback_on_error);
        assert_eq!(c.http.timeout_secs, 30);
    }

    #[test]
    fn test_from_yaml_port_and_host() {
        let c = Config::from_yaml(SAMPLE_YAML).unwrap();
        assert_eq!(c.port, 9000);
        assert_eq!(c.host, "0.0.0.0");
        assert_eq!(c.listen_addr(), "0.0.0.0:9000");
    }

    #[test]
    fn test_from_yaml_nested_partial() {
        let c = Config::from_yaml(SAMPLE_YAML).unwrap();
        assert_eq!(c.github.client_id, "Iv1.yaml");
        // Unset siblings keep their defaults.
        assert_eq!(c.github.scope, DEFAULT_SCOPE);
        assert_eq!(c.github.token_url, DEFAULT_TOKEN_URL);
        assert_eq!(c.copilot.refresh_buffer_secs, 120);
        assert_eq!(c.copilot.token_url, DEFAULT_COPILOT_TOKEN_URL);
        assert_eq!(c.copilot.default_credential.as_deref(), Some("cred-main"));
        assert_eq!(c.models.fallback, vec!["gpt-4o", "claude-sonnet-4"]);
        assert_eq!(c.log.format, LogFormat::Json);
        assert_eq!(c.log.level, "info");
    }

    #[test]
    fn test_from_yaml_defaults_applied() {
        let c = Config::from_yaml("port: 1234").unwrap();
        assert_eq!(c.port, 1234);
        assert_eq!(c.host, "127.0.0.1"); // default preserved
    }

    #[test]
    fn test_from_yaml_rejects_bad_type() {
        assert!(Config::from_yaml("copilot:\n  refresh_buffer_secs: soon\n").is_err());
    }

    #[test]
    fn test_env_overrides_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("ghgate.yaml", "github:\n  client_id: Iv1.file\n  scope: repo\n")?;
            jail.set_env("GHGATE_GITHUB__CLIENT_ID", "Iv1.env");
            jail.set_env("GHGATE_PORT", "9100");

            let c = Config::load(Some(Path::new("ghgate.yaml")))?;
            assert_eq!(c.github.client_id, "Iv1.env");
            assert_eq!(c.github.scope, "repo");
            assert_eq!(c.port, 9100);
            Ok(())
        });
    }

    #[test]
    fn test_load_without_file_uses_env() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("GHGATE_COPILOT__API_BASE_URL", "http://localhost:9");
            let c = Config::load(None)?;
            assert_eq!(c.copilot.api_base_url, "http://localhost:9");
            assert_eq!(c.github.client_id, DEFAULT_CLIENT_ID);
            Ok(())
        });
    }

    #[test]
    fn test_load_missing_file_is_error() {
        figment::Jail::expect_with(|_jail| {
            assert!(Config::load(Some(Path::new("absent.yaml"))).is_err());
            Ok(())
        });
    }
}
