use crate::error::GateError;
use clap::Parser;
use serde::Deserialize;
use std::env;
use std::path::PathBuf;

/// Configuration loaded from CLI args, environment variables, and/or config files
///
/// The gateway MUST crash at startup if the token secret or the admin
/// credentials are not set — running open is never acceptable.
///
/// Config precedence: CLI args > env vars > config file > defaults
#[derive(Debug)]
pub struct Config {
    pub bind_addr: String,
    pub upstream_url: String,
    pub token_secret: String,
    pub admin_username: String,
    /// Hex-encoded SHA-256 of the admin password.
    pub admin_password_hash: String,
    pub denied_cidrs: Vec<String>,
    pub denied_countries: Vec<String>,
    pub geo_lookup_url: Option<String>,
    pub cache_ttl_secs: u64,
    pub secure_cookies: bool,
    pub log_level: String,
}

/// CLI arguments structure for clap
#[derive(Debug, Parser, Default)]
#[command(name = "aidgate")]
#[command(about = "aidgate - security and caching gateway for a community-aid listings API")]
pub struct CliArgs {
    /// Path to configuration file (TOML or YAML)
    #[arg(long)]
    pub config_file: Option<PathBuf>,

    /// Address to bind the gateway to (overrides env/config)
    #[arg(long)]
    pub bind_addr: Option<String>,

    /// Upstream data store base URL (overrides env/config)
    #[arg(long)]
    pub upstream_url: Option<String>,

    /// Process-wide token secret (overrides env/config)
    #[arg(long)]
    pub token_secret: Option<String>,

    /// Admin username (overrides env/config)
    #[arg(long)]
    pub admin_username: Option<String>,

    /// Hex-encoded SHA-256 of the admin password (overrides env/config)
    #[arg(long)]
    pub admin_password_hash: Option<String>,

    /// Comma-separated CIDR deny-list for the admin surface (overrides env/config)
    #[arg(long)]
    pub denied_cidrs: Option<String>,

    /// Comma-separated ISO country codes to deny (overrides env/config)
    #[arg(long)]
    pub denied_countries: Option<String>,

    /// Base URL of the IP geolocation service (overrides env/config)
    #[arg(long)]
    pub geo_lookup_url: Option<String>,

    /// Response cache TTL in seconds (overrides env/config)
    #[arg(long)]
    pub cache_ttl_secs: Option<u64>,

    /// Mark session cookies Secure (set when serving behind TLS)
    #[arg(long)]
    pub secure_cookies: Option<bool>,

    /// Logging level: trace, debug, info, warn, error (overrides env/config)
    #[arg(long)]
    pub log_level: Option<String>,
}

/// Config file structure (deserialized from TOML/YAML)
#[derive(Debug, Deserialize, Clone)]
struct ConfigFile {
    gateway: Option<GatewayConfig>,
    logging: Option<LoggingConfig>,
}

#[derive(Debug, Deserialize, Clone)]
struct GatewayConfig {
    bind_addr: Option<String>,
    upstream_url: Option<String>,
    token_secret: Option<String>,
    admin_username: Option<String>,
    admin_password_hash: Option<String>,
    denied_cidrs: Option<Vec<String>>,
    denied_countries: Option<Vec<String>>,
    geo_lookup_url: Option<String>,
    cache_ttl_secs: Option<u64>,
    secure_cookies: Option<bool>,
}

#[derive(Debug, Deserialize, Clone)]
struct LoggingConfig {
    level: Option<String>,
}

/// Default response cache TTL: 10 seconds.
pub const DEFAULT_CACHE_TTL_SECS: u64 = 10;

impl Config {
    /// Load configuration with precedence: CLI args > env vars > config file > defaults
    ///
    /// # Required Fields
    /// - `token_secret`: process-wide secret keying the token codec
    /// - `admin_username` / `admin_password_hash`: the single admin identity
    pub fn load(cli_args: &CliArgs) -> Result<Config, GateError> {
        // .env values never override explicitly set env vars.
        dotenv::dotenv().ok();

        let file_config = if let Some(config_path) = &cli_args.config_file {
            Self::load_from_file(config_path)?
        } else {
            None
        };

        let env_config = Self::load_from_env();

        let gateway = file_config.as_ref().and_then(|f| f.gateway.as_ref());

        let token_secret = cli_args
            .token_secret
            .as_ref()
            .or(env_config.token_secret.as_ref())
            .or_else(|| gateway.and_then(|g| g.token_secret.as_ref()))
            .ok_or_else(|| {
                GateError::ConfigError(
                    "token_secret must be set via --token-secret, AIDGATE_TOKEN_SECRET env var, or config file"
                        .to_string(),
                )
            })?
            .clone();

        let admin_username = cli_args
            .admin_username
            .as_ref()
            .or(env_config.admin_username.as_ref())
            .or_else(|| gateway.and_then(|g| g.admin_username.as_ref()))
            .ok_or_else(|| {
                GateError::ConfigError(
                    "admin_username must be set via --admin-username, AIDGATE_ADMIN_USERNAME env var, or config file"
                        .to_string(),
                )
            })?
            .clone();

        let admin_password_hash = cli_args
            .admin_password_hash
            .as_ref()
            .or(env_config.admin_password_hash.as_ref())
            .or_else(|| gateway.and_then(|g| g.admin_password_hash.as_ref()))
            .ok_or_else(|| {
                GateError::ConfigError(
                    "admin_password_hash must be set via --admin-password-hash, AIDGATE_ADMIN_PASSWORD_HASH env var, or config file"
                        .to_string(),
                )
            })?
            .to_lowercase();

        // SHA-256 digests are 32 bytes = 64 hex characters.
        if admin_password_hash.len() != 64 || hex::decode(&admin_password_hash).is_err() {
            return Err(GateError::ConfigError(
                "admin_password_hash must be a hex-encoded SHA-256 digest (64 hex characters)"
                    .to_string(),
            ));
        }

        let bind_addr = cli_args
            .bind_addr
            .as_ref()
            .or(env_config.bind_addr.as_ref())
            .or_else(|| gateway.and_then(|g| g.bind_addr.as_ref()))
            .unwrap_or(&"0.0.0.0:3000".to_string())
            .clone();

        let upstream_url = cli_args
            .upstream_url
            .as_ref()
            .or(env_config.upstream_url.as_ref())
            .or_else(|| gateway.and_then(|g| g.upstream_url.as_ref()))
            .unwrap_or(&"http://localhost:8080".to_string())
            .clone();

        let denied_cidrs = cli_args
            .denied_cidrs
            .as_ref()
            .or(env_config.denied_cidrs.as_ref())
            .map(|s| split_list(s))
            .or_else(|| gateway.and_then(|g| g.denied_cidrs.clone()))
            .unwrap_or_default();

        let denied_countries = cli_args
            .denied_countries
            .as_ref()
            .or(env_config.denied_countries.as_ref())
            .map(|s| split_list(s))
            .or_else(|| gateway.and_then(|g| g.denied_countries.clone()))
            .unwrap_or_default();

        let geo_lookup_url = cli_args
            .geo_lookup_url
            .as_ref()
            .or(env_config.geo_lookup_url.as_ref())
            .or_else(|| gateway.and_then(|g| g.geo_lookup_url.as_ref()))
            .cloned();

        let cache_ttl_secs = cli_args
            .cache_ttl_secs
            .or(env_config.cache_ttl_secs)
            .or_else(|| gateway.and_then(|g| g.cache_ttl_secs))
            .unwrap_or(DEFAULT_CACHE_TTL_SECS);

        let secure_cookies = cli_args
            .secure_cookies
            .or(env_config.secure_cookies)
            .or_else(|| gateway.and_then(|g| g.secure_cookies))
            .unwrap_or(false);

        let log_level = cli_args
            .log_level
            .as_ref()
            .or(env_config.log_level.as_ref())
            .or_else(|| {
                file_config
                    .as_ref()
                    .and_then(|f| f.logging.as_ref()?.level.as_ref())
            })
            .unwrap_or(&"info".to_string())
            .clone();

        Ok(Config {
            bind_addr,
            upstream_url,
            token_secret,
            admin_username,
            admin_password_hash,
            denied_cidrs,
            denied_countries,
            geo_lookup_url,
            cache_ttl_secs,
            secure_cookies,
            log_level,
        })
    }

    /// Load configuration from file (TOML or YAML)
    fn load_from_file(path: &PathBuf) -> Result<Option<ConfigFile>, GateError> {
        use config::Config as ConfigBuilder;

        if !path.exists() {
            return Err(GateError::ConfigError(format!(
                "Config file not found: {}",
                path.display()
            )));
        }

        let file_source = match path.extension().and_then(|s| s.to_str()) {
            Some("yaml") | Some("yml") => {
                config::File::from(path.as_path()).format(config::FileFormat::Yaml)
            }
            // Default to TOML for .toml and unknown extensions.
            _ => config::File::from(path.as_path()).format(config::FileFormat::Toml),
        };

        let builder = ConfigBuilder::builder()
            .add_source(file_source)
            .build()
            .map_err(|e| GateError::ConfigError(format!("Failed to load config file: {}", e)))?;

        let config_file: ConfigFile = builder
            .try_deserialize()
            .map_err(|e| GateError::ConfigError(format!("Failed to parse config file: {}", e)))?;

        Ok(Some(config_file))
    }

    /// Load configuration from environment variables only (for fallback/defaults)
    fn load_from_env() -> EnvConfig {
        EnvConfig {
            bind_addr: env::var("AIDGATE_BIND_ADDR").ok(),
            upstream_url: env::var("AIDGATE_UPSTREAM_URL").ok(),
            token_secret: env::var("AIDGATE_TOKEN_SECRET").ok(),
            admin_username: env::var("AIDGATE_ADMIN_USERNAME").ok(),
            admin_password_hash: env::var("AIDGATE_ADMIN_PASSWORD_HASH").ok(),
            denied_cidrs: env::var("AIDGATE_DENIED_CIDRS").ok(),
            denied_countries: env::var("AIDGATE_DENIED_COUNTRIES").ok(),
            geo_lookup_url: env::var("AIDGATE_GEO_LOOKUP_URL").ok(),
            cache_ttl_secs: env::var("AIDGATE_CACHE_TTL_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok()),
            secure_cookies: env::var("AIDGATE_SECURE_COOKIES")
                .ok()
                .and_then(|v| v.parse::<bool>().ok()),
            log_level: env::var("AIDGATE_LOG_LEVEL").ok(),
        }
    }
}

/// Intermediate structure for env var config (all optional for precedence)
struct EnvConfig {
    bind_addr: Option<String>,
    upstream_url: Option<String>,
    token_secret: Option<String>,
    admin_username: Option<String>,
    admin_password_hash: Option<String>,
    denied_cidrs: Option<String>,
    denied_countries: Option<String>,
    geo_lookup_url: Option<String>,
    cache_ttl_secs: Option<u64>,
    secure_cookies: Option<bool>,
    log_level: Option<String>,
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    const TEST_HASH: &str = "1b58e5a6dbce9c4f0d0b9ee4a9f4cecdaf59e03ac4171b6b0e9e2e4b87d74fbb";

    // Process env is shared across test threads; serialize anything touching it.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn env_guard() -> std::sync::MutexGuard<'static, ()> {
        ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn clear_env() {
        for var in [
            "AIDGATE_TOKEN_SECRET",
            "AIDGATE_ADMIN_USERNAME",
            "AIDGATE_ADMIN_PASSWORD_HASH",
            "AIDGATE_UPSTREAM_URL",
            "AIDGATE_DENIED_CIDRS",
        ] {
            std::env::remove_var(var);
        }
    }

    #[test]
    fn test_config_precedence_cli_overrides_env() {
        let _guard = env_guard();
        clear_env();
        std::env::set_var("AIDGATE_TOKEN_SECRET", "env-secret");
        std::env::set_var("AIDGATE_ADMIN_USERNAME", "env-admin");
        std::env::set_var("AIDGATE_ADMIN_PASSWORD_HASH", TEST_HASH);

        let cli_args = CliArgs {
            token_secret: Some("cli-secret".to_string()),
            ..CliArgs::default()
        };

        let config = Config::load(&cli_args).unwrap();
        assert_eq!(config.token_secret, "cli-secret");
        assert_eq!(config.admin_username, "env-admin");

        clear_env();
    }

    #[test]
    fn test_config_load_from_file() {
        let _guard = env_guard();
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = format!(
            r#"
[gateway]
token_secret = "file-secret"
admin_username = "file-admin"
admin_password_hash = "{TEST_HASH}"
upstream_url = "http://file-upstream:8080"
denied_cidrs = ["10.0.0.0/8", "192.168.0.0/16"]
cache_ttl_secs = 30

[logging]
level = "warn"
"#
        );
        fs::write(&config_path, toml_content).unwrap();

        let cli_args = CliArgs {
            config_file: Some(config_path),
            ..CliArgs::default()
        };

        let config = Config::load(&cli_args).unwrap();
        assert_eq!(config.token_secret, "file-secret");
        assert_eq!(config.upstream_url, "http://file-upstream:8080");
        assert_eq!(config.denied_cidrs, vec!["10.0.0.0/8", "192.168.0.0/16"]);
        assert_eq!(config.cache_ttl_secs, 30);
        assert_eq!(config.log_level, "warn");
    }

    #[test]
    fn test_config_defaults() {
        let _guard = env_guard();
        clear_env();
        let cli_args = CliArgs {
            token_secret: Some("s".to_string()),
            admin_username: Some("admin".to_string()),
            admin_password_hash: Some(TEST_HASH.to_string()),
            ..CliArgs::default()
        };

        let config = Config::load(&cli_args).unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:3000");
        assert_eq!(config.upstream_url, "http://localhost:8080");
        assert_eq!(config.cache_ttl_secs, DEFAULT_CACHE_TTL_SECS);
        assert!(!config.secure_cookies);
        assert_eq!(config.log_level, "info");
        assert!(config.denied_cidrs.is_empty());
    }

    #[test]
    fn test_missing_secret_is_fatal() {
        let _guard = env_guard();
        clear_env();
        let err = Config::load(&CliArgs::default()).unwrap_err();
        assert!(matches!(err, GateError::ConfigError(_)));
    }

    #[test]
    fn test_bad_password_hash_is_fatal() {
        let _guard = env_guard();
        clear_env();
        let cli_args = CliArgs {
            token_secret: Some("s".to_string()),
            admin_username: Some("admin".to_string()),
            admin_password_hash: Some("not-hex".to_string()),
            ..CliArgs::default()
        };
        assert!(matches!(Config::load(&cli_args), Err(GateError::ConfigError(_))));
    }

    #[test]
    fn test_cidr_list_splitting() {
        let _guard = env_guard();
        clear_env();
        let cli_args = CliArgs {
            token_secret: Some("s".to_string()),
            admin_username: Some("admin".to_string()),
            admin_password_hash: Some(TEST_HASH.to_string()),
            denied_cidrs: Some("10.0.0.0/8, 1.2.3.0/24 ,".to_string()),
            ..CliArgs::default()
        };
        let config = Config::load(&cli_args).unwrap();
        assert_eq!(config.denied_cidrs, vec!["10.0.0.0/8", "1.2.3.0/24"]);
    }
}
