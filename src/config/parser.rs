//! Stack file loading.
//!
//! This module loads the stack file from YAML, applies `LBSTACK_*`
//! environment overrides and resolves the Data Plane password.

use crate::error::{ConfigError, LbStackError, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::spec::{DataplaneConfig, StackConfig};

/// Overrides `dataplane.url`.
pub const ENV_DATAPLANE_URL: &str = "LBSTACK_DATAPLANE_URL";
/// Overrides `dataplane.username`.
pub const ENV_DATAPLANE_USERNAME: &str = "LBSTACK_DATAPLANE_USERNAME";
/// Overrides `dataplane.password`.
pub const ENV_DATAPLANE_PASSWORD: &str = "LBSTACK_DATAPLANE_PASSWORD";

/// Parser for stack files.
#[derive(Debug, Default)]
pub struct ConfigParser {
    /// Directory searched for `.env`.
    base_path: Option<PathBuf>,
}

impl ConfigParser {
    /// Creates a new parser.
    #[must_use]
    pub const fn new() -> Self {
        Self { base_path: None }
    }

    /// Sets the directory searched for `.env`.
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Loads a stack file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<StackConfig> {
        let path = path.as_ref();
        info!("Loading stack file: {}", path.display());

        if !path.exists() {
            return Err(LbStackError::Config(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            }));
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            LbStackError::Config(ConfigError::ParseError {
                message: format!("Failed to read file: {e}"),
                location: Some(path.display().to_string()),
            })
        })?;

        self.parse_yaml(&content, Some(path))
    }

    /// Parses a stack file from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid or has unknown fields.
    pub fn parse_yaml(&self, content: &str, source: Option<&Path>) -> Result<StackConfig> {
        debug!("Parsing YAML stack file");

        let config: StackConfig = serde_yaml::from_str(content).map_err(|e| {
            let location = e
                .location()
                .map(|l| {
                    let file = source.map_or_else(|| String::from("<input>"), |p| {
                        p.display().to_string()
                    });
                    format!("{file}:{}:{}", l.line(), l.column())
                })
                .or_else(|| source.map(|p| p.display().to_string()));
            LbStackError::Config(ConfigError::ParseError {
                message: format!("YAML parse error: {e}"),
                location,
            })
        })?;

        debug!("Parsed stack '{}'", config.stack.name);
        Ok(config)
    }

    /// Loads a stack file and applies environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_with_env(&self, path: impl AsRef<Path>) -> Result<StackConfig> {
        let mut config = self.load_file(path)?;
        Self::apply_env_overrides(&mut config, |name| std::env::var(name).ok());
        Ok(config)
    }

    /// Applies `LBSTACK_*` overrides read through `lookup`.
    pub fn apply_env_overrides<F>(config: &mut StackConfig, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_DATAPLANE_URL) {
            debug!("Overriding dataplane.url from environment");
            config.dataplane.url = url;
        }

        if let Some(username) = lookup(ENV_DATAPLANE_USERNAME) {
            debug!("Overriding dataplane.username from environment");
            config.dataplane.username = username;
        }

        if let Some(password) = lookup(ENV_DATAPLANE_PASSWORD) {
            debug!("Overriding dataplane.password from environment");
            config.dataplane.password = Some(password);
        }
    }

    /// Loads the .env file if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the .env file exists but cannot be loaded.
    pub fn load_dotenv(&self) -> Result<()> {
        let env_path = self
            .base_path
            .as_ref()
            .map_or_else(|| PathBuf::from(".env"), |p| p.join(".env"));

        if env_path.exists() {
            info!("Loading environment from: {}", env_path.display());
            dotenvy::from_path(&env_path).map_err(|e| {
                LbStackError::Config(ConfigError::ParseError {
                    message: format!("Failed to load .env file: {e}"),
                    location: Some(env_path.display().to_string()),
                })
            })?;
        } else {
            debug!(".env file not found at: {}", env_path.display());
        }

        Ok(())
    }
}

/// Resolves the Data Plane password.
///
/// An inline (or overridden) password wins; otherwise the variable named by
/// `password_env` is read through `lookup`.
///
/// # Errors
///
/// Returns an error if neither source provides a password.
pub fn resolve_password<F>(config: &DataplaneConfig, lookup: F) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(password) = &config.password {
        return Ok(password.clone());
    }

    lookup(&config.password_env).ok_or_else(|| {
        LbStackError::Config(ConfigError::MissingEnvVar {
            name: config.password_env.clone(),
        })
    })
}

/// Default stack file names to search for.
pub const DEFAULT_CONFIG_FILES: &[&str] = &["lbstack.yaml", "lbstack.yml", "stack.yaml", "stack.yml"];

/// Finds the stack file in the given directory or its parents.
///
/// # Errors
///
/// Returns an error if no stack file is found.
pub fn find_config_file(start_dir: impl AsRef<Path>) -> Result<PathBuf> {
    let start = start_dir.as_ref();
    let mut current = start.to_path_buf();

    loop {
        for filename in DEFAULT_CONFIG_FILES {
            let config_path = current.join(filename);
            if config_path.exists() {
                info!("Found stack file: {}", config_path.display());
                return Ok(config_path);
            }
        }

        if !current.pop() {
            break;
        }
    }

    Err(LbStackError::Config(ConfigError::FileNotFound {
        path: start.join(DEFAULT_CONFIG_FILES[0]),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ProxyMode, Toggle};
    use crate::planner::{OrderStrategy, PositionPolicy};

    const MINIMAL: &str = r"
dataplane:
  url: http://127.0.0.1:5555
stack:
  name: web
";

    #[test]
    fn test_parse_minimal_config() {
        let parser = ConfigParser::new();
        let config = parser.parse_yaml(MINIMAL, None).unwrap();

        assert_eq!(config.stack.name, "web");
        assert_eq!(config.dataplane.username, "admin");
        assert_eq!(config.dataplane.password_env, "DATAPLANE_PASSWORD");
        assert_eq!(config.dataplane.timeout_secs, 30);
        assert_eq!(config.reconcile.order_strategy, OrderStrategy::PreferPriorOrder);
        assert_eq!(config.reconcile.position_policy, PositionPolicy::Exchange);
        assert!(config.stack.backend.is_none());
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r"
dataplane:
  url: http://lb.internal:5555
  username: ops
  password_env: LB_PASS
  timeout_secs: 10
state:
  path: /var/lib/lbstack
reconcile:
  order_strategy: observed_order
  position_policy: content_identity
stack:
  name: web
  backend:
    name: web_be
    mode: http
    balance: roundrobin
    forwardfor: true
    acls:
      - name: is_api
        criterion: path_beg
        value: /api
    http_request_rules:
      - type: set-header
        hdr_name: X-Forwarded-Proto
        hdr_format: https
      - type: deny
        deny_status: 403
        cond: if
        cond_test: '!is_api'
        index: 5
    servers:
      - name: app1
        address: 10.0.0.1
        port: 8080
        check: enabled
  frontend:
    name: web_fe
    default_backend: web_be
    binds:
      - name: http
        address: 0.0.0.0
        port: 80
";
        let config = ConfigParser::new().parse_yaml(yaml, None).unwrap();

        assert_eq!(config.reconcile.order_strategy, OrderStrategy::ObservedOrder);
        assert_eq!(config.reconcile.position_policy, PositionPolicy::ContentIdentity);
        let backend = config.stack.backend.unwrap();
        assert_eq!(backend.mode, Some(ProxyMode::Http));
        assert_eq!(backend.forwardfor, Toggle::Enabled);
        assert_eq!(backend.http_request_rules.len(), 2);
        assert_eq!(backend.http_request_rules[1].index, Some(5));
        assert_eq!(backend.servers[0].check, Toggle::Enabled);
        assert_eq!(config.stack.frontend.unwrap().binds[0].port, Some(80));
    }

    #[test]
    fn test_unknown_field_is_parse_error() {
        let yaml = format!("{MINIMAL}  colour: blue\n");
        let err = ConfigParser::new().parse_yaml(&yaml, None).unwrap_err();
        assert!(matches!(
            err,
            LbStackError::Config(ConfigError::ParseError { .. })
        ));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = ConfigParser::new().parse_yaml(MINIMAL, None).unwrap();
        ConfigParser::apply_env_overrides(&mut config, |name| match name {
            ENV_DATAPLANE_URL => Some(String::from("http://10.1.1.1:5555")),
            ENV_DATAPLANE_PASSWORD => Some(String::from("s3cret")),
            _ => None,
        });

        assert_eq!(config.dataplane.url, "http://10.1.1.1:5555");
        assert_eq!(config.dataplane.username, "admin");
        assert_eq!(config.dataplane.password.as_deref(), Some("s3cret"));
    }

    #[test]
    fn test_resolve_password() {
        let mut config = ConfigParser::new().parse_yaml(MINIMAL, None).unwrap();

        let err = resolve_password(&config.dataplane, |_| None).unwrap_err();
        assert!(matches!(
            err,
            LbStackError::Config(ConfigError::MissingEnvVar { ref name }) if name == "DATAPLANE_PASSWORD"
        ));

        let from_env = resolve_password(&config.dataplane, |name| {
            (name == "DATAPLANE_PASSWORD").then(|| String::from("from-env"))
        })
        .unwrap();
        assert_eq!(from_env, "from-env");

        config.dataplane.password = Some(String::from("inline"));
        let inline = resolve_password(&config.dataplane, |_| Some(String::from("from-env")));
        assert_eq!(inline.unwrap(), "inline");
    }

    #[test]
    fn test_find_config_file_walks_up() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(dir.path().join("lbstack.yaml"), MINIMAL).unwrap();

        let found = find_config_file(&nested).unwrap();
        assert_eq!(found, dir.path().join("lbstack.yaml"));
    }

    #[test]
    fn test_load_missing_file() {
        let err = ConfigParser::new()
            .load_file("/nonexistent/lbstack.yaml")
            .unwrap_err();
        assert!(matches!(
            err,
            LbStackError::Config(ConfigError::FileNotFound { .. })
        ));
    }

    #[test]
    fn test_starter_template_is_valid() {
        let config = ConfigParser::new()
            .parse_yaml(include_str!("../../templates/lbstack.yaml"), None)
            .unwrap();
        assert_eq!(config.stack.name, "web");
        assert!(crate::config::ConfigValidator::new().check(&config).is_valid());
    }
}
