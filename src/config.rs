//! Deployment configuration: environment credentials, optional TOML file, CLI overrides
//!
//! Precedence for every non-secret setting is CLI flag, then config file,
//! then the built-in default. `FTP_PORT` is consulted only when neither the
//! flag nor the file sets a port. Credentials only ever come from the
//! environment.

use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;
use crate::protocol::{timeouts, DEFAULT_MAX_DEPTH, DEFAULT_PORT};
use crate::protocol_core::Charset;

pub const ENV_HOST: &str = "FTP_HOST";
pub const ENV_USERNAME: &str = "FTP_USERNAME";
pub const ENV_PASSWORD: &str = "FTP_PASSWORD";
pub const ENV_PORT: &str = "FTP_PORT";

pub const DEFAULT_SOURCE_DIR: &str = "dist";
pub const DEFAULT_REMOTE_ROOT: &str = "/wwwroot";
pub const DEFAULT_ERROR_PAGE: &str = "404.html";
pub const DEFAULT_ERROR_DIR: &str = "/wwwroot/_HttpErrors";
pub const DEFAULT_ENCODING: &str = "utf-8";

/// Non-secret settings. Used both for the TOML file and for CLI overrides.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub source_dir: Option<PathBuf>,
    pub remote_root: Option<String>,
    pub error_page: Option<String>,
    pub error_dir: Option<String>,
    pub port: Option<u16>,
    pub encoding: Option<String>,
    pub timeout_secs: Option<u64>,
    pub max_depth: Option<usize>,
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&text)?)
    }

    /// Fill every unset field of `self` from `lower`.
    pub fn or(self, lower: Settings) -> Settings {
        Settings {
            source_dir: self.source_dir.or(lower.source_dir),
            remote_root: self.remote_root.or(lower.remote_root),
            error_page: self.error_page.or(lower.error_page),
            error_dir: self.error_dir.or(lower.error_dir),
            port: self.port.or(lower.port),
            encoding: self.encoding.or(lower.encoding),
            timeout_secs: self.timeout_secs.or(lower.timeout_secs),
            max_depth: self.max_depth.or(lower.max_depth),
        }
    }
}

/// Fully resolved settings for one deployment
#[derive(Clone)]
pub struct DeployConfig {
    pub host: String,
    pub username: String,
    pub password: String,
    pub port: u16,
    pub source_dir: PathBuf,
    pub remote_root: String,
    pub error_page: String,
    pub error_dir: String,
    pub charset: Charset,
    pub timeout: Duration,
    pub max_depth: usize,
}

impl fmt::Debug for DeployConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeployConfig")
            .field("host", &self.host)
            .field("username", &self.username)
            .field("password", &"****")
            .field("port", &self.port)
            .field("source_dir", &self.source_dir)
            .field("remote_root", &self.remote_root)
            .field("error_page", &self.error_page)
            .field("error_dir", &self.error_dir)
            .field("charset", &self.charset.name())
            .field("timeout", &self.timeout)
            .field("max_depth", &self.max_depth)
            .finish()
    }
}

fn required(env: &impl Fn(&str) -> Option<String>, name: &'static str) -> Result<String, ConfigError> {
    env(name)
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::Missing(name))
}

fn absolute(key: &'static str, value: String) -> Result<String, ConfigError> {
    if !value.starts_with('/') {
        return Err(ConfigError::InvalidValue { key, value });
    }
    let trimmed = value.trim_end_matches('/');
    Ok(if trimmed.is_empty() { "/".to_string() } else { trimmed.to_string() })
}

impl DeployConfig {
    /// Resolve against an environment lookup such as `std::env::var`.
    /// `settings` should already hold CLI overrides layered over the config file.
    pub fn resolve(env: impl Fn(&str) -> Option<String>, settings: Settings) -> Result<Self, ConfigError> {
        let host = required(&env, ENV_HOST)?;
        let username = required(&env, ENV_USERNAME)?;
        let password = required(&env, ENV_PASSWORD)?;

        let env_port = match env(ENV_PORT).filter(|p| !p.trim().is_empty()) {
            Some(p) => Some(p.trim().parse::<u16>().map_err(|_| ConfigError::InvalidValue {
                key: ENV_PORT,
                value: p,
            })?),
            None => None,
        };
        let port = settings.port.or(env_port).unwrap_or(DEFAULT_PORT);
        if port == 0 {
            return Err(ConfigError::InvalidValue {
                key: "port",
                value: port.to_string(),
            });
        }

        let charset = Charset::for_label(settings.encoding.as_deref().unwrap_or(DEFAULT_ENCODING))?;

        let timeout_secs = settings.timeout_secs.unwrap_or(timeouts::DEFAULT_SECS);
        if timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "timeout_secs",
                value: "0".to_string(),
            });
        }
        let max_depth = settings.max_depth.unwrap_or(DEFAULT_MAX_DEPTH);
        if max_depth == 0 {
            return Err(ConfigError::InvalidValue {
                key: "max_depth",
                value: "0".to_string(),
            });
        }

        let error_page = settings
            .error_page
            .unwrap_or_else(|| DEFAULT_ERROR_PAGE.to_string());
        if error_page.is_empty() || error_page.contains('/') {
            return Err(ConfigError::InvalidValue {
                key: "error_page",
                value: error_page,
            });
        }

        Ok(Self {
            host: host.trim().to_string(),
            username,
            password,
            port,
            source_dir: settings
                .source_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SOURCE_DIR)),
            remote_root: absolute(
                "remote_root",
                settings
                    .remote_root
                    .unwrap_or_else(|| DEFAULT_REMOTE_ROOT.to_string()),
            )?,
            error_page,
            error_dir: absolute(
                "error_dir",
                settings
                    .error_dir
                    .unwrap_or_else(|| DEFAULT_ERROR_DIR.to_string()),
            )?,
            charset,
            timeout: Duration::from_secs(timeout_secs),
            max_depth,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    fn full_env() -> Vec<(&'static str, &'static str)> {
        vec![
            (ENV_HOST, "ftp.example.com"),
            (ENV_USERNAME, "deploy"),
            (ENV_PASSWORD, "hunter2"),
        ]
    }

    #[test]
    fn test_defaults_match_the_site_layout() {
        let cfg = DeployConfig::resolve(env_of(&full_env()), Settings::default()).unwrap();
        assert_eq!(cfg.port, 21);
        assert_eq!(cfg.source_dir, PathBuf::from("dist"));
        assert_eq!(cfg.remote_root, "/wwwroot");
        assert_eq!(cfg.error_page, "404.html");
        assert_eq!(cfg.error_dir, "/wwwroot/_HttpErrors");
        assert_eq!(cfg.charset, Charset::utf8());
        assert_eq!(cfg.max_depth, DEFAULT_MAX_DEPTH);
    }

    #[test]
    fn test_missing_username_is_reported_by_name() {
        let env = env_of(&[(ENV_HOST, "h"), (ENV_PASSWORD, "p")]);
        let err = DeployConfig::resolve(env, Settings::default()).unwrap_err();
        assert!(matches!(err, ConfigError::Missing(ENV_USERNAME)));
    }

    #[test]
    fn test_blank_values_count_as_missing() {
        let env = env_of(&[(ENV_HOST, "  "), (ENV_USERNAME, "u"), (ENV_PASSWORD, "p")]);
        let err = DeployConfig::resolve(env, Settings::default()).unwrap_err();
        assert!(matches!(err, ConfigError::Missing(ENV_HOST)));
    }

    #[test]
    fn test_cli_overrides_file_overrides_defaults() {
        let file: Settings = toml::from_str(
            r#"
            remote_root = "/htdocs/"
            encoding = "gbk"
            port = 2121
            "#,
        )
        .unwrap();
        let cli = Settings {
            port: Some(2200),
            ..Settings::default()
        };
        let cfg = DeployConfig::resolve(env_of(&full_env()), cli.or(file)).unwrap();
        assert_eq!(cfg.port, 2200);
        assert_eq!(cfg.remote_root, "/htdocs");
        assert_eq!(cfg.charset.name(), "GBK");
    }

    #[test]
    fn test_env_port_applies_only_when_unset_elsewhere() {
        let mut env = full_env();
        env.push((ENV_PORT, "2021"));
        let file = Settings {
            port: Some(2121),
            ..Settings::default()
        };
        let cfg = DeployConfig::resolve(env_of(&env), Settings::default().or(file)).unwrap();
        assert_eq!(cfg.port, 2121);

        let cfg = DeployConfig::resolve(env_of(&env), Settings::default()).unwrap();
        assert_eq!(cfg.port, 2021);
    }

    #[test]
    fn test_rejects_bad_values() {
        let bad = [
            Settings {
                remote_root: Some("wwwroot".into()),
                ..Settings::default()
            },
            Settings {
                error_page: Some("errors/404.html".into()),
                ..Settings::default()
            },
            Settings {
                max_depth: Some(0),
                ..Settings::default()
            },
            Settings {
                timeout_secs: Some(0),
                ..Settings::default()
            },
        ];
        for settings in bad {
            assert!(matches!(
                DeployConfig::resolve(env_of(&full_env()), settings),
                Err(ConfigError::InvalidValue { .. })
            ));
        }
        let settings = Settings {
            encoding: Some("not-a-charset".into()),
            ..Settings::default()
        };
        assert!(matches!(
            DeployConfig::resolve(env_of(&full_env()), settings),
            Err(ConfigError::UnknownEncoding(_))
        ));
    }

    #[test]
    fn test_unknown_keys_in_file_are_rejected() {
        assert!(toml::from_str::<Settings>("password = \"x\"").is_err());
    }

    #[test]
    fn test_load_reads_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ftpsync.toml");
        std::fs::write(&path, "source_dir = \"public\"\nmax_depth = 8\n").unwrap();
        let s = Settings::load(&path).unwrap();
        assert_eq!(s.source_dir, Some(PathBuf::from("public")));
        assert_eq!(s.max_depth, Some(8));

        assert!(matches!(
            Settings::load(&dir.path().join("absent.toml")),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn test_debug_output_hides_password() {
        let cfg = DeployConfig::resolve(env_of(&full_env()), Settings::default()).unwrap();
        assert!(!format!("{:?}", cfg).contains("hunter2"));
    }
}
