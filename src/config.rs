use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const ENV_ENDPOINT: &str = "VYOS_API_ENDPOINT";
pub const ENV_API_KEY: &str = "VYOS_API_KEY";
pub const ENV_USE_REAL_API: &str = "USE_REAL_API";
pub const ENV_INSECURE: &str = "VYOS_API_INSECURE";

const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default = "default_listen")]
    pub listen: String,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default)]
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_api_key")]
    pub api_key: String,
    #[serde(default)]
    pub use_real_api: bool,
    /// Skip TLS certificate validation for self-signed router certificates.
    #[serde(default)]
    pub insecure: bool,
    /// Unset means 30 s, capped by `poll_interval_ms`.
    #[serde(default)]
    pub request_timeout_ms: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            poll_interval_ms: default_poll_interval_ms(),
            api: ApiConfig::default(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            api_key: default_api_key(),
            use_real_api: false,
            insecure: false,
            request_timeout_ms: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("не удалось прочитать файл конфигурации {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("не удалось разобрать YAML в {path}: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },
    #[error("ошибка валидации конфигурации: {0}")]
    Validation(String),
}

impl Config {
    /// Loads the file (or defaults when no path is given), applies environment
    /// overrides and validates the result.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut cfg = match path {
            Some(path) => Self::read_file(path)?,
            None => Self::default(),
        };
        cfg.apply_env_with(|name| std::env::var(name).ok());
        cfg.validate()?;
        cfg.api.request_timeout_ms = Some(cfg.request_timeout_ms());
        Ok(cfg)
    }

    fn read_file(path: &Path) -> Result<Self, ConfigError> {
        let path_display = path.display().to_string();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path_display.clone(),
            source,
        })?;

        serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path_display,
            source,
        })
    }

    /// Environment wins over the file. Booleans are enabled only by `"true"`.
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(endpoint) = non_empty(ENV_ENDPOINT) {
            self.api.endpoint = endpoint.trim().to_string();
        }
        if let Some(key) = non_empty(ENV_API_KEY) {
            self.api.api_key = key;
        }
        if let Some(flag) = non_empty(ENV_USE_REAL_API) {
            self.api.use_real_api = parse_flag(&flag);
        }
        if let Some(flag) = non_empty(ENV_INSECURE) {
            self.api.insecure = parse_flag(&flag);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.listen.trim().is_empty() {
            return Err(ConfigError::Validation(
                "поле listen обязательно".to_string(),
            ));
        }
        if SocketAddr::from_str(&self.listen).is_err() {
            return Err(ConfigError::Validation(
                "поле listen должно быть корректным адресом host:port".to_string(),
            ));
        }
        if self.poll_interval_ms < 1 {
            return Err(ConfigError::Validation(
                "poll_interval_ms должно быть >= 1".to_string(),
            ));
        }

        validate_api(&self.api, self.poll_interval_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Explicit `api.request_timeout_ms`, or the default capped by the interval.
    pub fn request_timeout_ms(&self) -> u64 {
        self.api
            .request_timeout_ms
            .unwrap_or_else(|| DEFAULT_REQUEST_TIMEOUT_MS.min(self.poll_interval_ms))
    }

    pub fn example_yaml() -> &'static str {
        include_str!("../config.yaml.example")
    }
}

impl ApiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms.unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS))
    }

    pub fn is_https(&self) -> bool {
        self.endpoint.trim_start().starts_with("https:")
    }
}

fn validate_api(api: &ApiConfig, poll_interval_ms: u64) -> Result<(), ConfigError> {
    let url = Url::parse(api.endpoint.trim()).map_err(|err| {
        ConfigError::Validation(format!(
            "api.endpoint '{}' не является корректным URL: {err}",
            api.endpoint
        ))
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::Validation(format!(
            "api.endpoint должен использовать схему http или https, получено '{}'",
            url.scheme()
        )));
    }
    if api.use_real_api && api.api_key.trim().is_empty() {
        return Err(ConfigError::Validation(
            "api.api_key не должен быть пустым при use_real_api: true".to_string(),
        ));
    }
    match api.request_timeout_ms {
        Some(0) => Err(ConfigError::Validation(
            "api.request_timeout_ms должен быть > 0".to_string(),
        )),
        Some(timeout) if timeout > poll_interval_ms => Err(ConfigError::Validation(format!(
            "api.request_timeout_ms ({timeout}) не должен превышать poll_interval_ms ({poll_interval_ms})"
        ))),
        _ => Ok(()),
    }
}

fn parse_flag(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("true")
}

fn default_listen() -> String {
    "127.0.0.1:9110".to_string()
}

const fn default_poll_interval_ms() -> u64 {
    30_000
}

fn default_endpoint() -> String {
    "https://10.0.101.245/graphql".to_string()
}

fn default_api_key() -> String {
    "test123".to_string()
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_are_valid() {
        let cfg = Config::default();
        cfg.validate().expect("конфигурация по умолчанию должна быть валидной");
        assert_eq!(cfg.poll_interval_ms, 30_000);
        assert_eq!(cfg.api.endpoint, "https://10.0.101.245/graphql");
        assert_eq!(cfg.api.api_key, "test123");
        assert!(!cfg.api.use_real_api);
        assert!(!cfg.api.insecure);
    }

    #[test]
    fn example_yaml_parses_and_validates() {
        let cfg: Config = serde_yaml::from_str(Config::example_yaml()).unwrap();
        cfg.validate().unwrap();
    }

    #[test]
    fn partial_yaml_fills_defaults() {
        let cfg: Config = serde_yaml::from_str("api:\n  use_real_api: true\n").unwrap();
        assert!(cfg.api.use_real_api);
        assert_eq!(cfg.api.api_key, "test123");
        assert_eq!(cfg.listen, "127.0.0.1:9110");
        assert_eq!(cfg.api.request_timeout_ms, None);
        assert_eq!(cfg.request_timeout_ms(), 30_000);
    }

    #[test]
    fn env_overrides_file_values() {
        let mut cfg = Config::default();
        cfg.api.insecure = true;
        cfg.apply_env_with(env(&[
            (ENV_ENDPOINT, "http://192.0.2.1/graphql"),
            (ENV_API_KEY, "secret"),
            (ENV_USE_REAL_API, "TRUE"),
            (ENV_INSECURE, "false"),
        ]));
        assert_eq!(cfg.api.endpoint, "http://192.0.2.1/graphql");
        assert_eq!(cfg.api.api_key, "secret");
        assert!(cfg.api.use_real_api);
        assert!(!cfg.api.insecure);
    }

    #[test]
    fn only_literal_true_enables_flags() {
        let mut cfg = Config::default();
        cfg.apply_env_with(env(&[(ENV_USE_REAL_API, "1"), (ENV_INSECURE, "yes")]));
        assert!(!cfg.api.use_real_api);
        assert!(!cfg.api.insecure);
    }

    #[test]
    fn empty_env_values_are_ignored() {
        let mut cfg = Config::default();
        cfg.apply_env_with(env(&[(ENV_ENDPOINT, "  "), (ENV_API_KEY, "")]));
        assert_eq!(cfg.api.endpoint, "https://10.0.101.245/graphql");
        assert_eq!(cfg.api.api_key, "test123");
    }

    #[test]
    fn rejects_bad_listen() {
        let mut cfg = Config::default();
        cfg.listen = "localhost".to_string();
        assert!(matches!(cfg.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn rejects_zero_interval() {
        let mut cfg = Config::default();
        cfg.poll_interval_ms = 0;
        assert!(matches!(cfg.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn rejects_timeout_longer_than_interval() {
        let mut cfg = Config::default();
        cfg.poll_interval_ms = 1_000;
        cfg.api.request_timeout_ms = Some(5_000);
        assert!(matches!(cfg.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn lowering_only_the_interval_caps_the_default_timeout() {
        let cfg: Config = serde_yaml::from_str("poll_interval_ms: 10000\n").unwrap();
        cfg.validate().expect("интервал без таймаута должен проходить валидацию");
        assert_eq!(cfg.request_timeout_ms(), 10_000);
    }

    #[test]
    fn explicit_timeout_is_kept() {
        let cfg: Config = serde_yaml::from_str(
            "poll_interval_ms: 10000\napi:\n  request_timeout_ms: 2500\n",
        )
        .unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.request_timeout_ms(), 2_500);
    }

    #[test]
    fn rejects_zero_timeout() {
        let mut cfg = Config::default();
        cfg.api.request_timeout_ms = Some(0);
        assert!(matches!(cfg.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn load_resolves_timeout_from_interval() {
        let path = std::env::temp_dir().join(format!("routerwatch-{}.yaml", std::process::id()));
        fs::write(&path, "poll_interval_ms: 5000\n").unwrap();
        let cfg = Config::load(Some(&path));
        let _ = fs::remove_file(&path);

        let cfg = cfg.unwrap();
        assert_eq!(cfg.api.request_timeout_ms, Some(5_000));
        assert_eq!(cfg.api.request_timeout(), Duration::from_millis(5_000));
    }

    #[test]
    fn rejects_non_http_endpoint() {
        let mut cfg = Config::default();
        cfg.api.endpoint = "ftp://10.0.101.245/graphql".to_string();
        assert!(matches!(cfg.validate(), Err(ConfigError::Validation(_))));
        cfg.api.endpoint = "not a url".to_string();
        assert!(matches!(cfg.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn empty_key_only_matters_in_real_mode() {
        let mut cfg = Config::default();
        cfg.api.api_key = String::new();
        cfg.validate().expect("ключ не нужен без реального API");
        cfg.api.use_real_api = true;
        assert!(matches!(cfg.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = Config::load(Some(Path::new("/nonexistent/routerwatch.yaml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
