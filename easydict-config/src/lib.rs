use std::{collections::HashMap, io::Write};

use anyhow::{Result, anyhow};
use dotenv::*;

/// Scheme name recognized by the URL scheme parser.
pub const SCHEME: &str = "SCHEME";
/// Location of the JSON file backing the preference store.
pub const PREFERENCES_PATH: &str = "PREFERENCES_PATH";
/// Target directory for preference exports.
pub const DOWNLOADS_DIR: &str = "DOWNLOADS_DIR";
/// Comma separated list of preference keys the scheme parser may touch.
pub const ALLOWED_KEYS: &str = "ALLOWED_KEYS";
pub const RUST_LOG: &str = "RUST_LOG";

pub trait Config: Send + Sync{
    fn get(&self, key: &str) -> Result<String>;
    fn clone_box_dyn(&self) -> Box<dyn Config>;

    fn get_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|_| default.to_string())
    }
}

impl Clone for Box<dyn Config> {
    fn clone(&self) -> Self {
        self.clone_box_dyn()
    }
}

impl Config for Box<dyn Config> {
    fn get(&self, key: &str) -> Result<String> {
        self.as_ref().get(key)
    }

    fn clone_box_dyn(&self) -> Box<dyn Config> {
        self.as_ref().clone_box_dyn()
    }
}

#[derive(Clone)]
pub struct CompositeConfig {
    main: Box<dyn Config>,
    fallback: Box<dyn Config>,
}

impl CompositeConfig {
    pub fn from_configs(main: Box<dyn Config>, fallback: Box<dyn Config>) -> CompositeConfig {
        CompositeConfig{ main, fallback }
    }
}

impl Config for CompositeConfig {
    fn get(&self, key: &str) -> Result<String> {
        self.main
        .get(key)
        .or_else(|_e| self.fallback.get(key))
    }

    fn clone_box_dyn(&self) -> Box<dyn Config> {
        Box::new(CompositeConfig {
            main: self.main.clone_box_dyn(),
            fallback: self.fallback.clone_box_dyn()
        })
    }
}

/// Reads configuration from the process environment, after loading an
/// optional `.env` file. Keys are looked up with an `EASYDICT_` prefix first.
#[derive(Clone)]
pub struct EnvConfig;

impl EnvConfig {
    /// Loads `.env`, reporting on stderr so stdout stays free for command output.
    pub fn from_env() -> EnvConfig {
        Self::from_env_reporting_to(&mut std::io::stderr())
    }

    pub fn from_env_reporting_to(report: &mut dyn Write) -> EnvConfig {
        // a failed status line is not worth failing configuration for
        let _ = match dotenv() {
            Ok(path) => {
                let path = path.to_string_lossy();
                writeln!(report, "additional environment variables loaded from {path}")
            }
            Err(e) => {
                writeln!(report, "no .env file loaded: {e}")
            }
        };

        EnvConfig
    }
}

impl Config for EnvConfig{
    fn get(&self, key: &str) -> Result<String> {
        std::env::var(format!("EASYDICT_{key}"))
        .or_else(|_| std::env::var(key))
        .map_err(|_| anyhow!("no such environment variable {key}"))
    }
    fn clone_box_dyn(&self) -> Box<dyn Config> {
        Box::new(self.clone())
    }
}

pub fn default_config() -> impl Config {
    let mut default_values = vec![
        (SCHEME.to_string(), "easydict".to_string()),
    ];
    if let Some(home) = std::env::var_os("HOME") {
        let home = std::path::PathBuf::from(home);
        default_values.push((
            PREFERENCES_PATH.to_string(),
            home.join(".easydict").join("preferences.json").to_string_lossy().into_owned(),
        ));
        default_values.push((
            DOWNLOADS_DIR.to_string(),
            home.join("Downloads").to_string_lossy().into_owned(),
        ));
    }
    HashMapConfig::new(default_values.into_iter().collect())
}

/// Environment on top of the built-in defaults.
pub fn load_config() -> CompositeConfig {
    CompositeConfig::from_configs(Box::new(EnvConfig::from_env()), Box::new(default_config()))
}

#[derive(Clone, Default)]
pub struct HashMapConfig {
    map: HashMap<String,String>
}

impl HashMapConfig {
    pub fn new(map: HashMap<String,String>) -> HashMapConfig {
        Self {map}
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for HashMapConfig {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self::new(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl Config for HashMapConfig {
    fn get(&self, key: &str) -> Result<String> {
        self.map
        .get(key)
        .map(String::clone)
        .ok_or_else(||anyhow!("key '{key}' not found"))
    }

    fn clone_box_dyn(&self) -> Box<dyn Config> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composite_prefers_main_and_falls_back() {
        let main: HashMapConfig = [(SCHEME, "custom")].into_iter().collect();
        let fallback: HashMapConfig = [(SCHEME, "easydict"), (DOWNLOADS_DIR, "/tmp/dl")].into_iter().collect();
        let config = CompositeConfig::from_configs(Box::new(main), Box::new(fallback));

        assert_eq!(config.get(SCHEME).unwrap(), "custom");
        assert_eq!(config.get(DOWNLOADS_DIR).unwrap(), "/tmp/dl");
        assert!(config.get(ALLOWED_KEYS).is_err());
        assert_eq!(config.get_or(ALLOWED_KEYS, ""), "");
    }

    #[test]
    fn dotenv_status_goes_to_the_given_report() {
        let mut report = Vec::new();
        EnvConfig::from_env_reporting_to(&mut report);
        let report = String::from_utf8(report).unwrap();
        assert!(report.contains(".env") || report.contains("environment variables"), "{report}");
        assert!(report.ends_with('\n'));
    }

    #[test]
    fn default_config_names_the_easydict_scheme() {
        assert_eq!(default_config().get(SCHEME).unwrap(), "easydict");
    }

    #[test]
    fn boxed_config_clones_independently() {
        let config: Box<dyn Config> = Box::new(HashMapConfig::from_iter([(RUST_LOG, "debug")]));
        let cloned = config.clone();
        assert_eq!(cloned.get(RUST_LOG).unwrap(), "debug");
    }
}
