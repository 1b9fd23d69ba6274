use std::{collections::HashSet, io::Write, path::PathBuf, sync::Arc};

use easydict_config::Config;
use log::{debug, info, warn};
use serde::Serialize;
use url::Url;

use crate::action::ActionKey;
use crate::error::SchemeError;
use crate::store::PreferenceStore;

pub const DEFAULT_SCHEME: &str = "easydict";

/// Outcome of processing one scheme URL.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemeResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_key: Option<ActionKey>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SchemeResult {
    fn succeeded(action_key: ActionKey, value: Option<String>) -> Self {
        Self { success: true, value, action_key: Some(action_key), error: None }
    }

    fn failed(action_key: Option<ActionKey>, error: &SchemeError) -> Self {
        Self { success: false, value: None, action_key, error: Some(error.to_string()) }
    }
}

/// A scheme URL split into its action and decoded query pairs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SchemeRequest {
    pub action_key: ActionKey,
    pub params: Vec<(String, String)>,
}

impl SchemeRequest {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// The `key` parameter, or the name of the first pair for the
    /// `?<key>=<value>` shorthand.
    fn key(&self) -> Option<&str> {
        self.param("key")
            .or_else(|| self.params.first().map(|(k, _)| k.as_str()))
            .filter(|k| !k.is_empty())
    }

    fn key_value(&self) -> Option<(&str, &str)> {
        if let Some(key) = self.param("key") {
            let value = self.param("value").unwrap_or_default();
            return Some((key, value)).filter(|(k, _)| !k.is_empty());
        }
        self.params.first()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .filter(|(k, _)| !k.is_empty())
    }
}

/// True iff `text` is a URL of the default `easydict` scheme.
pub fn is_easydict_scheme(text: &str) -> bool {
    has_scheme(text, DEFAULT_SCHEME)
}

/// Compares only the text before the first `:`; the rest need not be a valid URL.
fn has_scheme(text: &str, scheme: &str) -> bool {
    text.trim()
        .split_once(':')
        .is_some_and(|(prefix, _)| prefix.eq_ignore_ascii_case(scheme))
}

/// Parses `easydict://` URLs and runs their action against a preference store.
///
/// ```text
/// easydict://writeKeyValue?key=EZBetaFeatureKey&value=1
/// easydict://writeKeyValue?EZBetaFeatureKey=1
/// easydict://readValueOfKey?key=EZBetaFeatureKey
/// easydict://saveUserDefaultsDataToDownloadFolder
/// easydict://resetUserDefaultsData
/// ```
#[derive(Clone)]
pub struct SchemeParser {
    scheme: String,
    store: Arc<dyn PreferenceStore>,
    downloads_dir: Option<PathBuf>,
    allowed_keys: HashSet<String>,
}

impl SchemeParser {
    pub fn new(store: Arc<dyn PreferenceStore>) -> Self {
        Self {
            scheme: DEFAULT_SCHEME.to_string(),
            store,
            downloads_dir: None,
            allowed_keys: HashSet::new(),
        }
    }

    pub fn from_config(store: Arc<dyn PreferenceStore>, config: &dyn Config) -> Self {
        let allowed_keys = config.get_or(easydict_config::ALLOWED_KEYS, "");
        Self::new(store)
            .with_scheme(&config.get_or(easydict_config::SCHEME, DEFAULT_SCHEME))
            .with_allowed_keys(allowed_keys.split(',').map(str::trim).filter(|k| !k.is_empty()))
            .with_downloads_dir_opt(config.get(easydict_config::DOWNLOADS_DIR).ok().map(PathBuf::from))
    }

    pub fn with_scheme(mut self, scheme: &str) -> Self {
        self.scheme = scheme.to_ascii_lowercase();
        self
    }

    pub fn with_downloads_dir(self, dir: impl Into<PathBuf>) -> Self {
        self.with_downloads_dir_opt(Some(dir.into()))
    }

    fn with_downloads_dir_opt(mut self, dir: Option<PathBuf>) -> Self {
        self.downloads_dir = dir;
        self
    }

    /// Restricts read/write actions to the given keys. An empty list allows all keys.
    pub fn with_allowed_keys<I, K>(mut self, keys: I) -> Self
    where I: IntoIterator<Item = K>, K: Into<String>
    {
        self.allowed_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn is_easydict_scheme(&self, text: &str) -> bool {
        has_scheme(text, &self.scheme)
    }

    pub fn is_write_action_key(&self, action_key: &str) -> bool {
        crate::action::is_write_action_key(action_key)
    }

    pub fn parse(&self, text: &str) -> Result<SchemeRequest, SchemeError> {
        let url = Url::parse(text)
            .ok()
            .filter(|url| url.scheme().eq_ignore_ascii_case(&self.scheme))
            .ok_or_else(|| SchemeError::UnrecognizedScheme(text.to_string(), self.scheme.clone()))?;

        // easydict://<action>?.. carries the action as host, easydict:<action>?.. as path
        let action = match url.host_str() {
            Some(host) if !host.is_empty() => host.to_string(),
            _ => url.path()
                .trim_start_matches('/')
                .split('/')
                .next()
                .unwrap_or_default()
                .to_string(),
        };
        if action.is_empty() {
            return Err(SchemeError::MissingAction);
        }
        let action_key = action.parse::<ActionKey>()?;
        let params = url.query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        Ok(SchemeRequest { action_key, params })
    }

    /// Parses and runs `url`. Every failure is reported in the returned result.
    pub async fn open_url_scheme(&self, url: &str) -> SchemeResult {
        let request = match self.parse(url) {
            Ok(request) => request,
            Err(e) => {
                warn!("rejecting scheme url {url}: {e}");
                return SchemeResult::failed(None, &e);
            }
        };
        let action_key = request.action_key;
        debug!("dispatching {action_key} with {} parameters", request.params.len());

        let this = self.clone();
        let outcome = tokio::task::spawn_blocking(move || this.dispatch(&request))
            .await
            .map_err(|e| SchemeError::Store(anyhow::anyhow!("action {action_key} aborted: {e}")))
            .and_then(|r| r);

        match outcome {
            Ok(value) => SchemeResult::succeeded(action_key, value),
            Err(e) => {
                warn!("{action_key} failed: {e}");
                SchemeResult::failed(Some(action_key), &e)
            }
        }
    }

    /// Completion-style variant of `open_url_scheme`. `completion` runs exactly
    /// once, on the task awaiting this future.
    pub async fn open_url_scheme_with<F>(&self, url: &str, completion: F)
    where F: FnOnce(SchemeResult)
    {
        let result = self.open_url_scheme(url).await;
        completion(result);
    }

    fn dispatch(&self, request: &SchemeRequest) -> Result<Option<String>, SchemeError> {
        match request.action_key {
            ActionKey::WriteKeyValue => {
                let (key, value) = request.key_value()
                    .ok_or(SchemeError::MissingKey(ActionKey::WriteKeyValue.as_str()))?;
                self.check_allowed(key)?;
                self.store.set(key, value)?;
                info!("preference {key} set through url scheme");
                Ok(None)
            }
            ActionKey::ReadValueOfKey => {
                let key = request.key()
                    .ok_or(SchemeError::MissingKey(ActionKey::ReadValueOfKey.as_str()))?;
                self.check_allowed(key)?;
                match self.store.get(key)? {
                    Some(value) => Ok(Some(value)),
                    None => Err(SchemeError::KeyNotFound(key.to_string())),
                }
            }
            ActionKey::SaveUserDefaultsDataToDownloadFolder => {
                let dir = self.downloads_dir.clone()
                    .ok_or(SchemeError::NoDownloadsDir)?;
                let path = self.export_to(dir)?;
                Ok(Some(path.to_string_lossy().into_owned()))
            }
            ActionKey::ResetUserDefaultsData => {
                self.store.clear()?;
                info!("all preferences reset through url scheme");
                Ok(None)
            }
        }
    }

    fn check_allowed(&self, key: &str) -> Result<(), SchemeError> {
        if self.allowed_keys.is_empty() || self.allowed_keys.contains(key) {
            Ok(())
        } else {
            Err(SchemeError::KeyNotAllowed(key.to_string()))
        }
    }

    fn export_to(&self, dir: PathBuf) -> Result<PathBuf, anyhow::Error> {
        let entries = self.store.snapshot()?;
        std::fs::create_dir_all(&dir)?;
        let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S%3f");
        let data = serde_json::to_vec_pretty(&entries)?;

        let mut attempt = 0;
        let path = loop {
            let name = match attempt {
                0 => format!("easydict-preferences-{stamp}.json"),
                n => format!("easydict-preferences-{stamp}-{n}.json"),
            };
            let path = dir.join(name);
            match std::fs::OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    file.write_all(&data)?;
                    break path;
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => attempt += 1,
                Err(e) => return Err(e.into()),
            }
        };
        info!("exported {} preferences to {}", entries.len(), path.display());
        Ok(path)
    }
}
