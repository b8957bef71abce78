//! Configuration and the local credential store.
//!
//! Settings are layered, lowest priority first: built-in defaults, the
//! `config.json` file in the config directory, environment variables, and
//! command-line flags.  The config directory also holds the `default_chat`
//! pointer used by `input` and `chat`.

use std::env;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrrg_derive::CommandLine;
use serde::{Deserialize, Serialize};

use crate::client::{API_KEY_ENV, DEFAULT_API_URL, Inception};
use crate::client_logger::JsonLinesLogger;
use crate::error::{Error, Result};
use crate::types::DEFAULT_MODEL;

/// Environment variable overriding the API base URL.
pub const BASE_URL_ENV: &str = "INCEPTION_BASE_URL";
/// Environment variable overriding the config directory.
pub const CONFIG_DIR_ENV: &str = "INCEPTION_CONFIG_DIR";

const APP_DIR: &str = "inception-api";
const CONFIG_FILE: &str = "config.json";
const DEFAULT_CHAT_FILE: &str = "default_chat";

/// Global command-line options for the inception-api tool.
#[derive(CommandLine, Debug, Default, PartialEq, Eq)]
pub struct InceptionArgs {
    /// Base URL of the API.
    #[arrrg(optional, "API base URL (default: https://chat.inceptionlabs.ai)", "URL")]
    pub base_url: Option<String>,

    /// Model to use for new chats and completions.
    #[arrrg(optional, "Model to use (default: lambda.mercury-coder-small)", "MODEL")]
    pub model: Option<String>,

    /// Directory holding config.json and default_chat.
    #[arrrg(optional, "Config directory (default: platform config dir)", "DIR")]
    pub config_dir: Option<String>,

    /// API token, overriding the stored one.
    #[arrrg(optional, "API token (overrides INCEPTION_API_KEY and the stored token)", "TOKEN")]
    pub token: Option<String>,

    /// Append a JSON line per API interaction to this file.
    #[arrrg(optional, "Log API interactions as JSON lines to PATH", "PATH")]
    pub log_file: Option<String>,

    /// Disable ANSI colors and styles.
    #[arrrg(flag, "Disable ANSI colors/styles")]
    pub no_color: bool,
}

/// Contents of `config.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigFile {
    /// The stored bearer token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Default model override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// Returns `<platform config dir>/inception-api`, if the platform has one.
pub fn default_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join(APP_DIR))
}

/// Files under the config directory: the token and the default chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialStore {
    dir: PathBuf,
}

impl CredentialStore {
    /// A store rooted at `dir`.  Nothing is touched until the first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Locate the store: `explicit`, then INCEPTION_CONFIG_DIR, then the
    /// platform default.
    pub fn locate(explicit: Option<&str>) -> Result<Self> {
        if let Some(dir) = explicit {
            return Ok(Self::new(dir));
        }
        if let Some(dir) = env::var_os(CONFIG_DIR_ENV).filter(|d| !d.is_empty()) {
            return Ok(Self::new(dir));
        }
        default_config_dir()
            .map(Self::new)
            .ok_or_else(|| Error::config("could not determine a config directory; use --config-dir"))
    }

    /// The directory this store lives in.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of `config.json`.
    pub fn config_path(&self) -> PathBuf {
        self.dir.join(CONFIG_FILE)
    }

    /// Path of the default chat pointer.
    pub fn default_chat_path(&self) -> PathBuf {
        self.dir.join(DEFAULT_CHAT_FILE)
    }

    /// Read `config.json`.  A missing file reads as empty.
    pub fn load(&self) -> Result<ConfigFile> {
        let path = self.config_path();
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(ConfigFile::default()),
            Err(err) => {
                return Err(Error::io(
                    format!("failed to read {}", path.display()),
                    err,
                ));
            }
        };
        serde_json::from_str(&contents)
            .map_err(|err| Error::config(format!("invalid {}: {err}", path.display())))
    }

    /// Load `config.json` for rewriting.  A file that does not parse is
    /// replaced by defaults; the flag reports that it was.
    fn load_for_update(&self) -> Result<(ConfigFile, bool)> {
        match self.load() {
            Ok(config) => Ok((config, false)),
            Err(err) if err.is_config() => Ok((ConfigFile::default(), true)),
            Err(err) => Err(err),
        }
    }

    /// Write `config.json`, creating the directory if needed.
    ///
    /// The file holds the bearer token, so on unix it is readable by the
    /// owner only.
    pub fn save(&self, config: &ConfigFile) -> Result<()> {
        self.ensure_dir()?;
        let path = self.config_path();
        let json = serde_json::to_string_pretty(config)? + "\n";
        let write_err = |err| Error::io(format!("failed to write {}", path.display()), err);

        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&path).map_err(write_err)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(fs::Permissions::from_mode(0o600))
                .map_err(write_err)?;
        }
        file.write_all(json.as_bytes()).map_err(write_err)
    }

    /// The stored token, if any.
    pub fn token(&self) -> Result<Option<String>> {
        Ok(self.load()?.api_key.filter(|key| !key.is_empty()))
    }

    /// Persist `token`, keeping the other settings.  An unreadable
    /// `config.json` is overwritten.
    pub fn set_token(&self, token: &str) -> Result<()> {
        let (mut config, _) = self.load_for_update()?;
        config.api_key = Some(token.to_string());
        self.save(&config)
    }

    /// Remove the stored token.  Idempotent; an unreadable `config.json` is
    /// reset to defaults.
    pub fn clear_token(&self) -> Result<()> {
        let (mut config, invalid) = self.load_for_update()?;
        if config.api_key.take().is_none() && !invalid {
            return Ok(());
        }
        self.save(&config)
    }

    /// The default chat id, if one is set.
    pub fn default_chat(&self) -> Result<Option<String>> {
        let path = self.default_chat_path();
        match fs::read_to_string(&path) {
            Ok(contents) => {
                let id = contents.trim();
                Ok((!id.is_empty()).then(|| id.to_string()))
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(Error::io(
                format!("failed to read {}", path.display()),
                err,
            )),
        }
    }

    /// Store `chat_id` as the default chat.
    pub fn set_default_chat(&self, chat_id: &str) -> Result<()> {
        if chat_id.trim().is_empty() {
            return Err(Error::validation(
                "chat id must not be empty",
                Some("chat_id".to_string()),
            ));
        }
        self.ensure_dir()?;
        let path = self.default_chat_path();
        fs::write(&path, chat_id.trim())
            .map_err(|err| Error::io(format!("failed to write {}", path.display()), err))
    }

    /// Forget the default chat.  Idempotent.
    pub fn clear_default_chat(&self) -> Result<()> {
        let path = self.default_chat_path();
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(Error::io(
                format!("failed to remove {}", path.display()),
                err,
            )),
        }
    }

    fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(|err| {
            Error::io(
                format!("failed to create {}", self.dir.display()),
                err,
            )
        })
    }
}

/// Resolved settings for one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Bearer token, if any layer supplied one.
    pub api_key: Option<String>,

    /// API base URL.
    pub base_url: String,

    /// Model for new chats and completions.
    pub model: String,

    /// JSON-lines log destination.
    pub log_file: Option<PathBuf>,

    /// Whether to use ANSI colors and styles in output.
    pub use_color: bool,
}

impl Config {
    /// Creates a new Config with default values.
    ///
    /// Defaults:
    /// - Base URL: https://chat.inceptionlabs.ai
    /// - Model: lambda.mercury-coder-small
    /// - Color: enabled
    pub fn new() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_API_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            log_file: None,
            use_color: true,
        }
    }

    /// Layer the config file, the environment and the flags over the
    /// defaults.  `env` looks up one environment variable.
    pub fn resolve<F>(args: &InceptionArgs, file: &ConfigFile, env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| env(key).filter(|value| !value.is_empty());
        let defaults = Self::new();
        Self {
            api_key: args
                .token
                .clone()
                .or_else(|| lookup(API_KEY_ENV))
                .or_else(|| file.api_key.clone()),
            base_url: args
                .base_url
                .clone()
                .or_else(|| lookup(BASE_URL_ENV))
                .or_else(|| file.base_url.clone())
                .unwrap_or(defaults.base_url),
            model: args
                .model
                .clone()
                .or_else(|| file.model.clone())
                .unwrap_or(defaults.model),
            log_file: args.log_file.as_ref().map(PathBuf::from),
            use_color: !args.no_color,
        }
    }

    /// Load the store's `config.json` and resolve against the process
    /// environment.
    pub fn load(args: &InceptionArgs, store: &CredentialStore) -> Result<Self> {
        let file = store.load()?;
        Ok(Self::resolve(args, &file, |key| env::var(key).ok()))
    }

    /// Like [`Config::load`], but an unreadable `config.json` is treated as
    /// empty.  The parse error is returned alongside so it can be reported.
    pub fn load_lenient(args: &InceptionArgs, store: &CredentialStore) -> Result<(Self, Option<Error>)> {
        let (file, ignored) = match store.load() {
            Ok(file) => (file, None),
            Err(err) if err.is_config() => (ConfigFile::default(), Some(err)),
            Err(err) => return Err(err),
        };
        Ok((Self::resolve(args, &file, |key| env::var(key).ok()), ignored))
    }

    /// Build a client from these settings.
    ///
    /// Fails with [`Error::Authentication`] when no token is configured.
    pub fn client(&self) -> Result<Inception> {
        let Some(api_key) = self.api_key.clone() else {
            return Err(Error::authentication(
                "not logged in; run `inception-api auth login` or set INCEPTION_API_KEY",
            ));
        };
        self.client_with_token(api_key)
    }

    /// Build a client that authenticates with `token`.
    pub fn client_with_token(&self, token: String) -> Result<Inception> {
        let client = Inception::with_options(Some(token), Some(self.base_url.clone()), None)?;
        match &self.log_file {
            Some(path) => Ok(client.with_logger(Arc::new(JsonLinesLogger::open(path)?))),
            None => Ok(client),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}
