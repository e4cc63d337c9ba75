use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::FetchError;

pub const DEFAULT_CONFIG_FILE: &str = "logfetch.json";
pub const DEFAULT_PORT: u16 = 22;
pub const DEFAULT_TAIL_LINES: u32 = 1000;
pub const DEFAULT_RECENT_ACTIVITY: usize = 100;
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub tail_lines: Option<u32>,
    #[serde(default)]
    pub recent_activity: Option<usize>,
    #[serde(default)]
    pub activity_log: Option<PathBuf>,
    #[serde(default)]
    pub hosts: BTreeMap<String, HostEntry>,
}

/// `[host, username, password, port?]` or a detailed object.
#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum HostEntry {
    Shorthand(Vec<String>),
    Detailed(HostEntryObject),
}

#[derive(Debug, Deserialize, Serialize)]
pub struct HostEntryObject {
    pub host: String,
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Private key file; tried before the password when set.
    #[serde(default)]
    pub key_path: Option<PathBuf>,
    #[serde(default)]
    pub passphrase: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub connect_timeout_ms: Option<u64>,
    #[serde(default)]
    pub ready_timeout_ms: Option<u64>,
}

#[derive(Clone, PartialEq, Eq)]
pub struct HostProfile {
    pub host: String,
    pub username: String,
    pub password: String,
    pub key_path: Option<PathBuf>,
    pub passphrase: Option<String>,
    pub port: u16,
    pub connect_timeout: Duration,
    pub ready_timeout: Duration,
}

impl HostProfile {
    pub fn new(host: &str, username: &str, password: &str) -> Self {
        Self {
            host: host.to_string(),
            username: username.to_string(),
            password: password.to_string(),
            key_path: None,
            passphrase: None,
            port: DEFAULT_PORT,
            connect_timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            ready_timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_key(mut self, key_path: impl Into<PathBuf>, passphrase: Option<&str>) -> Self {
        self.key_path = Some(key_path.into());
        self.passphrase = passphrase.map(str::to_string);
        self
    }
}

// Password and passphrase stay out of Debug output.
impl std::fmt::Debug for HostProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostProfile")
            .field("host", &self.host)
            .field("username", &self.username)
            .field("key_path", &self.key_path)
            .field("port", &self.port)
            .field("connect_timeout", &self.connect_timeout)
            .field("ready_timeout", &self.ready_timeout)
            .finish_non_exhaustive()
    }
}

/// Alias to connection profile lookup.
#[derive(Debug, Clone, Default)]
pub struct HostTable {
    profiles: BTreeMap<String, HostProfile>,
}

impl HostTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, alias: &str, profile: HostProfile) {
        self.profiles.insert(alias.to_string(), profile);
    }

    pub fn with_profile(mut self, alias: &str, profile: HostProfile) -> Self {
        self.insert(alias, profile);
        self
    }

    pub fn get(&self, alias: &str) -> Result<&HostProfile, FetchError> {
        self.profiles
            .get(alias)
            .ok_or_else(|| FetchError::AliasNotFound(alias.to_string()))
    }

    pub fn aliases(&self) -> impl Iterator<Item = (&str, &HostProfile)> {
        self.profiles
            .iter()
            .map(|(alias, profile)| (alias.as_str(), profile))
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub tail_lines: u32,
    pub recent_activity: usize,
    pub activity_log: Option<PathBuf>,
    pub hosts: HostTable,
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, FetchError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Err(FetchError::MissingConfig);
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| FetchError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| FetchError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, FetchError> {
        let schema_version = config.schema_version.unwrap_or(1);

        let tail_lines = config.tail_lines.unwrap_or(DEFAULT_TAIL_LINES);
        if tail_lines == 0 {
            return Err(FetchError::ConfigParse(
                "tail_lines must be greater than zero".to_string(),
            ));
        }

        let mut hosts = HostTable::new();
        for (alias, entry) in config.hosts {
            let profile = match entry {
                HostEntry::Shorthand(values) => shorthand_profile(&alias, &values)?,
                HostEntry::Detailed(obj) => detailed_profile(&alias, obj)?,
            };
            hosts.insert(&alias, profile);
        }

        Ok(ResolvedConfig {
            schema_version,
            tail_lines,
            recent_activity: config.recent_activity.unwrap_or(DEFAULT_RECENT_ACTIVITY),
            activity_log: config.activity_log,
            hosts,
        })
    }
}

fn detailed_profile(alias: &str, obj: HostEntryObject) -> Result<HostProfile, FetchError> {
    if obj.password.is_empty() && obj.key_path.is_none() {
        return Err(FetchError::ConfigParse(format!(
            "host {alias}: needs a password or a key_path"
        )));
    }
    Ok(HostProfile {
        host: obj.host,
        username: obj.username,
        password: obj.password,
        key_path: obj.key_path,
        passphrase: obj.passphrase,
        port: obj.port.unwrap_or(DEFAULT_PORT),
        connect_timeout: Duration::from_millis(obj.connect_timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS)),
        ready_timeout: Duration::from_millis(obj.ready_timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS)),
    })
}

fn shorthand_profile(alias: &str, values: &[String]) -> Result<HostProfile, FetchError> {
    let [host, username, password, rest @ ..] = values else {
        return Err(FetchError::ConfigParse(format!(
            "host {alias}: expected [host, username, password, port?]"
        )));
    };
    let port = match rest {
        [] => DEFAULT_PORT,
        [port] => port.trim().parse::<u16>().map_err(|_| {
            FetchError::ConfigParse(format!("host {alias}: invalid port {port}"))
        })?,
        _ => {
            return Err(FetchError::ConfigParse(format!(
                "host {alias}: too many values"
            )));
        }
    };
    Ok(HostProfile::new(host, username, password).with_port(port))
}
