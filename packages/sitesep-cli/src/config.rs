use crate::ipfabric::PayloadFormat;
use anyhow::{Result, anyhow};
use serde::Deserialize;
use sitesep_core::CATCH_ALL_SITE;
use sitesep_core::rules::{DEFAULT_LITERAL_GROUP_SIZE, DEFAULT_SYNTHESIZED_GROUP_SIZE};
use std::fs;
use std::path::PathBuf;

/// Snapshot used when none is configured
const DEFAULT_SNAPSHOT: &str = "$last";

const ENV_IPF_URL: &str = "SITESEP_IPF_URL";
const ENV_IPF_TOKEN: &str = "SITESEP_IPF_TOKEN";
const ENV_IPF_SNAPSHOT: &str = "SITESEP_IPF_SNAPSHOT";
const ENV_SNOW_URL: &str = "SITESEP_SNOW_URL";
const ENV_SNOW_USER: &str = "SITESEP_SNOW_USER";
const ENV_SNOW_PASSWORD: &str = "SITESEP_SNOW_PASSWORD";

/// Configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    ipfabric: Option<IpFabricSection>,
    servicenow: Option<ServiceNowSection>,
    rules: Option<RulesSection>,
}

#[derive(Debug, Deserialize, Default)]
struct IpFabricSection {
    /// API base URL including the version (e.g., "https://ipfabric.example.com/api/v6.0")
    api_url: Option<String>,
    token: Option<String>,
    /// Snapshot id or "$last"
    snapshot: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct ServiceNowSection {
    /// Instance URL (e.g., "https://dev12345.service-now.com")
    url: Option<String>,
    username: Option<String>,
    password: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct RulesSection {
    literal_group_size: Option<usize>,
    synthesized_group_size: Option<usize>,
    catch_all: Option<String>,
    format: Option<PayloadFormat>,
}

/// Where the configuration came from
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConfigSource {
    /// Using default hardcoded values
    Default,
    /// Loaded from environment variable
    Environment,
    /// Loaded from config file
    ConfigFile,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Default => write!(f, "default"),
            ConfigSource::Environment => write!(f, "environment variable"),
            ConfigSource::ConfigFile => write!(f, "config file"),
        }
    }
}

/// Inventory platform connection settings
#[derive(Debug, Clone)]
pub struct PlatformConfig {
    pub api_url: Option<String>,
    pub token: Option<String>,
    pub snapshot: String,
    pub source: ConfigSource,
}

impl PlatformConfig {
    /// URL and token, or an error naming the settings to fill in.
    pub fn credentials(&self) -> Result<(&str, &str)> {
        let url = self.api_url.as_deref().ok_or_else(|| {
            anyhow!("IP Fabric API URL not configured (set {ENV_IPF_URL} or [ipfabric] api_url)")
        })?;
        let token = self.token.as_deref().ok_or_else(|| {
            anyhow!("IP Fabric token not configured (set {ENV_IPF_TOKEN} or [ipfabric] token)")
        })?;
        Ok((url, token))
    }
}

/// ServiceNow connection settings
#[derive(Debug, Clone)]
pub struct ServiceNowConfig {
    pub url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub source: ConfigSource,
}

impl ServiceNowConfig {
    pub fn credentials(&self) -> Result<(&str, &str, &str)> {
        let missing = |what: &str, env: &str, key: &str| {
            anyhow!("ServiceNow {what} not configured (set {env} or [servicenow] {key})")
        };
        let url = self
            .url
            .as_deref()
            .ok_or_else(|| missing("URL", ENV_SNOW_URL, "url"))?;
        let username = self
            .username
            .as_deref()
            .ok_or_else(|| missing("username", ENV_SNOW_USER, "username"))?;
        let password = self
            .password
            .as_deref()
            .ok_or_else(|| missing("password", ENV_SNOW_PASSWORD, "password"))?;
        Ok((url, username, password))
    }
}

/// Rule compilation defaults
#[derive(Debug, Clone)]
pub struct RulesConfig {
    pub literal_group_size: usize,
    pub synthesized_group_size: usize,
    pub catch_all: String,
    pub format: PayloadFormat,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub platform: PlatformConfig,
    pub servicenow: ServiceNowConfig,
    pub rules: RulesConfig,
}

/// Get the path to the configuration file
fn get_config_file_path() -> Option<PathBuf> {
    dirs::config_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
        .map(|p| p.join("sitesep").join("config.toml"))
}

/// Load configuration from the config file
fn load_config_file() -> Option<ConfigFile> {
    let path = get_config_file_path()?;

    if !path.exists() {
        return None;
    }

    match fs::read_to_string(&path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::debug!("Loaded config from {:?}", path);
                Some(config)
            }
            Err(e) => {
                tracing::warn!("Failed to parse config file {:?}: {}", path, e);
                None
            }
        },
        Err(e) => {
            tracing::warn!("Failed to read config file {:?}: {}", path, e);
            None
        }
    }
}

/// Load settings with priority:
/// 1. Environment variables (SITESEP_*)
/// 2. Config file (~/.config/sitesep/config.toml)
/// 3. Default values
pub fn load_settings() -> Settings {
    resolve_settings(load_config_file(), |key| std::env::var(key).ok())
}

/// Merge a parsed config file with environment lookups.
pub fn resolve_settings<E>(file: Option<ConfigFile>, env: E) -> Settings
where
    E: Fn(&str) -> Option<String>,
{
    let file = file.unwrap_or_default();
    let env_value = |key: &str| {
        env(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };
    let clean_url = |u: String| {
        let u = u.trim().trim_end_matches('/').to_string();
        (!u.is_empty()).then_some(u)
    };

    // IP Fabric
    let ipf = file.ipfabric.unwrap_or_default();
    let ipf_in_file = ipf.api_url.is_some() || ipf.token.is_some() || ipf.snapshot.is_some();
    let ipf_env = (
        env_value(ENV_IPF_URL),
        env_value(ENV_IPF_TOKEN),
        env_value(ENV_IPF_SNAPSHOT),
    );
    let ipf_source = if ipf_env.0.is_some() || ipf_env.1.is_some() || ipf_env.2.is_some() {
        ConfigSource::Environment
    } else if ipf_in_file {
        ConfigSource::ConfigFile
    } else {
        ConfigSource::Default
    };
    let platform = PlatformConfig {
        api_url: ipf_env.0.or(ipf.api_url).and_then(clean_url),
        token: ipf_env.1.or(ipf.token),
        snapshot: ipf_env
            .2
            .or(ipf.snapshot)
            .unwrap_or_else(|| DEFAULT_SNAPSHOT.to_string()),
        source: ipf_source,
    };

    // ServiceNow
    let snow = file.servicenow.unwrap_or_default();
    let snow_in_file = snow.url.is_some() || snow.username.is_some() || snow.password.is_some();
    let snow_env = (
        env_value(ENV_SNOW_URL),
        env_value(ENV_SNOW_USER),
        env_value(ENV_SNOW_PASSWORD),
    );
    let snow_source = if snow_env.0.is_some() || snow_env.1.is_some() || snow_env.2.is_some() {
        ConfigSource::Environment
    } else if snow_in_file {
        ConfigSource::ConfigFile
    } else {
        ConfigSource::Default
    };
    let servicenow = ServiceNowConfig {
        url: snow_env.0.or(snow.url).and_then(clean_url),
        username: snow_env.1.or(snow.username),
        password: snow_env.2.or(snow.password),
        source: snow_source,
    };

    let rules_section = file.rules.unwrap_or_default();
    let rules = RulesConfig {
        literal_group_size: rules_section
            .literal_group_size
            .unwrap_or(DEFAULT_LITERAL_GROUP_SIZE),
        synthesized_group_size: rules_section
            .synthesized_group_size
            .unwrap_or(DEFAULT_SYNTHESIZED_GROUP_SIZE),
        catch_all: rules_section
            .catch_all
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| CATCH_ALL_SITE.to_string()),
        format: rules_section.format.unwrap_or_default(),
    };

    Settings {
        platform,
        servicenow,
        rules,
    }
}

/// Get the path to the config file for documentation purposes
pub fn get_config_file_path_string() -> String {
    get_config_file_path()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "~/.config/sitesep/config.toml".to_string())
}

/// Generate example config file content
pub fn generate_example_config() -> String {
    r#"# Site Separation Configuration
# Place this file at: ~/.config/sitesep/config.toml

[ipfabric]
# API base URL including the API version
# api_url = "https://ipfabric.example.com/api/v6.0"
# token = "your-api-token"
# Snapshot id, or "$last" for the latest loaded snapshot (default)
# snapshot = "$last"

[servicenow]
# url = "https://dev12345.service-now.com"
# username = "ipfabric"
# password = "secret"

[rules]
# Hostnames per rule for literal rules (default 10)
# literal_group_size = 10
# Hostnames per rule when patterns come from grex (default 20)
# synthesized_group_size = 20
# catch_all = "_catch_all_"
# "flat" for rule lists, "nested" for platforms expecting siteSeparation.rules
# format = "flat"
"#
    .to_string()
}
