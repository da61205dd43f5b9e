//! Daemon configuration
//!
//! Layering: built-in defaults, then a TOML file, then `RATSD_*`
//! environment variables. Nested keys use a double underscore, e.g.
//! `RATSD_LOGGING__LEVEL=debug` or `RATSD_AUTH__TYPE=passthrough`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use ratsd_logging::LoggingConfig;
use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_FILE: &str = "ratsd.toml";
pub const DEFAULT_LISTEN_ADDR: &str = "localhost:8895";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Http,
    Https,
}

/// Which attesters a request queries when it carries no selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListOptions {
    /// Every loaded attester
    #[default]
    All,
    /// None: requests must name their attesters
    Selected,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FanOut {
    Sequential,
    #[default]
    Parallel,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicUser {
    /// bcrypt hash of the password, e.g. the second field of `htpasswd -nbB`
    pub password: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AuthConfig {
    #[default]
    None,
    Passthrough,
    Basic {
        #[serde(default)]
        users: BTreeMap<String, BasicUser>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RatsdConfig {
    pub listen_addr: String,
    pub protocol: Protocol,
    pub cert: Option<PathBuf>,
    pub cert_key: Option<PathBuf>,

    pub plugin_dir: PathBuf,
    pub list_options: ListOptions,
    pub secure_loader: bool,
    /// Plugin file stem → hex SHA-256, enforced when `secure_loader` is set
    pub plugins: BTreeMap<String, String>,

    pub fan_out: FanOut,
    pub request_timeout_secs: u64,
    pub handshake_timeout_secs: u64,

    pub auth: AuthConfig,
    pub logging: LoggingConfig,
}

impl Default for RatsdConfig {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            protocol: Protocol::Http,
            cert: None,
            cert_key: None,
            plugin_dir: PathBuf::from("./plugins"),
            list_options: ListOptions::All,
            secure_loader: false,
            plugins: BTreeMap::new(),
            fan_out: FanOut::Parallel,
            request_timeout_secs: 30,
            handshake_timeout_secs: 10,
            auth: AuthConfig::None,
            logging: LoggingConfig::default(),
        }
    }
}

impl RatsdConfig {
    /// Provider stack for `path`, or for `ratsd.toml` when it exists.
    pub fn figment(path: Option<&Path>) -> Result<Figment> {
        let mut figment = Figment::from(Serialized::defaults(RatsdConfig::default()));

        match path {
            Some(path) => {
                if !path.exists() {
                    bail!("configuration file does not exist: {}", path.display());
                }
                figment = figment.merge(Toml::file(path));
            }
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                figment = figment.merge(Toml::file(DEFAULT_CONFIG_FILE));
            }
            None => {}
        }

        Ok(figment.merge(Env::prefixed("RATSD_").split("__")))
    }

    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::from_figment(Self::figment(path)?)
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: Self = figment
            .extract()
            .context("failed to load ratsd configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.listen_addr.trim().is_empty() {
            return Err(anyhow!("listen_addr cannot be empty"));
        }

        if self.protocol == Protocol::Https && (self.cert.is_none() || self.cert_key.is_none()) {
            return Err(anyhow!(
                r#"both cert and cert_key must be specified when protocol is "https""#
            ));
        }

        if self.plugin_dir.as_os_str().is_empty() {
            return Err(anyhow!("plugin_dir cannot be empty"));
        }

        if self.request_timeout_secs == 0 {
            return Err(anyhow!("request_timeout_secs must be > 0"));
        }
        if self.handshake_timeout_secs == 0 {
            return Err(anyhow!("handshake_timeout_secs must be > 0"));
        }

        if self.secure_loader && self.plugins.is_empty() {
            return Err(anyhow!(
                "secure_loader is enabled but no plugin checksums are configured"
            ));
        }

        if let AuthConfig::Basic { users } = &self.auth {
            for (name, user) in users {
                user.password.parse::<bcrypt::HashParts>().with_context(|| {
                    format!("password for user {name:?} is not a bcrypt hash")
                })?;
            }
        }

        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }
}
