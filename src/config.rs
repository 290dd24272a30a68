//! Configuration loading via `ortho-config`.

use std::ffi::OsString;
use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::catalog::TemplateCriteria;
use crate::provision::{PollConfig, ProvisionSettings};
use crate::types::Region;

/// Default criteria used when a caller supplies no template.
pub const DEFAULT_TEMPLATE: &str = "osFamily=UBUNTU,os64Bit=true,osVersionMatches=16.*";

/// Compute orchestration settings derived from environment variables,
/// configuration files, and CLI flags.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "CUMULUS",
    discovery(
        app_name = "cumulus",
        env_var = "CUMULUS_CONFIG_PATH",
        config_file_name = "cumulus.toml",
        dotfile_name = ".cumulus.toml",
        project_file_name = "cumulus.toml"
    )
)]
pub struct ComputeConfig {
    /// Region allow-list. Every catalogued region is used when empty.
    #[ortho_config(merge_strategy = "replace")]
    #[serde(default, deserialize_with = "list::one_or_many")]
    pub regions: Vec<String>,
    /// Template criteria used when a batch names none.
    #[ortho_config(default = DEFAULT_TEMPLATE.to_owned())]
    #[serde(deserialize_with = "list::joined")]
    pub default_template: String,
    /// Prefix of managed security groups and generated keypairs.
    #[ortho_config(default = "cumulus".to_owned())]
    pub resource_prefix: String,
    /// TCP ports opened by managed security groups.
    #[ortho_config(default = vec![22], merge_strategy = "replace")]
    #[serde(deserialize_with = "list::one_or_many")]
    pub inbound_ports: Vec<u16>,
    /// User named in node login credentials.
    #[ortho_config(default = "root".to_owned())]
    pub login_user: String,
    /// Seconds between server status polls.
    #[ortho_config(default = 5)]
    pub poll_interval_secs: u64,
    /// Seconds a server may take to become active.
    #[ortho_config(default = 300)]
    pub node_running_timeout_secs: u64,
    /// Milliseconds to wait before re-reading a conflicting security group.
    #[ortho_config(default = 500)]
    pub security_group_settle_ms: u64,
    /// Attach a floating IP to every node where supported.
    #[ortho_config(default = false)]
    pub auto_allocate_floating_ips: bool,
    /// Generate a keypair for batches that name none.
    #[ortho_config(default = false)]
    pub auto_generate_keypairs: bool,
    /// Per-request HTTP timeout in seconds.
    #[ortho_config(default = 30)]
    pub http_timeout_secs: u64,
}

impl Default for ComputeConfig {
    fn default() -> Self {
        Self {
            regions: Vec::new(),
            default_template: DEFAULT_TEMPLATE.to_owned(),
            resource_prefix: "cumulus".to_owned(),
            inbound_ports: vec![22],
            login_user: "root".to_owned(),
            poll_interval_secs: 5,
            node_running_timeout_secs: 300,
            security_group_settle_ms: 500,
            auto_allocate_floating_ips: false,
            auto_generate_keypairs: false,
            http_timeout_secs: 30,
        }
    }
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(description: &'static str, env_var: &'static str, toml_key: &'static str) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }

    fn guidance(&self) -> String {
        format!(
            "set {} or add {} to [cumulus] in cumulus.toml",
            self.env_var, self.toml_key
        )
    }
}

const TEMPLATE_FIELD: FieldMetadata = FieldMetadata::new(
    "default template criteria",
    "CUMULUS_DEFAULT_TEMPLATE",
    "default_template",
);
const PREFIX_FIELD: FieldMetadata = FieldMetadata::new(
    "resource name prefix",
    "CUMULUS_RESOURCE_PREFIX",
    "resource_prefix",
);
const LOGIN_USER_FIELD: FieldMetadata =
    FieldMetadata::new("login user", "CUMULUS_LOGIN_USER", "login_user");
const PORTS_FIELD: FieldMetadata =
    FieldMetadata::new("inbound ports", "CUMULUS_INBOUND_PORTS", "inbound_ports");
const POLL_FIELD: FieldMetadata = FieldMetadata::new(
    "poll interval",
    "CUMULUS_POLL_INTERVAL_SECS",
    "poll_interval_secs",
);
const TIMEOUT_FIELD: FieldMetadata = FieldMetadata::new(
    "node running timeout",
    "CUMULUS_NODE_RUNNING_TIMEOUT_SECS",
    "node_running_timeout_secs",
);
const HTTP_TIMEOUT_FIELD: FieldMetadata = FieldMetadata::new(
    "HTTP timeout",
    "CUMULUS_HTTP_TIMEOUT_SECS",
    "http_timeout_secs",
);

impl ComputeConfig {
    fn require_field(value: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
        if value.trim().is_empty() {
            return Err(ConfigError::MissingField(format!(
                "missing {}: {}",
                metadata.description,
                metadata.guidance()
            )));
        }
        Ok(())
    }

    fn require_positive(value: u64, metadata: &FieldMetadata) -> Result<(), ConfigError> {
        if value == 0 {
            return Err(ConfigError::Invalid(format!(
                "{} must be greater than zero: {}",
                metadata.description,
                metadata.guidance()
            )));
        }
        Ok(())
    }

    /// Loads configuration using the `ortho-config` derive. Values merge
    /// defaults, configuration files, environment variables, and CLI flags in
    /// that order of precedence.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the loader fails to merge sources.
    pub fn load_from_sources() -> Result<Self, ConfigError> {
        Self::load().map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Loads configuration without attempting to parse CLI arguments. Values
    /// still merge defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([OsString::from("cumulus")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Performs semantic validation. Error messages name the environment
    /// variable and the TOML key that supply each value.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required field is empty
    /// and [`ConfigError::Invalid`] when a value cannot be used.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Self::require_field(&self.default_template, &TEMPLATE_FIELD)?;
        Self::require_field(&self.resource_prefix, &PREFIX_FIELD)?;
        Self::require_field(&self.login_user, &LOGIN_USER_FIELD)?;
        Self::require_positive(self.poll_interval_secs, &POLL_FIELD)?;
        Self::require_positive(self.node_running_timeout_secs, &TIMEOUT_FIELD)?;
        Self::require_positive(self.http_timeout_secs, &HTTP_TIMEOUT_FIELD)?;
        self.check_ports()?;
        self.template_criteria()?;
        Ok(())
    }

    /// Regions named by `regions`, in order; empty when unset.
    #[must_use]
    pub fn region_allow_list(&self) -> Vec<Region> {
        self.regions
            .iter()
            .map(|region| region.trim())
            .filter(|region| !region.is_empty())
            .map(Region::from)
            .collect()
    }

    fn check_ports(&self) -> Result<(), ConfigError> {
        if self.inbound_ports.is_empty() {
            return Err(ConfigError::MissingField(format!(
                "missing {}: {}",
                PORTS_FIELD.description,
                PORTS_FIELD.guidance()
            )));
        }
        if self.inbound_ports.contains(&0) {
            return Err(ConfigError::Invalid(format!(
                "port 0 in {}: {}",
                PORTS_FIELD.description,
                PORTS_FIELD.guidance()
            )));
        }
        Ok(())
    }

    /// Parsed `default_template`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the criteria do not parse.
    pub fn template_criteria(&self) -> Result<TemplateCriteria, ConfigError> {
        self.default_template.parse().map_err(|err| {
            ConfigError::Invalid(format!(
                "{}: {err}: {}",
                TEMPLATE_FIELD.description,
                TEMPLATE_FIELD.guidance()
            ))
        })
    }

    /// Poll interval and timeout.
    #[must_use]
    pub const fn poll_config(&self) -> PollConfig {
        PollConfig {
            interval: Duration::from_secs(self.poll_interval_secs),
            timeout: Duration::from_secs(self.node_running_timeout_secs),
        }
    }

    /// Delay before re-reading a conflicting security group.
    #[must_use]
    pub const fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.security_group_settle_ms)
    }

    /// Per-request HTTP timeout.
    #[must_use]
    pub const fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Provisioner defaults.
    #[must_use]
    pub fn provision_settings(&self) -> ProvisionSettings {
        ProvisionSettings {
            inbound_ports: self.inbound_ports.clone(),
            login_user: self.login_user.clone(),
            auto_allocate_floating_ips: self.auto_allocate_floating_ips,
            poll: self.poll_config(),
        }
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Indicates a configuration value cannot be used.
    #[error("invalid configuration value: {0}")]
    Invalid(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}

/// Deserializers for list-valued settings.
///
/// Environment values containing commas arrive as sequences of strings while
/// single values arrive as scalars, so each helper accepts either shape.
mod list {
    use std::fmt::Display;
    use std::str::FromStr;

    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Scalar {
        Bool(bool),
        Number(u64),
        Text(String),
    }

    impl Scalar {
        fn into_text(self) -> String {
            match self {
                Self::Bool(flag) => flag.to_string(),
                Self::Number(number) => number.to_string(),
                Self::Text(text) => text,
            }
        }
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        Many(Vec<Scalar>),
        One(Scalar),
    }

    impl OneOrMany {
        fn into_texts(self) -> Vec<String> {
            match self {
                Self::Many(items) => items.into_iter().map(Scalar::into_text).collect(),
                Self::One(item) => vec![item.into_text()],
            }
        }
    }

    /// Parses a scalar or sequence into a list of `T`.
    pub(super) fn one_or_many<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: FromStr,
        T::Err: Display,
    {
        OneOrMany::deserialize(deserializer)?
            .into_texts()
            .into_iter()
            .map(|text| text.trim().to_owned())
            .filter(|text| !text.is_empty())
            .map(|text| {
                text.parse()
                    .map_err(|err| D::Error::custom(format!("invalid entry '{text}': {err}")))
            })
            .collect()
    }

    /// Reads a scalar, or re-joins a sequence with commas.
    pub(super) fn joined<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(OneOrMany::deserialize(deserializer)?.into_texts().join(","))
    }
}
