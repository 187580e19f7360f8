//! Operator runtime configuration
//!
//! Command line flags (with environment fallbacks) are parsed into
//! [`ControllerArgs`] and turned into a validated [`OperatorConfig`], which is
//! shared with every reconcile through the controller context.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, ValueEnum};

use crate::resolver::ResolverSettings;
use crate::{Error, Result};

/// How the external address of the LoadBalancer Service is discovered
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum AddressDiscovery {
    /// A bounded background poll per resource
    #[default]
    Poll,
    /// React to Service status updates through a Service controller
    Watch,
}

impl std::fmt::Display for AddressDiscovery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Poll => write!(f, "poll"),
            Self::Watch => write!(f, "watch"),
        }
    }
}

/// Log output format
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human readable lines
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

/// Flags for the `controller` subcommand
#[derive(Args, Debug, Clone)]
pub struct ControllerArgs {
    /// Namespace to watch (all namespaces when unset)
    #[arg(long, env = "WATCH_NAMESPACE")]
    pub namespace: Option<String>,

    /// External address discovery mode
    #[arg(long, value_enum, default_value_t = AddressDiscovery::Poll)]
    pub address_discovery: AddressDiscovery,

    /// Template for generated standalone configurations (embedded default when unset)
    #[arg(long, env = "WILDFLY_CONFIG_TEMPLATE")]
    pub config_template: Option<PathBuf>,

    /// Maximum address polls per resource
    #[arg(long, default_value_t = 30)]
    pub resolve_attempts: u32,

    /// Seconds between address polls
    #[arg(long, default_value_t = 10)]
    pub resolve_interval_secs: u64,

    /// Seconds between periodic reconciles of a converged resource
    #[arg(long, default_value_t = 5)]
    pub resync_secs: u64,

    /// Do not install or refresh the CRD on startup
    #[arg(long)]
    pub skip_crd_install: bool,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text, env = "LOG_FORMAT")]
    pub log_format: LogFormat,
}

impl Default for ControllerArgs {
    fn default() -> Self {
        Self {
            namespace: None,
            address_discovery: AddressDiscovery::Poll,
            config_template: None,
            resolve_attempts: 30,
            resolve_interval_secs: 10,
            resync_secs: 5,
            skip_crd_install: false,
            log_format: LogFormat::Text,
        }
    }
}

impl ControllerArgs {
    /// Flag defaults with environment fallbacks applied
    ///
    /// Used when the binary is started without the `controller` subcommand.
    pub fn from_env() -> Result<Self> {
        #[derive(clap::Parser)]
        struct EnvOnly {
            #[command(flatten)]
            args: ControllerArgs,
        }
        use clap::Parser;
        EnvOnly::try_parse_from([env!("CARGO_PKG_NAME")])
            .map(|parsed| parsed.args)
            .map_err(|e| Error::config(e.to_string()))
    }

    /// Build the validated operator configuration
    pub fn into_config(self) -> Result<OperatorConfig> {
        let config = OperatorConfig {
            namespace: self.namespace.filter(|ns| !ns.is_empty()),
            address_discovery: self.address_discovery,
            config_template: self.config_template,
            resolver: ResolverSettings {
                attempts: self.resolve_attempts,
                interval: Duration::from_secs(self.resolve_interval_secs),
            },
            resync_interval: Duration::from_secs(self.resync_secs),
        };
        config.validate()?;
        Ok(config)
    }
}

/// Validated configuration shared by the controllers
#[derive(Clone, Debug, PartialEq)]
pub struct OperatorConfig {
    /// Namespace to watch, `None` for all namespaces
    pub namespace: Option<String>,
    /// External address discovery mode
    pub address_discovery: AddressDiscovery,
    /// Template file for generated configurations
    pub config_template: Option<PathBuf>,
    /// Address polling bounds
    pub resolver: ResolverSettings,
    /// Requeue interval after a successful reconcile
    pub resync_interval: Duration,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            namespace: None,
            address_discovery: AddressDiscovery::Poll,
            config_template: None,
            resolver: ResolverSettings::default(),
            resync_interval: Duration::from_secs(5),
        }
    }
}

impl OperatorConfig {
    /// Reject settings the controllers cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.resolver.attempts == 0 {
            return Err(Error::config("resolve attempts must be at least 1"));
        }
        if self.resolver.interval.is_zero() {
            return Err(Error::config("resolve interval must be greater than zero"));
        }
        if self.resync_interval.is_zero() {
            return Err(Error::config("resync interval must be greater than zero"));
        }
        Ok(())
    }
}
