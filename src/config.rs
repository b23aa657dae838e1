//! Configuration types for fence-recorder
//!
//! Defines CLI arguments for both binaries (every tunable also readable
//! from the environment) and the validated runtime configuration they are
//! converted into.

use crate::actuator::{ActuatorConfig, ActuatorKind};
use crate::channel::{ChannelConfig, Retention, DEFAULT_REQUEST_DIR, DEFAULT_RESPONSE_DIR};
use crate::discovery::DiscoveryConfig;
use crate::error::ConfigError;
use crate::message::{is_valid_node_name, FenceAction};
use crate::watcher::{ConsumerConfig, WatchMode};

use clap::{ArgAction, Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

/// Default audit/log directory of the agent
pub const DEFAULT_LOG_DIR: &str = "/var/log/fence-recorder";

/// Default time the agent waits for a response
pub const DEFAULT_FENCE_TIMEOUT: Duration = Duration::from_secs(60);

/// Default interval between channel scans
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Largest accepted interval or timeout
const MAX_SECONDS: f64 = 86_400.0;

/// Actions accepted by the agent
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentAction {
    On,
    Off,
    Reboot,
    Status,
    /// Local health probe; never contacts the watcher
    Monitor,
}

impl AgentAction {
    /// Fence action carried on the wire, `None` for `monitor`
    pub fn fence_action(self) -> Option<FenceAction> {
        match self {
            AgentAction::On => Some(FenceAction::On),
            AgentAction::Off => Some(FenceAction::Off),
            AgentAction::Reboot => Some(FenceAction::Reboot),
            AgentAction::Status => Some(FenceAction::Status),
            AgentAction::Monitor => None,
        }
    }
}

/// Fence agent that relays fence actions to an external watcher
///
/// Options come from argv. When the agent is started with no arguments and
/// stdin is not a terminal, `key=value` lines on stdin are read instead
/// (see [`AgentArgs::from_stdin_options`]), as fence daemons pass them.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "fence-recorder",
    version,
    about = "Fence agent that records fence events and relays them to an external fencing component",
    long_about = "Invoked by the cluster resource manager to fence a node.\n\n\
                  Discovers the shared filesystems the target uses, writes a fence request\n\
                  into the request directory and waits for the external watcher's response.\n\
                  Every step is recorded in the audit log under --log-dir.",
    after_help = "EXAMPLES:\n    \
        # Reboot a node\n    \
        fence-recorder -o reboot -n rabbit-03\n\n    \
        # Health probe\n    \
        fence-recorder -o monitor\n\n    \
        # Skip filesystem discovery\n    \
        fence-recorder -o off -n rabbit-03 --no-fs-discovery"
)]
pub struct AgentArgs {
    /// Fence action
    #[arg(short = 'o', long, value_enum, default_value = "reboot")]
    pub action: AgentAction,

    /// Node to fence
    #[arg(short = 'n', long, visible_alias = "port", value_name = "NODE")]
    pub plug: Option<String>,

    /// Directory for audit and diagnostic logs
    #[arg(long, env = "LOG_DIR", default_value = DEFAULT_LOG_DIR, value_name = "DIR")]
    pub log_dir: PathBuf,

    /// Disable filesystem discovery for this call
    #[arg(long, visible_alias = "no-gfs2-discovery")]
    pub no_fs_discovery: bool,

    /// Enable filesystem discovery
    #[arg(
        long,
        env = "FS_DISCOVERY_ENABLED",
        default_value = "true",
        action = ArgAction::Set,
        value_parser = clap::builder::BoolishValueParser::new(),
        value_name = "BOOL"
    )]
    pub fs_discovery: bool,

    /// Directory fence requests are written to
    #[arg(long, env = "REQUEST_DIR", default_value = DEFAULT_REQUEST_DIR, value_name = "DIR")]
    pub request_dir: PathBuf,

    /// Directory fence responses are read from
    #[arg(long, env = "RESPONSE_DIR", default_value = DEFAULT_RESPONSE_DIR, value_name = "DIR")]
    pub response_dir: PathBuf,

    /// Seconds between response checks
    #[arg(long, env = "POLL_INTERVAL", default_value = "0.5", value_name = "SECS")]
    pub poll_interval: f64,

    /// Seconds to wait for the response
    #[arg(long, env = "FENCE_TIMEOUT", default_value = "60", value_name = "SECS")]
    pub timeout: f64,

    /// Seconds after which an unconsumed request is swept
    #[arg(long, env = "REQUEST_MAX_AGE", default_value = "300", value_name = "SECS")]
    pub request_max_age: f64,

    /// Keep or delete the response after reading it
    #[arg(long, env = "RESPONSE_RETENTION", default_value = "delete", value_name = "POLICY")]
    pub response_retention: Retention,

    /// Orchestrator CLI used by the first discovery tier
    #[arg(long, env = "KUBECTL_CMD", default_value = "kubectl", value_name = "CMD")]
    pub kubectl_cmd: String,

    /// Cluster manager CLI used by the remaining discovery tiers
    #[arg(long, env = "PCS_CMD", default_value = "pcs", value_name = "CMD")]
    pub pcs_cmd: String,

    /// Shared filesystem type to discover
    #[arg(long, env = "FS_TYPE", default_value = "gfs2", value_name = "TYPE")]
    pub fs_type: String,

    /// Verbose output
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

impl AgentArgs {
    /// Parse `key=value` option lines as written by a fence daemon
    ///
    /// `action` and `port`/`plug`/`nodename` are understood. Blank lines,
    /// `#` comments and other keys are ignored.
    pub fn from_stdin_options(text: &str) -> Result<Self, clap::Error> {
        let mut action = None;
        let mut plug = None;
        for line in text.lines().map(str::trim) {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            match key.trim() {
                "action" | "option" => action = Some(value.trim()),
                "port" | "plug" | "nodename" => plug = Some(value.trim()),
                _ => {}
            }
        }

        let mut argv = vec!["fence-recorder"];
        if let Some(action) = action {
            argv.extend(["--action", action]);
        }
        if let Some(plug) = plug {
            argv.extend(["--plug", plug]);
        }
        Self::try_parse_from(argv)
    }

    /// Target node, required for every action but `monitor`
    pub fn target(&self) -> Result<&str, ConfigError> {
        match self.plug.as_deref() {
            Some(plug) if is_valid_node_name(plug) => Ok(plug),
            Some(plug) if !plug.trim().is_empty() => Err(ConfigError::InvalidNode(plug.to_string())),
            _ => Err(ConfigError::MissingRequired(
                "--plug is required for fence actions".to_string(),
            )),
        }
    }

    /// Convert to validated requester configuration
    pub fn to_config(&self) -> Result<RequesterConfig, ConfigError> {
        let config = RequesterConfig {
            channel: ChannelConfig::with_dirs(&self.request_dir, &self.response_dir),
            discovery: DiscoveryConfig {
                enabled: self.fs_discovery && !self.no_fs_discovery,
                kubectl_cmd: self.kubectl_cmd.clone(),
                pcs_cmd: self.pcs_cmd.clone(),
                fs_type: self.fs_type.clone(),
                ..Default::default()
            },
            log_dir: self.log_dir.clone(),
            timeout: seconds("FENCE_TIMEOUT", self.timeout)?,
            poll_interval: seconds("POLL_INTERVAL", self.poll_interval)?,
            max_request_age: seconds("REQUEST_MAX_AGE", self.request_max_age)?,
            response_retention: self.response_retention,
        };
        config.validate()?;
        Ok(config)
    }
}

/// Runtime configuration of the requesting agent
#[derive(Debug, Clone)]
pub struct RequesterConfig {
    pub channel: ChannelConfig,
    pub discovery: DiscoveryConfig,
    /// Audit log directory
    pub log_dir: PathBuf,
    /// Time to wait for the response
    pub timeout: Duration,
    /// Interval between response checks
    pub poll_interval: Duration,
    /// Age after which unconsumed requests are swept
    pub max_request_age: Duration,
    pub response_retention: Retention,
}

impl Default for RequesterConfig {
    fn default() -> Self {
        Self {
            channel: ChannelConfig::default(),
            discovery: DiscoveryConfig::default(),
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
            timeout: DEFAULT_FENCE_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_request_age: crate::channel::DEFAULT_MAX_REQUEST_AGE,
            response_retention: Retention::Delete,
        }
    }
}

impl RequesterConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_directories(&self.channel)?;
        if self.poll_interval > self.timeout {
            return Err(ConfigError::InvalidDuration {
                name: "POLL_INTERVAL",
                value: format!("{}", self.poll_interval.as_secs_f64()),
                reason: "must not exceed FENCE_TIMEOUT".to_string(),
            });
        }
        Ok(())
    }
}

/// External fence watcher daemon
#[derive(Parser, Debug, Clone)]
#[command(
    name = "fence-watcher",
    version,
    about = "Consumes fence requests, runs the fence mechanism and writes responses",
    after_help = "EXAMPLES:\n    \
        # Simulated fencing with filesystem events\n    \
        fence-watcher\n\n    \
        # Real fence agent, polling every second\n    \
        fence-watcher --actuator command --actuator-command /usr/sbin/fence_ipmilan \\\n        \
        --watch-mode poll --poll-interval 1"
)]
pub struct WatcherArgs {
    /// Directory fence requests are read from
    #[arg(long, env = "REQUEST_DIR", default_value = DEFAULT_REQUEST_DIR, value_name = "DIR")]
    pub request_dir: PathBuf,

    /// Directory fence responses are written to
    #[arg(long, env = "RESPONSE_DIR", default_value = DEFAULT_RESPONSE_DIR, value_name = "DIR")]
    pub response_dir: PathBuf,

    /// Scan trigger (events, poll)
    #[arg(long, env = "WATCH_MODE", default_value = "events", value_name = "MODE")]
    pub watch_mode: WatchMode,

    /// Seconds between scans in poll mode
    #[arg(long, env = "POLL_INTERVAL", default_value = "0.5", value_name = "SECS")]
    pub poll_interval: f64,

    /// Seconds between safety scans in events mode
    #[arg(long, env = "RESCAN_INTERVAL", default_value = "5", value_name = "SECS")]
    pub rescan_interval: f64,

    /// Keep or delete request files once answered
    #[arg(long, env = "REQUEST_RETENTION", default_value = "delete", value_name = "POLICY")]
    pub request_retention: Retention,

    /// Fence mechanism (simulated, command)
    #[arg(long, env = "ACTUATOR", default_value = "simulated", value_name = "KIND")]
    pub actuator: ActuatorKind,

    /// Fence agent program for the command actuator
    #[arg(long, env = "ACTUATOR_COMMAND", value_name = "PATH")]
    pub actuator_command: Option<PathBuf>,

    /// Seconds allowed for one fence action
    #[arg(long, env = "ACTUATOR_TIMEOUT", default_value = "30", value_name = "SECS")]
    pub actuator_timeout: f64,

    /// Seconds the simulated actuator takes
    #[arg(long, env = "SIMULATED_DELAY", default_value = "2", value_name = "SECS")]
    pub simulated_delay: f64,

    /// Number of request ids remembered for duplicate suppression
    #[arg(long, env = "RECENCY_CAPACITY", default_value = "1024", value_name = "NUM")]
    pub recency_capacity: usize,

    /// Seconds a request id is remembered
    #[arg(long, env = "RECENCY_TTL", default_value = "600", value_name = "SECS")]
    pub recency_ttl: f64,

    /// Verbose output
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

impl WatcherArgs {
    /// Convert to validated watcher configuration
    pub fn to_config(&self) -> Result<WatcherConfig, ConfigError> {
        let simulated_delay = if self.simulated_delay == 0.0 {
            Duration::ZERO
        } else {
            seconds("SIMULATED_DELAY", self.simulated_delay)?
        };

        let config = WatcherConfig {
            channel: ChannelConfig::with_dirs(&self.request_dir, &self.response_dir),
            watch_mode: self.watch_mode,
            poll_interval: seconds("POLL_INTERVAL", self.poll_interval)?,
            rescan_interval: seconds("RESCAN_INTERVAL", self.rescan_interval)?,
            consumer: ConsumerConfig {
                actuator_timeout: seconds("ACTUATOR_TIMEOUT", self.actuator_timeout)?,
                request_retention: self.request_retention,
                recency_capacity: self.recency_capacity,
                recency_ttl: seconds("RECENCY_TTL", self.recency_ttl)?,
            },
            actuator: ActuatorConfig {
                kind: self.actuator,
                command: self.actuator_command.clone(),
                timeout: seconds("ACTUATOR_TIMEOUT", self.actuator_timeout)?,
                simulated_delay,
            },
        };
        config.validate()?;
        Ok(config)
    }
}

/// Runtime configuration of the watcher daemon
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    pub channel: ChannelConfig,
    pub watch_mode: WatchMode,
    pub poll_interval: Duration,
    pub rescan_interval: Duration,
    pub consumer: ConsumerConfig,
    pub actuator: ActuatorConfig,
}

impl WatcherConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_directories(&self.channel)?;
        if self.consumer.recency_capacity == 0 {
            return Err(ConfigError::InvalidChoice {
                name: "RECENCY_CAPACITY",
                value: "0".to_string(),
                expected: "a positive count",
            });
        }
        if self.actuator.kind == ActuatorKind::Command && self.actuator.command.is_none() {
            return Err(ConfigError::MissingRequired(
                "ACTUATOR_COMMAND is required when ACTUATOR=command".to_string(),
            ));
        }
        Ok(())
    }
}

fn check_directories(channel: &ChannelConfig) -> Result<(), ConfigError> {
    if channel.request_dir == channel.response_dir {
        return Err(ConfigError::SharedDirectory(channel.request_dir.clone()));
    }
    Ok(())
}

/// Convert a positive number of seconds into a `Duration`
pub fn seconds(name: &'static str, value: f64) -> Result<Duration, ConfigError> {
    if !value.is_finite() || value <= 0.0 || value > MAX_SECONDS {
        return Err(ConfigError::InvalidDuration {
            name,
            value: value.to_string(),
            reason: format!("must be greater than 0 and at most {}", MAX_SECONDS),
        });
    }
    Ok(Duration::from_secs_f64(value))
}
