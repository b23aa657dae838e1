//! Filesystem discovery for fence targets
//!
//! Works out which shared filesystems a node participates in by asking a
//! fixed sequence of cluster tools. The first tier that yields names wins;
//! a tier whose tool is missing, slow or unparseable is skipped.
//! Discovery never fails outright: the worst case is the
//! `none-detected` sentinel.

mod command;
mod providers;

pub use command::{CommandOutput, CommandRunner, SystemCommandRunner, DEFAULT_COMMAND_TIMEOUT};
pub use providers::{
    parse_cluster_config, parse_lock_status, parse_storage_listing, ClusterConfigProvider,
    LockManagerProvider, OrchestratorProvider,
};

use crate::error::DiscoveryResult;
use crate::message::FilesystemSet;

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// One discovery tier
#[async_trait]
pub trait CapabilityProvider: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Whether the backing tool is reachable on this host
    fn is_available(&self) -> bool;

    /// Filesystem names associated with `node`; empty when none are known
    async fn filesystems_for(&self, node: &str) -> DiscoveryResult<Vec<String>>;
}

/// Discovery settings
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    pub enabled: bool,
    pub kubectl_cmd: String,
    pub pcs_cmd: String,
    pub fs_type: String,
    pub command_timeout: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            kubectl_cmd: "kubectl".to_string(),
            pcs_cmd: "pcs".to_string(),
            fs_type: "gfs2".to_string(),
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }
}

/// Tiered discovery over an ordered list of providers
pub struct DiscoveryEngine {
    enabled: bool,
    providers: Vec<Box<dyn CapabilityProvider>>,
}

impl DiscoveryEngine {
    /// Standard three tiers backed by real subprocesses
    pub fn from_config(config: &DiscoveryConfig) -> Self {
        Self::with_runner(config, Arc::new(SystemCommandRunner))
    }

    /// Standard three tiers over a caller-supplied runner
    pub fn with_runner(config: &DiscoveryConfig, runner: Arc<dyn CommandRunner>) -> Self {
        let timeout = config.command_timeout;
        let providers: Vec<Box<dyn CapabilityProvider>> = vec![
            Box::new(OrchestratorProvider::new(
                runner.clone(),
                &config.kubectl_cmd,
                &config.fs_type,
                timeout,
            )),
            Box::new(LockManagerProvider::new(
                runner.clone(),
                &config.pcs_cmd,
                &config.fs_type,
                timeout,
            )),
            Box::new(ClusterConfigProvider::new(
                runner,
                &config.pcs_cmd,
                &config.fs_type,
                timeout,
            )),
        ];
        Self::with_providers(config.enabled, providers)
    }

    pub fn with_providers(enabled: bool, providers: Vec<Box<dyn CapabilityProvider>>) -> Self {
        Self { enabled, providers }
    }

    /// Engine that always reports `discovery-disabled`
    pub fn disabled() -> Self {
        Self::with_providers(false, Vec::new())
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Names of tiers whose tool is reachable
    pub fn available_tiers(&self) -> Vec<&'static str> {
        self.providers
            .iter()
            .filter(|p| p.is_available())
            .map(|p| p.name())
            .collect()
    }

    /// Filesystems `node` participates in
    pub async fn discover(&self, node: &str) -> FilesystemSet {
        if !self.enabled {
            debug!("Filesystem discovery disabled");
            return FilesystemSet::DiscoveryDisabled;
        }

        for provider in &self.providers {
            if !provider.is_available() {
                debug!("Skipping {} tier: tool not available", provider.name());
                continue;
            }

            match provider.filesystems_for(node).await {
                Ok(names) => {
                    let names = dedup_preserving_order(names);
                    if names.is_empty() {
                        debug!("{} tier found nothing for {}", provider.name(), node);
                        continue;
                    }
                    info!(
                        "Discovered {} filesystem(s) for {} via {}: {:?}",
                        names.len(),
                        node,
                        provider.name(),
                        names
                    );
                    return FilesystemSet::Detected(names);
                }
                Err(e) => {
                    warn!("{} tier failed for {}: {}", provider.name(), node, e);
                }
            }
        }

        info!("No filesystems detected for {}", node);
        FilesystemSet::NoneDetected
    }
}

fn dedup_preserving_order(names: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    names
        .into_iter()
        .filter(|n| seen.insert(n.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DiscoveryError;

    enum Behaviour {
        Missing,
        Names(Vec<&'static str>),
        Fails,
    }

    struct StaticProvider {
        name: &'static str,
        behaviour: Behaviour,
    }

    #[async_trait]
    impl CapabilityProvider for StaticProvider {
        fn name(&self) -> &'static str {
            self.name
        }

        fn is_available(&self) -> bool {
            !matches!(self.behaviour, Behaviour::Missing)
        }

        async fn filesystems_for(&self, _node: &str) -> DiscoveryResult<Vec<String>> {
            match &self.behaviour {
                Behaviour::Names(names) => Ok(names.iter().map(|s| s.to_string()).collect()),
                Behaviour::Fails => Err(DiscoveryError::Timeout {
                    command: self.name.to_string(),
                    timeout: Duration::from_secs(5),
                }),
                Behaviour::Missing => Err(DiscoveryError::ToolMissing {
                    tool: self.name.to_string(),
                }),
            }
        }
    }

    fn provider(name: &'static str, behaviour: Behaviour) -> Box<dyn CapabilityProvider> {
        Box::new(StaticProvider { name, behaviour })
    }

    #[tokio::test]
    async fn test_falls_through_to_second_tier() {
        let engine = DiscoveryEngine::with_providers(
            true,
            vec![
                provider("tier1", Behaviour::Missing),
                provider("tier2", Behaviour::Names(vec!["fs-a", "fs-b"])),
                provider("tier3", Behaviour::Names(vec!["never"])),
            ],
        );
        assert_eq!(
            engine.discover("rabbit-03").await,
            FilesystemSet::Detected(vec!["fs-a".into(), "fs-b".into()])
        );
    }

    #[tokio::test]
    async fn test_failing_and_empty_tiers_are_skipped() {
        let engine = DiscoveryEngine::with_providers(
            true,
            vec![
                provider("tier1", Behaviour::Fails),
                provider("tier2", Behaviour::Names(vec![])),
                provider("tier3", Behaviour::Names(vec!["home", "scratch", "home"])),
            ],
        );
        assert_eq!(
            engine.discover("n").await,
            FilesystemSet::Detected(vec!["home".into(), "scratch".into()])
        );
    }

    #[tokio::test]
    async fn test_nothing_found_yields_sentinel() {
        let engine = DiscoveryEngine::with_providers(
            true,
            vec![provider("tier1", Behaviour::Missing), provider("tier2", Behaviour::Fails)],
        );
        assert_eq!(engine.discover("n").await, FilesystemSet::NoneDetected);
        assert_eq!(engine.available_tiers(), vec!["tier2"]);
    }

    #[tokio::test]
    async fn test_disabled_engine() {
        let engine = DiscoveryEngine::with_providers(
            false,
            vec![provider("tier1", Behaviour::Names(vec!["fs"]))],
        );
        assert_eq!(engine.discover("n").await, FilesystemSet::DiscoveryDisabled);
        assert!(DiscoveryEngine::disabled().available_tiers().is_empty());
    }

    #[test]
    fn test_dedup_preserving_order() {
        let names = vec!["b".to_string(), "a".to_string(), "b".to_string()];
        assert_eq!(dedup_preserving_order(names), vec!["b", "a"]);
    }
}
