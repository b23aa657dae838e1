//! Discovery tiers
//!
//! Each provider wraps one cluster tool and a pure parser for its output.

use crate::discovery::command::CommandRunner;
use crate::discovery::CapabilityProvider;
use crate::error::{DiscoveryError, DiscoveryResult};

use async_trait::async_trait;
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;

/// Tier 1: storage orchestrator (`kubectl get nnfstorage`)
pub struct OrchestratorProvider {
    runner: Arc<dyn CommandRunner>,
    kubectl: String,
    fs_type: String,
    timeout: Duration,
}

impl OrchestratorProvider {
    pub fn new(runner: Arc<dyn CommandRunner>, kubectl: &str, fs_type: &str, timeout: Duration) -> Self {
        Self {
            runner,
            kubectl: kubectl.to_string(),
            fs_type: fs_type.to_string(),
            timeout,
        }
    }
}

#[async_trait]
impl CapabilityProvider for OrchestratorProvider {
    fn name(&self) -> &'static str {
        "storage-orchestrator"
    }

    fn is_available(&self) -> bool {
        self.runner.is_installed(&self.kubectl)
    }

    async fn filesystems_for(&self, node: &str) -> DiscoveryResult<Vec<String>> {
        let output = self
            .runner
            .run(&self.kubectl, &["get", "nnfstorage", "-A", "-o", "json"], self.timeout)
            .await?;
        parse_storage_listing(&output.stdout, &self.fs_type, node).map_err(|reason| {
            DiscoveryError::Parse {
                command: format!("{} get nnfstorage", self.kubectl),
                reason,
            }
        })
    }
}

/// Tier 2: lock-manager resource status (`pcs status resources`)
pub struct LockManagerProvider {
    runner: Arc<dyn CommandRunner>,
    pcs: String,
    fs_type: String,
    timeout: Duration,
}

impl LockManagerProvider {
    pub fn new(runner: Arc<dyn CommandRunner>, pcs: &str, fs_type: &str, timeout: Duration) -> Self {
        Self {
            runner,
            pcs: pcs.to_string(),
            fs_type: fs_type.to_string(),
            timeout,
        }
    }
}

#[async_trait]
impl CapabilityProvider for LockManagerProvider {
    fn name(&self) -> &'static str {
        "lock-manager-status"
    }

    fn is_available(&self) -> bool {
        self.runner.is_installed(&self.pcs)
    }

    async fn filesystems_for(&self, node: &str) -> DiscoveryResult<Vec<String>> {
        let output = self
            .runner
            .run(&self.pcs, &["status", "resources"], self.timeout)
            .await?;
        parse_lock_status(&output.stdout, &self.fs_type, node).map_err(|reason| {
            DiscoveryError::Parse {
                command: format!("{} status resources", self.pcs),
                reason,
            }
        })
    }
}

/// Tier 3: declarative cluster configuration (`pcs config show`)
pub struct ClusterConfigProvider {
    runner: Arc<dyn CommandRunner>,
    pcs: String,
    fs_type: String,
    timeout: Duration,
}

impl ClusterConfigProvider {
    pub fn new(runner: Arc<dyn CommandRunner>, pcs: &str, fs_type: &str, timeout: Duration) -> Self {
        Self {
            runner,
            pcs: pcs.to_string(),
            fs_type: fs_type.to_string(),
            timeout,
        }
    }
}

#[async_trait]
impl CapabilityProvider for ClusterConfigProvider {
    fn name(&self) -> &'static str {
        "cluster-config"
    }

    fn is_available(&self) -> bool {
        self.runner.is_installed(&self.pcs)
    }

    async fn filesystems_for(&self, _node: &str) -> DiscoveryResult<Vec<String>> {
        let output = self
            .runner
            .run(&self.pcs, &["config", "show"], self.timeout)
            .await?;
        Ok(parse_cluster_config(&output.stdout, &self.fs_type))
    }
}

/// Names of storage resources of type `fs_type`
///
/// Resources whose JSON mentions `node` win; if none do, every resource of
/// the type is returned since shared filesystems span the cluster.
pub fn parse_storage_listing(json: &str, fs_type: &str, node: &str) -> Result<Vec<String>, String> {
    let listing: serde_json::Value = serde_json::from_str(json).map_err(|e| e.to_string())?;
    let items = listing
        .get("items")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();

    let quoted_node = format!("\"{}\"", node);
    let mut typed = Vec::new();
    let mut associated = Vec::new();

    for item in &items {
        let declared = item
            .pointer("/spec/fileSystemType")
            .and_then(|v| v.as_str());
        if declared != Some(fs_type) {
            continue;
        }
        let Some(name) = item.pointer("/metadata/name").and_then(|v| v.as_str()) else {
            continue;
        };
        if item.to_string().contains(&quoted_node) {
            associated.push(name.to_string());
        }
        typed.push(name.to_string());
    }

    Ok(if associated.is_empty() { typed } else { associated })
}

/// Filesystem names from lock-manager status lines mentioning `node`
pub fn parse_lock_status(text: &str, fs_type: &str, node: &str) -> Result<Vec<String>, String> {
    let pattern = format!("(dlm|{}).*{}", regex::escape(fs_type), regex::escape(node));
    let matcher = Regex::new(&pattern).map_err(|e| e.to_string())?;
    let prefix = format!("{}-", fs_type);
    let fs_lower = fs_type.to_ascii_lowercase();

    let mut names = Vec::new();
    for line in text.lines().filter(|l| matcher.is_match(l)) {
        if !line.to_ascii_lowercase().contains(&fs_lower) {
            continue;
        }
        for token in line.split_whitespace() {
            if token.to_ascii_lowercase().contains(&fs_lower) && token.contains(':') {
                if let Some(name) = token.rsplit(':').next() {
                    names.push(name.to_string());
                }
            } else if let Some(rest) = token.strip_prefix(&prefix) {
                names.push(rest.to_string());
            }
        }
    }

    names.retain(|n| !n.is_empty());
    Ok(names)
}

/// Filesystem resource names declared in the cluster configuration
pub fn parse_cluster_config(text: &str, fs_type: &str) -> Vec<String> {
    let fs_lower = fs_type.to_ascii_lowercase();
    let prefix = format!("{}-", fs_type);
    let mut names = Vec::new();

    for line in text.lines() {
        let lower = line.to_ascii_lowercase();
        if !lower.contains(&fs_lower) || !(lower.contains("resource") || lower.contains("primitive")) {
            continue;
        }
        let tokens: Vec<&str> = line.split_whitespace().collect();
        for pair in tokens.windows(2) {
            let keyword = pair[0].trim_end_matches(':').to_ascii_lowercase();
            if keyword != "primitive" && keyword != "resource" {
                continue;
            }
            let resource = pair[1];
            if resource.to_ascii_lowercase().contains(&fs_lower) {
                let name = resource.strip_prefix(&prefix).unwrap_or(resource);
                names.push(name.to_string());
            }
        }
    }

    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::command::CommandOutput;
    use std::collections::HashMap;

    const STORAGE_JSON: &str = r#"{
        "items": [
            {"metadata": {"name": "scratch-a"},
             "spec": {"fileSystemType": "gfs2", "allocationSets": [{"nodes": [{"name": "rabbit-03"}]}]}},
            {"metadata": {"name": "scratch-b"},
             "spec": {"fileSystemType": "gfs2", "allocationSets": [{"nodes": [{"name": "rabbit-030"}]}]}},
            {"metadata": {"name": "lustre-1"},
             "spec": {"fileSystemType": "lustre", "allocationSets": [{"nodes": [{"name": "rabbit-03"}]}]}}
        ]
    }"#;

    const PCS_STATUS: &str = "\
  * Clone Set: dlm-clone [dlm]:
    * Started: [ compute-01 rabbit-03 ]
  * gfs2-fs-a\t(ocf:heartbeat:Filesystem):\t Started rabbit-03
  * gfs2:fs-b\t(ocf:heartbeat:Filesystem):\t Started rabbit-03
  * gfs2-other\t(ocf:heartbeat:Filesystem):\t Started compute-01
";

    const PCS_CONFIG: &str = "\
Cluster Name: hpc
Resources:
  Resource: gfs2-projects (class=ocf provider=heartbeat type=Filesystem)
    Attributes: device=/dev/vg/projects fstype=gfs2
  Resource: dlm (class=ocf provider=pacemaker type=controld)
primitive gfs2-home Filesystem
";

    /// Canned command output keyed by program name
    #[derive(Default)]
    struct FixtureRunner {
        outputs: HashMap<String, String>,
    }

    #[async_trait]
    impl CommandRunner for FixtureRunner {
        fn is_installed(&self, program: &str) -> bool {
            self.outputs.contains_key(program)
        }

        async fn run(&self, program: &str, _args: &[&str], _timeout: Duration) -> DiscoveryResult<CommandOutput> {
            self.outputs
                .get(program)
                .map(|stdout| CommandOutput { stdout: stdout.clone() })
                .ok_or_else(|| DiscoveryError::ToolMissing { tool: program.to_string() })
        }
    }

    #[test]
    fn test_storage_listing_prefers_node_association() {
        let names = parse_storage_listing(STORAGE_JSON, "gfs2", "rabbit-03").unwrap();
        assert_eq!(names, vec!["scratch-a"]);
    }

    #[test]
    fn test_storage_listing_falls_back_to_all_typed() {
        let names = parse_storage_listing(STORAGE_JSON, "gfs2", "compute-99").unwrap();
        assert_eq!(names, vec!["scratch-a", "scratch-b"]);
    }

    #[test]
    fn test_storage_listing_rejects_garbage() {
        assert!(parse_storage_listing("not json", "gfs2", "n").is_err());
        assert!(parse_storage_listing("{}", "gfs2", "n").unwrap().is_empty());
    }

    #[test]
    fn test_lock_status_parsing() {
        let names = parse_lock_status(PCS_STATUS, "gfs2", "rabbit-03").unwrap();
        assert_eq!(names, vec!["fs-a", "fs-b"]);
    }

    #[test]
    fn test_lock_status_other_node() {
        let names = parse_lock_status(PCS_STATUS, "gfs2", "compute-01").unwrap();
        assert_eq!(names, vec!["other"]);
    }

    #[test]
    fn test_cluster_config_parsing() {
        let names = parse_cluster_config(PCS_CONFIG, "gfs2");
        assert_eq!(names, vec!["projects", "home"]);
    }

    #[tokio::test]
    async fn test_providers_over_fixture_runner() {
        let mut runner = FixtureRunner::default();
        runner.outputs.insert("pcs".into(), PCS_STATUS.into());
        let runner: Arc<dyn CommandRunner> = Arc::new(runner);

        let orchestrator = OrchestratorProvider::new(runner.clone(), "kubectl", "gfs2", Duration::from_secs(1));
        assert!(!orchestrator.is_available());

        let lock = LockManagerProvider::new(runner, "pcs", "gfs2", Duration::from_secs(1));
        assert!(lock.is_available());
        assert_eq!(lock.filesystems_for("rabbit-03").await.unwrap(), vec!["fs-a", "fs-b"]);
    }
}
