//! Typed view of the cache configuration (spec.md §4.2, §6).
//!
//! Parses `maven-cache-config.xml` and exposes typed accessors; matching
//! rules live here too since they're pure functions over the parsed
//! configuration and a step's identity.

use std::path::PathBuf;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{CacheError, Result};
use crate::model::PluginId;

/// `input.global`: default glob plus path-pattern includes/excludes
/// evaluated relative to the module root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalInputConfig {
    #[serde(default = "default_glob")]
    pub glob: String,
    #[serde(default)]
    pub includes: Vec<String>,
    #[serde(default)]
    pub excludes: Vec<String>,
    /// Whether the scanner follows symlinks. Off by default (spec.md §4.3);
    /// a symlink target outside the module root is an error regardless of
    /// this setting.
    #[serde(default)]
    pub follow_symlinks: bool,
}

fn default_glob() -> String {
    "**/*".to_string()
}

impl Default for GlobalInputConfig {
    fn default() -> Self {
        Self {
            glob: default_glob(),
            includes: Vec::new(),
            excludes: Vec::new(),
            follow_symlinks: false,
        }
    }
}

/// Include/exclude paths scanned in addition to the global roots, scoped to
/// one plugin or one of its executions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirScanConfig {
    #[serde(default)]
    pub includes: Vec<String>,
    #[serde(default)]
    pub excludes: Vec<String>,
}

/// A plugin or execution coordinate matcher, as used in `executionControl`
/// rules (spec.md §4.2's three matching rules).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginRule {
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    pub artifact: String,
    /// When present, a step must additionally carry one of these execution
    /// ids to match.
    #[serde(default)]
    pub executions: Option<Vec<String>>,
    /// When present, a step must additionally carry one of these goals to
    /// match.
    #[serde(default)]
    pub goals: Option<Vec<String>>,
}

impl PluginRule {
    /// Implements spec.md §4.2's matching rules: artifactId equality is
    /// mandatory; groupId, execution id, and goal are progressively more
    /// specific optional filters.
    pub fn matches(&self, plugin_id: &PluginId, execution_id: &str, goal: &str) -> bool {
        if self.artifact != plugin_id.artifact {
            return false;
        }
        if let Some(group) = &self.group {
            if group != &plugin_id.group {
                return false;
            }
        }
        if let Some(executions) = &self.executions {
            if !executions.iter().any(|e| e == execution_id) {
                return false;
            }
        }
        if let Some(goals) = &self.goals {
            if !goals.iter().any(|g| g == goal) {
                return false;
            }
        }
        true
    }
}

/// A [`DirScanConfig`] scoped to one execution id, as opposed to the whole
/// plugin.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerExecutionDirScanConfig {
    pub execution_id: String,
    #[serde(flatten)]
    pub dir_scan: DirScanConfig,
}

/// Per-plugin input scan configuration (spec.md §4.2).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginInputConfig {
    pub plugin: PluginRule,
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir_scan: Option<DirScanConfig>,
    #[serde(default)]
    pub per_execution_dir_scan: Vec<PerExecutionDirScanConfig>,
    #[serde(default)]
    pub effective_pom_exclude_properties: Vec<String>,
}

/// A reconciliation rule for one plugin/goal combination (spec.md §4.2,
/// §4.9).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcilePluginRule {
    pub plugin: PluginRule,
    #[serde(default)]
    pub reconciles: Vec<String>,
    #[serde(default)]
    pub logs: Vec<String>,
    #[serde(default)]
    pub nologs: Vec<String>,
    #[serde(default)]
    pub log_all: bool,
}

impl ReconcilePluginRule {
    pub fn classify(&self, property: &str) -> PropertyClass {
        if self.reconciles.iter().any(|p| p == property) {
            PropertyClass::Tracked
        } else if self.nologs.iter().any(|p| p == property) {
            PropertyClass::Ignored
        } else if self.logs.iter().any(|p| p == property) || self.log_all {
            PropertyClass::Logged
        } else {
            PropertyClass::Ignored
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyClass {
    Tracked,
    Logged,
    Ignored,
}

/// `executionControl` (spec.md §4.2).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionControl {
    #[serde(default)]
    pub ignore_missing: Vec<PluginRule>,
    #[serde(default)]
    pub run_always: Vec<PluginRule>,
    #[serde(default)]
    pub reconcile_plugins: Vec<ReconcilePluginRule>,
}

impl ExecutionControl {
    pub fn matches_ignore_missing(&self, plugin_id: &PluginId, execution_id: &str, goal: &str) -> bool {
        self.ignore_missing.iter().any(|r| r.matches(plugin_id, execution_id, goal))
    }

    pub fn matches_run_always(&self, plugin_id: &PluginId, execution_id: &str, goal: &str) -> bool {
        self.run_always.iter().any(|r| r.matches(plugin_id, execution_id, goal))
    }

    pub fn reconcile_rule_for(&self, plugin_id: &PluginId, execution_id: &str, goal: &str) -> Option<&ReconcilePluginRule> {
        self.reconcile_plugins.iter().find(|r| r.plugin.matches(plugin_id, execution_id, goal))
    }
}

/// `output.exclude.patterns`: artifacts matching any pattern are never
/// persisted to the record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
}

/// Local store settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalStoreConfig {
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
    #[serde(default = "default_max_local_builds_cached")]
    pub max_local_builds_cached: usize,
}

fn default_max_local_builds_cached() -> usize {
    usize::MAX
}

impl Default for LocalStoreConfig {
    fn default() -> Self {
        Self {
            directory: None,
            max_local_builds_cached: default_max_local_builds_cached(),
        }
    }
}

/// Remote store settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteStoreConfig {
    pub url: String,
    #[serde(default)]
    pub save_to_remote: bool,
    #[serde(default = "default_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub request_timeout_ms: u64,
    /// spec.md §5: "an offline flag that turns every remote read into
    /// 'absent' and every remote write into a no-op with a log line".
    #[serde(default)]
    pub offline: bool,
}

fn default_timeout_ms() -> u64 {
    10_000
}

/// `configuration.*` (spec.md §4.2).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfiguration {
    #[serde(default)]
    pub local: LocalStoreConfig,
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote: Option<RemoteStoreConfig>,
    #[serde(default)]
    pub project_versioning: bool,
    #[serde(default)]
    pub attached_outputs: bool,
    #[serde(default = "default_hash_algorithm")]
    pub hash_algorithm: String,
    #[serde(default)]
    pub multi_module: bool,
}

fn default_hash_algorithm() -> String {
    "blake3".to_string()
}

impl Default for StoreConfiguration {
    fn default() -> Self {
        Self {
            local: LocalStoreConfig::default(),
            remote: None,
            project_versioning: false,
            attached_outputs: false,
            hash_algorithm: default_hash_algorithm(),
            multi_module: false,
        }
    }
}

/// The full parsed cache configuration (spec.md §4.2).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename = "cacheConfig")]
pub struct ConfigModel {
    #[serde(default)]
    pub global: GlobalInputConfig,
    #[serde(default)]
    pub plugins: Vec<PluginInputConfig>,
    #[serde(default)]
    pub execution_control: ExecutionControl,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub configuration: StoreConfiguration,
}

impl ConfigModel {
    /// Parse `maven-cache-config.xml` contents. Absent configuration is
    /// handled by the caller falling back to [`ConfigModel::default`], which
    /// enables caching with empty rules (spec.md §4.2 Defaults).
    pub fn parse_xml(xml: &str) -> Result<Self> {
        quick_xml::de::from_str(xml).map_err(|e| CacheError::Configuration {
            message: format!("parse maven-cache-config.xml: {e}"),
        })
    }

    pub fn to_xml(&self) -> Result<String> {
        quick_xml::se::to_string(self).map_err(|e| CacheError::Configuration {
            message: format!("serialize maven-cache-config.xml: {e}"),
        })
    }

    pub fn plugin_config_for(&self, plugin_id: &PluginId) -> Option<&PluginInputConfig> {
        self.plugins.iter().find(|p| p.plugin.matches(plugin_id, "", ""))
    }

    /// Compile `output.exclude.patterns` eagerly so later matching doesn't
    /// repeatedly recompile regexes and so a malformed pattern fails fast at
    /// `initialize` time rather than at the first artifact save.
    pub fn compile_output_excludes(&self) -> Result<Vec<Regex>> {
        self.output
            .exclude_patterns
            .iter()
            .map(|p| {
                Regex::new(p).map_err(|e| CacheError::Configuration {
                    message: format!("invalid output exclude pattern {p:?}: {e}"),
                })
            })
            .collect()
    }
}

/// Boolean-ish property parsing used by [`CacheProperties`]: `true` iff the
/// lowercased value equals `"true"` (spec.md §6).
fn parse_bool_property(value: &str) -> bool {
    value.eq_ignore_ascii_case("true")
}

/// Properties recognized at `initialize` time (spec.md §6), distinct from
/// the XML [`ConfigModel`]: these come from the build invocation (CLI
/// flags/system properties) and can override or supplement it.
#[derive(Debug, Clone)]
pub struct CacheProperties {
    pub enabled: bool,
    pub save_enabled: bool,
    pub save_final: bool,
    pub fail_fast: bool,
    pub baseline_url: Option<String>,
    pub lazy_restore: bool,
    pub restore_generated_sources: bool,
    pub config_path: Option<PathBuf>,
}

impl Default for CacheProperties {
    fn default() -> Self {
        Self {
            enabled: true,
            save_enabled: true,
            save_final: true,
            fail_fast: false,
            baseline_url: None,
            lazy_restore: false,
            restore_generated_sources: true,
            config_path: None,
        }
    }
}

impl CacheProperties {
    /// Build from the raw `remote.cache.*` string properties (spec.md §6).
    pub fn from_raw(raw: &std::collections::BTreeMap<String, String>) -> Self {
        let mut props = Self::default();
        if let Some(v) = raw.get("remote.cache.enabled") {
            props.enabled = parse_bool_property(v);
        }
        if let Some(v) = raw.get("remote.cache.save.enabled") {
            props.save_enabled = parse_bool_property(v);
        }
        if let Some(v) = raw.get("remote.cache.save.final") {
            props.save_final = parse_bool_property(v);
        }
        if let Some(v) = raw.get("remote.cache.failFast") {
            props.fail_fast = parse_bool_property(v);
        }
        if let Some(v) = raw.get("remote.cache.baselineUrl") {
            props.baseline_url = Some(v.clone());
        }
        if let Some(v) = raw.get("remote.cache.lazyRestore") {
            props.lazy_restore = parse_bool_property(v);
        }
        if let Some(v) = raw.get("remote.cache.restoreGeneratedSources") {
            props.restore_generated_sources = parse_bool_property(v);
        }
        if let Some(v) = raw.get("remote.cache.configPath") {
            props.config_path = Some(PathBuf::from(v));
        }
        props
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn pid(group: &str, artifact: &str) -> PluginId {
        PluginId { group: group.into(), artifact: artifact.into(), version: "1.0".into() }
    }

    #[test]
    fn plugin_rule_requires_artifact_match() {
        let rule = PluginRule { group: None, artifact: "compiler-plugin".into(), executions: None, goals: None };
        assert!(rule.matches(&pid("org.example", "compiler-plugin"), "default", "compile"));
        assert!(!rule.matches(&pid("org.example", "other-plugin"), "default", "compile"));
    }

    #[test]
    fn plugin_rule_group_is_optional_filter() {
        let rule = PluginRule {
            group: Some("org.example".into()),
            artifact: "compiler-plugin".into(),
            executions: None,
            goals: None,
        };
        assert!(rule.matches(&pid("org.example", "compiler-plugin"), "x", "y"));
        assert!(!rule.matches(&pid("org.other", "compiler-plugin"), "x", "y"));
    }

    #[test]
    fn plugin_rule_execution_and_goal_are_additional_filters() {
        let rule = PluginRule {
            group: None,
            artifact: "p".into(),
            executions: Some(vec!["default-generate".into()]),
            goals: Some(vec!["generate".into()]),
        };
        assert!(rule.matches(&pid("g", "p"), "default-generate", "generate"));
        assert!(!rule.matches(&pid("g", "p"), "other-execution", "generate"));
        assert!(!rule.matches(&pid("g", "p"), "default-generate", "other-goal"));
    }

    #[test]
    fn default_config_enables_caching_with_empty_rules() {
        let config = ConfigModel::default();
        assert!(config.plugins.is_empty());
        assert!(config.execution_control.ignore_missing.is_empty());
        assert!(!config.execution_control.reconcile_plugins.iter().any(|r| r.log_all));
    }

    #[test]
    fn boolean_properties_parse_case_insensitively() {
        assert!(parse_bool_property("true"));
        assert!(parse_bool_property("TRUE"));
        assert!(!parse_bool_property("false"));
        assert!(!parse_bool_property("yes"));
    }

    #[test]
    fn config_xml_round_trip() {
        let mut config = ConfigModel::default();
        config.configuration.hash_algorithm = "sha256".into();
        config.output.exclude_patterns.push(".*\\.tmp".into());

        let xml = config.to_xml().unwrap();
        let parsed = ConfigModel::parse_xml(&xml).unwrap();
        assert_eq!(parsed.configuration.hash_algorithm, "sha256");
        assert_eq!(parsed.output.exclude_patterns, vec![".*\\.tmp".to_string()]);
    }
}
