//! Data model (spec.md §3): the value types persisted and exchanged by the
//! caching engine. These are plain, immutable-once-built records; nothing
//! here owns I/O.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// `(group, artifact, version)`. Version participates in identification but
/// never in the fingerprint (spec.md §3).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ModuleId {
    #[serde(rename = "groupId")]
    pub group: String,
    #[serde(rename = "artifactId")]
    pub artifact: String,
    pub version: String,
}

impl ModuleId {
    pub fn new(group: impl Into<String>, artifact: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            artifact: artifact.into(),
            version: version.into(),
        }
    }

    /// Identity ignoring version, used wherever the fingerprint pipeline and
    /// cache paths key off `(group, artifact)` only.
    pub fn coordinates(&self) -> (&str, &str) {
        (&self.group, &self.artifact)
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.group, self.artifact, self.version)
    }
}

/// A plugin's own coordinates, used to identify [`StepExecutionRecord`]s and
/// to match them against configuration rules.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PluginId {
    #[serde(rename = "groupId")]
    pub group: String,
    #[serde(rename = "artifactId")]
    pub artifact: String,
    pub version: String,
}

impl fmt::Display for PluginId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.group, self.artifact, self.version)
    }
}

/// Opaque identifier for one top-level build run, used to scope
/// [`ProjectIndex`] persistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BuildId(pub Uuid);

impl BuildId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for BuildId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BuildId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One scanned input file (spec.md §3, §4.3).
///
/// `relativePath` is normalized to forward slashes and is unique within a
/// single scan result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputFileRecord {
    pub relative_path: String,
    /// Hex-encoded content digest; the algorithm is carried by the owning
    /// [`BuildRecord`]/scan session, not repeated per file.
    pub content_digest: String,
    pub size_bytes: u64,
}

/// A single named property, used for [`StepExecutionRecord`]'s tracked and
/// observed property lists. Represented as a list rather than a map so that
/// XML (de)serialization round-trips and ordering stays explicit (spec.md
/// §8's idempotence property requires deterministic property ordering).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    pub name: String,
    pub value: String,
}

/// An ordered, deterministic set of properties: sorted by name before
/// anything reads or serializes it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PropertyList(pub Vec<Property>);

impl PropertyList {
    pub fn from_map(map: BTreeMap<String, String>) -> Self {
        Self(
            map.into_iter()
                .map(|(name, value)| Property { name, value })
                .collect(),
        )
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.iter().find(|p| p.name == name).map(|p| p.value.as_str())
    }

    pub fn sort(&mut self) {
        self.0.sort_by(|a, b| a.name.cmp(&b.name));
    }

    pub fn iter(&self) -> impl Iterator<Item = &Property> {
        self.0.iter()
    }
}

/// `(pluginId, executionId, goal, configurationDigest, trackedProperties,
/// observedProperties)` (spec.md §3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepExecutionRecord {
    pub plugin_id: PluginId,
    pub execution_id: String,
    pub goal: String,
    pub configuration_digest: String,
    #[serde(default)]
    pub tracked_properties: PropertyList,
    #[serde(default)]
    pub observed_properties: PropertyList,
}

impl StepExecutionRecord {
    /// Identifies whether this record is the one a live build step
    /// corresponds to, per the `(pluginId, executionId, goal)` key used for
    /// pairing in reconciliation (spec.md §4.9) and lookup in the
    /// execution controller (spec.md §4.8).
    pub fn matches_step(&self, plugin_id: &PluginId, execution_id: &str, goal: &str) -> bool {
        &self.plugin_id == plugin_id && self.execution_id == execution_id && self.goal == goal
    }
}

/// One produced artifact file (spec.md §3). The primary artifact is
/// distinguished by `classifier == None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactEntry {
    pub filename: String,
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classifier: Option<String>,
    pub extension: String,
    pub content_digest: String,
    pub size_bytes: u64,
}

/// Where a [`BuildRecord`] originated, carried so restore/reconciliation
/// logic can tell a freshly-produced record from one pulled from a remote
/// peer or a reconciliation baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceTag {
    Local,
    Remote,
    Baseline,
}

/// An `(moduleId, fingerprint)` pair naming one upstream dependency's
/// published fingerprint, folded into a downstream module's own fingerprint
/// (spec.md §4.4).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamEntry {
    pub module_id: ModuleId,
    pub fingerprint: String,
}

/// The immutable record of one successful module build (spec.md §3, §6).
///
/// Steps are recorded in exact execution order; artifacts are referenced by
/// filename, path, digest and size so every reference in the record is
/// retrievable from the store that produced it (spec.md §8).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename = "buildInfo")]
pub struct BuildRecord {
    pub schema_version: String,
    pub cache_implementation_version: String,
    pub hash_algorithm: String,
    pub module_id: ModuleId,
    pub fingerprint: String,
    pub timestamp: String,
    pub source: SourceTag,
    #[serde(default)]
    pub steps: Vec<StepExecutionRecord>,
    #[serde(default)]
    pub artifacts: Vec<ArtifactEntry>,
    #[serde(default)]
    pub upstream: Vec<UpstreamEntry>,
}

impl BuildRecord {
    pub fn find_step(&self, plugin_id: &PluginId, execution_id: &str, goal: &str) -> Option<&StepExecutionRecord> {
        self.steps.iter().find(|s| s.matches_step(plugin_id, execution_id, goal))
    }

    pub fn primary_artifact(&self) -> Option<&ArtifactEntry> {
        self.artifacts.iter().find(|a| a.classifier.is_none())
    }

    /// Parse `build.xml` contents (spec.md §6).
    pub fn from_xml(xml: &str) -> crate::error::Result<Self> {
        quick_xml::de::from_str(xml).map_err(|e| crate::error::CacheError::Configuration {
            message: format!("parse build.xml: {e}"),
        })
    }

    pub fn to_xml(&self) -> crate::error::Result<String> {
        quick_xml::se::to_string(self).map_err(|e| crate::error::CacheError::Configuration {
            message: format!("serialize build.xml: {e}"),
        })
    }
}

/// One entry in a [`ProjectIndex`]: where a module's build record can be
/// found, keyed by [`ModuleId`] (spec.md §3, §4.10).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectIndexEntry {
    pub module_id: ModuleId,
    pub fingerprint: String,
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Per top-level build, the directory of every module's fingerprint and
/// store location, used as the baseline by downstream reconciliation runs
/// (spec.md §3, §4.10).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename = "cacheReport")]
pub struct ProjectIndex {
    pub build_id: String,
    #[serde(default)]
    pub projects: Vec<ProjectIndexEntry>,
}

impl ProjectIndex {
    pub fn find(&self, module_id: &ModuleId) -> Option<&ProjectIndexEntry> {
        self.projects.iter().find(|p| &p.module_id == module_id)
    }

    /// Parse `cache-report.xml` contents (spec.md §6).
    pub fn from_xml(xml: &str) -> crate::error::Result<Self> {
        quick_xml::de::from_str(xml).map_err(|e| crate::error::CacheError::Configuration {
            message: format!("parse cache-report.xml: {e}"),
        })
    }

    pub fn to_xml(&self) -> crate::error::Result<String> {
        quick_xml::se::to_string(self).map_err(|e| crate::error::CacheError::Configuration {
            message: format!("serialize cache-report.xml: {e}"),
        })
    }
}

/// How a reconciliation difference is classified (spec.md §4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiffSeverity {
    Error,
    Warn,
    Info,
}

/// One property that differs between a candidate step and its baseline
/// counterpart (spec.md §4.9, §6).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyDiffEntry {
    pub plugin_id: PluginId,
    pub execution_id: String,
    pub goal: String,
    pub property: String,
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baseline: Option<String>,
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current: Option<String>,
    pub severity: DiffSeverity,
}

/// The reconciliation diff between a candidate build and its baseline
/// (spec.md §4.9, `diff.xml` in §6).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename = "diff")]
pub struct Diff {
    pub module_id: ModuleId,
    pub paired_steps: usize,
    #[serde(default)]
    pub property_diffs: Vec<PropertyDiffEntry>,
}

impl Diff {
    pub fn has_errors(&self) -> bool {
        self.property_diffs.iter().any(|d| d.severity == DiffSeverity::Error)
    }

    /// Parse `diff.xml` contents (spec.md §6).
    pub fn from_xml(xml: &str) -> crate::error::Result<Self> {
        quick_xml::de::from_str(xml).map_err(|e| crate::error::CacheError::Configuration {
            message: format!("parse diff.xml: {e}"),
        })
    }

    pub fn to_xml(&self) -> crate::error::Result<String> {
        quick_xml::se::to_string(self).map_err(|e| crate::error::CacheError::Configuration {
            message: format!("serialize diff.xml: {e}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn property_list_sorts_deterministically() {
        let mut props = PropertyList(vec![
            Property { name: "b".into(), value: "2".into() },
            Property { name: "a".into(), value: "1".into() },
        ]);
        props.sort();
        assert_eq!(props.0[0].name, "a");
        assert_eq!(props.0[1].name, "b");
    }

    #[test]
    fn build_record_xml_round_trip() {
        let record = BuildRecord {
            schema_version: "1".into(),
            cache_implementation_version: "1".into(),
            hash_algorithm: "blake3".into(),
            module_id: ModuleId::new("org.example", "app", "1.0.0"),
            fingerprint: "abcd".into(),
            timestamp: "2026-07-31T00:00:00Z".into(),
            source: SourceTag::Local,
            steps: vec![StepExecutionRecord {
                plugin_id: PluginId { group: "org.example".into(), artifact: "plugin".into(), version: "1".into() },
                execution_id: "default".into(),
                goal: "compile".into(),
                configuration_digest: "deadbeef".into(),
                tracked_properties: PropertyList::from_map(BTreeMap::from([(
                    "javac.source".into(),
                    "11".into(),
                )])),
                observed_properties: PropertyList::default(),
            }],
            artifacts: vec![ArtifactEntry {
                filename: "app.jar".into(),
                classifier: None,
                extension: "jar".into(),
                content_digest: "cafef00d".into(),
                size_bytes: 1024,
            }],
            upstream: vec![],
        };

        let xml = quick_xml::se::to_string(&record).expect("serialize");
        let parsed: BuildRecord = quick_xml::de::from_str(&xml).expect("deserialize");
        assert_eq!(parsed, record);
    }

    #[test]
    fn module_id_coordinates_ignore_version() {
        let a = ModuleId::new("g", "a", "1.0.0");
        let b = ModuleId::new("g", "a", "2.0.0");
        assert_eq!(a.coordinates(), b.coordinates());
    }

    #[test]
    fn diff_xml_round_trip() {
        let diff = Diff {
            module_id: ModuleId::new("org.example", "app", "1.0.0"),
            paired_steps: 1,
            property_diffs: vec![PropertyDiffEntry {
                plugin_id: PluginId { group: "org.example".into(), artifact: "plugin".into(), version: "1".into() },
                execution_id: "default".into(),
                goal: "compile".into(),
                property: "javac.source".into(),
                baseline: Some("11".into()),
                current: Some("17".into()),
                severity: DiffSeverity::Error,
            }],
        };

        let xml = diff.to_xml().expect("serialize");
        let parsed = Diff::from_xml(&xml).expect("deserialize");
        assert_eq!(parsed, diff);
        assert!(parsed.has_errors());
    }
}
