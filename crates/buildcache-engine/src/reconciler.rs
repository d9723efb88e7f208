//! `Reconciler` (spec.md §4.9): pairs a candidate build's steps against a
//! baseline build's steps by `(pluginId, executionId, goal)` and classifies
//! every differing property by the matching reconcile rule.

use buildcache_core::config::{ExecutionControl, PropertyClass};
use buildcache_core::model::{BuildRecord, Diff, DiffSeverity, PropertyDiffEntry, StepExecutionRecord};

pub struct Reconciler<'a> {
    control: &'a ExecutionControl,
}

impl<'a> Reconciler<'a> {
    pub fn new(control: &'a ExecutionControl) -> Self {
        Self { control }
    }

    /// Pairs `candidate`'s steps against `baseline`'s by `(pluginId,
    /// executionId, goal)` and computes the symmetric property diff for each
    /// paired step, classified by the matching reconcile rule: `reconciles`
    /// entries that differ are ERROR, `logs`/`logAll` entries that differ are
    /// WARN/INFO respectively, `nologs` entries are never reported (spec.md
    /// §4.9).
    pub fn reconcile(&self, candidate: &BuildRecord, baseline: &BuildRecord) -> Diff {
        let mut paired_steps = 0;
        let mut property_diffs = Vec::new();

        for step in &candidate.steps {
            let Some(baseline_step) = baseline.find_step(&step.plugin_id, &step.execution_id, &step.goal) else {
                continue;
            };
            paired_steps += 1;

            let Some(rule) = self.control.reconcile_rule_for(&step.plugin_id, &step.execution_id, &step.goal) else {
                continue;
            };

            for name in symmetric_property_names(step, baseline_step) {
                let current = step.tracked_properties.get(&name).or_else(|| step.observed_properties.get(&name));
                let baseline_value = baseline_step
                    .tracked_properties
                    .get(&name)
                    .or_else(|| baseline_step.observed_properties.get(&name));

                if current == baseline_value {
                    continue;
                }

                let severity = match rule.classify(&name) {
                    PropertyClass::Tracked => DiffSeverity::Error,
                    PropertyClass::Logged => {
                        if rule.logs.contains(&name) {
                            DiffSeverity::Warn
                        } else {
                            DiffSeverity::Info
                        }
                    }
                    PropertyClass::Ignored => continue,
                };

                property_diffs.push(PropertyDiffEntry {
                    plugin_id: step.plugin_id.clone(),
                    execution_id: step.execution_id.clone(),
                    goal: step.goal.clone(),
                    property: name,
                    baseline: baseline_value.map(str::to_string),
                    current: current.map(str::to_string),
                    severity,
                });
            }
        }

        property_diffs.sort_by(|a, b| (&a.execution_id, &a.goal, &a.property).cmp(&(&b.execution_id, &b.goal, &b.property)));

        Diff {
            module_id: candidate.module_id.clone(),
            paired_steps,
            property_diffs,
        }
    }
}

fn symmetric_property_names(a: &StepExecutionRecord, b: &StepExecutionRecord) -> Vec<String> {
    let mut names: Vec<String> = a
        .tracked_properties
        .iter()
        .chain(a.observed_properties.iter())
        .chain(b.tracked_properties.iter())
        .chain(b.observed_properties.iter())
        .map(|p| p.name.clone())
        .collect();
    names.sort();
    names.dedup();
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use buildcache_core::config::{PluginRule, ReconcilePluginRule};
    use buildcache_core::model::{ModuleId, PluginId, Property, PropertyList, SourceTag};

    fn plugin() -> PluginId {
        PluginId { group: "org.example".into(), artifact: "compiler-plugin".into(), version: "1".into() }
    }

    fn step(tracked: Vec<(&str, &str)>, observed: Vec<(&str, &str)>) -> StepExecutionRecord {
        StepExecutionRecord {
            plugin_id: plugin(),
            execution_id: "default-compile".into(),
            goal: "compile".into(),
            configuration_digest: "x".into(),
            tracked_properties: PropertyList(tracked.into_iter().map(|(n, v)| Property { name: n.into(), value: v.into() }).collect()),
            observed_properties: PropertyList(observed.into_iter().map(|(n, v)| Property { name: n.into(), value: v.into() }).collect()),
        }
    }

    fn record(module_id: ModuleId, steps: Vec<StepExecutionRecord>) -> BuildRecord {
        BuildRecord {
            schema_version: "1".into(),
            cache_implementation_version: "1".into(),
            hash_algorithm: "blake3".into(),
            module_id,
            fingerprint: "abcd".into(),
            timestamp: "2026-07-31T00:00:00Z".into(),
            source: SourceTag::Local,
            steps,
            artifacts: vec![],
            upstream: vec![],
        }
    }

    fn control_with_rule(reconciles: Vec<&str>, logs: Vec<&str>, nologs: Vec<&str>, log_all: bool) -> ExecutionControl {
        let mut control = ExecutionControl::default();
        control.reconcile_plugins.push(ReconcilePluginRule {
            plugin: PluginRule { group: None, artifact: "compiler-plugin".into(), executions: None, goals: None },
            reconciles: reconciles.into_iter().map(String::from).collect(),
            logs: logs.into_iter().map(String::from).collect(),
            nologs: nologs.into_iter().map(String::from).collect(),
            log_all,
        });
        control
    }

    #[test]
    fn differing_tracked_property_is_an_error() {
        let control = control_with_rule(vec!["javac.source"], vec![], vec![], false);
        let module_id = ModuleId::new("org.example", "app", "1.0.0");
        let candidate = record(module_id.clone(), vec![step(vec![("javac.source", "17")], vec![])]);
        let baseline = record(module_id, vec![step(vec![("javac.source", "11")], vec![])]);

        let diff = Reconciler::new(&control).reconcile(&candidate, &baseline);
        assert_eq!(diff.paired_steps, 1);
        assert_eq!(diff.property_diffs.len(), 1);
        assert_eq!(diff.property_diffs[0].severity, DiffSeverity::Error);
        assert!(diff.has_errors());
    }

    #[test]
    fn differing_logged_property_is_a_warning() {
        let control = control_with_rule(vec![], vec!["javac.debug"], vec![], false);
        let module_id = ModuleId::new("org.example", "app", "1.0.0");
        let candidate = record(module_id.clone(), vec![step(vec![], vec![("javac.debug", "false")])]);
        let baseline = record(module_id, vec![step(vec![], vec![("javac.debug", "true")])]);

        let diff = Reconciler::new(&control).reconcile(&candidate, &baseline);
        assert_eq!(diff.property_diffs[0].severity, DiffSeverity::Warn);
        assert!(!diff.has_errors());
    }

    #[test]
    fn nolog_property_is_never_reported() {
        let control = control_with_rule(vec![], vec![], vec!["javac.timestamp"], true);
        let module_id = ModuleId::new("org.example", "app", "1.0.0");
        let candidate = record(module_id.clone(), vec![step(vec![], vec![("javac.timestamp", "2")])]);
        let baseline = record(module_id, vec![step(vec![], vec![("javac.timestamp", "1")])]);

        let diff = Reconciler::new(&control).reconcile(&candidate, &baseline);
        assert!(diff.property_diffs.is_empty());
    }

    #[test]
    fn log_all_catches_untracked_untagged_differences_as_info() {
        let control = control_with_rule(vec![], vec![], vec![], true);
        let module_id = ModuleId::new("org.example", "app", "1.0.0");
        let candidate = record(module_id.clone(), vec![step(vec![], vec![("javac.encoding", "UTF-8")])]);
        let baseline = record(module_id, vec![step(vec![], vec![("javac.encoding", "ASCII")])]);

        let diff = Reconciler::new(&control).reconcile(&candidate, &baseline);
        assert_eq!(diff.property_diffs[0].severity, DiffSeverity::Info);
    }

    #[test]
    fn unpaired_steps_are_not_counted() {
        let control = ExecutionControl::default();
        let module_id = ModuleId::new("org.example", "app", "1.0.0");
        let mut candidate_step = step(vec![], vec![]);
        candidate_step.execution_id = "other".into();
        let candidate = record(module_id.clone(), vec![candidate_step]);
        let baseline = record(module_id, vec![step(vec![], vec![])]);

        let diff = Reconciler::new(&control).reconcile(&candidate, &baseline);
        assert_eq!(diff.paired_steps, 0);
        assert!(diff.property_diffs.is_empty());
    }
}
