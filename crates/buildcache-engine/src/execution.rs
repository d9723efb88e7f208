//! `ExecutionController` (spec.md §4.8): the per-step skip/execute/runAlways
//! decision, property reporting for reconciliation, and the per-module
//! state machine.

use std::collections::BTreeMap;

use buildcache_core::config::{ExecutionControl, PropertyClass};
use buildcache_core::model::{BuildRecord, PluginId, Property, PropertyList, StepExecutionRecord};

/// What the driver should do with one step invocation (spec.md §4.8 steps
/// 1-4).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepDecision {
    /// A `runAlways` rule matched; execute unconditionally.
    RunAlways,
    /// The module has a usable record and this step is in it; restore its
    /// recorded outputs and report success without executing.
    CacheHit(StepExecutionRecord),
    /// `ignoreMissing` matched and no record exists for this step; report
    /// success without executing and without restoring anything.
    Skipped,
    /// No rule and no cache hit applies; run the step.
    Execute,
}

pub struct ExecutionController<'a> {
    control: &'a ExecutionControl,
}

impl<'a> ExecutionController<'a> {
    pub fn new(control: &'a ExecutionControl) -> Self {
        Self { control }
    }

    /// Decides what to do with step `(plugin_id, execution_id, goal)`, given
    /// the module's current build record if one was found and judged usable
    /// (spec.md §4.8).
    pub fn decide(
        &self,
        plugin_id: &PluginId,
        execution_id: &str,
        goal: &str,
        build_record: Option<&BuildRecord>,
    ) -> StepDecision {
        if self.control.matches_run_always(plugin_id, execution_id, goal) {
            return StepDecision::RunAlways;
        }

        if let Some(record) = build_record {
            if let Some(step) = record.find_step(plugin_id, execution_id, goal) {
                return StepDecision::CacheHit(step.clone());
            }
        }

        if self.control.matches_ignore_missing(plugin_id, execution_id, goal) {
            return StepDecision::Skipped;
        }

        StepDecision::Execute
    }

    /// Builds the [`StepExecutionRecord`] to persist after a step executes
    /// (spec.md §4.8: "the ExecutionController asks the step to report a set
    /// of properties ... and records them in the new StepExecutionRecord").
    /// Properties are classified by the matching reconcile rule: `reconciles`
    /// entries become tracked properties, `logs`/`logAll` entries become
    /// observed (logged) properties, everything else is dropped. If no
    /// reconcile rule matches this step at all, it does not participate in
    /// reconciliation and both lists stay empty.
    pub fn record_step(
        &self,
        plugin_id: PluginId,
        execution_id: String,
        goal: String,
        configuration_digest: String,
        reported_properties: BTreeMap<String, String>,
    ) -> StepExecutionRecord {
        let mut tracked = Vec::new();
        let mut observed = Vec::new();

        if let Some(rule) = self.control.reconcile_rule_for(&plugin_id, &execution_id, &goal) {
            for (name, value) in reported_properties {
                match rule.classify(&name) {
                    PropertyClass::Tracked => tracked.push(Property { name, value }),
                    PropertyClass::Logged => observed.push(Property { name, value }),
                    PropertyClass::Ignored => {}
                }
            }
        }

        let mut tracked_properties = PropertyList(tracked);
        let mut observed_properties = PropertyList(observed);
        tracked_properties.sort();
        observed_properties.sort();

        StepExecutionRecord {
            plugin_id,
            execution_id,
            goal,
            configuration_digest,
            tracked_properties,
            observed_properties,
        }
    }
}

/// Per-module cache state machine (spec.md §4.8): `UNDECIDED → SCANNED →
/// LOOKED_UP → {HIT, MISS} → EXECUTED → {SAVED, SAVE_SKIPPED}`, terminal
/// `DONE`. A `HIT` module skips straight to `DONE` once artifacts are
/// restored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleState {
    Undecided,
    Scanned,
    LookedUp,
    Hit,
    Miss,
    Executed,
    Saved,
    SaveSkipped,
    Done,
}

/// Enforces the module state machine's legal transitions so a driver bug
/// (e.g. attempting to save before executing) fails loudly instead of
/// silently producing an inconsistent record.
#[derive(Debug, Clone, Copy)]
pub struct ModuleLifecycle {
    state: ModuleState,
}

impl Default for ModuleLifecycle {
    fn default() -> Self {
        Self { state: ModuleState::Undecided }
    }
}

impl ModuleLifecycle {
    pub fn state(&self) -> ModuleState {
        self.state
    }

    pub fn transition(&mut self, to: ModuleState) -> Result<(), IllegalTransition> {
        use ModuleState::*;
        let legal = matches!(
            (self.state, to),
            (Undecided, Scanned)
                | (Scanned, LookedUp)
                | (LookedUp, Hit)
                | (LookedUp, Miss)
                | (Hit, Done)
                | (Miss, Executed)
                | (Executed, Saved)
                | (Executed, SaveSkipped)
                | (Saved, Done)
                | (SaveSkipped, Done)
        );
        if !legal {
            return Err(IllegalTransition { from: self.state, to });
        }
        self.state = to;
        Ok(())
    }

    /// spec.md §4.8 failure semantics: "a restore failure in HIT path
    /// downgrades the module to MISS".
    pub fn downgrade_hit_to_miss(&mut self) -> Result<(), IllegalTransition> {
        if self.state != ModuleState::Hit {
            return Err(IllegalTransition { from: self.state, to: ModuleState::Miss });
        }
        self.state = ModuleState::Miss;
        Ok(())
    }
}

#[derive(Debug, derive_more::Display, derive_more::Error)]
#[display("illegal module state transition: {from:?} -> {to:?}")]
pub struct IllegalTransition {
    from: ModuleState,
    to: ModuleState,
}
