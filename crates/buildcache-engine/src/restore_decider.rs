//! `RestoreDecider` (spec.md §4.7): given a candidate [`BuildRecord`] and the
//! current session, decides whether it is usable. The decision is final for
//! the module for the rest of the build.

use buildcache_core::model::BuildRecord;
use buildcache_core::CACHE_IMPLEMENTATION_VERSION;

use crate::session::CacheSession;

/// Why a candidate record was rejected, or that it was accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreDecision {
    Usable,
    AlgorithmMismatch { record: String, current: String },
    VersionMismatch { record: String, current: String },
    UnsatisfiedReconcileProperty { property: String },
}

impl RestoreDecision {
    pub fn is_usable(&self) -> bool {
        matches!(self, RestoreDecision::Usable)
    }
}

pub struct RestoreDecider<'a> {
    session: &'a CacheSession,
}

impl<'a> RestoreDecider<'a> {
    pub fn new(session: &'a CacheSession) -> Self {
        Self { session }
    }

    /// spec.md §4.7's three rejection checks, in order; the first failing
    /// check wins.
    pub fn decide(&self, record: &BuildRecord) -> RestoreDecision {
        let current_algorithm = self.session.hash_engine().algorithm().identifier();
        if record.hash_algorithm != current_algorithm {
            return RestoreDecision::AlgorithmMismatch {
                record: record.hash_algorithm.clone(),
                current: current_algorithm.to_string(),
            };
        }

        if record.cache_implementation_version != CACHE_IMPLEMENTATION_VERSION {
            return RestoreDecision::VersionMismatch {
                record: record.cache_implementation_version.clone(),
                current: CACHE_IMPLEMENTATION_VERSION.to_string(),
            };
        }

        for step in &record.steps {
            let Some(rule) = self
                .session
                .config()
                .execution_control
                .reconcile_rule_for(&step.plugin_id, &step.execution_id, &step.goal)
            else {
                continue;
            };
            for tracked in &rule.reconciles {
                if step.tracked_properties.get(tracked).is_none() {
                    return RestoreDecision::UnsatisfiedReconcileProperty { property: tracked.clone() };
                }
            }
        }

        RestoreDecision::Usable
    }
}
