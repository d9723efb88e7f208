//! `Reporter` (spec.md §4.10): aggregates per-module outcomes into a
//! [`ProjectIndex`] and persists it once per top-level build via
//! [`CacheRepository::save_report`].

use buildcache_core::model::{BuildId, ModuleId, ProjectIndex, ProjectIndexEntry};

use crate::repository::CacheRepository;
use crate::session::CacheSession;

/// Collects `(moduleId, fingerprint)` entries over the course of a build and
/// writes one [`ProjectIndex`] at the end, per spec.md §8's idempotence
/// property: identical inputs in identical order produce identical bytes.
pub struct Reporter {
    build_id: BuildId,
    entries: Vec<ProjectIndexEntry>,
}

impl Reporter {
    pub fn new(build_id: BuildId) -> Self {
        Self { build_id, entries: Vec::new() }
    }

    /// Records one module's final fingerprint, and the URL it can be found
    /// at on the remote store if one is configured (spec.md §4.10).
    pub fn record_module(&mut self, module_id: ModuleId, fingerprint_hex: String, remote_url: Option<String>) {
        self.entries.push(ProjectIndexEntry { module_id, fingerprint: fingerprint_hex, url: remote_url });
    }

    /// Builds the index in deterministic `(group, artifact)` order and
    /// writes it through the given session's repository (spec.md §4.6,
    /// §4.10: "onBuildComplete" writes the report exactly once).
    pub async fn finish(mut self, session: &CacheSession) -> buildcache_core::error::Result<ProjectIndex> {
        self.entries.sort_by(|a, b| a.module_id.cmp(&b.module_id));
        let index = ProjectIndex { build_id: self.build_id.to_string(), projects: self.entries };

        CacheRepository::new(session).save_report(&index).await?;
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn finish_sorts_entries_deterministically() {
        let session = crate::session::test_session(Default::default());
        let mut reporter = Reporter::new(BuildId::new());
        reporter.record_module(ModuleId::new("org.example", "zeta", "1.0.0"), "ffff".into(), None);
        reporter.record_module(ModuleId::new("org.example", "alpha", "1.0.0"), "aaaa".into(), None);

        let index = reporter.finish(&session).await.unwrap();
        assert_eq!(index.projects[0].module_id.artifact, "alpha");
        assert_eq!(index.projects[1].module_id.artifact, "zeta");
    }

    #[tokio::test]
    async fn finish_persists_a_readable_report() {
        let session = crate::session::test_session(Default::default());
        let mut reporter = Reporter::new(BuildId::new());
        reporter.record_module(ModuleId::new("org.example", "app", "1.0.0"), "abcd".into(), None);
        let index = reporter.finish(&session).await.unwrap();

        let path = session.local_store().root().join("reports").join(format!("{}.xml", index.build_id));
        let xml = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(ProjectIndex::from_xml(&xml).unwrap(), index);
    }
}
