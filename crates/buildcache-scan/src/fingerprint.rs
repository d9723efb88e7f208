//! Project fingerprint computation (spec.md §4.4).
//!
//! `fingerprint = combine(algo, [`
//! `    hash(cacheImplementationVersion),`
//! `    hash(moduleId.group), hash(moduleId.artifact),`
//! `    hash(canonicalizedEffectiveDescriptorBytes),`
//! `    combine(algo, sorted[hash(plugin.coords) ++ hash(normalizedPluginConfigurationBytes)]),`
//! `    combine(algo, sorted[file.contentDigest] for file in InputScanner result),`
//! `    combine(algo, sortedByModuleId[upstream.fingerprint]) ])`

use quick_xml::events::Event;
use quick_xml::{Reader, Writer};

use buildcache_core::error::{CacheError, Result};
use buildcache_core::hash::{Fingerprint, HashEngine};
use buildcache_core::model::{InputFileRecord, ModuleId, PluginId, UpstreamEntry};

/// The effective build descriptor (Maven's effective POM, or this ecosystem's
/// analogue), canonicalized so that formatting-only differences between two
/// otherwise-identical descriptors never change the fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveDescriptor(Vec<u8>);

impl EffectiveDescriptor {
    /// Canonicalize raw descriptor XML: strip comments, collapse
    /// insignificant whitespace, sort attributes, and drop any `<properties>`
    /// child element named in `excluded_properties` (spec.md §4.2's
    /// `effectivePomExcludeProperties`, spec.md §4.4's canonicalization
    /// requirement).
    pub fn canonicalize(raw_xml: &str, excluded_properties: &[String]) -> Result<Self> {
        let mut reader = Reader::from_str(raw_xml);
        reader.config_mut().trim_text(true);
        let mut writer = Writer::new(Vec::new());

        // Depth tracking so we only drop direct children of <properties>,
        // not elements that merely share a name with an excluded property
        // elsewhere in the descriptor.
        let mut skip_depth: Option<usize> = None;
        let mut depth: usize = 0;
        let mut in_properties = false;
        let mut properties_depth: usize = 0;

        loop {
            let event = reader.read_event().map_err(|e| CacheError::Configuration {
                message: format!("canonicalize effective descriptor: {e}"),
            })?;

            match event {
                Event::Eof => break,
                Event::Comment(_) => continue,
                Event::Start(ref e) => {
                    depth += 1;
                    let name = e.local_name();
                    let name_str = String::from_utf8_lossy(name.as_ref()).into_owned();

                    if in_properties && depth == properties_depth + 1 && excluded_properties.iter().any(|p| p == &name_str) {
                        skip_depth = Some(depth);
                        continue;
                    }
                    if skip_depth.is_some() {
                        continue;
                    }
                    if name_str == "properties" {
                        in_properties = true;
                        properties_depth = depth;
                    }

                    let mut elem = quick_xml::events::BytesStart::new(String::from_utf8_lossy(e.name().as_ref()).into_owned());
                    let mut attrs: Vec<(String, String)> = e
                        .attributes()
                        .filter_map(|a| a.ok())
                        .map(|a| {
                            (
                                String::from_utf8_lossy(a.key.as_ref()).into_owned(),
                                String::from_utf8_lossy(&a.value).into_owned(),
                            )
                        })
                        .collect();
                    attrs.sort_by(|a, b| a.0.cmp(&b.0));
                    for (k, v) in attrs {
                        elem.push_attribute((k.as_str(), v.as_str()));
                    }
                    writer.write_event(Event::Start(elem)).ok();
                }
                Event::End(ref e) => {
                    if skip_depth == Some(depth) {
                        skip_depth = None;
                        depth -= 1;
                        continue;
                    }
                    if skip_depth.is_some() {
                        depth -= 1;
                        continue;
                    }
                    if in_properties && depth == properties_depth {
                        in_properties = false;
                    }
                    writer.write_event(Event::End(e.to_owned())).ok();
                    depth -= 1;
                }
                Event::Empty(ref e) => {
                    let name_str = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                    if in_properties && depth + 1 == properties_depth + 1 && excluded_properties.iter().any(|p| p == &name_str) {
                        continue;
                    }
                    if skip_depth.is_some() {
                        continue;
                    }
                    writer.write_event(Event::Empty(e.to_owned())).ok();
                }
                Event::Text(ref e) => {
                    if skip_depth.is_some() {
                        continue;
                    }
                    let text = e.unescape().unwrap_or_default();
                    let trimmed = text.trim();
                    if !trimmed.is_empty() {
                        writer
                            .write_event(Event::Text(quick_xml::events::BytesText::new(trimmed)))
                            .ok();
                    }
                }
                other => {
                    if skip_depth.is_none() {
                        writer.write_event(other).ok();
                    }
                }
            }
        }

        Ok(Self(writer.into_inner()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// One plugin execution's identity plus its normalized configuration bytes
/// (spec.md §4.4: "normalizedPluginConfigurationBytes" — sorted keys,
/// verbatim values unless excluded).
#[derive(Debug, Clone)]
pub struct PluginInvocation {
    pub plugin_id: PluginId,
    pub configuration_bytes: Vec<u8>,
}

pub struct ProjectFingerprinter {
    hash_engine: HashEngine,
}

impl ProjectFingerprinter {
    pub fn new(hash_engine: HashEngine) -> Self {
        Self { hash_engine }
    }

    /// Compute one module's fingerprint per spec.md §4.4's exact formula.
    pub fn fingerprint(
        &self,
        cache_implementation_version: &str,
        module_id: &ModuleId,
        effective_descriptor: &EffectiveDescriptor,
        plugins: &[PluginInvocation],
        input_files: &[InputFileRecord],
        upstream: &[UpstreamEntry],
    ) -> Fingerprint {
        let engine = &self.hash_engine;

        let version_fp = engine.hash_str(cache_implementation_version);
        let group_fp = engine.hash_str(&module_id.group);
        let artifact_fp = engine.hash_str(&module_id.artifact);
        let descriptor_fp = engine.hash(effective_descriptor.as_bytes());

        let mut plugin_fps: Vec<Fingerprint> = plugins
            .iter()
            .map(|p| {
                let coords_fp = engine.hash_str(&p.plugin_id.to_string());
                let config_fp = engine.hash(&p.configuration_bytes);
                engine.combine([&coords_fp, &config_fp])
            })
            .collect();
        plugin_fps.sort_by_key(|fp| fp.to_hex());
        let plugins_fp = engine.combine(plugin_fps.iter());

        let mut file_fps: Vec<Fingerprint> = input_files
            .iter()
            .map(|f| engine.hash_str(&f.content_digest))
            .collect();
        file_fps.sort_by_key(|fp| fp.to_hex());
        let inputs_fp = engine.combine(file_fps.iter());

        let mut upstream_sorted: Vec<&UpstreamEntry> = upstream.iter().collect();
        upstream_sorted.sort_by(|a, b| a.module_id.cmp(&b.module_id));
        let upstream_fps: Vec<Fingerprint> = upstream_sorted
            .into_iter()
            .map(|u| engine.hash_str(&u.fingerprint))
            .collect();
        let upstream_fp = engine.combine(upstream_fps.iter());

        engine.combine([&version_fp, &group_fp, &artifact_fp, &descriptor_fp, &plugins_fp, &inputs_fp, &upstream_fp])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use buildcache_core::hash::Algorithm;

    fn module(artifact: &str) -> ModuleId {
        ModuleId::new("org.example", artifact, "1.0.0")
    }

    fn descriptor(xml: &str) -> EffectiveDescriptor {
        EffectiveDescriptor::canonicalize(xml, &[]).unwrap()
    }

    #[test]
    fn canonicalization_drops_excluded_properties() {
        let xml = "<project><properties><build.timestamp>12345</build.timestamp><version>1</version></properties></project>";
        let canonical =
            EffectiveDescriptor::canonicalize(xml, &["build.timestamp".to_string()]).unwrap();
        let text = String::from_utf8(canonical.as_bytes().to_vec()).unwrap();
        assert!(!text.contains("build.timestamp"));
        assert!(text.contains("version"));
    }

    #[test]
    fn canonicalization_strips_comments_and_whitespace() {
        let a = EffectiveDescriptor::canonicalize("<project>  <!-- note --> <name>x</name>  </project>", &[]).unwrap();
        let b = EffectiveDescriptor::canonicalize("<project><name>x</name></project>", &[]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn fingerprint_is_deterministic() {
        let engine = HashEngine::new(Algorithm::Blake3);
        let fp = ProjectFingerprinter::new(engine);
        let desc = descriptor("<project/>");

        let a = fp.fingerprint("1", &module("app"), &desc, &[], &[], &[]);
        let b = fp.fingerprint("1", &module("app"), &desc, &[], &[], &[]);
        assert_eq!(a, b);
    }

    #[test]
    fn fingerprint_changes_when_a_plugin_invocation_is_added() {
        let engine = HashEngine::new(Algorithm::Blake3);
        let fp = ProjectFingerprinter::new(engine);
        let desc = descriptor("<project/>");

        let without = fp.fingerprint("1", &module("app"), &desc, &[], &[], &[]);
        let invocation = PluginInvocation {
            plugin_id: PluginId { group: "org.example".into(), artifact: "plugin".into(), version: "1".into() },
            configuration_bytes: b"debug=true".to_vec(),
        };
        let with = fp.fingerprint("1", &module("app"), &desc, &[invocation], &[], &[]);
        assert_ne!(without, with);
    }

    #[test]
    fn fingerprint_is_independent_of_input_file_enumeration_order() {
        let engine = HashEngine::new(Algorithm::Blake3);
        let fp = ProjectFingerprinter::new(engine);
        let desc = descriptor("<project/>");

        let a = InputFileRecord { relative_path: "a.txt".into(), content_digest: "aaa".into(), size_bytes: 1 };
        let b = InputFileRecord { relative_path: "b.txt".into(), content_digest: "bbb".into(), size_bytes: 1 };

        let first = fp.fingerprint("1", &module("app"), &desc, &[], &[a.clone(), b.clone()], &[]);
        let second = fp.fingerprint("1", &module("app"), &desc, &[], &[b, a], &[]);
        assert_eq!(first, second);
    }

    #[test]
    fn fingerprint_changes_when_upstream_fingerprint_changes() {
        let engine = HashEngine::new(Algorithm::Blake3);
        let fp = ProjectFingerprinter::new(engine);
        let desc = descriptor("<project/>");

        let upstream_a = UpstreamEntry { module_id: module("lib"), fingerprint: "aaaa".into() };
        let upstream_b = UpstreamEntry { module_id: module("lib"), fingerprint: "bbbb".into() };

        let a = fp.fingerprint("1", &module("app"), &desc, &[], &[], &[upstream_a]);
        let b = fp.fingerprint("1", &module("app"), &desc, &[], &[], &[upstream_b]);
        assert_ne!(a, b);
    }

    #[test]
    fn fingerprint_differs_across_modules_with_same_inputs() {
        let engine = HashEngine::new(Algorithm::Blake3);
        let fp = ProjectFingerprinter::new(engine);
        let desc = descriptor("<project/>");

        let a = fp.fingerprint("1", &module("app-a"), &desc, &[], &[], &[]);
        let b = fp.fingerprint("1", &module("app-b"), &desc, &[], &[], &[]);
        assert_ne!(a, b);
    }
}
