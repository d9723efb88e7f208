//! Input enumeration (spec.md §4.3).
//!
//! Walks the configured global roots plus every plugin's configured scan
//! directories, filters by include/exclude/output-exclude patterns, hashes
//! what's left, and returns a sorted, duplicate-free list of
//! [`InputFileRecord`]s — independent of filesystem enumeration order.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use glob::Pattern;
use regex::Regex;
use tracing::{instrument, trace, warn};

use buildcache_core::config::{ConfigModel, PluginInputConfig};
use buildcache_core::error::{CacheError, Result};
use buildcache_core::hash::HashEngine;
use buildcache_core::model::{InputFileRecord, PluginId};

/// Directory names excluded from every scan regardless of configuration,
/// implementing spec.md §4.2's "default glob selects all regular files
/// under module root excluding build output directories".
const ALWAYS_EXCLUDED_DIRS: &[&str] = &["target", "build", ".git", "node_modules", ".cache"];

const STREAM_BUFFER_SIZE: usize = 64 * 1024;

pub struct InputScanner<'a> {
    config: &'a ConfigModel,
    hash_engine: &'a HashEngine,
    output_excludes: Vec<Regex>,
}

impl<'a> InputScanner<'a> {
    pub fn new(config: &'a ConfigModel, hash_engine: &'a HashEngine) -> Result<Self> {
        let output_excludes = config.compile_output_excludes()?;
        Ok(Self { config, hash_engine, output_excludes })
    }

    /// Scan one module's inputs: the global roots plus every configured
    /// plugin's scan directories (spec.md §4.3 steps 1-5).
    #[instrument(skip(self, plugins))]
    pub fn scan(&self, module_root: &Path, plugins: &[PluginId]) -> Result<Vec<InputFileRecord>> {
        let module_root = module_root
            .canonicalize()
            .map_err(|e| CacheError::InputIo { path: module_root.to_path_buf(), source: e })?;

        let mut candidates: BTreeMap<String, PathBuf> = BTreeMap::new();

        self.walk_into(&module_root, &module_root, &mut candidates)?;

        for plugin_id in plugins {
            if let Some(plugin_config) = self.config.plugin_config_for(plugin_id) {
                self.collect_plugin_dirs(&module_root, plugin_config, &mut candidates)?;
            }
        }

        let includes = self.compile_patterns(&self.config.global.includes)?;
        let excludes = self.compile_patterns(&self.config.global.excludes)?;

        let mut records = Vec::with_capacity(candidates.len());
        for (relative_path, absolute_path) in candidates {
            if self.is_excluded(&relative_path, &excludes) {
                trace!(%relative_path, "excluded by global exclude");
                continue;
            }
            if !includes.is_empty() && !self.is_included(&relative_path, &includes) {
                trace!(%relative_path, "not matched by global include");
                continue;
            }
            if self.output_excludes.iter().any(|re| re.is_match(&relative_path)) {
                trace!(%relative_path, "excluded by output.exclude.patterns");
                continue;
            }

            let (content_digest, size_bytes) = self.hash_file(&absolute_path)?;
            records.push(InputFileRecord {
                relative_path,
                content_digest: content_digest.to_hex(),
                size_bytes,
            });
        }

        // Step 5: sort lexicographically by relativePath (spec.md §3, §4.3, §8).
        records.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        Ok(records)
    }

    fn collect_plugin_dirs(
        &self,
        module_root: &Path,
        plugin_config: &PluginInputConfig,
        candidates: &mut BTreeMap<String, PathBuf>,
    ) -> Result<()> {
        if let Some(dir_scan) = &plugin_config.dir_scan {
            for include in &dir_scan.includes {
                let path = module_root.join(include);
                if path.exists() {
                    self.walk_into(module_root, &path, candidates)?;
                }
            }
        }
        for per_execution in &plugin_config.per_execution_dir_scan {
            for include in &per_execution.dir_scan.includes {
                let path = module_root.join(include);
                if path.exists() {
                    self.walk_into(module_root, &path, candidates)?;
                }
            }
        }
        Ok(())
    }

    /// Walk `start` (a file or directory) relative to `module_root`, adding
    /// every regular file found to `candidates`, keyed by normalized
    /// forward-slash relative path (spec.md §3: paths are unique within a
    /// scan result; a `BTreeMap` enforces that for free and sorts as a
    /// side effect, though we re-sort explicitly in `scan` since
    /// `relative_path` is recomputed there).
    fn walk_into(&self, module_root: &Path, start: &Path, candidates: &mut BTreeMap<String, PathBuf>) -> Result<()> {
        let follow_links = self.config.global.follow_symlinks;

        let walker = jwalk::WalkDir::new(start).follow_links(follow_links).skip_hidden(false);

        for entry in walker {
            let entry = entry.map_err(|e| CacheError::InputIo {
                path: start.to_path_buf(),
                source: std::io::Error::other(e.to_string()),
            })?;

            if entry.file_type().is_symlink() && !follow_links {
                continue;
            }
            if !entry.file_type().is_file() {
                continue;
            }

            let abs_path = entry.path();

            if follow_links {
                let canonical = abs_path.canonicalize().map_err(|e| CacheError::InputIo {
                    path: abs_path.clone(),
                    source: e,
                })?;
                if !canonical.starts_with(module_root) {
                    return Err(CacheError::InputIo {
                        path: abs_path.clone(),
                        source: std::io::Error::other("symlink target escapes module root"),
                    });
                }
            }

            if path_contains_excluded_dir(module_root, &abs_path) {
                continue;
            }

            let relative = abs_path.strip_prefix(module_root).unwrap_or(&abs_path);
            let normalized = normalize_relative_path(relative);
            candidates.insert(normalized, abs_path);
        }

        Ok(())
    }

    fn compile_patterns(&self, patterns: &[String]) -> Result<Vec<Pattern>> {
        patterns
            .iter()
            .map(|p| {
                Pattern::new(p).map_err(|e| CacheError::Configuration {
                    message: format!("invalid glob pattern {p:?}: {e}"),
                })
            })
            .collect()
    }

    fn is_excluded(&self, relative_path: &str, excludes: &[Pattern]) -> bool {
        excludes.iter().any(|p| p.matches(relative_path))
    }

    fn is_included(&self, relative_path: &str, includes: &[Pattern]) -> bool {
        includes.iter().any(|p| p.matches(relative_path))
    }

    /// Stream-hash a file block-wise (spec.md §4.3 Constraints: "file reads
    /// are streaming").
    fn hash_file(&self, path: &Path) -> Result<(buildcache_core::hash::Fingerprint, u64)> {
        let mut file = File::open(path).map_err(|e| CacheError::InputIo { path: path.to_path_buf(), source: e })?;
        let mut hasher = self.hash_engine.new_hasher();
        let mut buffer = vec![0u8; STREAM_BUFFER_SIZE];
        let mut size = 0u64;

        loop {
            let n = file
                .read(&mut buffer)
                .map_err(|e| CacheError::InputIo { path: path.to_path_buf(), source: e })?;
            if n == 0 {
                break;
            }
            hasher.update(&buffer[..n]);
            size += n as u64;
        }

        Ok((hasher.finish(), size))
    }
}

fn path_contains_excluded_dir(module_root: &Path, abs_path: &Path) -> bool {
    let relative = abs_path.strip_prefix(module_root).unwrap_or(abs_path);
    relative.components().any(|c| {
        c.as_os_str()
            .to_str()
            .map(|s| ALWAYS_EXCLUDED_DIRS.contains(&s))
            .unwrap_or(false)
    })
}

fn normalize_relative_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Logs a WARN when an [`InputIoError`](CacheError::InputIo) degrades the
/// module to MISS + forced execution (spec.md §4.3 Failure mode).
pub fn warn_scan_failure(module: &str, error: &CacheError) {
    warn!(module, %error, "input scan failed; degrading module to miss with forced execution");
}
