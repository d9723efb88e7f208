//! Input enumeration and project fingerprinting (spec.md §4.3, §4.4).
//!
//! This crate has no store/network dependency: given a module root, a
//! parsed configuration, and the upstream fingerprints already computed for
//! a module's dependencies, it produces the deterministic fingerprint that
//! the rest of the engine uses as a cache key.

pub mod fingerprint;
pub mod scan;

pub use fingerprint::{EffectiveDescriptor, PluginInvocation, ProjectFingerprinter};
pub use scan::InputScanner;
