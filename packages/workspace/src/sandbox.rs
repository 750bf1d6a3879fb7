//! Execution sandbox seam.
//!
//! The real sandbox runs a bundle in isolation and reports back only through
//! the [`EventChannel`]: `Start`, then exactly one of `Error`/`End`, with an
//! optional `Dependencies` report before `End`. Every report carries the
//! build id it was started with.

use nextbin_bundle::Bundle;
use nextbin_common::{BuildId, EventChannel, ModuleRef, SandboxEvent, SandboxReport};
use regex::Regex;
use std::collections::HashSet;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

pub trait Sandbox: Send + Sync {
    /// Start executing `bundle`. Must not block; progress is reported on
    /// `events`, tagged with `build`.
    fn execute(&self, build: BuildId, bundle: Arc<Bundle>, events: EventChannel);
}

/// Version reported for modules the manifest does not pin
pub const UNPINNED_VERSION: &str = "latest";

/// Sandbox that never runs code: it reports the modules a bundle imports
/// and finishes.
#[derive(Debug, Clone, Default)]
pub struct DryRunSandbox {
    duration: Duration,
}

impl DryRunSandbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pretend each run takes `duration`
    pub fn with_duration(duration: Duration) -> Self {
        Self { duration }
    }
}

impl Sandbox for DryRunSandbox {
    fn execute(&self, build: BuildId, bundle: Arc<Bundle>, events: EventChannel) {
        let duration = self.duration;
        let report = move |event| SandboxReport::new(build, event);
        tokio::spawn(async move {
            events.publish(&report(SandboxEvent::Start));
            if !duration.is_zero() {
                tokio::time::sleep(duration).await;
            }
            let modules = discover_modules(&bundle);
            tracing::debug!(build, count = modules.len(), "dry run finished");
            events.publish(&report(SandboxEvent::Dependencies(modules)));
            events.publish(&report(SandboxEvent::End));
        });
    }
}

fn import_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(?:\bfrom\s*|\bimport\s*\(?\s*|\brequire\s*\(\s*)["']([^"'\n]+)["']"#)
            .expect("import pattern is valid")
    })
}

/// Package name of an import specifier; `None` for relative or absolute paths
/// and URLs.
pub fn package_name(specifier: &str) -> Option<&str> {
    if specifier.starts_with('.') || specifier.starts_with('/') || specifier.contains("://") {
        return None;
    }

    let end = if specifier.starts_with('@') {
        // @scope/name/deep/path -> @scope/name
        let mut slashes = specifier.match_indices('/').map(|(i, _)| i);
        slashes.nth(1).unwrap_or(specifier.len())
    } else {
        specifier.find('/').unwrap_or(specifier.len())
    };

    let name = &specifier[..end];
    (!name.is_empty() && name != "@").then_some(name)
}

/// Modules imported by the bundle's source, in order of first use
pub fn discover_modules(bundle: &Bundle) -> Vec<ModuleRef> {
    let mut seen = HashSet::new();
    import_pattern()
        .captures_iter(bundle.raw_code())
        .filter_map(|caps| caps.get(1))
        .filter_map(|m| package_name(m.as_str()))
        .filter(|name| seen.insert(*name))
        .map(|name| {
            let version = bundle.declared_version(name).unwrap_or(UNPINNED_VERSION);
            ModuleRef::new(name, version)
        })
        .collect()
}
