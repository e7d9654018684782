//! Wiring of the mod loader from a host configuration.

use crate::config::Config;
use modweave_api::{BuiltinEntryLoader, LoadReport, ModLoader, UnloadReport};
use modweave_runtime::DirectorySource;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Entry loader holding every mod compiled into the host.
pub fn builtin_entries() -> BuiltinEntryLoader {
    let mut entries = BuiltinEntryLoader::new();
    mod_dummy::register(&mut entries);
    entries
}

/// Build a loader that scans `mods_dir` with the policy from `config`.
pub fn build_loader(config: &Config, mods_dir: impl Into<PathBuf>) -> ModLoader {
    ModLoader::new(
        DirectorySource::new(mods_dir),
        Arc::new(builtin_entries()),
    )
    .with_permissions(config.permission_manager())
    .with_resolver(config.resolver())
}

/// Log the outcome of a load in a human-readable form.
pub fn log_load_report(report: &LoadReport) {
    for id in &report.loaded {
        info!("  loaded  {}", id);
    }
    for skipped in &report.skipped {
        warn!("  skipped {}: {}", skipped.id, skipped.reason);
    }
    for failed in &report.failed {
        warn!("  failed  {} ({}): {}", failed.id, failed.stage, failed.error);
    }
    for warning in &report.warnings {
        warn!("  warning {}", warning);
    }
}

pub fn log_unload_report(report: &UnloadReport) {
    info!("Unloaded {} mod(s)", report.unloaded.len());
    for (id, reason) in &report.errors {
        warn!("  {} did not unload cleanly: {}", id, reason);
    }
}
