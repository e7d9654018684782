//! Integration tests for host wiring.
//!
//! These tests verify that the host can load the bundled mods from disk using
//! its configuration, and that mods it does not know about fail in isolation.

use mod_dummy::DummyApi;
use modweave_api::LoadStage;
use modweave_host::bootstrap::{build_loader, builtin_entries};
use modweave_host::config::Config;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn bundled_mods_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../mods")
}

fn write_mod(dir: &Path, folder: &str, descriptor: &str) {
    let mod_dir = dir.join(folder);
    std::fs::create_dir_all(&mod_dir).unwrap();
    std::fs::write(mod_dir.join("mod.toml"), descriptor).unwrap();
}

#[test]
fn test_builtin_entries_include_dummy() {
    let entries = builtin_entries();
    assert!(entries.contains(mod_dummy::ENTRY_POINT));
}

#[test]
fn test_load_bundled_mods() {
    let config = Config::default();
    let mut loader = build_loader(&config, bundled_mods_dir());

    let report = loader.initialize(&config.host.game_version).unwrap();

    assert_eq!(report.loaded, vec!["modweave:dummy"]);
    let api = loader
        .interactor()
        .mod_api::<DummyApi>("modweave:dummy")
        .unwrap();
    assert_eq!(api.greeting(), "Hello from the dummy mod");

    let unload = loader.unload_all();
    assert_eq!(unload.unloaded, vec!["modweave:dummy"]);
}

#[test]
fn test_unknown_entry_fails_in_isolation() {
    let temp_dir = TempDir::new().unwrap();
    write_mod(
        temp_dir.path(),
        "dummy",
        r#"
[mod]
id = "modweave:dummy"
version = "0.1.0"
entry_point = "modweave:dummy"
"#,
    );
    write_mod(
        temp_dir.path(),
        "native",
        r#"
[mod]
id = "native:thing"
version = "1.0.0"
entry_point = "lib:libthing.so"
"#,
    );

    let config = Config::default();
    let mut loader = build_loader(&config, temp_dir.path());
    let report = loader.initialize("1.0.0").unwrap();

    assert_eq!(report.loaded, vec!["modweave:dummy"]);
    let failure = report.failure("native:thing").unwrap();
    assert_eq!(failure.stage, LoadStage::EntryPoint);
}

#[test]
fn test_explicit_policy_from_config() {
    let temp_dir = TempDir::new().unwrap();
    write_mod(
        temp_dir.path(),
        "dummy",
        r#"
permissions = ["event_listen", "mod_interact"]

[mod]
id = "modweave:dummy"
version = "0.1.0"
entry_point = "modweave:dummy"
"#,
    );

    let mut config = Config::default();
    config.permissions.explicit = true;
    config.permissions.granted = Some(vec!["event_listen".to_string()]);

    let mut loader = build_loader(&config, temp_dir.path());
    let report = loader.initialize("1.0.0").unwrap();

    assert!(report.loaded.is_empty());
    assert_eq!(
        report.failure("modweave:dummy").unwrap().stage,
        LoadStage::Permissions
    );
}

#[test]
fn test_game_version_filter() {
    let config = Config::default();
    let mut loader = build_loader(&config, bundled_mods_dir());

    let report = loader.initialize("2.0.0").unwrap();

    assert!(report.loaded.is_empty());
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].id, "modweave:dummy");
}
