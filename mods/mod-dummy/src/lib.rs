//! # mod-dummy
//!
//! A dummy mod compiled into the host for testing and development.
//!
//! The mod does not touch any game content. It reads a greeting from its
//! `[config]` table, listens for [`LoadingComplete`], and exposes a
//! [`DummyApi`] that other mods (and tests) can query through the mod
//! interactor.

use chrono::{DateTime, Utc};
use modweave_api::{BuiltinEntryLoader, Capability, LoadingComplete, ModContext, ModEntry};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Entry point name this mod is registered under.
pub const ENTRY_POINT: &str = "modweave:dummy";

const DEFAULT_GREETING: &str = "Hello from the dummy mod";

/// API the dummy mod exposes to other mods.
#[derive(Debug)]
pub struct DummyApi {
    greeting: String,
    initialized_at: DateTime<Utc>,
    mods_seen: AtomicUsize,
}

impl DummyApi {
    pub fn greeting(&self) -> &str {
        &self.greeting
    }

    pub fn initialized_at(&self) -> DateTime<Utc> {
        self.initialized_at
    }

    /// Number of mods loaded when loading last completed, if it has.
    pub fn mods_seen(&self) -> usize {
        self.mods_seen.load(Ordering::Relaxed)
    }
}

/// A mod that greets, listens and exposes a tiny API.
#[derive(Debug, Default)]
pub struct DummyMod {
    api: Option<Arc<DummyApi>>,
}

impl ModEntry for DummyMod {
    fn on_init(&mut self, ctx: &ModContext) -> anyhow::Result<()> {
        let greeting = ctx
            .config()
            .get("greeting")
            .and_then(|v| v.as_str())
            .unwrap_or(DEFAULT_GREETING)
            .to_string();

        let api = Arc::new(DummyApi {
            greeting,
            initialized_at: Utc::now(),
            mods_seen: AtomicUsize::new(0),
        });
        ctx.logger().info(api.greeting());

        if ctx.has_capability(Capability::EventListen) {
            let listener_api = Arc::clone(&api);
            ctx.subscribe(move |event: &mut LoadingComplete| {
                listener_api.mods_seen.store(event.loaded, Ordering::Relaxed);
                Ok(())
            })?;
        } else {
            ctx.logger()
                .warn("event_listen not granted, not listening for loading events");
        }

        ctx.expose_api(Arc::clone(&api));
        self.api = Some(api);
        Ok(())
    }

    fn on_unload(&mut self) -> anyhow::Result<()> {
        self.api = None;
        Ok(())
    }
}

/// Register the dummy mod with a builtin entry loader.
pub fn register(loader: &mut BuiltinEntryLoader) {
    loader.register::<DummyMod>(ENTRY_POINT);
}
