//! Integration tests for plugin discovery, enablement, loading and reset.

mod common;

use async_trait::async_trait;
use common::TestBot;
use purplebot::Bot;
use purplebot::config::{ConfigStore, FileConfig};
use purplebot::db::Database;
use purplebot::plugins::{Plugin, PluginRegistry};
use purplebot::{BotOptions, NullTransport};
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Configurable test plugin.
struct Probe {
    name: String,
    fail_load: bool,
    panic_load: bool,
    fail_reset: bool,
    resets: Arc<AtomicUsize>,
}

#[async_trait]
impl Plugin for Probe {
    fn name(&self) -> &str {
        &self.name
    }

    async fn load(&mut self, _bot: &Arc<Bot>) -> anyhow::Result<()> {
        if self.panic_load {
            panic!("probe panicked");
        }
        if self.fail_load {
            anyhow::bail!("probe refused to load");
        }
        Ok(())
    }

    async fn reset(&self) -> anyhow::Result<()> {
        self.resets.fetch_add(1, Ordering::SeqCst);
        if self.fail_reset {
            anyhow::bail!("probe refused to reset");
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Default)]
struct Behavior {
    fail_load: bool,
    panic_load: bool,
    fail_reset: bool,
}

fn register(
    registry: PluginRegistry,
    kind: &str,
    behavior: Behavior,
    resets: &Arc<AtomicUsize>,
) -> PluginRegistry {
    let resets = Arc::clone(resets);
    registry.register(kind, move |name| {
        Box::new(Probe {
            name: name.to_string(),
            fail_load: behavior.fail_load,
            panic_load: behavior.panic_load,
            fail_reset: behavior.fail_reset,
            resets: Arc::clone(&resets),
        })
    })
}

fn probes(resets: &Arc<AtomicUsize>) -> PluginRegistry {
    let registry = PluginRegistry::new();
    let registry = register(registry, "ok", Behavior::default(), resets);
    let registry = register(
        registry,
        "broken",
        Behavior {
            fail_load: true,
            ..Behavior::default()
        },
        resets,
    );
    let registry = register(
        registry,
        "panicky",
        Behavior {
            panic_load: true,
            ..Behavior::default()
        },
        resets,
    );
    register(
        registry,
        "grumpy",
        Behavior {
            fail_reset: true,
            ..Behavior::default()
        },
        resets,
    )
}

#[tokio::test]
async fn failing_load_does_not_block_later_plugins() {
    let t = TestBot::new().await.unwrap();
    let resets = Arc::new(AtomicUsize::new(0));
    let registry = probes(&resets).bundle("broken").bundle("panicky").bundle("ok");

    assert_eq!(t.bot.load_plugins(&registry).await, 1);
    assert_eq!(t.bot.plugins().names(), vec!["ok"]);
    assert!(t.bot.get_plugin("broken").is_none());
    assert!(t.bot.get_plugin("panicky").is_none());
}

#[tokio::test]
async fn get_plugin_by_name() {
    let t = TestBot::new().await.unwrap();
    let resets = Arc::new(AtomicUsize::new(0));
    let registry = probes(&resets).bundle("ok");
    t.bot.load_plugins(&registry).await;

    let plugin = t.bot.get_plugin("ok").unwrap();
    assert_eq!(plugin.name(), "ok");
    assert!(t.bot.get_plugin("missing").is_none());
}

#[tokio::test]
async fn first_seen_plugins_are_enabled() {
    let t = TestBot::new().await.unwrap();
    let resets = Arc::new(AtomicUsize::new(0));
    let registry = probes(&resets).bundle("ok").bundle("broken");
    t.bot.load_plugins(&registry).await;

    assert_eq!(t.config.get("ok:enabled").await.unwrap(), Some(json!(true)));
    // The flag is written before loading, so a failed load is still remembered.
    assert_eq!(
        t.config.get("broken:enabled").await.unwrap(),
        Some(json!(true))
    );
}

#[tokio::test]
async fn disabled_plugins_are_skipped() {
    let t = TestBot::new().await.unwrap();
    t.config.set("ok:enabled", Value::Bool(false)).await.unwrap();
    let resets = Arc::new(AtomicUsize::new(0));
    let registry = probes(&resets).bundle("ok").bundle("grumpy");

    assert_eq!(t.bot.load_plugins(&registry).await, 1);
    assert_eq!(t.bot.plugins().names(), vec!["grumpy"]);
    assert_eq!(
        t.config.get("ok:enabled").await.unwrap(),
        Some(json!(false))
    );
}

#[tokio::test]
async fn duplicate_names_coexist() {
    let t = TestBot::new().await.unwrap();
    let resets = Arc::new(AtomicUsize::new(0));
    let registry = probes(&resets).bundle("ok").bundle("ok");
    t.bot.load_plugins(&registry).await;

    assert_eq!(t.bot.plugins().names(), vec!["ok", "ok"]);
    assert!(t.bot.get_plugin("ok").is_some());
}

#[tokio::test]
async fn reset_continues_past_failures() {
    let t = TestBot::new().await.unwrap();
    let resets = Arc::new(AtomicUsize::new(0));
    let registry = probes(&resets).bundle("grumpy").bundle("ok");
    t.bot.load_plugins(&registry).await;

    let err = t.bot.reset_plugins().await.unwrap_err();
    assert_eq!(resets.load(Ordering::SeqCst), 2);
    assert_eq!(err.failures.len(), 1);
    assert_eq!(err.failures[0].0, "grumpy");
}

#[tokio::test]
async fn reset_succeeds_when_all_plugins_reset() {
    let t = TestBot::new().await.unwrap();
    let resets = Arc::new(AtomicUsize::new(0));
    let registry = probes(&resets).bundle("ok");
    t.bot.load_plugins(&registry).await;

    t.bot.reset_plugins().await.unwrap();
    assert_eq!(resets.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn user_plugins_load_after_bundled() {
    let t = TestBot::new().await.unwrap();
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("10-extra.toml"),
        "kind = \"ok\"\nname = \"extra\"\n",
    )
    .unwrap();
    std::fs::write(dir.path().join("20-mystery.toml"), "kind = \"mystery\"\n").unwrap();
    std::fs::write(
        dir.path().join("30-broken.toml"),
        "kind = \"broken\"\nname = \"broken-user\"\n",
    )
    .unwrap();

    let resets = Arc::new(AtomicUsize::new(0));
    let registry = probes(&resets).bundle("ok").with_user_dir(dir.path());

    assert_eq!(t.bot.load_plugins(&registry).await, 2);
    assert_eq!(t.bot.plugins().names(), vec!["ok", "extra"]);
    assert_eq!(
        t.config.get("extra:enabled").await.unwrap(),
        Some(json!(true))
    );
    assert_eq!(t.config.get("mystery:enabled").await.unwrap(), None);
}

#[tokio::test]
async fn enable_flags_survive_restart() {
    let config = Arc::new(FileConfig::temp().await.unwrap());
    let resets = Arc::new(AtomicUsize::new(0));
    let registry = probes(&resets).bundle("ok").bundle("grumpy");

    let db = Database::new(":memory:").await.unwrap();
    let bot = Bot::new(
        BotOptions::default(),
        config.clone(),
        Arc::new(db.users()),
        Arc::new(NullTransport),
    );
    bot.load_plugins(&registry).await;
    config.set("grumpy:enabled", json!(false)).await.unwrap();

    let reopened = Arc::new(FileConfig::open(config.dir()).await.unwrap());
    assert_eq!(
        reopened.get("ok:enabled").await.unwrap(),
        Some(json!(true))
    );

    let bot = Bot::new(
        BotOptions::default(),
        reopened,
        Arc::new(db.users()),
        Arc::new(NullTransport),
    );
    assert_eq!(bot.load_plugins(&registry).await, 1);
    assert_eq!(bot.plugins().names(), vec!["ok"]);

    config.remove_dir().await.unwrap();
}
