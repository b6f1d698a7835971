//! Integration tests for Oracle-backed store round-trips.
//!
//! Requires a reachable Oracle Database (23ai or later for the VECTOR
//! paths). Configure with:
//!
//! ```sh
//! export DHAKIRA_TEST_CONNECT="//localhost:1521/FREEPDB1"
//! export DHAKIRA_TEST_USER=dhakira
//! export DHAKIRA_TEST_PASSWORD=...
//! # optional: "onnx" (model must be loaded) or "api"; defaults to "none"
//! export DHAKIRA_TEST_EMBEDDING=onnx
//! ```
//!
//! Run: `cargo test -p dhakira-core --test oracle_roundtrip -- --ignored`

use dhakira_core::config::DhakiraConfig;
use dhakira_core::db::{self, ConnectionManager};
use dhakira_core::store::{AgentStores, SessionStore};
use dhakira_core::DhakiraError;

/// Build a config from the test environment, or `None` to skip.
/// Each call gets a fresh agent id so tests never see each other's rows.
fn test_config() -> Option<DhakiraConfig> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let connect = std::env::var("DHAKIRA_TEST_CONNECT").ok()?;
    let user = std::env::var("DHAKIRA_TEST_USER").ok()?;
    let password = std::env::var("DHAKIRA_TEST_PASSWORD").ok()?;

    let mut cfg = DhakiraConfig::default_config();
    cfg.agent_id = format!("it-{}", uuid::Uuid::new_v4().simple());
    // DSN passthrough keeps the test connect string verbatim.
    cfg.database.mode = "autonomous".to_string();
    cfg.database.dsn = Some(connect);
    cfg.database.user = user;
    cfg.database.password = password;
    cfg.embedding.provider =
        std::env::var("DHAKIRA_TEST_EMBEDDING").unwrap_or_else(|_| "none".to_string());
    Some(cfg)
}

async fn cleanup(cm: &ConnectionManager, agent_id: &str) {
    let agent_id = agent_id.to_string();
    let _ = cm
        .with_conn(move |conn| {
            for table in [
                "PICO_MEMORIES",
                "PICO_DAILY_NOTES",
                "PICO_SESSIONS",
                "PICO_STATE",
                "PICO_PROMPTS",
            ] {
                let _ = conn.execute(
                    &format!("DELETE FROM {table} WHERE agent_id = :1"),
                    &[&agent_id],
                );
            }
            Ok(())
        })
        .await;
}

#[tokio::test]
#[ignore]
async fn test_schema_init_is_idempotent() {
    let Some(cfg) = test_config() else {
        eprintln!("SKIP: DHAKIRA_TEST_* not set");
        return;
    };

    let cm = ConnectionManager::connect(&cfg.database)
        .await
        .expect("connect");

    db::init_schema(&cm).await.expect("first init");
    db::init_schema(&cm).await.expect("second init must succeed");

    let version = db::schema_version(&cm).await.expect("version query");
    assert_eq!(version.as_deref(), Some(db::SCHEMA_VERSION));
}

#[tokio::test]
#[ignore]
async fn test_state_set_get_roundtrip() {
    let Some(cfg) = test_config() else {
        eprintln!("SKIP: DHAKIRA_TEST_* not set");
        return;
    };

    let stores = AgentStores::initialize(&cfg, true).await.expect("init");

    stores.state.set("mood", "curious").await.expect("set");
    assert_eq!(stores.state.get("mood").await, "curious");

    // Absent key is an empty string, not an error.
    assert_eq!(stores.state.get("never_set").await, "");

    stores
        .state
        .set_last_channel("telegram")
        .await
        .expect("set_last_channel");
    assert_eq!(stores.state.get_last_channel().await, "telegram");

    assert!(stores.state.get_timestamp().await.is_some());

    cleanup(&stores.connection, &cfg.agent_id).await;
}

#[tokio::test]
#[ignore]
async fn test_session_save_and_reload() {
    let Some(cfg) = test_config() else {
        eprintln!("SKIP: DHAKIRA_TEST_* not set");
        return;
    };

    let stores = AgentStores::initialize(&cfg, true).await.expect("init");
    let session = &stores.session;

    session.add_message("tg:42", "user", "remember that I like Go");
    session.add_message("tg:42", "assistant", "noted!");
    session.set_summary("tg:42", "preferences chat");
    session.save("tg:42").await.expect("save");

    // A fresh store must reload the persisted history.
    let reloaded = SessionStore::new(stores.connection.clone(), cfg.agent_id.clone()).await;
    let history = reloaded.get_history("tg:42");
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].role, "user");
    assert_eq!(history[1].content, "noted!");
    assert_eq!(reloaded.get_summary("tg:42"), "preferences chat");

    cleanup(&stores.connection, &cfg.agent_id).await;
}

#[tokio::test]
#[ignore]
async fn test_history_copy_and_truncate() {
    let Some(cfg) = test_config() else {
        eprintln!("SKIP: DHAKIRA_TEST_* not set");
        return;
    };

    let stores = AgentStores::initialize(&cfg, true).await.expect("init");
    let session = &stores.session;

    for i in 0..5 {
        session.add_message("k", "user", &format!("m{i}"));
    }

    // Mutating the returned copy must not leak into the cache.
    let mut history = session.get_history("k");
    history.clear();
    assert_eq!(session.get_history("k").len(), 5);

    session.truncate_history("k", 10);
    assert_eq!(session.get_history("k").len(), 5);

    session.truncate_history("k", 2);
    let kept = session.get_history("k");
    assert_eq!(kept.len(), 2);
    assert_eq!(kept[0].content, "m3");
    assert_eq!(kept[1].content, "m4");

    session.truncate_history("k", 0);
    assert!(session.get_history("k").is_empty());

    cleanup(&stores.connection, &cfg.agent_id).await;
}

#[tokio::test]
#[ignore]
async fn test_remember_and_forget() {
    let Some(cfg) = test_config() else {
        eprintln!("SKIP: DHAKIRA_TEST_* not set");
        return;
    };

    let stores = AgentStores::initialize(&cfg, true).await.expect("init");

    let id = stores
        .memory
        .remember("User likes Go", 0.8, "preference")
        .await
        .expect("remember");
    assert_eq!(id.len(), 8);

    stores.memory.forget(&id).await.expect("forget");

    // Second forget is a distinct not-found, never a generic DB error.
    let err = stores.memory.forget(&id).await.unwrap_err();
    assert!(matches!(err, DhakiraError::NotFound(_)), "got: {err}");

    cleanup(&stores.connection, &cfg.agent_id).await;
}

#[tokio::test]
#[ignore]
async fn test_daily_note_appends_to_one_row() {
    let Some(cfg) = test_config() else {
        eprintln!("SKIP: DHAKIRA_TEST_* not set");
        return;
    };

    let stores = AgentStores::initialize(&cfg, true).await.expect("init");

    assert_eq!(stores.memory.read_today().await, "");

    stores.memory.append_today("did X").await.expect("append 1");
    let first = stores.memory.read_today().await;
    assert!(first.starts_with("# "), "missing date header: {first:?}");
    assert!(first.contains("did X"));

    stores.memory.append_today("did Y").await.expect("append 2");
    let second = stores.memory.read_today().await;
    assert!(second.contains("did X"));
    assert!(second.contains("did Y"));

    // Same-day appends mutate one row.
    let agent_id = cfg.agent_id.clone();
    let count: i64 = stores
        .connection
        .with_conn(move |conn| {
            let n: i64 = conn.query_row_as(
                "SELECT COUNT(*) FROM PICO_DAILY_NOTES WHERE agent_id = :1",
                &[&agent_id],
            )?;
            Ok(n)
        })
        .await
        .expect("count");
    assert_eq!(count, 1);

    assert!(!stores.memory.get_recent_daily_notes(3).await.is_empty());

    cleanup(&stores.connection, &cfg.agent_id).await;
}

#[tokio::test]
#[ignore]
async fn test_memory_context_composition() {
    let Some(cfg) = test_config() else {
        eprintln!("SKIP: DHAKIRA_TEST_* not set");
        return;
    };

    let stores = AgentStores::initialize(&cfg, true).await.expect("init");

    assert_eq!(stores.memory.get_memory_context().await, "");

    stores
        .memory
        .write_long_term("Lives in Lisbon")
        .await
        .expect("write_long_term");
    stores.memory.append_today("walked the dog").await.expect("append");

    let context = stores.memory.get_memory_context().await;
    assert!(context.starts_with("# Memory"));
    assert!(context.contains("## Long-term Memory"));
    assert!(context.contains("Lives in Lisbon"));
    assert!(context.contains("## Recent Daily Notes"));
    assert!(context.contains("walked the dog"));

    cleanup(&stores.connection, &cfg.agent_id).await;
}

#[tokio::test]
#[ignore]
async fn test_prompt_and_config_stores() {
    let Some(cfg) = test_config() else {
        eprintln!("SKIP: DHAKIRA_TEST_* not set");
        return;
    };

    let stores = AgentStores::initialize(&cfg, true).await.expect("init");

    // Missing entries map to empty strings.
    assert_eq!(stores.prompt.load_prompt("IDENTITY").await.expect("load"), "");
    assert_eq!(stores.config.get_config_value("nope").await.expect("get"), "");

    stores
        .prompt
        .save_prompt("IDENTITY", "You are dhakira.")
        .await
        .expect("save prompt");
    stores
        .prompt
        .save_prompt("IDENTITY", "You are dhakira, updated.")
        .await
        .expect("upsert prompt");
    assert_eq!(
        stores.prompt.load_prompt("IDENTITY").await.expect("reload"),
        "You are dhakira, updated."
    );

    let all = stores.prompt.load_bootstrap_files().await;
    assert_eq!(all.get("IDENTITY").map(String::as_str), Some("You are dhakira, updated."));

    stores.config.save_config("{\"x\":1}").await.expect("save config");
    assert_eq!(stores.config.load_config().await.expect("load config"), "{\"x\":1}");

    cleanup(&stores.connection, &cfg.agent_id).await;
}

/// Requires an embedding backend (`DHAKIRA_TEST_EMBEDDING=onnx` with the
/// model loaded, or `api` with credentials).
#[tokio::test]
#[ignore]
async fn test_recall_roundtrip_with_access_bump() {
    let Some(cfg) = test_config() else {
        eprintln!("SKIP: DHAKIRA_TEST_* not set");
        return;
    };
    if cfg.embedding.provider == "none" {
        eprintln!("SKIP: DHAKIRA_TEST_EMBEDDING not set");
        return;
    }

    let stores = AgentStores::initialize(&cfg, true).await.expect("init");

    let id = stores
        .memory
        .remember("User likes Go programming", 0.8, "preference")
        .await
        .expect("remember");

    let results = stores
        .memory
        .recall("Go programming", 5)
        .await
        .expect("recall");
    let hit = results
        .iter()
        .find(|r| r.memory_id == id)
        .expect("remembered memory should be recalled");
    assert!(hit.score > 0.3 && hit.score <= 1.0, "score: {}", hit.score);
    assert_eq!(hit.category, "preference");

    // One recall bumps access_count by exactly one.
    let id_owned = id.clone();
    let count: i64 = stores
        .connection
        .with_conn(move |conn| {
            let n: i64 = conn.query_row_as(
                "SELECT access_count FROM PICO_MEMORIES WHERE memory_id = :1",
                &[&id_owned],
            )?;
            Ok(n)
        })
        .await
        .expect("access_count");
    assert_eq!(count, 1);

    cleanup(&stores.connection, &cfg.agent_id).await;
}

#[tokio::test]
#[ignore]
async fn test_embedding_service_contract() {
    let Some(cfg) = test_config() else {
        eprintln!("SKIP: DHAKIRA_TEST_* not set");
        return;
    };
    if cfg.embedding.provider == "none" {
        eprintln!("SKIP: DHAKIRA_TEST_EMBEDDING not set");
        return;
    }

    let cm = ConnectionManager::connect(&cfg.database)
        .await
        .expect("connect");
    let svc = dhakira_core::EmbeddingService::from_config(cm, &cfg.embedding)
        .expect("service")
        .expect("provider enabled");

    assert!(svc.test_embedding().await);

    let vec = svc.embed_text("hello world").await.expect("embed");
    assert!(!vec.is_empty());
    assert_eq!(svc.dims(), vec.len());

    // Empty input short-circuits to a zero vector of the known dims.
    let zero = svc.embed_text("").await.expect("embed empty");
    assert_eq!(zero.len(), svc.dims());
    assert!(zero.iter().all(|&x| x == 0.0));

    let batch = svc.embed_texts(&["a", "b"]).await.expect("batch");
    assert_eq!(batch.len(), 2);
    assert_eq!(batch[0].len(), vec.len());
}
