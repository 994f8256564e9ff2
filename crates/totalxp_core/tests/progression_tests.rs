//! End-to-end progression behaviour: gains, reward firing, admin operations
//! and indicator teardown, against a real SQLite store in a temp dir.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc::UnboundedReceiver;
use totalxp_core::{
    AdminError, BarDisplay, BarFrame, Collaborators, HideExpired, PlaceholderFormatter,
    PlayerStore, ProgressionEngine, RewardHost, TotalXpConfig, Visibility,
};
use uuid::Uuid;

const CONFIG: &str = r#"
[indicator]
enabled = true
dynamic_mode = false
title = "%next_rank% (%xp%/%required_xp%)"

[messages]
prefix = "[XP] "

[rewards.100]
name = "Novice"
commands = ["/give %player% bread %threshold%", "", "say %player% has %xp%"]
broadcast = "%player% is now %current_rank%"

[rewards.250]
name = "Adept"
commands = ["give %player% iron 1"]

[rewards.500]
name = "Master"
broadcast = "%player% mastered it"
"#;

#[derive(Default)]
struct RecordingHost {
    commands: Mutex<Vec<String>>,
    broadcasts: Mutex<Vec<String>>,
}

impl RecordingHost {
    fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    fn broadcasts(&self) -> Vec<String> {
        self.broadcasts.lock().unwrap().clone()
    }
}

impl RewardHost for RecordingHost {
    fn dispatch_command(&self, command: &str) {
        self.commands.lock().unwrap().push(command.to_string());
    }

    fn broadcast(&self, message: &str) {
        self.broadcasts.lock().unwrap().push(message.to_string());
    }
}

#[derive(Default)]
struct RecordingDisplay {
    frames: Mutex<Vec<(Uuid, BarFrame)>>,
    removed: Mutex<Vec<Uuid>>,
}

impl BarDisplay for RecordingDisplay {
    fn render(&self, player: Uuid, frame: &BarFrame) {
        self.frames.lock().unwrap().push((player, frame.clone()));
    }

    fn remove(&self, player: Uuid) {
        self.removed.lock().unwrap().push(player);
    }
}

struct Harness {
    _dir: TempDir,
    engine: ProgressionEngine,
    expired: UnboundedReceiver<HideExpired>,
    host: Arc<RecordingHost>,
    display: Arc<RecordingDisplay>,
}

async fn harness_with(config: &str) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(PlayerStore::open(dir.path().join("xp.db")).await.unwrap());
    let config = TotalXpConfig::from_toml(config).unwrap();
    let host = Arc::new(RecordingHost::default());
    let display = Arc::new(RecordingDisplay::default());

    let (engine, expired) = ProgressionEngine::new(
        &config,
        store,
        Collaborators {
            host: host.clone(),
            display: display.clone(),
            formatter: Arc::new(PlaceholderFormatter),
        },
    );

    Harness {
        _dir: dir,
        engine,
        expired,
        host,
        display,
    }
}

async fn harness() -> Harness {
    harness_with(CONFIG).await
}

/// Connect a player whose stored XP is `xp`
async fn join(h: &mut Harness, name: &str, xp: u64) -> Uuid {
    let id = Uuid::new_v4();
    if xp > 0 {
        h.engine.store().set_player_data(id, xp, name, "None").await;
    }
    h.engine.player_joined(id, name).await;
    id
}

#[tokio::test]
async fn gains_sum_regardless_of_batching() {
    let mut h = harness().await;
    let a = join(&mut h, "Batched", 0).await;
    let b = join(&mut h, "Single", 0).await;

    for amount in [3, 40, 7, 1, 49] {
        h.engine.report_xp_gain(a, amount).await;
    }
    h.engine.report_xp_gain(b, 100).await;

    assert_eq!(h.engine.cache().get(a).unwrap().xp, 100);
    assert_eq!(h.engine.cache().get(b).unwrap().xp, 100);
}

#[tokio::test]
async fn non_positive_gains_are_ignored() {
    let mut h = harness().await;
    let id = join(&mut h, "Steve", 90).await;
    let frames_before = h.display.frames.lock().unwrap().len();

    assert!(h.engine.report_xp_gain(id, 0).await.is_empty());
    assert!(h.engine.report_xp_gain(id, -500).await.is_empty());

    assert_eq!(h.engine.cache().get(id).unwrap().xp, 90);
    assert!(h.host.commands().is_empty());
    assert!(!h.engine.store().has_reward_issued(id, 100).await);
    assert_eq!(h.display.frames.lock().unwrap().len(), frames_before);
}

#[tokio::test]
async fn gain_for_unloaded_player_is_dropped() {
    let mut h = harness().await;
    let id = Uuid::new_v4();

    assert!(h.engine.report_xp_gain(id, 500).await.is_empty());
    assert!(h.engine.cache().get(id).is_none());
    assert_eq!(h.engine.store().get_xp(id).await, 0);
}

#[tokio::test]
async fn crossing_one_threshold_fires_once() {
    let mut h = harness().await;
    let id = join(&mut h, "Steve", 80).await;

    let fired = h.engine.report_xp_gain(id, 40).await;

    assert_eq!(fired, vec![100]);
    assert_eq!(
        h.host.commands(),
        vec![
            "give Steve bread 100".to_string(),
            "say Steve has 120".to_string()
        ]
    );
    assert_eq!(h.host.broadcasts(), vec!["[XP] Steve is now Novice".to_string()]);
    assert!(h.engine.store().has_reward_issued(id, 100).await);

    let record = h.engine.cache().get(id).unwrap();
    assert_eq!(record.xp, 120);
    assert_eq!(record.rank_name, "Novice");
}

#[tokio::test]
async fn later_gain_does_not_refire() {
    let mut h = harness().await;
    let id = join(&mut h, "Steve", 80).await;

    h.engine.report_xp_gain(id, 40).await;
    let fired = h.engine.report_xp_gain(id, 100).await;

    assert!(fired.is_empty());
    assert_eq!(h.host.commands().len(), 2);
    assert_eq!(h.engine.store().issued_rewards(id).await, vec![100]);
}

#[tokio::test]
async fn multi_crossing_fires_lowest_first() {
    let mut h = harness().await;
    let id = join(&mut h, "Alex", 90).await;

    let fired = h.engine.report_xp_gain(id, 210).await;

    assert_eq!(fired, vec![100, 250]);
    let commands = h.host.commands();
    assert_eq!(commands.last().unwrap(), "give Alex iron 1");
    assert_eq!(commands[0], "give Alex bread 100");
    assert_eq!(h.engine.cache().get(id).unwrap().rank_name, "Adept");
}

#[tokio::test]
async fn already_issued_fact_blocks_refire_after_rebuild() {
    let mut h = harness().await;
    let id = join(&mut h, "Steve", 0).await;
    h.engine.store().mark_reward_issued(id, 100).await;

    // Cache says 90, yet the fact from an earlier session is durable
    h.engine.set_xp(&id.to_string(), 90).await.unwrap();
    let fired = h.engine.report_xp_gain(id, 20).await;

    assert!(fired.is_empty());
    assert!(h.host.commands().is_empty());
}

#[tokio::test]
async fn indicator_tracks_gains() {
    let mut h = harness().await;
    let id = join(&mut h, "Steve", 100).await;

    h.engine.report_xp_gain(id, 75).await;

    let frame = h.engine.indicator().frame(id).unwrap();
    assert_eq!(frame.title, "Adept (175/250)");
    assert!((frame.progress - 0.5).abs() < 1e-9);

    h.engine.report_xp_gain(id, 1_000).await;
    let frame = h.engine.indicator().frame(id).unwrap();
    assert_eq!(frame.progress, 1.0);
    assert_eq!(frame.title, "&aMax Rank Reached");
}

#[tokio::test]
async fn disconnect_flushes_and_reconnect_restores() {
    let mut h = harness().await;
    let id = join(&mut h, "Steve", 0).await;
    h.engine.report_xp_gain(id, 260).await;

    h.engine.player_disconnected(id).unwrap().await.unwrap();
    assert!(h.engine.cache().get(id).is_none());
    assert_eq!(h.display.removed.lock().unwrap().as_slice(), &[id]);

    let stored = h.engine.store().load_player(id).await.unwrap();
    assert_eq!(stored.xp, 260);
    assert_eq!(stored.rank_name, "Adept");

    h.engine.player_connecting(id, "Steve").unwrap().await.unwrap();
    h.engine.player_joined(id, "Steve").await;
    assert_eq!(h.engine.cache().get(id).unwrap().xp, 260);
}

#[tokio::test]
async fn quick_reconnect_keeps_unwritten_xp() {
    let mut h = harness().await;
    let id = join(&mut h, "Steve", 0).await;
    h.engine.report_xp_gain(id, 260).await;

    for round in 1..=20u64 {
        // Disconnect write left running while the player comes straight back
        let _ = h.engine.player_disconnected(id);
        h.engine.player_joined(id, "Steve").await;
        assert_eq!(h.engine.cache().get(id).unwrap().xp, 260 + round - 1);
        h.engine.report_xp_gain(id, 1).await;
    }

    let flush = h.engine.player_disconnected(id).unwrap();
    if let Some(handle) = h.engine.player_connecting(id, "Steve") {
        assert!(handle.await.unwrap());
    }
    flush.await.unwrap();
    assert_eq!(h.engine.cache().get(id).unwrap().xp, 280);
    assert_eq!(h.engine.store().get_xp(id).await, 280);
}

#[tokio::test]
async fn crossing_gain_is_stored_before_reward_fact() {
    let mut h = harness().await;
    let id = join(&mut h, "Steve", 0).await;

    h.engine.report_xp_gain(id, 150).await;

    assert!(h.engine.store().has_reward_issued(id, 100).await);
    let stored = h.engine.store().load_player(id).await.unwrap();
    assert_eq!(stored.xp, 150);
    assert_eq!(stored.rank_name, "Novice");
    assert_eq!(stored.name, "Steve");
}

#[tokio::test]
async fn badly_typed_reward_is_skipped() {
    let mut h = harness_with(
        r#"
[rewards.100]
name = "Novice"
commands = ["say hi %player%"]

[rewards.200]
commands = "say oops"
"#,
    )
    .await;
    assert_eq!(h.engine.ladder().len(), 1);

    let id = join(&mut h, "Steve", 0).await;
    assert_eq!(h.engine.report_xp_gain(id, 500).await, vec![100]);
    assert_eq!(h.host.commands(), vec!["say hi Steve".to_string()]);
}

#[tokio::test]
async fn reset_then_load_starts_from_zero() {
    let mut h = harness().await;
    let id = join(&mut h, "Steve", 0).await;
    h.engine.report_xp_gain(id, 10_000).await;
    assert_eq!(h.engine.store().issued_rewards(id).await, vec![100, 250, 500]);

    let reset = h.engine.reset_xp("steve").await.unwrap();
    assert_eq!(reset.xp, 0);
    assert_eq!(h.engine.cache().get(id).unwrap().xp, 0);
    assert_eq!(h.engine.cache().get(id).unwrap().rank_name, "None");

    h.engine.player_disconnected(id).unwrap().await.unwrap();
    assert_eq!(h.engine.store().get_xp(id).await, 0);
    assert!(h.engine.store().issued_rewards(id).await.is_empty());

    h.engine.player_joined(id, "Steve").await;
    assert_eq!(h.engine.cache().get(id).unwrap().xp, 0);
    assert!(!h.engine.store().has_reward_issued(id, 100).await);

    // Earning it again after a reset fires the reward again
    assert_eq!(h.engine.report_xp_gain(id, 100).await, vec![100]);
}

#[tokio::test]
async fn set_xp_does_not_fire_rewards() {
    let mut h = harness().await;
    let id = join(&mut h, "Steve", 0).await;

    let result = h.engine.set_xp("Steve", 300).await.unwrap();

    assert_eq!(result.xp, 300);
    assert!(result.online);
    assert!(h.host.commands().is_empty());
    assert!(h.host.broadcasts().is_empty());
    assert_eq!(h.engine.cache().get(id).unwrap().rank_name, "Adept");
    assert_eq!(h.engine.store().get_xp(id).await, 300);
    assert_eq!(h.engine.indicator().frame(id).unwrap().title, "Master (300/500)");

    // Reaching 500 from 300 still fires only 500
    assert_eq!(h.engine.report_xp_gain(id, 200).await, vec![500]);
}

#[tokio::test]
async fn admin_operations_on_offline_players() {
    let mut h = harness().await;
    let id = Uuid::new_v4();
    h.engine.store().set_player_data(id, 42, "Offline", "None").await;

    let found = h.engine.lookup_xp("offline").await.unwrap();
    assert_eq!(found.id, id);
    assert_eq!(found.xp, 42);
    assert!(!found.online);

    h.engine.set_xp("Offline", 260).await.unwrap();
    let stored = h.engine.store().load_player(id).await.unwrap();
    assert_eq!(stored.xp, 260);
    assert_eq!(stored.rank_name, "Adept");
    assert!(h.engine.cache().get(id).is_none());

    // An unknown UUID reads as a fresh player
    let fresh = Uuid::new_v4();
    assert_eq!(h.engine.lookup_xp(&fresh.to_string()).await.unwrap().xp, 0);
}

#[tokio::test]
async fn set_xp_for_unseen_uuid_leaves_name_for_join() {
    let mut h = harness().await;
    let id = Uuid::new_v4();

    let seeded = h.engine.set_xp(&id.to_string(), 120).await.unwrap();
    assert_eq!(seeded.name, "");
    let stored = h.engine.store().load_player(id).await.unwrap();
    assert_eq!(stored.name, "");
    assert_eq!(stored.xp, 120);

    h.engine.player_joined(id, "Newcomer").await;
    assert_eq!(h.engine.cache().get(id).unwrap().xp, 120);
    h.engine.player_disconnected(id).unwrap().await.unwrap();
    assert_eq!(h.engine.store().load_player(id).await.unwrap().name, "Newcomer");
}

#[tokio::test]
async fn offline_admin_write_waits_for_disconnect_write() {
    let mut h = harness().await;
    let id = join(&mut h, "Steve", 0).await;
    h.engine.report_xp_gain(id, 90).await;

    // Disconnect write still queued when the operator edits the player
    let flush = h.engine.player_disconnected(id).unwrap();
    let found = h.engine.lookup_xp("Steve").await.unwrap();
    assert_eq!(found.xp, 90);
    assert!(!found.online);

    h.engine.set_xp("Steve", 10).await.unwrap();
    flush.await.unwrap();
    assert_eq!(h.engine.store().get_xp(id).await, 10);
}

#[tokio::test]
async fn admin_errors() {
    let mut h = harness().await;
    let id = join(&mut h, "Steve", 0).await;

    assert_eq!(
        h.engine.lookup_xp("Nobody").await,
        Err(AdminError::PlayerNotFound("Nobody".to_string()))
    );
    assert_eq!(h.engine.set_xp("Steve", -1).await, Err(AdminError::NegativeAmount));
    assert_eq!(h.engine.cache().get(id).unwrap().xp, 0);

    let offline = Uuid::new_v4();
    assert!(matches!(
        h.engine.show_indicator(offline),
        Err(AdminError::NotOnline(_))
    ));
    assert!(matches!(
        h.engine.hide_indicator(offline),
        Err(AdminError::NotOnline(_))
    ));
}

#[tokio::test]
async fn hide_and_show_indicator() {
    let mut h = harness().await;
    let id = join(&mut h, "Steve", 10).await;
    assert_eq!(h.engine.indicator().visibility(id), Visibility::Visible);

    h.engine.hide_indicator(id).unwrap();
    h.engine.report_xp_gain(id, 5).await;
    assert_eq!(h.engine.indicator().visibility(id), Visibility::Hidden);
    assert!(h.engine.indicator().frame(id).is_none());

    h.engine.show_indicator(id).unwrap();
    assert_eq!(h.engine.indicator().visibility(id), Visibility::Visible);
    assert_eq!(h.engine.indicator().frame(id).unwrap().title, "Novice (15/100)");
}

#[tokio::test]
async fn reload_replaces_ladder_and_resyncs() {
    let mut h = harness().await;
    let id = join(&mut h, "Steve", 120).await;
    assert_eq!(h.engine.cache().get(id).unwrap().rank_name, "Novice");

    let reloaded = TotalXpConfig::from_toml(
        r#"
[indicator]
enabled = false

[rewards.50]
name = "Rookie"
commands = ["say rookie"]

[rewards.1000]
name = "Legend"
commands = ["say legend"]
"#,
    )
    .unwrap();

    let summary = h.engine.reload(&reloaded).await;

    assert_eq!(summary.rewards, 2);
    assert_eq!(summary.players, 1);
    assert_eq!(h.engine.cache().get(id).unwrap().rank_name, "Rookie");
    assert_eq!(h.engine.indicator().visibility(id), Visibility::Disabled);
    assert!(h.engine.indicator().frame(id).is_none());
    // Lowering a threshold below the player's XP grants nothing retroactively
    assert!(h.host.commands().is_empty());
}

#[tokio::test(start_paused = true)]
async fn disconnect_cancels_auto_hide_timer() {
    let mut h = harness_with(
        r#"
[indicator]
dynamic_mode = true
timeout_secs = 5

[rewards.100]
commands = ["say hi"]
"#,
    )
    .await;
    let id = join(&mut h, "Steve", 0).await;
    h.engine.report_xp_gain(id, 10).await;
    assert_eq!(
        h.engine.indicator().visibility(id),
        Visibility::VisiblePendingHide
    );

    h.engine.player_disconnected(id).unwrap().await.unwrap();
    tokio::time::sleep(Duration::from_secs(60)).await;

    assert!(h.expired.try_recv().is_err());
    assert_eq!(h.engine.indicator().visibility(id), Visibility::Idle);
}

#[tokio::test(start_paused = true)]
async fn auto_hide_fires_after_timeout() {
    let mut h = harness_with(
        r#"
[indicator]
dynamic_mode = true
timeout_secs = 5

[rewards.100]
commands = ["say hi"]
"#,
    )
    .await;
    let id = join(&mut h, "Steve", 0).await;

    let expired = h.expired.recv().await.unwrap();
    h.engine.handle_hide_expired(expired);

    assert_eq!(h.engine.indicator().visibility(id), Visibility::Idle);
    assert_eq!(h.display.removed.lock().unwrap().as_slice(), &[id]);
}

#[tokio::test]
async fn shutdown_saves_everyone() {
    let mut h = harness().await;
    let a = join(&mut h, "A", 0).await;
    let b = join(&mut h, "B", 0).await;
    h.engine.report_xp_gain(a, 11).await;
    h.engine.report_xp_gain(b, 22).await;

    h.engine.shutdown().await;

    assert_eq!(h.engine.store().get_xp(a).await, 11);
    assert_eq!(h.engine.store().get_xp(b).await, 22);
}
