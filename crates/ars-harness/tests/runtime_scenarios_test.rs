//! End-to-end runtime scenarios on the paused tokio clock.
//!
//! Each test runs the real runtime against the simulated network and
//! backend, then checks what the view was asked to show.

use std::time::Duration;

use ars_client::RuntimeConfig;
use ars_core::{
    ConnectionError, ConnectionState, HistoryError, ReconnectPolicy, ScrollDirective,
    SessionError,
};
use ars_harness::{
    ConnectOutcome, InvariantRegistry, RecordingView, RenderedSession, SIM_EPOCH, Scenario,
    SessionSnapshot, SimHistory, SimTokens, SystemSnapshot,
};
use ars_proto::{Envelope, Message, TeamId};
use tokio::time::Instant;

fn msg(username: &str, content: &str, minute: i64) -> Message {
    let at = SIM_EPOCH - time::Duration::hours(1) + time::Duration::minutes(minute);
    Message::new(username, content, at)
}

fn rendered(view: &RecordingView, check: impl Fn(&RenderedSession) -> bool) -> bool {
    view.last_render().is_some_and(|r| check(&r))
}

fn is_open(view: &RecordingView) -> bool {
    rendered(view, |r| r.state == ConnectionState::Open)
}

fn assert_invariants(view: &RecordingView, context: &str) {
    let registry = InvariantRegistry::standard();
    for render in view.renders() {
        let snapshot = SystemSnapshot::single(SessionSnapshot::from_rendered(1, &render));
        registry.assert_all(&snapshot, context);
    }
}

#[tokio::test(start_paused = true)]
async fn initial_page_then_live_messages() {
    let team = TeamId::new("7");
    let history = SimHistory::new();
    history.respond(&team, 1, vec![msg("bob", "one", 0), msg("carol", "two", 1)], true);

    let mut scenario = Scenario::builder("7").history(history).start().unwrap();
    let peer = scenario.accept().await.unwrap();

    assert_eq!(peer.url().path(), "/ws/team/7/");
    assert_eq!(peer.url().query(), Some("access_token=sim-token"));

    assert!(
        scenario
            .wait_until(|v| is_open(v) && rendered(v, |r| r.messages.len() == 2 && r.has_more))
            .await
    );

    assert!(peer.push_message(&msg("bob", "three", 5)));
    assert!(scenario.wait_until(|v| rendered(v, |r| r.contents() == ["one", "two", "three"])).await);
    assert_eq!(scenario.view.scrolls().last(), Some(&ScrollDirective::ToBottom));

    assert_invariants(&scenario.view, "after live append");
    scenario.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn older_page_prepends_and_preserves_anchor() {
    let team = TeamId::new("7");
    let history = SimHistory::new();
    history.respond(&team, 1, vec![msg("bob", "c", 10), msg("bob", "d", 11)], true);
    history.respond(&team, 2, vec![msg("bob", "a", 1), msg("bob", "b", 2)], false);

    let scenario = Scenario::builder("7").history(history).start().unwrap();
    assert!(scenario.wait_until(|v| rendered(v, |r| r.messages.len() == 2)).await);

    scenario.handle.load_older().await.unwrap();
    assert!(scenario.wait_until(|v| rendered(v, |r| r.contents() == ["a", "b", "c", "d"])).await);

    let last = scenario.view.last_render().unwrap();
    assert_eq!(last.page, 2);
    assert!(!last.has_more);
    assert!(scenario.view.scrolls().contains(&ScrollDirective::PreserveAnchor { prepended: 2 }));

    // Nothing older: no further request goes out
    scenario.handle.load_older().await.unwrap();
    scenario.advance(Duration::from_secs(1)).await;
    assert_eq!(scenario.history.requests().len(), 2);

    scenario.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn live_message_also_in_history_appears_once() {
    let team = TeamId::new("7");
    let history = SimHistory::new();
    history.respond_after(
        &team,
        1,
        Duration::from_secs(2),
        vec![msg("bob", "a", 0), msg("bob", "b", 1)],
        false,
    );

    let mut scenario = Scenario::builder("7").history(history).start().unwrap();
    let peer = scenario.accept().await.unwrap();
    assert!(scenario.wait_until(is_open).await);

    assert!(peer.push_message(&msg("bob", "b", 1)));
    assert!(scenario.wait_until(|v| rendered(v, |r| r.contents() == ["b"])).await);

    assert!(scenario.wait_until(|v| rendered(v, |r| !r.loading && r.contents() == ["a", "b"])).await);

    assert!(peer.push_message(&msg("bob", "b", 1)));
    scenario.advance(Duration::from_secs(1)).await;
    assert_eq!(scenario.view.last_render().unwrap().contents(), ["a", "b"]);

    assert_invariants(&scenario.view, "after duplicate delivery");
    scenario.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn live_message_missing_from_slow_initial_page_is_kept() {
    let team = TeamId::new("7");
    let history = SimHistory::new();
    history.respond_after(
        &team,
        1,
        Duration::from_secs(2),
        vec![msg("bob", "a", 0), msg("bob", "b", 1)],
        false,
    );

    let mut scenario = Scenario::builder("7").history(history).start().unwrap();
    let peer = scenario.accept().await.unwrap();
    assert!(scenario.wait_until(is_open).await);

    assert!(peer.push_message(&msg("carol", "fresh", 5)));
    assert!(scenario.wait_until(|v| rendered(v, |r| r.contents() == ["fresh"])).await);

    assert!(
        scenario
            .wait_until(|v| rendered(v, |r| !r.loading && r.contents() == ["a", "b", "fresh"]))
            .await
    );

    assert_invariants(&scenario.view, "after initial page");
    scenario.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn failed_initial_load_reports_and_reload_recovers() {
    let team = TeamId::new("7");
    let history = SimHistory::new();
    history.fail(&team, 1, 503);
    history.respond(&team, 1, vec![msg("bob", "back", 0)], false);

    let scenario = Scenario::builder("7").history(history).start().unwrap();
    assert!(scenario.wait_until(|v| !v.reports().is_empty()).await);

    let (reported_team, error) = scenario.view.reports().remove(0);
    assert_eq!(reported_team, team);
    assert!(matches!(error, SessionError::History(HistoryError::Fetch { page: 1, .. })));
    assert!(rendered(&scenario.view, |r| !r.loading && r.messages.is_empty()));

    scenario.handle.reload().await.unwrap();
    assert!(scenario.wait_until(|v| rendered(v, |r| r.contents() == ["back"])).await);

    scenario.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn history_timeout_discards_late_page() {
    let team = TeamId::new("7");
    let history = SimHistory::new();
    history.respond_after(&team, 1, Duration::from_secs(40), vec![msg("bob", "late", 0)], false);

    let scenario = Scenario::builder("7").history(history).start().unwrap();
    assert!(
        scenario
            .wait_until(|v| {
                v.reports().iter().any(|(_, e)| {
                    matches!(e, SessionError::History(HistoryError::Timeout { page: 1, .. }))
                })
            })
            .await
    );

    scenario.advance(Duration::from_secs(60)).await;
    let last = scenario.view.last_render().unwrap();
    assert!(last.messages.is_empty());
    assert!(!last.loading);

    scenario.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn team_switch_discards_previous_team() {
    let (seven, eight) = (TeamId::new("7"), TeamId::new("8"));
    let history = SimHistory::new();
    history.respond_after(&seven, 1, Duration::from_secs(5), vec![msg("bob", "old team", 0)], false);
    history.respond(&eight, 1, vec![msg("dave", "new team", 0)], false);

    let mut scenario = Scenario::builder("7").history(history).start().unwrap();
    let first = scenario.accept().await.unwrap();
    assert!(scenario.wait_until(is_open).await);

    scenario.handle.switch_team(eight.clone()).await.unwrap();
    let second = scenario.accept().await.unwrap();
    assert_eq!(second.url().path(), "/ws/team/8/");

    assert!(scenario.wait_until(|v| rendered(v, |r| r.team == eight && r.contents() == ["new team"])).await);
    assert!(scenario.wait_until(|_| !first.is_connected()).await);

    // The slow page for team 7 lands after the switch and must not show up
    scenario.advance(Duration::from_secs(10)).await;
    assert!(!first.push_message(&msg("bob", "too late", 3)));

    let renders = scenario.view.renders();
    let switched = renders.iter().position(|r| r.team == eight).unwrap();
    assert!(renders[switched..].iter().all(|r| r.team == eight));
    assert!(renders.iter().all(|r| !r.contents().contains(&"old team")));

    scenario.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn switching_to_the_same_team_remounts() {
    let team = TeamId::new("7");
    let history = SimHistory::new();
    history.respond(&team, 1, vec![msg("bob", "x", 0)], false);
    history.respond(&team, 1, vec![msg("bob", "x", 0), msg("bob", "y", 1)], false);

    let mut scenario = Scenario::builder("7").history(history).start().unwrap();
    let first = scenario.accept().await.unwrap();
    assert!(scenario.wait_until(|v| rendered(v, |r| r.messages.len() == 1)).await);

    scenario.handle.switch_team(team.clone()).await.unwrap();
    let _second = scenario.accept().await.unwrap();

    assert!(scenario.wait_until(|v| rendered(v, |r| r.contents() == ["x", "y"])).await);
    assert!(scenario.wait_until(|_| !first.is_connected()).await);

    scenario.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn reconnect_after_close_uses_fresh_token() {
    let tokens = SimTokens::new("first");
    let mut scenario = Scenario::builder("7").tokens(tokens.clone()).start().unwrap();

    let peer = scenario.accept().await.unwrap();
    assert!(scenario.wait_until(is_open).await);

    tokens.rotate("second");
    let closed_at = Instant::now();
    peer.close("server restart");

    assert!(
        scenario
            .wait_until(|v| {
                v.reports().iter().any(|(_, e)| {
                    matches!(e, SessionError::Connection(ConnectionError::Closed { reason }) if reason == "server restart")
                })
            })
            .await
    );

    let again = scenario.accept().await.unwrap();
    assert!(closed_at.elapsed() >= Duration::from_millis(500));
    assert_eq!(again.url().query(), Some("access_token=second"));
    assert!(scenario.wait_until(is_open).await);

    scenario.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn disabled_reconnect_stays_closed() {
    let mut config = RuntimeConfig::default();
    config.session.connection.reconnect = ReconnectPolicy::disabled();

    let mut scenario = Scenario::builder("7").config(config).start().unwrap();
    let peer = scenario.accept().await.unwrap();
    assert!(scenario.wait_until(is_open).await);

    peer.close("bye");
    assert!(scenario.wait_until(|v| rendered(v, |r| r.state == ConnectionState::Closed)).await);

    scenario.advance(Duration::from_secs(60)).await;
    assert!(scenario.server.try_accept().is_none());
    assert_eq!(scenario.server.attempts().len(), 1);

    scenario.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn hung_handshake_times_out_and_retries() {
    let mut scenario = Scenario::builder("7").connect(ConnectOutcome::Hang).start().unwrap();

    assert!(
        scenario
            .wait_until(|v| {
                v.reports()
                    .iter()
                    .any(|(_, e)| matches!(e, SessionError::Connection(ConnectionError::ConnectTimeout { .. })))
            })
            .await
    );

    let _peer = scenario.accept().await.unwrap();
    assert!(scenario.wait_until(is_open).await);
    assert_eq!(scenario.server.attempts().len(), 2);

    scenario.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn refused_handshakes_exhaust_retries() {
    let mut config = RuntimeConfig::default();
    config.session.connection.reconnect.max_attempts = 2;

    let scenario = Scenario::builder("7")
        .config(config)
        .connect(ConnectOutcome::Refuse("nope".into()))
        .connect(ConnectOutcome::Refuse("nope".into()))
        .connect(ConnectOutcome::Refuse("nope".into()))
        .start()
        .unwrap();

    assert!(
        scenario
            .wait_until(|v| {
                v.reports().iter().any(|(_, e)| {
                    matches!(e, SessionError::Connection(ConnectionError::RetriesExhausted { attempts: 2 }))
                })
            })
            .await
    );

    scenario.advance(Duration::from_secs(120)).await;
    assert_eq!(scenario.server.attempts().len(), 3);
    assert!(rendered(&scenario.view, |r| r.state == ConnectionState::Closed));

    scenario.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn sent_message_appears_only_when_echoed() {
    let mut scenario = Scenario::builder("7").start().unwrap();
    let mut peer = scenario.accept().await.unwrap();
    assert!(scenario.wait_until(is_open).await);

    // Blank drafts never leave the client
    scenario.handle.send("   ").await.unwrap();
    scenario.handle.send("hello").await.unwrap();

    let frame = peer.next_sent().await.unwrap();
    let echoed = Envelope::decode(&frame).unwrap().into_chat_message().unwrap();
    assert_eq!(echoed.username, "alice");
    assert_eq!(echoed.content, "hello");

    scenario.advance(Duration::from_secs(1)).await;
    assert!(rendered(&scenario.view, |r| r.messages.is_empty()));

    assert!(peer.push_message(&echoed));
    assert!(scenario.wait_until(|v| rendered(v, |r| r.contents() == ["hello"])).await);

    scenario.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn send_while_connecting_is_dropped() {
    let mut scenario = Scenario::builder("7").connect(ConnectOutcome::Hang).start().unwrap();

    scenario.handle.send("too early").await.unwrap();
    scenario.advance(Duration::from_secs(1)).await;

    // Second attempt opens after the connect timeout; nothing was queued for it
    let mut peer = scenario.accept().await.unwrap();
    assert!(scenario.wait_until(is_open).await);
    scenario.handle.send("on time").await.unwrap();

    assert_eq!(peer.next_sent().await.map(|f| f.contains("on time")), Some(true));

    scenario.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn shutdown_closes_the_connection() {
    let mut scenario = Scenario::builder("7").start().unwrap();
    let peer = scenario.accept().await.unwrap();
    assert!(scenario.wait_until(is_open).await);

    scenario.stop().await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert!(!peer.is_connected());
}
