//! End-to-end engine scenarios against a scripted device
//!
//! Time is paused, so every scheduled delay elapses instantly and in order.

use std::sync::Arc;
use std::time::Duration;

use mooncast_sidecar::automation::{
    AutomationEngine, ConnectionState, EngineConfig, EngineEvent, EngineHandle,
};
use mooncast_sidecar::device::scripted::{LaunchBehavior, Screen, ScriptedDevice, Trigger};
use mooncast_sidecar::device::types::{
    ForegroundEvent, ForegroundEventKind, NodeAction, NodeSpec, UiSnapshot,
};
use mooncast_sidecar::hosts::{HostRegistry, SqliteHostRegistry};
use tokio::sync::broadcast;

const PKG: &str = "com.limelight";

struct Harness {
    device: Arc<ScriptedDevice>,
    registry: Arc<SqliteHostRegistry>,
    engine: EngineHandle,
    events: broadcast::Receiver<EngineEvent>,
}

fn harness(screens: Vec<Screen>) -> Harness {
    let device = Arc::new(ScriptedDevice::new(screens));
    let registry = Arc::new(SqliteHostRegistry::open_in_memory().unwrap());
    let (engine, _task) = AutomationEngine::spawn(
        EngineConfig::default(),
        device.clone(),
        device.clone(),
        registry.clone(),
    );
    let events = engine.subscribe();
    Harness {
        device,
        registry,
        engine,
        events,
    }
}

fn drain(events: &mut broadcast::Receiver<EngineEvent>) -> Vec<EngineEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

async fn run_for(secs: u64) {
    tokio::time::sleep(Duration::from_secs(secs)).await;
}

fn window(children: Vec<NodeSpec>) -> UiSnapshot {
    UiSnapshot::from_spec(
        PKG,
        NodeSpec::new("android.widget.FrameLayout")
            .bounds(0, 0, 1080, 1920)
            .children(children),
    )
}

fn icon(description: &str, left: i32) -> NodeSpec {
    NodeSpec::new("android.widget.ImageButton")
        .description(description)
        .bounds(left, 0, left + 96, 96)
        .clickable()
}

fn button(text: &str, top: i32) -> NodeSpec {
    NodeSpec::new("android.widget.Button")
        .text(text)
        .bounds(40, top, 680, top + 120)
        .clickable()
}

fn tile(label: &str, left: i32) -> NodeSpec {
    NodeSpec::new("android.widget.RelativeLayout")
        .bounds(left, 200, left + 400, 600)
        .clickable()
        .child(
            NodeSpec::new("android.widget.TextView")
                .text(label)
                .bounds(left, 500, left + 400, 600),
        )
}

fn grid(tiles: Vec<NodeSpec>) -> NodeSpec {
    NodeSpec::new("android.widget.GridView")
        .bounds(0, 200, 1080, 1800)
        .children(tiles)
}

fn home_screen() -> Screen {
    Screen::new(window(vec![
        icon("Settings", 0),
        icon("Help", 100),
        icon("Add PC", 200),
    ]))
    .advance_on(Trigger::ClickOn("Add PC".into()))
}

fn add_dialog() -> Screen {
    Screen::new(window(vec![
        NodeSpec::new("android.widget.TextView")
            .text("Add PC manually")
            .bounds(40, 600, 680, 680),
        NodeSpec::new("android.widget.EditText")
            .bounds(40, 700, 680, 800)
            .focusable()
            .editable(),
        button("OK", 900),
        button("Cancel", 1100),
    ]))
    .advance_on(Trigger::ClickOn("OK".into()))
}

fn host_list(hosts: &[&str], advance_on: &str) -> Screen {
    let tiles = hosts
        .iter()
        .enumerate()
        .map(|(i, host)| tile(host, i as i32 * 450))
        .collect();
    Screen::new(window(vec![icon("Settings", 0), grid(tiles)]))
        .advance_on(Trigger::ClickOn(advance_on.into()))
}

fn app_list() -> Screen {
    Screen::new(window(vec![grid(vec![
        tile("Desktop", 0),
        tile("Steam Big Picture", 450),
    ])]))
    .advance_on(Trigger::ClickOn("Desktop".into()))
}

fn session_dialog() -> Screen {
    Screen::new(window(vec![
        button("Resume Session", 900),
        button("Quit Session", 1100),
    ]))
    .advance_on(Trigger::ClickOn("Resume Session".into()))
}

fn happy_path() -> Vec<Screen> {
    vec![
        home_screen(),
        add_dialog(),
        host_list(&["DESKTOP-1"], "DESKTOP-1"),
        app_list(),
        session_dialog(),
        Screen::no_window(),
    ]
}

fn state_changes(events: &[EngineEvent]) -> Vec<(ConnectionState, ConnectionState)> {
    events
        .iter()
        .filter_map(|e| match e {
            EngineEvent::StateChanged { from, to, .. } => Some((*from, *to)),
            _ => None,
        })
        .collect()
}

/// Accepted click labels on one scripted screen
fn clicks_on_screen(device: &ScriptedDevice, screen: usize) -> Vec<String> {
    device
        .actions()
        .into_iter()
        .filter(|a| a.screen == screen && a.accepted && a.action == NodeAction::Click)
        .map(|a| a.label)
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_end_to_end_reaches_completed_in_five_transitions() {
    let mut h = harness(happy_path());

    h.engine.start("10.0.0.5", Some("DESKTOP-1")).await.unwrap();
    run_for(60).await;

    let status = h.engine.status();
    assert_eq!(status.state, ConnectionState::Completed);
    assert_eq!(status.transitions, 5);
    assert_eq!(status.retries_recorded, 0);

    let events = drain(&mut h.events);
    assert_eq!(
        state_changes(&events),
        vec![
            (ConnectionState::LaunchApp, ConnectionState::FindAddButton),
            (ConnectionState::FindAddButton, ConnectionState::EnterAddress),
            (ConnectionState::EnterAddress, ConnectionState::FindHostButton),
            (ConnectionState::FindHostButton, ConnectionState::SelectDesktop),
            (ConnectionState::SelectDesktop, ConnectionState::Completed),
        ]
    );
    assert!(!events
        .iter()
        .any(|e| matches!(e, EngineEvent::RetryScheduled { .. } | EngineEvent::GaveUp { .. })));

    assert_eq!(
        h.device.clicks(),
        vec!["Add PC", "OK", "DESKTOP-1", "Desktop", "Resume Session"]
    );
    assert!(h.device.actions().iter().any(|a| a.action == NodeAction::SetText("10.0.0.5".into())));
    assert_eq!(h.device.launches(), vec![PKG.to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_add_button_is_third_clickable() {
    let mut h = harness(vec![Screen::new(window(vec![
        icon("One", 0),
        icon("Two", 100),
        icon("Three", 200),
    ]))]);

    h.engine.start("10.0.0.5", None).await.unwrap();
    run_for(3).await;

    assert_eq!(h.device.clicks().first().map(String::as_str), Some("Three"));
    let changes = state_changes(&drain(&mut h.events));
    assert!(changes.contains(&(ConnectionState::FindAddButton, ConnectionState::EnterAddress)));
}

#[tokio::test(start_paused = true)]
async fn test_fewer_than_three_clickables_keeps_waiting() {
    let h = harness(vec![Screen::new(window(vec![
        icon("One", 0),
        icon("Two", 100),
    ]))]);

    h.engine.start("10.0.0.5", None).await.unwrap();
    for _ in 0..5 {
        run_for(2).await;
        h.engine
            .on_foreground_changed(ForegroundEvent::new(PKG, ForegroundEventKind::ContentChanged));
    }
    run_for(2).await;

    let status = h.engine.status();
    assert_eq!(status.state, ConnectionState::FindAddButton);
    assert_eq!(status.retries_recorded, 0);
    assert!(h.device.clicks().is_empty());
    // Events re-evaluate the screen once the settle timer has fired
    assert!(h.device.snapshot_requests() >= 3);
}

#[tokio::test(start_paused = true)]
async fn test_exact_host_preferred_over_partial() {
    let mut screens = happy_path();
    screens[2] = host_list(&["DESKTOP-10", "DESKTOP-1"], "DESKTOP-1");
    let h = harness(screens);

    h.engine.start("10.0.0.5", Some("DESKTOP-1")).await.unwrap();
    run_for(60).await;

    assert_eq!(clicks_on_screen(&h.device, 2), vec!["DESKTOP-1"]);
}

#[tokio::test(start_paused = true)]
async fn test_host_name_falls_back_to_registry() {
    let mut screens = happy_path();
    screens[2] = host_list(&["LAPTOP", "DESKTOP-1"], "DESKTOP-1");
    let h = harness(screens);
    h.registry.put("10.0.0.5", "DESKTOP-1").unwrap();

    h.engine.start("10.0.0.5", None).await.unwrap();
    run_for(60).await;

    assert_eq!(clicks_on_screen(&h.device, 2), vec!["DESKTOP-1"]);
    let status = h.engine.status();
    assert_eq!(status.state, ConnectionState::Completed);
    assert_eq!(status.target_host_name.as_deref(), Some("DESKTOP-1"));
}

#[tokio::test(start_paused = true)]
async fn test_select_desktop_gives_up_after_bounded_retries() {
    let mut screens = happy_path();
    screens[2] = host_list(&["GAMING-PC"], "GAMING-PC");
    screens[3] = Screen::new(window(vec![
        grid(vec![tile("Desktop", 0)]),
        button("Back", 1700),
    ]));
    let mut h = harness(screens);
    h.device.refuse_clicks_on("desktop");

    h.engine.start("10.0.0.5", Some("GAMING-PC")).await.unwrap();
    run_for(60).await;

    let status = h.engine.status();
    assert_eq!(status.state, ConnectionState::Completed);
    assert_eq!(status.retries_recorded, 3);

    let events = drain(&mut h.events);
    let retries: Vec<u32> = events
        .iter()
        .filter_map(|e| match e {
            EngineEvent::RetryScheduled { state, attempt, .. }
                if *state == ConnectionState::SelectDesktop =>
            {
                Some(*attempt)
            }
            _ => None,
        })
        .collect();
    assert_eq!(retries, vec![1, 2, 3]);
    assert!(events.iter().any(|e| matches!(
        e,
        EngineEvent::GaveUp {
            state: ConnectionState::SelectDesktop,
            ..
        }
    )));
    assert!(clicks_on_screen(&h.device, 3).is_empty());
    assert_eq!(
        state_changes(&events).last(),
        Some(&(ConnectionState::SelectDesktop, ConnectionState::Completed))
    );
}

fn retry_attempts(events: &[EngineEvent], in_state: ConnectionState) -> Vec<u32> {
    events
        .iter()
        .filter_map(|e| match e {
            EngineEvent::RetryScheduled { state, attempt, .. } if *state == in_state => {
                Some(*attempt)
            }
            _ => None,
        })
        .collect()
}

fn gave_up_in(events: &[EngineEvent], in_state: ConnectionState) -> bool {
    events
        .iter()
        .any(|e| matches!(e, EngineEvent::GaveUp { state, .. } if *state == in_state))
}

#[tokio::test(start_paused = true)]
async fn test_host_list_gives_up_after_screen_waits() {
    let mut screens = happy_path();
    // Loading screen that never settles
    screens[2] = Screen::new(window(vec![icon("Refresh", 0)]));
    let mut h = harness(screens);

    h.engine.start("10.0.0.5", Some("DESKTOP-1")).await.unwrap();
    run_for(60).await;

    let status = h.engine.status();
    assert_eq!(status.state, ConnectionState::Completed);
    assert_eq!(status.retries_recorded, 5);

    let events = drain(&mut h.events);
    assert_eq!(
        retry_attempts(&events, ConnectionState::FindHostButton),
        vec![1, 2, 3, 4, 5]
    );
    assert!(gave_up_in(&events, ConnectionState::FindHostButton));
    assert_eq!(
        state_changes(&events).last(),
        Some(&(ConnectionState::FindHostButton, ConnectionState::Completed))
    );
    assert_eq!(h.device.clicks(), vec!["Add PC", "OK"]);
}

#[tokio::test(start_paused = true)]
async fn test_enter_address_gives_up_without_field() {
    let mut screens = happy_path();
    screens[1] = Screen::new(window(vec![
        NodeSpec::new("android.widget.TextView")
            .text("Add PC manually")
            .bounds(40, 600, 680, 680),
        button("OK", 900),
        button("Cancel", 1100),
    ]));
    let mut h = harness(screens);

    h.engine.start("10.0.0.5", Some("DESKTOP-1")).await.unwrap();
    run_for(60).await;

    let status = h.engine.status();
    assert_eq!(status.state, ConnectionState::Completed);
    assert_eq!(status.retries_recorded, 3);

    let events = drain(&mut h.events);
    assert_eq!(
        retry_attempts(&events, ConnectionState::EnterAddress),
        vec![1, 2, 3]
    );
    assert!(gave_up_in(&events, ConnectionState::EnterAddress));
    assert_eq!(
        state_changes(&events).last(),
        Some(&(ConnectionState::EnterAddress, ConnectionState::Completed))
    );
    assert!(!h
        .device
        .actions()
        .iter()
        .any(|a| matches!(a.action, NodeAction::SetText(_))));
}

#[tokio::test(start_paused = true)]
async fn test_stop_makes_pending_timers_no_ops() {
    let h = harness(happy_path());

    h.engine.start("10.0.0.5", Some("DESKTOP-1")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(h.engine.status().state, ConnectionState::FindAddButton);

    h.engine.stop().await.unwrap();
    assert_eq!(h.engine.status().state, ConnectionState::Completed);

    run_for(30).await;
    assert_eq!(h.engine.status().state, ConnectionState::Completed);
    assert_eq!(h.device.snapshot_requests(), 0);
    assert!(h.device.actions().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_stop_mid_sequence() {
    let h = harness(happy_path());

    h.engine.start("10.0.0.5", Some("DESKTOP-1")).await.unwrap();
    // Address typed, confirm still pending
    tokio::time::sleep(Duration::from_millis(4000)).await;
    assert_eq!(h.engine.status().state, ConnectionState::EnterAddress);

    h.engine.stop().await.unwrap();
    run_for(30).await;

    assert_eq!(h.device.clicks(), vec!["Add PC"]);
    assert_eq!(h.engine.status().state, ConnectionState::Completed);
}

#[tokio::test(start_paused = true)]
async fn test_restart_discards_previous_session() {
    let mut h = harness(happy_path());

    let first = h.engine.start("10.0.0.5", Some("DESKTOP-1")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    let second = h.engine.start("10.0.0.5", Some("DESKTOP-1")).await.unwrap();
    assert_ne!(first, second);

    let status = h.engine.status();
    assert_eq!(status.session_id, Some(second));
    assert_eq!(status.step_retry_count, 0);

    run_for(60).await;

    let status = h.engine.status();
    assert_eq!(status.state, ConnectionState::Completed);
    assert_eq!(status.transitions, 5);
    assert_eq!(h.device.launches().len(), 2);
    assert_eq!(
        h.device.clicks(),
        vec!["Add PC", "OK", "DESKTOP-1", "Desktop", "Resume Session"]
    );

    let events = drain(&mut h.events);
    let first_changes = events
        .iter()
        .filter(|e| e.session_id() == first && matches!(e, EngineEvent::StateChanged { .. }))
        .count();
    assert_eq!(first_changes, 1);
}

#[tokio::test(start_paused = true)]
async fn test_resume_session_preferred_in_dialog() {
    let mut screens = happy_path();
    screens[4] = Screen::new(window(vec![
        NodeSpec::new("android.widget.LinearLayout")
            .bounds(40, 600, 1040, 800)
            .clickable()
            .child(
                NodeSpec::new("android.widget.TextView")
                    .text("Resume playback where you left off")
                    .bounds(40, 600, 1040, 800),
            ),
        button("Resume Session", 900),
    ]))
    .advance_on(Trigger::ClickOn("Resume Session".into()));
    let h = harness(screens);

    h.engine.start("10.0.0.5", Some("DESKTOP-1")).await.unwrap();
    run_for(60).await;

    assert_eq!(clicks_on_screen(&h.device, 4), vec!["Resume Session"]);
    assert_eq!(h.engine.status().transitions, 5);
}

#[tokio::test(start_paused = true)]
async fn test_unresolved_dialog_still_completes() {
    let mut screens = happy_path();
    screens[4] = Screen::new(window(vec![
        NodeSpec::new("android.widget.LinearLayout")
            .bounds(40, 900, 680, 1020)
            .child(button("Resume Session", 900)),
        NodeSpec::new("android.widget.LinearLayout")
            .bounds(40, 1100, 680, 1220)
            .child(button("Cancel", 1100)),
    ]));
    let h = harness(screens);
    h.device.refuse_clicks_on("resume");

    h.engine.start("10.0.0.5", Some("DESKTOP-1")).await.unwrap();
    run_for(60).await;

    let status = h.engine.status();
    assert_eq!(status.state, ConnectionState::Completed);
    assert_eq!(status.transitions, 5);
    assert!(!status.dialog_check_in_flight);
    // Blind clicks are the last resort
    assert_eq!(clicks_on_screen(&h.device, 4), vec!["Cancel"]);
}

#[tokio::test(start_paused = true)]
async fn test_set_text_falls_back_to_select_all() {
    let h = harness(happy_path());
    h.device.fail_set_text(1);

    h.engine.start("10.0.0.5", Some("DESKTOP-1")).await.unwrap();
    run_for(60).await;

    let status = h.engine.status();
    assert_eq!(status.state, ConnectionState::Completed);
    assert_eq!(status.transitions, 5);
    assert!(h
        .device
        .actions()
        .iter()
        .any(|a| a.action == NodeAction::SelectAll));
}

#[tokio::test(start_paused = true)]
async fn test_host_list_waits_for_loading_screen() {
    let mut screens = happy_path();
    screens.insert(2, Screen::new(window(vec![icon("Refresh", 0)])));
    let h = harness(screens);

    h.engine.start("10.0.0.5", Some("DESKTOP-1")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(8000)).await;
    assert_eq!(h.engine.status().state, ConnectionState::FindHostButton);
    h.device.set_screen(3);

    run_for(60).await;
    let status = h.engine.status();
    assert_eq!(status.state, ConnectionState::Completed);
    assert_eq!(status.transitions, 5);
    assert_eq!(status.retries_recorded, 2);
}

#[tokio::test(start_paused = true)]
async fn test_missing_app_ends_session() {
    let mut h = harness(happy_path());
    h.device.set_launch_behavior(LaunchBehavior::Missing);

    h.engine.start("10.0.0.5", Some("DESKTOP-1")).await.unwrap();
    run_for(10).await;

    assert_eq!(h.engine.status().state, ConnectionState::Completed);
    assert_eq!(h.device.snapshot_requests(), 0);
    let events = drain(&mut h.events);
    assert!(events.iter().any(|e| matches!(
        e,
        EngineEvent::GaveUp {
            state: ConnectionState::LaunchApp,
            ..
        }
    )));
}
