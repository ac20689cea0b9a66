use std::time::Duration;

use serde_json::json;

use super::helpers::{drain, engine_with, recording};
use crate::config::EngineConfig;
use crate::engine::{EngineEvent, Status};
use crate::flow::Location;

fn idle_after(secs: f64) -> EngineConfig {
    EngineConfig {
        idle_after_secs: Some(secs),
        ..recording()
    }
}

#[tokio::test(start_paused = true)]
async fn test_idle_detour_returns_to_the_waiting_step() {
    let engine = engine_with(
        r#"{
            "/start": [
                { "message": "start" },
                { "message": "1" },
                { "message": "2", "input": { "type": "text", "variable": "answer" } }
            ],
            "/on-idle": [
                { "message": "idle 1" },
                { "message": "idle 2" },
                { "next": "{{_continue}}" }
            ]
        }"#,
        idle_after(30.0),
    );
    let mut events = engine.subscribe();

    engine.start().await.unwrap();
    assert_eq!(engine.recorded_outputs(), vec!["start", "1", "2"]);

    tokio::time::sleep(Duration::from_secs(31)).await;

    assert_eq!(
        engine.recorded_outputs(),
        vec!["start", "1", "2", "idle 1", "idle 2", "2"]
    );
    assert_eq!(engine.storage().get_value("_continue"), Some(json!("/start[2]")));
    assert_eq!(engine.location(), Some(Location::new("/start", 2)));
    assert_eq!(engine.status(), Status::WaitingInput);

    let idled: Vec<_> = drain(&mut events)
        .into_iter()
        .filter_map(|event| match event {
            EngineEvent::Idle { location, .. } => Some(location),
            _ => None,
        })
        .collect();
    assert_eq!(idled, vec![Location::new("/start", 2)]);

    engine.input_async("42").await.unwrap();
    assert_eq!(engine.storage().get_value("answer"), Some(json!("42")));
    engine.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_idle_without_idle_page_keeps_waiting() {
    let engine = engine_with(
        r#"{
            "/start": [
                { "message": "name?", "input": { "type": "text", "variable": "name" } },
                { "message": "hi {{name}}", "input": { "type": "text", "variable": "x" } }
            ]
        }"#,
        idle_after(5.0),
    );
    let mut events = engine.subscribe();

    engine.start().await.unwrap();
    tokio::time::sleep(Duration::from_secs(60)).await;

    assert_eq!(engine.status(), Status::WaitingInput);
    let idle_events = drain(&mut events)
        .into_iter()
        .filter(|event| matches!(event, EngineEvent::Idle { .. }))
        .count();
    assert_eq!(idle_events, 1);

    engine.input_async("Ann").await.unwrap();
    assert_eq!(engine.recorded_outputs(), vec!["name?", "hi Ann"]);
    engine.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_idle_threshold_from_document() {
    let engine = engine_with(
        r#"{
            "pages": {
                "/start": [{ "message": "waiting", "input": { "type": "text", "variable": "x" } }],
                "/on-idle": [{ "message": "still there?", "input": { "type": "text", "variable": "x" } }]
            },
            "settings": { "timeThresholdForIdle": 10 }
        }"#,
        recording(),
    );

    engine.start().await.unwrap();
    tokio::time::sleep(Duration::from_secs(11)).await;

    assert_eq!(engine.recorded_outputs(), vec!["waiting", "still there?"]);
    engine.stop().await;
}
