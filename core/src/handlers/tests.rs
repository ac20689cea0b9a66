//! Tests for the step handlers

use std::time::Duration;

use serde_json::{json, Value as JsonValue};

use super::input::{CHOICE_REJECTION, PATTERN_REJECTION};
use super::links::LINK_REJECTION;
use super::*;
use crate::flow::Step;
use crate::functions::FunctionDictionary;
use crate::handle::{InputStatus, Interrupted};
use crate::network::HttpMethod;
use crate::test_helpers::{FakeHttp, ScriptedPrompt, TestBed};

fn step(value: JsonValue) -> Step {
    serde_json::from_value(value).expect("step should deserialize")
}

/* ===================== switch ===================== */

#[tokio::test]
async fn test_switch_merges_case_without_touching_original() {
    let bed = TestBed::new().with_storage(json!({ "mode": "a" }));
    let original = step(json!({
        "msg": "original",
        "next": "/end",
        "switch": {
            "variable": "mode",
            "cases": { "a": { "msg": "case a" } },
            "default": { "msg": "fallback" }
        }
    }));
    let before = original.clone();

    let mut prompt = ScriptedPrompt::empty();
    let mut handle = bed.handle(&original, &mut prompt);
    SwitchHandler.process(&mut handle).await.unwrap();

    let effective = handle.step().clone();
    assert_eq!(effective.message, Some("case a".into()));
    assert_eq!(effective.next.as_deref(), Some("/end"));
    assert!(effective.switch.is_none());
    drop(handle);
    assert_eq!(original, before);
}

#[tokio::test]
async fn test_switch_default_and_undefined() {
    let bed = TestBed::new();
    let authored = step(json!({
        "switch": {
            "variable": "missing",
            "cases": { "undefined": { "msg": "was undefined" } },
            "default": { "msg": "fallback" }
        }
    }));

    let (result, outcome) = bed.run(&authored, &[]).await;
    result.unwrap();
    assert_eq!(bed.outputs(), vec!["was undefined"]);
    assert!(outcome.step.switch.is_none());
}

#[tokio::test]
async fn test_switch_without_match_keeps_step() {
    let bed = TestBed::new().with_storage(json!({ "n": 3 }));
    let authored = step(json!({
        "msg": "plain",
        "switch": { "variable": "n", "cases": { "1": { "msg": "one" } } }
    }));

    let (_, outcome) = bed.run(&authored, &[]).await;
    assert_eq!(bed.outputs(), vec!["plain"]);
    assert!(outcome.step.switch.is_none());
}

/* ===================== clear / message / next ===================== */

#[tokio::test]
async fn test_clear_then_message() {
    let bed = TestBed::new().with_storage(json!({ "name": "Ada" }));
    let authored = step(json!({ "clearVariables": true, "msg": "Hi {{name}}" }));

    bed.run(&authored, &[]).await.0.unwrap();
    assert_eq!(bed.outputs(), vec!["Hi {{name}}"]);
    assert_eq!(bed.storage.snapshot(), json!({}));
}

#[tokio::test]
async fn test_message_fragments_are_expanded() {
    let bed = TestBed::new().with_storage(json!({ "user": { "name": "Sam" } }));
    let authored = step(json!({ "msg": ["Hello, ", "{{user.name}}", "!"] }));

    bed.run(&authored, &[]).await.0.unwrap();
    assert_eq!(bed.outputs(), vec!["Hello, Sam!"]);
}

#[tokio::test]
async fn test_next_is_expanded_and_parsed() {
    let bed = TestBed::new().with_storage(json!({ "_continue": "/shop[2]" }));

    let (_, outcome) = bed.run(&step(json!({ "next": "{{_continue}}" })), &[]).await;
    assert_eq!(outcome.next_link, Some(Location::new("/shop", 2)));

    let (result, _) = bed.run(&step(json!({ "next": "/bad[x]" })), &[]).await;
    assert!(matches!(result, Err(FlowError::InvalidLocation(_))));
}

#[tokio::test]
async fn test_structural_next_is_kept_without_directives() {
    let bed = TestBed::new();
    let (result, outcome) = bed.run(&Step::default(), &[]).await;
    result.unwrap();
    assert_eq!(outcome.next_link, Some(Location::new("/start", 1)));
    assert!(!outcome.input_requested);
}

/* ===================== input ===================== */

#[tokio::test]
async fn test_set_input_does_not_wait() {
    let bed = TestBed::new().with_storage(json!({ "name": "Kim" }));
    let authored = step(json!({
        "input": { "type": "set", "var": "greeting", "value": { "to": "{{name}}" }, "expandValue": true }
    }));

    let (_, outcome) = bed.run(&authored, &[]).await;
    assert!(!outcome.input_requested);
    assert_eq!(bed.get("greeting"), Some(json!({ "to": "Kim" })));
}

#[tokio::test]
async fn test_text_input_with_pattern() {
    let bed = TestBed::new();
    let authored = step(json!({
        "msg": "Email?",
        "input": { "type": "text", "var": "user.email", "pattern": "^[\\w-.]+@([\\w-]+\\.)+[\\w-]{2,4}$" }
    }));

    let (_, rejected) = bed.run(&authored, &["invalid@emailcom"]).await;
    assert_eq!(rejected.input_status, InputStatus::Rejected);
    assert_eq!(rejected.rejection.as_deref(), Some(PATTERN_REJECTION));
    assert_eq!(bed.get("user.email"), None);

    let (_, accepted) = bed.run(&authored, &["valid@email.com"]).await;
    assert_eq!(accepted.input_status, InputStatus::Accepted);
    assert_eq!(bed.get("user.email"), Some(json!("valid@email.com")));
}

#[tokio::test]
async fn test_choice_input() {
    let bed = TestBed::new();
    let authored = step(json!({
        "input": {
            "type": "choice",
            "var": "color",
            "choices": { "1": "Black", "2": "White" },
            "rejectMsg": "Pick 1 or 2"
        }
    }));

    let (_, rejected) = bed.run(&authored, &["99"]).await;
    assert_eq!(rejected.input_status, InputStatus::Rejected);
    assert_eq!(rejected.rejection.as_deref(), Some("Pick 1 or 2"));

    let (_, accepted) = bed.run(&authored, &["1"]).await;
    assert_eq!(accepted.input_status, InputStatus::Accepted);
    assert_eq!(bed.get("color"), Some(json!("Black")));
}

#[tokio::test]
async fn test_choice_default_rejection() {
    let bed = TestBed::new();
    let authored = step(json!({
        "input": { "type": "choice", "var": "c", "choices": { "y": true } }
    }));
    let (_, outcome) = bed.run(&authored, &["n"]).await;
    assert_eq!(outcome.rejection.as_deref(), Some(CHOICE_REJECTION));
}

#[tokio::test]
async fn test_input_authoring_errors() {
    let bed = TestBed::new();

    let (result, outcome) = bed
        .run(&step(json!({ "input": { "type": "text" } })), &["x"])
        .await;
    assert!(matches!(result, Err(FlowError::MissingProperty { ref property, .. }) if property == "variable"));
    assert!(!outcome.input_requested);

    let (result, outcome) = bed
        .run(&step(json!({ "input": { "type": "text", "var": "a", "pattern": "([" } })), &["x"])
        .await;
    assert!(matches!(result, Err(FlowError::InvalidPattern { .. })));
    assert!(!outcome.input_requested);
}

#[tokio::test]
async fn test_interrupted_input_halts_pipeline() {
    let bed = TestBed::new();
    let authored = step(json!({
        "input": { "type": "text", "var": "a" },
        "execute": { "fn": "never" }
    }));

    let (result, outcome) = bed.run(&authored, &[]).await;
    result.unwrap();
    assert_eq!(outcome.interrupted, Some(Interrupted::Aborted));
    // execute never ran, so nothing was reported
    assert!(bed.errors().is_empty());
}

/* ===================== links ===================== */

#[tokio::test]
async fn test_links_follow_input() {
    let bed = TestBed::new();
    let authored = step(json!({ "links": { "1": "/one", "2": "/two[1]" } }));

    let (_, outcome) = bed.run(&authored, &["2"]).await;
    assert_eq!(outcome.next_link, Some(Location::new("/two", 1)));
    assert_eq!(outcome.input_status, InputStatus::None);

    let (_, outcome) = bed.run(&authored, &["3"]).await;
    assert_eq!(outcome.input_status, InputStatus::Rejected);
    assert_eq!(outcome.rejection.as_deref(), Some(LINK_REJECTION));
}

#[tokio::test]
async fn test_accepted_input_survives_link_rejection() {
    let bed = TestBed::new();
    let authored = step(json!({
        "input": { "type": "text", "var": "answer" },
        "links": { "menu": "/menu" }
    }));

    let (_, outcome) = bed.run(&authored, &["hello"]).await;
    assert_eq!(outcome.input_status, InputStatus::Accepted);
    assert_eq!(outcome.input.as_deref(), Some("hello"));
    assert_eq!(bed.get("answer"), Some(json!("hello")));
}

/* ===================== execute ===================== */

fn add_functions() -> FunctionDictionary {
    FunctionDictionary::new().with_fn("add", |args| {
        let integers: Option<Vec<i64>> = args.iter().map(JsonValue::as_i64).collect();
        Ok(Some(match integers {
            Some(integers) => json!(integers.iter().sum::<i64>()),
            None => json!(args.iter().filter_map(JsonValue::as_f64).sum::<f64>()),
        }))
    })
}

#[tokio::test]
async fn test_execute_expands_lone_placeholders() {
    let bed = TestBed::new()
        .with_storage(json!({ "a": 1, "b": 2 }))
        .with_functions(add_functions());
    let authored = step(json!({
        "execute": { "outputVariable": "total", "function": "add", "args": ["{{a}}", 100, "{{b}}"] }
    }));

    bed.run(&authored, &[]).await.0.unwrap();
    assert_eq!(bed.get("total"), Some(json!(103)));
}

#[tokio::test]
async fn test_execute_passes_null_for_undefined_and_raw_when_disabled() {
    let captured = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = captured.clone();
    let functions = FunctionDictionary::new().with_fn("capture", move |args| {
        sink.lock().unwrap().push(args);
        Ok(None)
    });
    let bed = TestBed::new().with_functions(functions);

    bed.run(
        &step(json!({ "execute": { "var": "out", "fn": "capture", "args": ["{{nope}}", "x {{nope}}"] } })),
        &[],
    )
    .await
    .0
    .unwrap();
    bed.run(
        &step(json!({ "execute": { "fn": "capture", "args": ["{{nope}}"], "expandArgs": false } })),
        &[],
    )
    .await
    .0
    .unwrap();

    let calls = captured.lock().unwrap().clone();
    assert_eq!(calls[0], vec![JsonValue::Null, json!("x {{nope}}")]);
    assert_eq!(calls[1], vec![json!("{{nope}}")]);
    // None means undefined: nothing stored
    assert_eq!(bed.get("out"), None);
}

#[tokio::test]
async fn test_execute_failures_are_reported() {
    let functions = FunctionDictionary::new().with_fn("boom", |_| anyhow::bail!("kaput"));
    let bed = TestBed::new().with_functions(functions);

    let (result, _) = bed
        .run(&step(json!({ "execute": { "fn": "boom" }, "msg": "still here" })), &[])
        .await;
    result.unwrap();
    bed.run(&step(json!({ "execute": { "fn": "ghost" } })), &[]).await.0.unwrap();

    assert_eq!(bed.outputs(), vec!["still here"]);
    let errors = bed.errors();
    assert_eq!(errors.len(), 2);
    assert!(errors[0].contains("function 'boom' failed") && errors[0].contains("kaput"));
    assert!(errors[1].contains("function 'ghost' not found"));
}

/* ===================== request ===================== */

#[tokio::test]
async fn test_request_stores_json_or_text() {
    let http = FakeHttp::default().respond(r#"{"id": 7}"#).respond("plain");
    let bed = TestBed::new()
        .with_storage(json!({ "id": 7, "token": "t0k" }))
        .with_http(http);

    let authored = step(json!({
        "request": {
            "var": "user",
            "url": "https://api.test/users/{{id}}",
            "headers": { "Authorization": "Bearer {{token}}" }
        }
    }));
    bed.run(&authored, &[]).await.0.unwrap();
    bed.run(&step(json!({ "request": { "var": "raw", "url": "https://api.test/raw" } })), &[])
        .await
        .0
        .unwrap();

    assert_eq!(bed.get("user"), Some(json!({ "id": 7 })));
    assert_eq!(bed.get("raw"), Some(json!("plain")));

    let requests = bed.http.requests();
    assert_eq!(requests[0].url, "https://api.test/users/7");
    assert_eq!(requests[0].method, HttpMethod::Get);
    assert_eq!(requests[0].headers["Authorization"], "Bearer t0k");
}

#[tokio::test]
async fn test_request_post_body_is_expanded() {
    let bed = TestBed::new()
        .with_storage(json!({ "qty": 3 }))
        .with_http(FakeHttp::default().respond("ok"));

    let authored = step(json!({
        "request": { "url": "https://api.test/order", "method": "POST", "body": { "qty": "{{qty}}" } }
    }));
    bed.run(&authored, &[]).await.0.unwrap();

    assert_eq!(bed.http.requests()[0].body, Some(json!({ "qty": 3 })));
}

#[tokio::test]
async fn test_get_with_body_is_refused() {
    let bed = TestBed::new();
    let authored = step(json!({
        "request": { "url": "https://api.test", "method": "GET", "body": {} }
    }));

    bed.run(&authored, &[]).await.0.unwrap();
    assert!(bed.http.requests().is_empty());
    assert!(bed.errors()[0].contains("GET request with a body"));
}

#[tokio::test]
async fn test_request_failure_goes_to_fail_next() {
    let bed = TestBed::new().with_http(FakeHttp::default().fail("connection refused"));
    let authored = step(json!({
        "request": { "var": "out", "url": "https://down.test", "failNext": "/offline" }
    }));

    let (result, outcome) = bed.run(&authored, &[]).await;
    result.unwrap();
    assert_eq!(outcome.next_link, Some(Location::page("/offline")));
    assert_eq!(bed.get("out"), None);
    assert!(bed.errors()[0].contains("connection refused"));
}

/* ===================== delay ===================== */

#[tokio::test(start_paused = true)]
async fn test_delay_waits() {
    let bed = TestBed::new();
    let started = tokio::time::Instant::now();

    let (_, outcome) = bed.run(&step(json!({ "delay": 1.5 })), &[]).await;
    assert!(outcome.interrupted.is_none());
    assert!(started.elapsed() >= Duration::from_millis(1500));
}

#[tokio::test(start_paused = true)]
async fn test_delay_is_aborted_by_cancel() {
    let bed = TestBed::new();
    bed.cancel.cancel();

    let (_, outcome) = bed.run(&step(json!({ "delay": 30 })), &[]).await;
    assert_eq!(outcome.interrupted, Some(Interrupted::Aborted));
}

#[tokio::test(start_paused = true)]
async fn test_delay_out_of_range_is_an_error() {
    let bed = TestBed::new();
    let started = tokio::time::Instant::now();

    let (result, outcome) = bed.run(&step(json!({ "msg": "hi", "delay": 1e20 })), &[]).await;
    assert!(matches!(
        result,
        Err(FlowError::InvalidDelay { seconds, .. }) if seconds == 1e20
    ));
    assert!(outcome.interrupted.is_none());
    assert_eq!(outcome.next_link, Some(Location::new("/start", 1)));
    assert_eq!(bed.outputs(), ["hi"]);
    assert_eq!(started.elapsed(), Duration::ZERO);
}

/* ===================== pipeline ===================== */

#[test]
fn test_default_order() {
    let names: Vec<_> = default_handlers().iter().map(|h| h.name()).collect();
    assert_eq!(
        names,
        ["switch", "clear", "message", "next", "input", "links", "execute", "request", "delay"]
    );
}
