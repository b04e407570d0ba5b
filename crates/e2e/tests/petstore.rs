//! Petstore API suite against an in-process mock service
//!
//! Run with: cargo test --package cadence-e2e --test petstore

mod common;

use std::time::Duration;

use cadence_e2e::{CaseOutcome, HarnessConfig, JsonReporter, RunSummary, TestRunner, TestSuite};

fn config(base_url: &str) -> HarnessConfig {
    HarnessConfig {
        base_url: base_url.to_string(),
        fixtures_dir: common::repo_root().join("fixtures"),
        seed: Some(7),
        ..HarnessConfig::default()
    }
}

fn method_of(entry: &str) -> &str {
    entry.split_whitespace().next().unwrap_or_default()
}

#[tokio::test]
async fn crud_suite_passes_and_requests_arrive_in_declaration_order() {
    let mock = common::start(Duration::from_millis(300)).await;
    let suite = TestSuite::from_file(&common::repo_root().join("specs/petstore-api.yaml")).unwrap();

    let mut runner = TestRunner::new(config(&mock.base_url)).without_console();
    let summary = runner.run_suites(&[suite]).await.unwrap();

    let result = &summary.suites[0];
    assert!(result.is_success(), "{:#?}", result);
    assert_eq!(result.passed(), 9);
    assert_eq!(result.seed, 7);

    let created = result.cases[0].steps[1].output.as_ref().unwrap();
    let id = created["body"]["id"].as_i64().unwrap();

    let log = mock.requests();
    assert_eq!(
        &log[..4],
        &[
            "POST /pet".to_string(),
            format!("GET /pet/{}", id),
            "PUT /pet".to_string(),
            format!("DELETE /pet/{}", id),
        ]
    );

    // The read-after-delete check polls until the lag has passed.
    let polls = log[4..].iter().take_while(|e| **e == format!("GET /pet/{}", id)).count();
    assert!(polls >= 2, "{:?}", log);

    let tail: Vec<&str> = log[4 + polls..].iter().map(|e| method_of(e)).collect();
    assert_eq!(tail, vec!["POST", "POST", "PUT", "GET"]);
    assert_eq!(log.last().map(String::as_str), Some("GET /pet/999999999"));
}

#[tokio::test]
async fn error_bodies_of_either_shape_are_exposed() {
    let mock = common::start(Duration::ZERO).await;
    let suite = TestSuite::from_file(&common::repo_root().join("specs/petstore-api.yaml")).unwrap();

    let mut runner = TestRunner::new(config(&mock.base_url)).without_console();
    let summary = runner.run_suites(&[suite]).await.unwrap();
    let result = &summary.suites[0];

    let empty = result.case("should return 400 or 500 for missing required fields").unwrap();
    let response = empty.steps[0].output.as_ref().unwrap();
    assert_eq!(response["status"], 400);
    assert_eq!(response["error"], "No Name provided. Try again?");

    let invalid = result.case("should return 400 for invalid ID on update").unwrap();
    let response = invalid.steps[0].output.as_ref().unwrap();
    assert!(response["body"].is_string());
    assert_eq!(response["error"], response["body"]);
}

#[tokio::test]
async fn failed_create_skips_dependents_instead_of_failing_them() {
    let mock = common::start(Duration::ZERO).await;
    let suite = TestSuite::from_yaml(
        r#"
name: skip-propagation
cases:
  - name: create without a name
    steps:
      - action: request
        method: POST
        url: /pet
        body: { id: 5 }
        save: { createdPetId: body.id }
  - name: read it back
    requires: [createdPetId]
    steps:
      - action: request
        method: GET
        url: /pet/${createdPetId}
  - name: reads it without declaring
    steps:
      - action: log
        message: before the read
      - action: request
        method: GET
        url: /pet/${createdPetId}
  - name: unrelated case still runs
    steps:
      - action: request
        method: GET
        url: /pet/999999999
        fail_on_status_code: false
        expect: { status: 404 }
"#,
    )
    .unwrap();

    let mut runner = TestRunner::new(config(&mock.base_url)).without_console();
    let summary = runner.run_suites(&[suite]).await.unwrap();
    let result = &summary.suites[0];

    let outcomes: Vec<CaseOutcome> = result.cases.iter().map(|c| c.outcome).collect();
    assert_eq!(
        outcomes,
        vec![CaseOutcome::Failed, CaseOutcome::Skipped, CaseOutcome::Skipped, CaseOutcome::Passed]
    );
    assert!(result.cases[0].error.as_deref().unwrap().contains("400"));
    assert_eq!(result.cases[2].steps.len(), 2);
    assert_eq!(result.cases[2].skip_reason.as_deref(), Some("`createdPetId` was never written"));
    assert_eq!(mock.requests(), vec!["POST /pet".to_string(), "GET /pet/999999999".to_string()]);
}

#[tokio::test]
async fn state_does_not_leak_between_suite_files() {
    let writer = TestSuite::from_yaml(
        r#"
name: writer
cases:
  - name: writes
    steps:
      - { action: set, key: createdPetId, value: 42 }
      - { action: assert, path: createdPetId, equals: 42 }
"#,
    )
    .unwrap();
    let reader = TestSuite::from_yaml(
        r#"
name: reader
cases:
  - name: reads
    requires: [createdPetId]
    steps:
      - { action: assert, path: createdPetId, equals: 42 }
  - name: absence can be asserted
    steps:
      - { action: assert, path: createdPetId, exists: false }
"#,
    )
    .unwrap();

    let mut runner = TestRunner::new(HarnessConfig::default()).without_console();
    let summary = runner.run_suites(&[writer, reader]).await.unwrap();

    assert!(summary.suites[0].is_success());
    assert_eq!(summary.suites[1].cases[0].outcome, CaseOutcome::Skipped);
    assert_eq!(summary.suites[1].cases[1].outcome, CaseOutcome::Passed);
    assert_eq!(summary.skipped(), 1);
}

#[tokio::test]
async fn case_timeout_fails_only_that_case() {
    let suite = TestSuite::from_yaml(
        r#"
name: slow
case_timeout_ms: 200
cases:
  - name: hangs
    steps:
      - { action: set, key: started, value: true }
      - { action: wait, ms: 5000 }
  - name: still runs
    steps:
      - { action: assert, path: started, equals: true }
"#,
    )
    .unwrap();

    let mut runner = TestRunner::new(HarnessConfig::default()).without_console();
    let started = std::time::Instant::now();
    let summary = runner.run_suites(&[suite]).await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(3));

    let result = &summary.suites[0];
    assert_eq!(result.cases[0].outcome, CaseOutcome::Failed);
    assert!(result.cases[0].error.as_deref().unwrap().contains("case to finish"));
    assert_eq!(result.cases[0].steps.len(), 2);
    assert_eq!(result.cases[1].outcome, CaseOutcome::Passed);
}

#[tokio::test]
async fn case_timeout_inside_a_command_does_not_shadow_later_cases() {
    let suite = TestSuite::from_yaml(
        r#"
name: abandoned-command
commands:
  slow:
    params: [who]
    steps:
      - { action: log, message: "waiting on ${who}" }
      - { action: wait, ms: 5000 }
cases:
  - name: times out inside the command
    timeout_ms: 100
    steps:
      - { action: command, command: slow, args: { who: from-command-arg } }
  - name: reads shared state again
    steps:
      - { action: set, key: who, value: from-state }
      - { action: assert, path: who, equals: from-state }
"#,
    )
    .unwrap();

    let mut runner = TestRunner::new(HarnessConfig::default()).without_console();
    let summary = runner.run_suites(&[suite]).await.unwrap();
    let result = &summary.suites[0];

    assert_eq!(result.cases[0].outcome, CaseOutcome::Failed);
    assert!(result.cases[0].error.as_deref().unwrap().contains("case to finish"));
    assert_eq!(result.cases[1].outcome, CaseOutcome::Passed, "{:#?}", result.cases[1]);
}

#[tokio::test]
async fn case_requires_checks_the_whole_path() {
    let suite = TestSuite::from_yaml(
        r#"
name: dotted-requires
cases:
  - name: writes a pet without an id
    steps:
      - { action: set, key: pet, value: { name: doggie } }
  - name: needs the id
    requires: [pet.id]
    steps:
      - { action: assert, path: pet.id, exists: true }
  - name: needs the name
    requires: [pet.name]
    steps:
      - { action: assert, path: pet.name, equals: doggie }
"#,
    )
    .unwrap();

    let mut runner = TestRunner::new(HarnessConfig::default()).without_console();
    let summary = runner.run_suites(&[suite]).await.unwrap();
    let result = &summary.suites[0];

    let outcomes: Vec<CaseOutcome> = result.cases.iter().map(|c| c.outcome).collect();
    assert_eq!(outcomes, vec![CaseOutcome::Passed, CaseOutcome::Skipped, CaseOutcome::Passed]);
    assert_eq!(result.cases[1].skip_reason.as_deref(), Some("`pet.id` was never written"));
    assert!(result.cases[1].steps.is_empty());
}

#[tokio::test]
async fn json_reporter_writes_the_summary() {
    let dir = tempfile::tempdir().unwrap();
    let suite = TestSuite::from_yaml(
        r#"
name: tiny
seed: 99
cases:
  - name: generates
    steps:
      - { action: generate_id, key: id, max: 10 }
"#,
    )
    .unwrap();

    let mut runner = TestRunner::new(HarnessConfig::default())
        .without_console()
        .with_reporter(Box::new(JsonReporter::new(dir.path())));
    let summary = runner.run_suites(&[suite]).await.unwrap();

    let written: RunSummary =
        serde_json::from_str(&std::fs::read_to_string(dir.path().join("test-results.json")).unwrap()).unwrap();
    assert_eq!(written.run_id, summary.run_id);
    assert_eq!(written.suites[0].seed, 99);
    assert!(written.is_success());
}
