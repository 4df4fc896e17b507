mod common;

use axnav_engine::backend::ProviderError;
use axnav_engine::protocol::{
    ActionKind, InvocationOutcome, Intent, Node, NodeId, StepAction, StepStatus,
};
use axnav_engine::session::{FailureCode, SessionStatus, StartPolicy};
use common::{context, engine, engine_with, fast_config, page, MockPage};
use std::sync::Arc;
use std::time::Duration;

fn flight_form() -> Vec<Node> {
    vec![
        Node::new("1", "textbox", "From"),
        Node::new("2", "textbox", "To"),
        Node::new("3", "button", "Search"),
    ]
}

fn flight_search() -> Intent {
    Intent::new(ActionKind::Search, "flights")
        .with_entity("origin", "Istanbul")
        .with_entity("destination", "Berlin")
}

fn statuses(report: &axnav_engine::SessionReport) -> Vec<StepStatus> {
    report.results.iter().map(|r| r.status).collect()
}

#[tokio::test]
async fn test_navigation_resumes_with_reresolved_step() {
    let mock = MockPage::new(page("s1", flight_form()));
    // Step 2 lands on a new page where every node has a new id.
    mock.navigate_on(
        "2",
        page(
            "s2",
            vec![
                Node::new("10", "textbox", "From").with_value("Istanbul"),
                Node::new("11", "textbox", "To").with_value("Berlin"),
                Node::new("20", "button", "Search"),
            ],
        ),
    );
    let engine = engine(&mock);

    let report = engine
        .submit(&context(), flight_search(), StartPolicy::Reject)
        .await
        .unwrap();

    assert_eq!(report.status, SessionStatus::Completed);
    assert_eq!(mock.invoked_ids(), vec!["1", "2", "3"]);
    assert_eq!(mock.navigation_waits(), 1);

    let invocations = mock.invocations();
    let last = invocations[2].target.as_ref().unwrap();
    assert_eq!(last.snapshot.0, "s2");
    assert_eq!(last.node, NodeId::new("20"));

    // One result per planned step, no replays.
    let ids: Vec<_> = report.results.iter().map(|r| r.step_id.as_str()).collect();
    assert_eq!(ids, vec!["1", "2", "3"]);
    assert!(report.results.iter().all(|r| r.status == StepStatus::Success));

    // The plan keeps the re-resolved target.
    let plan = report.plan.unwrap();
    assert_eq!(plan.steps[2].target.as_ref().unwrap().to_string(), "20@s2");
}

#[tokio::test]
async fn test_failed_capture_after_navigation_does_not_replay_old_ids() {
    let mock = MockPage::new(page("s1", flight_form()));
    // The first capture on the new page fails; the old ids must not leak
    // into step 3.
    mock.navigate_unsettled(
        "2",
        page(
            "s2",
            vec![
                Node::new("10", "textbox", "From").with_value("Istanbul"),
                Node::new("11", "textbox", "To").with_value("Berlin"),
                Node::new("20", "button", "Search"),
            ],
        ),
        1,
    );
    let engine = engine(&mock);

    let report = engine
        .submit(&context(), flight_search(), StartPolicy::Reject)
        .await
        .unwrap();

    assert_eq!(report.status, SessionStatus::Completed);
    assert_eq!(mock.navigation_waits(), 1);
    let invocations = mock.invocations();
    assert_eq!(invocations.len(), 3);
    let last = invocations[2].target.as_ref().unwrap();
    assert_eq!(last.snapshot.0, "s2");
    assert_eq!(last.node, NodeId::new("20"));
    assert_eq!(statuses(&report), vec![StepStatus::Success; 3]);
}

#[tokio::test]
async fn test_calendar_cell_is_resolved_when_reached() {
    let mock = MockPage::new(page(
        "s1",
        vec![
            Node::new("1", "textbox", "From"),
            Node::new("2", "textbox", "To"),
            Node::new("3", "button", "Check-in date"),
            Node::new("4", "button", "Search"),
        ],
    ));
    mock.mutate_on(
        "3",
        page(
            "s2",
            vec![
                Node::new("1", "textbox", "From"),
                Node::new("2", "textbox", "To"),
                Node::new("3", "button", "Check-in date"),
                Node::new("5", "grid", "March 2026"),
                Node::new("6", "gridcell", "13").with_parent("5"),
                Node::new("7", "gridcell", "14").with_parent("5"),
                Node::new("4", "button", "Search"),
            ],
        ),
    );
    let engine = engine(&mock);

    let intent = flight_search().with_entity("date", "2026-03-14");
    let report = engine
        .submit(&context(), intent, StartPolicy::Reject)
        .await
        .unwrap();

    assert_eq!(report.status, SessionStatus::Completed);
    let invocations = mock.invocations();
    assert_eq!(invocations.len(), 5);
    assert_eq!(invocations[3].target.as_ref().unwrap().to_string(), "7@s2");
    assert_eq!(invocations[4].target.as_ref().unwrap().to_string(), "4@s2");
}

#[tokio::test]
async fn test_transient_failures_are_retried() {
    let mock = MockPage::new(page("s1", vec![Node::new("1", "button", "Buy now")]));
    mock.script("1", Err(ProviderError::timeout("click")));
    mock.script(
        "1",
        Err(ProviderError::NotActionable {
            id: NodeId::new("1"),
            reason: "covered by overlay".into(),
        }),
    );
    let engine = engine(&mock);

    let report = engine
        .submit(&context(), Intent::new(ActionKind::Click, "buy now"), StartPolicy::Reject)
        .await
        .unwrap();

    assert_eq!(report.status, SessionStatus::Completed);
    assert_eq!(report.results[0].attempts, 3);
    assert_eq!(mock.invocations().len(), 3);
}

#[tokio::test]
async fn test_exhausted_retries_fail_the_plan() {
    let mock = MockPage::new(page("s1", flight_form()));
    for _ in 0..3 {
        mock.script("1", Err(ProviderError::NotReady));
    }
    let engine = engine(&mock);

    let report = engine
        .submit(&context(), flight_search(), StartPolicy::Reject)
        .await
        .unwrap();

    assert_eq!(report.status, SessionStatus::Failed);
    let failure = report.failure.as_ref().unwrap();
    assert_eq!(failure.code, FailureCode::PlanFailed);
    assert!(failure.detail.contains("step 1"));
    assert_eq!(
        statuses(&report),
        vec![StepStatus::Failed, StepStatus::Skipped, StepStatus::Skipped]
    );
    assert_eq!(report.results[0].error_code.as_deref(), Some("NOT_READY"));
    assert_eq!(mock.invoked_ids(), vec!["1", "1", "1"]);
}

#[tokio::test]
async fn test_permanent_failure_is_not_retried() {
    let mock = MockPage::new(page("s1", flight_form()));
    mock.script("2", Ok(InvocationOutcome::rejected("field is read-only")));
    let engine = engine(&mock);

    let report = engine
        .submit(&context(), flight_search(), StartPolicy::Reject)
        .await
        .unwrap();

    assert_eq!(report.status, SessionStatus::Failed);
    assert_eq!(mock.invoked_ids(), vec!["1", "2"]);
    assert_eq!(report.results[1].attempts, 1);
    assert_eq!(report.results[1].error_code.as_deref(), Some("STEP_REJECTED"));
    assert_eq!(report.results[2].status, StepStatus::Skipped);
}

#[tokio::test]
async fn test_optional_step_failure_keeps_the_plan() {
    let mock = MockPage::new(page(
        "s1",
        vec![
            Node::new("1", "searchbox", "Search"),
            Node::new("2", "button", "Search"),
        ],
    ));
    mock.script("2", Err(ProviderError::NodeDisabled { id: NodeId::new("2") }));
    let engine = engine(&mock);

    let intent = Intent::new(ActionKind::Search, "").with_entity("query", "rust async");
    let report = engine
        .submit(&context(), intent, StartPolicy::Reject)
        .await
        .unwrap();

    assert_eq!(report.status, SessionStatus::Completed);
    assert!(report.plan.as_ref().unwrap().steps[1].optional);
    assert_eq!(statuses(&report), vec![StepStatus::Success, StepStatus::Failed]);
    assert!(report.failure.is_none());
}

#[tokio::test]
async fn test_step_timeout_counts_as_transient() {
    let mock = MockPage::new(page("s1", vec![Node::new("1", "button", "Buy now")]));
    mock.hang_on("1");
    mock.hang_on("1");
    let mut config = fast_config();
    config.supervisor.step_timeout_ms = 20;
    config.supervisor.max_retries = 1;
    let engine = engine_with(&mock, config);

    let report = engine
        .submit(&context(), Intent::new(ActionKind::Click, "buy now"), StartPolicy::Reject)
        .await
        .unwrap();

    assert_eq!(report.status, SessionStatus::Failed);
    assert_eq!(report.results[0].error_code.as_deref(), Some("TIMEOUT"));
    assert_eq!(report.results[0].attempts, 2);
}

#[tokio::test]
async fn test_cancel_stops_further_invocations() {
    let mock = MockPage::new(page("s1", flight_form()));
    mock.hang_on("1");
    let mut config = fast_config();
    config.supervisor.step_timeout_ms = 60_000;
    let engine = Arc::new(engine_with(&mock, config));

    let running = {
        let engine = engine.clone();
        tokio::spawn(async move {
            engine
                .submit(&context(), flight_search(), StartPolicy::Reject)
                .await
        })
    };

    while mock.invocations().is_empty() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let cancelled = engine.cancel(&context()).await.unwrap();
    assert_eq!(cancelled.status, SessionStatus::Failed);
    assert_eq!(cancelled.failure.as_ref().unwrap().code, FailureCode::Cancelled);

    let report = running.await.unwrap().unwrap();
    assert_eq!(report.status, SessionStatus::Failed);
    assert_eq!(mock.invoked_ids(), vec!["1"]);
    assert_eq!(
        statuses(&report),
        vec![StepStatus::Failed, StepStatus::Skipped, StepStatus::Skipped]
    );
    assert_eq!(report.results[0].error_code.as_deref(), Some("cancelled"));
}

#[tokio::test]
async fn test_targetless_steps_run_without_matching() {
    let mock = MockPage::new(page("s1", vec![]));
    let engine = engine(&mock);

    let report = engine
        .submit(
            &context(),
            Intent::new(ActionKind::Scroll, "").with_entity("scroll_direction", "up"),
            StartPolicy::Reject,
        )
        .await
        .unwrap();

    assert_eq!(report.status, SessionStatus::Completed);
    let invoked = mock.invocations();
    assert_eq!(invoked[0].action_type, StepAction::Scroll);
    assert_eq!(invoked[0].value.as_deref(), Some("up"));
}
