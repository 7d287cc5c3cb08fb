//! Worker claim/execute/finalize semantics: the end-to-end scenario,
//! failure isolation, and at-most-once claiming under concurrent ticks.

mod common;

use chrono::{Duration, Utc};
use common::*;
use leadflow::store::Store;
use leadflow::types::{JobStatus, NewLead};
use leadflow::{Config, MockMailer, Poller, StepExecutor};
use serde_json::json;
use std::sync::Arc;

const SENDER: &str = "noreply@acme.io";

fn poller_with(store: &leadflow::AnyStore, mailer: &MockMailer) -> Poller {
    let executor = StepExecutor::new(
        store.clone(),
        Arc::new(mailer.clone()),
        Some(SENDER.to_string()),
    );
    Poller::new(store.clone(), executor)
}

async fn add_lead(store: &leadflow::AnyStore, name: &str, email: &str) -> leadflow::LeadRecord {
    store
        .leads()
        .insert(NewLead {
            customer_id: 1,
            name: name.to_string(),
            email: email.to_string(),
            phone: None,
            message: None,
        })
        .await
        .unwrap()
}

#[tokio::test]
async fn test_end_to_end_quick_follow_up() {
    let store = memory_store();
    quick_follow_up_flow(&store, 1).await;

    let t0 = Utc::now();
    let lead = add_lead(&store, "Ann", "ann@x.com").await;
    leadflow::materializer(&store)
        .with_time(t0)
        .materialize_for_lead(&lead)
        .await
        .unwrap();

    let mailer = MockMailer::new();
    let poller = poller_with(&store, &mailer);

    // At t0 only the first email step is due.
    let summary = poller.tick(t0).await.unwrap();
    assert_eq!(summary.claimed, 1);
    assert_eq!(summary.done, 1);
    assert_eq!(summary.failed, 0);

    let sent = mailer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "ann@x.com");
    assert_eq!(sent[0].subject, "Hi Ann");
    assert_eq!(sent[0].from, SENDER);

    let jobs = store.jobs().list_for_lead(lead.id).await.unwrap();
    assert_eq!(jobs[0].status, JobStatus::Done);
    assert_eq!(jobs[1].status, JobStatus::Pending);
    assert_eq!(jobs[2].status, JobStatus::Pending);

    let events = store.events().list_for_lead(lead.id, 50).await.unwrap();
    assert!(events
        .iter()
        .any(|e| e.event_type == "email_sent" && e.meta["subject"] == json!("Hi Ann")));
    assert_eq!(events.iter().filter(|e| e.event_type == "job_done").count(), 1);

    // Just before the 10-minute mark nothing new is due.
    let summary = poller.tick(t0 + Duration::minutes(9)).await.unwrap();
    assert_eq!(summary.claimed, 0);

    // At t0+10 the wait no-op and the reminder both run.
    let summary = poller.tick(t0 + Duration::minutes(10)).await.unwrap();
    assert_eq!(summary.claimed, 2);
    assert_eq!(summary.done, 2);

    let sent = mailer.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[1].subject, "Reminder");

    let jobs = store.jobs().list_for_lead(lead.id).await.unwrap();
    assert!(jobs.iter().all(|j| j.status == JobStatus::Done));

    // Everything is terminal; later ticks claim nothing.
    let summary = poller.tick(t0 + Duration::minutes(60)).await.unwrap();
    assert_eq!(summary.claimed, 0);
    assert_eq!(mailer.sent().len(), 2);
}

#[tokio::test]
async fn test_one_failure_does_not_abort_the_batch() {
    let store = memory_store();
    let admin = leadflow::admin(&store);
    let flow = empty_flow(&store, 1, "Blast").await;
    admin
        .append_step(flow.id, "email", 0, json!({"subject": "Hello {{name}}"}))
        .await
        .unwrap();

    let t0 = Utc::now();
    let materializer = leadflow::materializer(&store).with_time(t0);
    for (name, email) in [
        ("Ann", "ann@x.com"),
        ("Bounce", "bounce@x.com"),
        ("Cid", "cid@x.com"),
    ] {
        let lead = add_lead(&store, name, email).await;
        materializer.materialize_for_lead(&lead).await.unwrap();
    }

    let mailer = MockMailer::new();
    mailer.fail_for("bounce@x.com");
    let poller = poller_with(&store, &mailer);

    let summary = poller.tick(t0).await.unwrap();
    assert_eq!(summary.claimed, 3);
    assert_eq!(summary.done, 2);
    assert_eq!(summary.failed, 1);

    assert_eq!(mailer.sent_to("ann@x.com"), 1);
    assert_eq!(mailer.sent_to("cid@x.com"), 1);
    assert_eq!(mailer.sent_to("bounce@x.com"), 0);

    let failed = store
        .jobs()
        .list(1, Some(JobStatus::Failed))
        .await
        .unwrap();
    assert_eq!(failed.len(), 1);

    // The failure is terminal and carries the transport error verbatim.
    let events = store
        .events()
        .list_for_lead(failed[0].lead_id, 50)
        .await
        .unwrap();
    let failure = events
        .iter()
        .find(|e| e.event_type == "job_failed")
        .expect("job_failed event");
    assert!(failure
        .message
        .as_deref()
        .unwrap()
        .contains("mock transport refused delivery"));

    let summary = poller.tick(t0 + Duration::minutes(5)).await.unwrap();
    assert_eq!(summary.claimed, 0, "failed jobs are never retried");
}

#[tokio::test]
async fn test_concurrent_ticks_claim_each_job_at_most_once() {
    let mut config = Config::from_dsn("memory://");
    config.batch_size = 4;
    let store = memory_store_with(config);

    let admin = leadflow::admin(&store);
    let flow = empty_flow(&store, 1, "Race").await;
    admin
        .append_step(flow.id, "email", 0, json!({"subject": "Once"}))
        .await
        .unwrap();

    let t0 = Utc::now();
    let materializer = leadflow::materializer(&store).with_time(t0);
    let mut recipients = Vec::new();
    for i in 0..10 {
        let email = format!("lead{}@x.com", i);
        let lead = add_lead(&store, &format!("Lead {}", i), &email).await;
        materializer.materialize_for_lead(&lead).await.unwrap();
        recipients.push(email);
    }

    let mailer = MockMailer::new();
    let poller = poller_with(&store, &mailer);

    // Rounds of racing ticks until every job is terminal.
    for _ in 0..5 {
        let (a, b, c, d) = tokio::join!(
            poller.tick(t0),
            poller.tick(t0),
            poller.tick(t0),
            poller.tick(t0)
        );
        a.unwrap();
        b.unwrap();
        c.unwrap();
        d.unwrap();
        let counts = store.jobs().status_counts().await.unwrap();
        if counts.pending == 0 {
            break;
        }
    }

    let counts = store.jobs().status_counts().await.unwrap();
    assert_eq!(counts.pending, 0);
    assert_eq!(counts.done, 10);
    for recipient in &recipients {
        assert_eq!(
            mailer.sent_to(recipient),
            1,
            "exactly one send per job, got duplicates for {}",
            recipient
        );
    }
}

#[tokio::test]
async fn test_expired_claim_is_reclaimable() {
    let mut config = Config::from_dsn("memory://");
    config.claim_timeout_seconds = 60;
    let store = memory_store_with(config.clone());
    let admin = leadflow::admin(&store);
    let flow = empty_flow(&store, 1, "Crash").await;
    admin.append_step(flow.id, "wait", 0, json!({})).await.unwrap();

    let t0 = Utc::now();
    let lead = add_lead(&store, "Ann", "ann@x.com").await;
    leadflow::materializer(&store)
        .with_time(t0)
        .materialize_for_lead(&lead)
        .await
        .unwrap();

    // First claimant takes the job and "crashes" without finalizing.
    let claimed = store
        .jobs()
        .claim_due(t0, 10, config.claim_timeout())
        .await
        .unwrap();
    assert_eq!(claimed.len(), 1);

    // While the claim is live nobody else can take it.
    let claimed = store
        .jobs()
        .claim_due(t0 + Duration::seconds(30), 10, config.claim_timeout())
        .await
        .unwrap();
    assert!(claimed.is_empty());

    // After the claim expires the job is pending again and claimable.
    let claimed = store
        .jobs()
        .claim_due(t0 + Duration::seconds(61), 10, config.claim_timeout())
        .await
        .unwrap();
    assert_eq!(claimed.len(), 1);
    assert_eq!(claimed[0].status, JobStatus::Pending);
}

#[tokio::test]
async fn test_unknown_step_type_is_a_noop_success() {
    let store = memory_store();
    let flow = empty_flow(&store, 1, "Future").await;
    // Bypass admin: step type from a newer deployment.
    store
        .steps()
        .insert(leadflow::NewStep {
            flow_id: flow.id,
            step_order: 1,
            step_type: "whatsapp".to_string(),
            delay_minutes: 0,
            config: json!({"template": "greeting"}),
        })
        .await
        .unwrap();

    let t0 = Utc::now();
    let lead = add_lead(&store, "Ann", "ann@x.com").await;
    leadflow::materializer(&store)
        .with_time(t0)
        .materialize_for_lead(&lead)
        .await
        .unwrap();

    let mailer = MockMailer::new();
    let poller = poller_with(&store, &mailer);
    let summary = poller.tick(t0).await.unwrap();
    assert_eq!(summary.done, 1);
    assert_eq!(summary.failed, 0);
    assert!(mailer.sent().is_empty());
}

#[tokio::test]
async fn test_missing_sender_fails_the_job() {
    let store = memory_store();
    let admin = leadflow::admin(&store);
    let flow = empty_flow(&store, 1, "No Sender").await;
    admin
        .append_step(flow.id, "email", 0, json!({}))
        .await
        .unwrap();

    let t0 = Utc::now();
    let lead = add_lead(&store, "Ann", "ann@x.com").await;
    leadflow::materializer(&store)
        .with_time(t0)
        .materialize_for_lead(&lead)
        .await
        .unwrap();

    let mailer = MockMailer::new();
    let executor = StepExecutor::new(store.clone(), Arc::new(mailer.clone()), None);
    let poller = Poller::new(store.clone(), executor);

    let summary = poller.tick(t0).await.unwrap();
    assert_eq!(summary.failed, 1);
    assert!(mailer.sent().is_empty());

    let events = store.events().list_for_lead(lead.id, 50).await.unwrap();
    let failure = events.iter().find(|e| e.event_type == "job_failed").unwrap();
    assert!(failure
        .message
        .as_deref()
        .unwrap()
        .contains("No sender address configured"));
}

#[tokio::test]
async fn test_deleted_step_fails_the_job() {
    let store = memory_store();
    let admin = leadflow::admin(&store);
    let flow = empty_flow(&store, 1, "Edited").await;
    let step = admin
        .append_step(flow.id, "email", 0, json!({"subject": "s"}))
        .await
        .unwrap();

    let t0 = Utc::now();
    let lead = add_lead(&store, "Ann", "ann@x.com").await;
    leadflow::materializer(&store)
        .with_time(t0)
        .materialize_for_lead(&lead)
        .await
        .unwrap();

    // Flow edited after materialization; the job is a stale snapshot.
    admin.delete_step(step.id).await.unwrap();

    let mailer = MockMailer::new();
    let poller = poller_with(&store, &mailer);
    let summary = poller.tick(t0).await.unwrap();
    assert_eq!(summary.failed, 1);

    let events = store.events().list_for_lead(lead.id, 50).await.unwrap();
    let failure = events.iter().find(|e| e.event_type == "job_failed").unwrap();
    assert!(failure.message.as_deref().unwrap().contains("not found"));
}

#[tokio::test]
async fn test_missing_lead_fails_the_job() {
    let store = memory_store();
    let admin = leadflow::admin(&store);
    let flow = empty_flow(&store, 1, "Ghost").await;
    let step = admin
        .append_step(flow.id, "email", 0, json!({}))
        .await
        .unwrap();

    // Job referencing a lead that never existed.
    let t0 = Utc::now();
    store
        .jobs()
        .insert(leadflow::NewJob {
            customer_id: 1,
            lead_id: 9999,
            flow_id: flow.id,
            step_id: step.id,
            run_at: t0,
        })
        .await
        .unwrap();

    let mailer = MockMailer::new();
    let poller = poller_with(&store, &mailer);
    let summary = poller.tick(t0).await.unwrap();
    assert_eq!(summary.failed, 1);
    assert!(mailer.sent().is_empty());
}

#[tokio::test]
async fn test_template_renders_lead_fields_in_body() {
    let store = memory_store();
    let admin = leadflow::admin(&store);
    let flow = empty_flow(&store, 1, "Personal").await;
    admin
        .append_step(
            flow.id,
            "email",
            0,
            json!({
                "subject": "Re: {{message}}",
                "body": "Hi {{name}},\nwe got your note at {{email}}."
            }),
        )
        .await
        .unwrap();

    let t0 = Utc::now();
    let lead = store
        .leads()
        .insert(NewLead {
            customer_id: 1,
            name: "Ann".to_string(),
            email: "ann@x.com".to_string(),
            phone: None,
            message: Some("pricing".to_string()),
        })
        .await
        .unwrap();
    leadflow::materializer(&store)
        .with_time(t0)
        .materialize_for_lead(&lead)
        .await
        .unwrap();

    let mailer = MockMailer::new();
    let poller = poller_with(&store, &mailer);
    poller.tick(t0).await.unwrap();

    let sent = mailer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].subject, "Re: pricing");
    assert_eq!(
        sent[0].html,
        "<p>Hi Ann,<br/>we got your note at ann@x.com.</p>"
    );
}
