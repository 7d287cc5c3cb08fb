//! Postgres integration smoke test.
//!
//! Runs only when `LEADFLOW_TEST_DSN` points at a disposable database the
//! test may install the schema into; without it the test is a no-op so the
//! suite passes on machines with no PostgreSQL available.

use chrono::Utc;
use leadflow::store::Store;
use leadflow::types::{NewLead, TRIGGER_NEW_LEAD};
use leadflow::{JobStatus, MockMailer, NewFlow, Poller, StepExecutor};
use serde_json::json;
use std::sync::Arc;

#[tokio::test]
async fn test_postgres_end_to_end() -> Result<(), Box<dyn std::error::Error>> {
    let dsn = match std::env::var("LEADFLOW_TEST_DSN") {
        Ok(dsn) => dsn,
        Err(_) => {
            eprintln!("LEADFLOW_TEST_DSN not set; skipping postgres smoke test");
            return Ok(());
        }
    };

    let store = leadflow::connect(&dsn).await?;
    let admin = leadflow::admin(&store);
    admin.install().await?;
    admin.verify().await?;

    let flow = admin
        .create_flow(NewFlow {
            customer_id: 1,
            name: "PG Smoke".to_string(),
            trigger: TRIGGER_NEW_LEAD.to_string(),
            is_active: true,
        })
        .await?;
    admin
        .append_step(flow.id, "email", 0, json!({"subject": "Hi {{name}}"}))
        .await?;
    admin.append_step(flow.id, "wait", 10, json!({})).await?;

    let t0 = Utc::now();
    let lead = store
        .leads()
        .insert(NewLead {
            customer_id: 1,
            name: "Ann".to_string(),
            email: "ann@x.com".to_string(),
            phone: None,
            message: None,
        })
        .await?;
    let created = leadflow::materializer(&store)
        .with_time(t0)
        .materialize_for_lead(&lead)
        .await?;
    assert_eq!(created, 2);

    let mailer = MockMailer::new();
    let executor = StepExecutor::new(
        store.clone(),
        Arc::new(mailer.clone()),
        Some("noreply@acme.io".to_string()),
    );
    let poller = Poller::new(store.clone(), executor);

    let summary = poller.tick(t0).await?;
    assert_eq!(summary.claimed, 1);
    assert_eq!(summary.done, 1);
    assert_eq!(mailer.sent_to("ann@x.com"), 1);
    assert_eq!(mailer.sent()[0].subject, "Hi Ann");

    let jobs = store.jobs().list_for_lead(lead.id).await?;
    assert_eq!(jobs[0].status, JobStatus::Done);
    assert_eq!(jobs[1].status, JobStatus::Pending);

    let events = store.events().list_for_lead(lead.id, 50).await?;
    assert!(events.iter().any(|e| e.event_type == "email_sent"));
    assert!(events.iter().any(|e| e.event_type == "job_done"));

    // Flow management invariants against the real backend.
    let s3 = admin
        .append_step(flow.id, "email", 0, json!({"subject": "Bye"}))
        .await?;
    let steps = admin.list_steps(flow.id).await?;
    let ids: Vec<i64> = steps.iter().map(|s| s.id).collect();
    let reordered = admin
        .reorder_steps(flow.id, &[ids[2], ids[0], ids[1]])
        .await?;
    let orders: Vec<i32> = reordered.iter().map(|s| s.step_order).collect();
    assert_eq!(orders, vec![1, 2, 3]);
    assert_eq!(reordered[0].id, s3.id);

    Ok(())
}
