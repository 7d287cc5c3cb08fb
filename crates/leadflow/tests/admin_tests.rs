//! Flow/step management invariants: dense ordering, reorder validation,
//! config validation at the boundary, and explicit cascade on flow delete.

mod common;

use common::*;
use leadflow::store::Store;
use leadflow::types::{FlowUpdate, NewFlow, StepUpdate};
use leadflow::Error;
use serde_json::json;

fn orders(steps: &[leadflow::StepRecord]) -> Vec<i32> {
    steps.iter().map(|s| s.step_order).collect()
}

#[tokio::test]
async fn test_append_assigns_dense_orders() {
    let store = memory_store();
    let admin = leadflow::admin(&store);
    let flow = empty_flow(&store, 1, "Ordering").await;

    for _ in 0..4 {
        admin.append_step(flow.id, "wait", 1, json!({})).await.unwrap();
    }

    let steps = admin.list_steps(flow.id).await.unwrap();
    assert_eq!(orders(&steps), vec![1, 2, 3, 4]);
}

#[tokio::test]
async fn test_delete_step_renumbers_survivors() {
    let store = memory_store();
    let admin = leadflow::admin(&store);
    let flow = empty_flow(&store, 1, "Ordering").await;

    let mut ids = Vec::new();
    for subject in ["a", "b", "c", "d"] {
        let step = admin
            .append_step(flow.id, "email", 0, json!({"subject": subject}))
            .await
            .unwrap();
        ids.push(step.id);
    }

    // Remove the second step; the rest close the gap in original order.
    admin.delete_step(ids[1]).await.unwrap();

    let steps = admin.list_steps(flow.id).await.unwrap();
    assert_eq!(orders(&steps), vec![1, 2, 3]);
    let subjects: Vec<&str> = steps
        .iter()
        .map(|s| s.config["subject"].as_str().unwrap())
        .collect();
    assert_eq!(subjects, vec!["a", "c", "d"]);
}

#[tokio::test]
async fn test_reorder_reassigns_dense_orders() {
    let store = memory_store();
    let admin = leadflow::admin(&store);
    let flow = empty_flow(&store, 1, "Ordering").await;

    let mut ids = Vec::new();
    for subject in ["a", "b", "c"] {
        let step = admin
            .append_step(flow.id, "email", 0, json!({"subject": subject}))
            .await
            .unwrap();
        ids.push(step.id);
    }

    let reordered = admin
        .reorder_steps(flow.id, &[ids[2], ids[0], ids[1]])
        .await
        .unwrap();
    assert_eq!(orders(&reordered), vec![1, 2, 3]);
    let subjects: Vec<&str> = reordered
        .iter()
        .map(|s| s.config["subject"].as_str().unwrap())
        .collect();
    assert_eq!(subjects, vec!["c", "a", "b"]);

    // Reading back shows the same dense sequence.
    let steps = admin.list_steps(flow.id).await.unwrap();
    assert_eq!(orders(&steps), vec![1, 2, 3]);
}

#[tokio::test]
async fn test_reorder_rejects_bad_permutations() {
    let store = memory_store();
    let admin = leadflow::admin(&store);
    let flow = empty_flow(&store, 1, "Strict").await;
    let other = empty_flow(&store, 1, "Other").await;

    let s1 = admin.append_step(flow.id, "wait", 0, json!({})).await.unwrap();
    let s2 = admin.append_step(flow.id, "wait", 0, json!({})).await.unwrap();
    let foreign = admin.append_step(other.id, "wait", 0, json!({})).await.unwrap();

    // Incomplete set.
    assert!(matches!(
        admin.reorder_steps(flow.id, &[s1.id]).await,
        Err(Error::InvalidReorder { .. })
    ));

    // Step from another flow.
    assert!(matches!(
        admin.reorder_steps(flow.id, &[s1.id, foreign.id]).await,
        Err(Error::InvalidReorder { .. })
    ));

    // Duplicated id.
    assert!(matches!(
        admin.reorder_steps(flow.id, &[s1.id, s1.id]).await,
        Err(Error::InvalidReorder { .. })
    ));

    // A rejected reorder leaves the ordering untouched.
    let steps = admin.list_steps(flow.id).await.unwrap();
    assert_eq!(orders(&steps), vec![1, 2]);
    assert_eq!(steps[0].id, s1.id);
    assert_eq!(steps[1].id, s2.id);
}

#[tokio::test]
async fn test_step_config_validated_at_boundary() {
    let store = memory_store();
    let admin = leadflow::admin(&store);
    let flow = empty_flow(&store, 1, "Validated").await;

    // Email config must be an object with string subject/body.
    assert!(matches!(
        admin
            .append_step(flow.id, "email", 0, json!({"subject": 42}))
            .await,
        Err(Error::InvalidStepConfig { .. })
    ));
    assert!(matches!(
        admin.append_step(flow.id, "email", 0, json!("nope")).await,
        Err(Error::InvalidStepConfig { .. })
    ));

    // Negative delays never enter the schedule.
    assert!(matches!(
        admin.append_step(flow.id, "wait", -5, json!({})).await,
        Err(Error::InvalidConfig { .. })
    ));

    // Unknown step types accept any config (forward compatibility).
    assert!(admin
        .append_step(flow.id, "sms", 0, json!({"text": "hi"}))
        .await
        .is_ok());

    // Updates are validated against the merged type + config.
    let step = admin
        .append_step(flow.id, "email", 0, json!({"subject": "ok"}))
        .await
        .unwrap();
    assert!(matches!(
        admin
            .update_step(
                step.id,
                StepUpdate {
                    config: Some(json!({"body": []})),
                    ..StepUpdate::default()
                },
            )
            .await,
        Err(Error::InvalidStepConfig { .. })
    ));
    let updated = admin
        .update_step(
            step.id,
            StepUpdate {
                delay_minutes: Some(30),
                ..StepUpdate::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.delay_minutes, 30);
    assert_eq!(updated.config, json!({"subject": "ok"}));
}

#[tokio::test]
async fn test_delete_flow_removes_steps_first() {
    let store = memory_store();
    let admin = leadflow::admin(&store);
    let flow = empty_flow(&store, 1, "Doomed").await;
    let step = admin.append_step(flow.id, "wait", 0, json!({})).await.unwrap();

    admin.delete_flow(flow.id).await.unwrap();

    assert!(matches!(
        admin.get_flow(flow.id).await,
        Err(Error::NotFound { .. })
    ));
    assert!(matches!(
        store.steps().get(step.id).await,
        Err(Error::NotFound { .. })
    ));
}

#[tokio::test]
async fn test_flow_create_and_update_validation() {
    let store = memory_store();
    let admin = leadflow::admin(&store);

    assert!(matches!(
        admin
            .create_flow(NewFlow {
                customer_id: 1,
                name: "  ".to_string(),
                trigger: "new_lead".to_string(),
                is_active: true,
            })
            .await,
        Err(Error::InvalidConfig { .. })
    ));

    let flow = empty_flow(&store, 1, "Renamable").await;
    let updated = admin
        .update_flow(
            flow.id,
            FlowUpdate {
                name: Some("Renamed".to_string()),
                is_active: Some(false),
                ..FlowUpdate::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.name, "Renamed");
    assert!(!updated.is_active);
    // Untouched fields survive the partial update.
    assert_eq!(updated.trigger, "new_lead");
}

#[tokio::test]
async fn test_stats_counts() {
    let store = memory_store();
    let admin = leadflow::admin(&store);
    quick_follow_up_flow(&store, 1).await;
    empty_flow(&store, 2, "Elsewhere").await;
    capture_lead(&store, 1, "Ann", "ann@x.com").await;

    let stats = admin.stats().await.unwrap();
    assert_eq!(stats.total_flows, 2);
    assert_eq!(stats.active_flows, 2);
    assert_eq!(stats.total_leads, 1);
    assert_eq!(stats.pending_jobs, 3);
    assert_eq!(stats.done_jobs, 0);
    assert_eq!(stats.total_events, 3);
    assert_eq!(stats.backend, "memory");
}

#[tokio::test]
async fn test_list_steps_unknown_flow_is_not_found() {
    let store = memory_store();
    let admin = leadflow::admin(&store);
    assert!(matches!(
        admin.list_steps(404).await,
        Err(Error::NotFound { .. })
    ));
}
