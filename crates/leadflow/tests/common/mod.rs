//! Shared helpers for integration tests.
#![allow(dead_code)]

use leadflow::types::{NewFlow, NewLead, TRIGGER_NEW_LEAD};
use leadflow::{AnyStore, Config, FlowRecord, LeadRecord, MemoryStore};
use serde_json::json;

/// Fresh in-memory store with default configuration.
pub fn memory_store() -> AnyStore {
    memory_store_with(Config::from_dsn("memory://"))
}

/// Fresh in-memory store with custom configuration.
pub fn memory_store_with(config: Config) -> AnyStore {
    AnyStore::Memory(MemoryStore::new(&config))
}

/// The "Quick Follow-up" flow: email now, wait 10 minutes, email reminder.
pub async fn quick_follow_up_flow(store: &AnyStore, customer: i64) -> FlowRecord {
    let admin = leadflow::admin(store);
    let flow = admin
        .create_flow(NewFlow {
            customer_id: customer,
            name: "Quick Follow-up".to_string(),
            trigger: TRIGGER_NEW_LEAD.to_string(),
            is_active: true,
        })
        .await
        .unwrap();
    admin
        .append_step(flow.id, "email", 0, json!({"subject": "Hi {{name}}"}))
        .await
        .unwrap();
    admin.append_step(flow.id, "wait", 10, json!({})).await.unwrap();
    admin
        .append_step(flow.id, "email", 0, json!({"subject": "Reminder"}))
        .await
        .unwrap();
    flow
}

/// A plain active flow with no steps yet.
pub async fn empty_flow(store: &AnyStore, customer: i64, name: &str) -> FlowRecord {
    leadflow::admin(store)
        .create_flow(NewFlow {
            customer_id: customer,
            name: name.to_string(),
            trigger: TRIGGER_NEW_LEAD.to_string(),
            is_active: true,
        })
        .await
        .unwrap()
}

/// Capture a lead through the materializer trigger hook.
pub async fn capture_lead(store: &AnyStore, customer: i64, name: &str, email: &str) -> LeadRecord {
    leadflow::materializer(store)
        .capture_lead(NewLead {
            customer_id: customer,
            name: name.to_string(),
            email: email.to_string(),
            phone: None,
            message: None,
        })
        .await
        .unwrap()
}
