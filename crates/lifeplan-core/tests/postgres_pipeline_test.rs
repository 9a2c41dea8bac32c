//! The pipeline against a real PostgreSQL store.
//!
//! Each test gets its own database inside the shared test PostgreSQL
//! (see `lifeplan-test-utils`), with migrations applied.

mod common;

use std::sync::Arc;

use serde_json::json;

use lifeplan_core::{Agent, AgentRequest, AgentResponse, Services};
use lifeplan_db::{Collection, RecordQuery, RecordStore};
use lifeplan_test_utils::{create_test_store, drop_test_db};

use common::{ScriptedModel, chain, clock, milestones};

#[tokio::test]
async fn task_round_trips_through_postgres() {
    let (store, db_name) = create_test_store().await;
    let store = Arc::new(store);
    let model = ScriptedModel::new().reply_json(json!({
        "intent": "create_item",
        "type": "task",
        "data": { "title": "Call the plumber", "priority": 2 }
    }));
    let services = Services::new(store.clone(), chain(model), clock(), chrono_tz::Asia::Kolkata);
    let agent = Agent::new(Arc::new(services));

    let response = agent
        .handle(AgentRequest {
            user_input: Some("remind me to call the plumber".into()),
            user_id: Some("alice".into()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(matches!(response, AgentResponse::CreationSuccess { .. }));

    let rows = store
        .select(Collection::Tasks, &RecordQuery::owned_by("alice"))
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["title"], "Call the plumber");
    assert!(
        store
            .select(Collection::Tasks, &RecordQuery::owned_by("bob"))
            .await
            .unwrap()
            .is_empty()
    );

    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn plan_extension_updates_stored_plan() {
    let (store, db_name) = create_test_store().await;
    let store = Arc::new(store);
    let model = ScriptedModel::new()
        .reply_json(milestones(4))
        .reply_json(milestones(2));
    let services = Services::new(store.clone(), chain(model), clock(), chrono_tz::Asia::Kolkata);
    let agent = Agent::new(Arc::new(services));

    let created = agent
        .handle(AgentRequest {
            user_id: Some("alice".into()),
            plan_details: Some(json!({
                "topic": "Linear Algebra",
                "duration_text": "4 weeks",
                "duration_months": 1
            })),
            ..Default::default()
        })
        .await
        .unwrap();
    let AgentResponse::PlanCreated { plan_id, .. } = created else {
        panic!("expected plan_created, got {created:?}");
    };

    let extended = agent.extend_plan("alice", &plan_id, 2).await.unwrap();
    let json = serde_json::to_value(&extended).unwrap();
    assert_eq!(json["total_weeks"], 6);
    assert_eq!(json["new_weeks_added"], 2);

    let plans = store
        .select(
            Collection::LearningPlans,
            &RecordQuery::owned_by("alice").filter("id", plan_id.as_str()),
        )
        .await
        .unwrap();
    assert_eq!(plans.len(), 1);
    let weeks = plans[0]["weekly_milestones"].as_array().unwrap();
    assert_eq!(weeks.len(), 6);
    assert_eq!(weeks[5]["week"], 6);
    assert_eq!(plans[0]["duration_months"], 2);

    let tasks = store
        .select(Collection::Tasks, &RecordQuery::owned_by("alice"))
        .await
        .unwrap();
    assert_eq!(tasks.len(), 3, "extension does not seed tasks");

    drop_test_db(&db_name).await;
}
