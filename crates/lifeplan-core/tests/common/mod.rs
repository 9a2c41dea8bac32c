//! Shared fakes for pipeline integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde_json::{Value, json};

use lifeplan_core::clock::FixedClock;
use lifeplan_core::model::{ChainBudget, GenerationRequest, LanguageModel, ModelChain, ModelError};
use lifeplan_core::Services;
use lifeplan_test_utils::MemoryStore;

/// Replays canned completions in order and records every prompt it saw.
#[derive(Default)]
pub struct ScriptedModel {
    replies: Mutex<VecDeque<Result<String, ModelError>>>,
    prompts: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedModel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reply(self: &Arc<Self>, text: impl Into<String>) -> Arc<Self> {
        self.replies
            .lock()
            .unwrap()
            .push_back(Ok(text.into()));
        self.clone()
    }

    pub fn reply_json(self: &Arc<Self>, value: Value) -> Arc<Self> {
        self.reply(value.to_string())
    }

    pub fn fail(self: &Arc<Self>) -> Arc<Self> {
        self.replies
            .lock()
            .unwrap()
            .push_back(Err(ModelError::Network("connection refused".into())));
        self.clone()
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, ModelError> {
        self.prompts.lock().unwrap().push(request.clone());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(ModelError::NoChoices))
    }
}

/// 2026-10-16 09:00 in Asia/Kolkata.
pub fn clock() -> Arc<FixedClock> {
    Arc::new(FixedClock(Utc.with_ymd_and_hms(2026, 10, 16, 3, 30, 0).unwrap()))
}

pub fn chain(model: Arc<ScriptedModel>) -> Arc<ModelChain> {
    Arc::new(ModelChain::new(model, None, ChainBudget::default()))
}

pub fn services(store: Arc<MemoryStore>, model: Arc<ScriptedModel>) -> Services {
    Services::new(store, chain(model), clock(), chrono_tz::Asia::Kolkata)
}

/// `n` valid milestones with three tasks each.
pub fn milestones(n: usize) -> Value {
    Value::Array(
        (1..=n)
            .map(|week| {
                json!({
                    "week": week,
                    "title": format!("Week {week}: Topic {week}"),
                    "description": "Study",
                    "topics_covered": ["basics"],
                    "learning_objectives": ["understand"],
                    "tasks": ["Read chapter (1h)", "Solve exercises (2h)", "Build a demo (2h)"],
                    "estimated_hours": 6,
                    "tips": ["take notes"],
                    "resources": ["book"]
                })
            })
            .collect(),
    )
}
