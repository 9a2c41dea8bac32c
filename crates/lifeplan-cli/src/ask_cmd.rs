//! `lifeplan ask`: run one message through the pipeline from the terminal.

use anyhow::{Result, bail};

use lifeplan_core::{Agent, AgentRequest};

/// Print the response envelope as JSON. An error envelope is printed too,
/// then reported as a failed command.
pub async fn run_ask(agent: &Agent, user_id: &str, text: &str, grocery_plan: bool) -> Result<()> {
    let request = AgentRequest {
        user_input: Some(text.to_owned()),
        user_id: Some(user_id.to_owned()),
        intent: grocery_plan.then(|| lifeplan_core::agent::GROCERY_PLAN_INTENT.to_owned()),
        ..Default::default()
    };
    let response = agent.respond(request).await;
    println!("{}", serde_json::to_string_pretty(&response)?);
    if response.is_error() {
        bail!("request failed");
    }
    Ok(())
}
