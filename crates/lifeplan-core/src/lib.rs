//! The lifeplan pipeline: free text in, validated records and learning
//! plans out.
//!
//! ```text
//! AgentRequest
//!     |
//!     v
//! Agent::handle --plan_details--> LearningPlanEngine::create
//!     |
//!     v
//! gather_context -> classification prompt -> ModelChain -> extract -> validate
//!     |
//!     v
//! Dispatcher --create_item--> ActionExecutor --grocery--> EnrichmentDispatcher
//!            --generate_learning_plan--> LearningPlanEngine
//!            --analyze_data / answer_question--> AgentResponse::Answer
//! ```

pub mod agent;
pub mod clock;
pub mod context;
pub mod dispatch;
pub mod enrich;
pub mod error;
pub mod executor;
pub mod extract;
pub mod grocery;
pub mod intent;
pub mod learning;
pub mod model;
pub mod nutrition;
pub mod prompt;
pub mod response;
pub mod schema;
pub mod services;
pub mod timezone;

pub use agent::{Agent, AgentRequest};
pub use error::{PipelineError, StatusClass};
pub use response::AgentResponse;
pub use services::{Services, ServicesConfig};
