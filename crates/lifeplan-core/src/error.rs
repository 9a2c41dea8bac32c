//! The pipeline's error taxonomy.
//!
//! Every terminal failure of a request is a [`PipelineError`]. Local
//! failures (date parsing, enrichment, context fetch) have their own types
//! and are recovered where they occur; they only become a `PipelineError`
//! when a caller explicitly asks for them (e.g. the enrichment endpoint).

use lifeplan_db::StoreError;

use crate::enrich::EnrichmentError;
use crate::extract::ExtractError;
use crate::schema::ValidationError;
use crate::timezone::DateParseError;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Missing or invalid request fields.
    #[error("{0}")]
    ClientInput(String),

    /// Every model tier failed or the deadline ran out.
    #[error("language model unavailable: {0}")]
    ModelUnavailable(String),

    /// The model output contained no JSON container at all.
    #[error("model output contained no JSON: {0}")]
    Extraction(String),

    /// The model output contained JSON that could not be recovered.
    #[error("model output contained malformed JSON: {0}")]
    MalformedPayload(String),

    #[error("invalid payload: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    DateParse(#[from] DateParseError),

    #[error("failed to persist record: {0}")]
    Persistence(#[from] StoreError),

    #[error(transparent)]
    Enrichment(#[from] EnrichmentError),

    #[error("unknown intent: {0}")]
    UnknownIntent(String),

    #[error("plan {plan_id} not found or you don't have permission to access it")]
    PlanNotFound { plan_id: String },

    #[error("number of weeks must be a positive integer, got {0}")]
    InvalidWeekCount(i64),
}

impl From<ExtractError> for PipelineError {
    fn from(err: ExtractError) -> Self {
        match err {
            ExtractError::NotFound { .. } => Self::Extraction(err.to_string()),
            ExtractError::Malformed(_) => Self::MalformedPayload(err.to_string()),
        }
    }
}

/// Coarse classification of an error for transport layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Client,
    NotFound,
    Unavailable,
    BadGateway,
    Internal,
}

impl StatusClass {
    /// The HTTP status code for this class.
    pub fn http_status(self) -> u16 {
        match self {
            Self::Client => 400,
            Self::NotFound => 404,
            Self::Unavailable => 503,
            Self::BadGateway => 502,
            Self::Internal => 500,
        }
    }
}

impl PipelineError {
    pub fn status_class(&self) -> StatusClass {
        match self {
            Self::ClientInput(_) | Self::UnknownIntent(_) | Self::InvalidWeekCount(_) => {
                StatusClass::Client
            }
            Self::DateParse(_) => StatusClass::Client,
            Self::PlanNotFound { .. } => StatusClass::NotFound,
            Self::ModelUnavailable(_) => StatusClass::Unavailable,
            Self::Extraction(_) | Self::MalformedPayload(_) | Self::Validation(_) => {
                StatusClass::BadGateway
            }
            Self::Enrichment(e) => match e {
                EnrichmentError::MissingFields(_) => StatusClass::Client,
                EnrichmentError::RecordNotFound { .. } => StatusClass::NotFound,
                EnrichmentError::Store(_) => StatusClass::Internal,
                EnrichmentError::Lookup(_) | EnrichmentError::Delivery(_) => {
                    StatusClass::BadGateway
                }
            },
            Self::Persistence(_) => StatusClass::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::Container;

    #[test]
    fn extract_errors_split_into_two_variants() {
        let missing: PipelineError = ExtractError::NotFound {
            expected: Container::Object,
        }
        .into();
        assert!(matches!(missing, PipelineError::Extraction(_)));

        let malformed: PipelineError = ExtractError::Malformed("eof".into()).into();
        assert!(matches!(malformed, PipelineError::MalformedPayload(_)));
    }

    #[test]
    fn status_classes() {
        assert_eq!(
            PipelineError::UnknownIntent("dance".into())
                .status_class()
                .http_status(),
            400
        );
        assert_eq!(
            PipelineError::PlanNotFound {
                plan_id: "p".into()
            }
            .status_class(),
            StatusClass::NotFound
        );
        assert_eq!(
            PipelineError::ModelUnavailable("deadline".into())
                .status_class()
                .http_status(),
            503
        );
        assert_eq!(
            PipelineError::MalformedPayload("x".into()).status_class(),
            StatusClass::BadGateway
        );
        assert_eq!(
            PipelineError::from(EnrichmentError::MissingFields(vec!["unit"])).status_class(),
            StatusClass::Client
        );
        assert_eq!(
            PipelineError::from(EnrichmentError::RecordNotFound {
                grocery_id: "g".into()
            })
            .status_class(),
            StatusClass::NotFound
        );
    }
}
