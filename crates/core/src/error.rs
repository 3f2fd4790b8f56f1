//! Error types for filter parsing, query composition, store mutations and statistics.

use chrono::NaiveDate;
use thiserror::Error;

/// Client input errors raised while registering, parsing, or composing filters.
///
/// Every variant names the parameter(s) involved so the HTTP layer can render a
/// precise message. None of them is retryable.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FilterError {
    #[error("filter parameter '{parameter}' is already registered")]
    DuplicateParameter { parameter: String },

    #[error("filter parameter '{parameter}' targets unknown attribute '{attribute}'")]
    UnknownAttribute { parameter: String, attribute: String },

    #[error("filter parameter '{parameter}' cannot apply {operator} to attribute '{attribute}'")]
    IncompatibleOperator {
        parameter: String,
        attribute: String,
        operator: String,
    },

    #[error("missing required parameter '{parameter}'")]
    MissingRequiredParameter { parameter: String },

    #[error("invalid value '{value}' for parameter '{parameter}': expected {expected}")]
    InvalidParameterValue {
        parameter: String,
        value: String,
        expected: String,
    },

    #[error(
        "Either all of max_distance, latitude and longitude should be passed to perform \
         distance based filtering or none of them (got: {})",
        present.join(", ")
    )]
    DistanceFilterMissingParameters { present: Vec<&'static str> },
}

/// Errors raised by [`PublicationStore`](crate::storage::PublicationStore) mutations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("No publication by id {0} was found")]
    PublicationNotFound(u64),

    #[error("Publication {0} is blocked")]
    PublicationBlocked(u64),

    #[error("Publication {0} already exists")]
    PublicationExists(u64),

    #[error("Question {question_id} already exists on publication {publication_id}")]
    QuestionExists { publication_id: u64, question_id: u64 },

    #[error("No question {question_id} was found for publication {publication_id}")]
    QuestionNotFound { publication_id: u64, question_id: u64 },

    #[error("Publication {publication_id} was not starred by user {user_id}")]
    NotStarred { publication_id: u64, user_id: i64 },

    #[error("Publication {publication_id} is already starred by user {user_id}")]
    AlreadyStarred { publication_id: u64, user_id: i64 },
}

/// Errors raised while computing daily statistics.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StatsError {
    #[error("start_date {start} is after end_date {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },

    #[error("date range spans {days} days, the maximum is {max}")]
    RangeTooLong { days: i64, max: i64 },
}
