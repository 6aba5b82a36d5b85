use thiserror::Error;

/// Errors raised while loading models or scoring.
///
/// Everything except the I/O and JSON variants is fatal: configuration errors
/// abort startup, usage errors abort the sentence that hit them.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid model: {0}")]
    InvalidModel(String),

    #[error("could not find member phrase table {0}")]
    MissingMemberTable(String),

    #[error("{feature}: total number of member model scores ({members}) is unequal to specified number of scores ({declared})")]
    ScoreCountMismatch {
        feature: String,
        members: usize,
        declared: usize,
    },

    #[error("{feature}: number of specified default scores ({given}) is unequal to number of member model scores ({expected})")]
    DefaultScoresMismatch {
        feature: String,
        given: usize,
        expected: usize,
    },

    #[error("{feature}: member models must have the same number of scores when using default-average-others ({table} has {found}, expected {expected})")]
    AveragingDimensionMismatch {
        feature: String,
        table: String,
        found: usize,
        expected: usize,
    },

    #[error("unknown normalization function: {0}")]
    UnknownNormalization(String),

    #[error("{feature}: unknown parameter '{key}'")]
    UnknownParameter { feature: String, key: String },

    #[error("invalid value '{value}' for parameter '{key}': {reason}")]
    InvalidParameter {
        key: String,
        value: String,
        reason: String,
    },

    #[error("unknown feature function type: {0}")]
    UnknownFeature(String),

    #[error("{feature} cannot be used with {mode} search")]
    UnsupportedSearch { feature: String, mode: String },

    #[error("asked for span list for null-aligned word")]
    NullAlignedSpan,

    #[error("alignment point ({src}, {tgt}) is outside the phrase pair ({src_len}x{tgt_len})")]
    InvalidAlignment {
        src: usize,
        tgt: usize,
        src_len: usize,
        tgt_len: usize,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn invalid_parameter(key: &str, value: &str, reason: impl ToString) -> Self {
        Error::InvalidParameter {
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}
