//! Discriminative word lexicon: a context classifier scores how likely each
//! target word is as the translation of the source words it is aligned to.
//! Predictions are memoized in a [`PredictionCache`] shared by all tasks.

pub mod cache;
pub mod cept_table;
pub mod classifier;
pub mod normalize;
pub mod scorer;

pub use cache::{PredictionCache, Predictions};
pub use cept_table::{CeptTable, CeptTranslation, MemoryCeptTable};
pub use classifier::{Classifier, FrequencyClassifier, PredictorPool, Query};
pub use normalize::Normalization;
pub use scorer::{DwlOptions, DwlScorer, LOWEST_SCORE};
