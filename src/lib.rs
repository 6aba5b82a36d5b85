//! Scoring and model combination for phrase-based machine translation.
//!
//! Feature functions plug into hypothesis expansion through
//! [`ff::StatefulFeatureFunction`]; the operation sequence model in [`osm`]
//! is the stateful scorer. [`table::PhraseDictionaryGroup`] merges the
//! candidates of several phrase tables, and [`dwl`] scores words with a
//! context classifier behind a shared [`dwl::PredictionCache`].

pub mod config;
pub mod coverage;
pub mod dwl;
mod errors;
pub mod ff;
pub mod osm;
pub mod phrase;
pub mod quark;
pub mod score;
pub mod table;
pub mod task;

pub use config::{Configurable, DecoderConfig, FeatureLine};
pub use coverage::CoverageSet;
pub use errors::{Error, Result};
pub use ff::{ChartFeatureFunction, FeatureFunction, Hypothesis, SearchCaps, SearchMode, StatefulFeatureFunction};
pub use phrase::{AlignmentInfo, InputPath, Phrase, Sentence, TargetPhrase, TargetPhraseCollection, TranslationOption, Word, WordsRange};
pub use quark::{Quark, StringTable, WordIndex};
pub use score::{FeatureId, ScoreBreakdown, ScoreLayout, ScoreVector, Weights};
pub use task::{ScoredOption, SentenceContext, System, TranslationTask};
