//! How feature models plug into hypothesis expansion.

use std::fmt::Display;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::{
    coverage::CoverageSet,
    errors::{Error, Result},
    phrase::{Phrase, Sentence, TargetPhrase, WordsRange},
    score::{FeatureId, ScoreBreakdown},
};

bitflags! {
    /// Search algorithms a feature can take part in.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SearchCaps: u8 {
        const PHRASE_BASED = 0x01;
        const CHART = 0x02;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SearchMode {
    #[default]
    PhraseBased,
    Chart,
}

impl SearchMode {
    pub fn caps(&self) -> SearchCaps {
        match self {
            SearchMode::PhraseBased => SearchCaps::PHRASE_BASED,
            SearchMode::Chart => SearchCaps::CHART,
        }
    }
}

impl Display for SearchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SearchMode::PhraseBased => write!(f, "phrase-based"),
            SearchMode::Chart => write!(f, "chart"),
        }
    }
}

/// Anything that contributes a dense score vector.
pub trait FeatureFunction: Send + Sync {
    fn id(&self) -> FeatureId;
    fn name(&self) -> &str;
    fn num_scores(&self) -> usize;

    fn search_caps(&self) -> SearchCaps {
        SearchCaps::all()
    }

    /// Rejects the feature for search algorithms it cannot serve.
    fn check_search(&self, mode: SearchMode) -> Result<()> {
        if self.search_caps().contains(mode.caps()) {
            Ok(())
        } else {
            Err(Error::UnsupportedSearch {
                feature: self.name().to_string(),
                mode: mode.to_string(),
            })
        }
    }
}

/// The part of a phrase-based hypothesis a stateful feature looks at: the
/// extension that was just applied and the coverage *after* it.
#[derive(Debug, Clone, Copy)]
pub struct Hypothesis<'a> {
    pub sentence: &'a Sentence,
    pub coverage: &'a CoverageSet,
    pub range: WordsRange,
    pub target: &'a TargetPhrase,
}

/// A feature that carries private state along a hypothesis lineage.
///
/// States are produced once and never mutated; the search owns them.
pub trait StatefulFeatureFunction: FeatureFunction {
    type State: Clone + std::fmt::Debug + Send + Sync;

    fn empty_hypothesis_state(&self, input: &Sentence) -> Self::State;

    /// Scores the last extension of `hypo` starting from `prev` and adds the
    /// scores to `accumulator`.
    fn evaluate(
        &self,
        hypo: &Hypothesis,
        prev: &Self::State,
        accumulator: &mut ScoreBreakdown,
    ) -> Result<Self::State>;

    /// Estimate for a phrase pair outside any hypothesis, for pre-search
    /// pruning.
    fn evaluate_in_isolation(
        &self,
        source: &Phrase,
        target: &TargetPhrase,
        breakdown: &mut ScoreBreakdown,
        estimated: &mut ScoreBreakdown,
    ) -> Result<()>;
}

/// Scoring interface of hierarchical (chart) search.
///
/// Only features that do not depend on left-to-right target emission
/// implement it; [`FeatureFunction::search_caps`] repeats the same
/// information for features loaded by name.
pub trait ChartFeatureFunction: FeatureFunction {
    fn evaluate_when_applied_chart(
        &self,
        span: WordsRange,
        target: &TargetPhrase,
        accumulator: &mut ScoreBreakdown,
    ) -> Result<()>;
}
