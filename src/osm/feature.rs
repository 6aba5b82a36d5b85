use std::{collections::HashMap, path::PathBuf, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{
    config::{parse_value, Configurable},
    coverage::CoverageSet,
    errors::{Error, Result},
    ff::{FeatureFunction, Hypothesis, SearchCaps, StatefulFeatureFunction},
    phrase::{Phrase, Sentence, TargetPhrase},
    score::{FeatureId, ScoreBreakdown, ScoreVector},
};

use super::{
    cept::AlignmentIndex,
    lm::{BackoffModel, SequenceModel},
    ops::{Extension, OperationSequence, OsmState, UNKNOWN_OP},
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OsmOptions {
    pub name: String,
    pub path: Option<PathBuf>,
    pub order: Option<usize>,
}

impl Configurable for OsmOptions {
    fn set_parameter(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "name" => self.name = value.to_string(),
            "path" => self.path = Some(PathBuf::from(value)),
            "order" => self.order = Some(parse_value(key, value)?),
            _ => {
                return Err(Error::UnknownParameter {
                    feature: self.name.clone(),
                    key: key.to_string(),
                })
            }
        }
        Ok(())
    }
}

/// Operation sequence model: scores the edit operations that turn the source
/// side of each extension into its target side.
pub struct OpSequenceModel {
    id: FeatureId,
    name: String,
    model: Arc<dyn SequenceModel>,
    unk_op_prob: f32,
    future_cost: HashMap<(Phrase, Phrase), ScoreVector>,
}

impl std::fmt::Debug for OpSequenceModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpSequenceModel")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("order", &self.model.order())
            .field("unk_op_prob", &self.unk_op_prob)
            .finish()
    }
}

impl OpSequenceModel {
    pub const NUM_SCORES: usize = 5;

    pub fn new(id: FeatureId, name: &str, model: Arc<dyn SequenceModel>) -> Self {
        let null = model.null_context_state();
        let (unk_op_prob, _) = model.score(&null, model.index(UNKNOWN_OP));
        Self {
            id,
            name: name.to_string(),
            model,
            unk_op_prob,
            future_cost: HashMap::new(),
        }
    }

    /// Reads the ARPA model named by `path`.
    pub fn load(id: FeatureId, opts: &OsmOptions) -> Result<Self> {
        let path = opts.path.as_ref().ok_or_else(|| Error::InvalidParameter {
            key: "path".to_string(),
            value: String::new(),
            reason: format!("{} needs a model path", opts.name),
        })?;
        log::info!("{}: loading operation sequence model from {:?}", opts.name, path);
        let model = BackoffModel::from_path(path)?;
        if let Some(order) = opts.order {
            if order != model.order() {
                log::warn!(
                    "{}: configured order {} but model has order {}",
                    opts.name,
                    order,
                    model.order()
                );
            }
        }
        Ok(Self::new(id, &opts.name, Arc::new(model)))
    }

    /// log10 probability of the unknown-word operation in a null context.
    pub fn unknown_op_prob(&self) -> f32 {
        self.unk_op_prob
    }

    fn target_tokens(target: &TargetPhrase) -> Vec<String> {
        target
            .phrase
            .words
            .iter()
            .map(|w| {
                if w.oov {
                    UNKNOWN_OP.to_string()
                } else {
                    w.text.clone()
                }
            })
            .collect()
    }

    fn isolated(&self, source: &Phrase, target: &TargetPhrase) -> Result<ScoreVector> {
        let src: Vec<String> = source.words.iter().map(|w| w.text.clone()).collect();
        let tgt = Self::target_tokens(target);
        let index = AlignmentIndex::new(target.alignment.iter(), src.len(), tgt.len())?;
        let ext = Extension {
            source: &src,
            target: &tgt,
            start: 0,
            index: &index,
        };
        let mut coverage = CoverageSet::new(src.len());
        let seq = OperationSequence::derive(&ext, &mut coverage, 0, 0);
        let (scores, _) = seq.score(self.model.as_ref(), &self.model.null_context_state());
        Ok(scores)
    }

    /// Stores isolation estimates for known phrase pairs so that
    /// [`Self::future_scores`] can answer without deriving anything.
    pub fn precompute_future_scores<'a>(
        &mut self,
        pairs: impl IntoIterator<Item = (&'a Phrase, &'a TargetPhrase)>,
    ) -> Result<()> {
        for (source, target) in pairs {
            let scores = self.isolated(source, target)?;
            self.future_cost
                .insert((source.clone(), target.phrase.clone()), scores);
        }
        log::debug!("{}: {} future cost entries", self.name, self.future_cost.len());
        Ok(())
    }

    pub fn future_scores(&self, source: &Phrase, target: &Phrase) -> ScoreVector {
        match self.future_cost.get(&(source.clone(), target.clone())) {
            Some(scores) => scores.clone(),
            None => {
                let mut scores = vec![0.0; Self::NUM_SCORES];
                scores[0] = self.unk_op_prob;
                scores
            }
        }
    }
}

impl FeatureFunction for OpSequenceModel {
    fn id(&self) -> FeatureId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn num_scores(&self) -> usize {
        Self::NUM_SCORES
    }

    /// Operations assume strictly left-to-right target emission.
    fn search_caps(&self) -> SearchCaps {
        SearchCaps::PHRASE_BASED
    }
}

impl StatefulFeatureFunction for OpSequenceModel {
    type State = OsmState;

    fn empty_hypothesis_state(&self, input: &Sentence) -> OsmState {
        log::debug!("{}: empty hypothesis state for sentence {}", self.name, input.id);
        OsmState::new(self.model.begin_sentence_state())
    }

    fn evaluate(
        &self,
        hypo: &Hypothesis,
        prev: &OsmState,
        accumulator: &mut ScoreBreakdown,
    ) -> Result<OsmState> {
        let range = hypo.range;
        let mut coverage = hypo.coverage.clone();
        coverage.set_range(range, false);

        let src: Vec<String> = (range.start..=range.end)
            .map(|i| hypo.sentence.word(i).text.clone())
            .collect();
        let tgt = Self::target_tokens(hypo.target);
        let index = AlignmentIndex::new(hypo.target.alignment.iter(), src.len(), tgt.len())?;
        let ext = Extension {
            source: &src,
            target: &tgt,
            start: range.start,
            index: &index,
        };
        let seq = OperationSequence::derive(&ext, &mut coverage, prev.j, prev.e);
        let (scores, lm) = seq.score(self.model.as_ref(), &prev.lm);
        log::trace!("{}: [{}] -> {:?}", self.name, seq, scores);
        accumulator.plus_equals(self.id, &scores);
        Ok(OsmState {
            lm,
            j: seq.source_pointer(),
            e: seq.rightmost(),
        })
    }

    fn evaluate_in_isolation(
        &self,
        source: &Phrase,
        target: &TargetPhrase,
        _breakdown: &mut ScoreBreakdown,
        estimated: &mut ScoreBreakdown,
    ) -> Result<()> {
        let scores = self.isolated(source, target)?;
        estimated.plus_equals(self.id, &scores);
        Ok(())
    }
}
