//! Combination of several phrase tables into one candidate set.

use std::{borrow::Cow, collections::HashMap, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{
    config::{parse_bool, parse_list, parse_value, Configurable},
    errors::{Error, Result},
    ff::{FeatureFunction, SearchCaps},
    phrase::{InputPath, Phrase, TargetPhrase, TargetPhraseCollection},
    score::{FeatureId, ScoreLayout, Weights},
};

use super::{PhraseArena, PhraseTable, TableRegistry};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct GroupOptions {
    pub name: String,
    pub members: Vec<String>,
    pub num_features: usize,
    #[serde(default)]
    pub restrict: bool,
    pub default_scores: Option<Vec<f32>>,
    /// Number of leading scores per model to average over the models that
    /// saw a phrase.
    pub default_average_others: Option<usize>,
    #[serde(default)]
    pub table_limit: usize,
}

impl Configurable for GroupOptions {
    fn set_parameter(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "name" => self.name = value.to_string(),
            "members" => self.members = parse_list(key, value)?,
            "num-features" => self.num_features = parse_value(key, value)?,
            "restrict" => self.restrict = parse_bool(key, value)?,
            "default-scores" => self.default_scores = Some(parse_list(key, value)?),
            "default-average-others" => self.default_average_others = Some(parse_value(key, value)?),
            "table-limit" => self.table_limit = parse_value(key, value)?,
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

/// How slices of models that did not produce a phrase are filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingScores {
    /// Keep the configured default vector.
    Defaults,
    /// Average the first `n` positions over the models that saw the phrase.
    AverageOthers(usize),
}

/// A phrase while it is being merged.
#[derive(Debug)]
struct Candidate {
    phrase: TargetPhrase,
    scores: Vec<f32>,
    seen_by: Vec<bool>,
}

/// Phrase table whose candidates are the union of its members' candidates.
///
/// Scores are the concatenation of the members' score vectors in member
/// order; the group's weights replace the members' weights.
pub struct PhraseDictionaryGroup {
    id: FeatureId,
    name: String,
    members: Vec<Arc<dyn PhraseTable>>,
    layout: ScoreLayout,
    restrict: bool,
    default_scores: Vec<f32>,
    missing: MissingScores,
    scores_per_model: usize,
    table_limit: usize,
    weights: Arc<Weights>,
}

impl std::fmt::Debug for PhraseDictionaryGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhraseDictionaryGroup")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("members", &self.layout)
            .field("restrict", &self.restrict)
            .field("missing", &self.missing)
            .finish()
    }
}

impl PhraseDictionaryGroup {
    /// Resolves the members in `registry` and checks the score layout.
    pub fn load(
        id: FeatureId,
        opts: &GroupOptions,
        registry: &TableRegistry,
        weights: Arc<Weights>,
    ) -> Result<Self> {
        let mut members = Vec::with_capacity(opts.members.len());
        let mut layout = ScoreLayout::default();
        let mut scores_per_model = 0;
        for name in &opts.members {
            let table = registry
                .find(name)
                .ok_or_else(|| Error::MissingMemberTable(name.clone()))?;
            let n = table.num_scores();
            if scores_per_model == 0 {
                scores_per_model = n;
            } else if opts.default_average_others.is_some() && n != scores_per_model {
                return Err(Error::AveragingDimensionMismatch {
                    feature: opts.name.clone(),
                    table: name.clone(),
                    found: n,
                    expected: scores_per_model,
                });
            }
            layout.register(name, n);
            members.push(table);
        }
        if layout.total() != opts.num_features {
            return Err(Error::ScoreCountMismatch {
                feature: opts.name.clone(),
                members: layout.total(),
                declared: opts.num_features,
            });
        }

        let default_scores = match &opts.default_scores {
            Some(scores) if scores.len() != opts.num_features => {
                return Err(Error::DefaultScoresMismatch {
                    feature: opts.name.clone(),
                    given: scores.len(),
                    expected: opts.num_features,
                })
            }
            Some(scores) => scores.clone(),
            // all 0 rather than an approximation of log(0)
            None => vec![0.0; opts.num_features],
        };

        let missing = match opts.default_average_others {
            Some(n) if n > scores_per_model => {
                return Err(Error::invalid_parameter(
                    "default-average-others",
                    &n.to_string(),
                    format!("members only have {scores_per_model} scores"),
                ))
            }
            Some(n) => MissingScores::AverageOthers(n),
            None => MissingScores::Defaults,
        };

        log::info!(
            "{}: {} members ({:?}), {} scores, restrict: {}, missing: {:?}",
            opts.name,
            members.len(),
            opts.members,
            layout.total(),
            opts.restrict,
            missing
        );
        Ok(Self {
            id,
            name: opts.name.clone(),
            members,
            layout,
            restrict: opts.restrict,
            default_scores,
            missing,
            scores_per_model,
            table_limit: opts.table_limit,
            weights,
        })
    }

    pub fn members(&self) -> &[Arc<dyn PhraseTable>] {
        &self.members
    }

    pub fn missing_scores(&self) -> MissingScores {
        self.missing
    }

    /// Merges the members' candidates for `source`.
    pub fn create_target_phrase_collection(&self, source: &Phrase) -> TargetPhraseCollection {
        let n = self.members.len();
        let mut candidates: Vec<Candidate> = Vec::new();
        let mut index: HashMap<Phrase, usize> = HashMap::new();

        for (i, pd) in self.members.iter().enumerate() {
            let slot = self.layout.slot(FeatureId(i));
            let Some(raw) = pd.target_phrases(source) else {
                continue;
            };
            for tp in raw.iter() {
                let idx = match index.get(&tp.phrase) {
                    Some(&idx) => {
                        // extra scores of later tables win
                        for (key, scores) in &tp.extra_scores {
                            candidates[idx].phrase.set_extra_scores(key, scores.clone());
                        }
                        idx
                    }
                    None => {
                        if self.restrict && i > 0 {
                            continue;
                        }
                        let mut phrase = tp.clone();
                        phrase.scores.remove(pd.id());
                        candidates.push(Candidate {
                            phrase,
                            scores: self.default_scores.clone(),
                            seen_by: vec![false; n],
                        });
                        index.insert(tp.phrase.clone(), candidates.len() - 1);
                        candidates.len() - 1
                    }
                };
                let candidate = &mut candidates[idx];
                if let Some(raw_scores) = tp.scores_for(pd.id()) {
                    for (j, &s) in raw_scores.iter().take(slot.len).enumerate() {
                        candidate.scores[slot.offset + j] = s;
                    }
                }
                candidate.seen_by[i] = true;
            }
        }

        let mut out = TargetPhraseCollection::default();
        for mut candidate in candidates {
            if let MissingScores::AverageOthers(m) = self.missing {
                self.average_others(&mut candidate, m);
            }
            candidate.phrase.scores.assign(self.id, candidate.scores);
            candidate.phrase.evaluate_in_isolation(&self.weights);
            out.add(candidate.phrase);
        }
        out
    }

    fn average_others(&self, candidate: &mut Candidate, m: usize) {
        let seen = candidate.seen_by.iter().filter(|&&s| s).count();
        if seen == candidate.seen_by.len() || seen == 0 {
            return;
        }
        let per = self.scores_per_model;
        let mut avg = vec![0.0f32; m];
        for i in 0..candidate.seen_by.len() {
            if candidate.seen_by[i] {
                for (j, a) in avg.iter_mut().enumerate() {
                    *a += candidate.scores[i * per + j];
                }
            }
        }
        for a in avg.iter_mut() {
            *a /= seen as f32;
        }
        for i in 0..candidate.seen_by.len() {
            if !candidate.seen_by[i] {
                candidate.scores[i * per..i * per + m].copy_from_slice(&avg);
            }
        }
    }
}

impl FeatureFunction for PhraseDictionaryGroup {
    fn id(&self) -> FeatureId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn num_scores(&self) -> usize {
        self.layout.total()
    }

    fn search_caps(&self) -> SearchCaps {
        SearchCaps::PHRASE_BASED
    }
}

impl PhraseTable for PhraseDictionaryGroup {
    fn table_limit(&self) -> usize {
        self.table_limit
    }

    fn prefix_exists(&self, source: &Phrase) -> bool {
        self.members
            .iter()
            .fold(false, |found, pd| pd.prefix_exists(source) || found)
    }

    fn target_phrases(&self, source: &Phrase) -> Option<Cow<'_, TargetPhraseCollection>> {
        let mut collection = self.create_target_phrase_collection(source);
        collection.sort_and_prune(self.table_limit);
        Some(Cow::Owned(collection))
    }

    fn get_target_phrase_collection_batch(&self, arena: &mut PhraseArena, paths: &mut [InputPath]) {
        for path in paths.iter() {
            self.prefix_exists(&path.phrase);
        }
        for path in paths.iter_mut() {
            let mut collection = self.create_target_phrase_collection(&path.phrase);
            collection.sort_and_prune(self.table_limit);
            let handle = arena.cache(self.id, collection);
            path.set_target_phrases(self.id, handle);
        }
    }

    fn clean_up_after_sentence(&self, arena: &mut PhraseArena) {
        let released = arena.release(self.id);
        log::debug!("{}: released {} collections", self.name, released);
        for pd in &self.members {
            pd.clean_up_after_sentence(arena);
        }
    }
}
