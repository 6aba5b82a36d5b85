use std::{collections::BTreeMap, path::PathBuf, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{
    config::{parse_value, Configurable},
    errors::{Error, Result},
    ff::{FeatureFunction, SearchCaps},
    phrase::{Sentence, TranslationOption},
    score::{FeatureId, ScoreBreakdown, ScoreVector},
};

use super::{
    cache::{PredictionCache, Predictions, DEFAULT_CAPACITY},
    cept_table::CeptTable,
    classifier::{PredictorPool, Query},
    normalize::Normalization,
};

/// Stands in for `ln(0)`.
pub const LOWEST_SCORE: f32 = -100.0;

fn default_cache_size() -> usize {
    DEFAULT_CAPACITY
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DwlOptions {
    pub name: String,
    /// Cept table location.
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub normalization: Normalization,
    #[serde(default = "default_cache_size")]
    pub cache_size: usize,
}

impl Default for DwlOptions {
    fn default() -> Self {
        Self {
            name: String::new(),
            path: None,
            normalization: Normalization::default(),
            cache_size: DEFAULT_CAPACITY,
        }
    }
}

impl Configurable for DwlOptions {
    fn set_parameter(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "name" => self.name = value.to_string(),
            "path" => self.path = Some(PathBuf::from(value)),
            "normalization" => self.normalization = value.parse()?,
            "cache-size" => self.cache_size = parse_value(key, value)?,
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

/// Discriminative word lexicon: scores each target word of an option by the
/// probability a context classifier gives it as translation of the source
/// words it is aligned to.
///
/// Scores are `[sum of ln(prob), pruned words, null-aligned words]`.
pub struct DwlScorer {
    id: FeatureId,
    name: String,
    normalization: Normalization,
    cache: PredictionCache,
    cept_table: Arc<dyn CeptTable>,
    pool: PredictorPool,
}

impl std::fmt::Debug for DwlScorer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DwlScorer")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("normalization", &self.normalization)
            .field("cache", &self.cache)
            .field("pool", &self.pool)
            .finish()
    }
}

impl DwlScorer {
    pub const NUM_SCORES: usize = 3;

    pub fn new(id: FeatureId, opts: &DwlOptions, cept_table: Arc<dyn CeptTable>, pool: PredictorPool) -> Self {
        log::info!(
            "{}: normalization {}, cache size {}",
            opts.name,
            opts.normalization,
            opts.cache_size
        );
        Self {
            id,
            name: opts.name.clone(),
            normalization: opts.normalization,
            cache: PredictionCache::new(opts.cache_size),
            cept_table,
            pool,
        }
    }

    pub fn cache(&self) -> &PredictionCache {
        &self.cache
    }

    pub fn normalization(&self) -> Normalization {
        self.normalization
    }

    /// Predictions for the cept `source_cept` under `key`, asking the
    /// classifier only on a cache miss.
    pub fn get_cached_predictions(
        &self,
        key: &str,
        source_cept: &str,
        sentence: &Sentence,
        spans: &[(usize, usize)],
    ) -> Result<Arc<Predictions>> {
        self.cache.get_or_insert_with(key, || {
            if !self.cept_table.src_exists(source_cept) {
                log::debug!("{}: source cept {:?} not in cept table", self.name, source_cept);
                return Ok(Predictions::new());
            }
            let translations = self.cept_table.translations(source_cept);
            if log::log_enabled!(log::Level::Trace) {
                for t in translations {
                    log::trace!(
                        "{}: {:?} -> {:?}",
                        self.name,
                        source_cept,
                        self.cept_table.tgt_string(t.index)
                    );
                }
            }
            let query = Query {
                sentence,
                spans,
                source_cept,
                translations,
            };
            let mut losses = self.pool.acquire().predict(&query)?;
            if losses.len() != translations.len() {
                return Err(Error::InvalidModel(format!(
                    "{}: classifier returned {} losses for {} translations of {:?}",
                    self.name,
                    losses.len(),
                    translations.len(),
                    source_cept
                )));
            }
            self.normalization.apply(&mut losses);
            Ok(translations
                .iter()
                .zip(losses)
                .map(|(t, p)| (t.index, p))
                .collect::<BTreeMap<_, _>>())
        })
    }

    /// Scores every option of one source span.
    pub fn score_options(&self, options: &[TranslationOption], sentence: &Sentence) -> Result<Vec<ScoreVector>> {
        let Some(first) = options.first() else {
            return Ok(Vec::new());
        };
        if first.is_oov() {
            log::debug!("{}: not scoring OOV {}", self.name, sentence.word(first.start()).text);
            return Ok(vec![vec![0.0, 1.0, 0.0]; options.len()]);
        }

        let mut out = Vec::with_capacity(options.len());
        for option in options {
            let start = option.start();
            let aligned = option.target.alignment.aligned_source_words();
            let mut scores = vec![0.0; Self::NUM_SCORES];
            for tgt_pos in 0..option.target.len() {
                let Some(positions) = aligned.get(&tgt_pos).filter(|p| !p.is_empty()) else {
                    scores[2] += 1.0;
                    continue;
                };
                let source_cept = Self::source_cept(sentence, start, positions);
                let key = format!("{}{}\n{}", sentence, start, source_cept);
                let spans = Self::align_to_span_list(start, positions)?;
                let predictions = self.get_cached_predictions(&key, &source_cept, sentence, &spans)?;
                let word = &option.target.word(tgt_pos).text;
                match self
                    .cept_table
                    .tgt_phrase_id(word)
                    .and_then(|id| predictions.get(&id))
                {
                    Some(&p) if p.abs() < 1e-5 => scores[0] += LOWEST_SCORE,
                    Some(&p) => scores[0] += p.ln(),
                    None => {
                        log::trace!("{}: {:?} pruned for {:?}", self.name, word, source_cept);
                        scores[1] += 1.0;
                    }
                }
            }
            out.push(scores);
        }
        Ok(out)
    }

    /// Adds [`Self::score_options`] to each option's accumulator.
    pub fn evaluate_options(
        &self,
        options: &[TranslationOption],
        sentence: &Sentence,
        accumulators: &mut [ScoreBreakdown],
    ) -> Result<()> {
        let scores = self.score_options(options, sentence)?;
        for (acc, s) in accumulators.iter_mut().zip(scores) {
            acc.plus_equals(self.id, &s);
        }
        Ok(())
    }

    /// Source words at `positions` (relative to `start`) joined by spaces.
    pub fn source_cept(sentence: &Sentence, start: usize, positions: &[usize]) -> String {
        positions
            .iter()
            .map(|&p| sentence.word(start + p).text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Groups sorted relative `positions` into half-open sentence spans.
    pub fn align_to_span_list(start: usize, positions: &[usize]) -> Result<Vec<(usize, usize)>> {
        let (&head, rest) = positions.split_first().ok_or(Error::NullAlignedSpan)?;
        let mut out = Vec::new();
        let (mut first, mut last) = (head, head);
        for &p in rest {
            if p == last + 1 {
                last = p;
            } else {
                out.push((start + first, start + last + 1));
                first = p;
                last = p;
            }
        }
        out.push((start + first, start + last + 1));
        Ok(out)
    }
}

impl FeatureFunction for DwlScorer {
    fn id(&self) -> FeatureId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn num_scores(&self) -> usize {
        Self::NUM_SCORES
    }

    fn search_caps(&self) -> SearchCaps {
        SearchCaps::PHRASE_BASED
    }
}
