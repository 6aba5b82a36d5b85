//! Loaded models and the per-sentence translation task.

use std::{collections::HashMap, sync::Arc};

use crate::{
    config::{DecoderConfig, FeatureLine},
    coverage::CoverageSet,
    dwl::{Classifier, DwlOptions, DwlScorer, FrequencyClassifier, MemoryCeptTable, PredictorPool},
    errors::{Error, Result},
    ff::{FeatureFunction, Hypothesis, SearchMode, StatefulFeatureFunction},
    osm::{OpSequenceModel, OsmOptions},
    phrase::{AlignmentInfo, InputPath, Phrase, Sentence, TargetPhrase, TranslationOption, Word},
    score::{FeatureId, ScoreBreakdown, ScoreLayout, Weights},
    table::{
        GroupOptions, MemoryPhraseTable, MemoryTableOptions, PhraseArena, PhraseDictionaryGroup, PhraseTable,
        TableRegistry,
    },
};

pub type ClassifierFactory = Arc<dyn Fn() -> Box<dyn Classifier> + Send + Sync>;

/// Everything loaded from a [`DecoderConfig`]; shared read-only by all tasks.
pub struct System {
    search: SearchMode,
    max_phrase_length: usize,
    layout: ScoreLayout,
    weights: Arc<Weights>,
    registry: TableRegistry,
    /// Tables queried directly: every table that is not a group member.
    decoding_tables: Vec<Arc<dyn PhraseTable>>,
    osm: Vec<Arc<OpSequenceModel>>,
    dwl: Vec<Arc<DwlScorer>>,
}

impl std::fmt::Debug for System {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("System")
            .field("search", &self.search)
            .field("layout", &self.layout)
            .field("tables", &self.registry.len())
            .field("osm", &self.osm)
            .field("dwl", &self.dwl)
            .finish()
    }
}

impl System {
    /// Loads every feature with [`FrequencyClassifier`] behind the DWL
    /// scorers.
    pub fn load(config: &DecoderConfig) -> Result<Self> {
        Self::load_with_classifier(config, Arc::new(|| Box::new(FrequencyClassifier) as Box<dyn Classifier>))
    }

    pub fn load_with_classifier(config: &DecoderConfig, classifier: ClassifierFactory) -> Result<Self> {
        let lines = config.feature_lines()?;

        let mut counters: HashMap<String, usize> = HashMap::new();
        let names: Vec<String> = lines
            .iter()
            .map(|line| {
                let n = counters.entry(line.kind.clone()).or_default();
                let name = line.name_or(*n);
                *n += 1;
                name
            })
            .collect();

        let mut weights = Weights::default();
        for (name, w) in &config.weights {
            let index = names
                .iter()
                .position(|n| n == name)
                .ok_or_else(|| Error::UnknownFeature(name.clone()))?;
            weights.set(FeatureId(index), w.clone());
        }
        let weights = Arc::new(weights);

        let mut layout = ScoreLayout::default();
        let mut registry = TableRegistry::default();
        let mut memory_tables: Vec<Arc<MemoryPhraseTable>> = Vec::new();
        let mut members: Vec<String> = Vec::new();
        let mut osm: Vec<OpSequenceModel> = Vec::new();
        let mut dwl = Vec::new();

        for (line, name) in lines.iter().zip(&names) {
            let id = FeatureId(layout.len());
            let num_scores = match line.kind.as_str() {
                "PhraseDictionaryMemory" => {
                    let opts = configure(line, name, MemoryTableOptions::default(), |o, n| o.name = n)?;
                    let table = MemoryPhraseTable::load(id, &opts, &weights)?;
                    let n = admit(&table, config.search)?;
                    let table = Arc::new(table);
                    registry.register(Arc::clone(&table) as Arc<dyn PhraseTable>);
                    memory_tables.push(table);
                    n
                }
                "PhraseDictionaryGroup" => {
                    let opts = configure(line, name, GroupOptions::default(), |o, n| o.name = n)?;
                    let group = PhraseDictionaryGroup::load(id, &opts, &registry, Arc::clone(&weights))?;
                    let n = admit(&group, config.search)?;
                    members.extend(opts.members.iter().cloned());
                    registry.register(Arc::new(group));
                    n
                }
                "OpSequenceModel" => {
                    let opts = configure(line, name, OsmOptions::default(), |o, n| o.name = n)?;
                    let model = OpSequenceModel::load(id, &opts)?;
                    let n = admit(&model, config.search)?;
                    osm.push(model);
                    n
                }
                "DWL" => {
                    let opts = configure(line, name, DwlOptions::default(), |o, n| o.name = n)?;
                    let path = opts.path.as_ref().ok_or_else(|| {
                        Error::invalid_parameter("path", "", format!("{} needs a cept table path", opts.name))
                    })?;
                    let cept_table = Arc::new(MemoryCeptTable::from_path(path)?);
                    let factory = Arc::clone(&classifier);
                    let pool = PredictorPool::new(move || factory());
                    let scorer = DwlScorer::new(id, &opts, cept_table, pool);
                    let n = admit(&scorer, config.search)?;
                    dwl.push(Arc::new(scorer));
                    n
                }
                other => return Err(Error::UnknownFeature(other.to_string())),
            };

            if let Some(w) = weights.get(id) {
                if w.len() != num_scores {
                    return Err(Error::invalid_parameter(
                        "weights",
                        name,
                        format!("{} weights for {} scores", w.len(), num_scores),
                    ));
                }
            }
            let registered = layout.register(name, num_scores);
            debug_assert_eq!(registered, id);
        }

        let pairs: Vec<_> = memory_tables.iter().flat_map(|t| t.pairs()).collect();
        let mut osm_models = Vec::with_capacity(osm.len());
        for mut model in osm {
            model.precompute_future_scores(pairs.iter().copied())?;
            osm_models.push(Arc::new(model));
        }

        let decoding_tables: Vec<_> = registry
            .iter()
            .filter(|t| !members.iter().any(|m| m == t.name()))
            .cloned()
            .collect();
        log::info!(
            "loaded {} features ({} scores), {} decoding tables",
            layout.len(),
            layout.total(),
            decoding_tables.len()
        );

        Ok(Self {
            search: config.search,
            max_phrase_length: config.max_phrase_length,
            layout,
            weights,
            registry,
            decoding_tables,
            osm: osm_models,
            dwl,
        })
    }

    pub fn search(&self) -> SearchMode {
        self.search
    }

    pub fn layout(&self) -> &ScoreLayout {
        &self.layout
    }

    pub fn weights(&self) -> &Weights {
        &self.weights
    }

    pub fn tables(&self) -> &TableRegistry {
        &self.registry
    }

    pub fn decoding_tables(&self) -> &[Arc<dyn PhraseTable>] {
        &self.decoding_tables
    }

    pub fn osm(&self) -> &[Arc<OpSequenceModel>] {
        &self.osm
    }

    pub fn dwl(&self) -> &[Arc<DwlScorer>] {
        &self.dwl
    }

    /// Releases everything the tables cached for a sentence.
    pub fn clean_up_after_sentence(&self, arena: &mut PhraseArena) {
        for table in &self.decoding_tables {
            table.clean_up_after_sentence(arena);
        }
        log::debug!("{} collections left after clean up", arena.live());
    }
}

/// Rejects features that cannot serve `search`; returns their score count.
fn admit(feature: &dyn FeatureFunction, search: SearchMode) -> Result<usize> {
    feature.check_search(search)?;
    Ok(feature.num_scores())
}

fn configure<C, F>(line: &FeatureLine, name: &str, mut opts: C, set_name: F) -> Result<C>
where
    C: crate::config::Configurable,
    F: FnOnce(&mut C, String),
{
    set_name(&mut opts, name.to_string());
    line.apply(&mut opts)?;
    Ok(opts)
}

/// Task-local data of one sentence.
#[derive(Debug)]
pub struct SentenceContext {
    pub sentence: Sentence,
    pub paths: Vec<InputPath>,
    pub arena: PhraseArena,
}

/// A translation option with its scores.
#[derive(Debug, Clone)]
pub struct ScoredOption {
    pub option: TranslationOption,
    /// Table and context scores.
    pub scores: ScoreBreakdown,
    /// Estimates of stateful features.
    pub estimated: ScoreBreakdown,
    pub total: f32,
}

/// Translation of one sentence. Per-sentence clean up runs exactly once, in
/// [`TranslationTask::finish`] or when the task is dropped.
pub struct TranslationTask<'a> {
    system: &'a System,
    context: SentenceContext,
    cleaned: bool,
}

impl<'a> TranslationTask<'a> {
    pub fn new(system: &'a System, sentence: Sentence) -> Self {
        let paths = InputPath::all(&sentence, system.max_phrase_length);
        Self {
            system,
            context: SentenceContext {
                sentence,
                paths,
                arena: PhraseArena::default(),
            },
            cleaned: false,
        }
    }

    pub fn context(&self) -> &SentenceContext {
        &self.context
    }

    pub fn sentence(&self) -> &Sentence {
        &self.context.sentence
    }

    /// Looks up every span in every decoding table and scores the resulting
    /// options with the stateless and the isolation estimates.
    ///
    /// Single words without any candidate get an OOV option that copies the
    /// source word.
    pub fn collect_options(&mut self) -> Result<Vec<ScoredOption>> {
        let ctx = &mut self.context;
        for table in &self.system.decoding_tables {
            table.get_target_phrase_collection_batch(&mut ctx.arena, &mut ctx.paths);
        }

        let mut out = Vec::new();
        for path in &ctx.paths {
            let mut options = Vec::new();
            for table in &self.system.decoding_tables {
                let Some(coll) = path
                    .target_phrases(table.id())
                    .and_then(|h| ctx.arena.get(h))
                else {
                    continue;
                };
                options.extend(coll.iter().map(|tp| TranslationOption::new(path.range, tp.clone())));
            }
            if options.is_empty() && path.range.len() == 1 {
                let word = &ctx.sentence.word(path.range.start).text;
                log::debug!("sentence {}: no translation for {:?}", ctx.sentence.id, word);
                let target = TargetPhrase::new(
                    Phrase {
                        words: vec![Word::oov(word)],
                    },
                    AlignmentInfo::new([(0, 0)]),
                );
                options.push(TranslationOption::new(path.range, target));
            }
            if options.is_empty() {
                continue;
            }

            let mut scores: Vec<ScoreBreakdown> = options.iter().map(|o| o.target.scores.clone()).collect();
            for dwl in &self.system.dwl {
                dwl.evaluate_options(&options, &ctx.sentence, &mut scores)?;
            }
            for (option, scores) in options.into_iter().zip(scores) {
                let mut estimated = ScoreBreakdown::default();
                let mut breakdown = ScoreBreakdown::default();
                for osm in &self.system.osm {
                    osm.evaluate_in_isolation(&path.phrase, &option.target, &mut breakdown, &mut estimated)?;
                }
                let total = scores.weighted_sum(&self.system.weights) + estimated.weighted_sum(&self.system.weights);
                out.push(ScoredOption {
                    option,
                    scores,
                    estimated,
                    total,
                });
            }
        }
        log::debug!(
            "sentence {}: {} options over {} spans",
            ctx.sentence.id,
            out.len(),
            ctx.paths.len()
        );
        Ok(out)
    }

    /// Applies `options` one after another from the empty hypothesis and
    /// returns the accumulated scores, threading every stateful feature's
    /// state along the way.
    pub fn evaluate_sequence(&self, options: &[TranslationOption]) -> Result<ScoreBreakdown> {
        let sentence = &self.context.sentence;
        let mut coverage = CoverageSet::new(sentence.len());
        let mut states: Vec<_> = self
            .system
            .osm
            .iter()
            .map(|osm| osm.empty_hypothesis_state(sentence))
            .collect();
        let mut acc = ScoreBreakdown::default();
        for option in options {
            let range = option.range;
            if range.end >= sentence.len() || (range.start..=range.end).any(|i| coverage.is_covered(i)) {
                return Err(Error::invalid_parameter(
                    "option",
                    &format!("[{}, {}]", range.start, range.end),
                    "span is outside the sentence or already covered",
                ));
            }
            coverage.set_range(range, true);
            acc.plus_equals_all(&option.target.scores);
            let hypo = Hypothesis {
                sentence,
                coverage: &coverage,
                range,
                target: &option.target,
            };
            for (osm, state) in self.system.osm.iter().zip(states.iter_mut()) {
                *state = osm.evaluate(&hypo, state, &mut acc)?;
            }
        }
        Ok(acc)
    }

    /// Ends the task; returns how many cached collections were released.
    pub fn finish(mut self) -> usize {
        self.clean_up()
    }

    fn clean_up(&mut self) -> usize {
        if self.cleaned {
            return 0;
        }
        self.cleaned = true;
        let before = self.context.arena.live();
        self.system.clean_up_after_sentence(&mut self.context.arena);
        before - self.context.arena.live()
    }
}

impl Drop for TranslationTask<'_> {
    fn drop(&mut self) {
        self.clean_up();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(features: &[&str]) -> DecoderConfig {
        DecoderConfig {
            features: features.iter().map(|s| s.to_string()).collect(),
            max_phrase_length: 3,
            ..Default::default()
        }
    }

    #[test]
    fn unknown_feature_kind() {
        assert!(matches!(
            System::load(&config(&["LexicalReordering"])),
            Err(Error::UnknownFeature(kind)) if kind == "LexicalReordering"
        ));
    }

    #[test]
    fn weights_for_unknown_feature() {
        let mut cfg = config(&[]);
        cfg.weights.insert("TM9".to_string(), vec![1.0]);
        assert!(matches!(System::load(&cfg), Err(Error::UnknownFeature(..))));
    }

    #[test]
    fn group_needs_members_first() {
        assert!(matches!(
            System::load(&config(&["PhraseDictionaryGroup members=TM0 num-features=1"])),
            Err(Error::MissingMemberTable(name)) if name == "TM0"
        ));
    }

    #[test]
    fn empty_system_gives_oov_options() {
        let system = System::load(&config(&[])).unwrap();
        let mut task = TranslationTask::new(&system, Sentence::new(3, "ein haus"));
        let options = task.collect_options().unwrap();
        assert_eq!(options.len(), 2);
        assert!(options.iter().all(|o| o.option.is_oov()));
        assert_eq!(task.context().paths.len(), 3);
    }
}
