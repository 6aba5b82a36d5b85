use std::{
    borrow::Cow,
    collections::HashMap,
    fs::File,
    io::{BufRead, BufReader},
    path::PathBuf,
};

use serde::{Deserialize, Serialize};

use crate::{
    config::{parse_value, Configurable},
    errors::{Error, Result},
    ff::{ChartFeatureFunction, FeatureFunction},
    phrase::{AlignmentInfo, Phrase, TargetPhrase, TargetPhraseCollection, WordsRange},
    score::{FeatureId, ScoreBreakdown, ScoreVector, Weights},
};

use super::PhraseTable;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct MemoryTableOptions {
    pub name: String,
    pub path: Option<PathBuf>,
    pub num_features: usize,
    #[serde(default)]
    pub table_limit: usize,
}

impl Configurable for MemoryTableOptions {
    fn set_parameter(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "name" => self.name = value.to_string(),
            "path" => self.path = Some(PathBuf::from(value)),
            "num-features" => self.num_features = parse_value(key, value)?,
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

/// Read-only phrase table held in memory.
///
/// Text format, one entry per line:
/// `source ||| target ||| score score ... ||| 0-0 1-1`
/// (the alignment field is optional).
#[derive(Debug)]
pub struct MemoryPhraseTable {
    id: FeatureId,
    name: String,
    num_scores: usize,
    table_limit: usize,
    entries: HashMap<Phrase, TargetPhraseCollection>,
}

impl MemoryPhraseTable {
    pub fn new(id: FeatureId, name: &str, num_scores: usize) -> Self {
        Self {
            id,
            name: name.to_string(),
            num_scores,
            table_limit: 0,
            entries: HashMap::new(),
        }
    }

    pub fn load(id: FeatureId, opts: &MemoryTableOptions, weights: &Weights) -> Result<Self> {
        let path = opts.path.as_ref().ok_or_else(|| Error::InvalidParameter {
            key: "path".to_string(),
            value: String::new(),
            reason: format!("{} needs a table path", opts.name),
        })?;
        let f = File::open(path)?;
        let mut table = Self::from_reader(id, opts, BufReader::new(f))?;
        table.apply_weights(weights);
        log::info!(
            "{}: loaded {} source phrases from {:?}",
            table.name,
            table.entries.len(),
            path
        );
        Ok(table)
    }

    pub fn from_reader<R: BufRead>(id: FeatureId, opts: &MemoryTableOptions, reader: R) -> Result<Self> {
        let mut table = Self::new(id, &opts.name, opts.num_features);
        table.table_limit = opts.table_limit;
        for (lineno, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split("|||").map(str::trim).collect();
            if fields.len() < 3 {
                return Err(Error::InvalidModel(format!(
                    "{}:{}: expected 'source ||| target ||| scores'",
                    opts.name,
                    lineno + 1
                )));
            }
            let scores: ScoreVector = fields[2]
                .split_whitespace()
                .map(|s| {
                    s.parse().map_err(|_| {
                        Error::InvalidModel(format!("{}:{}: bad score '{s}'", opts.name, lineno + 1))
                    })
                })
                .collect::<Result<_>>()?;
            if scores.len() != table.num_scores {
                return Err(Error::InvalidModel(format!(
                    "{}:{}: {} scores, expected {}",
                    opts.name,
                    lineno + 1,
                    scores.len(),
                    table.num_scores
                )));
            }
            let alignment = match fields.get(3) {
                Some(a) => AlignmentInfo::parse(a)?,
                None => AlignmentInfo::default(),
            };
            table.insert(
                Phrase::from(fields[0]),
                TargetPhrase::new(Phrase::from(fields[1]), alignment),
                scores,
            );
        }
        Ok(table)
    }

    /// Adds `target` as a translation of `source` with this table's `scores`.
    pub fn insert(&mut self, source: Phrase, mut target: TargetPhrase, scores: ScoreVector) {
        debug_assert_eq!(scores.len(), self.num_scores);
        target.future_score = scores.iter().sum();
        target.scores.assign(self.id, scores);
        self.entries.entry(source).or_default().add(target);
    }

    /// Recomputes every candidate's pruning score and re-sorts.
    pub fn apply_weights(&mut self, weights: &Weights) {
        for coll in self.entries.values_mut() {
            for tp in coll.phrases.iter_mut() {
                tp.evaluate_in_isolation(weights);
            }
            coll.sort_and_prune(self.table_limit);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every `(source, target)` pair in the table.
    pub fn pairs(&self) -> impl Iterator<Item = (&Phrase, &TargetPhrase)> {
        self.entries
            .iter()
            .flat_map(|(src, coll)| coll.iter().map(move |tp| (src, tp)))
    }
}

impl FeatureFunction for MemoryPhraseTable {
    fn id(&self) -> FeatureId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn num_scores(&self) -> usize {
        self.num_scores
    }
}

/// Table scores do not depend on where the phrase lands, so the table works
/// under chart search as well.
impl ChartFeatureFunction for MemoryPhraseTable {
    fn evaluate_when_applied_chart(
        &self,
        _span: WordsRange,
        target: &TargetPhrase,
        accumulator: &mut ScoreBreakdown,
    ) -> Result<()> {
        if let Some(scores) = target.scores_for(self.id) {
            accumulator.plus_equals(self.id, scores);
        }
        Ok(())
    }
}

impl PhraseTable for MemoryPhraseTable {
    fn table_limit(&self) -> usize {
        self.table_limit
    }

    fn prefix_exists(&self, source: &Phrase) -> bool {
        self.entries.contains_key(source)
    }

    fn target_phrases(&self, source: &Phrase) -> Option<Cow<'_, TargetPhraseCollection>> {
        self.entries.get(source).map(Cow::Borrowed)
    }
}
