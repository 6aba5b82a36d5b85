use std::{
    collections::HashMap,
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};

use crate::{
    errors::{Error, Result},
    quark::{Quark, StringTable},
};

/// One possible translation of a source cept.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CeptTranslation {
    /// Target phrase id in the table's target index.
    pub index: usize,
    /// Relative frequency from extraction, handed to the classifier as-is.
    pub score: f32,
}

/// Lookup of the translations a classifier chooses between.
pub trait CeptTable: Send + Sync {
    fn src_exists(&self, cept: &str) -> bool;

    /// Translations of `cept`, empty when unknown.
    fn translations(&self, cept: &str) -> &[CeptTranslation];

    fn tgt_phrase_id(&self, phrase: &str) -> Option<usize>;

    fn tgt_string(&self, id: usize) -> Option<&str>;
}

/// Cept table read from a tab separated file: `source\ttarget[\tscore]`.
#[derive(Debug, Default)]
pub struct MemoryCeptTable {
    targets: Quark,
    entries: HashMap<String, Vec<CeptTranslation>>,
}

impl MemoryCeptTable {
    pub fn from_path(path: &Path) -> Result<Self> {
        let f = File::open(path)?;
        let table = Self::from_reader(BufReader::new(f))?;
        log::info!(
            "cept table {:?}: {} source cepts, {} target phrases",
            path,
            table.entries.len(),
            table.targets.len()
        );
        Ok(table)
    }

    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut table = Self::default();
        for (lineno, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split('\t').collect();
            let score = match fields.len() {
                2 => 1.0,
                3 => fields[2].trim().parse().map_err(|_| {
                    Error::InvalidModel(format!("cept table:{}: bad score '{}'", lineno + 1, fields[2]))
                })?,
                _ => {
                    return Err(Error::InvalidModel(format!(
                        "cept table:{}: expected 'source<TAB>target[<TAB>score]'",
                        lineno + 1
                    )))
                }
            };
            table.insert(fields[0].trim(), fields[1].trim(), score);
        }
        Ok(table)
    }

    pub fn insert(&mut self, source: &str, target: &str, score: f32) -> usize {
        let index = self.targets.find_or_insert(target) as usize;
        let translations = self.entries.entry(source.to_string()).or_default();
        if !translations.iter().any(|t| t.index == index) {
            translations.push(CeptTranslation { index, score });
        }
        index
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl CeptTable for MemoryCeptTable {
    fn src_exists(&self, cept: &str) -> bool {
        self.entries.contains_key(cept)
    }

    fn translations(&self, cept: &str) -> &[CeptTranslation] {
        self.entries.get(cept).map(Vec::as_slice).unwrap_or(&[])
    }

    fn tgt_phrase_id(&self, phrase: &str) -> Option<usize> {
        self.targets.to_id(phrase).map(|id| id as usize)
    }

    fn tgt_string(&self, id: usize) -> Option<&str> {
        self.targets.to_str(id as u32)
    }
}
