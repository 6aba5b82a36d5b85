//! Feature lines (`Kind key=value ...`) and the JSON decoder configuration.

use std::{collections::HashMap, fs::File, io::BufReader, path::Path, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{
    errors::{Error, Result},
    ff::SearchMode,
};

/// Components that take `key=value` settings before they are loaded.
pub trait Configurable {
    fn set_parameter(&mut self, key: &str, value: &str) -> Result<()>;
}

/// One feature declaration, e.g.
/// `PhraseDictionaryGroup name=PDG0 members=TM0,TM1 num-features=5`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureLine {
    pub kind: String,
    pub params: Vec<(String, String)>,
}

impl FromStr for FeatureLine {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut tokens = s.split_whitespace();
        let kind = tokens
            .next()
            .ok_or_else(|| Error::invalid_parameter("feature", s, "empty feature line"))?
            .to_string();
        let mut params = Vec::new();
        for tok in tokens {
            let (key, value) = tok
                .split_once('=')
                .ok_or_else(|| Error::invalid_parameter(tok, "", "expected key=value"))?;
            params.push((key.to_string(), value.to_string()));
        }
        Ok(FeatureLine { kind, params })
    }
}

impl FeatureLine {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Explicit `name=`, or the kind followed by `index`, the way unnamed
    /// features are numbered.
    pub fn name_or(&self, index: usize) -> String {
        self.get("name")
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}{}", self.kind, index))
    }

    pub fn apply<C: Configurable>(&self, target: &mut C) -> Result<()> {
        for (key, value) in &self.params {
            target.set_parameter(key, value)?;
        }
        Ok(())
    }
}

pub fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| Error::invalid_parameter(key, value, e))
}

pub fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => Err(Error::invalid_parameter(key, value, "expected a boolean")),
    }
}

/// Comma separated list.
pub fn parse_list<T: FromStr>(key: &str, value: &str) -> Result<Vec<T>>
where
    T::Err: std::fmt::Display,
{
    value
        .split(',')
        .filter(|s| !s.trim().is_empty())
        .map(|s| parse_value(key, s))
        .collect()
}

fn default_max_phrase_length() -> usize {
    7
}

/// Top-level configuration read from JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DecoderConfig {
    #[serde(default)]
    pub search: SearchMode,
    /// Feature lines in load order; members must precede their group.
    pub features: Vec<String>,
    /// Weights by feature name.
    #[serde(default)]
    pub weights: HashMap<String, Vec<f32>>,
    #[serde(default = "default_max_phrase_length")]
    pub max_phrase_length: usize,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            search: SearchMode::default(),
            features: Vec::new(),
            weights: HashMap::new(),
            max_phrase_length: default_max_phrase_length(),
        }
    }
}

impl DecoderConfig {
    pub fn from_path(path: &Path) -> Result<Self> {
        let f = File::open(path)?;
        Ok(serde_json::from_reader(BufReader::new(f))?)
    }

    pub fn feature_lines(&self) -> Result<Vec<FeatureLine>> {
        self.features.iter().map(|s| s.parse()).collect()
    }
}
