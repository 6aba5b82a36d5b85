use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    thread,
};

use mtscore::{
    dwl::{
        CeptTable, Classifier, DwlOptions, DwlScorer, MemoryCeptTable, Normalization, PredictorPool, Query,
        LOWEST_SCORE,
    },
    AlignmentInfo, Error, FeatureId, Phrase, Sentence, TargetPhrase, TranslationOption, WordsRange,
};

/// Returns fixed losses and counts how often it was asked.
struct Scripted {
    calls: Arc<AtomicUsize>,
    losses: Vec<f32>,
}

impl Classifier for Scripted {
    fn predict(&mut self, query: &Query<'_>) -> mtscore::Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.losses.iter().copied().take(query.translations.len()).collect())
    }
}

fn cept_table() -> MemoryCeptTable {
    let mut table = MemoryCeptTable::default();
    table.insert("haus", "house", 0.6);
    table.insert("haus", "home", 0.3);
    table.insert("haus", "building", 0.1);
    table.insert("das", "the", 1.0);
    table
}

fn scorer(losses: Vec<f32>, normalization: &str) -> (DwlScorer, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let pool = PredictorPool::new(move || {
        Box::new(Scripted {
            calls: Arc::clone(&counter),
            losses: losses.clone(),
        }) as Box<dyn Classifier>
    });
    let opts = DwlOptions {
        name: "DWL0".to_string(),
        normalization: normalization.parse().unwrap(),
        ..Default::default()
    };
    (DwlScorer::new(FeatureId(0), &opts, Arc::new(cept_table()), pool), calls)
}

fn option(range: WordsRange, target: &str, alignment: &str) -> TranslationOption {
    TranslationOption::new(
        range,
        TargetPhrase::new(Phrase::from(target), AlignmentInfo::parse(alignment).unwrap()),
    )
}

#[test]
fn clipped_linear_example() {
    let mut losses = vec![0.2, 0.8, 1.5];
    Normalization::ClippedLinear.apply(&mut losses);
    let expected = [0.8, 0.2, 0.0];
    for (p, e) in losses.iter().zip(expected) {
        assert!((p - e).abs() < 1e-6, "{losses:?}");
    }
}

#[test]
fn cached_predictions_are_computed_once() {
    let (dwl, calls) = scorer(vec![0.2, 0.8, 1.5], "squared_loss");
    let sentence = Sentence::new(0, "das haus");
    let first = dwl
        .get_cached_predictions("das haus1\nhaus", "haus", &sentence, &[(1, 2)])
        .unwrap();
    let second = dwl
        .get_cached_predictions("das haus1\nhaus", "haus", &sentence, &[(1, 2)])
        .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(Arc::ptr_eq(&first, &second));

    let table = cept_table();
    let house = table.tgt_phrase_id("house").unwrap();
    let building = table.tgt_phrase_id("building").unwrap();
    assert!((first[&house] - 0.8).abs() < 1e-6);
    assert_eq!(first[&building], 0.0);
    let sum: f32 = first.values().sum();
    assert!((sum - 1.0).abs() < 1e-6);
}

#[test]
fn unknown_source_cept_is_cached_empty() {
    let (dwl, calls) = scorer(vec![0.5], "squared_loss");
    let sentence = Sentence::new(0, "ein garten");
    for _ in 0..2 {
        let p = dwl
            .get_cached_predictions("ein garten1\ngarten", "garten", &sentence, &[(1, 2)])
            .unwrap();
        assert!(p.is_empty());
    }
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(dwl.cache().len(), 1);
}

#[test]
fn zero_probability_scores_lowest() {
    let (dwl, _) = scorer(vec![0.2, 0.8, 1.5], "squared_loss");
    let sentence = Sentence::new(0, "das haus");
    let options = [
        option(WordsRange::new(1, 1), "building", "0-0"),
        option(WordsRange::new(1, 1), "home", "0-0"),
    ];
    let scores = dwl.score_options(&options, &sentence).unwrap();
    assert_eq!(scores[0], vec![LOWEST_SCORE, 0.0, 0.0]);
    assert!((scores[1][0] - 0.2f32.ln()).abs() < 1e-5);
}

#[test]
fn extreme_losses_give_finite_scores() {
    let sentence = Sentence::new(0, "das haus");
    let options = [
        option(WordsRange::new(1, 1), "house", "0-0"),
        option(WordsRange::new(1, 1), "home", "0-0"),
    ];
    for normalization in ["logistic_loss_basic", "sigmoid"] {
        let (dwl, _) = scorer(vec![200.0, 400.0, 401.0], normalization);
        let scores = dwl.score_options(&options, &sentence).unwrap();
        assert!(scores.iter().flatten().all(|s| s.is_finite()), "{normalization} {scores:?}");
        assert!(scores[0][0].abs() < 1e-5, "{normalization} {scores:?}");
        assert_eq!(scores[1], vec![LOWEST_SCORE, 0.0, 0.0]);
    }
}

#[test]
fn classifier_must_score_every_translation() {
    let (dwl, _) = scorer(vec![0.1], "logistic_loss_basic");
    let sentence = Sentence::new(0, "haus");
    assert!(matches!(
        dwl.get_cached_predictions("haus0\nhaus", "haus", &sentence, &[(0, 1)]),
        Err(Error::InvalidModel(..))
    ));
    // nothing stored, the next call asks again
    assert!(dwl.cache().is_empty());
}

#[test]
fn null_aligned_words_have_no_span() {
    assert!(matches!(
        DwlScorer::align_to_span_list(4, &[]),
        Err(Error::NullAlignedSpan)
    ));
    assert_eq!(DwlScorer::align_to_span_list(4, &[0, 2, 3]).unwrap(), vec![(4, 5), (6, 8)]);
}

#[test]
fn concurrent_tasks_agree() {
    let (dwl, calls) = scorer(vec![0.3, 0.5, 0.9], "squared_loss");
    let sentence = Sentence::new(0, "das haus");
    let options = [
        option(WordsRange::new(0, 1), "the house", "0-0 1-1"),
        option(WordsRange::new(0, 1), "the home", "0-0 1-1"),
        option(WordsRange::new(0, 1), "the nice building", "0-0 1-2"),
    ];
    let expected = dwl.score_options(&options, &sentence).unwrap();
    dwl.cache().clear();
    let after_first = calls.load(Ordering::SeqCst);

    let results: Vec<_> = thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|_| s.spawn(|| dwl.score_options(&options, &sentence).unwrap()))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    for scores in &results {
        assert_eq!(scores, &expected);
    }
    assert_eq!(dwl.cache().len(), 2);
    // at least one miss per key, at most one per key and thread
    let misses = calls.load(Ordering::SeqCst) - after_first;
    assert!((1..=16).contains(&misses), "{misses}");
    assert_eq!(expected[2][2], 1.0);
}
