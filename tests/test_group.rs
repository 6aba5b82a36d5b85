use std::{
    borrow::Cow,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use mtscore::{
    table::{
        GroupOptions, MemoryPhraseTable, PhraseArena, PhraseDictionaryGroup, PhraseTable, TableRegistry,
    },
    AlignmentInfo, Error, FeatureFunction, FeatureId, InputPath, Phrase, Sentence, TargetPhrase,
    TargetPhraseCollection, Weights,
};

const SOURCE: &str = "das haus";

fn table(id: usize, name: &str, k: usize, rows: &[(&str, &[f32])]) -> MemoryPhraseTable {
    let mut t = MemoryPhraseTable::new(FeatureId(id), name, k);
    for (tgt, scores) in rows {
        t.insert(
            Phrase::from(SOURCE),
            TargetPhrase::new(Phrase::from(*tgt), AlignmentInfo::parse("0-0 1-1").unwrap()),
            scores.to_vec(),
        );
    }
    t
}

fn options(members: &[&str], num_features: usize) -> GroupOptions {
    GroupOptions {
        name: "PDG0".to_string(),
        members: members.iter().map(|s| s.to_string()).collect(),
        num_features,
        ..Default::default()
    }
}

fn registry(tables: Vec<MemoryPhraseTable>) -> TableRegistry {
    let mut registry = TableRegistry::default();
    for t in tables {
        registry.register(Arc::new(t));
    }
    registry
}

fn collection(group: &PhraseDictionaryGroup) -> TargetPhraseCollection {
    group.create_target_phrase_collection(&Phrase::from(SOURCE))
}

fn find<'a>(coll: &'a TargetPhraseCollection, phrase: &str) -> &'a TargetPhrase {
    coll.iter()
        .find(|tp| tp.phrase.to_string() == phrase)
        .unwrap_or_else(|| panic!("{phrase} not in collection"))
}

#[test]
fn phrase_only_in_second_table_gets_default_prefix() {
    let registry = registry(vec![
        table(0, "TM0", 2, &[("the house", &[-0.1, -0.2])]),
        table(1, "TM1", 3, &[("the building", &[-1.0, -2.0, -3.0])]),
    ]);
    let group = PhraseDictionaryGroup::load(FeatureId(2), &options(&["TM0", "TM1"], 5), &registry, Default::default())
        .unwrap();
    let coll = collection(&group);
    assert_eq!(
        find(&coll, "the building").scores_for(FeatureId(2)),
        Some(&[0.0, 0.0, -1.0, -2.0, -3.0][..])
    );
    assert_eq!(
        find(&coll, "the house").scores_for(FeatureId(2)),
        Some(&[-0.1, -0.2, 0.0, 0.0, 0.0][..])
    );
}

#[test]
fn every_candidate_has_the_declared_length() {
    let registry = registry(vec![
        table(0, "TM0", 2, &[("the house", &[-0.1, -0.2]), ("a house", &[-0.3, -0.3])]),
        table(1, "TM1", 1, &[("the house", &[-0.5]), ("home", &[-0.7])]),
        table(2, "TM2", 4, &[("building", &[-1.0, -1.0, -1.0, -1.0])]),
    ]);
    let group = PhraseDictionaryGroup::load(
        FeatureId(3),
        &options(&["TM0", "TM1", "TM2"], 7),
        &registry,
        Default::default(),
    )
    .unwrap();
    let coll = collection(&group);
    assert_eq!(coll.len(), 4);
    for tp in coll.iter() {
        assert_eq!(tp.scores_for(FeatureId(3)).map(<[f32]>::len), Some(7), "{}", tp.phrase);
        assert_eq!(tp.scores.producers().count(), 1);
    }
    assert_eq!(
        find(&coll, "the house").scores_for(FeatureId(3)),
        Some(&[-0.1, -0.2, -0.5, 0.0, 0.0, 0.0, 0.0][..])
    );
}

#[test]
fn restrict_keeps_only_first_table_phrases() {
    let registry = registry(vec![
        table(0, "TM0", 1, &[("the house", &[-0.1])]),
        table(1, "TM1", 1, &[("the house", &[-0.2]), ("the building", &[-0.3])]),
    ]);
    let mut opts = options(&["TM0", "TM1"], 2);
    opts.restrict = true;
    let group = PhraseDictionaryGroup::load(FeatureId(2), &opts, &registry, Default::default()).unwrap();
    let coll = collection(&group);
    assert_eq!(coll.len(), 1);
    assert_eq!(coll.phrases[0].scores_for(FeatureId(2)), Some(&[-0.1, -0.2][..]));
}

#[test]
fn unseen_models_get_average_of_seen() {
    let registry = registry(vec![
        table(0, "TM0", 3, &[("the house", &[-1.0, -2.0, -3.0])]),
        table(1, "TM1", 3, &[("home", &[-5.0, -5.0, -5.0])]),
        table(2, "TM2", 3, &[("the house", &[-3.0, -4.0, -9.0])]),
    ]);
    let mut opts = options(&["TM0", "TM1", "TM2"], 9);
    opts.default_average_others = Some(2);
    let group = PhraseDictionaryGroup::load(FeatureId(3), &opts, &registry, Default::default()).unwrap();
    let coll = collection(&group);
    assert_eq!(
        find(&coll, "the house").scores_for(FeatureId(3)),
        Some(&[-1.0, -2.0, -3.0, -2.0, -3.0, 0.0, -3.0, -4.0, -9.0][..])
    );
    // seen by one model only: its own values spread to the others
    assert_eq!(
        find(&coll, "home").scores_for(FeatureId(3)),
        Some(&[-5.0, -5.0, 0.0, -5.0, -5.0, -5.0, -5.0, -5.0, 0.0][..])
    );
}

#[test]
fn averaging_keeps_configured_defaults_past_the_averaged_scores() {
    let registry = registry(vec![
        table(0, "TM0", 3, &[("the house", &[-1.0, -2.0, -3.0])]),
        table(1, "TM1", 3, &[("home", &[-5.0, -5.0, -5.0])]),
        table(2, "TM2", 3, &[("the house", &[-3.0, -4.0, -9.0])]),
    ]);
    let mut opts = options(&["TM0", "TM1", "TM2"], 9);
    opts.default_scores = Some(vec![-10.0, -11.0, -12.0, -20.0, -21.0, -22.0, -30.0, -31.0, -32.0]);
    opts.default_average_others = Some(2);
    let group = PhraseDictionaryGroup::load(FeatureId(3), &opts, &registry, Default::default()).unwrap();
    let coll = collection(&group);
    assert_eq!(
        find(&coll, "the house").scores_for(FeatureId(3)),
        Some(&[-1.0, -2.0, -3.0, -2.0, -3.0, -22.0, -3.0, -4.0, -9.0][..])
    );
    assert_eq!(
        find(&coll, "home").scores_for(FeatureId(3)),
        Some(&[-5.0, -5.0, -12.0, -5.0, -5.0, -5.0, -5.0, -5.0, -32.0][..])
    );
}

#[test]
fn explicit_defaults_fill_missing_slices() {
    let registry = registry(vec![
        table(0, "TM0", 1, &[("the house", &[-0.1])]),
        table(1, "TM1", 2, &[("home", &[-0.2, -0.3])]),
    ]);
    let mut opts = options(&["TM0", "TM1"], 3);
    opts.default_scores = Some(vec![-100.0, -100.0, -100.0]);
    let group = PhraseDictionaryGroup::load(FeatureId(2), &opts, &registry, Default::default()).unwrap();
    let coll = collection(&group);
    assert_eq!(
        find(&coll, "home").scores_for(FeatureId(2)),
        Some(&[-100.0, -0.2, -0.3][..])
    );
    assert_eq!(
        find(&coll, "the house").scores_for(FeatureId(2)),
        Some(&[-0.1, -100.0, -100.0][..])
    );
}

#[test]
fn load_errors() {
    let registry = registry(vec![
        table(0, "TM0", 2, &[]),
        table(1, "TM1", 3, &[]),
    ]);
    let load = |opts: &GroupOptions| PhraseDictionaryGroup::load(FeatureId(2), opts, &registry, Default::default());

    assert!(matches!(
        load(&options(&["TM0", "TM9"], 5)),
        Err(Error::MissingMemberTable(name)) if name == "TM9"
    ));
    assert!(matches!(
        load(&options(&["TM0", "TM1"], 4)),
        Err(Error::ScoreCountMismatch { members: 5, declared: 4, .. })
    ));

    let mut opts = options(&["TM0", "TM1"], 5);
    opts.default_scores = Some(vec![0.0; 3]);
    assert!(matches!(
        load(&opts),
        Err(Error::DefaultScoresMismatch { given: 3, expected: 5, .. })
    ));

    let mut opts = options(&["TM0", "TM1"], 5);
    opts.default_average_others = Some(1);
    assert!(matches!(
        load(&opts),
        Err(Error::AveragingDimensionMismatch { found: 3, expected: 2, .. })
    ));

    let mut opts = options(&["TM0"], 2);
    opts.default_average_others = Some(3);
    assert!(matches!(load(&opts), Err(Error::InvalidParameter { .. })));
}

#[test]
fn weights_rank_and_limit_candidates() {
    let registry = registry(vec![
        table(0, "TM0", 1, &[("the house", &[-3.0]), ("a house", &[-1.0])]),
        table(1, "TM1", 1, &[("home", &[-2.0])]),
    ]);
    let mut weights = Weights::default();
    weights.set(FeatureId(2), vec![1.0, 0.5]);
    let mut opts = options(&["TM0", "TM1"], 2);
    opts.table_limit = 2;
    let group = PhraseDictionaryGroup::load(FeatureId(2), &opts, &registry, Arc::new(weights)).unwrap();
    let coll = group.target_phrases(&Phrase::from(SOURCE)).unwrap();
    let ranked: Vec<String> = coll.iter().map(|tp| tp.phrase.to_string()).collect();
    // a house: -1, home: -1, the house: -3
    assert_eq!(ranked, vec!["a house", "home"]);
    assert_eq!(coll.phrases[1].future_score, -1.0);
}

/// Member that counts its clean up calls.
struct Counting {
    inner: MemoryPhraseTable,
    cleanups: Arc<AtomicUsize>,
}

impl FeatureFunction for Counting {
    fn id(&self) -> FeatureId {
        self.inner.id()
    }

    fn name(&self) -> &str {
        self.inner.name()
    }

    fn num_scores(&self) -> usize {
        self.inner.num_scores()
    }
}

impl PhraseTable for Counting {
    fn table_limit(&self) -> usize {
        0
    }

    fn target_phrases(&self, source: &Phrase) -> Option<Cow<'_, TargetPhraseCollection>> {
        self.inner.target_phrases(source)
    }

    fn clean_up_after_sentence(&self, arena: &mut PhraseArena) {
        self.cleanups.fetch_add(1, Ordering::SeqCst);
        arena.release(self.id());
    }
}

#[test]
fn batch_lookup_and_clean_up() {
    let cleanups = Arc::new(AtomicUsize::new(0));
    let mut registry = TableRegistry::default();
    for (i, name) in ["TM0", "TM1"].iter().enumerate() {
        registry.register(Arc::new(Counting {
            inner: table(i, name, 1, &[("the house", &[-1.0])]),
            cleanups: Arc::clone(&cleanups),
        }));
    }
    let group = PhraseDictionaryGroup::load(FeatureId(2), &options(&["TM0", "TM1"], 2), &registry, Default::default())
        .unwrap();

    let sentence = Sentence::new(0, "das haus");
    let mut paths = InputPath::all(&sentence, 2);
    let mut arena = PhraseArena::default();
    group.get_target_phrase_collection_batch(&mut arena, &mut paths);
    assert_eq!(arena.live(), paths.len());

    let full = paths.iter().find(|p| p.range.len() == 2).unwrap();
    let coll = arena.get(full.target_phrases(group.id()).unwrap()).unwrap();
    assert_eq!(coll.len(), 1);
    assert_eq!(coll.phrases[0].scores_for(group.id()), Some(&[-1.0, -1.0][..]));
    let single = paths.iter().find(|p| p.range.len() == 1).unwrap();
    assert!(arena.get(single.target_phrases(group.id()).unwrap()).unwrap().is_empty());

    group.clean_up_after_sentence(&mut arena);
    assert_eq!(arena.live(), 0);
    assert_eq!(cleanups.load(Ordering::SeqCst), 2);
}
