use super::*;
use crate::testing::{HashingEmbedder, UnavailableEmbedder};
use tempfile::TempDir;

const DIM: usize = 256;

const CORPUS: &str = "query,response\n\
    How do I reset my password?,Click 'Forgot password' on the login page.\n\
    What are your support hours?,We're open 9am-5pm EST.\n\
    Can I get a refund for my order?,Refunds are processed within 5 days.\n";

fn test_config(temp_dir: &TempDir) -> Config {
    let mut config = Config {
        base_dir: temp_dir.path().to_path_buf(),
        ..Config::default()
    };
    config.retrieval.embedding_model = "hashing".to_string();
    config.retrieval.embedding_dimension = DIM;
    config.service.batch_size = 2;

    let corpus_path = config.corpus_path();
    fs::create_dir_all(corpus_path.parent().expect("corpus path has a parent"))
        .expect("should create data dir");
    fs::write(&corpus_path, CORPUS).expect("should write corpus");
    config
}

fn lock_path(indexer: &Indexer<&HashingEmbedder>) -> PathBuf {
    let mut name = indexer.store().path().as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

#[test]
fn build_embeds_every_row_in_order() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = test_config(&temp_dir);
    let embedder = HashingEmbedder::new(DIM);
    let indexer = Indexer::new(&embedder, &config);

    let stats = indexer.build(false).expect("should build index");
    assert_eq!(stats.rows_embedded, 3);
    assert_eq!(stats.positions, 0..3);
    assert_eq!(stats.total_vectors, 3);
    assert!(indexer.store().exists());
    assert!(!lock_path(&indexer).exists(), "lock should be released");

    let index = indexer.store().open().expect("should open index");
    let expected = embedder
        .embed("What are your support hours?", "hashing")
        .expect("should embed");
    assert_eq!(index.vector(1), Some(expected.as_slice()));
}

#[test]
fn build_refuses_to_replace_without_force() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = test_config(&temp_dir);
    let embedder = HashingEmbedder::new(DIM);
    let indexer = Indexer::new(&embedder, &config);

    indexer.build(false).expect("first build should succeed");
    let result = indexer.build(false);
    assert!(
        matches!(&result, Err(SupportError::InvalidArgument(message)) if message.contains("--force")),
        "unexpected result: {:?}",
        result
    );

    let stats = indexer.build(true).expect("forced rebuild should succeed");
    assert_eq!(stats.total_vectors, 3);
}

#[test]
fn append_adds_rows_after_existing_positions() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = test_config(&temp_dir);
    let embedder = HashingEmbedder::new(DIM);
    let indexer = Indexer::new(&embedder, &config);
    indexer.build(false).expect("should build index");

    let new_rows = Corpus::from_pairs([
        ("Do you ship internationally?", "Yes, to 40 countries."),
        ("How do I close my account?", "Contact support to close it."),
    ]);
    let stats = indexer.append(&new_rows).expect("should append");
    assert_eq!(stats.rows_embedded, 2);
    assert_eq!(stats.positions, 3..5);
    assert_eq!(stats.total_vectors, 5);

    let corpus = Corpus::load(&config.corpus_path(), &CorpusColumns::from_config(&config))
        .expect("should reload corpus");
    assert_eq!(corpus.len(), 5);
    assert_eq!(
        corpus.get(4).map(|r| r.query.as_str()),
        Some("How do I close my account?")
    );

    let report = indexer.verify().expect("should verify");
    assert!(report.is_consistent);
}

#[test]
fn append_with_no_rows_changes_nothing() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = test_config(&temp_dir);
    let embedder = HashingEmbedder::new(DIM);
    let indexer = Indexer::new(&embedder, &config);
    indexer.build(false).expect("should build index");
    let calls = embedder.calls();

    let stats = indexer.append(&Corpus::default()).expect("should append");
    assert_eq!(stats.rows_embedded, 0);
    assert_eq!(stats.positions, 3..3);
    assert_eq!(embedder.calls(), calls);
}

#[test]
fn append_refuses_out_of_sync_corpus() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = test_config(&temp_dir);
    let embedder = HashingEmbedder::new(DIM);
    let indexer = Indexer::new(&embedder, &config);
    indexer.build(false).expect("should build index");

    let edited = format!("{}Is there a mobile app?,Yes.\n", CORPUS);
    fs::write(config.corpus_path(), &edited).expect("should edit corpus");

    let new_rows = Corpus::from_pairs([("Do you ship internationally?", "Yes.")]);
    let result = indexer.append(&new_rows);
    assert!(matches!(result, Err(SupportError::Corpus(_))));

    let corpus_text = fs::read_to_string(config.corpus_path()).expect("should read corpus");
    assert_eq!(corpus_text, edited, "corpus must not be touched");
    assert_eq!(indexer.store().open().expect("should open").len(), 3);
}

#[test]
fn failed_embedding_leaves_corpus_untouched() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = test_config(&temp_dir);
    let embedder = HashingEmbedder::new(DIM);
    Indexer::new(&embedder, &config)
        .build(false)
        .expect("should build index");

    let unavailable = Indexer::new(UnavailableEmbedder, &config);
    let result = unavailable.append(&Corpus::from_pairs([("Is there a mobile app?", "Yes.")]));
    assert!(result.expect_err("append should fail").is_retryable());

    let corpus_text = fs::read_to_string(config.corpus_path()).expect("should read corpus");
    assert_eq!(corpus_text, CORPUS);
    assert_eq!(unavailable.store().open().expect("should open").len(), 3);
}

#[test]
fn build_rejects_vectors_of_wrong_dimension() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = test_config(&temp_dir);
    let embedder = HashingEmbedder::new(DIM / 2);
    let indexer = Indexer::new(&embedder, &config);

    let result = indexer.build(false);
    assert!(matches!(
        result,
        Err(SupportError::DimensionMismatch {
            expected: DIM,
            actual: 128
        })
    ));
    assert!(!indexer.store().exists());
}

#[test]
fn held_lock_blocks_ingestion() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = test_config(&temp_dir);
    let embedder = HashingEmbedder::new(DIM);
    let indexer = Indexer::new(&embedder, &config);

    let lock = lock_path(&indexer);
    fs::create_dir_all(lock.parent().expect("lock has a parent")).expect("should create dir");
    fs::write(&lock, "").expect("should create lock");

    let result = indexer.build(false);
    assert!(matches!(result, Err(SupportError::IndexPersist(_))));
    assert!(lock.exists(), "a lock held by another run must not be removed");
    assert_eq!(embedder.calls(), 0);
}

#[test]
fn verify_reports_drift() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = test_config(&temp_dir);
    let embedder = HashingEmbedder::new(DIM);
    let indexer = Indexer::new(&embedder, &config);
    indexer.build(false).expect("should build index");

    let report = indexer.verify_deep(3).expect("should verify");
    assert!(report.is_consistent);
    assert_eq!(report.rows_sampled, 3);

    fs::write(config.corpus_path(), "query,response\nOnly one row,left\n")
        .expect("should shrink corpus");
    let report = indexer.verify_deep(3).expect("should verify");
    assert!(!report.is_consistent);
    assert_eq!(report.orphaned_vectors, 1..3);
    assert_eq!(report.rows_sampled, 0);
}

#[test]
fn verify_without_index_fails() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = test_config(&temp_dir);
    let embedder = HashingEmbedder::new(DIM);
    let indexer = Indexer::new(&embedder, &config);

    assert!(matches!(indexer.verify(), Err(SupportError::IndexLoad(_))));
}

#[test]
fn verify_from_config_needs_no_embedder() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = test_config(&temp_dir);
    let embedder = HashingEmbedder::new(DIM);
    Indexer::new(&embedder, &config)
        .build(false)
        .expect("should build index");

    let report = verify(&config).expect("should verify");
    assert!(report.is_consistent);
    assert_eq!(report.corpus_rows, 3);
}
