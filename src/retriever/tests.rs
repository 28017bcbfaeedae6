use super::*;
use tempfile::TempDir;

fn segment(text: &str) -> Segment {
    Segment {
        text: text.to_string(),
        source_id: "notes.md".to_string(),
        offset: 0,
    }
}

fn create_index(records: &[(&str, Vec<f32>)]) -> (VectorIndex, TempDir) {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let mut index = VectorIndex::new(temp_dir.path(), "retrieval").expect("should create index");
    if !records.is_empty() {
        index
            .add(
                records
                    .iter()
                    .map(|(text, embedding)| (embedding.clone(), segment(text)))
                    .collect(),
            )
            .expect("should add records");
    }
    (index, temp_dir)
}

/// Two near-duplicate windows and one distinct but still relevant window
fn near_duplicate_index() -> (VectorIndex, TempDir) {
    create_index(&[
        ("overlap window a", vec![1.0, 0.2, 0.0]),
        ("overlap window b", vec![1.0, 0.21, 0.0]),
        ("different topic", vec![0.2, 1.0, 0.0]),
        ("unrelated", vec![0.0, 0.0, 1.0]),
    ])
}

const QUERY: [f32; 3] = [1.0, 0.8, 0.0];

fn texts(segments: &[Segment]) -> Vec<&str> {
    segments.iter().map(|s| s.text.as_str()).collect()
}

#[test]
fn plain_returns_top_k_by_similarity() {
    let (index, _temp_dir) = near_duplicate_index();
    let retriever = Retriever::new(&index);

    let segments = retriever
        .retrieve(&QUERY, 2, RetrievalMode::Plain)
        .expect("should retrieve");

    assert_eq!(texts(&segments), vec!["overlap window b", "overlap window a"]);
}

#[test]
fn diverse_skips_near_duplicates() {
    let (index, _temp_dir) = near_duplicate_index();
    let retriever = Retriever::new(&index);

    let segments = retriever
        .retrieve(
            &QUERY,
            2,
            RetrievalMode::Diverse {
                fetch_k: 4,
                lambda: 0.5,
            },
        )
        .expect("should retrieve");

    assert_eq!(texts(&segments), vec!["overlap window b", "different topic"]);
}

#[test]
fn diverse_scores_are_query_relevance() {
    let (index, _temp_dir) = near_duplicate_index();
    let retriever = Retriever::new(&index);

    let hits = retriever
        .retrieve_scored(
            &QUERY,
            2,
            RetrievalMode::Diverse {
                fetch_k: 4,
                lambda: 0.5,
            },
        )
        .expect("should retrieve");
    let plain = index.search(&QUERY, 4).expect("should search");

    for hit in &hits {
        let expected = plain
            .iter()
            .find(|p| p.id == hit.id)
            .expect("hit should be in the plain results");
        assert!((hit.score - expected.score).abs() < 1e-6);
    }
}

#[test]
fn diverse_with_k_one_equals_plain() {
    let (index, _temp_dir) = near_duplicate_index();
    let retriever = Retriever::new(&index);

    for lambda in [0.0, 0.5, 1.0] {
        let diverse = retriever
            .retrieve_scored(&QUERY, 1, RetrievalMode::Diverse { fetch_k: 4, lambda })
            .expect("should retrieve");
        let plain = retriever
            .retrieve_scored(&QUERY, 1, RetrievalMode::Plain)
            .expect("should retrieve");
        assert_eq!(diverse, plain);
    }
}

#[test]
fn zero_lambda_matches_plain_order() {
    let (index, _temp_dir) = near_duplicate_index();
    let retriever = Retriever::new(&index);

    let diverse = retriever
        .retrieve(
            &QUERY,
            3,
            RetrievalMode::Diverse {
                fetch_k: 4,
                lambda: 0.0,
            },
        )
        .expect("should retrieve");
    let plain = retriever
        .retrieve(&QUERY, 3, RetrievalMode::Plain)
        .expect("should retrieve");

    assert_eq!(diverse, plain);
}

#[test]
fn pool_is_at_least_k() {
    let (index, _temp_dir) = near_duplicate_index();
    let retriever = Retriever::new(&index);

    let segments = retriever
        .retrieve(
            &QUERY,
            3,
            RetrievalMode::Diverse {
                fetch_k: 1,
                lambda: 0.5,
            },
        )
        .expect("should retrieve");

    assert_eq!(segments.len(), 3);
}

#[test]
fn exhausted_pool_returns_fewer() {
    let (index, _temp_dir) = create_index(&[
        ("one", vec![1.0, 0.0]),
        ("two", vec![0.0, 1.0]),
    ]);
    let retriever = Retriever::new(&index);

    let segments = retriever
        .retrieve(
            &[1.0, 1.0],
            5,
            RetrievalMode::Diverse {
                fetch_k: 10,
                lambda: 0.5,
            },
        )
        .expect("should retrieve");
    assert_eq!(segments.len(), 2);
}

#[test]
fn empty_index_returns_nothing() {
    let (index, _temp_dir) = create_index(&[]);
    let retriever = Retriever::new(&index);

    for mode in [
        RetrievalMode::Plain,
        RetrievalMode::Diverse {
            fetch_k: 20,
            lambda: 0.5,
        },
    ] {
        let segments = retriever
            .retrieve(&[0.1, 0.2, 0.3], 3, mode)
            .expect("empty index is not an error");
        assert!(segments.is_empty());
    }
}

#[test]
fn invalid_arguments() {
    let (index, _temp_dir) = near_duplicate_index();
    let retriever = Retriever::new(&index);

    assert!(matches!(
        retriever.retrieve(&QUERY, 0, RetrievalMode::Plain),
        Err(RagError::InvalidArgument(_))
    ));
    assert!(matches!(
        retriever.retrieve(
            &QUERY,
            0,
            RetrievalMode::Diverse {
                fetch_k: 4,
                lambda: 0.5
            }
        ),
        Err(RagError::InvalidArgument(_))
    ));
    assert!(matches!(
        retriever.retrieve(
            &QUERY,
            2,
            RetrievalMode::Diverse {
                fetch_k: 4,
                lambda: f32::NAN
            }
        ),
        Err(RagError::InvalidArgument(_))
    ));
    assert!(matches!(
        retriever.retrieve(&[1.0, 0.0], 2, RetrievalMode::Plain),
        Err(RagError::DimensionMismatch {
            expected: 3,
            actual: 2
        })
    ));
}

#[test]
fn config_maps_to_mode() {
    let mut config = RetrievalConfig::default();
    assert_eq!(config.retrieval_mode(), RetrievalMode::Plain);

    config.mode = SearchMode::Diverse;
    config.fetch_k = 5;
    config.lambda = 0.25;
    assert_eq!(
        config.retrieval_mode(),
        RetrievalMode::Diverse {
            fetch_k: 5,
            lambda: 0.25
        }
    );
    assert_eq!(SearchMode::Diverse.to_string(), "diverse");
}
