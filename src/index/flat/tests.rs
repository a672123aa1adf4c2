use super::*;

fn sample_vectors() -> Vec<Vec<f32>> {
    vec![
        vec![0.0, 0.0, 1.0],
        vec![0.0, 1.0, 0.0],
        vec![1.0, 0.0, 0.0],
        vec![0.6, 0.8, 0.0],
        vec![0.0, 0.6, 0.8],
    ]
}

fn populated(metric: DistanceMetric) -> FlatIndex {
    let mut index = FlatIndex::create(3, metric).expect("should create index");
    index.add(&sample_vectors()).expect("should add vectors");
    index
}

#[test]
fn create_rejects_zero_dimension() {
    let result = FlatIndex::create(0, DistanceMetric::Euclidean);
    assert!(matches!(result, Err(SupportError::InvalidArgument(_))));
}

#[test]
fn add_assigns_sequential_positions() {
    let mut index = FlatIndex::create(3, DistanceMetric::Euclidean).expect("should create index");
    assert!(index.is_empty());

    let first = index.add(&sample_vectors()[..2]).expect("should add");
    assert_eq!(first, 0..2);

    let second = index.add(&sample_vectors()[2..]).expect("should add");
    assert_eq!(second, 2..5);
    assert_eq!(index.len(), 5);
    assert_eq!(index.vector(3), Some(&[0.6, 0.8, 0.0][..]));
    assert_eq!(index.vector(5), None);
}

#[test]
fn add_rejects_wrong_dimension_without_partial_insert() {
    let mut index = populated(DistanceMetric::Euclidean);
    let batch = vec![vec![1.0, 1.0, 1.0], vec![1.0, 1.0]];

    let result = index.add(&batch);
    assert!(matches!(
        result,
        Err(SupportError::DimensionMismatch {
            expected: 3,
            actual: 2
        })
    ));
    assert_eq!(index.len(), 5, "rejected batch must not be partially stored");
}

#[test]
fn add_rejects_non_finite_values() {
    let mut index = populated(DistanceMetric::Cosine);
    let result = index.add(&[vec![f32::NAN, 0.0, 0.0]]);
    assert!(matches!(result, Err(SupportError::InvalidArgument(_))));
    assert_eq!(index.len(), 5);
}

#[test]
fn search_finds_exact_match_first() {
    let index = populated(DistanceMetric::Euclidean);
    for (position, vector) in sample_vectors().iter().enumerate() {
        let neighbors = index.search(vector, 1).expect("search should succeed");
        assert_eq!(neighbors.first().map(|(p, _)| p), Some(position));
    }
}

#[test]
fn euclidean_distances_are_non_decreasing() {
    let index = populated(DistanceMetric::Euclidean);
    let neighbors = index
        .search(&[0.1, 0.9, 0.1], 5)
        .expect("search should succeed");

    assert_eq!(neighbors.len(), 5);
    assert_eq!(neighbors.first().map(|(p, _)| p), Some(1));
    assert!(
        neighbors
            .distances()
            .windows(2)
            .all(|pair| pair[0] <= pair[1])
    );
}

#[test]
fn cosine_similarities_are_non_increasing() {
    let index = populated(DistanceMetric::Cosine);
    let neighbors = index
        .search(&[0.1, 0.9, 0.1], 5)
        .expect("search should succeed");

    assert_eq!(neighbors.len(), 5);
    assert_eq!(neighbors.first().map(|(p, _)| p), Some(1));
    assert!(
        neighbors
            .distances()
            .windows(2)
            .all(|pair| pair[0] >= pair[1])
    );
}

#[test]
fn partial_selection_matches_full_sort() {
    let index = populated(DistanceMetric::Euclidean);
    let query = [0.5, 0.5, 0.5];
    let all = index.search(&query, 5).expect("search should succeed");
    let top_two = index.search(&query, 2).expect("search should succeed");
    assert_eq!(top_two.positions(), &all.positions()[..2]);
}

#[test]
fn ties_are_broken_by_position() {
    let mut index = FlatIndex::create(2, DistanceMetric::Euclidean).expect("should create index");
    index
        .add(&[vec![1.0, 0.0], vec![0.0, 1.0], vec![1.0, 0.0]])
        .expect("should add");

    let neighbors = index.search(&[1.0, 0.0], 3).expect("search should succeed");
    assert_eq!(neighbors.positions(), &[0, 2, 1]);
}

#[test]
fn k_larger_than_index_returns_everything() {
    let index = populated(DistanceMetric::Euclidean);
    let neighbors = index
        .search(&[0.0, 0.0, 0.0], 50)
        .expect("oversized k should not fail");
    assert_eq!(neighbors.len(), 5);

    let mut positions = neighbors.positions().to_vec();
    positions.sort_unstable();
    assert_eq!(positions, vec![0, 1, 2, 3, 4]);
}

#[test]
fn k_zero_is_invalid() {
    let index = populated(DistanceMetric::Euclidean);
    let result = index.search(&[0.0, 0.0, 1.0], 0);
    assert!(matches!(result, Err(SupportError::InvalidArgument(_))));
}

#[test]
fn search_on_empty_index_is_empty_not_error() {
    let index = FlatIndex::create(3, DistanceMetric::Cosine).expect("should create index");
    let neighbors = index
        .search(&[1.0, 0.0, 0.0], 3)
        .expect("empty index search should succeed");
    assert!(neighbors.is_empty());
}

#[test]
fn query_dimension_mismatch_is_reported() {
    let index = populated(DistanceMetric::Euclidean);
    let result = index.search(&[1.0, 0.0], 1);
    assert!(matches!(
        result,
        Err(SupportError::DimensionMismatch {
            expected: 3,
            actual: 2
        })
    ));
}

#[test]
fn duplicate_add_is_tolerated_and_doubles_weight() {
    let mut index = FlatIndex::create(3, DistanceMetric::Euclidean).expect("should create index");
    let vectors = sample_vectors();
    index.add(&vectors).expect("first add");
    index.add(&vectors).expect("second add");

    assert_eq!(index.len(), 2 * vectors.len());

    let neighbors = index.search(&vectors[2], 2).expect("search should succeed");
    assert_eq!(neighbors.positions(), &[2, 2 + vectors.len()]);
    assert!(neighbors.distances().iter().all(|d| d.abs() < f32::EPSILON));
}

#[test]
fn truncate_rolls_back_appended_vectors() {
    let mut index = populated(DistanceMetric::Euclidean);
    index.add(&[vec![9.0, 9.0, 9.0]]).expect("should add");
    index.truncate(5);
    assert_eq!(index, populated(DistanceMetric::Euclidean));
}

#[test]
fn from_parts_rejects_ragged_payload() {
    let result = FlatIndex::from_parts(3, DistanceMetric::Euclidean, vec![1.0; 7]);
    assert!(matches!(result, Err(SupportError::IndexLoad(_))));
}
