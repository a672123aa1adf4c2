use super::*;
use std::cell::RefCell;

/// Records each text it sees and returns its length as a one-element vector
#[derive(Default)]
struct LengthEmbedder {
    seen: RefCell<Vec<String>>,
}

impl Embedder for LengthEmbedder {
    fn embed(&self, text: &str, _model_id: &str) -> Result<Embedding> {
        validate_text(text)?;
        self.seen.borrow_mut().push(text.to_string());
        Ok(vec![text.len() as f32])
    }
}

#[test]
fn default_batch_preserves_order() {
    let embedder = LengthEmbedder::default();
    let texts = vec!["a".to_string(), "abc".to_string(), "ab".to_string()];

    let vectors = embedder
        .embed_batch(&texts, "model")
        .expect("should embed batch");
    assert_eq!(vectors, vec![vec![1.0], vec![3.0], vec![2.0]]);
    assert_eq!(*embedder.seen.borrow(), texts);
}

#[test]
fn default_batch_stops_at_first_failure() {
    let embedder = LengthEmbedder::default();
    let texts = vec!["ok".to_string(), "   ".to_string(), "never".to_string()];

    let result = embedder.embed_batch(&texts, "model");
    assert!(matches!(result, Err(SupportError::InvalidArgument(_))));
    assert_eq!(embedder.seen.borrow().len(), 1);
}

#[test]
fn reference_forwards_to_embedder() {
    let embedder = LengthEmbedder::default();
    let by_ref = &embedder;
    assert_eq!(by_ref.embed("four", "model").expect("should embed"), vec![4.0]);
}

#[test]
fn validate_text_rejects_blank() {
    assert!(validate_text("hello").is_ok());
    assert!(matches!(
        validate_text(" \n\t"),
        Err(SupportError::InvalidArgument(_))
    ));
}

#[test]
fn common_dimension_detects_ragged_batches() {
    assert_eq!(common_dimension(&[]).expect("empty is fine"), None);
    assert_eq!(
        common_dimension(&[vec![0.0; 3], vec![1.0; 3]]).expect("uniform"),
        Some(3)
    );
    assert!(matches!(
        common_dimension(&[vec![0.0; 3], vec![1.0; 2]]),
        Err(SupportError::DimensionMismatch {
            expected: 3,
            actual: 2
        })
    ));
}
