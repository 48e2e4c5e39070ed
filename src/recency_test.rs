use super::*;

#[test]
fn test_record_and_oldest_until() {
    let mut idx = RecencyIndex::new();
    idx.record(("docs".into(), 1), 100);
    idx.record(("docs".into(), 2), 200);
    idx.record(("docs".into(), 3), 50);

    let oldest = idx.oldest_until(150);
    assert_eq!(oldest, vec![("docs".into(), 1), ("docs".into(), 2)]);
}

#[test]
fn test_re_record_moves_to_newest() {
    let mut idx = RecencyIndex::new();
    idx.record(("docs".into(), 1), 10);
    idx.record(("docs".into(), 2), 10);
    idx.record(("docs".into(), 1), 10);

    let oldest = idx.oldest_until(10);
    assert_eq!(oldest, vec![("docs".into(), 2)]);
}

#[test]
fn test_remove() {
    let mut idx = RecencyIndex::new();
    idx.record(("docs".into(), 1), 10);
    idx.remove(&("docs".into(), 1));
    assert!(!idx.contains(&("docs".into(), 1)));
    assert_eq!(idx.len(), 0);
}

#[test]
fn test_bulk_record_preserves_input_order() {
    let mut idx = RecencyIndex::new();
    idx.record_bulk(vec![(("docs".into(), 1), 10), (("docs".into(), 2), 10), (("docs".into(), 3), 10)]);
    assert_eq!(idx.oldest_until(20), vec![("docs".into(), 1), ("docs".into(), 2)]);
}

#[test]
fn test_est_size_lookup() {
    let mut idx = RecencyIndex::new();
    idx.record(("docs".into(), 1), 42);
    assert_eq!(idx.est_size(&("docs".into(), 1)), Some(42));
    assert_eq!(idx.est_size(&("docs".into(), 2)), None);
}
