use super::*;

#[test]
fn test_insert_get_has() {
    let mut shard = Shard::new(10);
    shard.insert("docs", 1, b"hello".to_vec(), 2);
    assert!(shard.has("docs", 1));
    assert_eq!(shard.get("docs", 1), Some(b"hello".as_slice()));
    assert_eq!(shard.size(), 1);
}

#[test]
fn test_capacity_and_is_full() {
    let mut shard = Shard::new(2);
    shard.insert("docs", 1, vec![], 2);
    assert!(!shard.is_full());
    shard.insert("docs", 2, vec![], 3);
    assert!(shard.is_full());
}

#[test]
fn test_replace_returns_old_value() {
    let mut shard = Shard::new(10);
    shard.insert("docs", 1, b"old".to_vec(), 2);
    let old = shard.replace("docs", 1, b"new".to_vec());
    assert_eq!(old, Some(b"old".to_vec()));
    assert_eq!(shard.get("docs", 1), Some(b"new".as_slice()));
}

#[test]
fn test_remove_decrements_size() {
    let mut shard = Shard::new(10);
    shard.insert("docs", 1, vec![], 2);
    shard.insert("docs", 2, vec![], 3);
    assert_eq!(shard.size(), 2);
    let removed = shard.remove("docs", 1);
    assert!(removed.is_some());
    assert_eq!(shard.size(), 1);
    assert!(shard.remove("docs", 1).is_none());
}

#[test]
fn test_size_is_total_across_collections() {
    let mut shard = Shard::new(10);
    shard.insert("a", 1, vec![], 2);
    shard.insert("b", 1, vec![], 2);
    assert_eq!(shard.size(), 2);
    assert!(shard.is_full() == (2 >= shard.capacity()));
}

#[test]
fn test_iter_collection_and_names() {
    let mut shard = Shard::new(10);
    shard.insert("a", 1, b"x".to_vec(), 2);
    shard.insert("a", 2, b"y".to_vec(), 3);
    let mut items: Vec<_> = shard.iter_collection("a").collect();
    items.sort_by_key(|(id, _)| *id);
    assert_eq!(items, vec![(1, b"x".as_slice()), (2, b"y".as_slice())]);
    assert_eq!(shard.collection_names(), vec!["a".to_string()]);
    assert!(shard.iter_collection("missing").next().is_none());
}
