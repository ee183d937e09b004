use super::*;

#[test]
fn test_insert_is_idempotent_and_keys_carry_the_domain() {
    let store = MemoryNodeStore::new("fs");
    let a = store.insert("/tmp/a");
    let again = store.insert("/tmp/a");

    assert_eq!(a, again);
    assert_eq!(a.as_str(), "fs:/tmp/a");
    assert_eq!(store.len(), 1);
    assert_eq!(store.location(&a).as_deref(), Some("/tmp/a"));
    assert_eq!(store.full_location(&a), "fs:/tmp/a");
}

#[test]
fn test_values_of_evicted_nodes_are_not_resurrected() {
    let store = MemoryNodeStore::new("fs");
    let a = store.insert("/tmp/a");
    assert!(store.set_value(&a, "size", PropertyValue::Uint(42)));
    assert_eq!(store.value(&a, "size"), Some(PropertyValue::Uint(42)));

    assert!(store.evict(&a));
    assert!(!store.set_value(&a, "size", PropertyValue::Uint(7)));
    assert!(!store.contains(&a));
    assert_eq!(store.location(&a), None);
    assert!(store.is_empty());
}
