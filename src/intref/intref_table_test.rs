use std::sync::Arc;
use std::time::Duration;

use super::*;
use crate::IntrefError;

#[test]
fn test_register_and_redeem() {
    let table = IntrefTable::new(Duration::from_secs(60));
    let id = table.register(Arc::new(String::from("payload")));

    assert!(id.starts_with("intref:"));
    let value: Arc<String> = table.redeem(&id).unwrap();
    assert_eq!(value.as_str(), "payload");
    assert_eq!(table.len(), 1);
}

#[test]
fn test_redeem_with_the_wrong_type_fails_safely() {
    let table = IntrefTable::new(Duration::from_secs(60));
    let id = table.register(Arc::new(7u64));

    let err = table.redeem::<String>(&id).unwrap_err();
    assert!(matches!(err, IntrefError::TypeMismatch { actual: "u64", .. }));
    // the value is still there for the right type
    assert_eq!(*table.redeem::<u64>(&id).unwrap(), 7);
}

#[test]
fn test_stale_and_malformed_handles() {
    let table = IntrefTable::new(Duration::from_secs(60));
    let old = table.register(Arc::new(1u32));
    assert!(table.remove(&old));
    assert!(!table.remove(&old));

    let new = table.register(Arc::new(2u32));
    assert_ne!(old, new);
    assert_eq!(table.redeem::<u32>(&old).unwrap_err(), IntrefError::Missing(old.clone()));
    assert_eq!(*table.redeem::<u32>(&new).unwrap(), 2);

    for bad in ["", "intref:", "intref:x-1", "task#3", "intref:0"] {
        assert_eq!(
            table.redeem::<u32>(bad).unwrap_err(),
            IntrefError::Malformed(bad.to_string())
        );
    }
    assert!(!table.remove("intref:nope"));
}

#[tokio::test(start_paused = true)]
async fn test_sweep_evicts_only_idle_handles() {
    let table = IntrefTable::new(Duration::from_secs(300));
    let idle = table.register(Arc::new("idle"));
    let busy = table.register(Arc::new("busy"));

    tokio::time::advance(Duration::from_secs(200)).await;
    table.redeem::<&str>(&busy).unwrap();
    assert_eq!(table.sweep(), 0);

    tokio::time::advance(Duration::from_secs(200)).await;
    assert_eq!(table.sweep(), 1);
    assert!(matches!(table.redeem::<&str>(&idle), Err(IntrefError::Missing(_))));
    assert!(table.redeem::<&str>(&busy).is_ok());
}
