//! Property-Based Tests for Audit Log Retention
//!
//! After K recorded requests, a day's list holds `min(K, max_entries)`
//! entries, newest first, and the day key always carries the retention
//! expiry.

use std::sync::Arc;

use larder_api::middleware::RequestAuditLog;
use larder_core::{log_key, LogEntry};
use larder_storage::{InMemoryStore, KeyExpiry, KeyValueStore};
use larder_test_utils::fixtures::tight_retention;
use larder_test_utils::generators::{arb_day, arb_log_entry};
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_log_keeps_newest_entries(
        day in arb_day(),
        entries in prop::collection::vec(arb_log_entry(), 1..40),
        max_entries in 1usize..25,
    ) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        rt.block_on(async {
            let store = InMemoryStore::new();
            let retention = tight_retention(max_entries);
            let log = RequestAuditLog::new(Arc::new(store.clone())).with_retention(retention);

            for entry in &entries {
                if let Err(e) = log.record(day, entry).await {
                    panic!("record failed: {}", e);
                }
            }

            let read = match log.read(day, -1).await {
                Ok(read) => read,
                Err(e) => panic!("read failed: {}", e),
            };
            let expected: Vec<LogEntry> = entries
                .iter()
                .rev()
                .take(max_entries)
                .cloned()
                .collect();

            prop_assert_eq!(read.len(), entries.len().min(max_entries));
            prop_assert_eq!(read, expected);
            prop_assert_eq!(
                store.ttl(&log_key(day)).await,
                Ok(KeyExpiry::ExpiresIn(retention.ttl_secs()))
            );
            Ok(())
        })?;
    }

    #[test]
    fn prop_days_are_independent(
        first in arb_day(),
        second in arb_day(),
        entry in arb_log_entry(),
    ) {
        prop_assume!(first != second);
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        rt.block_on(async {
            let store = InMemoryStore::new();
            let log = RequestAuditLog::new(Arc::new(store.clone()));

            if let Err(e) = log.record(first, &entry).await {
                panic!("record failed: {}", e);
            }

            let other = match log.read(second, 100).await {
                Ok(read) => read,
                Err(e) => panic!("read failed: {}", e),
            };
            prop_assert!(other.is_empty());
            Ok(())
        })?;
    }
}
