//! Discovery Module Tests
//!
//! ## Test Scopes
//! - **Codec**: file name encoding/decoding of service records.
//! - **Filesystem Registry**: register/unregister/list against a temporary directory tree.
//! - **Discovery Client**: attempt bounds and first-sighting behaviour, driven by a
//!   counting in-memory registry and a zero-delay retry policy.

#[cfg(test)]
mod tests {
    use crate::discovery::client::DiscoveryClient;
    use crate::discovery::memory::MemoryRegistry;
    use crate::discovery::registry::{FsRegistry, ServiceRegistry, SharedRegistry};
    use crate::discovery::retry::RetryPolicy;
    use crate::discovery::types::{ServiceKind, ServiceRecord, decode_file_name, encode_file_name};
    use crate::error::{DiscoveryError, RegistryError};
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::SystemTime;

    fn temp_registry() -> (tempfile::TempDir, FsRegistry) {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let registry = FsRegistry::init(dir.path()).expect("Failed to init registry");
        (dir, registry)
    }

    /// Counts `read_one` calls and publishes `pending` once `appear_after`
    /// reads have come back empty.
    struct CountingRegistry {
        inner: MemoryRegistry,
        reads: AtomicU32,
        appear_after: Option<u32>,
        pending: ServiceRecord,
    }

    impl CountingRegistry {
        fn new(appear_after: Option<u32>) -> Self {
            Self {
                inner: MemoryRegistry::new(),
                reads: AtomicU32::new(0),
                appear_after,
                pending: ServiceRecord::new(ServiceKind::Split, "10.0.0.9", 4100),
            }
        }
    }

    impl ServiceRegistry for CountingRegistry {
        fn register(&self, record: &ServiceRecord) -> Result<(), RegistryError> {
            self.inner.register(record)
        }

        fn unregister(&self, record: &ServiceRecord) -> Result<(), RegistryError> {
            self.inner.unregister(record)
        }

        fn list_all(&self, kind: ServiceKind) -> Result<Vec<ServiceRecord>, RegistryError> {
            self.inner.list_all(kind)
        }

        fn registered_at(&self, record: &ServiceRecord) -> Result<Option<SystemTime>, RegistryError> {
            self.inner.registered_at(record)
        }

        fn read_one(&self, kind: ServiceKind) -> Result<Option<ServiceRecord>, RegistryError> {
            let previous = self.reads.fetch_add(1, Ordering::SeqCst);
            if self.appear_after == Some(previous) {
                self.inner.register(&self.pending)?;
            }
            self.inner.read_one(kind)
        }
    }

    // ============================================================
    // FILE NAME CODEC
    // ============================================================

    #[test]
    fn test_file_name_round_trip() {
        let cases = [
            (0u16, "localhost"),
            (5555, "10.0.0.1"),
            (65535, "node-07.cluster-a"),
            (40001, "2001:db8::1"),
        ];

        for (port, hostname) in cases {
            let name = encode_file_name(port, hostname);
            assert_eq!(decode_file_name(&name), Some((port, hostname.to_string())));
        }
    }

    #[test]
    fn test_decode_rejects_malformed_names() {
        assert_eq!(decode_file_name("notaport-host"), None);
        assert_eq!(decode_file_name("5555"), None);
        assert_eq!(decode_file_name("5555-"), None);
        assert_eq!(decode_file_name("-host"), None);
        assert_eq!(decode_file_name("70000-host"), None);
        assert_eq!(decode_file_name("+55-host"), None);
        assert_eq!(decode_file_name(".5555-host.swp"), None);
    }

    #[test]
    fn test_decode_accepts_only_canonical_names() {
        // Would decode to `8080-host`, a different file.
        assert_eq!(decode_file_name("08080-host"), None);
        assert_eq!(decode_file_name("00-host"), None);
        assert_eq!(decode_file_name("0-host"), Some((0, "host".to_string())));

        // Hostnames that could never be registered.
        assert_eq!(decode_file_name("5555-node\\7"), None);
        assert_eq!(decode_file_name("5555-node\07"), None);
    }

    #[test]
    fn test_hostname_keeps_later_separators() {
        let record = ServiceRecord::from_file_name(ServiceKind::Solve, "40001-solver-3-eu")
            .expect("valid name");
        assert_eq!(record.port, 40001);
        assert_eq!(record.hostname, "solver-3-eu");
    }

    #[test]
    fn test_record_without_hostname_has_no_file_name() {
        let record = ServiceRecord::new(ServiceKind::Split, "", 5555);
        assert!(record.file_name().is_err());

        let record = ServiceRecord::new(ServiceKind::Split, "a/b", 5555);
        assert!(record.file_name().is_err());
    }

    #[test]
    fn test_kind_directory_names_are_distinct() {
        let names: HashSet<&str> = ServiceKind::ALL
            .iter()
            .map(|kind| kind.directory_name())
            .collect();
        assert_eq!(names.len(), ServiceKind::ALL.len());

        for kind in ServiceKind::ALL {
            assert_eq!(kind.directory_name().parse::<ServiceKind>().unwrap(), kind);
        }
        assert_eq!("gather".parse::<ServiceKind>().unwrap(), ServiceKind::Gather);
        assert!("QUEUE".parse::<ServiceKind>().is_err());
    }

    // ============================================================
    // FILESYSTEM REGISTRY
    // ============================================================

    #[test]
    fn test_register_creates_empty_marker_file() {
        let (_dir, registry) = temp_registry();
        let record = ServiceRecord::new(ServiceKind::Split, "10.0.0.1", 5555);

        registry.register(&record).unwrap();

        let path = registry.kind_dir(ServiceKind::Split).join("5555-10.0.0.1");
        let meta = std::fs::metadata(&path).expect("marker file should exist");
        assert!(meta.is_file());
        assert_eq!(meta.len(), 0);

        assert_eq!(registry.list_all(ServiceKind::Split).unwrap(), vec![record]);
    }

    #[test]
    fn test_malformed_entries_are_skipped() {
        let (_dir, registry) = temp_registry();
        let solve_dir = registry.kind_dir(ServiceKind::Solve);

        std::fs::write(solve_dir.join("notaport-host"), b"").unwrap();
        std::fs::write(solve_dir.join("5555-10.0.0.1"), b"").unwrap();
        std::fs::create_dir(solve_dir.join("6666-subdir")).unwrap();
        std::fs::write(solve_dir.join("07777-10.0.0.2"), b"").unwrap();
        std::fs::write(solve_dir.join("8888-node\\8"), b"").unwrap();

        let records = registry.list_all(ServiceKind::Solve).unwrap();
        assert_eq!(
            records,
            vec![ServiceRecord::new(ServiceKind::Solve, "10.0.0.1", 5555)]
        );
        assert_eq!(registry.read_one(ServiceKind::Solve).unwrap(), records.first().cloned());
    }

    #[test]
    fn test_unregister_is_idempotent() {
        let (_dir, registry) = temp_registry();
        let record = ServiceRecord::new(ServiceKind::Gather, "node-1", 4000);

        registry.register(&record).unwrap();
        registry.unregister(&record).unwrap();
        registry.unregister(&record).unwrap();

        assert!(registry.list_all(ServiceKind::Gather).unwrap().is_empty());
        assert_eq!(registry.registered_at(&record).unwrap(), None);
    }

    #[test]
    fn test_multiple_solvers_coexist() {
        let (_dir, registry) = temp_registry();

        for port in [40001, 40002, 40003] {
            registry
                .register(&ServiceRecord::new(ServiceKind::Solve, "node-2", port))
                .unwrap();
        }

        let ports: HashSet<u16> = registry
            .list_all(ServiceKind::Solve)
            .unwrap()
            .into_iter()
            .map(|record| record.port)
            .collect();
        assert_eq!(ports, HashSet::from([40001, 40002, 40003]));
        assert!(registry.list_all(ServiceKind::Split).unwrap().is_empty());
    }

    #[test]
    fn test_missing_kind_directory_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let registry = FsRegistry::new(dir.path());

        assert!(matches!(
            registry.read_one(ServiceKind::Split),
            Err(RegistryError::MissingDirectory { .. })
        ));
        assert!(matches!(
            registry.list_all(ServiceKind::Solve),
            Err(RegistryError::MissingDirectory { .. })
        ));
        assert!(matches!(
            registry.register(&ServiceRecord::new(ServiceKind::Split, "h", 1)),
            Err(RegistryError::MissingDirectory { .. })
        ));
    }

    #[test]
    fn test_registered_at_reports_live_records() {
        let (_dir, registry) = temp_registry();
        let record = ServiceRecord::new(ServiceKind::Simplify, "node-1", 4001);

        assert_eq!(registry.registered_at(&record).unwrap(), None);
        registry.register(&record).unwrap();
        assert!(registry.registered_at(&record).unwrap().is_some());
    }

    // ============================================================
    // IN-MEMORY REGISTRY
    // ============================================================

    #[test]
    fn test_memory_registry_matches_contract() {
        let registry = MemoryRegistry::new();
        let first = ServiceRecord::new(ServiceKind::Solve, "a", 1);
        let second = ServiceRecord::new(ServiceKind::Solve, "b", 2);

        assert_eq!(registry.read_one(ServiceKind::Solve).unwrap(), None);

        registry.register(&first).unwrap();
        registry.register(&second).unwrap();
        registry.register(&first).unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.read_one(ServiceKind::Solve).unwrap(), Some(second.clone()));

        registry.unregister(&second).unwrap();
        registry.unregister(&second).unwrap();
        assert_eq!(registry.list_all(ServiceKind::Solve).unwrap(), vec![first]);

        assert!(
            registry
                .register(&ServiceRecord::new(ServiceKind::Split, "", 1))
                .is_err()
        );
    }

    // ============================================================
    // DISCOVERY CLIENT
    // ============================================================

    #[tokio::test]
    async fn test_discovery_gives_up_after_bound() {
        let registry = Arc::new(CountingRegistry::new(None));
        let client = DiscoveryClient::new(registry.clone(), RetryPolicy::immediate(4));

        let found = client
            .find_with_policy(ServiceKind::Split, &RetryPolicy::immediate(4))
            .await
            .unwrap();

        assert!(found.is_none());
        assert_eq!(registry.reads.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_discovery_returns_on_first_sighting() {
        let registry = Arc::new(CountingRegistry::new(Some(2)));
        let client = DiscoveryClient::new(registry.clone(), RetryPolicy::immediate(10));

        let found = client.find_or_fail(ServiceKind::Split).await.unwrap();

        assert_eq!(found, registry.pending);
        assert_eq!(registry.reads.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_discovery_with_zero_timeout_reads_once() {
        let registry = Arc::new(CountingRegistry::new(None));
        let client = DiscoveryClient::new(registry.clone(), RetryPolicy::default());

        let found = client.find_with_timeout(ServiceKind::Gather, 0).await.unwrap();

        assert!(found.is_none());
        assert_eq!(registry.reads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_find_or_fail_reports_not_found() {
        let registry: SharedRegistry = Arc::new(MemoryRegistry::new());
        let client = DiscoveryClient::new(registry, RetryPolicy::immediate(2));

        let err = client.find_or_fail(ServiceKind::Simplify).await.unwrap_err();

        match err {
            DiscoveryError::NotFound { kind, attempts } => {
                assert_eq!(kind, ServiceKind::Simplify);
                assert_eq!(attempts, 3);
            }
            other => panic!("Expected NotFound, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_directory_is_not_retried() {
        let dir = tempfile::tempdir().unwrap();
        let registry: SharedRegistry = Arc::new(FsRegistry::new(dir.path().join("absent")));
        let client = DiscoveryClient::new(registry, RetryPolicy::immediate(100));

        let err = client.find_or_fail(ServiceKind::Split).await.unwrap_err();
        assert!(matches!(
            err,
            DiscoveryError::Registry(RegistryError::MissingDirectory { .. })
        ));
    }

    #[tokio::test]
    async fn test_discovery_over_filesystem() {
        let (_dir, registry) = temp_registry();
        let record = ServiceRecord::new(ServiceKind::Gather, "10.1.2.3", 39812);
        registry.register(&record).unwrap();

        let client = DiscoveryClient::new(Arc::new(registry), RetryPolicy::immediate(0));
        assert_eq!(client.find_or_fail(ServiceKind::Gather).await.unwrap(), record);
    }
}
