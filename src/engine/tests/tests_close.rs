#[cfg(test)]
mod tests {
    use crate::engine::EngineError;
    use crate::engine::tests::helpers::{memtable_only_config, open_fresh};
    use tempfile::TempDir;

    #[test]
    fn test_close_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let engine = open_fresh(tmp.path(), &memtable_only_config());

        engine.close().unwrap();
        engine.close().unwrap();
        engine.close().unwrap();
    }

    #[test]
    fn test_operations_after_close_fail() {
        let tmp = TempDir::new().unwrap();
        let engine = open_fresh(tmp.path(), &memtable_only_config());
        engine.put(b"k", b"v", false).unwrap();
        engine.close().unwrap();

        assert!(matches!(
            engine.put(b"k", b"v2", false),
            Err(EngineError::Closed)
        ));
        assert!(matches!(engine.delete(b"k", false), Err(EngineError::Closed)));
        assert!(matches!(engine.get(b"k"), Err(EngineError::Closed)));
        assert!(matches!(engine.get_prefix(b""), Err(EngineError::Closed)));
        assert!(matches!(engine.write_barrier(), Err(EngineError::Closed)));
        assert!(matches!(engine.read_barrier(), Err(EngineError::Closed)));
    }

    #[test]
    fn test_close_through_cloned_handle() {
        let tmp = TempDir::new().unwrap();
        let engine = open_fresh(tmp.path(), &memtable_only_config());
        let other = engine.clone();

        other.close().unwrap();

        assert!(matches!(engine.get(b"k"), Err(EngineError::Closed)));
        engine.close().unwrap(); // still idempotent through the first handle
    }

    #[test]
    fn test_counters_readable_after_close() {
        let tmp = TempDir::new().unwrap();
        let engine = open_fresh(tmp.path(), &memtable_only_config());
        engine.put(b"k", b"v", false).unwrap();
        engine.close().unwrap();

        let counters = engine.counters();
        assert_eq!(counters.write_ops, 1);
    }
}
