#[cfg(test)]
mod tests {
    use crate::engine::tests::helpers::{memtable_only_config, open_fresh, small_buffer_config};
    use tempfile::TempDir;

    #[test]
    fn test_prefix_scan_with_tombstone() {
        let tmp = TempDir::new().unwrap();
        let engine = open_fresh(tmp.path(), &memtable_only_config());

        engine.put(b"p/a", b"1", false).unwrap();
        engine.put(b"p/b", b"2", false).unwrap();
        engine.put(b"q/c", b"3", false).unwrap();
        engine.put(b"p/d", b"4", false).unwrap();
        engine.delete(b"p/b", false).unwrap();

        let hits = engine.get_prefix(b"p/").unwrap();
        assert_eq!(
            hits,
            vec![
                (b"p/a".to_vec(), b"1".to_vec()),
                (b"p/d".to_vec(), b"4".to_vec()),
            ]
        );

        engine.close().unwrap();
    }

    #[test]
    fn test_prefix_results_sorted_ascending() {
        let tmp = TempDir::new().unwrap();
        let engine = open_fresh(tmp.path(), &memtable_only_config());

        engine.put(b"p/z", b"26", false).unwrap();
        engine.put(b"p/a", b"1", false).unwrap();
        engine.put(b"p/m", b"13", false).unwrap();

        let hits = engine.get_prefix(b"p/").unwrap();
        let keys: Vec<_> = hits.iter().map(|(k, _)| k.clone()).collect();
        assert_eq!(keys, vec![b"p/a".to_vec(), b"p/m".to_vec(), b"p/z".to_vec()]);

        engine.close().unwrap();
    }

    #[test]
    fn test_prefix_union_across_layers() {
        let tmp = TempDir::new().unwrap();
        let engine = open_fresh(tmp.path(), &small_buffer_config());

        // Layer 1: flushed to disk.
        engine.put(b"p/disk", b"disk-value", false).unwrap();
        engine.put(b"p/stale", b"old", false).unwrap();
        engine.write_barrier().unwrap();

        // Layer 2: still in memory, overriding one disk key.
        engine.put(b"p/mem", b"mem-value", false).unwrap();
        engine.put(b"p/stale", b"new", false).unwrap();

        let hits = engine.get_prefix(b"p/").unwrap();
        assert_eq!(
            hits,
            vec![
                (b"p/disk".to_vec(), b"disk-value".to_vec()),
                (b"p/mem".to_vec(), b"mem-value".to_vec()),
                (b"p/stale".to_vec(), b"new".to_vec()),
            ]
        );

        engine.close().unwrap();
    }

    #[test]
    fn test_prefix_tombstone_on_disk_suppresses_older_disk_value() {
        let tmp = TempDir::new().unwrap();
        let engine = open_fresh(tmp.path(), &small_buffer_config());

        engine.put(b"p/k", b"live", false).unwrap();
        engine.write_barrier().unwrap();
        engine.delete(b"p/k", false).unwrap();
        engine.write_barrier().unwrap();

        assert!(engine.get_prefix(b"p/").unwrap().is_empty());

        engine.close().unwrap();
    }

    #[test]
    fn test_prefix_no_matches() {
        let tmp = TempDir::new().unwrap();
        let engine = open_fresh(tmp.path(), &memtable_only_config());

        engine.put(b"a", b"1", false).unwrap();
        assert!(engine.get_prefix(b"zz").unwrap().is_empty());

        engine.close().unwrap();
    }
}
