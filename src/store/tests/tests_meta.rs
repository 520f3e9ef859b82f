#[cfg(test)]
mod tests {
    use crate::config::StoreConfig;
    use crate::store::{META_PREFIX, open};
    use tempfile::TempDir;

    #[test]
    fn test_meta_put_get_round_trip() {
        let tmp = TempDir::new().unwrap();
        let store = open(tmp.path().join("db"), true, StoreConfig::default()).unwrap();

        store.meta_put(b"schema", b"v2", false).unwrap();

        assert_eq!(store.meta_get(b"schema").unwrap(), Some(b"v2".to_vec()));
        // A plain get under the user namespace must not see it.
        assert_eq!(store.get(b"schema").unwrap(), None);

        store.close().unwrap();
    }

    #[test]
    fn test_meta_keys_carry_reserved_prefix() {
        let tmp = TempDir::new().unwrap();
        let store = open(tmp.path().join("db"), true, StoreConfig::default()).unwrap();

        store.meta_put(b"owner", b"rank-0", false).unwrap();

        let mut expected_key = META_PREFIX.to_vec();
        expected_key.extend_from_slice(b"owner");
        assert_eq!(
            store.get(&expected_key).unwrap(),
            Some(b"rank-0".to_vec())
        );

        store.close().unwrap();
    }

    #[test]
    fn test_meta_get_all_filters_by_infix() {
        let tmp = TempDir::new().unwrap();
        let store = open(tmp.path().join("db"), true, StoreConfig::default()).unwrap();

        store.meta_put(b"var/alpha", b"1", false).unwrap();
        store.meta_put(b"var/beta", b"2", false).unwrap();
        store.meta_put(b"dim/x", b"3", false).unwrap();

        let all = store.meta_get_all(b"").unwrap();
        assert_eq!(all.len(), 3);

        let vars = store.meta_get_all(b"var/").unwrap();
        assert_eq!(vars.len(), 2);
        assert!(vars.iter().all(|(k, _)| k.starts_with(META_PREFIX)));

        store.close().unwrap();
    }

    #[test]
    fn test_user_and_meta_namespaces_coexist() {
        let tmp = TempDir::new().unwrap();
        let store = open(tmp.path().join("db"), true, StoreConfig::default()).unwrap();

        store.put(b"temperature", b"300K", false).unwrap();
        store.meta_put(b"temperature", b"kelvin", false).unwrap();

        assert_eq!(store.get(b"temperature").unwrap(), Some(b"300K".to_vec()));
        assert_eq!(
            store.meta_get(b"temperature").unwrap(),
            Some(b"kelvin".to_vec())
        );

        store.close().unwrap();
    }
}
