use std::collections::HashMap;
use std::sync::Arc;
use std::sync::PoisonError;
use std::sync::RwLock;

/// Live key/value data fed by the MQTT task and read by the scheduler and
/// by gauge sprites.
///
/// Values are plain strings at this boundary; whoever reads a key decides
/// how to parse it. Consistency is per key only — the scheduler re-reads
/// every interval and tolerates stale values in between.
#[derive(Debug, Clone, Default)]
pub struct DataStore {
    inner: Arc<RwLock<HashMap<String, String>>>,
}

impl DataStore {
    /// A store pre-populated with the keys the scheduler polls, so the
    /// first command-absorption pass sees no spurious changes.
    pub fn seeded(default_mode: &str, brightness: u8, randomize: bool) -> Self {
        let store = Self::default();
        store.set("power", "1");
        store.set("mode", default_mode);
        store.set("brightness", brightness.to_string());
        store.set("image_path", "");
        store.set("random", if randomize { "1" } else { "0" });
        store
    }

    /// Value for `key`, or an empty string if it was never written.
    pub fn get(&self, key: &str) -> String {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), value.into());
    }

    /// Numeric reading of `key`. Missing or unparsable values are `None`;
    /// gauge sprites render those as "N/A".
    pub fn number(&self, key: &str) -> Option<f64> {
        let raw = self.get(key);
        raw.trim().parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_key_reads_empty() {
        let store = DataStore::default();
        assert_eq!(store.get("nope"), "");
        assert_eq!(store.number("nope"), None);
    }

    #[test]
    fn test_seeded_defaults() {
        let store = DataStore::seeded("all", 100, false);
        assert_eq!(store.get("power"), "1");
        assert_eq!(store.get("mode"), "all");
        assert_eq!(store.get("brightness"), "100");
        assert_eq!(store.get("random"), "0");
        assert_eq!(store.get("image_path"), "");
    }

    #[test]
    fn test_number_parses_ints_and_floats() {
        let store = DataStore::default();
        store.set("travel_time", "23");
        assert_eq!(store.number("travel_time"), Some(23.0));
        store.set("travel_time", " 23.5 ");
        assert_eq!(store.number("travel_time"), Some(23.5));
        store.set("travel_time", "unknown");
        assert_eq!(store.number("travel_time"), None);
    }

    #[test]
    fn test_clones_share_state() {
        let store = DataStore::default();
        let other = store.clone();
        other.set("mode", "night");
        assert_eq!(store.get("mode"), "night");
    }
}
