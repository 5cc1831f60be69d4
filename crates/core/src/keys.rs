use std::{
    collections::HashSet,
    sync::atomic::{AtomicUsize, Ordering},
};

use tracing::{info, warn};

use crate::{
    config::GlobalConfig,
    error::{Result, SlidecastError},
};

pub const MAX_API_KEYS: usize = 10;
pub const API_KEY_ENV: &str = "GOOGLE_API_KEY";

/// Trim, drop blanks and drop repeats, keeping first occurrences in order.
pub fn normalize_keys<S: AsRef<str>>(keys: &[S]) -> Vec<String> {
    let mut seen = HashSet::new();
    keys.iter()
        .map(|k| k.as_ref().trim())
        .filter(|k| !k.is_empty() && seen.insert(k.to_string()))
        .map(str::to_string)
        .collect()
}

/// Round-robin pool of API keys for the remote backend.
///
/// The cursor advances on every attempt, successful or not. It is an atomic
/// increment-and-wrap so one pool can be shared between concurrent tracks.
#[derive(Debug)]
pub struct KeyPool {
    keys: Vec<String>,
    cursor: AtomicUsize,
}

impl KeyPool {
    pub fn new<S: AsRef<str>>(keys: &[S]) -> Result<Self> {
        let mut keys = normalize_keys(keys);
        if keys.is_empty() {
            return Err(SlidecastError::NoApiKeys);
        }
        if keys.len() > MAX_API_KEYS {
            warn!(
                count = keys.len(),
                max = MAX_API_KEYS,
                "Too many API keys, extra keys are ignored"
            );
            keys.truncate(MAX_API_KEYS);
        }

        Ok(Self {
            keys,
            cursor: AtomicUsize::new(0),
        })
    }

    /// Load keys from the process environment, falling back to the config file.
    pub fn from_env(config: &GlobalConfig) -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok(), config)
    }

    /// `GOOGLE_API_KEY_1..=10` first, then `GOOGLE_API_KEY`, then the
    /// keys saved in the config file.
    pub fn from_lookup<F>(lookup: F, config: &GlobalConfig) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut keys: Vec<String> = (1..=MAX_API_KEYS)
            .filter_map(|i| lookup(&format!("{API_KEY_ENV}_{i}")))
            .collect();

        if normalize_keys(&keys).is_empty() {
            keys = lookup(API_KEY_ENV).into_iter().collect();
        }
        if normalize_keys(&keys).is_empty() {
            keys = config.google_api_keys.clone();
        }

        let pool = Self::new(&keys)?;
        info!("Loaded {} API key(s) for rotation", pool.len());
        Ok(pool)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Index of the key the next attempt will use.
    pub fn cursor(&self) -> usize {
        self.cursor.load(Ordering::Relaxed)
    }

    /// Take the key under the cursor and advance it.
    pub fn next_key(&self) -> (usize, &str) {
        let len = self.keys.len();
        let index = self
            .cursor
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |i| Some((i + 1) % len))
            .unwrap_or_else(|i| i);
        (index, &self.keys[index])
    }

    /// Key at `index`, wrapping around the pool.
    pub fn key(&self, index: usize) -> &str {
        &self.keys[index % self.keys.len()]
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn normalizes_keys_preserving_order() {
        let keys = normalize_keys(&[" b ", "a", "", "b", "  ", "c", "a"]);
        assert_eq!(keys, vec!["b", "a", "c"]);
    }

    #[test]
    fn empty_pool_is_rejected() {
        assert!(matches!(
            KeyPool::new(&["", "  "]),
            Err(SlidecastError::NoApiKeys)
        ));
    }

    #[test]
    fn pool_is_capped() {
        let keys: Vec<String> = (0..15).map(|i| format!("k{i}")).collect();
        let pool = KeyPool::new(&keys).unwrap();
        assert_eq!(pool.len(), MAX_API_KEYS);
    }

    #[test]
    fn rotation_wraps_around() {
        let pool = KeyPool::new(&["a", "b", "c"]).unwrap();
        let used: Vec<&str> = (0..4).map(|_| pool.next_key().1).collect();
        assert_eq!(used, vec!["a", "b", "c", "a"]);
        assert_eq!(pool.cursor(), 1);
    }

    #[test]
    fn key_lookup_wraps() {
        let pool = KeyPool::new(&["a", "b", "c"]).unwrap();
        assert_eq!(pool.key(1), "b");
        assert_eq!(pool.key(4), "b");
        assert_eq!(pool.cursor(), 0);
    }

    #[test]
    fn numbered_env_keys_win() {
        let vars = lookup(&[
            ("GOOGLE_API_KEY_1", "one"),
            ("GOOGLE_API_KEY_3", "three"),
            ("GOOGLE_API_KEY", "single"),
        ]);
        let config = GlobalConfig {
            google_api_keys: vec!["saved".to_string()],
            ..Default::default()
        };
        let pool = KeyPool::from_lookup(vars, &config).unwrap();
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.next_key().1, "one");
        assert_eq!(pool.next_key().1, "three");
    }

    #[test]
    fn single_env_key_is_a_fallback() {
        let pool = KeyPool::from_lookup(
            lookup(&[("GOOGLE_API_KEY", "single")]),
            &GlobalConfig::default(),
        )
        .unwrap();
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.next_key(), (0, "single"));
    }

    #[test]
    fn config_keys_used_when_env_is_empty() {
        let config = GlobalConfig {
            google_api_keys: vec!["x".to_string(), "y".to_string()],
            ..Default::default()
        };
        let pool = KeyPool::from_lookup(lookup(&[("GOOGLE_API_KEY_1", "  ")]), &config).unwrap();
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn no_source_means_no_keys() {
        let err = KeyPool::from_lookup(lookup(&[]), &GlobalConfig::default()).unwrap_err();
        assert!(matches!(err, SlidecastError::NoApiKeys));
    }
}
