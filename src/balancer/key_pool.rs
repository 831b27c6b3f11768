use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use rand::Rng;

/// A set of API keys for one provider, handed out round-robin.
///
/// Built from the comma-separated key string users paste into settings.
/// Selection is `call_count % len`, so with `n` keys every key is used
/// once in any `n` consecutive calls.
pub struct KeyPool {
    keys: Vec<String>,
    cursor: AtomicUsize,
}

impl KeyPool {
    /// Splits on commas, trims, and drops empty entries.
    pub fn parse(raw: &str) -> Self {
        let keys = raw
            .split(',')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .collect();
        Self {
            keys,
            cursor: AtomicUsize::new(0),
        }
    }

    /// Like [`KeyPool::parse`] but the first call lands on a random key, so
    /// independently started clients do not all begin on the same one.
    pub fn with_random_start(raw: &str) -> Self {
        let pool = Self::parse(raw);
        if pool.keys.len() > 1 {
            let start = rand::thread_rng().gen_range(0..pool.keys.len());
            pool.cursor.store(start, Ordering::Relaxed);
        }
        pool
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Next key in rotation, or `None` when the pool is empty.
    pub fn next(&self) -> Option<&str> {
        if self.keys.is_empty() {
            return None;
        }
        let n = self.cursor.fetch_add(1, Ordering::Relaxed);
        Some(&self.keys[n % self.keys.len()])
    }
}

impl Clone for KeyPool {
    fn clone(&self) -> Self {
        Self {
            keys: self.keys.clone(),
            cursor: AtomicUsize::new(self.cursor.load(Ordering::Relaxed)),
        }
    }
}

// Keys are secrets.
impl fmt::Debug for KeyPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPool")
            .field("keys", &format_args!("<{} redacted>", self.keys.len()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn parses_comma_separated_keys() {
        let pool = KeyPool::parse(" a, b ,,c,");
        assert_eq!(pool.len(), 3);
        assert_eq!(pool.next(), Some("a"));
        assert_eq!(pool.next(), Some("b"));
        assert_eq!(pool.next(), Some("c"));
        assert_eq!(pool.next(), Some("a"));
    }

    #[test]
    fn single_key_always_returned() {
        let pool = KeyPool::parse("sk-only");
        for _ in 0..5 {
            assert_eq!(pool.next(), Some("sk-only"));
        }
    }

    #[test]
    fn empty_pool_yields_nothing() {
        let pool = KeyPool::parse(" , ,");
        assert!(pool.is_empty());
        assert_eq!(pool.next(), None);
        assert!(KeyPool::parse("").is_empty());
    }

    #[test]
    fn random_start_still_visits_every_key() {
        let pool = KeyPool::with_random_start("k1,k2,k3,k4");
        let seen: HashSet<String> = (0..4).filter_map(|_| pool.next().map(str::to_string)).collect();
        assert_eq!(seen.len(), 4);
    }

    #[test]
    fn debug_output_hides_keys() {
        let rendered = format!("{:?}", KeyPool::parse("sk-secret-1,sk-secret-2"));
        assert!(!rendered.contains("sk-secret"));
        assert!(rendered.contains("2 redacted"));
    }
}
