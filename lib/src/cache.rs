//! Process-wide cache of loaded play logs.
//!
//! Entries are keyed by a SHA-256 fingerprint: the content of a file or upload,
//! or the identity of a URL. The cache holds at most `capacity` logs and evicts
//! the least recently used one. Loading a new upload drops the logs of earlier
//! uploads. Concurrent requests for the same fingerprint load it once.

use crate::{clean::CleaningRules, playlog::PlayLog, source::Source, Result};
use sha2::{Digest, Sha256};
use std::{
    collections::{HashMap, VecDeque},
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

pub const DEFAULT_CAPACITY: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn of_bytes(bytes: &[u8]) -> Self {
        Fingerprint(hex::encode(Sha256::digest(bytes)))
    }

    pub fn of_url(url: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"url:");
        hasher.update(url.as_bytes());
        Fingerprint(hex::encode(hasher.finalize()))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0[..12])
    }
}

type Slot = Arc<Mutex<Option<PlayLog>>>;

struct Entry {
    slot: Slot,
    from_upload: bool,
}

#[derive(Default)]
struct State {
    entries: HashMap<Fingerprint, Entry>,
    // least recently used first
    order: VecDeque<Fingerprint>,
}

impl State {
    fn touch(&mut self, fingerprint: &Fingerprint) {
        self.order.retain(|f| f != fingerprint);
        self.order.push_back(fingerprint.clone());
    }

    fn remove(&mut self, fingerprint: &Fingerprint) -> bool {
        self.order.retain(|f| f != fingerprint);
        self.entries.remove(fingerprint).is_some()
    }
}

pub struct LogCache {
    capacity: usize,
    rules: CleaningRules,
    state: Mutex<State>,
}

impl LogCache {
    pub fn new(capacity: usize, rules: CleaningRules) -> Self {
        Self {
            capacity: capacity.max(1),
            rules,
            state: Mutex::new(State::default()),
        }
    }

    /// Returns the cached log for `source`, loading it on a miss.
    ///
    /// Paths and uploads are read to compute their fingerprint, so an edited
    /// file is a new entry. URLs are fingerprinted by address and fetched only
    /// on a miss.
    pub fn get_or_load(&self, source: &Source) -> Result<PlayLog> {
        let (fingerprint, bytes) = match source {
            Source::Url(url) => (Fingerprint::of_url(url), None),
            other => {
                let bytes = other.read()?;
                (Fingerprint::of_bytes(&bytes), Some(bytes))
            }
        };
        let from_upload = matches!(source, Source::Bytes(_));
        let slot = self.slot_for(&fingerprint, from_upload);

        let mut cached = lock(&*slot);
        if let Some(log) = cached.as_ref() {
            log::info!("cache hit for {}", fingerprint);
            return Ok(log.clone());
        }

        log::info!("cache miss for {}, loading {}", fingerprint, source);
        let loaded = match bytes {
            Some(bytes) => Ok(bytes),
            None => source.read(),
        }
        .and_then(|bytes| PlayLog::from_csv_bytes(bytes, &self.rules));

        match loaded {
            Ok((log, _)) => {
                *cached = Some(log.clone());
                drop(cached);
                self.admit(&fingerprint, from_upload);
                Ok(log)
            }
            Err(e) => {
                drop(cached);
                self.forget(&fingerprint, &slot);
                Err(e)
            }
        }
    }

    /// Drops one entry. Returns whether it was present.
    pub fn invalidate(&self, fingerprint: &Fingerprint) -> bool {
        lock(&self.state).remove(fingerprint)
    }

    pub fn clear(&self) {
        let mut state = lock(&self.state);
        state.entries.clear();
        state.order.clear();
    }

    pub fn len(&self) -> usize {
        lock(&self.state).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        lock(&self.state).entries.contains_key(fingerprint)
    }

    /// The slot for `fingerprint`, creating an empty one on a miss. Nothing is
    /// evicted until the new entry has loaded.
    fn slot_for(&self, fingerprint: &Fingerprint, from_upload: bool) -> Slot {
        let mut state = lock(&self.state);
        if let Some(entry) = state.entries.get(fingerprint) {
            let slot = entry.slot.clone();
            state.touch(fingerprint);
            return slot;
        }

        let slot = Slot::default();
        state.entries.insert(
            fingerprint.clone(),
            Entry {
                slot: slot.clone(),
                from_upload,
            },
        );
        state.touch(fingerprint);
        slot
    }

    /// Makes room for a freshly loaded entry.
    fn admit(&self, fingerprint: &Fingerprint, from_upload: bool) {
        let mut state = lock(&self.state);
        if !state.entries.contains_key(fingerprint) {
            return;
        }

        if from_upload {
            let stale: Vec<Fingerprint> = state
                .entries
                .iter()
                .filter(|(f, e)| e.from_upload && *f != fingerprint)
                .map(|(f, _)| f.clone())
                .collect();
            for f in stale {
                log::info!("new upload replaces {}", f);
                state.remove(&f);
            }
        }

        while state.entries.len() > self.capacity {
            match state.order.front().cloned() {
                Some(oldest) if &oldest != fingerprint => {
                    log::info!("evicting {}", oldest);
                    state.remove(&oldest);
                }
                _ => break,
            }
        }
    }

    /// Drops the entry of a failed load, unless it has been replaced meanwhile.
    fn forget(&self, fingerprint: &Fingerprint, slot: &Slot) {
        let mut state = lock(&self.state);
        let same_slot = state
            .entries
            .get(fingerprint)
            .is_some_and(|entry| Arc::ptr_eq(&entry.slot, slot));
        if same_slot {
            state.remove(fingerprint);
        }
    }
}

impl Default for LogCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, CleaningRules::default())
    }
}

// A panic while loading leaves the slot empty, so a poisoned lock is still usable.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn upload(rows: usize) -> Source {
        let mut csv = String::from("timestamp,artist,song\n");
        for i in 0..rows {
            csv.push_str(&format!("2024-01-01T10:{:02}:00,A,S{}\n", i, i));
        }
        Source::Bytes(csv.into_bytes())
    }

    fn fingerprint(source: &Source) -> Fingerprint {
        Fingerprint::of_bytes(&source.read().unwrap())
    }

    #[test]
    fn same_content_hits() {
        let cache = LogCache::default();
        let a = cache.get_or_load(&upload(2)).unwrap();
        let b = cache.get_or_load(&upload(2)).unwrap();
        assert_eq!(a.len(), 2);
        assert_eq!(b.len(), 2);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn new_upload_invalidates_older_uploads() {
        let cache = LogCache::default();
        cache.get_or_load(&upload(1)).unwrap();
        cache.get_or_load(&upload(2)).unwrap();
        assert_eq!(cache.len(), 1);
        assert!(!cache.contains(&fingerprint(&upload(1))));
        assert!(cache.contains(&fingerprint(&upload(2))));
    }

    #[test]
    fn least_recently_used_is_evicted() {
        let dir = tempfile::tempdir().unwrap();
        let paths: Vec<Source> = (1..=3)
            .map(|n| {
                let path = dir.path().join(format!("{}.csv", n));
                std::fs::write(&path, upload(n).read().unwrap()).unwrap();
                Source::Path(path)
            })
            .collect();

        let cache = LogCache::new(2, CleaningRules::default());
        cache.get_or_load(&paths[0]).unwrap();
        cache.get_or_load(&paths[1]).unwrap();
        cache.get_or_load(&paths[0]).unwrap();
        cache.get_or_load(&paths[2]).unwrap();

        assert_eq!(cache.len(), 2);
        assert!(cache.contains(&fingerprint(&paths[0])));
        assert!(!cache.contains(&fingerprint(&paths[1])));
        assert!(cache.contains(&fingerprint(&paths[2])));
    }

    #[test]
    fn failed_loads_are_not_cached() {
        let cache = LogCache::default();
        let bad = Source::Bytes(b"timestamp,artist\n2024-01-01,A\n".to_vec());
        assert!(cache.get_or_load(&bad).is_err());
        assert!(!cache.contains(&fingerprint(&bad)));
        assert!(cache.is_empty());
        assert!(cache.get_or_load(&bad).is_err());
        assert!(cache.is_empty());
    }

    #[test]
    fn bad_upload_keeps_the_previous_upload() {
        let cache = LogCache::new(1, CleaningRules::default());
        cache.get_or_load(&upload(2)).unwrap();

        let bad = Source::Bytes(b"timestamp,artist\n2024-01-01,A\n".to_vec());
        assert!(cache.get_or_load(&bad).is_err());

        assert_eq!(cache.len(), 1);
        assert!(cache.contains(&fingerprint(&upload(2))));
        assert!(!cache.contains(&fingerprint(&bad)));
    }

    #[test]
    fn concurrent_requests_share_one_entry() {
        let cache = Arc::new(LogCache::default());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || cache.get_or_load(&upload(3)).unwrap().len())
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), 3);
        }
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn url_fingerprints_differ_from_content() {
        let url = Fingerprint::of_url("https://example.com/a.csv");
        assert_eq!(url, Fingerprint::of_url("https://example.com/a.csv"));
        assert_ne!(url, Fingerprint::of_bytes(b"https://example.com/a.csv"));
        assert_eq!(url.to_string().len(), 12);
    }
}
