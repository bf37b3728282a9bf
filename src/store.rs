//! The persistent address book: normalized address → best-known name.
//!
//! On disk the store is a TSV file with one `address` or `address\tname`
//! record per line, sorted by address.

use std::collections::{BTreeMap, HashSet};
use std::io::{BufWriter, Write};
use std::path::Path;

use tracing::{debug, info};

use crate::error::{AddrError, Result};
use crate::exclude::ExclusionFilter;
use crate::model::address::normalize;

/// An address removed by [`AddressStore::purge_excluded`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Excluded {
    pub address: String,
    pub pattern: String,
    /// The address was first inserted during this session.
    pub was_new: bool,
}

/// In-memory address book.
///
/// Addresses inserted through [`AddressStore::merge_one`] are remembered
/// as session insertions, so a later purge can tell new addresses from
/// ones that were loaded from disk.
#[derive(Debug, Default)]
pub struct AddressStore {
    entries: BTreeMap<String, String>,
    inserted: HashSet<String>,
}

impl AddressStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge TSV records into the store. Records are split on the first
    /// tab; lines with no address are skipped.
    pub fn load(&mut self, text: &str) {
        for line in text.lines() {
            let (address, name) = line.split_once('\t').unwrap_or((line, ""));
            self.merge(address, name);
        }
    }

    /// Load a TSV file. A missing file leaves the store unchanged.
    pub fn load_file(&mut self, path: &Path) -> Result<()> {
        let data = match std::fs::read(path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No address store yet");
                return Ok(());
            }
            Err(e) => return Err(AddrError::io(path, e)),
        };
        let before = self.len();
        self.load(&String::from_utf8_lossy(&data));
        info!(
            path = %path.display(),
            loaded = self.len() - before,
            "Loaded addresses"
        );
        Ok(())
    }

    /// Merge one scanned address, returning whether it was already present.
    ///
    /// A stored name is only filled in when it is empty; the first
    /// non-empty name wins.
    pub fn merge_one(&mut self, address: &str, name: &str) -> bool {
        let (address, present) = match self.merge(address, name) {
            Some(merged) => merged,
            None => return true,
        };
        if !present {
            self.inserted.insert(address);
        }
        present
    }

    /// Returns the normalized key and whether it existed, or `None` for an
    /// empty address.
    fn merge(&mut self, address: &str, name: &str) -> Option<(String, bool)> {
        let (address, name) = normalize(address, name);
        if address.is_empty() {
            return None;
        }
        match self.entries.get_mut(&address) {
            Some(stored) => {
                if stored.is_empty() && !name.is_empty() {
                    *stored = name;
                }
                Some((address, true))
            }
            None => {
                self.entries.insert(address.clone(), name);
                Some((address, false))
            }
        }
    }

    /// Remove every address matched by `filter`.
    pub fn purge_excluded(&mut self, filter: &ExclusionFilter) -> Vec<Excluded> {
        if filter.is_empty() {
            return Vec::new();
        }
        let mut removed = Vec::new();
        self.entries.retain(|address, _| match filter.is_excluded(address) {
            Some(pattern) => {
                info!(pattern = %format!("/{pattern}/"), address = %address, "Excluded");
                removed.push(Excluded {
                    address: address.clone(),
                    pattern: pattern.to_string(),
                    was_new: self.inserted.contains(address),
                });
                false
            }
            None => true,
        });
        for excluded in &removed {
            self.inserted.remove(&excluded.address);
        }
        removed
    }

    /// The stored name for a normalized address.
    pub fn get(&self, address: &str) -> Option<&str> {
        self.entries.get(address).map(String::as_str)
    }

    pub fn contains(&self, address: &str) -> bool {
        self.entries.contains_key(address)
    }

    /// Entries in address order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(a, n)| (a.as_str(), n.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write the TSV form to `writer`.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        for (address, name) in self.iter() {
            if name.is_empty() {
                writeln!(writer, "{address}")?;
            } else {
                writeln!(writer, "{address}\t{name}")?;
            }
        }
        Ok(())
    }

    /// The TSV form as a string.
    pub fn serialize(&self) -> String {
        let mut buf = Vec::new();
        // Writing to a Vec cannot fail.
        let _ = self.write_to(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    }

    /// Replace the contents of `path` with this store, creating parent
    /// directories as needed. An empty store truncates the file.
    pub fn save_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| AddrError::io(parent, e))?;
        }
        let file = std::fs::File::create(path).map_err(|e| AddrError::io(path, e))?;
        let mut writer = BufWriter::with_capacity(64 * 1024, file);
        self.write_to(&mut writer)
            .and_then(|()| writer.flush())
            .map_err(|e| AddrError::io(path, e))?;
        info!(path = %path.display(), count = self.len(), "Saved addresses");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_new_and_existing() {
        let mut store = AddressStore::new();
        assert!(!store.merge_one(" Bob@Example.com ", "Bob"));
        assert!(store.merge_one("bob@example.com", "Robert"));
        assert_eq!(store.get("bob@example.com"), Some("Bob"));
    }

    #[test]
    fn test_empty_name_is_filled_later() {
        let mut store = AddressStore::new();
        store.merge_one("a@x.com", "");
        store.merge_one("a@x.com", "Bob");
        assert_eq!(store.get("a@x.com"), Some("Bob"));

        let mut reversed = AddressStore::new();
        reversed.merge_one("a@x.com", "Bob");
        reversed.merge_one("a@x.com", "");
        assert_eq!(reversed.get("a@x.com"), Some("Bob"));
    }

    #[test]
    fn test_merge_strips_single_quotes() {
        let mut store = AddressStore::new();
        store.merge_one("a@x.com", "'Bob'");
        store.merge_one("b@x.com", "''Bob''");
        assert_eq!(store.get("a@x.com"), Some("Bob"));
        assert_eq!(store.get("b@x.com"), Some("'Bob'"));
    }

    #[test]
    fn test_load_records() {
        let mut store = AddressStore::new();
        store.load("Alice@Example.com\tAlice\n\n   \nbob@x.org\ncarol@y.org\tCarol\tExtra");
        assert_eq!(store.len(), 3);
        assert_eq!(store.get("alice@example.com"), Some("Alice"));
        assert_eq!(store.get("bob@x.org"), Some(""));
        assert_eq!(store.get("carol@y.org"), Some("Carol\tExtra"));
    }

    #[test]
    fn test_loaded_entries_are_not_new() {
        let mut store = AddressStore::new();
        store.load("bob@x.org\n");
        assert!(store.merge_one("bob@x.org", "Bob"));
        let filter = ExclusionFilter::load("^bob").unwrap();
        let removed = store.purge_excluded(&filter);
        assert_eq!(removed.len(), 1);
        assert!(!removed[0].was_new);
    }

    #[test]
    fn test_serialize_sorted_and_omits_empty_names() {
        let mut store = AddressStore::new();
        store.merge_one("zed@x.org", "Zed");
        store.merge_one("amy@x.org", "");
        assert_eq!(store.serialize(), "amy@x.org\nzed@x.org\tZed\n");
    }

    #[test]
    fn test_round_trip() {
        let mut store = AddressStore::new();
        store.merge_one("a@x.org", "Ann");
        store.merge_one("b@x.org", "");
        store.merge_one("c@x.org", "Cé Ç");

        let mut reloaded = AddressStore::new();
        reloaded.load(&store.serialize());
        let original: Vec<_> = store.iter().collect();
        let copy: Vec<_> = reloaded.iter().collect();
        assert_eq!(original, copy);
    }

    #[test]
    fn test_reload_strips_remaining_quote_layer() {
        let mut store = AddressStore::new();
        store.merge_one("b@x.com", "''Bob''");
        assert_eq!(store.get("b@x.com"), Some("'Bob'"));
        assert_eq!(store.serialize(), "b@x.com\t'Bob'\n");

        // Loading normalizes names again, so one more quote layer goes.
        let mut reloaded = AddressStore::new();
        reloaded.load(&store.serialize());
        assert_eq!(reloaded.get("b@x.com"), Some("Bob"));

        let mut again = AddressStore::new();
        again.load(&reloaded.serialize());
        assert_eq!(again.get("b@x.com"), Some("Bob"));
    }

    #[test]
    fn test_purge_is_idempotent() {
        let mut store = AddressStore::new();
        store.merge_one("noreply@x.org", "");
        store.merge_one("ann@x.org", "Ann");
        let filter = ExclusionFilter::load("reply").unwrap();

        let first = store.purge_excluded(&filter);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].pattern, "reply");
        assert!(first[0].was_new);
        let snapshot = store.serialize();

        assert!(store.purge_excluded(&filter).is_empty());
        assert_eq!(store.serialize(), snapshot);
    }

    #[test]
    fn test_save_empty_store_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("addrs.tsv");
        std::fs::write(&path, "old@x.org\n").unwrap();

        AddressStore::new().save_file(&path).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = AddressStore::new();
        store.load_file(&dir.path().join("absent.tsv")).unwrap();
        assert!(store.is_empty());
    }
}
