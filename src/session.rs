//! One harvesting run: walk maildir trees, purge excluded addresses, save.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::error::{AddrError, Result};
use crate::exclude::ExclusionFilter;
use crate::scanner::{MessageScanner, ScanOutcome};
use crate::store::{AddressStore, Excluded};

/// Counters accumulated over a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanStats {
    /// Messages whose address fields were all harvested.
    pub scanned_msgs: u64,
    /// Messages skipped as spam.
    pub skipped_msgs: u64,
    /// Messages abandoned because of an error.
    pub failed_msgs: u64,
    /// Every address occurrence seen, duplicates included.
    pub scanned_addrs: u64,
    /// Addresses that were not in the store before this run and survived
    /// exclusion.
    pub new_addrs: u64,
}

/// Owns the store, rules, and counters for a single run.
pub struct ScanSession {
    store: AddressStore,
    filter: ExclusionFilter,
    scanner: MessageScanner,
    stats: ScanStats,
}

impl ScanSession {
    pub fn new(store: AddressStore, filter: ExclusionFilter, scanner: MessageScanner) -> Self {
        Self {
            store,
            filter,
            scanner,
            stats: ScanStats::default(),
        }
    }

    /// Scan one message file and record its outcome.
    pub fn scan_file(&mut self, path: &Path) -> Result<ScanOutcome> {
        let result = self
            .scanner
            .scan_file(path, &mut self.store, &mut self.stats);
        match result {
            Ok(ScanOutcome::Scanned) => self.stats.scanned_msgs += 1,
            Ok(ScanOutcome::Skipped) => self.stats.skipped_msgs += 1,
            Err(_) => self.stats.failed_msgs += 1,
        }
        result
    }

    /// Scan every regular, non-dot file below each root.
    ///
    /// Per-message failures are logged and skipped. A root that cannot be
    /// read at all aborts the run.
    pub fn scan_roots(
        &mut self,
        roots: &[PathBuf],
        progress: Option<&dyn Fn(&Path)>,
    ) -> Result<()> {
        for root in roots {
            self.scan_root(root, progress)?;
        }
        info!(
            skipped_msgs = self.stats.skipped_msgs,
            failed_msgs = self.stats.failed_msgs,
            "scanned {} addrs in {} msgs; {} new addrs found",
            self.stats.scanned_addrs,
            self.stats.scanned_msgs,
            self.stats.new_addrs
        );
        Ok(())
    }

    fn scan_root(&mut self, root: &Path, progress: Option<&dyn Fn(&Path)>) -> Result<()> {
        info!(root = %root.display(), "Scanning maildir");
        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(source) if source.depth() == 0 => {
                    return Err(AddrError::Walk {
                        path: root.to_path_buf(),
                        source,
                    });
                }
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable entry");
                    continue;
                }
            };

            // Maildir++ folders (.Sent, .Drafts) are walked; dot files are not messages
            if entry.file_type().is_dir() || entry.file_name().to_string_lossy().starts_with('.')
            {
                continue;
            }

            let path = std::path::absolute(entry.path())
                .unwrap_or_else(|_| entry.path().to_path_buf());
            if let Some(progress) = progress {
                progress(&path);
            }
            match self.scan_file(&path) {
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to scan message"),
                Ok(_) => {}
            }
        }
        Ok(())
    }

    /// Drop every stored address matched by the exclusion rules.
    ///
    /// Removed addresses that were first seen in this run no longer count
    /// as new.
    pub fn purge_excluded(&mut self) -> Vec<Excluded> {
        let removed = self.store.purge_excluded(&self.filter);
        let removed_new = removed.iter().filter(|e| e.was_new).count() as u64;
        self.stats.new_addrs = self.stats.new_addrs.saturating_sub(removed_new);
        removed
    }

    /// Persist the store to `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        self.store.save_file(path)
    }

    pub fn stats(&self) -> ScanStats {
        self.stats
    }

    pub fn store(&self) -> &AddressStore {
        &self.store
    }
}
