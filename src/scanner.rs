//! Per-message address harvesting.
//!
//! A message ends up in one of three states: skipped (flagged as spam),
//! scanned, or failed (returned as an error). Only the header block is
//! read; the body is never touched.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use regex::Regex;
use tracing::debug;

use crate::config::ScanConfig;
use crate::error::{AddrError, Result};
use crate::model::address::EmailAddress;
use crate::parser::header::{self, HeaderBlock};
use crate::session::ScanStats;
use crate::store::AddressStore;

/// Header fields harvested for addresses, in processing order.
pub const ADDRESS_FIELDS: [&str; 5] = ["To", "From", "Cc", "Bcc", "Reply-To"];

/// Header set by spam filters such as SpamAssassin.
pub const SPAM_FLAG_FIELD: &str = "X-Spam-Flag";

/// Unanchored, so annotated values like `Yes, hits=7.1` still match.
const SPAM_FLAG_VALUE: &str = "(?i)y(?:es)?";

/// How a message left the scanner without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    /// Flagged as spam and ignored.
    Skipped,
    /// Every address field was harvested.
    Scanned,
}

/// Extracts addresses from message headers into an [`AddressStore`].
#[derive(Debug, Clone)]
pub struct MessageScanner {
    include_spam: bool,
    spam_flag: Regex,
    read_buffer_size: usize,
    max_header_size: usize,
}

impl Default for MessageScanner {
    fn default() -> Self {
        Self::new(&ScanConfig::default())
    }
}

impl MessageScanner {
    pub fn new(config: &ScanConfig) -> Self {
        Self {
            include_spam: config.include_spam,
            spam_flag: Regex::new(SPAM_FLAG_VALUE).expect("valid spam flag pattern"),
            read_buffer_size: config.read_buffer_size.max(1),
            max_header_size: config.max_header_size,
        }
    }

    /// Scan the message stored at `path`.
    pub fn scan_file(
        &self,
        path: &Path,
        store: &mut AddressStore,
        stats: &mut ScanStats,
    ) -> Result<ScanOutcome> {
        debug!(path = %path.display(), "Scanning message");

        let file = File::open(path).map_err(|source| AddrError::MessageRead {
            path: path.to_path_buf(),
            source,
        })?;
        let mut reader = BufReader::with_capacity(self.read_buffer_size, file);
        let raw = header::read_header_block(&mut reader, path, self.max_header_size)?;
        let headers = HeaderBlock::parse(&raw)?;

        self.scan_headers(&headers, store, stats)
    }

    /// Harvest addresses from an already parsed header block.
    ///
    /// The first undecodable or unparseable field value aborts the
    /// message. Addresses merged from earlier fields stay merged.
    pub fn scan_headers(
        &self,
        headers: &HeaderBlock,
        store: &mut AddressStore,
        stats: &mut ScanStats,
    ) -> Result<ScanOutcome> {
        if !self.include_spam && self.is_flagged_spam(headers) {
            debug!(reason = "X-Spam-Flag=YES", "Skipping message");
            return Ok(ScanOutcome::Skipped);
        }

        for field in ADDRESS_FIELDS {
            for value in headers.get_all(field) {
                let value = value.trim();
                if value.is_empty() {
                    continue;
                }

                let decoded = header::decode_encoded_words(value).map_err(|e| {
                    AddrError::EncodedWord {
                        field: field.to_string(),
                        value: value.to_string(),
                        reason: e.to_string(),
                    }
                })?;

                let addresses = EmailAddress::parse_list(&decoded).map_err(|source| {
                    AddrError::AddressList {
                        field: field.to_string(),
                        value: decoded.clone(),
                        source,
                    }
                })?;

                for address in addresses {
                    stats.scanned_addrs += 1;
                    let address = address.normalized();
                    debug!(field, address = %address, "Found address");
                    if !store.merge_one(&address.address, &address.display_name) {
                        stats.new_addrs += 1;
                    }
                }
            }
        }

        Ok(ScanOutcome::Scanned)
    }

    /// Whether any `X-Spam-Flag` value contains `y` or `yes`.
    fn is_flagged_spam(&self, headers: &HeaderBlock) -> bool {
        headers
            .get_all(SPAM_FLAG_FIELD)
            .any(|value| self.spam_flag.is_match(value))
    }
}
