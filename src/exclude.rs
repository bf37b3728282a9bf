//! Regex exclusion rules applied to normalized addresses.
//!
//! Rule files hold one pattern per line. Blank lines are ignored and every
//! pattern is lowercased before compilation, so rules match the lowercased
//! store keys regardless of how they were written.

use std::path::Path;

use regex::Regex;
use tracing::{debug, info};

use crate::error::{AddrError, Result};

/// Rules written to a fresh rule file: bulk/transactional senders, hex-id
/// local parts, no-reply variants, and overlong addresses.
pub const DEFAULT_RULES: [&str; 6] = [
    r"^(customer|message|orders|webdesign|receipts|sales|service|support|submissions)",
    r"subscribe",
    r"daemon",
    r"[[:xdigit:]]{7,}",
    r"not?[-_.]?reply",
    r".{50,}",
];

/// An ordered set of compiled exclusion rules.
#[derive(Debug, Default)]
pub struct ExclusionFilter {
    rules: Vec<Regex>,
}

impl ExclusionFilter {
    /// A filter with no rules; it never excludes anything.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Compile rules from the text of a rule file.
    ///
    /// Fails on the first pattern that does not compile; no partial rule
    /// set is ever returned.
    pub fn load(text: &str) -> Result<Self> {
        let mut rules = Vec::new();
        for line in text.lines() {
            let pattern = line.trim();
            if pattern.is_empty() {
                continue;
            }
            let regex = Regex::new(&pattern.to_lowercase()).map_err(|source| {
                AddrError::Pattern {
                    pattern: pattern.to_string(),
                    source,
                }
            })?;
            rules.push(regex);
        }
        Ok(Self { rules })
    }

    /// The built-in rule set.
    pub fn defaults() -> Self {
        Self::load(&default_rules_text()).unwrap_or_default()
    }

    /// Load a rule file. A missing file yields an empty filter.
    pub fn load_file(path: &Path) -> Result<Self> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No exclusion rule file");
                return Ok(Self::empty());
            }
            Err(e) => return Err(AddrError::io(path, e)),
        };
        let filter = Self::load(&text)?;
        info!(path = %path.display(), rules = filter.len(), "Loaded exclusion rules");
        Ok(filter)
    }

    /// Write the default rules to `path` unless the file already exists.
    ///
    /// Returns `true` when the file was created.
    pub fn init_file(path: &Path) -> Result<bool> {
        if path.exists() {
            return Ok(false);
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| AddrError::io(parent, e))?;
        }
        std::fs::write(path, default_rules_text()).map_err(|e| AddrError::io(path, e))?;
        info!(path = %path.display(), "Initialized exclusion rules");
        Ok(true)
    }

    /// The pattern text of the first rule matching `address`, if any.
    pub fn is_excluded(&self, address: &str) -> Option<&str> {
        self.rules
            .iter()
            .find(|rule| rule.is_match(address))
            .map(Regex::as_str)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

fn default_rules_text() -> String {
    let mut text = DEFAULT_RULES.join("\n");
    text.push('\n');
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_skips_blank_lines() {
        let filter = ExclusionFilter::load("^bob\n\n   \n\tdaemon \n").unwrap();
        assert_eq!(filter.len(), 2);
        assert_eq!(filter.is_excluded("mailer-daemon@x.org"), Some("daemon"));
    }

    #[test]
    fn test_patterns_are_lowercased() {
        let filter = ExclusionFilter::load("^NEWS").unwrap();
        assert_eq!(filter.is_excluded("newsletter@x.org"), Some("^news"));
    }

    #[test]
    fn test_first_matching_rule_is_reported() {
        let filter = ExclusionFilter::load("reply\nno").unwrap();
        assert_eq!(filter.is_excluded("noreply@x.org"), Some("reply"));
        assert_eq!(filter.is_excluded("nora@x.org"), Some("no"));
        assert_eq!(filter.is_excluded("alice@x.org"), None);
    }

    #[test]
    fn test_bad_pattern_fails_whole_load() {
        let err = ExclusionFilter::load("^ok\n(unclosed\nfine").unwrap_err();
        match err {
            AddrError::Pattern { pattern, .. } => assert_eq!(pattern, "(unclosed"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_default_rules() {
        let filter = ExclusionFilter::defaults();
        assert_eq!(filter.len(), DEFAULT_RULES.len());
        for excluded in [
            "support@shop.example",
            "unsubscribe-123@lists.example",
            "mailer-daemon@mx.example",
            "bounce-a1b2c3d4e5@mail.example",
            "no-reply@service.example",
            "noreply@x.example",
            "do_not.reply@x.example",
        ] {
            assert!(filter.is_excluded(excluded).is_some(), "{excluded}");
        }
        let long = format!("{}@example.com", "a".repeat(40));
        assert!(filter.is_excluded(&long).is_some());
        assert_eq!(filter.is_excluded("alice@example.com"), None);
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let filter = ExclusionFilter::load_file(&dir.path().join("nope.regexp")).unwrap();
        assert!(filter.is_empty());
    }

    #[test]
    fn test_init_file_writes_defaults_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub").join("excludes.regexp");
        assert!(ExclusionFilter::init_file(&path).unwrap());
        assert!(!ExclusionFilter::init_file(&path).unwrap());
        let filter = ExclusionFilter::load_file(&path).unwrap();
        assert_eq!(filter.len(), DEFAULT_RULES.len());
    }
}
