//! Email address parsing (RFC 5322 §3.4) and normalization.

use thiserror::Error;

/// A parsed email address.
///
/// # Examples
/// - `"Juan García <juan@ejemplo.com>"` → `display_name = "Juan García"`, `address = "juan@ejemplo.com"`
/// - `"user@example.com"` → `display_name = ""`, `address = "user@example.com"`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailAddress {
    /// Human-readable display name (may be empty).
    pub display_name: String,
    /// The bare email address (`user@domain`).
    pub address: String,
}

/// A mailbox list that does not follow the header grammar.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{reason} at offset {offset}")]
pub struct SyntaxError {
    pub reason: &'static str,
    pub offset: usize,
}

impl EmailAddress {
    /// Build an address from its parts without any normalization.
    pub fn new(address: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            address: address.into(),
        }
    }

    /// Parse a comma-separated mailbox list.
    ///
    /// Accepts `Name <addr>`, `"Quoted, Name" <addr>`, bare `addr`,
    /// `addr (Comment Name)`, and named groups (`team: a@b.c, d@e.f;`).
    /// Empty entries between commas are skipped. Any other deviation
    /// fails the whole list.
    pub fn parse_list(raw: &str) -> Result<Vec<Self>, SyntaxError> {
        let mut p = ListParser::new(raw);
        let mut list = Vec::new();
        loop {
            p.skip_cfws()?;
            if p.consume(',') {
                continue;
            }
            list.extend(p.address(true)?);
            p.skip_cfws()?;
            if p.is_empty() {
                break;
            }
            if !p.consume(',') {
                return Err(p.error("expected comma"));
            }
            loop {
                p.skip_cfws()?;
                if !p.consume(',') {
                    break;
                }
            }
            if p.is_empty() {
                break;
            }
        }
        Ok(list)
    }

    /// Return the normalized form of this address (see [`normalize`]).
    pub fn normalized(&self) -> Self {
        let (address, display_name) = normalize(&self.address, &self.display_name);
        Self {
            display_name,
            address,
        }
    }

    /// Format for display: `"Display Name <address>"` or just `"address"`.
    pub fn display(&self) -> String {
        if self.display_name.is_empty() {
            self.address.clone()
        } else {
            format!("{} <{}>", self.display_name, self.address)
        }
    }
}

impl std::fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display())
    }
}

/// Canonicalize an address/name pair into the form used as store keys.
///
/// The address is trimmed and lowercased in full. The name is trimmed and
/// loses one outer pair of single quotes when they span the whole string.
pub fn normalize(address: &str, name: &str) -> (String, String) {
    (normalize_address(address), normalize_name(name))
}

/// Trim and lowercase an address (local part and domain alike).
pub fn normalize_address(address: &str) -> String {
    address.trim().to_lowercase()
}

/// Trim a display name and strip a single enclosing pair of `'`.
pub fn normalize_name(name: &str) -> String {
    let trimmed = name.trim();
    trimmed
        .strip_prefix('\'')
        .and_then(|rest| rest.strip_suffix('\''))
        .unwrap_or(trimmed)
        .to_string()
}

// ── Mailbox-list parser ─────────────────────────────────────────

struct ListParser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> ListParser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn next_char(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn consume(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += c.len_utf8();
            true
        } else {
            false
        }
    }

    fn error(&self, reason: &'static str) -> SyntaxError {
        SyntaxError {
            reason,
            offset: self.pos,
        }
    }

    fn skip_space(&mut self) {
        let rest = self.rest();
        self.pos += rest.len() - rest.trim_start_matches([' ', '\t', '\r', '\n']).len();
    }

    /// Skip folding whitespace and comments.
    fn skip_cfws(&mut self) -> Result<(), SyntaxError> {
        loop {
            self.skip_space();
            if self.peek() != Some('(') {
                return Ok(());
            }
            self.comment()?;
        }
    }

    /// One address, or every member of a group when `allow_group` is set.
    fn address(&mut self, allow_group: bool) -> Result<Vec<EmailAddress>, SyntaxError> {
        self.skip_cfws()?;
        let start = self.pos;

        if let Ok(spec) = self.addr_spec() {
            self.skip_space();
            let display_name = if self.peek() == Some('(') {
                self.comment()?.trim().to_string()
            } else {
                String::new()
            };
            return Ok(vec![EmailAddress::new(spec, display_name)]);
        }
        self.pos = start;

        let display_name = if self.peek() == Some('<') {
            String::new()
        } else {
            self.phrase()?
        };

        self.skip_cfws()?;
        if allow_group && self.consume(':') {
            return self.group();
        }

        if !self.consume('<') {
            return Err(self.error("no angle-addr"));
        }
        let spec = self.addr_spec()?;
        self.skip_cfws()?;
        if !self.consume('>') {
            return Err(self.error("unclosed angle-addr"));
        }
        Ok(vec![EmailAddress::new(spec, display_name)])
    }

    /// Members of a group, after the `:`, through the closing `;`.
    fn group(&mut self) -> Result<Vec<EmailAddress>, SyntaxError> {
        let mut members = Vec::new();
        self.skip_cfws()?;
        if self.consume(';') {
            return Ok(members);
        }
        loop {
            members.extend(self.address(false)?);
            self.skip_cfws()?;
            if self.consume(';') {
                return Ok(members);
            }
            if !self.consume(',') {
                return Err(self.error("expected comma in group"));
            }
        }
    }

    /// `local-part "@" domain`. Restores the position on failure.
    fn addr_spec(&mut self) -> Result<String, SyntaxError> {
        let start = self.pos;
        let result = self.addr_spec_inner();
        if result.is_err() {
            self.pos = start;
        }
        result
    }

    fn addr_spec_inner(&mut self) -> Result<String, SyntaxError> {
        self.skip_space();
        let local = match self.peek() {
            None => return Err(self.error("no addr-spec")),
            Some('"') => {
                let quoted = self.quoted_string()?;
                if quoted.is_empty() {
                    return Err(self.error("empty quoted local part"));
                }
                quoted
            }
            Some(_) => self.atom(true, false)?,
        };
        if !self.consume('@') {
            return Err(self.error("missing @ in addr-spec"));
        }
        self.skip_space();
        let domain = match self.peek() {
            None => return Err(self.error("no domain in addr-spec")),
            Some('[') => self.domain_literal()?,
            Some(_) => self.atom(true, false)?,
        };
        Ok(format!("{local}@{domain}"))
    }

    /// Display-name words joined by single spaces.
    fn phrase(&mut self) -> Result<String, SyntaxError> {
        let mut words = Vec::new();
        loop {
            self.skip_cfws()?;
            match self.peek() {
                Some('"') => words.push(self.quoted_string()?),
                Some(c) if is_atext(c, true) => words.push(self.atom(true, true)?),
                _ => break,
            }
        }
        if words.is_empty() {
            return Err(self.error("missing word in phrase"));
        }
        Ok(words.join(" "))
    }

    /// A run of atext. With `permissive`, dots may lead, trail, or repeat
    /// (obsolete phrase syntax).
    fn atom(&mut self, dot: bool, permissive: bool) -> Result<String, SyntaxError> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if !is_atext(c, dot) {
                break;
            }
            self.pos += c.len_utf8();
        }
        let atom = &self.input[start..self.pos];
        if atom.is_empty() {
            return Err(self.error("invalid string"));
        }
        if dot && !permissive && (atom.starts_with('.') || atom.ends_with('.') || atom.contains(".."))
        {
            return Err(SyntaxError {
                reason: "malformed dot-atom",
                offset: start,
            });
        }
        Ok(atom.to_string())
    }

    fn quoted_string(&mut self) -> Result<String, SyntaxError> {
        self.consume('"');
        let mut text = String::new();
        loop {
            match self.next_char() {
                None => return Err(self.error("unclosed quoted-string")),
                Some('"') => return Ok(text),
                Some('\\') => match self.next_char() {
                    Some(c) => text.push(c),
                    None => return Err(self.error("unclosed quoted-string")),
                },
                Some(c) if c.is_control() && c != '\t' => {
                    return Err(self.error("bad character in quoted-string"))
                }
                Some(c) => text.push(c),
            }
        }
    }

    fn domain_literal(&mut self) -> Result<String, SyntaxError> {
        let start = self.pos;
        self.consume('[');
        loop {
            match self.next_char() {
                None | Some('[') | Some('\\') => {
                    return Err(self.error("malformed domain literal"))
                }
                Some(']') => return Ok(self.input[start..self.pos].to_string()),
                Some(_) => {}
            }
        }
    }

    /// Consume a (possibly nested) comment and return its text.
    fn comment(&mut self) -> Result<String, SyntaxError> {
        self.consume('(');
        let mut depth = 1usize;
        let mut text = String::new();
        loop {
            let c = self
                .next_char()
                .ok_or_else(|| self.error("misformatted parenthetical comment"))?;
            match c {
                '\\' => {
                    let escaped = self
                        .next_char()
                        .ok_or_else(|| self.error("misformatted parenthetical comment"))?;
                    text.push(escaped);
                }
                '(' => {
                    depth += 1;
                    text.push(c);
                }
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(text);
                    }
                    text.push(c);
                }
                _ => text.push(c),
            }
        }
    }
}

/// RFC 5322 atext, extended to any non-ASCII character.
fn is_atext(c: char, dot: bool) -> bool {
    match c {
        '.' => dot,
        'a'..='z' | 'A'..='Z' | '0'..='9' => true,
        '!' | '#' | '$' | '%' | '&' | '\'' | '*' | '+' | '-' | '/' | '=' | '?' | '^' | '_'
        | '`' | '{' | '|' | '}' | '~' => true,
        c => !c.is_ascii(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_one(raw: &str) -> EmailAddress {
        let mut list = EmailAddress::parse_list(raw).unwrap();
        assert_eq!(list.len(), 1, "expected one address in {raw:?}");
        list.remove(0)
    }

    #[test]
    fn test_parse_bare_address() {
        let addr = parse_one("user@example.com");
        assert_eq!(addr.address, "user@example.com");
        assert_eq!(addr.display_name, "");
    }

    #[test]
    fn test_parse_angle_address() {
        let addr = parse_one("<user@example.com>");
        assert_eq!(addr.address, "user@example.com");
        assert_eq!(addr.display_name, "");
    }

    #[test]
    fn test_parse_name_and_address() {
        let addr = parse_one("User One <user1@example.com>");
        assert_eq!(addr.address, "user1@example.com");
        assert_eq!(addr.display_name, "User One");
    }

    #[test]
    fn test_parse_quoted_name() {
        let addr = parse_one("\"Last, First\" <user@example.com>");
        assert_eq!(addr.address, "user@example.com");
        assert_eq!(addr.display_name, "Last, First");
    }

    #[test]
    fn test_parse_quoted_pair_in_name() {
        let addr = parse_one(r#""Bob \"the\" Builder" <bob@example.com>"#);
        assert_eq!(addr.display_name, "Bob \"the\" Builder");
    }

    #[test]
    fn test_parse_comment_as_name() {
        let addr = parse_one("bob@example.com (Bob Smith)");
        assert_eq!(addr.address, "bob@example.com");
        assert_eq!(addr.display_name, "Bob Smith");
    }

    #[test]
    fn test_parse_single_quoted_name_kept_raw() {
        let addr = parse_one("'Bob' <bob@example.com>");
        assert_eq!(addr.display_name, "'Bob'");
    }

    #[test]
    fn test_parse_non_ascii_name() {
        let addr = parse_one("José García <jose@example.com>");
        assert_eq!(addr.display_name, "José García");
    }

    #[test]
    fn test_parse_list() {
        let list =
            EmailAddress::parse_list("User One <a@b.com>, User Two <c@d.com>, plain@addr.com")
                .unwrap();
        assert_eq!(list.len(), 3);
        assert_eq!(list[0].address, "a@b.com");
        assert_eq!(list[1].display_name, "User Two");
        assert_eq!(list[2].address, "plain@addr.com");
    }

    #[test]
    fn test_parse_list_with_quoted_comma() {
        let list = EmailAddress::parse_list("\"Last, First\" <a@b.com>, other@c.com").unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].display_name, "Last, First");
        assert_eq!(list[0].address, "a@b.com");
    }

    #[test]
    fn test_parse_list_skips_empty_entries() {
        let list = EmailAddress::parse_list("a@b.com,, ,c@d.com,").unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[1].address, "c@d.com");
    }

    #[test]
    fn test_parse_group() {
        let list =
            EmailAddress::parse_list("Team: Ann <ann@x.org>, bo@x.org;, carl@y.org").unwrap();
        let addrs: Vec<&str> = list.iter().map(|a| a.address.as_str()).collect();
        assert_eq!(addrs, ["ann@x.org", "bo@x.org", "carl@y.org"]);
    }

    #[test]
    fn test_parse_empty_group() {
        let list = EmailAddress::parse_list("undisclosed-recipients:;").unwrap();
        assert!(list.is_empty());
    }

    #[test]
    fn test_parse_domain_literal() {
        let addr = parse_one("root@[192.168.0.1]");
        assert_eq!(addr.address, "root@[192.168.0.1]");
    }

    #[test]
    fn test_parse_errors() {
        for bad in [
            "",
            "Bob",
            "Bob <bob@example.com",
            "\"Unclosed <a@b.com>",
            "a@b.com c@d.com",
            "<>",
            "a..b@example.com",
            "a@b.com (unclosed",
        ] {
            assert!(
                EmailAddress::parse_list(bad).is_err(),
                "expected error for {bad:?}"
            );
        }
    }

    #[test]
    fn test_normalize_address() {
        assert_eq!(normalize_address("  Bob@Example.COM \t"), "bob@example.com");
    }

    #[test]
    fn test_normalize_name_single_layer() {
        assert_eq!(normalize_name(" 'Bob' "), "Bob");
        assert_eq!(normalize_name("''Bob''"), "'Bob'");
        assert_eq!(normalize_name("'"), "'");
        assert_eq!(normalize_name("O'Brien"), "O'Brien");
        assert_eq!(normalize_name("'Bob"), "'Bob");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        for (addr, name) in [
            ("  Alice@Example.com ", " 'Alice Liddell' "),
            ("bob@x.org", ""),
            ("CAROL@Y.ORG", "Carol"),
        ] {
            let once = normalize(addr, name);
            let twice = normalize(&once.0, &once.1);
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn test_display_with_name() {
        let addr = EmailAddress::new("alice@example.com", "Alice");
        assert_eq!(addr.display(), "Alice <alice@example.com>");
    }

    #[test]
    fn test_display_without_name() {
        let addr = EmailAddress::new("alice@example.com", "");
        assert_eq!(addr.to_string(), "alice@example.com");
    }
}
