//! In-memory directory
//!
//! Holds entries and passwords in process and counts every operation, which
//! makes it the test double for the authentication pipeline. Supports the
//! filter subset the engine produces: equality, presence, `&`, `|` and `!`.

use crate::ldap::directory::{Directory, DirectorySession, SearchScope};
use crate::ldap::types::DirectoryEntry;
use async_trait::async_trait;
use dirauth_core::{DirectoryConfig, Error, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Default)]
struct MemoryInner {
    entries: RwLock<Vec<DirectoryEntry>>,
    /// Lowercased DN -> password
    passwords: RwLock<HashMap<String, String>>,
    unavailable: AtomicBool,
    /// Searches whose filter contains one of these fail as unavailable
    failing_filters: RwLock<Vec<String>>,
    connects: AtomicUsize,
    binds: AtomicUsize,
    searches: AtomicUsize,
}

/// Directory kept entirely in memory. Clones share the same data.
#[derive(Clone, Default)]
pub struct MemoryDirectory {
    inner: Arc<MemoryInner>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_entry(&self, entry: DirectoryEntry) {
        self.inner.entries.write().push(entry);
    }

    /// Add an entry that can bind with `password`
    pub fn add_account(&self, entry: DirectoryEntry, password: &str) {
        self.inner
            .passwords
            .write()
            .insert(entry.dn.to_lowercase(), password.to_string());
        self.add_entry(entry);
    }

    /// Refuse every new connection while `unavailable` is set
    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Fail any search whose filter contains `fragment`
    pub fn fail_searches_containing(&self, fragment: &str) {
        self.inner.failing_filters.write().push(fragment.to_string());
    }

    pub fn connects(&self) -> usize {
        self.inner.connects.load(Ordering::SeqCst)
    }

    pub fn binds(&self) -> usize {
        self.inner.binds.load(Ordering::SeqCst)
    }

    pub fn searches(&self) -> usize {
        self.inner.searches.load(Ordering::SeqCst)
    }

    /// Total directory I/O performed so far
    pub fn operations(&self) -> usize {
        self.connects() + self.binds() + self.searches()
    }
}

#[async_trait]
impl Directory for MemoryDirectory {
    async fn connect(&self, _config: &DirectoryConfig) -> Result<Box<dyn DirectorySession>> {
        self.inner.connects.fetch_add(1, Ordering::SeqCst);
        if self.inner.unavailable.load(Ordering::SeqCst) {
            return Err(Error::DirectoryUnavailable(
                "connection refused".to_string(),
            ));
        }
        Ok(Box::new(MemorySession {
            inner: self.inner.clone(),
        }))
    }
}

struct MemorySession {
    inner: Arc<MemoryInner>,
}

#[async_trait]
impl DirectorySession for MemorySession {
    async fn bind(&mut self, dn: &str, password: &str) -> Result<bool> {
        self.inner.binds.fetch_add(1, Ordering::SeqCst);
        // RFC 4513 unauthenticated bind: an empty password always "succeeds"
        if password.is_empty() {
            return Ok(true);
        }
        let passwords = self.inner.passwords.read();
        Ok(passwords.get(&dn.to_lowercase()).map(String::as_str) == Some(password))
    }

    async fn search(
        &mut self,
        base: &str,
        scope: SearchScope,
        filter: &str,
        attrs: &[&str],
    ) -> Result<Vec<DirectoryEntry>> {
        self.inner.searches.fetch_add(1, Ordering::SeqCst);

        if self
            .inner
            .failing_filters
            .read()
            .iter()
            .any(|f| filter.contains(f.as_str()))
        {
            return Err(Error::DirectoryUnavailable(format!(
                "search {} failed",
                filter
            )));
        }

        if base.is_empty() && scope == SearchScope::Base {
            return Ok(vec![DirectoryEntry::new("")
                .with_attribute("vendorName", &["dirauth"])
                .with_attribute("vendorVersion", &[dirauth_core::VERSION])
                .with_attribute("supportedLDAPVersion", &["3"])]);
        }

        let parsed = Filter::parse(filter)?;
        let base = base.to_lowercase();

        let entries = self.inner.entries.read();
        Ok(entries
            .iter()
            .filter(|entry| {
                let dn = entry.dn.to_lowercase();
                match scope {
                    SearchScope::Base => dn == base,
                    SearchScope::Subtree => dn == base || dn.ends_with(&format!(",{}", base)),
                }
            })
            .filter(|entry| parsed.matches(entry))
            .map(|entry| project(entry, attrs))
            .collect())
    }

    async fn unbind(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Keep only the requested attributes
fn project(entry: &DirectoryEntry, attrs: &[&str]) -> DirectoryEntry {
    if attrs.is_empty() || attrs.contains(&"*") {
        return entry.clone();
    }
    DirectoryEntry {
        dn: entry.dn.clone(),
        attributes: entry
            .attributes
            .iter()
            .filter(|(k, _)| attrs.iter().any(|a| a.eq_ignore_ascii_case(k)))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    Present(String),
    Equal(String, String),
}

impl Filter {
    fn parse(input: &str) -> Result<Filter> {
        let chars: Vec<char> = input.trim().chars().collect();
        let (filter, rest) = Self::parse_at(&chars)?;
        if !rest.is_empty() {
            return Err(Error::Configuration(format!("malformed filter: {}", input)));
        }
        Ok(filter)
    }

    fn parse_at(input: &[char]) -> Result<(Filter, &[char])> {
        let malformed = || Error::Configuration("malformed filter".to_string());

        let rest = match input.split_first() {
            Some(('(', rest)) => rest,
            _ => return Err(malformed()),
        };

        match rest.first() {
            Some('&') | Some('|') => {
                let mut rest = &rest[1..];
                let mut parts = Vec::new();
                while rest.first() == Some(&'(') {
                    let (part, after) = Self::parse_at(rest)?;
                    parts.push(part);
                    rest = after;
                }
                let rest = match rest.split_first() {
                    Some((')', rest)) => rest,
                    _ => return Err(malformed()),
                };
                let filter = if input[1] == '&' {
                    Filter::And(parts)
                } else {
                    Filter::Or(parts)
                };
                Ok((filter, rest))
            }
            Some('!') => {
                let (inner, rest) = Self::parse_at(&rest[1..])?;
                match rest.split_first() {
                    Some((')', rest)) => Ok((Filter::Not(Box::new(inner)), rest)),
                    _ => Err(malformed()),
                }
            }
            Some(_) => {
                let end = rest.iter().position(|c| *c == ')').ok_or_else(malformed)?;
                let item: String = rest[..end].iter().collect();
                let (attr, value) = item.split_once('=').ok_or_else(malformed)?;
                let filter = if value == "*" {
                    Filter::Present(attr.to_string())
                } else {
                    Filter::Equal(attr.to_string(), unescape(value))
                };
                Ok((filter, &rest[end + 1..]))
            }
            None => Err(malformed()),
        }
    }

    fn matches(&self, entry: &DirectoryEntry) -> bool {
        match self {
            Filter::And(parts) => parts.iter().all(|p| p.matches(entry)),
            Filter::Or(parts) => parts.iter().any(|p| p.matches(entry)),
            Filter::Not(inner) => !inner.matches(entry),
            Filter::Present(attr) => {
                attr.eq_ignore_ascii_case("objectClass") || !entry.values(attr).is_empty()
            }
            Filter::Equal(attr, value) => {
                // the RDN attribute is also matchable when not stored explicitly
                entry.values(attr).iter().any(|v| v.eq_ignore_ascii_case(value))
                    || rdn_value(&entry.dn, attr)
                        .map(|v| v.eq_ignore_ascii_case(value))
                        .unwrap_or(false)
            }
        }
    }
}

fn rdn_value<'a>(dn: &'a str, attr: &str) -> Option<&'a str> {
    let rdn = dn.split(',').next()?;
    let (name, value) = rdn.split_once('=')?;
    name.trim().eq_ignore_ascii_case(attr).then(|| value.trim())
}

/// Undo RFC 4515 `\XX` escapes
fn unescape(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 2 < bytes.len() {
            let decoded = std::str::from_utf8(&bytes[i + 1..i + 3])
                .ok()
                .and_then(|hex| u8::from_str_radix(hex, 16).ok());
            if let Some(b) = decoded {
                out.push(b);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directory() -> MemoryDirectory {
        let dir = MemoryDirectory::new();
        dir.add_account(
            DirectoryEntry::new("uid=alice,ou=people,dc=example,dc=com")
                .with_attribute("uid", &["alice"])
                .with_attribute("mail", &["alice@example.com"]),
            "secret",
        );
        dir.add_entry(
            DirectoryEntry::new("ou=admins,ou=groups,dc=example,dc=com")
                .with_attribute("uniqueMember", &["uid=alice,ou=people,dc=example,dc=com"]),
        );
        dir
    }

    async fn session(dir: &MemoryDirectory) -> Box<dyn DirectorySession> {
        dir.connect(&DirectoryConfig::new("ldap://memory", "dc=example,dc=com"))
            .await
            .ok()
            .unwrap()
    }

    #[test]
    fn test_filter_parsing() {
        assert_eq!(
            Filter::parse("(uid=alice)").unwrap(),
            Filter::Equal("uid".into(), "alice".into())
        );
        assert_eq!(
            Filter::parse("(&(objectClass=*)(!(uid=bob)))").unwrap(),
            Filter::And(vec![
                Filter::Present("objectClass".into()),
                Filter::Not(Box::new(Filter::Equal("uid".into(), "bob".into()))),
            ])
        );
        assert!(Filter::parse("uid=alice").is_err());
        assert!(Filter::parse("(uid=alice").is_err());
    }

    #[test]
    fn test_unescape() {
        assert_eq!(unescape("a\\2ab"), "a*b");
        assert_eq!(unescape("\\28x\\29"), "(x)");
        assert_eq!(unescape("plain"), "plain");
        assert_eq!(unescape("trailing\\"), "trailing\\");
    }

    #[tokio::test]
    async fn test_search_and_bind() {
        let dir = directory();
        let mut session = session(&dir).await;

        let found = session
            .search("dc=example,dc=com", SearchScope::Subtree, "(uid=ALICE)", &[])
            .await
            .unwrap();
        assert_eq!(found.len(), 1);

        let groups = session
            .search(
                "dc=example,dc=com",
                SearchScope::Subtree,
                "(ou=admins)",
                &["uniqueMember"],
            )
            .await
            .unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].values("uniqueMember").len(), 1);

        assert!(session
            .bind("uid=alice,ou=people,dc=example,dc=com", "secret")
            .await
            .unwrap());
        assert!(!session
            .bind("uid=alice,ou=people,dc=example,dc=com", "wrong")
            .await
            .unwrap());

        assert_eq!(dir.connects(), 1);
        assert_eq!(dir.searches(), 2);
        assert_eq!(dir.binds(), 2);
    }

    #[tokio::test]
    async fn test_unavailable_and_failing_searches() {
        let dir = directory();
        dir.fail_searches_containing("ou=admins");
        let mut session = session(&dir).await;
        assert!(matches!(
            session
                .search("dc=example,dc=com", SearchScope::Subtree, "(ou=admins)", &[])
                .await,
            Err(Error::DirectoryUnavailable(_))
        ));

        dir.set_unavailable(true);
        let result = dir
            .connect(&DirectoryConfig::new("ldap://memory", "dc=example,dc=com"))
            .await;
        assert!(matches!(result, Err(Error::DirectoryUnavailable(_))));
    }
}
