use std::fmt;

use crate::error::{ForwardError, Result};

/// A normalized fully-qualified domain name: lowercase ASCII labels with a
/// trailing dot. The root is `"."`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fqdn(String);

impl Fqdn {
    pub const ROOT: &'static str = ".";

    pub fn root() -> Self {
        Fqdn(Self::ROOT.to_string())
    }

    /// Normalize a domain name string into an FQDN.
    pub fn parse(name: &str) -> Result<Self> {
        if name.is_empty() || name == Self::ROOT {
            return Ok(Self::root());
        }
        let mut normalized = name.to_ascii_lowercase();
        if !normalized.ends_with('.') {
            normalized.push('.');
        }
        if normalized.len() > 255 {
            return Err(ForwardError::Parse(format!("domain name too long: {name}")));
        }
        for label in normalized[..normalized.len() - 1].split('.') {
            if label.is_empty() {
                return Err(ForwardError::Parse(format!("empty label in name: {name}")));
            }
            if label.len() > 63 {
                return Err(ForwardError::Parse(format!("label too long in name: {name}")));
            }
        }
        Ok(Fqdn(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0 == Self::ROOT
    }

    pub fn num_labels(&self) -> usize {
        if self.is_root() {
            return 0;
        }
        self.0[..self.0.len() - 1].split('.').count()
    }

    /// Whether `other` equals this name or falls under it on a label
    /// boundary. The root contains everything.
    pub fn contains(&self, other: &Fqdn) -> bool {
        if self.is_root() {
            return true;
        }
        if other.0 == self.0 {
            return true;
        }
        other.0.ends_with(&self.0)
            && other.0.as_bytes()[other.0.len() - self.0.len() - 1] == b'.'
    }
}

impl fmt::Display for Fqdn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_normalizes_case_and_trailing_dot() {
        assert_eq!(Fqdn::parse("Example.COM").unwrap().as_str(), "example.com.");
        assert_eq!(Fqdn::parse("example.com.").unwrap().as_str(), "example.com.");
        assert_eq!(Fqdn::parse(".").unwrap().as_str(), ".");
        assert_eq!(Fqdn::parse("").unwrap().as_str(), ".");
    }

    #[test]
    fn parse_rejects_bad_labels() {
        assert!(Fqdn::parse("foo..bar").is_err());
        let long = "a".repeat(64);
        assert!(Fqdn::parse(&format!("{long}.com")).is_err());
    }

    #[test]
    fn label_counts() {
        assert_eq!(Fqdn::root().num_labels(), 0);
        assert_eq!(Fqdn::parse("com").unwrap().num_labels(), 1);
        assert_eq!(Fqdn::parse("foo.example.com").unwrap().num_labels(), 3);
    }

    #[test]
    fn containment_respects_label_boundaries() {
        let suffix = Fqdn::parse("example.com").unwrap();
        assert!(suffix.contains(&Fqdn::parse("example.com").unwrap()));
        assert!(suffix.contains(&Fqdn::parse("foo.example.com").unwrap()));
        assert!(!suffix.contains(&Fqdn::parse("badexample.com").unwrap()));
        assert!(!suffix.contains(&Fqdn::parse("example.com.org").unwrap()));
        assert!(Fqdn::root().contains(&Fqdn::parse("anything.test").unwrap()));
    }
}
