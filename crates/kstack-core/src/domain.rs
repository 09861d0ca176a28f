//! Hostname scoping
//!
//! A [`Domain`] is a base hostname plus a wildcard flag. Scoping prepends a segment, joined with
//! `.` for wildcard domains (`api.dev.example.com`) and `-` otherwise (`api-dev-example`).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Domain {
    name: String,
    #[serde(default)]
    wildcard: bool,
}

impl Domain {
    pub fn new(name: impl Into<String>, wildcard: bool) -> Self {
        Self {
            name: name.into(),
            wildcard,
        }
    }

    pub fn is_wildcard(&self) -> bool {
        self.wildcard
    }

    fn separator(&self) -> char {
        if self.wildcard { '.' } else { '-' }
    }

    /// The full hostname of this domain
    pub fn base(&self) -> &str {
        &self.name
    }

    /// Name to put on certificates: `*.<base>` for wildcard domains, `base` otherwise
    pub fn common(&self) -> String {
        if self.wildcard {
            self.scope("*").name
        } else {
            self.name.clone()
        }
    }

    /// A new domain nested under this one
    pub fn scope(&self, segment: &str) -> Domain {
        Domain {
            name: format!("{}{}{}", segment, self.separator(), self.name),
            wildcard: self.wildcard,
        }
    }

    /// Shorthand for `scope(segment).base()`
    pub fn sub(&self, segment: &str) -> String {
        self.scope(segment).name
    }
}
