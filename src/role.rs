//! Roles: named subsets of a mapper's fields.
//!
//! A role is either a whitelist (only the listed fields take part) or a
//! blacklist (every field except the listed ones). Unions follow the usual
//! set rules, with a blacklist on either side subtracting from a whitelist.

use std::ops::BitOr;

/// Name of the role used when a caller does not ask for one.
pub const DEFAULT_ROLE: &str = "__default__";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Role {
    fields: Vec<String>,
    whitelist: bool,
}

impl Role {
    pub fn whitelist<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Role {
            fields: dedup(fields.into_iter().map(Into::into)),
            whitelist: true,
        }
    }

    pub fn blacklist<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Role {
            fields: dedup(fields.into_iter().map(Into::into)),
            whitelist: false,
        }
    }

    pub fn is_whitelist(&self) -> bool {
        self.whitelist
    }

    /// The listed field names, in declaration order.
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Membership test honouring whitelist/blacklist semantics.
    pub fn contains(&self, name: &str) -> bool {
        self.listed(name) == self.whitelist
    }

    fn listed(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f == name)
    }
}

fn dedup(names: impl Iterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for n in names {
        if !out.contains(&n) {
            out.push(n);
        }
    }
    out
}

impl BitOr for Role {
    type Output = Role;

    fn bitor(self, other: Role) -> Role {
        match (self.whitelist, other.whitelist) {
            (true, true) => Role::whitelist(self.fields.into_iter().chain(other.fields)),
            (true, false) => Role::whitelist(self.fields.iter().filter(|f| !other.listed(f)).cloned()),
            (false, true) => Role::whitelist(other.fields.iter().filter(|f| !self.listed(f)).cloned()),
            (false, false) => Role::blacklist(self.fields.into_iter().chain(other.fields)),
        }
    }
}

impl<const N: usize> From<[&str; N]> for Role {
    fn from(fields: [&str; N]) -> Self {
        Role::whitelist(fields)
    }
}

impl From<Vec<&str>> for Role {
    fn from(fields: Vec<&str>) -> Self {
        Role::whitelist(fields)
    }
}

impl From<Vec<String>> for Role {
    fn from(fields: Vec<String>) -> Self {
        Role::whitelist(fields)
    }
}
