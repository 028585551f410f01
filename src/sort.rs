//! Comparison primitives and the case-insensitive byte-slice key.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Compares two byte slices case-insensitively over the shorter length,
/// with the length as tiebreaker: `"ab" < "abc"`, `"Foo" == "foo"`.
#[inline]
pub fn caseless_cmp(a: &[u8], b: &[u8]) -> Ordering {
    let common = a.len().min(b.len());
    for i in 0..common {
        let cmp = a[i].to_ascii_lowercase().cmp(&b[i].to_ascii_lowercase());
        if cmp != Ordering::Equal {
            return cmp;
        }
    }
    a.len().cmp(&b.len())
}

/// Case-insensitive equality: equal lengths and equal folded bytes.
#[inline]
pub fn caseless_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.eq_ignore_ascii_case(b)
}

/// A byte-slice key ordered and hashed case-insensitively.
///
/// Ordering compares folded bytes over the shorter length and breaks ties
/// on length. Hashing folds case as well, so two keys that compare equal
/// always land in the same partition. `Display` prints the folded
/// (lowercase) form, which is what result files carry.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CaselessKey(Vec<u8>);

impl CaselessKey {
    pub fn from_bytes(bytes: &[u8]) -> CaselessKey {
        CaselessKey(bytes.to_vec())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<&str> for CaselessKey {
    fn from(s: &str) -> CaselessKey {
        CaselessKey(s.as_bytes().to_vec())
    }
}

impl PartialEq for CaselessKey {
    fn eq(&self, other: &CaselessKey) -> bool {
        caseless_eq(&self.0, &other.0)
    }
}

impl Eq for CaselessKey {}

impl PartialOrd for CaselessKey {
    fn partial_cmp(&self, other: &CaselessKey) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CaselessKey {
    fn cmp(&self, other: &CaselessKey) -> Ordering {
        caseless_cmp(&self.0, &other.0)
    }
}

impl Hash for CaselessKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for b in &self.0 {
            state.write_u8(b.to_ascii_lowercase());
        }
    }
}

impl fmt::Display for CaselessKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{}", b.to_ascii_lowercase() as char)?;
        }
        Ok(())
    }
}

impl FromStr for CaselessKey {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<CaselessKey, Self::Err> {
        Ok(CaselessKey::from(s))
    }
}
