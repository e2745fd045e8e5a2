//! Versioned cache keys.

use std::borrow::Cow;
use std::fmt;

/// Cache key schema version. Bump to invalidate every stored entry at once.
pub const KEY_VERSION: &str = "v1";

const KEY_PREFIX: &str = "pred";

/// Deterministic key for one predictable quantity.
///
/// Format: `pred:{version}:{store}:{family}:{date}:{horizon}`. Text fields
/// have `%` and `:` percent-escaped, so distinct tuples never collide even
/// when a field contains the separator.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(store_nbr: i32, family: &str, date: &str, horizon: i32) -> Self {
        Self(format!(
            "{KEY_PREFIX}:{KEY_VERSION}:{store_nbr}:{}:{}:{horizon}",
            escape(family),
            escape(date)
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn escape(field: &str) -> Cow<'_, str> {
    if !field.contains(['%', ':']) {
        return Cow::Borrowed(field);
    }
    let mut out = String::with_capacity(field.len() + 4);
    for c in field.chars() {
        match c {
            '%' => out.push_str("%25"),
            ':' => out.push_str("%3A"),
            _ => out.push(c),
        }
    }
    Cow::Owned(out)
}
