//! Canonical forms of city names.

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use std::fmt;
use unicode_normalization::{char::is_combining_mark, UnicodeNormalization};

lazy_static! {
    /// Marks that modify a letter, including spacing ones such as `·` and `ʼ`.
    static ref DIACRITIC: Regex =
        Regex::new(r"\p{Diacritic}").expect("diacritic pattern is valid");
}

/// A city name in canonical form: lowercase, without diacritics, without
/// leading or trailing whitespace, and with inner whitespace collapsed to
/// single spaces.
///
/// The only way to build one is [`normalize`], so a `NormalizedKey` can be
/// used as a deduplication and cache key without further checks.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct NormalizedKey(String);

impl NormalizedKey {
    /// The canonical name.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The number of characters in the name.
    pub fn char_count(&self) -> usize {
        self.0.chars().count()
    }

    /// Whether the name is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for NormalizedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NormalizedKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Canonicalize a free-text city name.
///
/// Never fails. Applying it to the text of a key it already produced returns
/// the same key.
///
/// ```
/// use smog_cities::normalize;
///
/// assert_eq!(normalize("  São   Paulo ").as_str(), "sao paulo");
/// assert_eq!(normalize("KRAKÓW").as_str(), "krakow");
/// ```
pub fn normalize(raw: &str) -> NormalizedKey {
    // Lowercase before decomposing: some lowercase mappings (`İ` -> `i̇`)
    // introduce combining marks of their own.
    let decomposed: String = raw
        .trim()
        .to_lowercase()
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect();
    let stripped = DIACRITIC.replace_all(&decomposed, "");

    NormalizedKey(stripped.split_whitespace().collect::<Vec<_>>().join(" "))
}
