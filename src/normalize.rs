//! Tag name normalization
//!
//! Synthesized name parts (template member suffixes) are mapped into the
//! identifier alphabet the tag database accepts: ASCII letters and digits,
//! `_`, and a short list of allowed symbols. Anything else is written as
//! `^0xHH`. User-supplied names are never normalized.

use serde::{Deserialize, Serialize};

/// Symbols passed through unchanged by default.
pub const DEFAULT_ALLOWED_SYMBOLS: &str = "/";

/// One single-character substitution, applied to the whole input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Replacement {
    pub from: char,
    pub to: String,
}

impl Replacement {
    pub fn new(from: char, to: impl Into<String>) -> Self {
        Self {
            from,
            to: to.into(),
        }
    }
}

/// `.`, space and `-` all become `_`.
pub fn default_replacements() -> Vec<Replacement> {
    vec![
        Replacement::new('.', "_"),
        Replacement::new(' ', "_"),
        Replacement::new('-', "_"),
    ]
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalizer {
    replacements: Vec<Replacement>,
    allowed_symbols: Vec<char>,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(default_replacements(), DEFAULT_ALLOWED_SYMBOLS)
    }
}

impl Normalizer {
    pub fn new(replacements: Vec<Replacement>, allowed_symbols: &str) -> Self {
        Self {
            replacements,
            allowed_symbols: allowed_symbols.chars().collect(),
        }
    }

    pub fn replacements(&self) -> &[Replacement] {
        &self.replacements
    }

    /// Apply the substitutions in order, each as a global replace, then
    /// escape every character outside the allowed alphabet.
    pub fn normalize(&self, text: &str) -> String {
        if text.is_empty() {
            return String::new();
        }

        let mut substituted = text.to_string();
        for rule in &self.replacements {
            if substituted.contains(rule.from) {
                substituted = substituted.replace(rule.from, &rule.to);
            }
        }

        let mut out = String::with_capacity(substituted.len());
        for c in substituted.chars() {
            if self.passes(c) {
                out.push(c);
            } else {
                out.push_str(&format!("^0x{:02X}", u32::from(c)));
            }
        }
        out
    }

    fn passes(&self, c: char) -> bool {
        c.is_ascii_alphanumeric() || c == '_' || self.allowed_symbols.contains(&c)
    }
}

/// Normalize with the default rules.
pub fn normalize(text: &str) -> String {
    Normalizer::default().normalize(text)
}
