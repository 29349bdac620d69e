//! Environment maps carried as JSON objects
//!
//! Both the plaintext `jsonEnv` and every secret payload use the same shape:
//! a flat JSON object whose values are strings.

use std::collections::BTreeMap;

/// Environment variables, ordered by name
pub type EnvMap = BTreeMap<String, String>;

/// Parse a JSON object of string pairs.
///
/// Empty (or whitespace-only) input means "no variables" rather than invalid
/// JSON, matching how the metadata channel encodes an absent env.
pub fn parse_env_json(text: &str) -> Result<EnvMap, serde_json::Error> {
    if text.trim().is_empty() {
        return Ok(EnvMap::new());
    }
    serde_json::from_str(text)
}

/// Check that a name can be passed to `docker run --env`
pub fn is_valid_env_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c == '_' || c.is_ascii_alphabetic())
        && chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}
