//! Node names and ground canonicalization.

use std::fmt;

/// The canonical ground node name.
pub const GROUND: &str = "0";

/// A circuit node name, stored lower-cased.
///
/// SPICE node names are case-insensitive and may be plain integers
/// (`0`, `12`) or identifiers (`vdd`, `out_p`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeName(String);

impl NodeName {
    pub fn new(name: impl AsRef<str>) -> Self {
        NodeName(name.as_ref().to_ascii_lowercase())
    }

    /// Build a node name, rewriting the configured ground alias to `0`.
    pub fn canonicalize(name: &str, ground_alias: &str) -> Self {
        if name.eq_ignore_ascii_case(ground_alias) || name.eq_ignore_ascii_case("gnd") {
            NodeName(GROUND.to_string())
        } else {
            NodeName::new(name)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_ground(&self) -> bool {
        self.0 == GROUND
    }
}

impl fmt::Display for NodeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeName {
    fn from(name: &str) -> Self {
        NodeName::new(name)
    }
}
