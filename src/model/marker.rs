//! Marker strings embedded in the string table.
//!
//! Two kinds of side-channel strings exist. Tool markers (`~~D8{...}`, `~~R8{...}`,
//! `~~L8{...}`) record which tool produced a container and with which settings. The checksum
//! marker (`~~~{...}`) maps class descriptors to the checksums of their inputs, so that
//! incremental builds can pass checksums through. Both carry a JSON object and sort after all
//! ordinary strings, which lets the reader find them by scanning backwards from the last
//! string.

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use strum::{Display, EnumIter, IntoEnumIterator};

/// Prefix of the checksum marker.
pub const CHECKSUM_PREFIX: &str = "~~~";

/// The tool that wrote a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum MarkerTool {
    /// Dexer
    D8,
    /// Shrinker
    R8,
    /// Library desugarer
    L8,
}

impl MarkerTool {
    /// The marker prefix of this tool.
    #[must_use]
    pub fn prefix(self) -> &'static str {
        match self {
            MarkerTool::D8 => "~~D8",
            MarkerTool::R8 => "~~R8",
            MarkerTool::L8 => "~~L8",
        }
    }
}

/// A tool marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marker {
    tool: MarkerTool,
    content: Map<String, Value>,
}

impl Marker {
    /// An empty marker for `tool`.
    #[must_use]
    pub fn new(tool: MarkerTool) -> Marker {
        Marker {
            tool,
            content: Map::new(),
        }
    }

    /// Set a property.
    #[must_use]
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Marker {
        self.content.insert(key.to_string(), value.into());
        self
    }

    /// The producing tool.
    #[must_use]
    pub fn tool(&self) -> MarkerTool {
        self.tool
    }

    /// A property.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.content.get(key)
    }

    /// `min-api` as recorded by the tool.
    #[must_use]
    pub fn min_api(&self) -> Option<u64> {
        self.get("min-api").and_then(Value::as_u64)
    }

    /// Parse a marker string. Returns `None` for anything that is not a tool marker.
    #[must_use]
    pub fn parse(value: &str) -> Option<Marker> {
        MarkerTool::iter().find_map(|tool| {
            let json = value.strip_prefix(tool.prefix())?;
            match serde_json::from_str::<Value>(json) {
                Ok(Value::Object(content)) => Some(Marker { tool, content }),
                _ => None,
            }
        })
    }

    /// Whether a string may be a marker. Markers and only markers start with `~`.
    #[must_use]
    pub fn has_marker_prefix(content: &[u8]) -> bool {
        content.first().is_some_and(|first| *first >= b'~')
    }
}

impl std::fmt::Display for Marker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.tool.prefix(), Value::Object(self.content.clone()))
    }
}

/// Encode descriptor checksums as a checksum marker string.
#[must_use]
pub fn encode_checksums(checksums: &BTreeMap<String, u64>) -> String {
    let content: Map<String, Value> = checksums
        .iter()
        .map(|(descriptor, checksum)| (descriptor.clone(), Value::from(format!("{checksum:x}"))))
        .collect();
    format!("{}{}", CHECKSUM_PREFIX, Value::Object(content))
}

/// Decode a checksum marker string. Returns `None` for other strings or broken payloads.
#[must_use]
pub fn parse_checksums(value: &str) -> Option<BTreeMap<String, u64>> {
    let json = value.strip_prefix(CHECKSUM_PREFIX)?;
    let Value::Object(content) = serde_json::from_str::<Value>(json).ok()? else {
        return None;
    };
    content
        .into_iter()
        .map(|(descriptor, checksum)| {
            let checksum = u64::from_str_radix(checksum.as_str()?, 16).ok()?;
            Some((descriptor, checksum))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_marker() {
        let marker = Marker::new(MarkerTool::D8)
            .with("min-api", 21)
            .with("compilation-mode", "debug");
        let text = marker.to_string();
        assert!(text.starts_with("~~D8{"));

        let parsed = Marker::parse(&text).unwrap();
        assert_eq!(parsed, marker);
        assert_eq!(parsed.min_api(), Some(21));

        assert!(Marker::parse("~~D8 not json").is_none());
        assert!(Marker::parse("Lfoo;").is_none());
        assert!(Marker::parse(&encode_checksums(&BTreeMap::new())).is_none());
    }

    #[test]
    fn test_checksums() {
        let mut checksums = BTreeMap::new();
        checksums.insert("LA;".to_string(), 0xdead_beef_u64);
        checksums.insert("Lb/C;".to_string(), 7);

        let text = encode_checksums(&checksums);
        assert!(text.starts_with("~~~{"));
        assert_eq!(parse_checksums(&text), Some(checksums));
        assert!(parse_checksums("~~~{\"LA;\":12}").is_none());
    }

    #[test]
    fn test_marker_prefix() {
        assert!(Marker::has_marker_prefix(b"~~~{}"));
        assert!(!Marker::has_marker_prefix(b"zzz"));
        assert!(!Marker::has_marker_prefix(b""));
    }
}
