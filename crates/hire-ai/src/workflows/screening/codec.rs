//! Text encoding for string lists persisted in a single column.
//!
//! Strengths and weaknesses are stored as a JSON array. Reads are lenient: blank or
//! malformed text decodes to an empty list so a damaged row never blocks a lookup.

use tracing::warn;

/// Encode a list as a JSON array string.
pub fn encode_string_list(items: &[String]) -> String {
    serde_json::to_string(items).unwrap_or_else(|_| "[]".to_string())
}

/// Decode a stored JSON array, falling back to an empty list.
pub fn decode_string_list(raw: &str) -> Vec<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    match serde_json::from_str::<Vec<String>>(trimmed) {
        Ok(items) => items,
        Err(err) => {
            warn!(error = %err, "discarding malformed stored string list");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|item| item.to_string()).collect()
    }

    #[test]
    fn lists_survive_a_storage_round_trip() {
        for list in [
            Vec::new(),
            strings(&["5y Go", "Distributed systems"]),
            strings(&["quotes \"inside\"", "comma, separated", "ünïcödé", "  padded  "]),
            strings(&["", "[not json]", "\\backslash"]),
        ] {
            let stored = encode_string_list(&list);
            assert_eq!(decode_string_list(&stored), list, "stored as {stored}");
        }
    }

    #[test]
    fn empty_list_encodes_as_json_array() {
        assert_eq!(encode_string_list(&[]), "[]");
    }

    #[test]
    fn blank_text_decodes_to_empty() {
        assert!(decode_string_list("").is_empty());
        assert!(decode_string_list("   \n").is_empty());
    }

    #[test]
    fn malformed_text_decodes_to_empty() {
        assert!(decode_string_list("not json").is_empty());
        assert!(decode_string_list("{\"a\": 1}").is_empty());
        assert!(decode_string_list("[1, 2, 3]").is_empty());
        assert!(decode_string_list("[\"unterminated").is_empty());
    }
}
