//! Rendering rules for tool/resource/prompt results (spec §4.4 "Rendering
//! rules for tool results"): text parts join with newlines, non-text parts
//! become a `[binary:<mime>:<n bytes>]` sentinel.

use base64::Engine;
use serde_json::Value;

use vmcp_protocol::types::ContentPart;

pub fn render_content(parts: &[ContentPart]) -> String {
    parts
        .iter()
        .map(render_part)
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_part(part: &ContentPart) -> String {
    match part {
        ContentPart::Text { text } => text.clone(),
        ContentPart::Binary { mime_type, data_base64 } => {
            let byte_len = base64::engine::general_purpose::STANDARD
                .decode(data_base64)
                .map(|bytes| bytes.len())
                .unwrap_or(0);
            format!("[binary:{mime_type}:{byte_len} bytes]")
        }
    }
}

/// Renders an arbitrary JSON value per the same rule set applied to
/// `@param`/`@config` substitutions: strings pass through as-is, everything
/// else is compactly serialized.
pub fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn joins_text_parts_with_newlines() {
        let parts = vec![
            ContentPart::Text { text: "line one".to_string() },
            ContentPart::Text { text: "line two".to_string() },
        ];
        assert_eq!(render_content(&parts), "line one\nline two");
    }

    #[test]
    fn binary_part_renders_as_sentinel_with_decoded_length() {
        let data = base64::engine::general_purpose::STANDARD.encode(b"hello");
        let parts = vec![ContentPart::Binary { mime_type: "image/png".to_string(), data_base64: data }];
        assert_eq!(render_content(&parts), "[binary:image/png:5 bytes]");
    }

    #[test]
    fn render_value_passes_strings_through_and_serializes_other_json() {
        assert_eq!(render_value(&json!("plain")), "plain");
        assert_eq!(render_value(&json!({"a": 1})), "{\"a\":1}");
    }
}
