use serde_json::Value;

/// Flattens a ticket description to plain text.
///
/// Strings pass through unchanged. A rich-text document is walked depth
/// first and the `text` of every `type: "text"` node is concatenated.
pub fn extract_plain_text(description: &Value) -> String {
    match description {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => {
            let mut out = String::new();
            collect_text(other, &mut out);
            out
        }
    }
}

fn collect_text(node: &Value, out: &mut String) {
    match node {
        Value::Array(nodes) => nodes.iter().for_each(|child| collect_text(child, out)),
        Value::Object(map) => {
            if map.get("type").and_then(Value::as_str) == Some("text") {
                if let Some(text) = map.get("text").and_then(Value::as_str) {
                    out.push_str(text);
                }
            } else if let Some(content) = map.get("content") {
                collect_text(content, out);
            }
        }
        _ => {}
    }
}
