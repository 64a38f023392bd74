use colored::Colorize;
use serde_json::Value;

/// Observed fields holding secrets
const SECRET_FIELDS: &[&str] = &["value"];

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

// ============================================================================
// Secrets
// ============================================================================

/// Mask a secret, keeping a short prefix so keys stay recognizable
pub fn mask_secret(secret: &str) -> String {
    let prefix: String = secret.chars().take(5).collect();
    if secret.chars().count() <= 8 {
        "********".to_string()
    } else {
        format!("{prefix}********")
    }
}

/// Mask every secret field of an observed state object in place
pub fn mask_secrets(value: &mut Value) {
    if let Value::Object(map) = value {
        for field in SECRET_FIELDS {
            if let Some(Value::String(secret)) = map.get_mut(*field) {
                *secret = mask_secret(secret);
            }
        }
    }
}

// ============================================================================
// Observed State Display
// ============================================================================

/// Print an observed state object as aligned key-value lines
pub fn observed(value: &Value) {
    let mut lines = Vec::new();
    flatten("", value, &mut lines);
    let width = lines.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
    for (key, rendered) in lines {
        println!("  {:<width$}  {}", key.dimmed(), rendered);
    }
}

fn flatten(prefix: &str, value: &Value, out: &mut Vec<(String, String)>) {
    match value {
        Value::Object(map) if !map.is_empty() => {
            for (key, child) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                flatten(&path, child, out);
            }
        }
        _ => out.push((prefix.to_string(), render_scalar(prefix, value))),
    }
}

fn render_scalar(key: &str, value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) if key == "size" => n.as_u64().map_or_else(|| n.to_string(), format_size),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join(", "),
        Value::Object(_) => "{}".to_string(),
        other => other.to_string(),
    }
}

// ============================================================================
// Size Formatting
// ============================================================================

const KB: u64 = 1024;
const MB: u64 = KB * 1024;
const GB: u64 = MB * 1024;
const TB: u64 = GB * 1024;

/// Format bytes as human-readable size
pub fn format_size(bytes: u64) -> String {
    if bytes >= TB {
        format!("{:.2} TB", bytes as f64 / TB as f64)
    } else if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_mask_secret() {
        assert_eq!(mask_secret("pcsk_key-0002_secret"), "pcsk_********");
        assert_eq!(mask_secret("short"), "********");
        assert_eq!(mask_secret(""), "********");
    }

    #[test]
    fn test_mask_secrets_only_touches_secret_fields() {
        let mut value = json!({
            "id": "key-0002",
            "name": "ci",
            "value": "pcsk_key-0002_secret",
        });
        mask_secrets(&mut value);
        assert_eq!(value["value"], "pcsk_********");
        assert_eq!(value["name"], "ci");

        let mut index = json!({"id": "docs", "dimension": 8});
        mask_secrets(&mut index);
        assert_eq!(index, json!({"id": "docs", "dimension": 8}));
    }

    #[test]
    fn test_flatten_nested_spec() {
        let value = json!({
            "name": "docs",
            "spec": {"serverless": {"cloud": "aws", "region": "us-east-1"}},
            "tags": {},
            "roles": ["ProjectEditor", "ProjectViewer"],
        });
        let mut lines = Vec::new();
        flatten("", &value, &mut lines);
        assert!(lines.contains(&("spec.serverless.cloud".to_string(), "aws".to_string())));
        assert!(lines.contains(&("tags".to_string(), "{}".to_string())));
        assert!(lines.contains(&(
            "roles".to_string(),
            "ProjectEditor, ProjectViewer".to_string()
        )));
    }

    #[test]
    fn test_render_size() {
        assert_eq!(render_scalar("size", &json!(1536)), "1.5 KB");
        assert_eq!(render_scalar("dimension", &json!(1536)), "1536");
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(1024), "1.0 KB");
        assert_eq!(format_size(1024 * 1024 * 100), "100.0 MB");
        assert_eq!(format_size(1024u64 * 1024 * 1024 * 1024), "1.00 TB");
    }
}
