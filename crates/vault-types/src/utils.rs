//! Formatting and time helpers.

use std::collections::HashMap;

/// Shortens an identifier for log output.
///
/// Shows only the first 8 characters followed by ".." for longer strings.
pub fn truncate_id(id: &str) -> String {
	match id.char_indices().nth(8) {
		Some((idx, _)) => format!("{}..", &id[..idx]),
		None => id.to_string(),
	}
}

/// Current Unix timestamp in seconds, 0 if the clock is before the epoch.
pub fn current_timestamp() -> u64 {
	std::time::SystemTime::now()
		.duration_since(std::time::UNIX_EPOCH)
		.map(|d| d.as_secs())
		.unwrap_or(0)
}

/// Replaces `{{key}}` placeholders with values from `vars`.
///
/// Whitespace inside the braces is ignored and unknown keys render as empty
/// strings. An unterminated `{{` is copied through unchanged.
pub fn render_template(template: &str, vars: &HashMap<String, String>) -> String {
	let mut out = String::with_capacity(template.len());
	let mut rest = template;
	while let Some(start) = rest.find("{{") {
		out.push_str(&rest[..start]);
		let after = &rest[start + 2..];
		let Some(end) = after.find("}}") else {
			out.push_str(&rest[start..]);
			return out;
		};
		let key = after[..end].trim();
		if let Some(value) = vars.get(key) {
			out.push_str(value);
		}
		rest = &after[end + 2..];
	}
	out.push_str(rest);
	out
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_truncate_id() {
		assert_eq!(truncate_id("abc"), "abc");
		assert_eq!(truncate_id("12345678"), "12345678");
		assert_eq!(truncate_id("123456789"), "12345678..");
	}

	#[test]
	fn test_render_template() {
		let vars = HashMap::from([
			("name".to_string(), "Ada".to_string()),
			("order_id".to_string(), "ord-1".to_string()),
		]);
		let rendered = render_template("Hi {{name}}, order {{ order_id }} {{missing}}done", &vars);
		assert_eq!(rendered, "Hi Ada, order ord-1 done");
		assert_eq!(render_template("open {{name", &vars), "open {{name");
	}
}
