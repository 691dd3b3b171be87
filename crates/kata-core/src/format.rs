//! Display-ready projection of raw execution results.
//!
//! Pure, total functions over [`ExecutionResult`]: no I/O, no failure modes.
//! Composite values are length-bounded so a submission that returns a huge
//! collection cannot flood the UI or the logs.

use serde::{Deserialize, Serialize};

use crate::core_types::ExecutionResult;
use crate::interp::Value;

/// Number of elements/keys/items shown before a composite value is elided.
const MAX_ITEMS: usize = 5;

/// Field budget for the one-line summary.
const SUMMARY_FIELD_CHARS: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayResult {
    pub success: bool,
    pub value_text: String,
    pub output_text: Option<String>,
    pub error_text: Option<String>,
    pub elapsed_text: String,
}

/// Convert a raw result into its display fields.
pub fn format(result: &ExecutionResult) -> DisplayResult {
    DisplayResult {
        success: result.is_success(),
        value_text: format_value(result.value.as_ref()),
        output_text: format_output(&result.output),
        error_text: result
            .error
            .as_ref()
            .map(|e| normalize_whitespace(&e.user_message())),
        elapsed_text: format_elapsed(result.elapsed_ms),
    }
}

/// Compact one-line rendering for logs and terse UI banners.
pub fn summary(result: &ExecutionResult) -> String {
    let elapsed = format_elapsed(result.elapsed_ms);
    match &result.error {
        Some(error) => format!(
            "failed ({}): {}",
            elapsed,
            truncate_chars(&normalize_whitespace(&error.user_message()), SUMMARY_FIELD_CHARS)
        ),
        None => {
            let value = truncate_chars(&format_value(result.value.as_ref()), SUMMARY_FIELD_CHARS);
            match format_output(&result.output) {
                Some(output) => format!(
                    "ok ({}): {} | output: {}",
                    elapsed,
                    value,
                    truncate_chars(&normalize_whitespace(&output), SUMMARY_FIELD_CHARS)
                ),
                None => format!("ok ({}): {}", elapsed, value),
            }
        }
    }
}

/// Stringify a value for display: `nil` for absence, quoted text, literal
/// numbers and booleans, and bounded composite rendering.
pub fn format_value(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Nil) => "nil".to_string(),
        Some(Value::Text(s)) => format!("{:?}", s),
        Some(Value::List(items)) => bounded_sequence(items, "[", "]", "elements"),
        Some(Value::Tuple(items)) => bounded_sequence(items, "(", ")", "items"),
        Some(Value::Map(entries)) => {
            let mut rendered = String::from("{");
            for (i, (key, value)) in entries.iter().take(MAX_ITEMS).enumerate() {
                if i > 0 {
                    rendered.push_str(", ");
                }
                rendered.push_str(&format!("{:?}: {}", key, value.render_quoted()));
            }
            if entries.len() > MAX_ITEMS {
                rendered.push_str(&format!(", ... ({} keys)", entries.len()));
            }
            rendered.push('}');
            rendered
        }
        Some(scalar) => scalar.to_string(),
    }
}

fn bounded_sequence(items: &[Value], open: &str, close: &str, noun: &str) -> String {
    let mut rendered = String::from(open);
    for (i, item) in items.iter().take(MAX_ITEMS).enumerate() {
        if i > 0 {
            rendered.push_str(", ");
        }
        rendered.push_str(&item.render_quoted());
    }
    if items.len() > MAX_ITEMS {
        rendered.push_str(&format!(", ... ({} {})", items.len(), noun));
    }
    rendered.push_str(close);
    rendered
}

/// Trailing-trimmed output; blank output collapses to absent.
fn format_output(output: &str) -> Option<String> {
    let trimmed = output.trim_end();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Collapse whitespace runs to single spaces and trim the ends.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Human time rendering at coarse precision.
pub fn format_elapsed(elapsed_ms: u64) -> String {
    if elapsed_ms < 1 {
        "< 1ms".to_string()
    } else if elapsed_ms < 1_000 {
        format!("{}ms", elapsed_ms)
    } else if elapsed_ms < 60_000 {
        format!("{:.2}s", elapsed_ms as f64 / 1_000.0)
    } else {
        format!("{:.2}min", elapsed_ms as f64 / 60_000.0)
    }
}

fn truncate_chars(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        text.to_string()
    } else {
        let kept: String = text.chars().take(limit).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_types::{ClassifiedError, ErrorCategory};

    #[test]
    fn test_value_text_for_scalars() {
        assert_eq!(format_value(None), "nil");
        assert_eq!(format_value(Some(&Value::Nil)), "nil");
        assert_eq!(format_value(Some(&Value::Int(7))), "7");
        assert_eq!(format_value(Some(&Value::Bool(false))), "false");
        assert_eq!(format_value(Some(&Value::Text("hi".into()))), "\"hi\"");
    }

    #[test]
    fn test_short_list_is_not_truncated() {
        let list = Value::List(vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(format_value(Some(&list)), "[1, 2]");
    }

    #[test]
    fn test_long_list_is_bounded() {
        let list = Value::List((0..10).map(Value::Int).collect());
        assert_eq!(
            format_value(Some(&list)),
            "[0, 1, 2, 3, 4, ... (10 elements)]"
        );
    }

    #[test]
    fn test_long_map_reports_key_count() {
        let entries = (0..8)
            .map(|i| (format!("k{}", i), Value::Int(i)))
            .collect();
        let rendered = format_value(Some(&Value::Map(entries)));
        assert!(rendered.contains("... (8 keys)"), "got {}", rendered);
    }

    #[test]
    fn test_long_tuple_reports_item_count() {
        let tuple = Value::Tuple((0..9).map(Value::Int).collect());
        assert!(format_value(Some(&tuple)).contains("... (9 items)"));
    }

    #[test]
    fn test_output_trimming_and_collapse() {
        let result = ExecutionResult::success(Some(Value::Nil), "hi\n\n".to_string(), 1);
        assert_eq!(format(&result).output_text, Some("hi".to_string()));

        let blank = ExecutionResult::success(Some(Value::Nil), "  \n".to_string(), 1);
        assert_eq!(format(&blank).output_text, None);
    }

    #[test]
    fn test_error_text_is_normalized() {
        let error = ClassifiedError::new(ErrorCategory::Syntax, "line 1:   bad\n\ttoken");
        let result = ExecutionResult::failure(error, String::new(), 1);
        let display = format(&result);
        assert!(!display.success);
        let text = display.error_text.unwrap();
        assert!(!text.contains('\n'));
        assert!(!text.contains("  "));
    }

    #[test]
    fn test_elapsed_rendering() {
        assert_eq!(format_elapsed(0), "< 1ms");
        assert_eq!(format_elapsed(1), "1ms");
        assert_eq!(format_elapsed(999), "999ms");
        assert_eq!(format_elapsed(1_500), "1.50s");
        assert_eq!(format_elapsed(59_999), "60.00s");
        assert_eq!(format_elapsed(90_000), "1.50min");
    }

    #[test]
    fn test_summary_success() {
        let result =
            ExecutionResult::success(Some(Value::Int(4)), "done\n".to_string(), 12);
        assert_eq!(summary(&result), "ok (12ms): 4 | output: done");
    }

    #[test]
    fn test_summary_failure() {
        let error = ClassifiedError::new(ErrorCategory::Arithmetic, "division by zero");
        let result = ExecutionResult::failure(error, String::new(), 3);
        let line = summary(&result);
        assert!(line.starts_with("failed (3ms):"));
        assert!(line.contains("division by zero"));
    }

    #[test]
    fn test_summary_fields_are_truncated() {
        let long = "x".repeat(500);
        let result = ExecutionResult::success(Some(Value::Text(long)), String::new(), 1);
        let line = summary(&result);
        assert!(line.len() < 150, "summary too long: {} chars", line.len());
    }
}
