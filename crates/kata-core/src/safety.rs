//! Static deny-list gate applied before any execution is attempted.
//!
//! The rule set is data, not control flow: an ordered table of
//! (pattern, category, label) entries scanned uniformly over the raw source.
//! Any match rejects the whole submission. The design is deliberately
//! coarse and false-positive-tolerant; the interpreter itself has none of
//! these capabilities, so the gate is a second, independent layer that stays
//! correct even as lesson runtimes grow new builtins. This check never
//! raises: the outcome is always a [`SafetyCheck`] value.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core_types::{ClassifiedError, ErrorCategory};

/// Capability family a deny-list rule guards against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleCategory {
    Filesystem,
    Network,
    Process,
    DynamicEval,
    Concurrency,
    Shell,
}

/// One deny-list entry. Adding a rule is a data change in [`RULES`].
#[derive(Debug)]
pub struct SafetyRule {
    pub pattern: Regex,
    pub category: RuleCategory,
    pub label: &'static str,
}

fn rule(pattern: &str, category: RuleCategory, label: &'static str) -> SafetyRule {
    SafetyRule {
        pattern: Regex::new(pattern).expect("deny-list pattern must compile"),
        category,
        label,
    }
}

/// Ordered deny-list. Patterns are case-insensitive and anchored on word
/// boundaries so plain arithmetic, text and collection code sails through.
static RULES: Lazy<Vec<SafetyRule>> = Lazy::new(|| {
    vec![
        rule(
            r"(?i)\b(open_file|read_file|write_file|remove_file|delete_file|list_dir|mkdir)\s*\(",
            RuleCategory::Filesystem,
            "filesystem access",
        ),
        rule(
            r"(?i)\bfile\s*\.",
            RuleCategory::Filesystem,
            "filesystem access",
        ),
        rule(
            r"(?i)\b(http_get|http_post|tcp_connect|udp_send|socket|download)\s*\(",
            RuleCategory::Network,
            "network access",
        ),
        rule(
            r"(?i)\b(spawn_process|run_command|exec|system|popen)\s*\(",
            RuleCategory::Process,
            "process execution",
        ),
        rule(
            r"(?i)\b(eval|compile_code|load_module|load_code)\s*\(",
            RuleCategory::DynamicEval,
            "dynamic code loading",
        ),
        rule(
            r"(?i)\b(spawn|start_worker|start_agent|start_supervisor)\s*\(",
            RuleCategory::Concurrency,
            "spawning concurrent workers",
        ),
        rule(
            r"(?i)\b(global_registry|shared_table|global_put|global_get)\b",
            RuleCategory::Concurrency,
            "shared mutable registries",
        ),
        rule("`", RuleCategory::Shell, "shell command execution"),
        rule(
            r"(?i)\b(sh|bash|cmd)\s+-c\b",
            RuleCategory::Shell,
            "shell command execution",
        ),
    ]
});

/// Details of a rejected submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyViolation {
    pub category: RuleCategory,
    pub label: String,
    /// The text fragment that triggered the rule.
    pub matched: String,
}

impl SafetyViolation {
    /// Fold the rejection into the sandbox's error taxonomy so callers can
    /// treat it uniformly with execution faults.
    pub fn to_classified(&self) -> ClassifiedError {
        ClassifiedError::new(
            ErrorCategory::DangerousCode,
            format!("use of {} is not allowed in submissions", self.label),
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SafetyCheck {
    Ok,
    Reject(SafetyViolation),
}

impl SafetyCheck {
    pub fn is_ok(&self) -> bool {
        matches!(self, SafetyCheck::Ok)
    }
}

/// The pre-execution gate. Stateless; the rule table is shared.
#[derive(Debug, Default, Clone, Copy)]
pub struct SafetyGate;

impl SafetyGate {
    pub fn new() -> Self {
        Self
    }

    /// Scan the raw source against every rule, first match wins. Rejections
    /// are logged with the full source for audit.
    pub fn check(&self, source: &str) -> SafetyCheck {
        for rule in RULES.iter() {
            if let Some(found) = rule.pattern.find(source) {
                log::warn!(
                    "safety gate rejected submission ({}), source: {:?}",
                    rule.label,
                    source
                );
                return SafetyCheck::Reject(SafetyViolation {
                    category: rule.category,
                    label: rule.label.to_string(),
                    matched: found.as_str().to_string(),
                });
            }
        }
        SafetyCheck::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reject_category(source: &str) -> RuleCategory {
        match SafetyGate::new().check(source) {
            SafetyCheck::Reject(violation) => violation.category,
            SafetyCheck::Ok => panic!("expected rejection for {:?}", source),
        }
    }

    #[test]
    fn test_all_patterns_compile() {
        assert!(!RULES.is_empty());
    }

    #[test]
    fn test_safe_corpus_passes() {
        let gate = SafetyGate::new();
        let safe = [
            "1 + 1",
            "let total = 2 * 21\noutput(total)",
            "fn add(a, b) { a + b }\nadd(1, 2)",
            "upper(\"hello\") + \" world\"",
            "let xs = [1, 2, 3]\nlen(xs)",
            "{\"name\": \"ada\", \"age\": 36}",
            "let s = trim(\"  data  \")\ncontains(s, \"at\")",
            // Mentions that merely resemble blocked names must not trip.
            "let filed = 1\nlet executive = 2\nfiled + executive",
        ];
        for source in safe {
            assert!(gate.check(source).is_ok(), "false positive on {:?}", source);
        }
    }

    #[test]
    fn test_filesystem_rules() {
        assert_eq!(reject_category("read_file(\"/etc/passwd\")"), RuleCategory::Filesystem);
        assert_eq!(reject_category("File.delete(path)"), RuleCategory::Filesystem);
    }

    #[test]
    fn test_network_rules() {
        assert_eq!(reject_category("http_get(\"http://x\")"), RuleCategory::Network);
        assert_eq!(reject_category("socket(80)"), RuleCategory::Network);
    }

    #[test]
    fn test_process_rules() {
        assert_eq!(reject_category("system(\"rm -rf /\")"), RuleCategory::Process);
        assert_eq!(reject_category("exec(cmd)"), RuleCategory::Process);
    }

    #[test]
    fn test_dynamic_eval_rules() {
        assert_eq!(reject_category("eval(code)"), RuleCategory::DynamicEval);
        assert_eq!(reject_category("load_module(\"m\")"), RuleCategory::DynamicEval);
    }

    #[test]
    fn test_concurrency_rules() {
        assert_eq!(reject_category("spawn(worker)"), RuleCategory::Concurrency);
        assert_eq!(reject_category("global_put(\"k\", 1)"), RuleCategory::Concurrency);
    }

    #[test]
    fn test_shell_rules() {
        assert_eq!(reject_category("`ls -la`"), RuleCategory::Shell);
        assert_eq!(reject_category("run it with sh -c something"), RuleCategory::Shell);
    }

    #[test]
    fn test_case_insensitive_matching() {
        assert_eq!(reject_category("READ_FILE(x)"), RuleCategory::Filesystem);
    }

    #[test]
    fn test_violation_classifies_as_dangerous_code() {
        let gate = SafetyGate::new();
        match gate.check("eval(x)") {
            SafetyCheck::Reject(violation) => {
                let err = violation.to_classified();
                assert_eq!(err.category, ErrorCategory::DangerousCode);
                assert!(err.message.contains("dynamic code loading"));
            }
            SafetyCheck::Ok => panic!("expected rejection"),
        }
    }
}
