//! Runtime value model for evaluated snippets.
//!
//! Values are immutable once constructed; every operation that "modifies" a
//! collection builds a new one, which keeps memory accounting honest (each
//! construction is charged against the invocation's byte budget).

use serde::{Deserialize, Serialize};
use std::fmt;

/// The dynamic value a snippet evaluates to. Maps preserve insertion order
/// and are keyed by text only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<Value>),
    Tuple(Vec<Value>),
    Map(Vec<(String, Value)>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
            Value::Map(_) => "map",
        }
    }

    /// Everything is truthy except `nil` and `false`.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }

    /// Approximate shallow heap cost of this value, used for the memory
    /// budget. Children are charged when they are constructed, so only the
    /// container overhead counts here.
    pub fn shallow_bytes(&self) -> usize {
        match self {
            Value::Nil | Value::Bool(_) | Value::Int(_) | Value::Float(_) => 16,
            Value::Text(s) => 24 + s.len(),
            Value::List(items) | Value::Tuple(items) => 24 + 16 * items.len(),
            Value::Map(entries) => {
                24 + entries.iter().map(|(k, _)| 48 + k.len()).sum::<usize>()
            }
        }
    }

    /// Full heap cost of this value including every nested child. Used when
    /// a value is duplicated wholesale (a variable read clones it), so
    /// aliasing a large collection is charged like building it again.
    pub fn deep_bytes(&self) -> usize {
        match self {
            Value::List(items) | Value::Tuple(items) => {
                24 + items.iter().map(Value::deep_bytes).sum::<usize>()
            }
            Value::Map(entries) => {
                24 + entries
                    .iter()
                    .map(|(k, v)| 48 + k.len() + v.deep_bytes())
                    .sum::<usize>()
            }
            _ => self.shallow_bytes(),
        }
    }

    /// Quoted rendering: text appears with quotes and escapes, the form used
    /// for elements nested inside collections.
    pub fn render_quoted(&self) -> String {
        match self {
            Value::Text(s) => format!("{:?}", s),
            _ => self.to_string(),
        }
    }
}

impl fmt::Display for Value {
    /// Plain rendering: top-level text is unquoted (this is what `output`
    /// prints and what grading compares against); nested text is quoted.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(x) => write!(f, "{:?}", x),
            Value::Text(s) => write!(f, "{}", s),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item.render_quoted())?;
                }
                write!(f, "]")
            }
            Value::Tuple(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item.render_quoted())?;
                }
                write!(f, ")")
            }
            Value::Map(entries) => {
                write!(f, "{{")?;
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{:?}: {}", key, value.render_quoted())?;
                }
                write!(f, "}}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_rendering() {
        assert_eq!(Value::Nil.to_string(), "nil");
        assert_eq!(Value::Int(42).to_string(), "42");
        assert_eq!(Value::Float(3.0).to_string(), "3.0");
        assert_eq!(Value::Bool(true).to_string(), "true");
        assert_eq!(Value::Text("hi".into()).to_string(), "hi");
    }

    #[test]
    fn test_nested_text_is_quoted() {
        let list = Value::List(vec![Value::Int(1), Value::Text("a".into())]);
        assert_eq!(list.to_string(), "[1, \"a\"]");
        let map = Value::Map(vec![("k".into(), Value::Text("v".into()))]);
        assert_eq!(map.to_string(), "{\"k\": \"v\"}");
        let tuple = Value::Tuple(vec![Value::Text("x".into()), Value::Int(2)]);
        assert_eq!(tuple.to_string(), "(\"x\", 2)");
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::Nil.is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(Value::Int(0).is_truthy());
        assert!(Value::Text(String::new()).is_truthy());
    }

    #[test]
    fn test_shallow_bytes_scale_with_size() {
        let small = Value::List(vec![Value::Int(1)]);
        let large = Value::List(vec![Value::Int(1); 100]);
        assert!(large.shallow_bytes() > small.shallow_bytes());
    }

    #[test]
    fn test_deep_bytes_count_nested_children() {
        let inner = Value::List(vec![Value::Int(1); 100]);
        let outer = Value::List(vec![inner.clone(), inner.clone()]);
        // The shallow view sees two slots; the deep view sees both copies.
        assert_eq!(outer.shallow_bytes(), 24 + 16 * 2);
        assert!(outer.deep_bytes() >= 2 * inner.deep_bytes());
    }
}
