//! Line classification
//!
//! One trimmed line becomes one [`Statement`]. Rules are applied in order:
//! comment, assignment, conversion, plain expression.

use crate::error::{EngineError, Result};
use regex::Regex;

const BAD_CONVERSION: &str = "Bad convert syntax. Use: expr -> unit";

/// A classified line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    Comment(String),
    /// `name = expr`, optionally `name = expr -> unit`
    Assignment {
        name: String,
        expr: String,
        target: Option<String>,
    },
    Conversion {
        expr: String,
        target: String,
    },
    Expression(String),
}

/// Compiled line grammar
#[derive(Debug, Clone)]
pub struct LineClassifier {
    assignment: Regex,
    to_separator: Regex,
}

impl LineClassifier {
    pub fn new() -> Result<Self> {
        let assignment = Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)\s*=([^=].*)$")
            .map_err(|e| EngineError::parse(format!("Regex error: {}", e)))?;
        let to_separator = Regex::new(r"\sto\s")
            .map_err(|e| EngineError::parse(format!("Regex error: {}", e)))?;
        Ok(Self {
            assignment,
            to_separator,
        })
    }

    /// Classify a non-blank line; `None` for blank input
    pub fn classify(&self, line: &str) -> Option<Result<Statement>> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        Some(self.classify_trimmed(line))
    }

    fn classify_trimmed(&self, line: &str) -> Result<Statement> {
        if line.starts_with("//") || line.starts_with('#') {
            return Ok(Statement::Comment(line.to_string()));
        }

        if let Some(captures) = self.assignment.captures(line) {
            let name = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
            let rest = captures.get(2).map(|m| m.as_str().trim()).unwrap_or_default();
            if !name.is_empty() && !rest.is_empty() {
                let (expr, target) = match self.split_conversion(rest)? {
                    Some((expr, target)) => (expr, Some(target)),
                    None => (rest.to_string(), None),
                };
                return Ok(Statement::Assignment {
                    name: name.to_string(),
                    expr,
                    target,
                });
            }
        }

        match self.split_conversion(line)? {
            Some((expr, target)) => Ok(Statement::Conversion { expr, target }),
            None => Ok(Statement::Expression(line.to_string())),
        }
    }

    /// Split at the last `->` or whitespace-delimited `to`
    ///
    /// `Ok(None)` when the text carries no separator at all.
    pub fn split_conversion(&self, text: &str) -> Result<Option<(String, String)>> {
        let arrow = text.rfind("->").map(|start| (start, start + 2));
        let word = self
            .to_separator
            .find_iter(text)
            .last()
            .map(|m| (m.start(), m.end()));

        let (start, end) = match (arrow, word) {
            (None, None) => return Ok(None),
            (Some(a), None) => a,
            (None, Some(w)) => w,
            (Some(a), Some(w)) => {
                if a.0 > w.0 {
                    a
                } else {
                    w
                }
            }
        };

        let expr = text[..start].trim();
        let target = text[end..].trim();
        if expr.is_empty() || target.is_empty() {
            return Err(EngineError::parse(BAD_CONVERSION));
        }
        Ok(Some((expr.to_string(), target.to_string())))
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;

    fn classify(line: &str) -> Statement {
        LineClassifier::new().unwrap().classify(line).unwrap().unwrap()
    }

    #[test]
    fn test_blank_lines_produce_nothing() {
        let classifier = LineClassifier::new().unwrap();
        assert!(classifier.classify("   ").is_none());
        assert!(classifier.classify("").is_none());
    }

    #[test]
    fn test_comments() {
        assert_eq!(classify("// note"), Statement::Comment("// note".into()));
        assert_eq!(classify("# heading"), Statement::Comment("# heading".into()));
    }

    #[test]
    fn test_assignment() {
        assert_eq!(
            classify("mass = 2 lb"),
            Statement::Assignment {
                name: "mass".into(),
                expr: "2 lb".into(),
                target: None,
            }
        );
        assert_eq!(
            classify("x=1"),
            Statement::Assignment {
                name: "x".into(),
                expr: "1".into(),
                target: None,
            }
        );
    }

    #[test]
    fn test_equality_is_not_assignment() {
        assert_eq!(classify("a == b"), Statement::Expression("a == b".into()));
    }

    #[test]
    fn test_assignment_with_conversion() {
        assert_eq!(
            classify("d = 5 m to ft"),
            Statement::Assignment {
                name: "d".into(),
                expr: "5 m".into(),
                target: Some("ft".into()),
            }
        );
    }

    #[test]
    fn test_conversion_separators() {
        assert_eq!(
            classify("72 km/h to m/s"),
            Statement::Conversion {
                expr: "72 km/h".into(),
                target: "m/s".into(),
            }
        );
        assert_eq!(
            classify("flow -> ft^3/min"),
            Statement::Conversion {
                expr: "flow".into(),
                target: "ft^3/min".into(),
            }
        );
    }

    #[test]
    fn test_conversion_splits_at_last_separator() {
        assert_eq!(
            classify("a to b -> c"),
            Statement::Conversion {
                expr: "a to b".into(),
                target: "c".into(),
            }
        );
    }

    #[test]
    fn test_bad_conversion_syntax() {
        let classifier = LineClassifier::new().unwrap();
        let err = classifier.classify("-> m").unwrap().unwrap_err();
        assert_eq!(err.to_string(), BAD_CONVERSION);
        assert!(classifier.classify("5 m ->").unwrap().is_err());
    }

    #[test]
    fn test_identifier_containing_to_is_expression() {
        assert_eq!(
            classify("total + toe"),
            Statement::Expression("total + toe".into())
        );
    }
}
