//! Evaluation of single match expressions against feature values

use regex::Regex;

use crate::error::{ExpressionError, ExpressionResult};
use crate::specification::{MatchExpression, MatchOp};

impl MatchExpression {
    /// Check operator arity and operand syntax without evaluating
    pub fn validate(&self) -> ExpressionResult<()> {
        let count = self.value.len();
        let arity = |expected: &str| ExpressionError::InvalidArity {
            op: self.op.to_string(),
            expected: expected.to_string(),
            actual: count,
        };

        match self.op {
            MatchOp::In | MatchOp::NotIn => {
                if count == 0 {
                    return Err(arity("at least 1"));
                }
            }
            MatchOp::InRegexp => {
                if count == 0 {
                    return Err(arity("at least 1"));
                }
                self.regexes()?;
            }
            MatchOp::Exists | MatchOp::DoesNotExist | MatchOp::IsTrue | MatchOp::IsFalse => {
                if count != 0 {
                    return Err(arity("0"));
                }
            }
            MatchOp::Gt | MatchOp::Lt => {
                if count != 1 {
                    return Err(arity("exactly 1"));
                }
                self.operand(0)?;
            }
            MatchOp::GtLt => {
                if count != 2 {
                    return Err(arity("exactly 2"));
                }
                let (lower, upper) = (self.operand(0)?, self.operand(1)?);
                if lower >= upper {
                    return Err(ExpressionError::InvalidRange { lower, upper });
                }
            }
        }
        Ok(())
    }

    /// Evaluate against an element that may be absent (`None`)
    pub fn matches(&self, value: Option<&str>) -> ExpressionResult<bool> {
        self.validate()?;

        let Some(value) = value else {
            return Ok(self.op == MatchOp::DoesNotExist);
        };

        let matched = match self.op {
            MatchOp::Exists => true,
            MatchOp::DoesNotExist => false,
            MatchOp::In => self.value.iter().any(|v| v == value),
            MatchOp::NotIn => !self.value.iter().any(|v| v == value),
            MatchOp::InRegexp => self.regexes()?.iter().any(|re| re.is_match(value)),
            MatchOp::Gt => parse_node_int(value).is_some_and(|v| v > self.operand_unchecked(0)),
            MatchOp::Lt => parse_node_int(value).is_some_and(|v| v < self.operand_unchecked(0)),
            MatchOp::GtLt => parse_node_int(value).is_some_and(|v| {
                v > self.operand_unchecked(0) && v < self.operand_unchecked(1)
            }),
            MatchOp::IsTrue => value == "true",
            MatchOp::IsFalse => value == "false",
        };
        Ok(matched)
    }

    fn regexes(&self) -> ExpressionResult<Vec<Regex>> {
        self.value
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| ExpressionError::InvalidRegex {
                    pattern: pattern.clone(),
                    details: e.to_string(),
                })
            })
            .collect()
    }

    fn operand(&self, index: usize) -> ExpressionResult<i64> {
        let raw = &self.value[index];
        raw.trim().parse().map_err(|_| ExpressionError::NotANumber {
            op: self.op.to_string(),
            value: raw.clone(),
        })
    }

    // Only called after validate() succeeded.
    fn operand_unchecked(&self, index: usize) -> i64 {
        self.operand(index).unwrap_or_default()
    }
}

fn parse_node_int(value: &str) -> Option<i64> {
    value.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expr(op: MatchOp, value: &[&str]) -> MatchExpression {
        MatchExpression::new(op, value)
    }

    #[test]
    fn test_set_membership_ops() {
        let in_expr = expr(MatchOp::In, &["10de", "1002"]);
        assert!(in_expr.matches(Some("10de")).unwrap());
        assert!(!in_expr.matches(Some("8086")).unwrap());
        assert!(!in_expr.matches(None).unwrap());

        let not_in = expr(MatchOp::NotIn, &["8086"]);
        assert!(not_in.matches(Some("10de")).unwrap());
        assert!(!not_in.matches(Some("8086")).unwrap());
        assert!(!not_in.matches(None).unwrap());
    }

    #[test]
    fn test_existence_ops() {
        assert!(expr(MatchOp::Exists, &[]).matches(Some("")).unwrap());
        assert!(!expr(MatchOp::Exists, &[]).matches(None).unwrap());
        assert!(expr(MatchOp::DoesNotExist, &[]).matches(None).unwrap());
        assert!(!expr(MatchOp::DoesNotExist, &[]).matches(Some("x")).unwrap());
    }

    #[test]
    fn test_regexp_op() {
        let re = expr(MatchOp::InRegexp, &["^5\\.", "^6\\.[0-9]+"]);
        assert!(re.matches(Some("6.8.0-45-generic")).unwrap());
        assert!(!re.matches(Some("4.19.0")).unwrap());

        let err = expr(MatchOp::InRegexp, &["("]).matches(Some("x")).unwrap_err();
        assert!(matches!(err, ExpressionError::InvalidRegex { .. }));
    }

    #[test]
    fn test_numeric_ops() {
        assert!(expr(MatchOp::Gt, &["4"]).matches(Some("5")).unwrap());
        assert!(!expr(MatchOp::Gt, &["5"]).matches(Some("5")).unwrap());
        assert!(expr(MatchOp::Lt, &["10"]).matches(Some("-1")).unwrap());
        assert!(expr(MatchOp::GtLt, &["1", "10"]).matches(Some("5")).unwrap());
        assert!(!expr(MatchOp::GtLt, &["1", "10"]).matches(Some("10")).unwrap());

        // Non-numeric node values never match.
        assert!(!expr(MatchOp::Gt, &["1"]).matches(Some("abc")).unwrap());
    }

    #[test]
    fn test_boolean_ops() {
        assert!(expr(MatchOp::IsTrue, &[]).matches(Some("true")).unwrap());
        assert!(!expr(MatchOp::IsTrue, &[]).matches(Some("false")).unwrap());
        assert!(expr(MatchOp::IsFalse, &[]).matches(Some("false")).unwrap());
    }

    #[test]
    fn test_malformed_expressions_are_errors() {
        assert!(matches!(
            expr(MatchOp::In, &[]).validate(),
            Err(ExpressionError::InvalidArity { .. })
        ));
        assert!(matches!(
            expr(MatchOp::Exists, &["x"]).validate(),
            Err(ExpressionError::InvalidArity { .. })
        ));
        assert!(matches!(
            expr(MatchOp::Gt, &["ten"]).validate(),
            Err(ExpressionError::NotANumber { .. })
        ));
        assert_eq!(
            expr(MatchOp::GtLt, &["10", "1"]).validate(),
            Err(ExpressionError::InvalidRange {
                lower: 10,
                upper: 1
            })
        );
        // Validation happens even when the element is absent.
        assert!(expr(MatchOp::Lt, &["1", "2"]).matches(None).is_err());
    }
}
