//! Rule evaluation against a node's feature set

use crate::error::{CompatError, ExpressionError, ExpressionResult, Result};
use crate::features::{Feature, FeatureSet};
use crate::specification::{FeatureMatcherTerm, MatchExpression, MatchOp, Rule};

pub mod expression;

/// Outcome of evaluating one rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleOutcome {
    pub valid: bool,
}

/// Produces a pass/fail verdict for a rule
pub trait RuleEvaluator: Send + Sync {
    fn execute(&self, rule: &Rule, features: &FeatureSet) -> Result<RuleOutcome>;
}

/// Evaluates `matchFeatures`/`matchAny` rules built from match expressions
#[derive(Debug, Clone, Copy, Default)]
pub struct MatchExpressionEvaluator;

impl MatchExpressionEvaluator {
    pub fn new() -> Self {
        Self
    }
}

impl RuleEvaluator for MatchExpressionEvaluator {
    fn execute(&self, rule: &Rule, features: &FeatureSet) -> Result<RuleOutcome> {
        evaluate_rule(rule, features)
            .map(|valid| RuleOutcome { valid })
            .map_err(|e| CompatError::Evaluation {
                rule: rule.name.clone(),
                details: e.to_string(),
            })
    }
}

fn evaluate_rule(rule: &Rule, features: &FeatureSet) -> ExpressionResult<bool> {
    // Evaluate every term even after a miss so malformed rules always surface.
    let mut all_match = true;
    for term in &rule.match_features {
        all_match &= evaluate_term(term, features)?;
    }

    if rule.match_any.is_empty() {
        return Ok(all_match);
    }

    let mut any_match = false;
    for elem in &rule.match_any {
        let mut elem_match = true;
        for term in &elem.match_features {
            elem_match &= evaluate_term(term, features)?;
        }
        any_match |= elem_match;
    }
    Ok(all_match && any_match)
}

fn evaluate_term(term: &FeatureMatcherTerm, features: &FeatureSet) -> ExpressionResult<bool> {
    let feature = features
        .get(&term.feature)
        .ok_or_else(|| ExpressionError::FeatureNotFound {
            feature: term.feature.clone(),
        })?;

    for expression in term.match_expressions.values() {
        expression.validate()?;
    }
    if let Some(name_expr) = &term.match_name {
        name_expr.validate()?;
    }

    match feature {
        Feature::Flags(flags) => {
            let mut matched = true;
            for (key, expression) in &term.match_expressions {
                if !matches!(expression.op, MatchOp::Exists | MatchOp::DoesNotExist) {
                    return Err(ExpressionError::InvalidFlagOp {
                        op: expression.op.to_string(),
                        feature: term.feature.clone(),
                    });
                }
                let present = flags.contains(key).then_some("");
                matched &= expression.matches(present)?;
            }
            if let Some(name_expr) = &term.match_name {
                matched &= any_name_matches(flags.iter(), name_expr)?;
            }
            Ok(matched)
        }
        Feature::Attributes(attributes) => {
            let mut matched = true;
            for (key, expression) in &term.match_expressions {
                matched &= expression.matches(attributes.get(key).map(String::as_str))?;
            }
            if let Some(name_expr) = &term.match_name {
                matched &= any_name_matches(attributes.keys(), name_expr)?;
            }
            Ok(matched)
        }
        Feature::Instances(instances) => {
            if term.match_name.is_some() {
                return Err(ExpressionError::MatchNameOnInstances {
                    feature: term.feature.clone(),
                });
            }
            for instance in instances {
                let mut instance_match = true;
                for (key, expression) in &term.match_expressions {
                    instance_match &= expression.matches(instance.get(key).map(String::as_str))?;
                }
                if instance_match {
                    return Ok(true);
                }
            }
            Ok(false)
        }
    }
}

fn any_name_matches<'a, I>(names: I, expression: &MatchExpression) -> ExpressionResult<bool>
where
    I: IntoIterator<Item = &'a String>,
{
    for name in names {
        if expression.matches(Some(name.as_str()))? {
            return Ok(true);
        }
    }
    Ok(false)
}
