//! Compatibility specification document model
//!
//! The document is published as a YAML layer of an OCI artifact attached to
//! an image. Field names follow the camelCase convention of the published
//! format.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{CompatError, Result};

/// Root document: an ordered list of compatibility groups
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompatibilitySpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default)]
    pub compatibilities: Vec<CompatibilityGroup>,
}

impl CompatibilitySpec {
    /// Decode a specification from YAML (JSON is accepted as a YAML subset)
    pub fn from_yaml(data: &[u8]) -> Result<Self> {
        serde_yaml::from_slice(data).map_err(|e| CompatError::SpecDecode {
            details: e.to_string(),
        })
    }

    /// Total number of rules across all groups
    pub fn rule_count(&self) -> usize {
        self.compatibilities.iter().map(|g| g.rules.len()).sum()
    }
}

/// A tagged bundle of rules
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompatibilityGroup {
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub rules: Vec<Rule>,
}

/// A named predicate over the node's feature set
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    pub name: String,
    /// Every term must match
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub match_features: Vec<FeatureMatcherTerm>,
    /// When non-empty, at least one element must match
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub match_any: Vec<MatchAnyElem>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchAnyElem {
    pub match_features: Vec<FeatureMatcherTerm>,
}

/// Matches one feature, referenced by its qualified `<source>.<feature>` name
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureMatcherTerm {
    pub feature: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub match_expressions: BTreeMap<String, MatchExpression>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_name: Option<MatchExpression>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchExpression {
    pub op: MatchOp,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub value: Vec<String>,
}

impl MatchExpression {
    pub fn new(op: MatchOp, value: &[&str]) -> Self {
        Self {
            op,
            value: value.iter().map(|v| v.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchOp {
    In,
    NotIn,
    InRegexp,
    Exists,
    DoesNotExist,
    Gt,
    Lt,
    GtLt,
    IsTrue,
    IsFalse,
}

impl std::fmt::Display for MatchOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            MatchOp::In => "In",
            MatchOp::NotIn => "NotIn",
            MatchOp::InRegexp => "InRegexp",
            MatchOp::Exists => "Exists",
            MatchOp::DoesNotExist => "DoesNotExist",
            MatchOp::Gt => "Gt",
            MatchOp::Lt => "Lt",
            MatchOp::GtLt => "GtLt",
            MatchOp::IsTrue => "IsTrue",
            MatchOp::IsFalse => "IsFalse",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPEC_YAML: &str = r#"
version: v1alpha1
compatibilities:
  - tags: ["gpu"]
    description: GPU nodes
    rules:
      - name: has-gpu
        matchFeatures:
          - feature: pci.device
            matchExpressions:
              vendor: {op: In, value: ["10de"]}
  - rules:
      - name: min-memory
        matchAny:
          - matchFeatures:
              - feature: memory.numa
                matchName: {op: Exists}
"#;

    #[test]
    fn test_decode_specification() {
        let spec = CompatibilitySpec::from_yaml(SPEC_YAML.as_bytes()).unwrap();

        assert_eq!(spec.version.as_deref(), Some("v1alpha1"));
        assert_eq!(spec.compatibilities.len(), 2);
        assert_eq!(spec.rule_count(), 2);

        let gpu = &spec.compatibilities[0];
        assert_eq!(gpu.tags, vec!["gpu".to_string()]);
        assert_eq!(gpu.rules[0].name, "has-gpu");
        let term = &gpu.rules[0].match_features[0];
        assert_eq!(term.feature, "pci.device");
        assert_eq!(
            term.match_expressions["vendor"],
            MatchExpression::new(MatchOp::In, &["10de"])
        );

        let untagged = &spec.compatibilities[1];
        assert!(untagged.tags.is_empty());
        assert_eq!(
            untagged.rules[0].match_any[0].match_features[0].match_name,
            Some(MatchExpression::new(MatchOp::Exists, &[]))
        );
    }

    #[test]
    fn test_decode_rejects_unknown_operator() {
        let yaml = r#"
compatibilities:
  - rules:
      - name: broken
        matchFeatures:
          - feature: kernel.version
            matchExpressions:
              major: {op: Between, value: ["1"]}
"#;
        let err = CompatibilitySpec::from_yaml(yaml.as_bytes()).unwrap_err();
        assert!(matches!(err, CompatError::SpecDecode { .. }));
    }

    #[test]
    fn test_decode_empty_document() {
        let spec = CompatibilitySpec::from_yaml(b"compatibilities: []").unwrap();
        assert!(spec.compatibilities.is_empty());
        assert_eq!(spec.rule_count(), 0);
    }
}
