//! # Label Selectors
//!
//! Evaluation of [`LabelSelector`]s against resource labels and their
//! rendering to the Kubernetes list query syntax.
//!
//! An absent or empty selector selects everything. Composition is the
//! conjunction of all requirements, so two `matchLabels` disagreeing on a
//! key select nothing.

use crate::controller::reconciler::ReconcilerError;
use crate::crd::LabelSelector;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Equals,
    In,
    NotIn,
    Exists,
    DoesNotExist,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    key: String,
    operator: Operator,
    values: Vec<String>,
}

impl Requirement {
    fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        let value = labels.get(&self.key);
        match self.operator {
            Operator::Equals | Operator::In => value.is_some_and(|v| self.values.contains(v)),
            Operator::NotIn => value.is_none_or(|v| !self.values.contains(v)),
            Operator::Exists => value.is_some(),
            Operator::DoesNotExist => value.is_none(),
        }
    }

    fn to_query(&self) -> String {
        match self.operator {
            Operator::Equals => format!("{}={}", self.key, self.values.join("")),
            Operator::In => format!("{} in ({})", self.key, self.values.join(",")),
            Operator::NotIn => format!("{} notin ({})", self.key, self.values.join(",")),
            Operator::Exists => self.key.clone(),
            Operator::DoesNotExist => format!("!{}", self.key),
        }
    }
}

/// Parsed, validated label selector
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selector {
    requirements: Vec<Requirement>,
}

impl Selector {
    /// Selector matching every resource
    #[must_use]
    pub fn everything() -> Self {
        Self::default()
    }

    /// Parse an optional selector. `None` selects everything.
    pub fn parse(selector: Option<&LabelSelector>) -> Result<Self, ReconcilerError> {
        let Some(selector) = selector else {
            return Ok(Self::everything());
        };

        let mut requirements = Vec::new();
        for (key, value) in &selector.match_labels {
            validate_key(key)?;
            requirements.push(Requirement {
                key: key.clone(),
                operator: Operator::Equals,
                values: vec![value.clone()],
            });
        }

        for expression in &selector.match_expressions {
            validate_key(&expression.key)?;
            let operator = match expression.operator.as_str() {
                "In" => Operator::In,
                "NotIn" => Operator::NotIn,
                "Exists" => Operator::Exists,
                "DoesNotExist" => Operator::DoesNotExist,
                other => {
                    return Err(ReconcilerError::SelectorInvalid(format!(
                        "unsupported operator {other:?} for key {:?}",
                        expression.key
                    )))
                }
            };
            let needs_values = matches!(operator, Operator::In | Operator::NotIn);
            if needs_values == expression.values.is_empty() {
                return Err(ReconcilerError::SelectorInvalid(if needs_values {
                    format!("operator {operator:?} on key {:?} requires values", expression.key)
                } else {
                    format!("operator {operator:?} on key {:?} takes no values", expression.key)
                }));
            }
            requirements.push(Requirement {
                key: expression.key.clone(),
                operator,
                values: expression.values.clone(),
            });
        }

        Ok(Self { requirements })
    }

    /// Conjunction of both selectors
    #[must_use]
    pub fn and(mut self, other: &Selector) -> Self {
        self.requirements.extend(other.requirements.iter().cloned());
        self
    }

    #[must_use]
    pub fn is_everything(&self) -> bool {
        self.requirements.is_empty()
    }

    /// Whether `labels` satisfy every requirement
    #[must_use]
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.requirements.iter().all(|r| r.matches(labels))
    }

    /// Kubernetes label selector query, empty for "everything"
    #[must_use]
    pub fn to_query(&self) -> String {
        self.requirements
            .iter()
            .map(Requirement::to_query)
            .collect::<Vec<_>>()
            .join(",")
    }
}

fn validate_key(key: &str) -> Result<(), ReconcilerError> {
    if key.is_empty() || key.chars().any(char::is_whitespace) {
        return Err(ReconcilerError::SelectorInvalid(format!(
            "invalid label key {key:?}"
        )));
    }
    Ok(())
}

/// Whether `labels` satisfy `selector`; malformed selectors match nothing
#[must_use]
pub fn matches(labels: Option<&BTreeMap<String, String>>, selector: Option<&LabelSelector>) -> bool {
    let empty = BTreeMap::new();
    Selector::parse(selector).is_ok_and(|s| s.matches(labels.unwrap_or(&empty)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::LabelSelectorRequirement;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    fn expression(key: &str, operator: &str, values: &[&str]) -> LabelSelector {
        LabelSelector {
            match_labels: BTreeMap::new(),
            match_expressions: vec![LabelSelectorRequirement {
                key: key.to_string(),
                operator: operator.to_string(),
                values: values.iter().map(|v| (*v).to_string()).collect(),
            }],
        }
    }

    #[test]
    fn test_absent_and_empty_selectors_match_everything() {
        let l = labels(&[("app", "web")]);
        assert!(matches(Some(&l), None));
        assert!(matches(Some(&l), Some(&LabelSelector::default())));
        assert!(matches(None, None));
    }

    #[test]
    fn test_match_labels_require_every_pair() {
        let selector = LabelSelector::from_labels([("instance", "x"), ("org", "o")]);
        assert!(matches(
            Some(&labels(&[("instance", "x"), ("org", "o"), ("extra", "1")])),
            Some(&selector)
        ));
        assert!(!matches(Some(&labels(&[("instance", "x")])), Some(&selector)));
        assert!(!matches(None, Some(&selector)));
    }

    #[test]
    fn test_expressions() {
        let l = labels(&[("tier", "gold")]);
        assert!(matches(Some(&l), Some(&expression("tier", "In", &["gold", "silver"]))));
        assert!(!matches(Some(&l), Some(&expression("tier", "NotIn", &["gold"]))));
        assert!(matches(Some(&l), Some(&expression("zone", "NotIn", &["a"]))));
        assert!(matches(Some(&l), Some(&expression("tier", "Exists", &[]))));
        assert!(matches(Some(&l), Some(&expression("zone", "DoesNotExist", &[]))));
    }

    #[test]
    fn test_malformed_selectors_are_rejected() {
        for selector in [
            expression("tier", "Near", &["x"]),
            expression("tier", "In", &[]),
            expression("tier", "Exists", &["x"]),
            expression("", "Exists", &[]),
        ] {
            assert!(matches!(
                Selector::parse(Some(&selector)),
                Err(ReconcilerError::SelectorInvalid(_))
            ));
            assert!(!matches(Some(&labels(&[("tier", "x")])), Some(&selector)));
        }
    }

    #[test]
    fn test_conjunction_of_conflicting_labels_matches_nothing() {
        let a = Selector::parse(Some(&LabelSelector::from_labels([("env", "dev")]))).unwrap();
        let b = Selector::parse(Some(&LabelSelector::from_labels([("env", "prod")]))).unwrap();
        let both = a.and(&b);
        assert!(!both.matches(&labels(&[("env", "dev")])));
        assert!(!both.matches(&labels(&[("env", "prod")])));
    }

    #[test]
    fn test_query_rendering() {
        let selector = LabelSelector {
            match_labels: BTreeMap::from([("app".to_string(), "web".to_string())]),
            match_expressions: vec![
                LabelSelectorRequirement {
                    key: "tier".to_string(),
                    operator: "In".to_string(),
                    values: vec!["a".to_string(), "b".to_string()],
                },
                LabelSelectorRequirement {
                    key: "legacy".to_string(),
                    operator: "DoesNotExist".to_string(),
                    values: Vec::new(),
                },
            ],
        };
        let parsed = Selector::parse(Some(&selector)).unwrap();
        assert_eq!(parsed.to_query(), "app=web,tier in (a,b),!legacy");
        assert_eq!(Selector::everything().to_query(), "");
    }
}
