//! Classification transition rules keyed by ROI label and current label

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

use super::grouper::ColorTable;
use super::types::AnnotateError;

/// What an ROI does to the classification of the nuclei inside it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transition {
    /// Keep the detection's own label
    Keep,
    /// Force a new label
    Relabel(String),
}

/// Current-label matcher that applies to any label not listed explicitly
pub const ANY_LABEL: &str = "*";

/// Transitions for one ROI label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RoiRule {
    /// Same transition whatever the nucleus is currently labeled
    Uniform(Transition),
    /// Transition chosen by the nucleus' current label, with `*` as fallback
    ByCurrent(IndexMap<String, Transition>),
}

impl RoiRule {
    fn lookup(&self, current_label: &str) -> Option<&Transition> {
        match self {
            RoiRule::Uniform(transition) => Some(transition),
            RoiRule::ByCurrent(by_current) => by_current
                .get(current_label)
                .or_else(|| by_current.get(ANY_LABEL)),
        }
    }

    fn transitions(&self) -> Box<dyn Iterator<Item = &Transition> + '_> {
        match self {
            RoiRule::Uniform(transition) => Box::new(std::iter::once(transition)),
            RoiRule::ByCurrent(by_current) => Box::new(by_current.values()),
        }
    }
}

/// Table of transitions keyed by (ROI label, current label)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleTable {
    rules: IndexMap<String, RoiRule>,
}

impl Default for RuleTable {
    fn default() -> Self {
        Self::from_iter([
            ("good", Transition::Keep),
            ("tum_to_str", Transition::Relabel("Connective".to_string())),
            ("tumepi_to_imm", Transition::Relabel("Inflammatory".to_string())),
        ])
    }
}

impl<S: Into<String>> FromIterator<(S, Transition)> for RuleTable {
    fn from_iter<I: IntoIterator<Item = (S, Transition)>>(iter: I) -> Self {
        Self {
            rules: iter
                .into_iter()
                .map(|(k, v)| (k.into(), RoiRule::Uniform(v)))
                .collect(),
        }
    }
}

impl RuleTable {
    /// Add a rule for nuclei labeled `current_label` inside ROIs labeled `roi_label`.
    ///
    /// `current_label` may be [`ANY_LABEL`]. A uniform rule already present for the
    /// ROI label becomes its `*` fallback.
    pub fn with_rule(
        mut self,
        roi_label: impl Into<String>,
        current_label: impl Into<String>,
        transition: Transition,
    ) -> Self {
        let entry = self
            .rules
            .entry(roi_label.into())
            .or_insert_with(|| RoiRule::ByCurrent(IndexMap::new()));
        if let RoiRule::Uniform(existing) = &*entry {
            let fallback = existing.clone();
            *entry = RoiRule::ByCurrent(IndexMap::from([(ANY_LABEL.to_string(), fallback)]));
        }
        if let RoiRule::ByCurrent(by_current) = &mut *entry {
            by_current.insert(current_label.into(), transition);
        }
        self
    }

    /// Final label for a nucleus labeled `current_label` inside an ROI labeled `roi_label`
    pub fn apply(&self, current_label: &str, roi_label: &str) -> Result<String, AnnotateError> {
        match self.transition(roi_label, current_label) {
            Some(Transition::Keep) => Ok(current_label.to_string()),
            Some(Transition::Relabel(target)) => Ok(target.clone()),
            None => Err(AnnotateError::UnknownTransition {
                current_label: current_label.to_string(),
                roi_label: roi_label.to_string(),
            }),
        }
    }

    pub fn transition(&self, roi_label: &str, current_label: &str) -> Option<&Transition> {
        self.rules.get(roi_label)?.lookup(current_label)
    }

    pub fn rule(&self, roi_label: &str) -> Option<&RoiRule> {
        self.rules.get(roi_label)
    }

    /// Configuration-time consistency check against the color table
    pub fn validate(&self, colors: &ColorTable) -> Result<(), ConfigError> {
        if self.rules.is_empty() {
            return Err(ConfigError::Invalid("rule table is empty".into()));
        }
        for (roi_label, rule) in &self.rules {
            if roi_label.is_empty() {
                return Err(ConfigError::Invalid("rule with empty ROI label".into()));
            }
            if let RoiRule::ByCurrent(by_current) = rule {
                if by_current.is_empty() {
                    return Err(ConfigError::Invalid(format!(
                        "rule '{}' has no transitions",
                        roi_label
                    )));
                }
                if by_current.keys().any(String::is_empty) {
                    return Err(ConfigError::Invalid(format!(
                        "rule '{}' has an empty current label",
                        roi_label
                    )));
                }
            }
            for transition in rule.transitions() {
                if let Transition::Relabel(target) = transition
                    && colors.get(target).is_none()
                {
                    return Err(ConfigError::Invalid(format!(
                        "rule '{}' relabels to '{}' which has no color",
                        roi_label, target
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
