use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::SyncError;

/// A build-target pattern such as `//java/com/example:lib`, `//java/...` or `-//java/gen:all`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TargetExpression(String);

impl TargetExpression {
    pub fn from_string(expression: impl Into<String>) -> Result<Self, SyncError> {
        let expression = expression.into();
        let trimmed = expression.trim();
        if trimmed.is_empty() {
            return Err(SyncError::InvalidTargetExpression {
                expression,
                reason: "expression is empty",
            });
        }
        if trimmed.chars().any(char::is_whitespace) {
            return Err(SyncError::InvalidTargetExpression {
                expression,
                reason: "expression contains whitespace",
            });
        }
        if trimmed == "-" {
            return Err(SyncError::InvalidTargetExpression {
                expression,
                reason: "exclusion has no pattern",
            });
        }
        Ok(Self(trimmed.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this pattern removes targets from the scope (`-//foo:bar`).
    pub fn is_excluded(&self) -> bool {
        self.0.starts_with('-')
    }
}

impl TryFrom<String> for TargetExpression {
    type Error = SyncError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_string(value)
    }
}

impl From<TargetExpression> for String {
    fn from(value: TargetExpression) -> Self {
        value.0
    }
}

impl fmt::Display for TargetExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of one entry in the [`TargetMap`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetKey {
    label: String,
}

impl TargetKey {
    pub fn for_label(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl fmt::Display for TargetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

/// IDE-facing information about one target, as produced by the build tool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetIdeInfo {
    pub kind: String,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub deps: BTreeSet<TargetKey>,
}

/// The reconciled build graph known to the IDE.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetMap {
    targets: BTreeMap<TargetKey, TargetIdeInfo>,
}

impl TargetMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn get(&self, key: &TargetKey) -> Option<&TargetIdeInfo> {
        self.targets.get(key)
    }

    pub fn contains(&self, key: &TargetKey) -> bool {
        self.targets.contains_key(key)
    }

    pub fn insert(&mut self, key: TargetKey, info: TargetIdeInfo) -> Option<TargetIdeInfo> {
        self.targets.insert(key, info)
    }

    pub fn keys(&self) -> impl Iterator<Item = &TargetKey> {
        self.targets.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TargetKey, &TargetIdeInfo)> {
        self.targets.iter()
    }

    /// Overlay `newer` on top of this map.
    ///
    /// Entries present in `newer` replace the existing ones; entries absent from `newer` are kept.
    pub fn merge_from(&mut self, newer: TargetMap) {
        self.targets.extend(newer.targets);
    }

    /// Keep only the entries whose key satisfies `predicate`. Returns the number removed.
    pub fn retain(&mut self, mut predicate: impl FnMut(&TargetKey) -> bool) -> usize {
        let before = self.targets.len();
        self.targets.retain(|key, _| predicate(key));
        before - self.targets.len()
    }
}

impl FromIterator<(TargetKey, TargetIdeInfo)> for TargetMap {
    fn from_iter<I: IntoIterator<Item = (TargetKey, TargetIdeInfo)>>(iter: I) -> Self {
        Self {
            targets: iter.into_iter().collect(),
        }
    }
}
