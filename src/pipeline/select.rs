use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::classify::LabeledUnit;
use super::info_type::InfoType;

/// Chosen units per label. Every label is always present, possibly empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<InfoType, Vec<String>>", into = "BTreeMap<InfoType, Vec<String>>")]
pub struct SelectedSet(BTreeMap<InfoType, Vec<String>>);

impl SelectedSet {
    pub fn empty() -> Self {
        Self(InfoType::ALL.into_iter().map(|t| (t, Vec::new())).collect())
    }

    pub fn get(&self, label: InfoType) -> &[String] {
        self.0.get(&label).map(Vec::as_slice).unwrap_or_default()
    }

    /// Labels in fixed order with their content.
    pub fn iter(&self) -> impl Iterator<Item = (InfoType, &[String])> {
        self.0.iter().map(|(t, v)| (*t, v.as_slice()))
    }

    pub fn non_empty_labels(&self) -> usize {
        self.0.values().filter(|v| !v.is_empty()).count()
    }
}

impl Default for SelectedSet {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<BTreeMap<InfoType, Vec<String>>> for SelectedSet {
    fn from(map: BTreeMap<InfoType, Vec<String>>) -> Self {
        let mut set = Self::empty();
        set.0.extend(map);
        set
    }
}

impl From<SelectedSet> for BTreeMap<InfoType, Vec<String>> {
    fn from(set: SelectedSet) -> Self {
        set.0
    }
}

/// Keep the first unit of each label, by input order.
pub fn select_minimal_set(labeled: &[LabeledUnit]) -> SelectedSet {
    let mut set = SelectedSet::empty();
    for unit in labeled {
        let slot = set.0.entry(unit.classification.label).or_default();
        if slot.is_empty() {
            slot.push(unit.text.clone());
        }
    }
    set
}
