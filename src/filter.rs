use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::classify::{classify, SectionAllocationState};
use crate::model::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterKey {
    /// `primary` / `secondary`: the section declares a range of that priority.
    Priority,
    /// A [`SectionAllocationState`] label.
    State,
    /// Case-insensitive substring of the section name.
    Search,
}

impl FilterKey {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "priority" => Some(FilterKey::Priority),
            "state" => Some(FilterKey::State),
            "search" => Some(FilterKey::Search),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterCommand {
    /// Replace every value of `key`. An empty list drops the key.
    Set { key: FilterKey, values: Vec<String> },
    /// Remove one value of `key`.
    DeleteTag { key: FilterKey, value: String },
    Reset,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterState {
    tags: BTreeMap<FilterKey, BTreeSet<String>>,
}

impl FilterState {
    pub fn values(&self, key: FilterKey) -> impl Iterator<Item = &str> {
        self.tags.get(&key).into_iter().flatten().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Whether `section` passes every active filter. Unrecognized values are
    /// ignored; a key with only unrecognized values does not constrain.
    pub fn matches(&self, section: &ApplicationSection, reservation_unit_pk: Pk) -> bool {
        let priorities: Vec<Priority> = self
            .values(FilterKey::Priority)
            .filter_map(|v| match v {
                "primary" => Some(Priority::Primary),
                "secondary" => Some(Priority::Secondary),
                _ => None,
            })
            .collect();
        if !priorities.is_empty()
            && !section
                .suitable_time_ranges
                .iter()
                .any(|r| priorities.contains(&r.priority))
        {
            return false;
        }

        let states: Vec<SectionAllocationState> = self
            .values(FilterKey::State)
            .filter_map(SectionAllocationState::parse)
            .collect();
        if !states.is_empty() && !states.contains(&classify(section, reservation_unit_pk)) {
            return false;
        }

        let name = section.name.to_lowercase();
        self.values(FilterKey::Search)
            .all(|needle| name.contains(&needle.to_lowercase()))
    }

    pub fn apply<'a>(&self, sections: &'a [ApplicationSection], reservation_unit_pk: Pk) -> Vec<&'a ApplicationSection> {
        sections
            .iter()
            .filter(|s| self.matches(s, reservation_unit_pk))
            .collect()
    }
}

/// Pure reducer: the only way filter state changes.
pub fn reduce(mut state: FilterState, command: FilterCommand) -> FilterState {
    match command {
        FilterCommand::Set { key, values } => {
            let values: BTreeSet<String> = values
                .into_iter()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .collect();
            if values.is_empty() {
                state.tags.remove(&key);
            } else {
                state.tags.insert(key, values);
            }
        }
        FilterCommand::DeleteTag { key, value } => {
            if let Some(values) = state.tags.get_mut(&key) {
                values.remove(value.trim());
                if values.is_empty() {
                    state.tags.remove(&key);
                }
            }
        }
        FilterCommand::Reset => state.tags.clear(),
    }
    state
}
