use std::sync::Mutex;

use crate::limits::MAX_QUERY_STRING_LEN;
use crate::model::Pk;
use crate::selection::{expand_keys, CellKey, Selection};

/// The part of the allocation view that survives a reload: focused section,
/// selected cells and focused allocation, stored as a URL query string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionState {
    pub section: Option<Pk>,
    pub begin: Option<CellKey>,
    pub end: Option<CellKey>,
    pub allocated: Option<Pk>,
}

impl SelectionState {
    pub fn new(section: Option<Pk>, selection: Option<&Selection>, allocated: Option<Pk>) -> Self {
        Self {
            section,
            begin: selection.map(Selection::first),
            end: selection.map(Selection::last),
            allocated,
        }
    }

    pub fn encode(&self) -> String {
        let mut params = Vec::new();
        if let Some(pk) = self.section {
            params.push(format!("section={pk}"));
        }
        if let Some(key) = self.begin {
            params.push(format!("begin={key}"));
        }
        if let Some(key) = self.end {
            params.push(format!("end={key}"));
        }
        if let Some(pk) = self.allocated {
            params.push(format!("allocated={pk}"));
        }
        params.join("&")
    }

    /// Never fails: malformed or missing values decode as absent, unknown
    /// parameters are skipped.
    pub fn decode(query: &str) -> Self {
        let mut state = Self::default();
        let query = query.strip_prefix('?').unwrap_or(query);
        if query.len() > MAX_QUERY_STRING_LEN {
            return state;
        }
        for pair in query.split('&') {
            let Some((name, value)) = pair.split_once('=') else { continue };
            match name {
                "section" => state.section = parse_pk(value),
                "begin" => state.begin = CellKey::parse(value),
                "end" => state.end = CellKey::parse(value),
                "allocated" => state.allocated = parse_pk(value),
                _ => {}
            }
        }
        state
    }

    /// The stored cells, or `None` if either endpoint is missing or the
    /// endpoints disagree on the day.
    pub fn selection(&self) -> Option<Selection> {
        let keys = expand_keys(self.begin?, self.end?);
        Selection::new(keys)
    }
}

fn parse_pk(value: &str) -> Option<Pk> {
    value.parse().ok().filter(|pk| *pk != 0)
}

/// Where the encoded [`SelectionState`] lives (URL, local storage, …).
pub trait SelectionStore: Send + Sync {
    fn read(&self) -> String;
    fn write(&self, encoded: String);
}

#[derive(Debug, Default)]
pub struct MemorySelectionStore {
    query: Mutex<String>,
}

impl MemorySelectionStore {
    pub fn new(initial: impl Into<String>) -> Self {
        Self {
            query: Mutex::new(initial.into()),
        }
    }
}

impl SelectionStore for MemorySelectionStore {
    fn read(&self) -> String {
        self.query.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn write(&self, encoded: String) {
        *self.query.lock().unwrap_or_else(|e| e.into_inner()) = encoded;
    }
}
