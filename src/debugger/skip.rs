use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

/// Kind of event a skip decision was made for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkipScope {
    /// Function entry, memo means no breakpoint anywhere in the file.
    Call,
    /// Line, memo means no breakpoint at this line.
    Line,
    /// Function exit outside of stepping.
    Return,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SkipKey {
    pub file: String,
    pub line: u32,
    pub scope: SkipScope,
}

#[derive(Default)]
struct State {
    generation: u64,
    files: HashMap<String, HashSet<(u32, SkipScope)>>,
}

/// Memo of locations without interest.
///
/// Entries are tagged with the breakpoint registry generation they were computed
/// against, an insert computed against an outdated generation is dropped.
#[derive(Default)]
pub struct SkipCache {
    state: RwLock<State>,
}

impl SkipCache {
    pub fn contains(&self, file: &str, line: u32, scope: SkipScope) -> bool {
        self.state
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .files
            .get(file)
            .is_some_and(|set| set.contains(&(line, scope)))
    }

    /// Memoize a key, return false if `generation` is outdated.
    pub fn insert(&self, key: SkipKey, generation: u64) -> bool {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        if state.generation != generation {
            return false;
        }
        state
            .files
            .entry(key.file)
            .or_default()
            .insert((key.line, key.scope));
        true
    }

    /// Drop all entries and accept only inserts computed against `generation`.
    pub fn reset(&self, generation: u64) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.generation = generation;
        state.files.clear();
    }

    pub fn generation(&self) -> u64 {
        self.state
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .generation
    }

    pub fn len(&self) -> usize {
        self.state
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .files
            .values()
            .map(|set| set.len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
