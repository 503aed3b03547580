//! Memoized parsing-table construction.
//!
//! Grammar validation and table construction run once per distinct grammar;
//! the result is memoized behind a thread-safe, lazily populated map keyed
//! by grammar fingerprint. Concurrent first-use callers contend only on
//! this cache; parsing itself shares the immutable `Arc<ParsingTable>`
//! without any locking.

use std::sync::{Arc, Mutex};

use hashbrown::HashMap;

use crate::error::FormulaError;
use crate::grammar::Grammar;
use crate::parser::table::ParsingTable;

pub struct TableCache {
    inner: Mutex<HashMap<u64, Arc<ParsingTable>, ahash::RandomState>>,
}

impl TableCache {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::with_hasher(ahash::RandomState::new())),
        }
    }

    /// Return the memoized table for `grammar`, building it on first use.
    ///
    /// # Errors
    ///
    /// Construction errors from [`ParsingTable::build`]; failures are not
    /// cached, so a later call retries.
    pub fn get_or_build(&self, grammar: &Grammar) -> Result<Arc<ParsingTable>, FormulaError> {
        let mut cache = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(table) = cache.get(&grammar.fingerprint()) {
            return Ok(Arc::clone(table));
        }
        let table = Arc::new(ParsingTable::build(grammar)?);
        cache.insert(grammar.fingerprint(), Arc::clone(&table));
        Ok(table)
    }

    /// Number of distinct grammars with a cached table.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for TableCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::formula_grammar;

    #[test]
    fn test_tables_are_memoized() {
        let cache = TableCache::new();
        let grammar = formula_grammar();
        let first = cache.get_or_build(&grammar).unwrap();
        let second = cache.get_or_build(&grammar).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_same_structure_shares_one_entry() {
        let cache = TableCache::new();
        let a = formula_grammar();
        let b = formula_grammar();
        cache.get_or_build(&a).unwrap();
        cache.get_or_build(&b).unwrap();
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_concurrent_first_use() {
        let cache = Arc::new(TableCache::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    let grammar = formula_grammar();
                    cache.get_or_build(&grammar).map(|t| t.num_states())
                })
            })
            .collect();
        let states: Vec<usize> = handles
            .into_iter()
            .map(|h| h.join().unwrap().unwrap())
            .collect();
        assert!(states.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(cache.len(), 1);
    }
}
