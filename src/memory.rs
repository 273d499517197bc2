//! Value store keyed by variable, shared across the parses of one session.

use crate::ast::VariableId;
use crate::bits::BitBuffer;
use std::collections::BTreeMap;

/// Maps variables to the last bits learned for them.
///
/// Parsing paths own a duplicate of the memory they started from; only the
/// memory of the accepted path is adopted by the parser.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Memory {
    values: BTreeMap<VariableId, BitBuffer>,
}

impl Memory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, var: VariableId) -> Option<&BitBuffer> {
        self.values.get(&var)
    }

    pub fn has(&self, var: VariableId) -> bool {
        self.values.contains_key(&var)
    }

    /// Store `bits` for `var`, replacing any previous value.
    pub fn memorize(&mut self, var: VariableId, bits: BitBuffer) {
        self.values.insert(var, bits);
    }

    pub fn set(&mut self, var: VariableId, bits: BitBuffer) {
        self.memorize(var, bits);
    }

    pub fn forget(&mut self, var: VariableId) -> Option<BitBuffer> {
        self.values.remove(&var)
    }

    pub fn duplicate(&self) -> Memory {
        self.clone()
    }

    /// Replace the whole content with `other`'s.
    pub fn restore_from(&mut self, other: &Memory) {
        self.values.clone_from(&other.values);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (VariableId, &BitBuffer)> {
        self.values.iter().map(|(k, v)| (*k, v))
    }
}
