//! One candidate state of the backtracking search.

use crate::ast::{FieldId, VariableId};
use crate::bits::BitBuffer;
use crate::memory::Memory;
use std::collections::HashMap;
use std::ops::Range;

/// Input position, memory, assignments and pending relations of one branch.
///
/// The input is shared (cheap clone); assignments are stored as bit ranges of the
/// input so that nodes and relations can locate each other's bits.
#[derive(Debug, Clone)]
pub struct ParsingPath {
    input: BitBuffer,
    offset: usize,
    memory: Memory,
    assignments: HashMap<VariableId, Range<usize>>,
    fields: Vec<(FieldId, Range<usize>)>,
    pending: Vec<VariableId>,
}

impl ParsingPath {
    pub fn new(input: BitBuffer, memory: Memory) -> Self {
        ParsingPath {
            input,
            offset: 0,
            memory,
            assignments: HashMap::new(),
            fields: Vec::new(),
            pending: Vec::new(),
        }
    }

    pub fn input(&self) -> &BitBuffer {
        &self.input
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Bits not yet consumed.
    pub fn remaining(&self) -> BitBuffer {
        self.input.skip(self.offset)
    }

    pub fn remaining_len(&self) -> usize {
        self.input.len() - self.offset
    }

    /// Consume `n` bits. Returns false (and leaves the path untouched) when fewer remain.
    pub fn advance(&mut self, n: usize) -> bool {
        if n > self.remaining_len() {
            return false;
        }
        self.offset += n;
        true
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut Memory {
        &mut self.memory
    }

    pub fn into_memory(self) -> Memory {
        self.memory
    }

    pub fn assign(&mut self, var: VariableId, span: Range<usize>) {
        self.assignments.insert(var, span);
    }

    pub fn span_of(&self, var: VariableId) -> Option<Range<usize>> {
        self.assignments.get(&var).cloned()
    }

    /// Bits assigned to `var` in this path.
    pub fn bits_of(&self, var: VariableId) -> Option<BitBuffer> {
        self.assignments.get(&var).map(|span| self.input.slice(span.clone()))
    }

    pub fn is_assigned(&self, var: VariableId) -> bool {
        self.assignments.contains_key(&var)
    }

    pub fn push_field(&mut self, field: FieldId, span: Range<usize>) {
        self.fields.push((field, span));
    }

    /// Parsed fields with their bits, in parse order.
    pub fn fields(&self) -> impl Iterator<Item = (FieldId, BitBuffer)> + '_ {
        self.fields.iter().map(|(f, span)| (*f, self.input.slice(span.clone())))
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    pub fn add_pending(&mut self, relation: VariableId) {
        if !self.pending.contains(&relation) {
            self.pending.push(relation);
        }
    }

    pub fn pending(&self) -> &[VariableId] {
        &self.pending
    }

    pub fn resolve_pending(&mut self, relation: VariableId) {
        self.pending.retain(|r| *r != relation);
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}
