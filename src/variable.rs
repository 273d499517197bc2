//! Matching of one variable against a parsing path.
//!
//! Every variant produces a lazy sequence of successor paths; a dead branch is
//! simply an empty sequence. Data leaves dispatch on their scope and on whether
//! a value is already known (definition value or memory):
//!
//! | known | scope              | strategy                   |
//! |-------|--------------------|----------------------------|
//! | yes   | constant, session  | compare with known value   |
//! | yes   | message            | learn                      |
//! | no    | constant           | dead                       |
//! | no    | session, message   | learn                      |
//! | any   | none               | compare with the type      |
//!
//! Learning is a type comparison followed by memorization of the consumed bits.
//!
//! Relations compute their expected bits from the path. When a dependency has
//! not been parsed yet, the relation accepts candidate bits, stays pending, and
//! is checked again after every later assignment.

use crate::ast::{ResolvedVocabulary, RepeatSpec, VariableId, VariableKind};
use crate::bits::{BitBuffer, BitBufferBuilder};
use crate::message_parser::LengthPolicy;
use crate::path::ParsingPath;
use crate::scope::Scope;
use crate::types::DataType;
use std::iter;

/// Lazy sequence of successor paths.
pub type Paths<'a> = Box<dyn Iterator<Item = ParsingPath> + 'a>;

/// Outcome of evaluating a relation against a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expected {
    Known(BitBuffer),
    /// Some dependency is not available yet.
    Pending,
    /// The value cannot be represented (overflow, negative size).
    Impossible,
}

#[derive(Debug, Clone, Copy)]
pub struct VariableParser<'a> {
    vocab: &'a ResolvedVocabulary,
    policy: LengthPolicy,
}

impl<'a> VariableParser<'a> {
    pub fn new(vocab: &'a ResolvedVocabulary, policy: LengthPolicy) -> Self {
        VariableParser { vocab, policy }
    }

    /// Successors of `path` after matching `var`. Each successor has `var` assigned
    /// and no pending relation contradicted by that assignment.
    pub fn parse(self, var: VariableId, path: ParsingPath) -> Paths<'a> {
        let vocab: &'a ResolvedVocabulary = self.vocab;
        let variable = vocab.variable(var);
        let start = path.offset();
        let inner: Paths<'a> = match &variable.kind {
            VariableKind::Data { data_type, value } => {
                self.parse_data(var, data_type, value.as_ref(), variable.scope, path)
            }
            VariableKind::Size(_) | VariableKind::Checksum(_) | VariableKind::ValueOf(_) | VariableKind::Padding(_) => {
                self.parse_relation(var, path)
            }
            VariableKind::Alt { children } => Box::new(children.iter().flat_map(move |&c| self.parse(c, path.clone()))),
            VariableKind::Agg { children } => self.parse_sequence(children, path),
            VariableKind::Repeat(spec) => self.parse_repeat(spec, 0, path),
        };
        Box::new(inner.filter_map(move |mut p| {
            let end = p.offset();
            p.assign(var, start..end);
            self.settle(p)
        }))
    }

    fn parse_data(
        self,
        var: VariableId,
        data_type: &'a DataType,
        value: Option<&'a BitBuffer>,
        scope: Scope,
        path: ParsingPath,
    ) -> Paths<'a> {
        let remembered = path.memory().get(var).cloned();
        match (remembered.or_else(|| value.cloned()), scope) {
            (_, Scope::None) => self.compare_domain(data_type, path),
            (Some(known), Scope::Constant | Scope::Session) => compare_value(&known, path),
            (Some(_), Scope::Message) | (None, Scope::Session | Scope::Message) => {
                self.learn(var, data_type, path)
            }
            (None, Scope::Constant) => {
                tracing::trace!(variable = %self.vocab.label(var), "constant without value");
                Box::new(iter::empty())
            }
        }
    }

    /// One successor per candidate length accepted by the type, longest first.
    fn compare_domain(self, data_type: &'a DataType, path: ParsingPath) -> Paths<'a> {
        let remaining = path.remaining();
        let limit = match self.policy {
            LengthPolicy::Enumerate => usize::MAX,
            LengthPolicy::Greedy => 1,
        };
        Box::new(
            data_type
                .candidate_lengths(remaining.len())
                .into_iter()
                .filter(move |&len| data_type.can_parse(&remaining.prefix(len)))
                .take(limit)
                .map(move |len| {
                    let mut p = path.clone();
                    p.advance(len);
                    p
                }),
        )
    }

    fn learn(self, var: VariableId, data_type: &'a DataType, path: ParsingPath) -> Paths<'a> {
        let start = path.offset();
        Box::new(self.compare_domain(data_type, path).map(move |mut p| {
            let bits = p.input().slice(start..p.offset());
            p.memory_mut().memorize(var, bits);
            p
        }))
    }

    fn parse_relation(self, var: VariableId, path: ParsingPath) -> Paths<'a> {
        match self.expected(var, &path) {
            Expected::Known(bits) => compare_value(&bits, path),
            Expected::Impossible => {
                tracing::trace!(relation = %self.vocab.label(var), "relation value not representable");
                Box::new(iter::empty())
            }
            Expected::Pending => {
                let remaining = path.remaining();
                let limit = match self.policy {
                    LengthPolicy::Enumerate => usize::MAX,
                    LengthPolicy::Greedy => 1,
                };
                let vocab = self.vocab;
                let fill = match &vocab.variable(var).kind {
                    VariableKind::Padding(r) => Some(r.fill),
                    _ => None,
                };
                Box::new(
                    self.pending_lengths(var, remaining.len())
                        .into_iter()
                        .filter(move |&len| match fill {
                            Some(byte) => remaining.prefix(len) == fill_pattern(byte, len),
                            None => true,
                        })
                        .take(limit)
                        .map(move |len| {
                            let mut p = path.clone();
                            p.advance(len);
                            p.add_pending(var);
                            p
                        }),
                )
            }
        }
    }

    /// Candidate widths for a relation whose value is not known yet, longest first.
    fn pending_lengths(self, var: VariableId, available: usize) -> Vec<usize> {
        let vocab = self.vocab;
        match &vocab.variable(var).kind {
            VariableKind::Size(r) => fixed_candidate(&r.data_type, available),
            VariableKind::Checksum(r) => fixed_candidate(&r.data_type, available),
            VariableKind::ValueOf(r) => match &vocab.variable(r.target).kind {
                VariableKind::Data { data_type, .. } => data_type.candidate_lengths(available),
                _ => {
                    let (min, max) = vocab.bounds(r.target);
                    let max = max.unwrap_or(available).min(available);
                    let unit = if min % 8 == 0 && max % 8 == 0 { 8 } else { 1 };
                    (min..=max).rev().filter(|l| l % unit == 0).collect()
                }
            },
            VariableKind::Padding(r) => {
                let unit = if r.modulo_bits % 8 == 0 { 8 } else { 1 };
                (0..r.modulo_bits).rev().filter(|l| l % unit == 0 && *l <= available).collect()
            }
            _ => Vec::new(),
        }
    }

    fn parse_sequence(self, children: &'a [VariableId], path: ParsingPath) -> Paths<'a> {
        match children.split_first() {
            None => Box::new(iter::once(path)),
            Some((&first, rest)) => {
                Box::new(self.parse(first, path).flat_map(move |p| self.parse_sequence(rest, p)))
            }
        }
    }

    /// Iteration counts from the largest down to `spec.min`.
    fn parse_repeat(self, spec: &'a RepeatSpec, done: usize, path: ParsingPath) -> Paths<'a> {
        let stop: Paths<'a> = if done >= spec.min {
            Box::new(iter::once(path.clone()))
        } else {
            Box::new(iter::empty())
        };
        if done >= spec.max {
            return stop;
        }
        let start = path.offset();
        let before_child: Paths<'a> = match &spec.delimiter {
            Some(delimiter) if done > 0 => compare_value(delimiter, path),
            _ => Box::new(iter::once(path)),
        };
        let more = before_child
            .flat_map(move |p| self.parse(spec.child, p))
            .filter(move |p| p.offset() > start)
            .flat_map(move |p| self.parse_repeat(spec, done + 1, p));
        Box::new(more.chain(stop))
    }

    /// Re-check pending relations; `None` when one of them is contradicted.
    fn settle(self, mut path: ParsingPath) -> Option<ParsingPath> {
        let mut i = 0;
        while i < path.pending().len() {
            let relation = path.pending()[i];
            match self.expected(relation, &path) {
                Expected::Pending => i += 1,
                Expected::Known(bits) => {
                    if path.bits_of(relation).as_ref() == Some(&bits) {
                        path.resolve_pending(relation);
                    } else {
                        tracing::trace!(relation = %self.vocab.label(relation), "pending relation contradicted");
                        return None;
                    }
                }
                Expected::Impossible => return None,
            }
        }
        Some(path)
    }

    /// Bits of `var` as seen from `relation` on `path`: its own assignment, else a
    /// session or constant value. A message value learned by another symbol is
    /// read from memory too; one of the relation's own symbol is parsed anew.
    pub fn known_bits(self, relation: VariableId, var: VariableId, path: &ParsingPath) -> Option<BitBuffer> {
        if let Some(bits) = path.bits_of(var) {
            return Some(bits);
        }
        let variable = self.vocab.variable(var);
        match (&variable.kind, variable.scope) {
            (VariableKind::Data { .. }, Scope::Session) => path
                .memory()
                .get(var)
                .cloned()
                .or_else(|| data_value(&variable.kind)),
            (VariableKind::Data { .. }, Scope::Message) if !self.vocab.same_symbol(relation, var) => {
                path.memory().get(var).cloned()
            }
            (VariableKind::Data { .. }, Scope::Constant) => data_value(&variable.kind),
            _ => None,
        }
    }

    /// Size of `target` for a size-like relation: known bits, the relation's own
    /// width, or the fixed width of a target not parsed yet.
    fn target_len(self, relation: VariableId, target: VariableId, path: &ParsingPath) -> Option<usize> {
        if target == relation {
            return self.vocab.fixed_bits(relation);
        }
        if let Some(bits) = self.known_bits(relation, target, path) {
            return Some(bits.len());
        }
        self.vocab.fixed_bits(target)
    }

    fn targets_len(self, relation: VariableId, targets: &[VariableId], path: &ParsingPath) -> Option<usize> {
        targets
            .iter()
            .map(|&t| self.target_len(relation, t, path))
            .sum::<Option<usize>>()
    }

    pub fn expected(self, relation: VariableId, path: &ParsingPath) -> Expected {
        let vocab = self.vocab;
        match &vocab.variable(relation).kind {
            VariableKind::Size(r) => {
                let Some(total) = self.targets_len(relation, &r.targets, path) else {
                    return Expected::Pending;
                };
                let Some(value) = ((total as f64 * r.factor) as i64).checked_add(r.offset) else {
                    return Expected::Impossible;
                };
                match &r.data_type {
                    DataType::Integer(t) => t.encode_i64(value).map_or(Expected::Impossible, Expected::Known),
                    _ => Expected::Impossible,
                }
            }
            VariableKind::Checksum(r) => {
                let own = path.span_of(relation);
                let mut data = BitBufferBuilder::new();
                for &target in &r.targets {
                    match path.span_of(target) {
                        Some(span) => {
                            let at = data.len();
                            data.push_buffer(&path.input().slice(span.clone()));
                            if let Some(own) = &own {
                                if own.start >= span.start && own.end <= span.end {
                                    let zeros = fill_pattern(0, own.end - own.start);
                                    data.overwrite(at + own.start - span.start, &zeros);
                                }
                            }
                        }
                        None => match self.known_bits(relation, target, path) {
                            Some(bits) => data.push_buffer(&bits),
                            None => return Expected::Pending,
                        },
                    }
                }
                let sum = r.algorithm.calculate(&data.finish().to_bytes_padded());
                match &r.data_type {
                    DataType::Integer(t) => t.encode_u64(sum).map_or(Expected::Impossible, Expected::Known),
                    _ => Expected::Impossible,
                }
            }
            VariableKind::ValueOf(r) => match self.known_bits(relation, r.target, path) {
                Some(bits) => Expected::Known(bits),
                None => Expected::Pending,
            },
            VariableKind::Padding(r) => match self.targets_len(relation, &r.targets, path) {
                Some(total) => {
                    let len = (r.modulo_bits - total % r.modulo_bits) % r.modulo_bits;
                    Expected::Known(fill_pattern(r.fill, len))
                }
                None => Expected::Pending,
            },
            _ => Expected::Impossible,
        }
    }
}

fn compare_value<'a>(expected: &BitBuffer, path: ParsingPath) -> Paths<'a> {
    if path.remaining().starts_with(expected) {
        let mut p = path;
        p.advance(expected.len());
        Box::new(iter::once(p))
    } else {
        Box::new(iter::empty())
    }
}

fn fixed_candidate(data_type: &DataType, available: usize) -> Vec<usize> {
    match data_type.fixed_bit_size() {
        Some(w) if w <= available => vec![w],
        _ => Vec::new(),
    }
}

fn data_value(kind: &VariableKind) -> Option<BitBuffer> {
    match kind {
        VariableKind::Data { value, .. } => value.clone(),
        _ => None,
    }
}

/// `len` bits of the repeated `fill` byte.
pub fn fill_pattern(fill: u8, len: usize) -> BitBuffer {
    let mut b = BitBufferBuilder::with_capacity(len);
    for i in 0..len {
        b.push_bit((fill >> (7 - (i % 8))) & 1 == 1);
    }
    b.finish()
}
