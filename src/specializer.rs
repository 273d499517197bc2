//! Produce message bytes from a symbol (the inverse of parsing).
//!
//! Leaves are laid out in field order; relations are first written as zero
//! placeholders of their width and patched once every field is laid out, in the
//! vocabulary's relation order.

use crate::ast::{FieldId, ResolvedVocabulary, VariableId, VariableKind};
use crate::bits::{BitBuffer, BitBufferBuilder};
use crate::memory::Memory;
use crate::message_parser::LengthPolicy;
use crate::path::ParsingPath;
use crate::scope::Scope;
use crate::types::CodecError;
use crate::variable::{Expected, VariableParser};
use std::collections::HashMap;
use std::ops::Range;

#[derive(Debug, thiserror::Error)]
pub enum SpecializeError {
    #[error("No value available for {0}")]
    MissingValue(String),
    #[error("Codec: {0}")]
    Codec(#[from] CodecError),
    #[error("Unknown symbol: {0}")]
    UnknownSymbol(String),
    #[error("Unknown field {field} in symbol {symbol}")]
    UnknownField { symbol: String, field: String },
    #[error("Relation {0} cannot be computed")]
    Unresolvable(String),
    #[error("Invalid preset for {0}")]
    InvalidPreset(String),
}

/// Caller-chosen values and structure for a specialization.
#[derive(Debug, Clone, Default)]
pub struct Presets {
    values: HashMap<VariableId, BitBuffer>,
    choices: HashMap<VariableId, usize>,
    counts: HashMap<VariableId, usize>,
}

impl Presets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, var: VariableId, bits: impl Into<BitBuffer>) -> &mut Self {
        self.values.insert(var, bits.into());
        self
    }

    /// Preset the value of the leaf that is the domain of `symbol.field`.
    pub fn set_field(
        &mut self,
        vocab: &ResolvedVocabulary,
        symbol: &str,
        field: &str,
        bits: impl Into<BitBuffer>,
    ) -> Result<&mut Self, SpecializeError> {
        let id = vocab.find_field(symbol, field).ok_or_else(|| SpecializeError::UnknownField {
            symbol: symbol.to_string(),
            field: field.to_string(),
        })?;
        Ok(self.set(vocab.field(id).domain, bits))
    }

    /// Child index an alternative must take.
    pub fn choose(&mut self, alt: VariableId, index: usize) -> &mut Self {
        self.choices.insert(alt, index);
        self
    }

    /// Iteration count of a repeat.
    pub fn repeat(&mut self, repeat: VariableId, count: usize) -> &mut Self {
        self.counts.insert(repeat, count);
        self
    }

    pub fn get(&self, var: VariableId) -> Option<&BitBuffer> {
        self.values.get(&var)
    }
}

#[derive(Debug, Clone)]
pub struct SpecializedField {
    pub id: FieldId,
    pub name: String,
    pub bits: BitBuffer,
}

#[derive(Debug, Clone)]
pub struct SpecializedMessage {
    pub symbol: String,
    pub bits: BitBuffer,
    pub fields: Vec<SpecializedField>,
}

impl SpecializedMessage {
    pub fn to_bytes(&self) -> Result<Vec<u8>, CodecError> {
        self.bits.to_bytes()
    }

    pub fn get(&self, name: &str) -> Option<&BitBuffer> {
        self.fields.iter().find(|f| f.name == name).map(|f| &f.bits)
    }
}

#[derive(Debug, Clone, Default)]
struct Layout {
    out: BitBufferBuilder,
    spans: HashMap<VariableId, Range<usize>>,
    memory: Memory,
}

impl Layout {
    /// Parsing view of what has been laid out so far, for relation evaluation.
    fn as_path(&self) -> ParsingPath {
        let mut path = ParsingPath::new(self.out.snapshot(), self.memory.clone());
        for (var, span) in &self.spans {
            path.assign(*var, span.clone());
        }
        path
    }
}

pub struct MessageSpecializer<'a> {
    vocab: &'a ResolvedVocabulary,
}

impl<'a> MessageSpecializer<'a> {
    pub fn new(vocab: &'a ResolvedVocabulary) -> Self {
        MessageSpecializer { vocab }
    }

    /// Encode `symbol`. `memory` is read for session values and updated only on success.
    pub fn specialize(
        &self,
        symbol: &str,
        memory: &mut Memory,
        presets: &Presets,
    ) -> Result<SpecializedMessage, SpecializeError> {
        let sym = self
            .vocab
            .get_symbol(symbol)
            .ok_or_else(|| SpecializeError::UnknownSymbol(symbol.to_string()))?;
        let mut layout = Layout { memory: memory.duplicate(), ..Layout::default() };
        let mut field_spans = Vec::with_capacity(sym.fields.len());
        for &field in &sym.fields {
            let start = layout.out.len();
            self.write(self.vocab.field(field).domain, &mut layout, presets)?;
            field_spans.push((field, start..layout.out.len()));
        }

        let relations = VariableParser::new(self.vocab, LengthPolicy::Enumerate);
        for &relation in self.vocab.relation_order() {
            let Some(span) = layout.spans.get(&relation).cloned() else {
                continue;
            };
            let bits = match relations.expected(relation, &layout.as_path()) {
                Expected::Known(bits) => bits,
                Expected::Pending | Expected::Impossible => {
                    return Err(SpecializeError::Unresolvable(self.vocab.label(relation)));
                }
            };
            if bits.len() != span.len() || !layout.out.overwrite(span.start, &bits) {
                return Err(SpecializeError::Unresolvable(self.vocab.label(relation)));
            }
        }

        let bits = layout.out.finish();
        let fields = field_spans
            .into_iter()
            .map(|(id, span)| SpecializedField { id, name: self.vocab.field(id).name.clone(), bits: bits.slice(span) })
            .collect();
        memory.restore_from(&layout.memory);
        tracing::debug!(symbol, bits = bits.len(), "symbol specialized");
        Ok(SpecializedMessage { symbol: symbol.to_string(), bits, fields })
    }

    fn write(&self, var: VariableId, layout: &mut Layout, presets: &Presets) -> Result<(), SpecializeError> {
        let vocab = self.vocab;
        let variable = vocab.variable(var);
        let start = layout.out.len();
        match &variable.kind {
            VariableKind::Data { data_type, value } => {
                let preset = presets.get(var).cloned();
                if let Some(p) = &preset {
                    if !data_type.can_parse(p) {
                        return Err(SpecializeError::InvalidPreset(vocab.label(var)));
                    }
                }
                let (bits, memorize) = match variable.scope {
                    Scope::Constant => (value.clone(), false),
                    Scope::Session => match (layout.memory.get(var), value) {
                        (Some(known), _) => (Some(known.clone()), false),
                        (None, Some(v)) => (Some(v.clone()), false),
                        (None, None) => (preset, true),
                    },
                    Scope::Message => (preset.or_else(|| value.clone()), true),
                    Scope::None => (preset.or_else(|| value.clone()), false),
                };
                let bits = bits.ok_or_else(|| SpecializeError::MissingValue(vocab.label(var)))?;
                if memorize {
                    layout.memory.memorize(var, bits.clone());
                }
                layout.out.push_buffer(&bits);
            }
            VariableKind::Size(_) | VariableKind::Checksum(_) => {
                let width = vocab
                    .fixed_bits(var)
                    .ok_or_else(|| SpecializeError::Unresolvable(vocab.label(var)))?;
                layout.out.push_zeros(width);
            }
            VariableKind::ValueOf(r) => match layout.spans.get(&r.target) {
                Some(span) => {
                    let bits = layout.out.snapshot().slice(span.clone());
                    layout.out.push_buffer(&bits);
                }
                None => {
                    let width = vocab
                        .fixed_bits(r.target)
                        .ok_or_else(|| SpecializeError::Unresolvable(vocab.label(var)))?;
                    layout.out.push_zeros(width);
                }
            },
            VariableKind::Padding(_) => {
                let relations = VariableParser::new(vocab, LengthPolicy::Enumerate);
                match relations.expected(var, &layout.as_path()) {
                    Expected::Known(bits) => layout.out.push_buffer(&bits),
                    Expected::Pending | Expected::Impossible => {
                        return Err(SpecializeError::Unresolvable(vocab.label(var)));
                    }
                }
            }
            VariableKind::Alt { children } => match presets.choices.get(&var) {
                Some(&index) => {
                    let child = children
                        .get(index)
                        .ok_or_else(|| SpecializeError::InvalidPreset(vocab.label(var)))?;
                    self.write(*child, layout, presets)?;
                }
                None => {
                    let mut last_err = SpecializeError::MissingValue(vocab.label(var));
                    let mut done = false;
                    for &child in children {
                        let mut trial = layout.clone();
                        match self.write(child, &mut trial, presets) {
                            Ok(()) => {
                                *layout = trial;
                                done = true;
                                break;
                            }
                            Err(e) => last_err = e,
                        }
                    }
                    if !done {
                        return Err(last_err);
                    }
                }
            },
            VariableKind::Agg { children } => {
                for &child in children {
                    self.write(child, layout, presets)?;
                }
            }
            VariableKind::Repeat(spec) => {
                let count = presets.counts.get(&var).copied().unwrap_or(spec.min);
                if count < spec.min || count > spec.max {
                    return Err(SpecializeError::InvalidPreset(vocab.label(var)));
                }
                for i in 0..count {
                    if let (Some(delimiter), true) = (&spec.delimiter, i > 0) {
                        layout.out.push_buffer(delimiter);
                    }
                    self.write(spec.child, layout, presets)?;
                }
            }
        }
        layout.spans.insert(var, start..layout.out.len());
        Ok(())
    }
}
