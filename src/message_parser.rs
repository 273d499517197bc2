//! Parse whole messages: fields in order, with backtracking and path pruning.
//!
//! The search is depth first. For each field, the successors of one path are
//! collected and pruned to [`ParserConfig::max_parsing_paths`] (first half and
//! last half kept, order preserved); the next field is only explored when the
//! caller pulls more results.

use crate::ast::{FieldId, ResolvedVocabulary, VariableKind};
use crate::bits::BitBuffer;
use crate::field_parser::FieldParser;
use crate::memory::Memory;
use crate::path::ParsingPath;
use crate::value::Value;
use crate::variable::Paths;
use std::iter;
use std::rc::Rc;

/// Default cap on the number of paths forwarded from one field to the next.
pub const MAX_PARSING_PATHS: usize = 100;

/// How learning leaves choose among valid lengths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LengthPolicy {
    /// Every valid length, longest first.
    #[default]
    Enumerate,
    /// Only the longest valid length.
    Greedy,
}

#[derive(Debug, Clone)]
pub struct ParserConfig {
    pub max_parsing_paths: usize,
    pub length_policy: LengthPolicy,
    /// The last field must consume all remaining bits.
    pub must_consume_everything: bool,
}

impl Default for ParserConfig {
    fn default() -> Self {
        ParserConfig {
            max_parsing_paths: MAX_PARSING_PATHS,
            length_policy: LengthPolicy::Enumerate,
            must_consume_everything: true,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("No valid parsing for {} bytes: {}", .data.len(), hex(.data))]
    NoValidParsing { data: Vec<u8> },
    #[error("Empty input")]
    EmptyInput,
    #[error("No fields to parse")]
    NoFields,
    #[error("Unknown symbol: {0}")]
    UnknownSymbol(String),
}

fn hex(data: &[u8]) -> String {
    data.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Keep at most `cap` paths: the first half and the last half, in order.
/// A cap of 0 disables pruning.
pub fn prune_paths<T>(mut paths: Vec<T>, cap: usize) -> Vec<T> {
    if cap == 0 || paths.len() <= cap {
        return paths;
    }
    let total = paths.len();
    let head = cap / 2;
    let mut tail = paths.split_off(total - (cap - head));
    paths.truncate(head);
    paths.append(&mut tail);
    tracing::debug!(from = total, to = paths.len(), "pruned parsing paths");
    paths
}

#[derive(Debug, Clone)]
pub struct ParsedField {
    pub id: FieldId,
    pub name: String,
    pub bits: BitBuffer,
    /// Decoded value when the field's domain is a typed leaf.
    pub value: Option<Value>,
}

/// One accepted parse: field bits in declaration order and the resulting memory.
#[derive(Debug, Clone)]
pub struct ParsedMessage {
    pub symbol: Option<String>,
    fields: Vec<ParsedField>,
    remaining: BitBuffer,
    memory: Memory,
}

impl ParsedMessage {
    fn from_path(vocab: &ResolvedVocabulary, path: ParsingPath) -> Self {
        let fields: Vec<ParsedField> = path
            .fields()
            .map(|(id, bits)| {
                let field = vocab.field(id);
                let value = match &vocab.variable(field.domain).kind {
                    VariableKind::Data { data_type, .. } => data_type.decode(&bits).ok(),
                    _ => None,
                };
                ParsedField { id, name: field.name.clone(), bits, value }
            })
            .collect();
        let symbol = fields
            .first()
            .and_then(|f| vocab.symbol_of(f.id))
            .map(|s| s.name.clone());
        let remaining = path.remaining();
        ParsedMessage { symbol, fields, remaining, memory: path.into_memory() }
    }

    pub fn fields(&self) -> &[ParsedField] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&ParsedField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Bits of the field called `name`.
    pub fn get(&self, name: &str) -> Option<&BitBuffer> {
        self.field(name).map(|f| &f.bits)
    }

    pub fn value(&self, name: &str) -> Option<&Value> {
        self.field(name).and_then(|f| f.value.as_ref())
    }

    pub fn values(&self) -> Vec<&BitBuffer> {
        self.fields.iter().map(|f| &f.bits).collect()
    }

    /// Bits left after the last field (empty unless partial parsing was allowed).
    pub fn remaining(&self) -> &BitBuffer {
        &self.remaining
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn into_memory(self) -> Memory {
        self.memory
    }

    /// Concatenation of all field bits.
    pub fn to_bits(&self) -> BitBuffer {
        let parts: Vec<BitBuffer> = self.fields.iter().map(|f| f.bits.clone()).collect();
        BitBuffer::concat(&parts)
    }
}

/// Lazy sequence of accepted parses, in enumeration order.
pub struct Parsings<'a> {
    vocab: &'a ResolvedVocabulary,
    paths: Paths<'a>,
}

impl Iterator for Parsings<'_> {
    type Item = ParsedMessage;

    fn next(&mut self) -> Option<ParsedMessage> {
        self.paths.next().map(|p| ParsedMessage::from_path(self.vocab, p))
    }
}

#[derive(Debug, Clone, Copy)]
struct Search<'a> {
    fields: FieldParser<'a>,
    cap: usize,
    must_consume_everything: bool,
}

impl<'a> Search<'a> {
    fn run(self, order: Rc<[FieldId]>, index: usize, path: ParsingPath) -> Paths<'a> {
        let Some(&field) = order.get(index) else {
            return Box::new(iter::once(path));
        };
        let last = index + 1 == order.len();
        let carnivorous = last && self.must_consume_everything;
        let successors: Vec<ParsingPath> = self.fields.parse(field, path, carnivorous).collect();
        tracing::trace!(%field, successors = successors.len(), "field parsed");
        let kept = prune_paths(successors, self.cap);
        Box::new(kept.into_iter().flat_map(move |p| self.run(order.clone(), index + 1, p)))
    }
}

pub struct MessageParser<'a> {
    vocab: &'a ResolvedVocabulary,
    config: ParserConfig,
    memory: Memory,
}

impl<'a> MessageParser<'a> {
    pub fn new(vocab: &'a ResolvedVocabulary, config: ParserConfig) -> Self {
        MessageParser { vocab, config, memory: Memory::new() }
    }

    /// Seed the parser with an existing memory (session continuity).
    pub fn with_memory(mut self, memory: Memory) -> Self {
        self.memory = memory;
        self
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
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

    /// All valid parses of `bits` against `fields`, lazily. Fails with
    /// [`ParseError::NoValidParsing`] when there is none.
    pub fn parse_bits(&self, bits: BitBuffer, fields: &[FieldId]) -> Result<Parsings<'a>, ParseError> {
        if fields.is_empty() {
            return Err(ParseError::NoFields);
        }
        tracing::debug!(bits = bits.len(), fields = fields.len(), "parsing message");
        let search = Search {
            fields: FieldParser::new(self.vocab, self.config.length_policy),
            cap: self.config.max_parsing_paths,
            must_consume_everything: self.config.must_consume_everything,
        };
        let vocab = self.vocab;
        let must_consume_everything = self.config.must_consume_everything;
        let order: Rc<[FieldId]> = fields.into();
        let seed = ParsingPath::new(bits.clone(), self.memory.duplicate());
        let mut paths = search.run(order, 0, seed).filter(move |p| {
            if must_consume_everything && p.remaining_len() != 0 {
                return false;
            }
            if p.has_pending() {
                let unresolved: Vec<String> = p.pending().iter().map(|r| vocab.label(*r)).collect();
                tracing::debug!(?unresolved, "dropping path with unresolvable relations");
                return false;
            }
            true
        });
        match paths.next() {
            Some(first) => Ok(Parsings { vocab, paths: Box::new(iter::once(first).chain(paths)) }),
            None => {
                tracing::debug!("no valid parsing");
                Err(ParseError::NoValidParsing { data: bits.to_bytes_padded() })
            }
        }
    }

    pub fn parse_raw(&self, data: &[u8], fields: &[FieldId]) -> Result<Parsings<'a>, ParseError> {
        if data.is_empty() {
            return Err(ParseError::EmptyInput);
        }
        self.parse_bits(BitBuffer::from(data), fields)
    }

    /// All valid parses of `data` against the fields of `symbol`.
    pub fn parse_symbol(&self, data: &[u8], symbol: &str) -> Result<Parsings<'a>, ParseError> {
        let fields = self
            .vocab
            .get_symbol(symbol)
            .ok_or_else(|| ParseError::UnknownSymbol(symbol.to_string()))?
            .fields
            .clone();
        self.parse_raw(data, &fields)
    }

    /// First valid parse of `data` against `symbol`; its memory becomes the parser's memory.
    pub fn parse_message(&mut self, data: &[u8], symbol: &str) -> Result<ParsedMessage, ParseError> {
        let parsed = self
            .parse_symbol(data, symbol)?
            .next()
            .ok_or_else(|| ParseError::NoValidParsing { data: data.to_vec() })?;
        self.memory.restore_from(parsed.memory());
        tracing::debug!(symbol, memory = self.memory.len(), "memory adopted");
        Ok(parsed)
    }
}
