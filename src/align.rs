//! Alignment: parse a batch of messages against one symbol, or find the symbol of a message.
//!
//! Messages that do not parse are removed from the alignment (with the reason) and
//! the batch continues with the next one. Session memory is chained from one
//! accepted message to the next.

use crate::ast::ResolvedVocabulary;
use crate::bits::BitBuffer;
use crate::memory::Memory;
use crate::message_parser::{MessageParser, ParseError, ParsedMessage, ParserConfig};

/// Result of aligning a batch: accepted messages and the ones that were removed.
#[derive(Debug)]
pub struct AlignmentResult {
    pub symbol: String,
    /// Field names, in declaration order (the columns).
    pub fields: Vec<String>,
    pub messages: Vec<AlignedMessage>,
    pub removed: Vec<RemovedMessage>,
    /// Memory after the last accepted message.
    pub memory: Memory,
}

#[derive(Debug)]
pub struct AlignedMessage {
    /// Position in the input batch.
    pub index: usize,
    pub parsed: ParsedMessage,
}

#[derive(Debug)]
pub struct RemovedMessage {
    pub index: usize,
    pub data: Vec<u8>,
    pub reason: String,
}

impl AlignmentResult {
    /// Bits of column `field` for every accepted message.
    pub fn column(&self, field: &str) -> Vec<&BitBuffer> {
        self.messages.iter().filter_map(|m| m.parsed.get(field)).collect()
    }

    /// True when no message was removed.
    pub fn is_complete(&self) -> bool {
        self.removed.is_empty()
    }
}

/// Parse `data` with each symbol in declaration order and return the first that
/// accepts it. `memory` is updated only when a symbol matches.
pub fn abstract_message(
    vocab: &ResolvedVocabulary,
    data: &[u8],
    memory: &mut Memory,
    config: &ParserConfig,
) -> Result<ParsedMessage, ParseError> {
    for symbol in vocab.symbols() {
        let mut parser = MessageParser::new(vocab, config.clone()).with_memory(memory.duplicate());
        match parser.parse_message(data, &symbol.name) {
            Ok(parsed) => {
                memory.restore_from(parser.memory());
                tracing::debug!(symbol = %symbol.name, "message abstracted");
                return Ok(parsed);
            }
            Err(ParseError::NoValidParsing { .. }) => continue,
            Err(e) => return Err(e),
        }
    }
    Err(ParseError::NoValidParsing { data: data.to_vec() })
}

/// Align `messages` against `symbol`, starting from `memory`.
pub fn align_messages<I, B>(
    vocab: &ResolvedVocabulary,
    symbol: &str,
    messages: I,
    memory: Memory,
    config: &ParserConfig,
) -> Result<AlignmentResult, ParseError>
where
    I: IntoIterator<Item = B>,
    B: AsRef<[u8]>,
{
    let sym = vocab
        .get_symbol(symbol)
        .ok_or_else(|| ParseError::UnknownSymbol(symbol.to_string()))?;
    let fields = sym.fields.iter().map(|f| vocab.field(*f).name.clone()).collect();

    let mut parser = MessageParser::new(vocab, config.clone()).with_memory(memory);
    let mut aligned = Vec::new();
    let mut removed = Vec::new();
    for (index, message) in messages.into_iter().enumerate() {
        let data = message.as_ref();
        match parser.parse_message(data, symbol) {
            Ok(parsed) => aligned.push(AlignedMessage { index, parsed }),
            Err(e) => {
                tracing::debug!(index, error = %e, "message removed from alignment");
                removed.push(RemovedMessage { index, data: data.to_vec(), reason: e.to_string() });
            }
        }
    }
    tracing::debug!(symbol, aligned = aligned.len(), removed = removed.len(), "alignment done");

    Ok(AlignmentResult {
        symbol: symbol.to_string(),
        fields,
        messages: aligned,
        removed,
        memory: parser.into_memory(),
    })
}
