//! # protovocab: protocol vocabulary modelling and message parsing
//!
//! Describe the messages of a protocol as symbols made of fields, where each field
//! is a tree of variables (typed leaves, alternatives, sequences, repetitions and
//! relations such as sizes and checksums), then parse raw messages against them,
//! align batches of messages, or generate messages from a symbol.
//!
//! ## Parsing
//!
//! Parsing is a backtracking search: every leaf may match several lengths, every
//! alternative may match several children, and each choice forks the current
//! parsing path. Paths are explored lazily, depth first, and at most
//! [`MAX_PARSING_PATHS`] paths are forwarded from one field to the next.
//!
//! ## Memory and scopes
//!
//! A [`Memory`] maps variables to learned values and can be carried from one parse
//! to the next to model a session:
//!
//! - `constant`: fixed value, never stored
//! - `session`: learned once, must match afterwards
//! - `message`: learned on every parse
//! - `volatile`: never stored
//!
//! ## Relations
//!
//! `size(...)`, `crc32(...)`, `crc16*(...)`, `checksum(...)` (RFC 1071), `value(...)`
//! and `padding(...)` compute their bits from other variables. A relation parsed
//! before its targets is checked as soon as the targets are known.
//!
//! ## Example DSL
//!
//! ```text
//! symbol Greeting {
//! 	greeting: "hello ";
//! 	name: ascii(5..10) session;
//! 	tail: ", welcome";
//! }
//!
//! symbol Sized {
//! 	payload: ascii(6);
//! 	sep: ";";
//! 	len: size(payload) uint8;
//! }
//! ```
//!
//! ## Usage
//!
//! ```
//! let vocab = protovocab::load(
//!     "symbol Greeting { greeting: \"hello \"; name: ascii(5..10); tail: \", welcome\"; }",
//! )
//! .expect("vocabulary");
//! let mut parser = protovocab::MessageParser::new(&vocab, protovocab::ParserConfig::default());
//! let parsed = parser.parse_message(b"hello world, welcome", "Greeting").expect("parse");
//! assert_eq!(parsed.get("name").map(|b| b.to_string()), Some("776f726c64".to_string()));
//! ```

pub mod align;
pub mod ast;
pub mod bits;
pub mod checksum;
pub mod dump;
pub mod field_parser;
pub mod memory;
pub mod message_parser;
pub mod parser;
pub mod path;
pub mod scope;
pub mod specializer;
pub mod types;
pub mod value;
pub mod variable;

pub use align::{abstract_message, align_messages, AlignmentResult};
pub use ast::{
    FieldId, GrammarError, ResolvedVocabulary, VariableId, VariableKind, Vocabulary, VocabularyBuilder,
};
pub use bits::{BitBuffer, BitBufferBuilder, BitOrder};
pub use checksum::ChecksumAlgorithm;
pub use memory::Memory;
pub use message_parser::{
    prune_paths, LengthPolicy, MessageParser, ParseError, ParsedField, ParsedMessage, ParserConfig, Parsings,
    MAX_PARSING_PATHS,
};
pub use parser::{load, parse, DslError};
pub use path::ParsingPath;
pub use scope::Scope;
pub use specializer::{MessageSpecializer, Presets, SpecializeError, SpecializedMessage};
pub use types::{CodecError, DataType, Endianness, IntegerType};
pub use value::Value;
