//! Parse vocabulary DSL source into a [`Vocabulary`] using PEST.
//!
//! Relation targets may name fields declared later in the symbol, so targets are
//! collected while building and bound once every symbol is known. A target is
//! `field`, `field.label` (a labeled child, at any depth) or `Symbol.field`.
//!
//! A size factor multiplies the size in bytes: `size(payload) uint16 * 8` counts bits.

use crate::ast::{GrammarError, ResolvedVocabulary, VariableId, Vocabulary, VocabularyBuilder, MAX_REPEAT};
use crate::bits::BitBuffer;
use crate::checksum::ChecksumAlgorithm;
use crate::scope::Scope;
use crate::types::{DataType, Endianness, IntegerType};
use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser as PestParser;
use std::collections::HashMap;

#[derive(PestParser)]
#[grammar = "grammar.pest"]
struct VocabularyParser;

#[derive(Debug, thiserror::Error)]
pub enum DslError {
    #[error("Parse error: {0}")]
    Syntax(String),
    #[error("{0}")]
    Semantic(String),
    #[error("Grammar: {0}")]
    Grammar(#[from] GrammarError),
}

/// Parse source into an unresolved vocabulary.
pub fn parse(source: &str) -> Result<Vocabulary, DslError> {
    let pairs = VocabularyParser::parse(Rule::vocabulary, source).map_err(|e| DslError::Syntax(e.to_string()))?;
    let pair = pairs
        .into_iter()
        .next()
        .ok_or_else(|| DslError::Syntax("empty parse".to_string()))?;
    let mut loader = Loader::default();
    for inner in pair.into_inner() {
        if inner.as_rule() == Rule::symbol_def {
            loader.build_symbol(inner)?;
        }
    }
    loader.finish()
}

/// Parse and resolve in one step.
pub fn load(source: &str) -> Result<ResolvedVocabulary, DslError> {
    Ok(ResolvedVocabulary::resolve(parse(source)?)?)
}

struct Unresolved {
    relation: VariableId,
    symbol: String,
    targets: Vec<String>,
}

#[derive(Default)]
struct Loader {
    builder: VocabularyBuilder,
    /// (symbol, "field" or "field.label...") -> variable
    names: HashMap<(String, String), VariableId>,
    unresolved: Vec<Unresolved>,
}

fn semantic(msg: impl Into<String>) -> DslError {
    DslError::Semantic(msg.into())
}

fn next_pair<'i>(it: &mut pest::iterators::Pairs<'i, Rule>, what: &str) -> Result<Pair<'i, Rule>, DslError> {
    it.next().ok_or_else(|| semantic(format!("missing {}", what)))
}

impl Loader {
    fn build_symbol(&mut self, pair: Pair<Rule>) -> Result<(), DslError> {
        let mut inner = pair.into_inner();
        let name = next_pair(&mut inner, "symbol name")?.as_str().to_string();
        let mut fields = Vec::new();
        for field_def in inner {
            let mut it = field_def.into_inner();
            let field_name = next_pair(&mut it, "field name")?.as_str().to_string();
            let expr = next_pair(&mut it, "field expression")?;
            let domain = self.build_expr(expr, &name, &field_name)?;
            self.names.insert((name.clone(), field_name.clone()), domain);
            fields.push(self.builder.field(&field_name, domain));
        }
        self.builder.symbol(&name, fields);
        Ok(())
    }

    fn build_child(&mut self, pair: Pair<Rule>, symbol: &str, path: &str) -> Result<VariableId, DslError> {
        let inner = next_pair(&mut pair.into_inner(), "child")?;
        match inner.as_rule() {
            Rule::labeled => {
                let mut it = inner.into_inner();
                let label = next_pair(&mut it, "label")?.as_str().to_string();
                let expr = next_pair(&mut it, "labeled expression")?;
                let child_path = format!("{}.{}", path, label);
                let id = self.build_expr(expr, symbol, &child_path)?;
                self.builder.set_name(id, &label);
                self.names.insert((symbol.to_string(), child_path), id);
                Ok(id)
            }
            _ => self.build_expr(inner, symbol, path),
        }
    }

    fn build_expr(&mut self, pair: Pair<Rule>, symbol: &str, path: &str) -> Result<VariableId, DslError> {
        let inner = next_pair(&mut pair.into_inner(), "expression")?;
        match inner.as_rule() {
            Rule::alt_expr | Rule::agg_expr => {
                let is_alt = inner.as_rule() == Rule::alt_expr;
                let children = inner
                    .into_inner()
                    .map(|c| self.build_child(c, symbol, path))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(if is_alt { self.builder.alt(&children) } else { self.builder.agg(&children) })
            }
            Rule::repeat_expr => {
                let mut it = inner.into_inner();
                let child = self.build_child(next_pair(&mut it, "repeated child")?, symbol, path)?;
                let (min, max) = build_count(next_pair(&mut it, "repeat count")?)?;
                let max = max.unwrap_or(MAX_REPEAT);
                Ok(match it.next() {
                    Some(delim) => {
                        let (bytes, _) = build_literal(delim)?;
                        self.builder.repeat_delimited(child, min, max, BitBuffer::from(bytes))
                    }
                    None => self.builder.repeat(child, min, max),
                })
            }
            Rule::size_expr => {
                let mut it = inner.into_inner();
                let targets = build_targets(next_pair(&mut it, "size targets")?);
                let t = parse_int_type(next_pair(&mut it, "size type")?.as_str())?;
                let mut factor = 1.0 / 8.0;
                let mut offset = 0i64;
                for part in it {
                    match part.as_rule() {
                        Rule::factor => {
                            let d = next_pair(&mut part.into_inner(), "factor")?;
                            let f: f64 = d.as_str().parse().map_err(|_| semantic("invalid size factor"))?;
                            factor = f / 8.0;
                        }
                        Rule::offset => {
                            let mut o = part.into_inner();
                            let negative = next_pair(&mut o, "sign")?.as_str() == "-";
                            let digits = next_pair(&mut o, "offset")?.as_str();
                            let n = i64::try_from(parse_number(digits)?)
                                .map_err(|_| semantic(format!("size offset {} out of range", digits)))?;
                            offset = if negative { -n } else { n };
                        }
                        _ => {}
                    }
                }
                let id = self.builder.size_with(&[], DataType::Integer(t), factor, offset);
                self.defer(id, symbol, targets);
                Ok(id)
            }
            Rule::checksum_expr => {
                let mut it = inner.into_inner();
                let name = next_pair(&mut it, "checksum name")?.as_str();
                let algorithm = ChecksumAlgorithm::from_name(name)
                    .ok_or_else(|| semantic(format!("unknown checksum {}", name)))?;
                let targets = build_targets(next_pair(&mut it, "checksum targets")?);
                let id = match it.next() {
                    Some(t) => {
                        let t = parse_int_type(t.as_str())?;
                        self.builder.checksum_with(&[], algorithm, DataType::Integer(t))
                    }
                    None => self.builder.checksum(&[], algorithm),
                };
                self.defer(id, symbol, targets);
                Ok(id)
            }
            Rule::value_expr => {
                let target = next_pair(&mut inner.into_inner(), "value target")?.as_str().to_string();
                let id = self.builder.value_of(VariableId(0));
                self.defer(id, symbol, vec![target]);
                Ok(id)
            }
            Rule::padding_expr => {
                let mut it = inner.into_inner();
                let targets = build_targets(next_pair(&mut it, "padding targets")?);
                let modulo = parse_number(next_pair(&mut it, "padding modulo")?.as_str())?;
                let fill = match it.next() {
                    Some(h) => match parse_hex_bytes(h.as_str())?.as_slice() {
                        [b] => *b,
                        _ => return Err(semantic("padding fill must be a single byte")),
                    },
                    None => 0,
                };
                let id = self.builder.padding(&[], modulo, fill);
                self.defer(id, symbol, targets);
                Ok(id)
            }
            Rule::typed_const => {
                let mut it = inner.into_inner();
                let t = parse_int_type(next_pair(&mut it, "constant type")?.as_str())?;
                let literal = next_pair(&mut it, "constant value")?.as_str();
                let scope = build_scope(it.next(), Scope::Constant)?;
                let bits = encode_int_literal(&t, literal)?;
                Ok(self.builder.defined(DataType::Integer(t), bits, scope))
            }
            Rule::data_expr => {
                let mut it = inner.into_inner();
                let data_type = build_data_type(next_pair(&mut it, "data type")?)?;
                let scope = build_scope(it.next(), Scope::Message)?;
                Ok(self.builder.data(data_type, scope))
            }
            Rule::literal_expr => {
                let mut it = inner.into_inner();
                let (bytes, is_text) = build_literal(next_pair(&mut it, "literal")?)?;
                let scope = build_scope(it.next(), Scope::Constant)?;
                let printable = bytes
                    .iter()
                    .all(|b| b.is_ascii_graphic() || matches!(b, b' ' | b'\t' | b'\r' | b'\n'));
                let data_type = if is_text && printable {
                    DataType::ascii(bytes.len())
                } else {
                    DataType::raw(bytes.len())
                };
                Ok(self.builder.defined(data_type, BitBuffer::from(bytes), scope))
            }
            r => Err(semantic(format!("unexpected rule {:?}", r))),
        }
    }

    fn defer(&mut self, relation: VariableId, symbol: &str, targets: Vec<String>) {
        self.unresolved.push(Unresolved { relation, symbol: symbol.to_string(), targets });
    }

    fn lookup(&self, symbol: &str, target: &str) -> Option<VariableId> {
        if let Some(id) = self.names.get(&(symbol.to_string(), target.to_string())) {
            return Some(*id);
        }
        let (other, rest) = target.split_once('.')?;
        self.names.get(&(other.to_string(), rest.to_string())).copied()
    }

    fn finish(mut self) -> Result<Vocabulary, DslError> {
        for u in std::mem::take(&mut self.unresolved) {
            let ids = u
                .targets
                .iter()
                .map(|t| {
                    self.lookup(&u.symbol, t)
                        .ok_or_else(|| semantic(format!("unknown target {} in symbol {}", t, u.symbol)))
                })
                .collect::<Result<Vec<_>, _>>()?;
            self.builder.set_targets(u.relation, &ids)?;
        }
        Ok(self.builder.into_vocabulary())
    }
}

fn build_targets(pair: Pair<Rule>) -> Vec<String> {
    pair.into_inner().map(|t| t.as_str().to_string()).collect()
}

fn build_scope(pair: Option<Pair<Rule>>, default: Scope) -> Result<Scope, DslError> {
    match pair {
        Some(p) => Scope::from_name(p.as_str()).ok_or_else(|| semantic(format!("unknown scope {}", p.as_str()))),
        None => Ok(default),
    }
}

fn build_count(pair: Pair<Rule>) -> Result<(usize, Option<usize>), DslError> {
    let inner = next_pair(&mut pair.into_inner(), "count")?;
    match inner.as_rule() {
        Rule::bounds => {
            let mut it = inner.into_inner();
            let min = parse_number(next_pair(&mut it, "lower bound")?.as_str())?;
            let max = it.next().map(|p| parse_number(p.as_str())).transpose()?;
            if max.is_some_and(|m| m < min) {
                return Err(semantic(format!("empty range {}..{:?}", min, max)));
            }
            Ok((min, max))
        }
        _ => {
            let n = parse_number(inner.as_str())?;
            Ok((n, Some(n)))
        }
    }
}

fn build_data_type(pair: Pair<Rule>) -> Result<DataType, DslError> {
    let inner = next_pair(&mut pair.into_inner(), "data type")?;
    let rule = inner.as_rule();
    let text = inner.as_str();
    Ok(match rule {
        Rule::int_type => DataType::Integer(parse_int_type(text)?),
        Rule::ipv4_type => DataType::Ipv4 {
            endianness: if text.ends_with("le") { Endianness::Little } else { Endianness::Big },
        },
        Rule::raw_type | Rule::ascii_type | Rule::bits_type => {
            let (min, max) = build_count(next_pair(&mut inner.into_inner(), "size")?)?;
            match rule {
                Rule::raw_type => DataType::Raw { min_bytes: min, max_bytes: max },
                Rule::ascii_type => DataType::Ascii { min_chars: min, max_chars: max },
                _ => DataType::BitField { min_bits: min, max_bits: max },
            }
        }
        r => return Err(semantic(format!("unexpected type rule {:?}", r))),
    })
}

fn parse_int_type(s: &str) -> Result<IntegerType, DslError> {
    let (signed, rest) = match s.strip_prefix("uint") {
        Some(rest) => (false, rest),
        None => (true, s.strip_prefix("int").ok_or_else(|| semantic(format!("bad integer type {}", s)))?),
    };
    let (digits, endianness) = if let Some(d) = rest.strip_suffix("le") {
        (d, Endianness::Little)
    } else {
        (rest.strip_suffix("be").unwrap_or(rest), Endianness::Big)
    };
    let width: u8 = digits.parse().map_err(|_| semantic(format!("bad integer type {}", s)))?;
    IntegerType::new(width, signed, endianness).map_err(|e| semantic(e.to_string()))
}

fn parse_number(s: &str) -> Result<usize, DslError> {
    s.parse().map_err(|_| semantic(format!("invalid number {}", s)))
}

fn encode_int_literal(t: &IntegerType, s: &str) -> Result<BitBuffer, DslError> {
    let (negative, body) = match s.strip_prefix('-') {
        Some(b) => (true, b),
        None => (false, s),
    };
    let magnitude = match body.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => body.parse::<u64>(),
    }
    .map_err(|_| semantic(format!("invalid integer {}", s)))?;
    let encoded = if negative {
        let v = i64::try_from(magnitude).map_err(|_| semantic(format!("integer out of range {}", s)))?;
        t.encode_i64(-v)
    } else {
        t.encode_u64(magnitude)
    };
    encoded.map_err(|e| semantic(e.to_string()))
}

/// Bytes of a literal, and whether it was written as a string.
fn build_literal(pair: Pair<Rule>) -> Result<(Vec<u8>, bool), DslError> {
    let inner = next_pair(&mut pair.into_inner(), "literal")?;
    match inner.as_rule() {
        Rule::string => {
            let body = inner.into_inner().next().map(|p| p.as_str()).unwrap_or("");
            Ok((unescape(body)?, true))
        }
        _ => Ok((parse_hex_bytes(inner.as_str())?, false)),
    }
}

fn parse_hex_bytes(s: &str) -> Result<Vec<u8>, DslError> {
    let hex = s.strip_prefix("0x").unwrap_or(s);
    if hex.len() % 2 != 0 {
        return Err(semantic(format!("odd number of hex digits in {}", s)));
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| semantic(format!("invalid hex {}", s))))
        .collect()
}

fn unescape(s: &str) -> Result<Vec<u8>, DslError> {
    let mut out = Vec::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            let mut buf = [0u8; 4];
            out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            continue;
        }
        match chars.next() {
            Some('n') => out.push(b'\n'),
            Some('r') => out.push(b'\r'),
            Some('t') => out.push(b'\t'),
            Some('0') => out.push(0),
            Some('"') => out.push(b'"'),
            Some('\\') => out.push(b'\\'),
            Some('x') => {
                let hex: String = chars.by_ref().take(2).collect();
                let b = u8::from_str_radix(&hex, 16).map_err(|_| semantic(format!("invalid escape \\x{}", hex)))?;
                out.push(b);
            }
            other => return Err(semantic(format!("invalid escape {:?}", other))),
        }
    }
    Ok(out)
}
