//! Parse one field's domain against a path.

use crate::ast::{FieldId, ResolvedVocabulary};
use crate::message_parser::LengthPolicy;
use crate::path::ParsingPath;
use crate::variable::{Paths, VariableParser};

#[derive(Debug, Clone, Copy)]
pub struct FieldParser<'a> {
    vocab: &'a ResolvedVocabulary,
    variables: VariableParser<'a>,
}

impl<'a> FieldParser<'a> {
    pub fn new(vocab: &'a ResolvedVocabulary, policy: LengthPolicy) -> Self {
        FieldParser { vocab, variables: VariableParser::new(vocab, policy) }
    }

    /// Successors of `path` with `field` parsed and recorded. When `carnivorous`,
    /// only successors that consumed every remaining bit are kept.
    pub fn parse(self, field: FieldId, path: ParsingPath, carnivorous: bool) -> Paths<'a> {
        let domain = self.vocab.field(field).domain;
        let start = path.offset();
        Box::new(self.variables.parse(domain, path).filter_map(move |mut p| {
            if carnivorous && p.remaining_len() != 0 {
                return None;
            }
            let end = p.offset();
            p.push_field(field, start..end);
            Some(p)
        }))
    }
}
