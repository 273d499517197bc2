//! Vocabulary model: variables (leaves, relations, combinators), fields and symbols.
//!
//! Variables are stored in an arena owned by the [`Vocabulary`] and addressed by
//! [`VariableId`]. Combinators refer to their children by id and relations refer to
//! their targets by id, so a relation may point anywhere in the vocabulary (before
//! or after itself, or at a node that contains it).
//!
//! A [`Vocabulary`] is checked once by [`ResolvedVocabulary::resolve`] and then
//! shared, read-only, by every parse and specialization.

use crate::bits::BitBuffer;
use crate::checksum::ChecksumAlgorithm;
use crate::scope::Scope;
use crate::types::{DataType, IntegerType};
use std::collections::HashMap;
use std::fmt;

/// Upper bound on repeat iterations.
pub const MAX_REPEAT: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VariableId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldId(pub usize);

impl fmt::Display for VariableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "f{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct Variable {
    pub name: Option<String>,
    pub scope: Scope,
    pub kind: VariableKind,
}

#[derive(Debug, Clone)]
pub enum VariableKind {
    /// Typed leaf, optionally carrying a definition value.
    Data { data_type: DataType, value: Option<BitBuffer> },
    Size(SizeRelation),
    Checksum(ChecksumRelation),
    ValueOf(ValueRelation),
    Padding(PaddingRelation),
    Alt { children: Vec<VariableId> },
    Agg { children: Vec<VariableId> },
    Repeat(RepeatSpec),
}

/// Encodes `bits(targets) * factor + offset` with `data_type`.
#[derive(Debug, Clone)]
pub struct SizeRelation {
    pub targets: Vec<VariableId>,
    pub data_type: DataType,
    /// Multiplier applied to the size in bits (1/8 counts bytes).
    pub factor: f64,
    pub offset: i64,
}

#[derive(Debug, Clone)]
pub struct ChecksumRelation {
    pub targets: Vec<VariableId>,
    pub algorithm: ChecksumAlgorithm,
    pub data_type: DataType,
}

/// Copies the bits of another variable.
#[derive(Debug, Clone)]
pub struct ValueRelation {
    pub target: VariableId,
}

/// Fills with `fill` until the targets plus the padding reach a multiple of `modulo_bits`.
#[derive(Debug, Clone)]
pub struct PaddingRelation {
    pub targets: Vec<VariableId>,
    pub modulo_bits: usize,
    pub fill: u8,
}

#[derive(Debug, Clone)]
pub struct RepeatSpec {
    pub child: VariableId,
    pub min: usize,
    pub max: usize,
    pub delimiter: Option<BitBuffer>,
}

impl Variable {
    pub fn is_leaf(&self) -> bool {
        !matches!(self.kind, VariableKind::Alt { .. } | VariableKind::Agg { .. } | VariableKind::Repeat(_))
    }

    pub fn is_relation(&self) -> bool {
        matches!(
            self.kind,
            VariableKind::Size(_) | VariableKind::Checksum(_) | VariableKind::ValueOf(_) | VariableKind::Padding(_)
        )
    }

    /// Variables this relation reads (empty for non relations).
    pub fn relation_targets(&self) -> Vec<VariableId> {
        match &self.kind {
            VariableKind::Size(r) => r.targets.clone(),
            VariableKind::Checksum(r) => r.targets.clone(),
            VariableKind::ValueOf(r) => vec![r.target],
            VariableKind::Padding(r) => r.targets.clone(),
            _ => Vec::new(),
        }
    }

    pub fn children(&self) -> Vec<VariableId> {
        match &self.kind {
            VariableKind::Alt { children } | VariableKind::Agg { children } => children.clone(),
            VariableKind::Repeat(spec) => vec![spec.child],
            _ => Vec::new(),
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            VariableKind::Data { .. } => "data",
            VariableKind::Size(_) => "size",
            VariableKind::Checksum(_) => "checksum",
            VariableKind::ValueOf(_) => "value",
            VariableKind::Padding(_) => "padding",
            VariableKind::Alt { .. } => "alt",
            VariableKind::Agg { .. } => "agg",
            VariableKind::Repeat(_) => "repeat",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Field {
    pub name: String,
    pub domain: VariableId,
}

#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    pub fields: Vec<FieldId>,
}

#[derive(Debug, Clone, Default)]
pub struct Vocabulary {
    pub variables: Vec<Variable>,
    pub fields: Vec<Field>,
    pub symbols: Vec<Symbol>,
}

#[derive(Debug, thiserror::Error)]
pub enum GrammarError {
    #[error("Unknown variable: {0}")]
    UnknownVariable(VariableId),
    #[error("Unknown field: {0}")]
    UnknownField(FieldId),
    #[error("Variable {0} has more than one parent")]
    MultipleParents(String),
    #[error("Field domain {0} is already used elsewhere")]
    DomainReused(String),
    #[error("Field {0} belongs to more than one symbol")]
    FieldReused(String),
    #[error("Cyclic relation dependency through {0}")]
    CyclicRelation(String),
    #[error("Unbounded leaf in {symbol}.{field}: only the last field may be unbounded")]
    UnboundedLeaf { symbol: String, field: String },
    #[error("Relation {0} needs a fixed-width integer type")]
    RelationWidth(String),
    #[error("Relation {0} targets a variable that is in no field")]
    UnreachableTarget(String),
    #[error("Constant {0} has no value")]
    MissingConstantValue(String),
    #[error("Value of {0} does not match its type")]
    InvalidValue(String),
    #[error("Invalid repeat bounds on {0}")]
    InvalidRepeat(String),
    #[error("Invalid padding on {0}")]
    InvalidPadding(String),
    #[error("Scope {scope} not applicable to {variable}")]
    ScopeNotApplicable { variable: String, scope: Scope },
    #[error("Duplicate symbol name: {0}")]
    DuplicateSymbol(String),
    #[error("Duplicate field name {field} in symbol {symbol}")]
    DuplicateField { symbol: String, field: String },
    #[error("Symbol {0} has no fields")]
    EmptySymbol(String),
}

/// Incremental construction of a [`Vocabulary`].
///
/// ```
/// use protovocab::{DataType, Scope, VocabularyBuilder};
///
/// let mut b = VocabularyBuilder::new();
/// let hello = b.text("hello ");
/// let name = b.data(DataType::ascii_range(5, 10), Scope::Session);
/// let tail = b.text(", welcome");
/// let fields = vec![b.field("greeting", hello), b.field("name", name), b.field("tail", tail)];
/// b.symbol("Greeting", fields);
/// let vocab = b.build().expect("valid vocabulary");
/// assert_eq!(vocab.symbols().len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct VocabularyBuilder {
    vocab: Vocabulary,
}

impl VocabularyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, scope: Scope, kind: VariableKind) -> VariableId {
        let id = VariableId(self.vocab.variables.len());
        self.vocab.variables.push(Variable { name: None, scope, kind });
        id
    }

    /// Constant leaf of `data_type` holding `value`.
    pub fn constant(&mut self, data_type: DataType, value: BitBuffer) -> VariableId {
        self.push(Scope::Constant, VariableKind::Data { data_type, value: Some(value) })
    }

    /// ASCII constant.
    pub fn text(&mut self, s: &str) -> VariableId {
        self.constant(DataType::ascii(s.len()), BitBuffer::from(s))
    }

    /// Raw byte constant.
    pub fn bytes(&mut self, b: &[u8]) -> VariableId {
        self.constant(DataType::raw(b.len()), BitBuffer::from(b))
    }

    pub fn data(&mut self, data_type: DataType, scope: Scope) -> VariableId {
        self.push(scope, VariableKind::Data { data_type, value: None })
    }

    /// Leaf with a definition value and an explicit scope.
    pub fn defined(&mut self, data_type: DataType, value: BitBuffer, scope: Scope) -> VariableId {
        self.push(scope, VariableKind::Data { data_type, value: Some(value) })
    }

    /// Size in bytes of `targets`.
    pub fn size(&mut self, targets: &[VariableId], data_type: DataType) -> VariableId {
        self.size_with(targets, data_type, 1.0 / 8.0, 0)
    }

    pub fn size_with(&mut self, targets: &[VariableId], data_type: DataType, factor: f64, offset: i64) -> VariableId {
        self.push(
            Scope::None,
            VariableKind::Size(SizeRelation { targets: targets.to_vec(), data_type, factor, offset }),
        )
    }

    /// Checksum over `targets`, encoded big-endian on the algorithm width.
    pub fn checksum(&mut self, targets: &[VariableId], algorithm: ChecksumAlgorithm) -> VariableId {
        let data_type = match algorithm.width_bits() {
            32 => DataType::Integer(IntegerType::uint32be()),
            _ => DataType::Integer(IntegerType::uint16be()),
        };
        self.checksum_with(targets, algorithm, data_type)
    }

    pub fn checksum_with(&mut self, targets: &[VariableId], algorithm: ChecksumAlgorithm, data_type: DataType) -> VariableId {
        self.push(
            Scope::None,
            VariableKind::Checksum(ChecksumRelation { targets: targets.to_vec(), algorithm, data_type }),
        )
    }

    pub fn internet_checksum(&mut self, targets: &[VariableId]) -> VariableId {
        self.checksum(targets, ChecksumAlgorithm::Internet)
    }

    pub fn value_of(&mut self, target: VariableId) -> VariableId {
        self.push(Scope::None, VariableKind::ValueOf(ValueRelation { target }))
    }

    pub fn padding(&mut self, targets: &[VariableId], modulo_bits: usize, fill: u8) -> VariableId {
        self.push(
            Scope::None,
            VariableKind::Padding(PaddingRelation { targets: targets.to_vec(), modulo_bits, fill }),
        )
    }

    pub fn alt(&mut self, children: &[VariableId]) -> VariableId {
        self.push(Scope::None, VariableKind::Alt { children: children.to_vec() })
    }

    pub fn agg(&mut self, children: &[VariableId]) -> VariableId {
        self.push(Scope::None, VariableKind::Agg { children: children.to_vec() })
    }

    pub fn repeat(&mut self, child: VariableId, min: usize, max: usize) -> VariableId {
        self.push(Scope::None, VariableKind::Repeat(RepeatSpec { child, min, max, delimiter: None }))
    }

    pub fn repeat_delimited(&mut self, child: VariableId, min: usize, max: usize, delimiter: BitBuffer) -> VariableId {
        self.push(
            Scope::None,
            VariableKind::Repeat(RepeatSpec { child, min, max, delimiter: Some(delimiter) }),
        )
    }

    /// Point an existing relation at new targets (for relations covering a node that contains them).
    pub fn set_targets(&mut self, relation: VariableId, targets: &[VariableId]) -> Result<(), GrammarError> {
        let var = self
            .vocab
            .variables
            .get_mut(relation.0)
            .ok_or(GrammarError::UnknownVariable(relation))?;
        match &mut var.kind {
            VariableKind::Size(r) => r.targets = targets.to_vec(),
            VariableKind::Checksum(r) => r.targets = targets.to_vec(),
            VariableKind::Padding(r) => r.targets = targets.to_vec(),
            VariableKind::ValueOf(r) => match targets {
                [t] => r.target = *t,
                _ => return Err(GrammarError::InvalidValue(format!("{} takes exactly one target", relation))),
            },
            _ => return Err(GrammarError::InvalidValue(format!("{} is not a relation", relation))),
        }
        Ok(())
    }

    pub fn set_name(&mut self, id: VariableId, name: &str) {
        if let Some(v) = self.vocab.variables.get_mut(id.0) {
            v.name = Some(name.to_string());
        }
    }

    pub fn set_scope(&mut self, id: VariableId, scope: Scope) {
        if let Some(v) = self.vocab.variables.get_mut(id.0) {
            v.scope = scope;
        }
    }

    pub fn variable(&self, id: VariableId) -> Option<&Variable> {
        self.vocab.variables.get(id.0)
    }

    pub fn field(&mut self, name: &str, domain: VariableId) -> FieldId {
        let id = FieldId(self.vocab.fields.len());
        self.vocab.fields.push(Field { name: name.to_string(), domain });
        id
    }

    pub fn symbol(&mut self, name: &str, fields: Vec<FieldId>) {
        self.vocab.symbols.push(Symbol { name: name.to_string(), fields });
    }

    pub fn into_vocabulary(self) -> Vocabulary {
        self.vocab
    }

    pub fn build(self) -> Result<ResolvedVocabulary, GrammarError> {
        ResolvedVocabulary::resolve(self.vocab)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Temporary,
    Permanent,
}

/// Checked vocabulary plus the lookup tables the parser and specializer need.
#[derive(Debug, Clone)]
pub struct ResolvedVocabulary {
    pub vocabulary: Vocabulary,
    symbols_by_name: HashMap<String, usize>,
    parents: Vec<Option<VariableId>>,
    owner_field: Vec<Option<FieldId>>,
    owner_symbol: Vec<usize>,
    bounds: Vec<(usize, Option<usize>)>,
    relation_order: Vec<VariableId>,
}

impl ResolvedVocabulary {
    pub fn resolve(vocabulary: Vocabulary) -> Result<Self, GrammarError> {
        let n = vocabulary.variables.len();
        let label = |id: VariableId| label_of(&vocabulary, id);

        let mut symbols_by_name = HashMap::new();
        let mut owner_symbol = vec![usize::MAX; vocabulary.fields.len()];
        for (i, s) in vocabulary.symbols.iter().enumerate() {
            if symbols_by_name.insert(s.name.clone(), i).is_some() {
                return Err(GrammarError::DuplicateSymbol(s.name.clone()));
            }
            if s.fields.is_empty() {
                return Err(GrammarError::EmptySymbol(s.name.clone()));
            }
            let mut names = HashMap::new();
            for &f in &s.fields {
                let field = vocabulary.fields.get(f.0).ok_or(GrammarError::UnknownField(f))?;
                if names.insert(field.name.as_str(), f).is_some() {
                    return Err(GrammarError::DuplicateField { symbol: s.name.clone(), field: field.name.clone() });
                }
                if owner_symbol[f.0] != usize::MAX {
                    return Err(GrammarError::FieldReused(field.name.clone()));
                }
                owner_symbol[f.0] = i;
            }
        }

        let check = |id: VariableId| -> Result<(), GrammarError> {
            if id.0 < n {
                Ok(())
            } else {
                Err(GrammarError::UnknownVariable(id))
            }
        };

        // Parent links; every variable sits under at most one node or field.
        let mut parents: Vec<Option<VariableId>> = vec![None; n];
        let mut is_domain = vec![false; n];
        for (i, var) in vocabulary.variables.iter().enumerate() {
            for child in var.children() {
                check(child)?;
                if parents[child.0].is_some() || child.0 == i {
                    return Err(GrammarError::MultipleParents(label(child)));
                }
                parents[child.0] = Some(VariableId(i));
            }
            for target in var.relation_targets() {
                check(target)?;
            }
        }
        for field in &vocabulary.fields {
            check(field.domain)?;
            if parents[field.domain.0].is_some() || is_domain[field.domain.0] {
                return Err(GrammarError::DomainReused(field.name.clone()));
            }
            is_domain[field.domain.0] = true;
        }

        let mut owner_field: Vec<Option<FieldId>> = vec![None; n];
        for (i, field) in vocabulary.fields.iter().enumerate() {
            for id in descendants(&vocabulary, field.domain) {
                owner_field[id.0] = Some(FieldId(i));
            }
        }

        for (i, var) in vocabulary.variables.iter().enumerate() {
            let id = VariableId(i);
            check_variable(&vocabulary, id, var)?;
            for target in var.relation_targets() {
                if owner_field[target.0].is_none() {
                    return Err(GrammarError::UnreachableTarget(label(id)));
                }
            }
            if let VariableKind::ValueOf(r) = &var.kind {
                if descendants(&vocabulary, r.target).contains(&id) {
                    return Err(GrammarError::CyclicRelation(label(id)));
                }
            }
        }

        // Relation dependency graph: a relation depends on every relation found
        // under its targets. Self edges are allowed (a checksum covering itself).
        let mut deps: HashMap<VariableId, Vec<VariableId>> = HashMap::new();
        for (i, var) in vocabulary.variables.iter().enumerate() {
            if !var.is_relation() {
                continue;
            }
            let id = VariableId(i);
            let mut d = Vec::new();
            for target in var.relation_targets() {
                for inner in descendants(&vocabulary, target) {
                    if inner != id && vocabulary.variables[inner.0].is_relation() && !d.contains(&inner) {
                        d.push(inner);
                    }
                }
            }
            deps.insert(id, d);
        }
        let mut marks: HashMap<VariableId, Mark> = HashMap::new();
        let mut relation_order = Vec::new();
        for i in 0..n {
            let id = VariableId(i);
            if deps.contains_key(&id) {
                visit_relation(&vocabulary, id, &deps, &mut marks, &mut relation_order)?;
            }
        }

        let mut bounds: Vec<Option<(usize, Option<usize>)>> = vec![None; n];
        for i in 0..n {
            compute_bounds(&vocabulary, VariableId(i), &mut bounds);
        }
        let bounds: Vec<(usize, Option<usize>)> = bounds.into_iter().map(|b| b.unwrap_or((0, None))).collect();

        for s in &vocabulary.symbols {
            let last = s.fields.len() - 1;
            for (pos, f) in s.fields.iter().enumerate() {
                let field = &vocabulary.fields[f.0];
                if pos != last && bounds[field.domain.0].1.is_none() {
                    return Err(GrammarError::UnboundedLeaf { symbol: s.name.clone(), field: field.name.clone() });
                }
            }
        }

        tracing::debug!(
            variables = n,
            fields = vocabulary.fields.len(),
            symbols = vocabulary.symbols.len(),
            relations = relation_order.len(),
            "vocabulary resolved"
        );

        Ok(ResolvedVocabulary {
            vocabulary,
            symbols_by_name,
            parents,
            owner_field,
            owner_symbol,
            bounds,
            relation_order,
        })
    }

    pub fn variable(&self, id: VariableId) -> &Variable {
        &self.vocabulary.variables[id.0]
    }

    pub fn field(&self, id: FieldId) -> &Field {
        &self.vocabulary.fields[id.0]
    }

    pub fn symbols(&self) -> &[Symbol] {
        &self.vocabulary.symbols
    }

    pub fn get_symbol(&self, name: &str) -> Option<&Symbol> {
        self.symbols_by_name.get(name).map(|&i| &self.vocabulary.symbols[i])
    }

    /// Field of `symbol` called `name`.
    pub fn find_field(&self, symbol: &str, name: &str) -> Option<FieldId> {
        self.get_symbol(symbol)?
            .fields
            .iter()
            .copied()
            .find(|f| self.field(*f).name == name)
    }

    /// Symbol owning `field`.
    pub fn symbol_of(&self, field: FieldId) -> Option<&Symbol> {
        self.owner_symbol.get(field.0).and_then(|&i| self.vocabulary.symbols.get(i))
    }

    pub fn parent(&self, id: VariableId) -> Option<VariableId> {
        self.parents[id.0]
    }

    /// Field whose tree contains `id`.
    pub fn field_of(&self, id: VariableId) -> Option<FieldId> {
        self.owner_field[id.0]
    }

    /// Whether `a` and `b` sit in fields of the same symbol.
    pub fn same_symbol(&self, a: VariableId, b: VariableId) -> bool {
        let owner = |v: VariableId| self.field_of(v).and_then(|f| self.owner_symbol.get(f.0).copied());
        matches!((owner(a), owner(b)), (Some(x), Some(y)) if x == y)
    }

    /// `(min, max)` size of the variable in bits; `max` is `None` when unbounded.
    pub fn bounds(&self, id: VariableId) -> (usize, Option<usize>) {
        self.bounds[id.0]
    }

    pub fn fixed_bits(&self, id: VariableId) -> Option<usize> {
        match self.bounds[id.0] {
            (min, Some(max)) if min == max => Some(min),
            _ => None,
        }
    }

    /// Relations ordered so that every relation comes after the relations it reads.
    pub fn relation_order(&self) -> &[VariableId] {
        &self.relation_order
    }

    /// `id` followed by all the variables below it, in declaration order.
    pub fn descendants(&self, id: VariableId) -> Vec<VariableId> {
        descendants(&self.vocabulary, id)
    }

    pub fn label(&self, id: VariableId) -> String {
        label_of(&self.vocabulary, id)
    }
}

fn label_of(vocabulary: &Vocabulary, id: VariableId) -> String {
    if let Some(name) = vocabulary.variables.get(id.0).and_then(|v| v.name.as_ref()) {
        return name.clone();
    }
    if let Some(f) = vocabulary.fields.iter().find(|f| f.domain == id) {
        return f.name.clone();
    }
    id.to_string()
}

fn descendants(vocabulary: &Vocabulary, id: VariableId) -> Vec<VariableId> {
    let mut out = Vec::new();
    let mut stack = vec![id];
    while let Some(cur) = stack.pop() {
        if out.contains(&cur) {
            continue;
        }
        out.push(cur);
        if let Some(var) = vocabulary.variables.get(cur.0) {
            for child in var.children().into_iter().rev() {
                stack.push(child);
            }
        }
    }
    out
}

fn check_variable(vocabulary: &Vocabulary, id: VariableId, var: &Variable) -> Result<(), GrammarError> {
    let label = || label_of(vocabulary, id);
    if !matches!(var.kind, VariableKind::Data { .. }) && var.scope != Scope::None {
        return Err(GrammarError::ScopeNotApplicable { variable: label(), scope: var.scope });
    }
    match &var.kind {
        VariableKind::Data { data_type, value } => match value {
            None if var.scope == Scope::Constant => return Err(GrammarError::MissingConstantValue(label())),
            Some(v) if !data_type.can_parse(v) => return Err(GrammarError::InvalidValue(label())),
            _ => {}
        },
        VariableKind::Size(r) => {
            match r.data_type {
                // an offset wider than the integer itself can never be encoded
                DataType::Integer(t) if r.factor.is_finite() && r.offset.unsigned_abs() <= t.max_unsigned() => {}
                _ => return Err(GrammarError::RelationWidth(label())),
            }
        }
        VariableKind::Checksum(r) => match r.data_type {
            DataType::Integer(t) if t.bits() >= r.algorithm.width_bits() => {}
            _ => return Err(GrammarError::RelationWidth(label())),
        },
        VariableKind::Padding(r) => {
            if r.modulo_bits == 0 {
                return Err(GrammarError::InvalidPadding(label()));
            }
        }
        VariableKind::Repeat(spec) => {
            if spec.max == 0 || spec.min > spec.max || spec.max > MAX_REPEAT {
                return Err(GrammarError::InvalidRepeat(label()));
            }
        }
        VariableKind::ValueOf(_) | VariableKind::Alt { .. } | VariableKind::Agg { .. } => {}
    }
    Ok(())
}

fn visit_relation(
    vocabulary: &Vocabulary,
    id: VariableId,
    deps: &HashMap<VariableId, Vec<VariableId>>,
    marks: &mut HashMap<VariableId, Mark>,
    order: &mut Vec<VariableId>,
) -> Result<(), GrammarError> {
    match marks.get(&id) {
        Some(Mark::Permanent) => return Ok(()),
        Some(Mark::Temporary) => return Err(GrammarError::CyclicRelation(label_of(vocabulary, id))),
        None => {}
    }
    marks.insert(id, Mark::Temporary);
    for &dep in deps.get(&id).map(Vec::as_slice).unwrap_or_default() {
        visit_relation(vocabulary, dep, deps, marks, order)?;
    }
    marks.insert(id, Mark::Permanent);
    order.push(id);
    Ok(())
}

fn add_bounds(a: (usize, Option<usize>), b: (usize, Option<usize>)) -> (usize, Option<usize>) {
    (a.0 + b.0, a.1.zip(b.1).map(|(x, y)| x + y))
}

fn compute_bounds(
    vocabulary: &Vocabulary,
    id: VariableId,
    memo: &mut Vec<Option<(usize, Option<usize>)>>,
) -> (usize, Option<usize>) {
    if let Some(b) = memo[id.0] {
        return b;
    }
    // Provisional entry so that a malformed value reference cannot recurse forever.
    memo[id.0] = Some((0, None));
    let var = &vocabulary.variables[id.0];
    let b = match &var.kind {
        VariableKind::Data { data_type, value } => match (var.scope, value) {
            (Scope::Constant, Some(v)) => (v.len(), Some(v.len())),
            _ => data_type.size_bits(),
        },
        VariableKind::Size(r) => r.data_type.size_bits(),
        VariableKind::Checksum(r) => r.data_type.size_bits(),
        VariableKind::ValueOf(r) => compute_bounds(vocabulary, r.target, memo),
        VariableKind::Padding(r) => (0, Some(r.modulo_bits.saturating_sub(1))),
        VariableKind::Alt { children } => {
            let mut acc: Option<(usize, Option<usize>)> = None;
            for &c in children {
                let cb = compute_bounds(vocabulary, c, memo);
                acc = Some(match acc {
                    None => cb,
                    Some(a) => (a.0.min(cb.0), a.1.zip(cb.1).map(|(x, y)| x.max(y))),
                });
            }
            acc.unwrap_or((0, Some(0)))
        }
        VariableKind::Agg { children } => children
            .iter()
            .fold((0, Some(0)), |acc, &c| add_bounds(acc, compute_bounds(vocabulary, c, memo))),
        VariableKind::Repeat(spec) => {
            let child = compute_bounds(vocabulary, spec.child, memo);
            let delim = spec.delimiter.as_ref().map(BitBuffer::len).unwrap_or(0);
            let min = child.0 * spec.min + delim * spec.min.saturating_sub(1);
            let max = child.1.map(|m| m * spec.max + delim * spec.max.saturating_sub(1));
            (min, max)
        }
    };
    memo[id.0] = Some(b);
    b
}
