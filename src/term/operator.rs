use std::fmt::{self, Display};
use std::sync::Arc;

use crate::schema::SchemaVariable;
use crate::sort::Sort;
use crate::Symbol;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Junctor {
    True,
    False,
    Not,
    And,
    Or,
    Imp,
}

impl Junctor {
    pub fn arity(self) -> usize {
        match self {
            Junctor::True | Junctor::False => 0,
            Junctor::Not => 1,
            Junctor::And | Junctor::Or | Junctor::Imp => 2,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Junctor::True => "true",
            Junctor::False => "false",
            Junctor::Not => "!",
            Junctor::And => "&",
            Junctor::Or => "|",
            Junctor::Imp => "->",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Quantifier {
    All,
    Ex,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ModalityKind {
    Diamond,
    Box,
}

/// The program inside a modality. Programs are opaque to the prover; taclets
/// can only bind them as a whole through a program schema variable.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ModalProgram {
    Concrete(Arc<str>),
    Schema(SchemaVariable),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FunctionKind {
    /// An uninterpreted rigid function or predicate.
    Plain,
    /// A field read `o.f`. Depends on the heap, hence non-rigid.
    Field,
    /// An array element read `a[i]`. Non-rigid.
    ArrayElement,
    /// A constant introduced by a quantifier rule.
    Skolem,
    /// A transformer. Rewriting below it is never allowed for restricted taclets.
    Transformer,
}

#[derive(Debug, PartialEq, Eq, Hash)]
struct FunctionDecl {
    name: Symbol,
    args: Vec<Sort>,
    sort: Sort,
    kind: FunctionKind,
}

/// A function or predicate symbol. Predicates are functions of sort
/// [`Sort::Formula`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Function(Arc<FunctionDecl>);

impl Function {
    fn make(name: &str, args: Vec<Sort>, sort: Sort, kind: FunctionKind) -> Function {
        Function(Arc::new(FunctionDecl {
            name: Symbol::from(name),
            args,
            sort,
            kind,
        }))
    }

    pub fn new(name: &str, args: Vec<Sort>, sort: Sort) -> Function {
        Self::make(name, args, sort, FunctionKind::Plain)
    }

    pub fn constant(name: &str, sort: Sort) -> Function {
        Self::make(name, vec![], sort, FunctionKind::Plain)
    }

    pub fn predicate(name: &str, args: Vec<Sort>) -> Function {
        Self::make(name, args, Sort::Formula, FunctionKind::Plain)
    }

    pub fn field(name: &str, owner: Sort, sort: Sort) -> Function {
        Self::make(name, vec![owner], sort, FunctionKind::Field)
    }

    pub fn array_element(name: &str, array: Sort, index: Sort, sort: Sort) -> Function {
        Self::make(name, vec![array, index], sort, FunctionKind::ArrayElement)
    }

    pub fn skolem(name: &str, sort: Sort) -> Function {
        Self::make(name, vec![], sort, FunctionKind::Skolem)
    }

    pub fn transformer(name: &str, args: Vec<Sort>, sort: Sort) -> Function {
        Self::make(name, args, sort, FunctionKind::Transformer)
    }

    pub fn null() -> Function {
        Self::make("null", vec![], Sort::Null, FunctionKind::Plain)
    }

    pub fn name(&self) -> Symbol {
        self.0.name
    }

    pub fn arg_sorts(&self) -> &[Sort] {
        &self.0.args
    }

    pub fn sort(&self) -> Sort {
        self.0.sort
    }

    pub fn kind(&self) -> FunctionKind {
        self.0.kind
    }

    pub fn arity(&self) -> usize {
        self.0.args.len()
    }

    pub fn is_rigid(&self) -> bool {
        !self.is_location()
    }

    /// Field and array reads denote heap locations.
    pub fn is_location(&self) -> bool {
        matches!(self.0.kind, FunctionKind::Field | FunctionKind::ArrayElement)
    }

    pub fn is_skolem(&self) -> bool {
        self.0.kind == FunctionKind::Skolem
    }

    pub fn is_predicate(&self) -> bool {
        self.0.sort.is_formula()
    }

    /// Binary functions with symbolic names print infix, e.g. `x + 1`.
    pub fn is_infix(&self) -> bool {
        self.arity() == 2
            && self.0.kind == FunctionKind::Plain
            && !self.0.name.as_str().chars().any(|c| c.is_alphanumeric() || c == '_')
    }
}

impl Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.name)
    }
}

/// A variable bound by quantifiers and substitutions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LogicVariable {
    pub name: Symbol,
    pub sort: Sort,
}

impl LogicVariable {
    pub fn new(name: &str, sort: Sort) -> LogicVariable {
        LogicVariable {
            name: Symbol::from(name),
            sort,
        }
    }
}

impl Display for LogicVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// A program variable. Its value depends on the state, hence non-rigid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ProgramVariable {
    pub name: Symbol,
    pub sort: Sort,
}

impl ProgramVariable {
    pub fn new(name: &str, sort: Sort) -> ProgramVariable {
        ProgramVariable {
            name: Symbol::from(name),
            sort,
        }
    }
}

impl Display for ProgramVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Something a binder can bind: a logic variable in concrete terms, or a
/// variable schema variable in taclet patterns.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum QuantifiableVariable {
    Logic(LogicVariable),
    Schema(SchemaVariable),
}

impl QuantifiableVariable {
    pub fn sort(&self) -> Sort {
        match self {
            QuantifiableVariable::Logic(v) => v.sort,
            QuantifiableVariable::Schema(sv) => sv.sort(),
        }
    }

    pub fn as_logic(&self) -> Option<&LogicVariable> {
        match self {
            QuantifiableVariable::Logic(v) => Some(v),
            QuantifiableVariable::Schema(_) => None,
        }
    }
}

impl Display for QuantifiableVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuantifiableVariable::Logic(v) => write!(f, "{v}"),
            QuantifiableVariable::Schema(sv) => write!(f, "{sv}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Operator {
    Junctor(Junctor),
    Equals,
    Equiv,
    IfThenElse,
    Quantifier(Quantifier),
    Function(Function),
    LogicVariable(LogicVariable),
    ProgramVariable(ProgramVariable),
    SchemaVariable(SchemaVariable),
    /// `x := t`
    ElementaryUpdate(ProgramVariable),
    /// `o.f := t` or `a[i] := t`: the location arguments followed by the value.
    Store(Function),
    /// `u1 || u2`
    UpdateParallel,
    Skip,
    /// `{u}t`: the update followed by the target.
    UpdateApplication,
    Modality(ModalityKind, ModalProgram),
    /// `{\subst x; t}target`. Only occurs in goal templates; instantiation
    /// performs the substitution.
    Subst,
}

impl Operator {
    /// The number of subterms, if fixed by the operator alone.
    pub fn arity(&self) -> usize {
        match self {
            Operator::Junctor(j) => j.arity(),
            Operator::Equals | Operator::Equiv => 2,
            Operator::IfThenElse => 3,
            Operator::Quantifier(_) => 1,
            Operator::Function(f) => f.arity(),
            Operator::LogicVariable(_)
            | Operator::ProgramVariable(_)
            | Operator::SchemaVariable(_)
            | Operator::Skip => 0,
            Operator::ElementaryUpdate(_) => 1,
            Operator::Store(f) => f.arity() + 1,
            Operator::UpdateParallel | Operator::UpdateApplication | Operator::Subst => 2,
            Operator::Modality(..) => 1,
        }
    }

    /// Number of variables the operator binds.
    pub fn binder_count(&self) -> usize {
        match self {
            Operator::Quantifier(_) | Operator::Subst => 1,
            _ => 0,
        }
    }

    /// Whether the bound variables of the operator scope over the given child.
    pub fn binds_in(&self, child: usize) -> bool {
        match self {
            Operator::Subst => child == 1,
            _ => self.binder_count() > 0,
        }
    }

    pub fn is_junctor(&self, junctor: Junctor) -> bool {
        matches!(self, Operator::Junctor(j) if *j == junctor)
    }

    pub fn is_modality(&self) -> bool {
        matches!(self, Operator::Modality(..))
    }

    pub fn is_transformer(&self) -> bool {
        matches!(self, Operator::Function(f) if f.kind() == FunctionKind::Transformer)
    }

    pub fn as_function(&self) -> Option<&Function> {
        match self {
            Operator::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_schema_variable(&self) -> Option<&SchemaVariable> {
        match self {
            Operator::SchemaVariable(sv) => Some(sv),
            _ => None,
        }
    }
}
