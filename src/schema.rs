//! Schema variables, the placeholders of taclet patterns.

use std::fmt::{self, Display};
use std::sync::Arc;

use crate::sort::Sort;
use crate::term::{Operator, Term};
use crate::Symbol;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SvKind {
    /// Matches terms of the given sort. Rigid ones only match rigid terms.
    Term { sort: Sort, rigid: bool },
    Formula { rigid: bool },
    /// Matches logic variables, in binder positions and as leaves.
    Variable { sort: Sort },
    /// Instantiated with a fresh skolem constant on application.
    Skolem { sort: Sort },
    Update,
    /// Matches the program of a modality.
    Program,
}

#[derive(Debug, PartialEq, Eq, Hash)]
struct SvDecl {
    name: Symbol,
    kind: SvKind,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SchemaVariable(Arc<SvDecl>);

impl SchemaVariable {
    pub fn new(name: &str, kind: SvKind) -> SchemaVariable {
        SchemaVariable(Arc::new(SvDecl {
            name: Symbol::from(name),
            kind,
        }))
    }

    pub fn term(name: &str, sort: Sort) -> SchemaVariable {
        Self::new(name, SvKind::Term { sort, rigid: false })
    }

    pub fn rigid_term(name: &str, sort: Sort) -> SchemaVariable {
        Self::new(name, SvKind::Term { sort, rigid: true })
    }

    pub fn formula(name: &str) -> SchemaVariable {
        Self::new(name, SvKind::Formula { rigid: false })
    }

    pub fn rigid_formula(name: &str) -> SchemaVariable {
        Self::new(name, SvKind::Formula { rigid: true })
    }

    pub fn variable(name: &str, sort: Sort) -> SchemaVariable {
        Self::new(name, SvKind::Variable { sort })
    }

    pub fn skolem(name: &str, sort: Sort) -> SchemaVariable {
        Self::new(name, SvKind::Skolem { sort })
    }

    pub fn update(name: &str) -> SchemaVariable {
        Self::new(name, SvKind::Update)
    }

    pub fn program(name: &str) -> SchemaVariable {
        Self::new(name, SvKind::Program)
    }

    pub fn name(&self) -> Symbol {
        self.0.name
    }

    pub fn kind(&self) -> &SvKind {
        &self.0.kind
    }

    pub fn sort(&self) -> Sort {
        match &self.0.kind {
            SvKind::Term { sort, .. } | SvKind::Variable { sort } | SvKind::Skolem { sort } => {
                *sort
            }
            SvKind::Formula { .. } => Sort::Formula,
            SvKind::Update => Sort::Update,
            SvKind::Program => Sort::Any,
        }
    }

    pub fn is_rigid(&self) -> bool {
        matches!(
            self.0.kind,
            SvKind::Term { rigid: true, .. } | SvKind::Formula { rigid: true }
        )
    }

    pub fn is_variable(&self) -> bool {
        matches!(self.0.kind, SvKind::Variable { .. })
    }

    pub fn is_skolem(&self) -> bool {
        matches!(self.0.kind, SvKind::Skolem { .. })
    }

    pub fn is_program(&self) -> bool {
        matches!(self.0.kind, SvKind::Program)
    }

    /// Checks kind, sort and rigidity of a candidate instantiation. Generic
    /// sorts are checked separately against the generic sort instantiations.
    pub fn accepts(&self, term: &Term) -> Result<(), String> {
        let sort_ok = |sort: &Sort| sort.is_generic() || term.sort().extends(sort);
        let rigid_ok = !self.is_rigid() || term.is_rigid();
        let ok = match &self.0.kind {
            SvKind::Term { sort, .. } => term.sort().is_term_sort() && sort_ok(sort),
            SvKind::Formula { .. } => term.is_formula(),
            SvKind::Variable { sort } => {
                matches!(term.op(), Operator::LogicVariable(_)) && sort_ok(sort)
            }
            SvKind::Skolem { sort } => {
                matches!(term.op(), Operator::Function(f) if f.is_skolem()) && sort_ok(sort)
            }
            SvKind::Update => term.sort().is_update(),
            SvKind::Program => false,
        };
        if !ok {
            Err(format!("{term} of sort {} does not fit {:?}", term.sort(), self.0.kind))
        } else if !rigid_ok {
            Err(format!("{term} is not rigid"))
        } else {
            Ok(())
        }
    }
}

impl Display for SchemaVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.name)
    }
}

/// The binding context of a schema variable occurrence: the variable schema
/// variables bound above it in the taclet, and whether it occurs below the
/// find position of a rewrite taclet, where variables bound in the sequent
/// above the position may occur free in its instantiation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TacletPrefix {
    prefix: Vec<SchemaVariable>,
    context: bool,
}

impl TacletPrefix {
    pub fn new(prefix: Vec<SchemaVariable>, context: bool) -> TacletPrefix {
        TacletPrefix { prefix, context }
    }

    pub fn prefix(&self) -> &[SchemaVariable] {
        &self.prefix
    }

    pub fn context(&self) -> bool {
        self.context
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::term::{Function, LogicVariable, ProgramVariable, TermBuilder};

    #[test]
    fn kinds_and_rigidity() {
        let tb = TermBuilder;
        let int = Sort::data("int");
        let c = tb.func(&Function::constant("c", int), vec![]).unwrap();
        let x = tb.pv(ProgramVariable::new("x", int));
        let v = tb.var(LogicVariable::new("v", int));

        assert!(SchemaVariable::term("t", int).accepts(&x).is_ok());
        assert!(SchemaVariable::rigid_term("t", int).accepts(&x).is_err());
        assert!(SchemaVariable::rigid_term("t", int).accepts(&c).is_ok());
        assert!(SchemaVariable::variable("v", int).accepts(&c).is_err());
        assert!(SchemaVariable::variable("v", int).accepts(&v).is_ok());
        assert!(SchemaVariable::formula("phi").accepts(&c).is_err());
        assert!(SchemaVariable::term("t", Sort::generic("G")).accepts(&c).is_ok());
        assert!(SchemaVariable::term("t", Sort::object("Node"))
            .accepts(&c)
            .is_err());
    }
}
