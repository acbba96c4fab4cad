use std::fmt::{self, Display};

use crate::inst::SVInstantiations;
use crate::schema::SchemaVariable;
use crate::term::Operator;

/// A side condition on the instantiations of a taclet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VariableCondition {
    /// The variable `var` does not occur free in the instantiation of `term`.
    NotFreeIn {
        var: SchemaVariable,
        term: SchemaVariable,
    },
    /// The two schema variables are instantiated differently.
    DifferentInstantiation(SchemaVariable, SchemaVariable),
}

impl VariableCondition {
    /// Whether the condition holds. A condition whose schema variables are
    /// not all instantiated yet is treated as satisfied; it is checked again
    /// once the application is complete.
    pub fn check(&self, insts: &SVInstantiations) -> bool {
        match self {
            VariableCondition::NotFreeIn { var, term } => {
                match (insts.get_term(var), insts.get_term(term)) {
                    (Some(v), Some(t)) => match v.op() {
                        Operator::LogicVariable(lv) => !t.free_vars().contains(lv),
                        _ => true,
                    },
                    _ => true,
                }
            }
            VariableCondition::DifferentInstantiation(a, b) => {
                match (insts.get(a), insts.get(b)) {
                    (Some(x), Some(y)) => x != y,
                    _ => true,
                }
            }
        }
    }
}

impl Display for VariableCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VariableCondition::NotFreeIn { var, term } => write!(f, "\\notFreeIn({var}, {term})"),
            VariableCondition::DifferentInstantiation(a, b) => write!(f, "\\different({a}, {b})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inst::Instantiation;
    use crate::sort::Sort;
    use crate::term::{Function, LogicVariable, TermBuilder};

    #[test]
    fn not_free_in() {
        let tb = TermBuilder;
        let s = Sort::object("Node");
        let x = LogicVariable::new("x", s);
        let p = Function::predicate("p", vec![s]);
        let var = SchemaVariable::variable("v", s);
        let phi = SchemaVariable::formula("phi");
        let cond = VariableCondition::NotFreeIn {
            var: var.clone(),
            term: phi.clone(),
        };
        let insts = SVInstantiations::default()
            .add(var, Instantiation::Term(tb.var(x)), true)
            .unwrap();
        assert!(cond.check(&insts));
        let with_free = insts
            .add(
                phi.clone(),
                Instantiation::Term(tb.func(&p, vec![tb.var(x)]).unwrap()),
                true,
            )
            .unwrap();
        assert!(!cond.check(&with_free));
        let closed = insts
            .add(phi, Instantiation::Term(tb.func(&p, vec![tb.null()]).unwrap()), true)
            .unwrap();
        assert!(cond.check(&closed));
    }
}
