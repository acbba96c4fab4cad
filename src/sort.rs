//! Sorts of terms.
//!
//! The sort lattice is deliberately small: formulas and updates live outside
//! of it, every other sort extends [`Sort::Any`], and the sort of `null`
//! extends every reference sort.

use std::fmt::{self, Display};

use crate::Symbol;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Sort {
    Formula,
    Update,
    Any,
    /// The sort of `null`.
    Null,
    /// A reference sort. Terms of these sorts denote heap objects.
    Object(Symbol),
    /// A non-reference value sort such as `int` or `boolean`.
    Data(Symbol),
    /// A sort placeholder in taclet patterns, fixed during matching.
    Generic(Symbol),
}

impl Sort {
    pub fn object(name: &str) -> Sort {
        Sort::Object(Symbol::from(name))
    }

    pub fn data(name: &str) -> Sort {
        Sort::Data(Symbol::from(name))
    }

    pub fn generic(name: &str) -> Sort {
        Sort::Generic(Symbol::from(name))
    }

    pub fn name(&self) -> Symbol {
        match self {
            Sort::Formula => Symbol::from("Formula"),
            Sort::Update => Symbol::from("Update"),
            Sort::Any => Symbol::from("any"),
            Sort::Null => Symbol::from("Null"),
            Sort::Object(name) | Sort::Data(name) | Sort::Generic(name) => *name,
        }
    }

    pub fn is_formula(&self) -> bool {
        matches!(self, Sort::Formula)
    }

    pub fn is_update(&self) -> bool {
        matches!(self, Sort::Update)
    }

    /// Whether terms of this sort may appear as arguments of functions.
    pub fn is_term_sort(&self) -> bool {
        !matches!(self, Sort::Formula | Sort::Update)
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, Sort::Object(_) | Sort::Null)
    }

    pub fn is_generic(&self) -> bool {
        matches!(self, Sort::Generic(_))
    }

    /// The subsort relation. Generic sorts are compatible with every term
    /// sort since their instantiation is only known after matching.
    pub fn extends(&self, other: &Sort) -> bool {
        if self == other {
            return true;
        }
        match (self, other) {
            (Sort::Formula | Sort::Update, _) | (_, Sort::Formula | Sort::Update) => false,
            (_, Sort::Any) => true,
            (Sort::Null, Sort::Object(_)) => true,
            (Sort::Generic(_), _) | (_, Sort::Generic(_)) => true,
            _ => false,
        }
    }

    /// The least sort both arguments extend, if there is one.
    pub fn common_super_sort(&self, other: &Sort) -> Option<Sort> {
        if self.extends(other) && !other.is_generic() {
            Some(*other)
        } else if other.extends(self) {
            Some(*self)
        } else if self.is_term_sort() && other.is_term_sort() {
            Some(Sort::Any)
        } else {
            None
        }
    }
}

impl Display for Sort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subsorting() {
        let node = Sort::object("Node");
        let int = Sort::data("int");
        assert!(Sort::Null.extends(&node));
        assert!(!node.extends(&Sort::Null));
        assert!(int.extends(&Sort::Any));
        assert!(!Sort::Formula.extends(&Sort::Any));
        assert!(!int.extends(&node));
        assert!(Sort::generic("G").extends(&int));
        assert_eq!(Sort::Null.common_super_sort(&node), Some(node));
        assert_eq!(int.common_super_sort(&node), Some(Sort::Any));
        assert_eq!(Sort::Formula.common_super_sort(&int), None);
    }
}
