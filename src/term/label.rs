//! Term labels.
//!
//! Labels are metadata attached to terms. They never influence `==` on
//! terms. Formula labels identify predicates and junctors so that their truth
//! value can be traced through a proof; each application of a rule on a
//! labeled term records the label id it came from in the labels of the terms
//! it produces.

use std::fmt::{self, Display};

use smallvec::SmallVec;

use crate::util::{HashMap, ListDisplay};
use crate::Symbol;

/// `major.minor`. Minor ids are assigned when a rule splits or rewrites a
/// labeled formula.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LabelId {
    pub major: u32,
    pub minor: u32,
}

impl LabelId {
    pub fn new(major: u32, minor: u32) -> LabelId {
        LabelId { major, minor }
    }
}

impl Display for LabelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FormulaTermLabel {
    pub id: LabelId,
    /// Ids of the labels this formula was derived from.
    pub before_ids: SmallVec<[LabelId; 2]>,
}

impl FormulaTermLabel {
    pub const NAME: &'static str = "F";

    pub fn new(id: LabelId) -> FormulaTermLabel {
        FormulaTermLabel {
            id,
            before_ids: SmallVec::new(),
        }
    }

    pub fn with_before_id(mut self, before: LabelId) -> FormulaTermLabel {
        if !self.before_ids.contains(&before) {
            self.before_ids.push(before);
            self.before_ids.sort();
        }
        self
    }
}

impl Display for FormulaTermLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.before_ids.is_empty() {
            write!(f, "{}({})", Self::NAME, self.id)
        } else {
            write!(
                f,
                "{}({}, {})",
                Self::NAME,
                self.id,
                ListDisplay(&self.before_ids, ";")
            )
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TermLabel {
    Formula(FormulaTermLabel),
    /// A plain marker label, compared by name.
    Named(Symbol),
}

impl TermLabel {
    pub fn name(&self) -> Symbol {
        match self {
            TermLabel::Formula(_) => Symbol::from(FormulaTermLabel::NAME),
            TermLabel::Named(name) => *name,
        }
    }

    /// Proof-irrelevant labels may be dropped or changed by rules without
    /// affecting the proof.
    pub fn is_proof_relevant(&self) -> bool {
        match self {
            TermLabel::Formula(_) => false,
            TermLabel::Named(_) => true,
        }
    }

    pub fn as_formula(&self) -> Option<&FormulaTermLabel> {
        match self {
            TermLabel::Formula(label) => Some(label),
            TermLabel::Named(_) => None,
        }
    }

    /// Key used to keep label lists in a canonical order.
    pub(crate) fn sort_key(&self) -> String {
        self.to_string()
    }
}

impl Display for TermLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TermLabel::Formula(label) => write!(f, "{label}"),
            TermLabel::Named(name) => write!(f, "{name}"),
        }
    }
}

/// Hands out label ids. Majors are unique per proof, minors per major.
#[derive(Clone, Debug, Default)]
pub struct LabelIdGenerator {
    next_major: u32,
    next_minor: HashMap<u32, u32>,
}

impl LabelIdGenerator {
    pub fn fresh_id(&mut self) -> LabelId {
        self.next_major += 1;
        LabelId::new(self.next_major, 0)
    }

    pub fn fresh_minor(&mut self, major: u32) -> LabelId {
        let next = self.next_minor.entry(major).or_insert(0);
        *next += 1;
        LabelId::new(major, *next)
    }

    /// Makes sure ids already present in a proof are never generated again.
    pub fn reserve(&mut self, id: LabelId) {
        self.next_major = self.next_major.max(id.major);
        let next = self.next_minor.entry(id.major).or_insert(0);
        *next = (*next).max(id.minor);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minors_are_counted_per_major() {
        let mut gen = LabelIdGenerator::default();
        let a = gen.fresh_id();
        let b = gen.fresh_id();
        assert_eq!(a, LabelId::new(1, 0));
        assert_eq!(gen.fresh_minor(a.major), LabelId::new(1, 1));
        assert_eq!(gen.fresh_minor(b.major), LabelId::new(2, 1));
        assert_eq!(gen.fresh_minor(a.major), LabelId::new(1, 2));
        gen.reserve(LabelId::new(7, 3));
        assert_eq!(gen.fresh_id(), LabelId::new(8, 0));
        assert_eq!(gen.fresh_minor(7), LabelId::new(7, 4));
    }

    #[test]
    fn display() {
        let label = FormulaTermLabel::new(LabelId::new(3, 1))
            .with_before_id(LabelId::new(2, 0))
            .with_before_id(LabelId::new(1, 0));
        assert_eq!(label.to_string(), "F(3.1, 1.0;2.0)");
    }
}
