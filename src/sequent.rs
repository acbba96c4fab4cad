//! Persistent sequents.
//!
//! All operations return new values and leave the receiver unchanged. The
//! vectors share structure, so proof nodes keep their own sequent cheaply.

use std::fmt::{self, Display};

use crate::term::Term;
use crate::util::ListDisplay;
use crate::{Error, Result};

/// A top-level formula of a sequent.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SequentFormula(Term);

impl SequentFormula {
    pub fn new(formula: Term) -> Result<SequentFormula> {
        if formula.is_formula() {
            Ok(SequentFormula(formula))
        } else {
            Err(Error::SortMismatch {
                context: "sequent formula".into(),
                expected: "Formula".into(),
                found: formula.sort().to_string(),
            })
        }
    }

    pub fn formula(&self) -> &Term {
        &self.0
    }
}

impl Display for SequentFormula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Semisequent(im::Vector<SequentFormula>);

impl Semisequent {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&SequentFormula> {
        self.0.get(idx)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SequentFormula> + '_ {
        self.0.iter()
    }

    pub fn contains(&self, formula: &SequentFormula) -> bool {
        self.0.iter().any(|f| f == formula)
    }

    pub fn index_of(&self, formula: &SequentFormula) -> Option<usize> {
        self.0.index_of(formula)
    }

    /// Inserts at `idx`, clamped to the length. Returns `None` when an equal
    /// formula is already present.
    pub fn insert(&self, idx: usize, formula: SequentFormula) -> Option<Semisequent> {
        if self.contains(&formula) {
            return None;
        }
        let mut formulas = self.0.clone();
        formulas.insert(idx.min(formulas.len()), formula);
        Some(Semisequent(formulas))
    }

    pub fn insert_last(&self, formula: SequentFormula) -> Option<Semisequent> {
        self.insert(self.len(), formula)
    }

    pub fn remove(&self, idx: usize) -> Semisequent {
        let mut formulas = self.0.clone();
        if idx < formulas.len() {
            formulas.remove(idx);
        }
        Semisequent(formulas)
    }

    /// Replaces the formula at `idx`. If the new formula is already present
    /// elsewhere, the old one is only removed.
    pub fn replace(&self, idx: usize, formula: SequentFormula) -> Semisequent {
        let removed = self.remove(idx);
        removed.insert(idx, formula).unwrap_or(removed)
    }
}

impl FromIterator<SequentFormula> for Semisequent {
    fn from_iter<I: IntoIterator<Item = SequentFormula>>(iter: I) -> Self {
        let mut result = Semisequent::default();
        for formula in iter {
            if let Some(next) = result.insert_last(formula) {
                result = next;
            }
        }
        result
    }
}

impl Display for Semisequent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", ListDisplay(&self.0, ", "))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Sequent {
    antecedent: Semisequent,
    succedent: Semisequent,
}

impl Sequent {
    pub fn new(antecedent: Semisequent, succedent: Semisequent) -> Sequent {
        Sequent {
            antecedent,
            succedent,
        }
    }

    /// Builds a sequent from formulas, checking that each is a formula.
    pub fn from_terms(
        antecedent: impl IntoIterator<Item = Term>,
        succedent: impl IntoIterator<Item = Term>,
    ) -> Result<Sequent> {
        let ante = antecedent
            .into_iter()
            .map(SequentFormula::new)
            .collect::<Result<Semisequent>>()?;
        let succ = succedent
            .into_iter()
            .map(SequentFormula::new)
            .collect::<Result<Semisequent>>()?;
        Ok(Sequent::new(ante, succ))
    }

    pub fn antecedent(&self) -> &Semisequent {
        &self.antecedent
    }

    pub fn succedent(&self) -> &Semisequent {
        &self.succedent
    }

    pub fn side(&self, in_antec: bool) -> &Semisequent {
        if in_antec {
            &self.antecedent
        } else {
            &self.succedent
        }
    }

    fn with_side(&self, in_antec: bool, side: Semisequent) -> Sequent {
        if in_antec {
            Sequent::new(side, self.succedent.clone())
        } else {
            Sequent::new(self.antecedent.clone(), side)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.antecedent.is_empty() && self.succedent.is_empty()
    }

    pub fn len(&self) -> usize {
        self.antecedent.len() + self.succedent.len()
    }

    /// Adds a formula at the end of a side. Adding a formula already present
    /// on that side returns an unchanged sequent.
    pub fn add_formula(&self, formula: SequentFormula, in_antec: bool) -> Sequent {
        self.insert_formula(formula, in_antec, usize::MAX)
    }

    pub fn insert_formula(&self, formula: SequentFormula, in_antec: bool, idx: usize) -> Sequent {
        match self.side(in_antec).insert(idx, formula) {
            Some(side) => self.with_side(in_antec, side),
            None => self.clone(),
        }
    }

    pub fn remove_formula(&self, formula: &SequentFormula, in_antec: bool) -> Sequent {
        match self.side(in_antec).index_of(formula) {
            Some(idx) => self.with_side(in_antec, self.side(in_antec).remove(idx)),
            None => self.clone(),
        }
    }

    /// Replaces `old` by `new` at the same index.
    pub fn change_formula(
        &self,
        old: &SequentFormula,
        new: SequentFormula,
        in_antec: bool,
    ) -> Sequent {
        match self.side(in_antec).index_of(old) {
            Some(idx) => self.with_side(in_antec, self.side(in_antec).replace(idx, new)),
            None => self.add_formula(new, in_antec),
        }
    }

    /// All formulas with their side, antecedent first.
    pub fn formulas(&self) -> impl Iterator<Item = (&SequentFormula, bool)> + '_ {
        self.antecedent
            .iter()
            .map(|f| (f, true))
            .chain(self.succedent.iter().map(|f| (f, false)))
    }

    /// Combines two sequents side by side, skipping duplicates.
    pub fn union(&self, other: &Sequent) -> Sequent {
        other.formulas().fold(self.clone(), |acc, (f, in_antec)| {
            acc.add_formula(f.clone(), in_antec)
        })
    }
}

impl Display for Sequent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ==> {}", self.antecedent, self.succedent)
    }
}
