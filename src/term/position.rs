use std::fmt::{self, Display};

use smallvec::SmallVec;

use super::{Subterms, Term, TermBuilder};
use crate::sequent::SequentFormula;
use crate::Result;

/// A path of child indices from the root of a term.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct PosInTerm(SmallVec<[usize; 4]>);

impl PosInTerm {
    pub fn top_level() -> PosInTerm {
        PosInTerm::default()
    }

    pub fn is_top_level(&self) -> bool {
        self.0.is_empty()
    }

    pub fn down(&self, child: usize) -> PosInTerm {
        let mut path = self.0.clone();
        path.push(child);
        PosInTerm(path)
    }

    pub fn up(&self) -> Option<PosInTerm> {
        let mut path = self.0.clone();
        path.pop().map(|_| PosInTerm(path))
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    pub fn last_index(&self) -> Option<usize> {
        self.0.last().copied()
    }

    pub fn indices(&self) -> &[usize] {
        &self.0
    }

    pub fn sub_term<'t>(&self, term: &'t Term) -> Option<&'t Term> {
        self.0
            .iter()
            .try_fold(term, |t, &i| t.subs().get(i))
    }

    /// Replaces the subterm at this position, rebuilding the terms above it.
    /// Operators, binders and labels of the enclosing terms are kept.
    pub fn replace(&self, tb: &TermBuilder, term: &Term, with: Term) -> Result<Term> {
        self.replace_from(0, tb, term, with)
    }

    fn replace_from(
        &self,
        depth: usize,
        tb: &TermBuilder,
        term: &Term,
        with: Term,
    ) -> Result<Term> {
        let Some(&child) = self.0.get(depth) else {
            return Ok(with);
        };
        let mut subs: Subterms = term.subs().iter().cloned().collect();
        if child >= subs.len() {
            return Err(crate::Error::ProofInput(format!(
                "position {self} does not exist in {term}"
            )));
        }
        subs[child] = self.replace_from(depth + 1, tb, &subs[child], with)?;
        tb.create(
            term.op().clone(),
            subs,
            term.bound_vars().into(),
            term.labels().into(),
        )
    }
}

impl Display for PosInTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("top");
        }
        for (i, idx) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{idx}")?;
        }
        Ok(())
    }
}

/// A subterm occurrence within a formula of a sequent.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PosInOccurrence {
    formula: SequentFormula,
    pos: PosInTerm,
    in_antec: bool,
    sub_term: Term,
}

impl PosInOccurrence {
    pub fn new(formula: SequentFormula, pos: PosInTerm, in_antec: bool) -> Option<Self> {
        let sub_term = pos.sub_term(formula.formula())?.clone();
        Some(PosInOccurrence {
            formula,
            pos,
            in_antec,
            sub_term,
        })
    }

    pub fn top_level(formula: SequentFormula, in_antec: bool) -> Self {
        let sub_term = formula.formula().clone();
        PosInOccurrence {
            formula,
            pos: PosInTerm::top_level(),
            in_antec,
            sub_term,
        }
    }

    pub fn sequent_formula(&self) -> &SequentFormula {
        &self.formula
    }

    pub fn pos_in_term(&self) -> &PosInTerm {
        &self.pos
    }

    pub fn is_in_antec(&self) -> bool {
        self.in_antec
    }

    pub fn is_top_level(&self) -> bool {
        self.pos.is_top_level()
    }

    pub fn sub_term(&self) -> &Term {
        &self.sub_term
    }

    pub fn down(&self, child: usize) -> Option<PosInOccurrence> {
        let sub_term = self.sub_term.subs().get(child)?.clone();
        Some(PosInOccurrence {
            formula: self.formula.clone(),
            pos: self.pos.down(child),
            in_antec: self.in_antec,
            sub_term,
        })
    }

    pub fn up(&self) -> Option<PosInOccurrence> {
        PosInOccurrence::new(self.formula.clone(), self.pos.up()?, self.in_antec)
    }

    /// The terms strictly above the occurrence, outermost first, each paired
    /// with the index of the child the path continues in.
    pub fn path(&self) -> Vec<(Term, usize)> {
        let mut result = Vec::with_capacity(self.pos.depth());
        let mut term = self.formula.formula();
        for &i in self.pos.indices() {
            result.push((term.clone(), i));
            match term.subs().get(i) {
                Some(sub) => term = sub,
                None => break,
            }
        }
        result
    }

    /// Replaces the occurrence, returning the new formula.
    pub fn replace(&self, tb: &TermBuilder, with: Term) -> Result<Term> {
        self.pos.replace(tb, self.formula.formula(), with)
    }
}

impl Display for PosInOccurrence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let side = if self.in_antec { "antecedent" } else { "succedent" };
        write!(f, "{} at {} in {side}", self.sub_term, self.pos)
    }
}
