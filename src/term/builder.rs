use smallvec::smallvec;

use super::*;
use crate::schema::SchemaVariable;
use crate::{Error, Result};

/// An update together with the labels of the update application it was
/// taken from.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct UpdateLabelPair {
    pub update: Term,
    pub labels: Labels,
}

/// Sort-checked term construction.
///
/// The junctor constructors simplify with `true` and `false` the usual way,
/// so `and(true, p)` is `p`. [`TermBuilder::create`] never simplifies.
#[derive(Clone, Copy, Debug, Default)]
pub struct TermBuilder;

fn mismatch(context: impl Display, expected: impl Display, found: Sort) -> Error {
    Error::SortMismatch {
        context: context.to_string(),
        expected: expected.to_string(),
        found: found.to_string(),
    }
}

fn expect_sort(context: &Operator, term: &Term, expected: Sort) -> Result<()> {
    if term.sort().extends(&expected) {
        Ok(())
    } else {
        Err(mismatch(format!("{context:?}"), expected, term.sort()))
    }
}

fn expect_term_sort(context: &Operator, term: &Term) -> Result<()> {
    if term.sort().is_term_sort() {
        Ok(())
    } else {
        Err(mismatch(format!("{context:?}"), "a term sort", term.sort()))
    }
}

impl TermBuilder {
    pub fn create(
        &self,
        op: Operator,
        subs: Subterms,
        bound_vars: BoundVars,
        labels: Labels,
    ) -> Result<Term> {
        if subs.len() != op.arity() {
            return Err(Error::ArityMismatch {
                op: format!("{op:?}"),
                expected: op.arity(),
                found: subs.len(),
            });
        }
        if bound_vars.len() != op.binder_count() {
            return Err(Error::ArityMismatch {
                op: format!("binder {op:?}"),
                expected: op.binder_count(),
                found: bound_vars.len(),
            });
        }
        match &op {
            Operator::Junctor(_) | Operator::Equiv | Operator::Quantifier(_) => {
                for sub in subs.iter() {
                    expect_sort(&op, sub, Sort::Formula)?;
                }
            }
            Operator::Modality(..) => expect_sort(&op, &subs[0], Sort::Formula)?,
            Operator::Equals => {
                expect_term_sort(&op, &subs[0])?;
                expect_term_sort(&op, &subs[1])?;
            }
            Operator::IfThenElse => {
                expect_sort(&op, &subs[0], Sort::Formula)?;
                let (then, els) = (subs[1].sort(), subs[2].sort());
                if then.is_formula() || els.is_formula() {
                    expect_sort(&op, &subs[1], Sort::Formula)?;
                    expect_sort(&op, &subs[2], Sort::Formula)?;
                } else if then.common_super_sort(&els).is_none() {
                    return Err(mismatch(format!("{op:?}"), then, els));
                }
            }
            Operator::Function(f) => {
                for (sub, sort) in subs.iter().zip(f.arg_sorts()) {
                    expect_sort(&op, sub, *sort)?;
                }
            }
            Operator::ElementaryUpdate(pv) => expect_sort(&op, &subs[0], pv.sort)?,
            Operator::Store(f) => {
                if !f.is_location() {
                    return Err(mismatch(
                        format!("{op:?}"),
                        "a location function",
                        f.sort(),
                    ));
                }
                for (sub, sort) in subs.iter().zip(f.arg_sorts()) {
                    expect_sort(&op, sub, *sort)?;
                }
                expect_sort(&op, &subs[f.arity()], f.sort())?;
            }
            Operator::UpdateParallel => {
                expect_sort(&op, &subs[0], Sort::Update)?;
                expect_sort(&op, &subs[1], Sort::Update)?;
            }
            Operator::UpdateApplication => expect_sort(&op, &subs[0], Sort::Update)?,
            Operator::Subst => {
                expect_term_sort(&op, &subs[0])?;
                expect_sort(&op, &subs[0], bound_vars[0].sort())?;
            }
            Operator::LogicVariable(_)
            | Operator::ProgramVariable(_)
            | Operator::SchemaVariable(_)
            | Operator::Skip => {}
        }
        for var in bound_vars.iter() {
            if !var.sort().is_term_sort() {
                return Err(mismatch(
                    format!("bound variable {var}"),
                    "a term sort",
                    var.sort(),
                ));
            }
        }
        Ok(Term::make(op, subs, bound_vars, labels))
    }

    fn leaf(&self, op: Operator) -> Term {
        Term::make(op, Subterms::new(), BoundVars::new(), Labels::new())
    }

    fn app(&self, op: Operator, subs: Subterms) -> Result<Term> {
        self.create(op, subs, BoundVars::new(), Labels::new())
    }

    pub fn tt(&self) -> Term {
        self.leaf(Operator::Junctor(Junctor::True))
    }

    pub fn ff(&self) -> Term {
        self.leaf(Operator::Junctor(Junctor::False))
    }

    pub fn not(&self, t: Term) -> Result<Term> {
        match t.op() {
            Operator::Junctor(Junctor::True) => Ok(self.ff()),
            Operator::Junctor(Junctor::False) => Ok(self.tt()),
            _ => self.app(Operator::Junctor(Junctor::Not), smallvec![t]),
        }
    }

    pub fn and(&self, a: Term, b: Term) -> Result<Term> {
        let op = Operator::Junctor(Junctor::And);
        expect_sort(&op, &a, Sort::Formula)?;
        expect_sort(&op, &b, Sort::Formula)?;
        if a.op().is_junctor(Junctor::False) || b.op().is_junctor(Junctor::True) {
            Ok(a)
        } else if b.op().is_junctor(Junctor::False) || a.op().is_junctor(Junctor::True) {
            Ok(b)
        } else {
            self.app(op, smallvec![a, b])
        }
    }

    pub fn or(&self, a: Term, b: Term) -> Result<Term> {
        let op = Operator::Junctor(Junctor::Or);
        expect_sort(&op, &a, Sort::Formula)?;
        expect_sort(&op, &b, Sort::Formula)?;
        if a.op().is_junctor(Junctor::True) || b.op().is_junctor(Junctor::False) {
            Ok(a)
        } else if b.op().is_junctor(Junctor::True) || a.op().is_junctor(Junctor::False) {
            Ok(b)
        } else {
            self.app(op, smallvec![a, b])
        }
    }

    /// Conjunction of all terms, `true` for none.
    pub fn and_all(&self, terms: impl IntoIterator<Item = Term>) -> Result<Term> {
        terms
            .into_iter()
            .try_fold(self.tt(), |acc, t| self.and(acc, t))
    }

    /// Disjunction of all terms, `false` for none.
    pub fn or_all(&self, terms: impl IntoIterator<Item = Term>) -> Result<Term> {
        terms
            .into_iter()
            .try_fold(self.ff(), |acc, t| self.or(acc, t))
    }

    pub fn imp(&self, a: Term, b: Term) -> Result<Term> {
        if a.op().is_junctor(Junctor::False) || b.op().is_junctor(Junctor::True) {
            expect_sort(&Operator::Junctor(Junctor::Imp), &a, Sort::Formula)?;
            expect_sort(&Operator::Junctor(Junctor::Imp), &b, Sort::Formula)?;
            Ok(self.tt())
        } else if a.op().is_junctor(Junctor::True) {
            expect_sort(&Operator::Junctor(Junctor::Imp), &b, Sort::Formula)?;
            Ok(b)
        } else {
            self.app(Operator::Junctor(Junctor::Imp), smallvec![a, b])
        }
    }

    pub fn eqv(&self, a: Term, b: Term) -> Result<Term> {
        self.app(Operator::Equiv, smallvec![a, b])
    }

    /// `a = b`, or `a <-> b` for formulas.
    pub fn equals(&self, a: Term, b: Term) -> Result<Term> {
        if a.is_formula() {
            self.eqv(a, b)
        } else {
            self.app(Operator::Equals, smallvec![a, b])
        }
    }

    pub fn ite(&self, cond: Term, then: Term, els: Term) -> Result<Term> {
        self.app(Operator::IfThenElse, smallvec![cond, then, els])
    }

    pub fn quantify(&self, q: Quantifier, var: QuantifiableVariable, body: Term) -> Result<Term> {
        self.create(
            Operator::Quantifier(q),
            smallvec![body],
            smallvec![var],
            Labels::new(),
        )
    }

    pub fn all(&self, var: LogicVariable, body: Term) -> Result<Term> {
        self.quantify(Quantifier::All, QuantifiableVariable::Logic(var), body)
    }

    pub fn ex(&self, var: LogicVariable, body: Term) -> Result<Term> {
        self.quantify(Quantifier::Ex, QuantifiableVariable::Logic(var), body)
    }

    pub fn func(&self, f: &Function, args: Vec<Term>) -> Result<Term> {
        self.app(Operator::Function(f.clone()), args.into())
    }

    pub fn var(&self, v: LogicVariable) -> Term {
        self.leaf(Operator::LogicVariable(v))
    }

    pub fn pv(&self, v: ProgramVariable) -> Term {
        self.leaf(Operator::ProgramVariable(v))
    }

    pub fn sv(&self, sv: &SchemaVariable) -> Term {
        self.leaf(Operator::SchemaVariable(sv.clone()))
    }

    pub fn null(&self) -> Term {
        self.leaf(Operator::Function(Function::null()))
    }

    pub fn elementary(&self, pv: ProgramVariable, value: Term) -> Result<Term> {
        self.app(Operator::ElementaryUpdate(pv), smallvec![value])
    }

    /// `o.f := value` for fields, `a[i] := value` for array elements.
    pub fn store(&self, location: &Function, args: Vec<Term>, value: Term) -> Result<Term> {
        let mut subs: Subterms = args.into();
        subs.push(value);
        self.app(Operator::Store(location.clone()), subs)
    }

    pub fn skip(&self) -> Term {
        self.leaf(Operator::Skip)
    }

    pub fn parallel(&self, a: Term, b: Term) -> Result<Term> {
        if a.op() == &Operator::Skip {
            expect_sort(&Operator::UpdateParallel, &b, Sort::Update)?;
            Ok(b)
        } else if b.op() == &Operator::Skip {
            expect_sort(&Operator::UpdateParallel, &a, Sort::Update)?;
            Ok(a)
        } else {
            self.app(Operator::UpdateParallel, smallvec![a, b])
        }
    }

    pub fn parallel_all(&self, updates: impl IntoIterator<Item = Term>) -> Result<Term> {
        updates
            .into_iter()
            .try_fold(self.skip(), |acc, u| self.parallel(acc, u))
    }

    pub fn apply(&self, update: Term, target: Term) -> Result<Term> {
        self.apply_labeled(update, target, Labels::new())
    }

    fn apply_labeled(&self, update: Term, target: Term, labels: Labels) -> Result<Term> {
        expect_sort(&Operator::UpdateApplication, &update, Sort::Update)?;
        if update.op() == &Operator::Skip || target.op().is_junctor(Junctor::True) {
            return Ok(target);
        }
        self.create(
            Operator::UpdateApplication,
            smallvec![update, target],
            BoundVars::new(),
            labels,
        )
    }

    /// `{u1 || ... || un}target`; the target itself when there are no updates.
    pub fn apply_parallel(&self, updates: &[Term], target: Term) -> Result<Term> {
        if updates.is_empty() {
            return Ok(target);
        }
        self.apply(self.parallel_all(updates.iter().cloned())?, target)
    }

    /// `{u1}...{un}target`.
    pub fn apply_sequential(&self, updates: &[Term], target: Term) -> Result<Term> {
        updates
            .iter()
            .rev()
            .try_fold(target, |acc, u| self.apply(u.clone(), acc))
    }

    /// Like [`TermBuilder::apply_sequential`], restoring the labels of the
    /// update applications the updates were collected from.
    pub fn apply_update_pairs_sequential(
        &self,
        pairs: &[UpdateLabelPair],
        target: Term,
    ) -> Result<Term> {
        pairs.iter().rev().try_fold(target, |acc, pair| {
            self.apply_labeled(pair.update.clone(), acc, pair.labels.clone())
        })
    }

    pub fn dia(&self, program: ModalProgram, body: Term) -> Result<Term> {
        self.app(Operator::Modality(ModalityKind::Diamond, program), smallvec![body])
    }

    pub fn box_(&self, program: ModalProgram, body: Term) -> Result<Term> {
        self.app(Operator::Modality(ModalityKind::Box, program), smallvec![body])
    }

    /// Adds a label, replacing a label of the same name.
    pub fn label(&self, term: &Term, label: TermLabel) -> Term {
        let mut labels: Labels = term
            .labels()
            .iter()
            .filter(|l| l.name() != label.name())
            .cloned()
            .collect();
        labels.push(label);
        term.with_labels(labels)
    }

    /// The first term below a chain of update applications.
    pub fn go_below_updates<'t>(&self, mut term: &'t Term) -> &'t Term {
        while term.op() == &Operator::UpdateApplication {
            term = term.sub(1);
        }
        term
    }

    /// The updates above a term, outermost first, and the term below them.
    pub fn split_updates(&self, term: &Term) -> (Vec<Term>, Term) {
        let mut updates = vec![];
        let mut term = term;
        while term.op() == &Operator::UpdateApplication {
            updates.push(term.sub(0).clone());
            term = term.sub(1);
        }
        (updates, term.clone())
    }

    /// Capture-free substitution of `value` for the free occurrences of `var`.
    pub fn subst(&self, var: LogicVariable, value: &Term, target: &Term) -> Result<Term> {
        if !target.free_vars().contains(&var) {
            return Ok(target.clone());
        }
        if let Operator::LogicVariable(v) = target.op() {
            return Ok(if *v == var { value.clone() } else { target.clone() });
        }
        let op = target.op();
        let binds_var = target.bound_vars().iter().any(|b| b.as_logic() == Some(&var));

        // rename binders that would capture free variables of the value
        let mut renaming: Vec<(LogicVariable, LogicVariable)> = vec![];
        let mut bound_vars = BoundVars::new();
        for b in target.bound_vars() {
            match b {
                QuantifiableVariable::Logic(lv) if !binds_var && value.free_vars().contains(lv) => {
                    let fresh = fresh_variable(lv, value, target);
                    renaming.push((*lv, fresh));
                    bound_vars.push(QuantifiableVariable::Logic(fresh));
                }
                _ => bound_vars.push(b.clone()),
            }
        }

        let mut subs = Subterms::new();
        for (i, sub) in target.subs().iter().enumerate() {
            if op.binds_in(i) {
                if binds_var {
                    subs.push(sub.clone());
                    continue;
                }
                let mut renamed = sub.clone();
                for (from, to) in &renaming {
                    renamed = self.subst(*from, &self.var(*to), &renamed)?;
                }
                subs.push(self.subst(var, value, &renamed)?);
            } else {
                subs.push(self.subst(var, value, sub)?);
            }
        }
        self.create(op.clone(), subs, bound_vars, target.labels().into())
    }
}

fn fresh_variable(var: &LogicVariable, value: &Term, target: &Term) -> LogicVariable {
    let mut n = 0;
    loop {
        let candidate = LogicVariable::new(&format!("{}_{n}", var.name), var.sort);
        let taken = |t: &Term| {
            t.any(&mut |s| {
                s.free_vars().contains(&candidate)
                    || s.bound_vars().iter().any(|b| b.as_logic() == Some(&candidate))
            })
        };
        if !taken(value) && !taken(target) {
            return candidate;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_checks() {
        let tb = TermBuilder;
        let int = Sort::data("int");
        let node = Sort::object("Node");
        let x = tb.func(&Function::constant("x", int), vec![]).unwrap();
        let p = Function::predicate("p", vec![node]);
        assert!(matches!(
            tb.func(&p, vec![x.clone()]),
            Err(Error::SortMismatch { .. })
        ));
        assert!(matches!(
            tb.func(&p, vec![]),
            Err(Error::ArityMismatch { .. })
        ));
        assert!(tb.func(&p, vec![tb.null()]).is_ok());
        assert!(matches!(tb.not(x), Err(Error::SortMismatch { .. })));
    }

    #[test]
    fn neutral_elements() {
        let tb = TermBuilder;
        let p = tb.func(&Function::predicate("p", vec![]), vec![]).unwrap();
        assert_eq!(tb.and_all(vec![]).unwrap(), tb.tt());
        assert_eq!(tb.or_all(vec![]).unwrap(), tb.ff());
        assert_eq!(tb.and(tb.tt(), p.clone()).unwrap(), p);
        assert_eq!(tb.or(p.clone(), tb.tt()).unwrap(), tb.tt());
        assert_eq!(tb.imp(tb.tt(), p.clone()).unwrap(), p);
        assert_eq!(tb.apply_parallel(&[], p.clone()).unwrap(), p);
    }

    #[test]
    fn substitution_avoids_capture() {
        let tb = TermBuilder;
        let s = Sort::object("Node");
        let r = Function::predicate("r", vec![s, s]);
        let x = LogicVariable::new("x", s);
        let y = LogicVariable::new("y", s);
        // \forall y; r(x, y)  [x := y]
        let body = tb.func(&r, vec![tb.var(x), tb.var(y)]).unwrap();
        let all = tb.all(y, body).unwrap();
        let result = tb.subst(x, &tb.var(y), &all).unwrap();
        assert_eq!(result.to_string(), "\\forall y_0; r(y, y_0)");
        assert_eq!(result.free_vars(), &[y]);
    }

    #[test]
    fn updates() {
        let tb = TermBuilder;
        let int = Sort::data("int");
        let a = ProgramVariable::new("a", int);
        let b = ProgramVariable::new("b", int);
        let one = tb.func(&Function::constant("1", int), vec![]).unwrap();
        let u1 = tb.elementary(a, one.clone()).unwrap();
        let u2 = tb.elementary(b, tb.pv(a)).unwrap();
        let target = tb.equals(tb.pv(b), one).unwrap();
        let t = tb.apply_sequential(&[u1.clone(), u2.clone()], target.clone()).unwrap();
        assert_eq!(t.to_string(), "{a := 1}({b := a}(b = 1))");
        assert_eq!(tb.go_below_updates(&t), &target);
        assert_eq!(tb.split_updates(&t), (vec![u1.clone(), u2.clone()], target.clone()));
        let par = tb.apply_parallel(&[u1, u2], target).unwrap();
        assert_eq!(par.to_string(), "{a := 1 || b := a}(b = 1)");
    }
}
