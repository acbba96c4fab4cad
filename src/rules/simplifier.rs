//! The one-step simplifier.
//!
//! Simplifies a whole formula in a single rule application. The steps are
//! taken from a fixed set of simplification taclets plus two built-in
//! rewrites: pushing updates into their targets and orienting equations.
//! The taclet steps are kept as the protocol of the application.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::sync::Arc;

use smallvec::smallvec;

use crate::app::TacletApp;
use crate::executor::rewrite_formula;
use crate::index::TacletIndex;
use crate::sequent::{Sequent, SequentFormula};
use crate::term::{
    Function, LabelIdGenerator, Operator, PosInOccurrence, PosInTerm, Subterms, Term, TermBuilder,
};
use crate::util::HashMap;
use crate::Result;

/// A one-step simplification of the formula at `pio`.
#[derive(Clone, Debug)]
pub struct SimplifierApp {
    pub pio: PosInOccurrence,
    /// The taclet applications performed, each positioned in the formula
    /// as it was before the step.
    pub protocol: Vec<TacletApp>,
    pub result: Term,
}

impl SimplifierApp {
    /// An app that has not been performed yet.
    pub fn pending(pio: PosInOccurrence) -> SimplifierApp {
        let result = pio.sub_term().clone();
        SimplifierApp {
            pio,
            protocol: vec![],
            result,
        }
    }
}

enum Step {
    Taclet(TacletApp),
    Builtin(PosInTerm, Term),
}

type CacheEntry = Option<(Term, Vec<TacletApp>)>;

#[derive(Debug)]
pub struct OneStepSimplifier {
    index: Arc<TacletIndex>,
    /// Results for formulas without formula labels, keyed by formula and side.
    cache: RefCell<HashMap<(Term, bool), CacheEntry>>,
}

impl OneStepSimplifier {
    pub const NAME: &'static str = "One Step Simplification";
    const MAX_STEPS: usize = 1000;

    pub fn new() -> Result<OneStepSimplifier> {
        Ok(OneStepSimplifier::with_taclets(super::simplification_taclets()?))
    }

    pub fn with_taclets(taclets: Vec<Arc<crate::taclet::Taclet>>) -> OneStepSimplifier {
        OneStepSimplifier {
            index: Arc::new(TacletIndex::new(taclets)),
            cache: RefCell::new(HashMap::default()),
        }
    }

    /// The same taclets with an empty cache.
    pub fn fresh_instance(&self) -> OneStepSimplifier {
        OneStepSimplifier {
            index: self.index.clone(),
            cache: RefCell::new(HashMap::default()),
        }
    }

    pub fn taclet_index(&self) -> &TacletIndex {
        &self.index
    }

    /// Whether a simplification step applies somewhere in the formula.
    pub fn is_applicable(&self, formula: &SequentFormula, in_antec: bool) -> bool {
        let pio = PosInOccurrence::top_level(formula.clone(), in_antec);
        self.find_step(&TermBuilder, &pio).is_some()
    }

    /// Simplifies the top-level formula at `pio` to a fixpoint. `None` if
    /// nothing changes.
    pub fn simplify(
        &self,
        tb: &TermBuilder,
        pio: &PosInOccurrence,
        ids: &mut LabelIdGenerator,
    ) -> Result<Option<SimplifierApp>> {
        let formula = pio.sequent_formula().formula();
        let cacheable = !formula.any(&mut |t: &Term| t.formula_label().is_some());
        let key = (formula.clone(), pio.is_in_antec());
        if cacheable {
            if let Some(entry) = self.cache.borrow().get(&key) {
                return Ok(entry.clone().map(|(result, protocol)| SimplifierApp {
                    pio: pio.clone(),
                    protocol,
                    result,
                }));
            }
        }

        let mut current =
            PosInOccurrence::top_level(pio.sequent_formula().clone(), pio.is_in_antec());
        let mut protocol = vec![];
        let mut changed = false;
        for _ in 0..Self::MAX_STEPS {
            let Some(step) = self.find_step(tb, &current) else {
                break;
            };
            let next = match step {
                Step::Taclet(app) => {
                    let next = rewrite_formula(tb, &app, ids)?;
                    log::trace!("{}: {} -> {next}", app.rule_name(), current.sub_term());
                    protocol.push(app);
                    next
                }
                Step::Builtin(pos, with) => pos.replace(tb, current.sub_term(), with)?,
            };
            changed = true;
            current = PosInOccurrence::top_level(SequentFormula::new(next)?, pio.is_in_antec());
        }

        let entry = changed.then(|| (current.sub_term().clone(), protocol));
        if cacheable {
            self.cache.borrow_mut().insert(key, entry.clone());
        }
        Ok(entry.map(|(result, protocol)| SimplifierApp {
            pio: pio.clone(),
            protocol,
            result,
        }))
    }

    /// Simplifies a formula outside of any sequent.
    pub fn simplify_term(&self, tb: &TermBuilder, term: &Term) -> Result<Term> {
        if !term.is_formula() {
            return Ok(term.clone());
        }
        let pio = PosInOccurrence::top_level(SequentFormula::new(term.clone())?, false);
        let mut ids = LabelIdGenerator::default();
        Ok(match self.simplify(tb, &pio, &mut ids)? {
            Some(app) => app.result,
            None => term.clone(),
        })
    }

    /// The first applicable step in pre-order.
    fn find_step(&self, tb: &TermBuilder, top: &PosInOccurrence) -> Option<Step> {
        let mut stack = vec![top.clone()];
        while let Some(pio) = stack.pop() {
            let term = pio.sub_term();
            if let Some(with) = builtin_step(tb, term) {
                return Some(Step::Builtin(pio.pos_in_term().clone(), with));
            }
            for taclet in self.index.candidates(term) {
                let Some(app) = TacletApp::at(taclet.clone(), pio.clone()) else {
                    continue;
                };
                let app = app.find_assumes_instantiations(&Sequent::default()).pop();
                if let Some(app) = app.filter(|a| a.complete() && a.is_executable()) {
                    return Some(Step::Taclet(app));
                }
            }
            for i in (0..term.arity()).rev() {
                if let Some(child) = pio.down(i) {
                    stack.push(child);
                }
            }
        }
        None
    }
}

fn builtin_step(tb: &TermBuilder, term: &Term) -> Option<Term> {
    match term.op() {
        Operator::UpdateApplication => {
            let pushed = push_update(tb, term.sub(0), term.sub(1)).ok()?;
            (pushed != *term).then_some(pushed)
        }
        Operator::Equals if term_order(term.sub(0), term.sub(1)) == Ordering::Less => {
            let swapped = tb
                .create(
                    Operator::Equals,
                    smallvec![term.sub(1).clone(), term.sub(0).clone()],
                    Default::default(),
                    term.labels().into(),
                )
                .ok()?;
            Some(swapped)
        }
        _ => None,
    }
}

/// The order used to orient equations: `null` first, then by size, then by
/// printed form. Equations are kept with the greater side on the left, so
/// rewriting with them replaces terms by smaller ones.
pub fn term_order(a: &Term, b: &Term) -> Ordering {
    let is_null = |t: &Term| matches!(t.op(), Operator::Function(f) if *f == Function::null());
    is_null(b)
        .cmp(&is_null(a))
        .then_with(|| a.size().cmp(&b.size()))
        .then_with(|| a.to_string().cmp(&b.to_string()))
}

/// The elementary and store updates of a parallel update, left to right.
fn flatten(update: &Term, out: &mut Vec<Term>) {
    match update.op() {
        Operator::UpdateParallel => {
            flatten(update.sub(0), out);
            flatten(update.sub(1), out);
        }
        Operator::Skip => {}
        _ => out.push(update.clone()),
    }
}

/// Applies `update` to `target` as far as possible. The result has no update
/// application left except in front of modalities.
pub fn push_update(tb: &TermBuilder, update: &Term, target: &Term) -> Result<Term> {
    let mut elementary = vec![];
    flatten(update, &mut elementary);
    push(tb, update, &elementary, target)
}

fn push(tb: &TermBuilder, update: &Term, elementary: &[Term], target: &Term) -> Result<Term> {
    if elementary.is_empty() || (target.is_rigid() && !target.contains_modality()) {
        return Ok(target.clone());
    }
    match target.op() {
        Operator::Modality(..) => tb.apply(update.clone(), target.clone()),
        Operator::UpdateApplication => {
            let inner = apply_to_update(tb, update, elementary, target.sub(0))?;
            let merged = tb.parallel(update.clone(), inner)?;
            let mut flat = vec![];
            flatten(&merged, &mut flat);
            push(tb, &merged, &flat, target.sub(1))
        }
        Operator::ProgramVariable(x) => Ok(elementary
            .iter()
            .rev()
            .find(|u| matches!(u.op(), Operator::ElementaryUpdate(y) if y == x))
            .map_or_else(|| target.clone(), |u| u.sub(0).clone())),
        Operator::Function(f) if f.is_location() => {
            let args = target
                .subs()
                .iter()
                .map(|a| push(tb, update, elementary, a))
                .collect::<Result<Vec<_>>>()?;
            let mut result = tb.func(f, args.clone())?;
            for store in elementary {
                let Operator::Store(g) = store.op() else {
                    continue;
                };
                if g != f {
                    continue;
                }
                let stored_args = &store.subs()[..g.arity()];
                let value = store.sub(g.arity()).clone();
                if stored_args == args.as_slice() {
                    result = value;
                } else {
                    let same = args
                        .iter()
                        .zip(stored_args)
                        .map(|(a, b)| tb.equals(a.clone(), b.clone()))
                        .collect::<Result<Vec<_>>>()?;
                    result = tb.ite(tb.and_all(same)?, value, result)?;
                }
            }
            Ok(result.with_labels(target.labels().into()))
        }
        _ => {
            let captures = target.bound_vars().iter().any(|b| {
                b.as_logic()
                    .map_or(false, |v| update.free_vars().contains(v))
            });
            if captures {
                return tb.apply(update.clone(), target.clone());
            }
            let subs = target
                .subs()
                .iter()
                .map(|s| push(tb, update, elementary, s))
                .collect::<Result<Subterms>>()?;
            tb.create(
                target.op().clone(),
                subs,
                target.bound_vars().into(),
                target.labels().into(),
            )
        }
    }
}

/// Applies `update` to the values and location arguments of `inner`.
fn apply_to_update(
    tb: &TermBuilder,
    update: &Term,
    elementary: &[Term],
    inner: &Term,
) -> Result<Term> {
    match inner.op() {
        Operator::Skip => Ok(inner.clone()),
        Operator::UpdateParallel => {
            let a = apply_to_update(tb, update, elementary, inner.sub(0))?;
            let b = apply_to_update(tb, update, elementary, inner.sub(1))?;
            tb.parallel(a, b)
        }
        _ => {
            let subs = inner
                .subs()
                .iter()
                .map(|s| push(tb, update, elementary, s))
                .collect::<Result<Subterms>>()?;
            tb.create(inner.op().clone(), subs, Default::default(), inner.labels().into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sort::Sort;
    use crate::term::{Junctor, ProgramVariable};

    fn node() -> Sort {
        Sort::object("Node")
    }

    #[test]
    fn updates_are_pushed_to_locations() {
        let tb = TermBuilder;
        let next = Function::field("next", node(), node());
        let x = ProgramVariable::new("x", node());
        let y = ProgramVariable::new("y", node());
        let o = tb.func(&Function::constant("o", node()), vec![]).unwrap();
        let update = tb
            .parallel(
                tb.elementary(x, o.clone()).unwrap(),
                tb.store(&next, vec![tb.pv(x)], tb.null()).unwrap(),
            )
            .unwrap();
        let target = tb
            .equals(tb.func(&next, vec![tb.pv(y)]).unwrap(), tb.pv(x))
            .unwrap();
        let pushed = push_update(&tb, &update, &target).unwrap();
        assert_eq!(
            pushed.to_string(),
            "(\\if (y = x) \\then (null) \\else (y.next)) = o"
        );
    }

    #[test]
    fn simplification_reaches_a_fixpoint() {
        let tb = TermBuilder;
        let simplifier = OneStepSimplifier::new().unwrap();
        let p = tb.func(&Function::predicate("p", vec![]), vec![]).unwrap();
        let o = tb.func(&Function::constant("o", node()), vec![]).unwrap();
        let refl = tb.equals(o.clone(), o).unwrap();
        let formula = tb
            .create(
                Operator::Junctor(Junctor::And),
                smallvec![refl, p.clone()],
                Default::default(),
                Default::default(),
            )
            .unwrap();
        let pio = PosInOccurrence::top_level(SequentFormula::new(formula).unwrap(), false);
        let app = simplifier
            .simplify(&tb, &pio, &mut LabelIdGenerator::default())
            .unwrap()
            .unwrap();
        assert_eq!(app.result, p);
        let names: Vec<_> = app.protocol.iter().map(|a| a.rule_name().to_string()).collect();
        assert_eq!(names, vec!["eqClose", "true_and"]);
        assert!(!simplifier.is_applicable(&SequentFormula::new(p).unwrap(), false));
    }

    #[test]
    fn equations_put_null_on_the_right() {
        let tb = TermBuilder;
        let simplifier = OneStepSimplifier::new().unwrap();
        let o = tb.func(&Function::constant("o", node()), vec![]).unwrap();
        let eq = tb.equals(tb.null(), o).unwrap();
        assert_eq!(simplifier.simplify_term(&tb, &eq).unwrap().to_string(), "o = null");
    }
}
