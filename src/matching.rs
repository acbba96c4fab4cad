//! Matching taclet patterns against terms and sequents.
//!
//! Matching is recursive descent over pattern and term in lock step. A
//! failed match is `None`; matching never reports errors.

use crate::app::AssumesFormulaInstantiation;
use crate::inst::{Instantiation, MatchConditions, SVInstantiations};
use crate::schema::SchemaVariable;
use crate::sequent::Sequent;
use crate::taclet::Taclet;
use crate::term::{
    LogicVariable, ModalProgram, Operator, PosInOccurrence, QuantifiableVariable, Term,
    TermEquality,
};

pub struct TacletMatcher<'t> {
    taclet: &'t Taclet,
}

/// The logic variables bound above a position in its formula.
pub fn bound_vars_above(pos: &PosInOccurrence) -> Vec<LogicVariable> {
    let mut result = vec![];
    for (term, child) in pos.path() {
        if term.op().binds_in(child) {
            for var in term.bound_vars() {
                if let Some(v) = var.as_logic() {
                    if !result.contains(v) {
                        result.push(*v);
                    }
                }
            }
        }
    }
    result
}

impl<'t> TacletMatcher<'t> {
    pub fn new(taclet: &'t Taclet) -> Self {
        TacletMatcher { taclet }
    }

    /// Matches the find pattern against `term`. `bound_above` are the
    /// variables bound above the position of `term` in its formula.
    pub fn match_find(
        &self,
        term: &Term,
        bound_above: &[LogicVariable],
        mc: MatchConditions,
    ) -> Option<MatchConditions> {
        let find = self.taclet.find()?;
        let result = self.match_pattern(find, term, bound_above, mc);
        log::trace!(
            "{}: find {find} against {term}: {}",
            self.taclet.name(),
            if result.is_some() { "match" } else { "no match" }
        );
        result
    }

    pub fn match_pattern(
        &self,
        pattern: &Term,
        term: &Term,
        bound_above: &[LogicVariable],
        mc: MatchConditions,
    ) -> Option<MatchConditions> {
        match pattern.op() {
            Operator::SchemaVariable(sv) => {
                return self.match_sv(sv, term, bound_above, mc);
            }
            Operator::LogicVariable(x) => {
                return match term.op() {
                    Operator::LogicVariable(y)
                        if mc
                            .renaming()
                            .corresponds(&QuantifiableVariable::Logic(*x), y) =>
                    {
                        Some(mc)
                    }
                    _ => None,
                };
            }
            Operator::Modality(kind, program) => {
                let Operator::Modality(term_kind, term_program) = term.op() else {
                    return None;
                };
                if kind != term_kind {
                    return None;
                }
                let mc = match (program, term_program) {
                    (ModalProgram::Schema(sv), ModalProgram::Concrete(text)) => {
                        self.match_program(sv, text, mc)?
                    }
                    (p, q) if p == q => mc,
                    _ => return None,
                };
                return self.match_pattern(pattern.sub(0), term.sub(0), bound_above, mc);
            }
            _ => {}
        }

        if pattern.op() != term.op()
            || pattern.arity() != term.arity()
            || pattern.bound_vars().len() != term.bound_vars().len()
        {
            return None;
        }

        let mut mc = mc;
        let outer_renaming = mc.renaming().clone();
        let mut inner = mc.clone();
        for (pattern_var, term_var) in pattern.bound_vars().iter().zip(term.bound_vars()) {
            let concrete = *term_var.as_logic()?;
            inner = match pattern_var {
                QuantifiableVariable::Schema(sv) => {
                    let var_term = crate::term::TermBuilder.var(concrete);
                    self.match_sv(sv, &var_term, bound_above, inner)?
                }
                QuantifiableVariable::Logic(x) => {
                    if x.sort != concrete.sort {
                        return None;
                    }
                    let renaming = inner.renaming().push(pattern_var.clone(), concrete);
                    inner.set_renaming(renaming)
                }
            };
        }
        let inner_renaming = inner.renaming().clone();
        mc = inner.set_renaming(outer_renaming.clone());

        for (i, (p, t)) in pattern.subs().iter().zip(term.subs()).enumerate() {
            if pattern.op().binds_in(i) {
                let scoped = mc.set_renaming(inner_renaming.clone());
                mc = self
                    .match_pattern(p, t, bound_above, scoped)?
                    .set_renaming(outer_renaming.clone());
            } else {
                mc = self.match_pattern(p, t, bound_above, mc)?;
            }
        }
        Some(mc)
    }

    /// Binds `sv` to `term`, or checks an existing binding.
    pub fn match_sv(
        &self,
        sv: &SchemaVariable,
        term: &Term,
        bound_above: &[LogicVariable],
        mc: MatchConditions,
    ) -> Option<MatchConditions> {
        if let Err(reason) = sv.accepts(term) {
            log::trace!("{sv} rejects {term}: {reason}");
            return None;
        }
        let mut insts = mc.instantiations().clone();
        if let crate::sort::Sort::Generic(g) = sv.sort() {
            insts = insts.constrain_generic(g, term.sort())?;
        }
        if let Some(existing) = insts.get_term(sv) {
            return if existing.equals_mod(term, TermEquality::Renaming) {
                Some(mc.set_instantiations(insts))
            } else {
                None
            };
        }
        let insts = insts
            .add(sv.clone(), Instantiation::Term(term.clone()), false)
            .ok()?;
        if !self.free_vars_bound(sv, term, &insts, bound_above) {
            log::trace!("free variables of {term} are not bound at the occurrences of {sv}");
            return None;
        }
        self.check_var_conds(&insts)?;
        Some(mc.set_instantiations(insts))
    }

    pub fn match_program(
        &self,
        sv: &SchemaVariable,
        program: &std::sync::Arc<str>,
        mc: MatchConditions,
    ) -> Option<MatchConditions> {
        if !sv.is_program() {
            return None;
        }
        let value = Instantiation::Program(program.clone());
        let insts = mc.instantiations().add(sv.clone(), value, false).ok()?;
        self.check_var_conds(&insts)?;
        Some(mc.set_instantiations(insts))
    }

    /// The free variables of an instantiation must be bound at every
    /// occurrence of the schema variable: by the instantiations of the
    /// variable schema variables in its prefix, or, for occurrences in the
    /// find context of a rewrite taclet, by binders above the position.
    pub fn free_vars_bound(
        &self,
        sv: &SchemaVariable,
        term: &Term,
        insts: &SVInstantiations,
        bound_above: &[LogicVariable],
    ) -> bool {
        if sv.is_variable() || sv.is_skolem() || sv.is_program() || term.is_closed() {
            return true;
        }
        let Some(prefix) = self.taclet.prefix(sv) else {
            return term.is_closed();
        };
        term.free_vars().iter().all(|v| {
            (prefix.context() && bound_above.contains(v))
                || prefix.prefix().iter().any(|var_sv| {
                    matches!(
                        insts.get_term(var_sv).map(Term::op),
                        Some(Operator::LogicVariable(bound)) if bound == v
                    )
                })
        })
    }

    /// Checks the variable conditions of the taclet. Conditions that cannot
    /// be decided yet pass.
    pub fn check_var_conds(&self, insts: &SVInstantiations) -> Option<()> {
        for cond in self.taclet.var_conds() {
            if !cond.check(insts) {
                log::trace!("{}: {cond} violated", self.taclet.name());
                return None;
            }
        }
        Some(())
    }

    /// Checks all instantiations of `mc` against the prefixes and the
    /// variable conditions.
    pub fn check_conditions(
        &self,
        mc: MatchConditions,
        bound_above: &[LogicVariable],
    ) -> Option<MatchConditions> {
        let insts = mc.instantiations();
        for (sv, inst) in insts.iter() {
            if let Instantiation::Term(term) = inst {
                if !self.free_vars_bound(sv, term, insts, bound_above) {
                    return None;
                }
            }
        }
        self.check_var_conds(insts)?;
        Some(mc)
    }

    /// Matches one assumes formula against candidate formulas. A non-empty
    /// update context has to occur literally on top of a candidate.
    pub fn match_assumes_formula(
        &self,
        candidates: &[AssumesFormulaInstantiation],
        template: &Term,
        mc: &MatchConditions,
    ) -> Vec<(AssumesFormulaInstantiation, MatchConditions)> {
        let context = mc.instantiations().update_context();
        let mut result = vec![];
        'candidates: for candidate in candidates {
            let mut formula = candidate.formula.formula();
            for pair in context.iter() {
                match formula.op() {
                    Operator::UpdateApplication
                        if formula
                            .sub(0)
                            .equals_mod(&pair.update, TermEquality::IrrelevantTermLabels) =>
                    {
                        formula = formula.sub(1);
                    }
                    _ => continue 'candidates,
                }
            }
            let start = mc.set_renaming(Default::default());
            if let Some(matched) = self
                .match_pattern(template, formula, &[], start)
                .and_then(|m| self.check_conditions(m, &[]))
            {
                result.push((candidate.clone(), matched));
            }
        }
        result
    }

    /// All combinations of sequent formulas matching the assumes sequent,
    /// succedent first.
    pub fn match_assumes(
        &self,
        sequent: &Sequent,
        mc: MatchConditions,
    ) -> Vec<(im::Vector<AssumesFormulaInstantiation>, MatchConditions)> {
        let assumes = self.taclet.assumes();
        let templates = assumes
            .succedent()
            .iter()
            .map(|f| (f, false))
            .chain(assumes.antecedent().iter().map(|f| (f, true)));
        let mut results = vec![(im::Vector::new(), mc)];
        for (template, in_antec) in templates {
            let candidates: Vec<AssumesFormulaInstantiation> = sequent
                .side(in_antec)
                .iter()
                .map(|f| AssumesFormulaInstantiation {
                    formula: f.clone(),
                    in_antec,
                })
                .collect();
            let mut next = vec![];
            for (chosen, mc) in &results {
                for (candidate, matched) in
                    self.match_assumes_formula(&candidates, template.formula(), mc)
                {
                    let mut chosen = chosen.clone();
                    chosen.push_back(candidate);
                    next.push((chosen, matched));
                }
            }
            results = next;
            if results.is_empty() {
                break;
            }
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sort::Sort;
    use crate::taclet::{ApplicationRestriction, TacletBuilder, TacletGoalTemplate};
    use crate::term::{Function, Quantifier, TermBuilder};

    fn int() -> Sort {
        Sort::data("int")
    }

    fn plus() -> Function {
        Function::new("+", vec![int(), int()], int())
    }

    #[test]
    fn commutation_pattern() {
        let tb = TermBuilder;
        let a = SchemaVariable::term("a", int());
        let b = SchemaVariable::term("b", int());
        let find = tb.func(&plus(), vec![tb.sv(&a), tb.sv(&b)]).unwrap();
        let replace = tb.func(&plus(), vec![tb.sv(&b), tb.sv(&a)]).unwrap();
        let taclet = TacletBuilder::new("commute")
            .find_rewrite(find, ApplicationRestriction::NONE)
            .goal(TacletGoalTemplate::default().replace_term(replace))
            .build()
            .unwrap();
        let x = tb.func(&Function::constant("x", int()), vec![]).unwrap();
        let one = tb.func(&Function::constant("1", int()), vec![]).unwrap();
        let term = tb.func(&plus(), vec![x.clone(), one.clone()]).unwrap();

        let mc = TacletMatcher::new(&taclet)
            .match_find(&term, &[], MatchConditions::default())
            .unwrap();
        assert_eq!(mc.instantiations().get_term(&a), Some(&x));
        assert_eq!(mc.instantiations().get_term(&b), Some(&one));
    }

    #[test]
    fn repeated_schema_variables_must_agree() {
        let tb = TermBuilder;
        let a = SchemaVariable::term("a", int());
        let find = tb.func(&plus(), vec![tb.sv(&a), tb.sv(&a)]).unwrap();
        let taclet = TacletBuilder::new("double")
            .find_rewrite(find, ApplicationRestriction::NONE)
            .build()
            .unwrap();
        let x = tb.func(&Function::constant("x", int()), vec![]).unwrap();
        let y = tb.func(&Function::constant("y", int()), vec![]).unwrap();
        let matcher = TacletMatcher::new(&taclet);
        let xx = tb.func(&plus(), vec![x.clone(), x.clone()]).unwrap();
        let xy = tb.func(&plus(), vec![x, y]).unwrap();
        assert!(matcher.match_find(&xx, &[], MatchConditions::default()).is_some());
        assert!(matcher.match_find(&xy, &[], MatchConditions::default()).is_none());
    }

    #[test]
    fn binders_and_prefixes() {
        let tb = TermBuilder;
        let node = Sort::object("Node");
        let p = Function::predicate("p", vec![node]);
        let q = Function::predicate("q", vec![node]);
        let x = SchemaVariable::variable("x", node);
        let phi = SchemaVariable::formula("phi");
        let find = tb
            .quantify(Quantifier::All, QuantifiableVariable::Schema(x.clone()), tb.sv(&phi))
            .unwrap();
        let taclet = TacletBuilder::new("allRight")
            .find_succ(find)
            .build()
            .unwrap();
        let y = LogicVariable::new("y", node);
        let body = tb.func(&p, vec![tb.var(y)]).unwrap();
        let term = tb.all(y, body.clone()).unwrap();

        let mc = TacletMatcher::new(&taclet)
            .match_find(&term, &[], MatchConditions::default())
            .unwrap();
        assert_eq!(mc.instantiations().get_term(&x), Some(&tb.var(y)));
        assert_eq!(mc.instantiations().get_term(&phi), Some(&body));

        // phi may not contain variables bound outside of its prefix
        let rigid = TacletBuilder::new("phi")
            .find_rewrite(tb.sv(&phi), ApplicationRestriction::NONE)
            .build()
            .unwrap();
        let not_context = TacletBuilder::new("phi_assumes")
            .find_succ(tb.func(&q, vec![tb.null()]).unwrap())
            .assumes(Sequent::from_terms(vec![tb.sv(&phi)], vec![]).unwrap())
            .build()
            .unwrap();
        // below `\forall y`, rewriting may see y free
        let at_body =
            TacletMatcher::new(&rigid).match_find(&body, &[y], MatchConditions::default());
        assert!(at_body.is_some());
        let insts = SVInstantiations::default()
            .add(phi.clone(), Instantiation::Term(body.clone()), false)
            .unwrap();
        assert!(!TacletMatcher::new(&not_context).free_vars_bound(&phi, &body, &insts, &[y]));
    }

    #[test]
    fn concrete_binders_match_modulo_renaming() {
        let tb = TermBuilder;
        let node = Sort::object("Node");
        let p = Function::predicate("p", vec![node]);
        let x = LogicVariable::new("x", node);
        let y = LogicVariable::new("y", node);
        let pattern = tb.all(x, tb.func(&p, vec![tb.var(x)]).unwrap()).unwrap();
        let taclet = TacletBuilder::new("ground")
            .find_succ(pattern)
            .build()
            .unwrap();
        let renamed = tb.all(y, tb.func(&p, vec![tb.var(y)]).unwrap()).unwrap();
        let other = tb.all(y, tb.func(&p, vec![tb.null()]).unwrap()).unwrap();
        let matcher = TacletMatcher::new(&taclet);
        assert!(matcher.match_find(&renamed, &[], MatchConditions::default()).is_some());
        assert!(matcher.match_find(&other, &[], MatchConditions::default()).is_none());
    }

    #[test]
    fn assumes_combinations() {
        let tb = TermBuilder;
        let phi = SchemaVariable::formula("phi");
        let psi = SchemaVariable::formula("psi");
        let taclet = TacletBuilder::new("pairs")
            .assumes(Sequent::from_terms(vec![tb.sv(&phi)], vec![tb.sv(&psi)]).unwrap())
            .build()
            .unwrap();
        let atom = |n: &str| tb.func(&Function::predicate(n, vec![]), vec![]).unwrap();
        let sequent =
            Sequent::from_terms(vec![atom("a"), atom("b")], vec![atom("c"), atom("d"), atom("e")])
                .unwrap();
        let results =
            TacletMatcher::new(&taclet).match_assumes(&sequent, MatchConditions::default());
        assert_eq!(results.len(), 6);
        // succedent formulas are chosen first
        assert!(!results[0].0[0].in_antec);
        assert!(results[0].0[1].in_antec);
    }
}
