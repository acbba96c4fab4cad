//! Applying rule apps to goals.

use smallvec::SmallVec;

use crate::app::TacletApp;
use crate::inst::{Instantiation, SVInstantiations};
use crate::proof::{NodeId, Proof, RuleApp};
use crate::sequent::{Sequent, SequentFormula};
use crate::taclet::{Replacement, TacletGoalTemplate, TacletKind};
use crate::term::{
    BoundVars, FormulaTermLabel, Function, LabelId, LabelIdGenerator, ModalProgram, Operator,
    QuantifiableVariable, Subterms, Term, TermBuilder, TermLabel,
};
use crate::{Error, Result};

/// Replaces the schema variables of a template by their instantiations.
/// Generic sorts are resolved and substitutions applied.
pub fn instantiate(tb: &TermBuilder, template: &Term, insts: &SVInstantiations) -> Result<Term> {
    let missing = |sv: &crate::schema::SchemaVariable| Error::IllegalInstantiation {
        sv: sv.name(),
        msg: "not instantiated".into(),
    };
    let op = match template.op() {
        Operator::SchemaVariable(sv) => {
            return insts.get_term(sv).cloned().ok_or_else(|| missing(sv));
        }
        Operator::Modality(kind, ModalProgram::Schema(sv)) => match insts.get(sv) {
            Some(Instantiation::Program(p)) => {
                Operator::Modality(*kind, ModalProgram::Concrete(p.clone()))
            }
            _ => return Err(missing(sv)),
        },
        Operator::Function(f)
            if f.arg_sorts().iter().chain([&f.sort()]).any(|s| s.is_generic()) =>
        {
            let args = f
                .arg_sorts()
                .iter()
                .map(|s| insts.instantiate_sort(*s))
                .collect();
            let sort = insts.instantiate_sort(f.sort());
            Operator::Function(Function::new(f.name().as_str(), args, sort))
        }
        op => op.clone(),
    };
    let bound_vars = template
        .bound_vars()
        .iter()
        .map(|var| match var {
            QuantifiableVariable::Schema(sv) => match insts.get_term(sv).map(Term::op) {
                Some(Operator::LogicVariable(v)) => Ok(QuantifiableVariable::Logic(*v)),
                _ => Err(missing(sv)),
            },
            QuantifiableVariable::Logic(v) => Ok(QuantifiableVariable::Logic(*v)),
        })
        .collect::<Result<BoundVars>>()?;
    let subs = template
        .subs()
        .iter()
        .map(|sub| instantiate(tb, sub, insts))
        .collect::<Result<Subterms>>()?;
    if let Operator::Subst = op {
        let Some(QuantifiableVariable::Logic(var)) = bound_vars.first() else {
            return Err(Error::ProofInput(format!("malformed substitution {template}")));
        };
        return tb.subst(*var, &subs[0], &subs[1]);
    }
    tb.create(op, subs, bound_vars, template.labels().into())
}

/// Whether the truth value of `term` is traced when labeled.
pub fn is_traceable(term: &Term) -> bool {
    term.is_formula()
        && !matches!(
            term.op(),
            Operator::UpdateApplication | Operator::Modality(..) | Operator::Subst
        )
}

/// Records that `term` was produced by a rule applied on a term labeled
/// `app_label`. Unlabeled terms get a fresh minor id of the same major.
pub fn refactor_label(term: Term, app_label: Option<LabelId>, ids: &mut LabelIdGenerator) -> Term {
    let Some(app_label) = app_label else {
        return term;
    };
    if !is_traceable(&term) {
        return term;
    }
    let label = match term.formula_label() {
        Some(existing) => existing.clone().with_before_id(app_label),
        None => FormulaTermLabel::new(ids.fresh_minor(app_label.major)).with_before_id(app_label),
    };
    TermBuilder.label(&term, TermLabel::Formula(label))
}

fn application_label(app: &TacletApp) -> Option<LabelId> {
    app.pos_in_occurrence()
        .and_then(|pio| pio.sub_term().formula_label())
        .map(|l| l.id)
}

/// Rewrites the find position of a complete rewrite app with a single
/// replacement term and returns the new formula.
pub fn rewrite_formula(
    tb: &TermBuilder,
    app: &TacletApp,
    ids: &mut LabelIdGenerator,
) -> Result<Term> {
    let pio = app
        .pos_in_occurrence()
        .ok_or_else(|| Error::ProofInput(format!("{} has no position", app.rule_name())))?;
    let replacement = app
        .taclet()
        .goal_templates()
        .first()
        .and_then(TacletGoalTemplate::replace_with_term)
        .ok_or_else(|| Error::ProofInput(format!("{} does not rewrite", app.rule_name())))?;
    let with = instantiate(tb, replacement, app.instantiations())?;
    let with = refactor_label(with, application_label(app), ids);
    pio.replace(tb, with)
}

fn sequent_formula(term: Term) -> Result<SequentFormula> {
    SequentFormula::new(term)
}

/// The sequents of the children of applying `app` to `sequent`, one per goal
/// template in template order.
pub fn child_sequents(
    tb: &TermBuilder,
    sequent: &Sequent,
    app: &TacletApp,
    ids: &mut LabelIdGenerator,
) -> Result<Vec<Sequent>> {
    app.check_applicability()?;
    let taclet = app.taclet();
    let insts = app.instantiations();
    let app_label = application_label(app);
    let context: Vec<_> = insts.update_context().iter().cloned().collect();
    let wrap = |term: &Term, ids: &mut LabelIdGenerator| -> Result<Term> {
        let inst = instantiate(tb, term, insts)?;
        let inst = refactor_label(inst, app_label, ids);
        tb.apply_update_pairs_sequential(&context, inst)
    };

    let mut children = Vec::with_capacity(taclet.goal_templates().len());
    for template in taclet.goal_templates() {
        let mut child = sequent.clone();
        match (&template.replace_with, app.pos_in_occurrence()) {
            (Some(Replacement::Term(with)), Some(pio)) if taclet.is_rewrite() => {
                let with = instantiate(tb, with, insts)?;
                let with = refactor_label(with, app_label, ids);
                let formula = sequent_formula(pio.replace(tb, with)?)?;
                child = child.change_formula(pio.sequent_formula(), formula, pio.is_in_antec());
            }
            (Some(Replacement::Sequent(with)), Some(pio)) => {
                let in_antec = pio.is_in_antec();
                let mut idx = child
                    .side(in_antec)
                    .index_of(pio.sequent_formula())
                    .unwrap_or(usize::MAX);
                child = child.remove_formula(pio.sequent_formula(), in_antec);
                for (formula, side) in with.formulas() {
                    let formula = sequent_formula(wrap(formula.formula(), ids)?)?;
                    if side == in_antec {
                        let before = child.side(side).len();
                        child = child.insert_formula(formula, side, idx);
                        if child.side(side).len() > before {
                            idx = idx.saturating_add(1);
                        }
                    } else {
                        child = child.add_formula(formula, side);
                    }
                }
            }
            (None, _) => {}
            (Some(_), _) => {
                return Err(Error::ProofInput(format!(
                    "{} cannot replace at this position",
                    taclet.name()
                )))
            }
        }
        for (formula, side) in template.add.formulas() {
            let formula = sequent_formula(wrap(formula.formula(), ids)?)?;
            child = child.add_formula(formula, side);
        }
        children.push(child);
    }
    debug_assert!(
        taclet.kind() != TacletKind::NoFind || app.pos_in_occurrence().is_none(),
        "no-find taclets have no position"
    );
    Ok(children)
}

/// Applies `app` to the open goal `goal` and returns the new goals.
pub fn apply(proof: &mut Proof, goal: NodeId, app: RuleApp) -> Result<Vec<NodeId>> {
    let sequent = proof.node(goal).sequent().clone();
    let tb = *proof.env().tb();
    match app {
        RuleApp::Taclet(app) => {
            let children = {
                let ids = proof.label_ids_mut();
                child_sequents(&tb, &sequent, &app, ids)?
            };
            log::debug!("node {goal}: {app} ({} children)", children.len());
            proof.expand(goal, RuleApp::Taclet(app), children)
        }
        RuleApp::Simplifier(app) => {
            let mut ids = proof.label_ids_mut().clone();
            let simplified = proof.env().simplifier().simplify(&tb, &app.pio, &mut ids)?;
            let Some(simplified) = simplified else {
                return Err(Error::NotExecutable {
                    taclet: crate::Symbol::from(crate::rules::simplifier::OneStepSimplifier::NAME),
                    pos: app.pio.to_string(),
                });
            };
            *proof.label_ids_mut() = ids;
            let formula = sequent_formula(simplified.result.clone())?;
            let child = sequent.change_formula(
                simplified.pio.sequent_formula(),
                formula,
                simplified.pio.is_in_antec(),
            );
            log::debug!("node {goal}: {} -> {}", simplified.pio, simplified.result);
            proof.expand(goal, RuleApp::Simplifier(simplified), vec![child])
        }
    }
}

/// Labels every traceable subterm of `term` that has no formula label with a
/// fresh major id.
pub fn add_formula_labels(term: &Term, ids: &mut LabelIdGenerator) -> Result<Term> {
    let subs = term
        .subs()
        .iter()
        .map(|sub| add_formula_labels(sub, ids))
        .collect::<Result<Subterms>>()?;
    let mut labels: SmallVec<[TermLabel; 1]> = term.labels().into();
    if is_traceable(term) && term.formula_label().is_none() {
        labels.push(TermLabel::Formula(FormulaTermLabel::new(ids.fresh_id())));
    }
    TermBuilder.create(term.op().clone(), subs, term.bound_vars().into(), labels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proof::ProofEnvironment;
    use crate::schema::SchemaVariable;
    use crate::sort::Sort;
    use crate::taclet::{ApplicationRestriction, TacletBuilder};
    use crate::term::{ModalityKind, PosInOccurrence, PosInTerm, ProgramVariable};

    fn pred(name: &str) -> Term {
        TermBuilder
            .func(&Function::predicate(name, vec![]), vec![])
            .unwrap()
    }

    fn top(sequent: &Sequent, in_antec: bool, idx: usize) -> PosInOccurrence {
        PosInOccurrence::top_level(sequent.side(in_antec).get(idx).unwrap().clone(), in_antec)
    }

    #[test]
    fn split_children_keep_untouched_formulas() {
        let tb = TermBuilder;
        let env = ProofEnvironment::with_default_rules().unwrap();
        let and_right = env.taclet_index().get("andRight").unwrap().clone();
        let (a, b, c, d) = (pred("a"), pred("b"), pred("c"), pred("d"));
        let sequent = Sequent::from_terms(
            vec![c.clone()],
            vec![d.clone(), tb.and(a.clone(), b.clone()).unwrap()],
        )
        .unwrap();
        let mut proof = Proof::new("split", env, sequent.clone());
        let app = TacletApp::at(and_right, top(&sequent, false, 1))
            .unwrap()
            .find_assumes_instantiations(&sequent)
            .remove(0);
        let root = proof.root();
        let goals = apply(&mut proof, root, RuleApp::Taclet(app)).unwrap();
        assert_eq!(goals.len(), 2);
        assert_eq!(proof.node(goals[0]).sequent().to_string(), "c ==> d, a");
        assert_eq!(proof.node(goals[1]).sequent().to_string(), "c ==> d, b");
        assert_eq!(proof.open_goals(), goals);
    }

    #[test]
    fn added_formulas_get_the_update_context() {
        let tb = TermBuilder;
        let int = Sort::data("int");
        let x = ProgramVariable::new("x", int);
        let a = SchemaVariable::term("a", int);
        let p = Function::predicate("p", vec![int]);
        let q = Function::predicate("q", vec![int]);
        let taclet = TacletBuilder::new("remember")
            .find_rewrite(
                tb.func(&p, vec![tb.sv(&a)]).unwrap(),
                ApplicationRestriction::SAME_UPDATE_LEVEL,
            )
            .goal(TacletGoalTemplate::default().add(
                Sequent::from_terms(vec![tb.func(&q, vec![tb.sv(&a)]).unwrap()], vec![]).unwrap(),
            ))
            .build()
            .unwrap();
        let one = tb.func(&Function::constant("1", int), vec![]).unwrap();
        let update = tb.elementary(x, one).unwrap();
        let formula = tb
            .apply(update, tb.func(&p, vec![tb.pv(x)]).unwrap())
            .unwrap();
        let sequent = Sequent::from_terms(vec![], vec![formula]).unwrap();
        let pio = PosInOccurrence::new(
            sequent.succedent().get(0).unwrap().clone(),
            PosInTerm::top_level().down(1),
            false,
        )
        .unwrap();
        let app = TacletApp::at(taclet, pio)
            .unwrap()
            .find_assumes_instantiations(&sequent)
            .remove(0);
        let children =
            child_sequents(&tb, &sequent, &app, &mut LabelIdGenerator::default()).unwrap();
        assert_eq!(children[0].to_string(), "{x := 1}q(x) ==> {x := 1}p(x)");
    }

    #[test]
    fn program_schema_variables_are_instantiated() {
        let tb = TermBuilder;
        let prog = SchemaVariable::program("#p");
        let phi = SchemaVariable::formula("phi");
        let template = tb
            .dia(ModalProgram::Schema(prog.clone()), tb.sv(&phi))
            .unwrap();
        let insts = SVInstantiations::default()
            .add(prog, Instantiation::Program("x = 1;".into()), true)
            .unwrap()
            .add(phi, Instantiation::Term(pred("post")), true)
            .unwrap();
        let term = instantiate(&tb, &template, &insts).unwrap();
        assert_eq!(term.to_string(), "\\<{ x = 1; }\\>post");
        assert!(matches!(term.op(), Operator::Modality(ModalityKind::Diamond, _)));
    }

    #[test]
    fn rewritten_formulas_record_their_origin() {
        let mut ids = LabelIdGenerator::default();
        let tb = TermBuilder;
        let labeled = add_formula_labels(&tb.not(pred("p")).unwrap(), &mut ids).unwrap();
        assert_eq!(labeled.formula_label().unwrap().id, LabelId::new(2, 0));
        let produced = refactor_label(pred("q"), Some(LabelId::new(2, 0)), &mut ids);
        assert_eq!(produced.formula_label().unwrap().to_string(), "F(2.1, 2.0)");
        let relabeled = refactor_label(labeled.sub(0).clone(), Some(LabelId::new(2, 0)), &mut ids);
        assert_eq!(relabeled.formula_label().unwrap().to_string(), "F(1.0, 2.0)");
    }
}
