//! The built-in rule base.
//!
//! [`default_rules`] returns the calculus used by the automatic strategy,
//! grouped in rule sets. [`simplification_taclets`] are the rewrite rules
//! performed by the [`simplifier::OneStepSimplifier`].

pub mod simplifier;

use std::sync::Arc;

use smallvec::SmallVec;

use crate::schema::SchemaVariable;
use crate::sequent::Sequent;
use crate::sort::Sort;
use crate::taclet::{
    ApplicationRestriction, Taclet, TacletBuilder, TacletGoalTemplate, VariableCondition,
};
use crate::term::{Junctor, Operator, QuantifiableVariable, Quantifier, Term, TermBuilder};
use crate::Result;

/// Builds `op(subs)` without the simplifications of the junctor builders.
fn raw(op: Operator, subs: Vec<Term>) -> Result<Term> {
    TermBuilder.create(op, SmallVec::from_vec(subs), Default::default(), Default::default())
}

fn junctor(j: Junctor, subs: Vec<Term>) -> Result<Term> {
    raw(Operator::Junctor(j), subs)
}

fn sequent(ante: Vec<Term>, succ: Vec<Term>) -> Result<Sequent> {
    Sequent::from_terms(ante, succ)
}

fn replace(ante: Vec<Term>, succ: Vec<Term>) -> Result<TacletGoalTemplate> {
    Ok(TacletGoalTemplate::default().replace_sequent(sequent(ante, succ)?))
}

struct Svs {
    phi: SchemaVariable,
    psi: SchemaVariable,
    s: SchemaVariable,
    t: SchemaVariable,
}

impl Svs {
    fn new() -> Svs {
        let g = Sort::generic("G");
        Svs {
            phi: SchemaVariable::formula("phi"),
            psi: SchemaVariable::formula("psi"),
            s: SchemaVariable::term("s", g),
            t: SchemaVariable::term("t", g),
        }
    }
}

/// The rules of the calculus.
///
/// | rule set | rules |
/// |---|---|
/// | `closure` | `close`, `closeTrue`, `closeFalse` |
/// | `simplify_sequent` | `true_left`, `false_right` |
/// | `alpha` | `notLeft`, `notRight`, `andLeft`, `orRight`, `impRight` |
/// | `beta` | `andRight`, `orLeft`, `impLeft`, `equivLeft`, `equivRight` |
/// | `delta` | `allRight`, `exLeft` |
/// | `gamma` | `allLeft`, `exRight` |
/// | `cut` | `cut` |
/// | `apply_equations` | `applyEq` |
/// | `replace_known` | `replace_known_left`, `replace_known_right` |
/// | `split_cond` | `ifthenelse_split`, `ifthenelse_split_for` |
pub fn default_rules() -> Result<Vec<Arc<Taclet>>> {
    let tb = TermBuilder;
    let Svs { phi, psi, s, t } = Svs::new();
    let (a, b) = (tb.sv(&phi), tb.sv(&psi));
    let mut rules = vec![];

    rules.push(
        TacletBuilder::new("close")
            .find_succ(a.clone())
            .assumes(sequent(vec![a.clone()], vec![])?)
            .rule_set("closure")
            .build()?,
    );
    rules.push(TacletBuilder::new("closeTrue").find_succ(tb.tt()).rule_set("closure").build()?);
    rules.push(TacletBuilder::new("closeFalse").find_antec(tb.ff()).rule_set("closure").build()?);
    rules.push(
        TacletBuilder::new("true_left")
            .find_antec(tb.tt())
            .goal(replace(vec![], vec![])?)
            .rule_set("simplify_sequent")
            .build()?,
    );
    rules.push(
        TacletBuilder::new("false_right")
            .find_succ(tb.ff())
            .goal(replace(vec![], vec![])?)
            .rule_set("simplify_sequent")
            .build()?,
    );

    let not_a = junctor(Junctor::Not, vec![a.clone()])?;
    let and = junctor(Junctor::And, vec![a.clone(), b.clone()])?;
    let or = junctor(Junctor::Or, vec![a.clone(), b.clone()])?;
    let imp = junctor(Junctor::Imp, vec![a.clone(), b.clone()])?;
    let eqv = raw(Operator::Equiv, vec![a.clone(), b.clone()])?;

    let alpha = [
        ("notLeft", not_a.clone(), true, replace(vec![], vec![a.clone()])?),
        ("notRight", not_a, false, replace(vec![a.clone()], vec![])?),
        ("andLeft", and.clone(), true, replace(vec![a.clone(), b.clone()], vec![])?),
        ("orRight", or.clone(), false, replace(vec![], vec![a.clone(), b.clone()])?),
        ("impRight", imp.clone(), false, replace(vec![a.clone()], vec![b.clone()])?),
    ];
    for (name, find, in_antec, template) in alpha {
        rules.push(
            side(TacletBuilder::new(name), find, in_antec)
                .goal(template)
                .rule_set("alpha")
                .build()?,
        );
    }

    let beta = [
        (
            "andRight",
            and,
            false,
            [
                replace(vec![], vec![a.clone()])?,
                replace(vec![], vec![b.clone()])?,
            ],
        ),
        (
            "orLeft",
            or,
            true,
            [
                replace(vec![a.clone()], vec![])?,
                replace(vec![b.clone()], vec![])?,
            ],
        ),
        (
            "impLeft",
            imp,
            true,
            [
                replace(vec![], vec![a.clone()])?,
                replace(vec![b.clone()], vec![])?,
            ],
        ),
        (
            "equivLeft",
            eqv.clone(),
            true,
            [
                replace(vec![a.clone(), b.clone()], vec![])?,
                replace(vec![], vec![a.clone(), b.clone()])?,
            ],
        ),
        (
            "equivRight",
            eqv,
            false,
            [
                replace(vec![a.clone()], vec![b.clone()])?,
                replace(vec![b.clone()], vec![a.clone()])?,
            ],
        ),
    ];
    for (name, find, in_antec, [left, right]) in beta {
        rules.push(
            side(TacletBuilder::new(name), find, in_antec)
                .goal(left)
                .goal(right)
                .rule_set("beta")
                .build()?,
        );
    }

    rules.extend(quantifier_rules(&tb, &phi)?);

    let cut = SchemaVariable::formula("cutFormula");
    rules.push(
        TacletBuilder::new("cut")
            .goal(
                TacletGoalTemplate::default()
                    .named("TRUE")
                    .add(sequent(vec![tb.sv(&cut)], vec![])?),
            )
            .goal(
                TacletGoalTemplate::default()
                    .named("FALSE")
                    .add(sequent(vec![], vec![tb.sv(&cut)])?),
            )
            .rule_set("cut")
            .build()?,
    );

    let same_level = ApplicationRestriction::SAME_UPDATE_LEVEL;
    let (s_term, t_term) = (tb.sv(&s), tb.sv(&t));
    let equation = raw(Operator::Equals, vec![s_term.clone(), t_term.clone()])?;
    rules.push(
        TacletBuilder::new("applyEq")
            .find_rewrite(s_term.clone(), same_level)
            .assumes(sequent(vec![equation], vec![])?)
            .goal(TacletGoalTemplate::default().replace_term(t_term.clone()))
            .rule_set("apply_equations")
            .build()?,
    );
    rules.push(
        TacletBuilder::new("replace_known_left")
            .find_rewrite(a.clone(), same_level)
            .assumes(sequent(vec![a.clone()], vec![])?)
            .goal(TacletGoalTemplate::default().replace_term(tb.tt()))
            .rule_set("replace_known")
            .build()?,
    );
    rules.push(
        TacletBuilder::new("replace_known_right")
            .find_rewrite(a.clone(), same_level)
            .assumes(sequent(vec![], vec![a.clone()])?)
            .goal(TacletGoalTemplate::default().replace_term(tb.ff()))
            .rule_set("replace_known")
            .build()?,
    );

    let cond = SchemaVariable::formula("cond");
    let c = tb.sv(&cond);
    let splits = [
        ("ifthenelse_split", s_term, t_term),
        ("ifthenelse_split_for", a, b),
    ];
    for (name, then, els) in splits {
        let find = raw(Operator::IfThenElse, vec![c.clone(), then.clone(), els.clone()])?;
        rules.push(
            TacletBuilder::new(name)
                .find_rewrite(find, same_level)
                .goal(
                    TacletGoalTemplate::default()
                        .named("TRUE")
                        .replace_term(then)
                        .add(sequent(vec![c.clone()], vec![])?),
                )
                .goal(
                    TacletGoalTemplate::default()
                        .named("FALSE")
                        .replace_term(els)
                        .add(sequent(vec![], vec![c.clone()])?),
                )
                .rule_set("split_cond")
                .build()?,
        );
    }

    Ok(rules)
}

fn side(builder: TacletBuilder, find: Term, in_antec: bool) -> TacletBuilder {
    if in_antec {
        builder.find_antec(find)
    } else {
        builder.find_succ(find)
    }
}

/// `allRight` and `exLeft` introduce a skolem constant, `allLeft` and
/// `exRight` instantiate with an arbitrary term.
fn quantifier_rules(tb: &TermBuilder, phi: &SchemaVariable) -> Result<Vec<Arc<Taclet>>> {
    let g = Sort::generic("G");
    let x = SchemaVariable::variable("x", g);
    let sk = SchemaVariable::skolem("sk", g);
    let inst = SchemaVariable::term("inst", g);
    let body = tb.sv(phi);
    let bound = QuantifiableVariable::Schema(x.clone());
    let subst = |value: &SchemaVariable| {
        tb.create(
            Operator::Subst,
            SmallVec::from_vec(vec![tb.sv(value), body.clone()]),
            SmallVec::from_vec(vec![bound.clone()]),
            Default::default(),
        )
    };
    let all = tb.quantify(Quantifier::All, bound.clone(), body.clone())?;
    let ex = tb.quantify(Quantifier::Ex, bound.clone(), body.clone())?;

    Ok(vec![
        TacletBuilder::new("allRight")
            .find_succ(all.clone())
            .goal(replace(vec![], vec![subst(&sk)?])?)
            .rule_set("delta")
            .build()?,
        TacletBuilder::new("exLeft")
            .find_antec(ex.clone())
            .goal(replace(vec![subst(&sk)?], vec![])?)
            .rule_set("delta")
            .build()?,
        TacletBuilder::new("allLeft")
            .find_antec(all)
            .goal(TacletGoalTemplate::default().add(sequent(vec![subst(&inst)?], vec![])?))
            .rule_set("gamma")
            .build()?,
        TacletBuilder::new("exRight")
            .find_succ(ex)
            .goal(TacletGoalTemplate::default().add(sequent(vec![], vec![subst(&inst)?])?))
            .rule_set("gamma")
            .build()?,
    ])
}

/// The rewrite rules of the one-step simplifier, all in rule set `simplify`.
pub fn simplification_taclets() -> Result<Vec<Arc<Taclet>>> {
    let tb = TermBuilder;
    let Svs { phi, psi, s, t } = Svs::new();
    let a = tb.sv(&phi);
    let (tt, ff) = (tb.tt(), tb.ff());
    let not = |t: Term| junctor(Junctor::Not, vec![t]);
    let and = |l: Term, r: Term| junctor(Junctor::And, vec![l, r]);
    let or = |l: Term, r: Term| junctor(Junctor::Or, vec![l, r]);
    let imp = |l: Term, r: Term| junctor(Junctor::Imp, vec![l, r]);
    let eqv = |l: Term, r: Term| raw(Operator::Equiv, vec![l, r]);

    let mut rewrites = vec![
        ("double_not", not(not(a.clone())?)?, a.clone()),
        ("not_true", not(tt.clone())?, ff.clone()),
        ("not_false", not(ff.clone())?, tt.clone()),
        ("and_true", and(a.clone(), tt.clone())?, a.clone()),
        ("true_and", and(tt.clone(), a.clone())?, a.clone()),
        ("and_false", and(a.clone(), ff.clone())?, ff.clone()),
        ("false_and", and(ff.clone(), a.clone())?, ff.clone()),
        ("and_same", and(a.clone(), a.clone())?, a.clone()),
        ("or_true", or(a.clone(), tt.clone())?, tt.clone()),
        ("true_or", or(tt.clone(), a.clone())?, tt.clone()),
        ("or_false", or(a.clone(), ff.clone())?, a.clone()),
        ("false_or", or(ff.clone(), a.clone())?, a.clone()),
        ("or_same", or(a.clone(), a.clone())?, a.clone()),
        ("imp_true", imp(a.clone(), tt.clone())?, tt.clone()),
        ("true_imp", imp(tt.clone(), a.clone())?, a.clone()),
        ("false_imp", imp(ff.clone(), a.clone())?, tt.clone()),
        ("imp_false", imp(a.clone(), ff.clone())?, not(a.clone())?),
        ("eqv_true", eqv(a.clone(), tt.clone())?, a.clone()),
        ("true_eqv", eqv(tt.clone(), a.clone())?, a.clone()),
        ("eqv_false", eqv(a.clone(), ff.clone())?, not(a.clone())?),
        ("false_eqv", eqv(ff.clone(), a.clone())?, not(a.clone())?),
        ("eqv_same", eqv(a.clone(), a.clone())?, tt.clone()),
        ("eqClose", raw(Operator::Equals, vec![tb.sv(&s), tb.sv(&s)])?, tt.clone()),
    ];

    let (then_f, else_f) = (a.clone(), tb.sv(&psi));
    let (then_t, else_t) = (tb.sv(&s), tb.sv(&t));
    let cond = tb.sv(&SchemaVariable::formula("cond"));
    let ite = |c: Term, th: Term, el: Term| raw(Operator::IfThenElse, vec![c, th, el]);
    let ite_rules = [
        (["ite_true", "ite_false", "ite_same"], then_t, else_t),
        (["ite_true_for", "ite_false_for", "ite_same_for"], then_f, else_f),
    ];
    for ([on_true, on_false, same], then, els) in ite_rules {
        rewrites.push((on_true, ite(tt.clone(), then.clone(), els.clone())?, then.clone()));
        rewrites.push((on_false, ite(ff.clone(), then.clone(), els.clone())?, els));
        rewrites.push((same, ite(cond.clone(), then.clone(), then.clone())?, then));
    }

    let mut taclets = rewrites
        .into_iter()
        .map(|(name, find, with)| {
            TacletBuilder::new(name)
                .find_rewrite(find, ApplicationRestriction::NONE)
                .goal(TacletGoalTemplate::default().replace_term(with))
                .rule_set("simplify")
                .build()
        })
        .collect::<Result<Vec<_>>>()?;

    let x = SchemaVariable::variable("x", Sort::generic("G"));
    for (name, q) in [("all_unused", Quantifier::All), ("ex_unused", Quantifier::Ex)] {
        let find = tb.quantify(q, QuantifiableVariable::Schema(x.clone()), a.clone())?;
        taclets.push(
            TacletBuilder::new(name)
                .find_rewrite(find, ApplicationRestriction::NONE)
                .var_cond(VariableCondition::NotFreeIn {
                    var: x.clone(),
                    term: phi.clone(),
                })
                .goal(TacletGoalTemplate::default().replace_term(a.clone()))
                .rule_set("simplify")
                .build()?,
        );
    }
    Ok(taclets)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_names_are_unique() {
        let rules = default_rules().unwrap();
        let simplify = simplification_taclets().unwrap();
        let mut names: Vec<_> = rules.iter().chain(&simplify).map(|t| t.name()).collect();
        let count = names.len();
        names.sort_by_key(|n| n.as_str());
        names.dedup();
        assert_eq!(names.len(), count);
    }

    #[test]
    fn closing_rules_have_no_goals() {
        let rules = default_rules().unwrap();
        let closing: Vec<_> = rules
            .iter()
            .filter(|t| t.is_closing())
            .map(|t| t.name().as_str())
            .collect();
        assert_eq!(closing, vec!["close", "closeTrue", "closeFalse"]);
        assert!(rules.iter().all(|t| !t.rule_sets().is_empty()));
    }

    #[test]
    fn default_environment_loads() {
        assert!(crate::proof::ProofEnvironment::with_default_rules().is_ok());
    }

    #[test]
    fn unused_quantifiers_are_dropped() {
        use crate::inst::MatchConditions;
        use crate::matching::TacletMatcher;
        use crate::term::{Function, LogicVariable};

        let simplify = simplification_taclets().unwrap();
        let all_unused = simplify
            .iter()
            .find(|t| t.name().as_str() == "all_unused")
            .unwrap();
        let matcher = TacletMatcher::new(all_unused);
        let tb = TermBuilder;
        let node = Sort::object("Node");
        let y = LogicVariable::new("y", node);
        let p = tb.func(&Function::predicate("p", vec![]), vec![]).unwrap();
        let r = Function::predicate("r", vec![node]);

        let unused = tb.all(y, p.clone()).unwrap();
        let mc = matcher
            .match_find(&unused, &[], MatchConditions::default())
            .unwrap();
        let phi = all_unused
            .schema_vars()
            .iter()
            .find(|sv| sv.name().as_str() == "phi")
            .unwrap();
        assert_eq!(mc.instantiations().get_term(phi), Some(&p));

        let used = tb.all(y, tb.func(&r, vec![tb.var(y)]).unwrap()).unwrap();
        assert!(matcher
            .match_find(&used, &[], MatchConditions::default())
            .is_none());
    }
}
