use std::sync::Arc;

use taclet::app::TacletApp;
use taclet::executor;
use taclet::inst::MatchConditions;
use taclet::matching::TacletMatcher;
use taclet::proof::{Proof, ProofEnvironment, RuleApp};
use taclet::schema::SchemaVariable;
use taclet::sequent::Sequent;
use taclet::sort::Sort;
use taclet::taclet::{ApplicationRestriction, Taclet, TacletBuilder, TacletGoalTemplate};
use taclet::term::{Function, ModalProgram, PosInOccurrence, PosInTerm, Term, TermBuilder};

fn int() -> Sort {
    Sort::data("int")
}

fn plus() -> Function {
    Function::new("+", vec![int(), int()], int())
}

fn constant(name: &str) -> Term {
    TermBuilder.func(&Function::constant(name, int()), vec![]).unwrap()
}

fn commute(restriction: ApplicationRestriction) -> (Arc<Taclet>, SchemaVariable, SchemaVariable) {
    let tb = TermBuilder;
    let a = SchemaVariable::term("a", int());
    let b = SchemaVariable::term("b", int());
    let find = tb.func(&plus(), vec![tb.sv(&a), tb.sv(&b)]).unwrap();
    let swapped = tb.func(&plus(), vec![tb.sv(&b), tb.sv(&a)]).unwrap();
    let taclet = TacletBuilder::new("commute")
        .find_rewrite(find, restriction)
        .goal(TacletGoalTemplate::default().replace_term(swapped))
        .build()
        .unwrap();
    (taclet, a, b)
}

#[test]
fn commutation_rewrites_below_a_predicate() {
    let _ = env_logger::builder().is_test(true).try_init();
    let tb = TermBuilder;
    let (taclet, a, b) = commute(ApplicationRestriction::NONE);
    let (x, one) = (constant("x"), constant("1"));
    let p = Function::predicate("p", vec![int()]);
    let sum = tb.func(&plus(), vec![x.clone(), one.clone()]).unwrap();
    let formula = tb.func(&p, vec![sum]).unwrap();
    let sequent = Sequent::from_terms(vec![], vec![formula]).unwrap();
    let mut proof = Proof::new("commute", ProofEnvironment::with_default_rules().unwrap(), sequent);
    let root = proof.root();

    let sf = proof.node(root).sequent().succedent().get(0).unwrap().clone();
    let pio = PosInOccurrence::new(sf, PosInTerm::top_level().down(0), false).unwrap();
    let app = TacletApp::at(taclet, pio).unwrap();
    assert_eq!(app.instantiations().get_term(&a), Some(&x));
    assert_eq!(app.instantiations().get_term(&b), Some(&one));
    assert!(app.complete());

    let children = executor::apply(&mut proof, root, RuleApp::Taclet(app)).unwrap();
    assert_eq!(children.len(), 1);
    let expected = tb.func(&p, vec![tb.func(&plus(), vec![one, x]).unwrap()]).unwrap();
    let result = proof.node(children[0]).sequent().succedent().get(0).unwrap().formula().clone();
    assert_eq!(result, expected);
    assert_eq!(proof.node_name(root), "commute");
    assert_eq!(proof.node_name(children[0]), "OPEN GOAL");
}

#[test]
fn same_update_level_rejects_positions_below_modalities() {
    let tb = TermBuilder;
    let (taclet, _, _) = commute(ApplicationRestriction::SAME_UPDATE_LEVEL);
    let p = Function::predicate("p", vec![int()]);
    let sum = tb.func(&plus(), vec![constant("x"), constant("1")]).unwrap();
    let body = tb.func(&p, vec![sum.clone()]).unwrap();
    let modal = tb.dia(ModalProgram::Concrete("x = x + 1;".into()), body).unwrap();
    let sequent = Sequent::from_terms(vec![], vec![modal]).unwrap();
    let sf = sequent.succedent().get(0).unwrap().clone();
    let pio = PosInOccurrence::new(sf, PosInTerm::top_level().down(0).down(0), false).unwrap();
    assert_eq!(pio.sub_term(), &sum);

    // the pattern matches, the position does not qualify
    let matched =
        TacletMatcher::new(&taclet).match_find(pio.sub_term(), &[], MatchConditions::default());
    assert!(matched.is_some());
    assert!(TacletApp::at(taclet, pio).is_none());
}

#[test]
fn ground_patterns_match_only_themselves() {
    let tb = TermBuilder;
    let (x, y) = (constant("x"), constant("y"));
    let pattern = tb.func(&plus(), vec![x.clone(), y.clone()]).unwrap();
    let taclet = TacletBuilder::new("ground")
        .find_rewrite(pattern.clone(), ApplicationRestriction::NONE)
        .build()
        .unwrap();
    let matcher = TacletMatcher::new(&taclet);
    assert!(matcher.match_find(&pattern, &[], MatchConditions::default()).is_some());
    let swapped = tb.func(&plus(), vec![y, x]).unwrap();
    assert!(matcher.match_find(&swapped, &[], MatchConditions::default()).is_none());
}

#[test]
fn bound_schema_variables_are_never_rebound() {
    let (taclet, a, _) = commute(ApplicationRestriction::NONE);
    let tb = TermBuilder;
    let (x, y, one) = (constant("x"), constant("y"), constant("1"));
    let app = TacletApp::new(taclet).add_checked_instantiation(&a, y, true).unwrap();
    let sum = tb.func(&plus(), vec![x, one]).unwrap();
    let equation = tb.equals(sum, constant("z")).unwrap();
    let sequent = Sequent::from_terms(vec![], vec![equation]).unwrap();
    let sf = sequent.succedent().get(0).unwrap().clone();
    let pio = PosInOccurrence::new(sf, PosInTerm::top_level().down(0), false).unwrap();
    // `a` is already y, the term at the position needs x
    assert!(app.set_pos_in_occurrence(pio).is_none());
}

#[test]
fn splits_keep_every_untouched_formula() {
    let tb = TermBuilder;
    let atom = |n: &str| tb.func(&Function::predicate(n, vec![]), vec![]).unwrap();
    let (a, b, c, d) = (atom("a"), atom("b"), atom("c"), atom("d"));
    let either = tb.or(a.clone(), b.clone()).unwrap();
    let sequent = Sequent::from_terms(vec![c.clone(), either], vec![d.clone()]).unwrap();
    let env = ProofEnvironment::with_default_rules().unwrap();
    let or_left = env.taclet_index().get("orLeft").unwrap().clone();
    let mut proof = Proof::new("split", env, sequent.clone());
    let pio = PosInOccurrence::top_level(sequent.antecedent().get(1).unwrap().clone(), true);
    let app = TacletApp::at(or_left.clone(), pio).unwrap();
    let root = proof.root();
    let children = executor::apply(&mut proof, root, RuleApp::Taclet(app)).unwrap();

    assert_eq!(children.len(), or_left.goal_templates().len());
    assert_eq!(proof.open_goals(), children);
    for (child, added) in children.iter().zip([&a, &b]) {
        let s = proof.node(*child).sequent();
        assert!(s.antecedent().iter().any(|f| f.formula() == &c));
        assert!(s.antecedent().iter().any(|f| f.formula() == added));
        assert!(s.succedent().iter().any(|f| f.formula() == &d));
        assert_eq!(s.antecedent().len(), 2);
    }
}
