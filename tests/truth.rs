use taclet::executor::add_formula_labels;
use taclet::proof::{Proof, ProofEnvironment};
use taclet::sequent::Sequent;
use taclet::sort::Sort;
use taclet::strategy::ApplyStrategy;
use taclet::term::{FormulaTermLabel, Function, LabelId, LabelIdGenerator, Term, TermBuilder};
use taclet::truth::{TruthValue, TruthValueTracer};

fn prove(formula: Term) -> Proof {
    let mut ids = LabelIdGenerator::default();
    let labeled = add_formula_labels(&formula, &mut ids).unwrap();
    let sequent = Sequent::from_terms(vec![], vec![labeled]).unwrap();
    let mut proof = Proof::new("truth", ProofEnvironment::with_default_rules().unwrap(), sequent);
    let root = proof.root();
    ApplyStrategy::default().start(&mut proof, &[root]).unwrap();
    proof
}

#[test]
fn true_conjunct_with_unknown_sibling() {
    let _ = env_logger::builder().is_test(true).try_init();
    let tb = TermBuilder;
    let o = tb.func(&Function::constant("o", Sort::object("Node")), vec![]).unwrap();
    let q = tb.func(&Function::predicate("q", vec![]), vec![]).unwrap();
    // o = o is 1.0, q is 2.0, the conjunction 3.0
    let proof = prove(tb.and(tb.equals(o.clone(), o).unwrap(), q).unwrap());
    assert_eq!(proof.open_goals().len(), 1);

    let result = TruthValueTracer::evaluate(&proof, proof.root(), FormulaTermLabel::NAME).unwrap();
    assert_eq!(result.branch_results.len(), 1);
    let branch = &result.branch_results[0];
    assert_eq!(branch.evaluate_id(LabelId::new(1, 0)), Some(TruthValue::True));
    assert_eq!(branch.evaluate_id(LabelId::new(3, 0)), Some(TruthValue::Unknown));
    assert_eq!(branch.condition, tb.tt());
    assert!(branch.to_string().starts_with("Goal 1\n1.0 = true"));
}

#[test]
fn closed_implication_is_true() {
    let tb = TermBuilder;
    let p = tb.func(&Function::predicate("p", vec![]), vec![]).unwrap();
    let proof = prove(tb.imp(p.clone(), p).unwrap());
    assert!(proof.is_closed());

    let result = TruthValueTracer::evaluate(&proof, proof.root(), FormulaTermLabel::NAME).unwrap();
    assert_eq!(result.branch_results.len(), 1);
    let branch = &result.branch_results[0];
    assert_eq!(branch.evaluate_id(LabelId::new(2, 0)), Some(TruthValue::True));
    assert_eq!(branch.evaluate_id(LabelId::new(3, 0)), Some(TruthValue::True));
}

#[test]
fn each_branch_of_a_split_is_traced() {
    let tb = TermBuilder;
    let atom = |n: &str| tb.func(&Function::predicate(n, vec![]), vec![]).unwrap();
    let proof = prove(tb.and(atom("a"), atom("b")).unwrap());
    assert_eq!(proof.open_goals().len(), 2);

    let result = TruthValueTracer::evaluate(&proof, proof.root(), FormulaTermLabel::NAME).unwrap();
    let conditions: Vec<_> = result
        .branch_results
        .iter()
        .map(|b| b.condition.to_string())
        .collect();
    assert_eq!(conditions, ["!a", "!b"]);
    for branch in &result.branch_results {
        assert_eq!(branch.evaluate_id(LabelId::new(3, 0)), Some(TruthValue::Unknown));
    }
}
