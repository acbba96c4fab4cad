use std::sync::Arc;

use taclet::layout::{LayoutSettings, SymbolicLayoutExtractor};
use taclet::proof::{Proof, ProofEnvironment};
use taclet::sequent::Sequent;
use taclet::side_proof::SideProofStore;
use taclet::sort::Sort;
use taclet::term::{Function, ModalProgram, PosInOccurrence, ProgramVariable, Term, TermBuilder};

struct Fixture {
    proof: Proof,
    this: Term,
    this_next: Term,
}

fn fixture() -> Fixture {
    let tb = TermBuilder;
    let node = Sort::object("Node");
    let this = tb.pv(ProgramVariable::new("self", node));
    let next = Function::field("next", node, node);
    let post = Function::predicate("post", vec![node]);
    let this_next = tb.func(&next, vec![this.clone()]).unwrap();
    let modal = tb
        .dia(
            ModalProgram::Concrete("self.next.next = self;".into()),
            tb.func(&post, vec![this_next.clone()]).unwrap(),
        )
        .unwrap();
    let sequent = Sequent::from_terms(vec![], vec![modal]).unwrap();
    let proof = Proof::new("layouts", ProofEnvironment::with_default_rules().unwrap(), sequent);
    Fixture { proof, this, this_next }
}

fn extractor(proof: &Proof, settings: LayoutSettings) -> SymbolicLayoutExtractor<'_> {
    let root = proof.root();
    let modality = proof.node(root).sequent().succedent().get(0).unwrap().clone();
    SymbolicLayoutExtractor::new(proof, root, PosInOccurrence::top_level(modality, false), settings)
}

#[test]
fn aliasing_of_self_and_its_successor() {
    let _ = env_logger::builder().is_test(true).try_init();
    let f = fixture();
    let tb = TermBuilder;
    let store = SideProofStore::new();
    let settings = LayoutSettings {
        side_proof_store: Some(store.clone()),
        ..LayoutSettings::default()
    };
    let mut extractor = extractor(&f.proof, settings);
    extractor.analyse().unwrap();
    assert_eq!(
        extractor.objects().unwrap(),
        &[f.this.clone(), f.this_next.clone(), tb.null()]
    );
    // one layout per partition of three objects
    assert_eq!(extractor.layouts_count().unwrap(), 5);

    let aliased = (0..5)
        .filter(|&i| {
            let classes = extractor.equivalence_classes(i).unwrap();
            classes.len() == 1
                && classes[0].terms().len() == 2
                && classes[0].contains(&f.this)
                && classes[0].contains(&f.this_next)
        })
        .collect::<Vec<_>>();
    assert_eq!(aliased.len(), 1);
    let classes = extractor.equivalence_classes(aliased[0]).unwrap();
    assert!(classes[0].contains(&f.this));
    assert!(!classes[0].contains(&tb.null()));
    assert_eq!(classes[0].representative(), Some(&f.this));

    assert!(!store.is_empty());
    assert!(store.descriptions()[0].starts_with("Layouts of node"));
}

#[test]
fn classes_partition_the_objects() {
    let f = fixture();
    let tb = TermBuilder;
    let mut extractor = extractor(&f.proof, LayoutSettings::default());
    extractor.analyse().unwrap();
    for i in 0..extractor.layouts_count().unwrap() {
        let literals = extractor.layout_literals(i).unwrap().clone();
        let classes = extractor.equivalence_classes(i).unwrap();
        for (n, class) in classes.iter().enumerate() {
            assert!(class.terms().len() >= 2);
            for other in &classes[n + 1..] {
                assert!(class.terms().iter().all(|t| !other.contains(t)));
            }
            for (k, s) in class.terms().iter().enumerate() {
                for t in &class.terms()[k + 1..] {
                    let forward = tb.equals(s.clone(), t.clone()).unwrap();
                    let backward = tb.equals(t.clone(), s.clone()).unwrap();
                    assert!(literals.contains(&forward) || literals.contains(&backward));
                }
            }
        }
    }
}

#[test]
fn layouts_are_cached() {
    let f = fixture();
    let mut extractor = extractor(&f.proof, LayoutSettings::default());
    assert!(extractor.layouts_count().is_err());
    extractor.analyse().unwrap();
    extractor.analyse().unwrap();
    assert!(extractor.is_analysed());
    let first = extractor.current_layout(0).unwrap();
    let again = extractor.current_layout(0).unwrap();
    assert!(Arc::ptr_eq(&first, &again));
    let initial = extractor.initial_layout(0).unwrap();
    assert!(Arc::ptr_eq(&initial, &extractor.initial_layout(0).unwrap()));
    assert!(initial.state.name.ends_with(&first.state.name));
    assert!(extractor.current_layout(17).is_err());
}
