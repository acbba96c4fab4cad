//! Side proofs: auxiliary proofs started from a node of a main proof to
//! compute facts about it.
//!
//! A [`SideProof`] is a scoped resource. When it is dropped, the proof is
//! either handed to a [`SideProofStore`] for later inspection or disposed.

use std::sync::{Arc, Mutex};

use crate::proof::{NodeId, Proof, ProofEnvironment};
use crate::sequent::{Sequent, SequentFormula};
use crate::strategy::{ApplyStrategy, ApplyStrategyInfo};
use crate::term::{Operator, Term};
use crate::Result;

/// A side proof kept after its computation finished.
#[derive(Debug)]
pub struct StoredSideProof {
    pub description: String,
    pub proof: Proof,
}

/// Keeps finished side proofs instead of disposing them.
#[derive(Debug, Default)]
pub struct SideProofStore {
    entries: Mutex<Vec<StoredSideProof>>,
}

impl SideProofStore {
    pub fn new() -> Arc<SideProofStore> {
        Arc::new(SideProofStore::default())
    }

    pub fn add(&self, description: String, proof: Proof) {
        self.lock().push(StoredSideProof { description, proof });
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn descriptions(&self) -> Vec<String> {
        self.lock().iter().map(|e| e.description.clone()).collect()
    }

    /// Removes and returns all stored proofs.
    pub fn take(&self) -> Vec<StoredSideProof> {
        std::mem::take(&mut *self.lock())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<StoredSideProof>> {
        // a panic while pushing cannot leave the vector inconsistent
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[derive(Debug)]
pub struct SideProof {
    description: String,
    proof: Option<Proof>,
    store: Option<Arc<SideProofStore>>,
}

impl SideProof {
    /// Starts a side proof of `sequent` in a copy of `env` with its own
    /// simplifier.
    pub fn start(env: &ProofEnvironment, description: &str, sequent: Sequent) -> SideProof {
        log::debug!("starting side proof {description}: {sequent}");
        let proof = Proof::new(description, env.clone_with_own_simplifier(), sequent);
        SideProof {
            description: description.to_owned(),
            proof: Some(proof),
            store: None,
        }
    }

    /// Keeps the proof in `store` when this side proof is dropped.
    pub fn store_in(mut self, store: Option<Arc<SideProofStore>>) -> Self {
        self.store = store;
        self
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn proof(&self) -> &Proof {
        self.proof.as_ref().unwrap_or_else(|| unreachable!("taken on drop only"))
    }

    pub fn proof_mut(&mut self) -> &mut Proof {
        self.proof.as_mut().unwrap_or_else(|| unreachable!("taken on drop only"))
    }

    /// Runs `strategy` on all goals of the side proof.
    pub fn run(&mut self, strategy: &mut ApplyStrategy) -> Result<ApplyStrategyInfo> {
        let proof = self.proof_mut();
        let root = proof.root();
        strategy.start(proof, &[root])
    }
}

impl Drop for SideProof {
    fn drop(&mut self) {
        let Some(mut proof) = self.proof.take() else {
            return;
        };
        match &self.store {
            Some(store) => {
                log::debug!("storing side proof {}", self.description);
                store.add(std::mem::take(&mut self.description), proof);
            }
            None => proof.dispose(),
        }
    }
}

/// Runs `f` on a side proof of `sequent` and disposes or stores the proof
/// afterwards, whether `f` succeeds or not.
pub fn with_side_proof<T>(
    env: &ProofEnvironment,
    description: &str,
    sequent: Sequent,
    store: Option<Arc<SideProofStore>>,
    f: impl FnOnce(&mut SideProof) -> Result<T>,
) -> Result<T> {
    let mut side = SideProof::start(env, description, sequent).store_in(store);
    f(&mut side)
}

/// The formulas of `sequent` a side proof may rely on: all except `current`
/// and except those containing a modality.
pub fn compute_general_sequent_to_prove(
    sequent: &Sequent,
    current: Option<&SequentFormula>,
) -> Sequent {
    sequent
        .formulas()
        .filter(|(f, _)| Some(*f) != current && !f.formula().contains_modality())
        .fold(Sequent::default(), |acc, (f, in_antec)| {
            acc.add_formula(f.clone(), in_antec)
        })
}

/// The first formula of `node` whose operator below its updates is `op`,
/// taken below the updates.
pub fn extract_operator_term(proof: &Proof, node: NodeId, op: &Operator) -> Option<Term> {
    let tb = proof.env().tb();
    proof
        .node(node)
        .sequent()
        .formulas()
        .map(|(f, _)| tb.go_below_updates(f.formula()))
        .find(|t| t.op() == op)
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::term::{Function, ModalProgram, TermBuilder};

    fn atom(name: &str) -> Term {
        TermBuilder
            .func(&Function::predicate(name, vec![]), vec![])
            .unwrap()
    }

    #[test]
    fn side_proofs_are_stored_or_disposed() {
        let env = ProofEnvironment::with_default_rules().unwrap();
        let p = atom("p");
        let sequent = Sequent::from_terms(vec![p.clone()], vec![p]).unwrap();
        let store = SideProofStore::new();
        let closed = with_side_proof(&env, "kept", sequent.clone(), Some(store.clone()), |side| {
            side.run(&mut ApplyStrategy::default())?;
            Ok(side.proof().is_closed())
        })
        .unwrap();
        assert!(closed);
        assert_eq!(store.descriptions(), vec!["kept".to_owned()]);
        let stored = store.take();
        assert!(stored[0].proof.is_closed());
        assert!(!stored[0].proof.is_disposed());
        assert!(store.is_empty());

        with_side_proof(&env, "dropped", sequent, None, |_| Ok(())).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn general_sequent_drops_modalities() {
        let tb = TermBuilder;
        let (p, q) = (atom("p"), atom("q"));
        let modal = tb.dia(ModalProgram::Concrete("x = 1;".into()), q.clone()).unwrap();
        let sequent =
            Sequent::from_terms(vec![p.clone()], vec![q.clone(), modal]).unwrap();
        let current = sequent.succedent().get(0).unwrap().clone();
        let general = compute_general_sequent_to_prove(&sequent, Some(&current));
        assert_eq!(general.to_string(), "p ==> ");

        let env = ProofEnvironment::with_default_rules().unwrap();
        let proof = Proof::new("ops", env, sequent);
        let root = proof.root();
        assert_eq!(
            extract_operator_term(&proof, root, q.op()),
            Some(q.clone())
        );
        assert_eq!(extract_operator_term(&proof, root, &Operator::Equals), None);
    }
}
