//! Taclet lookup by the top operator of the find pattern, and collection of
//! the rule apps of a goal.
use std::sync::Arc;

use smallvec::SmallVec;

use crate::app::TacletApp;
use crate::proof::{ProofEnvironment, RuleApp};
use crate::rules::simplifier::SimplifierApp;
use crate::sequent::Sequent;
use crate::taclet::{Taclet, TacletKind};
use crate::term::{ModalityKind, Operator, PosInOccurrence, Term};
use crate::util::{HashMap, IndexMap};
use crate::Symbol;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
enum IndexKey {
    /// Functions are keyed by name so generic declarations find their
    /// instances.
    Function(Symbol),
    Modality(ModalityKind),
    Op(Operator),
}

impl IndexKey {
    /// `None` for schema variables, which match any term.
    fn of(term: &Term) -> Option<IndexKey> {
        match term.op() {
            Operator::SchemaVariable(_) => None,
            Operator::Function(f) => Some(IndexKey::Function(f.name())),
            Operator::Modality(kind, _) => Some(IndexKey::Modality(*kind)),
            op => Some(IndexKey::Op(op.clone())),
        }
    }
}

#[derive(Debug, Default)]
pub struct TacletIndex {
    taclets: IndexMap<Symbol, Arc<Taclet>>,
    by_key: HashMap<IndexKey, SmallVec<[Arc<Taclet>; 4]>>,
    wildcards: Vec<Arc<Taclet>>,
    no_find: Vec<Arc<Taclet>>,
}

impl TacletIndex {
    pub fn new(taclets: impl IntoIterator<Item = Arc<Taclet>>) -> TacletIndex {
        let mut index = TacletIndex::default();
        for taclet in taclets {
            index.add(taclet);
        }
        index
    }

    /// Adds a taclet, replacing one of the same name.
    pub fn add(&mut self, taclet: Arc<Taclet>) {
        if let Some(old) = self.taclets.insert(taclet.name(), taclet.clone()) {
            log::warn!("taclet {} is redefined", old.name());
            self.remove_from_buckets(&old);
        }
        match taclet.find() {
            None => self.no_find.push(taclet),
            Some(find) => match IndexKey::of(find) {
                Some(key) => self.by_key.entry(key).or_default().push(taclet),
                None => self.wildcards.push(taclet),
            },
        }
    }

    fn remove_from_buckets(&mut self, old: &Arc<Taclet>) {
        let keep = |t: &Arc<Taclet>| !Arc::ptr_eq(t, old);
        self.no_find.retain(keep);
        self.wildcards.retain(keep);
        for bucket in self.by_key.values_mut() {
            bucket.retain(|t| keep(t));
        }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Taclet>> {
        self.taclets.get(&Symbol::from(name))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Taclet>> + '_ {
        self.taclets.values()
    }

    pub fn len(&self) -> usize {
        self.taclets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.taclets.is_empty()
    }

    /// The taclets whose find pattern may match `term`: those with the same
    /// top operator, then those whose find is a schema variable.
    pub fn candidates<'a>(&'a self, term: &Term) -> impl Iterator<Item = &'a Arc<Taclet>> + 'a {
        let keyed = IndexKey::of(term)
            .and_then(|key| self.by_key.get(&key))
            .map(|bucket| bucket.as_slice())
            .unwrap_or(&[]);
        keyed.iter().chain(self.wildcards.iter())
    }

    pub fn no_find(&self) -> &[Arc<Taclet>] {
        &self.no_find
    }
}

/// Collects the rule apps of a sequent in a proof environment.
pub struct RuleAppIndex<'e> {
    env: &'e ProofEnvironment,
}

impl<'e> RuleAppIndex<'e> {
    pub fn new(env: &'e ProofEnvironment) -> Self {
        RuleAppIndex { env }
    }

    /// All rule apps at all positions of `sequent`, with their assumes
    /// formulas matched. Skolem and fresh variables are left open.
    pub fn collect(&self, sequent: &Sequent) -> Vec<RuleApp> {
        let mut apps = vec![];
        for (formula, in_antec) in sequent.formulas() {
            if self.env.simplifier().is_applicable(formula, in_antec) {
                let pio = PosInOccurrence::top_level(formula.clone(), in_antec);
                apps.push(RuleApp::Simplifier(SimplifierApp::pending(pio)));
            }
        }
        for (formula, in_antec) in sequent.formulas() {
            let mut stack = vec![PosInOccurrence::top_level(formula.clone(), in_antec)];
            while let Some(pio) = stack.pop() {
                for taclet in self.env.taclet_index().candidates(pio.sub_term()) {
                    if !pio.is_top_level() && !matches!(taclet.kind(), TacletKind::Rewrite(_)) {
                        continue;
                    }
                    if let Some(app) = TacletApp::at(taclet.clone(), pio.clone()) {
                        apps.extend(
                            app.find_assumes_instantiations(sequent)
                                .into_iter()
                                .map(RuleApp::Taclet),
                        );
                    }
                }
                let term = pio.sub_term();
                for i in (0..term.arity()).rev() {
                    stack.extend(pio.down(i));
                }
            }
        }
        for taclet in self.env.taclet_index().no_find() {
            apps.extend(
                TacletApp::new(taclet.clone())
                    .find_assumes_instantiations(sequent)
                    .into_iter()
                    .map(RuleApp::Taclet),
            );
        }
        apps
    }
}
