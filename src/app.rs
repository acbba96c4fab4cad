//! Taclet applications.
//!
//! A [`TacletApp`] collects everything needed to apply a taclet: the
//! position of the find term, the schema variable instantiations and the
//! formulas matched by the assumes sequent. Like instantiations, apps are
//! persistent and every operation returns a new app.

use std::fmt::{self, Display};
use std::sync::Arc;

use crate::inst::{Instantiation, MatchConditions, SVInstantiations};
use crate::matching::{bound_vars_above, TacletMatcher};
use crate::schema::{SchemaVariable, SvKind};
use crate::sequent::{Sequent, SequentFormula};
use crate::taclet::{check_prefix, Taclet, TacletKind};
use crate::term::{
    Function, LogicVariable, Operator, PosInOccurrence, QuantifiableVariable, Term, TermBuilder,
};
use crate::util::{FreshGen, ListDisplay, SymbolGen};
use crate::{Error, Result};

/// A sequent formula matched by an assumes formula.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct AssumesFormulaInstantiation {
    pub formula: SequentFormula,
    pub in_antec: bool,
}

#[derive(Clone, Debug)]
pub struct TacletApp {
    taclet: Arc<Taclet>,
    instantiations: SVInstantiations,
    pio: Option<PosInOccurrence>,
    assumes: Option<im::Vector<AssumesFormulaInstantiation>>,
}

impl TacletApp {
    /// An app without position and instantiations.
    pub fn new(taclet: Arc<Taclet>) -> TacletApp {
        TacletApp {
            taclet,
            instantiations: SVInstantiations::default(),
            pio: None,
            assumes: None,
        }
    }

    /// Matches the taclet at `pio`, if it applies there.
    pub fn at(taclet: Arc<Taclet>, pio: PosInOccurrence) -> Option<TacletApp> {
        TacletApp::new(taclet).set_pos_in_occurrence(pio)
    }

    pub fn taclet(&self) -> &Arc<Taclet> {
        &self.taclet
    }

    pub fn instantiations(&self) -> &SVInstantiations {
        &self.instantiations
    }

    pub fn pos_in_occurrence(&self) -> Option<&PosInOccurrence> {
        self.pio.as_ref()
    }

    pub fn assumes_instantiations(&self) -> Option<&im::Vector<AssumesFormulaInstantiation>> {
        self.assumes.as_ref()
    }

    fn matcher(&self) -> TacletMatcher<'_> {
        TacletMatcher::new(&self.taclet)
    }

    fn bound_above(&self) -> Vec<LogicVariable> {
        match (&self.pio, self.taclet.kind()) {
            (Some(pio), TacletKind::Rewrite(_)) => bound_vars_above(pio),
            _ => vec![],
        }
    }

    /// Matches the find pattern at `pio`, starting from the current
    /// instantiations. `None` if the taclet does not apply there.
    pub fn set_pos_in_occurrence(&self, pio: PosInOccurrence) -> Option<TacletApp> {
        match self.taclet.kind() {
            TacletKind::NoFind => return None,
            TacletKind::Antec | TacletKind::Succ => {
                let antec = self.taclet.kind() == TacletKind::Antec;
                if !pio.is_top_level() || pio.is_in_antec() != antec {
                    return None;
                }
            }
            TacletKind::Rewrite(_) => {}
        }
        let bound_above = match self.taclet.kind() {
            TacletKind::Rewrite(_) => bound_vars_above(&pio),
            _ => vec![],
        };
        let start = MatchConditions::new(
            self.instantiations.clear_update_context(),
            Default::default(),
        );
        let mut mc = self
            .matcher()
            .match_find(pio.sub_term(), &bound_above, start)?;
        if let TacletKind::Rewrite(restriction) = self.taclet.kind() {
            mc = check_prefix(restriction, &pio, mc)?;
        }
        Some(TacletApp {
            taclet: self.taclet.clone(),
            instantiations: mc.into_instantiations(),
            pio: Some(pio),
            assumes: None,
        })
    }

    pub fn set_match_conditions(&self, mc: MatchConditions) -> TacletApp {
        self.set_instantiations(mc.into_instantiations())
    }

    fn set_instantiations(&self, instantiations: SVInstantiations) -> TacletApp {
        TacletApp {
            instantiations,
            ..self.clone()
        }
    }

    /// Adds an instantiation without checking it beyond consistency with
    /// existing ones.
    pub fn add_instantiation(
        &self,
        sv: &SchemaVariable,
        term: Term,
        interesting: bool,
    ) -> Result<TacletApp> {
        let insts = self
            .instantiations
            .add(sv.clone(), Instantiation::Term(term), interesting)?;
        Ok(self.set_instantiations(insts))
    }

    /// Adds an instantiation after checking kind, sort, the binding context
    /// and the variable conditions of the taclet.
    pub fn add_checked_instantiation(
        &self,
        sv: &SchemaVariable,
        term: Term,
        interesting: bool,
    ) -> Result<TacletApp> {
        if sv.is_variable() && !matches!(term.op(), Operator::LogicVariable(_)) {
            return Err(Error::IllegalInstantiation {
                sv: sv.name(),
                msg: format!("{term} is not a logic variable"),
            });
        }
        if let Err(msg) = sv.accepts(&term) {
            return Err(Error::IllegalInstantiation { sv: sv.name(), msg });
        }
        let mc = MatchConditions::new(self.instantiations.clone(), Default::default());
        let bound_above = self.bound_above();
        let Some(mc) = self.matcher().match_sv(sv, &term, &bound_above, mc) else {
            return Err(Error::IllegalInstantiation {
                sv: sv.name(),
                msg: format!("{term} does not satisfy the variable conditions"),
            });
        };
        let insts = mc
            .into_instantiations()
            .replace(sv.clone(), Instantiation::Term(term), interesting);
        Ok(self.set_instantiations(insts))
    }

    pub fn add_program_instantiation(
        &self,
        sv: &SchemaVariable,
        program: &str,
    ) -> Result<TacletApp> {
        if !sv.is_program() {
            return Err(Error::IllegalInstantiation {
                sv: sv.name(),
                msg: "not a program schema variable".into(),
            });
        }
        let insts = self
            .instantiations
            .add(sv.clone(), Instantiation::Program(program.into()), true)?;
        Ok(self.set_instantiations(insts))
    }

    pub fn uninstantiated_vars(&self) -> Vec<SchemaVariable> {
        self.taclet
            .schema_vars()
            .iter()
            .filter(|sv| !self.instantiations.is_instantiated(sv))
            .cloned()
            .collect()
    }

    pub fn assumes_instantiations_complete(&self) -> bool {
        self.taclet.assumes().is_empty() || self.assumes.is_some()
    }

    /// Complete except for variables [`TacletApp::try_to_instantiate`] can
    /// fill in.
    pub fn is_sufficiently_complete(&self) -> bool {
        self.assumes_instantiations_complete()
            && (self.taclet.find().is_none() || self.pio.is_some())
            && self
                .uninstantiated_vars()
                .iter()
                .all(|sv| sv.is_skolem() || (sv.is_variable() && !self.is_find_variable(sv)))
    }

    fn is_find_variable(&self, sv: &SchemaVariable) -> bool {
        self.taclet.find().map_or(false, |find| {
            find.any(&mut |t: &Term| {
                t.op().as_schema_variable() == Some(sv)
                    || t.bound_vars().iter().any(|b| {
                        matches!(b, QuantifiableVariable::Schema(s) if s == sv)
                    })
            })
        })
    }

    pub fn complete(&self) -> bool {
        self.assumes_instantiations_complete()
            && (self.taclet.find().is_none() || self.pio.is_some())
            && self.uninstantiated_vars().is_empty()
    }

    /// Re-runs the prefix check from scratch and compares the collected
    /// update context with the stored one. Instantiations added after
    /// matching can invalidate an app, so this is checked before applying.
    pub fn is_executable(&self) -> bool {
        if self
            .matcher()
            .check_conditions(
                MatchConditions::new(self.instantiations.clone(), Default::default()),
                &self.bound_above(),
            )
            .is_none()
        {
            return false;
        }
        let (Some(pio), TacletKind::Rewrite(restriction)) = (&self.pio, self.taclet.kind()) else {
            return true;
        };
        let start = MatchConditions::new(
            self.instantiations.clear_update_context(),
            Default::default(),
        );
        match check_prefix(restriction, pio, start) {
            Some(mc) => {
                mc.instantiations().update_context() == self.instantiations.update_context()
            }
            None => false,
        }
    }

    pub fn check_applicability(&self) -> Result<()> {
        if !self.complete() {
            let mut missing: Vec<String> = self
                .uninstantiated_vars()
                .iter()
                .map(|sv| sv.name().to_string())
                .collect();
            if !self.assumes_instantiations_complete() {
                missing.push("assumes formulas".into());
            }
            if self.taclet.find().is_some() && self.pio.is_none() {
                missing.push("position".into());
            }
            return Err(Error::IncompleteApp {
                taclet: self.taclet.name(),
                missing: missing.join(", "),
            });
        }
        if !self.is_executable() {
            return Err(Error::NotExecutable {
                taclet: self.taclet.name(),
                pos: self
                    .pio
                    .as_ref()
                    .map_or_else(|| "no position".to_owned(), |p| p.to_string()),
            });
        }
        Ok(())
    }

    /// One app per combination of sequent formulas matching the assumes
    /// sequent. An app without assumes formulas is returned as is.
    pub fn find_assumes_instantiations(&self, sequent: &Sequent) -> Vec<TacletApp> {
        if self.taclet.assumes().is_empty() {
            return vec![TacletApp {
                assumes: Some(im::Vector::new()),
                ..self.clone()
            }];
        }
        let mc = MatchConditions::new(self.instantiations.clone(), Default::default());
        self.matcher()
            .match_assumes(sequent, mc)
            .into_iter()
            .map(|(assumes, mc)| TacletApp {
                taclet: self.taclet.clone(),
                instantiations: mc.into_instantiations(),
                pio: self.pio.clone(),
                assumes: Some(assumes),
            })
            .collect()
    }

    /// Instantiates skolem schema variables with fresh constants and
    /// variable schema variables that only occur in goal templates with
    /// fresh logic variables. `None` if other variables are missing.
    pub fn try_to_instantiate(&self, names: &mut SymbolGen) -> Option<TacletApp> {
        if !self.is_sufficiently_complete() {
            return None;
        }
        let tb = TermBuilder;
        let mut insts = self.instantiations.clone();
        for sv in self.uninstantiated_vars() {
            let value = match sv.kind() {
                SvKind::Skolem { sort } => {
                    let sort = insts.instantiate_sort(*sort);
                    let name: crate::Symbol = names.fresh(sv.name().as_str());
                    tb.func(&Function::skolem(name.as_str(), sort), vec![]).ok()?
                }
                SvKind::Variable { sort } => {
                    let sort = insts.instantiate_sort(*sort);
                    let name: crate::Symbol = names.fresh(sv.name().as_str());
                    tb.var(LogicVariable::new(name.as_str(), sort))
                }
                _ => return None,
            };
            insts = insts.replace(sv, Instantiation::Term(value), true);
        }
        Some(self.set_instantiations(insts))
    }

    pub fn rule_name(&self) -> crate::Symbol {
        self.taclet.name()
    }
}

impl Display for TacletApp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.taclet.name())?;
        if let Some(pio) = &self.pio {
            write!(f, " at {pio}")?;
        }
        if !self.instantiations.is_empty() {
            write!(f, " with {}", self.instantiations)?;
        }
        if let Some(assumes) = &self.assumes {
            if !assumes.is_empty() {
                let formulas = assumes.iter().map(|a| a.formula.to_string());
                write!(f, " assuming {}", ListDisplay(formulas.collect::<Vec<_>>(), ", "))?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sort::Sort;
    use crate::taclet::{ApplicationRestriction, TacletBuilder, TacletGoalTemplate};

    fn commute() -> (Arc<Taclet>, SchemaVariable, SchemaVariable) {
        let tb = TermBuilder;
        let int = Sort::data("int");
        let plus = Function::new("+", vec![int, int], int);
        let a = SchemaVariable::term("a", int);
        let b = SchemaVariable::term("b", int);
        let taclet = TacletBuilder::new("commute")
            .find_rewrite(
                tb.func(&plus, vec![tb.sv(&a), tb.sv(&b)]).unwrap(),
                ApplicationRestriction::NONE,
            )
            .goal(TacletGoalTemplate::default().replace_term(
                tb.func(&plus, vec![tb.sv(&b), tb.sv(&a)]).unwrap(),
            ))
            .build()
            .unwrap();
        (taclet, a, b)
    }

    #[test]
    fn incomplete_apps_are_rejected() {
        let (taclet, a, _) = commute();
        let app = TacletApp::new(taclet);
        assert!(matches!(
            app.check_applicability(),
            Err(Error::IncompleteApp { .. })
        ));
        let int = Sort::data("int");
        let x = TermBuilder
            .func(&Function::constant("x", int), vec![])
            .unwrap();
        let app = app.add_checked_instantiation(&a, x.clone(), true).unwrap();
        assert!(app.instantiations().is_interesting(&a));
        let y = TermBuilder
            .func(&Function::constant("y", int), vec![])
            .unwrap();
        assert!(matches!(
            app.add_checked_instantiation(&a, y, true),
            Err(Error::IllegalInstantiation { .. })
        ));
    }

    #[test]
    fn variable_schema_variables_need_variables() {
        let tb = TermBuilder;
        let node = Sort::object("Node");
        let x = SchemaVariable::variable("x", node);
        let phi = SchemaVariable::formula("phi");
        let taclet = TacletBuilder::new("allRight")
            .find_succ(
                tb.quantify(
                    crate::term::Quantifier::All,
                    crate::term::QuantifiableVariable::Schema(x.clone()),
                    tb.sv(&phi),
                )
                .unwrap(),
            )
            .build()
            .unwrap();
        let err = TacletApp::new(taclet)
            .add_checked_instantiation(&x, tb.null(), false)
            .unwrap_err();
        assert!(matches!(err, Error::IllegalInstantiation { .. }));
    }

    #[test]
    fn skolem_variables_are_filled_in() {
        let tb = TermBuilder;
        let node = Sort::object("Node");
        let sk = SchemaVariable::skolem("sk", node);
        let p = Function::predicate("p", vec![node]);
        let taclet = TacletBuilder::new("introduce")
            .goal(TacletGoalTemplate::default().add(
                Sequent::from_terms(vec![tb.func(&p, vec![tb.sv(&sk)]).unwrap()], vec![]).unwrap(),
            ))
            .build()
            .unwrap();
        let app = TacletApp::new(taclet);
        assert!(!app.complete());
        assert!(app.is_sufficiently_complete());
        let mut names = SymbolGen::default();
        let app = app.try_to_instantiate(&mut names).unwrap();
        assert!(app.complete());
        assert_eq!(app.instantiations().get_term(&sk).unwrap().to_string(), "sk_0");
    }
}
