//! Taclets: schematic rules with a find pattern, assumes formulas and goal
//! templates.

mod restriction;
mod var_cond;

pub use restriction::*;
pub use var_cond::*;

use std::fmt::{self, Display};
use std::sync::Arc;

use crate::schema::{SchemaVariable, TacletPrefix};
use crate::sequent::Sequent;
use crate::term::{ModalProgram, Operator, QuantifiableVariable, Term};
use crate::util::{IndexMap, IndexSet, ListDisplay};
use crate::{Error, Result, Symbol};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TacletKind {
    NoFind,
    /// Finds a top-level formula of the antecedent.
    Antec,
    /// Finds a top-level formula of the succedent.
    Succ,
    /// Finds a subterm anywhere in the sequent and rewrites it in place.
    Rewrite(ApplicationRestriction),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Replacement {
    /// Replaces the find term of a rewrite taclet.
    Term(Term),
    /// Replaces the find formula of an antecedent or succedent taclet.
    Sequent(Sequent),
}

/// One branch produced by a taclet.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TacletGoalTemplate {
    pub name: Option<String>,
    pub replace_with: Option<Replacement>,
    pub add: Sequent,
}

impl TacletGoalTemplate {
    pub fn named(mut self, name: &str) -> Self {
        self.name = Some(name.to_owned());
        self
    }

    pub fn replace_term(mut self, term: Term) -> Self {
        self.replace_with = Some(Replacement::Term(term));
        self
    }

    pub fn replace_sequent(mut self, sequent: Sequent) -> Self {
        self.replace_with = Some(Replacement::Sequent(sequent));
        self
    }

    pub fn add(mut self, sequent: Sequent) -> Self {
        self.add = sequent;
        self
    }

    pub fn replace_with_term(&self) -> Option<&Term> {
        match &self.replace_with {
            Some(Replacement::Term(t)) => Some(t),
            _ => None,
        }
    }

    pub fn replace_with_sequent(&self) -> Option<&Sequent> {
        match &self.replace_with {
            Some(Replacement::Sequent(s)) => Some(s),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub struct Taclet {
    name: Symbol,
    kind: TacletKind,
    find: Option<Term>,
    assumes: Sequent,
    templates: Vec<TacletGoalTemplate>,
    var_conds: Vec<VariableCondition>,
    prefixes: IndexMap<SchemaVariable, TacletPrefix>,
    rule_sets: Vec<Symbol>,
    schema_vars: IndexSet<SchemaVariable>,
}

impl Taclet {
    pub fn name(&self) -> Symbol {
        self.name
    }

    pub fn kind(&self) -> TacletKind {
        self.kind
    }

    pub fn find(&self) -> Option<&Term> {
        self.find.as_ref()
    }

    pub fn assumes(&self) -> &Sequent {
        &self.assumes
    }

    pub fn goal_templates(&self) -> &[TacletGoalTemplate] {
        &self.templates
    }

    pub fn var_conds(&self) -> &[VariableCondition] {
        &self.var_conds
    }

    pub fn prefix(&self, sv: &SchemaVariable) -> Option<&TacletPrefix> {
        self.prefixes.get(sv)
    }

    pub fn rule_sets(&self) -> &[Symbol] {
        &self.rule_sets
    }

    pub fn in_rule_set(&self, name: &str) -> bool {
        self.rule_sets.iter().any(|r| r.as_str() == name)
    }

    /// All schema variables of the taclet, in order of first occurrence.
    pub fn schema_vars(&self) -> &IndexSet<SchemaVariable> {
        &self.schema_vars
    }

    /// Closing taclets have no goal templates.
    pub fn is_closing(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn is_rewrite(&self) -> bool {
        matches!(self.kind, TacletKind::Rewrite(_))
    }

    pub fn restriction(&self) -> ApplicationRestriction {
        match self.kind {
            TacletKind::Rewrite(r) => r,
            _ => ApplicationRestriction::NONE,
        }
    }
}

impl Display for Taclet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} {{", self.name)?;
        if !self.assumes.is_empty() {
            writeln!(f, "  \\assumes({})", self.assumes)?;
        }
        if let Some(find) = &self.find {
            let side = match self.kind {
                TacletKind::Antec => " ==>",
                TacletKind::Succ => "==> ",
                _ => "",
            };
            match self.kind {
                TacletKind::Antec => writeln!(f, "  \\find({find}{side})")?,
                _ => writeln!(f, "  \\find({side}{find})")?,
            }
        }
        if !self.var_conds.is_empty() {
            writeln!(f, "  \\varcond({})", ListDisplay(&self.var_conds, ", "))?;
        }
        for template in &self.templates {
            if let Some(name) = &template.name {
                write!(f, "  \"{name}\":")?;
            }
            match &template.replace_with {
                Some(Replacement::Term(t)) => write!(f, "  \\replacewith({t})")?,
                Some(Replacement::Sequent(s)) => write!(f, "  \\replacewith({s})")?,
                None => {}
            }
            if !template.add.is_empty() {
                write!(f, "  \\add({})", template.add)?;
            }
            writeln!(f, ";")?;
        }
        if self.templates.is_empty() {
            writeln!(f, "  \\closegoal")?;
        }
        write!(f, "}}")
    }
}

pub struct TacletBuilder {
    name: Symbol,
    kind: TacletKind,
    find: Option<Term>,
    assumes: Sequent,
    templates: Vec<TacletGoalTemplate>,
    var_conds: Vec<VariableCondition>,
    rule_sets: Vec<Symbol>,
}

impl TacletBuilder {
    pub fn new(name: &str) -> TacletBuilder {
        TacletBuilder {
            name: Symbol::from(name),
            kind: TacletKind::NoFind,
            find: None,
            assumes: Sequent::default(),
            templates: vec![],
            var_conds: vec![],
            rule_sets: vec![],
        }
    }

    pub fn find_antec(mut self, find: Term) -> Self {
        self.kind = TacletKind::Antec;
        self.find = Some(find);
        self
    }

    pub fn find_succ(mut self, find: Term) -> Self {
        self.kind = TacletKind::Succ;
        self.find = Some(find);
        self
    }

    pub fn find_rewrite(mut self, find: Term, restriction: ApplicationRestriction) -> Self {
        self.kind = TacletKind::Rewrite(restriction);
        self.find = Some(find);
        self
    }

    pub fn assumes(mut self, assumes: Sequent) -> Self {
        self.assumes = assumes;
        self
    }

    pub fn goal(mut self, template: TacletGoalTemplate) -> Self {
        self.templates.push(template);
        self
    }

    pub fn var_cond(mut self, cond: VariableCondition) -> Self {
        self.var_conds.push(cond);
        self
    }

    pub fn rule_set(mut self, name: &str) -> Self {
        self.rule_sets.push(Symbol::from(name));
        self
    }

    fn invalid(&self, msg: impl Into<String>) -> Error {
        Error::InvalidTaclet {
            taclet: self.name,
            msg: msg.into(),
        }
    }

    pub fn build(self) -> Result<Arc<Taclet>> {
        match (&self.kind, &self.find) {
            (TacletKind::Antec | TacletKind::Succ, Some(find)) if !find.is_formula() => {
                return Err(
                    self.invalid("find of an antecedent or succedent taclet must be a formula")
                );
            }
            _ => {}
        }
        for template in &self.templates {
            match (&self.kind, &template.replace_with) {
                (_, None) => {}
                (TacletKind::Rewrite(_), Some(Replacement::Term(t))) => {
                    let find_sort = self.find.as_ref().map(Term::sort);
                    if let Some(find_sort) = find_sort {
                        if find_sort.is_formula() != t.is_formula() {
                            return Err(self.invalid(format!(
                                "replacewith {t} does not fit the find sort {find_sort}"
                            )));
                        }
                    }
                }
                (TacletKind::Antec | TacletKind::Succ, Some(Replacement::Sequent(_))) => {}
                (_, Some(_)) => {
                    return Err(self.invalid("replacewith does not fit the kind of the taclet"));
                }
            }
        }

        let mut collector = PrefixCollector {
            prefixes: IndexMap::default(),
            schema_vars: IndexSet::default(),
            not_free: vec![],
            error: None,
        };
        for cond in &self.var_conds {
            match cond {
                VariableCondition::NotFreeIn { var, term } => {
                    collector.note(var);
                    collector.note(term);
                    collector.not_free.push((var.clone(), term.clone()));
                }
                VariableCondition::DifferentInstantiation(a, b) => {
                    collector.note(a);
                    collector.note(b);
                }
            }
        }
        let rewrite = matches!(self.kind, TacletKind::Rewrite(_));
        if let Some(find) = &self.find {
            collector.collect(find, &mut vec![], rewrite);
        }
        for (formula, _) in self.assumes.formulas() {
            collector.collect(formula.formula(), &mut vec![], false);
        }
        for template in &self.templates {
            if let Some(t) = template.replace_with_term() {
                collector.collect(t, &mut vec![], rewrite);
            }
            let replace_formulas = template.replace_with_sequent().into_iter();
            for (formula, _) in replace_formulas
                .flat_map(Sequent::formulas)
                .chain(template.add.formulas())
            {
                collector.collect(formula.formula(), &mut vec![], false);
            }
        }
        if let Some(msg) = collector.error {
            return Err(self.invalid(msg));
        }

        Ok(Arc::new(Taclet {
            name: self.name,
            kind: self.kind,
            find: self.find,
            assumes: self.assumes,
            templates: self.templates,
            var_conds: self.var_conds,
            prefixes: collector.prefixes,
            rule_sets: self.rule_sets,
            schema_vars: collector.schema_vars,
        }))
    }
}

/// Computes the binding context of each schema variable occurrence.
struct PrefixCollector {
    prefixes: IndexMap<SchemaVariable, TacletPrefix>,
    schema_vars: IndexSet<SchemaVariable>,
    /// `(var, term)`: `var` is declared not free in `term`.
    not_free: Vec<(SchemaVariable, SchemaVariable)>,
    error: Option<String>,
}

impl PrefixCollector {
    fn note(&mut self, sv: &SchemaVariable) {
        self.schema_vars.insert(sv.clone());
    }

    fn collect(&mut self, term: &Term, bound: &mut Vec<SchemaVariable>, context: bool) {
        match term.op() {
            Operator::SchemaVariable(sv) => {
                self.note(sv);
                if !sv.is_variable() {
                    self.record(sv, bound, context);
                }
            }
            Operator::Modality(_, ModalProgram::Schema(sv)) => self.note(sv),
            _ => {}
        }
        for var in term.bound_vars() {
            if let QuantifiableVariable::Schema(sv) = var {
                self.note(sv);
            }
        }
        for (i, sub) in term.subs().iter().enumerate() {
            let depth = bound.len();
            if term.op().binds_in(i) {
                for var in term.bound_vars() {
                    if let QuantifiableVariable::Schema(sv) = var {
                        bound.push(sv.clone());
                    }
                }
            }
            self.collect(sub, bound, context);
            bound.truncate(depth);
        }
    }

    fn record(&mut self, sv: &SchemaVariable, bound: &[SchemaVariable], context: bool) {
        let mut prefix: Vec<SchemaVariable> = vec![];
        for var in bound {
            let not_free = self.not_free.iter().any(|(v, t)| v == var && t == sv);
            if !not_free && !prefix.contains(var) {
                prefix.push(var.clone());
            }
        }
        match self.prefixes.get(sv) {
            Some(existing) => {
                let same = existing.prefix().len() == prefix.len()
                    && prefix.iter().all(|v| existing.prefix().contains(v));
                if !same && self.error.is_none() {
                    self.error = Some(format!(
                        "schema variable {sv} occurs with different prefixes"
                    ));
                }
                // an occurrence outside the rewrite context forbids free
                // variables bound above the find position
                if !context && existing.context() {
                    let updated = TacletPrefix::new(existing.prefix().to_vec(), false);
                    self.prefixes.insert(sv.clone(), updated);
                }
            }
            None => {
                self.prefixes
                    .insert(sv.clone(), TacletPrefix::new(prefix, context));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sort::Sort;
    use crate::term::{Function, TermBuilder};

    #[test]
    fn prefixes_follow_binders() {
        let tb = TermBuilder;
        let s = Sort::object("Node");
        let x = SchemaVariable::variable("x", s);
        let phi = SchemaVariable::formula("phi");
        let t = SchemaVariable::term("t", s);
        let p = Function::predicate("p", vec![s]);

        let all = tb
            .quantify(
                crate::term::Quantifier::All,
                QuantifiableVariable::Schema(x.clone()),
                tb.sv(&phi),
            )
            .unwrap();
        let taclet = TacletBuilder::new("test")
            .find_succ(all)
            .goal(TacletGoalTemplate::default().replace_sequent(
                Sequent::from_terms(vec![], vec![tb.func(&p, vec![tb.sv(&t)]).unwrap()]).unwrap(),
            ))
            .build()
            .unwrap();
        assert_eq!(taclet.prefix(&phi).unwrap().prefix(), &[x.clone()]);
        assert!(taclet.prefix(&t).unwrap().prefix().is_empty());
        assert!(!taclet.prefix(&phi).unwrap().context());
        assert_eq!(taclet.schema_vars().len(), 3);
    }

    #[test]
    fn not_free_variables_leave_the_prefix() {
        let tb = TermBuilder;
        let x = SchemaVariable::variable("x", Sort::generic("G"));
        let phi = SchemaVariable::formula("phi");
        let all = tb
            .quantify(
                crate::term::Quantifier::All,
                QuantifiableVariable::Schema(x.clone()),
                tb.sv(&phi),
            )
            .unwrap();
        let unused = |with_cond: bool| {
            let mut builder = TacletBuilder::new("unused")
                .find_rewrite(all.clone(), ApplicationRestriction::NONE)
                .goal(TacletGoalTemplate::default().replace_term(tb.sv(&phi)));
            if with_cond {
                builder = builder.var_cond(VariableCondition::NotFreeIn {
                    var: x.clone(),
                    term: phi.clone(),
                });
            }
            builder.build()
        };

        let taclet = unused(true).unwrap();
        assert!(taclet.prefix(&phi).unwrap().prefix().is_empty());
        assert!(taclet.schema_vars().contains(&x));
        // without the condition phi occurs below x and outside of it
        assert!(matches!(unused(false), Err(Error::InvalidTaclet { .. })));
    }

    #[test]
    fn replacewith_must_fit_kind() {
        let tb = TermBuilder;
        let phi = SchemaVariable::formula("phi");
        let result = TacletBuilder::new("bad")
            .find_succ(tb.sv(&phi))
            .goal(TacletGoalTemplate::default().replace_term(tb.tt()))
            .build();
        assert!(matches!(result, Err(Error::InvalidTaclet { .. })));
    }
}
