//! The term model.
//!
//! Terms are immutable and hash-consed: [`Term::make`] looks a term up in a
//! global table before allocating, so two terms that are exactly equal
//! (labels included) share one allocation. Structural equality (`==`)
//! ignores labels.

mod builder;
mod label;
mod operator;
mod position;

pub use builder::*;
pub use label::*;
pub use operator::*;
pub use position::*;

use std::fmt::{self, Display};
use std::hash::{BuildHasher as _, Hash, Hasher};
use std::sync::{Arc, Mutex, Weak};

use lazy_static::lazy_static;
use smallvec::SmallVec;

use crate::sort::Sort;
use crate::util::{BuildHasher, HashMap, ListDisplay};

pub type Subterms = SmallVec<[Term; 2]>;
pub type BoundVars = SmallVec<[QuantifiableVariable; 1]>;
pub type Labels = SmallVec<[TermLabel; 1]>;

pub struct TermData {
    op: Operator,
    subs: Subterms,
    bound_vars: BoundVars,
    labels: Labels,
    sort: Sort,
    hash: u64,
    free_vars: SmallVec<[LogicVariable; 2]>,
    rigid: bool,
    has_modality: bool,
    size: usize,
}

#[derive(Clone)]
pub struct Term(Arc<TermData>);

/// The notions of equality used by rules.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TermEquality {
    /// Equal including all labels.
    Exact,
    /// Equal including proof-relevant labels.
    IrrelevantTermLabels,
    /// Equal up to consistent renaming of bound variables, labels ignored.
    Renaming,
}

#[derive(PartialEq, Eq, Hash)]
struct TermKey {
    op: Operator,
    subs: SmallVec<[usize; 2]>,
    bound_vars: BoundVars,
    labels: Labels,
}

#[derive(Default)]
struct TermTable {
    terms: HashMap<TermKey, Weak<TermData>>,
    inserts_since_cleanup: usize,
}

const CLEANUP_INTERVAL: usize = 1 << 16;

lazy_static! {
    static ref TERM_TABLE: Mutex<TermTable> = Mutex::new(TermTable::default());
}

impl Term {
    /// Creates or looks up a term. Performs no sort checks; use
    /// [`TermBuilder`] for that.
    pub(crate) fn make(
        op: Operator,
        subs: Subterms,
        bound_vars: BoundVars,
        mut labels: Labels,
    ) -> Term {
        labels.sort_by_cached_key(|l| l.sort_key());
        labels.dedup();
        let key = TermKey {
            op: op.clone(),
            subs: subs.iter().map(|s| Arc::as_ptr(&s.0) as usize).collect(),
            bound_vars: bound_vars.clone(),
            labels: labels.clone(),
        };
        // The table holds no terms alive, so a poisoned lock leaves it consistent.
        let mut table = TERM_TABLE.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = table.terms.get(&key).and_then(Weak::upgrade) {
            return Term(existing);
        }
        let term = Term(Arc::new(TermData::new(op, subs, bound_vars, labels)));
        table.terms.insert(key, Arc::downgrade(&term.0));
        table.inserts_since_cleanup += 1;
        if table.inserts_since_cleanup >= CLEANUP_INTERVAL {
            table.terms.retain(|_, weak| weak.strong_count() > 0);
            table.inserts_since_cleanup = 0;
        }
        term
    }

    pub fn op(&self) -> &Operator {
        &self.0.op
    }

    pub fn sub(&self, i: usize) -> &Term {
        &self.0.subs[i]
    }

    pub fn subs(&self) -> &[Term] {
        &self.0.subs
    }

    pub fn arity(&self) -> usize {
        self.0.subs.len()
    }

    pub fn bound_vars(&self) -> &[QuantifiableVariable] {
        &self.0.bound_vars
    }

    pub fn labels(&self) -> &[TermLabel] {
        &self.0.labels
    }

    pub fn sort(&self) -> Sort {
        self.0.sort
    }

    pub fn is_formula(&self) -> bool {
        self.0.sort.is_formula()
    }

    pub fn free_vars(&self) -> &[LogicVariable] {
        &self.0.free_vars
    }

    pub fn is_closed(&self) -> bool {
        self.0.free_vars.is_empty()
    }

    /// A rigid term has the same value in every program state.
    pub fn is_rigid(&self) -> bool {
        self.0.rigid
    }

    pub fn contains_modality(&self) -> bool {
        self.0.has_modality
    }

    /// Number of operator occurrences.
    pub fn size(&self) -> usize {
        self.0.size
    }

    pub fn ptr_eq(&self, other: &Term) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn has_labels(&self) -> bool {
        !self.0.labels.is_empty()
    }

    pub fn label(&self, name: &str) -> Option<&TermLabel> {
        self.0.labels.iter().find(|l| l.name().as_str() == name)
    }

    pub fn formula_label(&self) -> Option<&FormulaTermLabel> {
        self.0.labels.iter().find_map(TermLabel::as_formula)
    }

    pub fn with_labels(&self, labels: Labels) -> Term {
        Term::make(
            self.0.op.clone(),
            self.0.subs.clone(),
            self.0.bound_vars.clone(),
            labels,
        )
    }

    pub fn without_labels(&self) -> Term {
        if self.has_labels() {
            self.with_labels(Labels::new())
        } else {
            self.clone()
        }
    }

    /// Replaces the subterms, keeping operator, binders and labels.
    pub(crate) fn with_subs(&self, subs: Subterms) -> Term {
        Term::make(
            self.0.op.clone(),
            subs,
            self.0.bound_vars.clone(),
            self.0.labels.clone(),
        )
    }

    pub fn equals_mod(&self, other: &Term, mode: TermEquality) -> bool {
        match mode {
            // exactly equal terms are shared
            TermEquality::Exact => self.ptr_eq(other),
            TermEquality::IrrelevantTermLabels => eq_relevant_labels(self, other),
            TermEquality::Renaming => eq_renaming(self, other, &mut Vec::new()),
        }
    }

    pub fn exec_pre_order(&self, visitor: &mut impl Visitor) {
        visitor.visit(self);
        if visitor.visit_subtree(self) {
            visitor.subtree_entered(self);
            for sub in self.subs() {
                sub.exec_pre_order(visitor);
            }
            visitor.subtree_left(self);
        }
    }

    pub fn exec_post_order(&self, visitor: &mut impl Visitor) {
        if visitor.visit_subtree(self) {
            visitor.subtree_entered(self);
            for sub in self.subs() {
                sub.exec_post_order(visitor);
            }
            visitor.subtree_left(self);
        }
        visitor.visit(self);
    }

    /// Pre-order walk with a closure. The closure returns whether to descend
    /// into the visited term.
    pub fn walk(&self, f: &mut impl FnMut(&Term) -> bool) {
        if f(self) {
            for sub in self.subs() {
                sub.walk(f);
            }
        }
    }

    /// Whether `pred` holds for some subterm, the term itself included.
    pub fn any(&self, pred: &mut impl FnMut(&Term) -> bool) -> bool {
        pred(self) || self.subs().iter().any(|s| s.any(pred))
    }
}

impl TermData {
    fn new(op: Operator, subs: Subterms, bound_vars: BoundVars, labels: Labels) -> TermData {
        let sort = compute_sort(&op, &subs);

        let mut free_vars: SmallVec<[LogicVariable; 2]> = SmallVec::new();
        if let Operator::LogicVariable(v) = &op {
            free_vars.push(*v);
        }
        for (i, sub) in subs.iter().enumerate() {
            for v in sub.free_vars() {
                let bound = op.binds_in(i)
                    && bound_vars.iter().any(|b| b.as_logic() == Some(v));
                if !bound && !free_vars.contains(v) {
                    free_vars.push(*v);
                }
            }
        }

        let op_rigid = match &op {
            Operator::ProgramVariable(_) | Operator::Modality(..) => false,
            Operator::Function(f) => f.is_rigid(),
            _ => true,
        };
        let rigid = op_rigid && subs.iter().all(Term::is_rigid);
        let has_modality = op.is_modality() || subs.iter().any(Term::contains_modality);
        let size = 1 + subs.iter().map(Term::size).sum::<usize>();

        let mut hasher = BuildHasher::default().build_hasher();
        op.hash(&mut hasher);
        for sub in subs.iter() {
            hasher.write_u64(sub.0.hash);
        }
        bound_vars.hash(&mut hasher);
        let hash = hasher.finish();

        TermData {
            op,
            subs,
            bound_vars,
            labels,
            sort,
            hash,
            free_vars,
            rigid,
            has_modality,
            size,
        }
    }
}

fn compute_sort(op: &Operator, subs: &[Term]) -> Sort {
    match op {
        Operator::Junctor(_)
        | Operator::Equals
        | Operator::Equiv
        | Operator::Quantifier(_)
        | Operator::Modality(..) => Sort::Formula,
        Operator::IfThenElse => match (subs.get(1), subs.get(2)) {
            (Some(then), Some(els)) => then
                .sort()
                .common_super_sort(&els.sort())
                .unwrap_or(then.sort()),
            _ => Sort::Any,
        },
        Operator::Function(f) => f.sort(),
        Operator::LogicVariable(v) => v.sort,
        Operator::ProgramVariable(v) => v.sort,
        Operator::SchemaVariable(sv) => sv.sort(),
        Operator::ElementaryUpdate(_)
        | Operator::Store(_)
        | Operator::UpdateParallel
        | Operator::Skip => Sort::Update,
        Operator::UpdateApplication | Operator::Subst => {
            subs.get(1).map(Term::sort).unwrap_or(Sort::Any)
        }
    }
}

fn eq_relevant_labels(a: &Term, b: &Term) -> bool {
    if a.ptr_eq(b) {
        return true;
    }
    let relevant = |t: &Term| -> Vec<TermLabel> {
        t.labels()
            .iter()
            .filter(|l| l.is_proof_relevant())
            .cloned()
            .collect()
    };
    a.op() == b.op()
        && a.bound_vars() == b.bound_vars()
        && a.arity() == b.arity()
        && relevant(a) == relevant(b)
        && a
            .subs()
            .iter()
            .zip(b.subs())
            .all(|(x, y)| eq_relevant_labels(x, y))
}

fn eq_renaming(
    a: &Term,
    b: &Term,
    renaming: &mut Vec<(QuantifiableVariable, QuantifiableVariable)>,
) -> bool {
    if let (Operator::LogicVariable(x), Operator::LogicVariable(y)) = (a.op(), b.op()) {
        let (x, y) = (
            QuantifiableVariable::Logic(*x),
            QuantifiableVariable::Logic(*y),
        );
        // innermost binding wins
        return match renaming.iter().rev().find(|(l, r)| *l == x || *r == y) {
            Some((l, r)) => *l == x && *r == y,
            None => x == y,
        };
    }
    if renaming.is_empty() && a == b {
        return true;
    }
    if a.op() != b.op()
        || a.arity() != b.arity()
        || a.bound_vars().len() != b.bound_vars().len()
        || a.bound_vars()
            .iter()
            .zip(b.bound_vars())
            .any(|(x, y)| x.sort() != y.sort())
    {
        return false;
    }
    for (i, (x, y)) in a.subs().iter().zip(b.subs()).enumerate() {
        let binds = a.op().binds_in(i);
        let depth = renaming.len();
        if binds {
            renaming.extend(
                a.bound_vars()
                    .iter()
                    .cloned()
                    .zip(b.bound_vars().iter().cloned()),
            );
        }
        let equal = eq_renaming(x, y, renaming);
        renaming.truncate(depth);
        if !equal {
            return false;
        }
    }
    true
}

impl PartialEq for Term {
    fn eq(&self, other: &Term) -> bool {
        self.ptr_eq(other)
            || (self.0.hash == other.0.hash
                && self.0.op == other.0.op
                && self.0.bound_vars == other.0.bound_vars
                && self.0.subs == other.0.subs)
    }
}

impl Eq for Term {}

impl Hash for Term {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.0.hash);
    }
}

/// Visits terms during [`Term::exec_pre_order`] and [`Term::exec_post_order`].
pub trait Visitor {
    /// Whether to descend into the subterms of `term`.
    fn visit_subtree(&mut self, _term: &Term) -> bool {
        true
    }

    fn visit(&mut self, term: &Term);

    fn subtree_entered(&mut self, _term: &Term) {}

    fn subtree_left(&mut self, _term: &Term) {}
}

fn needs_parens(t: &Term) -> bool {
    match t.op() {
        Operator::Junctor(j) => j.arity() == 2,
        Operator::Function(f) => f.is_infix(),
        Operator::Equals
        | Operator::Equiv
        | Operator::IfThenElse
        | Operator::Quantifier(_)
        | Operator::ElementaryUpdate(_)
        | Operator::Store(_)
        | Operator::UpdateParallel
        | Operator::UpdateApplication
        | Operator::Modality(..)
        | Operator::Subst => true,
        _ => false,
    }
}

fn fmt_operand(t: &Term, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if needs_parens(t) {
        write!(f, "({t})")
    } else {
        write!(f, "{t}")
    }
}

fn fmt_infix(l: &Term, op: &str, r: &Term, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    fmt_operand(l, f)?;
    write!(f, " {op} ")?;
    fmt_operand(r, f)
}

fn fmt_location(fun: &Function, args: &[Term], f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match (fun.kind(), args) {
        (FunctionKind::Field, [obj]) => {
            fmt_operand(obj, f)?;
            write!(f, ".{}", fun.name())
        }
        (FunctionKind::ArrayElement, [array, index]) => {
            fmt_operand(array, f)?;
            write!(f, "[{index}]")
        }
        (_, [l, r]) if fun.is_infix() => fmt_infix(l, fun.name().as_str(), r, f),
        (_, []) => write!(f, "{}", fun.name()),
        _ => write!(f, "{}({})", fun.name(), ListDisplay(args, ", ")),
    }
}

impl Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let subs = self.subs();
        match (self.op(), subs) {
            (Operator::Junctor(Junctor::Not), [sub]) => {
                f.write_str("!")?;
                fmt_operand(sub, f)
            }
            (Operator::Junctor(j), [l, r]) => fmt_infix(l, j.symbol(), r, f),
            (Operator::Junctor(j), _) => f.write_str(j.symbol()),
            (Operator::Equals, [l, r]) => fmt_infix(l, "=", r, f),
            (Operator::Equiv, [l, r]) => fmt_infix(l, "<->", r, f),
            (Operator::IfThenElse, [c, t, e]) => {
                write!(f, "\\if ({c}) \\then ({t}) \\else ({e})")
            }
            (Operator::Quantifier(q), [body]) => {
                let keyword = match q {
                    Quantifier::All => "\\forall",
                    Quantifier::Ex => "\\exists",
                };
                write!(f, "{keyword} {}; ", ListDisplay(self.bound_vars(), ", "))?;
                fmt_operand(body, f)
            }
            (Operator::Function(fun), args) => fmt_location(fun, args, f),
            (Operator::LogicVariable(v), _) => write!(f, "{v}"),
            (Operator::ProgramVariable(v), _) => write!(f, "{v}"),
            (Operator::SchemaVariable(sv), _) => write!(f, "{sv}"),
            (Operator::ElementaryUpdate(pv), [value]) => write!(f, "{pv} := {value}"),
            (Operator::Store(fun), [args @ .., value]) => {
                fmt_location(fun, args, f)?;
                write!(f, " := {value}")
            }
            (Operator::UpdateParallel, [l, r]) => write!(f, "{l} || {r}"),
            (Operator::Skip, _) => f.write_str("skip"),
            (Operator::UpdateApplication, [update, target]) => {
                write!(f, "{{{update}}}")?;
                fmt_operand(target, f)
            }
            (Operator::Modality(kind, program), [body]) => {
                let program = match program {
                    ModalProgram::Concrete(text) => text.to_string(),
                    ModalProgram::Schema(sv) => sv.to_string(),
                };
                match kind {
                    ModalityKind::Diamond => write!(f, "\\<{{ {program} }}\\>")?,
                    ModalityKind::Box => write!(f, "\\[{{ {program} }}\\]")?,
                }
                fmt_operand(body, f)
            }
            (Operator::Subst, [value, target]) => {
                write!(
                    f,
                    "{{\\subst {}; {value}}}",
                    ListDisplay(self.bound_vars(), ", ")
                )?;
                fmt_operand(target, f)
            }
            (op, subs) => write!(f, "{op:?}({})", ListDisplay(subs, ", ")),
        }
    }
}

impl fmt::Debug for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")?;
        if self.has_labels() {
            write!(f, "<<{}>>", ListDisplay(self.labels(), ", "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sort::Sort;

    fn setup() -> (TermBuilder, Term, Term) {
        let tb = TermBuilder::default();
        let int = Sort::data("int");
        let x = tb.func(&Function::constant("x", int), vec![]).unwrap();
        let one = tb.func(&Function::constant("1", int), vec![]).unwrap();
        (tb, x, one)
    }

    #[test]
    fn hash_consing_shares_equal_terms() {
        let (tb, x, one) = setup();
        let plus = Function::new("+", vec![Sort::data("int"); 2], Sort::data("int"));
        let a = tb.func(&plus, vec![x.clone(), one.clone()]).unwrap();
        let b = tb.func(&plus, vec![x, one]).unwrap();
        assert!(a.ptr_eq(&b));
        assert_eq!(a.to_string(), "x + 1");
    }

    #[test]
    fn labels_do_not_affect_equality() {
        let (tb, x, one) = setup();
        let eq = tb.equals(x, one).unwrap();
        let labeled = tb.label(
            &eq,
            TermLabel::Formula(FormulaTermLabel::new(LabelId::new(1, 0))),
        );
        assert_eq!(eq, labeled);
        assert!(!eq.equals_mod(&labeled, TermEquality::Exact));
        assert!(eq.equals_mod(&labeled, TermEquality::IrrelevantTermLabels));
        let named = tb.label(&eq, TermLabel::Named("SC".into()));
        assert!(!eq.equals_mod(&named, TermEquality::IrrelevantTermLabels));
    }

    #[test]
    fn renaming_equality() {
        let tb = TermBuilder::default();
        let s = Sort::object("Node");
        let p = Function::predicate("p", vec![s]);
        let x = LogicVariable::new("x", s);
        let y = LogicVariable::new("y", s);
        let px = tb.func(&p, vec![tb.var(x)]).unwrap();
        let py = tb.func(&p, vec![tb.var(y)]).unwrap();
        let all_x = tb.all(x, px.clone()).unwrap();
        let all_y = tb.all(y, py.clone()).unwrap();
        assert_ne!(all_x, all_y);
        assert!(all_x.equals_mod(&all_y, TermEquality::Renaming));
        assert!(!px.equals_mod(&py, TermEquality::Renaming));
        assert_eq!(all_x.free_vars(), &[] as &[LogicVariable]);
        assert_eq!(px.free_vars(), &[x]);
    }

    #[test]
    fn pre_order_pruning() {
        struct Collect(Vec<String>);
        impl Visitor for Collect {
            fn visit_subtree(&mut self, term: &Term) -> bool {
                !matches!(term.op(), Operator::Junctor(Junctor::Not))
            }
            fn visit(&mut self, term: &Term) {
                self.0.push(term.to_string());
            }
        }
        let tb = TermBuilder::default();
        let p = tb.func(&Function::predicate("p", vec![]), vec![]).unwrap();
        let q = tb.func(&Function::predicate("q", vec![]), vec![]).unwrap();
        let t = tb.and(tb.not(p).unwrap(), q).unwrap();
        let mut collect = Collect(vec![]);
        t.exec_pre_order(&mut collect);
        assert_eq!(collect.0, vec!["!p & q", "!p", "q"]);
    }
}
