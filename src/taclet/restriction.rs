use bitflags::bitflags;

use crate::inst::MatchConditions;
use crate::term::{Junctor, Operator, PosInOccurrence};

bitflags! {
    /// Where a rewrite taclet may be applied relative to updates, modalities
    /// and the polarity of the find position.
    #[derive(Default, Clone, Copy, PartialEq, Eq, Hash, Debug)]
    pub struct ApplicationRestriction: u8 {
        /// The update context above the position is collected and must be
        /// matched by the assumes formulas and added formulas.
        const SAME_UPDATE_LEVEL = 1 << 0;
        /// The position must not be below any update.
        const IN_SEQUENT_STATE = 1 << 1;
        const ANTECEDENT_POLARITY = 1 << 2;
        const SUCCEDENT_POLARITY = 1 << 3;
    }
}

impl ApplicationRestriction {
    pub const NONE: ApplicationRestriction = ApplicationRestriction::empty();
}

/// Checks the terms above `pos` against `restriction`.
///
/// Returns the match conditions extended by the updates above the position
/// when the restriction is not [`ApplicationRestriction::NONE`], and `None`
/// when the position is not admissible. A transformer above the position is
/// never admissible.
pub fn check_prefix(
    restriction: ApplicationRestriction,
    pos: &PosInOccurrence,
    mc: MatchConditions,
) -> Option<MatchConditions> {
    let restricted = restriction != ApplicationRestriction::NONE;
    let mut polarity: i32 = if pos.is_in_antec() { -1 } else { 1 };
    let mut insts = mc.instantiations().clone();

    for (term, child) in pos.path() {
        let op = term.op();
        if op.is_transformer() {
            return None;
        }
        match op {
            Operator::UpdateApplication if child == 1 && restricted => {
                let update = term.sub(0);
                if restriction.contains(ApplicationRestriction::IN_SEQUENT_STATE)
                    || !update.is_closed()
                {
                    return None;
                }
                insts = insts.add_update(update.clone(), term.labels().into());
            }
            Operator::Modality(..) if restricted => return None,
            _ => {}
        }
        if polarity != 0 {
            polarity = match op {
                Operator::Junctor(Junctor::Not) => -polarity,
                Operator::Junctor(Junctor::Imp) if child == 0 => -polarity,
                Operator::Junctor(Junctor::And | Junctor::Or | Junctor::Imp) => polarity,
                Operator::IfThenElse if child != 0 => polarity,
                _ => 0,
            };
        }
    }

    if !restricted {
        return Some(mc);
    }
    if (restriction.contains(ApplicationRestriction::ANTECEDENT_POLARITY) && polarity != -1)
        || (restriction.contains(ApplicationRestriction::SUCCEDENT_POLARITY) && polarity != 1)
    {
        return None;
    }
    log::trace!("prefix check passed at {pos} with polarity {polarity}");
    Some(mc.set_instantiations(insts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequent::SequentFormula;
    use crate::sort::Sort;
    use crate::term::{Function, ModalProgram, ProgramVariable, Term, TermBuilder};

    struct Fixture {
        tb: TermBuilder,
        p: Term,
        q: Term,
        update: Term,
    }

    fn fixture() -> Fixture {
        let tb = TermBuilder;
        let int = Sort::data("int");
        let x = ProgramVariable::new("x", int);
        let one = tb.func(&Function::constant("1", int), vec![]).unwrap();
        Fixture {
            p: tb.func(&Function::predicate("p", vec![]), vec![]).unwrap(),
            q: tb.func(&Function::predicate("q", vec![]), vec![]).unwrap(),
            update: tb.elementary(x, one).unwrap(),
            tb,
        }
    }

    fn pio(formula: Term, path: &[usize], in_antec: bool) -> PosInOccurrence {
        let mut pio = PosInOccurrence::top_level(SequentFormula::new(formula).unwrap(), in_antec);
        for &i in path {
            pio = pio.down(i).unwrap();
        }
        pio
    }

    #[test]
    fn polarity() {
        let f = fixture();
        // !(p -> q) in the succedent: p has polarity +1, q has -1
        let formula = f.tb.not(f.tb.imp(f.p.clone(), f.q.clone()).unwrap()).unwrap();
        let at_p = pio(formula.clone(), &[0, 0], false);
        let at_q = pio(formula, &[0, 1], false);
        let succ = ApplicationRestriction::SUCCEDENT_POLARITY;
        let ante = ApplicationRestriction::ANTECEDENT_POLARITY;
        assert!(check_prefix(succ, &at_p, MatchConditions::default()).is_some());
        assert!(check_prefix(ante, &at_p, MatchConditions::default()).is_none());
        assert!(check_prefix(ante, &at_q, MatchConditions::default()).is_some());
    }

    #[test]
    fn updates_are_collected() {
        let f = fixture();
        let formula = f.tb.apply(f.update.clone(), f.p.clone()).unwrap();
        let at_p = pio(formula, &[1], true);
        let mc = check_prefix(
            ApplicationRestriction::SAME_UPDATE_LEVEL,
            &at_p,
            MatchConditions::default(),
        )
        .unwrap();
        let context = mc.instantiations().update_context_terms();
        assert_eq!(context, vec![f.update.clone()]);

        assert!(check_prefix(
            ApplicationRestriction::IN_SEQUENT_STATE,
            &at_p,
            MatchConditions::default()
        )
        .is_none());
        // unrestricted taclets ignore updates
        let mc = check_prefix(ApplicationRestriction::NONE, &at_p, MatchConditions::default())
            .unwrap();
        assert!(mc.instantiations().update_context().is_empty());
    }

    #[test]
    fn modalities_reject_restricted_taclets() {
        let f = fixture();
        let formula = f
            .tb
            .dia(ModalProgram::Concrete("x = 1;".into()), f.p.clone())
            .unwrap();
        let at_p = pio(formula, &[0], false);
        assert!(check_prefix(
            ApplicationRestriction::SAME_UPDATE_LEVEL,
            &at_p,
            MatchConditions::default()
        )
        .is_none());
        assert!(check_prefix(ApplicationRestriction::NONE, &at_p, MatchConditions::default())
            .is_some());
    }

    #[test]
    fn prefix_check_is_idempotent() {
        let f = fixture();
        let inner = f.tb.and(f.p.clone(), f.q.clone()).unwrap();
        let formula = f.tb.apply(f.update.clone(), inner).unwrap();
        let at_q = pio(formula, &[1, 1], true);
        let restriction = ApplicationRestriction::SAME_UPDATE_LEVEL;
        let first = check_prefix(restriction, &at_q, MatchConditions::default()).unwrap();
        let second = check_prefix(restriction, &at_q, MatchConditions::default()).unwrap();
        assert_eq!(first, second);
    }
}
