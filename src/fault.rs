//! Fault specification variables and the bit-flip gadget
//!
//! A transient bit-flip subsumes transient bit-set and bit-reset, so a
//! single fault variable per faulted signal-occurrence is enough.

use crate::sat::{Cnf, Lit};

/// One potential fault on one signal occurrence.
///
/// The fault variable `f` is free: `f = 0` leaves the faulty copy equal to
/// the perturbed value, `f = 1` flips it. Cardinality constraints over the
/// fault variables bound the attack.
#[derive(Clone, Copy, Debug)]
pub struct FaultSpec {
    f: Lit,
}

impl FaultSpec {
    /// Allocate a fresh fault variable
    pub fn new(cnf: &mut Cnf) -> FaultSpec {
        FaultSpec { f: cnf.new_var() }
    }

    /// The fault variable itself
    pub fn is_faulted(&self) -> Lit {
        self.f
    }

    /// Perturbed copy of `normal`: a fresh variable constrained to
    /// `normal ^ f`
    pub fn induce_fault(&self, cnf: &mut Cnf, normal: Lit) -> Lit {
        let flipped = cnf.new_var();
        // f = 0: copy
        cnf.add_clause(&[normal, self.f, !flipped]);
        cnf.add_clause(&[!normal, self.f, flipped]);
        // f = 1: bit-flip
        cnf.add_clause(&[normal, !self.f, flipped]);
        cnf.add_clause(&[!normal, !self.f, !flipped]);
        flipped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sat::Verdict;

    #[test]
    fn test_flip_encoding() {
        // In every satisfying assignment, y' = y ^ f
        let mut cnf = Cnf::new();
        let y = cnf.new_var();
        let spec = FaultSpec::new(&mut cnf);
        let flipped = spec.induce_fault(&mut cnf, y);
        for v in 0..4u32 {
            let (vy, vf) = (v & 1 != 0, v & 2 != 0);
            cnf.assume(if vy { y } else { !y });
            cnf.assume(if vf { spec.is_faulted() } else { !spec.is_faulted() });
            assert_eq!(cnf.check(), Verdict::Sat);
            assert_eq!(cnf.value(flipped), vy ^ vf);
        }
        // The converse direction: y' != y forces f
        cnf.assume(y);
        cnf.assume(!flipped);
        cnf.assume(!spec.is_faulted());
        assert_eq!(cnf.check(), Verdict::Unsat);
    }
}
