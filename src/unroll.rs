//! Symbolic unrolling of golden and faulty executions
//!
//! Both traces share the primary inputs and the clock. Register faults
//! enter the model through the unconstrained initial state; combinational
//! faults are injected on faultable cell outputs while unrolling, at
//! cycles past the first only where the output can still reach an alert.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::circuit::{BinaryOp, Cell, CellKind, Circuit, SignalId, UnaryOp};
use crate::errors::{Error, Result};
use crate::fault::FaultSpec;
use crate::sat::{Cnf, Lit};

/// Map from signal to its solver variable at one cycle
pub type State = HashMap<SignalId, Lit>;

/// Builder for the golden and faulty symbolic traces of one circuit.
///
/// One unroller serves one solver session; the two analysis procedures
/// each create their own.
pub struct Unroller<'a> {
    circuit: &'a Circuit,
    faultable: &'a BTreeSet<SignalId>,
    alerts: &'a BTreeSet<SignalId>,
    golden: Vec<State>,
    faulty: Vec<State>,
    faults: Vec<BTreeMap<SignalId, FaultSpec>>,
}

fn init_constants(state: &mut State) {
    state.insert(SignalId::S0, Lit::FALSE);
    state.insert(SignalId::S1, Lit::TRUE);
    state.insert(SignalId::SX, Lit::FALSE);
    state.insert(SignalId::SZ, Lit::FALSE);
}

fn lit(state: &State, sig: SignalId) -> Lit {
    *state
        .get(&sig)
        .unwrap_or_else(|| panic!("signal {sig} not evaluated yet"))
}

impl<'a> Unroller<'a> {
    /// Create an empty unroller over the given fault and alert sets
    pub fn new(
        circuit: &'a Circuit,
        faultable: &'a BTreeSet<SignalId>,
        alerts: &'a BTreeSet<SignalId>,
    ) -> Unroller<'a> {
        Unroller {
            circuit,
            faultable,
            alerts,
            golden: Vec::new(),
            faulty: Vec::new(),
            faults: Vec::new(),
        }
    }

    /// Number of unrolled cycles
    pub fn nb_steps(&self) -> usize {
        self.golden.len()
    }

    /// Golden trace, one state per cycle
    pub fn golden(&self) -> &[State] {
        &self.golden
    }

    /// Faulty trace, one state per cycle
    pub fn faulty(&self) -> &[State] {
        &self.faulty
    }

    /// Fault specs introduced at each cycle
    pub fn faults(&self) -> &[BTreeMap<SignalId, FaultSpec>] {
        &self.faults
    }

    /// Fresh golden input variables; faulty inputs are shared or, when the
    /// input is faultable, perturbed through a new fault spec
    fn declare_inputs(&mut self, cnf: &mut Cnf) {
        let golden = self.golden.last_mut().expect("state pushed");
        let faulty = self.faulty.last_mut().expect("state pushed");
        let current_faults = self.faults.last_mut().expect("faults pushed");
        for sig in self.circuit.ins() {
            if sig.is_const() {
                continue;
            }
            let g = cnf.new_var();
            golden.insert(*sig, g);
            if self.faultable.contains(sig) {
                let spec = FaultSpec::new(cnf);
                faulty.insert(*sig, spec.induce_fault(cnf, g));
                current_faults.insert(*sig, spec);
            } else {
                faulty.insert(*sig, g);
            }
        }
    }

    /// Build the initial state.
    ///
    /// Register outputs get independent fresh variables on both sides:
    /// the unconstrained initial divergence is the register fault model.
    /// Every faultable combinational output is additionally perturbed on
    /// the faulty side.
    pub fn unroll_initial(&mut self, cnf: &mut Cnf) {
        assert!(self.golden.is_empty(), "initial state already built");
        self.golden.push(State::new());
        self.faulty.push(State::new());
        self.faults.push(BTreeMap::new());
        init_constants(self.golden.last_mut().unwrap());
        init_constants(self.faulty.last_mut().unwrap());
        self.declare_inputs(cnf);

        for reg in self.circuit.regs() {
            let g = cnf.new_var();
            let f = cnf.new_var();
            self.golden.last_mut().unwrap().insert(*reg, g);
            self.faulty.last_mut().unwrap().insert(*reg, f);
        }

        for cell in self.circuit.cells() {
            if cell.is_register() {
                continue;
            }
            let golden = self.golden.last_mut().unwrap();
            eval_comb(cnf, cell, golden);
            let faulty = self.faulty.last_mut().unwrap();
            eval_comb(cnf, cell, faulty);

            let y = cell.output();
            if self.faultable.contains(&y) {
                let spec = FaultSpec::new(cnf);
                let perturbed = spec.induce_fault(cnf, lit(faulty, y));
                faulty.insert(y, perturbed);
                self.faults.last_mut().unwrap().insert(y, spec);
            }
        }
    }

    /// Build the next state from the previous one.
    ///
    /// Registers evaluate their transition function first; combinational
    /// faults are injected only on outputs still connected to an alert,
    /// since a fault the checker can never see cannot contribute to an
    /// admissible attack.
    pub fn unroll_step(&mut self, cnf: &mut Cnf) {
        let prev = self.nb_steps() - 1;
        assert_eq!(self.golden.len(), self.faulty.len());
        assert_eq!(self.golden.len(), self.faults.len());
        self.golden.push(State::new());
        self.faulty.push(State::new());
        self.faults.push(BTreeMap::new());
        init_constants(self.golden.last_mut().unwrap());
        init_constants(self.faulty.last_mut().unwrap());
        self.declare_inputs(cnf);

        for cell in self.circuit.cells() {
            if cell.is_register() {
                let (before, after) = self.golden.split_at_mut(prev + 1);
                eval_register(cnf, cell, &before[prev], &mut after[0]);
                let (before, after) = self.faulty.split_at_mut(prev + 1);
                eval_register(cnf, cell, &before[prev], &mut after[0]);
                continue;
            }

            eval_comb(cnf, cell, self.golden.last_mut().unwrap());
            let faulty = self.faulty.last_mut().unwrap();
            eval_comb(cnf, cell, faulty);

            let y = cell.output();
            if !self.faultable.contains(&y) {
                continue;
            }
            let reaches_alert = self
                .circuit
                .conn_outs(y)
                .iter()
                .any(|o| self.alerts.contains(o));
            if reaches_alert {
                let spec = FaultSpec::new(cnf);
                let perturbed = spec.induce_fault(cnf, lit(faulty, y));
                faulty.insert(y, perturbed);
                self.faults.last_mut().unwrap().insert(y, spec);
            }
        }
    }

    /// Pin golden-side bus bits to the given patterns at one cycle
    pub fn assert_invariants_at_step(
        &self,
        cnf: &mut Cnf,
        invariants: &BTreeMap<String, Vec<bool>>,
        step: usize,
    ) -> Result<()> {
        assert!(step < self.nb_steps());
        for (name, pattern) in invariants {
            let sigs = self
                .circuit
                .net(name)
                .ok_or_else(|| Error::UnknownNet(name.clone()))?;
            if sigs.len() != pattern.len() {
                return Err(Error::PatternWidth {
                    net: name.clone(),
                    expected: sigs.len(),
                    got: pattern.len(),
                });
            }
            for (sig, value) in sigs.iter().zip(pattern) {
                let l = lit(&self.golden[step], *sig);
                cnf.add_clause(&[if *value { l } else { !l }]);
            }
        }
        Ok(())
    }

    /// Force every alert bus to its quiescent pattern, on both traces, at
    /// one cycle
    pub fn assert_no_alert_at_step(
        &self,
        cnf: &mut Cnf,
        alerts: &BTreeMap<String, Vec<bool>>,
        step: usize,
    ) -> Result<()> {
        assert!(step < self.nb_steps());
        assert_eq!(self.golden.len(), self.faulty.len());
        for (name, pattern) in alerts {
            let sigs = self
                .circuit
                .net(name)
                .ok_or_else(|| Error::UnknownNet(name.clone()))?;
            if sigs.len() != pattern.len() {
                return Err(Error::PatternWidth {
                    net: name.clone(),
                    expected: sigs.len(),
                    got: pattern.len(),
                });
            }
            for (sig, value) in sigs.iter().zip(pattern) {
                let g = lit(&self.golden[step], *sig);
                let f = lit(&self.faulty[step], *sig);
                cnf.add_clause(&[if *value { g } else { !g }]);
                cnf.add_clause(&[if *value { f } else { !f }]);
            }
        }
        Ok(())
    }
}

/// Evaluate one combinational cell within a state
fn eval_comb(cnf: &mut Cnf, cell: &Cell, state: &mut State) {
    let value = match *cell.kind() {
        CellKind::Unary { op, a, y: _ } => {
            let la = lit(state, a);
            match op {
                UnaryOp::Buf => la,
                UnaryOp::Not => !la,
            }
        }
        CellKind::Binary { op, a, b, y: _ } => {
            let la = lit(state, a);
            let lb = lit(state, b);
            match op {
                BinaryOp::And => cnf.and(la, lb),
                BinaryOp::Or => cnf.or(la, lb),
                BinaryOp::Xor => cnf.xor(la, lb),
                BinaryOp::Nand => !cnf.and(la, lb),
                BinaryOp::Nor => !cnf.or(la, lb),
                BinaryOp::Xnor => !cnf.xor(la, lb),
            }
        }
        CellKind::Mux { a, b, s, y: _ } => {
            let la = lit(state, a);
            let lb = lit(state, b);
            let ls = lit(state, s);
            cnf.mux(ls, la, lb)
        }
        CellKind::Dff { .. } => panic!("combinational cell expected"),
    };
    state.insert(cell.output(), value);
}

/// Evaluate one register's transition function from the previous state:
/// `q' = !r & (e ? d : q)`
fn eval_register(cnf: &mut Cnf, cell: &Cell, prev: &State, curr: &mut State) {
    let CellKind::Dff { d, q, en, rst, .. } = *cell.kind() else {
        panic!("register expected");
    };
    let ld = lit(prev, d);
    let lq = lit(prev, q);
    let mut next = match en {
        Some(e) => {
            let le = lit(prev, e);
            cnf.mux(le, lq, ld)
        }
        None => ld,
    };
    if let Some(r) = rst {
        let lr = lit(prev, r);
        next = cnf.and(next, !lr);
    }
    curr.insert(q, next);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sat::Verdict;
    use crate::testutil::{counter3, dual_rail};

    #[test]
    fn test_trace_sizes() {
        let circuit = dual_rail();
        let faultable: BTreeSet<SignalId> = circuit.sigs().clone();
        let alerts: BTreeSet<SignalId> = circuit.outs().clone();
        let mut cnf = Cnf::new();
        let mut unroller = Unroller::new(&circuit, &faultable, &alerts);
        unroller.unroll_initial(&mut cnf);
        unroller.unroll_step(&mut cnf);
        unroller.unroll_step(&mut cnf);
        assert_eq!(unroller.nb_steps(), 3);
        assert_eq!(unroller.golden().len(), unroller.faulty().len());
        assert_eq!(unroller.faults().len(), 3);
        // Every signal is valued at every cycle on both sides
        for step in 0..3 {
            for sig in circuit.sigs() {
                assert!(unroller.golden()[step].contains_key(sig));
                assert!(unroller.faulty()[step].contains_key(sig));
            }
        }
    }

    #[test]
    fn test_register_faults_only_at_cycle_zero() {
        let circuit = dual_rail();
        let faultable = BTreeSet::new();
        let alerts: BTreeSet<SignalId> = circuit.outs().clone();
        let mut cnf = Cnf::new();
        let mut unroller = Unroller::new(&circuit, &faultable, &alerts);
        unroller.unroll_initial(&mut cnf);
        unroller.unroll_step(&mut cnf);
        // No faultable signals: no fault specs anywhere
        assert!(unroller.faults().iter().all(|m| m.is_empty()));
        // Initial registers are free on each side, so a divergent model
        // exists; after one step both rails reload the same input
        let r0 = *circuit.regs().iter().next().unwrap();
        let g0 = unroller.golden()[0][&r0];
        let f0 = unroller.faulty()[0][&r0];
        cnf.assume(g0);
        cnf.assume(!f0);
        assert_eq!(cnf.check(), Verdict::Sat);
        let g1 = unroller.golden()[1][&r0];
        let f1 = unroller.faulty()[1][&r0];
        assert_eq!(cnf.value(g1), cnf.value(f1));
    }

    #[test]
    fn test_alert_restriction() {
        let circuit = dual_rail();
        let faultable: BTreeSet<SignalId> = circuit.sigs().clone();
        // Pretend there is no alert: past cycle 0, only inputs are faulted
        let alerts = BTreeSet::new();
        let mut cnf = Cnf::new();
        let mut unroller = Unroller::new(&circuit, &faultable, &alerts);
        unroller.unroll_initial(&mut cnf);
        unroller.unroll_step(&mut cnf);
        assert!(!unroller.faults()[0].is_empty());
        for sig in unroller.faults()[1].keys() {
            assert!(circuit.ins().contains(sig));
        }
    }

    #[test]
    fn test_invariant_pins_initial_state() {
        // A three-register ring with an all-zero invariant: every model
        // keeps the golden initial state at zero
        let circuit = counter3();
        let faultable = BTreeSet::new();
        let alerts = BTreeSet::new();
        let mut cnf = Cnf::new();
        let mut unroller = Unroller::new(&circuit, &faultable, &alerts);
        unroller.unroll_initial(&mut cnf);
        let invariants: BTreeMap<String, Vec<bool>> =
            [("cnt".to_string(), vec![false, false, false])].into();
        unroller
            .assert_invariants_at_step(&mut cnf, &invariants, 0)
            .unwrap();
        assert_eq!(cnf.check(), Verdict::Sat);
        for sig in circuit.net("cnt").unwrap() {
            assert!(!cnf.value(unroller.golden()[0][sig]));
        }
        // The faulty side stays unconstrained
        let r0 = circuit.net("cnt").unwrap()[0];
        cnf.assume(unroller.faulty()[0][&r0]);
        assert_eq!(cnf.check(), Verdict::Sat);
        assert!(cnf.value(unroller.faulty()[0][&r0]));
    }

    #[test]
    fn test_no_alert_holds_in_models() {
        let circuit = dual_rail();
        let faultable: BTreeSet<SignalId> = circuit.sigs().clone();
        let alerts: BTreeSet<SignalId> = circuit.outs().clone();
        let mut cnf = Cnf::new();
        let mut unroller = Unroller::new(&circuit, &faultable, &alerts);
        unroller.unroll_initial(&mut cnf);
        unroller.unroll_step(&mut cnf);
        let alert_list: BTreeMap<String, Vec<bool>> =
            [("alert".to_string(), vec![false])].into();
        for step in 0..2 {
            unroller
                .assert_no_alert_at_step(&mut cnf, &alert_list, step)
                .unwrap();
        }
        assert_eq!(cnf.check(), Verdict::Sat);
        let alert_sig = circuit.net("alert").unwrap()[0];
        for step in 0..2 {
            assert!(!cnf.value(unroller.golden()[step][&alert_sig]));
            assert!(!cnf.value(unroller.faulty()[step][&alert_sig]));
        }
    }

    #[test]
    fn test_unknown_net_rejected() {
        let circuit = dual_rail();
        let faultable = BTreeSet::new();
        let alerts = BTreeSet::new();
        let mut cnf = Cnf::new();
        let mut unroller = Unroller::new(&circuit, &faultable, &alerts);
        unroller.unroll_initial(&mut cnf);
        let bad: BTreeMap<String, Vec<bool>> = [("nope".to_string(), vec![false])].into();
        assert!(matches!(
            unroller.assert_invariants_at_step(&mut cnf, &bad, 0),
            Err(Error::UnknownNet(_))
        ));
    }
}
