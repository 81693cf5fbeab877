//! Procedure 2: enumeration of attacks corrupting non-alert outputs
//!
//! Given a partitioning, the engine searches for admissible attacks that
//! make a primary (non-alert) output diverge while every alert stays
//! quiescent over the whole alert delay, and enumerates the fault
//! locations of every such attack until none remain.

use std::collections::BTreeSet;
use std::time::Instant;

use itertools::Itertools;
use kdam::{tqdm, BarExt};

use crate::circuit::{Circuit, SignalId};
use crate::config::{Config, FaultGates};
use crate::errors::Result;
use crate::io::vcd;
use crate::partition::PartitionStore;
use crate::partitioning::{
    describe_partitions, forbid_faults, model_true_indices, unix_stamp, MAX_ITER,
};
use crate::report::Report;
use crate::sat::{Cnf, Lit, Verdict};
use crate::unroll::Unroller;

/// Result of Procedure 2
pub struct IntegrityOutcome {
    /// Combinational fault locations corrupting a primary output
    pub exploitable_faults: BTreeSet<SignalId>,
    /// Partitions whose initial divergence corrupts a primary output
    pub exploitable_partitions: BTreeSet<usize>,
    /// Total number of solver calls
    pub solver_iters: u32,
}

/// Enumerate all exploitable faults against the given partitioning.
pub fn check_output_integrity(
    circuit: &Circuit,
    conf: &Config,
    partitions: &PartitionStore,
    faultable: &BTreeSet<SignalId>,
    alert_signals: &BTreeSet<SignalId>,
    report: &mut Report,
) -> Result<IntegrityOutcome> {
    report.banner("Procedure 2 -- Check output integrity");

    let mut cnf = Cnf::new();
    let mut unroller = Unroller::new(circuit, faultable, alert_signals);
    for cycle in 0..=conf.delay {
        if cycle == 0 {
            unroller.unroll_initial(&mut cnf);
            unroller.assert_invariants_at_step(&mut cnf, &conf.invariant_list, 0)?;
        } else {
            unroller.unroll_step(&mut cnf);
        }
        unroller.assert_no_alert_at_step(&mut cnf, &conf.alert_list, cycle as usize)?;
    }
    assert_eq!(unroller.faults().len(), conf.delay as usize + 1);

    // Divergence variable per partition at cycle 0, where faults enter
    let mut partitions_diff: Vec<Lit> = Vec::with_capacity(partitions.len());
    for part in partitions.parts() {
        let mut bits = Vec::with_capacity(part.len());
        for sig in part {
            let g = unroller.golden()[0][sig];
            let f = unroller.faulty()[0][sig];
            bits.push(cnf.xor(g, f));
        }
        partitions_diff.push(cnf.or_many(&bits));
    }

    let mut comb_fault_vars: [Vec<Lit>; 2] = [Vec::new(), Vec::new()];
    for (cycle, faults) in unroller.faults().iter().enumerate() {
        let slot = usize::from(cycle != 0);
        comb_fault_vars[slot].extend(faults.values().map(|f| f.is_faulted()));
    }

    report.line(format!(
        "Unrolled {} cycles: {} variables, {} clauses",
        conf.delay + 1,
        cnf.nb_vars(),
        cnf.nb_clauses()
    ));
    let start = Instant::now();
    let stamp = unix_stamp();

    let primary_outputs: BTreeSet<SignalId> = circuit
        .outs()
        .difference(alert_signals)
        .copied()
        .collect();

    // Divergence of any primary output at the last unrolled cycle
    let last = conf.delay as usize;
    let mut output_bits = Vec::with_capacity(primary_outputs.len());
    for out in &primary_outputs {
        let g = unroller.golden()[last][out];
        let f = unroller.faulty()[last][out];
        output_bits.push(cnf.xor(g, f));
    }

    // Divergence that cannot reach a primary output cannot corrupt one
    let mut part_optim = 0;
    for (idx, part) in partitions.parts().iter().enumerate() {
        let reaches = part.iter().any(|sig| {
            circuit
                .conn_outs(*sig)
                .iter()
                .any(|out| primary_outputs.contains(out))
        });
        if !reaches {
            cnf.add_clause(&[!partitions_diff[idx]]);
            part_optim += 1;
        }
    }
    report.line(format!("  Optimize {part_optim} faults in partitions"));

    let mut comb_optim = 0;
    for (sig, spec) in &unroller.faults()[0] {
        let reaches = circuit
            .conn_outs(*sig)
            .iter()
            .any(|out| primary_outputs.contains(out));
        if !reaches {
            cnf.add_clause(&[!spec.is_faulted()]);
            comb_optim += 1;
        }
    }
    report.line(format!("  Optimize {comb_optim} faults in comb logic"));

    let mut exploitable_faults: BTreeSet<SignalId> = BTreeSet::new();
    let mut exploitable_partitions: BTreeSet<usize> = BTreeSet::new();
    let mut solver_iter = 0u32;

    let k_start = if conf.increasing_k { 1 } else { conf.k };
    let mut pairs = Vec::new();
    for k_faults in k_start..=conf.k {
        let max_k_f_comb = if conf.f_gates == FaultGates::Seq {
            0
        } else {
            k_faults
        };
        for k_f_comb in 0..=max_k_f_comb {
            pairs.push((k_faults, k_f_comb));
        }
    }

    let mut progress = tqdm!(total = pairs.len());
    progress.set_description("Budget pairs");

    for (k_faults, k_f_comb) in pairs {
        let k_f_part = k_faults - k_f_comb;

        report.rule();
        report.line(format!(
            "Check output integrity for {k_f_part}/{} faulty partitions,",
            partitions.len()
        ));
        report.line(format!(
            "{k_f_comb}/{} combinational faults",
            comb_fault_vars[0].len() + comb_fault_vars[1].len()
        ));
        report.rule();

        // The cardinality gates are stable for the whole pair: build them
        // once and re-assume them every iteration
        let total_comb_f_vars: Vec<Lit> = comb_fault_vars
            .iter()
            .flat_map(|v| v.iter().copied())
            .collect();
        let at_most_comb = cnf.at_most(&total_comb_f_vars, k_f_comb as usize);
        let at_most_part = cnf.at_most(&partitions_diff, k_f_part as usize);
        let any_output_diff = cnf.or_many(&output_bits);

        while solver_iter < MAX_ITER {
            solver_iter += 1;
            cnf.assume(at_most_comb);
            cnf.assume(at_most_part);
            cnf.assume(any_output_diff);

            report.line(format!(
                "Enumerate exploitable faults: {}",
                exploitable_faults.iter().map(|s| s.raw()).join(" ")
            ));
            forbid_faults(&mut cnf, &unroller, &exploitable_faults);
            report.line(format!(
                "Enumerate exploitable partitions: {}",
                exploitable_partitions.iter().join(" ")
            ));
            for idx in &exploitable_partitions {
                cnf.add_clause(&[!partitions_diff[*idx]]);
            }

            report.text(format!("  Running solver {solver_iter}: "));
            let check_start = Instant::now();
            let verdict = cnf.check();
            let ms = check_start.elapsed().as_millis();
            match verdict {
                Verdict::Unsat => {
                    report.line(format!("UNSAT {}.{:03} s", ms / 1000, ms % 1000));
                    break;
                }
                Verdict::Unknown => {
                    report.line(format!(
                        "UNKNOWN {}.{:03} s, cannot refute this budget",
                        ms / 1000,
                        ms % 1000
                    ));
                    break;
                }
                Verdict::Sat => {
                    report.line(format!("SAT {}.{:03} s", ms / 1000, ms % 1000));
                }
            }

            for (cycle, faults) in unroller.faults().iter().enumerate() {
                let faulty_sigs: Vec<SignalId> = faults
                    .iter()
                    .filter(|(_, spec)| cnf.value(spec.is_faulted()))
                    .map(|(sig, _)| *sig)
                    .collect();
                debug_assert!(faulty_sigs.len() <= k_f_comb as usize);
                exploitable_faults.extend(faulty_sigs.iter().copied());
                report.line(format!(
                    "Faulty comb gates at clock cycle {cycle}: {}",
                    faulty_sigs.iter().map(|s| s.raw()).join(" ")
                ));
            }

            let faulty_initial = model_true_indices(&cnf, &partitions_diff);
            debug_assert!(faulty_initial.len() <= k_f_part as usize);
            exploitable_partitions.extend(faulty_initial.iter().copied());
            report.line(format!(
                "Faulty partitions (initial): {}",
                describe_partitions(partitions, &faulty_initial)
            ));

            let corrupted: Vec<u32> = circuit
                .outs()
                .iter()
                .filter(|out| {
                    let g = cnf.value(unroller.golden()[last][*out]);
                    let f = cnf.value(unroller.faulty()[last][*out]);
                    g != f
                })
                .map(|out| out.raw())
                .collect();
            report.line(format!("Corrupted outputs: {}", corrupted.iter().join(" ")));

            if conf.dump_vcd {
                let path = conf
                    .dump_path
                    .join(format!("k-partitions-output-{stamp}.vcd"));
                if let Err(e) =
                    vcd::dump_vcd(&path, circuit, &cnf, unroller.golden(), unroller.faulty())
                {
                    report.line(format!("  VCD dump failed: {e}"));
                }
            }
        }
        progress.update(1).unwrap();
    }

    let ms = start.elapsed().as_millis();
    report.line(format!(
        "=> Procedure 2 verification time: {}.{:03} s",
        ms / 1000,
        ms % 1000
    ));

    Ok(IntegrityOutcome {
        exploitable_faults,
        exploitable_partitions,
        solver_iters: solver_iter,
    })
}
