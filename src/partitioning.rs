//! Procedure 1: iterative construction of a fault-resistant partitioning
//!
//! For every split of the fault budget the engine asks the solver for an
//! attack that corrupts at most `k` partitions yet makes strictly more
//! than `k` partitions diverge one cycle later, without raising an alert.
//! Every witness merges the violating partitions; the partitioning is
//! fault-resistant for the budget once all splits are refuted.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use itertools::Itertools;
use kdam::{tqdm, BarExt};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::circuit::{Circuit, SignalId};
use crate::config::{Config, FaultGates};
use crate::errors::Result;
use crate::fault::FaultSpec;
use crate::io::vcd;
use crate::partition::PartitionStore;
use crate::report::{partition_info, Report};
use crate::sat::{Cnf, Lit, Verdict};
use crate::unroll::Unroller;

/// Cap on solver calls across all budget configurations
pub const MAX_ITER: u32 = 2000;

/// Fixed seed of the merge-bucketing generator, for reproducible runs
const MERGE_SEED: u64 = 42;

/// Result of Procedure 1
pub struct PartitioningOutcome {
    /// The refined partitioning
    pub partitions: PartitionStore,
    /// Total number of solver calls
    pub solver_iters: u32,
    /// Number of SAT witnesses that triggered a merge
    pub nb_merges: u32,
    /// Exploitable combinational faults, in enumerate mode only
    pub exploitable_faults: BTreeSet<SignalId>,
}

/// Build the coarsest partitioning resistant to `conf.k` faults.
///
/// The incoming partitioning seeds the refinement; merged partitions
/// replace their sources at fresh indices, so diff-variable vectors are
/// updated in lockstep.
pub fn build_partitions(
    circuit: &Circuit,
    conf: &Config,
    mut partitions: PartitionStore,
    faultable: &BTreeSet<SignalId>,
    alert_signals: &BTreeSet<SignalId>,
    report: &mut Report,
) -> Result<PartitioningOutcome> {
    let mut cnf = Cnf::new();
    let mut unroller = Unroller::new(circuit, faultable, alert_signals);
    let depth = conf.delay.max(1);
    for cycle in 0..=depth {
        if cycle == 0 {
            unroller.unroll_initial(&mut cnf);
            unroller.assert_invariants_at_step(&mut cnf, &conf.invariant_list, 0)?;
        } else {
            unroller.unroll_step(&mut cnf);
        }
        unroller.assert_no_alert_at_step(&mut cnf, &conf.alert_list, cycle as usize)?;
    }
    assert_eq!(unroller.faults().len(), depth as usize + 1);

    // Divergence variable per partition, at cycle 0 and after one step
    let mut partitions_diff: [Vec<Lit>; 2] = [Vec::new(), Vec::new()];
    for (cycle, diffs) in partitions_diff.iter_mut().enumerate() {
        for part in partitions.parts() {
            let mut bits = Vec::with_capacity(part.len());
            for sig in part {
                let g = unroller.golden()[cycle][sig];
                let f = unroller.faulty()[cycle][sig];
                bits.push(cnf.xor(g, f));
            }
            diffs.push(cnf.or_many(&bits));
        }
    }

    // Fault variables at cycle 0, and the union of all later cycles
    let mut comb_fault_vars: [Vec<Lit>; 2] = [Vec::new(), Vec::new()];
    for (cycle, faults) in unroller.faults().iter().enumerate() {
        let slot = usize::from(cycle != 0);
        comb_fault_vars[slot].extend(faults.values().map(|f| f.is_faulted()));
    }

    report.banner("Procedure 1 -- Build partitions");
    report.line(format!(
        "Unrolled {} cycles: {} variables, {} clauses",
        depth + 1,
        cnf.nb_vars(),
        cnf.nb_clauses()
    ));
    let start = Instant::now();
    let stamp = unix_stamp();

    let k_start = if conf.increasing_k { 1 } else { conf.k };
    let mut triples = Vec::new();
    for k_faults in k_start..=conf.k {
        let max_k_f_comb = if conf.f_gates == FaultGates::Seq {
            0
        } else {
            k_faults
        };
        for k_f_comb in (0..=max_k_f_comb).rev() {
            for k_f_comb_next in 0..=k_f_comb.min(k_faults.saturating_sub(1)) {
                triples.push((k_faults, k_f_comb, k_f_comb_next));
            }
        }
    }

    let mut progress = tqdm!(total = triples.len());
    progress.set_description("Budget triples");

    let mut solver_iter = 0u32;
    let mut nb_merges = 0u32;
    let mut enumerate_comb_faults: BTreeSet<SignalId> = BTreeSet::new();
    let mut rng = SmallRng::seed_from_u64(MERGE_SEED);

    for (k_faults, k_f_comb, k_f_comb_next) in triples {
        let k_f_part = k_faults - k_f_comb;
        let k_f_comb_init = k_f_comb - k_f_comb_next;

        report.rule();
        report.line(format!(
            "Partitioning for {k_f_part}/{} faulty partitions,",
            partitions.len()
        ));
        report.line(format!(
            "{k_f_comb_init}/{} combinational faults at initial state,",
            comb_fault_vars[0].len()
        ));
        report.line(format!(
            "and {k_f_comb_next}/{} combinational faults in the following clock cycles.",
            comb_fault_vars[1].len()
        ));
        report.rule();

        // Refine until the current budget split is refuted
        while solver_iter < MAX_ITER {
            solver_iter += 1;

            if conf.optim_atleast2 {
                optim_at_least_2_conn_parts(
                    circuit,
                    &partitions,
                    &unroller.faults()[0],
                    &partitions_diff[0],
                    &mut cnf,
                    report,
                );
            }

            let am_comb_init = cnf.at_most(&comb_fault_vars[0], k_f_comb_init as usize);
            let am_comb_next = cnf.at_most(&comb_fault_vars[1], k_f_comb_next as usize);
            let am_part = cnf.at_most(&partitions_diff[0], k_f_part as usize);
            let al_next = cnf.at_least(&partitions_diff[1], k_faults as usize + 1);
            cnf.assume(am_comb_init);
            cnf.assume(am_comb_next);
            cnf.assume(am_part);
            cnf.assume(al_next);

            if conf.enumerate_exploitable {
                report.line(format!(
                    "Enumerate exploitable faults: {}",
                    enumerate_comb_faults.iter().map(|s| s.raw()).join(" ")
                ));
                forbid_faults(&mut cnf, &unroller, &enumerate_comb_faults);
            }

            report.text(format!("  Running solver {solver_iter}: "));
            let check_start = Instant::now();
            let verdict = cnf.check();
            let ms = check_start.elapsed().as_millis();
            match verdict {
                Verdict::Unsat => {
                    report.line(format!("{}.{:03} s -> UNSAT", ms / 1000, ms % 1000));
                    break;
                }
                Verdict::Unknown => {
                    report.line(format!(
                        "{}.{:03} s -> UNKNOWN, cannot refute this budget",
                        ms / 1000,
                        ms % 1000
                    ));
                    break;
                }
                Verdict::Sat => {
                    report.line(format!("{}.{:03} s -> SAT", ms / 1000, ms % 1000));
                }
            }

            for (cycle, faults) in unroller.faults().iter().enumerate() {
                let faulty_sigs: Vec<SignalId> = faults
                    .iter()
                    .filter(|(_, spec)| cnf.value(spec.is_faulted()))
                    .map(|(sig, _)| *sig)
                    .collect();
                debug_assert!(faulty_sigs.len() <= k_f_comb as usize);
                if conf.enumerate_exploitable {
                    enumerate_comb_faults.extend(faulty_sigs.iter().copied());
                }
                let shown = faulty_sigs
                    .iter()
                    .map(|sig| match circuit.bit_name(*sig) {
                        Some(bit) => format!("{} ({})", sig.raw(), bit.name()),
                        None => sig.raw().to_string(),
                    })
                    .join(" ");
                report.line(format!(
                    "  - Faulty comb gates at clock cycle {cycle}: {shown}"
                ));
            }

            let faulty_initial = model_true_indices(&cnf, &partitions_diff[0]);
            debug_assert!(faulty_initial.len() <= k_f_part as usize);
            report.line(format!(
                "  - Faulty partitions (initial): {}",
                describe_partitions(&partitions, &faulty_initial)
            ));

            let faulty_next = model_true_indices(&cnf, &partitions_diff[1]);
            assert!(
                faulty_next.len() > k_faults as usize,
                "witness does not violate the partitioning"
            );
            report.line(format!(
                "  - Faulty partitions (next): {}",
                describe_partitions(&partitions, &faulty_next)
            ));

            if conf.dump_vcd {
                let path = conf
                    .dump_path
                    .join(format!("k-partitions-{stamp}-{solver_iter}.vcd"));
                let res = vcd::dump_vcd(&path, circuit, &cnf, unroller.golden(), unroller.faulty())
                    .and_then(|()| {
                        vcd::write_gtkw_savefile(
                            &path,
                            &faulty_initial,
                            &faulty_next,
                            &partitions,
                            circuit,
                        )
                    });
                if let Err(e) = res {
                    report.line(format!("  VCD dump failed: {e}"));
                }
            }

            if !conf.enumerate_exploitable {
                let removed = merge_witnesses(
                    &[faulty_next],
                    k_faults,
                    &mut partitions,
                    &mut partitions_diff,
                    &mut cnf,
                    &mut rng,
                    report,
                );
                nb_merges += 1;
                report.line(format!(
                    "  Merged: {removed}, Remaining: {}",
                    partitions.len()
                ));
            }
            report.text(partition_info(circuit, &partitions, &conf.interesting_names));
        }

        report.line(format!(
            "  Partitioning finished with {} partitions.",
            partitions.len()
        ));

        if conf.dump_partitioning {
            let path = conf
                .dump_path
                .join(format!("partitioning-{solver_iter}.json"));
            match partitions.write_json(&path) {
                Ok(()) => report.line(format!(
                    "  Write partitioning in file `{}`",
                    path.display()
                )),
                Err(e) => report.line(format!("  Partitioning dump failed: {e}")),
            }
        }
        progress.update(1).unwrap();
    }

    let ms = start.elapsed().as_millis();
    report.line(format!(
        "=> Procedure 1 verification time: {}.{:03} s",
        ms / 1000,
        ms % 1000
    ));
    debug_assert!(partitions.covers(circuit));

    Ok(PartitioningOutcome {
        partitions,
        solver_iters: solver_iter,
        nb_merges,
        exploitable_faults: enumerate_comb_faults,
    })
}

/// Seconds since the epoch, to stamp dump file names
pub(crate) fn unix_stamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Indices whose literal is true in the last model
pub(crate) fn model_true_indices(cnf: &Cnf, lits: &[Lit]) -> Vec<usize> {
    lits.iter()
        .enumerate()
        .filter(|(_, l)| cnf.value(**l))
        .map(|(i, _)| i)
        .collect()
}

/// Partition indices with their register members, for the log
pub(crate) fn describe_partitions(partitions: &PartitionStore, indices: &[usize]) -> String {
    indices
        .iter()
        .map(|idx| {
            format!(
                "{idx} ( {} )",
                partitions.part(*idx).iter().map(|s| s.raw()).join(" ")
            )
        })
        .join(" ")
}

/// Forbid the fault variable of every listed signal, at every cycle where
/// it has a spec. Permanent clauses, as the enumeration only grows.
pub(crate) fn forbid_faults(
    cnf: &mut Cnf,
    unroller: &Unroller,
    signals: &BTreeSet<SignalId>,
) {
    for sig in signals {
        for faults in unroller.faults() {
            if let Some(spec) = faults.get(sig) {
                cnf.add_clause(&[!spec.is_faulted()]);
            }
        }
    }
}

/// Merge the witnessed partition groups, most recent first.
///
/// Each witness is bucketed evenly into `k_faults` groups by a random
/// permutation; the groups become new partitions whose diff variables are
/// the disjunction of their members'. Witnesses naming a partition already
/// merged in this pass are skipped. Returns the number of removed source
/// partitions.
fn merge_witnesses(
    witnesses: &[Vec<usize>],
    k_faults: u32,
    partitions: &mut PartitionStore,
    partitions_diff: &mut [Vec<Lit>; 2],
    cnf: &mut Cnf,
    rng: &mut SmallRng,
    report: &mut Report,
) -> usize {
    let mut removed: BTreeSet<usize> = BTreeSet::new();
    for witness in witnesses.iter().rev() {
        if witness.iter().any(|idx| removed.contains(idx)) {
            continue;
        }
        removed.extend(witness.iter().copied());

        let bucket_size = witness.len() as f64 / k_faults as f64;
        let mut next_bucket = 0.0;
        let mut buckets: Vec<Vec<usize>> = Vec::new();
        let mut pool = witness.clone();
        for fi in 0..witness.len() {
            if fi as f64 >= next_bucket {
                buckets.push(Vec::new());
                next_bucket += bucket_size;
            }
            let chosen = rng.gen_range(0..pool.len());
            buckets.last_mut().unwrap().push(pool.swap_remove(chosen));
        }
        debug_assert!(pool.is_empty());
        debug_assert!(buckets.len() <= k_faults as usize);

        for bucket in buckets {
            let mut merged = BTreeSet::new();
            let mut diffs0 = Vec::new();
            let mut diffs1 = Vec::new();
            for idx in &bucket {
                merged.extend(partitions.part(*idx).iter().copied());
                diffs0.push(partitions_diff[0][*idx]);
                diffs1.push(partitions_diff[1][*idx]);
            }
            report.line(format!("  Merge together : {}", bucket.iter().join(" ")));
            partitions.push(merged);
            let d0 = cnf.or_many(&diffs0);
            partitions_diff[0].push(d0);
            let d1 = cnf.or_many(&diffs1);
            partitions_diff[1].push(d1);
        }
    }

    // Sources out, from the highest index down; the appended merges keep
    // their positions
    partitions.remove_ascending(&removed);
    for diffs in partitions_diff.iter_mut() {
        for idx in removed.iter().rev() {
            diffs.remove(*idx);
        }
    }
    removed.len()
}

/// Forbid cycle-0 divergence of partitions (and faults on gates) whose
/// register fan-out stays within a single partition: they cannot spread to
/// two partitions in one step, so they cannot contribute to a violation.
fn optim_at_least_2_conn_parts(
    circuit: &Circuit,
    partitions: &PartitionStore,
    initial_comb_faults: &BTreeMap<SignalId, FaultSpec>,
    initial_partitions_diff: &[Lit],
    cnf: &mut Cnf,
    report: &mut Report,
) {
    let reg_part = partitions.index_of_reg();

    let mut part_optim = 0;
    for (idx, part) in partitions.parts().iter().enumerate() {
        let mut adjacent: BTreeSet<SignalId> = BTreeSet::new();
        for sig in part {
            adjacent.extend(circuit.conn_regs(*sig).iter().copied());
        }
        if within_one_partition(adjacent.iter().copied(), &reg_part) {
            cnf.add_clause(&[!initial_partitions_diff[idx]]);
            part_optim += 1;
        }
    }
    report.line(format!("  Optimize {part_optim} faults in partitions"));

    let mut comb_optim = 0;
    for (sig, spec) in initial_comb_faults {
        let adjacent = circuit.conn_regs(*sig);
        if within_one_partition(adjacent.iter().copied(), &reg_part) {
            cnf.add_clause(&[!spec.is_faulted()]);
            comb_optim += 1;
        }
    }
    report.line(format!("  Optimize {comb_optim} faults in comb logic"));
}

/// Returns whether all the given registers live in one partition (an empty
/// set counts as one)
fn within_one_partition(
    regs: impl IntoIterator<Item = SignalId>,
    reg_part: &HashMap<SignalId, usize>,
) -> bool {
    let mut first = None;
    for reg in regs {
        let idx = reg_part[&reg];
        match first {
            None => first = Some(idx),
            Some(f) if f != idx => return false,
            _ => (),
        }
    }
    true
}
