//! VCD trace and GTKWave savefile writers
//!
//! Each dump shows the model of one SAT witness under three scopes:
//! `golden`, `faulty` and `diff`, the last displaying `x` wherever the two
//! traces disagree.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::circuit::{Circuit, SignalId};
use crate::errors::{Error, Result};
use crate::partition::PartitionStore;
use crate::sat::Cnf;
use crate::unroll::State;

/// Short VCD identifier of a signal; the scope letter is prepended
fn vcd_identifier(sig: SignalId) -> String {
    format!("s{}", sig.raw())
}

/// Net names rewritten for the VCD format: no colons, `$` escaped
fn vcd_name(name: &str) -> String {
    let name = name.replace(':', "_");
    if name.contains('$') {
        format!("\\{name}")
    } else {
        name
    }
}

fn show_diff(out: &mut String, id: &str, val_g: bool, val_f: bool) {
    if val_g != val_f {
        let _ = writeln!(out, "bx d{id}");
    } else {
        let _ = writeln!(out, "b{} d{id}", val_g as u32);
    }
}

/// Write the golden and faulty traces of the last model to a VCD file
pub fn dump_vcd(
    path: &Path,
    circuit: &Circuit,
    cnf: &Cnf,
    golden: &[State],
    faulty: &[State],
) -> Result<()> {
    assert_eq!(golden.len(), faulty.len());
    let mut out = String::new();

    let date = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let _ = writeln!(out, "$date\n\t{date}\n$end");
    let _ = writeln!(out, "$version\n\tk-partitions fault analysis\n$end");
    let _ = writeln!(out, "$timescale\n\t1ps\n$end");

    // One identifier per named bit, excluding the clock which is rendered
    // as an explicit waveform
    let mut signals: BTreeMap<SignalId, String> = BTreeMap::new();
    let mut scope_data: Vec<(String, String, usize)> = Vec::new();
    for (name, bits) in circuit.nets() {
        let name = vcd_name(name);
        for (pos, sig) in bits.iter().enumerate().rev() {
            let id = vcd_identifier(*sig);
            signals.entry(*sig).or_insert_with(|| id.clone());
            scope_data.push((id, name.clone(), pos));
        }
    }
    let clock = circuit.clock();
    if let Some(clk) = clock {
        signals.remove(&clk);
    }

    for (scope, letter) in [("golden", "g"), ("faulty", "f"), ("diff", "d")] {
        let _ = writeln!(out, "$scope module {scope} $end");
        for (id, name, pos) in &scope_data {
            let _ = writeln!(out, "\t$var wire 1 {letter}{id} {name}[{pos}] $end");
        }
        let _ = writeln!(out, "$upscope $end");
    }
    let _ = writeln!(out, "$enddefinitions $end");

    let mut tick = 0u64;
    for step in 0..golden.len() {
        let _ = writeln!(out, "#{tick}");
        if step == 0 {
            let _ = writeln!(out, "$dumpvars");
        }
        if let Some(clk) = clock {
            let id = vcd_identifier(clk);
            for letter in ["g", "f", "d"] {
                let _ = writeln!(out, "b1 {letter}{id}");
            }
        }
        for (sig, id) in &signals {
            match (golden[step].get(sig), faulty[step].get(sig)) {
                (Some(g), Some(f)) => {
                    let val_g = cnf.value(*g);
                    let val_f = cnf.value(*f);
                    if step == 0 {
                        let _ = writeln!(out, "b{} g{id}", val_g as u32);
                        let _ = writeln!(out, "b{} f{id}", val_f as u32);
                        show_diff(&mut out, id, val_g, val_f);
                    } else {
                        let prev_g = cnf.value(golden[step - 1][sig]);
                        let prev_f = cnf.value(faulty[step - 1][sig]);
                        if val_g != prev_g {
                            let _ = writeln!(out, "b{} g{id}", val_g as u32);
                        }
                        if val_f != prev_f {
                            let _ = writeln!(out, "b{} f{id}", val_f as u32);
                        }
                        if val_g != prev_g || val_f != prev_f {
                            show_diff(&mut out, id, val_g, val_f);
                        }
                    }
                }
                _ => {
                    // Bits of partially included nets carry no value
                    if step == 0 {
                        for letter in ["g", "f", "d"] {
                            let _ = writeln!(out, "bz {letter}{id}");
                        }
                    }
                }
            }
        }
        if step == 0 {
            let _ = writeln!(out, "$end");
        }
        if let Some(clk) = clock {
            let id = vcd_identifier(clk);
            let _ = writeln!(out, "#{}", tick + 500);
            for letter in ["g", "f", "d"] {
                let _ = writeln!(out, "b0 {letter}{id}");
            }
        }
        tick += 1000;
    }
    let _ = writeln!(out, "#{tick}");

    let tmp = path.with_extension("vcd.tmp");
    fs::write(&tmp, out).map_err(|e| Error::io(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| Error::io(path, e))
}

/// Write a GTKWave savefile grouping the members of the faulty partitions
/// next to the VCD dump
pub fn write_gtkw_savefile(
    vcd_path: &Path,
    faulty_initial: &[usize],
    faulty_next: &[usize],
    partitions: &PartitionStore,
    circuit: &Circuit,
) -> Result<()> {
    let mut out = String::new();
    let _ = writeln!(out, "[*] Fault analysis result");
    let basename = vcd_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let _ = writeln!(out, "[dumpfile] \"{basename}\"");

    let open_group_magic = "@800200";
    let close_group_magic = "@1000200";
    let display_binary_magic = "@8";
    for (label, indices) in [("initial faulty", faulty_initial), ("next faulty", faulty_next)] {
        for idx in indices {
            let _ = writeln!(out, "{open_group_magic}\n-{label} {idx}");
            let _ = writeln!(out, "{display_binary_magic}");
            for sig in partitions.part(*idx) {
                if let Some(bit) = circuit.bit_name(*sig) {
                    let _ = writeln!(
                        out,
                        "diff.\\{}[{}]",
                        bit.name().replace(':', "_"),
                        bit.pos()
                    );
                }
            }
            let _ = writeln!(out, "{close_group_magic}\n-{label} {idx}");
        }
    }

    let savefile = vcd_path.with_extension("gtkw");
    fs::write(&savefile, out).map_err(|e| Error::io(savefile, e))
}
