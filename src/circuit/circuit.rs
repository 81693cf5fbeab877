//! Circuit representation: cells in topological order, port and register
//! sets, named buses and fan-out adjacency

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt;

use crate::circuit::cell::{Cell, CellKind, CellShape, ClockEdge, classify_cell_type};
use crate::circuit::signal::{BitName, SignalId};
use crate::errors::{Error, Result};
use crate::io::netlist::Module;

/// A gate-level circuit with a single clock domain.
///
/// Cells are kept in topological order with registers first: every
/// combinational cell appears after the cells driving its inputs. The
/// circuit is immutable once built; fan-out adjacency is computed at
/// construction time and shared through an interned pool of signal sets.
#[derive(Debug, Clone)]
pub struct Circuit {
    module_name: String,
    ins: BTreeSet<SignalId>,
    outs: BTreeSet<SignalId>,
    regs: BTreeSet<SignalId>,
    sigs: BTreeSet<SignalId>,
    cells: Vec<Cell>,
    nets: BTreeMap<String, Vec<SignalId>>,
    bit_names: HashMap<SignalId, BitName>,
    clock: Option<(SignalId, ClockEdge)>,
    fanout_pool: Vec<BTreeSet<SignalId>>,
    conn_regs: HashMap<SignalId, usize>,
    conn_outs: HashMap<SignalId, usize>,
    prev_regs: HashMap<SignalId, BTreeSet<SignalId>>,
}

/// Size statistics of a circuit, for the analysis log
#[derive(Debug, Clone, Copy)]
pub struct CircuitStats {
    /// Number of cells
    pub nb_cells: usize,
    /// Number of signals, including the four constants
    pub nb_sigs: usize,
    /// Number of input port bits
    pub nb_ins: usize,
    /// Number of output port bits
    pub nb_outs: usize,
    /// Number of register outputs
    pub nb_regs: usize,
    /// Number of named buses
    pub nb_nets: usize,
}

impl fmt::Display for CircuitStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "******* Circuit stats ********")?;
        writeln!(f, "Cells: {}", self.nb_cells)?;
        writeln!(f, "Signals: {}", self.nb_sigs)?;
        writeln!(f, "Inputs: {}", self.nb_ins)?;
        writeln!(f, "Outputs: {}", self.nb_outs)?;
        writeln!(f, "Registers: {}", self.nb_regs)?;
        writeln!(f, "Nets: {}", self.nb_nets)
    }
}

/// Port-derived sets shared by full-module and subcircuit construction
struct PortSets {
    nets: BTreeMap<String, Vec<SignalId>>,
    bit_names: HashMap<SignalId, BitName>,
    ins: BTreeSet<SignalId>,
    outs: BTreeSet<SignalId>,
}

fn collect_ports(module: &Module) -> Result<PortSets> {
    let mut ports = PortSets {
        nets: BTreeMap::new(),
        bit_names: HashMap::new(),
        ins: BTreeSet::new(),
        outs: BTreeSet::new(),
    };
    for (name, port) in &module.ports {
        if port.direction != "input" && port.direction != "output" {
            return Err(Error::IllegalPortDirection {
                port: name.clone(),
                direction: port.direction.clone(),
            });
        }
        let bits: Vec<SignalId> = port
            .bits
            .iter()
            .map(|b| b.signal())
            .collect::<Result<_>>()?;
        add_bit_names(&mut ports.bit_names, name, &bits);
        let direction_ports = if port.direction == "input" {
            &mut ports.ins
        } else {
            &mut ports.outs
        };
        direction_ports.extend(bits.iter().copied());
        ports.nets.insert(name.clone(), bits);
    }
    Ok(ports)
}

/// Record the smallest name of every bit of a bus
fn add_bit_names(bit_names: &mut HashMap<SignalId, BitName>, name: &str, bits: &[SignalId]) {
    for (pos, sig) in bits.iter().enumerate() {
        let candidate = BitName::new(name, pos as u32);
        match bit_names.get(sig) {
            Some(existing) if *existing <= candidate => (),
            _ => {
                bit_names.insert(*sig, candidate);
            }
        }
    }
}

fn constant_bit_names(bit_names: &mut HashMap<SignalId, BitName>) {
    bit_names.insert(SignalId::S0, BitName::new("constant 0", 0));
    bit_names.insert(SignalId::S1, BitName::new("constant 1", 0));
    bit_names.insert(SignalId::SX, BitName::new("constant x", 0));
    bit_names.insert(SignalId::SZ, BitName::new("constant z", 0));
}

/// Find the single clock signal and edge shared by all registers
fn discover_clock(cells: &[Cell]) -> Result<Option<(SignalId, ClockEdge)>> {
    let mut clock = None;
    let mut found_pos = false;
    let mut found_neg = false;
    for cell in cells {
        let CellKind::Dff { edge, c, .. } = *cell.kind() else {
            continue;
        };
        if c.is_const() {
            return Err(Error::IllegalClockSignal(cell.name().to_string()));
        }
        match clock {
            None => clock = Some(c),
            Some(sig) if sig != c => {
                return Err(Error::MultipleClocks(cell.name().to_string()));
            }
            _ => (),
        }
        match edge {
            ClockEdge::Pos => found_pos = true,
            ClockEdge::Neg => found_neg = true,
        }
    }
    if found_pos && found_neg {
        return Err(Error::MixedClockEdges);
    }
    let edge = if found_neg {
        ClockEdge::Neg
    } else {
        ClockEdge::Pos
    };
    Ok(clock.map(|c| (c, edge)))
}

/// Order the cells topologically, registers first.
///
/// Kahn's algorithm over combinational edges; constants, input ports and
/// register outputs are the initial sources since the register breaks the
/// sequential cycle.
fn topo_order(cells: Vec<Cell>, ins: &BTreeSet<SignalId>) -> Result<Vec<Cell>> {
    let mut defined: HashSet<SignalId> = SignalId::CONSTANTS.into_iter().collect();
    defined.extend(ins.iter().copied());

    let mut order = Vec::with_capacity(cells.len());
    let mut comb = Vec::new();
    for cell in cells {
        if cell.is_register() {
            defined.insert(cell.output());
            order.push(cell);
        } else {
            comb.push(cell);
        }
    }

    let mut consumers: HashMap<SignalId, Vec<usize>> = HashMap::new();
    let mut pending = vec![0usize; comb.len()];
    for (i, cell) in comb.iter().enumerate() {
        let inputs: BTreeSet<SignalId> = cell.inputs().into_iter().collect();
        for sig in inputs {
            if !defined.contains(&sig) {
                consumers.entry(sig).or_default().push(i);
                pending[i] += 1;
            }
        }
    }

    let mut ready: VecDeque<usize> = (0..comb.len()).filter(|&i| pending[i] == 0).collect();
    let mut nb_admitted = 0;
    let no_consumer = Vec::new();
    while let Some(i) = ready.pop_front() {
        nb_admitted += 1;
        for &j in consumers.get(&comb[i].output()).unwrap_or(&no_consumer) {
            pending[j] -= 1;
            if pending[j] == 0 {
                ready.push_back(j);
            }
        }
        order.push(comb[i].clone());
    }
    if nb_admitted != comb.len() {
        return Err(Error::CombinationalLoop(comb.len() - nb_admitted));
    }
    Ok(order)
}

impl Circuit {
    /// Build a circuit from a parsed netlist module
    pub fn from_module(module: &Module, name: &str) -> Result<Circuit> {
        let ports = collect_ports(module)?;
        let mut sigs: BTreeSet<SignalId> = SignalId::CONSTANTS.into_iter().collect();
        sigs.extend(ports.ins.iter().copied());

        let mut bit_names = ports.bit_names;
        let mut nets = ports.nets;
        let mut regs = BTreeSet::new();
        let mut cells = Vec::new();
        let mut missing: BTreeSet<SignalId> = BTreeSet::new();

        for (cell_name, net_cell) in &module.cells {
            if net_cell.ty == "$assert" {
                continue;
            }
            let shape = classify_cell_type(&net_cell.ty).ok_or_else(|| Error::IllegalCellType {
                cell: cell_name.clone(),
                cell_type: net_cell.ty.clone(),
            })?;
            let kind = match shape {
                CellShape::Unary(op) => CellKind::Unary {
                    op,
                    a: net_cell.conn(cell_name, "A")?,
                    y: net_cell.conn(cell_name, "Y")?,
                },
                CellShape::Binary(op) => CellKind::Binary {
                    op,
                    a: net_cell.conn(cell_name, "A")?,
                    b: net_cell.conn(cell_name, "B")?,
                    y: net_cell.conn(cell_name, "Y")?,
                },
                CellShape::Mux => CellKind::Mux {
                    a: net_cell.conn(cell_name, "A")?,
                    b: net_cell.conn(cell_name, "B")?,
                    s: net_cell.conn(cell_name, "S")?,
                    y: net_cell.conn(cell_name, "Y")?,
                },
                CellShape::Dff { edge, has_en, has_rst } => CellKind::Dff {
                    edge,
                    c: net_cell.conn(cell_name, "C")?,
                    d: net_cell.conn(cell_name, "D")?,
                    q: net_cell.conn(cell_name, "Q")?,
                    en: if has_en {
                        Some(net_cell.conn(cell_name, "E")?)
                    } else {
                        None
                    },
                    rst: if has_rst {
                        Some(net_cell.conn(cell_name, "R")?)
                    } else {
                        None
                    },
                },
            };
            let cell = Cell::new(cell_name.clone(), kind)?;
            for sig in cell.inputs() {
                if !sigs.contains(&sig) {
                    missing.insert(sig);
                }
            }
            let y = cell.output();
            if y.is_const() || !sigs.insert(y) {
                return Err(Error::MultipleDrivers(y.raw()));
            }
            missing.remove(&y);
            if cell.is_register() {
                regs.insert(y);
            }
            cells.push(cell);
        }

        if !missing.is_empty() {
            return Err(Error::MissingSignals(
                missing.iter().map(|s| s.raw()).collect(),
            ));
        }
        let undriven: Vec<u32> = ports
            .outs
            .iter()
            .filter(|s| !sigs.contains(s))
            .map(|s| s.raw())
            .collect();
        if !undriven.is_empty() {
            return Err(Error::MissingSignals(undriven));
        }

        let clock = discover_clock(&cells)?;
        let cells = topo_order(cells, &ports.ins)?;

        // Merge the remaining names from the netnames table
        for (net_name, net) in &module.netnames {
            let bits: Vec<SignalId> = net
                .bits
                .iter()
                .map(|b| b.signal())
                .collect::<Result<_>>()?;
            match nets.get(net_name) {
                Some(other) => {
                    if *other != bits {
                        return Err(Error::NameRedeclaration(net_name.clone()));
                    }
                }
                None => {
                    add_bit_names(&mut bit_names, net_name, &bits);
                    nets.insert(net_name.clone(), bits);
                }
            }
        }
        constant_bit_names(&mut bit_names);

        let mut circuit = Circuit {
            module_name: name.to_string(),
            ins: ports.ins,
            outs: ports.outs,
            regs,
            sigs,
            cells,
            nets,
            bit_names,
            clock,
            fanout_pool: Vec::new(),
            conn_regs: HashMap::new(),
            conn_outs: HashMap::new(),
            prev_regs: HashMap::new(),
        };
        circuit.build_adjacency();
        circuit.check();
        Ok(circuit)
    }

    /// Extract the subcircuit behind a declared interface.
    ///
    /// The interface module lists only ports. The cone of influence of the
    /// declared outputs is swept backwards, stopping at declared inputs.
    /// Returns the extracted circuit together with non-fatal warnings
    /// (unreachable declared inputs, external cells reading cone-internal
    /// signals).
    pub fn subcircuit(
        top: &Circuit,
        module: &Module,
        name: &str,
    ) -> Result<(Circuit, Vec<String>)> {
        let ports = collect_ports(module)?;
        let mut warnings = Vec::new();

        let mut visited_sigs: BTreeSet<SignalId> = ports.outs.clone();
        let mut visited_cells: BTreeSet<usize> = BTreeSet::new();
        let mut regs = BTreeSet::new();
        loop {
            let before = visited_sigs.len() + visited_cells.len();
            for (i, cell) in top.cells.iter().enumerate().rev() {
                if visited_cells.contains(&i) {
                    continue;
                }
                let out = cell.output();
                if !visited_sigs.contains(&out) || ports.ins.contains(&out) {
                    continue;
                }
                for sig in cell.inputs() {
                    if top.ins.contains(&sig) && !ports.ins.contains(&sig) {
                        return Err(Error::SubcircuitMissingInput(sig.raw()));
                    }
                    visited_sigs.insert(sig);
                }
                visited_cells.insert(i);
                if cell.is_register() {
                    regs.insert(out);
                }
            }
            if visited_sigs.len() + visited_cells.len() == before {
                break;
            }
        }

        for sig in &ports.ins {
            if !visited_sigs.contains(sig) {
                warnings.push(format!("unconnected input `{}`", sig.raw()));
            }
        }
        for sig in &visited_sigs {
            if sig.is_const() {
                continue;
            }
            if top.outs.contains(sig) && !ports.outs.contains(sig) {
                return Err(Error::SubcircuitImplicitOutput(sig.raw()));
            }
        }
        for (i, cell) in top.cells.iter().enumerate() {
            if visited_cells.contains(&i) {
                continue;
            }
            for sig in cell.inputs() {
                if sig.is_const() || ports.ins.contains(&sig) {
                    continue;
                }
                if visited_sigs.contains(&sig) && !ports.outs.contains(&sig) {
                    warnings.push(format!(
                        "implicit cell connection `{}` on cell `{}`",
                        sig.raw(),
                        cell.name()
                    ));
                }
            }
        }

        let mut sigs: BTreeSet<SignalId> = SignalId::CONSTANTS.into_iter().collect();
        sigs.extend(ports.ins.iter().copied());
        sigs.extend(visited_sigs.iter().copied());

        // The filtered copy preserves the top circuit's order: registers
        // first, combinational cells topologically sorted.
        let cells: Vec<Cell> = top
            .cells
            .iter()
            .enumerate()
            .filter(|(i, _)| visited_cells.contains(i))
            .map(|(_, c)| c.clone())
            .collect();

        let mut nets = ports.nets;
        let mut bit_names = ports.bit_names;
        for (net_name, bits) in &top.nets {
            match nets.get(net_name) {
                Some(other) => {
                    if other != bits {
                        return Err(Error::NameRedeclaration(net_name.clone()));
                    }
                }
                None => {
                    if bits.iter().any(|s| sigs.contains(s)) {
                        add_bit_names(&mut bit_names, net_name, bits);
                        nets.insert(net_name.clone(), bits.clone());
                    }
                }
            }
        }
        constant_bit_names(&mut bit_names);

        let clock = discover_clock(&cells)?;
        let mut circuit = Circuit {
            module_name: name.to_string(),
            ins: ports.ins,
            outs: ports.outs,
            regs,
            sigs,
            cells,
            nets,
            bit_names,
            clock,
            fanout_pool: Vec::new(),
            conn_regs: HashMap::new(),
            conn_outs: HashMap::new(),
            prev_regs: HashMap::new(),
        };
        circuit.build_adjacency();
        circuit.check();
        Ok((circuit, warnings))
    }

    /// Module name this circuit was built from
    pub fn module_name(&self) -> &str {
        &self.module_name
    }

    /// Cells in topological order, registers first
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    /// Input port bits
    pub fn ins(&self) -> &BTreeSet<SignalId> {
        &self.ins
    }

    /// Output port bits
    pub fn outs(&self) -> &BTreeSet<SignalId> {
        &self.outs
    }

    /// Register outputs
    pub fn regs(&self) -> &BTreeSet<SignalId> {
        &self.regs
    }

    /// All signals, including the four constants
    pub fn sigs(&self) -> &BTreeSet<SignalId> {
        &self.sigs
    }

    /// Named buses
    pub fn nets(&self) -> &BTreeMap<String, Vec<SignalId>> {
        &self.nets
    }

    /// Bits of the named bus, if it exists
    pub fn net(&self, name: &str) -> Option<&[SignalId]> {
        self.nets.get(name).map(|v| v.as_slice())
    }

    /// The global clock signal, absent in purely combinational circuits
    pub fn clock(&self) -> Option<SignalId> {
        self.clock.map(|(c, _)| c)
    }

    /// The clock edge all registers trigger on
    pub fn clock_edge(&self) -> Option<ClockEdge> {
        self.clock.map(|(_, e)| e)
    }

    /// Smallest recorded name of a signal
    pub fn bit_name(&self, sig: SignalId) -> Option<&BitName> {
        self.bit_names.get(&sig)
    }

    /// Register outputs whose combinational fan-in transitively contains `sig`
    pub fn conn_regs(&self, sig: SignalId) -> &BTreeSet<SignalId> {
        let idx = self
            .conn_regs
            .get(&sig)
            .unwrap_or_else(|| panic!("no adjacency for signal {sig}"));
        &self.fanout_pool[*idx]
    }

    /// Primary outputs whose combinational fan-in contains `sig`
    pub fn conn_outs(&self, sig: SignalId) -> &BTreeSet<SignalId> {
        let idx = self
            .conn_outs
            .get(&sig)
            .unwrap_or_else(|| panic!("no adjacency for signal {sig}"));
        &self.fanout_pool[*idx]
    }

    /// Register outputs in the combinational fan-in of register `sig`
    pub fn prev_regs(&self, sig: SignalId) -> &BTreeSet<SignalId> {
        assert!(self.regs.contains(&sig), "{sig} is not a register output");
        static EMPTY: BTreeSet<SignalId> = BTreeSet::new();
        self.prev_regs.get(&sig).unwrap_or(&EMPTY)
    }

    /// Size statistics for the log
    pub fn stats(&self) -> CircuitStats {
        CircuitStats {
            nb_cells: self.cells.len(),
            nb_sigs: self.sigs.len(),
            nb_ins: self.ins.len(),
            nb_outs: self.outs.len(),
            nb_regs: self.regs.len(),
            nb_nets: self.nets.len(),
        }
    }

    /// Check consistency of the datastructure
    pub fn check(&self) {
        let mut defined: HashSet<SignalId> = SignalId::CONSTANTS.into_iter().collect();
        defined.extend(self.ins.iter().copied());
        for cell in &self.cells {
            if cell.is_register() {
                defined.insert(cell.output());
            }
        }
        for cell in &self.cells {
            if cell.is_register() {
                continue;
            }
            for sig in cell.inputs() {
                assert!(
                    defined.contains(&sig),
                    "input {sig} of cell `{}` is not defined earlier",
                    cell.name()
                );
            }
            defined.insert(cell.output());
        }
        for sig in &self.outs {
            assert!(self.sigs.contains(sig), "output {sig} is not defined");
        }
    }

    /// Compute `conn_regs`, `conn_outs` and `prev_regs` in one backward
    /// traversal over the topological signal order. Fan-out sets are
    /// hash-consed into a shared pool.
    fn build_adjacency(&mut self) {
        let mut consumers: HashMap<SignalId, Vec<usize>> = HashMap::new();
        for (i, cell) in self.cells.iter().enumerate() {
            let inputs: BTreeSet<SignalId> = cell.inputs().into_iter().collect();
            for sig in inputs {
                consumers.entry(sig).or_default().push(i);
            }
        }

        let mut sig_order: Vec<SignalId> = SignalId::CONSTANTS.into();
        sig_order.extend(self.ins.iter().filter(|s| !s.is_const()));
        sig_order.extend(self.cells.iter().map(|c| c.output()));

        let mut pool: Vec<BTreeSet<SignalId>> = vec![BTreeSet::new()];
        let mut interned: HashMap<BTreeSet<SignalId>, usize> = HashMap::new();
        interned.insert(BTreeSet::new(), 0);
        let mut conn_regs: HashMap<SignalId, usize> = HashMap::new();
        let mut conn_outs: HashMap<SignalId, usize> = HashMap::new();
        let empty = Vec::new();

        for sig in sig_order.iter().rev() {
            let mut reg_set = BTreeSet::new();
            let mut out_set = BTreeSet::new();
            if self.outs.contains(sig) {
                out_set.insert(*sig);
            }
            for &ci in consumers.get(sig).unwrap_or(&empty) {
                let cell = &self.cells[ci];
                if cell.is_register() {
                    reg_set.insert(cell.output());
                } else {
                    let y = cell.output();
                    reg_set.extend(pool[conn_regs[&y]].iter().copied());
                    out_set.extend(pool[conn_outs[&y]].iter().copied());
                }
            }
            let mut intern = |set: BTreeSet<SignalId>| match interned.get(&set) {
                Some(&idx) => idx,
                None => {
                    pool.push(set.clone());
                    interned.insert(set, pool.len() - 1);
                    pool.len() - 1
                }
            };
            conn_regs.insert(*sig, intern(reg_set));
            conn_outs.insert(*sig, intern(out_set));
        }

        let mut prev_regs: HashMap<SignalId, BTreeSet<SignalId>> = HashMap::new();
        for reg in &self.regs {
            for conn in &pool[conn_regs[reg]] {
                prev_regs.entry(*conn).or_default().insert(*reg);
            }
        }

        self.fanout_pool = pool;
        self.conn_regs = conn_regs;
        self.conn_outs = conn_outs;
        self.prev_regs = prev_regs;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::netlist::Document;
    use serde_json::json;

    fn module_from(v: serde_json::Value) -> Module {
        let doc: Document = serde_json::from_value(json!({ "modules": { "top": v } })).unwrap();
        doc.modules["top"].clone()
    }

    /// Two lockstep registers fed by the same buffered input, with an
    /// XOR checker raising `alert` when they disagree.
    fn dual_rail() -> Module {
        module_from(json!({
            "ports": {
                "clk": { "direction": "input", "bits": [2] },
                "d": { "direction": "input", "bits": [4] },
                "alert": { "direction": "output", "bits": [8] }
            },
            "cells": {
                "buf": { "type": "$_BUF_", "connections": { "A": [4], "Y": [5] } },
                "r0": { "type": "$_DFF_P_", "connections": { "C": [2], "D": [5], "Q": [6] } },
                "r1": { "type": "$_DFF_P_", "connections": { "C": [2], "D": [5], "Q": [7] } },
                "chk": { "type": "$_XOR_", "connections": { "A": [6], "B": [7], "Y": [8] } }
            },
            "netnames": {
                "w": { "bits": [5] },
                "r0": { "bits": [6] },
                "r1": { "bits": [7] },
                "alert": { "bits": [8] }
            }
        }))
    }

    fn s(v: u32) -> SignalId {
        SignalId::from_raw(v)
    }

    #[test]
    fn test_load_dual_rail() {
        let circuit = Circuit::from_module(&dual_rail(), "top").unwrap();
        assert_eq!(circuit.cells().len(), 4);
        assert_eq!(circuit.regs().len(), 2);
        assert_eq!(circuit.clock(), Some(s(2)));
        assert_eq!(circuit.clock_edge(), Some(ClockEdge::Pos));
        assert_eq!(circuit.net("w"), Some([s(5)].as_slice()));
        assert_eq!(circuit.bit_name(s(6)).unwrap().name(), "r0");
        let stats = circuit.stats();
        assert_eq!(stats.nb_regs, 2);
        assert_eq!(stats.nb_ins, 2);

        // Registers first, then combinational cells in dependency order
        assert!(circuit.cells()[0].is_register());
        assert!(circuit.cells()[1].is_register());
        circuit.check();
    }

    #[test]
    fn test_adjacency() {
        let circuit = Circuit::from_module(&dual_rail(), "top").unwrap();
        // The buffered wire fans out to both registers
        let conn = circuit.conn_regs(s(5));
        assert_eq!(conn.iter().copied().collect::<Vec<_>>(), vec![s(6), s(7)]);
        // So does the input behind it
        assert_eq!(circuit.conn_regs(s(4)).len(), 2);
        // Register outputs reach the alert output
        assert!(circuit.conn_outs(s(6)).contains(&s(8)));
        assert!(circuit.conn_outs(s(7)).contains(&s(8)));
        // The alert output contains itself
        assert!(circuit.conn_outs(s(8)).contains(&s(8)));
        // No register feeds another register
        assert!(circuit.prev_regs(s(6)).is_empty());
        // The clock fans out to all registers
        assert_eq!(circuit.conn_regs(s(2)).len(), 2);
    }

    #[test]
    fn test_prev_regs_chain() {
        // r0 feeds r1 through a buffer
        let module = module_from(json!({
            "ports": {
                "clk": { "direction": "input", "bits": [2] },
                "d": { "direction": "input", "bits": [4] },
                "o": { "direction": "output", "bits": [7] }
            },
            "cells": {
                "r0": { "type": "$_DFF_P_", "connections": { "C": [2], "D": [4], "Q": [5] } },
                "buf": { "type": "$_BUF_", "connections": { "A": [5], "Y": [6] } },
                "r1": { "type": "$_DFF_P_", "connections": { "C": [2], "D": [6], "Q": [7] } }
            }
        }));
        let circuit = Circuit::from_module(&module, "top").unwrap();
        assert_eq!(
            circuit.conn_regs(s(5)).iter().copied().collect::<Vec<_>>(),
            vec![s(7)]
        );
        assert_eq!(
            circuit.prev_regs(s(7)).iter().copied().collect::<Vec<_>>(),
            vec![s(5)]
        );
        assert!(circuit.prev_regs(s(5)).is_empty());
        assert!(!circuit.conn_outs(s(5)).contains(&s(7)));
        assert!(circuit.conn_outs(s(7)).contains(&s(7)));
    }

    #[test]
    fn test_missing_signal() {
        let module = module_from(json!({
            "ports": { "o": { "direction": "output", "bits": [5] } },
            "cells": {
                "g": { "type": "$_NOT_", "connections": { "A": [4], "Y": [5] } }
            }
        }));
        let res = Circuit::from_module(&module, "top");
        assert!(matches!(res, Err(Error::MissingSignals(v)) if v == vec![4]));
    }

    #[test]
    fn test_illegal_cell_type() {
        let module = module_from(json!({
            "ports": { "a": { "direction": "input", "bits": [4] } },
            "cells": {
                "g": { "type": "$_DLATCH_P_", "connections": { "E": [4], "D": [4], "Q": [5] } }
            }
        }));
        assert!(matches!(
            Circuit::from_module(&module, "top"),
            Err(Error::IllegalCellType { .. })
        ));
    }

    #[test]
    fn test_multiple_clocks() {
        let module = module_from(json!({
            "ports": {
                "c0": { "direction": "input", "bits": [4] },
                "c1": { "direction": "input", "bits": [5] },
                "d": { "direction": "input", "bits": [6] }
            },
            "cells": {
                "r0": { "type": "$_DFF_P_", "connections": { "C": [4], "D": [6], "Q": [7] } },
                "r1": { "type": "$_DFF_P_", "connections": { "C": [5], "D": [6], "Q": [8] } }
            }
        }));
        assert!(matches!(
            Circuit::from_module(&module, "top"),
            Err(Error::MultipleClocks(_))
        ));
    }

    #[test]
    fn test_mixed_edges() {
        let module = module_from(json!({
            "ports": {
                "clk": { "direction": "input", "bits": [2] },
                "d": { "direction": "input", "bits": [4] }
            },
            "cells": {
                "r0": { "type": "$_DFF_P_", "connections": { "C": [2], "D": [4], "Q": [5] } },
                "r1": { "type": "$_DFF_N_", "connections": { "C": [2], "D": [4], "Q": [6] } }
            }
        }));
        assert!(matches!(
            Circuit::from_module(&module, "top"),
            Err(Error::MixedClockEdges)
        ));
    }

    #[test]
    fn test_constant_clock() {
        let module = module_from(json!({
            "ports": { "d": { "direction": "input", "bits": [4] } },
            "cells": {
                "r0": { "type": "$_DFF_P_", "connections": { "C": ["1"], "D": [4], "Q": [5] } }
            }
        }));
        assert!(matches!(
            Circuit::from_module(&module, "top"),
            Err(Error::IllegalClockSignal(_))
        ));
    }

    #[test]
    fn test_combinational_loop() {
        let module = module_from(json!({
            "ports": { "a": { "direction": "input", "bits": [4] } },
            "cells": {
                "g0": { "type": "$_AND_", "connections": { "A": [4], "B": [6], "Y": [5] } },
                "g1": { "type": "$_NOT_", "connections": { "A": [5], "Y": [6] } }
            }
        }));
        assert!(matches!(
            Circuit::from_module(&module, "top"),
            Err(Error::CombinationalLoop(2))
        ));
    }

    #[test]
    fn test_subcircuit_extraction() {
        let circuit = Circuit::from_module(&dual_rail(), "top").unwrap();
        // Keep only the checker: inputs are the two register outputs
        let iface = module_from(json!({
            "ports": {
                "r0": { "direction": "input", "bits": [6] },
                "r1": { "direction": "input", "bits": [7] },
                "alert": { "direction": "output", "bits": [8] }
            }
        }));
        let (sub, warnings) = Circuit::subcircuit(&circuit, &iface, "checker").unwrap();
        assert_eq!(sub.cells().len(), 1);
        assert!(sub.regs().is_empty());
        assert!(sub.clock().is_none());
        assert!(warnings.is_empty());
        sub.check();
    }

    #[test]
    fn test_subcircuit_missing_input() {
        let circuit = Circuit::from_module(&dual_rail(), "top").unwrap();
        // The cone of `alert` reaches the primary input `d`, undeclared here
        let iface = module_from(json!({
            "ports": {
                "alert": { "direction": "output", "bits": [8] }
            }
        }));
        assert!(matches!(
            Circuit::subcircuit(&circuit, &iface, "bad"),
            Err(Error::SubcircuitMissingInput(_))
        ));
    }

    #[test]
    fn test_subcircuit_implicit_output() {
        // Like dual_rail, but the buffered wire is also a top-level output;
        // a cone containing it must declare it.
        let module = module_from(json!({
            "ports": {
                "clk": { "direction": "input", "bits": [2] },
                "d": { "direction": "input", "bits": [4] },
                "w_out": { "direction": "output", "bits": [5] },
                "alert": { "direction": "output", "bits": [8] }
            },
            "cells": {
                "buf": { "type": "$_BUF_", "connections": { "A": [4], "Y": [5] } },
                "r0": { "type": "$_DFF_P_", "connections": { "C": [2], "D": [5], "Q": [6] } },
                "r1": { "type": "$_DFF_P_", "connections": { "C": [2], "D": [5], "Q": [7] } },
                "chk": { "type": "$_XOR_", "connections": { "A": [6], "B": [7], "Y": [8] } }
            }
        }));
        let circuit = Circuit::from_module(&module, "top").unwrap();
        let iface = module_from(json!({
            "ports": {
                "clk": { "direction": "input", "bits": [2] },
                "d": { "direction": "input", "bits": [4] },
                "alert": { "direction": "output", "bits": [8] }
            }
        }));
        assert!(matches!(
            Circuit::subcircuit(&circuit, &iface, "bad"),
            Err(Error::SubcircuitImplicitOutput(5))
        ));
    }

    #[test]
    fn test_subcircuit_useless_input_warns() {
        let circuit = Circuit::from_module(&dual_rail(), "top").unwrap();
        let iface = module_from(json!({
            "ports": {
                "r0": { "direction": "input", "bits": [6] },
                "r1": { "direction": "input", "bits": [7] },
                "d": { "direction": "input", "bits": [4] },
                "alert": { "direction": "output", "bits": [8] }
            }
        }));
        let (_, warnings) = Circuit::subcircuit(&circuit, &iface, "checker").unwrap();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("unconnected input"));
    }
}
