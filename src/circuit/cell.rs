//! Gate-level cell model: tagged variants with typed port accessors

use crate::circuit::signal::SignalId;
use crate::errors::{Error, Result};

/// Single-input gate operations
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum UnaryOp {
    /// Inverter
    Not,
    /// Buffer
    Buf,
}

/// Two-input gate operations
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum BinaryOp {
    /// And gate
    And,
    /// Or gate
    Or,
    /// Xor gate
    Xor,
    /// Nand gate
    Nand,
    /// Nor gate
    Nor,
    /// Xnor gate
    Xnor,
}

/// Clock edge a flip-flop triggers on
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum ClockEdge {
    /// Rising edge
    Pos,
    /// Falling edge
    Neg,
}

/// Ports of one gate, tagged by gate family.
///
/// Flip-flops record their clock edge polarity; enable and reset are
/// optional and active-high, with reset clearing the state to zero.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum CellKind {
    /// Inverter or buffer: inputs `{A}`, output `Y`
    Unary {
        /// Operation
        op: UnaryOp,
        /// Input
        a: SignalId,
        /// Output
        y: SignalId,
    },
    /// Two-input gate: inputs `{A, B}`, output `Y`
    Binary {
        /// Operation
        op: BinaryOp,
        /// First input
        a: SignalId,
        /// Second input
        b: SignalId,
        /// Output
        y: SignalId,
    },
    /// Multiplexer: output `Y = S ? B : A`
    Mux {
        /// Input selected when `S` is low
        a: SignalId,
        /// Input selected when `S` is high
        b: SignalId,
        /// Select input
        s: SignalId,
        /// Output
        y: SignalId,
    },
    /// D flip-flop family: clock `C`, data `D`, output `Q`,
    /// optional enable `E` and synchronous reset `R`
    Dff {
        /// Clock edge polarity
        edge: ClockEdge,
        /// Clock input
        c: SignalId,
        /// Data input
        d: SignalId,
        /// State output
        q: SignalId,
        /// Optional active-high enable
        en: Option<SignalId>,
        /// Optional active-high synchronous reset to zero
        rst: Option<SignalId>,
    },
}

/// Gate family and operation of a cell type string, before ports are known
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CellShape {
    /// Single-input gate
    Unary(UnaryOp),
    /// Two-input gate
    Binary(BinaryOp),
    /// Multiplexer
    Mux,
    /// Flip-flop with its optional pins
    Dff {
        /// Clock edge polarity
        edge: ClockEdge,
        /// Whether the type has an enable pin
        has_en: bool,
        /// Whether the type has a reset pin
        has_rst: bool,
    },
}

/// Classify a Yosys gate-library type string.
///
/// Returns `None` for unsupported types. `$assert` cells are handled by the
/// caller, which skips them.
pub fn classify_cell_type(ty: &str) -> Option<CellShape> {
    use BinaryOp::*;
    use CellShape::*;
    use UnaryOp::*;
    match ty {
        "$_NOT_" => Some(Unary(Not)),
        "$_BUF_" => Some(Unary(Buf)),
        "$_AND_" => Some(Binary(And)),
        "$_OR_" => Some(Binary(Or)),
        "$_XOR_" => Some(Binary(Xor)),
        "$_NAND_" => Some(Binary(Nand)),
        "$_NOR_" => Some(Binary(Nor)),
        "$_XNOR_" => Some(Binary(Xnor)),
        "$_MUX_" => Some(Mux),
        "$_DFF_P_" => Some(dff(ClockEdge::Pos, false, false)),
        "$_DFF_N_" => Some(dff(ClockEdge::Neg, false, false)),
        "$_DFFE_PP_" => Some(dff(ClockEdge::Pos, true, false)),
        "$_DFFE_NP_" => Some(dff(ClockEdge::Neg, true, false)),
        "$_SDFF_PP0_" => Some(dff(ClockEdge::Pos, false, true)),
        "$_SDFF_NP0_" => Some(dff(ClockEdge::Neg, false, true)),
        "$_SDFFE_PP0P_" => Some(dff(ClockEdge::Pos, true, true)),
        "$_SDFFE_NP0P_" => Some(dff(ClockEdge::Neg, true, true)),
        _ => None,
    }
}

fn dff(edge: ClockEdge, has_en: bool, has_rst: bool) -> CellShape {
    CellShape::Dff {
        edge,
        has_en,
        has_rst,
    }
}

/// One gate instance: its netlist name and typed ports
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Cell {
    name: String,
    kind: CellKind,
}

impl Cell {
    /// Create a cell, rejecting outputs wired back to an input
    pub fn new(name: impl Into<String>, kind: CellKind) -> Result<Cell> {
        let cell = Cell {
            name: name.into(),
            kind,
        };
        if cell.inputs().contains(&cell.output()) {
            return Err(Error::IllegalCellCycle(cell.name));
        }
        Ok(cell)
    }

    /// Netlist instance name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Tagged ports
    pub fn kind(&self) -> &CellKind {
        &self.kind
    }

    /// The single output signal of the cell (`Y`, or `Q` for flip-flops)
    pub fn output(&self) -> SignalId {
        match self.kind {
            CellKind::Unary { y, .. }
            | CellKind::Binary { y, .. }
            | CellKind::Mux { y, .. } => y,
            CellKind::Dff { q, .. } => q,
        }
    }

    /// All input signals, including clock, enable and reset for flip-flops
    pub fn inputs(&self) -> Vec<SignalId> {
        match &self.kind {
            CellKind::Unary { a, .. } => vec![*a],
            CellKind::Binary { a, b, .. } => vec![*a, *b],
            CellKind::Mux { a, b, s, .. } => vec![*a, *b, *s],
            CellKind::Dff { c, d, en, rst, .. } => {
                let mut ins = vec![*c, *d];
                ins.extend(en.iter());
                ins.extend(rst.iter());
                ins
            }
        }
    }

    /// Returns whether the cell is a state element
    pub fn is_register(&self) -> bool {
        matches!(self.kind, CellKind::Dff { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(v: u32) -> SignalId {
        SignalId::from_raw(v)
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify_cell_type("$_NOT_"), Some(CellShape::Unary(UnaryOp::Not)));
        assert_eq!(
            classify_cell_type("$_XNOR_"),
            Some(CellShape::Binary(BinaryOp::Xnor))
        );
        assert_eq!(classify_cell_type("$_MUX_"), Some(CellShape::Mux));
        assert_eq!(
            classify_cell_type("$_DFF_P_"),
            Some(CellShape::Dff {
                edge: ClockEdge::Pos,
                has_en: false,
                has_rst: false
            })
        );
        assert_eq!(
            classify_cell_type("$_DFF_N_"),
            Some(CellShape::Dff {
                edge: ClockEdge::Neg,
                has_en: false,
                has_rst: false
            })
        );
        assert_eq!(
            classify_cell_type("$_SDFFE_PP0P_"),
            Some(CellShape::Dff {
                edge: ClockEdge::Pos,
                has_en: true,
                has_rst: true
            })
        );
        assert_eq!(classify_cell_type("$_DLATCH_P_"), None);
        assert_eq!(classify_cell_type("$add"), None);
    }

    #[test]
    fn test_ports() {
        let and = Cell::new(
            "g0",
            CellKind::Binary {
                op: BinaryOp::And,
                a: s(4),
                b: s(5),
                y: s(6),
            },
        )
        .unwrap();
        assert_eq!(and.output(), s(6));
        assert_eq!(and.inputs(), vec![s(4), s(5)]);
        assert!(!and.is_register());

        let dff = Cell::new(
            "r0",
            CellKind::Dff {
                edge: ClockEdge::Pos,
                c: s(2),
                d: s(4),
                q: s(7),
                en: Some(s(5)),
                rst: None,
            },
        )
        .unwrap();
        assert_eq!(dff.output(), s(7));
        assert_eq!(dff.inputs(), vec![s(2), s(4), s(5)]);
        assert!(dff.is_register());
    }

    #[test]
    fn test_self_cycle() {
        let res = Cell::new(
            "bad",
            CellKind::Unary {
                op: UnaryOp::Not,
                a: s(4),
                y: s(4),
            },
        );
        assert!(matches!(res, Err(Error::IllegalCellCycle(_))));
    }
}
