//! Small circuits shared by the test suites

use serde_json::json;

use crate::circuit::Circuit;
use crate::io::netlist::{Document, Module};

/// Parse a module literal
pub fn module_from(v: serde_json::Value) -> Module {
    let doc: Document = serde_json::from_value(json!({ "modules": { "top": v } })).unwrap();
    doc.modules["top"].clone()
}

/// Two lockstep registers fed by the same buffered input, with an XOR
/// checker raising `alert` when they disagree.
///
/// Signals: clk=2, d=4, w=5 (buffered d), r0=6, r1=7, alert=8.
pub fn dual_rail() -> Circuit {
    let module = module_from(json!({
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
    }));
    Circuit::from_module(&module, "top").unwrap()
}

/// One register exposing its state on a non-alert output `o`.
///
/// Signals: clk=2, d=4, r=5, o=6.
pub fn unprotected() -> Circuit {
    let module = module_from(json!({
        "ports": {
            "clk": { "direction": "input", "bits": [2] },
            "d": { "direction": "input", "bits": [4] },
            "o": { "direction": "output", "bits": [6] }
        },
        "cells": {
            "r": { "type": "$_DFF_P_", "connections": { "C": [2], "D": [4], "Q": [5] } },
            "out": { "type": "$_BUF_", "connections": { "A": [5], "Y": [6] } }
        },
        "netnames": {
            "r": { "bits": [5] },
            "o": { "bits": [6] }
        }
    }));
    Circuit::from_module(&module, "top").unwrap()
}

/// Two-stage lockstep pipeline: the input feeds two parallel rails of two
/// registers each, and the checker compares the final stages.
///
/// Signals: clk=2, d=4, w=5, r0=6, r1=7 (first stage), s0=8, s1=9
/// (second stage), alert=10.
pub fn pipeline2() -> Circuit {
    let module = module_from(json!({
        "ports": {
            "clk": { "direction": "input", "bits": [2] },
            "d": { "direction": "input", "bits": [4] },
            "alert": { "direction": "output", "bits": [10] }
        },
        "cells": {
            "buf": { "type": "$_BUF_", "connections": { "A": [4], "Y": [5] } },
            "r0": { "type": "$_DFF_P_", "connections": { "C": [2], "D": [5], "Q": [6] } },
            "r1": { "type": "$_DFF_P_", "connections": { "C": [2], "D": [5], "Q": [7] } },
            "s0": { "type": "$_DFF_P_", "connections": { "C": [2], "D": [6], "Q": [8] } },
            "s1": { "type": "$_DFF_P_", "connections": { "C": [2], "D": [7], "Q": [9] } },
            "chk": { "type": "$_XOR_", "connections": { "A": [8], "B": [9], "Y": [10] } }
        },
        "netnames": {
            "w": { "bits": [5] },
            "stage1": { "bits": [6, 7] },
            "stage2": { "bits": [8, 9] },
            "alert": { "bits": [10] }
        }
    }));
    Circuit::from_module(&module, "top").unwrap()
}

/// Three registers rotating their state, with the bus `cnt` naming all
/// three bits.
///
/// Signals: clk=2, r0=4, r1=5, r2=6.
pub fn counter3() -> Circuit {
    let module = module_from(json!({
        "ports": {
            "clk": { "direction": "input", "bits": [2] },
            "o": { "direction": "output", "bits": [4] }
        },
        "cells": {
            "r0": { "type": "$_DFF_P_", "connections": { "C": [2], "D": [6], "Q": [4] } },
            "r1": { "type": "$_DFF_P_", "connections": { "C": [2], "D": [4], "Q": [5] } },
            "r2": { "type": "$_DFF_P_", "connections": { "C": [2], "D": [5], "Q": [6] } }
        },
        "netnames": {
            "cnt": { "bits": [4, 5, 6] }
        }
    }));
    Circuit::from_module(&module, "top").unwrap()
}
