//! Data model of Yosys-style JSON netlists
//!
//! This is a boundary format reader: it maps the JSON document onto plain
//! structs and converts bit entries into [`SignalId`]s, leaving all
//! structural validation to the circuit builder.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::circuit::SignalId;
use crate::errors::{Error, Result};

/// Top-level netlist document
#[derive(Debug, Clone, Deserialize)]
pub struct Document {
    /// Modules by name
    pub modules: BTreeMap<String, Module>,
}

/// One module of the netlist, or a subcircuit interface (ports only)
#[derive(Debug, Clone, Deserialize)]
pub struct Module {
    /// Ports by name
    #[serde(default)]
    pub ports: BTreeMap<String, Port>,
    /// Cells by instance name
    #[serde(default)]
    pub cells: BTreeMap<String, NetCell>,
    /// Named buses by name
    #[serde(default)]
    pub netnames: BTreeMap<String, NetName>,
}

/// A module port: direction and bit list
#[derive(Debug, Clone, Deserialize)]
pub struct Port {
    /// `input` or `output`
    pub direction: String,
    /// One entry per bit
    pub bits: Vec<Bit>,
}

/// A cell entry: type string and per-port bit lists
#[derive(Debug, Clone, Deserialize)]
pub struct NetCell {
    /// Yosys gate-library type, e.g. `$_AND_`
    #[serde(rename = "type")]
    pub ty: String,
    /// Connected bits by port letter
    #[serde(default)]
    pub connections: BTreeMap<String, Vec<Bit>>,
}

/// A named bus
#[derive(Debug, Clone, Deserialize)]
pub struct NetName {
    /// One entry per bit
    pub bits: Vec<Bit>,
}

/// One bit of a port or net: a signal number or a constant string
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Bit {
    /// Signal number
    Id(u32),
    /// Constant `"0"`, `"1"`, `"x"` or `"z"`
    Const(String),
}

impl Bit {
    /// Convert the bit into a signal identifier
    pub fn signal(&self) -> Result<SignalId> {
        match self {
            Bit::Id(v) => Ok(SignalId::from_raw(*v)),
            Bit::Const(s) => {
                SignalId::from_const_str(s).ok_or_else(|| Error::IllegalConstantBit(s.clone()))
            }
        }
    }
}

impl NetCell {
    /// Signal connected to the single-bit port `port`
    pub fn conn(&self, cell_name: &str, port: &str) -> Result<SignalId> {
        let bits = self
            .connections
            .get(port)
            .filter(|bits| !bits.is_empty())
            .ok_or_else(|| Error::MissingConnection {
                cell: cell_name.to_string(),
                port: port.to_string(),
            })?;
        bits[0].signal()
    }
}

/// Read and parse a netlist document
pub fn read_document(path: &Path) -> Result<Document> {
    let data = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    serde_json::from_str(&data).map_err(|e| Error::json(path, e))
}

/// Extract the module with the given name from a document
pub fn select_module<'a>(doc: &'a Document, name: &str) -> Result<&'a Module> {
    doc.modules
        .get(name)
        .ok_or_else(|| Error::MissingModule(name.to_string()))
}
