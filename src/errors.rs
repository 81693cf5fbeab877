//! Error taxonomy for configuration, netlist structure and analysis failures

use std::path::PathBuf;

use thiserror::Error;

/// Convenience alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// All recoverable failures surfaced to the command line entry point.
///
/// Internal invariant violations (inconsistent traces, unknown signals in a
/// state map) are bugs and panic with context instead of using this type.
#[derive(Debug, Error)]
pub enum Error {
    /// File could not be read or written
    #[error("cannot access `{}`: {source}", path.display())]
    Io {
        /// Offending path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// File is not valid JSON or does not match the expected shape
    #[error("malformed JSON in `{}`: {source}", path.display())]
    Json {
        /// Offending path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: serde_json::Error,
    },

    /// The configuration file has no entry with the requested name
    #[error("no configuration named `{0}` in the configuration file")]
    MissingConfig(String),

    /// A configuration entry is present but invalid
    #[error("configuration `{entry}`: {reason}")]
    Config {
        /// Name of the configuration entry
        entry: String,
        /// What is wrong with it
        reason: String,
    },

    /// The netlist has no module with the requested name
    #[error("no module named `{0}` in the netlist")]
    MissingModule(String),

    /// A bit entry is a string other than the four constants
    #[error("illegal constant bit `{0}` in the netlist")]
    IllegalConstantBit(String),

    /// A cell uses a type outside the supported gate library
    #[error("illegal cell type `{cell_type}` on cell `{cell}`")]
    IllegalCellType {
        /// Cell instance name
        cell: String,
        /// Unsupported type string
        cell_type: String,
    },

    /// A cell connection references a port the cell type does not have
    #[error("cell `{cell}` has no connection for port `{port}`")]
    MissingConnection {
        /// Cell instance name
        cell: String,
        /// Missing port letter
        port: String,
    },

    /// A cell output is wired back to one of its own inputs
    #[error("cell `{0}` feeds its own output")]
    IllegalCellCycle(String),

    /// Some combinational cells could not be ordered
    #[error("combinational loop: {0} cells cannot be topologically ordered")]
    CombinationalLoop(usize),

    /// Signals are used as cell inputs or outputs but never driven
    #[error("signals used but never defined: {0:?}")]
    MissingSignals(Vec<u32>),

    /// A signal is driven by more than one cell or port
    #[error("signal {0} is driven more than once")]
    MultipleDrivers(u32),

    /// A port direction is neither `input` nor `output`
    #[error("illegal direction `{direction}` on port `{port}`")]
    IllegalPortDirection {
        /// Port name
        port: String,
        /// Offending direction string
        direction: String,
    },

    /// A net name is declared twice with different bits
    #[error("net name `{0}` redeclared with different bits")]
    NameRedeclaration(String),

    /// A register is clocked by a constant signal
    #[error("register `{0}` is clocked by a constant")]
    IllegalClockSignal(String),

    /// A register uses a clock different from the one already discovered
    #[error("register `{0}` uses a second clock signal")]
    MultipleClocks(String),

    /// Registers trigger on both clock edges
    #[error("registers use both clock edges")]
    MixedClockEdges,

    /// A subcircuit cone reaches an undeclared top-module input
    #[error("subcircuit input {0} is fed by an undeclared top-module input")]
    SubcircuitMissingInput(u32),

    /// A top-module output lies inside the subcircuit cone but is undeclared
    #[error("top-module output {0} is inside the subcircuit but not declared")]
    SubcircuitImplicitOutput(u32),

    /// An alert or invariant names a net the circuit does not have
    #[error("no net named `{0}` in the circuit")]
    UnknownNet(String),

    /// A bit pattern does not match the width of its net
    #[error("pattern for net `{net}` has {got} bits, expected {expected}")]
    PatternWidth {
        /// Net name
        net: String,
        /// Width of the net
        expected: usize,
        /// Width of the provided pattern
        got: usize,
    },

    /// An initial partitioning does not cover the register set exactly
    #[error("partition file does not cover the register set exactly: {0}")]
    PartitionCoverage(String),
}

impl Error {
    /// Wrap an I/O error with the path it occurred on
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Error {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    /// Wrap a JSON error with the path it occurred on
    pub fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Error {
        Error::Json {
            path: path.into(),
            source,
        }
    }
}
