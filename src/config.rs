//! Analysis configuration
//!
//! One JSON file holds several named configurations; the command line
//! selects one by name.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer};

use crate::circuit::SignalId;
use crate::errors::{Error, Result};

/// Which analysis procedures to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum Procedure {
    /// Build the partitioning, then check output integrity
    #[serde(rename = "BOTH")]
    Both,
    /// Only build the fault-resistant partitioning
    #[serde(rename = "P1")]
    P1,
    /// Only check output integrity
    #[serde(rename = "P2")]
    P2,
}

/// Which gates the adversary may fault
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum FaultGates {
    /// Combinational and sequential faults
    #[serde(rename = "ALL")]
    All,
    /// Sequential faults only: combinational budgets are forced to zero
    #[serde(rename = "SEQ")]
    Seq,
}

fn default_true() -> bool {
    true
}

fn default_f_gates() -> FaultGates {
    FaultGates::All
}

fn default_procedure() -> Procedure {
    Procedure::Both
}

/// Bit patterns given as 0/1 arrays in the configuration file
fn de_bit_lists<'de, D>(de: D) -> std::result::Result<BTreeMap<String, Vec<bool>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: BTreeMap<String, Vec<u8>> = Deserialize::deserialize(de)?;
    Ok(raw
        .into_iter()
        .map(|(name, bits)| (name, bits.into_iter().map(|b| b != 0).collect()))
        .collect())
}

/// One named analysis configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Path of the netlist JSON
    pub design_path: PathBuf,
    /// Module to analyse
    pub design_name: String,
    /// Maximal number of faults per execution
    pub k: u32,
    /// Alert delay: number of cycles the checker may take to react
    pub delay: u32,
    /// Directory receiving the log and dumps
    pub dump_path: PathBuf,
    /// Quiescent pattern per alert bus
    #[serde(deserialize_with = "de_bit_lists")]
    pub alert_list: BTreeMap<String, Vec<bool>>,
    /// Golden-trace pattern per bus, asserted at cycle 0
    #[serde(default, deserialize_with = "de_bit_lists")]
    pub invariant_list: BTreeMap<String, Vec<bool>>,
    /// Whether to extract a subcircuit before the analysis
    #[serde(default)]
    pub subcircuit: bool,
    /// Interface JSON of the subcircuit
    #[serde(default)]
    pub subcircuit_interface_path: Option<PathBuf>,
    /// Module name inside the interface JSON
    #[serde(default)]
    pub subcircuit_interface_name: Option<String>,
    /// Seed the partitioning from this file instead of singletons
    #[serde(default)]
    pub initial_partition_path: Option<PathBuf>,
    /// Bus-name prefixes whose bits may be faulted (empty: all signals)
    #[serde(default)]
    pub f_included_prefix: Vec<String>,
    /// Bus-name prefixes whose bits may not be faulted
    #[serde(default)]
    pub f_excluded_prefix: Vec<String>,
    /// Signals that may not be faulted
    #[serde(default)]
    pub f_excluded_signals: Vec<u32>,
    /// Remove the primary inputs from the faultable set
    #[serde(default)]
    pub exclude_inputs: bool,
    /// Faultable gate families
    #[serde(default = "default_f_gates")]
    pub f_gates: FaultGates,
    /// Procedures to run
    #[serde(default = "default_procedure")]
    pub procedure: Procedure,
    /// Iterate the fault budget from 1 to `k` instead of `k` alone
    #[serde(default = "default_true")]
    pub increasing_k: bool,
    /// Prune partitions and gates whose fan-out stays within one partition
    #[serde(default = "default_true")]
    pub optim_atleast2: bool,
    /// Enumerate exploitable faults in Procedure 1 instead of merging
    #[serde(default)]
    pub enumerate_exploitable: bool,
    /// Write a VCD trace per SAT witness
    #[serde(default)]
    pub dump_vcd: bool,
    /// Write the partitioning JSON after each budget configuration
    #[serde(default = "default_true")]
    pub dump_partitioning: bool,
    /// Names counted in the partition info blocks of the log
    #[serde(default)]
    pub interesting_names: Vec<String>,
}

impl Config {
    /// Load the named configuration and prepare its dump directory
    pub fn load(config_file: &Path, name: &str) -> Result<Config> {
        let data = fs::read_to_string(config_file).map_err(|e| Error::io(config_file, e))?;
        let entries: BTreeMap<String, serde_json::Value> =
            serde_json::from_str(&data).map_err(|e| Error::json(config_file, e))?;
        let entry = entries
            .get(name)
            .ok_or_else(|| Error::MissingConfig(name.to_string()))?;
        let config = Self::from_entry(name, entry.clone())?;

        fs::create_dir_all(&config.dump_path).map_err(|e| Error::io(&config.dump_path, e))?;
        fs::copy(config_file, config.dump_path.join("config_file"))
            .map_err(|e| Error::io(config_file, e))?;
        Ok(config)
    }

    /// Parse and validate one configuration entry
    pub fn from_entry(name: &str, entry: serde_json::Value) -> Result<Config> {
        let config: Config =
            serde_json::from_value(entry).map_err(|e| Error::Config {
                entry: name.to_string(),
                reason: e.to_string(),
            })?;
        if config.subcircuit
            && (config.subcircuit_interface_path.is_none()
                || config.subcircuit_interface_name.is_none())
        {
            return Err(Error::Config {
                entry: name.to_string(),
                reason: "subcircuit requires subcircuit_interface_path and \
                         subcircuit_interface_name"
                    .to_string(),
            });
        }
        Ok(config)
    }

    /// Explicitly excluded signals as identifiers
    pub fn excluded_signals(&self) -> Vec<SignalId> {
        self.f_excluded_signals
            .iter()
            .map(|v| SignalId::from_raw(*v))
            .collect()
    }
}
