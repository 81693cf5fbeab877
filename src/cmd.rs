//! Command line interface

use std::collections::BTreeSet;
use std::path::PathBuf;

use clap::Parser;

use crate::circuit::{Circuit, SignalId};
use crate::config::{Config, Procedure};
use crate::errors::{Error, Result};
use crate::integrity::check_output_integrity;
use crate::io::netlist;
use crate::partition::PartitionStore;
use crate::partitioning::build_partitions;
use crate::report::{partition_info, Report};
use crate::select::faultable_signals;

/// Command line arguments
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Name of the configuration entry to run
    #[arg(default_value = "default")]
    pub config_name: String,

    /// Path of the configuration file
    #[arg(long, default_value = "config/config_file.json")]
    pub config_file: PathBuf,
}

impl Cli {
    /// Run the configured analysis end to end
    pub fn run(&self) -> Result<()> {
        let conf = Config::load(&self.config_file, &self.config_name)?;
        let mut report = Report::create(&conf.dump_path)?;

        let doc = netlist::read_document(&conf.design_path)?;
        let module = netlist::select_module(&doc, &conf.design_name)?;
        let mut circuit = Circuit::from_module(module, &conf.design_name)?;

        if conf.subcircuit {
            let iface_path = conf
                .subcircuit_interface_path
                .as_ref()
                .expect("validated by Config");
            let iface_name = conf
                .subcircuit_interface_name
                .as_ref()
                .expect("validated by Config");
            let iface_doc = netlist::read_document(iface_path)?;
            let iface = netlist::select_module(&iface_doc, iface_name)?;
            let (sub, warnings) = Circuit::subcircuit(&circuit, iface, iface_name)?;
            for warning in warnings {
                report.line(format!("Warning subcircuit: {warning}"));
            }
            circuit = sub;
        }
        report.line(format!("Loaded module `{}`", circuit.module_name()));
        report.text(circuit.stats().to_string());

        let partitions = match &conf.initial_partition_path {
            Some(path) => PartitionStore::from_file(&circuit, path)?,
            None => PartitionStore::singletons(&circuit),
        };
        report.text(partition_info(&circuit, &partitions, &conf.interesting_names));

        let mut alert_signals: BTreeSet<SignalId> = BTreeSet::new();
        for name in conf.alert_list.keys() {
            let bits = circuit
                .net(name)
                .ok_or_else(|| Error::UnknownNet(name.clone()))?;
            alert_signals.extend(bits.iter().copied());
        }

        let faultable = faultable_signals(
            &circuit,
            &conf.f_included_prefix,
            &conf.f_excluded_prefix,
            &conf.excluded_signals(),
            conf.exclude_inputs,
        );

        let partitions = if conf.procedure != Procedure::P2 {
            let outcome = build_partitions(
                &circuit,
                &conf,
                partitions,
                &faultable,
                &alert_signals,
                &mut report,
            )?;
            outcome.partitions
        } else {
            partitions
        };

        if conf.procedure != Procedure::P1 {
            check_output_integrity(
                &circuit,
                &conf,
                &partitions,
                &faultable,
                &alert_signals,
                &mut report,
            )?;
        }

        report.flush();
        Ok(())
    }
}
