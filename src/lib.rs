//! Verification of k-fault-resistant partitionings
//!
//! This crate checks whether a synchronous gate-level circuit hardened
//! with concurrent error detection resists an adversary injecting up to
//! `k` transient bit-flips per execution. Golden and faulty executions of
//! the circuit are co-encoded into an incremental SAT problem; the engine
//! then either builds a *fault-resistant partitioning* of the register
//! set, or enumerates the fault locations that corrupt a non-alert output
//! within the alert delay.
//!
//! # Usage
//!
//! The command line tool reads one named analysis from a configuration
//! file (see the `config` module for the recognised keys):
//!
//! ```bash
//! k-partitions my_analysis
//! ```
//!
//! Netlists are Yosys-style JSON documents over the usual synthesised
//! gate library: unary and binary gates, multiplexers and D flip-flops
//! with optional enable and reset.
//!
//! # Datastructures
//!
//! [`circuit::Circuit`] keeps cells in topological order with registers
//! first and precomputes, for every signal, the registers and outputs in
//! its combinational fan-out. [`unroll::Unroller`] builds the golden and
//! faulty symbolic traces cycle by cycle, injecting fault variables from
//! [`fault::FaultSpec`]. [`partitioning`] and [`integrity`] implement the
//! two analysis procedures on top of the [`sat::Cnf`] driver, refining a
//! [`partition::PartitionStore`] by merging partitions the solver proves
//! breakable.

#![warn(missing_docs)]

pub mod circuit;
pub mod cmd;
pub mod config;
pub mod errors;
pub mod fault;
pub mod integrity;
pub mod io;
pub mod partition;
pub mod partitioning;
pub mod report;
pub mod sat;
pub mod select;
pub mod unroll;

#[cfg(test)]
pub(crate) mod testutil;

pub use circuit::{Circuit, SignalId};
pub use errors::{Error, Result};
pub use partition::PartitionStore;
