//! Textual analysis log

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use itertools::Itertools;

use crate::circuit::Circuit;
use crate::errors::{Error, Result};
use crate::partition::PartitionStore;

/// Sink for the analysis log.
///
/// Everything the procedures narrate (solver verdicts, merges, timing)
/// goes through this writer. Failures to write the log are swallowed:
/// they must not abort a running analysis.
pub struct Report {
    out: Box<dyn Write>,
}

impl Report {
    /// Log to `<dump_path>/log`
    pub fn create(dump_path: &Path) -> Result<Report> {
        let path = dump_path.join("log");
        let file = File::create(&path).map_err(|e| Error::io(path, e))?;
        Ok(Report {
            out: Box::new(BufWriter::new(file)),
        })
    }

    /// Log to nowhere
    pub fn sink() -> Report {
        Report {
            out: Box::new(io::sink()),
        }
    }

    /// Write a full line
    pub fn line(&mut self, text: impl AsRef<str>) {
        let _ = writeln!(self.out, "{}", text.as_ref());
    }

    /// Write without a newline, flushed so progress is visible while the
    /// solver runs
    pub fn text(&mut self, text: impl AsRef<str>) {
        let _ = write!(self.out, "{}", text.as_ref());
        let _ = self.out.flush();
    }

    /// Banner introducing a procedure
    pub fn banner(&mut self, title: &str) {
        self.line("");
        self.line("*".repeat(80));
        self.line(format!("{}{}", " ".repeat(20), title));
        self.line("*".repeat(80));
    }

    /// Separator introducing a budget configuration
    pub fn rule(&mut self) {
        self.line("-".repeat(80));
    }

    /// Flush the underlying writer
    pub fn flush(&mut self) {
        let _ = self.out.flush();
    }
}

/// Describe the current partitioning: size, the ten largest partitions,
/// and how often each interesting name occurs in the four largest.
pub fn partition_info(
    circuit: &Circuit,
    partitions: &PartitionStore,
    interesting_names: &[String],
) -> String {
    let mut text = String::new();
    text.push_str("******* Partition info ********\n");
    text.push_str(&format!("Number of partitions: {}\n", partitions.len()));

    let largest: Vec<usize> = (0..partitions.len())
        .sorted_by_key(|idx| std::cmp::Reverse(partitions.part(*idx).len()))
        .take(10)
        .collect();
    text.push_str("Largest partitions: ");
    for idx in &largest {
        text.push_str(&format!("({}: {}) ", idx, partitions.part(*idx).len()));
    }
    text.push('\n');

    if !interesting_names.is_empty() {
        for idx in largest.iter().take(4) {
            text.push_str(&format!("Contents of {idx}: "));
            for name in interesting_names {
                let num_found = partitions
                    .part(*idx)
                    .iter()
                    .filter(|sig| {
                        circuit
                            .bit_name(**sig)
                            .is_some_and(|n| n.display().contains(name.as_str()))
                    })
                    .count();
                text.push_str(&format!("({name}: {num_found}) "));
            }
            text.push('\n');
        }
    }
    text
}
