//! The evolving partitioning of the register set

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::Path;

use crate::circuit::{Circuit, SignalId};
use crate::errors::{Error, Result};

/// An ordered sequence of disjoint, non-empty register sets covering the
/// whole register set of a circuit.
///
/// Partitions only ever merge: Procedure 1 removes the merged sources and
/// appends their union, so indices are not stable across merges and any
/// per-partition side tables must be updated in lockstep.
#[derive(Debug, Clone, Default)]
pub struct PartitionStore {
    parts: Vec<BTreeSet<SignalId>>,
}

impl PartitionStore {
    /// One singleton partition per register, ordered by signal id
    pub fn singletons(circuit: &Circuit) -> PartitionStore {
        PartitionStore {
            parts: circuit
                .regs()
                .iter()
                .map(|reg| BTreeSet::from([*reg]))
                .collect(),
        }
    }

    /// Load a partitioning from a JSON object `{ "0": [ids...], ... }`.
    ///
    /// Every register of the circuit must appear in exactly one partition.
    pub fn from_file(circuit: &Circuit, path: &Path) -> Result<PartitionStore> {
        let data = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let entries: BTreeMap<String, Vec<u32>> =
            serde_json::from_str(&data).map_err(|e| Error::json(path, e))?;

        // Numeric key order, so a dumped partitioning reloads as written
        let mut keyed: Vec<(&String, &Vec<u32>)> = entries.iter().collect();
        keyed.sort_by_key(|(k, _)| k.parse::<usize>().unwrap_or(usize::MAX));

        let mut parts = Vec::with_capacity(keyed.len());
        let mut seen: BTreeSet<SignalId> = BTreeSet::new();
        for (key, ids) in keyed {
            if ids.is_empty() {
                return Err(Error::PartitionCoverage(format!(
                    "partition `{key}` is empty"
                )));
            }
            let mut part = BTreeSet::new();
            for id in ids {
                let sig = SignalId::from_raw(*id);
                if !circuit.regs().contains(&sig) {
                    return Err(Error::PartitionCoverage(format!(
                        "signal {id} is not a register output"
                    )));
                }
                if !seen.insert(sig) {
                    return Err(Error::PartitionCoverage(format!(
                        "signal {id} appears twice"
                    )));
                }
                part.insert(sig);
            }
            parts.push(part);
        }
        if seen.len() != circuit.regs().len() {
            return Err(Error::PartitionCoverage(format!(
                "{} of {} registers covered",
                seen.len(),
                circuit.regs().len()
            )));
        }
        Ok(PartitionStore { parts })
    }

    /// Number of partitions
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    /// Returns whether the store is empty (circuit without registers)
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// All partitions, in index order
    pub fn parts(&self) -> &[BTreeSet<SignalId>] {
        &self.parts
    }

    /// The partition at `idx`
    pub fn part(&self, idx: usize) -> &BTreeSet<SignalId> {
        &self.parts[idx]
    }

    /// Append a merged partition
    pub fn push(&mut self, part: BTreeSet<SignalId>) {
        assert!(!part.is_empty(), "empty partition");
        self.parts.push(part);
    }

    /// Remove the partitions at the given indices.
    ///
    /// Removal goes from the highest index down so the remaining indices
    /// stay valid; entries appended after the removed ones are unaffected.
    pub fn remove_ascending(&mut self, indices: &BTreeSet<usize>) {
        for idx in indices.iter().rev() {
            self.parts.remove(*idx);
        }
    }

    /// Map from register to the index of its partition
    pub fn index_of_reg(&self) -> HashMap<SignalId, usize> {
        let mut map = HashMap::new();
        for (idx, part) in self.parts.iter().enumerate() {
            for reg in part {
                map.insert(*reg, idx);
            }
        }
        map
    }

    /// Returns whether the partitions are pairwise disjoint and cover the
    /// register set exactly
    pub fn covers(&self, circuit: &Circuit) -> bool {
        let mut seen = BTreeSet::new();
        for part in &self.parts {
            for reg in part {
                if !seen.insert(*reg) {
                    return false;
                }
            }
        }
        seen == *circuit.regs()
    }

    /// Write the partitioning as JSON, atomically (temp file + rename)
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let mut obj = serde_json::Map::new();
        for (idx, part) in self.parts.iter().enumerate() {
            let ids: Vec<u32> = part.iter().map(|s| s.raw()).collect();
            obj.insert(idx.to_string(), serde_json::json!(ids));
        }
        let data = serde_json::Value::Object(obj).to_string();
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, data).map_err(|e| Error::io(&tmp, e))?;
        fs::rename(&tmp, path).map_err(|e| Error::io(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::dual_rail;

    fn s(v: u32) -> SignalId {
        SignalId::from_raw(v)
    }

    #[test]
    fn test_singletons() {
        let circuit = dual_rail();
        let store = PartitionStore::singletons(&circuit);
        assert_eq!(store.len(), 2);
        assert_eq!(store.part(0), &BTreeSet::from([s(6)]));
        assert_eq!(store.part(1), &BTreeSet::from([s(7)]));
        assert!(store.covers(&circuit));
    }

    #[test]
    fn test_merge_bookkeeping() {
        let circuit = dual_rail();
        let mut store = PartitionStore::singletons(&circuit);
        let merged: BTreeSet<SignalId> = store.part(0).union(store.part(1)).copied().collect();
        store.push(merged);
        store.remove_ascending(&BTreeSet::from([0, 1]));
        assert_eq!(store.len(), 1);
        assert_eq!(store.part(0).len(), 2);
        assert!(store.covers(&circuit));
        assert_eq!(store.index_of_reg()[&s(6)], 0);
        assert_eq!(store.index_of_reg()[&s(7)], 0);
    }

    #[test]
    fn test_json_round_trip() {
        let circuit = dual_rail();
        let store = PartitionStore::singletons(&circuit);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partitioning.json");
        store.write_json(&path).unwrap();
        let reloaded = PartitionStore::from_file(&circuit, &path).unwrap();
        assert_eq!(store.parts(), reloaded.parts());
    }

    #[test]
    fn test_incomplete_coverage_rejected() {
        let circuit = dual_rail();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partitioning.json");

        std::fs::write(&path, r#"{ "0": [6] }"#).unwrap();
        assert!(matches!(
            PartitionStore::from_file(&circuit, &path),
            Err(Error::PartitionCoverage(_))
        ));

        std::fs::write(&path, r#"{ "0": [6, 7], "1": [6] }"#).unwrap();
        assert!(matches!(
            PartitionStore::from_file(&circuit, &path),
            Err(Error::PartitionCoverage(_))
        ));

        std::fs::write(&path, r#"{ "0": [6, 7, 8] }"#).unwrap();
        assert!(matches!(
            PartitionStore::from_file(&circuit, &path),
            Err(Error::PartitionCoverage(_))
        ));
    }
}
