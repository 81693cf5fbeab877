//! Faultable-signal selection from inclusion and exclusion filters

use std::collections::BTreeSet;

use crate::circuit::{Circuit, SignalId};

/// Compute the set of signals the adversary may fault.
///
/// Exclusions are the bits of every bus whose name starts with one of
/// `excluded_prefix`, the explicitly excluded signals, and the primary
/// inputs when `exclude_inputs` is set. Inclusions are the bits of buses
/// matching `included_prefix`, or every signal when no prefix is given.
/// The result is the inclusion set minus the exclusion set.
pub fn faultable_signals(
    circuit: &Circuit,
    included_prefix: &[String],
    excluded_prefix: &[String],
    excluded_signals: &[SignalId],
    exclude_inputs: bool,
) -> BTreeSet<SignalId> {
    let mut excluded: BTreeSet<SignalId> = excluded_signals.iter().copied().collect();
    for prefix in excluded_prefix {
        for (name, bits) in circuit.nets() {
            if name.starts_with(prefix.as_str()) {
                excluded.extend(bits.iter().copied());
            }
        }
    }
    if exclude_inputs {
        excluded.extend(circuit.ins().iter().copied());
    }

    let mut included: BTreeSet<SignalId> = BTreeSet::new();
    if included_prefix.is_empty() {
        included.extend(circuit.sigs().iter().copied());
    } else {
        for prefix in included_prefix {
            for (name, bits) in circuit.nets() {
                if name.starts_with(prefix.as_str()) {
                    included.extend(bits.iter().copied());
                }
            }
        }
    }

    included.difference(&excluded).copied().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::dual_rail;

    fn s(v: u32) -> SignalId {
        SignalId::from_raw(v)
    }

    #[test]
    fn test_default_is_everything() {
        let circuit = dual_rail();
        let faultable = faultable_signals(&circuit, &[], &[], &[], false);
        assert_eq!(faultable, *circuit.sigs());
    }

    #[test]
    fn test_included_prefix() {
        let circuit = dual_rail();
        let faultable = faultable_signals(
            &circuit,
            &["r".to_string()],
            &[],
            &[],
            false,
        );
        assert_eq!(faultable, BTreeSet::from([s(6), s(7)]));
    }

    #[test]
    fn test_exclusions() {
        let circuit = dual_rail();
        let faultable = faultable_signals(
            &circuit,
            &[],
            &["alert".to_string()],
            &[s(5)],
            true,
        );
        assert!(!faultable.contains(&s(8)));
        assert!(!faultable.contains(&s(5)));
        assert!(!faultable.contains(&s(4)));
        assert!(!faultable.contains(&s(2)));
        assert!(faultable.contains(&s(6)));
        // Exclusion wins over inclusion
        let none = faultable_signals(
            &circuit,
            &["alert".to_string()],
            &["alert".to_string()],
            &[],
            false,
        );
        assert!(none.is_empty());
    }
}
