//! Signal identifiers and human-readable bit names

use std::fmt;

/// Identifier of a single-bit signal in a circuit.
///
/// Signal identifiers are opaque 32-bit tokens taken from the netlist.
/// The four lowest values are reserved for the constant signals `0`, `1`,
/// `x` and `z`; the latter two evaluate as `0`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct SignalId(u32);

impl SignalId {
    /// Constant zero
    pub const S0: SignalId = SignalId(0);
    /// Constant one
    pub const S1: SignalId = SignalId(1);
    /// Constant x, treated as zero
    pub const SX: SignalId = SignalId(2);
    /// Constant z, treated as zero
    pub const SZ: SignalId = SignalId(3);

    /// The four constant signals
    pub const CONSTANTS: [SignalId; 4] =
        [SignalId::S0, SignalId::S1, SignalId::SX, SignalId::SZ];

    /// Create a signal identifier from its raw netlist value
    pub fn from_raw(v: u32) -> SignalId {
        SignalId(v)
    }

    /// Obtain the raw netlist value
    pub fn raw(self) -> u32 {
        self.0
    }

    /// Returns whether this is one of the four reserved constants
    pub fn is_const(self) -> bool {
        self.0 < 4
    }

    /// Parse a constant bit given as a string in the netlist
    pub fn from_const_str(s: &str) -> Option<SignalId> {
        match s {
            "0" => Some(SignalId::S0),
            "1" => Some(SignalId::S1),
            "x" | "X" => Some(SignalId::SX),
            "z" | "Z" => Some(SignalId::SZ),
            _ => None,
        }
    }
}

impl fmt::Display for SignalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            SignalId::S0 => write!(f, "0"),
            SignalId::S1 => write!(f, "1"),
            SignalId::SX => write!(f, "x"),
            SignalId::SZ => write!(f, "z"),
            SignalId(v) => write!(f, "s{v}"),
        }
    }
}

/// Human-readable name of a single bit: net name, bit position and
/// hierarchy depth.
///
/// A signal may carry several names in the netlist; the smallest one under
/// the ordering below is kept. Names starting with an underscore are
/// synthesis artifacts and sort last, then shallow hierarchy wins, then
/// shorter names.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BitName {
    name: String,
    pos: u32,
    depth: u32,
}

impl BitName {
    /// Create a bit name; the depth is the number of `.`-separated segments
    pub fn new(name: impl Into<String>, pos: u32) -> BitName {
        let name = name.into();
        let depth = name.split('.').count() as u32;
        BitName { name, pos, depth }
    }

    /// Net name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bit position within the net
    pub fn pos(&self) -> u32 {
        self.pos
    }

    /// Hierarchy depth of the net name
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Name and position, as shown in reports
    pub fn display(&self) -> String {
        format!("{} [{}]", self.name, self.pos)
    }
}

impl Ord for BitName {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        let self_art = self.name.starts_with('_');
        let other_art = other.name.starts_with('_');
        self_art
            .cmp(&other_art)
            .then(self.depth.cmp(&other.depth))
            .then(self.name.len().cmp(&other.name.len()))
            .then_with(|| self.name.cmp(&other.name))
            .then(self.pos.cmp(&other.pos))
    }
}

impl PartialOrd for BitName {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constants() {
        assert!(SignalId::S0.is_const());
        assert!(SignalId::SZ.is_const());
        assert!(!SignalId::from_raw(4).is_const());
        assert_eq!(SignalId::from_const_str("0"), Some(SignalId::S0));
        assert_eq!(SignalId::from_const_str("1"), Some(SignalId::S1));
        assert_eq!(SignalId::from_const_str("x"), Some(SignalId::SX));
        assert_eq!(SignalId::from_const_str("z"), Some(SignalId::SZ));
        assert_eq!(SignalId::from_const_str("w"), None);
        assert_eq!(format!("{}", SignalId::from_raw(42)), "s42");
        assert_eq!(format!("{}", SignalId::S1), "1");
    }

    #[test]
    fn test_bit_name_order() {
        // Synthesis artifacts sort last
        assert!(BitName::new("state", 0) < BitName::new("_042_", 0));
        // Shallow hierarchy wins
        assert!(BitName::new("top.r", 0) < BitName::new("top.sub.r", 0));
        // Shorter names win
        assert!(BitName::new("r", 0) < BitName::new("r_copy", 0));
        assert_eq!(BitName::new("a.b.c", 3).depth(), 3);
        assert_eq!(BitName::new("r", 2).display(), "r [2]");
    }
}
