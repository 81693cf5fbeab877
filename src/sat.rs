//! Thin driver over the incremental SAT solver: literals, Tseitin gadgets,
//! cardinality constraints and assumption handling

use std::fmt;
use std::ops::Not;

use cat_solver::Solver;

/// A boolean literal in DIMACS convention: a non-zero variable index,
/// negative for a complemented variable.
///
/// Variable 1 is pinned true at solver creation, so `TRUE` and `FALSE` are
/// ordinary literals and gadgets need no special casing to stay sound on
/// constant inputs.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Lit(i32);

impl Lit {
    /// The always-true literal
    pub const TRUE: Lit = Lit(1);
    /// The always-false literal
    pub const FALSE: Lit = Lit(-1);

    /// Returns whether this is one of the two constant literals
    pub fn is_const(self) -> bool {
        self.0.abs() == 1
    }

    fn dimacs(self) -> i32 {
        self.0
    }
}

impl Not for Lit {
    type Output = Lit;
    fn not(self) -> Lit {
        Lit(-self.0)
    }
}

impl fmt::Display for Lit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Lit::TRUE => write!(f, "1"),
            Lit::FALSE => write!(f, "0"),
            Lit(v) if v < 0 => write!(f, "!v{}", -v),
            Lit(v) => write!(f, "v{v}"),
        }
    }
}

/// Outcome of a satisfiability check
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Verdict {
    /// A model was found
    Sat,
    /// No model exists under the current assumptions
    Unsat,
    /// The solver gave up; never to be conflated with `Unsat`
    Unknown,
}

/// An incremental CNF context.
///
/// Owns the variable arena, the clause database and the assumption buffer.
/// Permanent clauses accumulate across `check` calls; assumptions are
/// retracted by every call. Each analysis procedure creates its own
/// context.
pub struct Cnf {
    solver: Solver,
    nb_vars: i32,
    nb_clauses: usize,
    assumptions: Vec<i32>,
}

impl Default for Cnf {
    fn default() -> Self {
        Self::new()
    }
}

impl Cnf {
    /// Create a context with the constant variable pinned
    pub fn new() -> Cnf {
        let mut solver = Solver::new();
        solver.add_clause([Lit::TRUE.dimacs()]);
        Cnf {
            solver,
            nb_vars: 1,
            nb_clauses: 1,
            assumptions: Vec::new(),
        }
    }

    /// Allocate a fresh variable
    pub fn new_var(&mut self) -> Lit {
        self.nb_vars += 1;
        Lit(self.nb_vars)
    }

    /// Number of allocated variables
    pub fn nb_vars(&self) -> usize {
        self.nb_vars as usize
    }

    /// Number of posted clauses
    pub fn nb_clauses(&self) -> usize {
        self.nb_clauses
    }

    /// Post a permanent clause
    pub fn add_clause(&mut self, lits: &[Lit]) {
        self.nb_clauses += 1;
        self.solver.add_clause(lits.iter().map(|l| l.dimacs()));
    }

    /// Literal for `a & b`
    pub fn and(&mut self, a: Lit, b: Lit) -> Lit {
        if a == Lit::FALSE || b == Lit::FALSE || a == !b {
            return Lit::FALSE;
        }
        if a == Lit::TRUE || a == b {
            return b;
        }
        if b == Lit::TRUE {
            return a;
        }
        let y = self.new_var();
        self.add_clause(&[a, !y]);
        self.add_clause(&[b, !y]);
        self.add_clause(&[!a, !b, y]);
        y
    }

    /// Literal for `a | b`
    pub fn or(&mut self, a: Lit, b: Lit) -> Lit {
        !self.and(!a, !b)
    }

    /// Literal for `a ^ b`
    pub fn xor(&mut self, a: Lit, b: Lit) -> Lit {
        if a == b {
            return Lit::FALSE;
        }
        if a == !b {
            return Lit::TRUE;
        }
        if a.is_const() {
            return if a == Lit::TRUE { !b } else { b };
        }
        if b.is_const() {
            return if b == Lit::TRUE { !a } else { a };
        }
        let y = self.new_var();
        self.add_clause(&[!a, !b, !y]);
        self.add_clause(&[a, b, !y]);
        self.add_clause(&[!a, b, y]);
        self.add_clause(&[a, !b, y]);
        y
    }

    /// Literal for `s ? b : a`
    pub fn mux(&mut self, s: Lit, a: Lit, b: Lit) -> Lit {
        if s == Lit::TRUE {
            return b;
        }
        if s == Lit::FALSE {
            return a;
        }
        if a == b {
            return a;
        }
        let y = self.new_var();
        self.add_clause(&[!s, !b, y]);
        self.add_clause(&[!s, b, !y]);
        self.add_clause(&[s, !a, y]);
        self.add_clause(&[s, a, !y]);
        // Redundant but useful
        self.add_clause(&[a, b, !y]);
        self.add_clause(&[!a, !b, y]);
        y
    }

    /// Literal for the disjunction of `lits`
    pub fn or_many(&mut self, lits: &[Lit]) -> Lit {
        let lits: Vec<Lit> = lits.iter().copied().filter(|l| *l != Lit::FALSE).collect();
        if lits.contains(&Lit::TRUE) {
            return Lit::TRUE;
        }
        match lits.len() {
            0 => Lit::FALSE,
            1 => lits[0],
            _ => {
                let y = self.new_var();
                for l in &lits {
                    self.add_clause(&[!*l, y]);
                }
                let mut clause = lits;
                clause.push(!y);
                self.add_clause(&clause);
                y
            }
        }
    }

    /// Literal for the conjunction of `lits`
    pub fn and_many(&mut self, lits: &[Lit]) -> Lit {
        let negated: Vec<Lit> = lits.iter().map(|l| !*l).collect();
        !self.or_many(&negated)
    }

    /// Totalizer merge of two sorted counts.
    ///
    /// `a[i]` means "at least i+1 inputs of the left half are true"; the
    /// result follows the same convention over both halves. Both
    /// implication directions are encoded so the outputs can be used for
    /// `at_most` and `at_least` alike.
    fn merge_counts(&mut self, a: &[Lit], b: &[Lit]) -> Vec<Lit> {
        let n = a.len() + b.len();
        let r: Vec<Lit> = (0..n).map(|_| self.new_var()).collect();
        for i in 0..=a.len() {
            for j in 0..=b.len() {
                if i + j >= 1 {
                    // i true on the left and j true on the right make i+j
                    let mut clause = Vec::with_capacity(3);
                    if i > 0 {
                        clause.push(!a[i - 1]);
                    }
                    if j > 0 {
                        clause.push(!b[j - 1]);
                    }
                    clause.push(r[i + j - 1]);
                    self.add_clause(&clause);
                }
                if i + j < n {
                    // fewer than i+1 and j+1 on each side cap the total
                    let mut clause = Vec::with_capacity(3);
                    if i < a.len() {
                        clause.push(a[i]);
                    }
                    if j < b.len() {
                        clause.push(b[j]);
                    }
                    clause.push(!r[i + j]);
                    self.add_clause(&clause);
                }
            }
        }
        r
    }

    /// Sorted unary count of `lits`: output `k` is true iff at least
    /// `k + 1` of the inputs are true
    fn sorted_count(&mut self, lits: &[Lit]) -> Vec<Lit> {
        match lits.len() {
            0 | 1 => lits.to_vec(),
            _ => {
                let (left, right) = lits.split_at(lits.len() / 2);
                let a = self.sorted_count(left);
                let b = self.sorted_count(right);
                self.merge_counts(&a, &b)
            }
        }
    }

    /// Literal implying that at most `k` of `lits` are true.
    ///
    /// The literal may be assumed or used in clauses; assuming it enforces
    /// the bound, and in a model where the bound holds it may be set.
    pub fn at_most(&mut self, lits: &[Lit], k: usize) -> Lit {
        if k >= lits.len() {
            return Lit::TRUE;
        }
        let counts = self.sorted_count(lits);
        !counts[k]
    }

    /// Literal implying that at least `k` of `lits` are true
    pub fn at_least(&mut self, lits: &[Lit], k: usize) -> Lit {
        if k == 0 {
            return Lit::TRUE;
        }
        if k > lits.len() {
            return Lit::FALSE;
        }
        let counts = self.sorted_count(lits);
        counts[k - 1]
    }

    /// Push an assumption for the next `check` call only
    pub fn assume(&mut self, l: Lit) {
        self.assumptions.push(l.dimacs());
    }

    /// Run the solver, consuming the pending assumptions
    pub fn check(&mut self) -> Verdict {
        let res = if self.assumptions.is_empty() {
            self.solver.solve()
        } else {
            let assumptions = std::mem::take(&mut self.assumptions);
            self.solver.solve_with(assumptions.into_iter())
        };
        match res {
            Some(true) => Verdict::Sat,
            Some(false) => Verdict::Unsat,
            None => Verdict::Unknown,
        }
    }

    /// Value of a literal in the last model; unassigned literals read as
    /// false
    pub fn value(&self, l: Lit) -> bool {
        self.solver.value(l.dimacs()).unwrap_or(false)
    }
}
