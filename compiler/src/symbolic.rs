// symbolic.rs — Index expressions over iteration symbols
//
// A small integer expression language for access-pattern indices. Every
// operation that inspects an expression works on its canonical form: a sum
// of integer-weighted monomials with the constant term last. Sub-terms that
// are not polynomial (floor division or modulo by a non-constant) are kept
// as opaque atoms, so simplification never fails and never loses terms.
//
// Preconditions: none.
// Postconditions: `simplify` is idempotent; `Display` re-parses to the same
//                 canonical expression.
// Failure modes: none (unsupported shapes classify as `IndexShape::Other`).
// Side effects: none.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// An integer index expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Expr {
    Int(i64),
    Sym(String),
    Add(Vec<Expr>),
    Mul(Vec<Expr>),
    Neg(Box<Expr>),
    /// Floor division (rounds toward negative infinity).
    FloorDiv(Box<Expr>, Box<Expr>),
    /// Modulo with the sign of the divisor.
    Mod(Box<Expr>, Box<Expr>),
}

/// Shape of a single index expression relative to a set of iteration symbols.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexShape {
    /// Exactly one iteration symbol.
    Bare(String),
    /// A sum of one linear term in an iteration symbol and a non-zero
    /// constant (`i - 1`, `2*i + 1`). Carries the constant.
    AffineSingle(String, i64),
    /// Anything else: bare products, several symbols, powers, foreign
    /// symbols, constants.
    Other,
}

impl IndexShape {
    /// The iteration symbol this index walks along, if any.
    pub fn symbol(&self) -> Option<&str> {
        match self {
            IndexShape::Bare(s) | IndexShape::AffineSingle(s, _) => Some(s),
            IndexShape::Other => None,
        }
    }
}

impl Expr {
    pub fn sym(name: impl Into<String>) -> Self {
        Expr::Sym(name.into())
    }

    /// Canonical form of this expression.
    pub fn simplify(&self) -> Expr {
        Poly::from_expr(self).into_expr()
    }

    /// All symbols occurring anywhere in the expression.
    pub fn free_symbols(&self) -> BTreeSet<String> {
        let mut symbols = BTreeSet::new();
        self.collect_symbols(&mut symbols);
        symbols
    }

    fn collect_symbols(&self, out: &mut BTreeSet<String>) {
        match self {
            Expr::Int(_) => {}
            Expr::Sym(s) => {
                out.insert(s.clone());
            }
            Expr::Add(terms) | Expr::Mul(terms) => {
                for t in terms {
                    t.collect_symbols(out);
                }
            }
            Expr::Neg(inner) => inner.collect_symbols(out),
            Expr::FloorDiv(a, b) | Expr::Mod(a, b) => {
                a.collect_symbols(out);
                b.collect_symbols(out);
            }
        }
    }

    /// Classify the canonical form against the given iteration symbols.
    pub fn classify(&self, symbols: &BTreeSet<String>) -> IndexShape {
        let poly = Poly::from_expr(self);
        let constant = poly.terms.get(&Vec::new()).copied().unwrap_or(0);
        let mut linear = poly.terms.iter().filter(|(mono, _)| !mono.is_empty());
        let (Some((mono, &coeff)), None) = (linear.next(), linear.next()) else {
            return IndexShape::Other;
        };
        let symbol = match mono.as_slice() {
            [Atom::Sym(s)] if symbols.contains(s) => s.clone(),
            _ => return IndexShape::Other,
        };
        match (coeff, constant) {
            (1, 0) => IndexShape::Bare(symbol),
            (_, 0) => IndexShape::Other,
            (_, c) => IndexShape::AffineSingle(symbol, c),
        }
    }

    /// Replace every occurrence of `symbol` by `value` and simplify.
    pub fn substitute(&self, symbol: &str, value: &Expr) -> Expr {
        let mut map = BTreeMap::new();
        map.insert(symbol.to_string(), value.clone());
        self.substitute_all(&map)
    }

    /// Simultaneous substitution: replacement values are not re-substituted.
    pub fn substitute_all(&self, map: &BTreeMap<String, Expr>) -> Expr {
        self.replace_symbols(map).simplify()
    }

    fn replace_symbols(&self, map: &BTreeMap<String, Expr>) -> Expr {
        match self {
            Expr::Int(_) => self.clone(),
            Expr::Sym(s) => map.get(s).cloned().unwrap_or_else(|| self.clone()),
            Expr::Add(terms) => Expr::Add(terms.iter().map(|t| t.replace_symbols(map)).collect()),
            Expr::Mul(terms) => Expr::Mul(terms.iter().map(|t| t.replace_symbols(map)).collect()),
            Expr::Neg(inner) => Expr::Neg(Box::new(inner.replace_symbols(map))),
            Expr::FloorDiv(a, b) => Expr::FloorDiv(
                Box::new(a.replace_symbols(map)),
                Box::new(b.replace_symbols(map)),
            ),
            Expr::Mod(a, b) => Expr::Mod(
                Box::new(a.replace_symbols(map)),
                Box::new(b.replace_symbols(map)),
            ),
        }
    }

    /// The literal integer this expression reduces to, if any.
    pub fn try_evaluate_to_integer(&self) -> Option<i64> {
        match self.simplify() {
            Expr::Int(n) => Some(n),
            _ => None,
        }
    }

    /// True if the expression is a bare symbol or a non-negative literal.
    fn is_atomic(&self) -> bool {
        matches!(self, Expr::Sym(_)) || matches!(self, Expr::Int(n) if *n >= 0)
    }
}

impl From<i64> for Expr {
    fn from(n: i64) -> Self {
        Expr::Int(n)
    }
}

impl std::ops::Add for Expr {
    type Output = Expr;
    fn add(self, rhs: Expr) -> Expr {
        Expr::Add(vec![self, rhs])
    }
}

impl std::ops::Sub for Expr {
    type Output = Expr;
    fn sub(self, rhs: Expr) -> Expr {
        Expr::Add(vec![self, Expr::Neg(Box::new(rhs))])
    }
}

impl std::ops::Mul for Expr {
    type Output = Expr;
    fn mul(self, rhs: Expr) -> Expr {
        Expr::Mul(vec![self, rhs])
    }
}

impl std::ops::Neg for Expr {
    type Output = Expr;
    fn neg(self) -> Expr {
        Expr::Neg(Box::new(self))
    }
}

// ── Canonical polynomial form ──────────────────────────────────────────────
//
// Index arithmetic is assumed to fit in i64; coefficients wrap rather than
// panic on overflow.

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum Atom {
    Sym(String),
    Opaque(Expr),
}

impl Atom {
    fn into_expr(self) -> Expr {
        match self {
            Atom::Sym(s) => Expr::Sym(s),
            Atom::Opaque(e) => e,
        }
    }
}

/// Sorted product of atoms; the empty monomial is the constant term.
type Monomial = Vec<Atom>;

#[derive(Debug, Clone, Default)]
struct Poly {
    terms: BTreeMap<Monomial, i64>,
}

impl Poly {
    fn constant(c: i64) -> Self {
        let mut p = Poly::default();
        p.add_term(Vec::new(), c);
        p
    }

    fn atom(atom: Atom) -> Self {
        let mut p = Poly::default();
        p.add_term(vec![atom], 1);
        p
    }

    fn add_term(&mut self, mono: Monomial, coeff: i64) {
        let entry = self.terms.entry(mono).or_insert(0);
        *entry = entry.wrapping_add(coeff);
        self.terms.retain(|_, c| *c != 0);
    }

    fn add(mut self, other: Poly) -> Poly {
        for (mono, coeff) in other.terms {
            self.add_term(mono, coeff);
        }
        self
    }

    fn scale(self, k: i64) -> Poly {
        let mut out = Poly::default();
        for (mono, coeff) in self.terms {
            out.add_term(mono, coeff.wrapping_mul(k));
        }
        out
    }

    fn mul(&self, other: &Poly) -> Poly {
        let mut out = Poly::default();
        for (m1, c1) in &self.terms {
            for (m2, c2) in &other.terms {
                let mut mono: Monomial = m1.iter().chain(m2.iter()).cloned().collect();
                mono.sort();
                out.add_term(mono, c1.wrapping_mul(*c2));
            }
        }
        out
    }

    fn as_constant(&self) -> Option<i64> {
        match self.terms.len() {
            0 => Some(0),
            1 => self.terms.get(&Vec::new()).copied(),
            _ => None,
        }
    }

    fn from_expr(expr: &Expr) -> Poly {
        match expr {
            Expr::Int(n) => Poly::constant(*n),
            Expr::Sym(s) => Poly::atom(Atom::Sym(s.clone())),
            Expr::Add(terms) => terms
                .iter()
                .fold(Poly::default(), |acc, t| acc.add(Poly::from_expr(t))),
            Expr::Mul(factors) => factors
                .iter()
                .fold(Poly::constant(1), |acc, f| acc.mul(&Poly::from_expr(f))),
            Expr::Neg(inner) => Poly::from_expr(inner).scale(-1),
            Expr::FloorDiv(a, b) => {
                let (pa, pb) = (Poly::from_expr(a), Poly::from_expr(b));
                match (pa.as_constant(), pb.as_constant()) {
                    (_, Some(1)) => pa,
                    (Some(x), Some(y)) if y != 0 => Poly::constant(floor_div(x, y)),
                    _ => Poly::atom(Atom::Opaque(Expr::FloorDiv(
                        Box::new(pa.into_expr()),
                        Box::new(pb.into_expr()),
                    ))),
                }
            }
            Expr::Mod(a, b) => {
                let (pa, pb) = (Poly::from_expr(a), Poly::from_expr(b));
                match (pa.as_constant(), pb.as_constant()) {
                    (_, Some(1)) => Poly::default(),
                    (Some(x), Some(y)) if y != 0 => Poly::constant(floor_mod(x, y)),
                    _ => Poly::atom(Atom::Opaque(Expr::Mod(
                        Box::new(pa.into_expr()),
                        Box::new(pb.into_expr()),
                    ))),
                }
            }
        }
    }

    fn into_expr(self) -> Expr {
        let mut constant = 0;
        let mut terms = Vec::new();
        for (mono, coeff) in self.terms {
            if mono.is_empty() {
                constant = coeff;
                continue;
            }
            let mut factors: Vec<Expr> = mono.into_iter().map(Atom::into_expr).collect();
            if coeff != 1 {
                factors.insert(0, Expr::Int(coeff));
            }
            terms.push(if factors.len() == 1 {
                factors.remove(0)
            } else {
                Expr::Mul(factors)
            });
        }
        if constant != 0 || terms.is_empty() {
            terms.push(Expr::Int(constant));
        }
        if terms.len() == 1 {
            terms.remove(0)
        } else {
            Expr::Add(terms)
        }
    }
}

fn floor_div(a: i64, b: i64) -> i64 {
    let q = a.wrapping_div(b);
    if a.wrapping_rem(b) != 0 && ((a < 0) != (b < 0)) {
        q - 1
    } else {
        q
    }
}

fn floor_mod(a: i64, b: i64) -> i64 {
    a.wrapping_sub(b.wrapping_mul(floor_div(a, b)))
}

// ── Display / parsing ──────────────────────────────────────────────────────

/// Leading negative coefficient of a canonical term, split off for printing.
fn split_negative(term: &Expr) -> Option<Expr> {
    match term {
        Expr::Int(n) if *n < 0 => Some(Expr::Int(n.wrapping_neg())),
        Expr::Neg(inner) => Some((**inner).clone()),
        Expr::Mul(factors) => match factors.first() {
            Some(Expr::Int(c)) if *c < 0 => {
                let mut rest = factors[1..].to_vec();
                if *c != -1 {
                    rest.insert(0, Expr::Int(c.wrapping_neg()));
                }
                Some(if rest.len() == 1 {
                    rest.remove(0)
                } else {
                    Expr::Mul(rest)
                })
            }
            _ => None,
        },
        _ => None,
    }
}

fn fmt_factor(f: &mut fmt::Formatter<'_>, e: &Expr) -> fmt::Result {
    match e {
        Expr::Mul(_) => write!(f, "{e}"),
        _ if e.is_atomic() => write!(f, "{e}"),
        _ => write!(f, "({e})"),
    }
}

fn fmt_operand(f: &mut fmt::Formatter<'_>, e: &Expr) -> fmt::Result {
    if e.is_atomic() {
        write!(f, "{e}")
    } else {
        write!(f, "({e})")
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Int(n) => write!(f, "{n}"),
            Expr::Sym(s) => write!(f, "{s}"),
            Expr::Add(terms) => {
                for (i, term) in terms.iter().enumerate() {
                    match (i, split_negative(term)) {
                        (0, _) => match term {
                            Expr::Neg(inner) => {
                                write!(f, "-")?;
                                fmt_operand(f, inner)?;
                            }
                            _ => write!(f, "{term}")?,
                        },
                        (_, Some(magnitude)) => {
                            write!(f, " - ")?;
                            match magnitude {
                                Expr::Add(_) => write!(f, "({magnitude})")?,
                                _ => write!(f, "{magnitude}")?,
                            }
                        }
                        (_, None) => match term {
                            Expr::Add(_) => write!(f, " + ({term})")?,
                            _ => write!(f, " + {term}")?,
                        },
                    }
                }
                Ok(())
            }
            Expr::Mul(factors) => {
                for (i, factor) in factors.iter().enumerate() {
                    if i == 0 {
                        if let Expr::Int(-1) = factor {
                            if factors.len() > 1 {
                                write!(f, "-")?;
                                continue;
                            }
                        }
                        if let Expr::Int(n) = factor {
                            write!(f, "{n}")?;
                            continue;
                        }
                    } else if !(i == 1 && factors[0] == Expr::Int(-1)) {
                        write!(f, "*")?;
                    }
                    fmt_factor(f, factor)?;
                }
                Ok(())
            }
            Expr::Neg(inner) => {
                write!(f, "-")?;
                fmt_operand(f, inner)
            }
            Expr::FloorDiv(a, b) => {
                fmt_operand(f, a)?;
                write!(f, "/")?;
                fmt_operand(f, b)
            }
            Expr::Mod(a, b) => {
                fmt_operand(f, a)?;
                write!(f, "%")?;
                fmt_operand(f, b)
            }
        }
    }
}

/// An index expression failed to parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExprParseError {
    pub source: String,
    pub message: String,
}

impl fmt::Display for ExprParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid expression '{}': {}", self.source, self.message)
    }
}

impl std::error::Error for ExprParseError {}

impl FromStr for Expr {
    type Err = ExprParseError;

    /// Parse and simplify.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        crate::parser::parse_expr(s)
            .into_result()
            .map(|e| e.simplify())
            .map_err(|message| ExprParseError {
                source: s.to_string(),
                message,
            })
    }
}

impl From<Expr> for String {
    fn from(e: Expr) -> String {
        e.to_string()
    }
}

impl TryFrom<String> for Expr {
    type Error = ExprParseError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

// ── Tests ──
