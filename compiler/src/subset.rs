// subset.rs — Access patterns: per-dimension ranges or point indices
//
// A subset describes which elements of a data container an access edge
// touches. Ranges are inclusive on both ends, matching map ranges.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::symbolic::{Expr, ExprParseError};

/// Inclusive range `start:end:step` over one dimension.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Range {
    pub start: Expr,
    pub end: Expr,
    pub step: Expr,
}

impl Range {
    pub fn new(start: Expr, end: Expr) -> Self {
        Range {
            start,
            end,
            step: Expr::Int(1),
        }
    }

    /// A range covering exactly one index.
    pub fn point(index: Expr) -> Self {
        Range::new(index.clone(), index)
    }

    /// Number of indices covered: `floor((end - start) / step) + 1`.
    pub fn size(&self) -> Expr {
        Expr::Add(vec![
            Expr::FloorDiv(
                Box::new(self.end.clone() - self.start.clone()),
                Box::new(self.step.clone()),
            ),
            Expr::Int(1),
        ])
        .simplify()
    }

    /// True if start and end are provably the same index.
    pub fn is_point(&self) -> bool {
        (self.end.clone() - self.start.clone()).try_evaluate_to_integer() == Some(0)
    }

    fn replace(&mut self, map: &BTreeMap<String, Expr>) {
        self.start = self.start.substitute_all(map);
        self.end = self.end.substitute_all(map);
        self.step = self.step.substitute_all(map);
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.start, self.end)?;
        if self.step != Expr::Int(1) {
            write!(f, ":{}", self.step)?;
        }
        Ok(())
    }
}

/// A range or point access pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Subset {
    /// One inclusive interval per dimension.
    Range(Vec<Range>),
    /// One index expression per dimension.
    Indices(Vec<Expr>),
}

impl Subset {
    /// The whole of a container with the given shape.
    pub fn full(shape: &[Expr]) -> Self {
        Subset::Range(
            shape
                .iter()
                .map(|extent| Range::new(Expr::Int(0), (extent.clone() - Expr::Int(1)).simplify()))
                .collect(),
        )
    }

    pub fn dims(&self) -> usize {
        match self {
            Subset::Range(ranges) => ranges.len(),
            Subset::Indices(indices) => indices.len(),
        }
    }

    /// Total number of elements covered (simplified, possibly symbolic).
    pub fn num_elements(&self) -> Expr {
        match self {
            Subset::Range(ranges) => {
                Expr::Mul(ranges.iter().map(Range::size).collect()).simplify()
            }
            Subset::Indices(_) => Expr::Int(1),
        }
    }

    /// True only if the subset provably covers exactly one element.
    pub fn is_single_point(&self) -> bool {
        self.num_elements().try_evaluate_to_integer() == Some(1)
    }

    /// The smallest index of each dimension.
    pub fn min_element(&self) -> Vec<Expr> {
        match self {
            Subset::Range(ranges) => ranges.iter().map(|r| r.start.clone()).collect(),
            Subset::Indices(indices) => indices.clone(),
        }
    }

    /// Element-wise difference of minimum elements, `self - reference`.
    ///
    /// Returns `None` if the dimensionalities differ.
    pub fn offset_from(&self, reference: &Subset) -> Option<Vec<Expr>> {
        if self.dims() != reference.dims() {
            return None;
        }
        Some(
            self.min_element()
                .into_iter()
                .zip(reference.min_element())
                .map(|(a, b)| (a - b).simplify())
                .collect(),
        )
    }

    /// Substitute symbols in every expression of the subset (simultaneously).
    pub fn replace(&mut self, map: &BTreeMap<String, Expr>) {
        match self {
            Subset::Range(ranges) => {
                for r in ranges {
                    r.replace(map);
                }
            }
            Subset::Indices(indices) => {
                for idx in indices {
                    *idx = idx.substitute_all(map);
                }
            }
        }
    }

    pub fn free_symbols(&self) -> BTreeSet<String> {
        let mut symbols = BTreeSet::new();
        match self {
            Subset::Range(ranges) => {
                for r in ranges {
                    symbols.extend(r.start.free_symbols());
                    symbols.extend(r.end.free_symbols());
                    symbols.extend(r.step.free_symbols());
                }
            }
            Subset::Indices(indices) => {
                for idx in indices {
                    symbols.extend(idx.free_symbols());
                }
            }
        }
        symbols
    }
}

impl fmt::Display for Subset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subset::Range(ranges) => {
                for (i, r) in ranges.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    if r.is_point() && r.step == Expr::Int(1) {
                        write!(f, "{}", r.start)?;
                    } else {
                        write!(f, "{r}")?;
                    }
                }
                Ok(())
            }
            Subset::Indices(indices) => {
                for (i, idx) in indices.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{idx}")?;
                }
                Ok(())
            }
        }
    }
}

// ── Parsing ──

fn simplified_range(r: Range) -> Range {
    Range {
        start: r.start.simplify(),
        end: r.end.simplify(),
        step: r.step.simplify(),
    }
}

impl FromStr for Subset {
    type Err = ExprParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let subset = crate::parser::parse_subset(s)
            .into_result()
            .map_err(|message| ExprParseError {
                source: s.to_string(),
                message,
            })?;
        Ok(match subset {
            Subset::Range(ranges) => Subset::Range(ranges.into_iter().map(simplified_range).collect()),
            Subset::Indices(indices) => {
                Subset::Indices(indices.into_iter().map(|e| e.simplify()).collect())
            }
        })
    }
}

impl FromStr for Range {
    type Err = ExprParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        crate::parser::parse_range(s)
            .into_result()
            .map(simplified_range)
            .map_err(|message| ExprParseError {
                source: s.to_string(),
                message,
            })
    }
}

impl From<Subset> for String {
    fn from(s: Subset) -> String {
        match &s {
            // Keep a one-element range distinguishable from a point index.
            Subset::Range(ranges) if ranges.iter().all(|r| r.is_point() && r.step == Expr::Int(1)) => {
                ranges
                    .iter()
                    .map(|r| r.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            }
            _ => s.to_string(),
        }
    }
}

impl TryFrom<String> for Subset {
    type Error = ExprParseError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Range> for String {
    fn from(r: Range) -> String {
        r.to_string()
    }
}

impl TryFrom<String> for Range {
    type Error = ExprParseError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

// ── Tests ──
