// data.rs — Data container descriptors
//
// Every data name referenced by an access node or memlet resolves to a
// descriptor in the program's array table. Only the descriptor kind and
// shape matter to stencil geometry.

use serde::{Deserialize, Serialize};

use crate::subset::Subset;
use crate::symbolic::Expr;

/// Closed set of container kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DescKind {
    Scalar,
    Array,
    /// A reshaped or aliased array.
    View,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataDesc {
    pub kind: DescKind,
    #[serde(default = "scalar_shape")]
    pub shape: Vec<Expr>,
}

fn scalar_shape() -> Vec<Expr> {
    vec![Expr::Int(1)]
}

impl DataDesc {
    pub fn scalar() -> Self {
        DataDesc {
            kind: DescKind::Scalar,
            shape: scalar_shape(),
        }
    }

    pub fn array(shape: Vec<Expr>) -> Self {
        DataDesc {
            kind: DescKind::Array,
            shape,
        }
    }

    pub fn view(shape: Vec<Expr>) -> Self {
        DataDesc {
            kind: DescKind::View,
            shape,
        }
    }

    /// True if every dimension has extent exactly one.
    pub fn is_singleton(&self) -> bool {
        self.shape
            .iter()
            .all(|extent| extent.try_evaluate_to_integer() == Some(1))
    }

    /// The subset covering the whole container.
    pub fn full_subset(&self) -> Subset {
        Subset::full(&self.shape)
    }
}
