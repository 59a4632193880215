// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! # Composable CRDTs for JSON-like Data
//!
//! This module provides the three conflict-free replicated data types that
//! can be nested to build JSON-shaped documents:
//!
//! - **[`OrMap`]**: an **Observed-Remove Map**, mapping arbitrary keys to
//!   other CRDT values. This is the usual top-level type.
//! - **[`OrArray`]**: an **Observed-Remove Array** with stable positions and
//!   a move operation.
//! - **[`MvReg`]**: a **Multi-Value Register** for primitive values. When
//!   concurrent writes occur, the register holds all conflicting values;
//!   this is the only CRDT that surfaces value conflicts.
//!
//! Children of a collection are held as a [`Node`]: the tagged sum of the
//! three kinds. Unlike value conflicts, *type* conflicts are not
//! representable: joining two non-empty nodes of different kinds, or applying
//! a typed operation to a child of the wrong kind, fails with
//! [`TypeMismatch`]. Writers that disagree on the type of a field are a
//! schema error between the applications involved, not a state the engine
//! will hold.
use crate::{causal_context::CausalContext, dotstores::DotStore};
use std::{error, fmt};

pub mod mvreg;
pub mod orarray;
pub mod ormap;
pub mod view;

#[cfg(test)]
pub(crate) mod test_util;

use self::{mvreg::MvReg, orarray::OrArray, ormap::OrMap};

/// The kind tag carried by every [`Node`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(::serde::Deserialize, ::serde::Serialize))]
pub enum NodeKind {
    Map,
    Array,
    Register,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NodeKind::Map => "map",
            NodeKind::Array => "array",
            NodeKind::Register => "register",
        })
    }
}

/// Incompatible CRDT kinds were combined.
///
/// Raised when a join meets two non-empty stores of different kinds under the
/// same key, or when a typed operation targets a child of another kind.
/// Fatal within the operation that produced it: no state is mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeMismatch {
    pub expected: NodeKind,
    pub found: NodeKind,
}

impl fmt::Display for TypeMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "type mismatch: expected {}, found {}",
            self.expected, self.found
        )
    }
}

impl error::Error for TypeMismatch {}

/// A value held under a collection key: one of the three CRDT kinds.
///
/// A node of any kind whose store is empty counts as ⊥ and joins with a node
/// of any other kind; collections drop ⊥ children entirely, so the kind of
/// an empty node is never observable.
#[derive(Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(::serde::Deserialize, ::serde::Serialize))]
pub enum Node {
    Map(OrMap<String>),
    Array(OrArray),
    Register(MvReg),
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Map(m) => m.fmt(f),
            Node::Array(a) => a.fmt(f),
            Node::Register(r) => r.fmt(f),
        }
    }
}

impl Default for Node {
    /// The ⊥ node. Its kind is arbitrary since empty nodes join with any
    /// kind and are never stored.
    fn default() -> Self {
        Node::Register(MvReg::default())
    }
}

impl From<OrMap<String>> for Node {
    fn from(value: OrMap<String>) -> Self {
        Self::Map(value)
    }
}

impl From<OrArray> for Node {
    fn from(value: OrArray) -> Self {
        Self::Array(value)
    }
}

impl From<MvReg> for Node {
    fn from(value: MvReg) -> Self {
        Self::Register(value)
    }
}

impl Node {
    /// The kind tag of this node.
    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Map(_) => NodeKind::Map,
            Node::Array(_) => NodeKind::Array,
            Node::Register(_) => NodeKind::Register,
        }
    }

    /// An empty node of the given kind.
    pub fn empty_of(kind: NodeKind) -> Self {
        match kind {
            NodeKind::Map => Node::Map(Default::default()),
            NodeKind::Array => Node::Array(Default::default()),
            NodeKind::Register => Node::Register(Default::default()),
        }
    }

    /// Returns a reference to the contained map.
    ///
    /// Fails with [`TypeMismatch`] if the node is a non-empty node of
    /// another kind.
    pub fn as_map(&self) -> Result<Option<&OrMap<String>>, TypeMismatch> {
        match self {
            Node::Map(m) => Ok(Some(m)),
            n if n.is_bottom() => Ok(None),
            n => Err(TypeMismatch {
                expected: NodeKind::Map,
                found: n.kind(),
            }),
        }
    }

    /// Returns a reference to the contained array.
    ///
    /// Fails with [`TypeMismatch`] if the node is a non-empty node of
    /// another kind.
    pub fn as_array(&self) -> Result<Option<&OrArray>, TypeMismatch> {
        match self {
            Node::Array(a) => Ok(Some(a)),
            n if n.is_bottom() => Ok(None),
            n => Err(TypeMismatch {
                expected: NodeKind::Array,
                found: n.kind(),
            }),
        }
    }

    /// Returns a reference to the contained register.
    ///
    /// Fails with [`TypeMismatch`] if the node is a non-empty node of
    /// another kind.
    pub fn as_register(&self) -> Result<Option<&MvReg>, TypeMismatch> {
        match self {
            Node::Register(r) => Ok(Some(r)),
            n if n.is_bottom() => Ok(None),
            n => Err(TypeMismatch {
                expected: NodeKind::Register,
                found: n.kind(),
            }),
        }
    }
}

impl DotStore for Node {
    fn add_dots_to(&self, other: &mut CausalContext) {
        match self {
            Node::Map(m) => m.add_dots_to(other),
            Node::Array(a) => a.add_dots_to(other),
            Node::Register(r) => r.add_dots_to(other),
        }
    }

    fn is_bottom(&self) -> bool {
        match self {
            Node::Map(m) => m.is_bottom(),
            Node::Array(a) => a.is_bottom(),
            Node::Register(r) => r.is_bottom(),
        }
    }

    fn subset_since(&self, frontier: &CausalContext) -> Self {
        match self {
            Node::Map(m) => Node::Map(m.subset_since(frontier)),
            Node::Array(a) => Node::Array(a.subset_since(frontier)),
            Node::Register(r) => Node::Register(r.subset_since(frontier)),
        }
    }

    fn join(
        (n1, cc1): (Self, &CausalContext),
        (n2, cc2): (Self, &CausalContext),
    ) -> Result<Self, TypeMismatch> {
        match (n1, n2) {
            (Node::Map(m1), Node::Map(m2)) => Ok(Node::Map(OrMap::join((m1, cc1), (m2, cc2))?)),
            (Node::Array(a1), Node::Array(a2)) => {
                Ok(Node::Array(OrArray::join((a1, cc1), (a2, cc2))?))
            }
            (Node::Register(r1), Node::Register(r2)) => {
                Ok(Node::Register(MvReg::join((r1, cc1), (r2, cc2))?))
            }
            // a ⊥ side still participates in the join as an empty store of
            // the other side's kind: its context may tombstone entries
            (n1, n2) if n2.is_bottom() => {
                Node::join((Node::empty_of(n1.kind()), cc2), (n1, cc1))
            }
            (n1, n2) if n1.is_bottom() => {
                Node::join((Node::empty_of(n2.kind()), cc1), (n2, cc2))
            }
            (n1, n2) => Err(TypeMismatch {
                expected: n1.kind(),
                found: n2.kind(),
            }),
        }
    }
}
