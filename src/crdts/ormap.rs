// (c) Copyright 2025 Helsing GmbH. All rights reserved.
use super::{Node, NodeKind, TypeMismatch};
use crate::{
    causal_context::{CausalContext, ReplicaId},
    crdts::{mvreg::MvReg, orarray::OrArray},
    dotstores::{CausalStore, DotMap, DotStore},
};
use std::{borrow::Borrow, fmt, hash::Hash};

/// An **Observed-Remove Map**, a map-like CRDT that allows for concurrent
/// creation, updates, and removals of key-value pairs.
///
/// `OrMap` is the most common choice for a top-level CRDT, as it can hold
/// other CRDTs as values, allowing for the creation of nested, JSON-like
/// data structures.
///
/// ## Removal semantics
///
/// A removal erases only the dots its author has observed under the key. An
/// update concurrent with a removal introduces a fresh dot the remover never
/// saw, so the update survives: the well-known **add-wins** bias of
/// observed-remove maps.
///
/// ## Usage
///
/// An `OrMap` is typically wrapped in a [`CausalStore`], which tracks the
/// causal history of operations. Modifications produce a delta, which is
/// then merged back into the state (and shipped to peers).
///
/// ```rust
/// # use jsondelta::{CausalStore, OrMap, MvReg, ReplicaId, crdts::mvreg::RegisterValue};
/// let mut doc: CausalStore<OrMap<String>> = CausalStore::new();
/// let id = ReplicaId::new("a");
///
/// let delta = doc.store.apply_to_register(
///     |reg, cc, id| reg.write(RegisterValue::U64(42), cc, id),
///     "key".into(),
///     &doc.context,
///     &id,
/// ).unwrap();
/// doc = doc.join(delta).unwrap();
///
/// let reg = doc.store.get("key").unwrap().as_register().unwrap().unwrap();
/// assert!(reg == &42u64);
/// ```
#[derive(Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(::serde::Deserialize, ::serde::Serialize))]
pub struct OrMap<K: Hash + Eq = String>(pub(crate) DotMap<K, Node>);

impl<K> Default for OrMap<K>
where
    K: Hash + Eq,
{
    fn default() -> Self {
        Self(Default::default())
    }
}

impl<K> fmt::Debug for OrMap<K>
where
    K: Hash + Eq + fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl<K> DotStore for OrMap<K>
where
    K: Hash + Eq + fmt::Debug + Clone,
{
    fn add_dots_to(&self, other: &mut CausalContext) {
        self.0.add_dots_to(other);
    }

    fn is_bottom(&self) -> bool {
        self.0.is_bottom()
    }

    fn subset_since(&self, frontier: &CausalContext) -> Self {
        Self(self.0.subset_since(frontier))
    }

    fn join(
        (m1, cc1): (Self, &CausalContext),
        (m2, cc2): (Self, &CausalContext),
    ) -> Result<Self, TypeMismatch> {
        Ok(Self(DotMap::join((m1.0, cc1), (m2.0, cc2))?))
    }
}

impl<K> OrMap<K>
where
    K: Hash + Eq,
{
    /// Returns a reference to the element at the given key, if any.
    pub fn get<Q>(&self, key: &Q) -> Option<&Node>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.0.get(key)
    }

    /// Returns the number of elements in this map.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if this map has no elements.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over key-value pairs in this CRDT, in arbitrary order.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = (&K, &Node)> {
        self.0.iter()
    }
}

macro_rules! apply_to_kind {
    ($name:ident, $frag:literal, $variant:ident, $inner:ty) => {
        /// Updates the value at key `k` to be
        #[doc = $frag]
        /// using `o`.
        ///
        /// This is a convenience wrapper around [`OrMap::apply`]; see that
        /// method for details. `o` is passed an empty
        #[doc = $frag]
        /// when the key is currently absent.
        ///
        /// Fails with [`TypeMismatch`] if the key currently holds a
        /// non-empty value of a different kind.
        pub fn $name<O>(
            &self,
            o: O,
            k: K,
            cc: &CausalContext,
            id: &ReplicaId,
        ) -> Result<CausalStore<Self>, TypeMismatch>
        where
            O: FnOnce(&$inner, &CausalContext, &ReplicaId) -> CausalStore<$inner>,
        {
            self.apply(
                move |node, cc, id| {
                    let empty = <$inner>::default();
                    let inner = match node {
                        Some(Node::$variant(v)) => v,
                        Some(n) if !n.is_bottom() => {
                            return Err(TypeMismatch {
                                expected: NodeKind::$variant,
                                found: n.kind(),
                            });
                        }
                        _ => &empty,
                    };
                    Ok(o(inner, cc, id).map_store(Node::$variant))
                },
                k,
                cc,
                id,
            )
        }
    };
}

impl<K> OrMap<K>
where
    K: Hash + Eq + fmt::Debug + Clone,
{
    apply_to_kind!(apply_to_map, "an [`OrMap`]", Map, OrMap<String>);
    apply_to_kind!(apply_to_array, "an [`OrArray`]", Array, OrArray);
    apply_to_kind!(apply_to_register, "an [`MvReg`]", Register, MvReg);

    /// Creates a CRDT that represents `o` applied to the [`Node`] of the
    /// element with key `key`, if any, and written back to that same key.
    ///
    /// `o` is passed `None` if there is currently no value with key `key`,
    /// such as when applying to an empty map or to a delta that doesn't
    /// change the value at `key`.
    ///
    /// # Multiple operations
    ///
    /// Multiple operations within the closure require manual context
    /// management, since each operation needs a context containing the dots
    /// of previous operations. Call `apply` multiple times instead.
    pub fn apply<O>(
        &self,
        o: O,
        key: K,
        cc: &CausalContext,
        id: &ReplicaId,
    ) -> Result<CausalStore<Self>, TypeMismatch>
    where
        O: FnOnce(
            Option<&Node>,
            &CausalContext,
            &ReplicaId,
        ) -> Result<CausalStore<Node>, TypeMismatch>,
    {
        let CausalStore {
            store: new_child,
            context,
        } = o(self.get(&key), cc, id)?;

        let mut ret = Self::default();
        // an empty child is equivalent to absence; its context may still
        // carry removals
        if !new_child.is_bottom() {
            ret.0.insert(key, new_child);
        }

        Ok(CausalStore {
            store: ret,
            context,
        })
    }

    /// Creates a CRDT that represents the removal of the element with key
    /// `k`.
    ///
    /// The removal is represented by a ⊥ store whose context holds every dot
    /// currently observed under `k` at this replica. Upon join, those dots
    /// disappear at peers unless they have newer observations under the key.
    pub fn remove<Q>(&self, k: &Q) -> CausalStore<Self>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let Some(child) = self.0.get(k) else {
            // nothing observed under the key, so there's nothing to erase
            return CausalStore::new();
        };

        CausalStore {
            store: Self::default(),
            context: child.dots(),
        }
    }

    /// Creates a CRDT that represents the erasure of every element of this
    /// map.
    pub fn clear(&self) -> CausalStore<Self> {
        CausalStore {
            store: Self::default(),
            context: self.dots(),
        }
    }
}
