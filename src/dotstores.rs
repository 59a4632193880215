// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! # Dot Stores
//!
//! This module defines the containers that embed [`Dot`]s into data. A *dot
//! store* holds the data-type-specific state of a delta-based CRDT. Each dot
//! store is paired with a [`CausalContext`], which tracks the set of observed
//! events (dots) across replicas. This pairing, encapsulated in
//! [`CausalStore`], is the unit that operators produce and `join` consumes;
//! deltas and full states have the same shape and are interchangeable.
//!
//! The three variants are:
//!
//! - [`DotFun`]: a map from [`Dot`]s to values, where the set of dots is its
//!   keyset. This backs register CRDTs like [`MvReg`](crate::MvReg).
//! - [`DotFunMap`]: a map from [`Dot`]s to nested dot stores. This backs the
//!   position registers of [`OrArray`](crate::OrArray).
//! - [`DotMap`]: a map from an arbitrary key type to nested dot stores. This
//!   backs [`OrMap`](crate::OrMap) and the element map of
//!   [`OrArray`](crate::OrArray).
//!
//! ## Join
//!
//! The heart of the CRDT logic is [`DotStore::join`]: a commutative,
//! associative, idempotent merge of two store/context pairs. The shared rule
//! across all variants is that a dot survives iff it is present on both
//! sides, or present on one side and *unknown* to the other side's context.
//! Equivalently, a value disappears only when some peer has
//! observed-and-removed it: its dot is in that peer's context but its payload
//! is gone from that peer's store.
use crate::{
    causal_context::{CausalContext, Dot},
    crdts::TypeMismatch,
    create_map, create_map_with_capacity,
};
use smallvec::SmallVec;
use std::{borrow::Borrow, collections::HashMap, fmt, hash::Hash};

/// A [`DotStore`] paired with a [`CausalContext`].
///
/// This is the fundamental state type of the engine. The context must cover
/// every dot that appears anywhere in the store; dots present in the context
/// but absent from the store are tombstones.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(::serde::Deserialize, ::serde::Serialize))]
pub struct CausalStore<DS> {
    /// The data-type-specific information.
    pub store: DS,
    /// The causal context, tracking observed events.
    pub context: CausalContext,
}

impl<DS> Default for CausalStore<DS>
where
    DS: Default,
{
    fn default() -> Self {
        Self {
            store: Default::default(),
            context: Default::default(),
        }
    }
}

impl<DS> CausalStore<DS> {
    /// Constructs a new empty [`CausalStore`].
    pub fn new() -> Self
    where
        DS: Default,
    {
        Self::default()
    }

    /// Constructs a new [`CausalStore`] by applying the given function to the
    /// current store, keeping the causal context as-is.
    pub fn map_store<DS2>(self, m: impl FnOnce(DS) -> DS2) -> CausalStore<DS2> {
        CausalStore {
            store: (m)(self.store),
            context: self.context,
        }
    }
}

impl<DS> CausalStore<DS>
where
    DS: DotStore,
{
    /// Returns true if this is ⊥ (that is, empty).
    ///
    /// ⊥ is the identity of `join`: for any causal store X, X ⊔ ⊥ = X.
    pub fn is_bottom(&self) -> bool {
        self.store.is_bottom() && self.context.is_empty()
    }

    /// Joins the given [`CausalStore`] with this one, and returns the join.
    pub fn join(mut self, other: Self) -> Result<Self, TypeMismatch> {
        self.join_with(other.store, &other.context)?;
        Ok(self)
    }

    /// Joins the given store/context pair into this one.
    ///
    /// Prefer this method when you need to avoid cloning the [`CausalContext`].
    pub fn join_with(&mut self, store: DS, context: &CausalContext) -> Result<(), TypeMismatch> {
        let old_store = std::mem::take(&mut self.store);
        self.store = DS::join((old_store, &self.context), (store, context))?;
        self.context.union(context);
        Ok(())
    }

    /// Returns a delta that inflates a peer whose knowledge is `base` to what
    /// is in `self`.
    ///
    /// The delta keeps only payloads whose dots `base` has not observed, and
    /// carries the context `(self.context - base) ∪ delta.store.dots()`. The
    /// dots of retained payloads must be re-included: sending `self.context -
    /// base` alone would present every already-known payload dot as a
    /// removal.
    ///
    /// Removals of entries whose dot `base` has not observed ride along for
    /// free: the dot is in `self.context - base` with no payload. Removals of
    /// entries `base` already knows introduce no new dot and are therefore
    /// not expressible as a context difference; see
    /// [`deletions_unknown_to`](crate::deletions_unknown_to) for computing
    /// those on the sending side.
    pub fn delta_since(&self, base: &CausalContext) -> CausalStore<DS> {
        let store = self.store.subset_since(base);
        let mut context = &self.context - base;
        store.add_dots_to(&mut context);
        CausalStore { store, context }
    }
}

/// A container for data-type specific information that stores the state of a
/// 𝛿-based CRDT.
pub trait DotStore: Default {
    /// Queries the set of event identifiers (ie, dots) currently stored in
    /// the dot store.
    fn dots(&self) -> CausalContext {
        let mut cc = CausalContext::default();
        self.add_dots_to(&mut cc);
        cc
    }

    /// Adds the set of dots currently stored in the dot store to `other`.
    fn add_dots_to(&self, other: &mut CausalContext);

    /// Returns true if this dot store is ⊥ (ie, empty).
    fn is_bottom(&self) -> bool;

    /// Returns the subtree of `self` whose dots are not known to `frontier`,
    /// plus anything on the path to such a dot.
    fn subset_since(&self, frontier: &CausalContext) -> Self;

    /// Computes the join (⊔) of two store/context pairs.
    ///
    /// Note that for efficiency this does not take [`CausalStore`]s directly,
    /// but owned stores and shared references to the contexts, to avoid
    /// excessive cloning. The caller is responsible for also unioning the
    /// contexts (see [`CausalStore::join_with`]).
    ///
    /// Joining stores of incompatible CRDT kinds (which can only arise under
    /// a [`DotMap`] key holding a [`Node`](crate::Node)) fails with
    /// [`TypeMismatch`]; such a failure leaves no partial state behind.
    fn join(
        ds1: (Self, &CausalContext),
        ds2: (Self, &CausalContext),
    ) -> Result<Self, TypeMismatch>
    where
        Self: Sized;
}

/// A map from [`Dot`] to `V` whose computed dots is its keyset.
///
/// A join of two [`DotFun`]s keeps values that exist in both of the mappings,
/// or that exist in either one of the mappings and are "new" to the other in
/// the sense that they are not in its causal history. In particular, if one
/// side has observed some [`Dot`] that exists in the other, but that [`Dot`]
/// is not present in its own store, then the dot is _not_ preserved (it has
/// been removed).
#[derive(Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(::serde::Deserialize, ::serde::Serialize))]
pub struct DotFun<V> {
    // NOTE: the store is explicitly ordered by dot so that self-healing
    // conflicts arising due to out-of-order delivery can be dealt with by
    // final consumers by just taking the last value among the conflicts.
    state: SmallVec<[(Dot, V); 1]>,
}

impl<V: fmt::Debug> fmt::Debug for DotFun<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

// manual impl because auto-derive'd `Default` requires `V: Default`.
impl<V> Default for DotFun<V> {
    fn default() -> Self {
        Self {
            state: Default::default(),
        }
    }
}

impl<V> DotFun<V> {
    /// Constructs a [`DotFun`] with the given initial capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            state: SmallVec::with_capacity(capacity),
        }
    }

    /// Produces an iterator over the map's keys and values.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = (&Dot, &V)> {
        self.state.iter().map(|(k, v)| (k, v))
    }

    /// Produces an iterator over the map's keys.
    pub fn keys(&self) -> impl ExactSizeIterator<Item = &Dot> + '_ {
        self.state.iter().map(|(k, _)| k)
    }

    /// Produces an iterator over the map's values, in dot order.
    pub fn values(&self) -> impl ExactSizeIterator<Item = &V> + Clone {
        self.state.iter().map(|(_, v)| v)
    }

    /// Returns the number of keys in the map.
    pub fn len(&self) -> usize {
        self.state.len()
    }

    /// Returns true if the map is empty.
    pub fn is_empty(&self) -> bool {
        self.state.is_empty()
    }

    fn get_index(&self, dot: &Dot) -> Option<usize> {
        self.state
            .as_slice()
            .binary_search_by(|(k, _)| k.cmp(dot))
            .ok()
    }

    /// Retrieves the associated value, if any, for the given [`Dot`].
    pub fn get(&self, dot: &Dot) -> Option<&V> {
        self.get_index(dot).map(|idx| &self.state[idx].1)
    }

    /// Returns `true` if the given [`Dot`] has a value in this map.
    pub fn has(&self, dot: &Dot) -> bool {
        self.get_index(dot).is_some()
    }

    /// Associates the value with the given [`Dot`].
    ///
    /// Returns the previous value if any.
    pub fn set(&mut self, dot: Dot, value: V) -> Option<V> {
        if let Some(idx) = self.get_index(&dot) {
            Some(std::mem::replace(&mut self.state[idx].1, value))
        } else {
            let idx = self.state.partition_point(|(d, _)| *d < dot);
            self.state.insert(idx, (dot, value));
            None
        }
    }

    /// Removes and returns the value associated with a [`Dot`], if the dot
    /// exists.
    pub fn remove(&mut self, dot: &Dot) -> Option<V> {
        // as tempting as it may be, we shouldn't use swap_remove here as we
        // want to keep the list sorted
        self.get_index(dot).map(|idx| self.state.remove(idx).1)
    }
}

impl<V> DotStore for DotFun<V>
where
    V: PartialEq + fmt::Debug + Clone,
{
    fn add_dots_to(&self, other: &mut CausalContext) {
        other.insert_dots(self.keys().cloned());
    }

    fn is_bottom(&self) -> bool {
        self.is_empty()
    }

    fn subset_since(&self, frontier: &CausalContext) -> Self {
        Self {
            state: self
                .state
                .iter()
                .filter(|(dot, _)| !frontier.contains(dot))
                .cloned()
                .collect(),
        }
    }

    /// Informally:
    ///  - for dots in both stores, keep the value (dots are unique, so the
    ///    payloads must be identical)
    ///  - for dots in store 1 that haven't been observed by store 2, keep the
    ///    value
    ///  - for dots in store 2 that haven't been observed by store 1, keep the
    ///    value
    ///  - don't keep other dots
    fn join(
        (m1, cc1): (Self, &CausalContext),
        (mut m2, cc2): (Self, &CausalContext),
    ) -> Result<Self, TypeMismatch> {
        let mut res = Self::with_capacity(m1.len().max(m2.len()));
        for (dot, v1) in m1.state {
            if let Some(v2) = m2.remove(&dot) {
                // dots are unique, so these must by implication be identical
                if v1 != v2 {
                    unreachable!("dot {dot:?} carries diverging payloads");
                }
                res.set(dot, v1);
            } else if !cc2.contains(&dot) {
                // m2 hasn't observed the dot, so this can't be a removal
                res.set(dot, v1);
            }
            // otherwise m2 has observed the dot and intentionally dropped the
            // value; don't preserve it
        }

        // m2 has a value m1 does not, and m1 hasn't observed the dot, so it
        // wasn't deleted by m1
        for (dot, v2) in m2.state.into_iter().filter(|(dot, _)| !cc1.contains(dot)) {
            res.set(dot, v2);
        }

        Ok(res)
    }
}

/// A map from [`Dot`] to `V: DotStore`, whose computed dots is its keyset
/// united with the dots of its values.
///
/// The join keeps keys that have not been deleted (as in [`DotFun`]), and
/// recursively joins values of shared keys. Once a root dot is removed it
/// never reappears; removing a root removes its whole subtree by implication.
#[derive(Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(::serde::Deserialize, ::serde::Serialize))]
pub struct DotFunMap<V> {
    state: HashMap<Dot, V, ahash::RandomState>,
}

impl<V: fmt::Debug> fmt::Debug for DotFunMap<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.state.iter()).finish()
    }
}

impl<V> Default for DotFunMap<V> {
    fn default() -> Self {
        Self {
            state: create_map(),
        }
    }
}

impl<V> DotFunMap<V> {
    /// Constructs a [`DotFunMap`] with the given initial capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            state: create_map_with_capacity(capacity),
        }
    }

    /// Produces an iterator over the map's keys and values.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = (&Dot, &V)> {
        self.state.iter()
    }

    /// Produces an iterator over the map's keys.
    pub fn keys(&self) -> impl ExactSizeIterator<Item = &Dot> + '_ {
        self.state.keys()
    }

    /// Produces an iterator over the map's values.
    pub fn values(&self) -> impl ExactSizeIterator<Item = &V> {
        self.state.values()
    }

    /// Returns the number of keys in the map.
    pub fn len(&self) -> usize {
        self.state.len()
    }

    /// Returns true if the map is empty.
    pub fn is_empty(&self) -> bool {
        self.state.is_empty()
    }

    /// Retrieves the associated value, if any, for the given [`Dot`].
    pub fn get(&self, dot: &Dot) -> Option<&V> {
        self.state.get(dot)
    }

    /// Associates the value with the given [`Dot`].
    ///
    /// Returns the previous value if any.
    pub fn set(&mut self, dot: Dot, value: V) -> Option<V> {
        self.state.insert(dot, value)
    }
}

impl<V> DotStore for DotFunMap<V>
where
    V: DotStore + fmt::Debug,
{
    fn add_dots_to(&self, other: &mut CausalContext) {
        other.insert_dots(self.keys().cloned());
        for v in self.values() {
            v.add_dots_to(other);
        }
    }

    fn is_bottom(&self) -> bool {
        self.state.is_empty()
    }

    fn subset_since(&self, frontier: &CausalContext) -> Self {
        let mut delta = Self::with_capacity(self.state.len());
        for (dot, v) in &self.state {
            let delta_v = v.subset_since(frontier);
            if !delta_v.is_bottom() {
                // NOTE: we do not consider whether frontier contains the root
                // dot, since updates can happen _under_ old roots
                delta.state.insert(dot.clone(), delta_v);
            }
        }
        delta
    }

    /// Informally:
    ///  - for root dots in both stores, join the values and keep non-bottoms
    ///  - for root dots in store 1 that haven't been observed by store 2,
    ///    keep the value as-is: since the dot is the key, a side that hasn't
    ///    seen the key dot cannot have seen anything inside its value either
    ///  - for root dots in store 2 that haven't been observed by store 1,
    ///    ditto
    ///  - don't keep other roots; removing a root removes its subtree
    fn join(
        (m1, cc1): (Self, &CausalContext),
        (mut m2, cc2): (Self, &CausalContext),
    ) -> Result<Self, TypeMismatch> {
        let mut res = Self::with_capacity(m1.len().max(m2.len()));
        for (dot, v1) in m1.state {
            if let Some(v2) = m2.state.remove(&dot) {
                let new_v = V::join((v1, cc1), (v2, cc2))?;
                if !new_v.is_bottom() {
                    res.state.insert(dot, new_v);
                }
            } else if !cc2.contains(&dot) {
                res.state.insert(dot, v1);
            }
        }
        for (dot, v2) in m2.state {
            if !cc1.contains(&dot) {
                res.state.insert(dot, v2);
            }
        }
        Ok(res)
    }
}

/// A map from an arbitrary key type to a `V: DotStore`, whose computed dots
/// is the union of the dots of its values.
///
/// All dots in a value's subtree are considered observations of its key. The
/// join applies recursively on each key in either domain and keeps all non-⊥
/// values; an empty child is equivalent to absence, so keys whose children
/// join to ⊥ are removed.
#[derive(Clone)]
#[cfg_attr(feature = "serde", derive(::serde::Deserialize, ::serde::Serialize))]
pub struct DotMap<K, V> {
    #[cfg_attr(
        feature = "serde",
        serde(bound(
            serialize = "K: Hash + Eq + serde::Serialize, V: serde::Serialize",
            deserialize = "K: Hash + Eq + serde::Deserialize<'de>, V: serde::Deserialize<'de>"
        ))
    )]
    state: HashMap<K, V, ahash::RandomState>,
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for DotMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.state.iter()).finish()
    }
}

impl<K, V> Default for DotMap<K, V> {
    fn default() -> Self {
        Self {
            state: create_map(),
        }
    }
}

impl<K, V> PartialEq for DotMap<K, V>
where
    K: Eq + Hash,
    V: PartialEq,
{
    fn eq(&self, other: &Self) -> bool {
        self.state.eq(&other.state)
    }
}

impl<K, V> DotMap<K, V> {
    /// Constructs a [`DotMap`] with the given initial capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            state: create_map_with_capacity(capacity),
        }
    }

    /// Produces an iterator over the map's keys and values.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = (&K, &V)> {
        self.state.iter()
    }

    /// Produces an iterator over the map's keys.
    pub fn keys(&self) -> impl ExactSizeIterator<Item = &K> + '_ {
        self.state.keys()
    }

    /// Produces an iterator over the map's values.
    pub fn values(&self) -> impl ExactSizeIterator<Item = &V> {
        self.state.values()
    }

    /// Returns the number of keys in the map.
    pub fn len(&self) -> usize {
        self.state.len()
    }

    /// Returns true if the map is empty.
    pub fn is_empty(&self) -> bool {
        self.state.is_empty()
    }
}

impl<K, V> DotMap<K, V>
where
    K: Hash + Eq,
{
    /// Retrieves the associated value, if any, for the given key.
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.state.get(key)
    }

    /// Returns `true` if the given key has a value in this map.
    pub fn has<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.state.contains_key(key)
    }

    // Insert an element into the map.
    //
    // Note, this is a low level operation: CRDT types should generally not be
    // manipulated directly by user code. For one thing, you'd normally want
    // to also update a CausalContext every time a DotMap is modified.
    #[doc(hidden)]
    pub fn insert(&mut self, key: K, value: V) {
        self.state.insert(key, value);
    }
}

impl<K, V> FromIterator<(K, V)> for DotMap<K, V>
where
    K: Eq + Hash,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            state: HashMap::from_iter(iter),
        }
    }
}

impl<K, V> DotStore for DotMap<K, V>
where
    K: Hash + Eq + fmt::Debug + Clone,
    V: DotStore + fmt::Debug,
{
    fn add_dots_to(&self, other: &mut CausalContext) {
        for v in self.values() {
            v.add_dots_to(other);
        }
    }

    fn is_bottom(&self) -> bool {
        self.state.values().all(DotStore::is_bottom)
    }

    fn subset_since(&self, frontier: &CausalContext) -> Self {
        let mut delta = Self::with_capacity(self.state.len());
        for (k, v) in &self.state {
            let delta_v = v.subset_since(frontier);
            if !delta_v.is_bottom() {
                delta.state.insert(k.clone(), delta_v);
            }
        }
        delta
    }

    /// Informally:
    ///  - take the union of keys across the two stores
    ///  - compute v as the join of the key's values in the two maps (one may
    ///    be ⊥)
    ///  - if v is ⊥, the key is removed; otherwise include the k -> v mapping
    fn join(
        (m1, cc1): (Self, &CausalContext),
        (mut m2, cc2): (Self, &CausalContext),
    ) -> Result<Self, TypeMismatch> {
        let mut res = Self::with_capacity(m1.len().max(m2.len()));
        for (k, v1) in m1.state {
            let v2 = m2.state.remove(&k).unwrap_or_default();
            let new_v = V::join((v1, cc1), (v2, cc2))?;
            if !new_v.is_bottom() {
                res.state.insert(k, new_v);
            }
        }
        // NOTE: this now only contains keys that weren't in m1
        for (k, v2) in m2.state {
            let new_v = V::join((V::default(), cc1), (v2, cc2))?;
            if !new_v.is_bottom() {
                res.state.insert(k, new_v);
            }
        }
        Ok(res)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Builds a valid causal store from a set of dots: every dot maps to a
    /// payload derived from it, so that independently generated stores never
    /// disagree on a dot's payload.
    fn causal_dotfun(dots: Vec<Dot>, tombstones: Vec<Dot>) -> CausalStore<DotFun<u64>> {
        let mut store = DotFun::default();
        for dot in dots {
            let v = dot.sequence().get();
            store.set(dot, v);
        }
        let mut context = store.dots();
        context.extend(tombstones);
        CausalStore { store, context }
    }

    #[test]
    fn known_but_absent_dot_is_a_removal() {
        let a = causal_dotfun(vec![Dot::mint("a", 1), Dot::mint("a", 2)], vec![]);
        // b has observed (a, 1) but does not hold it: it removed it
        let b = causal_dotfun(vec![], vec![Dot::mint("a", 1)]);

        let joined = a.join(b).unwrap();
        assert!(!joined.store.has(&Dot::mint("a", 1)));
        assert!(joined.store.has(&Dot::mint("a", 2)));
        assert!(joined.context.contains(&Dot::mint("a", 1)));
    }

    #[test]
    fn unknown_dot_is_preserved() {
        let a = causal_dotfun(vec![Dot::mint("a", 1)], vec![]);
        let b = causal_dotfun(vec![Dot::mint("b", 1)], vec![]);

        let joined = a.join(b).unwrap();
        assert!(joined.store.has(&Dot::mint("a", 1)));
        assert!(joined.store.has(&Dot::mint("b", 1)));
    }

    #[quickcheck]
    fn dotfun_join_laws(a: Vec<Dot>, b: Vec<Dot>, c: Vec<Dot>, extra: Vec<Dot>) {
        let a = causal_dotfun(a, extra.clone());
        let b = causal_dotfun(b, extra);
        let c = causal_dotfun(c, vec![]);

        let ab = a.clone().join(b.clone()).unwrap();
        let ba = b.clone().join(a.clone()).unwrap();
        assert_eq!(ab, ba, "join is commutative");

        let ab_c = ab.clone().join(c.clone()).unwrap();
        let a_bc = a.clone().join(b.clone().join(c).unwrap()).unwrap();
        assert_eq!(ab_c, a_bc, "join is associative");

        let abb = ab.clone().join(b).unwrap();
        assert_eq!(ab, abb, "join is idempotent");
    }

    #[quickcheck]
    fn join_context_is_monotone(a: Vec<Dot>, b: Vec<Dot>) {
        let a = causal_dotfun(a, vec![]);
        let b = causal_dotfun(b, vec![]);
        let a_dots: Vec<_> = a.context.dots().collect();
        let b_dots: Vec<_> = b.context.dots().collect();
        let joined = a.join(b).unwrap();
        for dot in a_dots.into_iter().chain(b_dots) {
            assert!(joined.context.contains(&dot));
        }
    }

    #[test]
    fn dotfunmap_root_removal_drops_subtree() {
        let root = Dot::mint("a", 1);
        let nested = Dot::mint("a", 2);
        let mut inner = DotFun::default();
        inner.set(nested.clone(), 2u64);
        let mut store = DotFunMap::default();
        store.set(root.clone(), inner);
        let context = store.dots();
        let a = CausalStore { store, context };

        // a removal delta: no payload, but the root dot is known
        let b = CausalStore::<DotFunMap<DotFun<u64>>> {
            store: Default::default(),
            context: CausalContext::from_iter([root.clone()]),
        };

        let joined = a.join(b).unwrap();
        assert!(joined.store.is_bottom());
        // the nested dot was removed by implication, and stays observable
        // only through the context
        assert!(joined.context.contains(&nested));
    }

    #[test]
    fn dotmap_prunes_empty_children() {
        let dot = Dot::mint("a", 1);
        let mut inner = DotFun::default();
        inner.set(dot.clone(), 1u64);
        let mut store = DotMap::default();
        store.insert("k".to_string(), inner);
        let a = CausalStore {
            context: store.dots(),
            store,
        };

        // the removal tombstones the only dot under "k"
        let b = CausalStore::<DotMap<String, DotFun<u64>>> {
            store: Default::default(),
            context: CausalContext::from_iter([dot]),
        };

        let joined = a.join(b).unwrap();
        assert!(joined.store.is_bottom());
        assert!(!joined.store.has("k"));
    }

    #[quickcheck]
    fn dotmap_join_laws(a: Vec<(bool, Dot)>, b: Vec<(bool, Dot)>, c: Vec<(bool, Dot)>) {
        fn causal_dotmap(entries: Vec<(bool, Dot)>) -> CausalStore<DotMap<String, DotFun<u64>>> {
            let mut store = DotMap::<String, DotFun<u64>>::default();
            for (key, dot) in entries {
                let key = if key { "x" } else { "y" }.to_string();
                let v = dot.sequence().get();
                let mut inner = store.state.remove(&key).unwrap_or_default();
                inner.set(dot, v);
                store.insert(key, inner);
            }
            CausalStore {
                context: store.dots(),
                store,
            }
        }

        let a = causal_dotmap(a);
        let b = causal_dotmap(b);
        let c = causal_dotmap(c);

        let ab = a.clone().join(b.clone()).unwrap();
        let ba = b.clone().join(a.clone()).unwrap();
        assert_eq!(ab, ba, "join is commutative");

        let ab_c = ab.clone().join(c.clone()).unwrap();
        let a_bc = a.clone().join(b.clone().join(c).unwrap()).unwrap();
        assert_eq!(ab_c, a_bc, "join is associative");

        let abb = ab.clone().join(b).unwrap();
        assert_eq!(ab, abb, "join is idempotent");
    }

    #[quickcheck]
    fn delta_since_inflates(history: Vec<Dot>, newer: Vec<Dot>) {
        let base = causal_dotfun(history.clone(), vec![]);
        let mut full = base.clone();
        for dot in newer {
            let v = dot.sequence().get();
            if !full.store.has(&dot) {
                full.store.set(dot.clone(), v);
                full.context.insert_dot(dot);
            }
        }

        let delta = full.delta_since(&base.context);
        let inflated = base.join(delta).unwrap();
        assert_eq!(inflated, full);
    }

    #[test]
    fn delta_since_carries_removals_of_unobserved_dots() {
        let a1 = Dot::mint("a", 1);

        // one replica wrote a1 and later removed it; a peer that never saw
        // either event syncs from it
        let full = causal_dotfun(vec![], vec![a1.clone()]);
        let never_saw_it = CausalContext::new();

        let delta = full.delta_since(&never_saw_it);
        assert!(delta.store.is_bottom());
        assert!(delta.context.contains(&a1));

        // a peer that saw only the write absorbs the removal from the delta
        let saw_the_write = causal_dotfun(vec![a1.clone()], vec![]);
        let caught_up = saw_the_write.join(delta).unwrap();
        assert!(!caught_up.store.has(&a1));
        assert!(caught_up.context.contains(&a1));
    }

    #[test]
    fn delta_since_cannot_express_removals_of_known_dots() {
        let a1 = Dot::mint("a", 1);
        let base = causal_dotfun(vec![a1.clone()], vec![]);

        // the removal introduces no dot, so against a base that already
        // observed the write the context difference is empty; shipping such
        // removals is deletions_unknown_to's job
        let removal = CausalStore::<DotFun<u64>> {
            store: Default::default(),
            context: CausalContext::from_iter([a1.clone()]),
        };
        let full = base.clone().join(removal).unwrap();

        let delta = full.delta_since(&base.context);
        assert!(delta.store.is_bottom());
        assert!(delta.context.is_empty());
    }
}
