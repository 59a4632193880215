// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! # Causal Context
//!
//! This module provides the core data structures for tracking causality.
//! Causal consistency is maintained by tracking the history of operations
//! using `Dot`s, which are globally unique identifiers for each operation.
//! The set of all observed dots forms a `CausalContext`.
//!
//! - **[`ReplicaId`]**: A unique, string-valued identifier for an actor in the
//!   system. Two replicas in the same deployment must never share an id, or
//!   dot uniqueness breaks.
//!
//! - **[`Dot`]**: A globally unique identifier for a single operation (for
//!   example, an insert or update). It consists of a `ReplicaId` and a
//!   sequence number, which is monotonically increasing for that specific
//!   actor.
//!
//! - **[`CausalContext`]**: The set of all `Dot`s that a replica has
//!   observed. It represents the replica's knowledge of the system's
//!   history. By comparing `CausalContext`s, replicas can determine which
//!   operations are new, concurrent, or have already been seen, enabling
//!   correct merging of states.
//!
//! The `CausalContext` is split into two disjoint parts: a *dot vector*
//! mapping each replica to the highest contiguous sequence number observed
//! from it (representing the prefix `1..=n`), and a *dot cloud* holding
//! out-of-band dots that arrived ahead of their predecessors. Whenever a
//! cloud entry closes a contiguous range it is promoted into the vector, so
//! the representation stays compact under in-order delivery.
use std::{
    cmp::Ordering,
    collections::{BTreeMap, BTreeSet},
    fmt,
    num::NonZeroU64,
    ops::{BitAnd, Sub},
    sync::Arc,
};

/// The identifier we choose to use for actors in the system.
///
/// Internally reference-counted, so cloning is cheap even though ids are
/// arbitrary strings. Dots embed a `ReplicaId` and are copied around
/// _everywhere_, so this matters.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(::serde::Deserialize, ::serde::Serialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct ReplicaId(Arc<str>);

impl ReplicaId {
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ReplicaId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ReplicaId {
    fn from(id: String) -> Self {
        Self(Arc::from(id))
    }
}

impl fmt::Debug for ReplicaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

impl fmt::Display for ReplicaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A unique identifier for an operation.
///
/// Every mutating operation is assigned a unique `Dot`: a combination of the
/// acting replica's identifier and an ever-increasing sequence number. A dot
/// is created exactly once and never reissued; it may later be "tombstoned"
/// (its presence retained in a [`CausalContext`], its payload removed from
/// the store).
///
/// Dots are ordered by the sequence number _first_ and _then_ the replica
/// identifier.
#[derive(Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(::serde::Deserialize, ::serde::Serialize))]
pub struct Dot {
    replica: ReplicaId,
    seq: NonZeroU64,
}

impl fmt::Debug for Dot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:?}, {})", self.replica, self.seq)
    }
}

impl PartialOrd for Dot {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Dot {
    fn cmp(&self, other: &Self) -> Ordering {
        self.seq
            .cmp(&other.seq)
            .then_with(|| self.replica.cmp(&other.replica))
    }
}

impl Dot {
    /// Constructs a dot from its parts.
    pub fn new(replica: ReplicaId, seq: NonZeroU64) -> Self {
        Self { replica, seq }
    }

    /// Creates a new [`Dot`] out of thin air.
    ///
    /// All real dots should be made through the use of a [`CausalContext`].
    /// This constructor is mainly useful for tests and documentation examples.
    ///
    /// # Panics
    ///
    /// If `seq == 0`.
    pub fn mint(replica: impl Into<ReplicaId>, seq: u64) -> Self {
        Self {
            replica: replica.into(),
            seq: NonZeroU64::new(seq).expect("attempted to construct Dot for 0th sequence number"),
        }
    }

    /// Returns the [`ReplicaId`] of the actor that produced this [`Dot`].
    pub fn replica(&self) -> &ReplicaId {
        &self.replica
    }

    /// Returns the sequence number (ie, per-actor operation index) of this [`Dot`].
    pub fn sequence(&self) -> NonZeroU64 {
        self.seq
    }
}

/// Tracks the set of sequence numbers observed from each actor in the system.
///
/// This type can be used both to track observed causal context, and to
/// produce new `Dot`s.
///
/// # Examples
///
/// ## Producing [`Dot`]s
///
/// ```rust
/// # use jsondelta::{CausalContext, Dot, ReplicaId};
/// let id = ReplicaId::new("a");
/// let mut cause = CausalContext::new();
///
/// // The causal context can be used to produce new dots:
/// let dot1 = cause.next_dot_for(&id);
/// // New dots are not implicitly absorbed:
/// assert_eq!(cause.next_dot_for(&id), dot1);
/// // You must explicitly add them to generate newer dots:
/// cause.insert_next_dot(dot1.clone());
/// let dot2 = cause.next_dot_for(&id);
/// assert_ne!(dot1, dot2);
///
/// // The first dot produced has sequence number 1:
/// assert_eq!(dot1, Dot::mint("a", 1));
/// // If one dot is produced after another, it is also ordered after:
/// assert!(dot2 > dot1);
/// // The causal context considers any absorbed dot as observed:
/// assert!(cause.contains(&dot1));
/// ```
///
/// ## Tracking causal context
///
/// ```rust
/// # use jsondelta::{CausalContext, Dot};
/// let mut cause = CausalContext::default();
///
/// // Out-of-order dots are tracked in the dot cloud:
/// cause.extend([Dot::mint("a", 10)]);
/// assert!(cause.contains(&Dot::mint("a", 10)));
/// assert!(!cause.contains(&Dot::mint("a", 9)));
/// assert!(!cause.contains(&Dot::mint("a", 1)));
///
/// // Consecutive dots from the same actor are stored compactly, and
/// // membership does not depend on which path a dot took in:
/// cause.extend([Dot::mint("a", 1), Dot::mint("a", 2), Dot::mint("a", 3)]);
/// assert!(cause.contains(&Dot::mint("a", 2)));
/// assert!(!cause.contains(&Dot::mint("a", 4)));
/// ```
#[derive(Default, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(::serde::Deserialize, ::serde::Serialize))]
pub struct CausalContext {
    /// Per replica, the highest `n` such that all of `1..=n` has been observed.
    vector: BTreeMap<ReplicaId, NonZeroU64>,
    /// Observed dots not (yet) contiguous with the vector prefix.
    ///
    /// Invariant: disjoint from the vector, ie every sequence number in here
    /// is at least two beyond its replica's prefix. Sets are never empty.
    cloud: BTreeMap<ReplicaId, BTreeSet<NonZeroU64>>,
}

impl fmt::Debug for CausalContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut m = f.debug_map();
        for (id, n) in &self.vector {
            match self.cloud.get(id) {
                Some(seqs) => m.entry(id, &format_args!("1..={n} + {seqs:?}")),
                None => m.entry(id, &format_args!("1..={n}")),
            };
        }
        for (id, seqs) in &self.cloud {
            if !self.vector.contains_key(id) {
                m.entry(id, &format_args!("{seqs:?}"));
            }
        }
        m.finish()
    }
}

impl CausalContext {
    /// Constructs a new, empty [`CausalContext`].
    pub fn new() -> Self {
        Self::default()
    }

    fn prefix(&self, id: &ReplicaId) -> u64 {
        self.vector.get(id).map_or(0, |n| n.get())
    }

    fn contains_seq(&self, id: &ReplicaId, seq: NonZeroU64) -> bool {
        seq.get() <= self.prefix(id) || self.cloud.get(id).is_some_and(|seqs| seqs.contains(&seq))
    }

    /// Determines if the given `dot` is in the current causal context.
    #[must_use]
    pub fn contains(&self, dot: &Dot) -> bool {
        self.contains_seq(&dot.replica, dot.seq)
    }

    /// The largest sequence number observed from `id`, contiguous or not.
    fn max_seq(&self, id: &ReplicaId) -> u64 {
        let in_cloud = self
            .cloud
            .get(id)
            .and_then(|seqs| seqs.iter().next_back())
            .map_or(0, |n| n.get());
        self.prefix(id).max(in_cloud)
    }

    /// Produces the next unused [`Dot`] for the given replica.
    ///
    /// This does not record the dot; the dot is recorded in the context of
    /// the delta that carries it, and reaches this context through `join`.
    /// A replica is single-threaded, so it never mints a second dot before
    /// the first one's delta has been joined back in.
    pub fn next_dot_for(&self, id: &ReplicaId) -> Dot {
        let seq = NonZeroU64::new(self.max_seq(id) + 1).expect("max_seq + 1 > 0");
        let dot = Dot::new(id.clone(), seq);
        debug_assert!(!self.contains(&dot), "minted dot {dot:?} is already known");
        dot
    }

    /// Records a newly generated [`Dot`] in the causal context.
    ///
    /// # Panics
    ///
    /// If the dot is already contained, or is not the next dot its replica
    /// would mint. Either indicates a reused dot, which is an unrecoverable
    /// invariant breach.
    pub fn insert_next_dot(&mut self, dot: Dot) {
        assert!(!self.contains(&dot), "dot {dot:?} allocated twice");
        let expected = self.max_seq(&dot.replica) + 1;
        assert_eq!(
            dot.seq.get(),
            expected,
            "dot {dot:?} is not the next dot for its replica (expected sequence {expected})",
        );
        self.insert_dot(dot);
    }

    /// Records an observed [`Dot`] in the causal context.
    ///
    /// If the dot closes a contiguous range for its replica, the dot cloud
    /// entries it connects are promoted into the dot vector.
    pub fn insert_dot(&mut self, dot: Dot) {
        if self.contains(&dot) {
            return;
        }
        let Dot { replica, seq } = dot;
        if seq.get() == self.prefix(&replica) + 1 {
            self.vector.insert(replica.clone(), seq);
            self.compact_track(&replica);
        } else {
            self.cloud.entry(replica).or_default().insert(seq);
        }
    }

    /// Records multiple observed [`Dot`]s in the causal context.
    pub(crate) fn insert_dots(&mut self, dots: impl IntoIterator<Item = Dot>) {
        for dot in dots {
            self.insert_dot(dot);
        }
    }

    /// Promotes cloud entries contiguous with the vector prefix of `id`, and
    /// drops cloud entries the prefix has absorbed.
    fn compact_track(&mut self, id: &ReplicaId) {
        let mut prefix = self.prefix(id);
        let mut emptied = false;
        if let Some(seqs) = self.cloud.get_mut(id) {
            while let Some(min) = seqs.iter().next().copied() {
                if min.get() > prefix + 1 {
                    break;
                }
                seqs.remove(&min);
                prefix = prefix.max(min.get());
            }
            emptied = seqs.is_empty();
        }
        if emptied {
            self.cloud.remove(id);
        }
        if let Some(n) = NonZeroU64::new(prefix) {
            self.vector.insert(id.clone(), n);
        }
    }

    /// Incorporates the observations from another causal context into this one.
    ///
    /// After the `union`, all [`Dot`]s known to `other` are considered
    /// observed by `self`.
    ///
    /// ```rust
    /// # use jsondelta::{CausalContext, Dot};
    /// let mut cc1 = CausalContext::from_iter([Dot::mint("a", 1), Dot::mint("a", 4)]);
    /// let cc2 = CausalContext::from_iter([Dot::mint("a", 2), Dot::mint("a", 3)]);
    /// cc1.union(&cc2);
    /// for seq in 1..=4 {
    ///     assert!(cc1.contains(&Dot::mint("a", seq)));
    /// }
    /// assert!(!cc1.contains(&Dot::mint("a", 5)));
    /// ```
    pub fn union(&mut self, other: &CausalContext) {
        for (id, &n) in &other.vector {
            if self.prefix(id) < n.get() {
                self.vector.insert(id.clone(), n);
            }
        }
        for (id, seqs) in &other.cloud {
            let prefix = self.prefix(id);
            for &seq in seqs {
                if seq.get() > prefix {
                    self.cloud.entry(id.clone()).or_default().insert(seq);
                }
            }
        }
        let touched: Vec<ReplicaId> = self.cloud.keys().cloned().collect();
        for id in touched {
            self.compact_track(&id);
        }
    }

    /// True if there are no dots in this causal context.
    pub fn is_empty(&self) -> bool {
        debug_assert!(
            self.cloud.values().all(|seqs| !seqs.is_empty()),
            "should not retain empty cloud sets"
        );
        self.vector.is_empty() && self.cloud.is_empty()
    }

    /// Return the total number of dots.
    #[must_use]
    pub fn dot_count(&self) -> u64 {
        let in_vector: u64 = self.vector.values().map(|n| n.get()).sum();
        let in_cloud: u64 = self.cloud.values().map(|seqs| seqs.len() as u64).sum();
        in_vector + in_cloud
    }

    /// Iterator over all the dots that the context holds.
    pub fn dots(&self) -> impl Iterator<Item = Dot> + '_ {
        let vector = self.vector.iter().flat_map(|(id, n)| {
            (1..=n.get()).map(move |seq| {
                Dot::new(id.clone(), NonZeroU64::new(seq).expect("seq range starts at 1"))
            })
        });
        let cloud = self
            .cloud
            .iter()
            .flat_map(|(id, seqs)| seqs.iter().map(move |&seq| Dot::new(id.clone(), seq)));
        vector.chain(cloud)
    }

    /// Returns true if the provided context contains at least one [`Dot`]
    /// that also exists in this context.
    pub fn any_dot_in(&self, other: &Self) -> bool {
        for (id, &n) in &self.vector {
            if other.prefix(id) > 0 {
                return true;
            }
            if other
                .cloud
                .get(id)
                .is_some_and(|seqs| seqs.iter().next().is_some_and(|min| min.get() <= n.get()))
            {
                return true;
            }
        }
        for (id, seqs) in &self.cloud {
            if seqs.iter().any(|&seq| other.contains_seq(id, seq)) {
                return true;
            }
        }
        false
    }

    /// Returns the happens-after ordering between `self` and `other`.
    ///
    /// Specifically, returns:
    ///
    /// - `Some(Ordering::Equal)` if `self` == `other`
    /// - `Some(Ordering::Less)` if `other` happens-after `self`
    /// - `Some(Ordering::Greater)` if `self` happens-after `other`
    /// - `None` if the two histories are concurrent
    ///
    /// `a` happens-after `b` if `a` has observed everything that `b` has
    /// (that is, all dots), and at least one other dot.
    pub fn partial_cmp_dots(&self, other: &CausalContext) -> Option<Ordering> {
        let only_ours = !(self - other).is_empty();
        let only_theirs = !(other - self).is_empty();
        match (only_ours, only_theirs) {
            (false, false) => Some(Ordering::Equal),
            (true, false) => Some(Ordering::Greater),
            (false, true) => Some(Ordering::Less),
            (true, true) => None,
        }
    }

    /// Returns true if `self` _happens-after_ `other`.
    pub fn after(&self, other: &CausalContext) -> bool {
        self.partial_cmp_dots(other) == Some(Ordering::Greater)
    }

    /// Returns true if `self` _happens-before_ `other`.
    pub fn happened_before(&self, other: &CausalContext) -> bool {
        other.partial_cmp_dots(self) == Some(Ordering::Greater)
    }
}

impl PartialOrd for CausalContext {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.partial_cmp_dots(other)
    }
}

impl Sub<&CausalContext> for &CausalContext {
    type Output = CausalContext;

    fn sub(self, rhs: &CausalContext) -> Self::Output {
        let mut out = CausalContext::new();
        for (id, &n) in &self.vector {
            // the shared prefix is covered by rhs wholesale, so only walk the tail
            for seq in rhs.prefix(id) + 1..=n.get() {
                let seq = NonZeroU64::new(seq).expect("seq range starts at 1");
                if !rhs.contains_seq(id, seq) {
                    out.insert_dot(Dot::new(id.clone(), seq));
                }
            }
        }
        for (id, seqs) in &self.cloud {
            for &seq in seqs {
                if !rhs.contains_seq(id, seq) {
                    out.insert_dot(Dot::new(id.clone(), seq));
                }
            }
        }
        out
    }
}

impl BitAnd<&CausalContext> for &CausalContext {
    type Output = CausalContext;

    fn bitand(self, rhs: &CausalContext) -> Self::Output {
        let mut out = CausalContext::new();
        for (id, &n) in &self.vector {
            let shared = n.get().min(rhs.prefix(id));
            if let Some(shared) = NonZeroU64::new(shared) {
                out.vector.insert(id.clone(), shared);
            }
            // dots in our prefix that rhs only holds out-of-band
            if let Some(seqs) = rhs.cloud.get(id) {
                for &seq in seqs {
                    if seq.get() <= n.get() {
                        out.insert_dot(Dot::new(id.clone(), seq));
                    }
                }
            }
        }
        for (id, seqs) in &self.cloud {
            for &seq in seqs {
                if rhs.contains_seq(id, seq) {
                    out.insert_dot(Dot::new(id.clone(), seq));
                }
            }
        }
        out
    }
}

impl FromIterator<Dot> for CausalContext {
    fn from_iter<T: IntoIterator<Item = Dot>>(iter: T) -> Self {
        let mut cc = CausalContext::default();
        cc.insert_dots(iter);
        cc
    }
}

impl Extend<Dot> for CausalContext {
    fn extend<T: IntoIterator<Item = Dot>>(&mut self, iter: T) {
        self.insert_dots(iter);
    }
}

impl Extend<CausalContext> for CausalContext {
    fn extend<T: IntoIterator<Item = CausalContext>>(&mut self, iter: T) {
        for cc in iter {
            self.union(&cc);
        }
    }
}

impl<'cc> Extend<&'cc CausalContext> for CausalContext {
    fn extend<T: IntoIterator<Item = &'cc CausalContext>>(&mut self, iter: T) {
        for cc in iter {
            self.union(cc);
        }
    }
}

#[cfg(any(test, feature = "arbitrary"))]
mod arbitrary_impls {
    use super::*;
    use quickcheck::{Arbitrary, Gen};

    impl Arbitrary for ReplicaId {
        fn arbitrary(g: &mut Gen) -> Self {
            // a small universe so that generated dots actually collide
            ReplicaId::new(*g.choose(&["a", "b", "c", "d"]).expect("non-empty"))
        }
    }

    impl Arbitrary for Dot {
        fn arbitrary(g: &mut Gen) -> Self {
            // small sequence numbers make contiguous runs (and thus vector
            // compaction) likely
            Dot::mint(ReplicaId::arbitrary(g), u64::from(u8::arbitrary(g) % 32) + 1)
        }
    }
}
