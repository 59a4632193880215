// (c) Copyright 2025 Helsing GmbH. All rights reserved.
use super::{Node, NodeKind, TypeMismatch};
use crate::{
    causal_context::{CausalContext, ReplicaId},
    crdts::{mvreg::MvReg, ormap::OrMap},
    dotstores::{CausalStore, DotFun, DotFunMap, DotMap, DotStore},
};
pub use position::{InvalidPosition, Position};
use std::{error, fmt, sync::Arc};

pub(super) mod position;

/// The identity of an array element, provided by the application at
/// insertion time.
///
/// Uids are single-use: once an element has been deleted, its uid must not
/// be reused for a new element. The engine cannot reliably detect reuse (a
/// fully compacted tombstone leaves no trace), so reuse silently revives
/// remnants of the old element instead of creating a fresh one.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(::serde::Deserialize, ::serde::Serialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Uid(Arc<str>);

impl Uid {
    pub fn new(uid: impl AsRef<str>) -> Self {
        Self(Arc::from(uid.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Uid {
    fn from(uid: &str) -> Self {
        Self::new(uid)
    }
}

impl From<String> for Uid {
    fn from(uid: String) -> Self {
        Self(Arc::from(uid))
    }
}

impl fmt::Debug for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A deletion targeted a uid with no live element.
///
/// Fatal within the operation that produced it: no state is mutated. Note
/// that `mv` and `apply_to_value` do _not_ produce this error; for those,
/// acting on a locally-unknown uid is meaningful (see
/// [`OrArray::mv`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingElement(pub Uid);

impl fmt::Display for MissingElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "no live element with uid {:?}", self.0)
    }
}

impl error::Error for MissingElement {}

/// The position and value slots of one array element.
#[derive(Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(::serde::Deserialize, ::serde::Serialize))]
pub(crate) struct Entry {
    /// The position register of this element.
    ///
    /// This behaves like a multi-value register over [`Position`]s: every
    /// write creates a fresh root holding the new position and observes the
    /// dots of the roots it is overwriting. Concurrent moves therefore leave
    /// multiple positions behind, all of which survive until overwritten.
    ///
    /// An element is *live* exactly while this register is non-empty.
    /// Deleting an element erases the positions its author had observed; a
    /// concurrent (or later) move writes a fresh position and the element
    /// stays, or comes back.
    positions: DotFunMap<DotFun<Position>>,

    /// The value of this element.
    ///
    /// Not touched by `mv` or `delete`; value cells of a deleted element
    /// linger, invisible to readers, until a compaction layer reaps them.
    value: Node,
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("")
            .field(&format_args!("{:?}", self.value))
            .field(&format_args!("pos={:?}", self.positions))
            .finish()
    }
}

impl Entry {
    fn is_live(&self) -> bool {
        !self.positions.is_bottom()
    }

    /// The position this element sorts at: the minimum of the positions
    /// currently held by its position register.
    ///
    /// Using the minimum keeps the ordering deterministic under concurrent
    /// moves; any total tie-breaker would do, but every replica must use the
    /// same one.
    fn min_position(&self) -> Option<&Position> {
        self.positions
            .values()
            .flat_map(|set| set.values())
            .min()
    }
}

impl DotStore for Entry {
    fn add_dots_to(&self, other: &mut CausalContext) {
        self.positions.add_dots_to(other);
        self.value.add_dots_to(other);
    }

    fn is_bottom(&self) -> bool {
        self.positions.is_bottom() && self.value.is_bottom()
    }

    fn subset_since(&self, frontier: &CausalContext) -> Self {
        Self {
            positions: self.positions.subset_since(frontier),
            value: self.value.subset_since(frontier),
        }
    }

    fn join(
        (e1, cc1): (Self, &CausalContext),
        (e2, cc2): (Self, &CausalContext),
    ) -> Result<Self, TypeMismatch> {
        let positions = DotFunMap::join((e1.positions, cc1), (e2.positions, cc2))?;
        let value = Node::join((e1.value, cc1), (e2.value, cc2))?;
        Ok(Entry { positions, value })
    }
}

/// An **Observed-Remove Array**, a list-like CRDT that supports concurrent
/// insertions, updates, removals, and moves of elements.
///
/// ## Stable positioning
///
/// Integer indices cannot be used as element positions, since every insert
/// or delete would have to renumber the tail of the array across all
/// replicas. Elements are instead placed at stable [`Position`]s: dense,
/// totally-ordered keys for which a value strictly between any two others
/// can always be produced (see [`Position::between`]). The array is the
/// sequence of elements sorted by position.
///
/// Each element's position lives in a register that behaves like an
/// [`MvReg`]: concurrent moves leave *multiple* positions behind, and the
/// element sorts at the minimum of them until a later write collapses the
/// set. Ties between equal positions are broken by comparing uids, so the
/// sequence returned by [`OrArray::sorted_entries`] is a pure function of
/// the joined state, independent of which replica computes it or of the
/// order in which deltas arrived.
///
/// ## Presence
///
/// An element is present exactly while its position register is non-empty.
/// `delete` erases the positions its author had observed; a move concurrent
/// with a delete writes a position under a fresh dot that the deleter never
/// observed, so the element survives at the moved-to position with its
/// value intact. This *move-wins* bias is deliberate (not a delete-wins
/// bias). The deleted element's value cells stay behind invisibly until a
/// compaction layer reaps them.
///
/// ## Usage
///
/// ```rust
/// # use jsondelta::{CausalStore, OrArray, ReplicaId, crdts::{mvreg::RegisterValue, orarray::Position}};
/// let mut doc: CausalStore<OrArray> = CausalStore::new();
/// let id = ReplicaId::new("a");
///
/// let delta = doc.store.insert_register(
///     "item-1".into(),
///     |cc, id| jsondelta::MvReg::default().write(RegisterValue::U64(42), cc, id),
///     Position::between(None, None).unwrap(),
///     &doc.context,
///     &id,
/// );
/// doc = doc.join(delta).unwrap();
///
/// let entries = doc.store.sorted_entries();
/// assert_eq!(entries.len(), 1);
/// assert_eq!(entries[0].0.as_str(), "item-1");
/// ```
#[derive(Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(::serde::Deserialize, ::serde::Serialize))]
pub struct OrArray(pub(crate) DotMap<Uid, Entry>);

impl fmt::Debug for OrArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[]{:?}", self.0)
    }
}

impl DotStore for OrArray {
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

impl OrArray {
    /// Returns the number of live elements in this array.
    pub fn len(&self) -> usize {
        self.0.values().filter(|e| e.is_live()).count()
    }

    /// Returns true if this array has no live elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the value of the live element with the given uid, if any.
    pub fn get(&self, uid: &Uid) -> Option<&Node> {
        self.0.get(uid).filter(|e| e.is_live()).map(|e| &e.value)
    }

    /// The set of positions currently held for the given uid.
    ///
    /// More than one exactly when concurrent moves have not yet been
    /// superseded.
    pub fn positions(&self, uid: &Uid) -> impl Iterator<Item = &Position> {
        self.0
            .get(uid)
            .into_iter()
            .flat_map(|e| e.positions.values().flat_map(|set| set.values()))
    }

    /// The array's live elements in order.
    ///
    /// Each element is returned with the position it sorts at: the minimum
    /// of its position register, with ties between equal positions broken by
    /// uid. The result depends only on the joined state, never on which
    /// replica computes it.
    pub fn sorted_entries(&self) -> Vec<(&Uid, &Position, &Node)> {
        let mut out: Vec<_> = self
            .0
            .iter()
            .filter_map(|(uid, entry)| {
                let pos = entry.min_position()?;
                Some((uid, pos, &entry.value))
            })
            .collect();
        out.sort_unstable_by(|(u1, p1, _), (u2, p2, _)| p1.cmp(p2).then_with(|| u1.cmp(u2)));
        out
    }

    /// Mints the dot pair for one position-register write (a root for the
    /// register entry and a dot for the position cell under it), records
    /// both in `ret_cc`, and builds the register.
    ///
    /// Dots are minted from `base` extended with whatever is already in
    /// `ret_cc`, since the delta under construction may hold freshly minted
    /// dots that `base` does not know yet.
    fn mint_position_dots(
        base: &CausalContext,
        ret_cc: &mut CausalContext,
        p: Position,
        id: &ReplicaId,
    ) -> DotFunMap<DotFun<Position>> {
        let mut gen = base.clone();
        gen.union(ret_cc);
        let root_dot = gen.next_dot_for(id);
        gen.insert_dot(root_dot.clone());
        let pos_dot = gen.next_dot_for(id);
        ret_cc.insert_dot(root_dot.clone());
        ret_cc.insert_dot(pos_dot.clone());

        let mut set = DotFun::default();
        set.set(pos_dot, p);
        let mut positions = DotFunMap::default();
        positions.set(root_dot, set);
        positions
    }
}

macro_rules! insert_kind {
    ($name:ident, $frag:literal, $variant:ident, $inner:ty) => {
        /// Inserts
        #[doc = $frag]
        /// value produced by `o` at position `p`.
        ///
        /// This is a convenience wrapper around [`OrArray::insert`]; see
        /// that method for details.
        pub fn $name<O>(
            &self,
            uid: Uid,
            o: O,
            p: Position,
            cc: &CausalContext,
            id: &ReplicaId,
        ) -> CausalStore<Self>
        where
            O: FnOnce(&CausalContext, &ReplicaId) -> CausalStore<$inner>,
        {
            self.insert(uid, move |cc, id| o(cc, id).map_store(Node::$variant), p, cc, id)
        }
    };
}

macro_rules! apply_to_kind {
    ($name:ident, $frag:literal, $variant:ident, $inner:ty) => {
        /// Updates the value of the element at `uid` to be
        #[doc = $frag]
        /// using `o`.
        ///
        /// This is a convenience wrapper around [`OrArray::apply_to_value`];
        /// see that method for details. `o` is passed an empty
        #[doc = $frag]
        /// when the element currently holds no value.
        ///
        /// Fails with [`TypeMismatch`] if the element currently holds a
        /// non-empty value of a different kind.
        pub fn $name<O>(
            &self,
            uid: Uid,
            o: O,
            p: Position,
            cc: &CausalContext,
            id: &ReplicaId,
        ) -> Result<CausalStore<Self>, TypeMismatch>
        where
            O: FnOnce(&$inner, &CausalContext, &ReplicaId) -> CausalStore<$inner>,
        {
            self.apply_to_value(
                uid,
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
                p,
                cc,
                id,
            )
        }
    };
}

impl OrArray {
    insert_kind!(insert_map, "an [`OrMap`]", Map, OrMap<String>);
    insert_kind!(insert_array, "an [`OrArray`]", Array, OrArray);
    insert_kind!(insert_register, "an [`MvReg`]", Register, MvReg);

    apply_to_kind!(apply_to_map, "an [`OrMap`]", Map, OrMap<String>);
    apply_to_kind!(apply_to_array, "an [`OrArray`]", Array, OrArray);
    apply_to_kind!(apply_to_register, "an [`MvReg`]", Register, MvReg);

    /// Creates a CRDT that represents the insertion of the [`Node`] produced
    /// by `o` at stable position `p`.
    ///
    /// You will generally want to use [`Position::between`] to generate `p`
    /// so as to place the new element at the index you desire.
    ///
    /// The provided `uid` identifies the element for the rest of its life
    /// and must be fresh; see [`Uid`].
    pub fn insert<O>(
        &self,
        uid: Uid,
        o: O,
        p: Position,
        cc: &CausalContext,
        id: &ReplicaId,
    ) -> CausalStore<Self>
    where
        O: FnOnce(&CausalContext, &ReplicaId) -> CausalStore<Node>,
    {
        debug_assert!(
            self.0.get(&uid).map_or(true, |e| !e.is_live()),
            "uid {uid:?} reused for a live element"
        );

        let CausalStore {
            store: value,
            context: mut ret_cc,
        } = o(cc, id);

        if value.is_bottom() {
            // the inner operation produced nothing to insert. don't create
            // the element, but do propagate any dots from nested operations
            // to reduce confusion.
            return CausalStore {
                store: Self::default(),
                context: ret_cc,
            };
        }

        let positions = Self::mint_position_dots(cc, &mut ret_cc, p, id);
        let mut store = Self::default();
        store.0.insert(uid, Entry { positions, value });

        CausalStore {
            store,
            context: ret_cc,
        }
    }

    /// Creates a CRDT that represents `o` applied to the value of the
    /// element identified by `uid`.
    ///
    /// `o` is passed `None` when there is no value at `uid` in this state.
    /// If the element has no live presence here (never observed, or its
    /// position register was tombstoned), the update also anchors the
    /// element at the provided position `p`: an update to an unobserved
    /// element implicitly inserts it. A live element's position is left
    /// untouched, so that a value update commutes with a concurrent move.
    ///
    /// If `o` produces ⊥ (eg, it removed the last key of a nested map), the
    /// update becomes a removal of the element.
    pub fn apply_to_value<O>(
        &self,
        uid: Uid,
        o: O,
        p: Position,
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
        let current = self.0.get(&uid);
        let CausalStore {
            store: value,
            context: mut ret_cc,
        } = o(current.map(|e| &e.value), cc, id)?;

        if value.is_bottom() {
            if let Some(entry) = current {
                entry.positions.add_dots_to(&mut ret_cc);
            }
            return Ok(CausalStore {
                store: Self::default(),
                context: ret_cc,
            });
        }

        let positions = if current.is_some_and(Entry::is_live) {
            DotFunMap::default()
        } else {
            Self::mint_position_dots(cc, &mut ret_cc, p, id)
        };

        let mut store = Self::default();
        store.0.insert(uid, Entry { positions, value });
        Ok(CausalStore {
            store,
            context: ret_cc,
        })
    }

    /// Creates a CRDT that represents the element identified by `uid` being
    /// moved to stable position `p`.
    ///
    /// The move writes `p` into the element's position register under a
    /// fresh dot, observing every position currently held. Concurrent moves
    /// of the same element therefore both survive as a multi-value position
    /// set until one observes the other; readers sort by the minimum.
    ///
    /// The element may be locally absent, for example when its positions
    /// were tombstoned by a delete that already reached this replica. The
    /// move still proceeds against an empty stand-in: the fresh dot is one
    /// no deleter has observed, so peers accept it and the element revives
    /// (with whatever value cells its tombstone still holds).
    pub fn mv(&self, uid: Uid, p: Position, cc: &CausalContext, id: &ReplicaId) -> CausalStore<Self> {
        let mut ret_cc = CausalContext::new();
        if let Some(entry) = self.0.get(&uid) {
            entry.positions.add_dots_to(&mut ret_cc);
        }

        let positions = Self::mint_position_dots(cc, &mut ret_cc, p, id);
        let mut store = Self::default();
        store.0.insert(
            uid,
            Entry {
                positions,
                value: Node::default(),
            },
        );

        CausalStore {
            store,
            context: ret_cc,
        }
    }

    /// Creates a CRDT that represents the removal of the element identified
    /// by `uid`.
    ///
    /// The delta's context carries every dot of the element's position
    /// register as observed here, erasing its presence at peers unless they
    /// hold a newer position write. The element's value cells are left to a
    /// future compaction layer; they are invisible while the element has no
    /// position.
    ///
    /// Fails with [`MissingElement`] if there is no live element at `uid`.
    pub fn delete(&self, uid: &Uid) -> Result<CausalStore<Self>, MissingElement> {
        let entry = self
            .0
            .get(uid)
            .filter(|e| e.is_live())
            .ok_or_else(|| MissingElement(uid.clone()))?;

        let mut ret_cc = CausalContext::new();
        entry.positions.add_dots_to(&mut ret_cc);

        Ok(CausalStore {
            store: Self::default(),
            context: ret_cc,
        })
    }

    /// Creates a CRDT that represents the removal of every live element of
    /// this array.
    pub fn clear(&self) -> CausalStore<Self> {
        let mut ret_cc = CausalContext::new();
        for entry in self.0.values() {
            entry.positions.add_dots_to(&mut ret_cc);
        }

        CausalStore {
            store: Self::default(),
            context: ret_cc,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crdts::{mvreg::RegisterValue, test_util::join_harness};

    fn pos(digits: &[u64]) -> Position {
        Position::from_digits(digits.iter().copied()).unwrap()
    }

    fn write(v: &str) -> impl FnOnce(&CausalContext, &ReplicaId) -> CausalStore<MvReg> + '_ {
        move |cc, id| MvReg::default().write(RegisterValue::String(v.into()), cc, id)
    }

    /// Seeds an array with one element per (uid, value, position) triple.
    fn seeded<'a>(
        elements: &'a [(&'a str, &'a str, &'a [u64])],
    ) -> impl FnOnce(CausalStore<OrArray>, &ReplicaId) -> CausalStore<OrArray> + 'a {
        move |mut state, id| {
            for (uid, value, digits) in elements {
                let delta = state.store.insert_register(
                    Uid::from(*uid),
                    write(value),
                    pos(digits),
                    &state.context,
                    id,
                );
                state = state.join(delta).unwrap();
            }
            state
        }
    }

    fn values_of(array: &OrArray) -> Vec<String> {
        array
            .sorted_entries()
            .into_iter()
            .map(|(_, _, node)| {
                let reg = node.as_register().unwrap().expect("only registers here");
                let values: Vec<_> = reg.values().collect();
                assert_eq!(values.len(), 1, "unexpected value conflict: {values:?}");
                match values[0] {
                    RegisterValue::String(s) => s.clone(),
                    other => panic!("unexpected value {other:?}"),
                }
            })
            .collect()
    }

    #[test]
    fn empty() {
        let cds = CausalStore::<OrArray>::default();
        assert!(cds.store.is_bottom());
        assert!(cds.store.is_empty());
        assert!(cds.store.sorted_entries().is_empty());
    }

    #[test]
    fn push_get_delete() {
        let list = OrArray::default();
        let cc = CausalContext::new();
        let id = ReplicaId::new("a");
        let uid = Uid::from("x");

        let m = list.insert_register(uid.clone(), write("hello"), pos(&[100]), &cc, &id);
        assert!(!m.store.is_bottom());
        assert_eq!(m.store.len(), 1);
        assert!(m.store.get(&uid).is_some());

        let deleted = m.store.delete(&uid).unwrap();
        let state = m.join(deleted).unwrap();
        // the element is hidden, though its value cells await compaction
        assert_eq!(state.store.len(), 0);
        assert!(state.store.get(&uid).is_none());
        assert!(state.store.sorted_entries().is_empty());

        // deleting again: nothing is live under the uid anymore
        assert_eq!(
            state.store.delete(&uid),
            Err(MissingElement(uid))
        );
    }

    #[test]
    fn same_position_sorts_by_uid() {
        join_harness(
            OrArray::default(),
            |s, _| s,
            |a, cc, id| a.insert_register("b".into(), write("B"), pos(&[100]), &cc, id),
            |a, cc, id| a.insert_register("a".into(), write("A"), pos(&[100]), &cc, id),
            |CausalStore { store, .. }| {
                assert_eq!(values_of(&store), ["A", "B"]);
            },
        );
    }

    #[test]
    fn orders_by_position() {
        join_harness(
            OrArray::default(),
            seeded(&[("c", "Third", &[100])]),
            |a, cc, id| a.insert_register("a".into(), write("First"), pos(&[50]), &cc, id),
            |a, cc, id| a.insert_register("b".into(), write("Second"), pos(&[150]), &cc, id),
            |CausalStore { store, .. }| {
                assert_eq!(values_of(&store), ["First", "Third", "Second"]);
            },
        );
    }

    #[test]
    fn move_wins_over_delete() {
        join_harness(
            OrArray::default(),
            seeded(&[("a", "A", &[100]), ("b", "B", &[200])]),
            |a, cc, id| a.mv("a".into(), pos(&[300]), &cc, id),
            |a, _cc, _id| a.delete(&"a".into()).unwrap(),
            |CausalStore { store, .. }| {
                assert_eq!(values_of(&store), ["B", "A"]);
                let positions: Vec<_> = store.positions(&"a".into()).collect();
                assert_eq!(positions, [&pos(&[300])]);
            },
        );
    }

    #[test]
    fn move_and_update_commute() {
        join_harness(
            OrArray::default(),
            seeded(&[("x", "initial", &[100])]),
            |a, cc, id| a.mv("x".into(), pos(&[200]), &cc, id),
            |a, cc, id| {
                a.apply_to_register(
                    "x".into(),
                    |reg, cc, id| reg.write(RegisterValue::String("updated".into()), cc, id),
                    pos(&[100]),
                    &cc,
                    id,
                )
                .unwrap()
            },
            |CausalStore { store, .. }| {
                assert_eq!(values_of(&store), ["updated"]);
                let positions: Vec<_> = store.positions(&"x".into()).collect();
                assert_eq!(positions, [&pos(&[200])]);
            },
        );
    }

    #[test]
    fn concurrent_moves_leave_a_position_conflict() {
        join_harness(
            OrArray::default(),
            seeded(&[("x", "v", &[100])]),
            |a, cc, id| a.mv("x".into(), pos(&[50]), &cc, id),
            |a, cc, id| a.mv("x".into(), pos(&[200]), &cc, id),
            |CausalStore { store, .. }| {
                let mut positions: Vec<_> = store.positions(&"x".into()).collect();
                positions.sort_unstable();
                assert_eq!(positions, [&pos(&[50]), &pos(&[200])]);
                // readers sort by the minimum
                let entries = store.sorted_entries();
                assert_eq!(entries[0].1, &pos(&[50]));
            },
        );
    }

    #[test]
    fn move_of_tombstoned_element_revives_it() {
        let id = ReplicaId::new("a");
        let mut state = CausalStore::<OrArray>::new();
        let delta = state.store.insert_register(
            "x".into(),
            write("ghost"),
            pos(&[100]),
            &state.context,
            &id,
        );
        state = state.join(delta).unwrap();

        let delete = state.store.delete(&"x".into()).unwrap();
        state = state.join(delete).unwrap();
        assert!(state.store.get(&"x".into()).is_none());

        // the uid is known but tombstoned; the move must not dereference the
        // missing position register, and its fresh dot brings the element
        // back
        let mv = state.store.mv("x".into(), pos(&[5]), &state.context, &id);
        state = state.join(mv).unwrap();
        assert_eq!(values_of(&state.store), ["ghost"]);
    }

    #[test]
    fn update_to_unobserved_element_implicitly_inserts() {
        let id = ReplicaId::new("a");
        let state = CausalStore::<OrArray>::new();
        let delta = state
            .store
            .apply_to_register(
                "new".into(),
                |reg, cc, id| reg.write(RegisterValue::String("made".into()), cc, id),
                pos(&[42]),
                &state.context,
                &id,
            )
            .unwrap();
        let state = state.join(delta).unwrap();
        assert_eq!(values_of(&state.store), ["made"]);
        let positions: Vec<_> = state.store.positions(&"new".into()).collect();
        assert_eq!(positions, [&pos(&[42])]);
    }

    #[test]
    fn update_of_live_element_keeps_its_position() {
        let id = ReplicaId::new("a");
        let mut state = CausalStore::<OrArray>::new();
        let delta =
            state
                .store
                .insert_register("x".into(), write("v0"), pos(&[7]), &state.context, &id);
        state = state.join(delta).unwrap();

        let delta = state
            .store
            .apply_to_register(
                "x".into(),
                |reg, cc, id| reg.write(RegisterValue::String("v1".into()), cc, id),
                // the position argument is only an anchor for implicit
                // inserts; a live element keeps its place
                pos(&[9999]),
                &state.context,
                &id,
            )
            .unwrap();
        state = state.join(delta).unwrap();
        let positions: Vec<_> = state.store.positions(&"x".into()).collect();
        assert_eq!(positions, [&pos(&[7])]);
        assert_eq!(values_of(&state.store), ["v1"]);
    }

    #[test]
    fn delete_of_unknown_uid_is_missing_element() {
        let list = OrArray::default();
        assert_eq!(
            list.delete(&"nope".into()),
            Err(MissingElement("nope".into()))
        );
    }

    #[test]
    fn concurrent_delete_and_clear() {
        join_harness(
            OrArray::default(),
            seeded(&[("a", "A", &[1]), ("b", "B", &[2])]),
            |a, _cc, _id| a.delete(&"a".into()).unwrap(),
            |a, _cc, _id| a.clear(),
            |CausalStore { store, .. }| {
                assert!(store.sorted_entries().is_empty());
            },
        );
    }
}
