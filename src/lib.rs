// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! # jsondelta: A Delta-State CRDT Engine for JSON-Shaped Data
//!
//! This crate implements the replicated-state core of a delta-based CRDT for
//! JSON-like data structures. Many replicas concurrently mutate a nested
//! value built from maps, ordered arrays, and multi-value registers, and
//! later exchange *deltas* that, when merged, drive every replica to the
//! same state without coordination.
//!
//! Rather than exposing a single "Document" type, the crate provides a set
//! of composable primitives:
//!
//! - [`OrMap`]: an **Observed-Remove Map**, mapping arbitrary keys to other
//!   CRDT values. The usual top-level structure is an `OrMap` wrapped in a
//!   [`CausalStore`].
//! - [`OrArray`]: an **Observed-Remove Array** with stable positions and a
//!   move operation. Elements are identified by an application-provided
//!   [`Uid`](crdts::orarray::Uid) and ordered by [`Position`] keys; the
//!   resulting sequence is a pure function of the merged state, identical on
//!   every replica.
//! - [`MvReg`]: a **Multi-Value Register** for primitive values. When
//!   concurrent writes occur, the register holds all conflicting values;
//!   this is the only CRDT in this crate that can represent value conflicts.
//!
//! All modifications produce a **delta**: a state-shaped value carrying only
//! the change and the dots that justify it. Instead of sending the entire
//! state after each change, only the delta needs to be transmitted to other
//! replicas, where [`CausalStore::join`] merges it in. Convergence follows
//! from `join` being commutative, associative, and idempotent: replicas may
//! apply the same set of deltas in any order, along any grouping, any number
//! of times, and end up in identical states.
//!
//! ## Dots and Causal Contexts
//!
//! A **dot** is a globally unique identifier for a single write: a
//! ([`ReplicaId`], sequence) pair, with the sequence number monotonically
//! increasing per replica. The set of all dots a replica has observed forms
//! its [`CausalContext`]. By comparing causal contexts, replicas determine
//! which operations are new, which are concurrent, and which have already
//! been seen.
//!
//! This model eliminates per-element tombstone records: a removal is the
//! *presence* of a dot in the causal context coupled with the *absence* of
//! its payload from the store. Removals therefore cost no store space, and
//! an element can only be removed by a replica that has actually observed
//! it, which is what gives the collections their **add-wins** (and the
//! array its **move-wins**) character.
//!
//! ## Scope of this crate
//!
//! This is a low-level library: it generates deltas from mutations and
//! merges them to ensure eventual consistency. **It does not include any
//! networking**; you are responsible for the transport layer that exchanges
//! deltas and their causal metadata between replicas (for example via an
//! anti-entropy protocol using [`CausalStore::delta_since`] and
//! [`deletions_unknown_to`]). Durability, access control, and schema
//! validation likewise belong to the host.
//!
//! ## Getting started: a simple conflict
//!
//! ```rust
//! use jsondelta::{CausalStore, OrMap, ReplicaId, crdts::mvreg::RegisterValue};
//!
//! // Two replicas, each with a unique id.
//! let alice = ReplicaId::new("alice");
//! let mut alice_doc = CausalStore::<OrMap<String>>::new();
//! let bob = ReplicaId::new("bob");
//! let mut bob_doc = CausalStore::<OrMap<String>>::new();
//!
//! // Alice creates an initial value, and Bob receives it.
//! let delta = alice_doc.store.apply_to_register(
//!     |reg, cc, id| reg.write(RegisterValue::String("initial".into()), cc, id),
//!     "document".into(),
//!     &alice_doc.context,
//!     &alice,
//! ).unwrap();
//! alice_doc = alice_doc.join(delta.clone()).unwrap();
//! bob_doc = bob_doc.join(delta).unwrap();
//! assert_eq!(alice_doc, bob_doc);
//!
//! // Both edit concurrently...
//! let from_alice = alice_doc.store.apply_to_register(
//!     |reg, cc, id| reg.write(RegisterValue::String("from alice".into()), cc, id),
//!     "document".into(),
//!     &alice_doc.context,
//!     &alice,
//! ).unwrap();
//! let from_bob = bob_doc.store.apply_to_register(
//!     |reg, cc, id| reg.write(RegisterValue::String("from bob".into()), cc, id),
//!     "document".into(),
//!     &bob_doc.context,
//!     &bob,
//! ).unwrap();
//!
//! // ...and exchange deltas.
//! alice_doc = alice_doc.join(from_bob.clone()).unwrap();
//! alice_doc = alice_doc.join(from_alice.clone()).unwrap();
//! bob_doc = bob_doc.join(from_alice).unwrap();
//! bob_doc = bob_doc.join(from_bob).unwrap();
//!
//! // The replicas converge, and the conflict is preserved as a value set.
//! assert_eq!(alice_doc, bob_doc);
//! let reg = alice_doc.store.get("document").unwrap().as_register().unwrap().unwrap();
//! assert_eq!(reg.values().len(), 2);
//! ```
//!
//! ## Features
//!
//! - `json` (default): conversion of [`crdts::view::View`] snapshots to
//!   `serde_json::Value`, with conflicts rendered as arrays.
//! - `serde`: `serde` support for all CRDT state types.
//! - `arbitrary`: `quickcheck::Arbitrary` impls for core types, useful for
//!   property-based testing in dependent crates.
#[cfg(test)]
#[macro_use(quickcheck)]
extern crate quickcheck_macros;

use std::collections::HashMap;
use std::ops::BitAnd;

pub mod causal_context;
pub use causal_context::{CausalContext, Dot, ReplicaId};
mod dotstores;
pub use dotstores::{CausalStore, DotFun, DotFunMap, DotMap, DotStore};
pub mod crdts;
pub use crdts::{Node, NodeKind, TypeMismatch, mvreg::MvReg, orarray::OrArray, ormap::OrMap};
pub use crdts::orarray::Position;
#[cfg(feature = "json")]
mod json;
pub mod macros;

pub(crate) fn create_map<K, V>() -> HashMap<K, V, ahash::RandomState> {
    HashMap::default()
}

pub(crate) fn create_map_with_capacity<K, V>(
    capacity: usize,
) -> HashMap<K, V, ahash::RandomState> {
    HashMap::with_capacity_and_hasher(capacity, ahash::RandomState::default())
}

// NOTE: three arguments all of the same type -- big nope to have them be regular fn args.
pub struct DeletionsArg<'a> {
    /// Should be the causal context (ie, `.context`) of the more up to date
    /// [`CausalStore`].
    pub known_dots: &'a CausalContext,

    /// Should be `store.dots()` of the more up to date [`CausalStore`].
    pub live_dots: &'a CausalContext,

    /// Should be `store.dots()` of the [`CausalStore`] that may be missing
    /// deletes.
    pub ignorant: &'a CausalContext,
}

/// Returns dots that `known_dots` has deleted (by virtue of not being in
/// `live_dots`) that are still present in `ignorant`.
///
/// Conceptually computes `(known_dots - live_dots) ∩ ignorant`. This is the
/// piece a sync layer needs on top of [`CausalStore::delta_since`]: removals
/// of entries the receiver observed *before* the sender's frontier introduce
/// no new dots and thus never appear in a context difference.
pub fn deletions_unknown_to(
    DeletionsArg {
        known_dots,
        live_dots,
        ignorant,
    }: DeletionsArg,
) -> CausalContext {
    // conceptually:
    //
    //     let deletes_ever = known_dots - live_dots;
    //     let relevant_deletes = deletes_ever & ignorant;
    //
    // however, deletes_ever holds all deletes ever, which is wasteful since
    // most of those dots then go away in the intersection. set identities
    // give us (with \ denoting subtraction):
    //
    //     (L \ M) ∩ R = L ∩ (R \ M)
    //
    // and since both operators cost O(|left operand|), computing the small
    // (R \ M) first never materializes the big set.
    let only_in_ignorant = ignorant - live_dots;
    only_in_ignorant.bitand(known_dots)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crdts::mvreg::RegisterValue;

    #[test]
    fn deletions_reach_a_peer_behind_the_frontier() {
        let id = ReplicaId::new("a");
        let mut state = CausalStore::<MvReg>::new();
        let write = state
            .store
            .write(RegisterValue::Bool(true), &state.context, &id);
        state = state.join(write).unwrap();

        // a peer fully synchronized at this point
        let mut peer = state.clone();

        // the state then clears the register; no new dot is minted, so
        // delta_since against the peer's context carries nothing
        let clear = state.store.clear();
        state = state.join(clear).unwrap();
        assert!(state.delta_since(&peer.context).context.is_empty());

        // the deletions helper finds what the peer still holds but the state
        // has dropped
        let removals = deletions_unknown_to(DeletionsArg {
            known_dots: &state.context,
            live_dots: &state.store.dots(),
            ignorant: &peer.store.dots(),
        });
        assert!(!removals.is_empty());

        // shipping a bottom store under those dots erases the peer's copy
        peer = peer
            .join(CausalStore {
                store: MvReg::default(),
                context: removals,
            })
            .unwrap();
        assert_eq!(peer, state);
    }
}
