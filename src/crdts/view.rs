// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Read-only snapshots of CRDT state.
//!
//! A [`View`] is a plain, JSON-shaped tree borrowed from a CRDT at a
//! particular point in time: objects from [`OrMap`], sequences from
//! [`OrArray`], and *value sets* from [`MvReg`]. Register views are
//! explicitly set-valued: a register written concurrently by two replicas
//! holds both values, and collapsing that to a single value is the host's
//! decision, not the engine's.
use super::{
    Node,
    mvreg::{MvReg, RegisterValue},
    orarray::OrArray,
    ormap::OrMap,
};
use std::{collections::BTreeMap, fmt, hash::Hash};

/// A read-only, JSON-shaped snapshot of a CRDT.
#[derive(Debug, Clone, PartialEq)]
pub enum View<'doc> {
    /// A JSON-like object, from an [`OrMap`].
    Object(BTreeMap<String, View<'doc>>),
    /// An ordered sequence, from an [`OrArray`].
    Sequence(Vec<View<'doc>>),
    /// The value set of an [`MvReg`], in dot order. More than one element
    /// exactly when concurrent writes have not been superseded.
    Register(Vec<&'doc RegisterValue>),
}

impl<'doc> View<'doc> {
    /// Returns the object fields if this view is an object.
    pub fn as_object(&self) -> Option<&BTreeMap<String, View<'doc>>> {
        match self {
            View::Object(fields) => Some(fields),
            _ => None,
        }
    }

    /// Returns the elements if this view is a sequence.
    pub fn as_sequence(&self) -> Option<&[View<'doc>]> {
        match self {
            View::Sequence(elements) => Some(elements),
            _ => None,
        }
    }

    /// Returns the value set if this view is a register.
    pub fn as_register(&self) -> Option<&[&'doc RegisterValue]> {
        match self {
            View::Register(values) => Some(values),
            _ => None,
        }
    }
}

impl MvReg {
    /// The set of values currently held, as a [`View`].
    pub fn view(&self) -> View<'_> {
        View::Register(self.values().collect())
    }
}

impl<K> OrMap<K>
where
    K: Hash + Eq + fmt::Display,
{
    /// A snapshot of this map and everything below it.
    pub fn view(&self) -> View<'_> {
        View::Object(
            self.iter()
                .map(|(k, node)| (k.to_string(), node.view()))
                .collect(),
        )
    }
}

impl OrArray {
    /// A snapshot of this array's live elements, in position order.
    pub fn view(&self) -> View<'_> {
        View::Sequence(
            self.sorted_entries()
                .into_iter()
                .map(|(_, _, node)| node.view())
                .collect(),
        )
    }
}

impl Node {
    /// A snapshot of the CRDT held by this node.
    pub fn view(&self) -> View<'_> {
        match self {
            Node::Map(m) => m.view(),
            Node::Array(a) => a.view(),
            Node::Register(r) => r.view(),
        }
    }
}
