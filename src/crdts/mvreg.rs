// (c) Copyright 2025 Helsing GmbH. All rights reserved.
use crate::{
    causal_context::{CausalContext, ReplicaId},
    crdts::TypeMismatch,
    dotstores::{CausalStore, DotFun, DotStore},
};
use std::cmp::Ordering;

/// A **Multi-Value Register**, a CRDT for storing a single, atomic value.
///
/// ## Conflict Handling
///
/// When two replicas concurrently write different values to the same `MvReg`,
/// the register will hold both values simultaneously. A subsequent read
/// returns all conflicting values, allowing the application to resolve the
/// conflict in a way that makes sense for its use case. A subsequent write
/// overwrites all conflicting values, resolving the conflict by establishing
/// a new, single value.
///
/// If a value is concurrently cleared and overwritten, the written value
/// "wins" and the register will contain the new value: the clear erases only
/// the dots its author had observed, and the concurrent write's dot is not
/// among them.
///
/// ## Usage
///
/// An `MvReg` is typically used as a value within an
/// [`OrMap`](crate::OrMap) or [`OrArray`](crate::OrArray), but works
/// stand-alone too:
///
/// ```rust
/// # use jsondelta::{CausalStore, MvReg, ReplicaId, crdts::mvreg::RegisterValue};
/// let mut doc: CausalStore<MvReg> = CausalStore::new();
/// let id = ReplicaId::new("a");
///
/// // Create a delta that writes a value, then merge it into the document.
/// let delta = doc.store.write(RegisterValue::U64(42), &doc.context, &id);
/// doc = doc.join(delta).unwrap();
///
/// assert_eq!(doc.store.values().collect::<Vec<_>>(), [&RegisterValue::U64(42)]);
/// ```
#[derive(Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(::serde::Deserialize, ::serde::Serialize))]
pub struct MvReg(pub(crate) DotFun<RegisterValue>);

impl std::fmt::Debug for MvReg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "${:?}", self.0)
    }
}

macro_rules! impl_partial_eq {
    ({$($t:ty),+}) => {
        $(impl_partial_eq!($t);)+
    };

    ($t:ty) => {
        impl PartialEq<$t> for MvReg {
            fn eq(&self, other: &$t) -> bool {
                self.values().any(|v| v == other)
            }
        }
    };
}
impl_partial_eq!({str, &str, bool, f64, u64, i64});
// i32 because it's the "default" inference integer type
impl_partial_eq!(i32);

impl DotStore for MvReg {
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
        Ok(Self(DotFun::join((m1.0, cc1), (m2.0, cc2))?))
    }
}

impl MvReg {
    /// Reads the set of values currently held by the register, in dot order.
    ///
    /// The set has more than one element exactly when concurrent writes have
    /// not yet been superseded.
    pub fn values(&self) -> impl ExactSizeIterator<Item = &RegisterValue> + Clone {
        self.0.values()
    }

    /// Creates a CRDT that represents the overwrite of all past values of
    /// this register with `v`.
    pub fn write(
        &self,
        v: RegisterValue,
        cc: &CausalContext,
        id: &ReplicaId,
    ) -> CausalStore<Self> {
        let dot = cc.next_dot_for(id);

        // the write collapses the register to a single cell...
        let mut new_state = DotFun::default();
        new_state.set(dot.clone(), v);

        // ...and observes every dot currently in it, so those cells get
        // tombstoned upon join
        let mut new_cc = CausalContext::new();
        new_cc.insert_dot(dot);
        self.add_dots_to(&mut new_cc);

        CausalStore {
            store: Self(new_state),
            context: new_cc,
        }
    }

    /// Creates a CRDT that represents the erasure of all past values of this
    /// register.
    pub fn clear(&self) -> CausalStore<Self> {
        CausalStore {
            store: Self::default(),
            context: self.dots(),
        }
    }
}

/// The value stored in a [`MvReg`].
// NOTE: why no U32 or I32? Make that a serialization concern.
#[derive(Clone)]
#[cfg_attr(feature = "serde", derive(::serde::Deserialize, ::serde::Serialize))]
pub enum RegisterValue {
    // NOTE: the #[serde] here is needed to get efficient encoding of
    // byte-arrays for protocols that support it (like msgpack)
    Bytes(#[cfg_attr(feature = "serde", serde(with = "serde_bytes"))] Vec<u8>),
    String(String),
    Double(f64),
    U64(u64),
    I64(i64),
    Bool(bool),
}

impl RegisterValue {
    /// When ordering values of different types, we order them according to
    /// this rank.
    const fn comparison_order(&self) -> usize {
        // Desired order: Bytes > String > Double > U64 > I64 > Bool
        match self {
            RegisterValue::Bytes(_) => 5,
            RegisterValue::String(_) => 4,
            RegisterValue::Double(_) => 3,
            RegisterValue::U64(_) => 2,
            RegisterValue::I64(_) => 1,
            RegisterValue::Bool(_) => 0,
        }
    }
}

macro_rules! impl_from {
(
    $(
        $source:ty => $target:ident $(with $conv:ident)?
    ),* $(,)?
    ) => {
        $(
            impl From<$source> for RegisterValue {
                fn from(value: $source) -> Self {
                    Self::$target(impl_from!(value$(, $conv)?))
                }
            }
        )*
    };

    ($value:ident, $conv:ident) => {
        $value.$conv()
    };

    ($value:ident) => {
        $value
    };
}

impl_from!(
    &[u8]      => Bytes with into,
    Vec<u8>    => Bytes,
    String     => String,
    &str       => String with to_string,
    f64        => Double,
    u8         => U64 with into,
    u16        => U64 with into,
    u32        => U64 with into,
    u64        => U64,
    i8         => I64 with into,
    i16        => I64 with into,
    i32        => I64 with into,
    i64        => I64,
    bool       => Bool,
);

impl std::fmt::Debug for RegisterValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bytes(inner) => write!(f, "{inner:02X?}"),
            Self::String(inner) => inner.fmt(f),
            Self::Bool(inner) => inner.fmt(f),
            // always print at least 1 decimal so I64 and Double are
            // non-ambiguous (achieved by {:?} instead of {})
            Self::Double(inner) => write!(f, "{inner:?}d"),
            Self::U64(inner) => write!(f, "{inner}u"),
            Self::I64(inner) => write!(f, "{inner}"),
        }
    }
}

impl PartialEq for RegisterValue {
    fn eq(&self, other: &Self) -> bool {
        use RegisterValue::*;
        match (self, other) {
            (Bytes(b1), Bytes(b2)) => b1.eq(b2),
            (String(s1), String(s2)) => s1.eq(s2),
            (Double(d1), Double(d2)) => d1.total_cmp(d2).is_eq(),
            (U64(u1), U64(u2)) => u1.eq(u2),
            (I64(i1), I64(i2)) => i1.eq(i2),
            (Bool(b1), Bool(b2)) => b1.eq(b2),
            _ => false,
        }
    }
}
impl Eq for RegisterValue {}

impl PartialEq<str> for RegisterValue {
    fn eq(&self, other: &str) -> bool {
        matches!(self, Self::String(s) if s == other)
    }
}
impl PartialEq<&str> for RegisterValue {
    fn eq(&self, other: &&str) -> bool {
        matches!(self, Self::String(s) if s == other)
    }
}
impl PartialEq<bool> for RegisterValue {
    fn eq(&self, other: &bool) -> bool {
        matches!(self, Self::Bool(b) if b == other)
    }
}
impl PartialEq<f64> for RegisterValue {
    fn eq(&self, other: &f64) -> bool {
        matches!(self, Self::Double(f) if f == other)
    }
}
impl PartialEq<u64> for RegisterValue {
    fn eq(&self, other: &u64) -> bool {
        match self {
            Self::U64(u) => u == other,
            Self::I64(i) => u64::try_from(*i).is_ok_and(|u| &u == other),
            Self::Bytes(_) | Self::String(_) | Self::Double(_) | Self::Bool(_) => false,
        }
    }
}
impl PartialEq<i64> for RegisterValue {
    fn eq(&self, other: &i64) -> bool {
        match self {
            Self::U64(u) => i64::try_from(*u).is_ok_and(|i| &i == other),
            Self::I64(i) => i == other,
            Self::Bytes(_) | Self::String(_) | Self::Double(_) | Self::Bool(_) => false,
        }
    }
}
// i32 because it's the "default" inference integer type
impl PartialEq<i32> for RegisterValue {
    fn eq(&self, other: &i32) -> bool {
        match self {
            Self::U64(u) => i32::try_from(*u).is_ok_and(|i| &i == other),
            Self::I64(i) => i32::try_from(*i).is_ok_and(|i| &i == other),
            Self::Bytes(_) | Self::String(_) | Self::Double(_) | Self::Bool(_) => false,
        }
    }
}

impl PartialOrd for RegisterValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for RegisterValue {
    fn cmp(&self, other: &Self) -> Ordering {
        use RegisterValue::*;
        match (self, other) {
            (Bytes(b1), Bytes(b2)) => b1.cmp(b2),
            (String(s1), String(s2)) => s1.cmp(s2),
            (Double(d1), Double(d2)) => d1.total_cmp(d2),
            (U64(u1), U64(u2)) => u1.cmp(u2),
            (I64(i1), I64(i2)) => i1.cmp(i2),
            (Bool(b1), Bool(b2)) => b1.cmp(b2),
            (a, b) => {
                let a_order = a.comparison_order();
                let b_order = b.comparison_order();
                debug_assert_ne!(
                    a_order, b_order,
                    "match must handle all comparisons between similar variants"
                );
                a_order.cmp(&b_order)
            }
        }
    }
}

#[cfg(any(test, feature = "arbitrary"))]
mod arbitrary_impls {
    use super::*;
    use quickcheck::{Arbitrary, Gen};

    impl Arbitrary for RegisterValue {
        fn arbitrary(g: &mut Gen) -> Self {
            match u8::arbitrary(g) % 6 {
                0 => RegisterValue::Bytes(Vec::arbitrary(g)),
                1 => RegisterValue::String(String::arbitrary(g)),
                2 => RegisterValue::Double(f64::arbitrary(g)),
                3 => RegisterValue::U64(u64::arbitrary(g)),
                4 => RegisterValue::I64(i64::arbitrary(g)),
                _ => RegisterValue::Bool(bool::arbitrary(g)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{causal_context::Dot, crdts::test_util::join_harness};

    #[test]
    fn empty() {
        let cds = CausalStore::<MvReg>::default();
        assert_eq!(cds.store.values().len(), 0);
        assert!(cds.store.is_bottom());
    }

    #[test]
    fn clear_and_write() {
        join_harness(
            MvReg::default(),
            |CausalStore {
                 store: m,
                 context: cc,
             },
             id| m.write(RegisterValue::Bool(false), &cc, id),
            |m, cc, id| m.write(RegisterValue::Bool(true), &cc, id),
            |m, _cc, _id| m.clear(),
            |CausalStore { store: m, .. }| {
                // for a concurrent clear and write, only the written value
                // should remain
                assert!(!m.is_bottom());
                let values: Vec<_> = m.values().collect();
                assert_eq!(values, [&RegisterValue::Bool(true)]);
            },
        );
    }

    #[test]
    fn concurrent_writes_conflict() {
        join_harness(
            MvReg::default(),
            |cds, _| cds,
            |m, cc, id| m.write(RegisterValue::Bool(true), &cc, id),
            |m, cc, id| m.write(RegisterValue::U64(42), &cc, id),
            |CausalStore { store: m, .. }| {
                assert_eq!(m.values().len(), 2);
                assert!(m == true);
                assert!(m == 42u64);
            },
        );
    }

    #[quickcheck]
    fn write_dominates(vs: Vec<(Dot, RegisterValue)>, new: RegisterValue) {
        let mut dedup_dots = std::collections::HashSet::new();
        let vs: Vec<_> = vs.into_iter().filter(|x| dedup_dots.insert(x.0.clone())).collect();

        let mut cds = CausalStore::<MvReg>::new();
        for (dot, v) in &vs {
            cds.store.0.set(dot.clone(), v.clone());
        }
        cds.store.add_dots_to(&mut cds.context);

        // use a fresh replica so its dot track is trivially compact
        let id = ReplicaId::new("writer");

        // write a new value that dominates all the past writes
        let delta = cds.store.write(new, &cds.context, &id);
        assert_eq!(delta.store.0.len(), 1);
        for (dot, _) in &vs {
            assert!(delta.context.contains(dot));
        }

        // the delta takes effect when joined into the original state
        let cds = cds.join(delta).unwrap();
        assert_eq!(cds.store.values().len(), 1);

        // clearing afterwards leaves nothing
        let clear = cds.store.clear();
        assert_eq!(clear.store.0.len(), 0);
        let cds = cds.join(clear).unwrap();
        assert_eq!(cds.store.values().len(), 0);
    }

    #[quickcheck]
    fn cmp_is_involutive(v1: RegisterValue, v2: RegisterValue) {
        assert_eq!(v1.cmp(&v2), v2.cmp(&v1).reverse());
    }
}
