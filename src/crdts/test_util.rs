// (c) Copyright 2025 Helsing GmbH. All rights reserved.
use crate::{
    causal_context::{CausalContext, ReplicaId},
    dotstores::{CausalStore, DotStore},
};

/// Drives two concurrent writers over a shared initial state and hands the
/// converged result to `check`.
///
/// `init` seeds the state as replica "seed"; `w1` and `w2` then each produce
/// a delta from that state as replicas "r1" and "r2" without seeing each
/// other, and both deltas are joined back together.
pub(crate) fn join_harness<DS, Init, W1, W2, C>(zero: DS, init: Init, w1: W1, w2: W2, check: C)
where
    DS: DotStore + Clone + PartialEq + std::fmt::Debug,
    Init: FnOnce(CausalStore<DS>, &ReplicaId) -> CausalStore<DS>,
    W1: FnOnce(&DS, CausalContext, &ReplicaId) -> CausalStore<DS>,
    W2: FnOnce(&DS, CausalContext, &ReplicaId) -> CausalStore<DS>,
    C: FnOnce(CausalStore<DS>),
{
    let seed_id = ReplicaId::new("seed");
    let v = init(
        CausalStore {
            store: zero,
            context: CausalContext::new(),
        },
        &seed_id,
    );

    let w1_id = ReplicaId::new("r1");
    let w1_v = w1(&v.store, v.context.clone(), &w1_id);
    let w2_id = ReplicaId::new("r2");
    let w2_v = w2(&v.store, v.context.clone(), &w2_id);

    // join the two concurrent deltas into the seed state, both ways, and
    // make sure the outcome doesn't depend on the order
    let one_way = v
        .clone()
        .join(w1_v.clone())
        .and_then(|s| s.join(w2_v.clone()))
        .expect("writers agree on types");
    let other_way = v
        .join(w2_v)
        .and_then(|s| s.join(w1_v))
        .expect("writers agree on types");
    assert_eq!(one_way, other_way, "join must be order-independent");

    check(one_way)
}
