// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Macros usable for tests and initialization.

/// Convenience macro for creating dot values.
///
/// NOTE! This is mostly useful for tests and examples.
///
/// ```rust
/// use jsondelta::{Dot, dot};
/// assert_eq!(dot!("a", 3), Dot::mint("a", 3));
/// ```
#[macro_export]
macro_rules! dot {
    ($replica:expr, $seq:expr) => {
        $crate::Dot::mint($replica, $seq)
    };
}

/// Convenience macro for creating a [`CausalContext`](crate::CausalContext)
/// from a list of dots.
///
/// ```rust
/// use jsondelta::{ctx, dot};
/// let cc = ctx![dot!("a", 1), dot!("a", 2), dot!("b", 4)];
/// assert!(cc.contains(&dot!("a", 2)));
/// assert!(!cc.contains(&dot!("b", 3)));
/// ```
#[macro_export]
macro_rules! ctx {
    ($($dot:expr),* $(,)?) => {
        <$crate::CausalContext as ::std::iter::FromIterator<$crate::Dot>>::from_iter([$($dot),*])
    };
}
