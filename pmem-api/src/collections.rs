//! Collections used by the planning crates
//!
//! `hashbrown` provides hash maps without `std`; ordered maps come from
//! `alloc` so iteration over sockets and set indices is deterministic.

pub use alloc::collections::{BTreeMap, BTreeSet};
pub use hashbrown::{HashMap, HashSet};
