// SPDX-License-Identifier: MIT OR Apache-2.0

//! Matching engine for Secret Santa style gift exchange groups.
//!
//! The crate has two parts: a pure [`derange`] function drawing a
//! fixed-point-free permutation ("nobody gifts themselves") and a
//! [`Matcher`](matching::Matcher) orchestrating one matching run per group:
//! precondition checks, the draw, an atomic write of the giver to recipient
//! assignments and a best-effort notification fan-out.
//!
//! Storage and notification delivery sit behind the traits in [`traits`],
//! with an in-memory backend for development and tests and a SQLite backend
//! showing the conditional update which guarantees at-most-once matching
//! under concurrent invocations.

mod derange;
mod group;
pub mod matching;
#[cfg(feature = "memory")]
pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;
#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;
pub mod traits;

pub use derange::{derange, derange_with_rng};
pub use group::{Assignments, Contact, Group};
pub use matching::{Config, MIN_GROUP_SIZE, Matcher, MatchingError};
pub use traits::{ApplyOutcome, GroupStore, MemberId, NotificationTransport};
