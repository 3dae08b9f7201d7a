// SPDX-License-Identifier: MIT OR Apache-2.0

//! Interfaces for the storage and notification dependencies of the matching
//! orchestrator.
//!
//! Implementations are injected into the `Matcher` rather than reached
//! through global state, which keeps the orchestrator itself stateless and
//! lets tests substitute both seams.

use std::error::Error;
use std::fmt::{Debug, Display};
use std::hash::Hash as StdHash;

use crate::group::{Assignments, Contact, Group};

/// Identifier of a group or group member.
///
/// An opaque token, nothing is assumed about its internal structure beyond
/// equality. Implemented for every type fulfilling the bounds.
pub trait MemberId: Clone + Debug + Display + Eq + StdHash + Send + Sync {}

impl<T> MemberId for T where T: Clone + Debug + Display + Eq + StdHash + Send + Sync {}

/// Result of attempting the atomic assignment write.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ApplyOutcome {
    /// Every member's recipient was written and the group was marked as
    /// matched.
    Applied,

    /// The group was already marked as matched, nothing was written.
    Conflict,
}

/// Interface for reading group membership and committing one matching
/// result.
pub trait GroupStore<ID>
where
    ID: MemberId,
{
    type Error: Error;

    /// Get a group by its id.
    fn get_group(
        &self,
        group_id: &ID,
    ) -> impl Future<Output = Result<Option<Group<ID>>, Self::Error>>;

    /// List the ids of all members of a group.
    ///
    /// The returned list is a snapshot: its order carries no meaning but is
    /// stable for the duration of one matching run.
    fn member_ids(&self, group_id: &ID) -> impl Future<Output = Result<Vec<ID>, Self::Error>>;

    /// Atomically persist all assignments and mark the group as matched.
    ///
    /// The write is conditional on the group not being matched yet. When a
    /// concurrent run committed first this returns
    /// [`ApplyOutcome::Conflict`] and must not have written anything, a
    /// partial write (some recipients set but the flag unchanged, or the
    /// other way around) is never allowed.
    fn apply_assignments(
        &self,
        group_id: &ID,
        assignments: &Assignments<ID>,
    ) -> impl Future<Output = Result<ApplyOutcome, Self::Error>>;

    /// Load contact details for the given members of a group.
    fn contacts(
        &self,
        group_id: &ID,
        member_ids: &[ID],
    ) -> impl Future<Output = Result<Vec<Contact<ID>>, Self::Error>>;
}

/// Transport delivering one notification per recipient.
///
/// Each send is independent, a failed delivery to one recipient has no
/// effect on the others and is never treated as a failure of the matching
/// run itself.
pub trait NotificationTransport {
    type Error: Error;

    /// Send a single message to one address.
    fn send(
        &self,
        address: &str,
        subject: &str,
        body: &str,
    ) -> impl Future<Output = Result<(), Self::Error>>;
}
