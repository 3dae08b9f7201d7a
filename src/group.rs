// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::HashMap;

/// Giver to recipient mapping produced by one successful matching run.
///
/// The map is total over the member set of a group: every member appears
/// exactly once as a key and exactly once as a value, and no member is
/// mapped onto themselves. It is created once per group and immutable
/// afterwards.
pub type Assignments<ID> = HashMap<ID, ID>;

/// A gift exchange group.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Group<ID> {
    pub id: ID,
    pub name: String,

    /// The member allowed to trigger matching for this group.
    pub moderator: ID,

    /// Once true the group stays matched, there is no re-matching.
    pub matched: bool,
}

/// Contact details of one group member, used for notification delivery.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Contact<ID> {
    pub id: ID,
    pub address: String,
    pub display_name: String,
}
