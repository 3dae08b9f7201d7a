// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory group store.
//!
//! This does not persist data permanently, all state is lost when the
//! process ends. Use this only in development or test contexts.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::group::{Assignments, Contact, Group};
use crate::traits::{ApplyOutcome, GroupStore, MemberId};

#[derive(Clone, Debug)]
struct MemberRecord<ID> {
    contact: Contact<ID>,
    recipient: Option<ID>,
}

#[derive(Clone, Debug)]
struct GroupRecord<ID> {
    group: Group<ID>,

    // Insertion order is kept so member snapshots are stable.
    members: Vec<ID>,
    records: HashMap<ID, MemberRecord<ID>>,
}

/// In-memory group store.
///
/// Cloned handles share the same state, which makes it possible to observe
/// the effect of a matching run from a test while a `Matcher` holds its own
/// handle.
#[derive(Clone, Debug)]
pub struct MemoryStore<ID> {
    groups: Arc<Mutex<HashMap<ID, GroupRecord<ID>>>>,
}

impl<ID> MemoryStore<ID>
where
    ID: MemberId,
{
    pub fn new() -> Self {
        Self {
            groups: Arc::default(),
        }
    }

    /// Insert a group with no members yet.
    pub async fn insert_group(&self, group: Group<ID>) {
        let mut groups = self.groups.lock().await;
        groups.insert(
            group.id.clone(),
            GroupRecord {
                group,
                members: Vec::new(),
                records: HashMap::new(),
            },
        );
    }

    /// Add a member with their contact details to a group.
    ///
    /// Returns `false` when the group is unknown.
    pub async fn insert_member(&self, group_id: &ID, contact: Contact<ID>) -> bool {
        let mut groups = self.groups.lock().await;
        let Some(record) = groups.get_mut(group_id) else {
            return false;
        };
        record.members.push(contact.id.clone());
        record.records.insert(
            contact.id.clone(),
            MemberRecord {
                contact,
                recipient: None,
            },
        );
        true
    }

    /// The recipient assigned to a member, if matching has run.
    pub async fn assigned_recipient(&self, group_id: &ID, member_id: &ID) -> Option<ID> {
        let groups = self.groups.lock().await;
        groups
            .get(group_id)?
            .records
            .get(member_id)?
            .recipient
            .clone()
    }
}

impl<ID> Default for MemoryStore<ID>
where
    ID: MemberId,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<ID> GroupStore<ID> for MemoryStore<ID>
where
    ID: MemberId,
{
    type Error = Infallible;

    async fn get_group(&self, group_id: &ID) -> Result<Option<Group<ID>>, Self::Error> {
        let groups = self.groups.lock().await;
        Ok(groups.get(group_id).map(|record| record.group.clone()))
    }

    async fn member_ids(&self, group_id: &ID) -> Result<Vec<ID>, Self::Error> {
        let groups = self.groups.lock().await;
        Ok(groups
            .get(group_id)
            .map(|record| record.members.clone())
            .unwrap_or_default())
    }

    async fn apply_assignments(
        &self,
        group_id: &ID,
        assignments: &Assignments<ID>,
    ) -> Result<ApplyOutcome, Self::Error> {
        // The lock is held across the check and all writes, making this the
        // in-memory equivalent of a transaction.
        let mut groups = self.groups.lock().await;
        let Some(record) = groups.get_mut(group_id) else {
            // The orchestrator checked existence before, a group vanishing
            // in between behaves like a lost race.
            return Ok(ApplyOutcome::Conflict);
        };

        if record.group.matched {
            return Ok(ApplyOutcome::Conflict);
        }

        for (giver, recipient) in assignments {
            if let Some(member) = record.records.get_mut(giver) {
                member.recipient = Some(recipient.clone());
            }
        }
        record.group.matched = true;

        Ok(ApplyOutcome::Applied)
    }

    async fn contacts(
        &self,
        group_id: &ID,
        member_ids: &[ID],
    ) -> Result<Vec<Contact<ID>>, Self::Error> {
        let groups = self.groups.lock().await;
        let Some(record) = groups.get(group_id) else {
            return Ok(Vec::new());
        };
        Ok(member_ids
            .iter()
            .filter_map(|id| record.records.get(id))
            .map(|member| member.contact.clone())
            .collect())
    }
}
