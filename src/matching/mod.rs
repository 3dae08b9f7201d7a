// SPDX-License-Identifier: MIT OR Apache-2.0

//! Matching orchestration: precondition checks, the derangement draw, the
//! atomic assignment write and the best-effort notification fan-out.


use futures_util::future::join_all;
use thiserror::Error;
use tracing::{debug, warn};

use crate::derange::derange;
use crate::group::Assignments;
use crate::traits::{ApplyOutcome, GroupStore, MemberId, NotificationTransport};

/// Smallest group that can be matched.
///
/// A two person group would force a mutual pair exchange and make both
/// assignments fully predictable, so it is rejected as a policy choice even
/// though a valid derangement (the swap) exists.
pub const MIN_GROUP_SIZE: usize = 3;

/// Orchestrator configuration.
#[derive(Clone, Debug)]
pub struct Config {
    /// Base URL used to build the group link embedded into notifications.
    pub app_base_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_base_url: "http://localhost:9002".to_string(),
        }
    }
}

/// Errors returned by [`Matcher::execute_matching`].
///
/// All precondition failures are detected before any mutation, a failed run
/// never leaves partial state behind.
#[derive(Debug, Error)]
pub enum MatchingError<E> {
    #[error("caller is not authenticated")]
    Unauthenticated,

    #[error("group does not exist")]
    GroupNotFound,

    /// Matching already ran for this group. Retrying will not change the
    /// outcome.
    #[error("group members are already matched")]
    AlreadyMatched,

    #[error("only the group moderator can start matching")]
    Forbidden,

    #[error("group has {0} members but at least {MIN_GROUP_SIZE} are required")]
    InsufficientMembers(usize),

    /// A concurrent invocation committed its assignments first. Equivalent
    /// to [`MatchingError::AlreadyMatched`] from the caller's perspective.
    #[error("assignments were committed by a concurrent matching run")]
    Conflict,

    /// The store failed before anything was committed, the group remains
    /// unmatched and the operation is safe to retry.
    #[error("store error: {0}")]
    Store(#[source] E),
}

impl<E> MatchingError<E> {
    /// True when the group was matched by an earlier or concurrent run.
    ///
    /// Callers usually present this as information rather than a failure.
    pub fn is_already_matched(&self) -> bool {
        matches!(self, Self::AlreadyMatched | Self::Conflict)
    }
}

/// Stateless matching orchestrator.
///
/// Holds the injected group store and notification transport and runs the
/// matching operation at most meaningfully once per group: the store's
/// conditional assignment write guarantees that out of any number of racing
/// invocations exactly one commits.
#[derive(Clone, Debug)]
pub struct Matcher<S, N> {
    store: S,
    notifier: N,
    config: Config,
}

impl<S, N> Matcher<S, N> {
    pub fn new(store: S, notifier: N) -> Self {
        Self::with_config(store, notifier, Config::default())
    }

    pub fn with_config(store: S, notifier: N, config: Config) -> Self {
        Self {
            store,
            notifier,
            config,
        }
    }

    /// Run matching for a group on behalf of `caller`.
    ///
    /// Preconditions are checked in a fixed order, each with its own error:
    /// caller authenticated, group exists, group not matched yet, caller is
    /// the moderator, member count at least [`MIN_GROUP_SIZE`]. Only then
    /// the derangement is drawn and committed atomically together with the
    /// matched flag.
    ///
    /// Notification delivery happens after the commit and is best-effort:
    /// individual failures are logged and never change the returned result.
    pub async fn execute_matching<ID>(
        &self,
        group_id: &ID,
        caller: Option<&ID>,
    ) -> Result<Assignments<ID>, MatchingError<S::Error>>
    where
        ID: MemberId,
        S: GroupStore<ID>,
        N: NotificationTransport,
    {
        let Some(caller) = caller else {
            return Err(MatchingError::Unauthenticated);
        };

        let group = self
            .store
            .get_group(group_id)
            .await
            .map_err(MatchingError::Store)?
            .ok_or(MatchingError::GroupNotFound)?;

        if group.matched {
            return Err(MatchingError::AlreadyMatched);
        }

        if group.moderator != *caller {
            return Err(MatchingError::Forbidden);
        }

        // Snapshot of the member set, stable for this invocation.
        let members = self
            .store
            .member_ids(group_id)
            .await
            .map_err(MatchingError::Store)?;

        if members.len() < MIN_GROUP_SIZE {
            return Err(MatchingError::InsufficientMembers(members.len()));
        }

        let recipients = derange(&members);
        let assignments: Assignments<ID> = members.iter().cloned().zip(recipients).collect();

        // Both this and a racing invocation can reach this point after
        // having seen an unmatched group, the conditional write in the
        // store decides which one of them commits.
        match self
            .store
            .apply_assignments(group_id, &assignments)
            .await
            .map_err(MatchingError::Store)?
        {
            ApplyOutcome::Applied => (),
            ApplyOutcome::Conflict => return Err(MatchingError::Conflict),
        }

        debug!(group = %group_id, members = members.len(), "assignments committed");

        self.notify_members(group_id, &group.name, &members).await;

        Ok(assignments)
    }

    /// Tell every member that their group got matched.
    ///
    /// Runs concurrently across members, failures are logged and swallowed.
    async fn notify_members<ID>(&self, group_id: &ID, group_name: &str, members: &[ID])
    where
        ID: MemberId,
        S: GroupStore<ID>,
        N: NotificationTransport,
    {
        let contacts = match self.store.contacts(group_id, members).await {
            Ok(contacts) => contacts,
            Err(err) => {
                warn!(group = %group_id, %err, "skipping notifications, contact lookup failed");
                return;
            }
        };

        let link = format!(
            "{}/groups/{group_id}",
            self.config.app_base_url.trim_end_matches('/')
        );
        let subject = "Your group is matched!";

        join_all(contacts.iter().map(|contact| {
            let body = format!(
                "Hi {}, your group {group_name} is matched! Visit {link}",
                contact.display_name
            );
            async move {
                if let Err(err) = self.notifier.send(&contact.address, subject, &body).await {
                    warn!(member = %contact.id, %err, "notification delivery failed");
                }
            }
        }))
        .await;
    }
}
