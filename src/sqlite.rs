// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite-backed group store.
//!
//! The assignment write runs inside a single transaction guarded by a
//! conditional update on the matched flag, which closes the race between
//! two invocations that both read an unmatched group.

use std::str::FromStr;

use sqlx::migrate::{MigrateDatabase, Migrator};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Sqlite, migrate, query, query_as};
use thiserror::Error;

use crate::group::{Assignments, Contact, Group};
use crate::traits::{ApplyOutcome, GroupStore, MemberId};

/// Create SQLite database if it doesn't already exist.
pub async fn create_database(url: &str) -> Result<(), SqliteError> {
    if !Sqlite::database_exists(url).await? {
        Sqlite::create_database(url).await?
    }
    Ok(())
}

/// Get migrations from folder without running them.
pub fn migrations() -> Migrator {
    migrate!()
}

/// Run any pending database migrations from inside the application.
pub async fn run_pending_migrations(pool: &sqlx::SqlitePool) -> Result<(), SqliteError> {
    migrations().run(pool).await?;
    Ok(())
}

pub struct SqliteStoreBuilder {
    url: String,
    max_connections: u32,
    run_migrations: bool,
    create_database: bool,
}

impl Default for SqliteStoreBuilder {
    fn default() -> Self {
        Self {
            url: "sqlite::memory:".into(),
            max_connections: 16,
            create_database: true,
            run_migrations: true,
        }
    }
}

impl SqliteStoreBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(any(test, feature = "test_utils"))]
    pub fn random_memory_url(mut self) -> Self {
        // Combining Rust tests with in-memory databases can lead to unsound
        // behaviour, this "workaround" assigns every temporary database a
        // different, random name and keeps them isolated from other tests.
        //
        // See related issue: https://github.com/launchbadge/sqlx/issues/2510
        self.url = format!(
            "sqlite://dbmem{}?mode=memory&cache=private",
            rand::random::<u32>()
        );
        self
    }

    pub fn database_url(mut self, url: &str) -> Self {
        self.url = url.to_string();
        self
    }

    pub fn max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }

    pub fn create_database(mut self, create_database: bool) -> Self {
        self.create_database = create_database;
        self
    }

    pub fn run_default_migrations(mut self, run_migrations: bool) -> Self {
        self.run_migrations = run_migrations;
        self
    }

    pub async fn build(self) -> Result<SqliteStore, SqliteError> {
        if self.create_database {
            create_database(&self.url).await?;
        }

        let pool: sqlx::SqlitePool = SqlitePoolOptions::new()
            .max_connections(self.max_connections)
            .connect(&self.url)
            .await?;

        if self.run_migrations {
            run_pending_migrations(&pool).await?;
        }

        Ok(SqliteStore::new(pool))
    }
}

/// SQLite database with connection pool.
///
/// This struct can be cloned and used in multiple places in the
/// application, every cloned instance re-uses the same connection pool.
#[derive(Clone, Debug)]
pub struct SqliteStore {
    pool: sqlx::SqlitePool,
}

impl SqliteStore {
    pub(crate) fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }

    /// Shortcut building an in-memory SQLite database with a randomised
    /// name for testing purposes.
    #[cfg(any(test, feature = "test_utils"))]
    pub async fn temporary() -> Self {
        SqliteStoreBuilder::new()
            .random_memory_url()
            .max_connections(1)
            .build()
            .await
            .expect("migrations succeeded")
    }

    /// Insert a group row.
    pub async fn insert_group<ID>(&self, group: &Group<ID>) -> Result<(), SqliteError>
    where
        ID: MemberId,
    {
        query(
            "
            INSERT
            INTO
                groups_v1 (
                    id,
                    name,
                    moderator_id,
                    is_matched
                )
            VALUES
                (?, ?, ?, ?)
            ",
        )
        .bind(group.id.to_string())
        .bind(&group.name)
        .bind(group.moderator.to_string())
        .bind(group.matched)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Insert a membership row with contact details.
    pub async fn insert_member<ID>(
        &self,
        group_id: &ID,
        contact: &Contact<ID>,
    ) -> Result<(), SqliteError>
    where
        ID: MemberId,
    {
        query(
            "
            INSERT
            INTO
                memberships_v1 (
                    group_id,
                    member_id,
                    email,
                    display_name
                )
            VALUES
                (?, ?, ?, ?)
            ",
        )
        .bind(group_id.to_string())
        .bind(contact.id.to_string())
        .bind(&contact.address)
        .bind(&contact.display_name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// The recipient column of one membership row, if matching has run.
    pub async fn assigned_recipient<ID>(
        &self,
        group_id: &ID,
        member_id: &ID,
    ) -> Result<Option<ID>, SqliteError>
    where
        ID: MemberId + FromStr,
    {
        let row: Option<(Option<String>,)> = query_as(
            "
            SELECT
                recipient_id
            FROM
                memberships_v1
            WHERE
                group_id = ? AND member_id = ?
            ",
        )
        .bind(group_id.to_string())
        .bind(member_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some((Some(value),)) => Ok(Some(parse_id(&value, "recipient_id")?)),
            _ => Ok(None),
        }
    }
}

fn parse_id<ID>(value: &str, column: &str) -> Result<ID, SqliteError>
where
    ID: FromStr,
{
    value
        .parse()
        .map_err(|_| SqliteError::Decode(column.to_string()))
}

impl<ID> GroupStore<ID> for SqliteStore
where
    ID: MemberId + FromStr,
{
    type Error = SqliteError;

    async fn get_group(&self, group_id: &ID) -> Result<Option<Group<ID>>, Self::Error> {
        let row: Option<(String, String, bool)> = query_as(
            "
            SELECT
                name,
                moderator_id,
                is_matched
            FROM
                groups_v1
            WHERE
                id = ?
            ",
        )
        .bind(group_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some((name, moderator, matched)) => Ok(Some(Group {
                id: group_id.clone(),
                name,
                moderator: parse_id(&moderator, "moderator_id")?,
                matched,
            })),
            None => Ok(None),
        }
    }

    async fn member_ids(&self, group_id: &ID) -> Result<Vec<ID>, Self::Error> {
        let rows: Vec<(String,)> = query_as(
            "
            SELECT
                member_id
            FROM
                memberships_v1
            WHERE
                group_id = ?
            ORDER BY
                rowid
            ",
        )
        .bind(group_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|(member_id,)| parse_id(member_id, "member_id"))
            .collect()
    }

    async fn apply_assignments(
        &self,
        group_id: &ID,
        assignments: &Assignments<ID>,
    ) -> Result<ApplyOutcome, Self::Error> {
        let mut tx = self.pool.begin().await?;

        // Conditional flag flip, the compare-and-swap deciding which of any
        // number of racing invocations commits.
        let result = query(
            "
            UPDATE
                groups_v1
            SET
                is_matched = TRUE
            WHERE
                id = ? AND is_matched = FALSE
            ",
        )
        .bind(group_id.to_string())
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(ApplyOutcome::Conflict);
        }

        for (giver, recipient) in assignments {
            query(
                "
                UPDATE
                    memberships_v1
                SET
                    recipient_id = ?
                WHERE
                    group_id = ? AND member_id = ?
                ",
            )
            .bind(recipient.to_string())
            .bind(group_id.to_string())
            .bind(giver.to_string())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(ApplyOutcome::Applied)
    }

    async fn contacts(
        &self,
        group_id: &ID,
        member_ids: &[ID],
    ) -> Result<Vec<Contact<ID>>, Self::Error> {
        let rows: Vec<(String, String, String)> = query_as(
            "
            SELECT
                member_id,
                email,
                display_name
            FROM
                memberships_v1
            WHERE
                group_id = ?
            ORDER BY
                rowid
            ",
        )
        .bind(group_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        let mut contacts = Vec::with_capacity(rows.len());
        for (member_id, address, display_name) in rows {
            let id: ID = parse_id(&member_id, "member_id")?;
            if member_ids.contains(&id) {
                contacts.push(Contact {
                    id,
                    address,
                    display_name,
                });
            }
        }
        Ok(contacts)
    }
}

#[derive(Debug, Error)]
pub enum SqliteError {
    /// SQLite database and connection error.
    #[error(transparent)]
    Sqlite(#[from] sqlx::Error),

    /// SQL table schema migration error.
    #[error(transparent)]
    Migrate(#[from] sqlx::migrate::MigrateError),

    /// Invalid, corrupted data was found in the database. This is a
    /// critical error.
    #[error("could not decode corrupted '{0}' value from database")]
    Decode(String),
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use crate::group::{Contact, Group};
    use crate::traits::{ApplyOutcome, GroupStore};

    use super::SqliteStore;

    fn group(matched: bool) -> Group<String> {
        Group {
            id: "group-1".to_string(),
            name: "Office Party".to_string(),
            moderator: "alice".to_string(),
            matched,
        }
    }

    fn contact(id: &str) -> Contact<String> {
        Contact {
            id: id.to_string(),
            address: format!("{id}@example.org"),
            display_name: id.to_string(),
        }
    }

    #[tokio::test]
    async fn read_back_groups_and_members() {
        let store = SqliteStore::temporary().await;
        let group_id = "group-1".to_string();

        store.insert_group(&group(false)).await.unwrap();
        for member in ["alice", "bob", "claire"] {
            store.insert_member(&group_id, &contact(member)).await.unwrap();
        }

        let loaded: Group<String> = store.get_group(&group_id).await.unwrap().unwrap();
        assert_eq!(loaded, group(false));

        let members: Vec<String> = store.member_ids(&group_id).await.unwrap();
        assert_eq!(members, vec!["alice", "bob", "claire"]);

        let contacts = store.contacts(&group_id, &members).await.unwrap();
        assert_eq!(contacts.len(), 3);
        assert_eq!(contacts[1].address, "bob@example.org");

        let missing: Option<Group<String>> =
            store.get_group(&"nope".to_string()).await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn conditional_update_commits_only_once() {
        let store = SqliteStore::temporary().await;
        let group_id = "group-1".to_string();

        store.insert_group(&group(false)).await.unwrap();
        for member in ["alice", "bob", "claire"] {
            store.insert_member(&group_id, &contact(member)).await.unwrap();
        }

        let first: HashMap<String, String> = [
            ("alice".to_string(), "bob".to_string()),
            ("bob".to_string(), "claire".to_string()),
            ("claire".to_string(), "alice".to_string()),
        ]
        .into();
        let second: HashMap<String, String> = [
            ("alice".to_string(), "claire".to_string()),
            ("bob".to_string(), "alice".to_string()),
            ("claire".to_string(), "bob".to_string()),
        ]
        .into();

        assert_eq!(
            store.apply_assignments(&group_id, &first).await.unwrap(),
            ApplyOutcome::Applied
        );

        // The lost race writes nothing.
        assert_eq!(
            store.apply_assignments(&group_id, &second).await.unwrap(),
            ApplyOutcome::Conflict
        );

        for (giver, recipient) in &first {
            assert_eq!(
                store.assigned_recipient(&group_id, giver).await.unwrap(),
                Some(recipient.clone())
            );
        }

        let loaded: Group<String> = store.get_group(&group_id).await.unwrap().unwrap();
        assert!(loaded.matched);
    }
}
