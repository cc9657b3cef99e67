//! Identity store: users and the hostmask rules that recognize them.
//!
//! A live connection is identified by its `nick!user@host` triple. Each
//! [`Hostmask`] binds a triple of glob patterns to a [`User`]; resolving a
//! connection means finding every user with at least one matching hostmask.

use super::{DbError, MemoryAnchor};
use super::glob;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use sqlx::SqlitePool;
use std::fmt;
use std::sync::Arc;

/// Shared handle to the identity store handed to plugins.
pub type UserDatabase = Arc<dyn IdentityStore>;

/// A persisted account.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct User {
    /// Row id, assigned by the store on first save.
    pub id: Option<i64>,
    /// Optional unique account name.
    pub name: Option<String>,
    /// Only ever set explicitly.
    pub admin: bool,
    pub last_seen: Option<DateTime<Utc>>,
}

impl User {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }
}

/// A recognition rule binding a `nick!user@host` pattern triple to a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hostmask {
    pub id: Option<i64>,
    pub user_id: i64,
    pub nickname: String,
    pub username: String,
    pub hostname: String,
    pub created_at: DateTime<Utc>,
}

impl Hostmask {
    /// A match-everything hostmask owned by `user_id`.
    pub fn new(user_id: i64) -> Self {
        Self {
            id: None,
            user_id,
            nickname: "*".to_string(),
            username: "*".to_string(),
            hostname: "*".to_string(),
            created_at: Utc::now(),
        }
    }

    /// A match-everything hostmask owned by an already saved user.
    pub fn for_user(user: &User) -> Result<Self, DbError> {
        user.row_id().map(Self::new).ok_or(DbError::MissingId)
    }

    /// Parse a `nick!user@host` mask. Missing parts default to `*`.
    ///
    /// ```
    /// use purplebot::db::Hostmask;
    ///
    /// let mask = Hostmask::parse(1, "alice!~al@*.example.org");
    /// assert_eq!(mask.nickname, "alice");
    /// assert_eq!(mask.username, "~al");
    /// assert_eq!(mask.hostname, "*.example.org");
    ///
    /// let mask = Hostmask::parse(1, "bob");
    /// assert_eq!(mask.to_string(), "bob!*@*");
    /// ```
    pub fn parse(user_id: i64, mask: &str) -> Self {
        let (nick_user, host) = match mask.split_once('@') {
            Some((left, host)) => (left, Some(host)),
            None => (mask, None),
        };
        let (nick, user) = match nick_user.split_once('!') {
            Some((nick, user)) => (nick, Some(user)),
            None => (nick_user, None),
        };

        let or_any = |part: Option<&str>| match part {
            Some(p) if !p.is_empty() => p.to_string(),
            _ => "*".to_string(),
        };

        let mut hostmask = Self::new(user_id);
        hostmask.nickname = or_any(Some(nick));
        hostmask.username = or_any(user);
        hostmask.hostname = or_any(host);
        hostmask
    }

    /// Whether this rule recognizes the given identity.
    pub fn matches(&self, nickname: &str, username: &str, hostname: &str) -> bool {
        glob::hostmask_matches(self, nickname, username, hostname)
    }
}

impl fmt::Display for Hostmask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}!{}@{}", self.nickname, self.username, self.hostname)
    }
}

/// Anything that can name a stored row: a bare id or a saved record.
pub trait RowId {
    fn row_id(&self) -> Option<i64>;
}

impl RowId for i64 {
    fn row_id(&self) -> Option<i64> {
        Some(*self)
    }
}

impl RowId for User {
    fn row_id(&self) -> Option<i64> {
        self.id
    }
}

impl RowId for Hostmask {
    fn row_id(&self) -> Option<i64> {
        self.id
    }
}

/// The live identity of a connection, as seen by the authorization check.
pub trait Identity {
    fn nickname(&self) -> &str;
    fn username(&self) -> &str;
    fn hostname(&self) -> &str;
}

/// Storage adapter for users and hostmasks.
///
/// Implementations provide persistence; matching and the admin decision are
/// provided on top of [`IdentityStore::entries`].
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Look up a user by id.
    async fn get_user(&self, id: i64) -> Result<Option<User>, DbError>;

    /// Look up a user by its unique name.
    async fn find_user_by_name(&self, name: &str) -> Result<Option<User>, DbError>;

    /// Look up a hostmask by id.
    async fn get_hostmask(&self, id: i64) -> Result<Option<Hostmask>, DbError>;

    /// Insert or replace a user by id. Records and returns the row id.
    async fn set_user(&self, user: &mut User) -> Result<i64, DbError>;

    /// Insert or replace a hostmask by id. Records and returns the row id.
    async fn set_hostmask(&self, hostmask: &mut Hostmask) -> Result<i64, DbError>;

    /// Delete a user together with all of its hostmasks.
    async fn delete_user(&self, user: &(dyn RowId + Sync)) -> Result<(), DbError>;

    /// Delete a single hostmask.
    async fn delete_hostmask(&self, hostmask: &(dyn RowId + Sync)) -> Result<(), DbError>;

    /// Every hostmask paired with its owning user, grouped by user.
    async fn entries(&self) -> Result<Vec<(User, Hostmask)>, DbError>;

    /// Remove every user and hostmask.
    async fn clear(&self) -> Result<(), DbError>;

    /// Users with at least one hostmask matching the given identity.
    ///
    /// Pass `"*"` for any part to leave it unconstrained.
    async fn match_users_hostmask(
        &self,
        nickname: &str,
        username: &str,
        hostname: &str,
    ) -> Result<Vec<User>, DbError> {
        let entries = self.entries().await?;
        Ok(glob::match_users(&entries, nickname, username, hostname))
    }

    /// Whether `who` resolves to exactly one user, and that user is an admin.
    ///
    /// Ambiguous identities are denied. The check is not transactional with
    /// whatever the caller does next.
    async fn has_admin(&self, who: &(dyn Identity + Sync)) -> Result<bool, DbError> {
        let users = self
            .match_users_hostmask(who.nickname(), who.username(), who.hostname())
            .await?;
        Ok(glob::is_sole_admin(&users))
    }
}

type UserRow = (i64, Option<String>, bool, Option<String>);
type HostmaskRow = (i64, i64, String, String, String, String);
type EntryRow = (
    i64,
    Option<String>,
    bool,
    Option<String>,
    i64,
    String,
    String,
    String,
    String,
);

/// SQLite-backed identity store.
#[derive(Clone)]
pub struct SqliteIdentityStore {
    pool: SqlitePool,
    _anchor: Option<MemoryAnchor>,
}

impl SqliteIdentityStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            _anchor: None,
        }
    }

    /// Store that also keeps a `:memory:` database's anchor connection open.
    pub(crate) fn anchored(pool: SqlitePool, anchor: Option<MemoryAnchor>) -> Self {
        Self {
            pool,
            _anchor: anchor,
        }
    }
}

#[async_trait]
impl IdentityStore for SqliteIdentityStore {
    async fn get_user(&self, id: i64) -> Result<Option<User>, DbError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT user_id, name, admin, lastseen
            FROM user
            WHERE user_id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(user_from_row).transpose()
    }

    async fn find_user_by_name(&self, name: &str) -> Result<Option<User>, DbError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT user_id, name, admin, lastseen
            FROM user
            WHERE name = ?
            "#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        row.map(user_from_row).transpose()
    }

    async fn get_hostmask(&self, id: i64) -> Result<Option<Hostmask>, DbError> {
        let row = sqlx::query_as::<_, HostmaskRow>(
            r#"
            SELECT hostmask_id, user_id, nickname, username, hostname, timestamp
            FROM hostmask
            WHERE hostmask_id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(hostmask_from_row).transpose()
    }

    async fn set_user(&self, user: &mut User) -> Result<i64, DbError> {
        // Upsert on the primary key only; a clash on `name` still aborts.
        let result = sqlx::query(
            r#"
            INSERT INTO user (user_id, name, admin, lastseen)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                name = excluded.name,
                admin = excluded.admin,
                lastseen = excluded.lastseen
            "#,
        )
        .bind(user.id)
        .bind(user.name.as_deref())
        .bind(user.admin)
        .bind(user.last_seen.as_ref().map(encode_time))
        .execute(&self.pool)
        .await?;

        let id = user.id.unwrap_or_else(|| result.last_insert_rowid());
        user.id = Some(id);
        Ok(id)
    }

    async fn set_hostmask(&self, hostmask: &mut Hostmask) -> Result<i64, DbError> {
        let result = sqlx::query(
            r#"
            INSERT INTO hostmask (hostmask_id, user_id, nickname, username, hostname, timestamp)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(hostmask_id) DO UPDATE SET
                user_id = excluded.user_id,
                nickname = excluded.nickname,
                username = excluded.username,
                hostname = excluded.hostname,
                timestamp = excluded.timestamp
            "#,
        )
        .bind(hostmask.id)
        .bind(hostmask.user_id)
        .bind(&hostmask.nickname)
        .bind(&hostmask.username)
        .bind(&hostmask.hostname)
        .bind(encode_time(&hostmask.created_at))
        .execute(&self.pool)
        .await?;

        let id = hostmask.id.unwrap_or_else(|| result.last_insert_rowid());
        hostmask.id = Some(id);
        Ok(id)
    }

    async fn delete_user(&self, user: &(dyn RowId + Sync)) -> Result<(), DbError> {
        let id = user.row_id().ok_or(DbError::MissingId)?;
        sqlx::query("DELETE FROM user WHERE user_id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_hostmask(&self, hostmask: &(dyn RowId + Sync)) -> Result<(), DbError> {
        let id = hostmask.row_id().ok_or(DbError::MissingId)?;
        sqlx::query("DELETE FROM hostmask WHERE hostmask_id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn entries(&self) -> Result<Vec<(User, Hostmask)>, DbError> {
        let rows = sqlx::query_as::<_, EntryRow>(
            r#"
            SELECT user_id, name, admin, lastseen,
                   hostmask_id, nickname, username, hostname, timestamp
            FROM user_hostmask
            WHERE hostmask_id IS NOT NULL
            ORDER BY user_id, hostmask_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(
                |(user_id, name, admin, lastseen, hostmask_id, nick, user, host, timestamp)| {
                    let owner = user_from_row((user_id, name, admin, lastseen))?;
                    let hostmask =
                        hostmask_from_row((hostmask_id, user_id, nick, user, host, timestamp))?;
                    Ok((owner, hostmask))
                },
            )
            .collect()
    }

    async fn clear(&self) -> Result<(), DbError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM hostmask").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM user").execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }
}

fn user_from_row((id, name, admin, lastseen): UserRow) -> Result<User, DbError> {
    Ok(User {
        id: Some(id),
        name,
        admin,
        last_seen: lastseen.as_deref().map(decode_time).transpose()?,
    })
}

fn hostmask_from_row(
    (id, user_id, nickname, username, hostname, timestamp): HostmaskRow,
) -> Result<Hostmask, DbError> {
    Ok(Hostmask {
        id: Some(id),
        user_id,
        nickname,
        username,
        hostname,
        created_at: decode_time(&timestamp)?,
    })
}

fn encode_time(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Accepts our own RFC 3339 encoding and SQLite's `CURRENT_TIMESTAMP` form.
fn decode_time(text: &str) -> Result<DateTime<Utc>, DbError> {
    if let Ok(time) = DateTime::parse_from_rfc3339(text) {
        return Ok(time.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S")
        .map(|naive| naive.and_utc())
        .map_err(|e| DbError::Corrupt(format!("bad timestamp {:?}: {}", text, e)))
}
