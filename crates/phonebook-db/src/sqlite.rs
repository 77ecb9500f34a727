//! `SQLite` store using `rusqlite`.
//!
//! Features:
//! - WAL mode for file-based databases
//! - In-memory database support via `:memory:` (used by the tests)
//! - One connection behind an async `Mutex`; every call runs on
//!   `tokio::task::spawn_blocking`
//! - Group and postal-code get-or-create as a single `INSERT OR IGNORE`
//!   followed by a select, under the same connection lock
//! - Transactions that own the connection lock from `BEGIN` until
//!   `COMMIT` or `ROLLBACK`
//!
//! The schema is created on [`SqliteStore::open`] if it does not exist.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use phonebook_core::{PhonebookError, PhonebookResult};
use rusqlite::Connection;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::locale;
use crate::models::{Address, Country, Group, Invite, NewInvite, NewUser, PostalCode, Profile, User};
use crate::row::Row;
use crate::store::{PhonebookStore, StoreTransaction};
use crate::value::Value;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users_user (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    unique_id TEXT NOT NULL UNIQUE,
    username TEXT NOT NULL,
    email TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS users_user_email ON users_user (email);

CREATE TABLE IF NOT EXISTS locations_country (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    code TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS locations_countryname (
    country_id INTEGER NOT NULL REFERENCES locations_country (id),
    locale TEXT NOT NULL,
    name TEXT NOT NULL,
    PRIMARY KEY (country_id, locale)
);

CREATE TABLE IF NOT EXISTS locations_postalcode (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    code TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS users_profile (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL UNIQUE REFERENCES users_user (id),
    first_name TEXT NOT NULL DEFAULT '',
    last_name TEXT NOT NULL DEFAULT '',
    biography TEXT NOT NULL DEFAULT '',
    website TEXT,
    photo TEXT
);

CREATE TABLE IF NOT EXISTS locations_address (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL UNIQUE REFERENCES users_user (id),
    street TEXT NOT NULL DEFAULT '',
    city TEXT NOT NULL DEFAULT '',
    province TEXT NOT NULL DEFAULT '',
    country_id INTEGER REFERENCES locations_country (id),
    postal_code_id INTEGER REFERENCES locations_postalcode (id)
);

CREATE TABLE IF NOT EXISTS groups_group (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    system INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS users_profile_groups (
    profile_id INTEGER NOT NULL REFERENCES users_profile (id),
    group_id INTEGER NOT NULL REFERENCES groups_group (id),
    PRIMARY KEY (profile_id, group_id)
);

CREATE TABLE IF NOT EXISTS phonebook_invite (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    inviter TEXT NOT NULL,
    recipient TEXT NOT NULL,
    redeemer TEXT,
    code TEXT NOT NULL UNIQUE,
    redeemed TEXT,
    created TEXT NOT NULL
);
";

const PROFILE_COLUMNS: &str = "id, user_id, first_name, last_name, biography, website, photo";
const ADDRESS_COLUMNS: &str = "id, user_id, street, city, province, country_id, postal_code_id";
const INVITE_COLUMNS: &str = "id, inviter, recipient, redeemer, code, redeemed, created";

/// A `SQLite`-backed [`PhonebookStore`].
pub struct SqliteStore {
    /// The path to the database file (or ":memory:").
    path: PathBuf,
    /// The connection, guarded by an async mutex.
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Opens (or creates) a database at the given path and ensures the schema.
    ///
    /// If the path is `:memory:`, an in-memory database is created.
    pub fn open(path: impl Into<PathBuf>) -> PhonebookResult<Self> {
        let path = path.into();
        let conn = if path.to_str() == Some(":memory:") {
            Connection::open_in_memory()
        } else {
            Connection::open(&path)
        }
        .map_err(|e| PhonebookError::OperationalError(format!("SQLite open failed: {e}")))?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .map_err(|e| PhonebookError::OperationalError(format!("Failed to set pragmas: {e}")))?;
        conn.execute_batch(SCHEMA)
            .map_err(|e| PhonebookError::OperationalError(format!("Failed to create schema: {e}")))?;

        tracing::debug!(path = %path.display(), "opened sqlite store");

        Ok(Self {
            path,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Opens an in-memory database (convenience constructor).
    pub fn memory() -> PhonebookResult<Self> {
        Self::open(":memory:")
    }

    /// Returns the database file path.
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Runs `f` against the connection on a blocking thread.
    async fn run<F, T>(&self, f: F) -> PhonebookResult<T>
    where
        F: FnOnce(&Connection) -> PhonebookResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            discard_unfinished(&conn)?;
            f(&conn)
        })
        .await
        .map_err(join_error)?
    }

    async fn begin(&self) -> PhonebookResult<Box<dyn StoreTransaction>> {
        let guard = Arc::clone(&self.conn).lock_owned().await;
        let guard = tokio::task::spawn_blocking(move || {
            discard_unfinished(&guard)?;
            guard.execute_batch("BEGIN").map_err(map_err)?;
            Ok::<_, PhonebookError>(guard)
        })
        .await
        .map_err(join_error)??;
        Ok(Box::new(SqliteTransaction {
            conn: Mutex::new(Some(guard)),
        }))
    }
}

/// A transaction on a [`SqliteStore`].
///
/// Owns the connection lock. A transaction dropped without `commit` or
/// `rollback` is rolled back by the next call that takes the connection.
pub struct SqliteTransaction {
    conn: Mutex<Option<OwnedMutexGuard<Connection>>>,
}

impl SqliteTransaction {
    async fn run<F, T>(&self, f: F) -> PhonebookResult<T>
    where
        F: FnOnce(&Connection) -> PhonebookResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let mut slot = self.conn.lock().await;
        let guard = slot.take().ok_or_else(lost_connection)?;
        let (guard, result) = tokio::task::spawn_blocking(move || {
            let result = f(&guard);
            (guard, result)
        })
        .await
        .map_err(join_error)?;
        *slot = Some(guard);
        result
    }

    #[allow(clippy::unused_async)]
    async fn begin(&self) -> PhonebookResult<Box<dyn StoreTransaction>> {
        Err(PhonebookError::OperationalError(
            "a transaction is already open".to_string(),
        ))
    }

    async fn finish(self: Box<Self>, statement: &'static str) -> PhonebookResult<()> {
        let guard = self.conn.into_inner().ok_or_else(lost_connection)?;
        tokio::task::spawn_blocking(move || guard.execute_batch(statement).map_err(map_err))
            .await
            .map_err(join_error)?
    }
}

// ── Statement helpers ───────────────────────────────────────────────────

fn join_error(e: tokio::task::JoinError) -> PhonebookError {
    PhonebookError::DatabaseError(format!("Task join error: {e}"))
}

fn lost_connection() -> PhonebookError {
    PhonebookError::OperationalError("transaction lost its connection".to_string())
}

/// Rolls back a transaction whose handle went away without finishing.
fn discard_unfinished(conn: &Connection) -> PhonebookResult<()> {
    if !conn.is_autocommit() {
        tracing::warn!("rolling back an abandoned sqlite transaction");
        conn.execute_batch("ROLLBACK").map_err(map_err)?;
    }
    Ok(())
}

fn map_err(e: rusqlite::Error) -> PhonebookError {
    match &e {
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            PhonebookError::IntegrityError(e.to_string())
        }
        _ => PhonebookError::DatabaseError(e.to_string()),
    }
}

/// Binds `Value`s to a prepared statement.
fn bind_params(stmt: &mut rusqlite::Statement<'_>, params: &[Value]) -> PhonebookResult<()> {
    for (i, param) in params.iter().enumerate() {
        let idx = i + 1;
        match param {
            Value::Null => stmt.raw_bind_parameter(idx, rusqlite::types::Null),
            Value::Bool(b) => stmt.raw_bind_parameter(idx, b),
            Value::Int(v) => stmt.raw_bind_parameter(idx, v),
            Value::String(s) => stmt.raw_bind_parameter(idx, s.as_str()),
            Value::Bytes(b) => stmt.raw_bind_parameter(idx, b.as_slice()),
            Value::DateTimeTz(dt) => stmt.raw_bind_parameter(idx, dt.to_rfc3339().as_str()),
        }
        .map_err(|e| PhonebookError::DatabaseError(format!("Bind error: {e}")))?;
    }
    Ok(())
}

/// Converts a `rusqlite::Row` to a generic [`Row`].
fn convert_row(sqlite_row: &rusqlite::Row<'_>, column_names: &[String]) -> Row {
    let values: Vec<Value> = (0..column_names.len())
        .map(|i| {
            let val_ref = sqlite_row
                .get_ref(i)
                .unwrap_or(rusqlite::types::ValueRef::Null);
            match val_ref {
                rusqlite::types::ValueRef::Null => Value::Null,
                rusqlite::types::ValueRef::Integer(v) => Value::Int(v),
                rusqlite::types::ValueRef::Real(v) => Value::String(v.to_string()),
                rusqlite::types::ValueRef::Text(b) => {
                    Value::String(String::from_utf8_lossy(b).to_string())
                }
                rusqlite::types::ValueRef::Blob(b) => Value::Bytes(b.to_vec()),
            }
        })
        .collect();

    Row::new(column_names.to_vec(), values)
}

fn query_rows(conn: &Connection, sql: &str, params: &[Value]) -> PhonebookResult<Vec<Row>> {
    let mut stmt = conn.prepare(sql).map_err(map_err)?;
    let column_names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    bind_params(&mut stmt, params)?;

    let mut raw_rows = stmt.raw_query();
    let mut rows = Vec::new();
    while let Some(row) = raw_rows.next().map_err(map_err)? {
        rows.push(convert_row(row, &column_names));
    }
    Ok(rows)
}

fn query_one(conn: &Connection, sql: &str, params: &[Value]) -> PhonebookResult<Option<Row>> {
    Ok(query_rows(conn, sql, params)?.into_iter().next())
}

fn execute_sql(conn: &Connection, sql: &str, params: &[Value]) -> PhonebookResult<usize> {
    let mut stmt = conn.prepare(sql).map_err(map_err)?;
    bind_params(&mut stmt, params)?;
    stmt.raw_execute().map_err(map_err)
}

// ── Row mapping ─────────────────────────────────────────────────────────

fn user_from_row(row: &Row) -> PhonebookResult<User> {
    Ok(User {
        id: row.get("id")?,
        unique_id: row.get("unique_id")?,
        username: row.get("username")?,
        email: row.get("email")?,
    })
}

fn profile_from_row(row: &Row) -> PhonebookResult<Profile> {
    Ok(Profile {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        first_name: row.get("first_name")?,
        last_name: row.get("last_name")?,
        biography: row.get("biography")?,
        website: row.get("website")?,
        photo: row.get("photo")?,
    })
}

fn address_from_row(row: &Row) -> PhonebookResult<Address> {
    Ok(Address {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        street: row.get("street")?,
        city: row.get("city")?,
        province: row.get("province")?,
        country_id: row.get("country_id")?,
        postal_code_id: row.get("postal_code_id")?,
    })
}

fn country_from_row(row: &Row) -> PhonebookResult<Country> {
    Ok(Country {
        id: row.get("id")?,
        code: row.get("code")?,
        name: row.get("name")?,
    })
}

fn postal_code_from_row(row: &Row) -> PhonebookResult<PostalCode> {
    Ok(PostalCode {
        id: row.get("id")?,
        code: row.get("code")?,
    })
}

fn group_from_row(row: &Row) -> PhonebookResult<Group> {
    Ok(Group {
        id: row.get("id")?,
        name: row.get("name")?,
        system: row.get("system")?,
    })
}

fn invite_from_row(row: &Row) -> PhonebookResult<Invite> {
    Ok(Invite {
        id: row.get("id")?,
        inviter: row.get("inviter")?,
        recipient: row.get("recipient")?,
        redeemer: row.get("redeemer")?,
        code: row.get("code")?,
        redeemed: row.get("redeemed")?,
        created: row.get("created")?,
    })
}

/// Inserts-or-ignores by a unique column, then selects the row.
///
/// Returns the row and whether this call inserted it.
fn upsert_by_key(
    conn: &Connection,
    insert_sql: &str,
    select_sql: &str,
    key: &str,
) -> PhonebookResult<(Row, bool)> {
    let params = [Value::from(key)];
    let inserted = execute_sql(conn, insert_sql, &params)? == 1;
    let row = query_rows(conn, select_sql, &params)?
        .into_iter()
        .next()
        .ok_or_else(|| PhonebookError::DatabaseError(format!("row for '{key}' vanished")))?;
    Ok((row, inserted))
}

// ── Operations ──────────────────────────────────────────────────────────

mod ops {
    use super::{
        address_from_row, country_from_row, execute_sql, group_from_row, invite_from_row,
        postal_code_from_row, profile_from_row, query_one, query_rows, upsert_by_key,
        user_from_row, ADDRESS_COLUMNS, INVITE_COLUMNS, PROFILE_COLUMNS,
    };
    use super::{Connection, PhonebookError, PhonebookResult, Value};
    use crate::locale;
    use crate::models::{
        Address, Country, Group, Invite, NewInvite, NewUser, PostalCode, Profile, User,
    };

    pub(super) fn create_user(conn: &Connection, user: NewUser) -> PhonebookResult<User> {
        execute_sql(
            conn,
            "INSERT INTO users_user (unique_id, username, email) VALUES (?1, ?2, ?3)",
            &[
                Value::from(user.unique_id.as_str()),
                Value::from(user.username.as_str()),
                Value::from(user.email.as_str()),
            ],
        )?;
        let user_id = conn.last_insert_rowid();
        execute_sql(
            conn,
            "INSERT INTO users_profile (user_id) VALUES (?1)",
            &[Value::Int(user_id)],
        )?;
        execute_sql(
            conn,
            "INSERT INTO locations_address (user_id) VALUES (?1)",
            &[Value::Int(user_id)],
        )?;
        Ok(User {
            id: user_id,
            unique_id: user.unique_id,
            username: user.username,
            email: user.email,
        })
    }

    pub(super) fn get_user(conn: &Connection, id: i64) -> PhonebookResult<User> {
        let row = query_one(
            conn,
            "SELECT id, unique_id, username, email FROM users_user WHERE id = ?1",
            &[Value::Int(id)],
        )?
        .ok_or_else(|| PhonebookError::DoesNotExist(format!("user {id}")))?;
        user_from_row(&row)
    }

    pub(super) fn count_users_with_email(conn: &Connection, email: &str) -> PhonebookResult<u64> {
        let row = query_one(
            conn,
            "SELECT COUNT(*) AS n FROM users_user WHERE email = ?1",
            &[Value::from(email)],
        )?
        .ok_or_else(|| PhonebookError::DatabaseError("COUNT returned no row".to_string()))?;
        let n: i64 = row.get("n")?;
        Ok(u64::try_from(n).unwrap_or_default())
    }

    pub(super) fn get_profile(conn: &Connection, user_id: i64) -> PhonebookResult<Profile> {
        let sql = format!("SELECT {PROFILE_COLUMNS} FROM users_profile WHERE user_id = ?1");
        let row = query_one(conn, &sql, &[Value::Int(user_id)])?
            .ok_or_else(|| PhonebookError::DoesNotExist(format!("profile for user {user_id}")))?;
        profile_from_row(&row)
    }

    pub(super) fn save_profile(conn: &Connection, profile: &Profile) -> PhonebookResult<()> {
        let changed = execute_sql(
            conn,
            "UPDATE users_profile SET first_name = ?1, last_name = ?2, biography = ?3, \
             website = ?4, photo = ?5 WHERE id = ?6",
            &[
                Value::from(profile.first_name.as_str()),
                Value::from(profile.last_name.as_str()),
                Value::from(profile.biography.as_str()),
                Value::from(profile.website.clone()),
                Value::from(profile.photo.clone()),
                Value::Int(profile.id),
            ],
        )?;
        if changed == 0 {
            return Err(PhonebookError::DoesNotExist(format!("profile {}", profile.id)));
        }
        Ok(())
    }

    pub(super) fn get_address(conn: &Connection, user_id: i64) -> PhonebookResult<Address> {
        let sql = format!("SELECT {ADDRESS_COLUMNS} FROM locations_address WHERE user_id = ?1");
        let row = query_one(conn, &sql, &[Value::Int(user_id)])?
            .ok_or_else(|| PhonebookError::DoesNotExist(format!("address for user {user_id}")))?;
        address_from_row(&row)
    }

    pub(super) fn save_address(conn: &Connection, address: &Address) -> PhonebookResult<()> {
        let changed = execute_sql(
            conn,
            "UPDATE locations_address SET street = ?1, city = ?2, province = ?3, \
             country_id = ?4, postal_code_id = ?5 WHERE id = ?6",
            &[
                Value::from(address.street.as_str()),
                Value::from(address.city.as_str()),
                Value::from(address.province.as_str()),
                Value::from(address.country_id),
                Value::from(address.postal_code_id),
                Value::Int(address.id),
            ],
        )?;
        if changed == 0 {
            return Err(PhonebookError::DoesNotExist(format!("address {}", address.id)));
        }
        Ok(())
    }

    pub(super) fn create_country(conn: &Connection, code: &str, name: &str) -> PhonebookResult<Country> {
        let code = code.to_lowercase();
        execute_sql(
            conn,
            "INSERT INTO locations_country (code, name) VALUES (?1, ?2)",
            &[Value::from(code.as_str()), Value::from(name)],
        )?;
        Ok(Country {
            id: conn.last_insert_rowid(),
            code,
            name: name.to_string(),
        })
    }

    pub(super) fn set_country_name(
        conn: &Connection,
        country_id: i64,
        locale: &str,
        name: &str,
    ) -> PhonebookResult<()> {
        execute_sql(
            conn,
            "INSERT INTO locations_countryname (country_id, locale, name) VALUES (?1, ?2, ?3) \
             ON CONFLICT (country_id, locale) DO UPDATE SET name = excluded.name",
            &[
                Value::Int(country_id),
                Value::from(locale::normalize(locale)),
                Value::from(name),
            ],
        )
        .map_err(|e| match e {
            PhonebookError::IntegrityError(_) => {
                PhonebookError::DoesNotExist(format!("country {country_id}"))
            }
            other => other,
        })?;
        Ok(())
    }

    pub(super) fn get_country(conn: &Connection, id: i64) -> PhonebookResult<Option<Country>> {
        query_one(
            conn,
            "SELECT id, code, name FROM locations_country WHERE id = ?1",
            &[Value::Int(id)],
        )?
        .as_ref()
        .map(country_from_row)
        .transpose()
    }

    pub(super) fn localized_countries(
        conn: &Connection,
        locale: &str,
    ) -> PhonebookResult<Vec<(Country, String)>> {
        let tag = locale::normalize(locale);
        let lang = locale::language(&tag).to_string();

        let countries = query_rows(conn, "SELECT id, code, name FROM locations_country", &[])?
            .iter()
            .map(country_from_row)
            .collect::<PhonebookResult<Vec<_>>>()?;

        let mut names: Vec<(i64, String, String)> = Vec::new();
        for row in query_rows(
            conn,
            "SELECT country_id, locale, name FROM locations_countryname \
             WHERE locale IN (?1, ?2)",
            &[Value::from(tag), Value::from(lang)],
        )? {
            names.push((row.get("country_id")?, row.get("locale")?, row.get("name")?));
        }

        let mut listing: Vec<(Country, String)> = countries
            .into_iter()
            .map(|country| {
                let translations = names
                    .iter()
                    .filter(|(id, _, _)| *id == country.id)
                    .map(|(_, tag, name)| (tag.as_str(), name.as_str()));
                let display = locale::pick_name(locale, translations, &country.name).to_string();
                (country, display)
            })
            .collect();
        locale::sort_choices(&mut listing);
        Ok(listing)
    }

    pub(super) fn get_or_create_postal_code(
        conn: &Connection,
        code: &str,
    ) -> PhonebookResult<(PostalCode, bool)> {
        let (row, created) = upsert_by_key(
            conn,
            "INSERT OR IGNORE INTO locations_postalcode (code) VALUES (?1)",
            "SELECT id, code FROM locations_postalcode WHERE code = ?1",
            code,
        )?;
        Ok((postal_code_from_row(&row)?, created))
    }

    pub(super) fn get_postal_code(conn: &Connection, id: i64) -> PhonebookResult<Option<PostalCode>> {
        query_one(
            conn,
            "SELECT id, code FROM locations_postalcode WHERE id = ?1",
            &[Value::Int(id)],
        )?
        .as_ref()
        .map(postal_code_from_row)
        .transpose()
    }

    pub(super) fn create_group(conn: &Connection, name: &str, system: bool) -> PhonebookResult<Group> {
        execute_sql(
            conn,
            "INSERT INTO groups_group (name, system) VALUES (?1, ?2)",
            &[Value::from(name), Value::Bool(system)],
        )?;
        Ok(Group {
            id: conn.last_insert_rowid(),
            name: name.to_string(),
            system,
        })
    }

    pub(super) fn get_or_create_group(conn: &Connection, name: &str) -> PhonebookResult<(Group, bool)> {
        let (row, created) = upsert_by_key(
            conn,
            "INSERT OR IGNORE INTO groups_group (name, system) VALUES (?1, 0)",
            "SELECT id, name, system FROM groups_group WHERE name = ?1",
            name,
        )?;
        Ok((group_from_row(&row)?, created))
    }

    pub(super) fn find_group(conn: &Connection, name: &str) -> PhonebookResult<Option<Group>> {
        query_one(
            conn,
            "SELECT id, name, system FROM groups_group WHERE name = ?1",
            &[Value::from(name)],
        )?
        .as_ref()
        .map(group_from_row)
        .transpose()
    }

    pub(super) fn profile_groups(conn: &Connection, profile_id: i64) -> PhonebookResult<Vec<Group>> {
        query_rows(
            conn,
            "SELECT g.id, g.name, g.system FROM groups_group g \
             JOIN users_profile_groups pg ON pg.group_id = g.id \
             WHERE pg.profile_id = ?1 ORDER BY g.name",
            &[Value::Int(profile_id)],
        )?
        .iter()
        .map(group_from_row)
        .collect()
    }

    pub(super) fn add_profile_groups(
        conn: &Connection,
        profile_id: i64,
        group_ids: &[i64],
    ) -> PhonebookResult<()> {
        for group_id in group_ids {
            execute_sql(
                conn,
                "INSERT OR IGNORE INTO users_profile_groups (profile_id, group_id) \
                 VALUES (?1, ?2)",
                &[Value::Int(profile_id), Value::Int(*group_id)],
            )?;
        }
        Ok(())
    }

    pub(super) fn remove_profile_groups(
        conn: &Connection,
        profile_id: i64,
        group_ids: &[i64],
    ) -> PhonebookResult<()> {
        for group_id in group_ids {
            execute_sql(
                conn,
                "DELETE FROM users_profile_groups WHERE profile_id = ?1 AND group_id = ?2",
                &[Value::Int(profile_id), Value::Int(*group_id)],
            )?;
        }
        Ok(())
    }

    pub(super) fn create_invite(conn: &Connection, invite: NewInvite) -> PhonebookResult<Invite> {
        let created = chrono::Utc::now();
        execute_sql(
            conn,
            "INSERT INTO phonebook_invite (inviter, recipient, code, created) \
             VALUES (?1, ?2, ?3, ?4)",
            &[
                Value::from(invite.inviter.as_str()),
                Value::from(invite.recipient.as_str()),
                Value::from(invite.code.as_str()),
                Value::from(created),
            ],
        )?;
        Ok(Invite {
            id: conn.last_insert_rowid(),
            inviter: invite.inviter,
            recipient: invite.recipient,
            redeemer: None,
            code: invite.code,
            redeemed: None,
            created,
        })
    }

    pub(super) fn invites_for(conn: &Connection, recipient: &str) -> PhonebookResult<Vec<Invite>> {
        let sql = format!(
            "SELECT {INVITE_COLUMNS} FROM phonebook_invite WHERE recipient = ?1 ORDER BY id"
        );
        query_rows(conn, &sql, &[Value::from(recipient)])?
            .iter()
            .map(invite_from_row)
            .collect()
    }
}

macro_rules! sqlite_store_impl {
    ($ty:ty) => {
        #[async_trait]
        impl PhonebookStore for $ty {
            fn vendor(&self) -> &str {
                "sqlite"
            }

            async fn create_user(&self, user: NewUser) -> PhonebookResult<User> {
                self.run(move |conn| ops::create_user(conn, user)).await
            }

            async fn get_user(&self, id: i64) -> PhonebookResult<User> {
                self.run(move |conn| ops::get_user(conn, id)).await
            }

            async fn count_users_with_email(&self, email: &str) -> PhonebookResult<u64> {
                let email = email.to_string();
                self.run(move |conn| ops::count_users_with_email(conn, &email))
                    .await
            }

            async fn get_profile(&self, user_id: i64) -> PhonebookResult<Profile> {
                self.run(move |conn| ops::get_profile(conn, user_id)).await
            }

            async fn save_profile(&self, profile: &Profile) -> PhonebookResult<()> {
                let profile = profile.clone();
                self.run(move |conn| ops::save_profile(conn, &profile)).await
            }

            async fn get_address(&self, user_id: i64) -> PhonebookResult<Address> {
                self.run(move |conn| ops::get_address(conn, user_id)).await
            }

            async fn save_address(&self, address: &Address) -> PhonebookResult<()> {
                let address = address.clone();
                self.run(move |conn| ops::save_address(conn, &address)).await
            }

            async fn create_country(&self, code: &str, name: &str) -> PhonebookResult<Country> {
                let (code, name) = (code.to_string(), name.to_string());
                self.run(move |conn| ops::create_country(conn, &code, &name))
                    .await
            }

            async fn set_country_name(
                &self,
                country_id: i64,
                locale: &str,
                name: &str,
            ) -> PhonebookResult<()> {
                let (locale, name) = (locale.to_string(), name.to_string());
                self.run(move |conn| ops::set_country_name(conn, country_id, &locale, &name))
                    .await
            }

            async fn get_country(&self, id: i64) -> PhonebookResult<Option<Country>> {
                self.run(move |conn| ops::get_country(conn, id)).await
            }

            async fn localized_countries(
                &self,
                locale: &str,
            ) -> PhonebookResult<Vec<(Country, String)>> {
                let locale = locale.to_string();
                self.run(move |conn| ops::localized_countries(conn, &locale))
                    .await
            }

            async fn get_or_create_postal_code(
                &self,
                code: &str,
            ) -> PhonebookResult<(PostalCode, bool)> {
                let code = code.to_string();
                self.run(move |conn| ops::get_or_create_postal_code(conn, &code))
                    .await
            }

            async fn get_postal_code(&self, id: i64) -> PhonebookResult<Option<PostalCode>> {
                self.run(move |conn| ops::get_postal_code(conn, id)).await
            }

            async fn create_group(&self, name: &str, system: bool) -> PhonebookResult<Group> {
                let name = name.to_string();
                self.run(move |conn| ops::create_group(conn, &name, system))
                    .await
            }

            async fn get_or_create_group(&self, name: &str) -> PhonebookResult<(Group, bool)> {
                let name = name.to_string();
                self.run(move |conn| ops::get_or_create_group(conn, &name))
                    .await
            }

            async fn find_group(&self, name: &str) -> PhonebookResult<Option<Group>> {
                let name = name.to_string();
                self.run(move |conn| ops::find_group(conn, &name)).await
            }

            async fn profile_groups(&self, profile_id: i64) -> PhonebookResult<Vec<Group>> {
                self.run(move |conn| ops::profile_groups(conn, profile_id))
                    .await
            }

            async fn add_profile_groups(
                &self,
                profile_id: i64,
                group_ids: &[i64],
            ) -> PhonebookResult<()> {
                let group_ids = group_ids.to_vec();
                self.run(move |conn| ops::add_profile_groups(conn, profile_id, &group_ids))
                    .await
            }

            async fn remove_profile_groups(
                &self,
                profile_id: i64,
                group_ids: &[i64],
            ) -> PhonebookResult<()> {
                let group_ids = group_ids.to_vec();
                self.run(move |conn| ops::remove_profile_groups(conn, profile_id, &group_ids))
                    .await
            }

            async fn create_invite(&self, invite: NewInvite) -> PhonebookResult<Invite> {
                self.run(move |conn| ops::create_invite(conn, invite)).await
            }

            async fn invites_for(&self, recipient: &str) -> PhonebookResult<Vec<Invite>> {
                let recipient = recipient.to_string();
                self.run(move |conn| ops::invites_for(conn, &recipient))
                    .await
            }

            async fn transaction(&self) -> PhonebookResult<Box<dyn StoreTransaction>> {
                self.begin().await
            }
        }
    };
}

sqlite_store_impl!(SqliteStore);
sqlite_store_impl!(SqliteTransaction);

#[async_trait]
impl StoreTransaction for SqliteTransaction {
    fn store(&self) -> &dyn PhonebookStore {
        self
    }

    async fn commit(self: Box<Self>) -> PhonebookResult<()> {
        self.finish("COMMIT").await
    }

    async fn rollback(self: Box<Self>) -> PhonebookResult<()> {
        self.finish("ROLLBACK").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store_with_user() -> (SqliteStore, User) {
        let store = SqliteStore::memory().unwrap();
        let user = store
            .create_user(NewUser::new("u-1", "alice@example.com"))
            .await
            .unwrap();
        (store, user)
    }

    #[tokio::test]
    async fn test_open_memory() {
        let store = SqliteStore::memory().unwrap();
        assert_eq!(store.vendor(), "sqlite");
        assert_eq!(store.path(), &PathBuf::from(":memory:"));
    }

    #[tokio::test]
    async fn test_user_profile_address_roundtrip() {
        let (store, user) = store_with_user().await;
        assert_eq!(store.get_user(user.id).await.unwrap(), user);

        let mut profile = store.get_profile(user.id).await.unwrap();
        profile.website = Some("http://example.com".into());
        profile.last_name = "Liddell".into();
        store.save_profile(&profile).await.unwrap();
        assert_eq!(store.get_profile(user.id).await.unwrap(), profile);

        let mut address = store.get_address(user.id).await.unwrap();
        address.city = "Oxford".into();
        store.save_address(&address).await.unwrap();
        assert_eq!(store.get_address(user.id).await.unwrap().city, "Oxford");
    }

    #[tokio::test]
    async fn test_duplicate_unique_id_is_integrity_error() {
        let (store, _) = store_with_user().await;
        let result = store.create_user(NewUser::new("u-1", "x@example.com")).await;
        assert!(matches!(result, Err(PhonebookError::IntegrityError(_))));
    }

    #[tokio::test]
    async fn test_get_or_create_group_upsert() {
        let store = SqliteStore::memory().unwrap();
        let (group, created) = store.get_or_create_group("rust").await.unwrap();
        assert!(created);
        assert!(!group.system);
        let (again, created) = store.get_or_create_group("rust").await.unwrap();
        assert!(!created);
        assert_eq!(group, again);
    }

    #[tokio::test]
    async fn test_system_group_flag_roundtrip() {
        let store = SqliteStore::memory().unwrap();
        store.create_group("staff", true).await.unwrap();
        let found = store.find_group("staff").await.unwrap().unwrap();
        assert!(found.system);
    }

    #[tokio::test]
    async fn test_localized_countries_fallback() {
        let store = SqliteStore::memory().unwrap();
        let fr = store.create_country("FR", "France").await.unwrap();
        let de = store.create_country("DE", "Germany").await.unwrap();
        store.set_country_name(de.id, "fr", "Allemagne").await.unwrap();

        let listing = store.localized_countries("fr-CA").await.unwrap();
        let names: Vec<&str> = listing.iter().map(|(_, n)| n.as_str()).collect();
        assert_eq!(names, vec!["Allemagne", "France"]);
        assert_eq!(listing[1].0, fr);
    }

    #[tokio::test]
    async fn test_set_country_name_unknown_country() {
        let store = SqliteStore::memory().unwrap();
        let result = store.set_country_name(42, "de", "Nirgendwo").await;
        assert!(matches!(result, Err(PhonebookError::DoesNotExist(_))));
    }

    #[tokio::test]
    async fn test_transaction_rollback() {
        let (store, user) = store_with_user().await;
        let tx = store.transaction().await.unwrap();
        let mut profile = tx.get_profile(user.id).await.unwrap();
        profile.biography = "temporary".into();
        tx.save_profile(&profile).await.unwrap();
        assert_eq!(tx.get_profile(user.id).await.unwrap().biography, "temporary");
        tx.rollback().await.unwrap();
        assert!(store.get_profile(user.id).await.unwrap().biography.is_empty());
    }

    #[tokio::test]
    async fn test_nested_begin_rejected() {
        let store = SqliteStore::memory().unwrap();
        let tx = store.transaction().await.unwrap();
        assert!(matches!(
            tx.transaction().await,
            Err(PhonebookError::OperationalError(_))
        ));
        tx.commit().await.unwrap();
        assert!(store.transaction().await.is_ok());
    }

    #[tokio::test]
    async fn test_dropped_transaction_is_rolled_back() {
        let store = SqliteStore::memory().unwrap();
        let tx = store.transaction().await.unwrap();
        tx.get_or_create_group("abandoned").await.unwrap();
        drop(tx);
        assert!(store.find_group("abandoned").await.unwrap().is_none());
        store.get_or_create_group("after").await.unwrap();
        assert!(store.find_group("after").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_invite_roundtrip() {
        let store = SqliteStore::memory().unwrap();
        let invite = store
            .create_invite(NewInvite {
                inviter: "u-1".into(),
                recipient: "friend@example.com".into(),
                code: "0123456789abcdef0123456789abcdef".into(),
            })
            .await
            .unwrap();
        let stored = store.invites_for("friend@example.com").await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].code, invite.code);
        assert_eq!(stored[0].created.timestamp(), invite.created.timestamp());
    }
}
