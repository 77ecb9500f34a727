//! # phonebook-db
//!
//! Entities and storage for the phonebook: users, profiles, addresses,
//! countries, postal codes, groups, and invites.
//!
//! The [`PhonebookStore`] trait is the only thing forms depend on. Two
//! implementations ship here:
//!
//! - [`MemoryStore`] - a mutex-guarded in-memory store, handy for tests
//! - [`SqliteStore`] - a `rusqlite` store (feature `sqlite`, on by default)

pub mod locale;
pub mod memory;
pub mod models;
pub mod row;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod store;
pub mod value;

pub use memory::MemoryStore;
pub use models::{Address, Country, Group, Invite, NewInvite, NewUser, PostalCode, Profile, User};
pub use row::{FromValue, Row};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
pub use store::{PhonebookStore, StoreTransaction};
pub use value::Value;
