//! Phonebook entities.
//!
//! A [`User`] owns exactly one [`Profile`] and one [`Address`]. Group
//! membership is a many-to-many relation between profiles and [`Group`]s
//! that the store keeps on the side.

use serde::{Deserialize, Serialize};

/// An account in the phonebook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    /// Identifier of the person in the directory service.
    pub unique_id: String,
    pub username: String,
    pub email: String,
}

/// Data needed to register a user. The store creates the empty profile and
/// address alongside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub unique_id: String,
    pub username: String,
    pub email: String,
}

impl NewUser {
    /// Builds a new user whose username defaults to the email's local part.
    pub fn new(unique_id: impl Into<String>, email: impl Into<String>) -> Self {
        let email = email.into();
        let username = email.split('@').next().unwrap_or_default().to_string();
        Self {
            unique_id: unique_id.into(),
            username,
            email,
        }
    }
}

/// Public profile details of a user.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Profile {
    pub id: i64,
    pub user_id: i64,
    pub first_name: String,
    pub last_name: String,
    pub biography: String,
    pub website: Option<String>,
    /// Media-relative path of the processed photo.
    pub photo: Option<String>,
}

/// Postal address of a user.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Address {
    pub id: i64,
    pub user_id: i64,
    pub street: String,
    pub city: String,
    pub province: String,
    pub country_id: Option<i64>,
    pub postal_code_id: Option<i64>,
}

/// A country with its default (English) name.
///
/// Localized names are kept by the store and listed through
/// [`PhonebookStore::localized_countries`](crate::store::PhonebookStore::localized_countries).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Country {
    pub id: i64,
    /// ISO 3166 code, lower case (e.g. "de").
    pub code: String,
    pub name: String,
}

/// A postal code, shared by every address that uses it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostalCode {
    pub id: i64,
    pub code: String,
}

/// A named tag profiles can belong to.
///
/// System groups are managed elsewhere and cannot be joined or left through
/// the profile form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: i64,
    pub name: String,
    pub system: bool,
}

/// An invitation sent by a member to an email address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invite {
    pub id: i64,
    /// Directory identifier of the inviting member.
    pub inviter: String,
    pub recipient: String,
    /// Directory identifier of the user who redeemed the invite.
    pub redeemer: Option<String>,
    pub code: String,
    pub redeemed: Option<chrono::DateTime<chrono::Utc>>,
    pub created: chrono::DateTime<chrono::Utc>,
}

/// Data needed to create an invite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewInvite {
    pub inviter: String,
    pub recipient: String,
    pub code: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_user_username_from_email() {
        let user = NewUser::new("u-1", "jane.doe@example.com");
        assert_eq!(user.username, "jane.doe");
        assert_eq!(user.email, "jane.doe@example.com");
    }

    #[test]
    fn test_new_user_without_at_sign() {
        let user = NewUser::new("u-2", "nobody");
        assert_eq!(user.username, "nobody");
    }

    #[test]
    fn test_profile_default_is_blank() {
        let profile = Profile::default();
        assert!(profile.website.is_none());
        assert!(profile.photo.is_none());
        assert!(profile.last_name.is_empty());
    }
}
