//! Group tags on a profile: parsing the free-text field and reconciling
//! memberships with it.
//!
//! System groups are managed elsewhere. Reconciliation never detaches one
//! and never attaches one, even when its name is listed.

use once_cell::sync::Lazy;
use phonebook_core::{PhonebookResult, ValidationError};
use phonebook_db::{Group, PhonebookStore};
use regex::Regex;

/// Message for group text with characters outside the allowed set.
pub const INVALID_GROUPS_MESSAGE: &str =
    "Tags can only contain alphanumeric characters, dashes, spaces.";

static GROUPS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9 .:,-]*$").expect("valid regex"));

/// Parses comma-separated group names.
///
/// The text is lower-cased and split on commas; tokens are trimmed and
/// empty ones dropped. Order and duplicates are kept.
///
/// ```
/// use phonebook::groups::clean_groups;
///
/// assert_eq!(clean_groups("Foo, bar,, BAZ").unwrap(), vec!["foo", "bar", "baz"]);
/// assert!(clean_groups("foo!bar").is_err());
/// ```
pub fn clean_groups(raw: &str) -> Result<Vec<String>, ValidationError> {
    if !GROUPS_RE.is_match(raw) {
        return Err(ValidationError::new(INVALID_GROUPS_MESSAGE, "invalid_groups"));
    }

    Ok(raw
        .to_lowercase()
        .split(',')
        .map(str::trim)
        .filter(|g| !g.is_empty() && !g.contains(','))
        .map(String::from)
        .collect())
}

/// What a reconciliation changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupChanges {
    /// Groups detached from the profile.
    pub removed: Vec<Group>,
    /// Groups attached that were not attached before.
    pub added: Vec<Group>,
}

impl GroupChanges {
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.added.is_empty()
    }
}

/// Makes the profile's non-system groups match `target`.
///
/// Every attached non-system group not named in `target` is removed. Every
/// name in `target` is fetched or created, and the non-system ones are
/// attached. Removals are applied before additions, each as one batch.
pub async fn reconcile_groups(
    store: &dyn PhonebookStore,
    profile_id: i64,
    target: &[String],
) -> PhonebookResult<GroupChanges> {
    let current = store.profile_groups(profile_id).await?;

    let removed: Vec<Group> = current
        .iter()
        .filter(|g| !g.system && !target.contains(&g.name))
        .cloned()
        .collect();

    let mut to_attach: Vec<Group> = Vec::new();
    for name in target {
        let (group, created) = store.get_or_create_group(name).await?;
        if created {
            tracing::debug!(group = %group.name, "created group");
        }
        if !group.system && !to_attach.iter().any(|g| g.id == group.id) {
            to_attach.push(group);
        }
    }

    let removed_ids: Vec<i64> = removed.iter().map(|g| g.id).collect();
    if !removed_ids.is_empty() {
        store.remove_profile_groups(profile_id, &removed_ids).await?;
    }

    let attach_ids: Vec<i64> = to_attach.iter().map(|g| g.id).collect();
    if !attach_ids.is_empty() {
        store.add_profile_groups(profile_id, &attach_ids).await?;
    }

    let added: Vec<Group> = to_attach
        .into_iter()
        .filter(|g| !current.iter().any(|c| c.id == g.id))
        .collect();

    tracing::info!(
        profile_id,
        removed = removed.len(),
        added = added.len(),
        "reconciled groups"
    );

    Ok(GroupChanges { removed, added })
}
