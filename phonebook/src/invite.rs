//! Inviting someone to join by email.
//!
//! The recipient must not already belong to a member. That check happens
//! at validation time and the invite is created later in
//! [`InviteForm::save`], so two concurrent requests (or a sign-up between
//! the two steps) can still produce an invite for an existing member.
//! Redemption has to tolerate that.

use std::collections::HashMap;
use std::sync::Arc;

use phonebook_core::{PhonebookError, PhonebookResult, ValidationError};
use phonebook_db::{Invite, NewInvite, PhonebookStore, User};
use phonebook_forms::{BaseForm, Form, FormData, FormFieldDef, FormFieldType};
use uuid::Uuid;

/// Message for a recipient that already has an account.
pub const ALREADY_VOUCHED_MESSAGE: &str =
    "You cannot invite someone who has already been vouched.";

/// Checks that no member uses `email`, returning it unchanged.
///
/// A match is reported as [`PhonebookError::ValidationError`]; store
/// failures propagate as they are.
pub async fn clean_recipient(store: &dyn PhonebookStore, email: &str) -> PhonebookResult<String> {
    if store.count_users_with_email(email).await? > 0 {
        return Err(ValidationError::new(ALREADY_VOUCHED_MESSAGE, "already_vouched").into());
    }
    Ok(email.to_string())
}

/// Returns a fresh invite code (32 lower-case hex characters).
pub fn new_invite_code() -> String {
    Uuid::new_v4().simple().to_string()
}

/// The invite form: a single required `recipient` email.
pub struct InviteForm {
    inner: BaseForm,
    store: Arc<dyn PhonebookStore>,
    recipient: Option<String>,
}

impl InviteForm {
    pub fn new(store: Arc<dyn PhonebookStore>) -> Self {
        Self {
            inner: BaseForm::new(vec![
                FormFieldDef::new("recipient", FormFieldType::Email).label("Recipient email")
            ]),
            store,
            recipient: None,
        }
    }

    /// Binds submitted data, discarding earlier validation results.
    pub fn bind(&mut self, data: &FormData) {
        self.inner.bind(data);
        self.recipient = None;
    }

    /// Validates the recipient. `Err` only when the store lookup failed.
    pub async fn is_valid(&mut self) -> PhonebookResult<bool> {
        self.recipient = None;
        if !self.inner.is_valid().await {
            return Ok(false);
        }

        let Some(email) = self.inner.cleaned_str("recipient").map(str::to_string) else {
            return Ok(false);
        };
        match clean_recipient(self.store.as_ref(), &email).await {
            Ok(recipient) => {
                self.recipient = Some(recipient);
                Ok(true)
            }
            Err(PhonebookError::ValidationError(e)) => {
                tracing::debug!(recipient = %email, "invite refused for existing member");
                self.inner.add_error("recipient", e.message);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Returns per-field validation errors.
    pub fn errors(&self) -> &HashMap<String, Vec<String>> {
        self.inner.errors()
    }

    /// The validated recipient.
    pub fn recipient(&self) -> Option<&str> {
        self.recipient.as_deref()
    }

    /// Creates the invite from `inviter` to the validated recipient.
    pub async fn save(&self, inviter: &User) -> PhonebookResult<Invite> {
        let recipient = self.recipient.clone().ok_or_else(|| {
            PhonebookError::from(ValidationError::new(
                "The invite form has not been validated.",
                "unvalidated",
            ))
        })?;

        let invite = self
            .store
            .create_invite(NewInvite {
                inviter: inviter.unique_id.clone(),
                recipient,
                code: new_invite_code(),
            })
            .await?;

        tracing::info!(
            inviter = %invite.inviter,
            recipient = %invite.recipient,
            "created invite"
        );
        Ok(invite)
    }
}
