//! The profile edit form.
//!
//! [`ProfileForm`] validates names, biography, photo, website, address,
//! country and group tags, and [`ProfileForm::save`] applies the result to
//! the user's profile, address and group memberships in one store
//! transaction.
//!
//! Field cleaners run independently: a bad photo does not keep the groups
//! from being checked, and every failure is reported on its own field.

use std::collections::HashMap;
use std::sync::Arc;

use phonebook_core::{PhonebookError, PhonebookResult, Settings, ValidationError};
use phonebook_db::{Address, Country, PhonebookStore, Profile, User, Value};
use phonebook_forms::{BaseForm, Form, FormData, FormFieldDef, FormFieldType, Warning, Widget};
use tracing::Instrument;

use crate::context::RequestContext;
use crate::directory::{DirectoryService, PersonAttributes, PhotoUpdate};
use crate::groups::{clean_groups, reconcile_groups, GroupChanges};
use crate::media::{photo_name, staged_photo_name, MediaStorage};
use crate::photo::{clean_photo, PhotoConfig, ProcessedPhoto};

/// Locale used for the country list when none is given.
pub const DEFAULT_LOCALE: &str = "en-US";

/// Label of the "no country" choice.
pub const EMPTY_COUNTRY_LABEL: &str = "--";

/// Resolves a submitted country id.
///
/// An empty selection is `None` without a warning. An id that does not
/// parse or matches no country is also `None`, with a warning; it never
/// fails validation.
pub async fn clean_country(
    store: &dyn PhonebookStore,
    raw: Option<&str>,
) -> PhonebookResult<(Option<Country>, Option<Warning>)> {
    let raw = raw.map(str::trim).unwrap_or_default();
    if raw.is_empty() {
        return Ok((None, None));
    }

    let Ok(id) = raw.parse::<i64>() else {
        let warning = Warning::new("country", format!("'{raw}' is not a country id"));
        return Ok((None, Some(warning)));
    };

    Ok(match store.get_country(id).await? {
        Some(country) => (Some(country), None),
        None => (
            None,
            Some(Warning::new("country", format!("no country with id {id}"))),
        ),
    })
}

/// Everything a valid profile form carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileData {
    pub first_name: String,
    pub last_name: String,
    pub biography: String,
    pub photo: Option<ProcessedPhoto>,
    pub photo_delete: bool,
    pub irc_nickname: String,
    pub irc_nickname_unique_id: String,
    pub groups: Vec<String>,
    pub website: Option<String>,
    pub street: String,
    pub city: String,
    pub province: String,
    pub postal_code: String,
    pub country: Option<Country>,
}

impl ProfileData {
    /// The attributes mirrored to the directory service.
    pub fn person_attributes(&self) -> PersonAttributes {
        PersonAttributes {
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            biography: self.biography.clone(),
            website: self.website.clone(),
            irc_nickname: self.irc_nickname.clone(),
            irc_nickname_unique_id: self.irc_nickname_unique_id.clone(),
        }
    }

    /// The photo change mirrored to the directory service. A new photo
    /// wins over the delete checkbox.
    pub fn photo_update(&self) -> PhotoUpdate {
        match (&self.photo, self.photo_delete) {
            (Some(photo), _) => PhotoUpdate::Replace(photo.bytes.clone()),
            (None, true) => PhotoUpdate::Remove,
            (None, false) => PhotoUpdate::Unchanged,
        }
    }
}

/// The records written by [`ProfileForm::save`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedProfile {
    pub profile: Profile,
    pub address: Address,
    pub groups: GroupChanges,
}

fn profile_fields(country_choices: Vec<(String, String)>) -> Vec<FormFieldDef> {
    vec![
        FormFieldDef::text("first_name")
            .label("First Name")
            .required(false),
        FormFieldDef::text("last_name").label("Last Name"),
        FormFieldDef::text("biography")
            .label("Bio")
            .widget(Widget::Textarea)
            .required(false),
        FormFieldDef::new("photo", FormFieldType::Image)
            .label("Profile Photo")
            .required(false),
        FormFieldDef::new("photo_delete", FormFieldType::Boolean)
            .label("Remove Profile Photo")
            .required(false),
        FormFieldDef::text("irc_nickname")
            .label("IRC Nickname")
            .required(false),
        FormFieldDef::text("irc_nickname_unique_id")
            .widget(Widget::HiddenInput)
            .required(false),
        FormFieldDef::text("groups").label("Groups").required(false),
        FormFieldDef::new("website", FormFieldType::Url)
            .label("Website")
            .required(false),
        FormFieldDef::text("street").label("Address").required(false),
        FormFieldDef::text("city").label("City").required(false),
        // TODO: validate provinces/states for countries that have a fixed list.
        FormFieldDef::text("province")
            .label("Province/State")
            .required(false),
        FormFieldDef::text("postal_code")
            .label("Postal/Zip Code")
            .required(false),
        FormFieldDef::new(
            "country",
            FormFieldType::Choice {
                choices: country_choices,
                strict: false,
            },
        )
        .label("Country")
        .required(false),
    ]
}

/// The profile edit form.
pub struct ProfileForm {
    inner: BaseForm,
    store: Arc<dyn PhonebookStore>,
    photo_config: PhotoConfig,
    directory_sync: bool,
    locale: String,
    photo: Option<ProcessedPhoto>,
    country: Option<Country>,
    groups: Vec<String>,
    validated: bool,
}

impl ProfileForm {
    /// Builds the form, loading the country list for `locale`
    /// (default [`DEFAULT_LOCALE`]).
    pub async fn new(
        store: Arc<dyn PhonebookStore>,
        settings: &Settings,
        locale: Option<&str>,
    ) -> PhonebookResult<Self> {
        let locale = locale.unwrap_or(DEFAULT_LOCALE).to_string();

        let mut choices = vec![(String::new(), EMPTY_COUNTRY_LABEL.to_string())];
        choices.extend(
            store
                .localized_countries(&locale)
                .await?
                .into_iter()
                .map(|(country, name)| (country.id.to_string(), name)),
        );

        Ok(Self {
            inner: BaseForm::new(profile_fields(choices)),
            store,
            photo_config: PhotoConfig::from_settings(settings),
            directory_sync: settings.directory_sync,
            locale,
            photo: None,
            country: None,
            groups: Vec::new(),
            validated: false,
        })
    }

    /// The locale the country list was built for.
    pub fn locale(&self) -> &str {
        &self.locale
    }

    /// Returns the field definitions.
    pub fn fields(&self) -> &[FormFieldDef] {
        self.inner.fields()
    }

    /// The `(id, display name)` country choices, "no country" first.
    pub fn country_choices(&self) -> &[(String, String)] {
        match self.inner.field("country").map(|f| &f.field_type) {
            Some(FormFieldType::Choice { choices, .. }) => choices,
            _ => &[],
        }
    }

    /// Builds the submission that pre-fills the form for `user`.
    pub async fn initial_for(&self, user: &User) -> PhonebookResult<FormData> {
        let profile = self.store.get_profile(user.id).await?;
        let address = self.store.get_address(user.id).await?;
        let groups: Vec<String> = self
            .store
            .profile_groups(profile.id)
            .await?
            .into_iter()
            .filter(|g| !g.system)
            .map(|g| g.name)
            .collect();
        let postal_code = match address.postal_code_id {
            Some(id) => self
                .store
                .get_postal_code(id)
                .await?
                .map(|pc| pc.code)
                .unwrap_or_default(),
            None => String::new(),
        };

        Ok(FormData::new()
            .with_field("first_name", profile.first_name)
            .with_field("last_name", profile.last_name)
            .with_field("biography", profile.biography)
            .with_field("website", profile.website.unwrap_or_default())
            .with_field("groups", groups.join(", "))
            .with_field("street", address.street)
            .with_field("city", address.city)
            .with_field("province", address.province)
            .with_field("postal_code", postal_code)
            .with_field(
                "country",
                address.country_id.map(|id| id.to_string()).unwrap_or_default(),
            ))
    }

    /// Binds submitted data, discarding earlier validation results.
    pub fn bind(&mut self, data: &FormData) {
        self.inner.bind(data);
        self.reset();
    }

    /// Returns `true` if this form has been bound to data.
    pub fn is_bound(&self) -> bool {
        self.inner.is_bound()
    }

    /// Validates every field.
    ///
    /// Returns `Ok(false)` when any field has errors; `Err` only when the
    /// store or photo processing failed.
    pub async fn is_valid(&mut self) -> PhonebookResult<bool> {
        self.reset();
        if !self.inner.is_bound() {
            return Ok(false);
        }
        self.inner.is_valid().await;

        if self.inner.cleaned_data().contains_key("photo") {
            match clean_photo(self.inner.file("photo"), &self.photo_config).await {
                Ok(photo) => self.photo = photo,
                Err(PhonebookError::ValidationError(e)) => self.inner.add_error("photo", e.message),
                Err(e) => return Err(e),
            }
        }

        if self.inner.cleaned_data().contains_key("country") {
            let (country, warning) =
                clean_country(self.store.as_ref(), self.inner.cleaned_str("country")).await?;
            if let Some(warning) = warning {
                self.inner.add_warning(warning);
            }
            let value = country.as_ref().map_or(Value::Null, |c| Value::Int(c.id));
            self.inner.set_cleaned("country", value);
            self.country = country;
        }

        if let Some(raw) = self.inner.cleaned_str("groups").map(str::to_string) {
            match clean_groups(&raw) {
                Ok(groups) => self.groups = groups,
                Err(e) => self.inner.add_error("groups", e.message),
            }
        }

        self.validated = self.inner.errors().is_empty();
        if !self.validated {
            tracing::debug!(errors = ?self.inner.errors(), "profile form invalid");
        }
        Ok(self.validated)
    }

    /// Returns per-field validation errors.
    pub fn errors(&self) -> &HashMap<String, Vec<String>> {
        self.inner.errors()
    }

    /// Returns the warnings of tolerant cleaners (country).
    pub fn warnings(&self) -> &[Warning] {
        self.inner.warnings()
    }

    /// Returns the cleaned values, or `None` unless the last validation
    /// succeeded.
    pub fn cleaned(&self) -> Option<ProfileData> {
        if !self.validated {
            return None;
        }
        let text = |name: &str| self.inner.cleaned_str(name).unwrap_or_default().to_string();
        Some(ProfileData {
            first_name: text("first_name"),
            last_name: text("last_name"),
            biography: text("biography"),
            photo: self.photo.clone(),
            photo_delete: self.inner.cleaned_bool("photo_delete"),
            irc_nickname: text("irc_nickname"),
            irc_nickname_unique_id: text("irc_nickname_unique_id"),
            groups: self.groups.clone(),
            website: self.inner.cleaned_str("website").map(String::from),
            street: text("street"),
            city: text("city"),
            province: text("province"),
            postal_code: text("postal_code"),
            country: self.country.clone(),
        })
    }

    /// Saves the validated form for the user in `ctx`.
    ///
    /// 1. Directory writes, when `directory_sync` is enabled
    /// 2. A new photo is written to media storage under a staging name
    /// 3. Groups, profile and address are updated in one store transaction
    /// 4. The staged photo is renamed over `photos/<unique_id>.jpg`
    ///
    /// Any store error rolls the transaction back, deletes the staged photo
    /// and is returned. A photo removed with `photo_delete` is deleted from
    /// media storage after the commit.
    pub async fn save(
        &self,
        ctx: &RequestContext,
        directory: &dyn DirectoryService,
        media: &dyn MediaStorage,
    ) -> PhonebookResult<SavedProfile> {
        let data = self.cleaned().ok_or_else(|| self.not_valid_error())?;

        async move {
            let unique_id = ctx.user.unique_id.as_str();

            if self.directory_sync {
                directory
                    .update_person(unique_id, &data.person_attributes())
                    .await?;
                directory
                    .update_profile_photo(unique_id, &data.photo_update())
                    .await?;
            }

            let staged = match &data.photo {
                Some(photo) => {
                    let name = photo_name(unique_id)?;
                    let staging = staged_photo_name(unique_id)?;
                    media.save(&staging, &photo.bytes).await?;
                    Some((staging, name))
                }
                None => None,
            };

            let photo_path = staged.as_ref().map(|(_, name)| name.clone());
            let (saved, removed_photo) = match self.write(&ctx.user, &data, photo_path).await {
                Ok(written) => written,
                Err(e) => {
                    if let Some((staging, _)) = &staged {
                        discard_staged(media, staging).await;
                    }
                    tracing::warn!(error = %e, "profile save rolled back");
                    return Err(e);
                }
            };

            if let Some((staging, name)) = &staged {
                if let Err(e) = media.rename(staging, name).await {
                    tracing::error!(error = %e, photo = %name, "could not move saved photo into place");
                    discard_staged(media, staging).await;
                    return Err(e);
                }
            }
            if let Some(name) = removed_photo {
                if let Err(e) = media.delete(&name).await {
                    tracing::warn!(error = %e, photo = %name, "could not delete removed photo");
                }
            }
            tracing::info!(profile_id = saved.profile.id, "saved profile");
            Ok(saved)
        }
        .instrument(ctx.span())
        .await
    }

    /// Runs [`apply`](Self::apply) in its own store transaction.
    async fn write(
        &self,
        user: &User,
        data: &ProfileData,
        photo_path: Option<String>,
    ) -> PhonebookResult<(SavedProfile, Option<String>)> {
        let tx = self.store.transaction().await?;
        let applied = Self::apply(tx.store(), user, data, photo_path).await;
        match applied {
            Ok(applied) => {
                tx.commit().await?;
                Ok(applied)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!(error = %rollback_err, "rollback failed");
                }
                Err(e)
            }
        }
    }

    /// Writes groups, profile and address. Returns the saved records and
    /// the media name of a photo that was cleared.
    async fn apply(
        store: &dyn PhonebookStore,
        user: &User,
        data: &ProfileData,
        photo_path: Option<String>,
    ) -> PhonebookResult<(SavedProfile, Option<String>)> {
        let mut profile = store.get_profile(user.id).await?;
        let groups = reconcile_groups(store, profile.id, &data.groups).await?;

        profile.first_name.clone_from(&data.first_name);
        profile.last_name.clone_from(&data.last_name);
        profile.biography.clone_from(&data.biography);
        profile.website.clone_from(&data.website);

        let mut removed_photo = None;
        if let Some(path) = photo_path {
            profile.photo = Some(path);
        } else if data.photo_delete {
            removed_photo = profile.photo.take();
        }

        let mut address = store.get_address(user.id).await?;
        address.street.clone_from(&data.street);
        address.city.clone_from(&data.city);
        address.province.clone_from(&data.province);
        address.country_id = data.country.as_ref().map(|c| c.id);
        address.postal_code_id = if data.postal_code.is_empty() {
            None
        } else {
            let (postal_code, created) = store.get_or_create_postal_code(&data.postal_code).await?;
            if created {
                tracing::debug!(code = %postal_code.code, "created postal code");
            }
            Some(postal_code.id)
        };

        store.save_address(&address).await?;
        store.save_profile(&profile).await?;

        Ok((
            SavedProfile {
                profile,
                address,
                groups,
            },
            removed_photo,
        ))
    }

    fn reset(&mut self) {
        self.photo = None;
        self.country = None;
        self.groups.clear();
        self.validated = false;
    }

    fn not_valid_error(&self) -> PhonebookError {
        if self.inner.errors().is_empty() {
            return ValidationError::new("The form has not been validated.", "unvalidated").into();
        }
        let field_errors = self
            .inner
            .errors()
            .iter()
            .map(|(field, messages)| {
                let errors = messages
                    .iter()
                    .map(|m| ValidationError::new(m.clone(), "invalid"))
                    .collect();
                (field.clone(), errors)
            })
            .collect();
        ValidationError::with_field_errors(field_errors).into()
    }
}

async fn discard_staged(media: &dyn MediaStorage, staging: &str) {
    if let Err(e) = media.delete(staging).await {
        tracing::warn!(error = %e, photo = %staging, "could not delete staged photo");
    }
}
