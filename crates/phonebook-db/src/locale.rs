//! Locale tag handling for localized country names.
//!
//! Tags are compared in a normalized form: lower case, `-` as separator
//! ("en_US" and "en-us" both become "en-us"). A lookup for a regional tag
//! falls back to its bare language, then to the country's default name.

/// Normalizes a locale tag for comparison.
///
/// ```
/// use phonebook_db::locale::normalize;
///
/// assert_eq!(normalize("pt_BR"), "pt-br");
/// assert_eq!(normalize(" en-US "), "en-us");
/// ```
pub fn normalize(locale: &str) -> String {
    locale.trim().to_lowercase().replace('_', "-")
}

/// Returns the bare language of a normalized tag ("fr-ca" -> "fr").
pub fn language(locale: &str) -> &str {
    locale.split('-').next().unwrap_or(locale)
}

/// Picks the display name for a locale from `(locale, name)` translations.
///
/// Tries the exact normalized tag, then the bare language, then `default`.
pub fn pick_name<'a, I>(locale: &str, translations: I, default: &'a str) -> &'a str
where
    I: IntoIterator<Item = (&'a str, &'a str)> + Clone,
{
    let wanted = normalize(locale);
    let lang = language(&wanted);

    let exact = translations
        .clone()
        .into_iter()
        .find(|(tag, _)| normalize(tag) == wanted);
    if let Some((_, name)) = exact {
        return name;
    }

    translations
        .into_iter()
        .find(|(tag, _)| normalize(tag) == lang)
        .map_or(default, |(_, name)| name)
}

/// Orders `(id, display name)` choices by display name, case-insensitively.
pub fn sort_choices<T>(choices: &mut [(T, String)]) {
    choices.sort_by(|a, b| {
        a.1.to_lowercase()
            .cmp(&b.1.to_lowercase())
            .then_with(|| a.1.cmp(&b.1))
    });
}
