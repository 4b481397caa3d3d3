//! Message catalog compiled from `locales/*.toml` by the build script.

use std::collections::HashMap;
use std::sync::LazyLock;

mod generated {
    include!(concat!(env!("OUT_DIR"), "/console_forms_i18n_generated.rs"));
}

type Entries = HashMap<&'static str, &'static str>;

static CATALOG: LazyLock<HashMap<&'static str, Entries>> = LazyLock::new(|| {
    generated::LOCALES
        .iter()
        .map(|(locale, entries)| (*locale, entries.iter().copied().collect()))
        .collect()
});

/// Requested UI language: an explicit tag such as `de` or `de_AT.UTF-8`, or
/// whatever the operating system reports.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum Locale {
    #[default]
    System,
    Tag(String),
}

impl From<&str> for Locale {
    fn from(value: &str) -> Self {
        let value = value.trim();
        if value.eq_ignore_ascii_case("system") {
            Self::System
        } else {
            Self::Tag(value.to_string())
        }
    }
}

impl From<String> for Locale {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

/// Looks up console messages in one resolved catalog locale. Keys missing
/// there fall back to the default locale, then to the key itself.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct I18nManager {
    locale: &'static str,
}

impl Default for I18nManager {
    fn default() -> Self {
        Self::new()
    }
}

impl I18nManager {
    pub fn new() -> Self {
        Self::with_locale(Locale::System)
    }

    pub fn with_locale(locale: impl Into<Locale>) -> Self {
        let requested = match locale.into() {
            Locale::System => system_locale(),
            Locale::Tag(tag) => Some(tag),
        };
        let locale = requested
            .as_deref()
            .and_then(catalog_locale)
            .unwrap_or(generated::DEFAULT_LOCALE);
        tracing::debug!(requested = ?requested, locale, "message catalog selected");
        Self { locale }
    }

    pub fn resolved_locale(&self) -> &'static str {
        self.locale
    }

    pub fn t(&self, key: &str) -> String {
        self.lookup(key).unwrap_or(key).to_string()
    }

    /// Like [`t`](Self::t), replacing `{name}` placeholders from `params`.
    /// Placeholders without a value stay as written.
    pub fn t_with(&self, key: &str, params: &[(&str, &str)]) -> String {
        interpolate(self.lookup(key).unwrap_or(key), params)
    }

    fn lookup(&self, key: &str) -> Option<&'static str> {
        [self.locale, generated::DEFAULT_LOCALE]
            .into_iter()
            .find_map(|locale| CATALOG.get(locale)?.get(key).copied())
    }
}

/// Catalog locale for a requested tag: exact language-region match first,
/// then the bare language.
fn catalog_locale(requested: &str) -> Option<&'static str> {
    let wanted = tag_parts(requested);
    let language = wanted.first()?;
    let available = || generated::LOCALES.iter().map(|(locale, _)| *locale);
    available()
        .find(|locale| tag_parts(locale) == wanted)
        .or_else(|| available().find(|locale| tag_parts(locale).first() == Some(language)))
}

/// `"de_AT.UTF-8@euro"` becomes `["de", "at"]`.
fn tag_parts(tag: &str) -> Vec<String> {
    tag.trim()
        .split(['.', '@'])
        .next()
        .unwrap_or_default()
        .split(['-', '_'])
        .filter(|part| !part.is_empty())
        .map(str::to_ascii_lowercase)
        .collect()
}

#[cfg(feature = "i18n")]
fn system_locale() -> Option<String> {
    sys_locale::get_locale()
}

#[cfg(not(feature = "i18n"))]
fn system_locale() -> Option<String> {
    None
}

fn interpolate(template: &str, params: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            out.push_str(&rest[open..]);
            return out;
        };
        let name = &after[..close];
        match params.iter().find(|(param, _)| *param == name) {
            Some((_, value)) => out.push_str(value),
            None => out.push_str(&rest[open..open + close + 2]),
        }
        rest = &after[close + 1..];
    }
    out.push_str(rest);
    out
}
