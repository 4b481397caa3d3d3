//! Pieces shared by the entity dialogs.

use std::sync::Arc;

use thiserror::Error;

use crate::endpoint::{ExistenceCheck, UniquenessValidator};
use crate::feedback::{Notice, NoticeCenter};
use crate::form::{
    FieldLens, FormController, FormError, FormModel, FormOptions, FormResult, GlobalError,
    GlobalErrorKind, ValidationError,
};
use crate::i18n::I18nManager;
use crate::rules::{
    DisplayNameViolation, IDENTIFIER_MAX_LEN, IDENTIFIER_MIN_LEN, IdentifierViolation,
    check_display_name, check_identifier,
};

/// Field error with a stable code and a message already resolved from the
/// catalog.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FieldError {
    code: &'static str,
    message: String,
}

impl FieldError {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn code(&self) -> &'static str {
        self.code
    }
}

impl ValidationError for FieldError {
    fn message(&self) -> String {
        self.message.clone()
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DialogMode {
    Create,
    Edit,
}

#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum DialogError {
    #[error(transparent)]
    Form(#[from] FormError),
    #[error("field `{0}` cannot be changed in edit mode")]
    ReadOnlyField(&'static str),
}

pub type DialogResult<T> = Result<T, DialogError>;

/// Everything a dialog needs from the surrounding console.
#[derive(Clone, Default)]
pub struct ConsoleContext {
    pub options: FormOptions,
    pub i18n: I18nManager,
    pub notices: NoticeCenter,
}

pub(crate) type SavedCallback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Builds catalog-backed field errors for one kind of entity.
#[derive(Clone)]
pub(crate) struct Messages {
    i18n: I18nManager,
    entity: &'static str,
}

impl Messages {
    pub(crate) fn new(i18n: &I18nManager, entity: &'static str) -> Self {
        Self {
            i18n: *i18n,
            entity,
        }
    }

    pub(crate) fn text(&self, key: &str) -> String {
        self.i18n.t(key)
    }

    /// `"<entity>.<suffix>"`, e.g. `"organization.name.taken"`.
    pub(crate) fn entity_text(&self, suffix: &str) -> String {
        self.i18n.t(&format!("{}.{suffix}", self.entity))
    }

    /// Hint shown under a field whose asynchronous check could not run.
    pub(crate) fn unavailable(&self, label_key: &str) -> String {
        let label = self.i18n.t(label_key);
        self.i18n
            .t_with("form.validation_unavailable", &[("field", label.as_str())])
    }

    pub(crate) fn required(&self, label_key: &str) -> FieldError {
        let label = self.i18n.t(label_key);
        FieldError::new(
            "required",
            self.i18n.t_with("form.required", &[("field", label.as_str())]),
        )
    }

    pub(crate) fn identifier(&self, violation: IdentifierViolation) -> FieldError {
        let label = self.i18n.t("field.name");
        let min = IDENTIFIER_MIN_LEN.to_string();
        let max = IDENTIFIER_MAX_LEN.to_string();
        let params = [
            ("field", label.as_str()),
            ("min", min.as_str()),
            ("max", max.as_str()),
        ];
        match violation {
            IdentifierViolation::TooShort => FieldError::new(
                "too_short",
                self.i18n.t_with("identifier.too_short", &params),
            ),
            IdentifierViolation::TooLong => {
                FieldError::new("too_long", self.i18n.t_with("identifier.too_long", &params))
            }
            IdentifierViolation::Pattern => {
                FieldError::new("pattern", self.i18n.t_with("identifier.pattern", &params))
            }
        }
    }

    pub(crate) fn display_name(&self, violation: DisplayNameViolation) -> FieldError {
        match violation {
            DisplayNameViolation::Blank => {
                FieldError::new("blank", self.entity_text("display_name.blank"))
            }
        }
    }

    pub(crate) fn name_taken(&self) -> FieldError {
        FieldError::new("taken", self.entity_text("name.taken"))
    }

    pub(crate) fn name_invalid(&self) -> FieldError {
        FieldError::new("invalid", self.entity_text("name.invalid"))
    }

    pub(crate) fn saved(&self, name: &str) -> String {
        self.i18n
            .t_with(&format!("{}.saved", self.entity), &[("name", name)])
    }

    /// Text for the dialog's error banner.
    pub(crate) fn global_error(&self, error: &GlobalError) -> String {
        let entity = self.entity_text("entity");
        match error.kind {
            GlobalErrorKind::Unexpected => self
                .i18n
                .t_with("form.error.unexpected", &[("entity", entity.as_str())]),
            GlobalErrorKind::UnmatchedViolation => self.i18n.t_with(
                "form.error.unmatched",
                &[("entity", entity.as_str()), ("detail", error.detail.as_str())],
            ),
            GlobalErrorKind::ValidationUnavailable => {
                self.i18n.t("form.error.validation_unavailable")
            }
        }
    }
}

/// A save blocked by an unreachable check under fail-closed also raises an
/// error notice.
pub(crate) fn notify_validation_unavailable<T>(
    form: &FormController<T, FieldError>,
    messages: &Messages,
    notices: &NoticeCenter,
) -> FormResult<()>
where
    T: FormModel,
{
    if let Some(error) = form
        .global_error()?
        .filter(|error| error.kind == GlobalErrorKind::ValidationUnavailable)
    {
        notices.show(Notice::error(messages.global_error(&error)));
    }
    Ok(())
}

/// Retry action label while the banner shows a retryable error.
pub(crate) fn retry_label<T>(
    form: &FormController<T, FieldError>,
    messages: &Messages,
) -> FormResult<Option<String>>
where
    T: FormModel,
{
    Ok(form
        .global_error()?
        .filter(|error| error.retryable)
        .map(|_| messages.text("form.retry")))
}

pub(crate) fn unavailable_hint<T, L>(
    form: &FormController<T, FieldError>,
    lens: L,
    messages: &Messages,
    label_key: &str,
) -> FormResult<Option<String>>
where
    T: FormModel,
    L: FieldLens<T>,
{
    Ok(form
        .field_meta(lens)?
        .filter(|meta| meta.unavailable)
        .map(|_| messages.unavailable(label_key)))
}

/// Wires a required identifier field: slug rules locally, `"name ..."`
/// violations and "already exists" rejections from the endpoint.
pub(crate) fn register_identifier_field<T, L>(
    form: &FormController<T, FieldError>,
    lens: L,
    messages: &Messages,
) -> FormResult<()>
where
    T: FormModel,
    L: FieldLens<T, Value = Option<String>>,
{
    form.register_required_field(lens, messages.required("field.name"))?;
    let rules = messages.clone();
    form.register_field_validator(lens, move |_model: &T, value: &Option<String>| {
        match value.as_deref() {
            Some(value) => check_identifier(value).map_err(|violation| rules.identifier(violation)),
            None => Ok(()),
        }
    })?;
    form.register_violation_prefix(lens, lens.key().as_str(), messages.name_invalid())?;
    form.register_already_exists_field(lens, messages.name_taken())
}

pub(crate) fn register_display_name_field<T, L>(
    form: &FormController<T, FieldError>,
    lens: L,
    messages: &Messages,
) -> FormResult<()>
where
    T: FormModel,
    L: FieldLens<T, Value = Option<String>>,
{
    form.register_required_field(lens, messages.required("field.display_name"))?;
    let rules = messages.clone();
    form.register_field_validator(lens, move |_model: &T, value: &Option<String>| {
        match value.as_deref() {
            Some(value) => {
                check_display_name(value).map_err(|violation| rules.display_name(violation))
            }
            None => Ok(()),
        }
    })?;
    form.register_violation_prefix(
        lens,
        lens.key().as_str(),
        messages.display_name(DisplayNameViolation::Blank),
    )
}

pub(crate) fn register_uniqueness_check<T, L>(
    form: &FormController<T, FieldError>,
    lens: L,
    names: Arc<dyn ExistenceCheck>,
    messages: &Messages,
) -> FormResult<()>
where
    T: FormModel,
    L: FieldLens<T, Value = Option<String>>,
{
    form.register_async_field_validator(lens, UniquenessValidator::new(names, messages.name_taken()))
}

/// Treats an empty text input as "not yet entered".
pub(crate) fn text_value(value: impl Into<String>) -> Option<String> {
    let value = value.into();
    (!value.is_empty()).then_some(value)
}
