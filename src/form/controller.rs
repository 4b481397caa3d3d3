use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use super::validation::{AsyncRejection, FieldLens, FormModel, ValidationError};

static FORM_ID_ALLOCATOR: AtomicU64 = AtomicU64::new(1);

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct FormId(pub u64);

impl FormId {
    pub fn next() -> Self {
        Self(FORM_ID_ALLOCATOR.fetch_add(1, Ordering::SeqCst))
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct FieldKey(&'static str);

impl FieldKey {
    pub const fn new(value: &'static str) -> Self {
        Self(value)
    }

    pub const fn as_str(self) -> &'static str {
        self.0
    }
}

impl Display for FieldKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ValidationTicket(pub u64);

/// A field validation waiting for its debounce window to elapse.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ScheduledValidation {
    pub key: FieldKey,
    pub ticket: ValidationTicket,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SubmitState {
    Idle,
    Validating,
    Saving,
    Succeeded,
    Failed,
}

/// What happens when an asynchronous check cannot reach its endpoint.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnavailablePolicy {
    /// Clear the field error, flag the field and let the save proceed.
    #[default]
    FailOpen,
    /// Raise a global error and block the save until the check succeeds.
    FailClosed,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize)]
#[serde(default)]
pub struct FormOptions {
    pub debounce_ms: u64,
    pub unavailable_policy: UnavailablePolicy,
    pub focus_first_error_on_save: bool,
}

impl Default for FormOptions {
    fn default() -> Self {
        Self {
            debounce_ms: 500,
            unavailable_policy: UnavailablePolicy::FailOpen,
            focus_first_error_on_save: true,
        }
    }
}

impl FormOptions {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FieldMeta<E> {
    pub dirty: bool,
    pub touched: bool,
    pub validating: bool,
    pub unavailable: bool,
    pub error: Option<E>,
}

impl<E> Default for FieldMeta<E> {
    fn default() -> Self {
        Self {
            dirty: false,
            touched: false,
            validating: false,
            unavailable: false,
            error: None,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CloseReason {
    Saved,
    Cancelled,
    Dismissed,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum GlobalErrorKind {
    Unexpected,
    UnmatchedViolation,
    ValidationUnavailable,
}

/// Error that belongs to no single field. Rendered as a dismissible banner.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GlobalError {
    pub kind: GlobalErrorKind,
    pub detail: String,
    pub retryable: bool,
}

impl GlobalError {
    pub fn unexpected(detail: impl Into<String>) -> Self {
        Self {
            kind: GlobalErrorKind::Unexpected,
            detail: detail.into(),
            retryable: true,
        }
    }

    pub fn unmatched_violation(detail: impl Into<String>) -> Self {
        Self {
            kind: GlobalErrorKind::UnmatchedViolation,
            detail: detail.into(),
            retryable: false,
        }
    }

    pub fn validation_unavailable(detail: impl Into<String>) -> Self {
        Self {
            kind: GlobalErrorKind::ValidationUnavailable,
            detail: detail.into(),
            retryable: false,
        }
    }
}

#[derive(Clone, Debug)]
pub struct FormSnapshot<T, E> {
    pub model: T,
    pub submit_state: SubmitState,
    pub submit_count: u32,
    pub is_dirty: bool,
    pub is_valid: bool,
    pub field_meta: BTreeMap<FieldKey, FieldMeta<E>>,
    pub global_error: Option<GlobalError>,
    pub close: Option<CloseReason>,
}

impl<T, E> FormSnapshot<T, E> {
    pub fn error(&self, key: FieldKey) -> Option<&E> {
        self.field_meta.get(&key).and_then(|meta| meta.error.as_ref())
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum FormError {
    #[error("form state lock poisoned while {0}")]
    StatePoisoned(&'static str),
    #[error("invalid submit state transition: {from:?} -> {to:?}")]
    InvalidStateTransition { from: SubmitState, to: SubmitState },
    #[error("form {0:?} is closed")]
    Closed(FormId),
    #[error("form {0:?} is saving, edits are refused until the request finishes")]
    SaveInProgress(FormId),
}

pub type FormResult<T> = Result<T, FormError>;

pub type BoxedValidationFuture<'a, E> =
    Pin<Box<dyn Future<Output = Result<(), AsyncRejection<E>>> + Send + 'a>>;

pub(super) type SyncFieldValidatorFn<T, E> = Arc<dyn Fn(&T) -> Result<(), E> + Send + Sync>;
pub(super) type AsyncFieldValidatorFn<T, E> =
    Arc<dyn Fn(T) -> BoxedValidationFuture<'static, E> + Send + Sync>;
pub(super) type FieldChangedFn<T> = Arc<dyn Fn(&T, &T) -> bool + Send + Sync>;
pub(super) type FieldUnsetFn<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;
pub(super) type DeriveFieldFn<T> = Arc<dyn Fn(&mut T) + Send + Sync>;

#[derive(Clone)]
pub(super) struct AsyncFieldValidatorEntry<T, E> {
    pub(super) changed: FieldChangedFn<T>,
    pub(super) validator: AsyncFieldValidatorFn<T, E>,
}

#[derive(Clone)]
pub(super) struct RequiredFieldEntry<T, E> {
    pub(super) unset: FieldUnsetFn<T>,
    pub(super) error: E,
}

#[derive(Clone)]
pub(super) struct DerivedFieldEntry<T> {
    pub(super) target: FieldKey,
    pub(super) changed: FieldChangedFn<T>,
    pub(super) apply: DeriveFieldFn<T>,
}

#[derive(Clone)]
pub(super) struct ViolationMapping<E> {
    pub(super) prefix: &'static str,
    pub(super) key: FieldKey,
    pub(super) error: E,
}

#[derive(Clone)]
pub(super) struct RemoteErrorMapping<E> {
    pub(super) violations: Vec<ViolationMapping<E>>,
    pub(super) already_exists: Option<(FieldKey, E)>,
}

impl<E> Default for RemoteErrorMapping<E> {
    fn default() -> Self {
        Self {
            violations: Vec::new(),
            already_exists: None,
        }
    }
}

pub(super) struct FormState<T, E> {
    pub(super) id: FormId,
    pub(super) initial_model: T,
    pub(super) model: T,
    pub(super) submit_state: SubmitState,
    pub(super) submit_count: u32,
    /// Bumped on every edit of the model.
    pub(super) revision: u64,
    pub(super) dirty_fields: BTreeSet<FieldKey>,
    pub(super) field_meta: BTreeMap<FieldKey, FieldMeta<E>>,
    pub(super) tickets: BTreeMap<FieldKey, ValidationTicket>,
    pub(super) focus_request: Option<FieldKey>,
    pub(super) global_error: Option<GlobalError>,
    pub(super) close: Option<CloseReason>,
}

impl<T, E> FormState<T, E> {
    pub(super) fn ensure_meta(&mut self, key: FieldKey) -> &mut FieldMeta<E> {
        self.field_meta.entry(key).or_default()
    }

    pub(super) fn is_closed(&self) -> bool {
        self.close.is_some()
    }

    pub(super) fn mark_dirty(&mut self, key: FieldKey, dirty: bool) {
        if dirty {
            self.dirty_fields.insert(key);
        } else {
            self.dirty_fields.remove(&key);
        }
        self.ensure_meta(key).dirty = dirty;
    }

    /// Issues a fresh ticket for `key`, superseding any validation in flight.
    pub(super) fn schedule(&mut self, key: FieldKey) -> ScheduledValidation {
        let ticket = self.bump_ticket(key);
        self.ensure_meta(key).validating = true;
        ScheduledValidation { key, ticket }
    }

    pub(super) fn bump_ticket(&mut self, key: FieldKey) -> ValidationTicket {
        let next = ValidationTicket(
            self.tickets
                .get(&key)
                .copied()
                .unwrap_or(ValidationTicket(0))
                .0
                + 1,
        );
        self.tickets.insert(key, next);
        next
    }

    pub(super) fn is_current(&self, key: FieldKey, ticket: ValidationTicket) -> bool {
        self.tickets.get(&key).copied() == Some(ticket)
    }

    /// Invalidates every pending field validation.
    pub(super) fn supersede_pending(&mut self) {
        let keys = self.tickets.keys().copied().collect::<Vec<_>>();
        for key in keys {
            self.bump_ticket(key);
            self.ensure_meta(key).validating = false;
        }
    }

    pub(super) fn has_field_errors(&self) -> bool {
        self.field_meta.values().any(|meta| meta.error.is_some())
    }
}

#[derive(Clone)]
pub struct FormController<T, E>
where
    T: FormModel,
    E: ValidationError,
{
    pub(super) options: FormOptions,
    pub(super) state: Arc<RwLock<FormState<T, E>>>,
    pub(super) sync_field_validators:
        Arc<RwLock<BTreeMap<FieldKey, Vec<SyncFieldValidatorFn<T, E>>>>>,
    pub(super) async_field_validators:
        Arc<RwLock<BTreeMap<FieldKey, Vec<AsyncFieldValidatorEntry<T, E>>>>>,
    pub(super) derived_fields: Arc<RwLock<BTreeMap<FieldKey, Vec<DerivedFieldEntry<T>>>>>,
    pub(super) required_fields: Arc<RwLock<BTreeMap<FieldKey, RequiredFieldEntry<T, E>>>>,
    pub(super) remote_errors: Arc<RwLock<RemoteErrorMapping<E>>>,
    pub(super) field_descriptions: Arc<RwLock<BTreeMap<FieldKey, String>>>,
}

impl<T, E> FormController<T, E>
where
    T: FormModel,
    E: ValidationError,
{
    /// Opens a form seeded with `initial`. For "create" dialogs this is the
    /// empty model, for "edit" dialogs the loaded entity; uniqueness checks
    /// only run for values that differ from it.
    pub fn new(initial: T, options: FormOptions) -> Self {
        Self {
            options,
            state: Arc::new(RwLock::new(FormState {
                id: FormId::next(),
                initial_model: initial.clone(),
                model: initial,
                submit_state: SubmitState::Idle,
                submit_count: 0,
                revision: 0,
                dirty_fields: BTreeSet::new(),
                field_meta: BTreeMap::new(),
                tickets: BTreeMap::new(),
                focus_request: None,
                global_error: None,
                close: None,
            })),
            sync_field_validators: Arc::new(RwLock::new(BTreeMap::new())),
            async_field_validators: Arc::new(RwLock::new(BTreeMap::new())),
            derived_fields: Arc::new(RwLock::new(BTreeMap::new())),
            required_fields: Arc::new(RwLock::new(BTreeMap::new())),
            remote_errors: Arc::new(RwLock::new(RemoteErrorMapping::default())),
            field_descriptions: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }

    pub fn options(&self) -> FormOptions {
        self.options
    }

    pub fn form_id(&self) -> FormResult<FormId> {
        Ok(read_lock(&self.state, "reading form id")?.id)
    }

    /// Registers `lens` as required: saving while it is still unset marks it
    /// with `error` and never reaches the network.
    pub fn register_required_field<L, V>(&self, lens: L, error: E) -> FormResult<()>
    where
        L: FieldLens<T, Value = Option<V>>,
        V: Clone + PartialEq + Send + Sync + 'static,
    {
        let entry = RequiredFieldEntry {
            unset: Arc::new(move |model: &T| lens.get(model).is_none()),
            error,
        };
        let mut required = write_lock(&self.required_fields, "registering required field")?;
        required.insert(lens.key(), entry);
        Ok(())
    }

    pub fn register_field_description<L>(
        &self,
        lens: L,
        description: impl Into<String>,
    ) -> FormResult<()>
    where
        L: FieldLens<T>,
    {
        let mut descriptions =
            write_lock(&self.field_descriptions, "registering field description")?;
        descriptions.insert(lens.key(), description.into());
        Ok(())
    }

    /// Maps server-side constraint violations starting with `prefix` onto
    /// the field behind `lens`.
    pub fn register_violation_prefix<L>(
        &self,
        lens: L,
        prefix: &'static str,
        error: E,
    ) -> FormResult<()>
    where
        L: FieldLens<T>,
    {
        let mut remote = write_lock(&self.remote_errors, "registering violation prefix")?;
        remote.violations.push(ViolationMapping {
            prefix,
            key: lens.key(),
            error,
        });
        Ok(())
    }

    /// Field that receives "already exists" rejections from create/update.
    pub fn register_already_exists_field<L>(&self, lens: L, error: E) -> FormResult<()>
    where
        L: FieldLens<T>,
    {
        let mut remote = write_lock(&self.remote_errors, "registering already-exists field")?;
        remote.already_exists = Some((lens.key(), error));
        Ok(())
    }

    pub fn touch<L>(&self, lens: L) -> FormResult<()>
    where
        L: FieldLens<T>,
    {
        let mut state = write_lock(&self.state, "touching field")?;
        if state.is_closed() {
            return Err(FormError::Closed(state.id));
        }
        state.ensure_meta(lens.key()).touched = true;
        Ok(())
    }

    /// Discards edits and closes the form. Validations and saves still in
    /// flight resolve as no-ops.
    pub fn cancel(&self) -> FormResult<()> {
        self.teardown(CloseReason::Cancelled)
    }

    /// The owning dialog went away without cancel or save.
    pub fn close(&self) -> FormResult<()> {
        self.teardown(CloseReason::Dismissed)
    }

    fn teardown(&self, reason: CloseReason) -> FormResult<()> {
        let mut state = write_lock(&self.state, "closing form")?;
        if state.is_closed() {
            return Ok(());
        }
        state.model = state.initial_model.clone();
        state.submit_state = SubmitState::Idle;
        state.dirty_fields.clear();
        state.focus_request = None;
        state.global_error = None;
        for meta in state.field_meta.values_mut() {
            meta.dirty = false;
            meta.validating = false;
            meta.unavailable = false;
            meta.error = None;
        }
        state.close = Some(reason);
        tracing::debug!(form = state.id.0, ?reason, "form closed");
        Ok(())
    }

    pub fn is_closed(&self) -> FormResult<bool> {
        Ok(read_lock(&self.state, "reading close state")?.is_closed())
    }

    pub fn close_reason(&self) -> FormResult<Option<CloseReason>> {
        Ok(read_lock(&self.state, "reading close reason")?.close)
    }

    pub fn request_focus<L>(&self, lens: L) -> FormResult<()>
    where
        L: FieldLens<T>,
    {
        write_lock(&self.state, "requesting focus")?.focus_request = Some(lens.key());
        Ok(())
    }

    /// Hands the pending focus request to the presentation layer.
    pub fn take_focus_request(&self) -> FormResult<Option<FieldKey>> {
        Ok(write_lock(&self.state, "taking focus request")?
            .focus_request
            .take())
    }

    pub fn global_error(&self) -> FormResult<Option<GlobalError>> {
        Ok(read_lock(&self.state, "reading global error")?
            .global_error
            .clone())
    }

    pub fn dismiss_global_error(&self) -> FormResult<()> {
        write_lock(&self.state, "dismissing global error")?.global_error = None;
        Ok(())
    }

    pub fn snapshot(&self) -> FormResult<FormSnapshot<T, E>> {
        let state = read_lock(&self.state, "creating form snapshot")?;
        Ok(FormSnapshot {
            model: state.model.clone(),
            submit_state: state.submit_state,
            submit_count: state.submit_count,
            is_dirty: !state.dirty_fields.is_empty(),
            is_valid: !state.has_field_errors(),
            field_meta: state.field_meta.clone(),
            global_error: state.global_error.clone(),
            close: state.close,
        })
    }

    pub fn field_meta<L>(&self, lens: L) -> FormResult<Option<FieldMeta<E>>>
    where
        L: FieldLens<T>,
    {
        Ok(read_lock(&self.state, "reading field meta")?
            .field_meta
            .get(&lens.key())
            .cloned())
    }

    pub fn field_error<L>(&self, lens: L) -> FormResult<Option<E>>
    where
        L: FieldLens<T>,
    {
        Ok(self.field_meta(lens)?.and_then(|meta| meta.error))
    }

    pub fn field_description<L>(&self, lens: L) -> FormResult<Option<String>>
    where
        L: FieldLens<T>,
    {
        Ok(
            read_lock(&self.field_descriptions, "reading field description")?
                .get(&lens.key())
                .cloned(),
        )
    }

    pub fn is_required<L>(&self, lens: L) -> FormResult<bool>
    where
        L: FieldLens<T>,
    {
        Ok(read_lock(&self.required_fields, "reading required fields")?.contains_key(&lens.key()))
    }
}

pub(super) fn transition_submit_state<T, E>(
    state: &mut FormState<T, E>,
    next: SubmitState,
) -> FormResult<()> {
    let current = state.submit_state;
    if current == next {
        return Ok(());
    }

    let allowed = matches!(
        (current, next),
        (SubmitState::Idle, SubmitState::Validating)
            | (SubmitState::Idle, SubmitState::Saving)
            | (SubmitState::Validating, SubmitState::Saving)
            | (SubmitState::Validating, SubmitState::Failed)
            | (SubmitState::Saving, SubmitState::Succeeded)
            | (SubmitState::Failed, SubmitState::Validating)
            | (_, SubmitState::Idle)
    );
    if !allowed {
        return Err(FormError::InvalidStateTransition {
            from: current,
            to: next,
        });
    }
    tracing::debug!(form = state.id.0, from = ?current, to = ?next, "submit state");
    state.submit_state = next;
    Ok(())
}

/// First field carrying an error, in the model's declaration order.
pub(super) fn first_error_key<E>(
    order: &[FieldKey],
    field_meta: &BTreeMap<FieldKey, FieldMeta<E>>,
) -> Option<FieldKey> {
    let has_error = |key: &FieldKey| {
        field_meta
            .get(key)
            .is_some_and(|meta| meta.error.is_some())
    };
    order.iter().copied().find(|key| has_error(key)).or_else(|| {
        field_meta
            .iter()
            .find_map(|(key, meta)| meta.error.is_some().then_some(*key))
    })
}

pub(super) fn read_lock<'a, T>(
    lock: &'a RwLock<T>,
    context: &'static str,
) -> FormResult<RwLockReadGuard<'a, T>> {
    lock.read().map_err(|_| FormError::StatePoisoned(context))
}

pub(super) fn write_lock<'a, T>(
    lock: &'a RwLock<T>,
    context: &'static str,
) -> FormResult<RwLockWriteGuard<'a, T>> {
    lock.write().map_err(|_| FormError::StatePoisoned(context))
}
