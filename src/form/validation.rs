use std::future::Future;
use std::sync::Arc;

use futures::future::join_all;
use futures_timer::Delay;

use super::controller::{
    AsyncFieldValidatorEntry, AsyncFieldValidatorFn, BoxedValidationFuture, DerivedFieldEntry,
    FieldKey, FormController, FormError, FormResult, GlobalError, GlobalErrorKind,
    ScheduledValidation, SubmitState, SyncFieldValidatorFn, UnavailablePolicy, ValidationTicket,
    read_lock, write_lock,
};

pub trait ValidationError: Clone + Send + Sync + 'static {
    fn message(&self) -> String;
}

pub trait FieldLens<T>: Copy + Send + Sync + 'static {
    type Value: Clone + PartialEq + Send + Sync + 'static;

    fn key(self) -> FieldKey;
    fn get<'a>(self, model: &'a T) -> &'a Self::Value;
    fn set(self, model: &mut T, value: Self::Value);
}

pub trait FormModel: Clone + Send + Sync + 'static {
    type Fields;

    fn fields() -> Self::Fields;

    /// Field keys in declaration order. Decides which field receives focus
    /// when several carry errors.
    fn field_order() -> &'static [FieldKey];
}

/// Why an asynchronous check did not pass.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AsyncRejection<E> {
    Invalid(E),
    /// The check itself failed, e.g. the endpoint was unreachable.
    Unavailable(String),
}

/// Outcome of one scheduled field validation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FieldValidation {
    Valid,
    Invalid,
    Unavailable,
    /// A newer edit replaced this validation before it finished.
    Superseded,
    /// The form was closed before this validation finished.
    Discarded,
}

pub trait FieldValidator<T, L, E>: Send + Sync
where
    L: FieldLens<T>,
    E: ValidationError,
{
    fn validate(&self, model: &T, value: &L::Value) -> Result<(), E>;
}

impl<T, L, E, F> FieldValidator<T, L, E> for F
where
    L: FieldLens<T>,
    E: ValidationError,
    F: for<'a> Fn(&'a T, &'a L::Value) -> Result<(), E> + Send + Sync,
{
    fn validate(&self, model: &T, value: &L::Value) -> Result<(), E> {
        (self)(model, value)
    }
}

pub trait AsyncFieldValidator<T, L, E>: Send + Sync
where
    L: FieldLens<T>,
    E: ValidationError,
{
    type Fut<'a>: Future<Output = Result<(), AsyncRejection<E>>> + Send + 'a
    where
        Self: 'a,
        T: 'a,
        L::Value: 'a;

    fn validate<'a>(&'a self, model: &'a T, value: &'a L::Value) -> Self::Fut<'a>;
}

impl<T, L, E, F> AsyncFieldValidator<T, L, E> for F
where
    L: FieldLens<T>,
    E: ValidationError,
    F: for<'a> Fn(&'a T, &'a L::Value) -> BoxedValidationFuture<'a, E> + Send + Sync,
{
    type Fut<'a>
        = BoxedValidationFuture<'a, E>
    where
        Self: 'a,
        T: 'a,
        L::Value: 'a;

    fn validate<'a>(&'a self, model: &'a T, value: &'a L::Value) -> Self::Fut<'a> {
        (self)(model, value)
    }
}

pub(super) enum AsyncCheck {
    Passed,
    Failed,
    Discarded,
}

impl<T, E> FormController<T, E>
where
    T: FormModel,
    E: ValidationError,
{
    pub fn register_field_validator<L, V>(&self, lens: L, validator: V) -> FormResult<()>
    where
        L: FieldLens<T>,
        V: FieldValidator<T, L, E> + 'static,
    {
        let key = lens.key();
        let validator = Arc::new(validator);
        let wrapped: SyncFieldValidatorFn<T, E> =
            Arc::new(move |model: &T| validator.validate(model, lens.get(model)));
        let mut validators =
            write_lock(&self.sync_field_validators, "registering field validator")?;
        validators.entry(key).or_default().push(wrapped);
        Ok(())
    }

    /// Registers an asynchronous check (typically uniqueness). It runs only
    /// after the field's synchronous validators pass and only while the value
    /// differs from the one the form was opened with.
    pub fn register_async_field_validator<L, V>(&self, lens: L, validator: V) -> FormResult<()>
    where
        L: FieldLens<T>,
        V: AsyncFieldValidator<T, L, E> + 'static,
    {
        let key = lens.key();
        let validator = Arc::new(validator);
        let wrapped: AsyncFieldValidatorFn<T, E> =
            Arc::new(move |model: T| -> BoxedValidationFuture<'static, E> {
                let value = lens.get(&model).clone();
                let validator = validator.clone();
                Box::pin(async move { validator.validate(&model, &value).await })
            });
        let entry = AsyncFieldValidatorEntry {
            changed: Arc::new(move |model: &T, initial: &T| lens.get(model) != lens.get(initial)),
            validator: wrapped,
        };
        let mut validators = write_lock(
            &self.async_field_validators,
            "registering async field validator",
        )?;
        validators.entry(key).or_default().push(entry);
        Ok(())
    }

    /// Regenerates `target` from `source` on every edit of `source`, until
    /// the user touches `target` directly.
    pub fn register_derived_field<S, D, F>(&self, source: S, target: D, derive: F) -> FormResult<()>
    where
        S: FieldLens<T>,
        D: FieldLens<T>,
        F: Fn(&S::Value) -> D::Value + Send + Sync + 'static,
    {
        let entry = DerivedFieldEntry {
            target: target.key(),
            changed: Arc::new(move |model: &T, initial: &T| {
                target.get(model) != target.get(initial)
            }),
            apply: Arc::new(move |model: &mut T| {
                let derived = derive(source.get(model));
                target.set(model, derived);
            }),
        };
        let mut derived = write_lock(&self.derived_fields, "registering derived field")?;
        derived.entry(source.key()).or_default().push(entry);
        Ok(())
    }

    /// Records a user edit: stores the value, clears the field's error and
    /// schedules its validation. Untouched derived fields are regenerated and
    /// scheduled as well. The edited field comes first in the returned list.
    pub fn set<L>(&self, lens: L, value: L::Value) -> FormResult<Vec<ScheduledValidation>>
    where
        L: FieldLens<T>,
    {
        let key = lens.key();
        let derived = read_lock(&self.derived_fields, "reading derived fields")?
            .get(&key)
            .cloned()
            .unwrap_or_default();

        let mut state = write_lock(&self.state, "writing form model")?;
        if state.is_closed() {
            return Err(FormError::Closed(state.id));
        }
        if state.submit_state == SubmitState::Saving {
            return Err(FormError::SaveInProgress(state.id));
        }
        lens.set(&mut state.model, value);
        state.revision += 1;
        let is_dirty = lens.get(&state.model) != lens.get(&state.initial_model);
        state.mark_dirty(key, is_dirty);
        {
            let meta = state.ensure_meta(key);
            meta.touched = true;
            meta.unavailable = false;
            meta.error = None;
        }

        let mut scheduled = vec![state.schedule(key)];
        for entry in derived {
            let touched = state
                .field_meta
                .get(&entry.target)
                .is_some_and(|meta| meta.touched);
            if touched {
                continue;
            }
            (entry.apply)(&mut state.model);
            let target_dirty = (entry.changed)(&state.model, &state.initial_model);
            state.mark_dirty(entry.target, target_dirty);
            {
                let meta = state.ensure_meta(entry.target);
                meta.unavailable = false;
                meta.error = None;
            }
            scheduled.push(state.schedule(entry.target));
            tracing::debug!(source = %key, target = %entry.target, "derived field regenerated");
        }
        Ok(scheduled)
    }

    /// [`set`](Self::set), then waits out the debounce window and validates.
    /// Returns the outcome for the edited field.
    pub async fn set_async<L>(&self, lens: L, value: L::Value) -> FormResult<FieldValidation>
    where
        L: FieldLens<T>,
    {
        let scheduled = self.set(lens, value)?;
        let outcomes = join_all(
            scheduled
                .into_iter()
                .map(|validation| self.run_scheduled(validation)),
        )
        .await
        .into_iter()
        .collect::<FormResult<Vec<_>>>()?;
        Ok(outcomes
            .into_iter()
            .next()
            .unwrap_or(FieldValidation::Superseded))
    }

    /// Runs a validation scheduled by [`set`](Self::set) once its quiet
    /// window elapsed. Validations superseded by a newer edit never evaluate.
    pub async fn run_scheduled(&self, scheduled: ScheduledValidation) -> FormResult<FieldValidation> {
        let ScheduledValidation { key, ticket } = scheduled;
        let debounce = self.options.debounce();
        if !debounce.is_zero() {
            Delay::new(debounce).await;
        }
        if let Some(stale) = self.stale_outcome(key, ticket)? {
            return Ok(stale);
        }

        let (model, changed_from_initial) = {
            let state = read_lock(&self.state, "reading model for field validation")?;
            let entries = read_lock(
                &self.async_field_validators,
                "reading async validators for field validation",
            )?;
            let changed = entries.get(&key).is_some_and(|entries| {
                entries
                    .iter()
                    .any(|entry| (entry.changed)(&state.model, &state.initial_model))
            });
            (state.model.clone(), changed)
        };

        if let Some(error) = self.evaluate_sync(key, &model)? {
            return self.finish_validation(key, ticket, Err(AsyncRejection::Invalid(error)));
        }
        if !changed_from_initial {
            return self.finish_validation(key, ticket, Ok(()));
        }

        let result = self.evaluate_async(key, model).await?;
        self.finish_validation(key, ticket, result)
    }

    /// Validates one field synchronously right away.
    pub fn validate_field<L>(&self, lens: L) -> FormResult<bool>
    where
        L: FieldLens<T>,
    {
        self.validate_field_by_key(lens.key())
    }

    /// Runs every synchronous validator and replaces all field errors with
    /// the result.
    pub fn validate_form(&self) -> FormResult<bool> {
        let model = {
            read_lock(&self.state, "reading model for form validation")?
                .model
                .clone()
        };
        let keys = read_lock(
            &self.sync_field_validators,
            "reading field validator keys for form validation",
        )?
        .keys()
        .copied()
        .collect::<Vec<_>>();

        let mut errors = Vec::with_capacity(keys.len());
        for key in keys {
            errors.push((key, self.evaluate_sync(key, &model)?));
        }

        let mut state = write_lock(&self.state, "applying form validation result")?;
        for meta in state.field_meta.values_mut() {
            meta.error = None;
            meta.validating = false;
        }
        for (key, error) in errors {
            state.ensure_meta(key).error = error;
        }
        Ok(!state.has_field_errors())
    }

    pub(super) fn validate_field_by_key(&self, key: FieldKey) -> FormResult<bool> {
        let model = {
            read_lock(&self.state, "reading model for field validation")?
                .model
                .clone()
        };
        let error = self.evaluate_sync(key, &model)?;
        let is_valid = error.is_none();

        let mut state = write_lock(&self.state, "writing field validation result")?;
        if state.is_closed() {
            return Err(FormError::Closed(state.id));
        }
        let meta = state.ensure_meta(key);
        meta.validating = false;
        meta.error = error;
        Ok(is_valid)
    }

    /// Runs the asynchronous checks of every field whose value differs from
    /// the initial model. Fields are checked concurrently.
    pub(super) async fn validate_changed_async(&self) -> FormResult<AsyncCheck> {
        let (model, keys) = {
            let state = read_lock(&self.state, "reading model for async form validation")?;
            let entries = read_lock(
                &self.async_field_validators,
                "reading async validators for form validation",
            )?;
            let keys = entries
                .iter()
                .filter(|(_, entries)| {
                    entries
                        .iter()
                        .any(|entry| (entry.changed)(&state.model, &state.initial_model))
                })
                .map(|(key, _)| *key)
                .collect::<Vec<_>>();
            (state.model.clone(), keys)
        };

        let results = join_all(keys.into_iter().map(|key| {
            let model = model.clone();
            async move { (key, self.evaluate_async(key, model).await) }
        }))
        .await;

        let mut state = write_lock(&self.state, "applying async form validation result")?;
        if state.is_closed() {
            return Ok(AsyncCheck::Discarded);
        }
        let mut passed = true;
        for (key, result) in results {
            let meta = state.ensure_meta(key);
            meta.validating = false;
            match result? {
                Ok(()) => {
                    meta.unavailable = false;
                    meta.error = None;
                }
                Err(AsyncRejection::Invalid(error)) => {
                    meta.error = Some(error);
                    passed = false;
                }
                Err(AsyncRejection::Unavailable(reason)) => {
                    meta.unavailable = true;
                    meta.error = None;
                    tracing::warn!(field = %key, %reason, "validation unavailable during save");
                    if self.options.unavailable_policy == UnavailablePolicy::FailClosed {
                        state.global_error = Some(GlobalError::validation_unavailable(reason));
                        passed = false;
                    }
                }
            }
        }
        Ok(if passed {
            AsyncCheck::Passed
        } else {
            AsyncCheck::Failed
        })
    }

    fn evaluate_sync(&self, key: FieldKey, model: &T) -> FormResult<Option<E>> {
        let validators = read_lock(
            &self.sync_field_validators,
            "reading field validators for key validation",
        )?
        .get(&key)
        .cloned()
        .unwrap_or_default();

        Ok(validators
            .iter()
            .find_map(|validator| validator(model).err()))
    }

    async fn evaluate_async(
        &self,
        key: FieldKey,
        model: T,
    ) -> FormResult<Result<(), AsyncRejection<E>>> {
        let entries = read_lock(
            &self.async_field_validators,
            "reading registered async validators",
        )?
        .get(&key)
        .cloned()
        .unwrap_or_default();

        for entry in entries {
            if let Err(rejection) = (entry.validator)(model.clone()).await {
                return Ok(Err(rejection));
            }
        }
        Ok(Ok(()))
    }

    fn stale_outcome(
        &self,
        key: FieldKey,
        ticket: ValidationTicket,
    ) -> FormResult<Option<FieldValidation>> {
        let state = read_lock(&self.state, "checking latest validation ticket")?;
        if state.is_closed() {
            return Ok(Some(FieldValidation::Discarded));
        }
        if !state.is_current(key, ticket) {
            tracing::debug!(field = %key, ticket = ticket.0, "validation superseded");
            return Ok(Some(FieldValidation::Superseded));
        }
        Ok(None)
    }

    fn finish_validation(
        &self,
        key: FieldKey,
        ticket: ValidationTicket,
        result: Result<(), AsyncRejection<E>>,
    ) -> FormResult<FieldValidation> {
        let mut state = write_lock(&self.state, "finishing field validation")?;
        if state.is_closed() {
            return Ok(FieldValidation::Discarded);
        }
        if !state.is_current(key, ticket) {
            tracing::debug!(field = %key, ticket = ticket.0, "validation result superseded");
            return Ok(FieldValidation::Superseded);
        }

        let policy = self.options.unavailable_policy;
        let meta = state.ensure_meta(key);
        meta.validating = false;
        let outcome = match result {
            Ok(()) => {
                meta.unavailable = false;
                meta.error = None;
                let blocked = state
                    .global_error
                    .as_ref()
                    .is_some_and(|error| error.kind == GlobalErrorKind::ValidationUnavailable);
                if blocked {
                    state.global_error = None;
                }
                FieldValidation::Valid
            }
            Err(AsyncRejection::Invalid(error)) => {
                meta.unavailable = false;
                meta.error = Some(error);
                FieldValidation::Invalid
            }
            Err(AsyncRejection::Unavailable(reason)) => {
                meta.unavailable = true;
                meta.error = None;
                tracing::warn!(field = %key, %reason, "validation unavailable");
                if policy == UnavailablePolicy::FailClosed {
                    state.global_error = Some(GlobalError::validation_unavailable(reason));
                }
                FieldValidation::Unavailable
            }
        };
        Ok(outcome)
    }
}
