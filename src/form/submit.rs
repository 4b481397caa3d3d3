use std::future::Future;

use super::controller::{
    CloseReason, FieldKey, FormController, FormId, FormResult, GlobalError, SubmitState,
    first_error_key, read_lock, transition_submit_state, write_lock,
};
use super::validation::{AsyncCheck, FormModel, ValidationError};
use crate::endpoint::EndpointError;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SaveOutcome<R> {
    /// The entity was persisted and the form asked to close.
    Saved(R),
    /// Local or asynchronous validation failed; nothing was sent.
    Invalid,
    /// The endpoint refused the entity. Field or global errors are set.
    Rejected,
    /// Another save is still in progress; this call did nothing.
    AlreadySaving,
    /// The form was closed before the save finished.
    Discarded,
}

enum Staged<T> {
    Ready(FormId, T),
    /// The model changed after validation started; carries the new revision.
    Edited(u64),
    Closed,
}

impl<T, E> FormController<T, E>
where
    T: FormModel,
    E: ValidationError,
{
    /// Validates the whole form and, when every field passes, hands the model
    /// to `persist` exactly once. Required fields are checked first, then the
    /// synchronous rules, then the asynchronous checks of changed fields.
    /// Edits made while the checks run are validated again before anything
    /// is sent.
    pub async fn save<F, Fut, R>(&self, persist: F) -> FormResult<SaveOutcome<R>>
    where
        F: FnOnce(T) -> Fut,
        Fut: Future<Output = Result<R, EndpointError>>,
    {
        let mut revision = {
            let mut state = write_lock(&self.state, "preparing save")?;
            if state.is_closed() {
                return Ok(SaveOutcome::Discarded);
            }
            if matches!(
                state.submit_state,
                SubmitState::Validating | SubmitState::Saving
            ) {
                tracing::debug!(form = state.id.0, "save ignored, already in progress");
                return Ok(SaveOutcome::AlreadySaving);
            }
            transition_submit_state(&mut state, SubmitState::Validating)?;
            state.submit_count = state.submit_count.saturating_add(1);
            state.global_error = None;
            // Pending debounced validations are superseded by the full pass.
            state.supersede_pending();
            state.revision
        };

        loop {
            if !self.check_required_fields()? {
                return self.fail_validation();
            }
            if !self.validate_form()? {
                return self.fail_validation();
            }
            match self.validate_changed_async().await? {
                AsyncCheck::Passed => {}
                AsyncCheck::Failed => return self.fail_validation(),
                AsyncCheck::Discarded => return Ok(SaveOutcome::Discarded),
            }

            match self.begin_saving(Some(revision))? {
                Staged::Ready(form, model) => return self.persist(form, model, persist).await,
                Staged::Edited(latest) => {
                    tracing::debug!(
                        revision = latest,
                        "model edited during validation, revalidating"
                    );
                    revision = latest;
                }
                Staged::Closed => return Ok(SaveOutcome::Discarded),
            }
        }
    }

    /// Re-sends the last save without validating again. Only applies while a
    /// retryable global error is shown and no field carries an error;
    /// otherwise this is a regular [`save`](Self::save).
    pub async fn retry<F, Fut, R>(&self, persist: F) -> FormResult<SaveOutcome<R>>
    where
        F: FnOnce(T) -> Fut,
        Fut: Future<Output = Result<R, EndpointError>>,
    {
        let trusted = {
            let mut state = write_lock(&self.state, "preparing retry")?;
            if state.is_closed() {
                return Ok(SaveOutcome::Discarded);
            }
            if matches!(
                state.submit_state,
                SubmitState::Validating | SubmitState::Saving
            ) {
                return Ok(SaveOutcome::AlreadySaving);
            }
            let retryable = state
                .global_error
                .as_ref()
                .is_some_and(|error| error.retryable);
            let trusted = retryable && !state.has_field_errors();
            if trusted {
                state.global_error = None;
                state.submit_count = state.submit_count.saturating_add(1);
            }
            trusted
        };

        if !trusted {
            return self.save(persist).await;
        }
        match self.begin_saving(None)? {
            Staged::Ready(form, model) => self.persist(form, model, persist).await,
            Staged::Edited(_) | Staged::Closed => Ok(SaveOutcome::Discarded),
        }
    }

    /// Moves to `Saving` and takes the model to send, unless the model moved
    /// past `revision` in the meantime.
    fn begin_saving(&self, revision: Option<u64>) -> FormResult<Staged<T>> {
        let mut state = write_lock(&self.state, "moving save state to saving")?;
        if state.is_closed() {
            return Ok(Staged::Closed);
        }
        if revision.is_some_and(|revision| revision != state.revision) {
            return Ok(Staged::Edited(state.revision));
        }
        transition_submit_state(&mut state, SubmitState::Saving)?;
        state.supersede_pending();
        Ok(Staged::Ready(state.id, state.model.clone()))
    }

    async fn persist<F, Fut, R>(
        &self,
        form: FormId,
        model: T,
        persist: F,
    ) -> FormResult<SaveOutcome<R>>
    where
        F: FnOnce(T) -> Fut,
        Fut: Future<Output = Result<R, EndpointError>>,
    {
        tracing::debug!(form = form.0, "saving");
        let result = persist(model).await;

        let mut state = write_lock(&self.state, "completing save")?;
        if state.is_closed() {
            tracing::debug!(form = form.0, "save finished after close, result dropped");
            return Ok(SaveOutcome::Discarded);
        }
        match result {
            Ok(entity) => {
                transition_submit_state(&mut state, SubmitState::Succeeded)?;
                state.close = Some(CloseReason::Saved);
                tracing::info!(form = form.0, "saved");
                Ok(SaveOutcome::Saved(entity))
            }
            Err(error) => {
                drop(state);
                self.apply_endpoint_error(error)?;
                Ok(SaveOutcome::Rejected)
            }
        }
    }

    /// Puts an endpoint rejection onto the field it concerns. Rejections that
    /// match no field become the global error.
    fn apply_endpoint_error(&self, error: EndpointError) -> FormResult<()> {
        let mapping = read_lock(&self.remote_errors, "reading remote error mapping")?.clone();
        let mut state = write_lock(&self.state, "applying endpoint error")?;
        transition_submit_state(&mut state, SubmitState::Idle)?;

        match error {
            EndpointError::AlreadyExists { entity } => match mapping.already_exists {
                Some((key, field_error)) => {
                    tracing::debug!(field = %key, %entity, "already exists");
                    state.ensure_meta(key).error = Some(field_error);
                }
                None => {
                    state.global_error = Some(GlobalError::unexpected(format!(
                        "{entity} already exists"
                    )));
                }
            },
            EndpointError::ConstraintViolation { violations } => {
                let mut unmatched = Vec::new();
                for violation in violations {
                    let target = mapping
                        .violations
                        .iter()
                        .find(|candidate| violation_matches(&violation, candidate.prefix));
                    match target {
                        Some(target) => {
                            state.ensure_meta(target.key).error = Some(target.error.clone());
                        }
                        None => unmatched.push(violation),
                    }
                }
                if !unmatched.is_empty() {
                    tracing::warn!(violations = ?unmatched, "constraint violations without field");
                    state.global_error = Some(GlobalError::unmatched_violation(unmatched.join(", ")));
                }
            }
            other => {
                tracing::warn!(error = %other, "save failed");
                state.global_error = Some(GlobalError::unexpected(other.to_string()));
            }
        }

        if self.options.focus_first_error_on_save {
            if let Some(key) = first_error_key(T::field_order(), &state.field_meta) {
                state.focus_request = Some(key);
            }
        }
        Ok(())
    }

    fn check_required_fields(&self) -> FormResult<bool> {
        let required = read_lock(&self.required_fields, "reading required fields for save")?
            .iter()
            .map(|(key, entry)| (*key, entry.clone()))
            .collect::<Vec<_>>();

        let mut state = write_lock(&self.state, "marking missing required fields")?;
        let mut missing: Vec<FieldKey> = Vec::new();
        for (key, entry) in required {
            if (entry.unset)(&state.model) {
                state.ensure_meta(key).error = Some(entry.error);
                missing.push(key);
            }
        }
        if !missing.is_empty() {
            tracing::debug!(fields = ?missing, "required fields unset");
        }
        Ok(missing.is_empty())
    }

    fn fail_validation<R>(&self) -> FormResult<SaveOutcome<R>> {
        let mut state = write_lock(&self.state, "handling save validation failure")?;
        if state.is_closed() {
            return Ok(SaveOutcome::Discarded);
        }
        transition_submit_state(&mut state, SubmitState::Failed)?;
        if self.options.focus_first_error_on_save {
            state.focus_request = first_error_key(T::field_order(), &state.field_meta);
        }
        Ok(SaveOutcome::Invalid)
    }
}

/// `"name must not be blank"` matches prefix `"name"`, `"displayName ..."`
/// and `"names"` do not.
fn violation_matches(violation: &str, prefix: &str) -> bool {
    violation.strip_prefix(prefix).is_some_and(|rest| {
        rest.chars()
            .next()
            .is_none_or(|next| !next.is_alphanumeric() && next != '_')
    })
}
