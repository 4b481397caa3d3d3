use super::*;
use futures::channel::oneshot;
use futures::executor::block_on;
use futures::join;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::endpoint::EndpointError;

#[derive(Clone, Debug, Eq, PartialEq)]
struct TestError(&'static str);

impl ValidationError for TestError {
    fn message(&self) -> String {
        self.0.to_string()
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq, console_forms_derive::FormModel)]
struct TenantForm {
    name: Option<String>,
    #[form(rename = "displayName")]
    display_name: Option<String>,
    region: Option<String>,
    enabled: bool,
}

fn existing_tenant() -> TenantForm {
    TenantForm {
        name: Some("acme".into()),
        display_name: Some("ACME".into()),
        region: Some("eu".into()),
        enabled: true,
    }
}

fn options(debounce_ms: u64) -> FormOptions {
    FormOptions {
        debounce_ms,
        ..FormOptions::default()
    }
}

fn name_rule(_model: &TenantForm, value: &Option<String>) -> Result<(), TestError> {
    match value.as_deref() {
        Some(value) if value.len() < 2 => Err(TestError("too short")),
        _ => Ok(()),
    }
}

fn accept(model: TenantForm) -> futures::future::Ready<Result<TenantForm, EndpointError>> {
    futures::future::ready(Ok(model))
}

fn reject(
    error: EndpointError,
) -> impl FnOnce(TenantForm) -> futures::future::Ready<Result<TenantForm, EndpointError>> {
    move |_model| futures::future::ready(Err(error))
}

#[derive(Clone)]
struct PerfForm {
    values: BTreeMap<&'static str, String>,
}

impl FormModel for PerfForm {
    type Fields = ();

    fn fields() -> Self::Fields {}

    fn field_order() -> &'static [FieldKey] {
        &[]
    }
}

#[derive(Clone, Copy)]
struct MapLens {
    key: &'static str,
}

impl FieldLens<PerfForm> for MapLens {
    type Value = String;

    fn key(self) -> FieldKey {
        FieldKey::new(self.key)
    }

    fn get<'a>(self, model: &'a PerfForm) -> &'a Self::Value {
        model
            .values
            .get(self.key)
            .expect("perf key must exist in model values")
    }

    fn set(self, model: &mut PerfForm, value: Self::Value) {
        model.values.insert(self.key, value);
    }
}

/// Uniqueness stand-in: counts calls, rejects `taken`, optionally waits for
/// a gate before answering.
#[derive(Default)]
struct NameCheck {
    calls: Arc<AtomicUsize>,
    gate: Mutex<Option<oneshot::Receiver<()>>>,
    unavailable: Arc<AtomicBool>,
}

impl AsyncFieldValidator<TenantForm, TenantFormNameLens, TestError> for NameCheck {
    type Fut<'a> = BoxedValidationFuture<'a, TestError>;

    fn validate<'a>(&'a self, _model: &'a TenantForm, value: &'a Option<String>) -> Self::Fut<'a> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.gate.lock().expect("gate lock").take();
        Box::pin(async move {
            if let Some(gate) = gate {
                let _ = gate.await;
            }
            if self.unavailable.load(Ordering::SeqCst) {
                return Err(AsyncRejection::Unavailable("endpoint unreachable".into()));
            }
            if value.as_deref() == Some("taken") {
                Err(AsyncRejection::Invalid(TestError("taken")))
            } else {
                Ok(())
            }
        })
    }
}

#[test]
fn field_lens_updates_model_and_dirty_state() {
    let controller = FormController::<TenantForm, TestError>::new(existing_tenant(), options(0));
    let fields = TenantForm::fields();

    controller
        .set(fields.display_name(), Some("ACME Europe".into()))
        .expect("set must succeed");
    let snapshot = controller.snapshot().expect("snapshot must succeed");
    assert!(snapshot.is_dirty);
    assert_eq!(snapshot.model.display_name.as_deref(), Some("ACME Europe"));
    assert!(
        snapshot
            .field_meta
            .get(&fields.display_name().key())
            .is_some_and(|meta| meta.dirty && meta.touched)
    );

    controller
        .set(fields.display_name(), Some("ACME".into()))
        .expect("set back to initial");
    assert!(!controller.snapshot().expect("snapshot").is_dirty);
}

#[test]
fn set_clears_previous_error_immediately() {
    let fields = TenantForm::fields();
    let controller = FormController::<TenantForm, TestError>::new(TenantForm::default(), options(0));
    controller
        .register_field_validator(fields.name(), name_rule)
        .expect("register validator");

    controller.set(fields.name(), Some("a".into())).expect("set");
    assert!(!controller.validate_field(fields.name()).expect("validate"));
    assert_eq!(
        controller.field_error(fields.name()).expect("error"),
        Some(TestError("too short"))
    );

    let scheduled = controller
        .set(fields.name(), Some("ab".into()))
        .expect("set again");
    assert_eq!(controller.field_error(fields.name()).expect("error"), None);
    assert_eq!(scheduled.len(), 1);
    assert!(
        controller
            .field_meta(fields.name())
            .expect("meta")
            .is_some_and(|meta| meta.validating)
    );
}

#[test]
fn rapid_edits_are_validated_once_with_the_final_value() {
    let fields = TenantForm::fields();
    let controller = FormController::<TenantForm, TestError>::new(TenantForm::default(), options(20));
    let seen = Arc::new(Mutex::new(Vec::new()));
    {
        let seen = seen.clone();
        controller
            .register_field_validator(
                fields.name(),
                move |_model: &TenantForm, value: &Option<String>| {
                    seen.lock().expect("seen lock").push(value.clone());
                    Ok(())
                },
            )
            .expect("register validator");
    }

    let (first, second, third) = block_on(async {
        join!(
            controller.set_async(fields.name(), Some("a".into())),
            controller.set_async(fields.name(), Some("ac".into())),
            controller.set_async(fields.name(), Some("acm".into())),
        )
    });

    assert_eq!(first.expect("first"), FieldValidation::Superseded);
    assert_eq!(second.expect("second"), FieldValidation::Superseded);
    assert_eq!(third.expect("third"), FieldValidation::Valid);
    assert_eq!(*seen.lock().expect("seen lock"), vec![Some("acm".to_string())]);
}

#[test]
fn sync_failure_never_reaches_the_uniqueness_check() {
    let fields = TenantForm::fields();
    let controller = FormController::<TenantForm, TestError>::new(TenantForm::default(), options(0));
    let check = NameCheck::default();
    let calls = check.calls.clone();
    controller
        .register_field_validator(fields.name(), name_rule)
        .expect("register validator");
    controller
        .register_async_field_validator(fields.name(), check)
        .expect("register async validator");

    let outcome = block_on(controller.set_async(fields.name(), Some("a".into()))).expect("set");
    assert_eq!(outcome, FieldValidation::Invalid);

    let saved = block_on(controller.save(accept)).expect("save");
    assert_eq!(saved, SaveOutcome::Invalid);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn unchanged_value_skips_the_uniqueness_check() {
    let fields = TenantForm::fields();
    let controller = FormController::<TenantForm, TestError>::new(existing_tenant(), options(0));
    let check = NameCheck::default();
    let calls = check.calls.clone();
    controller
        .register_async_field_validator(fields.name(), check)
        .expect("register async validator");

    let outcome = block_on(controller.set_async(fields.name(), Some("acme".into()))).expect("set");
    assert_eq!(outcome, FieldValidation::Valid);
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let outcome =
        block_on(controller.set_async(fields.name(), Some("taken".into()))).expect("set taken");
    assert_eq!(outcome, FieldValidation::Invalid);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        controller.field_error(fields.name()).expect("error"),
        Some(TestError("taken"))
    );
}

#[test]
fn stale_async_result_never_overwrites_the_latest() {
    let fields = TenantForm::fields();
    let controller = FormController::<TenantForm, TestError>::new(TenantForm::default(), options(0));
    let (release, gate) = oneshot::channel();
    let check = NameCheck {
        gate: Mutex::new(Some(gate)),
        ..NameCheck::default()
    };
    controller
        .register_async_field_validator(fields.name(), check)
        .expect("register async validator");

    let (slow, fast, ()) = block_on(async {
        join!(
            controller.set_async(fields.name(), Some("taken".into())),
            controller.set_async(fields.name(), Some("free".into())),
            async {
                let _ = release.send(());
            },
        )
    });

    assert_eq!(slow.expect("slow"), FieldValidation::Superseded);
    assert_eq!(fast.expect("fast"), FieldValidation::Valid);
    assert_eq!(controller.field_error(fields.name()).expect("error"), None);
}

#[test]
fn second_save_while_saving_is_ignored() {
    let controller = FormController::<TenantForm, TestError>::new(existing_tenant(), options(0));
    let calls = Arc::new(AtomicUsize::new(0));
    let (release, gate) = oneshot::channel::<()>();

    let first = {
        let calls = calls.clone();
        controller.save(move |model| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                let _ = gate.await;
                Ok::<_, EndpointError>(model)
            }
        })
    };
    let second = async {
        let outcome = controller
            .save(|model: TenantForm| {
                calls.fetch_add(1, Ordering::SeqCst);
                accept(model)
            })
            .await;
        let _ = release.send(());
        outcome
    };

    let (first, second) = block_on(async { join!(first, second) });
    assert!(matches!(first.expect("first"), SaveOutcome::Saved(_)));
    assert_eq!(second.expect("second"), SaveOutcome::AlreadySaving);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        controller.close_reason().expect("close reason"),
        Some(CloseReason::Saved)
    );
}

#[test]
fn edits_during_validation_are_validated_before_sending() {
    let fields = TenantForm::fields();
    let controller = FormController::<TenantForm, TestError>::new(existing_tenant(), options(0));
    let (release, gate) = oneshot::channel();
    controller
        .register_field_validator(fields.name(), name_rule)
        .expect("register validator");
    controller
        .register_async_field_validator(
            fields.name(),
            NameCheck {
                gate: Mutex::new(Some(gate)),
                ..NameCheck::default()
            },
        )
        .expect("register async validator");
    controller
        .set(fields.name(), Some("acme-new".into()))
        .expect("set valid name");
    let persisted = Mutex::new(None);

    let (outcome, ()) = block_on(async {
        join!(
            controller.save(|model: TenantForm| {
                *persisted.lock().expect("persisted lock") = model.name.clone();
                accept(model)
            }),
            async {
                controller
                    .set(fields.name(), Some("x".into()))
                    .expect("edit while validating");
                let _ = release.send(());
            },
        )
    });

    assert_eq!(outcome.expect("outcome"), SaveOutcome::Invalid);
    assert_eq!(*persisted.lock().expect("persisted lock"), None);
    let snapshot = controller.snapshot().expect("snapshot");
    assert_eq!(snapshot.submit_state, SubmitState::Failed);
    assert_eq!(snapshot.error(fields.name().key()), Some(&TestError("too short")));
}

#[test]
fn edits_during_validation_are_sent_once_they_pass() {
    let fields = TenantForm::fields();
    let controller = FormController::<TenantForm, TestError>::new(existing_tenant(), options(0));
    let (release, gate) = oneshot::channel();
    let check = NameCheck {
        gate: Mutex::new(Some(gate)),
        ..NameCheck::default()
    };
    let calls = check.calls.clone();
    controller
        .register_async_field_validator(fields.name(), check)
        .expect("register async validator");
    controller
        .set(fields.name(), Some("acme-new".into()))
        .expect("set name");

    let (outcome, ()) = block_on(async {
        join!(controller.save(accept), async {
            controller
                .set(fields.name(), Some("acme-eu".into()))
                .expect("edit while validating");
            let _ = release.send(());
        })
    });

    let SaveOutcome::Saved(saved) = outcome.expect("outcome") else {
        panic!("expected the edited model to be saved");
    };
    assert_eq!(saved.name.as_deref(), Some("acme-eu"));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn edits_are_refused_while_the_request_is_in_flight() {
    let fields = TenantForm::fields();
    let controller = FormController::<TenantForm, TestError>::new(existing_tenant(), options(0));
    let (release, gate) = oneshot::channel::<()>();

    let (outcome, edit) = block_on(async {
        join!(
            controller.save(move |model| async move {
                let _ = gate.await;
                Ok::<_, EndpointError>(model)
            }),
            async {
                let edit = controller.set(fields.name(), Some("x".into()));
                let _ = release.send(());
                edit
            },
        )
    });

    let SaveOutcome::Saved(saved) = outcome.expect("outcome") else {
        panic!("expected saved outcome");
    };
    assert_eq!(saved.name.as_deref(), Some("acme"));
    assert_eq!(
        edit,
        Err(FormError::SaveInProgress(controller.form_id().expect("form id")))
    );
}

#[test]
fn submit_state_transitions_follow_the_save_protocol() {
    let fields = TenantForm::fields();
    let controller = FormController::<TenantForm, TestError>::new(TenantForm::default(), options(0));
    controller
        .register_field_validator(fields.name(), name_rule)
        .expect("register validator");

    controller.set(fields.name(), Some("a".into())).expect("set invalid");
    assert_eq!(block_on(controller.save(accept)).expect("save"), SaveOutcome::Invalid);
    assert_eq!(
        controller.snapshot().expect("snapshot").submit_state,
        SubmitState::Failed
    );

    controller.set(fields.name(), Some("ab".into())).expect("set valid");
    let outcome = block_on(controller.save(accept)).expect("save");
    assert!(matches!(outcome, SaveOutcome::Saved(model) if model.name.as_deref() == Some("ab")));
    let snapshot = controller.snapshot().expect("snapshot");
    assert_eq!(snapshot.submit_state, SubmitState::Succeeded);
    assert_eq!(snapshot.submit_count, 2);

    assert_eq!(
        block_on(controller.save(accept)).expect("save after close"),
        SaveOutcome::Discarded
    );
    assert_eq!(
        controller.set(fields.name(), Some("abc".into())),
        Err(FormError::Closed(controller.form_id().expect("form id")))
    );
}

#[test]
fn required_fields_block_save_and_request_focus_in_declaration_order() {
    let fields = TenantForm::fields();
    let controller = FormController::<TenantForm, TestError>::new(TenantForm::default(), options(0));
    controller
        .register_required_field(fields.region(), TestError("region required"))
        .expect("register required");
    controller
        .register_required_field(fields.name(), TestError("name required"))
        .expect("register required");
    let calls = AtomicUsize::new(0);

    let outcome = block_on(controller.save(|model: TenantForm| {
        calls.fetch_add(1, Ordering::SeqCst);
        accept(model)
    }))
    .expect("save");

    assert_eq!(outcome, SaveOutcome::Invalid);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(controller.is_required(fields.name()).expect("is required"));
    assert_eq!(
        controller.field_error(fields.region()).expect("error"),
        Some(TestError("region required"))
    );
    assert_eq!(
        controller.take_focus_request().expect("focus"),
        Some(fields.name().key())
    );
    assert_eq!(controller.take_focus_request().expect("focus"), None);
}

#[test]
fn constraint_violations_map_onto_fields() {
    let fields = TenantForm::fields();
    let controller = FormController::<TenantForm, TestError>::new(existing_tenant(), options(0));
    controller
        .register_violation_prefix(fields.name(), "name", TestError("invalid name"))
        .expect("register prefix");
    controller
        .register_violation_prefix(fields.display_name(), "displayName", TestError("blank"))
        .expect("register prefix");

    let outcome = block_on(controller.save(reject(EndpointError::ConstraintViolation {
        violations: vec!["name".into(), "displayName must not be blank".into()],
    })))
    .expect("save");

    assert_eq!(outcome, SaveOutcome::Rejected);
    let snapshot = controller.snapshot().expect("snapshot");
    assert_eq!(snapshot.error(fields.name().key()), Some(&TestError("invalid name")));
    assert_eq!(snapshot.error(fields.display_name().key()), Some(&TestError("blank")));
    assert_eq!(snapshot.global_error, None);
    assert_eq!(snapshot.submit_state, SubmitState::Idle);
    assert_eq!(snapshot.close, None);
}

#[test]
fn unmatched_violations_surface_as_global_error() {
    let fields = TenantForm::fields();
    let controller = FormController::<TenantForm, TestError>::new(existing_tenant(), options(0));
    controller
        .register_violation_prefix(fields.name(), "name", TestError("invalid name"))
        .expect("register prefix");

    let outcome = block_on(controller.save(reject(EndpointError::ConstraintViolation {
        violations: vec!["names must be plural".into(), "owner must not be null".into()],
    })))
    .expect("save");

    assert_eq!(outcome, SaveOutcome::Rejected);
    assert_eq!(controller.field_error(fields.name()).expect("error"), None);
    let global = controller
        .global_error()
        .expect("global error")
        .expect("global error present");
    assert_eq!(global.kind, GlobalErrorKind::UnmatchedViolation);
    assert!(!global.retryable);
    assert!(global.detail.contains("owner must not be null"));
}

#[test]
fn already_exists_goes_to_registered_field_or_banner() {
    let fields = TenantForm::fields();
    let controller = FormController::<TenantForm, TestError>::new(existing_tenant(), options(0));
    let conflict = || EndpointError::AlreadyExists {
        entity: "tenant".into(),
    };

    block_on(controller.save(reject(conflict()))).expect("save");
    assert_eq!(
        controller.global_error().expect("global").map(|error| error.kind),
        Some(GlobalErrorKind::Unexpected)
    );

    controller
        .register_already_exists_field(fields.name(), TestError("taken"))
        .expect("register");
    block_on(controller.save(reject(conflict()))).expect("save");
    assert_eq!(controller.global_error().expect("global"), None);
    assert_eq!(
        controller.field_error(fields.name()).expect("error"),
        Some(TestError("taken"))
    );
    assert_eq!(controller.field_error(fields.display_name()).expect("error"), None);
}

#[test]
fn retry_resends_without_validating_again() {
    let fields = TenantForm::fields();
    let controller = FormController::<TenantForm, TestError>::new(existing_tenant(), options(0));
    let validations = Arc::new(AtomicUsize::new(0));
    {
        let validations = validations.clone();
        controller
            .register_field_validator(
                fields.name(),
                move |_model: &TenantForm, _value: &Option<String>| {
                    validations.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                },
            )
            .expect("register validator");
    }

    let outcome = block_on(controller.save(reject(EndpointError::Transport("reset".into()))))
        .expect("save");
    assert_eq!(outcome, SaveOutcome::Rejected);
    let global = controller
        .global_error()
        .expect("global")
        .expect("global present");
    assert!(global.retryable);
    assert_eq!(validations.load(Ordering::SeqCst), 1);

    let outcome = block_on(controller.retry(accept)).expect("retry");
    assert!(matches!(outcome, SaveOutcome::Saved(_)));
    assert_eq!(validations.load(Ordering::SeqCst), 1);
    assert_eq!(controller.global_error().expect("global"), None);
}

#[test]
fn retry_without_retryable_error_runs_a_full_save() {
    let fields = TenantForm::fields();
    let controller = FormController::<TenantForm, TestError>::new(TenantForm::default(), options(0));
    controller
        .register_required_field(fields.name(), TestError("required"))
        .expect("register required");

    assert_eq!(block_on(controller.retry(accept)).expect("retry"), SaveOutcome::Invalid);
}

#[test]
fn unavailable_check_fails_open_by_default() {
    let fields = TenantForm::fields();
    let controller = FormController::<TenantForm, TestError>::new(TenantForm::default(), options(0));
    controller
        .register_async_field_validator(
            fields.name(),
            NameCheck {
                unavailable: Arc::new(AtomicBool::new(true)),
                ..NameCheck::default()
            },
        )
        .expect("register async validator");

    let outcome =
        block_on(controller.set_async(fields.name(), Some("fresh".into()))).expect("set");
    assert_eq!(outcome, FieldValidation::Unavailable);
    let meta = controller
        .field_meta(fields.name())
        .expect("meta")
        .expect("meta present");
    assert!(meta.unavailable);
    assert_eq!(meta.error, None);

    assert!(matches!(
        block_on(controller.save(accept)).expect("save"),
        SaveOutcome::Saved(_)
    ));
}

#[test]
fn unavailable_check_fails_closed_when_configured() {
    let fields = TenantForm::fields();
    let controller = FormController::<TenantForm, TestError>::new(
        TenantForm::default(),
        FormOptions {
            debounce_ms: 0,
            unavailable_policy: UnavailablePolicy::FailClosed,
            ..FormOptions::default()
        },
    );
    controller
        .register_async_field_validator(
            fields.name(),
            NameCheck {
                unavailable: Arc::new(AtomicBool::new(true)),
                ..NameCheck::default()
            },
        )
        .expect("register async validator");
    controller.set(fields.name(), Some("fresh".into())).expect("set");
    let calls = AtomicUsize::new(0);

    let outcome = block_on(controller.save(|model: TenantForm| {
        calls.fetch_add(1, Ordering::SeqCst);
        accept(model)
    }))
    .expect("save");

    assert_eq!(outcome, SaveOutcome::Invalid);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    let global = controller
        .global_error()
        .expect("global")
        .expect("global present");
    assert_eq!(global.kind, GlobalErrorKind::ValidationUnavailable);
    assert!(!global.retryable);
}

#[test]
fn recovered_check_clears_the_unavailable_banner() {
    let fields = TenantForm::fields();
    let controller = FormController::<TenantForm, TestError>::new(
        TenantForm::default(),
        FormOptions {
            debounce_ms: 0,
            unavailable_policy: UnavailablePolicy::FailClosed,
            ..FormOptions::default()
        },
    );
    let unavailable = Arc::new(AtomicBool::new(true));
    controller
        .register_async_field_validator(
            fields.name(),
            NameCheck {
                unavailable: unavailable.clone(),
                ..NameCheck::default()
            },
        )
        .expect("register async validator");

    let outcome =
        block_on(controller.set_async(fields.name(), Some("fresh".into()))).expect("set");
    assert_eq!(outcome, FieldValidation::Unavailable);
    assert_eq!(
        controller.global_error().expect("global").map(|error| error.kind),
        Some(GlobalErrorKind::ValidationUnavailable)
    );

    unavailable.store(false, Ordering::SeqCst);
    let outcome =
        block_on(controller.set_async(fields.name(), Some("fresher".into()))).expect("set");
    assert_eq!(outcome, FieldValidation::Valid);
    assert_eq!(controller.global_error().expect("global"), None);
}

#[test]
fn cancel_during_pending_validation_discards_the_result() {
    let fields = TenantForm::fields();
    let controller = FormController::<TenantForm, TestError>::new(TenantForm::default(), options(0));
    let (release, gate) = oneshot::channel();
    controller
        .register_async_field_validator(
            fields.name(),
            NameCheck {
                gate: Mutex::new(Some(gate)),
                ..NameCheck::default()
            },
        )
        .expect("register async validator");

    let (outcome, ()) = block_on(async {
        join!(
            controller.set_async(fields.name(), Some("taken".into())),
            async {
                controller.cancel().expect("cancel");
                let _ = release.send(());
            },
        )
    });

    assert_eq!(outcome.expect("outcome"), FieldValidation::Discarded);
    let snapshot = controller.snapshot().expect("snapshot");
    assert_eq!(snapshot.close, Some(CloseReason::Cancelled));
    assert_eq!(snapshot.model, TenantForm::default());
    assert_eq!(snapshot.error(fields.name().key()), None);
    assert!(
        snapshot
            .field_meta
            .values()
            .all(|meta| !meta.validating && meta.error.is_none())
    );
}

#[test]
fn close_during_save_drops_the_result() {
    let controller = FormController::<TenantForm, TestError>::new(existing_tenant(), options(0));
    let (release, gate) = oneshot::channel::<()>();

    let (outcome, ()) = block_on(async {
        join!(
            controller.save(move |_model| async move {
                let _ = gate.await;
                Err::<TenantForm, _>(EndpointError::Unexpected("late".into()))
            }),
            async {
                controller.close().expect("close");
                let _ = release.send(());
            },
        )
    });

    assert_eq!(outcome.expect("outcome"), SaveOutcome::Discarded);
    assert_eq!(controller.global_error().expect("global"), None);
    assert_eq!(
        controller.close_reason().expect("close reason"),
        Some(CloseReason::Dismissed)
    );
    assert_eq!(
        controller.snapshot().expect("snapshot").submit_state,
        SubmitState::Idle
    );
}

#[test]
fn derived_field_follows_source_until_touched() {
    let fields = TenantForm::fields();
    let controller = FormController::<TenantForm, TestError>::new(TenantForm::default(), options(0));
    controller
        .register_derived_field(
            fields.display_name(),
            fields.name(),
            |display_name: &Option<String>| display_name.as_ref().map(|value| value.to_lowercase()),
        )
        .expect("register derived field");

    let scheduled = controller
        .set(fields.display_name(), Some("Acme".into()))
        .expect("set source");
    assert_eq!(
        scheduled.iter().map(|entry| entry.key).collect::<Vec<_>>(),
        vec![fields.display_name().key(), fields.name().key()]
    );
    assert_eq!(
        controller.snapshot().expect("snapshot").model.name.as_deref(),
        Some("acme")
    );

    controller.touch(fields.name()).expect("touch");
    controller
        .set(fields.display_name(), Some("Globex".into()))
        .expect("set source again");
    assert_eq!(
        controller.snapshot().expect("snapshot").model.name.as_deref(),
        Some("acme")
    );
}

#[test]
fn error_visibility_requires_touch_or_submit() {
    let fields = TenantForm::fields();
    let controller = FormController::<TenantForm, TestError>::new(
        TenantForm {
            name: Some("a".into()),
            ..TenantForm::default()
        },
        options(0),
    );
    controller
        .register_field_validator(fields.name(), name_rule)
        .expect("register validator");

    assert!(!controller.validate_field(fields.name()).expect("validate"));
    assert_eq!(
        controller
            .field_error_for_display(fields.name())
            .expect("display error"),
        None
    );

    controller.touch(fields.name()).expect("touch field");
    assert_eq!(
        controller
            .field_error_for_display(fields.name())
            .expect("display error"),
        Some("too short".to_string())
    );
}

#[test]
fn field_view_collects_presentation_state() {
    let fields = TenantForm::fields();
    let controller = FormController::<TenantForm, TestError>::new(TenantForm::default(), options(0));
    controller
        .register_required_field(fields.name(), TestError("required"))
        .expect("register required");
    controller
        .register_field_description(fields.name(), "Unique, lowercase")
        .expect("register description");

    let view = controller.field_view(fields.name()).expect("view");
    assert_eq!(view.key.as_str(), "name");
    assert_eq!(view.value, None);
    assert!(view.required);
    assert_eq!(view.description.as_deref(), Some("Unique, lowercase"));
    assert_eq!(view.error, None);

    block_on(controller.save(accept)).expect("save");
    let view = controller.field_view(fields.name()).expect("view");
    assert_eq!(view.error.as_deref(), Some("required"));
    assert!(!controller.field_view(fields.region()).expect("view").required);
}

#[test]
fn invalid_transitions_are_rejected() {
    let controller = FormController::<TenantForm, TestError>::new(TenantForm::default(), options(0));
    let mut state = controller.state.write().expect("state lock");
    assert_eq!(
        controller::transition_submit_state(&mut *state, SubmitState::Succeeded),
        Err(FormError::InvalidStateTransition {
            from: SubmitState::Idle,
            to: SubmitState::Succeeded,
        })
    );
}

#[test]
fn two_hundred_fields_validate_single_field_path() {
    let keys = (0..200)
        .map(|index| Box::leak(format!("field-{index}").into_boxed_str()) as &'static str)
        .collect::<Vec<_>>();

    let model = PerfForm {
        values: keys.iter().map(|key| (*key, String::new())).collect(),
    };

    let invoke_count = Arc::new(AtomicUsize::new(0));
    let controller = FormController::<PerfForm, TestError>::new(model, options(0));

    for key in &keys {
        let counter = invoke_count.clone();
        controller
            .register_field_validator(
                MapLens { key: *key },
                move |_model: &PerfForm, _value: &String| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                },
            )
            .expect("register validator");
    }

    let target = MapLens { key: keys[137] };
    controller
        .set(target, "changed".into())
        .expect("update single field");
    assert!(controller.validate_field(target).expect("validate"));

    let snapshot = controller.snapshot().expect("snapshot");
    assert_eq!(invoke_count.load(Ordering::SeqCst), 1);
    assert_eq!(snapshot.field_meta.len(), 1);
}

#[test]
fn derive_macro_generates_field_lenses() {
    let fields = TenantForm::fields();
    assert_eq!(fields.name().key().as_str(), "name");
    assert_eq!(fields.display_name().key().as_str(), "displayName");
    assert_eq!(
        TenantForm::field_order()
            .iter()
            .map(|key| key.as_str())
            .collect::<Vec<_>>(),
        vec!["name", "displayName", "region", "enabled"]
    );
}
