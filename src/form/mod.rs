mod controller;
mod submit;
mod validation;
mod view;

#[cfg(test)]
mod tests;

pub use console_forms_derive::FormModel;
pub use controller::{
    BoxedValidationFuture, CloseReason, FieldKey, FieldMeta, FormController, FormError, FormId,
    FormOptions, FormResult, FormSnapshot, GlobalError, GlobalErrorKind, ScheduledValidation,
    SubmitState, UnavailablePolicy, ValidationTicket,
};
pub use submit::SaveOutcome;
pub use view::FieldView;
pub use validation::{
    AsyncFieldValidator, AsyncRejection, FieldLens, FieldValidation, FieldValidator, FormModel,
    ValidationError,
};
