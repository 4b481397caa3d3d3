use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use thiserror::Error;

use crate::form::{
    AsyncFieldValidator, AsyncRejection, BoxedValidationFuture, FieldLens, ValidationError,
};

/// Rejections reported by the console's backend endpoints.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum EndpointError {
    #[error("{entity} already exists")]
    AlreadyExists { entity: String },
    /// Each violation reads `"<field> <message>"`, e.g. `"name must match pattern"`.
    #[error("constraint violation: {}", violations.join(", "))]
    ConstraintViolation { violations: Vec<String> },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

pub type BoxedEndpointFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, EndpointError>> + Send + 'a>>;

/// Answers "is this identifier already taken?" (`nameExists`, `aliasExists`).
pub trait ExistenceCheck: Send + Sync {
    fn exists<'a>(&'a self, candidate: &'a str) -> BoxedEndpointFuture<'a, bool>;
}

impl<C> ExistenceCheck for Arc<C>
where
    C: ExistenceCheck + ?Sized,
{
    fn exists<'a>(&'a self, candidate: &'a str) -> BoxedEndpointFuture<'a, bool> {
        (**self).exists(candidate)
    }
}

pub trait EntityEndpoint<T>: Send + Sync {
    fn create(&self, entity: T) -> BoxedEndpointFuture<'_, T>;
    fn update(&self, entity: T) -> BoxedEndpointFuture<'_, T>;
}

impl<T, C> EntityEndpoint<T> for Arc<C>
where
    C: EntityEndpoint<T> + ?Sized,
{
    fn create(&self, entity: T) -> BoxedEndpointFuture<'_, T> {
        (**self).create(entity)
    }

    fn update(&self, entity: T) -> BoxedEndpointFuture<'_, T> {
        (**self).update(entity)
    }
}

/// Asynchronous uniqueness check for an optional text field. An unset or
/// blank value is left to the required-field check.
pub struct UniquenessValidator<C, E> {
    check: C,
    taken: E,
}

impl<C, E> UniquenessValidator<C, E> {
    pub fn new(check: C, taken: E) -> Self {
        Self { check, taken }
    }
}

impl<T, L, E, C> AsyncFieldValidator<T, L, E> for UniquenessValidator<C, E>
where
    L: FieldLens<T, Value = Option<String>>,
    E: ValidationError,
    C: ExistenceCheck,
{
    type Fut<'a>
        = BoxedValidationFuture<'a, E>
    where
        Self: 'a,
        T: 'a,
        L::Value: 'a;

    fn validate<'a>(&'a self, _model: &'a T, value: &'a Option<String>) -> Self::Fut<'a> {
        Box::pin(async move {
            let Some(candidate) = value.as_deref().filter(|value| !value.trim().is_empty()) else {
                return Ok(());
            };
            match self.check.exists(candidate).await {
                Ok(false) => Ok(()),
                Ok(true) => Err(AsyncRejection::Invalid(self.taken.clone())),
                Err(error) => Err(AsyncRejection::Unavailable(error.to_string())),
            }
        })
    }
}
