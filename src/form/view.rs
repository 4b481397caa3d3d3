use super::controller::{FieldKey, FieldMeta, FormController, FormResult, read_lock};
use super::validation::{FieldLens, FormModel, ValidationError};

/// Everything a presentation layer needs to render one field.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FieldView<V> {
    pub key: FieldKey,
    pub value: V,
    /// Only set once the field was touched or a save was attempted.
    pub error: Option<String>,
    pub required: bool,
    pub description: Option<String>,
    pub validating: bool,
    pub unavailable: bool,
}

impl<T, E> FormController<T, E>
where
    T: FormModel,
    E: ValidationError,
{
    pub fn field_view<L>(&self, lens: L) -> FormResult<FieldView<L::Value>>
    where
        L: FieldLens<T>,
    {
        let key = lens.key();
        let description = read_lock(&self.field_descriptions, "reading field description for view")?
            .get(&key)
            .cloned();
        let required =
            read_lock(&self.required_fields, "reading required fields for view")?.contains_key(&key);

        let state = read_lock(&self.state, "reading field view")?;
        let meta = state.field_meta.get(&key);
        Ok(FieldView {
            key,
            value: lens.get(&state.model).clone(),
            error: display_error(meta, state.submit_count).map(ValidationError::message),
            required,
            description,
            validating: meta.is_some_and(|meta| meta.validating),
            unavailable: meta.is_some_and(|meta| meta.unavailable),
        })
    }

    pub fn field_error_for_display<L>(&self, lens: L) -> FormResult<Option<String>>
    where
        L: FieldLens<T>,
    {
        let state = read_lock(&self.state, "reading display error message")?;
        Ok(display_error(state.field_meta.get(&lens.key()), state.submit_count)
            .map(ValidationError::message))
    }
}

fn display_error<E>(meta: Option<&FieldMeta<E>>, submit_count: u32) -> Option<&E> {
    let meta = meta?;
    if !meta.touched && submit_count == 0 {
        return None;
    }
    meta.error.as_ref()
}
