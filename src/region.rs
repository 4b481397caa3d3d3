use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::dialog::{
    ConsoleContext, DialogError, DialogMode, DialogResult, FieldError, Messages, SavedCallback,
    notify_validation_unavailable, register_display_name_field, register_identifier_field,
    register_uniqueness_check, retry_label, text_value, unavailable_hint,
};
use crate::endpoint::{EntityEndpoint, ExistenceCheck};
use crate::feedback::{Notice, NoticeCenter};
use crate::form::{FormController, FormModel, SaveOutcome, ScheduledValidation};

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Region {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub display_name: String,
}

impl Region {
    /// Used by organizations while no region has been configured.
    pub const DEFAULT_NAME: &'static str = "default";
}

#[derive(Clone, Debug, Default, Eq, PartialEq, FormModel)]
pub struct RegionForm {
    pub name: Option<String>,
    #[form(rename = "displayName")]
    pub display_name: Option<String>,
}

impl RegionForm {
    fn from_region(region: &Region) -> Self {
        Self {
            name: Some(region.name.clone()),
            display_name: Some(region.display_name.clone()),
        }
    }

    fn into_region(self, id: Option<String>) -> Region {
        Region {
            id,
            name: self.name.unwrap_or_default(),
            display_name: self.display_name.unwrap_or_default(),
        }
    }
}

#[derive(Clone)]
pub struct RegionServices {
    pub endpoint: Arc<dyn EntityEndpoint<Region>>,
    /// Optional; without it region names are only checked by the endpoint.
    pub names: Option<Arc<dyn ExistenceCheck>>,
}

pub struct RegionDialog {
    mode: DialogMode,
    id: Option<String>,
    form: FormController<RegionForm, FieldError>,
    endpoint: Arc<dyn EntityEndpoint<Region>>,
    messages: Messages,
    notices: NoticeCenter,
    on_saved: Option<SavedCallback<Region>>,
}

impl RegionDialog {
    pub fn create(context: &ConsoleContext, services: RegionServices) -> DialogResult<Self> {
        Self::open(context, services, DialogMode::Create, None)
    }

    /// The region name identifies the region everywhere and stays fixed.
    pub fn edit(
        context: &ConsoleContext,
        services: RegionServices,
        region: &Region,
    ) -> DialogResult<Self> {
        Self::open(context, services, DialogMode::Edit, Some(region))
    }

    fn open(
        context: &ConsoleContext,
        services: RegionServices,
        mode: DialogMode,
        region: Option<&Region>,
    ) -> DialogResult<Self> {
        let initial = region.map(RegionForm::from_region).unwrap_or_default();
        let form = FormController::new(initial, context.options);
        let messages = Messages::new(&context.i18n, "region");
        let fields = RegionForm::fields();

        register_identifier_field(&form, fields.name(), &messages)?;
        register_display_name_field(&form, fields.display_name(), &messages)?;
        if let Some(names) = services.names {
            register_uniqueness_check(&form, fields.name(), names, &messages)?;
        }

        match mode {
            DialogMode::Create => form.request_focus(fields.name())?,
            DialogMode::Edit => form.request_focus(fields.display_name())?,
        }
        tracing::debug!(?mode, "region dialog opened");

        Ok(Self {
            mode,
            id: region.and_then(|region| region.id.clone()),
            form,
            endpoint: services.endpoint,
            messages,
            notices: context.notices.clone(),
            on_saved: None,
        })
    }

    pub fn on_saved(mut self, callback: impl Fn(&Region) + Send + Sync + 'static) -> Self {
        self.on_saved = Some(Arc::new(callback));
        self
    }

    pub fn mode(&self) -> DialogMode {
        self.mode
    }

    pub fn form(&self) -> &FormController<RegionForm, FieldError> {
        &self.form
    }

    pub fn name_editable(&self) -> bool {
        self.mode == DialogMode::Create
    }

    pub fn set_name(&self, value: impl Into<String>) -> DialogResult<Vec<ScheduledValidation>> {
        if !self.name_editable() {
            return Err(DialogError::ReadOnlyField("name"));
        }
        Ok(self.form.set(RegionForm::fields().name(), text_value(value))?)
    }

    pub fn set_display_name(
        &self,
        value: impl Into<String>,
    ) -> DialogResult<Vec<ScheduledValidation>> {
        Ok(self
            .form
            .set(RegionForm::fields().display_name(), text_value(value))?)
    }

    pub async fn save(&self) -> DialogResult<SaveOutcome<Region>> {
        self.submit(false).await
    }

    /// Action behind the error banner's "try again" link.
    pub async fn retry(&self) -> DialogResult<SaveOutcome<Region>> {
        self.submit(true).await
    }

    pub fn cancel(&self) -> DialogResult<()> {
        Ok(self.form.cancel()?)
    }

    pub fn close(&self) -> DialogResult<()> {
        Ok(self.form.close()?)
    }

    pub fn global_error_message(&self) -> DialogResult<Option<String>> {
        Ok(self
            .form
            .global_error()?
            .map(|error| self.messages.global_error(&error)))
    }

    pub fn retry_label(&self) -> DialogResult<Option<String>> {
        Ok(retry_label(&self.form, &self.messages)?)
    }

    /// Set while the name could not be checked for uniqueness.
    pub fn name_hint(&self) -> DialogResult<Option<String>> {
        Ok(unavailable_hint(
            &self.form,
            RegionForm::fields().name(),
            &self.messages,
            "field.name",
        )?)
    }

    async fn submit(&self, retry: bool) -> DialogResult<SaveOutcome<Region>> {
        let endpoint = self.endpoint.clone();
        let mode = self.mode;
        let id = self.id.clone();
        let persist = move |model: RegionForm| async move {
            let region = model.into_region(id);
            match mode {
                DialogMode::Create => endpoint.create(region).await,
                DialogMode::Edit => endpoint.update(region).await,
            }
        };

        let outcome = if retry {
            self.form.retry(persist).await?
        } else {
            self.form.save(persist).await?
        };
        match &outcome {
            SaveOutcome::Saved(region) => {
                self.notices
                    .show(Notice::success(self.messages.saved(&region.display_name)));
                if let Some(callback) = &self.on_saved {
                    callback(region);
                }
            }
            SaveOutcome::Invalid => {
                notify_validation_unavailable(&self.form, &self.messages, &self.notices)?
            }
            _ => {}
        }
        Ok(outcome)
    }
}
