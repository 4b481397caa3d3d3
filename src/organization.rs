use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::dialog::{
    ConsoleContext, DialogMode, DialogResult, FieldError, Messages, SavedCallback,
    notify_validation_unavailable, register_display_name_field, register_identifier_field,
    register_uniqueness_check, retry_label, text_value, unavailable_hint,
};
use crate::endpoint::{EntityEndpoint, ExistenceCheck};
use crate::feedback::{Notice, NoticeCenter};
use crate::form::{FormController, FormModel, SaveOutcome, ScheduledValidation};
use crate::region::Region;
use crate::rules::derive_name;

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Organization {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub display_name: String,
    pub region: String,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

#[derive(Clone, Debug, Eq, PartialEq, FormModel)]
pub struct OrganizationForm {
    pub name: Option<String>,
    #[form(rename = "displayName")]
    pub display_name: Option<String>,
    pub region: Option<String>,
    pub enabled: bool,
}

impl Default for OrganizationForm {
    fn default() -> Self {
        Self {
            name: None,
            display_name: None,
            region: None,
            enabled: true,
        }
    }
}

impl OrganizationForm {
    fn from_organization(organization: &Organization) -> Self {
        Self {
            name: Some(organization.name.clone()),
            display_name: Some(organization.display_name.clone()),
            region: Some(organization.region.clone()),
            enabled: organization.enabled,
        }
    }

    fn into_organization(self, id: Option<String>) -> Organization {
        Organization {
            id,
            name: self.name.unwrap_or_default(),
            display_name: self.display_name.unwrap_or_default(),
            region: self.region.unwrap_or_default(),
            enabled: self.enabled,
        }
    }
}

/// An entry of the region selector.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RegionOption {
    pub value: String,
    pub label: String,
}

#[derive(Clone)]
pub struct OrganizationServices {
    pub endpoint: Arc<dyn EntityEndpoint<Organization>>,
    pub names: Arc<dyn ExistenceCheck>,
}

pub struct OrganizationDialog {
    mode: DialogMode,
    id: Option<String>,
    regions: Vec<RegionOption>,
    form: FormController<OrganizationForm, FieldError>,
    endpoint: Arc<dyn EntityEndpoint<Organization>>,
    messages: Messages,
    notices: NoticeCenter,
    on_saved: Option<SavedCallback<Organization>>,
}

impl OrganizationDialog {
    /// While the user has not touched the name, it follows the display name.
    pub fn create(
        context: &ConsoleContext,
        services: OrganizationServices,
        regions: &[Region],
    ) -> DialogResult<Self> {
        Self::open(context, services, regions, DialogMode::Create, None)
    }

    pub fn edit(
        context: &ConsoleContext,
        services: OrganizationServices,
        regions: &[Region],
        organization: &Organization,
    ) -> DialogResult<Self> {
        Self::open(
            context,
            services,
            regions,
            DialogMode::Edit,
            Some(organization),
        )
    }

    fn open(
        context: &ConsoleContext,
        services: OrganizationServices,
        regions: &[Region],
        mode: DialogMode,
        organization: Option<&Organization>,
    ) -> DialogResult<Self> {
        let mut initial = organization
            .map(OrganizationForm::from_organization)
            .unwrap_or_default();
        // Without configured regions the selector is hidden and everything
        // lands in the default region.
        if regions.is_empty() && initial.region.is_none() {
            initial.region = Some(Region::DEFAULT_NAME.to_string());
        }

        let form = FormController::new(initial, context.options);
        let messages = Messages::new(&context.i18n, "organization");
        let fields = OrganizationForm::fields();

        register_identifier_field(&form, fields.name(), &messages)?;
        register_display_name_field(&form, fields.display_name(), &messages)?;
        register_uniqueness_check(&form, fields.name(), services.names, &messages)?;
        form.register_required_field(fields.region(), messages.required("field.region"))?;
        form.register_violation_prefix(
            fields.region(),
            "region",
            FieldError::new("required", messages.entity_text("region.required")),
        )?;

        form.register_field_description(fields.name(), messages.entity_text("name.help"))?;
        form.register_field_description(
            fields.display_name(),
            messages.entity_text("display_name.help"),
        )?;
        form.register_field_description(fields.region(), messages.entity_text("region.help"))?;

        match mode {
            DialogMode::Create => {
                form.register_derived_field(
                    fields.display_name(),
                    fields.name(),
                    |display_name: &Option<String>| {
                        display_name
                            .as_deref()
                            .map(derive_name)
                            .filter(|name| !name.is_empty())
                    },
                )?;
                form.request_focus(fields.name())?;
            }
            DialogMode::Edit => form.request_focus(fields.display_name())?,
        }
        tracing::debug!(?mode, regions = regions.len(), "organization dialog opened");

        Ok(Self {
            mode,
            id: organization.and_then(|organization| organization.id.clone()),
            regions: regions
                .iter()
                .map(|region| RegionOption {
                    value: region.name.clone(),
                    label: region.display_name.clone(),
                })
                .collect(),
            form,
            endpoint: services.endpoint,
            messages,
            notices: context.notices.clone(),
            on_saved: None,
        })
    }

    pub fn on_saved(mut self, callback: impl Fn(&Organization) + Send + Sync + 'static) -> Self {
        self.on_saved = Some(Arc::new(callback));
        self
    }

    pub fn mode(&self) -> DialogMode {
        self.mode
    }

    pub fn form(&self) -> &FormController<OrganizationForm, FieldError> {
        &self.form
    }

    pub fn region_options(&self) -> &[RegionOption] {
        &self.regions
    }

    pub fn region_visible(&self) -> bool {
        !self.regions.is_empty()
    }

    pub fn set_name(&self, value: impl Into<String>) -> DialogResult<Vec<ScheduledValidation>> {
        Ok(self
            .form
            .set(OrganizationForm::fields().name(), text_value(value))?)
    }

    /// Focusing the name field is enough to stop it following the display
    /// name.
    pub fn focus_name(&self) -> DialogResult<()> {
        Ok(self.form.touch(OrganizationForm::fields().name())?)
    }

    pub fn set_display_name(
        &self,
        value: impl Into<String>,
    ) -> DialogResult<Vec<ScheduledValidation>> {
        Ok(self
            .form
            .set(OrganizationForm::fields().display_name(), text_value(value))?)
    }

    pub fn set_region(&self, value: impl Into<String>) -> DialogResult<Vec<ScheduledValidation>> {
        Ok(self
            .form
            .set(OrganizationForm::fields().region(), text_value(value))?)
    }

    pub fn set_enabled(&self, enabled: bool) -> DialogResult<Vec<ScheduledValidation>> {
        Ok(self.form.set(OrganizationForm::fields().enabled(), enabled)?)
    }

    pub async fn save(&self) -> DialogResult<SaveOutcome<Organization>> {
        self.submit(false).await
    }

    pub async fn retry(&self) -> DialogResult<SaveOutcome<Organization>> {
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
            OrganizationForm::fields().name(),
            &self.messages,
            "field.name",
        )?)
    }

    async fn submit(&self, retry: bool) -> DialogResult<SaveOutcome<Organization>> {
        let endpoint = self.endpoint.clone();
        let mode = self.mode;
        let id = self.id.clone();
        let persist = move |model: OrganizationForm| async move {
            let organization = model.into_organization(id);
            match mode {
                DialogMode::Create => endpoint.create(organization).await,
                DialogMode::Edit => endpoint.update(organization).await,
            }
        };

        let outcome = if retry {
            self.form.retry(persist).await?
        } else {
            self.form.save(persist).await?
        };
        match &outcome {
            SaveOutcome::Saved(organization) => {
                self.notices.show(Notice::success(
                    self.messages.saved(&organization.display_name),
                ));
                if let Some(callback) = &self.on_saved {
                    callback(organization);
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
