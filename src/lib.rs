pub mod config;
pub mod dialog;
pub mod endpoint;
pub mod feedback;
pub mod form;
pub mod i18n;
pub mod listing;
pub mod organization;
pub mod region;
pub mod rules;

pub use config::{ConfigError, ConsoleConfig};
pub use dialog::{ConsoleContext, DialogError, DialogMode, FieldError};
pub use organization::{Organization, OrganizationDialog, OrganizationForm, OrganizationServices};
pub use region::{Region, RegionDialog, RegionForm, RegionServices};
