//! The form orchestrator and its public surface.

pub mod config;
pub mod events;
#[allow(clippy::module_inception)]
pub mod form;
pub mod handle;

pub use config::{FormConfig, MultilingualValidation, ValidateOn};
pub use events::{ChangeEvent, ChangeHandler, EventBus};
pub use form::{Form, FormBuilder, SubmitOutcome, ValidationBatch, ValidationOutcome};
pub use handle::{ElementMut, ElementRef};
