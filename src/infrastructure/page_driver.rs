//! Abstraction over the rendered activity-list page.
//!
//! Everything the pipelines do to the page — reading rows, clicking
//! pagination controls, driving the quick-edit form — goes through this
//! trait. Production binds it to the real page; tests bind a scripted
//! implementation that replays canned pages.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("element not found: {0}")]
    ElementNotFound(String),
    #[error("interaction failed: {0}")]
    InteractionFailed(String),
    #[error("save confirmation missing for activity {0}")]
    SaveNotConfirmed(String),
}

/// Opaque handle to a visible row; only valid until the page re-renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RowHandle(pub u64);

/// What a pipeline can read off a row without opening it.
#[derive(Debug, Clone)]
pub struct RowSnapshot {
    pub handle: RowHandle,
    /// The `data-activity-id` style attribute, when the markup carries one.
    pub activity_id_attr: Option<String>,
    /// The row's detail link, used as an id fallback.
    pub href: Option<String>,
}

/// State of a pagination control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlState {
    Missing,
    Disabled,
    Enabled,
}

/// Fields the quick-edit form can expose. Which ones exist depends on the
/// activity's sport, so setters report presence rather than failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormField {
    Bike,
    Shoes,
    Visibility,
    RideType,
}

#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Whether the document has finished loading.
    async fn is_ready(&self) -> bool;

    /// Whether the current location is the activity-list page.
    async fn on_activity_page(&self) -> bool;

    async fn visible_rows(&self) -> Result<Vec<RowSnapshot>, DriverError>;

    /// Raw text of the pagination indicator, e.g. `"21-40 of 41"`.
    async fn page_indicator_text(&self) -> Option<String>;

    async fn next_control(&self) -> ControlState;

    async fn click_next(&self) -> Result<(), DriverError>;

    async fn sort_control(&self) -> ControlState;

    /// Whether the date-sort currently shows newest first.
    async fn sort_is_descending(&self) -> Option<bool>;

    /// Clicks the date-sort header. Always reloads page 1.
    async fn click_sort(&self) -> Result<(), DriverError>;

    async fn open_quick_edit(&self, row: RowHandle) -> Result<(), DriverError>;

    /// Sets a form field if it exists. `Ok(false)` means the field is not
    /// present on this form, which is not an error.
    async fn set_field(
        &self,
        row: RowHandle,
        field: FormField,
        value: &str,
    ) -> Result<bool, DriverError>;

    async fn submit_edit(&self, row: RowHandle) -> Result<(), DriverError>;

    /// Verifies the row reflects the saved state after submit.
    async fn confirm_saved(&self, row: RowHandle) -> Result<(), DriverError>;
}
