//! Infrastructure layer: configuration, logging, and the boundaries with the
//! host page — the response interceptor and its cache, the page driver, and
//! task persistence.

pub mod cache;
pub mod config;
pub mod intercept;
pub mod logging;
pub mod page_driver;
pub mod storage;

pub use cache::{CacheStats, CachedPage, ResponseCache};
pub use config::{DelayConfig, EngineConfig, NavigatorConfig, RetryConfig};
pub use intercept::{InterceptSession, PageInfo};
pub use logging::init_logging;
pub use page_driver::{ControlState, DriverError, FormField, PageDriver, RowHandle, RowSnapshot};
pub use storage::{FileTaskStore, MemoryTaskStore, StorageError, TaskStore};
