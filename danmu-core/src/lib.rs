pub mod catalog;
pub mod config;
pub mod error;
pub mod logging;
pub mod matcher;
pub mod models;
pub mod pipeline;
pub mod ratelimit;
pub mod source;
pub mod storage;

pub use catalog::{Catalog, CatalogSnapshot, MAX_ANIMES};
pub use config::{ConfigRegistry, Settings};
pub use error::{Error, Result};
pub use ratelimit::RateLimiter;
pub use source::{Orchestrator, Source, SourceRegistry};
pub use storage::StorageService;
