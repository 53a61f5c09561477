//! Core domain types and abstractions

pub mod cache;
pub mod config;
pub mod identity;
pub mod log;
pub mod metrics;
pub mod rate;
pub mod session;

// Re-export main types for cleaner imports
pub use cache::{CacheConfig, CacheEntry, RateCache};
pub use identity::{AuthError, BrowserOutcome, BrowserSession, IdentityProvider};
pub use metrics::DerivedMetrics;
pub use rate::{BestOption, FetchError, RateFetcher, RateSnapshot};
pub use session::{Session, SessionStore, StorageError};
