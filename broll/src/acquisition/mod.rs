//! Resilient media acquisition.
//!
//! A query is answered from the content cache when possible; otherwise
//! providers are tried in policy order, skipping sources whose circuit is
//! open or whose recent success rate is poor, with every call retried and
//! logged by the [`RetryExecutor`].

pub mod health;
pub mod orchestrator;
pub mod providers;
pub mod resilience;
pub mod source;

pub use health::{HealthSnapshot, HealthTracker};
pub use orchestrator::{AcquisitionOrchestrator, AcquisitionPolicy, FoundAsset, SearchOutcome};
pub use providers::{ProviderEndpoint, ProviderError, ProviderRegistry, SearchProvider};
pub use resilience::{CircuitBreaker, CircuitBreakerManager, RetryExecutor, RetryPolicy};
pub use source::{Source, SourceInfo};
