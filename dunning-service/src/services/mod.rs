//! Service layer for dunning-service.

pub mod changes;
pub mod database;
pub mod dunning;
pub mod matching;
pub mod metrics;
pub mod normalize;
pub mod store;
pub mod sync;
pub mod upstream;

pub use database::Database;
pub use metrics::{get_metrics, init_metrics};
pub use store::ReconciliationStore;
pub use sync::SyncService;
pub use upstream::{UpstreamApi, UpstreamClient};
