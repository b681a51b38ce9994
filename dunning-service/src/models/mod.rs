//! Domain models for dunning-service.

pub mod customer;
pub mod dunning;
pub mod invoice;
pub mod mapping;
pub mod record;
pub mod sync;

pub use customer::{Customer, PLACEHOLDER_BASE};
pub use dunning::{
    DunningAssessment, DunningLevel, DunningRuleSet, DunningStage, InterestPolicy,
};
pub use invoice::{payment_epsilon, CachedInvoice, PaymentStatus};
pub use mapping::{CounterpartyException, ManualMapping};
pub use record::{NormalizedDebtor, NormalizedInvoice};
pub use sync::{ChangeOutcome, CyclePhase, SyncSummary};
