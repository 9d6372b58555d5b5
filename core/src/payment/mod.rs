//! # Payment Module
//!
//! The orchestration layer: idempotent payment submission, fee pricing,
//! the hold lifecycle (authorize → capture / void), bounded refunds, and
//! lifecycle event emission. Coordinates the ledger below and the policy
//! and risk gates beside it; the HTTP boundary calls nothing else.

pub mod fees;
pub mod hold;
pub mod orchestrator;
pub mod types;

pub use fees::{FeePricer, FlatFeeSchedule};
pub use hold::{HoldStatus, PaymentHold};
pub use orchestrator::{HoldRequest, PayRequest, PaymentOrchestrator};
pub use types::{
    ErrorKind, HoldResult, PaymentEstimate, PaymentResult, RefundResult, Transaction,
    TransactionStatus,
};
