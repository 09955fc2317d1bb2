pub mod pricing;
pub mod ledger;
pub mod reservation;
pub mod orchestrator;
pub mod signature;
pub mod confirmation;
pub mod feed;
pub mod expiry;
pub mod engine;

pub use confirmation::{ConfirmationOutcome, ConfirmationStateMachine, WebhookAck};
pub use engine::{BookingEngine, EngineOptions, Repositories};
pub use expiry::ProvisionalExpiry;
pub use feed::ChangeFeed;
pub use ledger::SeatLedger;
pub use orchestrator::{InitializeChargeRequest, InitializeOutcome, OtpOutcome, PaymentOrchestrator, PaymentSettings};
pub use pricing::FareSchedule;
pub use reservation::{ReservationService, ReserveSeatRequest};
