use busconnect_core::payment::PaymentGateway;
use busconnect_core::repository::{
    BookingRepository, OutboxRepository, PaymentRepository, SeatLedgerStore, TripRepository,
};
use std::sync::Arc;
use std::time::Duration;

use crate::confirmation::ConfirmationStateMachine;
use crate::expiry::ProvisionalExpiry;
use crate::feed::ChangeFeed;
use crate::ledger::SeatLedger;
use crate::orchestrator::{PaymentOrchestrator, PaymentSettings};
use crate::pricing::FareSchedule;
use crate::reservation::ReservationService;

/// Storage handles the engine is assembled from.
#[derive(Clone)]
pub struct Repositories {
    pub trips: Arc<dyn TripRepository>,
    pub seats: Arc<dyn SeatLedgerStore>,
    pub bookings: Arc<dyn BookingRepository>,
    pub payments: Arc<dyn PaymentRepository>,
    pub outbox: Arc<dyn OutboxRepository>,
}

#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub fares: FareSchedule,
    pub payments: PaymentSettings,
    pub webhook_secret: String,
    pub feed_capacity: usize,
    pub provisional_ttl: Option<Duration>,
}

/// Every booking component wired against one set of repositories.
pub struct BookingEngine {
    pub ledger: Arc<SeatLedger>,
    pub feed: ChangeFeed,
    pub reservations: Arc<ReservationService>,
    pub payments: Arc<PaymentOrchestrator>,
    pub confirmations: Arc<ConfirmationStateMachine>,
    pub expiry: Option<Arc<ProvisionalExpiry>>,
    pub outbox: Arc<dyn OutboxRepository>,
}

impl BookingEngine {
    pub fn new(repos: Repositories, gateway: Arc<dyn PaymentGateway>, options: EngineOptions) -> Self {
        let ledger = Arc::new(SeatLedger::new(repos.trips.clone(), repos.seats.clone()));
        let feed = ChangeFeed::new(ledger.clone(), options.feed_capacity);

        let reservations = Arc::new(ReservationService::new(
            repos.trips.clone(),
            repos.bookings.clone(),
            ledger.clone(),
            options.fares,
            feed.clone(),
        ));
        let payments = Arc::new(PaymentOrchestrator::new(
            gateway,
            repos.bookings.clone(),
            repos.payments.clone(),
            options.payments,
        ));
        let confirmations = Arc::new(ConfirmationStateMachine::new(
            payments.clone(),
            repos.bookings.clone(),
            repos.payments.clone(),
            repos.outbox.clone(),
            feed.clone(),
            options.webhook_secret.into_bytes(),
        ));
        let expiry = options
            .provisional_ttl
            .map(|ttl| Arc::new(ProvisionalExpiry::new(repos.bookings.clone(), feed.clone(), ttl)));

        Self {
            ledger,
            feed,
            reservations,
            payments,
            confirmations,
            expiry,
            outbox: repos.outbox,
        }
    }
}
