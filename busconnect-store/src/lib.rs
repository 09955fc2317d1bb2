pub mod app_config;
pub mod database;
pub mod trip_repo;
pub mod booking_repo;
pub mod payment_repo;
pub mod outbox_repo;
pub mod listener;
pub mod redis_repo;
pub mod events;
pub mod paystack;
pub mod memory;
pub mod mock_gateway;

pub use database::DbClient;
pub use redis_repo::RedisClient;
pub use events::EventProducer;
pub use trip_repo::StoreTripRepository;
pub use booking_repo::StoreBookingRepository;
pub use payment_repo::StorePaymentRepository;
pub use outbox_repo::StoreOutboxRepository;
pub use paystack::PaystackClient;
pub use memory::InMemoryStore;
pub use mock_gateway::MockPaymentGateway;
