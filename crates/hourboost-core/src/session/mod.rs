//! Per-account session state machine and its persistence boundary.

mod cache_repository;
mod cache_state;
mod client;
mod connection;
mod credentials;
mod state;

pub use cache_repository::CacheRepository;
pub use cache_state::CacheState;
pub use client::{
    AccountSummary, FarmStop, LoginOutcome, SessionClient, SessionClientParams, TransportFailure,
};
pub use connection::{
    ConnectionEvent, ConnectionFactory, GameClientConnection, GameId, OwnedGame,
    TransportErrorCode,
};
pub use credentials::LoginCredentials;
pub use state::{PersonaStatus, SessionState, StopReason};
