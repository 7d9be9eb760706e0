//! HTTP endpoint handlers.
//!
//! - `/ws`: WebSocket push channel, one session per connection
//! - `/api/processes/{pid}/terminate`: process termination control call
//! - `/health`: health check endpoint

pub mod control;
pub mod health;
pub mod stream;

pub use control::terminate_handler;
pub use health::health_handler;
pub use stream::stream_handler;
