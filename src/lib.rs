pub mod context;
pub mod dispatcher;
pub mod dns;
pub mod error;
pub mod message_manager;
pub mod repository;
pub mod stats;
pub mod tokio_message_manager;
pub mod worker;

pub use dispatcher::Dispatcher;
pub use error::{GungnirError, Result};
