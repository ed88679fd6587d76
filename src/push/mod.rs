pub mod client;
pub mod error;
pub mod types;

pub use client::PushRelay;
pub use error::NotifyError;
pub use types::PushMessage;
