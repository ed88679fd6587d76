pub mod clock;
pub mod config;
pub mod error;
pub mod feed;
pub mod keys;
pub mod lifecycle;
pub mod projector;
pub mod push;
pub mod schedule;
pub mod server;
pub mod store;
pub mod tenant;
