pub mod compactor;
pub mod config;
pub mod engine;
pub mod limits;
pub mod model;
pub mod observability;
pub mod server;
pub mod sql;
pub mod store;
pub mod wal;
