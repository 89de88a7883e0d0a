//! Database module exports.

mod memory;
mod models;
mod postgres;
mod store;

pub use memory::MemoryPostStore;
pub use models::*;
pub use postgres::PgPostStore;
pub use store::{PostStore, PostTransaction};
