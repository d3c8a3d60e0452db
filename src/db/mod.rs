pub mod connection;
pub mod sqlite;
pub mod store;

pub use connection::{init_db, Database};
pub use store::{date_key, DateFilter, Store, WriteMode};
