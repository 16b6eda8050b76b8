mod error;
#[cfg(feature = "mysql")]
mod mysql;
#[cfg(feature = "sqlite")]
mod sqlite;
mod statement;

pub use error::SqlError;
#[cfg(feature = "mysql")]
pub use mysql::MySqlRecordStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteRecordStore;
pub use statement::{Bind, UpdateStatement};
