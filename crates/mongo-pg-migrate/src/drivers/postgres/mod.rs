//! PostgreSQL driver.
//!
//! - [`PostgresDialect`]: pre/post migration hooks
//! - [`PostgresWriter`]: target writer over a deadpool connection pool
//! - [`SslMode`]: TLS configuration

mod dialect;
mod tls;
mod writer;

pub use dialect::{id_sequence_name, PostgresDialect};
pub use tls::SslMode;
pub use writer::PostgresWriter;
