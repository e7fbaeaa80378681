//! Database binding: a generated credential secret plus a managed datastore
//! on the environment network, handed to the container as `DB_ENDPOINT` and
//! the `DB_SECRET` reference.

pub mod binding;
pub mod config;

pub use binding::{DatabaseBinding, DATABASE_ENDPOINT_OUTPUT};
pub use config::DatabaseConfig;
