//! SQLite session handling for both ends of a migration.
//!
//! - [`Sessions`] opens the read-only source and the load-tuned destination
//! - [`PragmaSnapshot`] records destination settings so they can be restored
//! - [`ensure_destination_schema`] creates the destination tables on demand

mod pragma;
mod schema;
mod sessions;

pub use pragma::PragmaSnapshot;
pub use schema::{ensure_destination_schema, LOCAL_ACCOUNT_ID};
pub use sessions::Sessions;
