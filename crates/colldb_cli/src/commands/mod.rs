//! CLI command implementations.

pub mod cleanup;
pub mod hard_delete;
pub mod inspect;
pub mod sync_data;
pub mod upgrade;
