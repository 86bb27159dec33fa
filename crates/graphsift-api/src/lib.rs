pub mod dto;
pub mod errors;
pub mod ingest;

pub use dto::*;
pub use errors::ApiError;
pub use ingest::{coerce_value, display_name_for};
