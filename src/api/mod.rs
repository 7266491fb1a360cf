mod client;
mod error;
mod types;

pub use client::FestaApi;
pub use error::FestaError;
pub use types::{Event, FeedbackEntry, MenuItem};
