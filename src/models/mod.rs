//! Data model shared by the pipeline stages.

mod link;
mod record;

pub use link::{CandidateLink, LinkSource};
pub use record::{Field, Record};
