//! Response materialization.
//!
//! This module parses response media types, decodes buffered bodies and
//! builds [`ResponseRecord`]s.

mod content_type;
pub(crate) mod materialize;
mod types;

pub use content_type::{DecodeStrategy, MediaType};
pub use types::{BodyStream, ResponseBody, ResponseRecord};
