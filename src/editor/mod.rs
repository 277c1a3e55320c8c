//! Services a script editor builds on: highlighting, placeholder navigation
//! and background advice (diagnostics, completion).
pub mod highlight;
pub mod placeholder;
pub mod worker;

pub use highlight::{HighlightSpan, HighlightStyle, StyledText, highlight};
pub use placeholder::{fill_placeholder, next_placeholder, placeholder_at, previous_placeholder};
pub use worker::{Advice, AdvisoryRequest, AdvisoryResult, AdvisoryWorker, Lane};
