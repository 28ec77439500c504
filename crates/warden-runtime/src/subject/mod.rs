//! Calculated subjects and the resolution engine.

mod calculated;
mod handle;
mod resolve;

pub(crate) use calculated::load_tiers;
pub use calculated::{CalculatedSubject, SubjectListener};
pub use handle::SubjectDataHandle;
pub(crate) use resolve::Baked;
