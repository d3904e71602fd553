pub mod common;
pub mod draft;
pub mod lot;
pub mod selection;
pub mod user_context;

pub use common::*;
pub use draft::*;
pub use lot::*;
pub use selection::*;
pub use user_context::*;
