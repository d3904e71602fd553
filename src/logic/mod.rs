pub mod validate;
pub mod versioning;

pub use validate::*;
pub use versioning::*;
