pub mod coerce;
pub mod memory;
pub mod postgres;
pub mod traits;

pub use coerce::*;
pub use memory::*;
pub use postgres::*;
pub use traits::*;
