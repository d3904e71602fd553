pub mod handlers;
pub mod response;
pub mod routes;
pub mod user_extractor;

pub use handlers::*;
pub use response::*;
pub use routes::*;
