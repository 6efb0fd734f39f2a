mod error;
pub mod handlers;
pub mod middleware;
pub mod orders;
pub mod routes;
pub mod scenes;

pub use error::ApiError;
pub use routes::create_router;
