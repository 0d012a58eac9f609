mod handlers;
mod middleware;
pub mod response;
mod routes;

pub use routes::{create_router, with_middleware};
