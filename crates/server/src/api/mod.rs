pub mod bundles;
pub mod compose;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod webhooks;

pub use routes::create_router;
