pub mod handlers;
pub mod middleware;
pub mod server;

pub use server::{app_router, serve_app, serve_store, store_router};
