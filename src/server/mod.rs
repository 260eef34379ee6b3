pub mod builder;
pub mod handler;
pub mod listener;

pub use builder::ServerBuilder;
pub use handler::{RequestHandler, APP_URL_HEADER, REQUEST_ID_HEADER};
