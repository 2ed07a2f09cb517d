pub mod catalog;
pub mod error;
pub mod handlers;
pub mod intake;
pub mod models;
pub mod orm;
pub mod router;
pub mod session;
pub mod settings;

pub use error::{Error, Result};
