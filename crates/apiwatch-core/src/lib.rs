pub mod aggregate;
pub mod classify;
pub mod error;
pub mod report;
pub mod validate;

pub use error::{Error, Result};
