pub mod client;
pub mod coalesce;
pub mod crypto;
mod error;
pub mod session;
pub mod transport;

pub use crate::error::{Error, Result};
pub use shroud_protocol::ErrorKind;
