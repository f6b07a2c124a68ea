pub mod error;
pub mod psx;
pub mod util;

pub use error::{Error, Result};
