// Core module: channel vocabulary, chip codes, errors and deadlines (NO I/O dependencies)
pub mod types;
pub mod protocol;
pub mod error;
pub mod deadline;

pub use types::*;
pub use protocol::*;
pub use error::*;
pub use deadline::*;
