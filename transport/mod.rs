// Transport module: hardware channel allocation, TCP client/server and bus wiring
pub mod traits;
pub mod trampoline;
pub mod adapter;
pub mod status;
pub mod establish;
pub mod tcp;
pub mod server;

pub use traits::*;
pub use adapter::*;
pub use status::*;
pub use establish::*;
pub use tcp::*;
pub use server::*;
