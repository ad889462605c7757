pub mod server;
pub mod status;

pub use server::*;
pub use status::*;
