mod config;
mod conversations;
mod selection;
mod clarifications;

pub use config::*;
pub use conversations::*;
pub use selection::*;
pub use clarifications::*;
