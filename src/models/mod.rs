mod anchor;
mod selection;
mod clarification;
mod chat;

pub use anchor::*;
pub use selection::*;
pub use clarification::*;
pub use chat::*;
