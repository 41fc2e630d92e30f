pub mod message;

pub use message::{Identity, Message};
