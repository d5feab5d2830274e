pub mod args;
pub mod op;
pub mod ops;

pub use ops::{Client, Generate, Identity, Server, Trust, Version};
