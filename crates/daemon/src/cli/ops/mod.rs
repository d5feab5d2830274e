pub mod client;
pub mod generate;
pub mod identity;
pub mod server;
pub mod trust;
pub mod version;

pub use client::Client;
pub use generate::Generate;
pub use identity::Identity;
pub use server::Server;
pub use trust::Trust;
pub use version::Version;
