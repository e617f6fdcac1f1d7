pub mod configuration;
pub use configuration::*;

pub mod data_capture;

pub mod error_handling;

pub mod network;
pub use network::*;

pub mod session_management;
pub use session_management::*;

#[cfg(test)]
mod test_support;
