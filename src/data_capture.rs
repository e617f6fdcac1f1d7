pub mod capture_writer;
pub mod hex_dump;
pub mod naming;
pub mod types;

pub use capture_writer::HexCaptureWriter;
pub use hex_dump::format_hex_block;
pub use naming::capture_file_name;
pub use types::{CaptureRecord, Direction};
