//! Offset-prefixed hex rows in the layout text2pcap reads.
//!
//! A chunk of `n` bytes becomes `ceil(n / stride)` data rows followed by a
//! terminator row holding `n` and no data:
//!
//! ```text
//! 00000 47 45 54 20 2f 0d 0a
//! 00007
//! ```
//!
//! Offsets restart at zero for every chunk.

use std::fmt::Write;

/// Renders `bytes` as hex rows of `stride` bytes, ending with the terminator row.
///
/// Every row, the terminator included, ends with a newline. `stride` must be
/// non-zero.
pub fn format_hex_block(bytes: &[u8], stride: usize) -> String {
    debug_assert!(stride > 0);

    // "xxxxx " + "xx " per byte + newline per row
    let rows = bytes.len().div_ceil(stride) + 1;
    let mut out = String::with_capacity(rows * 7 + bytes.len() * 3);

    for (row, chunk) in bytes.chunks(stride).enumerate() {
        push_offset(&mut out, row * stride);
        for b in chunk {
            let _ = write!(out, "{:02x} ", b);
        }
        out.push('\n');
    }

    push_offset(&mut out, bytes.len());
    out.push('\n');
    out
}

fn push_offset(out: &mut String, offset: usize) {
    let _ = write!(out, "{:05x} ", offset);
}
