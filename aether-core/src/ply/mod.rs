//! PointCloud codec: PLY serialization of coloured point sequences.
//!
//! Two interchangeable encodings share one header schema:
//!
//! - **ASCII**: one line per vertex, `x y z r g b`, floats in plain decimal
//!   notation independent of locale.
//! - **Binary little-endian**: one 15-byte record per vertex (three `f32`,
//!   three `u8`), no padding and no delimiters.
//!
//! The writer refuses empty input with [`PlyError::EmptyInput`](crate::error::PlyError::EmptyInput);
//! zero-vertex files confuse several viewers.

mod header;
mod reader;
mod writer;

pub use header::{
    BINARY_RECORD_SIZE, HEADER_COMMENT, ParsedHeader, PlyFormat, VERTEX_PROPERTIES,
    parse_header, render_header,
};
pub use reader::decode;
pub use writer::{encode, encode_ascii, encode_binary, write_ply};
