//! PLY encoding.

use std::io::Write;

use super::header::{BINARY_RECORD_SIZE, PlyFormat, render_header};
use crate::error::PlyError;
use crate::point::Point;

/// Writes a complete PLY document for `points` to `writer`.
///
/// Coordinates are narrowed to `f32` to match the declared `float` properties.
///
/// # Errors
///
/// Returns [`PlyError::EmptyInput`] when `points` is empty (nothing is
/// written), or [`PlyError::Io`] if the writer fails.
pub fn write_ply<W: Write>(
    writer: &mut W,
    points: &[Point],
    format: PlyFormat,
) -> Result<(), PlyError> {
    if points.is_empty() {
        return Err(PlyError::EmptyInput);
    }

    writer.write_all(render_header(format, points.len()).as_bytes())?;
    match format {
        PlyFormat::Ascii => {
            for p in points {
                writeln!(
                    writer,
                    "{} {} {} {} {} {}",
                    narrow(p.x),
                    narrow(p.y),
                    narrow(p.z),
                    p.r,
                    p.g,
                    p.b
                )?;
            }
        }
        PlyFormat::BinaryLittleEndian => {
            let mut record = [0u8; BINARY_RECORD_SIZE];
            for p in points {
                record[0..4].copy_from_slice(&narrow(p.x).to_le_bytes());
                record[4..8].copy_from_slice(&narrow(p.y).to_le_bytes());
                record[8..12].copy_from_slice(&narrow(p.z).to_le_bytes());
                record[12] = p.r;
                record[13] = p.g;
                record[14] = p.b;
                writer.write_all(&record)?;
            }
        }
    }
    Ok(())
}

/// Encodes `points` as an ASCII PLY document.
///
/// # Errors
///
/// Returns [`PlyError::EmptyInput`] when `points` is empty.
pub fn encode_ascii(points: &[Point]) -> Result<String, PlyError> {
    let bytes = encode(points, PlyFormat::Ascii)?;
    // Header and body are built from ASCII tokens only.
    String::from_utf8(bytes).map_err(|e| PlyError::InvalidBody(e.to_string()))
}

/// Encodes `points` as a binary little-endian PLY document.
///
/// # Errors
///
/// Returns [`PlyError::EmptyInput`] when `points` is empty.
pub fn encode_binary(points: &[Point]) -> Result<Vec<u8>, PlyError> {
    encode(points, PlyFormat::BinaryLittleEndian)
}

/// Encodes `points` in the requested format.
///
/// # Errors
///
/// Returns [`PlyError::EmptyInput`] when `points` is empty.
pub fn encode(points: &[Point], format: PlyFormat) -> Result<Vec<u8>, PlyError> {
    let body_hint = match format {
        PlyFormat::Ascii => points.len() * 48,
        PlyFormat::BinaryLittleEndian => points.len() * BINARY_RECORD_SIZE,
    };
    let mut out = Vec::with_capacity(256 + body_hint);
    write_ply(&mut out, points, format)?;
    Ok(out)
}

#[allow(clippy::cast_possible_truncation)]
fn narrow(value: f64) -> f32 {
    value as f32
}
