//! PLY decoding for documents in the layout produced by [`super::write_ply`].
//!
//! Used to read backend output and to verify exported documents.

use super::header::{BINARY_RECORD_SIZE, PlyFormat, parse_header};
use crate::error::PlyError;
use crate::point::Point;

/// Shortest possible ASCII vertex line: `0 0 0 0 0 0\n`.
const MIN_ASCII_RECORD: usize = 12;

/// Decodes a PLY document into points.
///
/// Zero-vertex documents decode to an empty vector; only the writer refuses
/// them.
///
/// # Errors
///
/// Returns [`PlyError::InvalidHeader`] or [`PlyError::InvalidBody`] when the
/// document does not match the supported layout.
pub fn decode(bytes: &[u8]) -> Result<Vec<Point>, PlyError> {
    let header = parse_header(bytes)?;
    let body = &bytes[header.body_offset..];
    match header.format {
        PlyFormat::Ascii => decode_ascii_body(body, header.vertex_count),
        PlyFormat::BinaryLittleEndian => decode_binary_body(body, header.vertex_count),
    }
}

fn decode_ascii_body(body: &[u8], vertex_count: usize) -> Result<Vec<Point>, PlyError> {
    let text = std::str::from_utf8(body)
        .map_err(|_| PlyError::InvalidBody("ASCII body is not valid UTF-8".to_string()))?;
    // The declared count is untrusted; never reserve more than the body can hold.
    let mut points = Vec::with_capacity(vertex_count.min(body.len() / MIN_ASCII_RECORD));

    for (index, line) in text.lines().filter(|l| !l.trim().is_empty()).enumerate() {
        if index >= vertex_count {
            return Err(PlyError::InvalidBody(format!(
                "more vertex lines than the declared {vertex_count}"
            )));
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        let [x, y, z, r, g, b] = fields.as_slice() else {
            return Err(PlyError::InvalidBody(format!(
                "vertex {index}: expected 6 fields, found {}",
                fields.len()
            )));
        };
        points.push(Point::new(
            parse_coord(x, index)?,
            parse_coord(y, index)?,
            parse_coord(z, index)?,
            parse_channel(r, index)?,
            parse_channel(g, index)?,
            parse_channel(b, index)?,
        ));
    }

    if points.len() != vertex_count {
        return Err(PlyError::InvalidBody(format!(
            "declared {vertex_count} vertices, found {}",
            points.len()
        )));
    }
    Ok(points)
}

fn decode_binary_body(body: &[u8], vertex_count: usize) -> Result<Vec<Point>, PlyError> {
    let Some(expected) = vertex_count.checked_mul(BINARY_RECORD_SIZE) else {
        return Err(PlyError::InvalidBody(format!(
            "declared vertex count {vertex_count} is too large"
        )));
    };
    if body.len() != expected {
        return Err(PlyError::InvalidBody(format!(
            "binary body is {} bytes, expected {expected}",
            body.len()
        )));
    }

    Ok(body
        .chunks_exact(BINARY_RECORD_SIZE)
        .map(|rec| {
            let coord = |at: usize| {
                f64::from(f32::from_le_bytes([
                    rec[at],
                    rec[at + 1],
                    rec[at + 2],
                    rec[at + 3],
                ]))
            };
            Point::new(coord(0), coord(4), coord(8), rec[12], rec[13], rec[14])
        })
        .collect())
}

fn parse_coord(field: &str, index: usize) -> Result<f64, PlyError> {
    field
        .parse::<f32>()
        .map(f64::from)
        .map_err(|_| PlyError::InvalidBody(format!("vertex {index}: invalid float '{field}'")))
}

fn parse_channel(field: &str, index: usize) -> Result<u8, PlyError> {
    field
        .parse::<u8>()
        .map_err(|_| PlyError::InvalidBody(format!("vertex {index}: invalid uchar '{field}'")))
}
