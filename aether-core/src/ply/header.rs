//! PLY header shared by the ASCII and binary encodings.
//!
//! Layout (one line each, `\n` terminated):
//! - `ply`
//! - `format <ascii|binary_little_endian> 1.0`
//! - `comment AetherScan Point Cloud Export`
//! - `element vertex <N>`
//! - `property float x|y|z`
//! - `property uchar red|green|blue`
//! - `end_header`

use std::fmt;

use crate::error::PlyError;

/// Comment line written into every exported header.
pub const HEADER_COMMENT: &str = "AetherScan Point Cloud Export";

/// Bytes per vertex in the binary body: three `f32` then three `u8`.
pub const BINARY_RECORD_SIZE: usize = 3 * 4 + 3;

/// Properties in the order they appear in the header and in every record.
pub const VERTEX_PROPERTIES: [(&str, &str); 6] = [
    ("float", "x"),
    ("float", "y"),
    ("float", "z"),
    ("uchar", "red"),
    ("uchar", "green"),
    ("uchar", "blue"),
];

/// Body encoding declared by the `format` line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlyFormat {
    /// One whitespace-separated line per vertex.
    #[default]
    Ascii,
    /// Densely packed little-endian records.
    BinaryLittleEndian,
}

impl PlyFormat {
    /// Token used on the `format` line.
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Ascii => "ascii",
            Self::BinaryLittleEndian => "binary_little_endian",
        }
    }

    fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "ascii" => Some(Self::Ascii),
            "binary_little_endian" => Some(Self::BinaryLittleEndian),
            _ => None,
        }
    }
}

impl fmt::Display for PlyFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Renders the header for `vertex_count` vertices.
#[must_use]
pub fn render_header(format: PlyFormat, vertex_count: usize) -> String {
    let mut header = String::with_capacity(256);
    header.push_str("ply\n");
    header.push_str(&format!("format {} 1.0\n", format.tag()));
    header.push_str(&format!("comment {HEADER_COMMENT}\n"));
    header.push_str(&format!("element vertex {vertex_count}\n"));
    for (ty, name) in VERTEX_PROPERTIES {
        header.push_str(&format!("property {ty} {name}\n"));
    }
    header.push_str("end_header\n");
    header
}

/// Parsed header information needed to read the body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedHeader {
    /// Declared encoding
    pub format: PlyFormat,
    /// Declared vertex count
    pub vertex_count: usize,
    /// Offset of the first body byte
    pub body_offset: usize,
}

/// Parses and validates a header at the start of `bytes`.
///
/// Comment and `obj_info` lines are skipped. Only the vertex layout written by
/// [`render_header`] is accepted.
///
/// # Errors
///
/// Returns [`PlyError::InvalidHeader`] for a missing magic line, unknown
/// format, unexpected element or property declarations, or a missing
/// `end_header`.
pub fn parse_header(bytes: &[u8]) -> Result<ParsedHeader, PlyError> {
    let mut offset = 0;
    let mut format = None;
    let mut vertex_count = None;
    let mut properties = Vec::with_capacity(VERTEX_PROPERTIES.len());
    let mut first = true;

    loop {
        let rest = &bytes[offset..];
        let Some(newline) = rest.iter().position(|&b| b == b'\n') else {
            return Err(PlyError::InvalidHeader("missing end_header".to_string()));
        };
        let line = std::str::from_utf8(&rest[..newline])
            .map_err(|_| PlyError::InvalidHeader("header is not valid UTF-8".to_string()))?
            .trim_end_matches('\r')
            .trim();
        offset += newline + 1;

        if first {
            if line != "ply" {
                return Err(PlyError::InvalidHeader(format!(
                    "expected 'ply' magic line, found '{line}'"
                )));
            }
            first = false;
            continue;
        }

        let mut tokens = line.split_whitespace();
        match tokens.next() {
            Some("format") => {
                let tag = tokens.next().unwrap_or_default();
                format = Some(PlyFormat::from_tag(tag).ok_or_else(|| {
                    PlyError::InvalidHeader(format!("unsupported format '{tag}'"))
                })?);
            }
            Some("comment" | "obj_info") | None => {}
            Some("element") => {
                let name = tokens.next().unwrap_or_default();
                if name != "vertex" || vertex_count.is_some() {
                    return Err(PlyError::InvalidHeader(format!(
                        "unsupported element '{name}'"
                    )));
                }
                let count = tokens.next().unwrap_or_default();
                vertex_count = Some(count.parse::<usize>().map_err(|_| {
                    PlyError::InvalidHeader(format!("invalid vertex count '{count}'"))
                })?);
            }
            Some("property") => {
                let ty = tokens.next().unwrap_or_default().to_string();
                let name = tokens.next().unwrap_or_default().to_string();
                properties.push((ty, name));
            }
            Some("end_header") => break,
            Some(other) => {
                return Err(PlyError::InvalidHeader(format!(
                    "unexpected header keyword '{other}'"
                )));
            }
        }
    }

    let format = format.ok_or_else(|| PlyError::InvalidHeader("missing format line".into()))?;
    let vertex_count =
        vertex_count.ok_or_else(|| PlyError::InvalidHeader("missing vertex element".into()))?;
    let layout_matches = properties.len() == VERTEX_PROPERTIES.len()
        && properties
            .iter()
            .zip(VERTEX_PROPERTIES)
            .all(|((ty, name), (want_ty, want_name))| ty == want_ty && name == want_name);
    if !layout_matches {
        return Err(PlyError::InvalidHeader(
            "vertex properties must be float x,y,z then uchar red,green,blue".to_string(),
        ));
    }

    Ok(ParsedHeader {
        format,
        vertex_count,
        body_offset: offset,
    })
}
