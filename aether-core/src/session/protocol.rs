//! JSON message envelope exchanged over the reconstruction socket.
//!
//! Every frame is one object discriminated by `type`:
//!
//! ```json
//! // Client → Server
//! {"type": "ping"}
//! {"type": "image_data", "data": "data:image/jpeg;base64,/9j/4AAQ...", "filename": "front.jpg"}
//! {"type": "upload_complete", "count": 12}
//!
//! // Server → Client
//! {"type": "pong"}
//! {"type": "image_received", "status": "saved", "filename": "front.jpg"}
//! {"type": "points", "data": [{"x": 0.1, "y": 0.2, "z": 0.3, "r": 255, "g": 0, "b": 17}]}
//! {"type": "reconstruction_complete", "total_points": 250, "synthetic": false}
//! {"type": "error", "message": "Insufficient images: 1 provided, minimum 2 required"}
//! ```

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use crate::error::SessionError;
use crate::point::Point;

/// Name used when the client omits one.
pub const DEFAULT_FILENAME: &str = "image";

/// Inbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Liveness probe
    Ping,
    /// One base64-encoded image
    ImageData {
        /// Base64 payload, optionally `data:<mime>;base64,`-prefixed
        data: String,
        /// Client-side file name
        #[serde(default = "default_filename")]
        filename: String,
    },
    /// End of the upload batch
    UploadComplete {
        /// Advisory image count; the server counts stored images itself
        #[serde(default)]
        count: Option<i64>,
    },
}

fn default_filename() -> String {
    DEFAULT_FILENAME.to_string()
}

impl ClientMessage {
    /// Parses one text frame.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Malformed`] for invalid JSON, a missing or
    /// unknown `type`, or fields of the wrong shape.
    pub fn parse(text: &str) -> Result<Self, SessionError> {
        let value: serde_json::Value = serde_json::from_str(text)
            .map_err(|e| SessionError::Malformed(format!("Invalid JSON: {e}")))?;

        let msg_type = value
            .get("type")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| SessionError::Malformed("Missing 'type' field".to_string()))?;

        match msg_type {
            "ping" | "image_data" | "upload_complete" => serde_json::from_value(value.clone())
                .map_err(|e| SessionError::Malformed(format!("Invalid {msg_type} message: {e}"))),
            other => Err(SessionError::Malformed(format!(
                "Unknown message type: {other}"
            ))),
        }
    }
}

/// Acknowledgement status for a stored image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageStatus {
    /// Written to session storage
    Saved,
    /// Accepted but not yet on disk
    Processing,
}

/// Outbound message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Reply to `ping`
    Pong,
    /// Image acknowledgement
    ImageReceived {
        /// Storage status
        status: ImageStatus,
        /// Name the client supplied
        filename: String,
    },
    /// In-band error; the session stays open
    Error {
        /// Human-readable cause
        message: String,
    },
    /// One chunk of the point cloud, in order
    Points {
        /// Points in this chunk
        data: Vec<Point>,
    },
    /// End of a reconstruction cycle
    ReconstructionComplete {
        /// Points streamed across all chunks of the cycle
        total_points: usize,
        /// True for the placeholder cloud sent when no images were uploaded
        synthetic: bool,
    },
}

impl ServerMessage {
    /// Error message carrying `cause`'s display text.
    pub fn error(cause: impl std::fmt::Display) -> Self {
        Self::Error {
            message: cause.to_string(),
        }
    }
}

/// Decodes an `image_data` payload, accepting a data-URL prefix.
///
/// # Errors
///
/// Returns the base64 decoder's error for invalid or empty payloads.
pub fn decode_image_payload(data: &str) -> Result<Vec<u8>, String> {
    let payload = data
        .split_once(";base64,")
        .map_or(data, |(_, rest)| rest)
        .trim();
    if payload.is_empty() {
        return Err("empty payload".to_string());
    }
    STANDARD.decode(payload).map_err(|e| e.to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_inbound_messages() {
        assert_eq!(ClientMessage::parse(r#"{"type":"ping"}"#).unwrap(), ClientMessage::Ping);
        assert_eq!(
            ClientMessage::parse(r#"{"type":"image_data","data":"AAEC","filename":"a.jpg"}"#)
                .unwrap(),
            ClientMessage::ImageData {
                data: "AAEC".to_string(),
                filename: "a.jpg".to_string(),
            }
        );
        assert_eq!(
            ClientMessage::parse(r#"{"type":"upload_complete","count":3}"#).unwrap(),
            ClientMessage::UploadComplete { count: Some(3) }
        );
    }

    #[test]
    fn test_optional_fields_default() {
        assert_eq!(
            ClientMessage::parse(r#"{"type":"image_data","data":"AAEC"}"#).unwrap(),
            ClientMessage::ImageData {
                data: "AAEC".to_string(),
                filename: DEFAULT_FILENAME.to_string(),
            }
        );
        assert_eq!(
            ClientMessage::parse(r#"{"type":"upload_complete"}"#).unwrap(),
            ClientMessage::UploadComplete { count: None }
        );
    }

    #[test]
    fn test_malformed_frames() {
        for (text, needle) in [
            ("not json", "Invalid JSON"),
            (r#"{"data":"x"}"#, "Missing 'type'"),
            (r#"{"type":"subscribe"}"#, "Unknown message type: subscribe"),
            (r#"{"type":"image_data"}"#, "Invalid image_data message"),
        ] {
            let err = ClientMessage::parse(text).unwrap_err();
            assert!(matches!(err, SessionError::Malformed(_)), "{text}");
            assert!(err.to_string().contains(needle), "{text}: {err}");
        }
    }

    #[test]
    fn test_outbound_wire_shape() {
        let json = serde_json::to_value(ServerMessage::ReconstructionComplete {
            total_points: 250,
            synthetic: false,
        })
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "reconstruction_complete", "total_points": 250, "synthetic": false})
        );

        let json = serde_json::to_value(ServerMessage::ImageReceived {
            status: ImageStatus::Saved,
            filename: "a.jpg".to_string(),
        })
        .unwrap();
        assert_eq!(json["status"], "saved");
        assert_eq!(serde_json::to_value(ServerMessage::Pong).unwrap()["type"], "pong");
    }

    #[test]
    fn test_payload_prefix_is_stripped() {
        assert_eq!(decode_image_payload("AAEC").unwrap(), vec![0, 1, 2]);
        assert_eq!(
            decode_image_payload("data:image/png;base64,AAEC").unwrap(),
            vec![0, 1, 2]
        );
        assert!(decode_image_payload("data:image/png;base64,").is_err());
        assert!(decode_image_payload("!!!").is_err());
    }
}
