//! `multipart/x-mixed-replace` framing.

/// Boundary token separating parts.
pub const BOUNDARY: &str = "frame";
/// Response content type announcing the boundary above.
pub const CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

/// One ready-to-send multipart unit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameChunk(Vec<u8>);

impl FrameChunk {
    /// Wrap JPEG bytes: `--frame\r\nContent-Type: image/jpeg\r\n\r\n<jpeg>\r\n`.
    pub fn jpeg(jpeg: &[u8]) -> Self {
        Self::part("image/jpeg", jpeg)
    }

    /// A plain-text diagnostic part, used when a session cannot produce frames.
    pub fn text(message: &str) -> Self {
        Self::part("text/plain; charset=utf-8", message.as_bytes())
    }

    fn part(content_type: &str, body: &[u8]) -> Self {
        let mut payload = Vec::with_capacity(body.len() + content_type.len() + 32);
        payload.extend_from_slice(b"--");
        payload.extend_from_slice(BOUNDARY.as_bytes());
        payload.extend_from_slice(b"\r\n");
        payload.extend_from_slice(b"Content-Type: ");
        payload.extend_from_slice(content_type.as_bytes());
        payload.extend_from_slice(b"\r\n\r\n");
        payload.extend_from_slice(body);
        payload.extend_from_slice(b"\r\n");
        Self(payload)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
