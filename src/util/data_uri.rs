use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use thiserror::Error;

/// Errors produced while decoding a `data:` URI.
#[derive(Debug, Error)]
pub enum DataUriError {
    #[error("Not a data URI")]
    MissingScheme,

    #[error("Data URI has no payload separator")]
    MissingComma,

    /// Only base64 payloads are produced by the writer, so only those are read back.
    #[error("Data URI payload is not base64 encoded")]
    NotBase64,

    #[error("Failed to decode base64 payload: {0}")]
    Decode(#[from] base64::DecodeError),
}

/// Encodes raw bytes as `data:<mime>;base64,<payload>`.
pub fn encode_data_uri(mime: &str, data: &[u8]) -> String {
    format!("data:{};base64,{}", mime, STANDARD.encode(data))
}

/// Decodes a base64 `data:` URI into its MIME type and bytes.
///
/// An empty MIME type falls back to `application/octet-stream`.
pub fn decode_data_uri(uri: &str) -> Result<(String, Vec<u8>), DataUriError> {
    let rest = uri
        .trim()
        .strip_prefix("data:")
        .ok_or(DataUriError::MissingScheme)?;
    let (header, payload) = rest.split_once(',').ok_or(DataUriError::MissingComma)?;
    let mime = header
        .strip_suffix(";base64")
        .ok_or(DataUriError::NotBase64)?;

    let mime = if mime.is_empty() {
        "application/octet-stream".to_owned()
    } else {
        mime.to_owned()
    };

    Ok((mime, STANDARD.decode(payload)?))
}
