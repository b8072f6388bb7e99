use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use mime::Mime;

/// Media collaborator failures.
#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("image payload is not a base64 data URI")]
    MalformedPayload,
    #[error("unsupported media type `{0}`")]
    UnsupportedType(String),
    #[error("media reference not found")]
    NotFound,
    #[error("media backend unavailable: {0}")]
    Unavailable(String),
}

/// Decoded image bytes handed to the media collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaPayload {
    pub content_type: Mime,
    pub bytes: Vec<u8>,
}

/// Stores image payloads and hands back stable reference strings. The
/// engine never interprets the bytes behind a reference; it stores and
/// forwards the string.
pub trait MediaStore: Send + Sync {
    fn store(&self, payload: &MediaPayload) -> Result<String, MediaError>;
    fn open(&self, reference: &str) -> Result<MediaPayload, MediaError>;
}

/// Decode an inline `data:image/...;base64,...` payload as clients upload
/// them. Only image types are accepted.
pub fn decode_data_uri(raw: &str) -> Result<MediaPayload, MediaError> {
    let rest = raw
        .trim()
        .strip_prefix("data:")
        .ok_or(MediaError::MalformedPayload)?;
    let (meta, data) = rest.split_once(',').ok_or(MediaError::MalformedPayload)?;
    let meta = meta
        .strip_suffix(";base64")
        .ok_or(MediaError::MalformedPayload)?;

    let content_type: Mime = meta
        .parse()
        .map_err(|_| MediaError::UnsupportedType(meta.to_string()))?;
    if content_type.type_() != mime::IMAGE {
        return Err(MediaError::UnsupportedType(content_type.to_string()));
    }

    let bytes = STANDARD
        .decode(data.trim())
        .map_err(|_| MediaError::MalformedPayload)?;

    Ok(MediaPayload {
        content_type,
        bytes,
    })
}
