use std::fmt;
use std::str::FromStr;

use base64::Engine;
use thiserror::Error;

/// Inline media in the form `data:<type>/<subtype>;base64,<payload>`.
///
/// Holds the decoded bytes; `Display` re-encodes with the standard alphabet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUri {
    mime_type: String,
    bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DataUriError {
    #[error("expected a 'data:' URI")]
    MissingScheme,
    #[error("missing ',' between header and payload")]
    MissingPayload,
    #[error("media type '{0}' is not of the form type/subtype")]
    InvalidMediaType(String),
    #[error("media type '{0}' is not an image")]
    NotAnImage(String),
    #[error("image type '{0}' is not supported (use jpeg, png, gif or webp)")]
    UnsupportedImage(String),
    #[error("payload must be marked ';base64'")]
    NotBase64,
    #[error("payload is empty")]
    EmptyPayload,
    #[error("payload is not valid base64: {0}")]
    Decode(String),
}

/// Image types a model request can carry.
pub const SUPPORTED_IMAGE_TYPES: &[&str] =
    &["image/jpeg", "image/jpg", "image/png", "image/gif", "image/webp"];

impl DataUri {
    /// Parse a data URI. Nothing is repaired: whitespace, missing markers or
    /// bad padding are all rejected.
    pub fn parse(input: &str) -> Result<Self, DataUriError> {
        let rest = input
            .strip_prefix("data:")
            .ok_or(DataUriError::MissingScheme)?;
        let (header, payload) = rest.split_once(',').ok_or(DataUriError::MissingPayload)?;

        let mut params = header.split(';');
        let mime_type = params.next().unwrap_or_default();
        if params.last() != Some("base64") {
            return Err(DataUriError::NotBase64);
        }
        if !is_media_type(mime_type) {
            return Err(DataUriError::InvalidMediaType(mime_type.to_string()));
        }
        if payload.is_empty() {
            return Err(DataUriError::EmptyPayload);
        }

        let bytes = base64::engine::general_purpose::STANDARD
            .decode(payload)
            .map_err(|e| DataUriError::Decode(e.to_string()))?;

        Ok(Self {
            mime_type: mime_type.to_ascii_lowercase(),
            bytes,
        })
    }

    /// Parse and additionally require one of [`SUPPORTED_IMAGE_TYPES`].
    pub fn parse_image(input: &str) -> Result<Self, DataUriError> {
        let uri = Self::parse(input)?;
        if !uri.is_image() {
            return Err(DataUriError::NotAnImage(uri.mime_type));
        }
        if !SUPPORTED_IMAGE_TYPES.contains(&uri.mime_type.as_str()) {
            return Err(DataUriError::UnsupportedImage(uri.mime_type));
        }
        Ok(uri)
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }

    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.bytes)
    }
}

fn is_media_type(s: &str) -> bool {
    let Some((ty, sub)) = s.split_once('/') else {
        return false;
    };
    let token = |part: &str| {
        !part.is_empty()
            && part
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || "!#$&-^_.+".contains(c))
    };
    token(ty) && token(sub)
}

impl fmt::Display for DataUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "data:{};base64,{}", self.mime_type, self.to_base64())
    }
}

impl FromStr for DataUri {
    type Err = DataUriError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
