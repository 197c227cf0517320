use thiserror::Error;

pub type ContentResult<T> = Result<T, ContentError>;

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("not a lodestone binary content stream (bad header)")]
    BadHeader,
    #[error("unexpected end of content: needed {needed} more bytes")]
    UnexpectedEof { needed: usize },
    #[error("unknown value tag {0:#04x}")]
    UnknownTag(u8),
    #[error("reference to unknown object #{0}")]
    DanglingReference(u32),
    #[error("content nesting exceeds {0} levels")]
    TooDeep(usize),
    #[error("{0} trailing bytes after content")]
    TrailingBytes(usize),
    #[error("unknown content type `{0}`")]
    UnknownType(String),
    #[error("unknown codec `{0}` (expected binary or text)")]
    UnknownCodec(String),
    #[error("field name `{0}` is reserved in the structured form")]
    ReservedField(String),
    #[error("invalid utf8 in string: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
    #[error("invalid bytes literal: {0}")]
    InvalidBytes(#[from] hex::FromHexError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
