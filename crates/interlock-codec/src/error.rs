use thiserror::Error;

/// Errors returned by wire framing encode/decode operations.
///
/// Decode errors mark a *rejected datagram*, never a fatal condition: UDP
/// delivers unsolicited and occasionally foreign traffic, and the receive
/// path discards what it cannot parse.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Buffer is shorter than the fixed binary header.
    #[error("truncated header: {0} bytes")]
    TruncatedHeader(usize),
    /// Declared payload length disagrees with the remaining buffer.
    #[error("payload length mismatch: declared {declared}, have {actual}")]
    LengthMismatch { declared: usize, actual: usize },
    /// Envelope or payload bytes are not the expected JSON object.
    #[error("invalid json: {0}")]
    InvalidJson(String),
    /// JSON parsed but matches no recognized envelope key shape.
    #[error("unrecognized envelope shape")]
    UnrecognizedShape,
    /// Signal kind does not fit the selected binary type field.
    #[error("kind {0} does not fit the u8 type field")]
    KindOutOfRange(u16),
    /// Every framing in the decode chain rejected the datagram.
    #[error("no framing matched")]
    NoFramingMatched,
}
