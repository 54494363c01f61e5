//! Frame encoding and blocking stream framing.
//!
//! A frame is a [`Header`] followed by exactly `payload_len` opaque bytes.
//! Nothing here looks inside the payload.

use std::io::{ErrorKind, Read, Write};

use keyrelay_core::ClientId;

use crate::MAX_PAYLOAD_SIZE;
use crate::error::{ProtocolError, ProtocolResult};
use crate::header::{HEADER_SIZE, Header, RequestCode, ResponseCode};

/// One complete header + payload unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub client_id: ClientId,
    pub version: u8,
    pub code: u16,
    pub payload: Vec<u8>,
}

impl Frame {
    /// Builds a request frame from a known request code.
    pub fn request(
        client_id: ClientId,
        version: u8,
        code: RequestCode,
        payload: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            client_id,
            version,
            code: code.as_u16(),
            payload: payload.into(),
        }
    }

    /// Builds a response frame. The client id field is reserved as zero.
    pub fn response(version: u8, code: ResponseCode, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            client_id: ClientId::ZERO,
            version,
            code: code.as_u16(),
            payload: payload.into(),
        }
    }

    /// Builds the generic 9000 error response with an empty payload.
    pub fn error(version: u8) -> Self {
        Self::response(version, ResponseCode::Error, Vec::new())
    }

    /// Returns the header describing this frame.
    ///
    /// Payloads longer than `u32::MAX` cannot be described and are rejected
    /// by [`Frame::encode`] before this matters.
    pub fn header(&self) -> Header {
        Header {
            client_id: self.client_id,
            version: self.version,
            code: self.code,
            payload_len: self.payload.len() as u32,
        }
    }

    /// Interprets the code as a response code.
    pub fn response_code(&self) -> ProtocolResult<ResponseCode> {
        ResponseCode::try_from(self.code)
    }

    /// Encodes the frame to `header || payload`.
    ///
    /// Fails only if the payload length does not fit the 32-bit length field.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        if u32::try_from(self.payload.len()).is_err() {
            return Err(ProtocolError::PayloadTooLarge {
                size: u32::MAX,
                max: u32::MAX,
            });
        }
        let mut buf = Vec::with_capacity(HEADER_SIZE + self.payload.len());
        buf.extend_from_slice(&self.header().encode());
        buf.extend_from_slice(&self.payload);
        Ok(buf)
    }

    /// Decodes one frame from the start of `data`.
    ///
    /// Bytes after the declared payload are ignored. No size limit applies
    /// since the whole frame is already in memory.
    pub fn decode(data: &[u8]) -> ProtocolResult<Self> {
        let header_bytes: &[u8; HEADER_SIZE] = data
            .get(..HEADER_SIZE)
            .and_then(|slice| slice.try_into().ok())
            .ok_or(ProtocolError::Incomplete {
                expected: HEADER_SIZE,
                received: data.len(),
            })?;
        let header = Header::decode(header_bytes);
        let len = header.payload_len as usize;

        let payload = data
            .get(HEADER_SIZE..HEADER_SIZE + len)
            .ok_or(ProtocolError::Incomplete {
                expected: HEADER_SIZE + len,
                received: data.len(),
            })?;

        Ok(Self::from_parts(header, payload.to_vec()))
    }

    /// Assembles a frame from a decoded header and its payload.
    pub fn from_parts(header: Header, payload: Vec<u8>) -> Self {
        Self {
            client_id: header.client_id,
            version: header.version,
            code: header.code,
            payload,
        }
    }
}

/// Validates a declared payload length against `max` before a buffer of
/// that size is allocated.
pub fn check_declared_len(len: u32, max: u32) -> ProtocolResult<usize> {
    if len > max {
        return Err(ProtocolError::PayloadTooLarge { size: len, max });
    }
    Ok(len as usize)
}

/// Reads frames from a byte stream.
pub struct FrameReader<R> {
    reader: R,
    max_payload: u32,
}

impl<R: Read> FrameReader<R> {
    /// Creates a new FrameReader limited to [`MAX_PAYLOAD_SIZE`] payloads.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            max_payload: MAX_PAYLOAD_SIZE,
        }
    }

    /// Builder: set the largest payload length accepted.
    pub fn with_max_payload(mut self, max: u32) -> Self {
        self.max_payload = max;
        self
    }

    /// Reads a single frame, blocking until it is complete.
    ///
    /// Returns `Ok(None)` if the stream ends before the first header byte.
    /// A stream that ends anywhere else is [`ProtocolError::Incomplete`].
    pub fn read_frame(&mut self) -> ProtocolResult<Option<Frame>> {
        let mut header_buf = [0u8; HEADER_SIZE];
        let got = read_full(&mut self.reader, &mut header_buf)?;
        if got == 0 {
            return Ok(None);
        }
        if got < HEADER_SIZE {
            return Err(ProtocolError::Incomplete {
                expected: HEADER_SIZE,
                received: got,
            });
        }

        let header = Header::decode(&header_buf);
        let len = check_declared_len(header.payload_len, self.max_payload)?;

        let mut payload = vec![0u8; len];
        let got = read_full(&mut self.reader, &mut payload)?;
        if got < len {
            return Err(ProtocolError::Incomplete {
                expected: len,
                received: got,
            });
        }

        Ok(Some(Frame::from_parts(header, payload)))
    }

    /// Unwraps this FrameReader, returning the underlying reader.
    pub fn into_inner(self) -> R {
        self.reader
    }
}

/// Fills `buf` as far as the stream allows and returns the byte count.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> ProtocolResult<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}

/// Writes frames to a byte stream.
pub struct FrameWriter<W> {
    writer: W,
}

impl<W: Write> FrameWriter<W> {
    /// Creates a new FrameWriter wrapping the given writer.
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Writes a single frame.
    pub fn write_frame(&mut self, frame: &Frame) -> ProtocolResult<()> {
        let data = frame.encode()?;
        self.writer.write_all(&data)?;
        Ok(())
    }

    /// Flushes the underlying writer.
    pub fn flush(&mut self) -> ProtocolResult<()> {
        self.writer.flush()?;
        Ok(())
    }

    /// Unwraps this FrameWriter, returning the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn response_has_zero_client_id() {
        let frame = Frame::response(1, ResponseCode::Registered, vec![9u8; 16]);
        let bytes = frame.encode().unwrap();
        assert_eq!(bytes.len(), HEADER_SIZE + 16);
        assert!(bytes[..16].iter().all(|&b| b == 0));
        assert_eq!(bytes[16], 1);
        assert_eq!(u16::from_le_bytes([bytes[17], bytes[18]]), 2100);
        assert_eq!(
            u32::from_le_bytes([bytes[19], bytes[20], bytes[21], bytes[22]]),
            16
        );
        assert_eq!(&bytes[HEADER_SIZE..], &[9u8; 16]);
    }

    #[test]
    fn error_frame_is_empty() {
        let frame = Frame::error(3);
        assert_eq!(frame.code, 9000);
        assert_eq!(frame.version, 3);
        assert!(frame.payload.is_empty());
        assert_eq!(frame.encode().unwrap().len(), HEADER_SIZE);
    }

    #[test]
    fn response_bytes_decode_as_request_layout() {
        let response = Frame::response(2, ResponseCode::MessageStored, b"payload".to_vec());
        let decoded = Frame::decode(&response.encode().unwrap()).unwrap();
        assert_eq!(decoded.version, 2);
        assert_eq!(decoded.code, 2103);
        assert_eq!(decoded.payload, b"payload");
        assert_eq!(decoded.client_id, ClientId::ZERO);
    }

    #[test]
    fn decode_short_header() {
        let result = Frame::decode(&[0u8; 10]);
        assert!(matches!(
            result,
            Err(ProtocolError::Incomplete {
                expected: HEADER_SIZE,
                received: 10
            })
        ));
    }

    #[test]
    fn decode_short_payload() {
        let frame = Frame::request(ClientId::ZERO, 1, RequestCode::GetPublicKey, vec![1u8; 16]);
        let mut bytes = frame.encode().unwrap();
        bytes.truncate(HEADER_SIZE + 4);
        assert!(matches!(
            Frame::decode(&bytes),
            Err(ProtocolError::Incomplete { .. })
        ));
    }

    #[test]
    fn reader_rejects_oversized_declared_length() {
        let header = Header {
            client_id: ClientId::ZERO,
            version: 1,
            code: 603,
            payload_len: 1024,
        };
        let mut reader =
            FrameReader::new(Cursor::new(header.encode().to_vec())).with_max_payload(512);
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::PayloadTooLarge {
                size: 1024,
                max: 512
            }
        ));
    }

    #[test]
    fn declared_len_limit() {
        assert_eq!(check_declared_len(10, MAX_PAYLOAD_SIZE).unwrap(), 10);
        assert!(check_declared_len(MAX_PAYLOAD_SIZE + 1, MAX_PAYLOAD_SIZE).is_err());
    }

    #[test]
    fn reader_returns_none_on_clean_eof() {
        let mut reader = FrameReader::new(Cursor::new(Vec::new()));
        assert!(reader.read_frame().unwrap().is_none());
    }

    #[test]
    fn reader_rejects_truncated_header() {
        let mut reader = FrameReader::new(Cursor::new(vec![0u8; 5]));
        let err = reader.read_frame().unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(
            err,
            ProtocolError::Incomplete {
                expected: HEADER_SIZE,
                received: 5
            }
        ));
    }

    #[test]
    fn reader_rejects_truncated_payload() {
        let frame = Frame::request(ClientId::ZERO, 1, RequestCode::Register, vec![0u8; 415]);
        let mut bytes = frame.encode().unwrap();
        bytes.truncate(HEADER_SIZE + 100);
        let mut reader = FrameReader::new(Cursor::new(bytes));
        assert!(matches!(
            reader.read_frame(),
            Err(ProtocolError::Incomplete {
                expected: 415,
                received: 100
            })
        ));
    }

    #[test]
    fn reader_handles_empty_payload() {
        let frame = Frame::request(ClientId::generate(), 1, RequestCode::ListUsers, Vec::new());
        let mut reader = FrameReader::new(Cursor::new(frame.encode().unwrap()));
        assert_eq!(reader.read_frame().unwrap(), Some(frame));
        assert!(reader.read_frame().unwrap().is_none());
    }

    #[test]
    fn writer_then_reader_preserves_order() {
        let frames = vec![
            Frame::request(ClientId::ZERO, 1, RequestCode::Register, vec![1u8; 415]),
            Frame::request(ClientId::generate(), 1, RequestCode::FetchMessages, Vec::new()),
            Frame {
                client_id: ClientId::ZERO,
                version: 1,
                code: 999,
                payload: Vec::new(),
            },
        ];

        let mut buffer = Vec::new();
        {
            let mut writer = FrameWriter::new(&mut buffer);
            for frame in &frames {
                writer.write_frame(frame).unwrap();
            }
            writer.flush().unwrap();
        }

        let mut reader = FrameReader::new(Cursor::new(buffer));
        for expected in &frames {
            assert_eq!(reader.read_frame().unwrap().as_ref(), Some(expected));
        }
        assert!(reader.read_frame().unwrap().is_none());
    }
}
