use tokio::io::AsyncRead;

use crate::common::buffer::ReadBuffer;
use crate::common::function::FunctionCode;
use crate::error::RequestError;
use crate::types::UnitId;

pub(crate) mod constants {
    /// Maximum length of the ADU (function code + data)
    pub(crate) const MAX_ADU_LENGTH: usize = 253;
}

/// Transaction identifier from the MBAP header, echoed in the reply
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub(crate) struct TxId {
    value: u16,
}

impl TxId {
    pub(crate) fn new(value: u16) -> Self {
        TxId { value }
    }

    pub(crate) fn to_u16(self) -> u16 {
        self.value
    }
}

impl std::fmt::Display for TxId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#06X}", self.value)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) struct FrameHeader {
    pub(crate) unit_id: UnitId,
    pub(crate) tx_id: TxId,
}

impl FrameHeader {
    pub(crate) fn new(unit_id: UnitId, tx_id: TxId) -> Self {
        FrameHeader { unit_id, tx_id }
    }
}

/// Function code field of a reply frame. Exception replies set the high bit
/// of the code; unknown codes are echoed with the high bit set as well.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum FunctionField {
    Valid(FunctionCode),
    Exception(FunctionCode),
    UnknownFunction(u8),
}

impl FunctionField {
    pub(crate) fn get_value(self) -> u8 {
        match self {
            FunctionField::Valid(fc) => fc.get_value(),
            FunctionField::Exception(fc) => fc.get_value() | 0x80,
            FunctionField::UnknownFunction(value) => value | 0x80,
        }
    }
}

/// One received ADU: header plus a fixed-capacity payload buffer
pub(crate) struct Frame {
    pub(crate) header: FrameHeader,
    length: usize,
    adu: [u8; constants::MAX_ADU_LENGTH],
}

impl Frame {
    pub(crate) fn new(header: FrameHeader) -> Frame {
        Frame {
            header,
            length: 0,
            adu: [0; constants::MAX_ADU_LENGTH],
        }
    }

    pub(crate) fn set(&mut self, src: &[u8]) -> bool {
        if src.len() > self.adu.len() {
            return false;
        }

        self.adu[0..src.len()].copy_from_slice(src);
        self.length = src.len();
        true
    }

    pub(crate) fn payload(&self) -> &[u8] {
        &self.adu[0..self.length]
    }
}

/// Defines an interface for parsing complete frames out of a byte stream
pub(crate) trait FrameParser {
    fn max_frame_size(&self) -> usize;

    /// Parse bytes using the provided buffer. Advancing the buffer always
    /// implies that the bytes are consumed and can be discarded.
    ///
    /// Err implies the input data is invalid
    /// Ok(None) implies that more data is required to complete parsing
    /// Ok(Some(..)) will contain a fully parsed frame and will advance the buffer appropriately
    fn parse(&mut self, buffer: &mut ReadBuffer) -> Result<Option<Frame>, RequestError>;
}

pub(crate) struct FramedReader<T>
where
    T: FrameParser,
{
    parser: T,
    buffer: ReadBuffer,
}

impl<T: FrameParser> FramedReader<T> {
    pub(crate) fn new(parser: T) -> Self {
        let size = parser.max_frame_size();
        Self {
            parser,
            buffer: ReadBuffer::new(size),
        }
    }

    pub(crate) async fn next_frame<R>(&mut self, io: &mut R) -> Result<Frame, RequestError>
    where
        R: AsyncRead + Unpin,
    {
        loop {
            match self.parser.parse(&mut self.buffer)? {
                Some(frame) => return Ok(frame),
                None => {
                    self.buffer.read_some(io).await?;
                }
            }
        }
    }
}
