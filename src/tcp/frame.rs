use crate::common::buffer::ReadBuffer;
use crate::common::cursor::WriteCursor;
use crate::common::frame::{Frame, FrameHeader, FrameParser, FunctionField, TxId};
use crate::common::traits::Serialize;
use crate::error::{FrameParseError, RequestError};
use crate::types::UnitId;

pub(crate) mod constants {
    pub(crate) const HEADER_LENGTH: usize = 7;
    pub(crate) const MAX_FRAME_LENGTH: usize =
        HEADER_LENGTH + crate::common::frame::constants::MAX_ADU_LENGTH;
    /// smallest length field that still describes a unit id and a function code
    pub(crate) const MIN_LENGTH_FIELD: usize = 2;
    /// cannot be more than the max ADU length + the unit identifier
    pub(crate) const MAX_LENGTH_FIELD: usize = crate::common::frame::constants::MAX_ADU_LENGTH + 1;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct MbapHeader {
    tx_id: TxId,
    len_field: u16,
    unit_id: UnitId,
}

#[derive(Clone, Copy)]
enum ParseState {
    Begin,
    // header and the ADU length
    Header(MbapHeader, usize),
}

/// Incremental parser for MBAP-framed streams
pub(crate) struct MbapParser {
    state: ParseState,
}

impl MbapParser {
    pub(crate) fn new() -> Self {
        Self {
            state: ParseState::Begin,
        }
    }

    // returns some header fields and the length of the ADU
    fn parse_header(buffer: &mut ReadBuffer) -> Result<(MbapHeader, usize), RequestError> {
        let tx_id = TxId::new(buffer.read_u16_be()?);
        let protocol_id = buffer.read_u16_be()?;
        let len_field = buffer.read_u16_be()?;
        let length = len_field as usize;
        let unit_id = UnitId::new(buffer.read_u8()?);

        if protocol_id != 0 {
            return Err(FrameParseError::UnknownProtocolId(protocol_id).into());
        }

        if length > constants::MAX_LENGTH_FIELD {
            return Err(
                FrameParseError::FrameLengthTooBig(length, constants::MAX_LENGTH_FIELD).into(),
            );
        }

        // the length field counts the unit identifier and at least a function code
        if length < constants::MIN_LENGTH_FIELD {
            return Err(FrameParseError::MbapLengthTooSmall(length).into());
        }

        let adu_length = length - 1;

        Ok((
            MbapHeader {
                tx_id,
                len_field,
                unit_id,
            },
            adu_length,
        ))
    }

    fn parse_body(
        header: &MbapHeader,
        adu_length: usize,
        buffer: &mut ReadBuffer,
    ) -> Result<Frame, RequestError> {
        let mut frame = Frame::new(FrameHeader::new(header.unit_id, header.tx_id));
        frame.set(buffer.read(adu_length)?);
        Ok(frame)
    }
}

impl FrameParser for MbapParser {
    fn max_frame_size(&self) -> usize {
        constants::MAX_FRAME_LENGTH
    }

    fn parse(&mut self, buffer: &mut ReadBuffer) -> Result<Option<Frame>, RequestError> {
        match self.state {
            ParseState::Header(header, adu_length) => {
                if buffer.len() < adu_length {
                    return Ok(None);
                }

                let frame = Self::parse_body(&header, adu_length, buffer)?;
                self.state = ParseState::Begin;

                tracing::trace!(
                    "MBAP RX - tx_id: {} unit: {} len: {}",
                    header.tx_id,
                    header.unit_id,
                    header.len_field
                );

                Ok(Some(frame))
            }
            ParseState::Begin => {
                if buffer.len() < constants::HEADER_LENGTH {
                    return Ok(None);
                }

                let (header, adu_length) = Self::parse_header(buffer)?;
                self.state = ParseState::Header(header, adu_length);
                self.parse(buffer)
            }
        }
    }
}

/// Formats reply frames into an internal buffer sized for the largest ADU
pub(crate) struct FrameWriter {
    buffer: [u8; constants::MAX_FRAME_LENGTH],
}

impl FrameWriter {
    pub(crate) fn new() -> Self {
        Self {
            buffer: [0; constants::MAX_FRAME_LENGTH],
        }
    }

    pub(crate) fn format(
        &mut self,
        header: FrameHeader,
        function: FunctionField,
        body: &dyn Serialize,
    ) -> Result<&[u8], RequestError> {
        let mut cursor = WriteCursor::new(self.buffer.as_mut());

        cursor.write_u16_be(header.tx_id.to_u16())?;
        cursor.write_u16_be(0)?; // protocol id
        let len_pos = cursor.position();
        cursor.skip(2)?; // the length is patched once the body is written
        cursor.write_u8(header.unit_id.value)?;

        let start_pdu = cursor.position();
        cursor.write_u8(function.get_value())?;
        body.serialize(&mut cursor)?;
        let end_pdu = cursor.position();

        // the length field includes the unit identifier
        let len_field = (end_pdu - start_pdu + 1) as u16;
        cursor.seek_to(len_pos)?;
        cursor.write_u16_be(len_field)?;

        tracing::trace!(
            "MBAP TX - tx_id: {} unit: {} len: {}",
            header.tx_id,
            header.unit_id,
            len_field
        );

        Ok(&self.buffer[..end_pdu])
    }
}

#[cfg(test)]
mod tests {
    use tokio_test::{block_on, io};

    use crate::common::frame::FramedReader;
    use crate::common::function::FunctionCode;
    use crate::error::InternalError;

    use super::*;

    //                            |   tx id  |  proto id |  length  | unit | fc | body      |
    const SIMPLE_FRAME: &[u8] = &[0x00, 0x07, 0x00, 0x00, 0x00, 0x04, 0x2A, 0x01, 0xCA, 0xFE];

    struct MockBody {
        body: &'static [u8],
    }

    impl Serialize for MockBody {
        fn serialize(&self, cursor: &mut WriteCursor) -> Result<(), InternalError> {
            for b in self.body {
                cursor.write_u8(*b)?;
            }
            Ok(())
        }
    }

    fn assert_equals_simple_frame(frame: &Frame) {
        assert_eq!(frame.header.tx_id, TxId::new(0x0007));
        assert_eq!(frame.header.unit_id, UnitId::new(0x2A));
        assert_eq!(frame.payload(), &[0x01, 0xCA, 0xFE]);
    }

    fn test_segmented_parse(split_at: usize) {
        let (f1, f2) = SIMPLE_FRAME.split_at(split_at);
        let mut io = io::Builder::new().read(f1).read(f2).build();
        let mut reader = FramedReader::new(MbapParser::new());
        let frame = block_on(reader.next_frame(&mut io)).unwrap();
        assert_equals_simple_frame(&frame);
    }

    fn test_error(input: &[u8]) -> RequestError {
        let mut io = io::Builder::new().read(input).build();
        let mut reader = FramedReader::new(MbapParser::new());
        block_on(reader.next_frame(&mut io)).err().unwrap()
    }

    #[test]
    fn correctly_formats_frame() {
        let mut writer = FrameWriter::new();
        let msg = MockBody {
            body: &[0xCA, 0xFE],
        };
        let bytes = writer
            .format(
                FrameHeader::new(UnitId::new(42), TxId::new(7)),
                FunctionField::Valid(FunctionCode::ReadCoils),
                &msg,
            )
            .unwrap();
        assert_eq!(bytes, SIMPLE_FRAME)
    }

    #[test]
    fn formats_exception_with_high_bit_set() {
        let mut writer = FrameWriter::new();
        let bytes = writer
            .format(
                FrameHeader::new(UnitId::new(0x01), TxId::new(0x0203)),
                FunctionField::Exception(FunctionCode::ReadHoldingRegisters),
                &crate::exception::ExceptionCode::IllegalDataAddress,
            )
            .unwrap();
        assert_eq!(
            bytes,
            &[0x02, 0x03, 0x00, 0x00, 0x00, 0x03, 0x01, 0x83, 0x02]
        )
    }

    #[test]
    fn can_parse_frame_from_stream() {
        let mut io = io::Builder::new().read(SIMPLE_FRAME).build();
        let mut reader = FramedReader::new(MbapParser::new());
        let frame = block_on(reader.next_frame(&mut io)).unwrap();
        assert_equals_simple_frame(&frame);
    }

    #[test]
    fn can_parse_maximum_size_frame() {
        // maximum ADU length is 253, so max MBAP length value is 254 which is 0xFE
        let header = &[0x00, 0x07, 0x00, 0x00, 0x00, 0xFE, 0x2A];
        let payload = &[0xCC; 253];

        let mut io = io::Builder::new().read(header).read(payload).build();
        let mut reader = FramedReader::new(MbapParser::new());
        let frame = block_on(reader.next_frame(&mut io)).unwrap();
        assert_eq!(frame.payload(), payload.as_ref());
    }

    #[test]
    fn can_parse_frame_if_segmented_in_header() {
        test_segmented_parse(4);
    }

    #[test]
    fn can_parse_frame_if_segmented_in_payload() {
        test_segmented_parse(8);
    }

    #[test]
    fn errors_on_bad_protocol_id() {
        let frame = &[0x00, 0x07, 0xCA, 0xFE, 0x00, 0x01, 0x2A];
        assert_eq!(
            test_error(frame),
            RequestError::BadFrame(FrameParseError::UnknownProtocolId(0xCAFE)),
        );
    }

    #[test]
    fn errors_on_length_of_zero() {
        let frame = &[0x00, 0x07, 0x00, 0x00, 0x00, 0x00, 0x2A];
        assert_eq!(
            test_error(frame),
            RequestError::BadFrame(FrameParseError::MbapLengthTooSmall(0))
        );
    }

    #[test]
    fn errors_on_length_of_one() {
        // a length of one leaves no room for the function code
        let frame = &[0x00, 0x07, 0x00, 0x00, 0x00, 0x01, 0x2A];
        assert_eq!(
            test_error(frame),
            RequestError::BadFrame(FrameParseError::MbapLengthTooSmall(1))
        );
    }

    #[test]
    fn errors_when_mbap_length_too_big() {
        let frame = &[0x00, 0x07, 0x00, 0x00, 0x00, 0xFF, 0x2A];
        assert_eq!(
            test_error(frame),
            RequestError::BadFrame(FrameParseError::FrameLengthTooBig(
                0xFF,
                constants::MAX_LENGTH_FIELD,
            ))
        );
    }
}
