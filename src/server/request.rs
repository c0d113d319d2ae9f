use crate::common::cursor::ReadCursor;
use crate::common::frame::{FrameHeader, FunctionField};
use crate::common::function::FunctionCode;
use crate::constants::limits;
use crate::error::{AduParseError, RequestError};
use crate::exception::ExceptionCode;
use crate::server::handler::{
    CoilsRequest, DiscreteInputsRequest, HoldingRegistersRequest, InputRegistersRequest,
    RequestHandler,
};
use crate::server::response::{num_bytes_for_bits, BitResponse, RegisterResponse};
use crate::tcp::frame::FrameWriter;
use crate::types::{coil_from_u16, AddressRange, Indexed};

/// A fully parsed request PDU, one variant per supported function code
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Request {
    ReadCoils(AddressRange),
    ReadDiscreteInputs(AddressRange),
    ReadHoldingRegisters(AddressRange),
    ReadInputRegisters(AddressRange),
    WriteSingleCoil(Indexed<bool>),
    WriteSingleRegister(Indexed<u16>),
    WriteMultipleCoils(AddressRange, Vec<bool>),
    WriteMultipleRegisters(AddressRange, Vec<u16>),
}

fn parse_range(cursor: &mut ReadCursor, limit: u16) -> Result<AddressRange, AduParseError> {
    let start = cursor.read_u16_be()?;
    let count = cursor.read_u16_be()?;
    let range = AddressRange::try_from(start, count)?;
    Ok(range.limited_count(limit)?)
}

/// The five kinds a handler may report on the wire. Anything else the
/// handler returns is collapsed into a device failure.
fn reply_code(ex: ExceptionCode) -> ExceptionCode {
    match ex {
        ExceptionCode::IllegalFunction
        | ExceptionCode::IllegalDataAddress
        | ExceptionCode::IllegalDataValue
        | ExceptionCode::ServerDeviceFailure
        | ExceptionCode::ServerDeviceBusy => ex,
        other => {
            tracing::warn!("handler returned non-reportable exception: {}", other);
            ExceptionCode::ServerDeviceFailure
        }
    }
}

impl Request {
    pub(crate) fn get_function(&self) -> FunctionCode {
        match self {
            Request::ReadCoils(_) => FunctionCode::ReadCoils,
            Request::ReadDiscreteInputs(_) => FunctionCode::ReadDiscreteInputs,
            Request::ReadHoldingRegisters(_) => FunctionCode::ReadHoldingRegisters,
            Request::ReadInputRegisters(_) => FunctionCode::ReadInputRegisters,
            Request::WriteSingleCoil(_) => FunctionCode::WriteSingleCoil,
            Request::WriteSingleRegister(_) => FunctionCode::WriteSingleRegister,
            Request::WriteMultipleCoils(_, _) => FunctionCode::WriteMultipleCoils,
            Request::WriteMultipleRegisters(_, _) => FunctionCode::WriteMultipleRegisters,
        }
    }

    pub(crate) fn parse(
        function: FunctionCode,
        cursor: &mut ReadCursor,
    ) -> Result<Self, AduParseError> {
        match function {
            FunctionCode::ReadCoils => {
                let range = parse_range(cursor, limits::MAX_READ_COILS_COUNT)?;
                cursor.expect_empty()?;
                Ok(Request::ReadCoils(range))
            }
            FunctionCode::ReadDiscreteInputs => {
                let range = parse_range(cursor, limits::MAX_READ_COILS_COUNT)?;
                cursor.expect_empty()?;
                Ok(Request::ReadDiscreteInputs(range))
            }
            FunctionCode::ReadHoldingRegisters => {
                let range = parse_range(cursor, limits::MAX_READ_REGISTERS_COUNT)?;
                cursor.expect_empty()?;
                Ok(Request::ReadHoldingRegisters(range))
            }
            FunctionCode::ReadInputRegisters => {
                let range = parse_range(cursor, limits::MAX_READ_REGISTERS_COUNT)?;
                cursor.expect_empty()?;
                Ok(Request::ReadInputRegisters(range))
            }
            FunctionCode::WriteSingleCoil => {
                let index = cursor.read_u16_be()?;
                let value = coil_from_u16(cursor.read_u16_be()?)?;
                cursor.expect_empty()?;
                Ok(Request::WriteSingleCoil(Indexed::new(index, value)))
            }
            FunctionCode::WriteSingleRegister => {
                let index = cursor.read_u16_be()?;
                let value = cursor.read_u16_be()?;
                cursor.expect_empty()?;
                Ok(Request::WriteSingleRegister(Indexed::new(index, value)))
            }
            FunctionCode::WriteMultipleCoils => {
                let range = parse_range(cursor, limits::MAX_WRITE_COILS_COUNT)?;
                let byte_count = cursor.read_u8()? as usize;
                let expected = num_bytes_for_bits(range.count as usize);
                if byte_count != expected {
                    return Err(AduParseError::ByteCountMismatch(expected, byte_count));
                }
                let bytes = cursor.read_bytes(byte_count)?;
                cursor.expect_empty()?;

                // values are packed LSB-first within each byte
                let mut values = Vec::with_capacity(range.count as usize);
                for i in 0..range.count as usize {
                    let byte = bytes[i / 8];
                    values.push(byte & (1 << (i % 8)) != 0);
                }
                Ok(Request::WriteMultipleCoils(range, values))
            }
            FunctionCode::WriteMultipleRegisters => {
                let range = parse_range(cursor, limits::MAX_WRITE_REGISTERS_COUNT)?;
                let byte_count = cursor.read_u8()? as usize;
                let expected = 2 * range.count as usize;
                if byte_count != expected {
                    return Err(AduParseError::ByteCountMismatch(expected, byte_count));
                }
                let mut values = Vec::with_capacity(range.count as usize);
                for _ in 0..range.count {
                    values.push(cursor.read_u16_be()?);
                }
                cursor.expect_empty()?;
                Ok(Request::WriteMultipleRegisters(range, values))
            }
        }
    }

    /// Invoke exactly one handler operation and format the reply frame,
    /// normal or exception, into the writer
    pub(crate) fn get_reply<'a, T: RequestHandler>(
        &self,
        header: FrameHeader,
        handler: &T,
        writer: &'a mut FrameWriter,
    ) -> Result<&'a [u8], RequestError> {
        let function = self.get_function();
        let unit_id = header.unit_id;

        match self {
            Request::ReadCoils(range) => {
                let result = handler.handle_coils(CoilsRequest {
                    unit_id,
                    range: *range,
                    is_write: false,
                    args: &[],
                });
                Self::reply_with_bits(header, function, *range, result, writer)
            }
            Request::ReadDiscreteInputs(range) => {
                let result = handler.handle_discrete_inputs(DiscreteInputsRequest {
                    unit_id,
                    range: *range,
                });
                Self::reply_with_bits(header, function, *range, result, writer)
            }
            Request::ReadHoldingRegisters(range) => {
                let result = handler.handle_holding_registers(HoldingRegistersRequest {
                    unit_id,
                    range: *range,
                    is_write: false,
                    args: &[],
                });
                Self::reply_with_registers(header, function, *range, result, writer)
            }
            Request::ReadInputRegisters(range) => {
                let result = handler.handle_input_registers(InputRegistersRequest {
                    unit_id,
                    range: *range,
                });
                Self::reply_with_registers(header, function, *range, result, writer)
            }
            Request::WriteSingleCoil(request) => {
                let args = [request.value];
                let result = handler.handle_coils(CoilsRequest {
                    unit_id,
                    range: AddressRange {
                        start: request.index,
                        count: 1,
                    },
                    is_write: true,
                    args: &args,
                });
                match result {
                    // the reply echoes the request
                    Ok(_) => writer.format(header, FunctionField::Valid(function), request),
                    Err(ex) => {
                        writer.format(header, FunctionField::Exception(function), &reply_code(ex))
                    }
                }
            }
            Request::WriteSingleRegister(request) => {
                let args = [request.value];
                let result = handler.handle_holding_registers(HoldingRegistersRequest {
                    unit_id,
                    range: AddressRange {
                        start: request.index,
                        count: 1,
                    },
                    is_write: true,
                    args: &args,
                });
                match result {
                    Ok(_) => writer.format(header, FunctionField::Valid(function), request),
                    Err(ex) => {
                        writer.format(header, FunctionField::Exception(function), &reply_code(ex))
                    }
                }
            }
            Request::WriteMultipleCoils(range, values) => {
                let result = handler.handle_coils(CoilsRequest {
                    unit_id,
                    range: *range,
                    is_write: true,
                    args: values,
                });
                match result {
                    // the reply echoes the starting address and quantity
                    Ok(_) => writer.format(header, FunctionField::Valid(function), range),
                    Err(ex) => {
                        writer.format(header, FunctionField::Exception(function), &reply_code(ex))
                    }
                }
            }
            Request::WriteMultipleRegisters(range, values) => {
                let result = handler.handle_holding_registers(HoldingRegistersRequest {
                    unit_id,
                    range: *range,
                    is_write: true,
                    args: values,
                });
                match result {
                    Ok(_) => writer.format(header, FunctionField::Valid(function), range),
                    Err(ex) => {
                        writer.format(header, FunctionField::Exception(function), &reply_code(ex))
                    }
                }
            }
        }
    }

    fn reply_with_bits<'a>(
        header: FrameHeader,
        function: FunctionCode,
        range: AddressRange,
        result: Result<Vec<bool>, ExceptionCode>,
        writer: &'a mut FrameWriter,
    ) -> Result<&'a [u8], RequestError> {
        match result {
            Ok(values) => {
                if values.len() != range.count as usize {
                    tracing::warn!(
                        "handler returned {} values for a request of {}",
                        values.len(),
                        range.count
                    );
                    return writer.format(
                        header,
                        FunctionField::Exception(function),
                        &ExceptionCode::ServerDeviceFailure,
                    );
                }
                writer.format(
                    header,
                    FunctionField::Valid(function),
                    &BitResponse::new(&values),
                )
            }
            Err(ex) => writer.format(header, FunctionField::Exception(function), &reply_code(ex)),
        }
    }

    fn reply_with_registers<'a>(
        header: FrameHeader,
        function: FunctionCode,
        range: AddressRange,
        result: Result<Vec<u16>, ExceptionCode>,
        writer: &'a mut FrameWriter,
    ) -> Result<&'a [u8], RequestError> {
        match result {
            Ok(values) => {
                if values.len() != range.count as usize {
                    tracing::warn!(
                        "handler returned {} values for a request of {}",
                        values.len(),
                        range.count
                    );
                    return writer.format(
                        header,
                        FunctionField::Exception(function),
                        &ExceptionCode::ServerDeviceFailure,
                    );
                }
                writer.format(
                    header,
                    FunctionField::Valid(function),
                    &RegisterResponse::new(&values),
                )
            }
            Err(ex) => writer.format(header, FunctionField::Exception(function), &reply_code(ex)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::frame::TxId;
    use crate::types::UnitId;

    mod coils {
        use super::super::*;
        use crate::error::InvalidRange;

        #[test]
        fn fails_when_byte_count_too_small_for_quantity() {
            let mut cursor = ReadCursor::new(&[0x00, 0x01, 0x00, 0x08, 0x00]);
            let err = Request::parse(FunctionCode::WriteMultipleCoils, &mut cursor)
                .err()
                .unwrap();
            assert_eq!(err, AduParseError::ByteCountMismatch(1, 0));
        }

        #[test]
        fn fails_when_byte_count_too_big_for_quantity() {
            let mut cursor = ReadCursor::new(&[0x00, 0x01, 0x00, 0x08, 0x02]);
            let err = Request::parse(FunctionCode::WriteMultipleCoils, &mut cursor)
                .err()
                .unwrap();
            assert_eq!(err, AduParseError::ByteCountMismatch(1, 2));
        }

        #[test]
        fn fails_when_specified_byte_count_not_present() {
            let mut cursor = ReadCursor::new(&[0x00, 0x01, 0x00, 0x08, 0x01]);
            let err = Request::parse(FunctionCode::WriteMultipleCoils, &mut cursor)
                .err()
                .unwrap();
            assert_eq!(err, AduParseError::InsufficientBytes);
        }

        #[test]
        fn fails_when_too_many_bytes_present() {
            let mut cursor = ReadCursor::new(&[0x00, 0x01, 0x00, 0x08, 0x01, 0xFF, 0xFF]);
            let err = Request::parse(FunctionCode::WriteMultipleCoils, &mut cursor)
                .err()
                .unwrap();
            assert_eq!(err, AduParseError::TrailingBytes(1));
        }

        #[test]
        fn fails_when_quantity_exceeds_limit() {
            // quantity 1969 with a consistent byte count
            let mut request = vec![0x00, 0x01, 0x07, 0xB1, 0xF7];
            request.extend(std::iter::repeat(0x00).take(0xF7));
            let mut cursor = ReadCursor::new(&request);
            let err = Request::parse(FunctionCode::WriteMultipleCoils, &mut cursor)
                .err()
                .unwrap();
            assert_eq!(
                err,
                AduParseError::InvalidRange(InvalidRange::CountTooLargeForType(1969, 1968))
            );
        }

        #[test]
        fn can_parse_coils() {
            let mut cursor = ReadCursor::new(&[0x00, 0x01, 0x00, 0x03, 0x01, 0x05]);
            let request = Request::parse(FunctionCode::WriteMultipleCoils, &mut cursor).unwrap();
            assert_eq!(
                request,
                Request::WriteMultipleCoils(
                    AddressRange::try_from(1, 3).unwrap(),
                    vec![true, false, true]
                )
            );
        }

        #[test]
        fn rejects_invalid_single_coil_state() {
            let mut cursor = ReadCursor::new(&[0x00, 0x01, 0xAB, 0xCD]);
            let err = Request::parse(FunctionCode::WriteSingleCoil, &mut cursor)
                .err()
                .unwrap();
            assert_eq!(err, AduParseError::UnknownCoilState(0xABCD));
        }

        #[test]
        fn can_parse_single_coil_writes() {
            let mut cursor = ReadCursor::new(&[0x00, 0x02, 0xFF, 0x00]);
            let request = Request::parse(FunctionCode::WriteSingleCoil, &mut cursor).unwrap();
            assert_eq!(request, Request::WriteSingleCoil(Indexed::new(2, true)));
        }
    }

    mod registers {
        use super::super::*;

        #[test]
        fn fails_when_byte_count_too_small_for_quantity() {
            let mut cursor = ReadCursor::new(&[0x00, 0x01, 0x00, 0x01, 0x00]);
            let err = Request::parse(FunctionCode::WriteMultipleRegisters, &mut cursor)
                .err()
                .unwrap();
            assert_eq!(err, AduParseError::ByteCountMismatch(2, 0));
        }

        #[test]
        fn fails_when_byte_count_too_big_for_quantity() {
            let mut cursor = ReadCursor::new(&[0x00, 0x01, 0x00, 0x01, 0x03]);
            let err = Request::parse(FunctionCode::WriteMultipleRegisters, &mut cursor)
                .err()
                .unwrap();
            assert_eq!(err, AduParseError::ByteCountMismatch(2, 3));
        }

        #[test]
        fn fails_when_specified_byte_count_not_present() {
            let mut cursor = ReadCursor::new(&[0x00, 0x01, 0x00, 0x01, 0x02, 0xFF]);
            let err = Request::parse(FunctionCode::WriteMultipleRegisters, &mut cursor)
                .err()
                .unwrap();
            assert_eq!(err, AduParseError::InsufficientBytes);
        }

        #[test]
        fn fails_when_too_many_bytes_present() {
            let mut cursor = ReadCursor::new(&[0x00, 0x01, 0x00, 0x01, 0x02, 0xFF, 0xFF, 0xFF]);
            let err = Request::parse(FunctionCode::WriteMultipleRegisters, &mut cursor)
                .err()
                .unwrap();
            assert_eq!(err, AduParseError::TrailingBytes(1));
        }

        #[test]
        fn can_parse_registers() {
            let mut cursor =
                ReadCursor::new(&[0x00, 0x01, 0x00, 0x02, 0x04, 0xCA, 0xFE, 0xBB, 0xDD]);
            let request =
                Request::parse(FunctionCode::WriteMultipleRegisters, &mut cursor).unwrap();
            assert_eq!(
                request,
                Request::WriteMultipleRegisters(
                    AddressRange::try_from(1, 2).unwrap(),
                    vec![0xCAFE, 0xBBDD]
                )
            );
        }
    }

    mod reads {
        use super::super::*;
        use crate::error::InvalidRange;

        #[test]
        fn can_parse_read_requests() {
            let mut cursor = ReadCursor::new(&[0x00, 0x03, 0x00, 0x07]);
            let request = Request::parse(FunctionCode::ReadCoils, &mut cursor).unwrap();
            assert_eq!(
                request,
                Request::ReadCoils(AddressRange::try_from(3, 7).unwrap())
            );
        }

        #[test]
        fn rejects_quantity_of_zero() {
            let mut cursor = ReadCursor::new(&[0x00, 0x03, 0x00, 0x00]);
            let err = Request::parse(FunctionCode::ReadDiscreteInputs, &mut cursor)
                .err()
                .unwrap();
            assert_eq!(err, AduParseError::InvalidRange(InvalidRange::CountOfZero));
        }

        #[test]
        fn rejects_bit_quantity_above_limit() {
            let mut cursor = ReadCursor::new(&[0x00, 0x00, 0x07, 0xD1]);
            let err = Request::parse(FunctionCode::ReadCoils, &mut cursor)
                .err()
                .unwrap();
            assert_eq!(
                err,
                AduParseError::InvalidRange(InvalidRange::CountTooLargeForType(2001, 2000))
            );
        }

        #[test]
        fn rejects_register_quantity_above_limit() {
            let mut cursor = ReadCursor::new(&[0x00, 0x00, 0x00, 0x7E]);
            let err = Request::parse(FunctionCode::ReadInputRegisters, &mut cursor)
                .err()
                .unwrap();
            assert_eq!(
                err,
                AduParseError::InvalidRange(InvalidRange::CountTooLargeForType(126, 125))
            );
        }

        #[test]
        fn rejects_range_that_overflows_the_address_space() {
            let mut cursor = ReadCursor::new(&[0xFF, 0xFF, 0x00, 0x02]);
            let err = Request::parse(FunctionCode::ReadHoldingRegisters, &mut cursor)
                .err()
                .unwrap();
            assert_eq!(
                err,
                AduParseError::InvalidRange(InvalidRange::AddressOverflow(0xFFFF, 2))
            );
        }
    }

    struct FixedHandler {
        values: Vec<u16>,
    }

    impl RequestHandler for FixedHandler {
        fn handle_holding_registers(
            &self,
            _request: HoldingRegistersRequest,
        ) -> Result<Vec<u16>, ExceptionCode> {
            Ok(self.values.clone())
        }
    }

    #[test]
    fn inconsistent_result_length_becomes_device_failure() {
        let handler = FixedHandler {
            values: vec![0x0102],
        };
        let request = Request::ReadHoldingRegisters(AddressRange::try_from(0, 2).unwrap());
        let mut writer = FrameWriter::new();
        let header = FrameHeader::new(UnitId::new(0x01), TxId::new(0x0000));
        let bytes = request.get_reply(header, &handler, &mut writer).unwrap();
        assert_eq!(
            bytes,
            &[0x00, 0x00, 0x00, 0x00, 0x00, 0x03, 0x01, 0x83, 0x04]
        );
    }

    #[test]
    fn non_reportable_handler_exception_becomes_device_failure() {
        struct BusyGateway;
        impl RequestHandler for BusyGateway {
            fn handle_holding_registers(
                &self,
                _request: HoldingRegistersRequest,
            ) -> Result<Vec<u16>, ExceptionCode> {
                Err(ExceptionCode::GatewayPathUnavailable)
            }
        }

        let request = Request::ReadHoldingRegisters(AddressRange::try_from(0, 1).unwrap());
        let mut writer = FrameWriter::new();
        let header = FrameHeader::new(UnitId::new(0x01), TxId::new(0x0001));
        let bytes = request.get_reply(header, &BusyGateway, &mut writer).unwrap();
        assert_eq!(
            bytes,
            &[0x00, 0x01, 0x00, 0x00, 0x00, 0x03, 0x01, 0x83, 0x04]
        );
    }
}
