use crate::exception::ExceptionCode;
use crate::types::{AddressRange, UnitId};

/// Request against the coil area received by the server
///
/// When `is_write` is true the handler must apply `args` to the window
/// described by `range` and return the resulting values; otherwise `args`
/// is empty and the handler only reads.
#[derive(Debug, Copy, Clone)]
pub struct CoilsRequest<'a> {
    /// unit id from the MBAP header
    pub unit_id: UnitId,
    /// address range of the request
    pub range: AddressRange,
    /// true for function codes 0x05 and 0x0F
    pub is_write: bool,
    /// values to write, one per address in `range`
    pub args: &'a [bool],
}

/// Request against the discrete input area received by the server
///
/// Discrete inputs are read-only, so there is no write form.
#[derive(Debug, Copy, Clone)]
pub struct DiscreteInputsRequest {
    /// unit id from the MBAP header
    pub unit_id: UnitId,
    /// address range of the request
    pub range: AddressRange,
}

/// Request against the holding register area received by the server
#[derive(Debug, Copy, Clone)]
pub struct HoldingRegistersRequest<'a> {
    /// unit id from the MBAP header
    pub unit_id: UnitId,
    /// address range of the request
    pub range: AddressRange,
    /// true for function codes 0x06 and 0x10
    pub is_write: bool,
    /// values to write, one per address in `range`
    pub args: &'a [u16],
}

/// Request against the input register area received by the server
///
/// Input registers are read-only, so there is no write form.
#[derive(Debug, Copy, Clone)]
pub struct InputRegistersRequest {
    /// unit id from the MBAP header
    pub unit_id: UnitId,
    /// address range of the request
    pub range: AddressRange,
}

/// Trait implemented by the user to process requests received from clients
///
/// Every operation returns the post-operation values for the requested
/// window, or an exception code. The default implementations reject all
/// requests with [`ExceptionCode::IllegalFunction`], so a handler only
/// implements the data areas it serves.
///
/// Handlers are invoked concurrently from every connection and must perform
/// their own synchronization.
pub trait RequestHandler: Send + Sync + 'static {
    /// Read or write a range of coils
    fn handle_coils(&self, request: CoilsRequest) -> Result<Vec<bool>, ExceptionCode> {
        let _ = request;
        Err(ExceptionCode::IllegalFunction)
    }

    /// Read a range of discrete inputs
    fn handle_discrete_inputs(
        &self,
        request: DiscreteInputsRequest,
    ) -> Result<Vec<bool>, ExceptionCode> {
        let _ = request;
        Err(ExceptionCode::IllegalFunction)
    }

    /// Read or write a range of holding registers
    fn handle_holding_registers(
        &self,
        request: HoldingRegistersRequest,
    ) -> Result<Vec<u16>, ExceptionCode> {
        let _ = request;
        Err(ExceptionCode::IllegalFunction)
    }

    /// Read a range of input registers
    fn handle_input_registers(
        &self,
        request: InputRegistersRequest,
    ) -> Result<Vec<u16>, ExceptionCode> {
        let _ = request;
        Err(ExceptionCode::IllegalFunction)
    }

    /// Retrieve a sub-slice for `range` or [`ExceptionCode::IllegalDataAddress`]
    /// when the range falls outside the slice
    fn get_range_of<T>(slice: &[T], range: AddressRange) -> Result<&[T], ExceptionCode>
    where
        Self: Sized,
    {
        let rng = range.to_std_range();
        if rng.end > slice.len() {
            return Err(ExceptionCode::IllegalDataAddress);
        }
        Ok(&slice[rng])
    }
}
