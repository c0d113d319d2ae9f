use crate::common::cursor::WriteCursor;
use crate::common::traits::Serialize;
use crate::error::InternalError;
use crate::exception::ExceptionCode;
use crate::types::{coil_to_u16, AddressRange, Indexed};

impl Serialize for ExceptionCode {
    fn serialize(&self, cursor: &mut WriteCursor) -> Result<(), InternalError> {
        cursor.write_u8((*self).into())
    }
}

impl Serialize for Indexed<bool> {
    fn serialize(&self, cursor: &mut WriteCursor) -> Result<(), InternalError> {
        cursor.write_u16_be(self.index)?;
        cursor.write_u16_be(coil_to_u16(self.value))
    }
}

impl Serialize for Indexed<u16> {
    fn serialize(&self, cursor: &mut WriteCursor) -> Result<(), InternalError> {
        cursor.write_u16_be(self.index)?;
        cursor.write_u16_be(self.value)
    }
}

impl Serialize for AddressRange {
    fn serialize(&self, cursor: &mut WriteCursor) -> Result<(), InternalError> {
        cursor.write_u16_be(self.start)?;
        cursor.write_u16_be(self.count)
    }
}
