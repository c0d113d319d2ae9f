use crate::common::cursor::WriteCursor;
use crate::common::traits::Serialize;
use crate::error::InternalError;

pub(crate) fn num_bytes_for_bits(count: usize) -> usize {
    (count + 7) / 8
}

/// Read-coils / read-discrete-inputs reply body: byte count then the values
/// packed LSB-first per byte
pub(crate) struct BitResponse<'a> {
    values: &'a [bool],
}

impl<'a> BitResponse<'a> {
    pub(crate) fn new(values: &'a [bool]) -> Self {
        Self { values }
    }
}

impl Serialize for BitResponse<'_> {
    fn serialize(&self, cursor: &mut WriteCursor) -> Result<(), InternalError> {
        let byte_count = num_bytes_for_bits(self.values.len());
        if byte_count > u8::MAX as usize {
            return Err(InternalError::BadByteCount(byte_count));
        }
        cursor.write_u8(byte_count as u8)?;

        for chunk in self.values.chunks(8) {
            let mut byte = 0u8;
            for (i, value) in chunk.iter().enumerate() {
                if *value {
                    byte |= 1 << i;
                }
            }
            cursor.write_u8(byte)?;
        }
        Ok(())
    }
}

/// Read-registers reply body: byte count then the values big-endian
pub(crate) struct RegisterResponse<'a> {
    values: &'a [u16],
}

impl<'a> RegisterResponse<'a> {
    pub(crate) fn new(values: &'a [u16]) -> Self {
        Self { values }
    }
}

impl Serialize for RegisterResponse<'_> {
    fn serialize(&self, cursor: &mut WriteCursor) -> Result<(), InternalError> {
        let byte_count = 2 * self.values.len();
        if byte_count > u8::MAX as usize {
            return Err(InternalError::BadByteCount(byte_count));
        }
        cursor.write_u8(byte_count as u8)?;

        for value in self.values {
            cursor.write_u16_be(*value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn serialize_to_vec(body: &dyn Serialize) -> Vec<u8> {
        let mut buffer = [0u8; 64];
        let mut cursor = WriteCursor::new(&mut buffer);
        body.serialize(&mut cursor).unwrap();
        let end = cursor.position();
        buffer[..end].to_vec()
    }

    #[test]
    fn packs_bits_lsb_first() {
        let values = [true, false, true, true, false, false, false, false, true];
        assert_eq!(
            serialize_to_vec(&BitResponse::new(&values)),
            vec![0x02, 0x0D, 0x01]
        );
    }

    #[test]
    fn single_bit_uses_one_byte() {
        assert_eq!(serialize_to_vec(&BitResponse::new(&[true])), vec![0x01, 0x01]);
    }

    #[test]
    fn writes_registers_big_endian() {
        let values = [0xCAFE, 0x0001];
        assert_eq!(
            serialize_to_vec(&RegisterResponse::new(&values)),
            vec![0x04, 0xCA, 0xFE, 0x00, 0x01]
        );
    }
}
