use crate::common::cursor::WriteCursor;
use crate::error::InternalError;

/// Implemented by every PDU body the server can place in a reply frame
pub(crate) trait Serialize {
    fn serialize(&self, cursor: &mut WriteCursor) -> Result<(), InternalError>;
}
