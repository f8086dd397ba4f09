//! Serial types describe how SQLite encodes one column's value inside a record
//! payload: a varint naming the type/length, immediately followed by the value's
//! bytes (for fixed-size and variable-size types alike; NULL/zero/one contribute no
//! bytes at all). See <https://www.sqlite.org/fileformat.html#record_format>.

use byteorder::{BigEndian, ReadBytesExt};
use std::io::Read;

use crate::value::Value;

#[derive(thiserror::Error, Debug, Clone)]
pub enum Error {
    #[error("Failed reading serial type payload bytes.")]
    Io,
    #[error("Serial type code {0} is reserved for internal use and never appears in a well-formed file.")]
    InvalidSerialTypeCode(i64),
    #[error("Serial type code {0} is negative, which is not a valid encoding.")]
    NegativeSerialTypeCode(i64),
}

/// Number of payload bytes a serial type occupies, not counting the type's own varint.
pub fn content_size(serial_type: i64) -> Result<usize, Error> {
    match serial_type {
        0 | 8 | 9 => Ok(0),
        1 => Ok(1),
        2 => Ok(2),
        3 => Ok(3),
        4 => Ok(4),
        5 => Ok(6),
        6 => Ok(8),
        7 => Ok(8),
        10 | 11 => Err(Error::InvalidSerialTypeCode(serial_type)),
        x if x >= 12 && x % 2 == 0 => Ok(((x - 12) / 2) as usize),
        x if x >= 12 => Ok(((x - 13) / 2) as usize),
        x => Err(Error::NegativeSerialTypeCode(x)),
    }
}

/// Decodes one column value from `data`, which must be at least `content_size(serial_type)`
/// bytes long. Never fails on malformed text: invalid UTF-8 is replaced rather than rejected,
/// since a single corrupted byte should not sink an otherwise-recoverable row.
pub fn to_value(serial_type: i64, data: &[u8]) -> Result<Value, Error> {
    let mut c = std::io::Cursor::new(data);
    match serial_type {
        0 => Ok(Value::Null),
        1 => Ok(Value::Int(c.read_i8().map_err(|_| Error::Io)? as i64)),
        2 => Ok(Value::Int(
            c.read_i16::<BigEndian>().map_err(|_| Error::Io)? as i64,
        )),
        3 => {
            let mut bytes = [0_u8; 4];
            c.read_exact(&mut bytes[1..]).map_err(|_| Error::Io)?;
            bytes[0] = if bytes[1] & 0x80 != 0 { 0xff } else { 0 };
            Ok(Value::Int(i32::from_be_bytes(bytes) as i64))
        }
        4 => Ok(Value::Int(
            c.read_i32::<BigEndian>().map_err(|_| Error::Io)? as i64,
        )),
        5 => {
            let mut bytes = [0_u8; 8];
            c.read_exact(&mut bytes[2..]).map_err(|_| Error::Io)?;
            bytes[0] = if bytes[2] & 0x80 != 0 { 0xff } else { 0 };
            bytes[1] = bytes[0];
            Ok(Value::Int(i64::from_be_bytes(bytes)))
        }
        6 => Ok(Value::Int(
            c.read_i64::<BigEndian>().map_err(|_| Error::Io)?,
        )),
        7 => Ok(Value::Real(
            c.read_f64::<BigEndian>().map_err(|_| Error::Io)?,
        )),
        8 => Ok(Value::Zero),
        9 => Ok(Value::One),
        10 | 11 => Err(Error::InvalidSerialTypeCode(serial_type)),
        x if x >= 12 && x % 2 == 0 => {
            let mut buf = vec![0_u8; ((x - 12) / 2) as usize];
            c.read_exact(&mut buf[..]).map_err(|_| Error::Io)?;
            Ok(Value::Blob(buf))
        }
        x if x >= 12 => {
            let mut buf = vec![0_u8; ((x - 13) / 2) as usize];
            c.read_exact(&mut buf[..]).map_err(|_| Error::Io)?;
            Ok(Value::Text(String::from_utf8_lossy(&buf).into_owned()))
        }
        x => Err(Error::NegativeSerialTypeCode(x)),
    }
}
