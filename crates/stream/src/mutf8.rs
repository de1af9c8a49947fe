//! Java "modified UTF-8", as written by `DataOutputStream.writeUTF` and the
//! string tokens of the object stream: `U+0000` is encoded as the two-byte
//! sequence `C0 80`, and supplementary characters appear as surrogate pairs
//! of three-byte code units rather than four-byte sequences.

use crate::{Result, StreamError};

/// Decodes a modified UTF-8 byte buffer into a string.
///
/// A literal zero byte and lead bytes outside the three accepted bands are
/// rejected. Surrogate code units are assembled without further validation;
/// unpaired halves decode to the replacement character.
pub fn decode(data: &[u8]) -> Result<String> {
    let mut units = Vec::with_capacity(data.len());
    let mut i = 0;
    while i < data.len() {
        let a = data[i];
        i += 1;
        if a & 0x80 == 0 {
            // U+0001..U+007F
            if a == 0 {
                return Err(StreamError::EncodedNull);
            }
            units.push(a as u16);
        } else if a & 0xe0 == 0xc0 {
            // U+0080..U+07FF, and the two-byte null
            let b = continuation(data, i)?;
            i += 1;
            units.push(((a as u16 & 0x1f) << 6) | (b as u16 & 0x3f));
        } else if a & 0xf0 == 0xe0 {
            // U+0800..U+FFFF
            let b = continuation(data, i)?;
            i += 1;
            let c = continuation(data, i)?;
            i += 1;
            units.push(((a as u16 & 0x0f) << 12) | ((b as u16 & 0x3f) << 6) | (c as u16 & 0x3f));
        } else {
            return Err(StreamError::BadUtf8Byte(a));
        }
    }
    Ok(String::from_utf16_lossy(&units))
}

fn continuation(data: &[u8], i: usize) -> Result<u8> {
    let b = *data.get(i).ok_or(StreamError::TruncatedUtf8)?;
    if b & 0xc0 != 0x80 {
        return Err(StreamError::BadUtf8Continuation(b));
    }
    Ok(b)
}
