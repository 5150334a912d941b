use crate::errors::Error;
use byteorder::{BigEndian, ByteOrder};

/// Growable big-endian byte buffer
///
/// This is the staging area for the constant pool, the bootstrap methods, and every attribute
/// body produced by the writer. Values that are only known later (counts, lengths, jump
/// offsets) are written as placeholders and patched with the `set_*` methods.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ByteVector {
    data: Vec<u8>,
}

impl ByteVector {
    pub fn new() -> ByteVector {
        ByteVector { data: vec![] }
    }

    pub fn with_capacity(capacity: usize) -> ByteVector {
        ByteVector {
            data: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }

    pub fn put_u8(&mut self, value: u8) -> &mut Self {
        self.data.push(value);
        self
    }

    pub fn put_u16(&mut self, value: u16) -> &mut Self {
        let mut buf = [0; 2];
        BigEndian::write_u16(&mut buf, value);
        self.data.extend_from_slice(&buf);
        self
    }

    pub fn put_i16(&mut self, value: i16) -> &mut Self {
        self.put_u16(value as u16)
    }

    pub fn put_u32(&mut self, value: u32) -> &mut Self {
        let mut buf = [0; 4];
        BigEndian::write_u32(&mut buf, value);
        self.data.extend_from_slice(&buf);
        self
    }

    pub fn put_i32(&mut self, value: i32) -> &mut Self {
        self.put_u32(value as u32)
    }

    pub fn put_u64(&mut self, value: u64) -> &mut Self {
        let mut buf = [0; 8];
        BigEndian::write_u64(&mut buf, value);
        self.data.extend_from_slice(&buf);
        self
    }

    /// Two bytes (eg. an opcode and a one byte operand)
    pub fn put_11(&mut self, first: u8, second: u8) -> &mut Self {
        self.put_u8(first).put_u8(second)
    }

    /// A byte and a short (eg. a constant tag and an index)
    pub fn put_12(&mut self, first: u8, second: u16) -> &mut Self {
        self.put_u8(first).put_u16(second)
    }

    /// Two bytes and a short (eg. `wide`, an opcode and a local index)
    pub fn put_112(&mut self, first: u8, second: u8, third: u16) -> &mut Self {
        self.put_u8(first).put_u8(second).put_u16(third)
    }

    /// A byte and two shorts (eg. a constant tag and two indices)
    pub fn put_122(&mut self, first: u8, second: u16, third: u16) -> &mut Self {
        self.put_u8(first).put_u16(second).put_u16(third)
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.data.extend_from_slice(bytes);
        self
    }

    /// Put a `u16` length followed by the modified UTF-8 encoding of the string
    pub fn put_utf8(&mut self, string: &str) -> Result<&mut Self, Error> {
        let length = modified_utf8_len(string);
        if length > u16::MAX as usize {
            return Err(Error::Utf8Overflow { length });
        }
        self.data.reserve(length + 2);
        self.put_u16(length as u16);
        encode_modified_utf8(string, &mut self.data);
        Ok(self)
    }

    pub fn set_u8(&mut self, offset: usize, value: u8) {
        self.data[offset] = value;
    }

    pub fn set_u16(&mut self, offset: usize, value: u16) {
        BigEndian::write_u16(&mut self.data[offset..offset + 2], value);
    }

    pub fn set_u32(&mut self, offset: usize, value: u32) {
        BigEndian::write_u32(&mut self.data[offset..offset + 4], value);
    }

    pub fn get_u8(&self, offset: usize) -> u8 {
        self.data[offset]
    }

    pub fn get_u16(&self, offset: usize) -> u16 {
        BigEndian::read_u16(&self.data[offset..offset + 2])
    }

    pub fn get_i16(&self, offset: usize) -> i16 {
        BigEndian::read_i16(&self.data[offset..offset + 2])
    }

    pub fn get_i32(&self, offset: usize) -> i32 {
        BigEndian::read_i32(&self.data[offset..offset + 4])
    }
}

impl std::fmt::Debug for ByteVector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ByteVector({} bytes)", self.data.len())
    }
}

/// Length in bytes of the modified UTF-8 encoding of a string
///
/// The encoding is on UTF-16 code units: supplementary characters become two 3-byte surrogate
/// sequences and `\0` takes 2 bytes.
pub fn modified_utf8_len(string: &str) -> usize {
    string
        .encode_utf16()
        .map(|unit| match unit {
            0x0001..=0x007F => 1,
            0x0000 | 0x0080..=0x07FF => 2,
            _ => 3,
        })
        .sum()
}

/// Encode a string in the JVM's [modified UTF-8][0] into a buffer
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.4.7
pub fn encode_modified_utf8(string: &str, buffer: &mut Vec<u8>) {
    for unit in string.encode_utf16() {
        match unit {
            0x0001..=0x007F => buffer.push(unit as u8),
            0x0000 | 0x0080..=0x07FF => {
                buffer.push(0xC0 | (unit >> 6 & 0x1F) as u8);
                buffer.push(0x80 | (unit & 0x3F) as u8);
            }
            _ => {
                buffer.push(0xE0 | (unit >> 12 & 0x0F) as u8);
                buffer.push(0x80 | (unit >> 6 & 0x3F) as u8);
                buffer.push(0x80 | (unit & 0x3F) as u8);
            }
        }
    }
}

/// Decode modified UTF-8 bytes
///
/// Returns the string and whether any unpaired surrogate (or malformed byte sequence) had to be
/// replaced by `U+FFFD`.
pub fn decode_modified_utf8(bytes: &[u8]) -> (String, bool) {
    let mut units: Vec<u16> = Vec::with_capacity(bytes.len());
    let mut lossy = false;
    let mut i = 0;
    while i < bytes.len() {
        let byte = bytes[i] as u16;
        if byte & 0x80 == 0 {
            units.push(byte);
            i += 1;
        } else if byte & 0xE0 == 0xC0 && i + 1 < bytes.len() {
            units.push((byte & 0x1F) << 6 | (bytes[i + 1] as u16 & 0x3F));
            i += 2;
        } else if byte & 0xF0 == 0xE0 && i + 2 < bytes.len() {
            units.push(
                (byte & 0x0F) << 12 | (bytes[i + 1] as u16 & 0x3F) << 6 | (bytes[i + 2] as u16 & 0x3F),
            );
            i += 3;
        } else {
            units.push(0xFFFD);
            lossy = true;
            i += 1;
        }
    }

    let mut string = String::with_capacity(units.len());
    for decoded in char::decode_utf16(units) {
        match decoded {
            Ok(c) => string.push(c),
            Err(_) => {
                string.push(char::REPLACEMENT_CHARACTER);
                lossy = true;
            }
        }
    }
    (string, lossy)
}

#[cfg(test)]
mod modified_utf8_tests {
    use super::*;

    fn encode(string: &str) -> Vec<u8> {
        let mut buffer = vec![];
        encode_modified_utf8(string, &mut buffer);
        assert_eq!(buffer.len(), modified_utf8_len(string));
        buffer
    }

    #[test]
    fn containing_null_byte() {
        assert_eq!(encode("a\x00a"), vec![97, 192, 128, 97]);
        assert_eq!(decode_modified_utf8(&[97, 192, 128, 97]), ("a\x00a".to_string(), false));
    }

    #[test]
    fn simple_ascii() {
        assert_eq!(encode("foo"), vec![102, 111, 111]);
        assert_eq!(
            encode("hel10_World"),
            vec![104, 101, 108, 49, 48, 95, 87, 111, 114, 108, 100]
        );
    }

    #[test]
    fn two_and_three_byte_encodings() {
        let two = "ĄǍǞǠǺȀȂȦȺӐӒ";
        let two_bytes = vec![
            196, 132, 199, 141, 199, 158, 199, 160, 199, 186, 200, 128, 200, 130, 200, 166, 200,
            186, 211, 144, 211, 146,
        ];
        assert_eq!(encode(two), two_bytes);
        assert_eq!(decode_modified_utf8(&two_bytes).0, two);

        let three = "ऄअॲঅਅઅଅஅఅಅഅะະ༁ཨ";
        let three_bytes = vec![
            224, 164, 132, 224, 164, 133, 224, 165, 178, 224, 166, 133, 224, 168, 133, 224, 170,
            133, 224, 172, 133, 224, 174, 133, 224, 176, 133, 224, 178, 133, 224, 180, 133, 224,
            184, 176, 224, 186, 176, 224, 188, 129, 224, 189, 168,
        ];
        assert_eq!(encode(three), three_bytes);
        assert_eq!(decode_modified_utf8(&three_bytes).0, three);
    }

    #[test]
    fn supplementary_characters() {
        let bytes = vec![
            237, 160, 128, 237, 176, 128, 237, 172, 191, 237, 191, 191, 237, 175, 191, 237, 191,
            191,
        ];
        assert_eq!(encode("\u{10000}\u{dffff}\u{10FFFF}"), bytes);
        assert_eq!(
            decode_modified_utf8(&bytes),
            ("\u{10000}\u{dffff}\u{10FFFF}".to_string(), false)
        );
    }

    #[test]
    fn unpaired_surrogate_is_lossy() {
        let (string, lossy) = decode_modified_utf8(&[97, 237, 160, 128, 98]);
        assert!(lossy);
        assert_eq!(string, "a\u{FFFD}b");
    }
}

#[cfg(test)]
mod byte_vector_tests {
    use super::*;

    #[test]
    fn big_endian_puts() {
        let mut bytes = ByteVector::new();
        bytes
            .put_u8(0xCA)
            .put_u16(0xFEBA)
            .put_u32(0xBE000102)
            .put_u64(0x0304050607080910);
        assert_eq!(
            bytes.as_slice(),
            &[0xCA, 0xFE, 0xBA, 0xBE, 0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 0x10]
        );
    }

    #[test]
    fn combined_puts() {
        let mut bytes = ByteVector::new();
        bytes.put_11(1, 2).put_12(3, 0x0405).put_112(6, 7, 0x0809).put_122(10, 0x0B0C, 0x0D0E);
        assert_eq!(bytes.as_slice(), &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14]);
    }

    #[test]
    fn patching() {
        let mut bytes = ByteVector::new();
        bytes.put_u16(0).put_u32(0);
        bytes.set_u16(0, 0x1234);
        bytes.set_u32(2, 0xFFFF_FFFE);
        assert_eq!(bytes.get_u16(0), 0x1234);
        assert_eq!(bytes.get_i32(2), -2);
    }

    #[test]
    fn utf8_length_prefix() {
        let mut bytes = ByteVector::new();
        bytes.put_utf8("a\x00").unwrap();
        assert_eq!(bytes.as_slice(), &[0, 3, 97, 0xC0, 0x80]);
    }

    #[test]
    fn utf8_overflow() {
        let long = "\u{0800}".repeat(30000);
        let mut bytes = ByteVector::new();
        match bytes.put_utf8(&long) {
            Err(Error::Utf8Overflow { length }) => assert_eq!(length, 90000),
            other => panic!("unexpected {:?}", other.map(|b| b.len())),
        }
    }
}
