use anyhow::{ensure, Result};

/// A small length-prefixed binary writer, in the same style as the
/// variable store's snapshot format: every string is `u32` length plus
/// UTF-8 bytes, every integer is little-endian.
#[derive(Default)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn write_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_i32(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_string(&mut self, value: &str) {
        self.write_u32(value.len() as u32);
        self.buf.extend_from_slice(value.as_bytes());
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

pub struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Reader { bytes, pos: 0 }
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        let slice = self.take(1)?;
        Ok(slice[0])
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let slice = self.take(4)?;
        Ok(u32::from_le_bytes(slice.try_into().unwrap()))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        let slice = self.take(4)?;
        Ok(i32::from_le_bytes(slice.try_into().unwrap()))
    }

    pub fn read_string(&mut self) -> Result<String> {
        let len = self.read_u32()? as usize;
        let slice = self.take(len)?;
        Ok(String::from_utf8(slice.to_vec())?)
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self.pos + len;
        ensure!(end <= self.bytes.len(), "truncated rpc payload");
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    pub fn finished(&self) -> bool {
        self.pos == self.bytes.len()
    }

    /// Consumes and returns everything left in the buffer, for payloads
    /// whose tail is raw bytes rather than further typed fields.
    pub fn take_remaining(&mut self) -> Result<&'a [u8]> {
        let slice = &self.bytes[self.pos..];
        self.pos = self.bytes.len();
        Ok(slice)
    }
}
