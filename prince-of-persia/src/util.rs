use std::io;
use std::io::prelude::*;
use std::io::Cursor;

/// A reader over a sub-slice that still knows where it is in the whole file,
/// so errors can name absolute offsets.
pub struct OffsetReader<'a> {
    cursor: Cursor<&'a [u8]>,
    base_offset: usize,
}

impl<'a> OffsetReader<'a> {
    /// Starts reading `data` at `base_offset`.  An offset past the end gives
    /// a reader that is already exhausted.
    pub fn new(data: &'a [u8], base_offset: usize) -> OffsetReader<'a> {
        OffsetReader {
            cursor: Cursor::new(data.get(base_offset..).unwrap_or(&[])),
            base_offset: base_offset,
        }
    }

    pub fn cur_address(&self) -> usize {
        self.base_offset + self.cursor.position() as usize
    }

    pub fn remaining(&self) -> usize {
        let len = self.cursor.get_ref().len();
        len.saturating_sub(self.cursor.position() as usize)
    }
}

impl<'a> Read for OffsetReader<'a> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.cursor.read(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::{LittleEndian, ReadBytesExt};

    #[test]
    fn offset_reader() {
        let data = [
            0x0, 0x1, 0x2, 0x3, 0x4, 0x5, 0x6, 0x7, 0x8, 0x9, 0xa, 0xb, 0xc, 0xd, 0xe, 0xf,
        ];

        let mut r = OffsetReader::new(&data, 0x4);
        assert_eq!(r.cur_address(), 0x4);
        assert_eq!(r.remaining(), 12);

        let mut rdata = [0; 4];
        let size = r.read(&mut rdata).unwrap();
        assert_eq!(size, 4);
        assert_eq!(rdata, [0x4, 0x5, 0x6, 0x7]);
        assert_eq!(r.cur_address(), 0x8);

        assert_eq!(r.read_u16::<LittleEndian>().unwrap(), 0x0908);
        assert_eq!(r.cur_address(), 0xa);
        assert_eq!(r.remaining(), 6);
    }

    #[test]
    fn offset_past_end_is_empty() {
        let data = [0x1, 0x2];
        let mut r = OffsetReader::new(&data, 5);
        assert_eq!(r.remaining(), 0);
        assert!(r.read_u8().is_err());
    }
}
