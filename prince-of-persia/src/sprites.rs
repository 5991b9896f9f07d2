// Sprite containers (the IMG.CHTAB files) start with a table of little endian
// pointers.  The pointers are absolute addresses for wherever the file was
// assembled to, so they only become file offsets once the base address is
// subtracted.  Each pointer locates a record of the form:
//
// +-------+--------+--------------------------+
// | width | height | width * height bytes ... |
// +-------+--------+--------------------------+
//
// Width is in bytes, height in lines.  Each byte holds seven pixels in bits
// 0-6, leftmost pixel in bit 0.  Bit 7 selects the colour group and carries no
// shape.

use byteorder::{LittleEndian, ReadBytesExt};
use serde::{Deserialize, Serialize};
use serde_hex::{CompactPfx, SerHex};
use std::cmp;
use std::convert::TryFrom;
use tracing::{debug, trace};

use crate::error::{FormatError, ValidationError};
use crate::util::OffsetReader;

pub const DEFAULT_BASE_ADDRESS: u16 = 0x6000;
pub const DEFAULT_TABLE_OFFSET: usize = 1;
pub const POINTER_SIZE: usize = 2;
pub const HEADER_SIZE: usize = 2;
pub const PIXELS_PER_BYTE: usize = 7;
const HIGH_BIT: u8 = 0x80;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpriteSheetConfig {
    /// Address the container was assembled to.
    #[serde(with = "SerHex::<CompactPfx>")]
    pub base_address: u16,
    /// File offset of the first pointer.
    pub table_offset: usize,
}

impl Default for SpriteSheetConfig {
    fn default() -> Self {
        SpriteSheetConfig {
            base_address: DEFAULT_BASE_ADDRESS,
            table_offset: DEFAULT_TABLE_OFFSET,
        }
    }
}

/// Fields of a `Bitmap` before their sizes are checked against each other.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitmapParts {
    pub width: u8,
    pub height: u8,
    pub data: Vec<u8>,
}

/// Deserializing runs the same checks as `Bitmap::new`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BitmapParts")]
pub struct Bitmap {
    width: u8,
    height: u8,
    data: Vec<u8>,
}

impl TryFrom<BitmapParts> for Bitmap {
    type Error = ValidationError;

    fn try_from(parts: BitmapParts) -> Result<Bitmap, ValidationError> {
        let (width, height) = (parts.width, parts.height);
        let actual = parts.data.len();
        Bitmap::new(width, height, parts.data).ok_or(ValidationError::BitmapSize {
            width,
            height,
            required: width as usize * height as usize,
            actual,
        })
    }
}

impl Bitmap {
    /// Returns `None` unless `data` holds exactly `width * height` bytes
    /// and neither dimension is zero.
    pub fn new(width: u8, height: u8, data: Vec<u8>) -> Option<Bitmap> {
        if width == 0 || height == 0 || data.len() != width as usize * height as usize {
            return None;
        }
        Some(Bitmap {
            width,
            height,
            data,
        })
    }

    /// Width in bytes.
    pub fn width(&self) -> u8 {
        self.width
    }

    /// Height in lines.
    pub fn height(&self) -> u8 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn pixel_width(&self) -> usize {
        self.width as usize * PIXELS_PER_BYTE
    }

    pub fn lines(&self) -> std::slice::Chunks<u8> {
        self.data.chunks(self.width as usize)
    }

    pub fn pixel(&self, x: usize, y: usize) -> bool {
        if x >= self.pixel_width() || y >= self.height as usize {
            return false;
        }
        let b = self.data[y * self.width as usize + x / PIXELS_PER_BYTE];
        let mask = 1 << (x % PIXELS_PER_BYTE);
        is_bit_set!(b, mask)
    }

    /// The colour group bit of the byte at `column`, `line`.
    pub fn high_bit(&self, column: usize, line: usize) -> Option<bool> {
        if column >= self.width as usize {
            return None;
        }
        self.data
            .get(line * self.width as usize + column)
            .map(|b| is_bit_set!(*b, HIGH_BIT))
    }

    #[cfg(feature = "render")]
    pub fn render(&self) -> image::GrayImage {
        let mut img = image::GrayImage::new(self.pixel_width() as u32, self.height as u32);
        for (x, y, pixel) in img.enumerate_pixels_mut() {
            let value = if self.pixel(x as usize, y as usize) {
                0xff
            } else {
                0x00
            };
            *pixel = image::Luma([value]);
        }
        img
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpriteImage {
    /// A record with zero width or height, used for unused slots.
    Empty,
    Bitmap(Bitmap),
}

impl SpriteImage {
    pub fn width(&self) -> u8 {
        match self {
            SpriteImage::Empty => 0,
            SpriteImage::Bitmap(bitmap) => bitmap.width(),
        }
    }

    pub fn height(&self) -> u8 {
        match self {
            SpriteImage::Empty => 0,
            SpriteImage::Bitmap(bitmap) => bitmap.height(),
        }
    }

    pub fn data(&self) -> &[u8] {
        match self {
            SpriteImage::Empty => &[],
            SpriteImage::Bitmap(bitmap) => bitmap.data(),
        }
    }

    pub fn bitmap(&self) -> Option<&Bitmap> {
        match self {
            SpriteImage::Empty => None,
            SpriteImage::Bitmap(bitmap) => Some(bitmap),
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == SpriteImage::Empty
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sprite {
    #[serde(with = "SerHex::<CompactPfx>")]
    pub address: u16,
    pub offset: usize,
    pub image: SpriteImage,
}

impl Sprite {
    /// Bytes of the file this record occupies, header included.
    pub fn len(&self) -> usize {
        HEADER_SIZE + self.image.data().len()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpriteSheet {
    pub config: SpriteSheetConfig,
    sprites: Vec<Sprite>,
}

impl SpriteSheet {
    pub fn sprites(&self) -> &[Sprite] {
        &self.sprites
    }

    pub fn images<'a>(&'a self) -> impl Iterator<Item = &'a SpriteImage> + 'a {
        self.sprites.iter().map(|sprite| &sprite.image)
    }

    pub fn len(&self) -> usize {
        self.sprites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sprites.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&SpriteImage> {
        self.sprites.get(index).map(|sprite| &sprite.image)
    }
}

// The table has no length of its own.  It runs until the first byte any
// pointer refers to, since the records directly follow it.
fn read_pointer_table(
    data: &[u8],
    config: &SpriteSheetConfig,
) -> Result<Vec<(u16, usize)>, FormatError> {
    let table_start = config.table_offset;
    let required = table_start.checked_add(POINTER_SIZE).unwrap_or(usize::MAX);
    if data.len() < required {
        return Err(FormatError::TruncatedPointerTable {
            offset: table_start,
            required,
            actual: data.len(),
        });
    }

    let mut r = OffsetReader::new(data, table_start);
    let mut table_end = data.len();
    let mut pointers = Vec::new();
    while r.remaining() >= POINTER_SIZE && r.cur_address() + POINTER_SIZE <= table_end {
        let index = pointers.len();
        let address = r
            .read_u16::<LittleEndian>()
            .map_err(|_| FormatError::TruncatedPointerTable {
                offset: table_start,
                required: r.cur_address() + POINTER_SIZE,
                actual: data.len(),
            })?;

        let offset = address as i64 - config.base_address as i64;
        if offset < 0 || offset >= data.len() as i64 {
            return Err(FormatError::PointerOutOfRange {
                index,
                pointer: address,
                offset,
                len: data.len(),
            });
        }
        let offset = offset as usize;
        if offset < r.cur_address() {
            return Err(FormatError::PointerIntoTable {
                index,
                pointer: address,
                offset,
            });
        }

        table_end = cmp::min(table_end, offset);
        pointers.push((address, offset));
    }

    Ok(pointers)
}

fn read_sprite(data: &[u8], index: usize, offset: usize) -> Result<SpriteImage, FormatError> {
    let bitmap_start = offset + HEADER_SIZE;
    if bitmap_start > data.len() {
        return Err(FormatError::TruncatedHeader {
            index,
            offset,
            actual: data.len(),
        });
    }

    let width = data[offset];
    let height = data[offset + 1];
    if width == 0 || height == 0 {
        return Ok(SpriteImage::Empty);
    }

    let bitmap_end = bitmap_start + width as usize * height as usize;
    if bitmap_end > data.len() {
        return Err(FormatError::BitmapOverrun {
            index,
            offset,
            width,
            height,
            required: bitmap_end,
            actual: data.len(),
        });
    }

    let bitmap = Bitmap {
        width,
        height,
        data: data[bitmap_start..bitmap_end].to_vec(),
    };
    Ok(SpriteImage::Bitmap(bitmap))
}

pub fn decode_sprite_sheet(
    data: &[u8],
    config: &SpriteSheetConfig,
) -> Result<SpriteSheet, FormatError> {
    let pointers = read_pointer_table(data, config)?;

    let mut sprites = Vec::with_capacity(pointers.len());
    for (index, &(address, offset)) in pointers.iter().enumerate() {
        let image = read_sprite(data, index, offset)?;
        trace!(
            index,
            address,
            offset,
            width = image.width(),
            height = image.height(),
            "sprite"
        );
        sprites.push(Sprite {
            address,
            offset,
            image,
        });
    }

    debug!(
        sprites = sprites.len(),
        base_address = config.base_address,
        "decoded sprite sheet"
    );
    Ok(SpriteSheet {
        config: *config,
        sprites,
    })
}
