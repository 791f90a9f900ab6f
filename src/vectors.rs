use binrw::{
    io::{Read, Seek, Write},
    BinRead, BinResult, BinWrite, Endian,
};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// An 8-bit RGBA color stored on disk as a packed ARGB word.
///
/// The word is read with the active endianness,
/// so little endian files store the channels in BGRA byte order.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const WHITE: Color = Color::new(0xFF, 0xFF, 0xFF, 0xFF);
    pub const BLACK: Color = Color::new(0, 0, 0, 0xFF);

    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Unpacks a color from the `0xAARRGGBB` layout used by Ninja files.
    /**
    ```rust
    use sa3d_lib::Color;

    assert_eq!(Color::new(0x11, 0x22, 0x33, 0x44), Color::from_argb(0x44112233));
    ```
    */
    pub fn from_argb(value: u32) -> Self {
        let [a, r, g, b] = value.to_be_bytes();
        Self { r, g, b, a }
    }

    /// Packs the color into the `0xAARRGGBB` layout used by Ninja files.
    pub fn to_argb(&self) -> u32 {
        u32::from_be_bytes([self.a, self.r, self.g, self.b])
    }
}

impl BinRead for Color {
    type Args<'a> = ();

    fn read_options<R: Read + Seek>(
        reader: &mut R,
        endian: Endian,
        args: Self::Args<'_>,
    ) -> BinResult<Self> {
        u32::read_options(reader, endian, args).map(Self::from_argb)
    }
}

impl BinWrite for Color {
    type Args<'a> = ();

    fn write_options<W: Write + Seek>(
        &self,
        writer: &mut W,
        endian: Endian,
        args: Self::Args<'_>,
    ) -> BinResult<()> {
        self.to_argb().write_options(writer, endian, args)
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::WHITE
    }
}

/// A bounding sphere record with the center followed by the radius.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(BinRead, BinWrite, Debug, Clone, Copy, PartialEq, Default)]
pub struct BoundingSphere {
    pub center: [f32; 3],
    pub radius: f32,
}
