use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter};

/// Size class of an operand field.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    IntoPrimitive,
    TryFromPrimitive,
    EnumIter,
    Display,
)]
#[repr(u8)]
pub enum Width {
    W8 = 0,
    W16 = 1,
    W32 = 2,
    W64 = 3,
}

impl Width {
    pub fn bytes(self) -> usize {
        1 << u8::from(self)
    }

    pub fn fits_signed(self, v: i64) -> bool {
        match self {
            Width::W8 => i8::try_from(v).is_ok(),
            Width::W16 => i16::try_from(v).is_ok(),
            Width::W32 => i32::try_from(v).is_ok(),
            Width::W64 => true,
        }
    }

    pub fn fits_unsigned(self, v: u64) -> bool {
        match self {
            Width::W8 => u8::try_from(v).is_ok(),
            Width::W16 => u16::try_from(v).is_ok(),
            Width::W32 => u32::try_from(v).is_ok(),
            Width::W64 => true,
        }
    }

    pub fn fits(self, v: i64, signed: bool) -> bool {
        if signed {
            self.fits_signed(v)
        } else {
            u64::try_from(v).is_ok_and(|u| self.fits_unsigned(u))
        }
    }

    /// Little-endian bytes of `v` truncated to this width.
    pub fn encode(self, v: i64, out: &mut Vec<u8>) {
        out.extend_from_slice(&v.to_le_bytes()[..self.bytes()]);
    }

    /// Reads a little-endian value of this width, sign-extending when `signed`.
    pub fn decode(self, bytes: &[u8], signed: bool) -> Option<i64> {
        let n = self.bytes();
        let src = bytes.get(..n)?;
        let negative = signed && src[n - 1] & 0x80 != 0;
        let mut buf = if negative { [0xFF; 8] } else { [0; 8] };
        buf[..n].copy_from_slice(src);
        Some(i64::from_le_bytes(buf))
    }
}
