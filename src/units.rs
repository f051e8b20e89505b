use serde::{Deserialize, Serialize};

/// Byte-scale codes for the space dimension.
pub const SPACE_BYTE: u8 = 0;
pub const SPACE_KBYTE: u8 = 1;
pub const SPACE_MBYTE: u8 = 2;

/// Time-scale codes for the time dimension.
pub const TIME_NSEC: u8 = 0;
pub const TIME_USEC: u8 = 1;
pub const TIME_MSEC: u8 = 2;
pub const TIME_SEC: u8 = 3;

/// The one-to-one count scale.
pub const COUNT_ONE: u8 = 0;

/// Dimensional unit of a metric value.
///
/// Each of the three dimensions (space, time, count) carries a signed
/// exponent and a scale code; together they pack into the 32-bit dimension
/// word embedded in every metric descriptor. Exponents outside -8..=7 do not
/// fit the packed representation and must not be constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    dim_space: i8,
    dim_time: i8,
    dim_count: i8,
    scale_space: u8,
    scale_time: u8,
    scale_count: u8,
}

impl Unit {
    const fn new(
        dim_space: i8,
        dim_time: i8,
        dim_count: i8,
        scale_space: u8,
        scale_time: u8,
        scale_count: u8,
    ) -> Self {
        Self {
            dim_space,
            dim_time,
            dim_count,
            scale_space,
            scale_time,
            scale_count,
        }
    }

    /// A dimensionless unit.
    pub const fn none() -> Self {
        Self::new(0, 0, 0, 0, 0, 0)
    }

    pub const fn bytes() -> Self {
        Self::new(1, 0, 0, SPACE_BYTE, 0, 0)
    }

    pub const fn kilobytes() -> Self {
        Self::new(1, 0, 0, SPACE_KBYTE, 0, 0)
    }

    pub const fn megabytes() -> Self {
        Self::new(1, 0, 0, SPACE_MBYTE, 0, 0)
    }

    pub const fn nanoseconds() -> Self {
        Self::new(0, 1, 0, 0, TIME_NSEC, 0)
    }

    pub const fn microseconds() -> Self {
        Self::new(0, 1, 0, 0, TIME_USEC, 0)
    }

    pub const fn milliseconds() -> Self {
        Self::new(0, 1, 0, 0, TIME_MSEC, 0)
    }

    pub const fn seconds() -> Self {
        Self::new(0, 1, 0, 0, TIME_SEC, 0)
    }

    /// A plain event count.
    pub const fn count() -> Self {
        Self::new(0, 0, 1, 0, 0, COUNT_ONE)
    }

    /// Events per second (count over time).
    pub const fn per_second() -> Self {
        Self::new(0, -1, 1, 0, TIME_SEC, COUNT_ONE)
    }

    /// Pack into the descriptor's 32-bit dimension word: three signed 4-bit
    /// dimension exponents, three 4-bit scale codes, low byte zero.
    pub fn dimensions(&self) -> u32 {
        ((self.dim_space as u32 & 0xf) << 28)
            | ((self.dim_time as u32 & 0xf) << 24)
            | ((self.dim_count as u32 & 0xf) << 20)
            | ((self.scale_space as u32 & 0xf) << 16)
            | ((self.scale_time as u32 & 0xf) << 12)
            | ((self.scale_count as u32 & 0xf) << 8)
    }
}

impl Default for Unit {
    fn default() -> Self {
        Self::none()
    }
}
