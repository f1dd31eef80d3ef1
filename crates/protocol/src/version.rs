//! BCD version words (bcdUSB, bcdDevice)

use serde::{Deserialize, Serialize};
use std::fmt;

/// Version split out of a 16-bit BCD word
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsbVersion {
    pub major: u8,
    pub minor: u8,
    pub sub: u8,
}

impl UsbVersion {
    /// Decode a `MMmS` word
    ///
    /// The word is rendered as four lowercase hex digits and the digits are
    /// read positionally: the first two as the major number, then one digit
    /// each for minor and sub. Each slice is parsed as a decimal prefix, so a
    /// non-decimal hex digit ends the number (`"1a"` reads as 1, `"ab"` as 0).
    pub fn from_bcd(bcd: u16) -> Self {
        let hex = format!("{:04x}", bcd);
        Self {
            major: decimal_prefix(&hex[0..2]),
            minor: decimal_prefix(&hex[2..3]),
            sub: decimal_prefix(&hex[3..4]),
        }
    }
}

impl fmt::Display for UsbVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.sub)
    }
}

fn decimal_prefix(digits: &str) -> u8 {
    digits
        .chars()
        .map_while(|c| c.to_digit(10))
        .fold(0u8, |acc, d| acc * 10 + d as u8)
}
