//! KiB-based byte sizes
//!
//! Cloudian expresses every storage and bandwidth quota in KiB. [`ByteSize`]
//! keeps that unit explicit and allows literals such as `3 * TB`.

use std::fmt;
use std::ops::Mul;

/// A size counted in KiB.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ByteSize(u64);

pub const KB: ByteSize = ByteSize(1);
pub const MB: ByteSize = ByteSize(KB.0 << 10);
pub const GB: ByteSize = ByteSize(MB.0 << 10);
pub const TB: ByteSize = ByteSize(GB.0 << 10);

impl ByteSize {
    pub const fn from_kib(kib: u64) -> Self {
        Self(kib)
    }

    /// Size in KiB.
    pub const fn kb(self) -> u64 {
        self.0
    }

    pub fn mb(self) -> f64 {
        self.fraction_of(MB)
    }

    pub fn gb(self) -> f64 {
        self.fraction_of(GB)
    }

    pub fn tb(self) -> f64 {
        self.fraction_of(TB)
    }

    /// Decimal KiB count, the representation the Cloudian API expects.
    pub fn kb_string(self) -> String {
        self.0.to_string()
    }

    fn fraction_of(self, unit: ByteSize) -> f64 {
        let whole = self.0 / unit.0;
        let rest = self.0 % unit.0;
        whole as f64 + rest as f64 / unit.0 as f64
    }
}

impl Mul<ByteSize> for u64 {
    type Output = ByteSize;

    fn mul(self, rhs: ByteSize) -> ByteSize {
        ByteSize(self * rhs.0)
    }
}

impl Mul<u64> for ByteSize {
    type Output = ByteSize;

    fn mul(self, rhs: u64) -> ByteSize {
        ByteSize(self.0 * rhs)
    }
}

impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}KiB", self.0)
    }
}
