// Licensed under the Apache-2.0 license

//! On-flash application image header shared between the host-side
//! stamping tool and firmware.
//!
//! The header occupies the first [`HEADER_REGION_SIZE`] bytes of a
//! flashable image; the application payload (starting at its vector
//! table) follows immediately after. All fields are little-endian.

#![no_std]

#[cfg(test)]
extern crate std;

use core::fmt;
use core::mem::offset_of;

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

pub const IMAGE_MAGIC: u32 = 0xA5A5_5A5A;
pub const IMAGE_HEADER_VERSION: u16 = 0x0001;

/// Size of the header region reserved at the start of an image. The
/// payload covered by the checksum starts at this offset.
pub const HEADER_REGION_SIZE: usize = 0x200;

/// Semantic version stamped into the header at build time. `build` is a
/// free-form build number outside the SemVer ordering.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct SemVer {
    pub major: u16,
    pub minor: u16,
    pub patch: u16,
    pub reserved: u16,
    pub build: u32,
}

impl fmt::Display for SemVer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// The application image header. `img_size` and `img_crc32` describe the
/// payload only (the header region is excluded from both) and are filled
/// in after the build by the stamping tool.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct ImageHeader {
    pub magic: u32,
    pub hdr_version: u16,
    pub flags: u16,
    pub ver: SemVer,
    pub img_size: u32,
    pub img_crc32: u32,
}

/// Byte offset of the `img_size` field within the header region.
pub const IMG_SIZE_OFFSET: usize = offset_of!(ImageHeader, img_size);

/// Byte offset of the `img_crc32` field within the header region.
pub const IMG_CRC_OFFSET: usize = offset_of!(ImageHeader, img_crc32);

impl ImageHeader {
    /// Structural check: magic and header version. Size and checksum are
    /// validated against the payload separately.
    pub fn verify(&self) -> bool {
        self.magic == IMAGE_MAGIC && self.hdr_version == IMAGE_HEADER_VERSION
    }
}
