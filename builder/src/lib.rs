// Licensed under the Apache-2.0 license

mod checksum;
mod image;

pub use checksum::{align_payload, checksum_aligned, checksum_words, CRC_INIT, CRC_POLY};
pub use image::{
    patch_header, read_header, show_image_file, split_image, stamp_image, stamp_image_file,
    verify_image, verify_image_file, StampConfig, StampInfo,
};
