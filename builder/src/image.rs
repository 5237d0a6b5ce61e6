// Licensed under the Apache-2.0 license

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use anyhow::{anyhow, bail, Result};
use image_header::{ImageHeader, IMAGE_HEADER_VERSION, IMAGE_MAGIC};
use zerocopy::FromBytes;

use crate::checksum::{align_payload, checksum_aligned};

/// Blanket floor on how many bytes must follow the header region.
const MIN_IMAGE_TAIL: usize = 8;

/// Geometry of the header region and the two fields the stamping pass
/// fills in. Defaults match the canonical layout in `image-header`;
/// builds that move the fields override the offsets. The offsets are
/// not cross-checked against `hdr_size`.
#[derive(Debug, Clone, Copy)]
pub struct StampConfig {
    pub hdr_size: usize,
    pub size_offset: usize,
    pub crc_offset: usize,
    pub pad_byte: u8,
}

impl Default for StampConfig {
    fn default() -> Self {
        Self {
            hdr_size: image_header::HEADER_REGION_SIZE,
            size_offset: image_header::IMG_SIZE_OFFSET,
            crc_offset: image_header::IMG_CRC_OFFSET,
            pad_byte: 0xFF,
        }
    }
}

/// The two values written back into the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StampInfo {
    pub img_size: u32,
    pub img_crc32: u32,
}

/// Splits an image into its header region and payload. The image must
/// be at least `hdr_size` plus [`MIN_IMAGE_TAIL`] bytes long.
pub fn split_image(data: &[u8], hdr_size: usize) -> Result<(&[u8], &[u8])> {
    let min = hdr_size + MIN_IMAGE_TAIL;
    if data.len() < min {
        bail!(
            "image too small: {} bytes, need at least {} (hdr_size={})",
            data.len(),
            min,
            hdr_size
        );
    }
    Ok(data.split_at(hdr_size))
}

fn write_field(data: &mut [u8], offset: usize, value: u32, name: &str) -> Result<()> {
    let len = data.len();
    let field = offset
        .checked_add(4)
        .and_then(|end| data.get_mut(offset..end))
        .ok_or_else(|| {
            anyhow!(
                "{} field at offset {:#x} does not fit in a {}-byte image",
                name,
                offset,
                len
            )
        })?;
    field.copy_from_slice(&value.to_le_bytes());
    Ok(())
}

/// Writes the size and checksum fields as little-endian u32 at the
/// configured offsets. Every other byte is left untouched.
pub fn patch_header(data: &mut [u8], cfg: &StampConfig, info: StampInfo) -> Result<()> {
    write_field(data, cfg.size_offset, info.img_size, "img_size")?;
    write_field(data, cfg.crc_offset, info.img_crc32, "img_crc32")?;
    Ok(())
}

/// Runs the stamping pipeline over an in-memory image: validate the
/// size floor, split off the payload, pad it to whole words, checksum
/// it, and patch the header fields. The checksum covers the payload
/// only, so re-stamping an already stamped image is a no-op on the
/// computed values.
pub fn stamp_image(data: &mut [u8], cfg: &StampConfig) -> Result<StampInfo> {
    let info = {
        let (_, payload) = split_image(data, cfg.hdr_size)?;
        let (aligned, img_size) = align_payload(payload, cfg.pad_byte);
        StampInfo {
            img_size: img_size as u32,
            img_crc32: checksum_aligned(&aligned),
        }
    };
    patch_header(data, cfg, info)?;
    Ok(info)
}

/// Stamps an image file. The result is staged fully in memory and the
/// destination (the input path when `output` is `None`) is written in
/// one pass only after the header is patched, so a failure anywhere in
/// the pipeline leaves the destination untouched.
pub fn stamp_image_file(
    input: &Path,
    output: Option<&Path>,
    cfg: &StampConfig,
) -> Result<StampInfo> {
    let mut data = load_file(input)?;
    let info = stamp_image(&mut data, cfg)?;

    let dest = output.unwrap_or(input);
    let mut file = File::create(dest)
        .map_err(|e| anyhow!("Cannot create file '{}': {}", dest.display(), e))?;
    file.write_all(&data)
        .map_err(|e| anyhow!("Cannot write file '{}': {}", dest.display(), e))?;

    Ok(info)
}

/// Parses the typed header at the start of the header region.
pub fn read_header(data: &[u8], hdr_size: usize) -> Result<ImageHeader> {
    let (header_region, _) = split_image(data, hdr_size)?;
    let (header, _) = ImageHeader::read_from_prefix(header_region)
        .map_err(|_| anyhow!("header region too small for an image header"))?;
    Ok(header)
}

/// Re-checks, on the host, everything the boot ROM validates before
/// jumping to the application: magic, header version, recorded payload
/// size, and the payload checksum.
pub fn verify_image(data: &[u8], cfg: &StampConfig) -> Result<ImageHeader> {
    let header = read_header(data, cfg.hdr_size)?;
    if header.magic != IMAGE_MAGIC {
        bail!(
            "invalid header magic {:#010x} (expected {:#010x})",
            header.magic,
            IMAGE_MAGIC
        );
    }
    if header.hdr_version != IMAGE_HEADER_VERSION {
        bail!("unsupported header version {}", header.hdr_version);
    }

    let (_, payload) = split_image(data, cfg.hdr_size)?;
    if header.img_size as usize != payload.len() {
        bail!(
            "image size mismatch: header says {}, payload is {} bytes",
            header.img_size,
            payload.len()
        );
    }

    let (aligned, _) = align_payload(payload, cfg.pad_byte);
    let crc = checksum_aligned(&aligned);
    if crc != header.img_crc32 {
        bail!(
            "image checksum mismatch: header says {:#010x}, computed {:#010x}",
            header.img_crc32,
            crc
        );
    }

    Ok(header)
}

pub fn verify_image_file(path: &Path, cfg: &StampConfig) -> Result<()> {
    let data = load_file(path)?;
    let header = verify_image(&data, cfg)?;
    println!(
        "version={} build={} img_size={} crc32=0x{:08X}",
        header.ver, header.ver.build, header.img_size, header.img_crc32
    );
    println!("Image is valid!");
    Ok(())
}

pub fn show_image_file(path: &Path, hdr_size: usize) -> Result<()> {
    let data = load_file(path)?;
    let header = read_header(&data, hdr_size)?;
    println!("magic:       {:#010x}", header.magic);
    println!("hdr_version: {}", header.hdr_version);
    println!("flags:       {:#06x}", header.flags);
    println!("version:     {} (build {})", header.ver, header.ver.build);
    println!("img_size:    {}", header.img_size);
    println!("img_crc32:   0x{:08X}", header.img_crc32);
    if !header.verify() {
        println!("Warning: magic/version check failed; not a stamped application image?");
    }
    Ok(())
}

fn load_file(path: &Path) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();

    let mut file = File::open(path)
        .map_err(|e| anyhow!("Cannot open file '{}': {}", path.display(), e))?;
    file.read_to_end(&mut buffer)
        .map_err(|e| anyhow!("Cannot read file '{}': {}", path.display(), e))?;

    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image_header::{SemVer, HEADER_REGION_SIZE};
    use std::io::Write;
    use tempfile::NamedTempFile;
    use zerocopy::IntoBytes;

    /// Builds an image with a populated header at offset 0, the rest of
    /// the header region in the flash erase pattern, and `payload`
    /// following it.
    fn test_image(hdr_size: usize, payload: &[u8]) -> Vec<u8> {
        let header = ImageHeader {
            magic: IMAGE_MAGIC,
            hdr_version: IMAGE_HEADER_VERSION,
            flags: 0xFFFF,
            ver: SemVer {
                major: 1,
                minor: 2,
                patch: 1,
                reserved: 0,
                build: 123,
            },
            img_size: 0,
            img_crc32: 0,
        };
        let mut image = vec![0xFF; hdr_size];
        image[..std::mem::size_of::<ImageHeader>()].copy_from_slice(header.as_bytes());
        image.extend_from_slice(payload);
        image
    }

    fn create_temp_file(content: &[u8]) -> NamedTempFile {
        let mut temp_file = NamedTempFile::new().expect("Failed to create temp file");
        temp_file
            .write_all(content)
            .expect("Failed to write to temp file");
        temp_file
    }

    #[test]
    fn test_split_enforces_size_floor() {
        let short = vec![0u8; HEADER_REGION_SIZE + 7];
        let err = split_image(&short, HEADER_REGION_SIZE).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("519"), "missing actual size: {}", msg);
        assert!(msg.contains("520"), "missing required size: {}", msg);

        let ok = vec![0u8; HEADER_REGION_SIZE + 8];
        let (header, payload) = split_image(&ok, HEADER_REGION_SIZE).unwrap();
        assert_eq!(header.len(), HEADER_REGION_SIZE);
        assert_eq!(payload.len(), 8);
    }

    #[test]
    fn test_patch_touches_only_the_two_fields() {
        let original: Vec<u8> = (0..0x210).map(|i| (i % 251) as u8).collect();
        let mut patched = original.clone();
        patch_header(
            &mut patched,
            &StampConfig::default(),
            StampInfo {
                img_size: 4,
                img_crc32: 0,
            },
        )
        .unwrap();

        assert_eq!(&patched[20..24], &[0x04, 0x00, 0x00, 0x00]);
        assert_eq!(&patched[24..28], &[0x00, 0x00, 0x00, 0x00]);
        assert_eq!(&patched[..20], &original[..20]);
        assert_eq!(&patched[28..], &original[28..]);
    }

    #[test]
    fn test_patch_rejects_out_of_range_offset() {
        let mut data = vec![0u8; 64];
        let cfg = StampConfig {
            hdr_size: 32,
            size_offset: 20,
            crc_offset: 62,
            pad_byte: 0xFF,
        };
        let err = patch_header(
            &mut data,
            &cfg,
            StampInfo {
                img_size: 0,
                img_crc32: 0,
            },
        )
        .unwrap_err();
        assert!(err.to_string().contains("img_crc32"));
    }

    #[test]
    fn test_stamp_known_payload() {
        // An all-ones payload word checksums to zero, so both stamped
        // fields are fully predictable.
        let mut image = test_image(HEADER_REGION_SIZE, &[0xFF; 8]);
        let info = stamp_image(&mut image, &StampConfig::default()).unwrap();
        assert_eq!(info.img_size, 8);
        assert_eq!(info.img_crc32, 0x0000_0000);
        assert_eq!(&image[20..24], &[0x08, 0x00, 0x00, 0x00]);
        assert_eq!(&image[24..28], &[0x00, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn test_stamp_is_idempotent() {
        let payload: Vec<u8> = (0u32..13).map(|i| (i * 29 + 3) as u8).collect();
        let mut image = test_image(HEADER_REGION_SIZE, &payload);
        let cfg = StampConfig::default();

        let first = stamp_image(&mut image, &cfg).unwrap();
        assert_eq!(first.img_size, 13);

        // The stamped fields themselves must not feed back into the
        // checksum; scribbling over them changes nothing.
        image[20..28].copy_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF, 0xDE, 0xAD, 0xBE, 0xEF]);
        let second = stamp_image(&mut image, &cfg).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_stamp_file_in_place() {
        let image = test_image(HEADER_REGION_SIZE, &[0x55; 12]);
        let temp = create_temp_file(&image);
        let cfg = StampConfig::default();

        let info = stamp_image_file(temp.path(), None, &cfg).unwrap();
        let stamped = std::fs::read(temp.path()).unwrap();
        assert_eq!(&stamped[20..24], &info.img_size.to_le_bytes());
        assert_eq!(&stamped[24..28], &info.img_crc32.to_le_bytes());
        assert_eq!(&stamped[..20], &image[..20]);
        assert_eq!(&stamped[28..], &image[28..]);

        // Stamping the stamped file again must be a fixed point.
        let again = stamp_image_file(temp.path(), None, &cfg).unwrap();
        assert_eq!(info, again);
        assert_eq!(stamped, std::fs::read(temp.path()).unwrap());
    }

    #[test]
    fn test_stamp_file_failure_leaves_destination_untouched() {
        let temp = create_temp_file(&[0u8; 16]);
        let out_dir = tempfile::tempdir().unwrap();
        let out_path = out_dir.path().join("stamped.bin");

        let result = stamp_image_file(temp.path(), Some(&out_path), &StampConfig::default());
        assert!(result.is_err());
        assert!(!out_path.exists());
    }

    #[test]
    fn test_stamped_image_verifies() {
        let payload: Vec<u8> = (0u32..21).map(|i| (i * 7 + 1) as u8).collect();
        let image = test_image(HEADER_REGION_SIZE, &payload);
        let temp = create_temp_file(&image);
        let out = NamedTempFile::new().unwrap();
        let cfg = StampConfig::default();

        stamp_image_file(temp.path(), Some(out.path()), &cfg).unwrap();
        verify_image_file(out.path(), &cfg).unwrap();

        // Source file must not have been modified.
        assert_eq!(std::fs::read(temp.path()).unwrap(), image);
    }

    #[test]
    fn test_verify_catches_payload_corruption() {
        let mut image = test_image(HEADER_REGION_SIZE, &[0x33; 16]);
        let cfg = StampConfig::default();
        stamp_image(&mut image, &cfg).unwrap();
        verify_image(&image, &cfg).unwrap();

        image[HEADER_REGION_SIZE + 5] ^= 0x01;
        let err = verify_image(&image, &cfg).unwrap_err();
        assert!(err.to_string().contains("checksum mismatch"));
    }

    #[test]
    fn test_verify_catches_size_mismatch() {
        let mut image = test_image(HEADER_REGION_SIZE, &[0x33; 16]);
        let cfg = StampConfig::default();
        stamp_image(&mut image, &cfg).unwrap();

        image.push(0x00);
        let err = verify_image(&image, &cfg).unwrap_err();
        assert!(err.to_string().contains("size mismatch"));
    }

    #[test]
    fn test_verify_rejects_bad_magic() {
        let mut image = test_image(HEADER_REGION_SIZE, &[0x33; 16]);
        let cfg = StampConfig::default();
        stamp_image(&mut image, &cfg).unwrap();

        image[0] ^= 0xFF;
        let err = verify_image(&image, &cfg).unwrap_err();
        assert!(err.to_string().contains("magic"));
    }
}
