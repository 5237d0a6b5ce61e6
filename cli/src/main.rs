// Licensed under the Apache-2.0 license

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_num::maybe_hex;
use image_builder::{show_image_file, stamp_image_file, verify_image_file, StampConfig};

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fill in the image size and CRC32 fields of an image header
    Patch {
        /// Input image with the header at offset 0
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Output path (default: overwrite the input in place)
        #[arg(long)]
        out: Option<PathBuf>,

        /// Header region size in bytes
        #[arg(long, value_parser = maybe_hex::<u32>,
              default_value_t = image_header::HEADER_REGION_SIZE as u32)]
        hdr_size: u32,

        /// Byte offset of the image size field in the header
        #[arg(long, value_parser = maybe_hex::<u32>,
              default_value_t = image_header::IMG_SIZE_OFFSET as u32)]
        img_size_off: u32,

        /// Byte offset of the CRC32 field in the header
        #[arg(long, value_parser = maybe_hex::<u32>,
              default_value_t = image_header::IMG_CRC_OFFSET as u32)]
        crc_off: u32,

        /// Padding byte for the incomplete trailing word
        #[arg(long, value_parser = maybe_hex::<u8>, default_value_t = 0xFF)]
        pad: u8,
    },
    /// Check a stamped image the way the boot ROM does
    Verify {
        /// Path to the image file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Header region size in bytes
        #[arg(long, value_parser = maybe_hex::<u32>,
              default_value_t = image_header::HEADER_REGION_SIZE as u32)]
        hdr_size: u32,

        /// Padding byte for the incomplete trailing word
        #[arg(long, value_parser = maybe_hex::<u8>, default_value_t = 0xFF)]
        pad: u8,
    },
    /// Print the header fields of an image
    Show {
        /// Path to the image file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Header region size in bytes
        #[arg(long, value_parser = maybe_hex::<u32>,
              default_value_t = image_header::HEADER_REGION_SIZE as u32)]
        hdr_size: u32,
    },
}

fn main() {
    let cli = Cli::parse();
    let result = match &cli.command {
        Commands::Patch {
            file,
            out,
            hdr_size,
            img_size_off,
            crc_off,
            pad,
        } => {
            let cfg = StampConfig {
                hdr_size: *hdr_size as usize,
                size_offset: *img_size_off as usize,
                crc_offset: *crc_off as usize,
                pad_byte: *pad,
            };
            stamp_image_file(file, out.as_deref(), &cfg).map(|info| {
                let dest = out.as_deref().unwrap_or(file);
                println!(
                    "[OK] img_size={} crc32=0x{:08X} -> {}",
                    info.img_size,
                    info.img_crc32,
                    dest.display()
                );
            })
        }
        Commands::Verify {
            file,
            hdr_size,
            pad,
        } => {
            let cfg = StampConfig {
                hdr_size: *hdr_size as usize,
                pad_byte: *pad,
                ..StampConfig::default()
            };
            verify_image_file(file, &cfg)
        }
        Commands::Show { file, hdr_size } => show_image_file(file, *hdr_size as usize),
    };
    result.unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    });
}
