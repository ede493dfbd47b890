//! NSF file parser producing structured [`NsfFile`] data.

use crate::error::{GmeError, Result};
use crate::format::{NsfFile, NsfHeader, HEADER_SIZE};

const MAGIC: &[u8; 5] = b"NESM\x1A";
/// 256 banks of 4 KiB, the reach of the 8-bit bank registers.
const MAX_ROM_SIZE: usize = 256 * 0x1000;

/// Parse an NSF image from raw bytes.
pub fn load_nsf(data: &[u8]) -> Result<NsfFile> {
    NsfParser { data }.parse()
}

struct NsfParser<'a> {
    data: &'a [u8],
}

impl NsfParser<'_> {
    fn parse(&self) -> Result<NsfFile> {
        if self.data.len() < MAGIC.len() || &self.data[..MAGIC.len()] != MAGIC {
            return Err(GmeError::WrongFileType);
        }
        if self.data.len() < HEADER_SIZE {
            return Err(GmeError::corrupt(format!(
                "NSF header needs {HEADER_SIZE} bytes, file has {}",
                self.data.len()
            )));
        }

        let track_count = self.data[6];
        if track_count == 0 {
            return Err(GmeError::corrupt("NSF declares no tracks"));
        }
        let mut first_track = self.data[7];
        if first_track == 0 || first_track > track_count {
            log::debug!("first track {first_track} out of range, using 1");
            first_track = 1;
        }

        let mut banks = [0u8; 8];
        banks.copy_from_slice(&self.data[0x70..0x78]);

        let header = NsfHeader {
            version: self.data[5],
            track_count,
            first_track,
            load_addr: self.read_u16(0x08),
            init_addr: self.read_u16(0x0A),
            play_addr: self.read_u16(0x0C),
            game: self.read_text(0x0E, 32),
            author: self.read_text(0x2E, 32),
            copyright: self.read_text(0x4E, 32),
            ntsc_speed: self.read_u16(0x6E),
            banks,
            pal_speed: self.read_u16(0x78),
            speed_flags: self.data[0x7A],
            chip_flags: self.data[0x7B],
        };

        if header.version != 1 {
            log::debug!("NSF version {} treated as version 1", header.version);
        }

        let rom = &self.data[HEADER_SIZE..];
        if rom.is_empty() {
            return Err(GmeError::corrupt("NSF has no program data"));
        }
        let padded = rom.len() + (header.load_addr as usize & 0xFFF);
        if padded > MAX_ROM_SIZE {
            return Err(GmeError::OutOfMemory);
        }

        Ok(NsfFile {
            header,
            rom: rom.to_vec(),
        })
    }

    fn read_u16(&self, offset: usize) -> u16 {
        u16::from_le_bytes([self.data[offset], self.data[offset + 1]])
    }

    /// Fixed-width field, NUL padded.
    fn read_text(&self, offset: usize, len: usize) -> String {
        let field = &self.data[offset..offset + len];
        let end = field.iter().position(|&b| b == 0).unwrap_or(len);
        String::from_utf8_lossy(&field[..end]).trim().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(rom: &[u8]) -> Vec<u8> {
        let mut data = vec![0u8; HEADER_SIZE];
        data[..5].copy_from_slice(MAGIC);
        data[5] = 1;
        data[6] = 3;
        data[7] = 2;
        data[0x08..0x0A].copy_from_slice(&0x8000u16.to_le_bytes());
        data[0x0A..0x0C].copy_from_slice(&0x8000u16.to_le_bytes());
        data[0x0C..0x0E].copy_from_slice(&0x8003u16.to_le_bytes());
        data[0x0E..0x12].copy_from_slice(b"Game");
        data[0x2E..0x34].copy_from_slice(b"Author");
        data[0x71] = 1;
        data[0x7B] = 0x01;
        data.extend_from_slice(rom);
        data
    }

    #[test]
    fn parses_header_fields() {
        let nsf = load_nsf(&image(&[0x60, 0xEA, 0xEA, 0x60])).unwrap();
        let h = &nsf.header;
        assert_eq!(h.track_count, 3);
        assert_eq!(h.first_track, 2);
        assert_eq!(h.init_addr, 0x8000);
        assert_eq!(h.play_addr, 0x8003);
        assert_eq!(h.game, "Game");
        assert_eq!(h.author, "Author");
        assert!(h.uses_bank_switching());
        assert_eq!(h.chip_flags, 0x01);
        assert_eq!(nsf.rom, vec![0x60, 0xEA, 0xEA, 0x60]);
    }

    #[test]
    fn unknown_magic_is_wrong_file_type() {
        assert_eq!(load_nsf(&[0x55; 16]), Err(GmeError::WrongFileType));
        assert_eq!(load_nsf(b"NES"), Err(GmeError::WrongFileType));
    }

    #[test]
    fn truncated_header_is_corrupt() {
        let data = image(&[0x60]);
        assert!(matches!(
            load_nsf(&data[..0x40]),
            Err(GmeError::FileCorrupt(_))
        ));
    }

    #[test]
    fn missing_rom_is_corrupt() {
        assert!(matches!(load_nsf(&image(&[])), Err(GmeError::FileCorrupt(_))));
    }

    #[test]
    fn first_track_out_of_range_defaults_to_one() {
        let mut data = image(&[0x60]);
        data[7] = 9;
        assert_eq!(load_nsf(&data).unwrap().header.first_track, 1);
    }
}
