//! SGC file parser producing structured [`SgcFile`] data.

use crate::error::{GmeError, Result};
use crate::format::{SgcFile, SgcHeader, SgcSystem, HEADER_SIZE};

const MAGIC: &[u8; 4] = b"SGC\x1A";
/// Four 16 KiB slot registers reach 256 banks.
const MAX_ROM_SIZE: usize = 256 * 0x4000;

/// Parse an SGC image from raw bytes.
pub fn load_sgc(data: &[u8]) -> Result<SgcFile> {
    SgcParser { data }.parse()
}

struct SgcParser<'a> {
    data: &'a [u8],
}

impl SgcParser<'_> {
    fn parse(&self) -> Result<SgcFile> {
        if self.data.len() < MAGIC.len() || &self.data[..MAGIC.len()] != MAGIC {
            return Err(GmeError::WrongFileType);
        }
        if self.data.len() < HEADER_SIZE {
            return Err(GmeError::corrupt(format!(
                "SGC header needs {HEADER_SIZE} bytes, file has {}",
                self.data.len()
            )));
        }

        let system = match self.data[0x28] {
            0 => SgcSystem::MasterSystem,
            1 => SgcSystem::GameGear,
            2 => return Err(GmeError::Unsupported("ColecoVision SGC".into())),
            other => {
                return Err(GmeError::Unsupported(format!("SGC system {other}")));
            }
        };

        let song_count = self.data[0x25];
        if song_count == 0 {
            return Err(GmeError::corrupt("SGC declares no songs"));
        }
        let mut first_song = self.data[0x24];
        if first_song >= song_count {
            log::debug!("first song {first_song} out of range, using 0");
            first_song = 0;
        }

        let mut rst_addrs = [0u16; 7];
        for (i, addr) in rst_addrs.iter_mut().enumerate() {
            *addr = self.read_u16(0x12 + i * 2);
        }
        let mut mapping = [0u8; 4];
        mapping.copy_from_slice(&self.data[0x20..0x24]);

        let header = SgcHeader {
            version: self.data[4],
            pal: self.data[5] == 1,
            load_addr: self.read_u16(0x08),
            init_addr: self.read_u16(0x0A),
            play_addr: self.read_u16(0x0C),
            stack_ptr: self.read_u16(0x0E),
            rst_addrs,
            mapping,
            first_song,
            song_count,
            first_effect: self.data[0x26],
            last_effect: self.data[0x27],
            system,
            game: self.read_text(0x40, 32),
            author: self.read_text(0x60, 32),
            copyright: self.read_text(0x80, 32),
        };

        let rom = &self.data[HEADER_SIZE..];
        if rom.is_empty() {
            return Err(GmeError::corrupt("SGC has no program data"));
        }
        if rom.len() + header.load_addr as usize > MAX_ROM_SIZE {
            return Err(GmeError::OutOfMemory);
        }

        Ok(SgcFile {
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

    fn image(system: u8, rom: &[u8]) -> Vec<u8> {
        let mut data = vec![0u8; HEADER_SIZE];
        data[..4].copy_from_slice(MAGIC);
        data[4] = 1;
        data[5] = 1;
        data[0x08..0x0A].copy_from_slice(&0x0400u16.to_le_bytes());
        data[0x0A..0x0C].copy_from_slice(&0x0400u16.to_le_bytes());
        data[0x0C..0x0E].copy_from_slice(&0x0403u16.to_le_bytes());
        data[0x0E..0x10].copy_from_slice(&0xDFF0u16.to_le_bytes());
        data[0x12..0x14].copy_from_slice(&0x1234u16.to_le_bytes());
        data[0x20..0x24].copy_from_slice(&[0, 0, 1, 2]);
        data[0x24] = 1;
        data[0x25] = 2;
        data[0x28] = system;
        data[0x40..0x44].copy_from_slice(b"Game");
        data.extend_from_slice(rom);
        data
    }

    #[test]
    fn parses_header_fields() {
        let sgc = load_sgc(&image(1, &[0xC9])).unwrap();
        let h = &sgc.header;
        assert!(h.pal);
        assert_eq!(h.clock_rate(), 3_546_893);
        assert_eq!(h.play_period(), 70_937);
        assert_eq!(h.init_addr, 0x0400);
        assert_eq!(h.stack_ptr, 0xDFF0);
        assert_eq!(h.rst_addrs[0], 0x1234);
        assert_eq!(h.mapping, [0, 0, 1, 2]);
        assert_eq!(h.first_song, 1);
        assert_eq!(h.song_count, 2);
        assert_eq!(h.system, SgcSystem::GameGear);
        assert_eq!(h.game, "Game");
    }

    #[test]
    fn coleco_is_unsupported() {
        assert!(matches!(
            load_sgc(&image(2, &[0xC9])),
            Err(GmeError::Unsupported(_))
        ));
    }

    #[test]
    fn bad_input() {
        assert_eq!(load_sgc(b"SGC"), Err(GmeError::WrongFileType));
        assert_eq!(load_sgc(b"KSCC\0\0\0\0"), Err(GmeError::WrongFileType));
        assert!(matches!(load_sgc(b"SGC\x1A\0\0"), Err(GmeError::FileCorrupt(_))));
        assert!(matches!(load_sgc(&image(0, &[])), Err(GmeError::FileCorrupt(_))));
    }
}
