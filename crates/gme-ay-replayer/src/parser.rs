//! AY file parser producing structured [`AyFile`] data.
//!
//! Every multi-byte field is big-endian and every pointer is a signed
//! offset relative to the field holding it.

use std::cell::RefCell;

use crate::error::{AyError, Result};
use crate::format::{AyBlock, AyFile, AyHeader, AyPoints, AySong, AySongData};

type ParseResult<T> = std::result::Result<T, AyError>;

const HEADER_SIZE: usize = 0x14;

/// Parse an AY container from raw bytes.
pub fn load_ay(data: &[u8]) -> Result<AyFile> {
    let parser = AyParser {
        data,
        warnings: RefCell::new(Vec::new()),
    };
    Ok(parser.parse()?)
}

struct AyParser<'a> {
    data: &'a [u8],
    warnings: RefCell<Vec<String>>,
}

impl AyParser<'_> {
    fn parse(&self) -> ParseResult<AyFile> {
        if self.data.len() < 4 || &self.data[0..4] != b"ZXAY" {
            return Err(AyError::InvalidFileId);
        }
        if self.data.len() < HEADER_SIZE {
            return Err(AyError::UnexpectedEof { offset: 0 });
        }

        let type_id = &self.data[4..8];
        if type_id != b"EMUL" {
            let typ = String::from_utf8_lossy(type_id).to_string();
            return Err(AyError::UnsupportedType { typ });
        }

        let file_version = self.read_u16(8)?;
        let player_version = self.read_u8(10)?;
        let author = self.read_string_pointer(12)?;
        let misc = self.read_string_pointer(14)?;

        let song_count = self.read_u8(16)? as usize + 1;
        let mut first_song = self.read_u8(17)? as usize;
        if first_song >= song_count {
            log::debug!("first song {} out of range, using 1", first_song + 1);
            first_song = 0;
        }
        let songs_ptr = self.read_required_pointer(18)?;

        let header = AyHeader {
            file_version,
            player_version,
            author,
            misc,
            song_count,
            first_song,
        };

        let songs = self.parse_song_structures(song_count, songs_ptr)?;
        Ok(AyFile {
            header,
            songs,
            warnings: self.warnings.take(),
        })
    }

    fn warn(&self, msg: String) {
        log::warn!("{msg}");
        self.warnings.borrow_mut().push(msg);
    }

    fn parse_song_structures(&self, count: usize, base_offset: usize) -> ParseResult<Vec<AySong>> {
        let mut songs = Vec::with_capacity(count);
        for idx in 0..count {
            let entry_offset = base_offset + idx * 4;
            self.ensure_range(entry_offset, 4)?;

            let name = match self.resolve_pointer(entry_offset)? {
                Some(ptr) => self.read_nt_string(ptr)?,
                None => format!("Song {}", idx + 1),
            };
            let data_offset = self.read_required_pointer(entry_offset + 2)?;
            let data = self.parse_song_data(data_offset)?;
            songs.push(AySong { name, data });
        }
        Ok(songs)
    }

    fn parse_song_data(&self, offset: usize) -> ParseResult<AySongData> {
        self.ensure_range(offset, 14)?;
        let channel_map = [
            self.data[offset],
            self.data[offset + 1],
            self.data[offset + 2],
            self.data[offset + 3],
        ];
        let points = match self.resolve_pointer(offset + 10)? {
            Some(ptr) => Some(self.parse_points(ptr)?),
            None => None,
        };
        let blocks = match self.resolve_pointer(offset + 12)? {
            Some(ptr) => self.parse_blocks(ptr)?,
            None => Vec::new(),
        };

        Ok(AySongData {
            channel_map,
            song_length_50hz: self.read_u16(offset + 4)?,
            fade_length_50hz: self.read_u16(offset + 6)?,
            hi_reg: self.data[offset + 8],
            lo_reg: self.data[offset + 9],
            points,
            blocks,
        })
    }

    fn parse_points(&self, offset: usize) -> ParseResult<AyPoints> {
        // Some rips end the file inside the points table; missing words read as 0.
        let word = |at: usize| {
            if at + 2 <= self.data.len() {
                u16::from_be_bytes([self.data[at], self.data[at + 1]])
            } else {
                0
            }
        };
        if offset + 6 > self.data.len() {
            self.warn(format!("points table at 0x{offset:04x} truncated"));
        }
        Ok(AyPoints {
            stack: word(offset),
            init: word(offset + 2),
            interrupt: word(offset + 4),
        })
    }

    fn parse_blocks(&self, mut offset: usize) -> ParseResult<Vec<AyBlock>> {
        let mut blocks = Vec::new();
        loop {
            if offset + 2 > self.data.len() {
                self.warn(format!("block table at 0x{offset:04x} not terminated"));
                break;
            }
            let address = self.read_u16(offset)?;
            if address == 0 {
                break;
            }
            self.ensure_range(offset, 6)?;
            let length = self.read_u16(offset + 2)? as usize;
            let Some(start) = self.resolve_pointer(offset + 4)? else {
                return Err(AyError::MissingPointer { offset: offset + 4 });
            };

            let room = 0x10000 - address as usize;
            let mut len = length;
            if len > room {
                self.warn(format!(
                    "block at 0x{address:04x} runs past 64K, {} bytes dropped",
                    len - room
                ));
                len = room;
            }
            let available = self.data.len() - start;
            if len > available {
                self.warn(format!(
                    "block at 0x{address:04x} missing {} bytes of data",
                    len - available
                ));
                len = available;
            }
            blocks.push(AyBlock {
                address,
                data: self.data[start..start + len].to_vec(),
            });
            offset += 6;
        }
        Ok(blocks)
    }

    fn read_string_pointer(&self, offset: usize) -> ParseResult<String> {
        match self.resolve_pointer(offset)? {
            Some(ptr) => self.read_nt_string(ptr),
            None => Ok(String::new()),
        }
    }

    fn read_u8(&self, offset: usize) -> ParseResult<u8> {
        self.ensure_range(offset, 1)?;
        Ok(self.data[offset])
    }

    fn read_u16(&self, offset: usize) -> ParseResult<u16> {
        self.ensure_range(offset, 2)?;
        Ok(u16::from_be_bytes([self.data[offset], self.data[offset + 1]]))
    }

    fn read_required_pointer(&self, offset: usize) -> ParseResult<usize> {
        self.resolve_pointer(offset)?
            .ok_or(AyError::MissingPointer { offset })
    }

    /// Follow the relative pointer stored at `origin`; zero means absent.
    fn resolve_pointer(&self, origin: usize) -> ParseResult<Option<usize>> {
        self.ensure_range(origin, 2)?;
        let rel = i16::from_be_bytes([self.data[origin], self.data[origin + 1]]);
        if rel == 0 {
            return Ok(None);
        }
        let target = origin as isize + rel as isize;
        if target < 0 || target >= self.data.len() as isize {
            return Err(AyError::PointerOutOfRange { offset: origin });
        }
        Ok(Some(target as usize))
    }

    /// NUL-terminated string; a string cut off by the end of file is kept.
    fn read_nt_string(&self, start: usize) -> ParseResult<String> {
        let tail = &self.data[start..];
        let end = match tail.iter().position(|&b| b == 0) {
            Some(end) => end,
            None => {
                self.warn(format!("unterminated string at 0x{start:04x}"));
                tail.len()
            }
        };
        Ok(String::from_utf8_lossy(&tail[..end]).to_string())
    }

    fn ensure_range(&self, offset: usize, size: usize) -> ParseResult<()> {
        if offset.saturating_add(size) > self.data.len() {
            return Err(AyError::UnexpectedEof { offset });
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::GmeError;

    /// Builds a one-song file: header, song table, song data, points,
    /// block table and one block payload.
    pub(crate) fn single_song(init: u16, interrupt: u16, payload: &[u8], load: u16) -> Vec<u8> {
        let mut d = vec![0u8; 0x14];
        d[0..4].copy_from_slice(b"ZXAY");
        d[4..8].copy_from_slice(b"EMUL");
        d[8..10].copy_from_slice(&3u16.to_be_bytes());
        // author at 0x40, misc absent, 1 song, songs table at 0x14
        d[12..14].copy_from_slice(&((0x40 - 12) as i16).to_be_bytes());
        d[18..20].copy_from_slice(&((0x14 - 18) as i16).to_be_bytes());
        // song entry at 0x14: name at 0x4A, data at 0x18
        d.extend_from_slice(&((0x4A - 0x14) as i16).to_be_bytes());
        d.extend_from_slice(&((0x18 - 0x16) as i16).to_be_bytes());
        // song data at 0x18
        d.extend_from_slice(&[0, 1, 2, 3]);
        d.extend_from_slice(&100u16.to_be_bytes());
        d.extend_from_slice(&0u16.to_be_bytes());
        d.extend_from_slice(&[0x12, 0x34]);
        d.extend_from_slice(&((0x28 - 0x22) as i16).to_be_bytes());
        d.extend_from_slice(&((0x30 - 0x24) as i16).to_be_bytes());
        d.resize(0x28, 0);
        // points at 0x28
        d.extend_from_slice(&0xF000u16.to_be_bytes());
        d.extend_from_slice(&init.to_be_bytes());
        d.extend_from_slice(&interrupt.to_be_bytes());
        d.resize(0x30, 0);
        // block table at 0x30: one block, payload at 0x50
        d.extend_from_slice(&load.to_be_bytes());
        d.extend_from_slice(&(payload.len() as u16).to_be_bytes());
        d.extend_from_slice(&((0x50 - 0x34) as i16).to_be_bytes());
        d.extend_from_slice(&0u16.to_be_bytes());
        d.resize(0x40, 0);
        d.extend_from_slice(b"Composer\0");
        d.resize(0x4A, 0);
        d.extend_from_slice(b"Tune\0");
        d.resize(0x50, 0);
        d.extend_from_slice(payload);
        d
    }

    #[test]
    fn parses_single_song() {
        let ay = load_ay(&single_song(0x8000, 0x8010, &[0xC9; 4], 0x8000)).unwrap();
        assert_eq!(ay.header.author, "Composer");
        assert_eq!(ay.header.misc, "");
        assert_eq!(ay.header.song_count, 1);
        let song = &ay.songs[0];
        assert_eq!(song.name, "Tune");
        assert_eq!(song.data.register_preset(), 0x1234);
        assert_eq!(song.data.length_secs(), Some(2.0));
        let points = song.data.points.unwrap();
        assert_eq!(points.stack, 0xF000);
        assert_eq!(points.init, 0x8000);
        assert_eq!(points.interrupt, 0x8010);
        assert_eq!(song.data.blocks.len(), 1);
        assert_eq!(song.data.blocks[0].address, 0x8000);
        assert_eq!(song.data.blocks[0].data, vec![0xC9; 4]);
        assert!(ay.warnings.is_empty());
    }

    #[test]
    fn truncated_block_is_clamped_with_warning() {
        let mut data = single_song(0x8000, 0, &[0xC9; 16], 0x8000);
        data.truncate(data.len() - 10);
        let ay = load_ay(&data).unwrap();
        assert_eq!(ay.songs[0].data.blocks[0].data.len(), 6);
        assert_eq!(ay.warnings.len(), 1);
        assert!(ay.warnings[0].contains("missing 10 bytes"));
    }

    #[test]
    fn block_past_64k_is_clamped() {
        let ay = load_ay(&single_song(0xFFF0, 0, &[0; 0x20], 0xFFF0)).unwrap();
        assert_eq!(ay.songs[0].data.blocks[0].data.len(), 0x10);
        assert!(ay.warnings[0].contains("past 64K"));
    }

    #[test]
    fn wrong_magic_and_type() {
        assert_eq!(load_ay(&[0u8; 16]).unwrap_err(), GmeError::WrongFileType);
        let mut data = single_song(0x8000, 0, &[0xC9], 0x8000);
        data[4..8].copy_from_slice(b"AMAD");
        assert!(matches!(load_ay(&data), Err(GmeError::Unsupported(_))));
    }

    #[test]
    fn short_header_is_corrupt() {
        assert!(matches!(load_ay(b"ZXAYEMUL"), Err(GmeError::FileCorrupt(_))));
    }

    #[test]
    fn pointer_outside_file_is_corrupt() {
        let mut data = single_song(0x8000, 0, &[0xC9], 0x8000);
        data[18..20].copy_from_slice(&0x7000i16.to_be_bytes());
        assert!(matches!(load_ay(&data), Err(GmeError::FileCorrupt(_))));
    }
}
