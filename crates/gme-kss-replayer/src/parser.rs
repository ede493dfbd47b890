//! KSS file parser producing structured [`KssFile`] data.

use crate::error::{GmeError, Result};
use crate::format::{
    DeviceFlags, KssFile, KssHeader, KssVariant, EXTRA_HEADER_SIZE, HEADER_SIZE,
};

/// Parse a KSS image from raw bytes.
pub fn load_kss(data: &[u8]) -> Result<KssFile> {
    KssParser { data }.parse()
}

struct KssParser<'a> {
    data: &'a [u8],
}

impl KssParser<'_> {
    fn parse(&self) -> Result<KssFile> {
        let variant = match self.data.get(..4) {
            Some(b"KSCC") => KssVariant::Kscc,
            Some(b"KSSX") => KssVariant::Kssx,
            _ => return Err(GmeError::WrongFileType),
        };
        if self.data.len() < HEADER_SIZE {
            return Err(GmeError::corrupt(format!(
                "KSS header needs {HEADER_SIZE} bytes, file has {}",
                self.data.len()
            )));
        }

        let mut warnings = Vec::new();
        let extra_header = self.data[0x0E];
        let (data_start, first_track_index, last_track_index) = match variant {
            KssVariant::Kscc => {
                if extra_header != 0 {
                    warnings.push("unknown data in KSCC header".to_string());
                }
                (HEADER_SIZE, 0, 0)
            }
            KssVariant::Kssx => {
                let start = HEADER_SIZE + extra_header as usize;
                if self.data.len() < start {
                    return Err(GmeError::corrupt("KSSX extension runs past end of file"));
                }
                if (extra_header as usize) < EXTRA_HEADER_SIZE {
                    warnings.push(format!("short KSSX extension ({extra_header} bytes)"));
                    (start, 0, 0)
                } else {
                    (start, self.read_u16(0x18), self.read_u16(0x1A))
                }
            }
        };

        let header = KssHeader {
            variant,
            load_addr: self.read_u16(0x04),
            load_size: self.read_u16(0x06),
            init_addr: self.read_u16(0x08),
            play_addr: self.read_u16(0x0A),
            first_bank: self.data[0x0C],
            bank_mode: self.data[0x0D],
            extra_header,
            device_flags: DeviceFlags::from_bits_truncate(self.data[0x0F]),
            first_track_index,
            last_track_index,
        };
        if header.uses_sn76489() && header.load_addr < 0x4000 {
            log::debug!("SMS image at 0x{:04X} overlaps the BIOS area", header.load_addr);
        }

        let body = &self.data[data_start..];
        let declared = header.load_size as usize;
        let room = 0x10000 - header.load_addr as usize;
        let load_size = declared.min(body.len()).min(room);
        if load_size != declared {
            warnings.push("excessive data size".to_string());
        }
        let (load_data, bank_data) = body.split_at(load_size);

        let bank_size = header.bank_size();
        let available = bank_data.len().div_ceil(bank_size);
        let mut bank_count = header.declared_banks();
        if bank_count > available {
            warnings.push("bank data missing".to_string());
            bank_count = available;
        }
        for w in &warnings {
            log::warn!("KSS: {w}");
        }

        Ok(KssFile {
            header,
            load_data: load_data.to_vec(),
            bank_data: bank_data.to_vec(),
            bank_count,
            warnings,
        })
    }

    fn read_u16(&self, offset: usize) -> u16 {
        u16::from_le_bytes([self.data[offset], self.data[offset + 1]])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(magic: &[u8; 4], extra: u8, load: &[u8], banks: &[u8]) -> Vec<u8> {
        let mut data = vec![0u8; HEADER_SIZE + extra as usize];
        data[..4].copy_from_slice(magic);
        data[0x04..0x06].copy_from_slice(&0x0100u16.to_le_bytes());
        data[0x06..0x08].copy_from_slice(&(load.len() as u16).to_le_bytes());
        data[0x08..0x0A].copy_from_slice(&0x0100u16.to_le_bytes());
        data[0x0A..0x0C].copy_from_slice(&0x0103u16.to_le_bytes());
        data[0x0C] = 4;
        data[0x0D] = 0x82;
        data[0x0E] = extra;
        if extra as usize >= EXTRA_HEADER_SIZE {
            data[0x18..0x1A].copy_from_slice(&2u16.to_le_bytes());
            data[0x1A..0x1C].copy_from_slice(&7u16.to_le_bytes());
        }
        data.extend_from_slice(load);
        data.extend_from_slice(banks);
        data
    }

    #[test]
    fn parses_kscc() {
        let kss = load_kss(&image(b"KSCC", 0, &[0xC9; 6], &[0x11; 0x4000])).unwrap();
        let h = &kss.header;
        assert_eq!(h.variant, KssVariant::Kscc);
        assert_eq!(h.load_addr, 0x0100);
        assert_eq!(h.play_addr, 0x0103);
        assert_eq!(h.first_bank, 4);
        assert_eq!(h.track_count(), 256);
        assert_eq!(kss.load_data.len(), 6);
        assert_eq!(kss.bank_count, 2);
        assert!(kss.warnings.is_empty());
    }

    #[test]
    fn parses_kssx_track_range() {
        let kss = load_kss(&image(b"KSSX", 0x10, &[0xC9; 6], &[0x11; 0x4000])).unwrap();
        assert_eq!(kss.header.track_count(), 8);
        assert_eq!(kss.header.first_track(), 2);
        assert_eq!(kss.load_data, vec![0xC9; 6]);
    }

    #[test]
    fn missing_banks_are_clamped_with_warning() {
        let kss = load_kss(&image(b"KSCC", 0, &[0xC9], &[0x11; 0x2001])).unwrap();
        assert_eq!(kss.bank_count, 2);
        let kss = load_kss(&image(b"KSCC", 0, &[0xC9], &[0x11; 0x100])).unwrap();
        assert_eq!(kss.bank_count, 1);
        assert_eq!(kss.warnings, vec!["bank data missing".to_string()]);
    }

    #[test]
    fn oversized_load_is_clamped() {
        let mut data = image(b"KSCC", 0, &[0xC9; 4], &[]);
        data[0x06..0x08].copy_from_slice(&0x1000u16.to_le_bytes());
        let kss = load_kss(&data).unwrap();
        assert_eq!(kss.load_data.len(), 4);
        assert!(kss.warnings.contains(&"excessive data size".to_string()));
    }

    #[test]
    fn foreign_magic_is_wrong_file_type() {
        assert_eq!(load_kss(b"NESM\x1A"), Err(GmeError::WrongFileType));
        assert_eq!(load_kss(b"KS"), Err(GmeError::WrongFileType));
        assert!(matches!(load_kss(b"KSCC\0\0"), Err(GmeError::FileCorrupt(_))));
    }
}
