//! SAP parser: text header lines, then `FFFF start end` binary blocks.

use nom::bytes::complete::{tag, take_till, take_while1};
use nom::character::complete::{char, digit1, line_ending, space0, space1};
use nom::combinator::{map_res, opt};
use nom::number::complete::le_u16;
use nom::sequence::{preceded, terminated, tuple};
use nom::IResult;

use crate::error::{Result, SapError};
use crate::format::{SapBlock, SapFile, SapHeader, SapType, NTSC_LINES, PAL_LINES};

const BINARY_MARKER: [u8; 2] = [0xFF, 0xFF];
/// Upper bound on `SONGS`.
const MAX_SONGS: usize = 256;

/// Parse a SAP file from raw bytes.
pub fn load_sap(data: &[u8]) -> Result<SapFile> {
    Ok(parse(data)?)
}

fn signature(input: &[u8]) -> IResult<&[u8], &[u8]> {
    terminated(tag("SAP"), line_ending)(input)
}

/// `KEY` or `KEY value`, up to the line ending.
fn header_line(input: &[u8]) -> IResult<&[u8], (&[u8], Option<&[u8]>)> {
    terminated(
        tuple((
            take_while1(|c: u8| c.is_ascii_alphanumeric() || c == b'_'),
            opt(preceded(space1, take_till(|c: u8| c == b'\r' || c == b'\n'))),
        )),
        line_ending,
    )(input)
}

fn number(input: &[u8]) -> IResult<&[u8], u32> {
    map_res(digit1, |d: &[u8]| {
        std::str::from_utf8(d)
            .map_err(|_| ())
            .and_then(|s| s.parse::<u32>().map_err(|_| ()))
    })(input)
}

/// `mm:ss[.fff] [LOOP]`, returning seconds and the loop flag.
fn time_value(input: &[u8]) -> IResult<&[u8], (f32, bool)> {
    let (rest, (minutes, _, seconds, fraction, _, looped)) = tuple((
        number,
        char(':'),
        number,
        opt(preceded(char('.'), digit1)),
        space0,
        opt(tag("LOOP")),
    ))(input)?;
    let mut secs = minutes as f32 * 60.0 + seconds as f32;
    if let Some(frac) = fraction {
        let digits = std::str::from_utf8(frac).unwrap_or("0");
        let scale = 10f32.powi(digits.len() as i32);
        secs += digits.parse::<f32>().unwrap_or(0.0) / scale;
    }
    Ok((rest, (secs, looped.is_some())))
}

/// Start and end of the next block; the `FFFF` marker is optional after
/// the first block.
fn block_range(input: &[u8]) -> IResult<&[u8], (u16, u16)> {
    preceded(opt(tag(&BINARY_MARKER[..])), tuple((le_u16, le_u16)))(input)
}

#[derive(Default)]
struct RawHeader {
    author: String,
    name: String,
    date: String,
    songs: Option<usize>,
    default_song: Option<usize>,
    stereo: bool,
    ntsc: bool,
    typ: Option<char>,
    fastplay: Option<u32>,
    init: Option<u16>,
    music: Option<u16>,
    player: Option<u16>,
    durations: Vec<Option<f32>>,
    loops: Vec<bool>,
}

fn invalid(key: &str, value: &str) -> SapError {
    SapError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

fn text_value(value: &str) -> String {
    let value = value.trim().trim_matches('"');
    if value == "<?>" {
        String::new()
    } else {
        value.to_string()
    }
}

fn hex_value(key: &str, value: &str) -> std::result::Result<u16, SapError> {
    u16::from_str_radix(value.trim(), 16).map_err(|_| invalid(key, value))
}

fn decimal_value(key: &str, value: &str) -> std::result::Result<u32, SapError> {
    value.trim().parse().map_err(|_| invalid(key, value))
}

impl RawHeader {
    fn apply(&mut self, key: &str, value: &str) -> std::result::Result<(), SapError> {
        match key {
            "AUTHOR" => self.author = text_value(value),
            "NAME" => self.name = text_value(value),
            "DATE" => self.date = text_value(value),
            "SONGS" => self.songs = Some(decimal_value(key, value)? as usize),
            "DEFSONG" => self.default_song = Some(decimal_value(key, value)? as usize),
            "STEREO" => self.stereo = true,
            "NTSC" => self.ntsc = true,
            "TYPE" => self.typ = value.trim().chars().next(),
            "FASTPLAY" => self.fastplay = Some(decimal_value(key, value)?),
            "INIT" => self.init = Some(hex_value(key, value)?),
            "MUSIC" => self.music = Some(hex_value(key, value)?),
            "PLAYER" => self.player = Some(hex_value(key, value)?),
            "TIME" => {
                let (_, (secs, looped)) =
                    time_value(value.trim().as_bytes()).map_err(|_| invalid(key, value))?;
                self.durations.push(Some(secs));
                self.loops.push(looped);
            }
            other => log::debug!("ignoring SAP header line {other}"),
        }
        Ok(())
    }

    fn finish(self) -> std::result::Result<SapHeader, SapError> {
        let letter = self.typ.ok_or_else(|| invalid("TYPE", ""))?;
        let typ = match letter {
            'B' => SapType::B,
            'C' => SapType::C,
            other => return Err(SapError::UnsupportedType(other)),
        };
        let player_addr = self.player.ok_or(SapError::MissingAddress {
            typ: letter,
            key: "PLAYER",
        })?;
        match typ {
            SapType::B if self.init.is_none() => {
                return Err(SapError::MissingAddress { typ: letter, key: "INIT" })
            }
            SapType::C if self.music.is_none() => {
                return Err(SapError::MissingAddress { typ: letter, key: "MUSIC" })
            }
            _ => {}
        }

        let song_count = self.songs.unwrap_or(1).clamp(1, MAX_SONGS);
        let mut default_song = self.default_song.unwrap_or(0);
        if default_song >= song_count {
            log::debug!("DEFSONG {default_song} out of range, using 0");
            default_song = 0;
        }
        let lines = if self.ntsc { NTSC_LINES } else { PAL_LINES };
        let fastplay = match self.fastplay {
            Some(n) if n > 0 => n,
            _ => lines,
        };
        let mut durations = self.durations;
        let mut loops = self.loops;
        durations.resize(song_count, None);
        loops.resize(song_count, false);

        Ok(SapHeader {
            author: self.author,
            name: self.name,
            date: self.date,
            song_count,
            default_song,
            stereo: self.stereo,
            ntsc: self.ntsc,
            typ,
            fastplay,
            init_addr: self.init,
            music_addr: self.music,
            player_addr,
            durations,
            loops,
        })
    }
}

fn parse(data: &[u8]) -> std::result::Result<SapFile, SapError> {
    let (mut input, _) = signature(data).map_err(|_| SapError::InvalidSignature)?;

    let mut raw = RawHeader::default();
    while !input.starts_with(&BINARY_MARKER) {
        if input.is_empty() {
            return Err(SapError::NoData);
        }
        let offset = data.len() - input.len();
        let (rest, (key, value)) =
            header_line(input).map_err(|_| SapError::MalformedLine { offset })?;
        let key = String::from_utf8_lossy(key);
        let value = value.map(String::from_utf8_lossy).unwrap_or_default();
        raw.apply(&key, &value)?;
        input = rest;
    }
    let header = raw.finish()?;

    let mut warnings = Vec::new();
    let mut blocks = Vec::new();
    while !input.is_empty() {
        let Ok((rest, (start, end))) = block_range(input) else {
            warnings.push(format!("{} trailing bytes ignored", input.len()));
            break;
        };
        if end < start {
            return Err(SapError::InvertedBlock { start, end });
        }
        let len = (end - start) as usize + 1;
        let take = len.min(rest.len());
        if take < len {
            warnings.push(format!(
                "block at 0x{start:04X} missing {} bytes of data",
                len - take
            ));
        }
        blocks.push(SapBlock {
            start,
            data: rest[..take].to_vec(),
        });
        input = &rest[take..];
    }
    if blocks.is_empty() {
        return Err(SapError::NoData);
    }
    for w in &warnings {
        log::warn!("SAP: {w}");
    }

    Ok(SapFile {
        header,
        blocks,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GmeError;

    fn file(header: &str, blocks: &[(u16, &[u8])]) -> Vec<u8> {
        let mut data = header.replace('\n', "\r\n").into_bytes();
        for (i, (start, bytes)) in blocks.iter().enumerate() {
            if i == 0 {
                data.extend_from_slice(&BINARY_MARKER);
            }
            data.extend_from_slice(&start.to_le_bytes());
            data.extend_from_slice(&(start + bytes.len() as u16 - 1).to_le_bytes());
            data.extend_from_slice(bytes);
        }
        data
    }

    const TYPE_B: &str = "SAP\nAUTHOR \"Someone\"\nNAME \"Tune\"\nDATE \"<?>\"\n\
        SONGS 3\nDEFSONG 1\nTYPE B\nINIT 2000\nPLAYER 2003\nTIME 01:02.5\nTIME 00:10 LOOP\n";

    #[test]
    fn parses_type_b_header() {
        let sap = load_sap(&file(TYPE_B, &[(0x2000, &[0x60, 0xEA, 0xEA, 0x60])])).unwrap();
        let h = &sap.header;
        assert_eq!(h.author, "Someone");
        assert_eq!(h.name, "Tune");
        assert_eq!(h.date, "");
        assert_eq!(h.song_count, 3);
        assert_eq!(h.default_song, 1);
        assert_eq!(h.typ, SapType::B);
        assert_eq!(h.init_addr, Some(0x2000));
        assert_eq!(h.player_addr, 0x2003);
        assert_eq!(h.fastplay, 312);
        assert_eq!(h.duration(0), Some(62.5));
        assert_eq!(h.duration(1), Some(10.0));
        assert_eq!(h.duration(2), None);
        assert_eq!(h.loops, vec![false, true, false]);
        assert_eq!(sap.blocks.len(), 1);
        assert_eq!(sap.blocks[0].data.len(), 4);
    }

    #[test]
    fn later_blocks_may_omit_marker() {
        let sap = load_sap(&file(TYPE_B, &[(0x2000, &[0x60]), (0x3000, &[1, 2])])).unwrap();
        assert_eq!(sap.blocks[1].start, 0x3000);
        assert_eq!(sap.blocks[1].data, vec![1, 2]);
    }

    #[test]
    fn type_c_needs_music() {
        let header = "SAP\nTYPE C\nPLAYER 0500\nNTSC\nSTEREO\n";
        assert!(matches!(
            load_sap(&file(header, &[(0x500, &[0x60])])),
            Err(GmeError::FileCorrupt(_))
        ));
        let header = "SAP\nTYPE C\nPLAYER 0500\nMUSIC 1000\nNTSC\nSTEREO\nFASTPLAY 131\n";
        let sap = load_sap(&file(header, &[(0x500, &[0x60])])).unwrap();
        assert!(sap.header.stereo);
        assert_eq!(sap.header.fastplay, 131);
        assert_eq!(sap.header.play_entry(), 0x0506);
    }

    #[test]
    fn other_types_are_unsupported() {
        let header = "SAP\nTYPE D\nINIT 2000\nPLAYER 2003\n";
        assert!(matches!(
            load_sap(&file(header, &[(0x2000, &[0x60])])),
            Err(GmeError::Unsupported(_))
        ));
    }

    #[test]
    fn truncated_block_is_kept_with_warning() {
        let mut data = file(TYPE_B, &[(0x2000, &[0x60; 8])]);
        data.truncate(data.len() - 3);
        let sap = load_sap(&data).unwrap();
        assert_eq!(sap.blocks[0].data.len(), 5);
        assert_eq!(sap.warnings.len(), 1);
    }

    #[test]
    fn bad_input() {
        assert_eq!(load_sap(b"NESM\x1A"), Err(GmeError::WrongFileType));
        assert!(matches!(
            load_sap(b"SAP\r\nTYPE B\r\n"),
            Err(GmeError::FileCorrupt(_))
        ));
        assert!(matches!(
            load_sap(&file("SAP\nINIT zz\n", &[(0x2000, &[0x60])])),
            Err(GmeError::FileCorrupt(_))
        ));
    }
}
