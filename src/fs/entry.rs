use std::fmt;

use byteorder::{ByteOrder, LittleEndian};
use serde::Serialize;

use crate::error::{FatError, Result};

pub const DIR_ENTRY_SIZE: usize = 32;

/// First name byte marking the end of a directory.
const END_OF_DIRECTORY: u8 = 0x00;
/// First name byte marking a deleted entry.
const DELETED: u8 = 0xE5;
/// First name byte standing in for a literal 0xE5 (KANJI lead byte).
const ESCAPED_E5: u8 = 0x05;

bitflags::bitflags! {
    /// Attribute byte of a directory entry (offset 0x0B).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
    pub struct Attributes: u8 {
        const READ_ONLY = 0x01;
        const HIDDEN = 0x02;
        const SYSTEM = 0x04;
        const VOLUME_LABEL = 0x08;
        const SUBDIRECTORY = 0x10;
        const ARCHIVE = 0x20;
        /// Combination used by VFAT long-name slots.
        const LONG_NAME = 0x0F;
    }
}

/// What an entry is, decided once from the attribute byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EntryKind {
    File,
    Directory,
    VolumeLabel,
    /// A VFAT long-name slot. Its contents are not decoded.
    LongName,
}

impl EntryKind {
    fn from_attributes(attr: Attributes) -> Self {
        if attr.bits() & 0x3F == Attributes::LONG_NAME.bits() {
            EntryKind::LongName
        } else if attr.contains(Attributes::SUBDIRECTORY) {
            EntryKind::Directory
        } else if attr.contains(Attributes::VOLUME_LABEL) {
            EntryKind::VolumeLabel
        } else {
            EntryKind::File
        }
    }
}

/// Result of decoding one 32-byte directory slot.
#[derive(Debug, Clone, PartialEq)]
pub enum EntryOutcome {
    /// No further entries follow in this directory.
    Stop,
    /// Deleted slot; keep scanning.
    Skip,
    Entry(DirectoryEntry),
}

/// A decoded 8.3 directory entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirectoryEntry {
    /// Space-padded name as stored on disk.
    pub name: [u8; 8],
    /// Space-padded extension as stored on disk.
    pub extension: [u8; 3],
    pub attributes: Attributes,
    pub kind: EntryKind,
    pub time: u16,
    pub date: u16,
    pub starting_cluster: u16,
    /// Size in bytes. Only meaningful for `EntryKind::File`.
    pub size: u32,
}

impl DirectoryEntry {
    /// Build an entry from unpadded name parts.
    ///
    /// Parts longer than the on-disk fields are truncated.
    pub fn new(
        name: &str,
        extension: &str,
        attributes: Attributes,
        starting_cluster: u16,
        size: u32,
    ) -> Self {
        let mut name_field = [b' '; 8];
        let mut ext_field = [b' '; 3];
        copy_padded(&mut name_field, name.as_bytes());
        copy_padded(&mut ext_field, extension.as_bytes());
        Self {
            name: name_field,
            extension: ext_field,
            attributes,
            kind: EntryKind::from_attributes(attributes),
            time: 0,
            date: 0,
            starting_cluster,
            size,
        }
    }

    /// Encode back into the 32-byte on-disk layout.
    pub fn to_bytes(&self) -> [u8; DIR_ENTRY_SIZE] {
        let mut raw = [0u8; DIR_ENTRY_SIZE];
        raw[0x00..0x08].copy_from_slice(&self.name);
        raw[0x08..0x0B].copy_from_slice(&self.extension);
        raw[0x0B] = self.attributes.bits();
        LittleEndian::write_u16(&mut raw[0x16..0x18], self.time);
        LittleEndian::write_u16(&mut raw[0x18..0x1A], self.date);
        LittleEndian::write_u16(&mut raw[0x1A..0x1C], self.starting_cluster);
        LittleEndian::write_u32(&mut raw[0x1C..0x20], self.size);
        raw
    }

    pub fn is_directory(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    pub fn is_volume_label(&self) -> bool {
        self.kind == EntryKind::VolumeLabel
    }

    /// `.` or `..` inside a subdirectory.
    pub fn is_dot_entry(&self) -> bool {
        self.name[0] == b'.' && self.name[1..].iter().all(|&b| b == b' ' || b == b'.')
    }

    /// Size in bytes for files; `None` for directories and labels.
    pub fn data_size(&self) -> Option<u32> {
        match self.kind {
            EntryKind::File => Some(self.size),
            _ => None,
        }
    }

    /// Base name with padding stripped.
    pub fn base_name(&self) -> String {
        let mut name = self.name;
        if name[0] == ESCAPED_E5 {
            name[0] = DELETED;
        }
        decode_oem_string(&name).trim_end().to_string()
    }

    /// Extension with padding stripped.
    pub fn extension_name(&self) -> String {
        decode_oem_string(&self.extension).trim_end().to_string()
    }

    /// `NAME.EXT`, or just `NAME` when there is no extension.
    pub fn short_name(&self) -> String {
        let name = self.base_name();
        let ext = self.extension_name();
        if ext.is_empty() {
            name
        } else {
            format!("{name}.{ext}")
        }
    }

    /// Label text for volume label entries (name and extension run together).
    pub fn label(&self) -> String {
        let mut raw = Vec::with_capacity(11);
        raw.extend_from_slice(&self.name);
        raw.extend_from_slice(&self.extension);
        decode_oem_string(&raw).trim_end().to_string()
    }

    /// Case-insensitive match of a path component against the 8.3 name.
    ///
    /// Name and extension are compared independently.
    pub fn matches_name(&self, component: &str) -> bool {
        let (name, ext) = if component == "." || component == ".." {
            (component, "")
        } else {
            component.rsplit_once('.').unwrap_or((component, ""))
        };
        self.base_name().to_uppercase() == name.to_uppercase()
            && self.extension_name().to_uppercase() == ext.to_uppercase()
    }

    /// Modification timestamp as "YYYY-MM-DD HH:MM:SS", if a date is recorded.
    pub fn modified(&self) -> Option<String> {
        fat_timestamp(self.date, self.time)
    }

    /// `HARS` flags in the order the DIR listing prints them.
    pub fn attribute_string(&self) -> String {
        [
            (Attributes::HIDDEN, 'H'),
            (Attributes::ARCHIVE, 'A'),
            (Attributes::READ_ONLY, 'R'),
            (Attributes::SYSTEM, 'S'),
        ]
        .iter()
        .map(|&(flag, c)| if self.attributes.contains(flag) { c } else { '-' })
        .collect()
    }
}

impl fmt::Display for DirectoryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let column = match self.kind {
            EntryKind::Directory => "<DIR>".to_string(),
            EntryKind::VolumeLabel => "<VOLUME>".to_string(),
            EntryKind::LongName => "<LFN>".to_string(),
            EntryKind::File => self.size.to_string(),
        };
        write!(
            f,
            "{:<12} {} {:>12} (first ${:04X})",
            self.short_name(),
            self.attribute_string(),
            column,
            self.starting_cluster
        )
    }
}

/// Decode one 32-byte directory slot.
pub fn decode_entry(raw: &[u8]) -> Result<EntryOutcome> {
    if raw.len() < DIR_ENTRY_SIZE {
        return Err(FatError::MalformedRecord { len: raw.len() });
    }
    match raw[0] {
        END_OF_DIRECTORY => return Ok(EntryOutcome::Stop),
        DELETED => return Ok(EntryOutcome::Skip),
        _ => {}
    }

    let mut name = [0u8; 8];
    let mut extension = [0u8; 3];
    name.copy_from_slice(&raw[0x00..0x08]);
    extension.copy_from_slice(&raw[0x08..0x0B]);
    let attributes = Attributes::from_bits_retain(raw[0x0B]);

    Ok(EntryOutcome::Entry(DirectoryEntry {
        name,
        extension,
        attributes,
        kind: EntryKind::from_attributes(attributes),
        time: LittleEndian::read_u16(&raw[0x16..]),
        date: LittleEndian::read_u16(&raw[0x18..]),
        starting_cluster: LittleEndian::read_u16(&raw[0x1A..]),
        size: LittleEndian::read_u32(&raw[0x1C..]),
    }))
}

fn copy_padded(field: &mut [u8], src: &[u8]) {
    let n = src.len().min(field.len());
    field[..n].copy_from_slice(&src[..n]);
}

/// Packed date `yyyyyyy mmmm ddddd` and time `hhhhh mmmmmm sssss` (two-second units).
fn fat_timestamp(date: u16, time: u16) -> Option<String> {
    if date == 0 {
        return None;
    }
    let field = |word: u16, shift: u16, width: u16| (word >> shift) & ((1u16 << width) - 1);
    Some(format!(
        "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
        1980 + field(date, 9, 7),
        field(date, 5, 4),
        field(date, 0, 5),
        field(time, 11, 5),
        field(time, 5, 6),
        field(time, 0, 5) * 2,
    ))
}

/// Short names are stored in the OEM codepage (CP437); high bytes are mapped
/// through the table rather than treated as UTF-8.
fn decode_oem_string(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| {
            if b < 0x80 {
                b as char
            } else {
                CP437_HIGH[b as usize - 0x80]
            }
        })
        .collect()
}

/// CP437 to Unicode mapping for bytes 0x80-0xFF.
#[rustfmt::skip]
const CP437_HIGH: [char; 128] = [
    'Ç','ü','é','â','ä','à','å','ç', 'ê','ë','è','ï','î','ì','Ä','Å',
    'É','æ','Æ','ô','ö','ò','û','ù', 'ÿ','Ö','Ü','¢','£','¥','₧','ƒ',
    'á','í','ó','ú','ñ','Ñ','ª','º', '¿','⌐','¬','½','¼','¡','«','»',
    '░','▒','▓','│','┤','╡','╢','╖', '╕','╣','║','╗','╝','╜','╛','┐',
    '└','┴','┬','├','─','┼','╞','╟', '╚','╔','╩','╦','╠','═','╬','╧',
    '╨','╤','╥','╙','╘','╒','╓','╫', '╪','┘','┌','█','▄','▌','▐','▀',
    'α','ß','Γ','π','Σ','σ','µ','τ', 'Φ','Θ','Ω','δ','∞','φ','ε','∩',
    '≡','±','≥','≤','⌠','⌡','÷','≈', '°','∙','·','√','ⁿ','²','■','\u{00A0}',
];
