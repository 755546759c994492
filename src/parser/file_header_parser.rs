use crate::errors::FormatError;
use crate::parser::gc_record::IdSize;
use crate::parser::primitive_parsers::{parse_c_string, parse_u32, parse_u64};
use nom::IResult;
use nom::Parser;
use nom::combinator::map;

pub const FILE_HEADER_LENGTH: usize = 31; // the exact size of the file header (31 bytes)

const SUPPORTED_FORMATS: [&str; 2] = ["JAVA PROFILE 1.0.1", "JAVA PROFILE 1.0.2"];

#[derive(Debug, PartialEq, Eq)]
pub struct FileHeader {
    pub format: String,
    pub size_pointers: u32,
    pub timestamp: u64,
}

impl FileHeader {
    fn from_bytes(format_b: &[u8], size_pointers: u32, timestamp: u64) -> Self {
        Self {
            format: String::from_utf8_lossy(format_b).to_string(),
            size_pointers,
            timestamp,
        }
    }

    pub fn id_size(&self) -> Result<IdSize, FormatError> {
        IdSize::from_value(self.size_pointers).ok_or(FormatError::UnsupportedIdSize {
            id_size: self.size_pointers,
        })
    }
}

pub fn parse_file_header(i: &[u8]) -> IResult<&[u8], FileHeader> {
    map(
        (parse_c_string, parse_u32, parse_u64),
        |(format, size_pointers, timestamp)| {
            FileHeader::from_bytes(format, size_pointers, timestamp)
        },
    )
    .parse(i)
}

/// Parses and validates the fixed size header of a dump.
pub fn read_file_header(bytes: &[u8; FILE_HEADER_LENGTH]) -> Result<FileHeader, FormatError> {
    let bad_magic = || FormatError::BadMagic {
        found: String::from_utf8_lossy(&bytes[..19]).to_string(),
    };
    let (rest, header) = parse_file_header(bytes).map_err(|_| bad_magic())?;
    if !rest.is_empty() || !SUPPORTED_FORMATS.contains(&header.format.as_str()) {
        return Err(bad_magic());
    }
    header.id_size()?;
    Ok(header)
}
