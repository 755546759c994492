use nom::sequence::terminated;
use nom::{IResult, Parser, bytes, number};

use crate::parser::gc_record::IdSize;

pub fn parse_c_string(i: &[u8]) -> IResult<&[u8], &[u8]> {
    terminated(
        bytes::streaming::take_until("\0"),
        bytes::streaming::tag("\0"),
    )
    .parse(i)
}

pub fn parse_i8(i: &[u8]) -> IResult<&[u8], i8> {
    number::streaming::be_i8(i)
}

pub fn parse_u8(i: &[u8]) -> IResult<&[u8], u8> {
    number::streaming::be_u8(i)
}

pub fn parse_u16(i: &[u8]) -> IResult<&[u8], u16> {
    number::streaming::be_u16(i)
}

pub fn parse_u32(i: &[u8]) -> IResult<&[u8], u32> {
    number::streaming::be_u32(i)
}

pub fn parse_u64(i: &[u8]) -> IResult<&[u8], u64> {
    number::streaming::be_u64(i)
}

/// Identifiers are widened to `u64` whatever their on-disk width.
pub fn parse_id(id_size: IdSize) -> impl Fn(&[u8]) -> IResult<&[u8], u64> {
    move |i| match id_size {
        IdSize::Four => parse_u32(i).map(|(r, id)| (r, u64::from(id))),
        IdSize::Eight => parse_u64(i),
    }
}
