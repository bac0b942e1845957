//! Format-level building blocks: varints, the file header, cells, records and
//! the schema table.

pub mod cell;
pub mod header;
pub mod record;
pub mod schema;
pub mod varint;

use nom::IResult;

pub(crate) type ParseResult<'a, T> = IResult<&'a [u8], T>;

// Monomorphic wrappers so `?` can infer nom's error type.

pub(crate) fn parse_u8(input: &[u8]) -> ParseResult<'_, u8> {
    nom::number::complete::be_u8(input)
}

pub(crate) fn parse_u16(input: &[u8]) -> ParseResult<'_, u16> {
    nom::number::complete::be_u16(input)
}

pub(crate) fn parse_u32(input: &[u8]) -> ParseResult<'_, u32> {
    nom::number::complete::be_u32(input)
}

pub(crate) fn skip(input: &[u8], count: usize) -> ParseResult<'_, &[u8]> {
    nom::bytes::complete::take(count)(input)
}
