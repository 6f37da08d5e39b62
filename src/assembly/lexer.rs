// Character-level tokenizing, built on `nom` exactly the way the teacher's
// `assembly::parser` is: small composable parsers over `&str` lines. Unlike
// the teacher we need to distinguish *which* syntax error occurred (the
// catalogue in `error::SyntaxErrorKind`), so sub-parsers that can fail for a
// semantic reason return that reason through `LexError` via `FromExternalError`
// instead of nom's generic `ErrorKind`.
use nom::branch::alt;
use nom::bytes::complete::{tag, tag_no_case, take_while, take_while1, take_while_m_n};
use nom::character::complete::{char, digit1, space0};
use nom::combinator::{map, map_res, opt, recognize, value};
use nom::multi::many0;
use nom::sequence::{pair, preceded};
use nom::IResult;

use super::error::SyntaxErrorKind;

#[derive(Debug, Clone)]
pub struct LexError<'a>
{
	pub input: &'a str,
	pub kind: SyntaxErrorKind,
}

impl<'a> nom::error::ParseError<&'a str> for LexError<'a>
{
	fn from_error_kind(input: &'a str, _kind: nom::error::ErrorKind) -> Self
	{
		LexError { input, kind: SyntaxErrorKind::BadChar }
	}

	fn append(_input: &'a str, _kind: nom::error::ErrorKind, other: Self) -> Self
	{
		other
	}
}

impl<'a> nom::error::FromExternalError<&'a str, SyntaxErrorKind> for LexError<'a>
{
	fn from_external_error(input: &'a str, _kind: nom::error::ErrorKind, e: SyntaxErrorKind) -> Self
	{
		LexError { input, kind: e }
	}
}

pub type LResult<'a, O> = IResult<&'a str, O, LexError<'a>>;

pub fn ws(input: &str) -> LResult<()>
{
	value((), space0)(input)
}

fn is_identifier_start(c: char) -> bool
{
	c.is_ascii_alphabetic() || c == '$'
}

fn is_identifier_char(c: char) -> bool
{
	c.is_ascii_alphanumeric() || c == '_' || c == '$'
}

const MAX_IDENTIFIER_LEN: usize = 255;

// Bare identifiers: mnemonics, label names, const targets
// (`[A-Za-z$][A-Za-z0-9_$]*`, at most 255 bytes). Directive names are lexed
// separately by `directive_name` below, since `.text`/`.data`/`.stack` are a
// closed keyword set introduced by a leading `.` that is not itself part of
// this grammar.
pub fn identifier(input: &str) -> LResult<&str>
{
	let (rest, head) = take_while_m_n(1, 1, is_identifier_start)(input)?;
	let (rest, tail) = take_while(is_identifier_char)(rest)?;

	let len = head.len() + tail.len();

	if len > MAX_IDENTIFIER_LEN
	{
		return Err(nom::Err::Failure(LexError { input, kind: SyntaxErrorKind::BadIdentifier }));
	}

	Ok((rest, &input[..len]))
}

// `.text`, `.data`, `.stack`: a bare alphabetic keyword, lexed without `$`/
// digits/underscore since the directive set is fixed and checked by name in
// `parse_directive`.
pub fn directive_name(input: &str) -> LResult<&str>
{
	let (rest, head) = take_while_m_n(1, 1, |c: char| c.is_ascii_alphabetic())(input)?;
	let (rest, tail) = take_while(|c: char| c.is_ascii_alphanumeric())(rest)?;

	let len = head.len() + tail.len();
	Ok((rest, &input[..len]))
}

// `rN`, 0 <= N <= 31, or a bare two-digit hex byte like `0x1F`, used for
// every instruction operand slot.
pub fn register_operand(input: &str) -> LResult<u8>
{
	alt((register_name, hex_byte))(input)
}

fn register_name(input: &str) -> LResult<u8>
{
	map_res
	(
		preceded(tag_no_case("r"), digit1),
		|digits: &str| digits.parse::<u32>().ok()
			.filter(|n| *n < crate::types::REG_COUNT as u32)
			.map(|n| n as u8)
			.ok_or(SyntaxErrorKind::BadChar),
	)(input)
}

fn hex_byte(input: &str) -> LResult<u8>
{
	map_res
	(
		preceded(tag_no_case("0x"), take_while_m_n(1, 2, |c: char| c.is_ascii_hexdigit())),
		|digits: &str| u8::from_str_radix(digits, 16).map_err(|_| SyntaxErrorKind::BadChar),
	)(input)
}

// Decimal or `0x`-prefixed hex numeric literal, with explicit overflow
// detection (accumulate-and-compare, same technique the original C
// `read_num` uses rather than relying on a checked parse of the whole run).
pub fn number(input: &str) -> LResult<u32>
{
	alt((hex_number, decimal_number))(input)
}

fn hex_number(input: &str) -> LResult<u32>
{
	map_res
	(
		preceded(tag_no_case("0x"), take_while1(|c: char| c.is_ascii_hexdigit())),
		|digits: &str| accumulate(digits, 16),
	)(input)
}

fn decimal_number(input: &str) -> LResult<u32>
{
	map_res(digit1, |digits: &str| accumulate(digits, 10))(input)
}

fn accumulate(digits: &str, radix: u32) -> Result<u32, SyntaxErrorKind>
{
	let mut acc: u32 = 0;

	for c in digits.chars()
	{
		let digit = c.to_digit(radix).ok_or(SyntaxErrorKind::BadChar)?;
		acc = acc.checked_mul(radix).and_then(|v| v.checked_add(digit)).ok_or(SyntaxErrorKind::Overflow)?;
	}

	Ok(acc)
}

// `{ HH HH HH ... }`, whitespace-separated hex byte pairs between braces.
// Must close on the same line; an end-of-input before `}` is reported as
// `UnterminatedBlock` rather than nom's generic parse failure.
pub fn hex_block(input: &str) -> LResult<Vec<u8>>
{
	let (rest, _) = char('{')(input)?;

	let mut bytes = Vec::new();
	let mut cur = rest;

	loop
	{
		let (next, _) = space0(cur)?;
		cur = next;

		if let Ok((next, _)) = char::<_, LexError>('}')(cur)
		{
			return Ok((next, bytes));
		}

		if cur.is_empty()
		{
			return Err(nom::Err::Failure(LexError { input: cur, kind: SyntaxErrorKind::UnterminatedBlock }));
		}

		let (next, byte) = map_res
		(
			take_while_m_n(2, 2, |c: char| c.is_ascii_hexdigit()),
			|digits: &str| u8::from_str_radix(digits, 16).map_err(|_| SyntaxErrorKind::BadChar),
		)(cur)?;

		bytes.push(byte);
		cur = next;
	}
}

// A double-quoted string literal. Supports the escape set `\n \r \a \t
// \xHH \OOO \" \\`, is NUL-terminated and is padded by the caller to a
// 4-byte boundary, same layout spec.md gives hex blocks.
pub fn string_literal(input: &str) -> LResult<Vec<u8>>
{
	let (rest, _) = char('"')(input)?;

	let mut bytes = Vec::new();
	let mut cur = rest;

	loop
	{
		if cur.is_empty()
		{
			return Err(nom::Err::Failure(LexError { input: cur, kind: SyntaxErrorKind::UnterminatedString }));
		}

		let mut chars = cur.char_indices();
		let (_, c) = chars.next().unwrap();

		if c == '"'
		{
			cur = &cur[1..];
			bytes.push(0);
			return Ok((cur, bytes));
		}

		if c == '\\'
		{
			let (next, byte) = escape(&cur[1..])?;
			bytes.push(byte);
			cur = next;
		}
		else
		{
			let mut buf = [0u8; 4];
			let encoded = c.encode_utf8(&mut buf);
			bytes.extend_from_slice(encoded.as_bytes());
			cur = &cur[c.len_utf8()..];
		}
	}
}

fn escape(input: &str) -> LResult<u8>
{
	if input.is_empty()
	{
		return Err(nom::Err::Failure(LexError { input, kind: SyntaxErrorKind::UnterminatedString }));
	}

	alt
	((
		value(b'\n', char('n')),
		value(b'\r', char('r')),
		value(7u8, char('a')),
		value(b'\t', char('t')),
		value(b'"', char('"')),
		value(b'\\', char('\\')),
		hex_escape,
		octal_escape,
	))(input)
}

fn hex_escape(input: &str) -> LResult<u8>
{
	map_res
	(
		preceded(char('x'), take_while_m_n(2, 2, |c: char| c.is_ascii_hexdigit())),
		|digits: &str| u8::from_str_radix(digits, 16).map_err(|_| SyntaxErrorKind::BadChar),
	)(input)
}

fn octal_escape(input: &str) -> LResult<u8>
{
	map_res
	(
		take_while_m_n(1, 3, |c: char| ('0'..='7').contains(&c)),
		|digits: &str| u32::from_str_radix(digits, 8).ok().filter(|v| *v <= 255).map(|v| v as u8).ok_or(SyntaxErrorKind::BadChar),
	)(input)
}

// `.stack` argument, or a bare 32-bit literal after `const`.
pub fn decimal_or_hex(input: &str) -> LResult<u32>
{
	number(input)
}

// Strip a leading `;` or `#` end-of-line comment, stopping at nothing (the
// caller already works one line at a time).
pub fn strip_comment(line: &str) -> &str
{
	let cut = line.find([';', '#']);
	match cut
	{
		Some(i) => &line[..i],
		None => line,
	}
}

pub fn is_blank(line: &str) -> bool
{
	line.trim().is_empty()
}

pub fn label_ref(input: &str) -> LResult<&str>
{
	preceded(char('@'), identifier)(input)
}

pub fn host_primitive_ref(input: &str) -> LResult<&str>
{
	map
	(
		recognize(pair(char('%'), take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_' || c == '$'))),
		|s: &str| s,
	)(input)
}

pub fn label_def(input: &str) -> LResult<&str>
{
	preceded(char(':'), identifier)(input)
}

#[cfg(test)]
mod tests
{
	use super::*;

	#[test]
	fn parses_register_and_hex_operand()
	{
		assert_eq!(register_operand("r7").unwrap().1, 7);
		assert_eq!(register_operand("R31").unwrap().1, 31);
		assert_eq!(register_operand("0x1F").unwrap().1, 0x1F);
	}

	#[test]
	fn identifier_allows_leading_dollar_and_rejects_leading_dot()
	{
		assert_eq!(identifier("$init").unwrap().1, "$init");
		assert_eq!(identifier("a_b$2").unwrap().1, "a_b$2");
		assert!(identifier(".foo").is_err());
	}

	#[test]
	fn identifier_over_255_bytes_is_bad_identifier()
	{
		let long = "a".repeat(256);
		let err = identifier(&long).unwrap_err();
		match err
		{
			nom::Err::Failure(e) => assert_eq!(e.kind, SyntaxErrorKind::BadIdentifier),
			_ => panic!("expected a Failure"),
		}
	}

	#[test]
	fn directive_name_rejects_dollar_and_underscore()
	{
		assert_eq!(directive_name("text").unwrap().1, "text");
		assert_eq!(directive_name("stack 256").unwrap(), (" 256", "stack"));
	}

	#[test]
	fn detects_numeric_overflow()
	{
		let err = number("99999999999999999999").unwrap_err();
		match err
		{
			nom::Err::Error(e) | nom::Err::Failure(e) => assert_eq!(e.kind, SyntaxErrorKind::Overflow),
			_ => panic!("expected a definite error"),
		}
	}

	#[test]
	fn parses_hex_block()
	{
		let (rest, bytes) = hex_block("{ 01 02 ff }").unwrap();
		assert_eq!(bytes, vec![0x01, 0x02, 0xFF]);
		assert!(rest.is_empty());
	}

	#[test]
	fn unterminated_hex_block_is_detected()
	{
		let err = hex_block("{ 01 02").unwrap_err();
		match err
		{
			nom::Err::Failure(e) => assert_eq!(e.kind, SyntaxErrorKind::UnterminatedBlock),
			_ => panic!("expected a Failure"),
		}
	}

	#[test]
	fn parses_string_literal_with_escapes()
	{
		let (rest, bytes) = string_literal("\"hi\\n\"").unwrap();
		assert_eq!(bytes, vec![b'h', b'i', b'\n', 0]);
		assert!(rest.is_empty());
	}

	#[test]
	fn unterminated_string_is_detected()
	{
		let err = string_literal("\"hi").unwrap_err();
		match err
		{
			nom::Err::Failure(e) => assert_eq!(e.kind, SyntaxErrorKind::UnterminatedString),
			_ => panic!("expected a Failure"),
		}
	}
}
