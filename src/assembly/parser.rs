// Per-line statement parsing. One `StatementToken` per non-blank,
// non-comment-only line, same granularity as the teacher's `StatementToken`
// but with a grammar built for the register ISA: a statement is an optional
// label definition followed by at most one content item.
use crate::types::Instruction;

use super::error::{SyntaxError, SyntaxErrorKind};
use super::lexer::*;

#[derive(Debug, Clone, PartialEq)]
pub enum Directive
{
	Text,
	Data,
	Stack(u32),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConstArg
{
	Label(String),
	HostPrimitive(String),
	Literal(u32),
}

#[derive(Debug, Clone, PartialEq)]
pub enum StatementContent
{
	Directive(Directive),
	Instruction(Instruction),
	Const(ConstArg),
	Bytes(Vec<u8>),
}

#[derive(Debug, Clone)]
pub struct StatementToken
{
	pub line: usize,
	pub label: Option<String>,
	pub content: Option<StatementContent>,
}

const MNEMONICS: &[&str] = &
[
	"nop", "load", "ext", "write8", "read8", "write16", "read16", "write32", "read32", "stop",
	"move", "moveif", "moveifz", "swap", "lshift", "rshift", "sshift", "and", "or", "xor",
	"neg", "incr", "decr", "incr4", "decr4", "add", "sub", "mul", "div", "out", "in",
];

fn build_instruction(mnemonic: &str, ops: &[u8]) -> Option<Instruction>
{
	use Instruction::*;

	Some(match (mnemonic, ops)
	{
		("nop", []) 				=> Nop,
		("load", [a]) 				=> Load(*a),
		("ext", [a]) 				=> Ext(*a),
		("write8", [a, b]) 			=> Write8(*a, *b),
		("read8", [a, b]) 			=> Read8(*a, *b),
		("write16", [a, b]) 		=> Write16(*a, *b),
		("read16", [a, b]) 			=> Read16(*a, *b),
		("write32", [a, b]) 		=> Write32(*a, *b),
		("read32", [a, b]) 			=> Read32(*a, *b),
		("stop", [a]) 				=> Stop(*a),
		("move", [a, b]) 			=> Move(*a, *b),
		("moveif", [a, b, c]) 		=> MoveIf(*a, *b, *c),
		("moveifz", [a, b, c]) 		=> MoveIfZero(*a, *b, *c),
		("swap", [a, b]) 			=> Swap(*a, *b),
		("lshift", [a, b, c]) 		=> LShift(*a, *b, *c),
		("rshift", [a, b, c]) 		=> RShift(*a, *b, *c),
		("sshift", [a, b, c]) 		=> SShift(*a, *b, *c),
		("and", [a, b, c]) 			=> And(*a, *b, *c),
		("or", [a, b, c]) 			=> Or(*a, *b, *c),
		("xor", [a, b, c]) 			=> Xor(*a, *b, *c),
		("neg", [a, b]) 			=> Neg(*a, *b),
		("incr", [a]) 				=> Incr(*a),
		("decr", [a]) 				=> Decr(*a),
		("incr4", [a]) 				=> Incr4(*a),
		("decr4", [a]) 				=> Decr4(*a),
		("add", [a, b, c]) 			=> Add(*a, *b, *c),
		("sub", [a, b, c]) 			=> Sub(*a, *b, *c),
		("mul", [a, b, c]) 			=> Mul(*a, *b, *c),
		("div", [a, b, c]) 			=> Div(*a, *b, *c),
		("out", [a]) 				=> Out(*a),
		("in", [a]) 				=> In(*a),
		_ 							=> return None,
	})
}

fn err(line: usize, excerpt: &str, kind: SyntaxErrorKind) -> SyntaxError
{
	SyntaxError::new(line, excerpt, kind)
}

fn to_syntax_error(line: usize, excerpt: &str, e: nom::Err<LexError>) -> SyntaxError
{
	let kind = match e
	{
		nom::Err::Error(e) | nom::Err::Failure(e) => e.kind,
		nom::Err::Incomplete(_) => SyntaxErrorKind::BadChar,
	};

	err(line, excerpt, kind)
}

// Parse every register operand we can off the front of `rest`, collecting
// them in order. Stops (without error) once the remainder is empty.
// Anything left over that doesn't parse as an operand is a syntax error.
fn parse_operands(line: usize, rest: &str) -> Result<Vec<u8>, SyntaxError>
{
	let mut ops = Vec::new();
	let mut cur = rest;

	loop
	{
		let (next, _) = ws(cur).map_err(|e| to_syntax_error(line, cur, e))?;
		cur = next;

		if cur.is_empty()
		{
			return Ok(ops);
		}

		match register_operand(cur)
		{
			Ok((next, reg)) => { ops.push(reg); cur = next; }
			Err(_) => return Err(err(line, cur, SyntaxErrorKind::BadChar)),
		}
	}
}

fn parse_directive(line: usize, name: &str, rest: &str) -> Result<Directive, SyntaxError>
{
	let rest = rest.trim_start();

	match name
	{
		"text" =>
		{
			if !rest.is_empty() { return Err(err(line, rest, SyntaxErrorKind::BadChar)); }
			Ok(Directive::Text)
		}
		"data" =>
		{
			if !rest.is_empty() { return Err(err(line, rest, SyntaxErrorKind::BadChar)); }
			Ok(Directive::Data)
		}
		"stack" =>
		{
			let (rest, _) = ws(rest).map_err(|e| to_syntax_error(line, rest, e))?;
			let (rest, n) = number(rest).map_err(|e| to_syntax_error(line, rest, e))?;

			if !rest.trim_start().is_empty() { return Err(err(line, rest, SyntaxErrorKind::BadChar)); }

			Ok(Directive::Stack(n))
		}
		_ => Err(err(line, name, SyntaxErrorKind::UnknownDirective)),
	}
}

fn parse_const(line: usize, rest: &str) -> Result<ConstArg, SyntaxError>
{
	let (rest, _) = ws(rest).map_err(|e| to_syntax_error(line, rest, e))?;

	if rest.is_empty()
	{
		return Err(err(line, rest, SyntaxErrorKind::MissingOperand));
	}

	if let Ok((rest, name)) = label_ref(rest)
	{
		if !rest.trim_start().is_empty() { return Err(err(line, rest, SyntaxErrorKind::BadChar)); }
		return Ok(ConstArg::Label(name.to_string()));
	}

	if let Ok((rest, name)) = host_primitive_ref(rest)
	{
		if !rest.trim_start().is_empty() { return Err(err(line, rest, SyntaxErrorKind::BadChar)); }
		return Ok(ConstArg::HostPrimitive(name.to_string()));
	}

	let (rest, n) = number(rest).map_err(|e| to_syntax_error(line, rest, e))?;

	if !rest.trim_start().is_empty() { return Err(err(line, rest, SyntaxErrorKind::BadChar)); }

	Ok(ConstArg::Literal(n))
}

// Parse one already comment-stripped, non-blank source line.
pub fn parse_statement(line_number: usize, raw_line: &str) -> Result<Option<StatementToken>, SyntaxError>
{
	let line = strip_comment(raw_line);

	if is_blank(line)
	{
		return Ok(None);
	}

	let mut cur = line.trim_start();
	let mut label = None;

	if cur.starts_with(':')
	{
		let (rest, name) = label_def(cur).map_err(|e| to_syntax_error(line_number, cur, e))?;
		label = Some(name.to_string());
		cur = rest.trim_start();
	}

	if cur.is_empty()
	{
		return Ok(Some(StatementToken { line: line_number, label, content: None }));
	}

	let content = parse_content(line_number, cur)?;

	Ok(Some(StatementToken { line: line_number, label, content: Some(content) }))
}

fn parse_content(line_number: usize, cur: &str) -> Result<StatementContent, SyntaxError>
{
	if let Some(rest) = cur.strip_prefix('.')
	{
		let (rest, name) = directive_name(rest).map_err(|e| to_syntax_error(line_number, rest, e))?;
		return Ok(StatementContent::Directive(parse_directive(line_number, name, rest)?));
	}

	if cur.starts_with('{')
	{
		let (rest, bytes) = hex_block(cur).map_err(|e| to_syntax_error(line_number, cur, e))?;

		if !rest.trim_start().is_empty() { return Err(err(line_number, rest, SyntaxErrorKind::BadChar)); }

		return Ok(StatementContent::Bytes(pad_to_word(bytes)));
	}

	if cur.starts_with('"')
	{
		let (rest, bytes) = string_literal(cur).map_err(|e| to_syntax_error(line_number, cur, e))?;

		if !rest.trim_start().is_empty() { return Err(err(line_number, rest, SyntaxErrorKind::BadChar)); }

		return Ok(StatementContent::Bytes(pad_to_word(bytes)));
	}

	let (rest, name) = identifier(cur).map_err(|e| to_syntax_error(line_number, cur, e))?;

	if name == "const"
	{
		return Ok(StatementContent::Const(parse_const(line_number, rest)?));
	}

	if !MNEMONICS.contains(&name)
	{
		return Err(err(line_number, name, SyntaxErrorKind::UnknownMnemonic));
	}

	let ops = parse_operands(line_number, rest)?;

	match build_instruction(name, &ops)
	{
		Some(instr) => Ok(StatementContent::Instruction(instr)),
		None => Err(err(line_number, cur, SyntaxErrorKind::MissingOperand)),
	}
}

// Hex blocks and string literals are padded with zero bytes up to the next
// 4-byte boundary, same alignment the object codec assumes for data.
fn pad_to_word(mut bytes: Vec<u8>) -> Vec<u8>
{
	let pad = (4 - bytes.len() % 4) % 4;
	bytes.extend(std::iter::repeat(0).take(pad));
	bytes
}

#[cfg(test)]
mod tests
{
	use super::*;

	#[test]
	fn parses_plain_instruction()
	{
		let stmt = parse_statement(1, "add r1 r2 r3").unwrap().unwrap();
		assert_eq!(stmt.content, Some(StatementContent::Instruction(Instruction::Add(1, 2, 3))));
	}

	#[test]
	fn parses_label_and_instruction_together()
	{
		let stmt = parse_statement(1, ":loop incr r4").unwrap().unwrap();
		assert_eq!(stmt.label.as_deref(), Some("loop"));
		assert_eq!(stmt.content, Some(StatementContent::Instruction(Instruction::Incr(4))));
	}

	#[test]
	fn parses_bare_label()
	{
		let stmt = parse_statement(1, ":done").unwrap().unwrap();
		assert_eq!(stmt.label.as_deref(), Some("done"));
		assert_eq!(stmt.content, None);
	}

	#[test]
	fn strips_comments_and_blank_lines()
	{
		assert!(parse_statement(1, "   ; just a comment").unwrap().is_none());
		assert!(parse_statement(1, "").unwrap().is_none());
	}

	#[test]
	fn parses_directives()
	{
		assert_eq!(parse_statement(1, ".text").unwrap().unwrap().content, Some(StatementContent::Directive(Directive::Text)));
		assert_eq!(parse_statement(1, ".stack 256").unwrap().unwrap().content, Some(StatementContent::Directive(Directive::Stack(256))));
	}

	#[test]
	fn parses_const_variants()
	{
		assert_eq!(parse_statement(1, "const @foo").unwrap().unwrap().content, Some(StatementContent::Const(ConstArg::Label("foo".into()))));
		assert_eq!(parse_statement(1, "const %print$").unwrap().unwrap().content, Some(StatementContent::Const(ConstArg::HostPrimitive("%print$".into()))));
		assert_eq!(parse_statement(1, "const 42").unwrap().unwrap().content, Some(StatementContent::Const(ConstArg::Literal(42))));
	}

	#[test]
	fn rejects_unknown_mnemonic()
	{
		match parse_statement(1, "frobnicate r1")
		{
			Err(e) => assert_eq!(e.kind, SyntaxErrorKind::UnknownMnemonic),
			Ok(_) => panic!("expected an error"),
		}
	}

	#[test]
	fn rejects_missing_operand()
	{
		match parse_statement(1, "add r1 r2")
		{
			Err(e) => assert_eq!(e.kind, SyntaxErrorKind::MissingOperand),
			Ok(_) => panic!("expected an error"),
		}
	}

	#[test]
	fn pads_hex_block_and_string_to_word_boundary()
	{
		let stmt = parse_statement(1, "{ 01 02 03 }").unwrap().unwrap();
		assert_eq!(stmt.content, Some(StatementContent::Bytes(vec![1, 2, 3, 0])));

		let stmt = parse_statement(1, "\"hi\"").unwrap().unwrap();
		assert_eq!(stmt.content, Some(StatementContent::Bytes(vec![b'h', b'i', 0, 0])));
	}
}
