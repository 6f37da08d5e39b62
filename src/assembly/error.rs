use std::error::Error;
use std::fmt;

// The assembler's complete failure taxonomy (spec.md 4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyntaxErrorKind
{
	BadChar,
	BadIdentifier,
	Overflow,
	UnknownMnemonic,
	MissingOperand,
	UnknownDirective,
	DuplicateLabel,
	UnterminatedString,
	UnterminatedBlock,
}

impl fmt::Display for SyntaxErrorKind
{
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
	{
		let s = match self
		{
			SyntaxErrorKind::BadChar 			=> "unexpected character",
			SyntaxErrorKind::BadIdentifier 		=> "invalid identifier",
			SyntaxErrorKind::Overflow 			=> "integer literal overflows a machine word",
			SyntaxErrorKind::UnknownMnemonic 	=> "unknown instruction mnemonic",
			SyntaxErrorKind::MissingOperand 	=> "missing operand",
			SyntaxErrorKind::UnknownDirective 	=> "unknown directive",
			SyntaxErrorKind::DuplicateLabel 	=> "duplicate label definition",
			SyntaxErrorKind::UnterminatedString => "unterminated string literal",
			SyntaxErrorKind::UnterminatedBlock 	=> "unterminated hex byte block",
		};

		write!(f, "{}", s)
	}
}

// All syntactic failures carry the 1-based line number and a short excerpt
// of the offending text, same idiom as the teacher's `ParserError`/`LabelError`.
#[derive(Debug)]
pub struct SyntaxError
{
	pub line: usize,
	pub excerpt: String,
	pub kind: SyntaxErrorKind,
}

impl SyntaxError
{
	pub fn new(line: usize, excerpt: &str, kind: SyntaxErrorKind) -> SyntaxError
	{
		// Keep excerpts short and single-line, mirroring the teacher's ParserError display.
		let excerpt: String = excerpt.chars().take(32).collect();

		SyntaxError { line, excerpt, kind }
	}
}

impl fmt::Display for SyntaxError
{
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
	{
		write!(f, "[Line {:03}] Error: {} near \"{}\"", self.line, self.kind, self.excerpt)
	}
}

impl Error for SyntaxError { }

// Diagnostics are warnings: they help the user, but don't fail assembly.
// Same idiom as the teacher's `Diagnostics`/`DiagnosticsType`.
pub struct Diagnostics
{
	pub line: usize,
	pub diag_type: DiagnosticsType,
}

impl Diagnostics
{
	pub fn new(line: usize, diag_type: DiagnosticsType) -> Diagnostics
	{
		Diagnostics { line, diag_type }
	}
}

impl fmt::Display for Diagnostics
{
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
	{
		write!(f, "[Line {}] Warning: {}", self.line, self.diag_type)
	}
}

pub enum DiagnosticsType
{
	UnusedLocalLabel(String),
}

impl fmt::Display for DiagnosticsType
{
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
	{
		match self
		{
			DiagnosticsType::UnusedLocalLabel(name) => write!(f, "the label \"{}\" is never referenced", name),
		}
	}
}
