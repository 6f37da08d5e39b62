// Error glue for the four binaries: wraps each library error type plus
// `std::io::Error` behind one `From`-composable enum, so a `fn run(...) ->
// Result<_, CliError>` can use `?` throughout. Manual `Display`/`Error`,
// matching every other error type in this crate rather than reaching for
// `thiserror`.
use std::fmt;
use std::io;

use crate::assembly::SyntaxError;
use crate::linker::LinkError;
use crate::object::ObjectError;
use crate::vm::{Fault, LoadError};

#[derive(Debug)]
pub enum CliError
{
	Io(io::Error),
	Assembler(SyntaxError),
	Object(ObjectError),
	Link(LinkError),
	Load(LoadError),
	Fault(Fault),
	Message(String),
}

impl fmt::Display for CliError
{
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
	{
		match self
		{
			CliError::Io(e) => write!(f, "{}", e),
			CliError::Assembler(e) => write!(f, "{}", e),
			CliError::Object(e) => write!(f, "{}", e),
			CliError::Link(e) => write!(f, "{}", e),
			CliError::Load(e) => write!(f, "{}", e),
			CliError::Fault(e) => write!(f, "{}", e),
			CliError::Message(msg) => write!(f, "{}", msg),
		}
	}
}

impl std::error::Error for CliError { }

impl From<io::Error> for CliError
{
	fn from(e: io::Error) -> CliError { CliError::Io(e) }
}

impl From<SyntaxError> for CliError
{
	fn from(e: SyntaxError) -> CliError { CliError::Assembler(e) }
}

impl From<ObjectError> for CliError
{
	fn from(e: ObjectError) -> CliError { CliError::Object(e) }
}

impl From<LinkError> for CliError
{
	fn from(e: LinkError) -> CliError { CliError::Link(e) }
}

impl From<LoadError> for CliError
{
	fn from(e: LoadError) -> CliError { CliError::Load(e) }
}

impl From<Fault> for CliError
{
	fn from(e: Fault) -> CliError { CliError::Fault(e) }
}
