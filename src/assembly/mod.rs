// Source-text to `Object`: lexing, statement parsing and the two-pass
// assembler. Grounded on the teacher's `assembly` module shape (separate
// `error`/`parser`/`assembler` files) but built for the register ISA's
// grammar instead of the teacher's MiMA mnemonics.
mod assembler;
mod error;
mod lexer;
mod parser;

pub use assembler::assemble;
pub use error::{Diagnostics, DiagnosticsType, SyntaxError, SyntaxErrorKind};
pub use parser::{ConstArg, Directive, StatementContent, StatementToken};
