// Two-pass assembler: pass one walks every statement purely to build the
// label address map (and catch duplicate labels); pass two emits bytes,
// symbols, relocations and dependencies now that every local address is
// known, resolving forward references for free. Same `build_label_map`
// then `assemble` shape as the teacher's `assembler.rs`.
use std::collections::{HashMap, HashSet};

use log::debug;

use crate::object::{Object, Symbol};
use crate::types::Word;

use super::error::{Diagnostics, DiagnosticsType, SyntaxError, SyntaxErrorKind};
use super::parser::{parse_statement, ConstArg, Directive, StatementContent, StatementToken};

#[derive(Copy, Clone, PartialEq, Eq)]
enum Section
{
	Text,
	Data,
}

struct LabelInfo
{
	address: Word,
	def_line: usize,
}

pub fn assemble(source: &str) -> Result<(Object, Vec<Diagnostics>), SyntaxError>
{
	let statements = parse_all(source)?;
	let (labels, stack_size, text_total) = build_label_map(&statements)?;

	debug!("assembling {} statements, {} labels, stack_size={}", statements.len(), labels.len(), stack_size);

	emit(&statements, &labels, stack_size, text_total)
}

fn parse_all(source: &str) -> Result<Vec<StatementToken>, SyntaxError>
{
	let mut statements = Vec::new();

	for (i, line) in source.lines().enumerate()
	{
		if let Some(stmt) = parse_statement(i + 1, line)?
		{
			statements.push(stmt);
		}
	}

	Ok(statements)
}

fn statement_words(content: &StatementContent) -> usize
{
	match content
	{
		StatementContent::Directive(_) => 0,
		StatementContent::Instruction(_) => 4,
		StatementContent::Const(_) => 4,
		StatementContent::Bytes(bytes) => bytes.len(),
	}
}

// Pass one: resolve every label to an absolute byte address in the unified
// text-then-data address space, without emitting any code.
fn build_label_map(statements: &[StatementToken]) -> Result<(HashMap<String, LabelInfo>, Word, usize), SyntaxError>
{
	// `None` until a `.text` directive has been seen; spec.md 97-100 requires
	// `.text` before any instruction/byte content and before `.data`.
	let mut section: Option<Section> = None;
	let mut text_counter = 0usize;
	let mut data_counter = 0usize;
	let mut stack_size = Word(0);
	let mut labels: HashMap<String, LabelInfo> = HashMap::new();

	// Labels defined in the data section need `text_total` to become
	// absolute, which isn't known until the whole file has been scanned;
	// stash the section-local offset and fix it up afterward.
	let mut pending: Vec<(String, Section, usize, usize)> = Vec::new();

	for stmt in statements
	{
		if let Some(name) = &stmt.label
		{
			if labels.contains_key(name.as_str()) || pending.iter().any(|(n, ..)| n == name)
			{
				return Err(SyntaxError::new(stmt.line, name, SyntaxErrorKind::DuplicateLabel));
			}

			let cur_section = section.unwrap_or(Section::Text);
			let offset = if cur_section == Section::Text { text_counter } else { data_counter };
			pending.push((name.clone(), cur_section, offset, stmt.line));
		}

		match &stmt.content
		{
			Some(StatementContent::Directive(Directive::Text)) => section = Some(Section::Text),
			Some(StatementContent::Directive(Directive::Data)) =>
			{
				if section.is_none()
				{
					return Err(SyntaxError::new(stmt.line, ".data", SyntaxErrorKind::BadChar));
				}

				section = Some(Section::Data);
			}
			Some(StatementContent::Directive(Directive::Stack(n))) => stack_size = Word(*n),
			Some(content) =>
			{
				let cur_section = match section
				{
					Some(s) => s,
					None => return Err(SyntaxError::new(stmt.line, "expected .text first", SyntaxErrorKind::BadChar)),
				};

				let words = statement_words(content);

				if cur_section == Section::Text { text_counter += words; } else { data_counter += words; }
			}
			None => { }
		}
	}

	let text_total = text_counter;

	for (name, section, offset, def_line) in pending
	{
		let address = Word((offset + if section == Section::Data { text_total } else { 0 }) as u32);
		labels.insert(name, LabelInfo { address, def_line });
	}

	Ok((labels, stack_size, text_total))
}

fn emit(statements: &[StatementToken], labels: &HashMap<String, LabelInfo>, stack_size: Word, text_total: usize) -> Result<(Object, Vec<Diagnostics>), SyntaxError>
{
	let mut obj = Object::new(stack_size);
	let mut text_buf = Vec::new();
	let mut data_buf = Vec::new();
	let mut section = Section::Text;
	let mut used: HashSet<&str> = HashSet::new();

	let mut i = 0;

	while i < statements.len()
	{
		let stmt = &statements[i];
		define_label(stmt, labels, &mut obj);

		match &stmt.content
		{
			None => { }
			Some(StatementContent::Directive(Directive::Text)) => section = Section::Text,
			Some(StatementContent::Directive(Directive::Data)) => section = Section::Data,
			Some(StatementContent::Directive(Directive::Stack(_))) => { }
			Some(StatementContent::Bytes(bytes)) => buf_for(section, &mut text_buf, &mut data_buf).extend_from_slice(bytes),
			Some(StatementContent::Const(_)) =>
			{
				return Err(SyntaxError::new(stmt.line, "const", SyntaxErrorKind::MissingOperand));
			}
			Some(StatementContent::Instruction(instr)) =>
			{
				buf_for(section, &mut text_buf, &mut data_buf).extend_from_slice(&instr.encode());

				if instr.is_load()
				{
					i = emit_paired_const(statements, i + 1, labels, &mut obj, &mut text_buf, &mut data_buf, section, text_total, &mut used, stmt.line)?;
					continue;
				}
			}
		}

		i += 1;
	}

	obj.push_text(&text_buf);
	obj.push_data(&data_buf);

	debug!("assembled {} bytes of text, {} bytes of data", text_buf.len(), data_buf.len());

	let diagnostics = labels.iter()
		.filter(|(name, _)| !used.contains(name.as_str()))
		.map(|(name, info)| Diagnostics::new(info.def_line, DiagnosticsType::UnusedLocalLabel(name.clone())))
		.collect();

	Ok((obj, diagnostics))
}

fn define_label(stmt: &StatementToken, labels: &HashMap<String, LabelInfo>, obj: &mut Object)
{
	if let Some(name) = &stmt.label
	{
		let address = labels[name.as_str()].address;
		obj.define_symbol(Symbol::new(name.clone(), address));
	}
}

fn buf_for<'a>(section: Section, text_buf: &'a mut Vec<u8>, data_buf: &'a mut Vec<u8>) -> &'a mut Vec<u8>
{
	if section == Section::Text { text_buf } else { data_buf }
}

#[allow(clippy::too_many_arguments)]
fn emit_paired_const<'a>(
	statements: &[StatementToken],
	mut i: usize,
	labels: &'a HashMap<String, LabelInfo>,
	obj: &mut Object,
	text_buf: &mut Vec<u8>,
	data_buf: &mut Vec<u8>,
	section: Section,
	text_total: usize,
	used: &mut HashSet<&'a str>,
	load_line: usize,
) -> Result<usize, SyntaxError>
{
	loop
	{
		if i >= statements.len()
		{
			return Err(SyntaxError::new(load_line, "load", SyntaxErrorKind::MissingOperand));
		}

		let stmt = &statements[i];
		define_label(stmt, labels, obj);

		match &stmt.content
		{
			None => { i += 1; }
			Some(StatementContent::Const(arg)) =>
			{
				let local_offset = if section == Section::Text { text_buf.len() } else { data_buf.len() };
				let abs_offset = local_offset + if section == Section::Data { text_total } else { 0 };

				match arg
				{
					ConstArg::Literal(n) =>
					{
						buf_for(section, text_buf, data_buf).extend_from_slice(&Word(*n).to_be_bytes());
					}
					ConstArg::Label(name) =>
					{
						match labels.get(name.as_str())
						{
							Some(info) =>
							{
								buf_for(section, text_buf, data_buf).extend_from_slice(&info.address.to_be_bytes());
								obj.add_relocation(Word(abs_offset as u32));
								used.insert(labels.get_key_value(name.as_str()).unwrap().0.as_str());
							}
							None =>
							{
								buf_for(section, text_buf, data_buf).extend_from_slice(&[0, 0, 0, 0]);
								obj.add_dependency(Symbol::new(name.clone(), Word(abs_offset as u32)));
							}
						}
					}
					ConstArg::HostPrimitive(name) =>
					{
						buf_for(section, text_buf, data_buf).extend_from_slice(&[0, 0, 0, 0]);
						obj.add_dependency(Symbol::new(name.clone(), Word(abs_offset as u32)));
					}
				}

				return Ok(i + 1);
			}
			Some(_) => return Err(SyntaxError::new(load_line, "load", SyntaxErrorKind::MissingOperand)),
		}
	}
}

#[cfg(test)]
mod tests
{
	use super::*;
	use crate::types::Instruction;

	#[test]
	fn assembles_simple_program()
	{
		let source = "\
.text
:start
	load r2
	const 5
	stop r2
";
		let (obj, diags) = assemble(source).unwrap();
		assert_eq!(obj.text().len(), 12);
		assert_eq!(obj.defined_symbols().iter().find(|s| s.name == "start").unwrap().address, Word(0));
		assert!(diags.is_empty() || matches!(diags[0].diag_type, DiagnosticsType::UnusedLocalLabel(ref n) if n == "start"));
	}

	#[test]
	fn resolves_forward_label_reference()
	{
		let source = "\
.text
	load r3
	const @target
	stop r0
:target
	nop
";
		let (obj, _) = assemble(source).unwrap();
		assert_eq!(obj.relocations(), &[Word(4)]);

		let bytes = &obj.text()[4..8];
		assert_eq!(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]), 12);
	}

	#[test]
	fn unresolved_label_becomes_dependency()
	{
		let source = "\
.text
	load r3
	const @external
	stop r0
";
		let (obj, _) = assemble(source).unwrap();
		assert!(obj.relocations().is_empty());
		assert_eq!(obj.dependencies()[0].name, "external");
	}

	#[test]
	fn host_primitive_const_becomes_dependency()
	{
		let source = "\
.text
	load r4
	const %print$
	ext r4
";
		let (obj, _) = assemble(source).unwrap();
		assert_eq!(obj.dependencies()[0].name, "%print$");
		assert!(obj.relocations().is_empty());
	}

	#[test]
	fn detects_duplicate_label()
	{
		let source = ".text\n:a\nnop\n:a\nnop\n";
		match assemble(source)
		{
			Err(e) => assert_eq!(e.kind, SyntaxErrorKind::DuplicateLabel),
			Ok(_) => panic!("expected an error"),
		}
	}

	#[test]
	fn load_without_const_is_an_error()
	{
		let source = ".text\nload r1\nnop\n";
		match assemble(source)
		{
			Err(e) => assert_eq!(e.kind, SyntaxErrorKind::MissingOperand),
			Ok(_) => panic!("expected an error"),
		}
	}

	#[test]
	fn data_labels_are_offset_past_text()
	{
		let source = "\
.text
	nop
.data
:msg
	\"hi\"
";
		let (obj, _) = assemble(source).unwrap();
		let addr = obj.defined_symbols().iter().find(|s| s.name == "msg").unwrap().address;
		assert_eq!(addr, Word(4));
	}

	#[test]
	fn unused_label_is_diagnosed()
	{
		let source = ".text\n:never_used\nnop\n";
		let (_, diags) = assemble(source).unwrap();
		assert_eq!(diags.len(), 1);
		assert!(matches!(&diags[0].diag_type, DiagnosticsType::UnusedLocalLabel(n) if n == "never_used"));
	}

	#[test]
	fn encodes_instruction_bytes_big_endian_opcode_first()
	{
		let source = ".text\nadd r1 r2 r3\n";
		let (obj, _) = assemble(source).unwrap();
		assert_eq!(obj.text(), &Instruction::Add(1, 2, 3).encode());
	}

	#[test]
	fn instruction_before_text_directive_is_rejected()
	{
		let source = "add r1 r2 r3\n";
		match assemble(source)
		{
			Err(e) => assert_eq!(e.kind, SyntaxErrorKind::BadChar),
			Ok(_) => panic!("expected an error"),
		}
	}

	#[test]
	fn data_directive_before_text_directive_is_rejected()
	{
		let source = ".data\n:msg\n\"hi\"\n";
		match assemble(source)
		{
			Err(e) => assert_eq!(e.kind, SyntaxErrorKind::BadChar),
			Ok(_) => panic!("expected an error"),
		}
	}
}
