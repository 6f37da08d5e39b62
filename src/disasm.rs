// Textual rendering of an object's text section: a plain hex dump, or a
// disassembled listing with labels interspersed and `load` immediates
// annotated with the symbol or dependency they target. Grounded on the
// original C `robot_obj_file_dump`'s disassembly branch, which does the same
// label/dependency/symbol lookups against its own (stack-oriented) ISA;
// translated here to the register-oriented `load rA` / `const ARG` pairing
// this assembler emits.
use std::collections::HashMap;
use std::fmt::Write as _;

use crate::object::Object;
use crate::types::{Instruction, Word};

pub fn hex_dump(bytes: &[u8]) -> String
{
	let mut out = String::new();

	for chunk in bytes.chunks(16)
	{
		out.push('\t');

		for byte in chunk
		{
			write!(out, "{:02x} ", byte).expect("writing to a String never fails");
		}

		out.push('\n');
	}

	out
}

pub fn disassemble(obj: &Object) -> String
{
	let labels: HashMap<u32, &str> = obj.defined_symbols().iter().map(|s| (s.address.0, s.name.as_str())).collect();
	let deps: HashMap<u32, &str> = obj.dependencies().iter().map(|d| (d.address.0, d.name.as_str())).collect();

	let text = obj.text();
	let mut out = String::new();
	let mut i = 0usize;

	while i < text.len()
	{
		if let Some(name) = labels.get(&(i as u32))
		{
			writeln!(out, ":{}", name).unwrap();
		}

		if i + 4 > text.len()
		{
			writeln!(out, "\t{{ {} }}", hex_bytes(&text[i..])).unwrap();
			break;
		}

		let word = [text[i], text[i + 1], text[i + 2], text[i + 3]];

		match Instruction::decode(word)
		{
			Some(Instruction::Load(a)) =>
			{
				writeln!(out, "\tload r{}", a).unwrap();
				let imm_addr = (i + 4) as u32;

				if imm_addr as usize + 4 > text.len()
				{
					writeln!(out, "\t{{ truncated immediate }}").unwrap();
					i += 4;
					continue;
				}

				if let Some(name) = deps.get(&imm_addr)
				{
					writeln!(out, "\tconst {}", name).unwrap();
				}
				else
				{
					let imm = Word::from_be_bytes([text[i + 4], text[i + 5], text[i + 6], text[i + 7]]);

					match labels.get(&imm.0)
					{
						Some(name) => writeln!(out, "\tconst @{}", name).unwrap(),
						None => writeln!(out, "\tconst {}", imm).unwrap(),
					}
				}

				i += 8;
			}
			Some(instr) =>
			{
				writeln!(out, "\t{}", instr).unwrap();
				i += 4;
			}
			None =>
			{
				writeln!(out, "\t{{ {} }}", hex_bytes(&word)).unwrap();
				i += 4;
			}
		}
	}

	out
}

fn hex_bytes(bytes: &[u8]) -> String
{
	bytes.iter().map(|b| format!("{:02x}", b)).collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests
{
	use super::*;
	use crate::object::Symbol;

	#[test]
	fn disassembles_plain_instructions()
	{
		let mut obj = Object::new(Word(64));
		obj.push_text(&Instruction::Nop.encode());
		obj.push_text(&Instruction::Stop(0).encode());

		let listing = disassemble(&obj);
		assert_eq!(listing, "\tnop\n\tstop r0\n");
	}

	#[test]
	fn annotates_load_with_label_target()
	{
		let mut obj = Object::new(Word(64));
		obj.push_text(&Instruction::Load(2).encode());
		obj.push_text(&Word(8).to_be_bytes());
		obj.push_text(&Instruction::Stop(0).encode());
		obj.define_symbol(Symbol::new("done", Word(8)));

		let listing = disassemble(&obj);
		assert!(listing.contains("load r2"));
		assert!(listing.contains("const @done"));
		assert!(listing.contains(":done"));
	}

	#[test]
	fn annotates_load_with_dependency_target()
	{
		let mut obj = Object::new(Word(64));
		obj.push_text(&Instruction::Load(2).encode());
		obj.push_text(&[0, 0, 0, 0]);
		obj.add_dependency(Symbol::new("%print$", Word(4)));

		let listing = disassemble(&obj);
		assert!(listing.contains("const %print$"));
	}

	#[test]
	fn hex_dump_wraps_at_sixteen_bytes()
	{
		let bytes: Vec<u8> = (0..20).collect();
		let dump = hex_dump(&bytes);
		assert_eq!(dump.lines().count(), 2);
	}
}
