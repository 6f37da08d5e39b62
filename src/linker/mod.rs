// Merges relocatable objects into one, shifting every address that
// crosses a concatenation boundary and re-resolving dependencies against
// the newly combined symbol table. Grounded on the teacher's
// `unit::memory::load_code`/`resolve_symbol_table` shape (load code at an
// offset, then rewrite a symbol table against it), generalized from
// "resolve against a running VM" to "merge into another object".
mod error;

pub use error::LinkError;

use std::collections::HashMap;

use log::{debug, warn};

use crate::object::{Object, Symbol};
use crate::types::Word;

pub fn merge(base: Object, other: Object) -> Result<Object, LinkError>
{
	let self_text_len = base.text_len();
	let self_data_len = base.data_len();
	let other_text_len = other.text_len();

	debug!("merging objects: base text={} data={}, other text={} data={}", self_text_len, self_data_len, other_text_len, other.data_len());

	let shift_base = |addr: Word| -> Word
	{
		if (addr.0 as usize) < self_text_len { addr } else { Word(addr.0 + other_text_len as u32) }
	};

	let shift_other = |addr: Word| -> Word
	{
		if (addr.0 as usize) < other_text_len { Word(addr.0 + self_text_len as u32) }
		else { Word(addr.0 + (self_text_len + self_data_len) as u32) }
	};

	let mut new_text = base.text().to_vec();
	new_text.extend_from_slice(other.text());

	let mut new_data = base.data().to_vec();
	new_data.extend_from_slice(other.data());

	let total_text_len = new_text.len();

	let mut defined_symbols: Vec<Symbol> = Vec::new();
	let mut seen: HashMap<&str, ()> = HashMap::new();

	for sym in base.defined_symbols()
	{
		defined_symbols.push(Symbol::new(sym.name.clone(), shift_base(sym.address)));
	}

	for sym in other.defined_symbols()
	{
		defined_symbols.push(Symbol::new(sym.name.clone(), shift_other(sym.address)));
	}

	for sym in &defined_symbols
	{
		if seen.insert(sym.name.as_str(), ()).is_some()
		{
			warn!("merge: duplicate symbol \"{}\"", sym.name);
			return Err(LinkError::DuplicateSymbol(sym.name.clone()));
		}
	}

	let mut relocations: Vec<Word> = base.relocations().iter().map(|&a| shift_base(a)).collect();
	relocations.extend(other.relocations().iter().map(|&a| shift_other(a)));

	let mut dependencies: Vec<Symbol> = Vec::new();
	dependencies.extend(base.dependencies().iter().map(|d| Symbol::new(d.name.clone(), shift_base(d.address))));
	dependencies.extend(other.dependencies().iter().map(|d| Symbol::new(d.name.clone(), shift_other(d.address))));

	let defined_index: HashMap<&str, Word> = defined_symbols.iter().map(|s| (s.name.as_str(), s.address)).collect();

	let mut unresolved = Vec::new();

	for dep in dependencies
	{
		if dep.is_host_primitive()
		{
			unresolved.push(dep);
			continue;
		}

		match defined_index.get(dep.name.as_str())
		{
			Some(&address) =>
			{
				write_word(&mut new_text, &mut new_data, total_text_len, dep.address, address);
				relocations.push(dep.address);
			}
			None => unresolved.push(dep),
		}
	}

	if !unresolved.is_empty()
	{
		debug!("merge: {} dependencies remain unresolved", unresolved.len());
	}

	let mut merged = Object::new(Word(base.stack_size().0.max(other.stack_size().0)));
	merged.push_text(&new_text);
	merged.push_data(&new_data);

	for sym in defined_symbols { merged.define_symbol(sym); }
	for reloc in relocations { merged.add_relocation(reloc); }
	for dep in unresolved { merged.add_dependency(dep); }

	Ok(merged)
}

fn write_word(text: &mut [u8], data: &mut [u8], text_len: usize, addr: Word, value: Word)
{
	let offset = addr.0 as usize;
	let bytes = value.to_be_bytes();

	if offset < text_len
	{
		text[offset..offset + 4].copy_from_slice(&bytes);
	}
	else
	{
		let offset = offset - text_len;
		data[offset..offset + 4].copy_from_slice(&bytes);
	}
}

// Fold `merge` across a sequence of objects in order, `objects[0]` as the base.
pub fn link_all(mut objects: Vec<Object>) -> Result<Object, LinkError>
{
	let mut iter = objects.drain(..);
	let mut acc = iter.next().unwrap_or_default();

	for obj in iter
	{
		acc = merge(acc, obj)?;
	}

	Ok(acc)
}

#[cfg(test)]
mod tests
{
	use super::*;
	use crate::object::Symbol;

	fn obj_with(text: &[u8], data: &[u8]) -> Object
	{
		let mut o = Object::new(Word(16));
		o.push_text(text);
		o.push_data(data);
		o
	}

	#[test]
	fn merges_text_and_data()
	{
		let a = obj_with(&[1, 2, 3, 4], &[9, 9, 9, 9]);
		let b = obj_with(&[5, 6, 7, 8], &[8, 8, 8, 8]);

		let merged = merge(a, b).unwrap();
		assert_eq!(merged.text(), &[1, 2, 3, 4, 5, 6, 7, 8]);
		assert_eq!(merged.data(), &[9, 9, 9, 9, 8, 8, 8, 8]);
	}

	#[test]
	fn shifts_base_data_symbol_past_inserted_other_text()
	{
		let mut a = obj_with(&[0; 4], &[0; 4]);
		a.define_symbol(Symbol::new("in_data", Word(4)));

		let b = obj_with(&[0; 8], &[]);

		let merged = merge(a, b).unwrap();
		// base data used to start at 4 (after base text); now base text (4) +
		// other text (8) sit in front of it, so the symbol moves to 12.
		let sym = merged.defined_symbols().iter().find(|s| s.name == "in_data").unwrap();
		assert_eq!(sym.address, Word(12));
	}

	#[test]
	fn shifts_other_text_and_data_addresses()
	{
		let a = obj_with(&[0; 4], &[]);

		let mut b = obj_with(&[0; 4], &[0; 4]);
		b.define_symbol(Symbol::new("in_text", Word(0)));
		b.define_symbol(Symbol::new("in_data", Word(4)));

		let merged = merge(a, b).unwrap();
		let text_sym = merged.defined_symbols().iter().find(|s| s.name == "in_text").unwrap();
		let data_sym = merged.defined_symbols().iter().find(|s| s.name == "in_data").unwrap();

		assert_eq!(text_sym.address, Word(4));
		assert_eq!(data_sym.address, Word(8));
	}

	#[test]
	fn resolves_dependency_against_newly_combined_symbol_table()
	{
		let mut a = obj_with(&[0; 4], &[]);
		a.add_dependency(Symbol::new("target", Word(0)));

		let mut b = obj_with(&[0; 4], &[]);
		b.define_symbol(Symbol::new("target", Word(0)));

		let merged = merge(a, b).unwrap();
		assert!(merged.dependencies().is_empty());
		assert_eq!(merged.relocations(), &[Word(0)]);

		let bytes = &merged.text()[0..4];
		assert_eq!(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]), 4);
	}

	#[test]
	fn host_primitive_dependency_is_never_resolved_by_the_linker()
	{
		let mut a = obj_with(&[0; 4], &[]);
		a.add_dependency(Symbol::new("%print$", Word(0)));

		let b = obj_with(&[0; 4], &[]);

		let merged = merge(a, b).unwrap();
		assert_eq!(merged.dependencies()[0].name, "%print$");
	}

	#[test]
	fn rejects_duplicate_symbol_across_objects()
	{
		let mut a = obj_with(&[0; 4], &[]);
		a.define_symbol(Symbol::new("dup", Word(0)));

		let mut b = obj_with(&[0; 4], &[]);
		b.define_symbol(Symbol::new("dup", Word(0)));

		match merge(a, b)
		{
			Err(LinkError::DuplicateSymbol(name)) => assert_eq!(name, "dup"),
			other => panic!("expected DuplicateSymbol, got {:?}", other.is_ok()),
		}
	}

	#[test]
	fn stack_size_is_the_maximum_of_the_two()
	{
		let a = Object::new(Word(16));
		let b = Object::new(Word(64));

		let merged = merge(a, b).unwrap();
		assert_eq!(merged.stack_size(), Word(64));
	}
}
