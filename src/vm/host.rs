// The host primitive table: named callables invoked by the `ext` opcode.
// Supplemented from the original C `robot_vm.c`, whose `RobotVMFunc` table
// is registered by name via `robot_vm_add_function` and looked up by
// `robot_vm_get_function`; kept as a separate value (rather than a field
// owned by `Vm`) so a primitive's `&mut Vm` borrow never has to alias the
// table it was called through.
use super::error::Fault;
use super::Vm;

pub struct HostTable
{
	entries: Vec<(String, Box<dyn Fn(&mut Vm) -> Result<(), Fault>>)>,
}

impl HostTable
{
	pub fn new() -> HostTable
	{
		HostTable { entries: Vec::new() }
	}

	// Registers `name` at the next free index (mirrors `robot_vm_add_function`).
	pub fn add_primitive<F>(&mut self, name: impl Into<String>, f: F) -> usize
	where
		F: Fn(&mut Vm) -> Result<(), Fault> + 'static,
	{
		let index = self.entries.len();
		self.entries.push((name.into(), Box::new(f)));
		index
	}

	// Mirrors `robot_vm_get_function`: look up a primitive's table index by name.
	pub fn primitive_index(&self, name: &str) -> Option<usize>
	{
		self.entries.iter().position(|(n, _)| n == name)
	}

	pub fn len(&self) -> usize
	{
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool
	{
		self.entries.is_empty()
	}

	pub(crate) fn call(&self, index: usize, vm: &mut Vm) -> Result<(), Fault>
	{
		(self.entries[index].1)(vm)
	}
}

impl Default for HostTable
{
	fn default() -> HostTable
	{
		HostTable::new()
	}
}

// The standard stack-based arithmetic/logical primitives `vm_exec`
// pre-registers (spec.md 6). Each pops its operands from the VM stack at
// `R[1]` (last pushed on top) and pushes a single Word result.
pub fn standard_primitives() -> HostTable
{
	let mut table = HostTable::new();

	table.add_primitive("$add$", |vm| binary(vm, |a, b| Ok(a.wrapping_add(b))));
	table.add_primitive("$sub$", |vm| binary(vm, |a, b| Ok(a.wrapping_sub(b))));
	table.add_primitive("$mul$", |vm| binary(vm, |a, b| Ok(a.wrapping_mul(b))));
	table.add_primitive("$div$", |vm| binary(vm, |a, b| if b == 0 { Err(Fault::DivisionByZero) } else { Ok(a / b) }));
	table.add_primitive("$mod$", |vm| binary(vm, |a, b| if b == 0 { Err(Fault::DivisionByZero) } else { Ok(a % b) }));
	table.add_primitive("$not$", |vm| unary(vm, |a| !a));
	table.add_primitive("$and$", |vm| binary(vm, |a, b| Ok(a & b)));
	table.add_primitive("$or$", |vm| binary(vm, |a, b| Ok(a | b)));
	table.add_primitive("$eq$", |vm| binary(vm, |a, b| Ok((a == b) as u32)));
	table.add_primitive("$less$", |vm| binary(vm, |a, b| Ok((a < b) as u32)));
	table.add_primitive("$leq$", |vm| binary(vm, |a, b| Ok((a <= b) as u32)));

	table
}

fn unary(vm: &mut Vm, f: impl Fn(u32) -> u32) -> Result<(), Fault>
{
	let a = vm.pop()?.0;
	vm.push(crate::types::Word(f(a)))
}

fn binary(vm: &mut Vm, f: impl Fn(u32, u32) -> Result<u32, Fault>) -> Result<(), Fault>
{
	let b = vm.pop()?.0;
	let a = vm.pop()?.0;
	vm.push(crate::types::Word(f(a, b)?))
}

#[cfg(test)]
mod tests
{
	use super::*;
	use crate::types::Word;

	#[test]
	fn lookup_by_name_mirrors_add_by_name() {
		let table = standard_primitives();
		assert_eq!(table.primitive_index("$add$"), Some(0));
		assert_eq!(table.primitive_index("$leq$"), Some(10));
		assert_eq!(table.primitive_index("%nonexistent"), None);
	}

	#[test]
	fn add_is_commutative_over_stack_contents()
	{
		let table = standard_primitives();
		let idx = table.primitive_index("$add$").unwrap();

		let mut vm1 = Vm::new_with_memory(64);
		vm1.push(Word(3)).unwrap();
		vm1.push(Word(5)).unwrap();
		table.call(idx, &mut vm1).unwrap();

		let mut vm2 = Vm::new_with_memory(64);
		vm2.push(Word(5)).unwrap();
		vm2.push(Word(3)).unwrap();
		table.call(idx, &mut vm2).unwrap();

		assert_eq!(vm1.pop().unwrap(), vm2.pop().unwrap());
	}

	#[test]
	fn sub_then_add_back_recovers_the_original()
	{
		let table = standard_primitives();
		let sub = table.primitive_index("$sub$").unwrap();
		let add = table.primitive_index("$add$").unwrap();

		let mut vm = Vm::new_with_memory(64);
		vm.push(Word(42)).unwrap();
		vm.push(Word(17)).unwrap();
		table.call(sub, &mut vm).unwrap(); // 42 - 17

		vm.push(Word(17)).unwrap();
		table.call(add, &mut vm).unwrap(); // (42 - 17) + 17

		assert_eq!(vm.pop().unwrap(), Word(42));
	}

	#[test]
	fn div_by_zero_faults()
	{
		let table = standard_primitives();
		let div = table.primitive_index("$div$").unwrap();

		let mut vm = Vm::new_with_memory(64);
		vm.push(Word(10)).unwrap();
		vm.push(Word(0)).unwrap();

		assert!(matches!(table.call(div, &mut vm), Err(Fault::DivisionByZero)));
	}

	proptest::proptest!
	{
		#[test]
		fn add_matches_wrapping_add_for_any_operand_pair(a: u32, b: u32)
		{
			let table = standard_primitives();
			let idx = table.primitive_index("$add$").unwrap();

			let mut vm = Vm::new_with_memory(64);
			vm.push(Word(a)).unwrap();
			vm.push(Word(b)).unwrap();
			table.call(idx, &mut vm).unwrap();

			proptest::prop_assert_eq!(vm.pop().unwrap(), Word(a.wrapping_add(b)));
		}

		#[test]
		fn eq_and_leq_agree_with_std_ordering(a: u32, b: u32)
		{
			let table = standard_primitives();
			let eq = table.primitive_index("$eq$").unwrap();
			let leq = table.primitive_index("$leq$").unwrap();

			let mut vm = Vm::new_with_memory(64);
			vm.push(Word(a)).unwrap();
			vm.push(Word(b)).unwrap();
			table.call(eq, &mut vm).unwrap();
			proptest::prop_assert_eq!(vm.pop().unwrap(), Word((a == b) as u32));

			vm.push(Word(a)).unwrap();
			vm.push(Word(b)).unwrap();
			table.call(leq, &mut vm).unwrap();
			proptest::prop_assert_eq!(vm.pop().unwrap(), Word((a <= b) as u32));
		}
	}
}
