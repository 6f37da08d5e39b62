// Loads a fully (or partially, for debugging) linked object and runs it.
// Grounded on the teacher's `unit::{ArithmeticUnit, ControlUnit,
// MemoryUnit}` + `mima::Mima` split: `Registers` and `Memory` below play
// the part of the teacher's per-unit state, owned by this module's `Vm`,
// which plays the part of the teacher's `Mima` -- without the microcycle/
// bus-transfer machinery, since this ISA's execution model is a plain
// fetch-decode-execute step (spec.md 4.4), not a cycle-accurate simulation.
mod error;
mod host;
mod memory;
mod registers;

pub use error::{Fault, LoadError};
pub use host::{standard_primitives, HostTable};
pub use memory::Memory;
pub use registers::Registers;

use log::{debug, trace, warn};

use crate::object::Object;
use crate::types::{reg_index, Instruction, Word, SP};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepResult
{
	Continued,
	Stopped(Word),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextResult
{
	Continued,
	AboutToCallHost,
	Stopped(Word),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunResult
{
	Stopped(Word),
	Cancelled,
}

// Safety margin added on top of stack + padded text + padded data, per
// spec.md 4.4 step 3.
const LOAD_MARGIN: usize = 0x10000;

pub struct Vm
{
	registers: Registers,
	memory: Memory,
	stack_size: Word,
	stopped: bool,
	exit_value: Option<Word>,
	stop_requested: bool,
	checked_stack: bool,
}

impl Vm
{
	pub fn new() -> Vm
	{
		Vm
		{
			registers: Registers::new(),
			memory: Memory::new(0),
			stack_size: Word(0),
			stopped: false,
			exit_value: None,
			stop_requested: false,
			checked_stack: false,
		}
	}

	// A bare VM with `len` bytes of memory and R[1] at the top, bypassing
	// `load`. Used to drive host primitives (which expect a stack) outside
	// of a full object load, e.g. in the standard primitives' own tests.
	pub fn new_with_memory(len: usize) -> Vm
	{
		let mut vm = Vm::new();
		vm.memory = Memory::new(len);
		vm.registers.set(SP, Word(len as u32));
		vm.stack_size = Word(len as u32);
		vm
	}

	// Opt into the optional stack-discipline checking mentioned in spec.md
	// 9 ("implementations MAY add a mode that traps when r1 crosses
	// stack_size or underflows"). Off by default, matching the spec's
	// default semantics for `incr4`/`decr4`/`incr`/`decr` on `r1`.
	pub fn with_checked_stack(mut self) -> Vm
	{
		self.checked_stack = true;
		self
	}

	pub fn registers(&self) -> &Registers
	{
		&self.registers
	}

	pub fn memory(&self) -> &Memory
	{
		&self.memory
	}

	// Widen the memory arena beyond whatever `load` allocated, e.g. to honor
	// a user-requested `-m` size on the CLI. A no-op if already large enough.
	pub fn ensure_memory_at_least(&mut self, len: usize)
	{
		self.memory.grow_to(len);
	}

	pub fn is_stopped(&self) -> bool
	{
		self.stopped
	}

	pub fn exit_value(&self) -> Option<Word>
	{
		self.exit_value
	}

	// Checked at instruction boundaries by `exec`; has no effect on a host
	// primitive already running (spec.md 5).
	pub fn request_stop(&mut self)
	{
		self.stop_requested = true;
	}

	pub fn load(&mut self, obj: &Object, host: &HostTable) -> Result<(), LoadError>
	{
		if let Some(dep) = obj.dependencies().iter().find(|d| !d.is_host_primitive())
		{
			warn!("load: unresolved non-host dependency \"{}\"", dep.name);
			return Err(LoadError::UnresolvedDependency(dep.name.clone()));
		}

		for dep in obj.dependencies()
		{
			let stripped = dep.name.trim_start_matches('%');

			if host.primitive_index(stripped).is_none()
			{
				warn!("load: no host primitive registered for \"{}\"", dep.name);
				return Err(LoadError::UnknownHostPrimitive(dep.name.clone()));
			}
		}

		let stack_size = obj.stack_size().0 as usize;
		let text_len = obj.text().len();
		let data_len = obj.data().len();
		let text_padded = next_pow2(text_len);
		let data_padded = next_pow2(data_len);
		let required = stack_size + text_padded + data_padded + LOAD_MARGIN;

		debug!("load: stack_size={} text_len={} data_len={} memory={}", stack_size, text_len, data_len, required);

		let mut memory = Memory::new(required);
		memory.write_bytes(stack_size, obj.text()).expect("text fits the freshly sized memory");
		memory.write_bytes(stack_size + text_padded, obj.data()).expect("data fits the freshly sized memory");

		for &r in obj.relocations()
		{
			let r = r.0 as usize;

			let (addr, shift) = if r < text_len
			{
				(r + stack_size, stack_size)
			}
			else
			{
				(r + stack_size + text_padded - text_len, stack_size + text_padded - text_len)
			};

			let word = memory.read_word(addr).expect("relocation address in range by object invariant");
			memory.write_word(addr, Word(word.0.wrapping_add(shift as u32))).expect("relocation address in range by object invariant");
		}

		for dep in obj.dependencies()
		{
			let stripped = dep.name.trim_start_matches('%');
			let index = host.primitive_index(stripped).expect("checked above");
			let addr = dep.address.0 as usize + stack_size;
			memory.write_word(addr, Word(index as u32)).expect("dependency address in range by object invariant");
		}

		self.memory = memory;
		self.registers = Registers::new();
		self.registers.set_pc(Word(stack_size as u32));
		self.registers.set(SP, Word(stack_size as u32));
		self.stack_size = Word(stack_size as u32);
		self.stopped = false;
		self.exit_value = None;
		self.stop_requested = false;

		Ok(())
	}

	pub fn step(&mut self, host: &HostTable) -> Result<StepResult, Fault>
	{
		if self.stopped
		{
			return Ok(StepResult::Stopped(self.exit_value.unwrap_or(Word(0))));
		}

		let pc0 = self.registers.pc();
		let bytes = self.memory.read_bytes(pc0.0 as usize, 4)?;
		let instr = Instruction::decode([bytes[0], bytes[1], bytes[2], bytes[3]]).ok_or(Fault::InvalidInstruction)?;

		let mut next_pc = pc0.0.wrapping_add(4);

		let immediate = if instr.is_load()
		{
			let imm_bytes = self.memory.read_bytes(next_pc as usize, 4)?;
			let imm = Word::from_be_bytes([imm_bytes[0], imm_bytes[1], imm_bytes[2], imm_bytes[3]]);
			next_pc = next_pc.wrapping_add(4);
			Some(imm)
		}
		else
		{
			None
		};

		// Commit the advanced PC before dispatch so an instruction that
		// explicitly targets `r0` (the `move r0 rX` jump idiom, spec.md 9)
		// overwrites it. On a faulting dispatch, roll PC back to `pc0` so
		// it points at the instruction that faulted, not past it.
		self.registers.set_pc(Word(next_pc));

		if let Err(fault) = self.dispatch(instr, immediate, host)
		{
			trace!("fault at pc={}: {} ({})", pc0, instr, fault);
			self.registers.set_pc(pc0);
			return Err(fault);
		}

		if let Instruction::Stop(a) = instr
		{
			let exit = self.registers.get(a);
			debug!("stopped with exit value {}", exit);
			self.stopped = true;
			self.exit_value = Some(exit);
			return Ok(StepResult::Stopped(exit));
		}

		Ok(StepResult::Continued)
	}

	fn peek_instruction(&self) -> Result<Instruction, Fault>
	{
		let pc = self.registers.pc().0 as usize;
		let bytes = self.memory.read_bytes(pc, 4)?;
		Instruction::decode([bytes[0], bytes[1], bytes[2], bytes[3]]).ok_or(Fault::InvalidInstruction)
	}

	// Run until the instruction about to execute is `ext` (without
	// executing it), or until stopped. Used by debuggers (spec.md 4.4).
	pub fn next(&mut self, host: &HostTable) -> Result<NextResult, Fault>
	{
		loop
		{
			if self.stopped
			{
				return Ok(NextResult::Stopped(self.exit_value.unwrap_or(Word(0))));
			}

			if matches!(self.peek_instruction()?, Instruction::Ext(_))
			{
				return Ok(NextResult::AboutToCallHost);
			}

			match self.step(host)?
			{
				StepResult::Stopped(w) => return Ok(NextResult::Stopped(w)),
				StepResult::Continued => { }
			}
		}
	}

	pub fn exec(&mut self, host: &HostTable) -> Result<RunResult, Fault>
	{
		loop
		{
			if self.stop_requested
			{
				self.stop_requested = false;
				return Ok(RunResult::Cancelled);
			}

			match self.step(host)?
			{
				StepResult::Stopped(w) => return Ok(RunResult::Stopped(w)),
				StepResult::Continued => { }
			}
		}
	}

	// Stack helpers for host primitives: the stack grows downward, and per
	// the assembler's own idiom (`decr4 r1; write32 r1 rX`) the top element
	// lives exactly at the current `R[1]`.
	pub fn push(&mut self, value: Word) -> Result<(), Fault>
	{
		let new_sp = self.registers.sp().0.wrapping_sub(4);

		if self.checked_stack && new_sp > self.registers.sp().0
		{
			return Err(Fault::StackOverflow);
		}

		self.memory.write_u32(new_sp as usize, value.0)?;
		self.registers.set(SP, Word(new_sp));
		Ok(())
	}

	pub fn pop(&mut self) -> Result<Word, Fault>
	{
		let sp = self.registers.sp().0;
		let value = self.memory.read_u32(sp as usize)?;
		let new_sp = sp.wrapping_add(4);

		if self.checked_stack && new_sp > self.stack_size.0
		{
			return Err(Fault::StackUnderflow);
		}

		self.registers.set(SP, Word(new_sp));
		Ok(Word(value))
	}

	fn adjust_register(&mut self, operand: u8, delta: u32, increase: bool) -> Result<(), Fault>
	{
		let cur = self.registers.get(operand).0;
		let new = if increase { cur.wrapping_add(delta) } else { cur.wrapping_sub(delta) };

		if self.checked_stack && reg_index(operand) == reg_index(SP)
		{
			if increase && new > self.stack_size.0
			{
				return Err(Fault::StackUnderflow);
			}

			if !increase && new > cur
			{
				return Err(Fault::StackOverflow);
			}
		}

		self.registers.set(operand, Word(new));
		Ok(())
	}

	fn dispatch(&mut self, instr: Instruction, immediate: Option<Word>, host: &HostTable) -> Result<(), Fault>
	{
		use Instruction::*;

		match instr
		{
			Nop => { }
			Load(a) => self.registers.set(a, immediate.expect("load always carries an immediate")),
			Ext(a) =>
			{
				let index = self.registers.get(a).0 as usize;

				if index >= host.len()
				{
					return Err(Fault::InvalidHostPrimitive);
				}

				host.call(index, self)?;
			}
			Write8(a, b) =>
			{
				let addr = self.registers.get(a).0 as usize;
				let value = (self.registers.get(b).0 & 0xFF) as u8;
				self.memory.write_u8(addr, value)?;
			}
			Read8(a, b) =>
			{
				let addr = self.registers.get(b).0 as usize;
				let value = self.memory.read_u8(addr)?;
				self.registers.set(a, Word(value as u32));
			}
			Write16(a, b) =>
			{
				let addr = self.registers.get(a).0 as usize;
				let value = (self.registers.get(b).0 & 0xFFFF) as u16;
				self.memory.write_u16(addr, value)?;
			}
			Read16(a, b) =>
			{
				let addr = self.registers.get(b).0 as usize;
				let value = self.memory.read_u16(addr)?;
				self.registers.set(a, Word(value as u32));
			}
			Write32(a, b) =>
			{
				let addr = self.registers.get(a).0 as usize;
				let value = self.registers.get(b).0;
				self.memory.write_u32(addr, value)?;
			}
			Read32(a, b) =>
			{
				let addr = self.registers.get(b).0 as usize;
				let value = self.memory.read_u32(addr)?;
				self.registers.set(a, Word(value));
			}
			Stop(_) => { }
			Move(a, b) => self.registers.set(a, self.registers.get(b)),
			MoveIf(a, b, c) => if self.registers.get(c).0 != 0 { self.registers.set(a, self.registers.get(b)); }
			MoveIfZero(a, b, c) => if self.registers.get(c).0 == 0 { self.registers.set(a, self.registers.get(b)); }
			Swap(a, b) =>
			{
				let tmp = self.registers.get(a);
				self.registers.set(a, self.registers.get(b));
				self.registers.set(b, tmp);
			}
			LShift(a, b, c) =>
			{
				let amt = self.registers.get(c).0 & 31;
				self.registers.set(a, Word(self.registers.get(b).0.wrapping_shl(amt)));
			}
			RShift(a, b, c) =>
			{
				let amt = self.registers.get(c).0 & 31;
				self.registers.set(a, Word(self.registers.get(b).0.wrapping_shr(amt)));
			}
			SShift(a, b, c) =>
			{
				let amt = self.registers.get(c).0 & 31;
				let value = self.registers.get(b).0 as i32;
				self.registers.set(a, Word(value.wrapping_shr(amt) as u32));
			}
			And(a, b, c) => self.registers.set(a, Word(self.registers.get(b).0 & self.registers.get(c).0)),
			Or(a, b, c) => self.registers.set(a, Word(self.registers.get(b).0 | self.registers.get(c).0)),
			Xor(a, b, c) => self.registers.set(a, Word(self.registers.get(b).0 ^ self.registers.get(c).0)),
			Neg(a, b) => self.registers.set(a, Word(!self.registers.get(b).0)),
			Incr(a) => self.adjust_register(a, 1, true)?,
			Decr(a) => self.adjust_register(a, 1, false)?,
			Incr4(a) => self.adjust_register(a, 4, true)?,
			Decr4(a) => self.adjust_register(a, 4, false)?,
			Add(a, b, c) => self.registers.set(a, Word(self.registers.get(b).0.wrapping_add(self.registers.get(c).0))),
			Sub(a, b, c) => self.registers.set(a, Word(self.registers.get(b).0.wrapping_sub(self.registers.get(c).0))),
			Mul(a, b, c) =>
			{
				let product = (self.registers.get(b).0 as u64) * (self.registers.get(c).0 as u64);
				self.registers.set(a, Word(product as u32));
				self.registers.set(crate::types::REM, Word((product >> 32) as u32));
			}
			Div(a, b, c) =>
			{
				let divisor = self.registers.get(c).0;

				if divisor == 0
				{
					return Err(Fault::DivisionByZero);
				}

				let dividend = self.registers.get(b).0;
				self.registers.set(a, Word(dividend / divisor));
				self.registers.set(crate::types::REM, Word(dividend % divisor));
			}
			Out(a) =>
			{
				use std::io::Write;

				let byte = (self.registers.get(a).0 & 0xFF) as u8;
				std::io::stdout().write_all(&[byte]).map_err(|e| Fault::HostError(e.to_string()))?;
			}
			In(a) =>
			{
				use std::io::Read;

				let mut buf = [0u8; 1];
				let n = std::io::stdin().read(&mut buf).map_err(|e| Fault::HostError(e.to_string()))?;
				self.registers.set(a, if n == 0 { Word(0xFFFF_FFFF) } else { Word(buf[0] as u32) });
			}
		}

		Ok(())
	}
}

impl Default for Vm
{
	fn default() -> Vm
	{
		Vm::new()
	}
}

fn next_pow2(n: usize) -> usize
{
	if n == 0 { 0 } else { n.next_power_of_two() }
}
