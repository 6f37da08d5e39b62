// Basic types (machine words, registers, instructions, ...) used by every
// stage of the toolchain:
pub mod types;

// The on-disk object format and its codec:
pub mod object;

// Turns assembly source text into an `object::Object`:
pub mod assembly;

// Merges relocatable objects into one:
pub mod linker;

// Loads an object and runs it:
pub mod vm;

// Hex/disassembly rendering of an object's text section, shared by `objdump`
// and `vm_exec`'s debugger prompt:
pub mod disasm;

// Shared error glue for the four binaries:
pub mod cli;
