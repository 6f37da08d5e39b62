// `objdump [-s|--disassembler] INPUT`: dumps header, section sizes, symbol
// table, relocation list, dependency list, and either a hex dump of text or
// a disassembled listing.
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::error;

use robotvm::cli::CliError;
use robotvm::disasm;
use robotvm::object::Object;

#[derive(Parser, Debug)]
#[clap(name = "objdump", about = "Object file inspector for the RobotVM toolchain")]
struct Args
{
	/// Show a disassembled listing of the text section instead of a hex dump.
	#[clap(short = 's', long = "disassembler")]
	disassembler: bool,

	/// Object file to inspect.
	input: PathBuf,
}

fn dump(obj: &Object, disassembler: bool) -> String
{
	let mut out = String::new();

	out.push_str(&format!("FLAGS: {}\n", obj.flags()));
	out.push_str(&format!("STACK SIZE: {}\n", obj.stack_size()));
	out.push_str(&format!("TEXT SIZE: {}\n", obj.text_len()));
	out.push_str(&format!("DATA SIZE: {}\n", obj.data_len()));
	out.push_str(&format!("SYMBOLS COUNT: {}\n", obj.defined_symbols().len()));
	out.push_str(&format!("RELOCATIONS COUNT: {}\n", obj.relocations().len()));
	out.push_str(&format!("DEPENDS COUNT: {}\n", obj.dependencies().len()));

	if !obj.dependencies().is_empty()
	{
		out.push_str("DEPENDS:\n");

		for dep in obj.dependencies()
		{
			out.push_str(&format!("\t[{}] {}\n", dep.address, dep.name));
		}
	}

	if !obj.defined_symbols().is_empty()
	{
		out.push_str("SYMBOLS:\n");

		for sym in obj.defined_symbols()
		{
			out.push_str(&format!("\t[{}] {}\n", sym.address, sym.name));
		}
	}

	if !obj.relocations().is_empty()
	{
		out.push_str("RELOCATIONS:\n");

		for reloc in obj.relocations()
		{
			out.push_str(&format!("\t[{}]\n", reloc));
		}
	}

	if !obj.text().is_empty()
	{
		out.push_str("TEXT:\n");

		if disassembler
		{
			out.push_str(&disasm::disassemble(obj));
		}
		else
		{
			out.push_str(&disasm::hex_dump(obj.text()));
		}
	}

	if !obj.data().is_empty()
	{
		out.push_str("DATA:\n");
		out.push_str(&disasm::hex_dump(obj.data()));
	}

	out
}

fn run(args: &Args) -> Result<(), CliError>
{
	let bytes = fs::read(&args.input)?;
	let obj = Object::decode(&bytes)?;

	print!("{}", dump(&obj, args.disassembler));
	Ok(())
}

fn main() -> ExitCode
{
	env_logger::init();
	let args = Args::parse();

	match run(&args)
	{
		Ok(()) => ExitCode::SUCCESS,
		Err(e) =>
		{
			error!("{}", e);
			eprintln!("objdump: {}", e);
			ExitCode::FAILURE
		}
	}
}
