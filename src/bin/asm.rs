// `asm [-o OUT] INPUT`: assembles source text into an object file.
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::{error, info};

use robotvm::cli::CliError;

#[derive(Parser, Debug)]
#[clap(name = "asm", about = "Assembler for the RobotVM toolchain")]
struct Args
{
	/// Output object file. Defaults to INPUT with a `.s` suffix swapped for
	/// `.o`, or INPUT + `.o` otherwise.
	#[clap(short = 'o', long = "output")]
	output: Option<PathBuf>,

	/// Assembly source file.
	input: PathBuf,
}

fn default_output(input: &std::path::Path) -> PathBuf
{
	match input.to_str()
	{
		Some(s) if s.ends_with(".s") => PathBuf::from(format!("{}.o", &s[..s.len() - 2])),
		_ => PathBuf::from(format!("{}.o", input.display())),
	}
}

fn run(args: &Args) -> Result<(), CliError>
{
	let source = fs::read_to_string(&args.input)?;

	let (object, diagnostics) = robotvm::assembly::assemble(&source)?;
	object.validate()?;

	for diag in &diagnostics
	{
		info!("{}", diag);
	}

	let out_path = args.output.clone().unwrap_or_else(|| default_output(&args.input));
	fs::write(&out_path, object.encode())?;

	info!("wrote {}", out_path.display());
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
			eprintln!("asm: {}", e);
			ExitCode::FAILURE
		}
	}
}
