// `ld [-o OUT] [-i|--incremental] INPUT...`: merges relocatable objects in
// argument order. Without `-i`, fails if any non-host dependency remains
// unresolved in the merged result.
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::{error, info};

use robotvm::cli::CliError;
use robotvm::object::Object;

#[derive(Parser, Debug)]
#[clap(name = "ld", about = "Linker for the RobotVM toolchain")]
struct Args
{
	/// Output object file. Defaults to `a.out`.
	#[clap(short = 'o', long = "output", default_value = "a.out")]
	output: PathBuf,

	/// Allow unresolved non-host dependencies to remain in the output.
	#[clap(short = 'i', long = "incremental")]
	incremental: bool,

	/// Object files to merge, in link order.
	inputs: Vec<PathBuf>,
}

fn run(args: &Args) -> Result<(), CliError>
{
	if args.inputs.is_empty()
	{
		return Err(CliError::Message("no input files".to_string()));
	}

	let mut objects = Vec::with_capacity(args.inputs.len());

	for path in &args.inputs
	{
		let bytes = fs::read(path)?;
		objects.push(Object::decode(&bytes)?);
	}

	let merged = robotvm::linker::link_all(objects)?;

	if !args.incremental && merged.dependencies_count_nonhost() > 0
	{
		let names: Vec<&str> = merged.dependencies().iter().filter(|d| !d.is_host_primitive()).map(|d| d.name.as_str()).collect();
		return Err(CliError::Message(format!("unresolved dependencies: {}", names.join(", "))));
	}

	merged.validate()?;

	fs::write(&args.output, merged.encode())?;
	info!("wrote {}", args.output.display());
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
			eprintln!("ld: {}", e);
			ExitCode::FAILURE
		}
	}
}
