// `vm_exec [-d] [-m MEM_KB] INPUT`: loads and runs an object. With `-d`,
// steps one instruction at a time and prompts after each step; `quit` or
// `exit` at the prompt terminates the run early.
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::{error, info};

use robotvm::cli::CliError;
use robotvm::object::Object;
use robotvm::vm::{standard_primitives, Fault, HostTable, RunResult, StepResult, Vm};

#[derive(Parser, Debug)]
#[clap(name = "vm_exec", about = "Runs a RobotVM object file")]
struct Args
{
	/// Step one instruction at a time, prompting after each step.
	#[clap(short = 'd', long = "debug")]
	debug: bool,

	/// Minimum VM memory size, in kibibytes.
	#[clap(short = 'm', long = "memory")]
	mem_kb: Option<usize>,

	/// Object file to run.
	input: PathBuf,
}

fn debug_loop(vm: &mut Vm, host: &HostTable) -> Result<i32, Fault>
{
	let stdin = io::stdin();
	let mut lines = stdin.lock().lines();

	loop
	{
		let pc = vm.registers().pc();
		print!("[pc={}] (vm) ", pc);
		io::stdout().flush().ok();

		match vm.step(host)?
		{
			StepResult::Stopped(exit) =>
			{
				println!("stopped, exit = {}", exit);
				return Ok(exit.0 as i32);
			}
			StepResult::Continued => { }
		}

		match lines.next()
		{
			Some(Ok(line)) if line.trim() == "quit" || line.trim() == "exit" => return Ok(0),
			Some(Ok(_)) => continue,
			Some(Err(_)) | None => return Ok(0),
		}
	}
}

fn run(args: &Args) -> Result<i32, CliError>
{
	let bytes = fs::read(&args.input)?;
	let obj = Object::decode(&bytes)?;

	let host = standard_primitives();
	let mut vm = Vm::new();
	vm.load(&obj, &host)?;

	if let Some(kb) = args.mem_kb
	{
		vm.ensure_memory_at_least(kb * 1024);
	}

	let exit = if args.debug
	{
		debug_loop(&mut vm, &host)?
	}
	else
	{
		match vm.exec(&host)?
		{
			RunResult::Stopped(exit) => exit.0 as i32,
			RunResult::Cancelled => 0,
		}
	};

	Ok(exit)
}

fn main() -> ExitCode
{
	env_logger::init();
	let args = Args::parse();

	match run(&args)
	{
		Ok(exit) =>
		{
			info!("exited with {}", exit);
			ExitCode::from((exit & 0xFF) as u8)
		}
		Err(e) =>
		{
			error!("{}", e);
			eprintln!("vm_exec: {}", e);
			ExitCode::FAILURE
		}
	}
}
