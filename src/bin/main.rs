use std::fs;
use std::io::{self, Write};
use std::ops::Range;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use g1::draw::DrawCommand;
use g1::host::{Button, Buttons, Display};
use g1::vm::{Step, Vm};
use g1::{assembler, data};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "g1", about = "Run a g1 program headlessly and print what it draws.")]
struct Args {
  /// Program source to assemble.
  program: PathBuf,

  /// g1d data file to preload into memory.
  #[arg(long, value_name = "PATH")]
  data: Option<PathBuf>,

  /// Number of ticks to run after `start`.
  #[arg(long, default_value_t = 1)]
  ticks: u64,

  /// Hold a button for every tick (control1, control2, a, b, up, down, left, right).
  #[arg(long, value_name = "BUTTON")]
  press: Vec<Button>,

  /// Memory size for programs without a `#memory` directive.
  #[arg(long, default_value_t = 128)]
  memory: usize,

  /// Instructions `start` or a single tick may run before it is aborted
  /// (0 = no limit).
  #[arg(long, default_value_t = 1_000_000)]
  max_steps: u64,

  /// Print the program header, then each frame, as one JSON line each.
  #[arg(long, default_value_t = false)]
  json: bool,

  /// Print the memory slots LO..HI after the last tick.
  #[arg(long, value_name = "LO..HI", value_parser = parse_range)]
  dump: Option<Range<usize>>,
}

fn parse_range(s: &str) -> Result<Range<usize>, String> {
  let (lo, hi) = s
    .split_once("..")
    .ok_or_else(|| format!("expected LO..HI, got `{s}`"))?;
  let lo = lo.parse().map_err(|_| format!("invalid start `{lo}`"))?;
  let hi = hi.parse().map_err(|_| format!("invalid end `{hi}`"))?;
  if lo > hi {
    return Err(format!("empty range `{s}`"));
  }
  Ok(lo..hi)
}

/// Logs go to stderr, filtered by `RUST_LOG` (`warn` when unset). Set
/// `RUST_LOG=g1::log=info` to see the program's `log` output.
fn setup_logger() {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
  tracing_subscriber::fmt()
    .compact()
    .with_env_filter(filter)
    .with_writer(io::stderr)
    .init();
}

fn main() -> Result<()> {
  setup_logger();
  let args = Args::parse();

  let source = fs::read_to_string(&args.program)
    .with_context(|| format!("could not read `{}`", args.program.display()))?;
  let program = assembler::load(&source, args.memory)
    .with_context(|| format!("could not assemble `{}`", args.program.display()))?;
  let meta = *program.meta();
  let display = Display::from(&meta);
  let mut vm = Vm::from_program(program);

  if let Some(path) = &args.data {
    load_data(&mut vm, path)?;
  }

  let buttons: Buttons = args.press.iter().copied().collect();
  let mut out = io::stdout().lock();
  if args.json {
    writeln!(out, "{}", serde_json::json!({ "meta": meta }))?;
  }

  vm.sync_host(&buttons, &display, 0);
  vm.begin_start();
  let commands = run_block(&mut vm, args.max_steps).context("`start` failed")?;
  if !commands.is_empty() {
    print_frame(&mut out, None, &commands, args.json)?;
  }

  for tick in 0..args.ticks {
    vm.sync_host(&buttons, &display, display.frame_ms());
    vm.begin_tick().with_context(|| format!("tick {tick} failed"))?;
    let commands =
      run_block(&mut vm, args.max_steps).with_context(|| format!("tick {tick} failed"))?;
    print_frame(&mut out, Some(tick), &commands, args.json)?;
  }

  if let Some(range) = args.dump {
    let Some(slots) = vm.memory().as_slice().get(range.clone()) else {
      bail!(
        "cannot dump {range:?}, memory has {} slots",
        vm.memory().len()
      );
    };
    for (address, value) in range.zip(slots) {
      writeln!(out, "${address:<6} {value}")?;
    }
  }
  Ok(())
}

fn load_data(vm: &mut Vm, path: &Path) -> Result<()> {
  let text = fs::read_to_string(path)
    .with_context(|| format!("could not read data file `{}`", path.display()))?;
  // files named in the data file are relative to it
  let base = path.parent().unwrap_or(Path::new("."));
  let entries = data::parse(&text, vm.memory().len(), |file| fs::read(base.join(file)))
    .with_context(|| format!("invalid data file `{}`", path.display()))?;
  vm.load_data(&entries)
    .with_context(|| format!("data file `{}` does not fit in memory", path.display()))?;
  tracing::debug!(entries = entries.len(), "loaded data");
  Ok(())
}

/// Finish the block the vm was pointed at, giving up after `max_steps`
/// instructions.
fn run_block(vm: &mut Vm, max_steps: u64) -> Result<Vec<DrawCommand>> {
  if max_steps == 0 {
    while vm.step()? == Step::Running {}
  } else if vm.step_for(max_steps)? == Step::Running {
    bail!(
      "still running after {max_steps} instructions (pc {})",
      vm.pc()
    );
  }
  Ok(vm.take_commands())
}

fn print_frame(
  out: &mut impl Write,
  tick: Option<u64>,
  commands: &[DrawCommand],
  json: bool,
) -> Result<()> {
  if json {
    let frame = serde_json::json!({ "tick": tick, "commands": commands });
    writeln!(out, "{frame}")?;
    return Ok(());
  }
  match tick {
    Some(tick) => writeln!(out, "tick {tick}:")?,
    None => writeln!(out, "start:")?,
  }
  for command in commands {
    writeln!(out, "  {command}")?;
  }
  Ok(())
}
