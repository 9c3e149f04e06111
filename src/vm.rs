use std::ops::Range;

use crate::data::DataEntry;
use crate::draw::{Color, DrawCommand, DrawSink};
use crate::host::{Buttons, Display};
use crate::memory::{self, Memory, OutOfBounds};
use crate::opcode::Opcode;
use crate::program::{Instruction, Operand, Program};

/// The type of a single memory slot in our virtual machine
pub type Word = i32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
  /// `start` has not run yet.
  Idle,
  Ready,
}

/// What the machine did on a single [`Vm::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
  /// There are more instructions to run in the current block.
  Running,
  /// The program counter is outside the block, the block is done.
  Finished,
}

/// An error that occurred while executing an instruction
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
  #[error(transparent)]
  OutOfBounds(#[from] OutOfBounds),

  #[error("division by zero")]
  DivisionByZero,
}

/// A runtime [`Error`] together with the instruction that raised it. The rest
/// of the block is abandoned, memory keeps every write made before the fault.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("instruction {pc} (`{opcode}`, line {line}): {error}")]
pub struct Fault {
  pub pc: usize,
  pub opcode: Opcode,
  pub line: usize,
  pub error: Error,
}

/// A virtual machine running one assembled program.
///
/// The host drives it: [`Vm::sync_host`] to publish input and display state,
/// [`Vm::run_start`] once, then [`Vm::run_tick`] every frame. There is no
/// instruction budget, a host that needs one runs ticks through
/// [`Vm::begin_tick`] and [`Vm::step`] and counts.
#[derive(Debug)]
pub struct Vm {
  program: Program,
  memory: Memory,
  sink: DrawSink,
  pc: usize,
  // instructions the current block may run, leaving it ends the block
  block: Range<usize>,
  state: State,
}

impl Vm {
  /// Create a machine with `memory_size` slots, raised to
  /// [`memory::MIN_MEMORY`] if smaller.
  pub fn new(program: Program, memory_size: usize) -> Self {
    let memory = Memory::new(memory_size);
    tracing::debug!(
      memory = memory.len(),
      instructions = program.len(),
      "created vm"
    );
    Self {
      program,
      memory,
      sink: DrawSink::new(),
      pc: 0,
      block: 0..0,
      state: State::Idle,
    }
  }

  /// Create a machine with the memory size the program declares.
  pub fn from_program(program: Program) -> Self {
    let memory_size = program.memory_size();
    Self::new(program, memory_size)
  }

  pub fn program(&self) -> &Program {
    &self.program
  }

  pub fn memory(&self) -> &Memory {
    &self.memory
  }

  pub fn pc(&self) -> usize {
    self.pc
  }

  /// The color shapes are drawn with, black before the first `color`.
  pub fn color(&self) -> Color {
    self.sink.current_color()
  }

  pub fn memory_read(&self, address: i64) -> Result<Word, OutOfBounds> {
    self.memory.read(address)
  }

  pub fn memory_write(&mut self, address: i64, value: Word) -> Result<(), OutOfBounds> {
    self.memory.write(address, value)
  }

  /// Write every reserved slot: buttons, memory size, display parameters and
  /// the time since the previous tick. Hosts call this before each tick, which
  /// is what undoes any program writes to those slots.
  pub fn sync_host(&mut self, buttons: &Buttons, display: &Display, delta_ms: Word) {
    let memory_size = Word::try_from(self.memory.len()).unwrap_or(Word::MAX);
    let clamp = |value: u32| Word::try_from(value).unwrap_or(Word::MAX);
    let reserved = self.memory.reserved_mut();
    reserved[memory::BUTTONS..memory::BUTTONS + memory::BUTTON_COUNT]
      .copy_from_slice(&buttons.slots());
    reserved[memory::MEMORY_SIZE] = memory_size;
    reserved[memory::DISPLAY_WIDTH] = clamp(display.width);
    reserved[memory::DISPLAY_HEIGHT] = clamp(display.height);
    reserved[memory::TICK_RATE] = clamp(display.tickrate);
    reserved[memory::DELTA_MS] = delta_ms;
  }

  /// Preload data entries into memory. Stops at the first entry that does
  /// not fit.
  pub fn load_data(&mut self, entries: &[DataEntry]) -> Result<(), OutOfBounds> {
    for entry in entries {
      self.memory.load(entry.address, &entry.values)?;
    }
    Ok(())
  }

  /// Run the `start` block, if the program has one, and return what it drew.
  /// Only the first call does anything.
  pub fn run_start(&mut self) -> Result<Vec<DrawCommand>, Fault> {
    self.begin_start();
    while self.step()? == Step::Running {}
    Ok(self.sink.drain())
  }

  /// Point the program counter at `start` so that [`Vm::step`] can run the
  /// start block one instruction at a time. Once start has begun, later calls
  /// leave an empty block.
  pub fn begin_start(&mut self) {
    self.sink.clear();
    self.block = 0..0;
    if self.state == State::Ready {
      tracing::debug!("start already ran");
      return;
    }
    self.state = State::Ready;
    if let Some(start) = self.program.start() {
      tracing::debug!(start, "running start block");
      self.pc = start;
      self.block = start..self.program.tick();
    }
  }

  /// Run the `tick` block and return the commands it drew, in order. On the
  /// first call without a prior [`Vm::run_start`], `start` runs first and its
  /// commands lead the list.
  pub fn run_tick(&mut self) -> Result<Vec<DrawCommand>, Fault> {
    self.begin_tick()?;
    while self.step()? == Step::Running {}
    Ok(self.sink.drain())
  }

  /// Point the program counter at `tick` and drop undrained commands, so
  /// that [`Vm::step`] can run the tick one instruction at a time.
  pub fn begin_tick(&mut self) -> Result<(), Fault> {
    match self.state {
      State::Idle => {
        self.begin_start();
        while self.step()? == Step::Running {}
      }
      State::Ready => self.sink.clear(),
    }
    self.pc = self.program.tick();
    self.block = 0..self.program.len();
    Ok(())
  }

  /// Drain whatever the current tick has drawn so far.
  pub fn take_commands(&mut self) -> Vec<DrawCommand> {
    self.sink.drain()
  }

  /// Execute at most `limit` instructions of the current block. Returns
  /// [`Step::Running`] if the block has not finished yet.
  pub fn step_for(&mut self, limit: u64) -> Result<Step, Fault> {
    for _ in 0..limit {
      if self.step()? == Step::Finished {
        return Ok(Step::Finished);
      }
    }
    if self.block.contains(&self.pc) {
      Ok(Step::Running)
    } else {
      Ok(Step::Finished)
    }
  }

  /// Execute one instruction of the current block.
  pub fn step(&mut self) -> Result<Step, Fault> {
    let pc = self.pc;
    if !self.block.contains(&pc) {
      return Ok(Step::Finished);
    }
    let Some(instruction) = self.program.get(pc) else {
      return Ok(Step::Finished);
    };
    tracing::trace!(pc, %instruction, "step");

    let mut task = Task::new(&mut self.memory, &mut self.sink, instruction, pc);
    if let Err(error) = task.run() {
      // nothing else runs until the next tick begins
      self.block = 0..0;
      return Err(Fault {
        pc,
        opcode: instruction.opcode(),
        line: instruction.line(),
        error,
      });
    }
    self.pc = task.next;

    if self.block.contains(&self.pc) {
      Ok(Step::Running)
    } else {
      Ok(Step::Finished)
    }
  }
}

struct Task<'vm> {
  memory: &'vm mut Memory,
  sink: &'vm mut DrawSink,
  instruction: &'vm Instruction,
  next: usize,
}

impl<'vm> Task<'vm> {
  fn new(
    memory: &'vm mut Memory,
    sink: &'vm mut DrawSink,
    instruction: &'vm Instruction,
    pc: usize,
  ) -> Self {
    Self {
      memory,
      sink,
      instruction,
      next: pc + 1,
    }
  }

  #[inline]
  fn operand(&self, index: usize) -> Operand {
    self.instruction.operands()[index]
  }

  /// The value of an address or immediate operand.
  fn value(&self, index: usize) -> Result<Word, Error> {
    match self.operand(index) {
      Operand::Address(address) => Ok(self.memory.read(i64::from(address))?),
      Operand::Immediate(value) => Ok(value),
      Operand::Target(_) => unreachable!("targets are never read as values"),
    }
  }

  fn store(&mut self, index: usize, value: Word) -> Result<(), Error> {
    let Operand::Address(address) = self.operand(index) else {
      unreachable!("destinations are always addresses");
    };
    self.memory.write(i64::from(address), value)?;
    Ok(())
  }

  fn target(&self, index: usize) -> usize {
    let Operand::Target(target) = self.operand(index) else {
      unreachable!("jump targets are resolved by the assembler");
    };
    target
  }

  fn run(&mut self) -> Result<(), Error> {
    match self.instruction.opcode() {
      Opcode::Mov => mov(self),
      Opcode::Movp => movp(self),
      Opcode::Add => arithmetic(self, |a, b| Ok(a.wrapping_add(b))),
      Opcode::Sub => arithmetic(self, |a, b| Ok(a.wrapping_sub(b))),
      Opcode::Mul => arithmetic(self, |a, b| Ok(a.wrapping_mul(b))),
      Opcode::Div => arithmetic(self, |a, b| nonzero(b).map(|b| a.wrapping_div(b))),
      Opcode::Mod => arithmetic(self, |a, b| nonzero(b).map(|b| a.wrapping_rem(b))),
      Opcode::Less => arithmetic(self, |a, b| Ok(Word::from(a < b))),
      Opcode::Equal => arithmetic(self, |a, b| Ok(Word::from(a == b))),
      Opcode::Not => not(self),
      Opcode::Jmp => jmp(self),
      Opcode::Color => color(self),
      Opcode::Point => point(self),
      Opcode::Line => line(self),
      Opcode::Rect => rect(self),
      Opcode::Log => log(self),
    }
  }
}

fn nonzero(divisor: Word) -> Result<Word, Error> {
  match divisor {
    0 => Err(Error::DivisionByZero),
    divisor => Ok(divisor),
  }
}

// m[d] ← v
fn mov(task: &mut Task<'_>) -> Result<(), Error> {
  let v = task.value(1)?;
  task.store(0, v)
}

// m[d] ← m[p]
fn movp(task: &mut Task<'_>) -> Result<(), Error> {
  let p = task.value(1)?;
  let v = task.memory.read(i64::from(p))?;
  task.store(0, v)
}

// m[d] ← a ∘ b
fn arithmetic<F>(task: &mut Task<'_>, op: F) -> Result<(), Error>
where
  F: FnOnce(Word, Word) -> Result<Word, Error>,
{
  let a = task.value(1)?;
  let b = task.value(2)?;
  task.store(0, op(a, b)?)
}

// m[d] ← (a == 0) ? 1 : 0
fn not(task: &mut Task<'_>) -> Result<(), Error> {
  let a = task.value(1)?;
  task.store(0, Word::from(a == 0))
}

// if c != 0 : pc ← t
fn jmp(task: &mut Task<'_>) -> Result<(), Error> {
  if task.value(1)? != 0 {
    task.next = task.target(0);
  }
  Ok(())
}

fn color(task: &mut Task<'_>) -> Result<(), Error> {
  let color = Color::clamped(task.value(0)?, task.value(1)?, task.value(2)?);
  task.sink.color(color);
  Ok(())
}

fn point(task: &mut Task<'_>) -> Result<(), Error> {
  let (x, y) = (task.value(0)?, task.value(1)?);
  task.sink.point(x, y);
  Ok(())
}

fn line(task: &mut Task<'_>) -> Result<(), Error> {
  let (x1, y1) = (task.value(0)?, task.value(1)?);
  let (x2, y2) = (task.value(2)?, task.value(3)?);
  task.sink.line(x1, y1, x2, y2);
  Ok(())
}

fn rect(task: &mut Task<'_>) -> Result<(), Error> {
  let (x, y) = (task.value(0)?, task.value(1)?);
  let (w, h) = (task.value(2)?, task.value(3)?);
  task.sink.rect(x, y, w, h);
  Ok(())
}

fn log(task: &mut Task<'_>) -> Result<(), Error> {
  let value = task.value(0)?;
  tracing::info!(target: "g1::log", line = task.instruction.line(), value);
  Ok(())
}
