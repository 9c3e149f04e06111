use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

use crate::memory::MIN_MEMORY;
use crate::opcode::Opcode;

pub const TICK_LABEL: &str = "tick";
pub const START_LABEL: &str = "start";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
  /// A memory index, written `$n`.
  Address(u32),
  Immediate(i32),
  /// A resolved instruction index.
  Target(usize),
}

impl fmt::Display for Operand {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Address(address) => write!(f, "${address}"),
      Self::Immediate(value) => write!(f, "{value}"),
      Self::Target(index) => write!(f, "{index}"),
    }
  }
}

/// A decoded instruction. Only the assembler builds these, so operand count
/// and kinds always agree with [`Opcode::slots`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
  opcode: Opcode,
  operands: Vec<Operand>,
  line: usize,
}

impl Instruction {
  pub(crate) fn new(opcode: Opcode, operands: Vec<Operand>, line: usize) -> Self {
    debug_assert_eq!(opcode.arity(), operands.len());
    Self {
      opcode,
      operands,
      line,
    }
  }

  pub fn opcode(&self) -> Opcode {
    self.opcode
  }

  pub fn operands(&self) -> &[Operand] {
    &self.operands
  }

  /// 1-based source line the instruction came from.
  pub fn line(&self) -> usize {
    self.line
  }
}

impl fmt::Display for Instruction {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.opcode)?;
    for operand in &self.operands {
      write!(f, " {operand}")?;
    }
    Ok(())
  }
}

/// Header directives of a program source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Meta {
  /// `#memory`, when the source declares it.
  pub memory: Option<u32>,
  pub width: u32,
  pub height: u32,
  pub tickrate: u32,
}

impl Default for Meta {
  fn default() -> Self {
    Self {
      memory: None,
      width: 100,
      height: 100,
      tickrate: 60,
    }
  }
}

#[derive(Debug, Clone)]
pub struct Program {
  instructions: Vec<Instruction>,
  labels: HashMap<String, usize>,
  meta: Meta,
  memory_size: usize,
  start: Option<usize>,
  tick: usize,
}

impl Program {
  pub(crate) fn new(
    instructions: Vec<Instruction>,
    labels: HashMap<String, usize>,
    meta: Meta,
    declared_memory_size: usize,
    start: Option<usize>,
    tick: usize,
  ) -> Self {
    let declared = meta
      .memory
      .map_or(declared_memory_size, |memory| memory as usize);
    Self {
      instructions,
      labels,
      meta,
      memory_size: declared.max(MIN_MEMORY),
      start,
      tick,
    }
  }

  pub fn instructions(&self) -> &[Instruction] {
    &self.instructions
  }

  pub fn get(&self, index: usize) -> Option<&Instruction> {
    self.instructions.get(index)
  }

  pub fn len(&self) -> usize {
    self.instructions.len()
  }

  pub fn is_empty(&self) -> bool {
    self.instructions.is_empty()
  }

  pub fn label(&self, name: &str) -> Option<usize> {
    self.labels.get(name).copied()
  }

  pub fn meta(&self) -> &Meta {
    &self.meta
  }

  /// Memory the program asked for, at least [`MIN_MEMORY`].
  pub fn memory_size(&self) -> usize {
    self.memory_size
  }

  pub fn start(&self) -> Option<usize> {
    self.start
  }

  pub fn tick(&self) -> usize {
    self.tick
  }
}
