use std::fmt;
use std::str::FromStr;

/// What kind of operand an instruction accepts in a given position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
  /// Must be a memory address (`$n`), the instruction writes there.
  Destination,
  /// Either an address, read at runtime, or an immediate.
  Value,
  /// A label name or a literal instruction index.
  Target,
}

use Slot::{Destination as D, Target as T, Value as V};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
  /// Copies a value into memory.
  ///
  /// | Operation | Semantics/RTL | Assembly    |
  /// |-----------|---------------|-------------|
  /// | Move      | `m[d] ← v`    | `mov $d v`  |
  Mov,

  /// Copies the slot a value points at into memory.
  ///
  /// | Operation     | Semantics/RTL  | Assembly    |
  /// |---------------|----------------|-------------|
  /// | Move Pointer  | `m[d] ← m[p]`  | `movp $d p` |
  Movp,

  /// | Operation | Semantics/RTL   | Assembly      |
  /// |-----------|-----------------|---------------|
  /// | Add       | `m[d] ← a + b`  | `add $d a b`  |
  Add,

  /// | Operation | Semantics/RTL   | Assembly      |
  /// |-----------|-----------------|---------------|
  /// | Subtract  | `m[d] ← a − b`  | `sub $d a b`  |
  Sub,

  /// | Operation | Semantics/RTL   | Assembly      |
  /// |-----------|-----------------|---------------|
  /// | Multiply  | `m[d] ← a × b`  | `mul $d a b`  |
  Mul,

  /// Truncates toward zero, faults when `b` is zero.
  ///
  /// | Operation | Semantics/RTL   | Assembly      |
  /// |-----------|-----------------|---------------|
  /// | Divide    | `m[d] ← a ÷ b`  | `div $d a b`  |
  Div,

  /// The result takes the sign of `a`, faults when `b` is zero.
  ///
  /// | Operation | Semantics/RTL     | Assembly      |
  /// |-----------|-------------------|---------------|
  /// | Modulo    | `m[d] ← a mod b`  | `mod $d a b`  |
  Mod,

  /// | Operation | Semantics/RTL            | Assembly       |
  /// |-----------|--------------------------|----------------|
  /// | Less Than | `m[d] ← (a < b) ? 1 : 0` | `less $d a b`  |
  Less,

  /// | Operation | Semantics/RTL             | Assembly        |
  /// |-----------|---------------------------|-----------------|
  /// | Equal     | `m[d] ← (a == b) ? 1 : 0` | `equal $d a b`  |
  Equal,

  /// | Operation   | Semantics/RTL             | Assembly    |
  /// |-------------|---------------------------|-------------|
  /// | Logical NOT | `m[d] ← (a == 0) ? 1 : 0` | `not $d a`  |
  Not,

  /// Jumps when the condition is non-zero, falls through otherwise.
  ///
  /// | Operation | Semantics/RTL          | Assembly         |
  /// |-----------|------------------------|------------------|
  /// | Jump      | `if c != 0 : pc ← t`   | `jmp label c`    |
  Jmp,

  /// | Operation | Semantics/RTL      | Assembly        |
  /// |-----------|--------------------|-----------------|
  /// | Color     | `color ← (r,g,b)`  | `color r g b`   |
  Color,

  /// | Operation | Semantics/RTL   | Assembly     |
  /// |-----------|-----------------|--------------|
  /// | Point     | `draw (x,y)`    | `point x y`  |
  Point,

  /// | Operation | Semantics/RTL              | Assembly           |
  /// |-----------|----------------------------|--------------------|
  /// | Line      | `draw (x1,y1) → (x2,y2)`   | `line x1 y1 x2 y2` |
  Line,

  /// | Operation | Semantics/RTL         | Assembly       |
  /// |-----------|-----------------------|----------------|
  /// | Rectangle | `fill (x,y) w × h`    | `rect x y w h` |
  Rect,

  /// Writes a value to the `g1::log` tracing target.
  ///
  /// | Operation | Semantics/RTL | Assembly |
  /// |-----------|---------------|----------|
  /// | Log       | `emit v`      | `log v`  |
  Log,
}

impl Opcode {
  pub const ALL: [Opcode; 16] = [
    Self::Mov,
    Self::Movp,
    Self::Add,
    Self::Sub,
    Self::Mul,
    Self::Div,
    Self::Mod,
    Self::Less,
    Self::Equal,
    Self::Not,
    Self::Jmp,
    Self::Color,
    Self::Point,
    Self::Line,
    Self::Rect,
    Self::Log,
  ];

  pub const fn mnemonic(&self) -> &'static str {
    match self {
      Self::Mov => "mov",
      Self::Movp => "movp",
      Self::Add => "add",
      Self::Sub => "sub",
      Self::Mul => "mul",
      Self::Div => "div",
      Self::Mod => "mod",
      Self::Less => "less",
      Self::Equal => "equal",
      Self::Not => "not",
      Self::Jmp => "jmp",
      Self::Color => "color",
      Self::Point => "point",
      Self::Line => "line",
      Self::Rect => "rect",
      Self::Log => "log",
    }
  }

  /// The operand layout, one entry per operand.
  pub const fn slots(&self) -> &'static [Slot] {
    match self {
      Self::Mov | Self::Movp | Self::Not => &[D, V],
      Self::Add
      | Self::Sub
      | Self::Mul
      | Self::Div
      | Self::Mod
      | Self::Less
      | Self::Equal => &[D, V, V],
      Self::Jmp => &[T, V],
      Self::Color => &[V, V, V],
      Self::Point => &[V, V],
      Self::Line | Self::Rect => &[V, V, V, V],
      Self::Log => &[V],
    }
  }

  pub const fn arity(&self) -> usize {
    self.slots().len()
  }

  /// Whether the first operand is a memory destination.
  pub const fn assigns(&self) -> bool {
    matches!(self.slots().first(), Some(Slot::Destination))
  }
}

impl fmt::Display for Opcode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.mnemonic())
  }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown opcode `{0}`")]
pub struct UnknownOpcode(pub String);

impl FromStr for Opcode {
  type Err = UnknownOpcode;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Self::ALL
      .into_iter()
      .find(|op| op.mnemonic() == s)
      .ok_or_else(|| UnknownOpcode(s.to_owned()))
  }
}
