//! Turns program text into a [`Program`].
//!
//! ```text
//! #memory 64         (header directives come before the first label)
//! start:
//!   mov $13 10
//! tick:
//!   sub $13 $13 1
//!   jmp tick $13     (loops until $13 reaches zero)
//!   point 0 0
//! ```
//!
//! Assembly runs in two passes. The first strips comments, reads directives,
//! records every label and splits instructions into tokens. The second types
//! the operands of each instruction, at which point every label is known and
//! jump targets become plain instruction indices.

use std::collections::HashMap;

use crate::memory::RESERVED;
use crate::opcode::{Opcode, Slot};
use crate::program::{Instruction, Meta, Operand, Program, START_LABEL, TICK_LABEL};

/// A reason the assembler rejected a program. Line numbers are 1-based.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
  #[error("line {line}: unknown opcode `{name}`")]
  UnknownOpcode { line: usize, name: String },

  #[error("line {line}: `{opcode}` takes {expected} operand(s) but got {found}")]
  ArityMismatch {
    line: usize,
    opcode: Opcode,
    expected: usize,
    found: usize,
  },

  #[error("line {line}: operand {position} of `{opcode}` must be {expected}, found `{token}`")]
  OperandKindMismatch {
    line: usize,
    opcode: Opcode,
    position: usize,
    expected: &'static str,
    token: String,
  },

  #[error("no `tick` label is defined")]
  MissingTickLabel,

  #[error("line {line}: undefined label `{name}`")]
  UnresolvedLabel { line: usize, name: String },

  #[error(
    "line {line}: `start` (instruction {start}) must come before `tick` (instruction {tick}), \
     otherwise one block runs into the other"
  )]
  AmbiguousStartFallthrough {
    line: usize,
    start: usize,
    tick: usize,
  },

  #[error("line {line}: invalid operand `{token}`")]
  InvalidOperand { line: usize, token: String },

  #[error("line {line}: jump target {target} is outside the program's {len} instruction(s)")]
  InvalidJumpTarget { line: usize, target: i32, len: usize },

  #[error("line {line}: label `{name}` is already defined on line {first}")]
  DuplicateLabel {
    line: usize,
    name: String,
    first: usize,
  },

  #[error("line {line}: invalid label name `{name}`")]
  InvalidLabel { line: usize, name: String },

  #[error("line {line}: comment is never closed")]
  UnterminatedComment { line: usize },

  #[error("line {line}: unknown directive `#{name}`")]
  UnknownDirective { line: usize, name: String },

  #[error("line {line}: invalid value `{value}` for directive `#{name}`")]
  InvalidDirectiveValue {
    line: usize,
    name: String,
    value: String,
  },

  #[error("line {line}: directives must come before the first label")]
  DirectiveOutsideHeader { line: usize },

  #[error("line {line}: unexpected `{token}`")]
  StrayToken { line: usize, token: String },
}

/// Assemble `source`. The program's memory size is its `#memory` directive
/// when present, `declared_memory_size` otherwise, and never less than
/// [`crate::memory::MIN_MEMORY`].
pub fn load(source: &str, declared_memory_size: usize) -> Result<Program, LoadError> {
  let source = strip_comments(source)?;
  let mut assembler = Assembler::default();
  for (number, line) in source.lines().enumerate() {
    assembler.line(number + 1, line)?;
  }
  assembler.finish(declared_memory_size)
}

/// Blank out every `( ... )` comment, keeping newlines so line numbers still
/// line up with the original text.
fn strip_comments(source: &str) -> Result<String, LoadError> {
  let mut out = String::with_capacity(source.len());
  let mut line = 1;
  let mut opened_on = None;
  for c in source.chars() {
    match (c, opened_on) {
      ('(', None) => {
        opened_on = Some(line);
        out.push(' ');
      }
      (')', Some(_)) => {
        opened_on = None;
        out.push(' ');
      }
      ('\n', _) => out.push('\n'),
      (_, Some(_)) => out.push(' '),
      (c, None) => out.push(c),
    }
    if c == '\n' {
      line += 1;
    }
  }
  match opened_on {
    Some(line) => Err(LoadError::UnterminatedComment { line }),
    None => Ok(out),
  }
}

struct RawInstruction<'src> {
  opcode: Opcode,
  tokens: Vec<&'src str>,
  line: usize,
}

#[derive(Default)]
struct Assembler<'src> {
  meta: Meta,
  // set by the first label, directives are rejected after it
  past_header: bool,
  labels: HashMap<String, usize>,
  label_lines: HashMap<String, usize>,
  raw: Vec<RawInstruction<'src>>,
}

impl<'src> Assembler<'src> {
  fn line(&mut self, line: usize, text: &'src str) -> Result<(), LoadError> {
    let mut tokens = text.split_whitespace().peekable();
    let Some(first) = tokens.peek().copied() else {
      return Ok(());
    };

    if let Some(name) = first.strip_prefix('#') {
      if self.past_header {
        return Err(LoadError::DirectiveOutsideHeader { line });
      }
      tokens.next();
      return self.directive(line, name, tokens);
    }

    while let Some(name) = tokens.next_if(|token| token.ends_with(':')) {
      self.label(line, &name[..name.len() - 1])?;
    }

    let Some(name) = tokens.next() else {
      return Ok(());
    };
    let opcode = name.parse::<Opcode>().map_err(|_| LoadError::UnknownOpcode {
      line,
      name: name.to_owned(),
    })?;
    let operands: Vec<_> = tokens.collect();
    if operands.len() != opcode.arity() {
      return Err(LoadError::ArityMismatch {
        line,
        opcode,
        expected: opcode.arity(),
        found: operands.len(),
      });
    }
    self.raw.push(RawInstruction {
      opcode,
      tokens: operands,
      line,
    });
    Ok(())
  }

  fn directive(
    &mut self,
    line: usize,
    name: &str,
    mut tokens: impl Iterator<Item = &'src str>,
  ) -> Result<(), LoadError> {
    let slot = match name {
      "memory" => None,
      "width" => Some(&mut self.meta.width),
      "height" => Some(&mut self.meta.height),
      "tickrate" => Some(&mut self.meta.tickrate),
      _ => {
        return Err(LoadError::UnknownDirective {
          line,
          name: name.to_owned(),
        })
      }
    };
    let raw = tokens.next().unwrap_or_default();
    let value = raw
      .parse::<u32>()
      .map_err(|_| LoadError::InvalidDirectiveValue {
        line,
        name: name.to_owned(),
        value: raw.to_owned(),
      })?;
    if let Some(token) = tokens.next() {
      return Err(LoadError::StrayToken {
        line,
        token: token.to_owned(),
      });
    }
    match slot {
      Some(slot) => *slot = value,
      None => self.meta.memory = Some(value),
    }
    Ok(())
  }

  fn label(&mut self, line: usize, name: &str) -> Result<(), LoadError> {
    self.past_header = true;
    if !is_identifier(name) {
      return Err(LoadError::InvalidLabel {
        line,
        name: name.to_owned(),
      });
    }
    if let Some(&first) = self.label_lines.get(name) {
      return Err(LoadError::DuplicateLabel {
        line,
        name: name.to_owned(),
        first,
      });
    }
    self.labels.insert(name.to_owned(), self.raw.len());
    self.label_lines.insert(name.to_owned(), line);
    Ok(())
  }

  fn finish(self, declared_memory_size: usize) -> Result<Program, LoadError> {
    let len = self.raw.len();
    let instructions = self
      .raw
      .iter()
      .map(|raw| resolve(raw, &self.labels, len))
      .collect::<Result<Vec<_>, _>>()?;

    let tick = self
      .labels
      .get(TICK_LABEL)
      .copied()
      .ok_or(LoadError::MissingTickLabel)?;
    let start = self.labels.get(START_LABEL).copied();
    if let Some(start) = start {
      if start >= tick {
        return Err(LoadError::AmbiguousStartFallthrough {
          line: self.label_lines[START_LABEL],
          start,
          tick,
        });
      }
    }

    tracing::debug!(
      instructions = instructions.len(),
      labels = self.labels.len(),
      ?start,
      tick,
      "assembled program"
    );
    Ok(Program::new(
      instructions,
      self.labels,
      self.meta,
      declared_memory_size,
      start,
      tick,
    ))
  }
}

/// An operand token before it is checked against its slot.
enum Token<'src> {
  Address(u32),
  Integer(i32),
  Name(&'src str),
}

fn lex_operand<'src>(line: usize, token: &'src str) -> Result<Token<'src>, LoadError> {
  let invalid = || LoadError::InvalidOperand {
    line,
    token: token.to_owned(),
  };
  if let Some(digits) = token.strip_prefix('$') {
    if !is_decimal(digits) {
      return Err(invalid());
    }
    return digits.parse().map(Token::Address).map_err(|_| invalid());
  }
  let unsigned = token.strip_prefix('-').unwrap_or(token);
  if is_decimal(unsigned) {
    return token.parse().map(Token::Integer).map_err(|_| invalid());
  }
  if is_identifier(token) {
    return Ok(Token::Name(token));
  }
  Err(invalid())
}

fn resolve(
  raw: &RawInstruction<'_>,
  labels: &HashMap<String, usize>,
  len: usize,
) -> Result<Instruction, LoadError> {
  let line = raw.line;
  let mismatch = |position: usize, expected: &'static str, token: &str| {
    LoadError::OperandKindMismatch {
      line,
      opcode: raw.opcode,
      position: position + 1,
      expected,
      token: token.to_owned(),
    }
  };

  let mut operands = Vec::with_capacity(raw.tokens.len());
  for (position, (slot, &token)) in raw.opcode.slots().iter().zip(&raw.tokens).enumerate() {
    let operand = match (slot, lex_operand(line, token)?) {
      (Slot::Destination, Token::Address(address)) => {
        if (address as usize) < RESERVED {
          tracing::warn!(line, address, opcode = %raw.opcode, "assignment to a reserved memory address");
        }
        Operand::Address(address)
      }
      (Slot::Destination, _) => return Err(mismatch(position, "an address", token)),
      (Slot::Value, Token::Address(address)) => Operand::Address(address),
      (Slot::Value, Token::Integer(value)) => Operand::Immediate(value),
      (Slot::Value, Token::Name(_)) => {
        return Err(mismatch(position, "an address or an immediate", token))
      }
      (Slot::Target, Token::Name(name)) => {
        let index = labels
          .get(name)
          .copied()
          .ok_or_else(|| LoadError::UnresolvedLabel {
            line,
            name: name.to_owned(),
          })?;
        Operand::Target(index)
      }
      (Slot::Target, Token::Integer(target)) => {
        // `len` itself is allowed, jumping there ends the block
        let index = usize::try_from(target)
          .ok()
          .filter(|index| *index <= len)
          .ok_or(LoadError::InvalidJumpTarget { line, target, len })?;
        Operand::Target(index)
      }
      (Slot::Target, Token::Address(_)) => {
        return Err(mismatch(position, "a label or an instruction index", token))
      }
    };
    operands.push(operand);
  }
  Ok(Instruction::new(raw.opcode, operands, line))
}

fn is_decimal(s: &str) -> bool {
  !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

fn is_identifier(s: &str) -> bool {
  let mut bytes = s.bytes();
  matches!(bytes.next(), Some(b) if b.is_ascii_alphabetic() || b == b'_')
    && bytes.all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

#[cfg(test)]
mod tests {
  use super::*;

  fn assemble(source: &str) -> Result<Program, LoadError> {
    load(source, 0)
  }

  mod structure {
    use super::*;

    #[test]
    fn minimal() {
      let program = assemble("tick:\n  point 0 0\n").unwrap();
      assert_eq!(program.len(), 1);
      assert_eq!(program.tick(), 0);
      assert_eq!(program.start(), None);
      assert_eq!(program.instructions()[0].opcode(), Opcode::Point);
      assert_eq!(program.instructions()[0].line(), 2);
    }

    #[test]
    fn start_and_tick() {
      let program = assemble("start:\nmov $13 1\nmov $14 2\ntick:\nadd $13 $13 1\n").unwrap();
      assert_eq!(program.start(), Some(0));
      assert_eq!(program.tick(), 2);
      assert_eq!(program.label("start"), Some(0));
      assert_eq!(program.label("tick"), Some(2));
    }

    #[test]
    fn blank_lines_and_indentation() {
      let program = assemble("\n\n   tick:\n\n\t  point 1 2   \n\n").unwrap();
      assert_eq!(program.len(), 1);
      assert_eq!(program.instructions()[0].line(), 5);
    }

    #[test]
    fn label_sharing_a_line() {
      let program = assemble("tick: loop: add $13 $13 1\njmp loop 0\n").unwrap();
      assert_eq!(program.label("tick"), Some(0));
      assert_eq!(program.label("loop"), Some(0));
      assert_eq!(program.len(), 2);
    }

    #[test]
    fn label_at_end_points_past_last_instruction() {
      let program = assemble("tick:\njmp done 1\npoint 0 0\ndone:\n").unwrap();
      assert_eq!(program.label("done"), Some(2));
      assert_eq!(program.instructions()[0].operands()[0], Operand::Target(2));
    }

    #[test]
    fn missing_tick() {
      assert_eq!(
        assemble("start:\nmov $13 1\n").unwrap_err(),
        LoadError::MissingTickLabel
      );
      assert_eq!(assemble("").unwrap_err(), LoadError::MissingTickLabel);
    }

    #[test]
    fn duplicate_label() {
      assert_eq!(
        assemble("tick:\npoint 0 0\ntick:\n").unwrap_err(),
        LoadError::DuplicateLabel {
          line: 3,
          name: "tick".to_owned(),
          first: 1,
        }
      );
    }

    #[test]
    fn invalid_label() {
      assert!(matches!(
        assemble("1abc:\ntick:\n").unwrap_err(),
        LoadError::InvalidLabel { line: 1, .. }
      ));
      assert!(matches!(
        assemble(":\ntick:\n").unwrap_err(),
        LoadError::InvalidLabel { line: 1, .. }
      ));
    }

    #[test]
    fn start_after_tick_is_ambiguous() {
      assert_eq!(
        assemble("tick:\npoint 0 0\nstart:\nmov $13 1\n").unwrap_err(),
        LoadError::AmbiguousStartFallthrough {
          line: 3,
          start: 1,
          tick: 0,
        }
      );
    }

    #[test]
    fn start_sharing_tick_index_is_ambiguous() {
      assert!(matches!(
        assemble("start:\ntick:\npoint 0 0\n").unwrap_err(),
        LoadError::AmbiguousStartFallthrough { start: 0, tick: 0, .. }
      ));
    }
  }

  mod operands {
    use super::*;

    fn operands(source: &str) -> Vec<Operand> {
      assemble(source).unwrap().instructions()[0].operands().to_vec()
    }

    #[test]
    fn addresses_and_immediates() {
      assert_eq!(
        operands("tick:\nadd $13 $14 -7\n"),
        vec![
          Operand::Address(13),
          Operand::Address(14),
          Operand::Immediate(-7)
        ]
      );
      assert_eq!(
        assemble("tick:\nmov $13 +5\n").unwrap_err(),
        LoadError::InvalidOperand {
          line: 2,
          token: "+5".to_owned(),
        }
      );
    }

    #[test]
    fn immediate_range() {
      assert_eq!(
        operands("tick:\nmov $13 -2147483648\n")[1],
        Operand::Immediate(i32::MIN)
      );
      assert_eq!(
        assemble("tick:\nmov $13 2147483648\n").unwrap_err(),
        LoadError::InvalidOperand {
          line: 2,
          token: "2147483648".to_owned(),
        }
      );
    }

    #[test]
    fn malformed_tokens() {
      for token in ["$", "$-1", "$x", "-", "1x", "$1$", "a-b"] {
        let source = format!("tick:\nmov $13 {token}\n");
        assert_eq!(
          assemble(&source).unwrap_err(),
          LoadError::InvalidOperand {
            line: 2,
            token: token.to_owned(),
          },
          "{token}"
        );
      }
    }

    #[test]
    fn destination_must_be_address() {
      assert_eq!(
        assemble("tick:\nmov 13 1\n").unwrap_err(),
        LoadError::OperandKindMismatch {
          line: 2,
          opcode: Opcode::Mov,
          position: 1,
          expected: "an address",
          token: "13".to_owned(),
        }
      );
    }

    #[test]
    fn names_are_not_values() {
      assert!(matches!(
        assemble("tick:\npoint tick 0\n").unwrap_err(),
        LoadError::OperandKindMismatch {
          opcode: Opcode::Point,
          position: 1,
          ..
        }
      ));
    }

    #[test]
    fn jump_target_cannot_be_address() {
      assert!(matches!(
        assemble("tick:\njmp $0 1\n").unwrap_err(),
        LoadError::OperandKindMismatch {
          opcode: Opcode::Jmp,
          position: 1,
          ..
        }
      ));
    }

    #[test]
    fn jump_condition_can_be_address() {
      assert_eq!(
        operands("tick:\njmp tick $2\n"),
        vec![Operand::Target(0), Operand::Address(2)]
      );
    }

    #[test]
    fn numeric_jump_targets() {
      assert_eq!(operands("tick:\njmp 1 1\npoint 0 0\n")[0], Operand::Target(1));
      assert_eq!(operands("tick:\njmp 2 1\npoint 0 0\n")[0], Operand::Target(2));
      assert_eq!(
        assemble("tick:\njmp 3 1\npoint 0 0\n").unwrap_err(),
        LoadError::InvalidJumpTarget {
          line: 2,
          target: 3,
          len: 2,
        }
      );
      assert!(matches!(
        assemble("tick:\njmp -1 1\n").unwrap_err(),
        LoadError::InvalidJumpTarget { target: -1, .. }
      ));
    }

    #[test]
    fn forward_and_backward_labels_agree() {
      let program = assemble(
        "tick:\njmp ahead 0\nback:\npoint 0 0\nahead:\npoint 1 1\njmp back 0\njmp ahead 0\n",
      )
      .unwrap();
      let target = |index: usize| program.instructions()[index].operands()[0];
      assert_eq!(target(0), Operand::Target(2));
      assert_eq!(target(3), Operand::Target(1));
      assert_eq!(target(4), Operand::Target(2));
    }

    #[test]
    fn undefined_label() {
      assert_eq!(
        assemble("tick:\njmp nowhere 1\n").unwrap_err(),
        LoadError::UnresolvedLabel {
          line: 2,
          name: "nowhere".to_owned(),
        }
      );
    }
  }

  mod opcodes {
    use super::*;

    #[test]
    fn unknown() {
      assert_eq!(
        assemble("tick:\nhalt\n").unwrap_err(),
        LoadError::UnknownOpcode {
          line: 2,
          name: "halt".to_owned(),
        }
      );
    }

    #[test]
    fn arity() {
      assert_eq!(
        assemble("tick:\nadd $13 1\n").unwrap_err(),
        LoadError::ArityMismatch {
          line: 2,
          opcode: Opcode::Add,
          expected: 3,
          found: 2,
        }
      );
      assert!(matches!(
        assemble("tick:\npoint 1 2 3\n").unwrap_err(),
        LoadError::ArityMismatch { found: 3, .. }
      ));
    }
  }

  mod comments {
    use super::*;

    #[test]
    fn inline_and_multiline() {
      let program = assemble(
        "(a small program)\ntick: (runs\nevery frame)\n  point 1 (x) 2 (y)\n",
      )
      .unwrap();
      assert_eq!(program.len(), 1);
      assert_eq!(
        program.instructions()[0].operands(),
        &[Operand::Immediate(1), Operand::Immediate(2)]
      );
      assert_eq!(program.instructions()[0].line(), 4);
    }

    #[test]
    fn unterminated() {
      assert_eq!(
        assemble("tick:\npoint 0 0\n(oops\n\n").unwrap_err(),
        LoadError::UnterminatedComment { line: 3 }
      );
    }
  }

  mod directives {
    use super::*;

    #[test]
    fn defaults() {
      let program = assemble("tick:\n").unwrap();
      assert_eq!(*program.meta(), Meta::default());
      assert_eq!(program.memory_size(), 32);
    }

    #[test]
    fn header() {
      let program =
        assemble("#memory 256\n#width 64\n#height 48\n#tickrate 30\ntick:\n").unwrap();
      assert_eq!(
        *program.meta(),
        Meta {
          memory: Some(256),
          width: 64,
          height: 48,
          tickrate: 30,
        }
      );
      assert_eq!(program.memory_size(), 256);
    }

    #[test]
    fn memory_size_resolution() {
      assert_eq!(load("tick:\n", 100).unwrap().memory_size(), 100);
      assert_eq!(load("tick:\n", 8).unwrap().memory_size(), 32);
      assert_eq!(load("#memory 40\ntick:\n", 100).unwrap().memory_size(), 40);
      assert_eq!(load("#memory 4\ntick:\n", 100).unwrap().memory_size(), 32);
    }

    #[test]
    fn after_label() {
      assert_eq!(
        assemble("tick:\n#width 10\n").unwrap_err(),
        LoadError::DirectiveOutsideHeader { line: 2 }
      );
    }

    #[test]
    fn unknown() {
      assert_eq!(
        assemble("#colors 3\ntick:\n").unwrap_err(),
        LoadError::UnknownDirective {
          line: 1,
          name: "colors".to_owned(),
        }
      );
    }

    #[test]
    fn bad_values() {
      for source in ["#width -1\ntick:\n", "#width\ntick:\n", "#width ten\ntick:\n"] {
        assert!(
          matches!(
            assemble(source).unwrap_err(),
            LoadError::InvalidDirectiveValue { line: 1, .. }
          ),
          "{source}"
        );
      }
      assert_eq!(
        assemble("#width 10 20\ntick:\n").unwrap_err(),
        LoadError::StrayToken {
          line: 1,
          token: "20".to_owned(),
        }
      );
    }
  }
}
