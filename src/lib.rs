//! A tiny virtual machine for programs that draw 2D graphics and react to
//! button input.
//!
//! Programs are plain text, one instruction per line, assembled by
//! [`assembler::load`] into a [`program::Program`] and run by a [`vm::Vm`]:
//! `start` once, then `tick` once per frame. Each tick hands the host a list
//! of [`draw::DrawCommand`]s to paint.
//!
//! ```text
//! #width 64
//! #height 64
//!
//! start:
//!   mov $13 0        (x position)
//! tick:
//!   add $13 $13 $7   (move right while Right is held)
//!   color 255 255 255
//!   point $13 32
//! ```

pub mod assembler;
pub mod data;
pub mod draw;
pub mod host;
pub mod memory;
pub mod opcode;
pub mod program;
pub mod vm;
