//! Drawing output of a tick.

use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct Color {
  pub r: u8,
  pub g: u8,
  pub b: u8,
}

impl Color {
  pub const BLACK: Color = Color::new(0, 0, 0);

  pub const fn new(r: u8, g: u8, b: u8) -> Self {
    Self { r, g, b }
  }

  /// Build a color from slot values, clamping each component into `0..=255`.
  pub fn clamped(r: i32, g: i32, b: i32) -> Self {
    let clamp = |c: i32| c.clamp(0, u8::MAX as i32) as u8;
    Self::new(clamp(r), clamp(g), clamp(b))
  }
}

/// One recorded drawing operation, for the host renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DrawCommand {
  SetColor(Color),
  Point { x: i32, y: i32 },
  Line { x1: i32, y1: i32, x2: i32, y2: i32 },
  Rect { x: i32, y: i32, w: i32, h: i32 },
}

impl fmt::Display for DrawCommand {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::SetColor(Color { r, g, b }) => write!(f, "color {r} {g} {b}"),
      Self::Point { x, y } => write!(f, "point {x} {y}"),
      Self::Line { x1, y1, x2, y2 } => write!(f, "line {x1} {y1} {x2} {y2}"),
      Self::Rect { x, y, w, h } => write!(f, "rect {x} {y} {w} {h}"),
    }
  }
}

/// Collects draw commands in emission order until the host drains them.
#[derive(Debug, Clone, Default)]
pub struct DrawSink {
  commands: Vec<DrawCommand>,
  color: Color,
}

impl DrawSink {
  pub fn new() -> Self {
    Self::default()
  }

  /// The color shapes are currently drawn with. Black until the first
  /// [`DrawSink::color`] call.
  pub fn current_color(&self) -> Color {
    self.color
  }

  pub fn color(&mut self, color: Color) {
    self.color = color;
    self.commands.push(DrawCommand::SetColor(color));
  }

  pub fn point(&mut self, x: i32, y: i32) {
    self.commands.push(DrawCommand::Point { x, y });
  }

  pub fn line(&mut self, x1: i32, y1: i32, x2: i32, y2: i32) {
    self.commands.push(DrawCommand::Line { x1, y1, x2, y2 });
  }

  pub fn rect(&mut self, x: i32, y: i32, w: i32, h: i32) {
    self.commands.push(DrawCommand::Rect { x, y, w, h });
  }

  pub fn commands(&self) -> &[DrawCommand] {
    &self.commands
  }

  /// Hand over everything recorded so far, leaving the sink empty. The
  /// current color carries over.
  pub fn drain(&mut self) -> Vec<DrawCommand> {
    std::mem::take(&mut self.commands)
  }

  pub fn clear(&mut self) {
    self.commands.clear();
  }
}
