//! State the host writes into reserved memory before each tick.

use std::fmt;
use std::str::FromStr;

use crate::memory::BUTTON_COUNT;
use crate::program::Meta;

/// Buttons in the order they are mapped to memory, starting at address 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Button {
  Control1,
  Control2,
  A,
  B,
  Up,
  Down,
  Left,
  Right,
}

impl Button {
  pub const ALL: [Button; BUTTON_COUNT] = [
    Self::Control1,
    Self::Control2,
    Self::A,
    Self::B,
    Self::Up,
    Self::Down,
    Self::Left,
    Self::Right,
  ];

  /// The reserved address this button is mapped to.
  pub const fn address(self) -> usize {
    self as usize
  }

  pub const fn name(self) -> &'static str {
    match self {
      Self::Control1 => "control1",
      Self::Control2 => "control2",
      Self::A => "a",
      Self::B => "b",
      Self::Up => "up",
      Self::Down => "down",
      Self::Left => "left",
      Self::Right => "right",
    }
  }
}

impl fmt::Display for Button {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown button `{0}`")]
pub struct UnknownButton(pub String);

impl FromStr for Button {
  type Err = UnknownButton;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let lower = s.to_ascii_lowercase();
    Self::ALL
      .into_iter()
      .find(|button| button.name() == lower)
      .ok_or_else(|| UnknownButton(s.to_owned()))
  }
}

/// Which buttons are held down this frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Buttons {
  held: [bool; BUTTON_COUNT],
}

impl Buttons {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn press(&mut self, button: Button) {
    self.held[button.address()] = true;
  }

  pub fn release(&mut self, button: Button) {
    self.held[button.address()] = false;
  }

  pub fn is_held(&self, button: Button) -> bool {
    self.held[button.address()]
  }

  /// Slot values for addresses 0 through 7.
  pub fn slots(&self) -> [i32; BUTTON_COUNT] {
    self.held.map(i32::from)
  }
}

impl FromIterator<Button> for Buttons {
  fn from_iter<I: IntoIterator<Item = Button>>(iter: I) -> Self {
    let mut buttons = Self::new();
    for button in iter {
      buttons.press(button);
    }
    buttons
  }
}

/// Display parameters the program can read at addresses 9 through 11.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Display {
  pub width: u32,
  pub height: u32,
  pub tickrate: u32,
}

impl Display {
  /// Milliseconds between ticks at this tick rate.
  pub fn frame_ms(&self) -> i32 {
    match self.tickrate {
      0 => 0,
      rate => (1000 / rate) as i32,
    }
  }
}

impl From<&Meta> for Display {
  fn from(meta: &Meta) -> Self {
    Self {
      width: meta.width,
      height: meta.height,
      tickrate: meta.tickrate,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn button_addresses() {
    assert_eq!(Button::Control1.address(), 0);
    assert_eq!(Button::A.address(), 2);
    assert_eq!(Button::Right.address(), 7);
  }

  #[test]
  fn parse_buttons() {
    assert_eq!("up".parse::<Button>(), Ok(Button::Up));
    assert_eq!("Left".parse::<Button>(), Ok(Button::Left));
    assert_eq!(
      "start".parse::<Button>(),
      Err(UnknownButton("start".to_owned()))
    );
  }

  #[test]
  fn held_buttons_become_slots() {
    let buttons: Buttons = [Button::A, Button::Down].into_iter().collect();
    assert_eq!(buttons.slots(), [0, 0, 1, 0, 0, 1, 0, 0]);
    let mut buttons = buttons;
    buttons.release(Button::A);
    assert!(!buttons.is_held(Button::A));
    assert!(buttons.is_held(Button::Down));
  }

  #[test]
  fn frame_time() {
    let display = Display::from(&Meta::default());
    assert_eq!(display.frame_ms(), 16);
    let paused = Display {
      tickrate: 0,
      ..display
    };
    assert_eq!(paused.frame_ms(), 0);
  }
}
