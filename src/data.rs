//! Memory preloads described by `g1d` data files.
//!
//! Each line is `ADDRESS KIND DATA`:
//!
//! | Kind | Data                | Slots                               |
//! |------|---------------------|-------------------------------------|
//! | `b`  | hex bytes `00ff10`  | one per byte                        |
//! | `s`  | text                | length, then one per character code |
//! | `F`  | file path           | one per byte, unchecked size        |
//! | `f`  | file path           | one per byte                        |
//!
//! Files are read through a caller-supplied closure, so this module never
//! touches the filesystem itself.

use std::io;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataEntry {
  pub address: usize,
  pub values: Vec<i32>,
}

impl DataEntry {
  /// One past the last slot this entry writes, `usize::MAX` if that does
  /// not fit in an address.
  pub fn end(&self) -> usize {
    self.address.saturating_add(self.values.len())
  }
}

#[derive(thiserror::Error, Debug)]
pub enum DataError {
  #[error("line {line}: expected `ADDRESS KIND DATA`")]
  Malformed { line: usize },

  #[error("line {line}: unknown data kind `{kind}`")]
  UnknownKind { line: usize, kind: String },

  #[error("line {line}: expected pairs of hex digits")]
  InvalidHex { line: usize },

  #[error("line {line}: entry spans {address}..{end} but memory has {memory} slots")]
  ExceedsMemory {
    line: usize,
    address: usize,
    end: usize,
    memory: usize,
  },

  #[error("line {line}: image data is not supported (`{path}`)")]
  UnsupportedImage { line: usize, path: String },

  #[error("line {line}: could not read `{path}`")]
  Io {
    line: usize,
    path: String,
    #[source]
    source: io::Error,
  },
}

const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "bmp"];

/// Parse a data file for a program with `memory_size` slots.
pub fn parse<F>(text: &str, memory_size: usize, mut read_file: F) -> Result<Vec<DataEntry>, DataError>
where
  F: FnMut(&Path) -> io::Result<Vec<u8>>,
{
  let mut entries = Vec::new();
  for (number, raw) in text.lines().enumerate() {
    let line = number + 1;
    if raw.trim().is_empty() {
      continue;
    }
    let mut parts = raw.splitn(3, ' ');
    let (Some(address), Some(kind), Some(data)) = (parts.next(), parts.next(), parts.next()) else {
      return Err(DataError::Malformed { line });
    };
    let address: usize = address.parse().map_err(|_| DataError::Malformed { line })?;
    if data.is_empty() {
      return Err(DataError::Malformed { line });
    }

    let mut read = |path: &str| {
      read_file(Path::new(path)).map_err(|source| DataError::Io {
        line,
        path: path.to_owned(),
        source,
      })
    };
    let (values, checked) = match kind {
      "b" => (hex(line, data)?, true),
      "s" => {
        let mut values = vec![data.chars().count() as i32];
        values.extend(data.chars().map(|c| c as i32));
        (values, true)
      }
      "F" => (bytes(read(data)?), false),
      "f" => {
        let is_image = Path::new(data)
          .extension()
          .and_then(|ext| ext.to_str())
          .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()));
        if is_image {
          return Err(DataError::UnsupportedImage {
            line,
            path: data.to_owned(),
          });
        }
        (bytes(read(data)?), true)
      }
      _ => {
        return Err(DataError::UnknownKind {
          line,
          kind: kind.to_owned(),
        })
      }
    };

    let entry = DataEntry { address, values };
    if checked && entry.end() > memory_size {
      return Err(DataError::ExceedsMemory {
        line,
        address,
        end: entry.end(),
        memory: memory_size,
      });
    }
    entries.push(entry);
  }
  warn_overlaps(&entries);
  Ok(entries)
}

fn hex(line: usize, data: &str) -> Result<Vec<i32>, DataError> {
  if data.len() % 2 != 0 || !data.bytes().all(|b| b.is_ascii_hexdigit()) {
    return Err(DataError::InvalidHex { line });
  }
  (0..data.len())
    .step_by(2)
    .map(|i| {
      u8::from_str_radix(&data[i..i + 2], 16)
        .map(i32::from)
        .map_err(|_| DataError::InvalidHex { line })
    })
    .collect()
}

fn bytes(raw: Vec<u8>) -> Vec<i32> {
  raw.into_iter().map(i32::from).collect()
}

fn warn_overlaps(entries: &[DataEntry]) {
  let mut spans: Vec<_> = entries
    .iter()
    .filter(|entry| !entry.values.is_empty())
    .map(|entry| (entry.address, entry.end()))
    .collect();
  spans.sort_unstable();
  for (i, a) in spans.iter().enumerate() {
    for b in &spans[i + 1..] {
      if a.1 > b.0 {
        tracing::warn!(first = ?(a.0..a.1), second = ?(b.0..b.1), "data entries overlap");
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn no_files(path: &Path) -> io::Result<Vec<u8>> {
    Err(io::Error::new(
      io::ErrorKind::NotFound,
      path.display().to_string(),
    ))
  }

  #[test]
  fn bytes_and_strings() {
    let entries = parse("13 b 00ff10\n\n20 s hi there\n", 64, no_files).unwrap();
    assert_eq!(
      entries,
      vec![
        DataEntry {
          address: 13,
          values: vec![0x00, 0xff, 0x10],
        },
        DataEntry {
          address: 20,
          values: vec![8, 104, 105, 32, 116, 104, 101, 114, 101],
        },
      ]
    );
  }

  #[test]
  fn files() {
    let read = |path: &Path| -> io::Result<Vec<u8>> {
      assert_eq!(path, Path::new("sprite.bin"));
      Ok(vec![1, 2, 3])
    };
    let entries = parse("40 f sprite.bin\n", 64, read).unwrap();
    assert_eq!(entries[0].values, vec![1, 2, 3]);
  }

  #[test]
  fn unchecked_files_may_exceed_memory() {
    let entries = parse("31 F big.bin\n", 32, |_: &Path| Ok(vec![0; 4])).unwrap();
    assert_eq!(entries[0].end(), 35);
    assert!(matches!(
      parse("31 f big.bin\n", 32, |_: &Path| Ok(vec![0; 4])),
      Err(DataError::ExceedsMemory { line: 1, end: 35, .. })
    ));
  }

  #[test]
  fn images_are_rejected() {
    assert!(matches!(
      parse("13 f logo.PNG\n", 64, no_files),
      Err(DataError::UnsupportedImage { line: 1, .. })
    ));
  }

  #[test]
  fn missing_file() {
    assert!(matches!(
      parse("13 F missing.bin\n", 64, no_files),
      Err(DataError::Io { line: 1, .. })
    ));
  }

  #[test]
  fn too_large() {
    assert!(matches!(
      parse("30 b 010203\n", 32, no_files),
      Err(DataError::ExceedsMemory {
        line: 1,
        address: 30,
        end: 33,
        memory: 32,
      })
    ));
    assert!(matches!(
      parse(&format!("{} b 00\n", usize::MAX), 64, no_files),
      Err(DataError::ExceedsMemory {
        line: 1,
        end: usize::MAX,
        ..
      })
    ));
  }

  #[test]
  fn malformed() {
    for (text, line) in [("13 b\n", 1), ("x b 00\n", 1), ("13 b 00\n13\n", 2)] {
      assert!(
        matches!(parse(text, 64, no_files), Err(DataError::Malformed { line: l }) if l == line),
        "{text}"
      );
    }
    assert!(matches!(
      parse("13 q 00\n", 64, no_files),
      Err(DataError::UnknownKind { line: 1, .. })
    ));
    assert!(matches!(
      parse("13 b 0g\n", 64, no_files),
      Err(DataError::InvalidHex { line: 1 })
    ));
    assert!(matches!(
      parse("13 b 123\n", 64, no_files),
      Err(DataError::InvalidHex { line: 1 })
    ));
  }
}
