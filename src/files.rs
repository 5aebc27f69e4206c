//! Opaque host handle side-table for file words, stripped of a
//! terminal/TUI variant and reworked to return `Result` instead of
//! panicking or printing on I/O failure.
//!
//! Forth needs a plain cell as a file reference; this table is what a
//! small integer handle actually indexes into.

use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::opcode::FileAccessMode;

#[derive(Debug)]
pub enum FileSlot {
    ReadOnly(BufReader<File>),
    WriteOnly(File),
    ReadWrite(File),
    /// The process's standard streams, reserved at indices 0..3 so that
    /// `FIN`/`FOUT` can default to them the same way any other file-id
    /// would be dereferenced.
    Stdin,
    Stdout,
    Stderr,
}

#[derive(Debug)]
pub struct FileEntry {
    pub slot: FileSlot,
    pub position: u64,
}

/// Table of open files, indexed by the cell the Forth image stores as a
/// file-id. Closing a file removes its entry; later file-ids are not
/// reused within a run, matching `open-file`'s "push a new handle" model.
///
/// Indices 0, 1, and 2 are reserved for stdin, stdout, and stderr at
/// construction, mirroring `STDIN`/`STDOUT`/`STDERR` register defaults.
#[derive(Debug)]
pub struct FileTable {
    entries: Vec<Option<FileEntry>>,
}

pub const STDIN_ID: i64 = 0;
pub const STDOUT_ID: i64 = 1;
pub const STDERR_ID: i64 = 2;

impl Default for FileTable {
    fn default() -> FileTable {
        FileTable::new()
    }
}

impl FileTable {
    pub fn new() -> FileTable {
        let mut entries = Vec::new();
        entries.push(Some(FileEntry {
            slot: FileSlot::Stdin,
            position: 0,
        }));
        entries.push(Some(FileEntry {
            slot: FileSlot::Stdout,
            position: 0,
        }));
        entries.push(Some(FileEntry {
            slot: FileSlot::Stderr,
            position: 0,
        }));
        FileTable { entries }
    }

    pub fn open(&mut self, path: &Path, mode: FileAccessMode) -> io::Result<i64> {
        let slot = match mode {
            FileAccessMode::ReadOnly => {
                let f = File::open(path)?;
                FileSlot::ReadOnly(BufReader::new(f))
            }
            FileAccessMode::WriteOnly => {
                let f = OpenOptions::new()
                    .write(true)
                    .create(true)
                    .truncate(true)
                    .open(path)?;
                FileSlot::WriteOnly(f)
            }
            FileAccessMode::ReadWrite => {
                let f = OpenOptions::new().read(true).write(true).create(true).open(path)?;
                FileSlot::ReadWrite(f)
            }
        };
        let entry = FileEntry { slot, position: 0 };
        self.entries.push(Some(entry));
        Ok(self.entries.len() as i64 - 1)
    }

    pub fn close(&mut self, id: i64) -> io::Result<()> {
        let idx = self.index(id)?;
        self.entries[idx] = None;
        Ok(())
    }

    pub fn read_line(&mut self, id: i64, max: usize) -> io::Result<Option<String>> {
        let entry = self.entry_mut(id)?;
        let mut buf = String::new();
        let n = match &mut entry.slot {
            FileSlot::ReadOnly(r) => r.read_line(&mut buf)?,
            FileSlot::ReadWrite(f) => {
                let mut r = std::io::BufReader::new(&mut *f);
                r.read_line(&mut buf)?
            }
            FileSlot::Stdin => io::stdin().lock().read_line(&mut buf)?,
            FileSlot::WriteOnly(_) | FileSlot::Stdout | FileSlot::Stderr => {
                return Err(io::Error::new(
                    io::ErrorKind::PermissionDenied,
                    "file is write-only",
                ))
            }
        };
        if n == 0 {
            return Ok(None);
        }
        entry.position += n as u64;
        if buf.len() > max {
            buf.truncate(max);
        }
        Ok(Some(buf))
    }

    pub fn write_all(&mut self, id: i64, bytes: &[u8]) -> io::Result<()> {
        let entry = self.entry_mut(id)?;
        match &mut entry.slot {
            FileSlot::WriteOnly(f) => f.write_all(bytes)?,
            FileSlot::ReadWrite(f) => f.write_all(bytes)?,
            FileSlot::Stdout => io::stdout().write_all(bytes)?,
            FileSlot::Stderr => io::stderr().write_all(bytes)?,
            FileSlot::ReadOnly(_) | FileSlot::Stdin => {
                return Err(io::Error::new(
                    io::ErrorKind::PermissionDenied,
                    "file is read-only",
                ))
            }
        }
        entry.position += bytes.len() as u64;
        Ok(())
    }

    pub fn read_bytes(&mut self, id: i64, buf: &mut [u8]) -> io::Result<usize> {
        let entry = self.entry_mut(id)?;
        let n = match &mut entry.slot {
            FileSlot::ReadOnly(r) => r.read(buf)?,
            FileSlot::ReadWrite(f) => f.read(buf)?,
            FileSlot::Stdin => io::stdin().lock().read(buf)?,
            FileSlot::WriteOnly(_) | FileSlot::Stdout | FileSlot::Stderr => {
                return Err(io::Error::new(
                    io::ErrorKind::PermissionDenied,
                    "file is write-only",
                ))
            }
        };
        entry.position += n as u64;
        Ok(n)
    }

    pub fn position(&self, id: i64) -> io::Result<u64> {
        Ok(self.entry(id)?.position)
    }

    pub fn seek(&mut self, id: i64, pos: u64) -> io::Result<()> {
        let entry = self.entry_mut(id)?;
        match &mut entry.slot {
            FileSlot::ReadOnly(r) => {
                r.seek(SeekFrom::Start(pos))?;
            }
            FileSlot::WriteOnly(f) | FileSlot::ReadWrite(f) => {
                f.seek(SeekFrom::Start(pos))?;
            }
            FileSlot::Stdin | FileSlot::Stdout | FileSlot::Stderr => {
                return Err(io::Error::new(
                    io::ErrorKind::Unsupported,
                    "cannot seek a standard stream",
                ))
            }
        }
        entry.position = pos;
        Ok(())
    }

    pub fn flush(&mut self, id: i64) -> io::Result<()> {
        let entry = self.entry_mut(id)?;
        match &mut entry.slot {
            FileSlot::WriteOnly(f) | FileSlot::ReadWrite(f) => f.flush(),
            FileSlot::Stdout => io::stdout().flush(),
            FileSlot::Stderr => io::stderr().flush(),
            FileSlot::ReadOnly(_) | FileSlot::Stdin => Ok(()),
        }
    }

    pub fn delete(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_file(path)
    }

    pub fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        std::fs::rename(from, to)
    }

    fn index(&self, id: i64) -> io::Result<usize> {
        if id < 0 || id as usize >= self.entries.len() || self.entries[id as usize].is_none() {
            return Err(io::Error::new(io::ErrorKind::NotFound, "no such file-id"));
        }
        Ok(id as usize)
    }

    fn entry(&self, id: i64) -> io::Result<&FileEntry> {
        let idx = self.index(id)?;
        Ok(self.entries[idx].as_ref().unwrap())
    }

    fn entry_mut(&mut self, id: i64) -> io::Result<&mut FileEntry> {
        let idx = self.index(id)?;
        Ok(self.entries[idx].as_mut().unwrap())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn open_write_read_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.fs");
        {
            let mut f = File::create(&path).unwrap();
            writeln!(f, "hello world").unwrap();
        }
        let mut table = FileTable::new();
        let id = table.open(&path, FileAccessMode::ReadOnly).unwrap();
        let line = table.read_line(id, 1024).unwrap().unwrap();
        assert_eq!(line.trim_end(), "hello world");
        table.close(id).unwrap();
    }

    #[test]
    fn unknown_handle_errors() {
        let table = FileTable::new();
        assert!(table.position(999).is_err());
    }
}
