//! Workload files and the simulator that replays them.
//!
//! One command per line:
//!
//! ```text
//! <file> <COMMAND> <len> <off> :<text>
//! ```
//!
//! `FORMAT`, `MOUNT`, `UNMOUNT` and `SEEK` expect a status equal to `len`
//! (0 for success, -1 for failure). `READ` must return exactly `len` bytes.
//! `WRITE` writes the first `len` bytes of `text`; `WRITEAT` seeks to `off`
//! first. A `*` in `text` stands for a newline.

use std::collections::BTreeMap;
use std::io::BufRead;
use std::str::FromStr;

use anyhow::{anyhow, bail, Context};
use crud_fs::{CrudFs, FileHandle, FsResult, Transport};
use tracing::{debug, info};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Op {
    Format,
    Mount,
    Unmount,
    Read,
    Write,
    WriteAt,
    Seek,
}

impl FromStr for Op {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "FORMAT" => Self::Format,
            "MOUNT" => Self::Mount,
            "UNMOUNT" => Self::Unmount,
            "READ" => Self::Read,
            "WRITE" => Self::Write,
            "WRITEAT" => Self::WriteAt,
            "SEEK" => Self::Seek,
            other => bail!("unknown command {other:?}"),
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkloadLine {
    pub line: usize,
    pub file: String,
    pub op: Op,
    pub len: i32,
    pub offset: i32,
    /// Bytes to write, already cut to `len` with `*` turned into newlines.
    /// Empty for commands that do not write.
    pub data: Vec<u8>,
}

/// Parse one line. `line` is 1-based and only used for messages.
pub fn parse_line(line: usize, text: &str) -> anyhow::Result<WorkloadLine> {
    let parse = || -> anyhow::Result<WorkloadLine> {
        let (fields, payload) = text
            .split_once(':')
            .ok_or_else(|| anyhow!("missing ':' before the text field"))?;
        let mut fields = fields.split_whitespace();
        let mut next = |name: &str| fields.next().ok_or_else(|| anyhow!("missing {name}"));

        let file = next("file name")?.to_string();
        let op: Op = next("command")?.parse()?;
        let len: i32 = next("length")?.parse().context("bad length")?;
        let offset: i32 = next("offset")?.parse().context("bad offset")?;

        let data = match op {
            Op::Write | Op::WriteAt => {
                let len = usize::try_from(len).map_err(|_| anyhow!("negative write length {len}"))?;
                let raw = payload.as_bytes();
                if raw.len() < len {
                    bail!("text has {} bytes, write needs {len}", raw.len());
                }
                raw[..len]
                    .iter()
                    .map(|&b| if b == b'*' { b'\n' } else { b })
                    .collect()
            }
            _ => Vec::new(),
        };
        if matches!(op, Op::WriteAt | Op::Seek) && offset < 0 {
            bail!("negative offset {offset}");
        }

        Ok(WorkloadLine {
            line,
            file,
            op,
            len,
            offset,
            data,
        })
    };
    parse().with_context(|| format!("unparsable workload line {line}: {text:?}"))
}

/// Status code a workload compares against: 0 on success, -1 on failure.
fn status<T>(result: &FsResult<T>) -> i32 {
    if result.is_ok() {
        0
    } else {
        -1
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SimReport {
    pub lines: usize,
    pub bytes_read: u64,
    pub bytes_written: u64,
}

/// Replays workload lines against a file system, opening each file on its
/// first use.
pub struct Simulator<T: Transport> {
    fs: CrudFs<T>,
    handles: BTreeMap<String, FileHandle>,
    report: SimReport,
}

impl<T: Transport> Simulator<T> {
    pub fn new(fs: CrudFs<T>) -> Self {
        Self {
            fs,
            handles: BTreeMap::new(),
            report: SimReport::default(),
        }
    }

    pub fn fs(&self) -> &CrudFs<T> {
        &self.fs
    }

    pub fn fs_mut(&mut self) -> &mut CrudFs<T> {
        &mut self.fs
    }

    pub fn report(&self) -> SimReport {
        self.report
    }

    /// Run every line of `reader`, stopping at the first failure.
    pub fn run<R: BufRead>(&mut self, reader: R) -> anyhow::Result<SimReport> {
        for (index, text) in reader.lines().enumerate() {
            let text = text.context("failed to read workload")?;
            if text.trim().is_empty() {
                continue;
            }
            let line = parse_line(index + 1, &text)?;
            self.step(&line)
                .with_context(|| format!("workload line {} failed", line.line))?;
        }
        Ok(self.report)
    }

    pub fn step(&mut self, line: &WorkloadLine) -> anyhow::Result<()> {
        debug!(line = line.line, file = %line.file, op = ?line.op, len = line.len, offset = line.offset, "workload");
        match line.op {
            Op::Format => {
                let result = self.fs.format();
                // Every handle is gone with the old table.
                self.handles.clear();
                expect_status(status(&result), line)?;
                info!("formatted file system");
            }
            Op::Mount => {
                let result = self.fs.mount();
                self.handles.clear();
                expect_status(status(&result), line)?;
                info!("mounted file system");
            }
            Op::Unmount => {
                for (path, handle) in std::mem::take(&mut self.handles) {
                    debug!(%path, %handle, "closing file");
                    self.fs
                        .close(handle)
                        .with_context(|| format!("close of {path} failed"))?;
                }
                expect_status(status(&self.fs.unmount()), line)?;
                info!("unmounted file system");
            }
            Op::Seek => {
                let handle = self.handle(&line.file)?;
                let result = self.fs.seek(handle, line.offset as u32);
                expect_status(status(&result), line)?;
            }
            Op::Read => {
                let handle = self.handle(&line.file)?;
                let want = usize::try_from(line.len).unwrap_or(0);
                let mut buf = vec![0u8; want];
                let n = self.fs.read(handle, &mut buf)?;
                if i64::try_from(n).ok() != Some(i64::from(line.len)) {
                    bail!("READ of {} returned {n} bytes, expected {}", line.file, line.len);
                }
                self.report.bytes_read += n as u64;
            }
            Op::Write | Op::WriteAt => {
                let handle = self.handle(&line.file)?;
                if line.op == Op::WriteAt {
                    self.fs.seek(handle, line.offset as u32)?;
                }
                let n = self.fs.write(handle, &line.data)?;
                if n != line.data.len() {
                    bail!("write to {} wrote {n} of {} bytes", line.file, line.data.len());
                }
                self.report.bytes_written += n as u64;
            }
        }
        self.report.lines += 1;
        Ok(())
    }

    fn handle(&mut self, path: &str) -> anyhow::Result<FileHandle> {
        if let Some(&handle) = self.handles.get(path) {
            return Ok(handle);
        }
        let handle = self
            .fs
            .open(path)
            .with_context(|| format!("open of {path} failed"))?;
        debug!(%path, %handle, "opened file");
        self.handles.insert(path.to_string(), handle);
        Ok(handle)
    }
}

fn expect_status(got: i32, line: &WorkloadLine) -> anyhow::Result<()> {
    if got != line.len {
        bail!("{:?} returned {got}, expected {}", line.op, line.len);
    }
    Ok(())
}
