//! Ambient connection counting used to estimate connection reuse.

use std::path::{Path, PathBuf};
use std::{fs, io};

use anyhow::Context;

/// Source of the "active connections to a remote port" counter.
///
/// The counter is owned by the operating environment, so implementations only
/// read it. The sampler treats failures as diagnostic and degrades to a delta
/// of zero.
pub trait ConnectionCounter: Send + Sync {
    /// Returns the number of open TCP connections whose remote port is `remote_port`.
    fn active_connections(&self, remote_port: u16) -> anyhow::Result<usize>;
}

const TCP_LISTEN: u8 = 0x0A;
const TCP_CLOSE: u8 = 0x07;

/// Reads the kernel socket tables exposed under `/proc/net`.
#[derive(Debug, Clone)]
pub struct ProcNetTcp {
    root: PathBuf,
}

impl Default for ProcNetTcp {
    fn default() -> Self {
        Self::new("/proc/net")
    }
}

impl ProcNetTcp {
    /// Creates a counter reading `tcp` and `tcp6` from `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn read_table(path: &Path) -> io::Result<String> {
        fs::read_to_string(path)
    }
}

impl ConnectionCounter for ProcNetTcp {
    fn active_connections(&self, remote_port: u16) -> anyhow::Result<usize> {
        let v4_path = self.root.join("tcp");
        let v4 = Self::read_table(&v4_path)
            .with_context(|| format!("Reading socket table {}", v4_path.display()))?;
        let mut count = count_connections(&v4, remote_port);

        // `tcp6` is absent when IPv6 is disabled in the kernel.
        let v6_path = self.root.join("tcp6");
        match Self::read_table(&v6_path) {
            Ok(v6) => count += count_connections(&v6, remote_port),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("Reading socket table {}", v6_path.display()))
            }
        }

        Ok(count)
    }
}

/// Counts the rows of a `/proc/net/tcp{,6}` table connected to `remote_port`.
///
/// Listening and fully closed sockets are skipped, every other state
/// (including `TIME_WAIT`) counts as active. Malformed rows are ignored.
pub fn count_connections(table: &str, remote_port: u16) -> usize {
    table
        .lines()
        .skip(1)
        .filter_map(parse_row)
        .filter(|&(port, state)| {
            port == remote_port && state != TCP_LISTEN && state != TCP_CLOSE
        })
        .count()
}

fn parse_row(row: &str) -> Option<(u16, u8)> {
    let mut fields = row.split_whitespace();
    let _slot = fields.next()?;
    let _local = fields.next()?;
    let remote = fields.next()?;
    let state = fields.next()?;

    let (_, port) = remote.rsplit_once(':')?;
    let port = u16::from_str_radix(port, 16).ok()?;
    let state = u8::from_str_radix(state, 16).ok()?;
    Some((port, state))
}
