//! Plain-text persistence for the service list and the message cursor.
//!
//! Both files are rewritten in full on every save (truncate, then write). This
//! is fine for a single process; a crash mid-write can leave a short file.

use std::{
    collections::HashSet,
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use tracing::{info, warn};

use crate::{
    domain::{MessageId, MonitoredService},
    errors::Error,
    Result,
};

/// Newline-delimited `HH:MM ORIGIN DEST` records, one per service.
///
/// A store without a path keeps nothing on disk.
#[derive(Clone, Debug, Default)]
pub struct ServiceStore {
    path: Option<PathBuf>,
}

impl ServiceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    pub fn in_memory() -> Self {
        Self { path: None }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Load every valid record. A missing or empty file is an empty list;
    /// malformed lines are logged and skipped.
    pub fn load(&self) -> Result<Vec<MonitoredService>> {
        let Some(path) = &self.path else {
            return Ok(Vec::new());
        };

        let contents = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::Io(e)),
        };

        info!(path = %path.display(), "loading services");

        let mut out = Vec::new();
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match MonitoredService::parse(line) {
                Ok(svc) => out.push(svc),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping bad service record"),
            }
        }
        Ok(out)
    }

    /// Rewrite the file with `services`, dropping exact duplicates (first
    /// occurrence wins, order preserved).
    pub fn save<'a>(&self, services: impl IntoIterator<Item = &'a MonitoredService>) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let mut seen = HashSet::new();
        let mut body = String::new();
        for svc in services {
            let record = svc.serialise();
            if seen.insert(record.clone()) {
                body.push_str(&record);
                body.push('\n');
            }
        }

        fs::write(path, body)?;
        Ok(())
    }
}

/// Single-value file holding the decimal id of the last processed message.
#[derive(Clone, Debug, Default)]
pub struct CursorStore {
    path: Option<PathBuf>,
}

impl CursorStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    pub fn in_memory() -> Self {
        Self { path: None }
    }

    /// Read the stored cursor. Anything other than a readable decimal id means
    /// "no cursor" and is logged, never fatal.
    pub fn load(&self) -> Option<MessageId> {
        let path = self.path.as_ref()?;
        match read_cursor(path) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "ignoring unreadable message cursor");
                None
            }
        }
    }

    pub fn save(&self, cursor: MessageId) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        fs::write(path, cursor.0.to_string())?;
        Ok(())
    }
}

fn read_cursor(path: &Path) -> Result<Option<MessageId>> {
    let txt = match fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(Error::Io(e)),
    };
    let txt = txt.trim();
    if txt.is_empty() {
        return Ok(None);
    }
    txt.parse::<i64>()
        .map(|id| Some(MessageId(id)))
        .map_err(|e| Error::Store {
            path: path.to_path_buf(),
            reason: format!("invalid cursor {txt:?}: {e}"),
        })
}
