//! Persisted enabled-dissector configuration.
//!
//! Line-oriented file: one dissector name per line, `#` comments and
//! blank lines ignored. The whole file is read into memory at startup
//! and written back whole, atomically (write-to-temp-then-rename), on
//! save. The pipeline core never sees this file; it only receives the
//! resolved enabled set.

use std::collections::HashSet;
use std::io::Write;
use std::path::Path;

use tracing::warn;

/// The set of dissectors enabled for a run.
#[derive(Debug, Clone, Default)]
pub struct EnabledDissectors {
    /// `None` means everything is enabled (no list was given).
    names: Option<HashSet<String>>,
}

impl EnabledDissectors {
    /// Everything enabled.
    pub fn all() -> Self {
        Self { names: None }
    }

    /// An explicit enabled set.
    pub fn from_names<I>(names: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        Self {
            names: Some(names.into_iter().collect()),
        }
    }

    /// Read a list file.
    pub fn load(path: &Path) -> std::io::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let names = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_string)
            .collect();
        Ok(Self { names: Some(names) })
    }

    /// Write the list back atomically. A `None` (everything-enabled) set
    /// has nothing to persist.
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let Some(names) = &self.names else {
            return Ok(());
        };

        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;

        writeln!(tmp, "# dissectors enabled for pcapflow runs")?;
        let mut sorted: Vec<&String> = names.iter().collect();
        sorted.sort();
        for name in sorted {
            writeln!(tmp, "{name}")?;
        }

        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }

    /// Whether a dissector is enabled.
    pub fn is_enabled(&self, name: &str) -> bool {
        match &self.names {
            None => true,
            Some(set) => set.contains(name),
        }
    }

    /// Log names that no registered dissector matches.
    pub fn warn_unknown<F: Fn(&str) -> bool>(&self, knows: F) {
        if let Some(set) = &self.names {
            for name in set {
                if !knows(name) {
                    warn!(dissector = %name, "enabled-dissector list names an unknown dissector");
                }
            }
        }
    }
}
