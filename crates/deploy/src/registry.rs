//! Address registry: the in-memory accumulator for a stage and the generated
//! `contractsAddress.ts` file it is flushed to.
//!
//! Each binding is one line:
//!
//! ```text
//! export const BNBAddress = '0x5FbDB2315678afecb367f032d93F642f64180aa3';
//! ```

use std::{
    ffi::OsString,
    fs::{File, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use alloy_core::primitives::Address;
use anyhow::Context;
use derive_more::Deref;
use fs2::FileExt;

use crate::error::DeployError;

/// Default location of the generated registry, relative to the working directory.
pub const DEFAULT_REGISTRY_PATH: &str = "./contractsAddress.ts";

const LINE_PREFIX: &str = "export const ";
const CONSTANT_SUFFIX: &str = "Address";

/// One artifact name bound to its deployed address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEntry {
    pub name: String,
    pub address: Address,
}

impl RegistryEntry {
    pub fn new(name: impl Into<String>, address: Address) -> Self {
        Self {
            name: name.into(),
            address,
        }
    }

    /// Name of the exported constant, e.g. `BNBAddress`.
    pub fn constant_name(&self) -> String {
        format!("{}{}", self.name, CONSTANT_SUFFIX)
    }

    pub fn to_line(&self) -> String {
        format!(
            "{}{} = '{}';",
            LINE_PREFIX,
            self.constant_name(),
            self.address
        )
    }

    fn parse_line(line: &str) -> anyhow::Result<Self> {
        let rest = line
            .strip_prefix(LINE_PREFIX)
            .context("Line does not start with `export const`")?;
        let (constant, value) = rest
            .split_once('=')
            .context("Line has no `=` binding")?;
        let name = constant
            .trim()
            .strip_suffix(CONSTANT_SUFFIX)
            .context("Constant name does not end with `Address`")?;
        if name.is_empty() {
            anyhow::bail!("Empty artifact name");
        }

        let literal = value
            .trim()
            .strip_suffix(';')
            .context("Binding is not terminated by `;`")?
            .trim();
        let address = literal
            .strip_prefix('\'')
            .and_then(|s| s.strip_suffix('\''))
            .context("Address is not a single-quoted literal")?;

        Ok(Self {
            name: name.to_string(),
            address: address
                .parse()
                .with_context(|| format!("Invalid address literal {}", address))?,
        })
    }
}

/// Ordered (name, address) pairs for one stage, in deployment order.
///
/// Accumulation is append-only; the read-only slice view is reachable through
/// `Deref`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deref)]
pub struct AddressRegistry {
    entries: Vec<RegistryEntry>,
}

impl AddressRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a binding. Names must be unique.
    pub fn record(&mut self, name: &str, address: Address) -> Result<(), DeployError> {
        if self.contains(name) {
            return Err(DeployError::InvalidPlan(format!(
                "{} is already registered",
                name
            )));
        }
        self.entries.push(RegistryEntry::new(name, address));
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.name == name)
    }

    /// Render all bindings, one newline-terminated line each.
    pub fn render(&self) -> String {
        self.entries
            .iter()
            .map(|entry| entry.to_line() + "\n")
            .collect()
    }
}

/// Parse registry file content back into its ordered bindings.
///
/// Blank lines are ignored; any other line must be a binding.
pub fn parse_registry(content: &str) -> anyhow::Result<Vec<RegistryEntry>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            RegistryEntry::parse_line(line.trim())
                .with_context(|| format!("Invalid registry line {}: {}", i + 1, line))
        })
        .collect()
}

/// How a stage flush treats existing file content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum WriteMode {
    /// Replace the file (or create it).
    Overwrite,
    /// Keep existing bindings and add the stage's after them.
    Append,
}

/// The generated registry file.
#[derive(Debug, Clone)]
pub struct RegistryFile {
    path: PathBuf,
}

impl RegistryFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush a stage's bindings.
    ///
    /// The new content is staged in a sibling temp file and renamed into place,
    /// so the target holds either the old or the new content, never a prefix.
    pub fn write(&self, registry: &AddressRegistry, mode: WriteMode) -> Result<(), DeployError> {
        let io = |e| DeployError::registry_io(&self.path, e);

        let _lock = RegistryLock::acquire(&self.path).map_err(io)?;

        let mut content = match mode {
            WriteMode::Overwrite => String::new(),
            WriteMode::Append => match std::fs::read_to_string(&self.path) {
                Ok(existing) => existing,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
                Err(e) => return Err(io(e)),
            },
        };
        if !content.is_empty() && !content.ends_with('\n') {
            content.push('\n');
        }
        content.push_str(&registry.render());

        let staged = StagedFile::create(&self.path).map_err(io)?;
        staged.commit(content.as_bytes()).map_err(io)?;

        tracing::info!(
            path = %self.path.display(),
            entries = registry.len(),
            mode = %mode,
            "Contract addresses saved"
        );
        Ok(())
    }

    /// Read back every binding in the file.
    pub fn read(&self) -> anyhow::Result<Vec<RegistryEntry>> {
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read registry {}", self.path.display()))?;
        parse_registry(&content)
    }
}

fn sibling(path: &Path, prefix: &str, suffix: &str) -> PathBuf {
    let mut name = OsString::from(prefix);
    name.push(path.file_name().unwrap_or_default());
    name.push(suffix);
    path.with_file_name(name)
}

/// Hidden lock file guarding `target`, e.g. `.contractsAddress.ts.lock`.
fn lock_path(target: &Path) -> PathBuf {
    sibling(target, ".", ".lock")
}

/// Make a completed rename durable by syncing the containing directory.
#[cfg(unix)]
fn sync_parent(path: &Path) -> std::io::Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    File::open(parent)?.sync_all()
}

#[cfg(not(unix))]
fn sync_parent(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

/// Exclusive advisory lock on the hidden lock file, released on drop.
struct RegistryLock {
    file: File,
}

impl RegistryLock {
    fn acquire(target: &Path) -> std::io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(lock_path(target))?;
        file.lock_exclusive()?;
        Ok(Self { file })
    }
}

impl Drop for RegistryLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!(error = %e, "Failed to release registry lock");
        }
    }
}

/// Temp file next to the target; removed on drop unless committed.
struct StagedFile {
    target: PathBuf,
    path: PathBuf,
    file: Option<File>,
}

impl StagedFile {
    fn create(target: &Path) -> std::io::Result<Self> {
        let path = sibling(target, "", &format!(".tmp-{}", std::process::id()));
        let file = File::create(&path)?;
        Ok(Self {
            target: target.to_path_buf(),
            path,
            file: Some(file),
        })
    }

    fn commit(mut self, content: &[u8]) -> std::io::Result<()> {
        let mut file = self
            .file
            .take()
            .ok_or_else(|| std::io::Error::other("staged file already committed"))?;
        file.write_all(content)?;
        file.sync_all()?;
        drop(file);
        std::fs::rename(&self.path, &self.target)?;
        sync_parent(&self.target)
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        // After a successful rename the temp path no longer exists.
        if !self.path.exists() {
            return;
        }
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to remove staged registry file");
        }
    }
}
