//! Sysfs attribute access and object directory scanning.
//!
//! Every ZIO object (device, channel-set, channel, buffer, trigger) is a
//! directory under `/sys/bus/zio/devices`. Regular files in it are
//! attributes; sub-directories are child objects. [`ObjectDir`] is the
//! untyped scan of one such directory; the typed wrappers in
//! [`device`](crate::device), [`channel`](crate::channel),
//! [`buffer`](crate::buffer) and [`trigger`](crate::trigger) are built on it.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use tracing::trace;

use crate::error::{Result, ZioError};

/// Files the kernel adds to every device directory that are not ZIO attributes.
pub const IGNORED_ENTRIES: &[&str] = &["power", "driver", "subsystem", "uevent"];

/// Values of the `devtype` attribute.
pub mod devtype {
    /// Channel-set
    pub const CSET: &str = "zio_cset_type";
    /// Channel
    pub const CHANNEL: &str = "zio_chan_type";
    /// Trigger instance
    pub const TRIGGER: &str = "zio_ti_type";
    /// Buffer instance
    pub const BUFFER: &str = "buffer";
    /// Char-device interface
    pub const CDEV: &str = "zio-cdev";
}

/// Whether any permission bit in `mask` is set on `path`.
pub(crate) fn permits(path: &Path, mask: u32) -> bool {
    fs::metadata(path)
        .map(|m| m.permissions().mode() & mask != 0)
        .unwrap_or(false)
}

/// Kind of a sysfs object directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    /// Channel-set
    Cset,
    /// Channel
    Channel,
    /// Trigger instance
    Trigger,
    /// Buffer instance
    Buffer,
    /// Char-device interface
    Cdev,
    /// Anything else
    Unknown,
}

impl ObjectKind {
    fn from_devtype(devtype: &str) -> Self {
        match devtype {
            devtype::CSET => Self::Cset,
            devtype::CHANNEL => Self::Channel,
            devtype::TRIGGER => Self::Trigger,
            devtype::BUFFER => Self::Buffer,
            devtype::CDEV => Self::Cdev,
            _ => Self::Unknown,
        }
    }

    /// Classify by directory name when no `devtype` file is present.
    fn from_dir_name(name: &str) -> Self {
        match name {
            "trigger" => Self::Trigger,
            "buffer" => Self::Buffer,
            devtype::CDEV => Self::Cdev,
            n if n.starts_with("cset") => Self::Cset,
            n if n.starts_with("chan") => Self::Channel,
            _ => Self::Unknown,
        }
    }
}

/// One sysfs attribute file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    name: String,
    path: PathBuf,
}

impl Attribute {
    /// Attribute `name` inside directory `dir`.
    pub fn new(dir: impl AsRef<Path>, name: impl Into<String>) -> Self {
        let name = name.into();
        let path = dir.as_ref().join(&name);
        Self { name, path }
    }

    /// Attribute name (file name).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Full path of the attribute file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the file has any read permission bit set.
    pub fn is_readable(&self) -> bool {
        permits(&self.path, 0o444)
    }

    /// Whether the file has any write permission bit set.
    pub fn is_writable(&self) -> bool {
        permits(&self.path, 0o222)
    }

    /// Read the value with trailing line terminators removed.
    pub fn read(&self) -> Result<String> {
        let raw = fs::read_to_string(&self.path).map_err(|source| ZioError::Attribute {
            path: self.path.clone(),
            source,
        })?;
        trace!(path = %self.path.display(), value = raw.trim_end(), "Read attribute");
        Ok(raw.trim_end_matches(['\n', '\r']).to_string())
    }

    /// Read the value as an integer.
    pub fn read_int(&self) -> Result<i64> {
        let value = self.read()?;
        value.trim().parse().map_err(|_| ZioError::AttributeValue {
            path: self.path.clone(),
            value,
        })
    }

    /// Read a `0`/`1` flag. Any non-zero integer counts as set.
    pub fn read_bool(&self) -> Result<bool> {
        Ok(self.read_int()? != 0)
    }

    /// Write `value` in its display form.
    pub fn write(&self, value: impl Display) -> Result<()> {
        let text = value.to_string();
        trace!(path = %self.path.display(), value = %text, "Write attribute");
        fs::write(&self.path, text).map_err(|source| ZioError::Attribute {
            path: self.path.clone(),
            source,
        })
    }

    /// Write a flag as `1` or `0`.
    pub fn write_bool(&self, value: bool) -> Result<()> {
        self.write(u8::from(value))
    }
}

/// Untyped scan of one sysfs object directory.
#[derive(Debug, Clone)]
pub struct ObjectDir {
    path: PathBuf,
    name: String,
    attributes: BTreeMap<String, Attribute>,
    children: Vec<PathBuf>,
}

impl ObjectDir {
    /// Scan `path`: regular files become attributes, directories children.
    pub fn scan(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let entries = fs::read_dir(&path).map_err(|source| ZioError::Attribute {
            path: path.clone(),
            source,
        })?;

        let mut attributes = BTreeMap::new();
        let mut children = Vec::new();
        for entry in entries {
            let entry = entry?;
            let entry_name = entry.file_name().to_string_lossy().into_owned();
            if IGNORED_ENTRIES.contains(&entry_name.as_str()) {
                continue;
            }
            // follow symlinks, sysfs links children that way
            let entry_path = entry.path();
            if entry_path.is_dir() {
                children.push(entry_path);
            } else {
                attributes.insert(entry_name.clone(), Attribute::new(&path, entry_name));
            }
        }
        children.sort();

        trace!(
            path = %path.display(),
            attributes = attributes.len(),
            children = children.len(),
            "Scanned object"
        );
        Ok(Self {
            path,
            name,
            attributes,
            children,
        })
    }

    /// Directory path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory name.
    pub fn dir_name(&self) -> &str {
        &self.name
    }

    /// Attribute by name, if present.
    pub fn get(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }

    /// Attribute by name.
    ///
    /// # Errors
    ///
    /// [`ZioError::MissingAttribute`] if the object has no such file.
    pub fn attribute(&self, name: &str) -> Result<&Attribute> {
        self.get(name).ok_or_else(|| ZioError::MissingAttribute {
            name: name.to_string(),
            object: self.path.clone(),
        })
    }

    /// Whether an attribute exists.
    pub fn has(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    /// All attributes, ordered by name.
    pub fn attributes(&self) -> impl Iterator<Item = &Attribute> {
        self.attributes.values()
    }

    /// Child directories, ordered by path.
    pub fn children(&self) -> &[PathBuf] {
        &self.children
    }

    /// Child directories of one kind.
    pub fn children_of(&self, kind: ObjectKind) -> impl Iterator<Item = &PathBuf> {
        self.children
            .iter()
            .filter(move |child| object_kind(child) == kind)
    }

    /// Value of the `name` attribute, falling back to the directory name.
    pub fn name(&self) -> String {
        self.read_optional("name").unwrap_or_else(|| self.name.clone())
    }

    /// Value of the `devname` attribute, falling back to the directory name.
    pub fn devname(&self) -> String {
        self.read_optional("devname")
            .unwrap_or_else(|| self.name.clone())
    }

    /// Numeric suffix of the devname (`zzero-0000` → 0).
    pub fn oid(&self) -> Option<u32> {
        parse_oid(&self.devname())
    }

    /// Read the `enable` flag.
    pub fn is_enabled(&self) -> Result<bool> {
        self.attribute("enable")?.read_bool()
    }

    /// Write the `enable` flag.
    pub fn set_enabled(&self, enabled: bool) -> Result<()> {
        self.attribute("enable")?.write_bool(enabled)
    }

    fn read_optional(&self, name: &str) -> Option<String> {
        self.get(name).and_then(|a| a.read().ok())
    }
}

/// Numeric suffix after the last `-`.
pub fn parse_oid(devname: &str) -> Option<u32> {
    devname.rsplit('-').next()?.parse().ok()
}

/// Kind of the object directory at `path`, from its `devtype` file or its name.
pub fn object_kind(path: &Path) -> ObjectKind {
    if !path.is_dir() {
        return ObjectKind::Unknown;
    }
    match fs::read_to_string(path.join("devtype")) {
        Ok(devtype) => ObjectKind::from_devtype(devtype.trim_end()),
        Err(_) => path
            .file_name()
            .map(|n| ObjectKind::from_dir_name(&n.to_string_lossy()))
            .unwrap_or(ObjectKind::Unknown),
    }
}
