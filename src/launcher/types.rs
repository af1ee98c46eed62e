//! Shared types for the launcher: worker classes, importance and binding levels,
//! launch requests and termination diagnostics.

use super::signals::TerminationReason;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// OS process id of a worker.
pub type ProcessId = u32;

/// Kind of worker process. Each class has its own slot pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerClass {
    /// Isolated workers (renderers and the like). Subject to binding management.
    Sandboxed,
    /// Trusted workers (GPU, network, utility).
    Privileged,
}

impl WorkerClass {
    /// Both classes, in a fixed order.
    pub const ALL: [WorkerClass; 2] = [WorkerClass::Sandboxed, WorkerClass::Privileged];

    /// Lowercase name used on the command line and in the worker protocol.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sandboxed => "sandboxed",
            Self::Privileged => "privileged",
        }
    }
}

impl fmt::Display for WorkerClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkerClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sandboxed" => Ok(Self::Sandboxed),
            "privileged" => Ok(Self::Privileged),
            _ => Err(format!(
                "Unknown worker class: '{}'. Valid options: sandboxed, privileged",
                s
            )),
        }
    }
}

/// One value per worker class.
#[derive(Debug, Clone, Default)]
pub struct ByClass<T> {
    sandboxed: T,
    privileged: T,
}

impl<T> ByClass<T> {
    /// Build from one value per class.
    pub fn new(sandboxed: T, privileged: T) -> Self {
        Self {
            sandboxed,
            privileged,
        }
    }

    /// Build by calling `f` for each class.
    pub fn from_fn(mut f: impl FnMut(WorkerClass) -> T) -> Self {
        Self {
            sandboxed: f(WorkerClass::Sandboxed),
            privileged: f(WorkerClass::Privileged),
        }
    }

    pub fn get(&self, class: WorkerClass) -> &T {
        match class {
            WorkerClass::Sandboxed => &self.sandboxed,
            WorkerClass::Privileged => &self.privileged,
        }
    }

    pub fn get_mut(&mut self, class: WorkerClass) -> &mut T {
        match class {
            WorkerClass::Sandboxed => &mut self.sandboxed,
            WorkerClass::Privileged => &mut self.privileged,
        }
    }
}

/// Importance of a worker as seen by the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChildImportance {
    Normal,
    Moderate,
    Important,
}

impl ChildImportance {
    /// Importance after folding in visibility, the way binding decisions see it.
    ///
    /// A visible top-level worker is always important; a visible nested one is
    /// at least moderate.
    pub fn effective(foreground: bool, depth: u32, importance: ChildImportance) -> Self {
        if (foreground && depth == 0) || importance == ChildImportance::Important {
            ChildImportance::Important
        } else if (foreground && depth > 0) || importance == ChildImportance::Moderate {
            ChildImportance::Moderate
        } else {
            ChildImportance::Normal
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Moderate => "moderate",
            Self::Important => "important",
        }
    }
}

impl fmt::Display for ChildImportance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChildImportance {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "normal" => Ok(Self::Normal),
            "moderate" => Ok(Self::Moderate),
            "important" => Ok(Self::Important),
            _ => Err(format!(
                "Unknown importance: '{}'. Valid options: normal, moderate, important",
                s
            )),
        }
    }
}

/// Keep-alive strength applied to a worker process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BindingStrength {
    None,
    Moderate,
    Strong,
}

impl BindingStrength {
    /// Binding that backs an effective importance level.
    pub fn for_importance(importance: ChildImportance) -> Self {
        match importance {
            ChildImportance::Normal => Self::None,
            ChildImportance::Moderate => Self::Moderate,
            ChildImportance::Important => Self::Strong,
        }
    }

    pub(crate) fn to_u8(self) -> u8 {
        self as u8
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            2 => Self::Strong,
            1 => Self::Moderate,
            _ => Self::None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Moderate => "moderate",
            Self::Strong => "strong",
        }
    }
}

impl fmt::Display for BindingStrength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A file region handed to a worker at setup time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceHandle {
    /// Name the worker knows the resource by.
    pub id: String,
    pub path: PathBuf,
    pub offset: u64,
    /// Region length in bytes; 0 means "to end of file".
    pub size: u64,
}

impl ResourceHandle {
    /// A whole file.
    pub fn file(id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
            offset: 0,
            size: 0,
        }
    }

    /// A region of a file.
    pub fn region(id: impl Into<String>, path: impl Into<PathBuf>, offset: u64, size: u64) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
            offset,
            size,
        }
    }
}

/// Everything needed to start one worker. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    class: WorkerClass,
    command_line: Vec<String>,
    resources: Vec<ResourceHandle>,
}

impl LaunchRequest {
    pub fn new(class: WorkerClass, command_line: Vec<String>) -> Self {
        Self {
            class,
            command_line,
            resources: Vec::new(),
        }
    }

    /// Attach a resource.
    pub fn with_resource(mut self, resource: ResourceHandle) -> Self {
        self.resources.push(resource);
        self
    }

    pub fn class(&self) -> WorkerClass {
        self.class
    }

    pub fn command_line(&self) -> &[String] {
        &self.command_line
    }

    pub fn resources(&self) -> &[ResourceHandle] {
        &self.resources
    }

    /// Value of the `--type=` switch, if the command line carries one.
    pub fn process_type(&self) -> Option<&str> {
        self.command_line
            .iter()
            .find_map(|arg| arg.strip_prefix("--type="))
    }
}

/// Diagnostics for a worker, answered after (or before) its death.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminationInfo {
    /// Keep-alive strength the worker held, at death if it has died.
    pub binding_state: BindingStrength,
    /// Whether the host killed the worker itself (stop or eviction).
    pub killed_by_host: bool,
    /// How the process ended, once reaped.
    pub reason: Option<TerminationReason>,
}
