use std::collections::{BTreeMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};

/// An entry returned by [`FileSystem::read_dir`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// File name only, without the directory.
    pub name: String,
    pub is_dir: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub is_dir: bool,
}

/// The filesystem operations migration discovery needs.
pub trait FileSystem {
    fn stat(&self, path: &Path) -> io::Result<FileStat>;

    /// Open `path` and list its immediate entries.
    fn read_dir(&self, path: &Path) -> io::Result<Vec<DirEntry>>;

    fn read_to_string(&self, path: &Path) -> io::Result<String>;
}

/// [`FileSystem`] backed by `std::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsFileSystem;

impl FileSystem for OsFileSystem {
    fn stat(&self, path: &Path) -> io::Result<FileStat> {
        let meta = std::fs::metadata(path)?;
        Ok(FileStat {
            is_dir: meta.is_dir(),
        })
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<DirEntry>> {
        let mut entries = Vec::new();
        for entry in std::fs::read_dir(path)? {
            let entry = entry?;
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                is_dir: entry.file_type()?.is_dir(),
            });
        }
        Ok(entries)
    }

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }
}

#[derive(Debug, Clone)]
enum Node {
    File(String),
    Dir,
}

/// In-memory [`FileSystem`] for tests. Adding a file creates its parent
/// directories. Paths marked with [`deny`](Self::deny) fail with
/// `PermissionDenied` on read and list.
#[derive(Debug, Clone, Default)]
pub struct MemoryFileSystem {
    nodes: BTreeMap<PathBuf, Node>,
    denied: HashSet<PathBuf>,
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_dir(&mut self, path: impl AsRef<Path>) -> &mut Self {
        let mut current = PathBuf::new();
        for component in path.as_ref().components() {
            current.push(component);
            self.nodes.entry(current.clone()).or_insert(Node::Dir);
        }
        self
    }

    pub fn add_file(&mut self, path: impl AsRef<Path>, contents: impl Into<String>) -> &mut Self {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            self.add_dir(parent);
        }
        self.nodes
            .insert(path.to_path_buf(), Node::File(contents.into()));
        self
    }

    pub fn remove(&mut self, path: impl AsRef<Path>) -> &mut Self {
        self.nodes.remove(path.as_ref());
        self
    }

    pub fn deny(&mut self, path: impl AsRef<Path>) -> &mut Self {
        self.denied.insert(path.as_ref().to_path_buf());
        self
    }

    fn node(&self, path: &Path) -> io::Result<&Node> {
        if self.denied.contains(path) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("permission denied: {}", path.display()),
            ));
        }
        self.nodes.get(path).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no such file or directory: {}", path.display()),
            )
        })
    }
}

impl FileSystem for MemoryFileSystem {
    fn stat(&self, path: &Path) -> io::Result<FileStat> {
        // stat only needs the entry to exist, not to be readable
        match self.nodes.get(path) {
            Some(node) => Ok(FileStat {
                is_dir: matches!(node, Node::Dir),
            }),
            None => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no such file or directory: {}", path.display()),
            )),
        }
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<DirEntry>> {
        match self.node(path)? {
            Node::Dir => {}
            Node::File(_) => {
                return Err(io::Error::other(format!(
                    "not a directory: {}",
                    path.display()
                )));
            }
        }

        Ok(self
            .nodes
            .iter()
            .filter(|(p, _)| p.parent() == Some(path))
            .filter_map(|(p, node)| {
                let name = p.file_name()?.to_string_lossy().into_owned();
                Some(DirEntry {
                    name,
                    is_dir: matches!(node, Node::Dir),
                })
            })
            .collect())
    }

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        match self.node(path)? {
            Node::File(contents) => Ok(contents.clone()),
            Node::Dir => Err(io::Error::other(format!(
                "is a directory: {}",
                path.display()
            ))),
        }
    }
}
