//! Table files of one project directory.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use crate::records::Family;

/// Paths of the three family tables inside a project directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectFiles {
    pub root: PathBuf,
    pub point: PathBuf,
    pub trend: PathBuf,
    pub alarm: PathBuf,
}

impl ProjectFiles {
    /// Resolve each family's file. An existing `<stem>.DBF` is used as is;
    /// otherwise `<stem>.dbf`, whether it exists or not.
    pub fn resolve(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            root: root.to_path_buf(),
            point: family_path(root, Family::Point),
            trend: family_path(root, Family::Trend),
            alarm: family_path(root, Family::Alarm),
        }
    }

    pub fn path(&self, family: Family) -> &Path {
        match family {
            Family::Point => &self.point,
            Family::Trend => &self.trend,
            Family::Alarm => &self.alarm,
        }
    }
}

fn family_path(root: &Path, family: Family) -> PathBuf {
    let stem = family.file_stem();
    for candidate in [format!("{stem}.DBF"), format!("{}.DBF", stem.to_uppercase())] {
        let path = root.join(&candidate);
        if path.is_file() {
            debug!("{} table: {:?}", family, path);
            return path;
        }
    }
    root.join(format!("{stem}.dbf"))
}
