//! Field paths into captured snapshots.

use std::fmt;

use serde::{Serialize, Serializer};

/// One step into a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    /// Struct field.
    Field(String),
    /// String map key.
    Key(String),
    /// Sequence index.
    Index(usize),
}

/// Structured path rendering as `tasks[0].name` or `tags["team"]`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Path(Vec<PathSegment>);

impl Path {
    /// Creates the root path.
    #[must_use]
    pub const fn root() -> Self {
        Self(Vec::new())
    }

    /// Returns the segments.
    #[must_use]
    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    /// Returns true for the root path.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns a new path with `segment` appended.
    #[must_use]
    pub fn child(&self, segment: PathSegment) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment);
        Self(segments)
    }

    /// Returns true if `prefix` names this path or one of its ancestors.
    ///
    /// `settings` matches `settings.name` and `settings[0]` but not
    /// `settings_v2`.
    #[must_use]
    pub fn matches_prefix(&self, prefix: &str) -> bool {
        let rendered = self.to_string();
        rendered
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('.') || rest.starts_with('['))
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            match segment {
                PathSegment::Field(name) if i == 0 => f.write_str(name)?,
                PathSegment::Field(name) => write!(f, ".{name}")?,
                PathSegment::Key(key) => write!(f, "[{}]", serde_json::Value::from(key.as_str()))?,
                PathSegment::Index(idx) => write!(f, "[{idx}]")?,
            }
        }
        Ok(())
    }
}

impl Serialize for Path {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl From<Vec<PathSegment>> for Path {
    fn from(segments: Vec<PathSegment>) -> Self {
        Self(segments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rendering() {
        let path = Path::root()
            .child(PathSegment::Field("tasks".into()))
            .child(PathSegment::Index(0))
            .child(PathSegment::Field("name".into()));
        assert_eq!(path.to_string(), "tasks[0].name");

        let tags = Path::from(vec![
            PathSegment::Field("tags".into()),
            PathSegment::Key("team".into()),
        ]);
        assert_eq!(tags.to_string(), r#"tags["team"]"#);
    }

    #[test]
    fn test_prefix_matching() {
        let path = Path::from(vec![
            PathSegment::Field("settings".into()),
            PathSegment::Field("name".into()),
        ]);
        assert!(path.matches_prefix("settings"));
        assert!(path.matches_prefix("settings.name"));
        assert!(!path.matches_prefix("settings.nam"));
        assert!(!path.matches_prefix("set"));
    }
}
