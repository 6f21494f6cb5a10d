//! Hierarchical actor addresses.
//!
//! Application actors live under `/user`, runtime-owned actors under `/system`.
//! Introspection and logging tooling relies on this layout, so it is part of the
//! public contract.

use crate::actor::ActorError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const USER_ROOT: &str = "user";
pub const SYSTEM_ROOT: &str = "system";
pub const DEAD_LETTERS_NAME: &str = "deadLetters";

/// A validated, `/`-delimited actor path such as `/user/parent/child`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ActorPath(String);

impl ActorPath {
    pub fn parse(s: &str) -> Result<Self, ActorError> {
        let Some(rest) = s.strip_prefix('/') else {
            return Err(ActorError::InvalidArgument(format!(
                "actor path must start with '/': {:?}",
                s
            )));
        };

        let mut segments = rest.split('/');
        match segments.next() {
            Some(USER_ROOT) | Some(SYSTEM_ROOT) => {}
            _ => {
                return Err(ActorError::InvalidArgument(format!(
                    "actor path must be rooted at /{} or /{}: {:?}",
                    USER_ROOT, SYSTEM_ROOT, s
                )))
            }
        }

        let mut depth = 0;
        for segment in segments {
            validate_name(segment)?;
            depth += 1;
        }
        if depth == 0 {
            return Err(ActorError::InvalidArgument(format!(
                "actor path has no name below its root: {:?}",
                s
            )));
        }

        Ok(Self(s.to_string()))
    }

    /// `/user/{name}`
    pub fn user(name: &str) -> Result<Self, ActorError> {
        validate_name(name)?;
        Ok(Self(format!("/{}/{}", USER_ROOT, name)))
    }

    /// `/system/{name}`
    pub fn system(name: &str) -> Result<Self, ActorError> {
        validate_name(name)?;
        Ok(Self(format!("/{}/{}", SYSTEM_ROOT, name)))
    }

    /// `/system/deadLetters`
    pub fn dead_letters() -> Self {
        Self(format!("/{}/{}", SYSTEM_ROOT, DEAD_LETTERS_NAME))
    }

    /// `/system/temp/{name}`, for sinks that are never registered.
    pub(crate) fn temporary(name: &str) -> Self {
        Self(format!("/{}/temp/{}", SYSTEM_ROOT, name))
    }

    pub fn child(&self, name: &str) -> Result<Self, ActorError> {
        validate_name(name)?;
        Ok(Self(format!("{}/{}", self.0, name)))
    }

    /// The enclosing actor's path, `None` for top-level actors.
    pub fn parent(&self) -> Option<Self> {
        let (parent, _) = self.0.rsplit_once('/')?;
        if parent.matches('/').count() < 2 {
            return None;
        }
        Some(Self(parent.to_string()))
    }

    /// Last segment.
    pub fn name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or_default()
    }

    /// `user` or `system`.
    pub fn root(&self) -> &str {
        self.0[1..].split('/').next().unwrap_or_default()
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0[1..].split('/')
    }

    pub fn depth(&self) -> usize {
        self.segments().count() - 1
    }

    pub fn is_user(&self) -> bool {
        self.root() == USER_ROOT
    }

    pub fn is_system(&self) -> bool {
        self.root() == SYSTEM_ROOT
    }

    /// True when `other` lives strictly below this path.
    pub fn is_ancestor_of(&self, other: &ActorPath) -> bool {
        other.0.len() > self.0.len()
            && other.0.starts_with(&self.0)
            && other.0.as_bytes()[self.0.len()] == b'/'
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Checks a single path segment.
pub fn validate_name(name: &str) -> Result<(), ActorError> {
    if name.is_empty() {
        return Err(ActorError::InvalidArgument(
            "actor name must not be empty".to_string(),
        ));
    }
    if name.contains('/') || name.chars().any(char::is_whitespace) {
        return Err(ActorError::InvalidArgument(format!(
            "actor name must not contain '/' or whitespace: {:?}",
            name
        )));
    }
    Ok(())
}

impl FromStr for ActorPath {
    type Err = ActorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ActorPath {
    type Error = ActorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ActorPath> for String {
    fn from(path: ActorPath) -> Self {
        path.0
    }
}

impl AsRef<str> for ActorPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActorPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_user_and_child_paths() {
        let parent = ActorPath::user("parent").unwrap();
        let child = parent.child("child").unwrap();
        assert_eq!(child.as_str(), "/user/parent/child");
        assert_eq!(child.name(), "child");
        assert_eq!(child.parent(), Some(parent.clone()));
        assert_eq!(parent.parent(), None);
        assert_eq!(child.depth(), 2);
        assert!(parent.is_ancestor_of(&child));
        assert!(!child.is_ancestor_of(&parent));
    }

    #[test]
    fn test_sibling_prefix_is_not_ancestor() {
        let a = ActorPath::user("a").unwrap();
        let ab = ActorPath::user("ab").unwrap();
        assert!(!a.is_ancestor_of(&ab));
    }

    #[test]
    fn test_roots() {
        let dead = ActorPath::parse("/system/deadLetters").unwrap();
        assert!(dead.is_system());
        assert!(!dead.is_user());
        assert_eq!(dead.root(), "system");
    }

    #[test]
    fn test_rejects_malformed_paths() {
        for bad in ["", "user/a", "/", "/user", "/user/", "/other/a", "/user//a", "/user/a b"] {
            assert!(
                matches!(ActorPath::parse(bad), Err(ActorError::InvalidArgument(_))),
                "{:?} should be rejected",
                bad
            );
        }
        assert!(ActorPath::user("").is_err());
        assert!(ActorPath::user("a/b").is_err());
    }

    #[test]
    fn test_serializes_as_string() {
        let path = ActorPath::user("echo").unwrap();
        let json = serde_json::to_string(&path).unwrap();
        assert_eq!(json, "\"/user/echo\"");
        let back: ActorPath = serde_json::from_str(&json).unwrap();
        assert_eq!(back, path);
        assert!(serde_json::from_str::<ActorPath>("\"nope\"").is_err());
    }
}
