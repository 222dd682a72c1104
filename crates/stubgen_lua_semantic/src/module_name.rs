use std::fmt;
use std::ops::Deref;

use compact_str::{CompactString, ToCompactString};

/// A module identifier, e.g. `client/ui/Button`.
///
/// Derived from a file path relative to the input directory: separators
/// normalized to `/`, the extension stripped. Require arguments written with
/// dots (`require("a.b.c")`) normalize to the same form.
#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct ModuleName(CompactString);

impl ModuleName {
    /// Creates a module name from a relative file path. Returns `None` for
    /// an empty path.
    pub fn from_path(path: &str) -> Option<Self> {
        let normalized = path.replace('\\', "/");
        let trimmed = normalized.trim_matches('/');
        let without_extension = match trimmed.rsplit_once('.') {
            Some((stem, extension)) if !extension.contains('/') => stem,
            _ => trimmed,
        };
        if without_extension.is_empty() {
            return None;
        }
        Some(Self(without_extension.to_compact_string()))
    }

    /// Creates a module name from a `require` argument. Dots are treated as
    /// path separators.
    pub fn from_require(argument: &str) -> Option<Self> {
        let normalized = argument.replace(['\\', '.'], "/");
        let trimmed = normalized.trim_matches('/');
        if trimmed.is_empty() {
            return None;
        }
        Some(Self(trimmed.to_compact_string()))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn components(&self) -> impl DoubleEndedIterator<Item = &str> {
        self.0.split('/')
    }

    /// The subdirectory prefix used for partitioning, e.g. `client` for
    /// `client/ui/Button`. A bare identifier has no partition.
    pub fn partition(&self) -> Option<&str> {
        let (first, _) = self.0.split_once('/')?;
        Some(first)
    }

    /// The final path segment, e.g. `Button` for `client/ui/Button`.
    pub fn last_segment(&self) -> &str {
        self.components().next_back().unwrap_or(self.as_str())
    }

    /// Every proper suffix of the identifier, longest first: for `a/b/c`,
    /// yields `b/c` then `c`. These are the keys the alias map registers.
    pub fn suffixes(&self) -> impl Iterator<Item = &str> {
        self.0.char_indices().filter_map(|(offset, character)| {
            (character == '/').then(|| &self.0[offset + 1..])
        })
    }
}

impl Deref for ModuleName {
    type Target = str;

    fn deref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for ModuleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PartialEq<str> for ModuleName {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}

impl PartialEq<&str> for ModuleName {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

#[cfg(test)]
mod tests {
    use super::ModuleName;

    #[test]
    fn from_path_strips_extension() {
        let name = ModuleName::from_path("client/ui/Button.lua").unwrap();
        assert_eq!(name, "client/ui/Button");
        assert_eq!(name.partition(), Some("client"));
        assert_eq!(name.last_segment(), "Button");
    }

    #[test]
    fn from_path_normalizes_separators() {
        let name = ModuleName::from_path("shared\\util\\Table.lua").unwrap();
        assert_eq!(name, "shared/util/Table");
    }

    #[test]
    fn from_path_rejects_empty() {
        assert_eq!(ModuleName::from_path(""), None);
        assert_eq!(ModuleName::from_path("/"), None);
    }

    #[test]
    fn from_require_accepts_dotted_form() {
        let name = ModuleName::from_require("client.ui.Button").unwrap();
        assert_eq!(name, "client/ui/Button");
    }

    #[test]
    fn suffixes_longest_first() {
        let name = ModuleName::from_path("a/b/c.lua").unwrap();
        let suffixes: Vec<_> = name.suffixes().collect();
        assert_eq!(suffixes, ["b/c", "c"]);
    }

    #[test]
    fn bare_identifier_has_no_partition_or_suffixes() {
        let name = ModuleName::from_path("Main.lua").unwrap();
        assert_eq!(name.partition(), None);
        assert_eq!(name.suffixes().count(), 0);
        assert_eq!(name.last_segment(), "Main");
    }
}
