//! The tag vocabulary the toolchain reacts to. Tags not listed here are
//! carried through untouched.

/// Marks a file as a definition-only stub: emitted with a meta prefix and
/// no initializers.
pub const DEFINITIONS: &str = "StubGen_Definitions";

/// Suppresses emission of the tagged file entirely.
pub const HIDDEN: &str = "StubGen_Hidden";

/// Suppresses the initializer of one table or class.
pub const NO_INITIALIZER: &str = "StubGen_NoInitializer";

/// Marks a schema entry as unmanaged: the merge never touches it and no
/// warning is raised when analysis has no counterpart.
pub const EXTRA: &str = "StubGen_Extra";

pub fn has_tag(tags: &[String], tag: &str) -> bool {
    tags.iter().any(|candidate| candidate == tag)
}

#[cfg(test)]
mod tests {
    use super::{has_tag, EXTRA, HIDDEN};

    #[test]
    fn lookup_is_exact() {
        let tags = vec![HIDDEN.to_string(), "Custom".to_string()];
        assert!(has_tag(&tags, HIDDEN));
        assert!(has_tag(&tags, "Custom"));
        assert!(!has_tag(&tags, EXTRA));
        assert!(!has_tag(&tags, "hidden"));
    }
}
