//! Shader source lookup.
//!
//! Programs are compiled from WGSL text looked up by string id. The
//! built-in library carries the point and fade passes; callers may
//! register or override sources before compiling.

use std::borrow::Cow;
use std::collections::HashMap;

pub const POINT_VS: &str = "point-vs";
pub const POINT_FS: &str = "point-fs";
pub const FADE_VS: &str = "fade-vs";
pub const FADE_FS: &str = "fade-fs";

/// Maps shader ids to WGSL source text.
#[derive(Debug, Clone, Default)]
pub struct ShaderLibrary {
    sources: HashMap<String, Cow<'static, str>>,
}

impl ShaderLibrary {
    /// Create an empty library.
    pub fn new() -> Self {
        Self::default()
    }

    /// Library holding the oscilloscope's own shaders.
    pub fn builtin() -> Self {
        let mut library = Self::new();
        library.insert(POINT_VS, include_str!("shaders/point_vs.wgsl"));
        library.insert(POINT_FS, include_str!("shaders/point_fs.wgsl"));
        library.insert(FADE_VS, include_str!("shaders/fade_vs.wgsl"));
        library.insert(FADE_FS, include_str!("shaders/fade_fs.wgsl"));
        library
    }

    /// Register `source` under `id`, replacing any previous entry.
    pub fn insert(&mut self, id: &str, source: impl Into<Cow<'static, str>>) {
        self.sources.insert(id.to_string(), source.into());
    }

    pub fn source(&self, id: &str) -> Option<&str> {
        self.sources.get(id).map(|s| s.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_sources_present() {
        let library = ShaderLibrary::builtin();
        for id in [POINT_VS, POINT_FS, FADE_VS, FADE_FS] {
            let source = library.source(id).unwrap();
            assert!(!source.is_empty(), "{} is empty", id);
        }
        assert!(library.source("missing").is_none());
    }

    #[test]
    fn test_insert_overrides() {
        let mut library = ShaderLibrary::builtin();
        library.insert(POINT_FS, String::from("// replaced"));
        assert_eq!(library.source(POINT_FS), Some("// replaced"));
    }
}
