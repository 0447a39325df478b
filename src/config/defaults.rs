//! Default values for configuration fields.
//!
//! These functions are used by serde for default deserialization.

// ============================================================================
// Site Defaults
// ============================================================================

pub mod site {
    use std::path::PathBuf;

    pub fn email() -> String {
        "user@noreply.quire".into()
    }

    pub fn language() -> String {
        "en".into()
    }

    pub fn name_rss() -> String {
        "rss.xml".into()
    }

    pub fn name_atom() -> String {
        "atom.xml".into()
    }

    pub fn layouts() -> PathBuf {
        "z/layouts".into()
    }
}

// ============================================================================
// Page Defaults
// ============================================================================

pub mod page {
    pub fn excerpt_token() -> String {
        "<!--more-->".into()
    }
}

// ============================================================================
// [diagrams] Section Defaults
// ============================================================================

pub mod diagrams {
    use std::path::PathBuf;

    pub fn plantuml_jar() -> PathBuf {
        "./plantuml.jar".into()
    }

    pub fn ditaa_jar() -> PathBuf {
        "./ditaa.jar".into()
    }

    pub fn dot_bin() -> String {
        "dot".into()
    }

    pub fn java_bin() -> String {
        "java".into()
    }

    pub fn format() -> String {
        "svg".into()
    }

    pub fn cache() -> PathBuf {
        std::env::temp_dir().join("quire-diagrams")
    }

    pub fn output() -> PathBuf {
        "out/site".into()
    }
}

// ============================================================================
// `serve` Defaults
// ============================================================================

pub mod serve {
    pub fn bind() -> String {
        "0.0.0.0".into()
    }

    pub fn port() -> u16 {
        8000
    }

    pub fn command() -> String {
        "make".into()
    }
}
