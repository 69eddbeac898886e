//! Compiler configuration.

use serde::{Deserialize, Serialize};

/// Options the driver hands to the semantic core.
///
/// `ptr_size` seeds the widths of `usize`/`isize` during core-library
/// initialization; the paths are carried for diagnostics and backend handoff
/// and are otherwise opaque to the passes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConeOptions {
    /// Address width in bits of the compilation target.
    pub ptr_size: u16,
    /// Path of the entry source file.
    pub src_path: String,
    /// Path the backend will write its output to.
    pub out_path: String,
}

impl Default for ConeOptions {
    fn default() -> Self {
        Self {
            ptr_size: 64,
            src_path: String::new(),
            out_path: String::new(),
        }
    }
}
