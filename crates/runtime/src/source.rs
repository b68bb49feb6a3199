//! Source locations attached to queue nodes and backtrace frames.

use std::fmt;
use std::rc::Rc;

/// A (file, line) pair identifying where a piece of code came from.
///
/// Cloning is cheap; the file name is shared.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SourceLocation {
    file: Rc<str>,
    line: u32,
}

impl SourceLocation {
    pub fn new(file: &str, line: u32) -> Self {
        Self {
            file: Rc::from(file),
            line,
        }
    }

    /// The location reported for errors raised from native code.
    pub fn native() -> Self {
        Self::new("<native code>", 0)
    }

    pub fn file(&self) -> &str {
        &self.file
    }

    pub fn line(&self) -> u32 {
        self.line
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

impl Default for SourceLocation {
    fn default() -> Self {
        Self::native()
    }
}
