//! Options controlling how strictly a buffer is validated.

/// Validation settings used by [`crate::reader::Reader::with_options`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaderOptions {
    /// Reject any version other than [`crate::qfiles::VERSION`]. When off only
    /// the magic is checked.
    pub check_version: bool,
    /// Accept directories whose lump ranges overlap. Externally produced files
    /// sometimes share bytes between empty-ish lumps.
    pub allow_overlapping_lumps: bool,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            check_version: true,
            allow_overlapping_lumps: true,
        }
    }
}

impl ReaderOptions {
    pub fn check_version(mut self, check: bool) -> Self {
        self.check_version = check;
        self
    }

    pub fn allow_overlapping_lumps(mut self, allow: bool) -> Self {
        self.allow_overlapping_lumps = allow;
        self
    }
}
