use serde::{Deserialize, Serialize};

/// Dialect and execution switches for one file.
///
/// A value of this type is passed explicitly into the resolver, recorded in
/// the compiled [`crate::Program`], and consulted by the VM, so several
/// configurations can coexist in one process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileOptions {
    /// Permit functions to call themselves, directly or indirectly.
    pub allow_recursion: bool,
    /// Permit reassignment of toplevel names and toplevel `if`/`for`/`while`.
    pub allow_global_reassign: bool,
    /// `load` binds module globals rather than file-local names.
    pub load_binds_globally: bool,
    /// Maximum number of VM steps per thread; zero means unlimited.
    pub max_steps: u64,
}

impl FileOptions {
    /// Options used for interactive chunks: toplevel rebinding and control
    /// flow are allowed and loads bind globals so later chunks can see them.
    pub fn repl(self) -> Self {
        Self {
            allow_global_reassign: true,
            load_binds_globally: true,
            ..self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_strict() {
        let opts = FileOptions::default();
        assert!(!opts.allow_recursion);
        assert!(!opts.allow_global_reassign);
        assert_eq!(opts.max_steps, 0);
    }

    #[test]
    fn repl_options_keep_other_switches() {
        let opts = FileOptions {
            allow_recursion: true,
            ..Default::default()
        }
        .repl();
        assert!(opts.allow_recursion);
        assert!(opts.allow_global_reassign);
        assert!(opts.load_binds_globally);
    }
}
