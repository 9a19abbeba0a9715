//! Build progress tracking and reporting, for the purpose of display to the
//! user.

use crate::diag::Diagnostic;
use crate::entry::CompilationUnit;
use crate::task::UnitResult;

/// Counts of units by scheduling state.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Counts {
    /// Units handed to the scheduler.
    pub total: usize,
    pub started: usize,
    pub finished: usize,
    pub failed: usize,
}

/// Trait for build progress notifications.  Only ever called from the thread
/// that runs the build, never from compile workers.
pub trait Progress {
    /// Called as units move through the scheduler.
    fn update(&mut self, counts: &Counts);

    /// Called when a unit starts compiling.  `description` is the
    /// toolchain's one-line rendering of the request.
    fn unit_started(&mut self, unit: &CompilationUnit, description: &str);

    /// Called when a unit completes, successfully or not.
    fn unit_finished(&mut self, unit: &CompilationUnit, result: &UnitResult);

    /// Report a problem found while scanning sources.
    fn diagnostic(&mut self, diag: &Diagnostic);

    /// Log a line of output.
    fn log(&mut self, msg: &str);
}

/// Progress implementation for a plain console, one line per event.
#[derive(Default)]
pub struct ConsoleProgress {
    /// Whether to print the compiler request line of started units.
    verbose: bool,
    counts: Counts,
}

impl ConsoleProgress {
    pub fn new(verbose: bool) -> Self {
        ConsoleProgress {
            verbose,
            counts: Counts::default(),
        }
    }
}

impl Progress for ConsoleProgress {
    fn update(&mut self, counts: &Counts) {
        self.counts = *counts;
    }

    fn unit_started(&mut self, unit: &CompilationUnit, description: &str) {
        let msg = if self.verbose {
            description.to_string()
        } else {
            format!("compile {} ({})", unit.name(), unit.profile)
        };
        self.log(&format!("[{}/{}] {}", self.counts.started, self.counts.total, msg));
    }

    fn unit_finished(&mut self, unit: &CompilationUnit, result: &UnitResult) {
        if !result.success() {
            self.log(&format!("failed: {}", unit.name()));
        }
        let output = result.diagnostics.trim_end();
        if !output.is_empty() {
            self.log(output);
        }
    }

    fn diagnostic(&mut self, diag: &Diagnostic) {
        eprintln!("shaderbuild: warning: {}", diag);
    }

    fn log(&mut self, msg: &str) {
        println!("{}", msg);
    }
}
