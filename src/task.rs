//! Runs compile tasks in parallel on a bounded worker pool.
//! Unaware of the dependency graph; it is handed the units that need
//! compiling and reports a result for each.

use crate::artifact;
use crate::compiler::{CompileRequest, Compiler, Termination, Toolchain};
use crate::entry::CompilationUnit;
use crate::fs::FileSystem;
use crate::progress::{Counts, Progress};
use log::warn;
use std::path::PathBuf;
use std::sync::mpsc;
use std::time::Instant;

/// One unit to compile, with the source text it is compiled from.
pub struct Job<'a> {
    pub unit: &'a CompilationUnit,
    pub source: &'a str,
}

/// The result of compiling one unit.
#[derive(Debug, Clone)]
pub struct UnitResult {
    pub termination: Termination,
    /// Compiler (or build) messages for this unit, possibly empty.
    pub diagnostics: String,
}

impl UnitResult {
    pub fn failed(diagnostics: impl Into<String>) -> Self {
        UnitResult {
            termination: Termination::Failure,
            diagnostics: diagnostics.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.termination == Termination::Success
    }
}

pub struct FinishedUnit {
    /// Index of the job in the batch.
    pub index: usize,
    /// Worker that ran the job, for tracing.
    pub tid: usize,
    pub span: (Instant, Instant),
    pub result: UnitResult,
}

enum Message {
    Started { index: usize, description: String },
    Finished(FinishedUnit),
}

fn request<'a>(job: &Job<'a>, include_dirs: &'a [PathBuf]) -> CompileRequest<'a> {
    let unit = job.unit;
    CompileRequest {
        source_path: &unit.source,
        source: job.source,
        entry_point: &unit.entry_point,
        profile: unit.profile,
        optimization: unit.optimization,
        format: unit.format,
        include_dirs,
        output: &unit.output,
    }
}

/// Compiles a unit and writes its artifact.
/// Returns an Err() if we failed outside of the compiler itself.
fn run_job<T: Toolchain>(
    toolchain: &T,
    fs: &dyn FileSystem,
    request: &CompileRequest,
) -> anyhow::Result<UnitResult> {
    let mut compiler = toolchain.instantiate()?;
    let output = compiler.compile(request)?;
    if output.termination == Termination::Success {
        artifact::write(fs, request.output, &output.bytecode)?;
    }
    Ok(UnitResult {
        termination: output.termination,
        diagnostics: output.diagnostics,
    })
}

pub struct Scheduler {
    pool: rayon::ThreadPool,
}

impl Scheduler {
    pub fn new(parallelism: usize) -> anyhow::Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(parallelism.max(1))
            .thread_name(|i| format!("compile-{}", i))
            .build()?;
        Ok(Scheduler { pool })
    }

    pub fn parallelism(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Compile every job, blocking until all of them have finished.
    /// Jobs are independent: a failing job doesn't affect the others.
    /// Returns one result per job, in job order.
    pub fn run<T: Toolchain>(
        &self,
        jobs: &[Job],
        toolchain: &T,
        fs: &dyn FileSystem,
        include_dirs: &[PathBuf],
        progress: &mut dyn Progress,
    ) -> Vec<UnitResult> {
        let mut results: Vec<Option<UnitResult>> = vec![None; jobs.len()];
        let mut counts = Counts {
            total: jobs.len(),
            ..Counts::default()
        };
        progress.update(&counts);

        self.pool.in_place_scope(|scope| {
            let (tx, rx) = mpsc::channel::<Message>();
            for (index, job) in jobs.iter().enumerate() {
                let tx = tx.clone();
                scope.spawn(move |_| {
                    let request = request(job, include_dirs);
                    // The sends only fail if the receiver disappeared, which
                    // it doesn't before every job has reported.
                    let _ = tx.send(Message::Started {
                        index,
                        description: toolchain.describe(&request),
                    });
                    let start = Instant::now();
                    let result =
                        run_job(toolchain, fs, &request).unwrap_or_else(|err| {
                            UnitResult::failed(format!("{:#}", err))
                        });
                    if !result.success() {
                        // Don't leave a previous session's artifact behind
                        // for a unit that no longer compiles.
                        if let Err(err) = fs.remove(request.output) {
                            warn!("remove {}: {}", request.output.display(), err);
                        }
                    }
                    let finish = Instant::now();
                    let _ = tx.send(Message::Finished(FinishedUnit {
                        index,
                        tid: rayon::current_thread_index().unwrap_or(0),
                        span: (start, finish),
                        result,
                    }));
                });
            }
            drop(tx);

            for msg in rx {
                match msg {
                    Message::Started { index, description } => {
                        counts.started += 1;
                        progress.update(&counts);
                        progress.unit_started(jobs[index].unit, &description);
                    }
                    Message::Finished(task) => {
                        counts.finished += 1;
                        if !task.result.success() {
                            counts.failed += 1;
                        }
                        crate::trace::event(
                            "compile",
                            task.tid,
                            task.span.0,
                            task.span.1,
                        );
                        progress.update(&counts);
                        progress.unit_finished(jobs[task.index].unit, &task.result);
                        results[task.index] = Some(task.result);
                    }
                }
            }
        });

        results
            .into_iter()
            .map(|r| r.unwrap_or_else(|| UnitResult::failed("compile task did not report")))
            .collect()
    }
}
