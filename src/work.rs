//! One build session: scan sources, decide what is out of date, compile it,
//! and record the new state for the next session.

use crate::compiler::Toolchain;
use crate::db::Cache;
use crate::diag::Diagnostic;
use crate::dirty::{self, Dirty, DirtyReason};
use crate::entry::{self, CompilationUnit};
use crate::fs::FileSystem;
use crate::graph::{Graph, GraphBuilder, NodeId};
use crate::progress::Progress;
use crate::settings::BuildSettings;
use crate::task::{Job, Scheduler, UnitResult};
use crate::trace;
use anyhow::bail;
use log::{debug, info};
use rustc_hash::FxHashMap;
use std::path::PathBuf;

#[derive(Debug, Clone, Default)]
pub struct Options {
    /// Report what would be compiled, but compile and record nothing.
    pub dry_run: bool,
    /// Log why each out of date unit needs compiling.
    pub explain: bool,
    /// Number of compile workers; 0 means one per available core.
    pub parallelism: usize,
    /// Restrict the build to these top-level shaders, named as in the
    /// settings or by file name.  Empty means all of them.
    pub targets: Vec<String>,
}

/// What happened to one unit in a session.
#[derive(Debug, Clone)]
pub struct UnitReport {
    pub unit: CompilationUnit,
    /// None if the unit was up to date.
    pub reason: Option<DirtyReason>,
    /// None if the unit wasn't compiled.
    pub result: Option<UnitResult>,
}

#[derive(Debug, Default)]
pub struct BuildSummary {
    pub units: Vec<UnitReport>,
    pub diagnostics: Vec<Diagnostic>,
    /// Number of files in the dependency graph.
    pub files: usize,
}

impl BuildSummary {
    /// Units that were out of date.
    pub fn dirty(&self) -> usize {
        self.units.iter().filter(|u| u.reason.is_some()).count()
    }

    pub fn compiled(&self) -> usize {
        self.units
            .iter()
            .filter(|u| matches!(&u.result, Some(r) if r.success()))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.units
            .iter()
            .filter(|u| matches!(&u.result, Some(r) if !r.success()))
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.units.len() - self.dirty()
    }

    pub fn report(&self, unit: &str) -> Option<&UnitReport> {
        self.units.iter().find(|u| u.unit.name() == unit)
    }
}

pub struct Work<'a> {
    fs: &'a dyn FileSystem,
    settings: &'a BuildSettings,
    options: Options,
    cache: Cache,
    progress: &'a mut dyn Progress,
}

/// Pick the configured shaders named by `targets`.
fn select_shaders(settings: &BuildSettings, targets: &[String]) -> anyhow::Result<Vec<PathBuf>> {
    if targets.is_empty() {
        return Ok(settings.shader_paths().collect());
    }
    let mut paths = Vec::new();
    for target in targets {
        let found = settings.shaders.iter().find(|shader| {
            shader.as_os_str() == target.as_str()
                || shader.file_name().map_or(false, |f| f == target.as_str())
        });
        match found {
            Some(shader) => paths.push(settings.input_dir.join(shader)),
            None => bail!("unknown shader {:?}", target),
        }
    }
    Ok(paths)
}

impl<'a> Work<'a> {
    pub fn new(
        fs: &'a dyn FileSystem,
        settings: &'a BuildSettings,
        options: Options,
        progress: &'a mut dyn Progress,
    ) -> Self {
        Work {
            fs,
            cache: Cache::new(settings.cache_dir.clone()),
            settings,
            options,
            progress,
        }
    }

    /// Walk the top-level shaders and everything they include.
    fn scan(&self, shaders: &[PathBuf]) -> (Graph, Vec<NodeId>, Vec<Diagnostic>) {
        let mut builder = GraphBuilder::new(self.fs, &self.cache, &self.settings.include_dirs);
        let mut roots: Vec<NodeId> = Vec::with_capacity(shaders.len());
        for path in shaders {
            let id = builder.add_root(path);
            if !roots.contains(&id) {
                roots.push(id);
            }
        }
        let (graph, diagnostics) = builder.finish();
        (graph, roots, diagnostics)
    }

    /// Extract the units of every root.  Units whose output path is already
    /// claimed by an earlier unit are dropped with a diagnostic.
    fn units(
        &self,
        graph: &Graph,
        roots: &[NodeId],
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Vec<CompilationUnit> {
        let mut units: Vec<CompilationUnit> = Vec::new();
        let mut outputs: FxHashMap<PathBuf, String> = FxHashMap::default();
        for &root in roots {
            let node = graph.node(root);
            let text = match &node.text {
                Some(text) => text,
                // Unreadable; already diagnosed by the scan.
                None => continue,
            };
            let (found, mut diags) = entry::extract(root, &node.path, text, self.settings);
            diagnostics.append(&mut diags);
            for unit in found {
                if let Some(other) = outputs.get(&unit.output) {
                    diagnostics.push(Diagnostic::new(
                        &unit.source,
                        None,
                        format!(
                            "{} would overwrite the output of {}, skipping",
                            unit.name(),
                            other
                        ),
                    ));
                    continue;
                }
                outputs.insert(unit.output.clone(), unit.name());
                units.push(unit);
            }
        }
        units
    }

    fn settings_changed(&self) -> bool {
        let previous = self.cache.settings(self.fs);
        let changed = previous != Some(self.settings.fingerprint());
        if changed {
            debug!("settings fingerprint changed (previous {:?})", previous);
        }
        changed
    }

    /// Persist the state the outputs now correspond to.  Every visited node is
    /// recorded; a unit that failed lost its output, so it is retried next
    /// session regardless.
    fn commit(&self, graph: &Graph) {
        let mut written = 0;
        for (_, node) in graph.nodes() {
            if self.cache.commit(self.fs, node) {
                written += 1;
            }
        }
        self.cache.commit_settings(self.fs, self.settings.fingerprint());
        debug!("wrote {} cache records to {}", written, self.cache.dir().display());
    }

    /// Run the session.  Returns an Err() only if the build couldn't be
    /// attempted at all; per-file and per-unit problems are in the summary.
    pub fn run<T: Toolchain>(&mut self, toolchain: &T) -> anyhow::Result<BuildSummary> {
        let shaders = select_shaders(self.settings, &self.options.targets)?;

        let (mut graph, roots, mut diagnostics) =
            trace::scope("scan", || self.scan(&shaders));
        let dirty = trace::scope("propagate", || Dirty::propagate(&mut graph));
        let units = self.units(&graph, &roots, &mut diagnostics);
        info!(
            "{} files, {} roots, {} units",
            graph.len(),
            roots.len(),
            units.len()
        );
        for diag in &diagnostics {
            self.progress.diagnostic(diag);
        }

        let settings_changed = self.settings_changed();
        let mut reports: Vec<UnitReport> = units
            .into_iter()
            .map(|unit| {
                let reason =
                    dirty::needs_compile(&graph, &dirty, settings_changed, self.fs, &unit);
                UnitReport {
                    unit,
                    reason,
                    result: None,
                }
            })
            .collect();
        for report in &reports {
            if let Some(reason) = &report.reason {
                let why = dirty::explain(&graph, reason);
                if self.options.explain {
                    self.progress
                        .log(&format!("explain: {}: {}", report.unit.name(), why));
                }
                debug!("{} is dirty: {}", report.unit.name(), why);
            }
        }

        let mut summary = BuildSummary {
            units: Vec::new(),
            diagnostics,
            files: graph.len(),
        };

        if self.options.dry_run {
            for report in &reports {
                if report.reason.is_some() {
                    self.progress
                        .log(&format!("would compile {}", report.unit.name()));
                }
            }
            summary.units = reports;
            return Ok(summary);
        }

        let pending: Vec<usize> = (0..reports.len())
            .filter(|&i| reports[i].reason.is_some())
            .collect();
        if !pending.is_empty() {
            let parallelism = if self.options.parallelism > 0 {
                self.options.parallelism
            } else {
                default_parallelism()
            };
            let scheduler = Scheduler::new(parallelism)?;
            let results = {
                let jobs: Vec<Job> = pending
                    .iter()
                    .map(|&i| {
                        let unit = &reports[i].unit;
                        // Units only come from roots that could be read.
                        let source = graph.node(unit.root).text.as_deref().unwrap_or("");
                        Job { unit, source }
                    })
                    .collect();
                info!(
                    "compiling {} of {} units on {} workers",
                    jobs.len(),
                    reports.len(),
                    scheduler.parallelism()
                );
                trace::scope("compile", || {
                    scheduler.run(
                        &jobs,
                        toolchain,
                        self.fs,
                        &self.settings.include_dirs,
                        &mut *self.progress,
                    )
                })
            };
            for (&i, result) in pending.iter().zip(results) {
                reports[i].result = Some(result);
            }
        }

        // A restricted build may have brought shared headers up to date for
        // some of their includers only, so it records nothing.
        if self.options.targets.is_empty() {
            trace::scope("commit", || self.commit(&graph));
        }
        summary.units = reports;
        Ok(summary)
    }
}

pub fn default_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
