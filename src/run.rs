use anyhow::anyhow;
use argh::FromArgs;
use std::path::{Path, PathBuf};

use crate::{
    compiler::Dxc,
    fs::RealFileSystem,
    progress::ConsoleProgress,
    settings::BuildSettings,
    trace,
    work::{self, BuildSummary},
};

/// Incrementally compile HLSL shaders.
#[derive(FromArgs, Debug)]
struct Args {
    /// chdir before running
    #[argh(option, short = 'C')]
    chdir: Option<PathBuf>,

    /// input settings file [default=shaders.toml]
    #[argh(option, short = 'f', default = "PathBuf::from(\"shaders.toml\")")]
    manifest: PathBuf,

    /// parallelism [default from system]
    #[argh(option, short = 'j')]
    parallelism: Option<usize>,

    /// dry run: report what would be compiled, but compile nothing
    #[argh(switch, short = 'n')]
    dry_run: bool,

    /// print compiler command lines
    #[argh(switch, short = 'v')]
    verbose: bool,

    /// debugging tools, use -d list to list
    #[argh(option, short = 'd')]
    debug: Vec<String>,

    /// top-level shaders to build [default=all]
    #[argh(positional)]
    targets: Vec<String>,
}

/// The summary line for a finished build, and whether it succeeded.
pub fn describe(summary: &BuildSummary) -> (String, bool) {
    let failed = summary.failed();
    if failed > 0 {
        return (
            format!("{} of {} units failed", failed, summary.dirty()),
            false,
        );
    }
    match summary.compiled() {
        // Special case: don't print numbers when no work done.
        0 => ("no work to do".to_string(), true),
        n => (format!("compiled {} units, now up to date", n), true),
    }
}

fn run_impl() -> anyhow::Result<i32> {
    let args: Args = argh::from_env();

    let mut explain = false;
    for tool in &args.debug {
        match tool.as_str() {
            "list" => {
                println!("debug tools:");
                println!("  explain  print why each unit is being compiled");
                println!("  trace    generate json performance trace");
                return Ok(1);
            }
            "explain" => explain = true,
            "trace" => trace::open(Path::new("trace.json"))?,
            _ => anyhow::bail!("unknown -d {:?}, use -d list to list", tool),
        }
    }

    if let Some(dir) = &args.chdir {
        std::env::set_current_dir(dir)
            .map_err(|err| anyhow!("chdir {}: {}", dir.display(), err))?;
    }

    let settings = trace::scope("settings::load", || BuildSettings::load(&args.manifest))?;
    let options = work::Options {
        dry_run: args.dry_run,
        explain,
        parallelism: args.parallelism.unwrap_or_else(work::default_parallelism),
        targets: args.targets,
    };

    let fs = RealFileSystem::new();
    let toolchain = Dxc::new(settings.compiler.clone());
    let mut progress = ConsoleProgress::new(args.verbose);
    let summary = {
        let mut work = work::Work::new(&fs, &settings, options.clone(), &mut progress);
        trace::scope("work.run", || work.run(&toolchain))?
    };

    if options.dry_run {
        println!(
            "shaderbuild: {} of {} units out of date",
            summary.dirty(),
            summary.units.len()
        );
        return Ok(0);
    }
    let (line, ok) = describe(&summary);
    println!("shaderbuild: {}", line);
    Ok(if ok { 0 } else { 1 })
}

pub fn run() -> anyhow::Result<i32> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let res = run_impl();
    if let Err(err) = trace::close() {
        log::warn!("trace: {}", err);
    }
    res
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::UnitResult;
    use crate::work::UnitReport;

    fn summary(results: &[Option<bool>]) -> BuildSummary {
        let settings = BuildSettings::new("/s", "/out");
        let text = "PS_MAIN";
        let (units, _) = crate::entry::extract(
            crate::graph::NodeId::from(0),
            Path::new("/s/a.hlsl"),
            text,
            &settings,
        );
        BuildSummary {
            units: results
                .iter()
                .map(|r| UnitReport {
                    unit: units[0].clone(),
                    reason: r.map(|_| crate::dirty::DirtyReason::OutputMissing),
                    result: r.map(|ok| {
                        if ok {
                            UnitResult {
                                termination: crate::compiler::Termination::Success,
                                diagnostics: String::new(),
                            }
                        } else {
                            UnitResult::failed("boom")
                        }
                    }),
                })
                .collect(),
            ..BuildSummary::default()
        }
    }

    #[test]
    fn summary_lines() {
        assert_eq!(describe(&summary(&[None, None])), ("no work to do".to_string(), true));
        assert_eq!(
            describe(&summary(&[Some(true), None, Some(true)])),
            ("compiled 2 units, now up to date".to_string(), true)
        );
        assert_eq!(
            describe(&summary(&[Some(true), Some(false), None])),
            ("1 of 2 units failed".to_string(), false)
        );
    }
}
