//! The compiler toolchain: the external collaborator that turns shader source
//! into bytecode.  The build only looks at whether a compile succeeded, its
//! diagnostics and its output bytes.
//!
//! A Toolchain is shared by the whole session; each compile task asks it for
//! its own Compiler, so compiler state is never shared across threads.

use crate::entry::TargetProfile;
use crate::settings::{OptimizationLevel, TargetFormat};
use anyhow::anyhow;
use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};

/// How a compile ended.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Termination {
    Success,
    Interrupted,
    Failure,
}

#[derive(Debug, Clone)]
pub struct CompileRequest<'a> {
    /// Where the source was read from.  Names the file in diagnostics and
    /// anchors quoted includes.
    pub source_path: &'a Path,
    /// The text to compile, as scanned this session.  Compilers must use it
    /// rather than reading `source_path` again.
    pub source: &'a str,
    pub entry_point: &'a str,
    pub profile: TargetProfile,
    pub optimization: OptimizationLevel,
    pub format: TargetFormat,
    pub include_dirs: &'a [PathBuf],
    /// Where the unit's artifact will be written.  Toolchains that need a
    /// scratch file keep it next to this path, which no other unit uses.
    pub output: &'a Path,
}

/// The result of one compile.
#[derive(Debug, Clone)]
pub struct CompileOutput {
    pub termination: Termination,
    /// Compiled bytecode; empty unless the compile succeeded.
    pub bytecode: Vec<u8>,
    /// Compiler messages, possibly empty.
    pub diagnostics: String,
}

pub trait Compiler {
    /// Compile one entry point.  Returns an Err() if compiling failed outside
    /// of the compiler itself, e.g. the compiler couldn't be started.
    fn compile(&mut self, request: &CompileRequest) -> anyhow::Result<CompileOutput>;
}

pub trait Toolchain: Sync {
    type Compiler: Compiler;

    /// Create a compiler for one task.
    fn instantiate(&self) -> anyhow::Result<Self::Compiler>;

    /// One-line description of a request, shown in verbose output.
    fn describe(&self, request: &CompileRequest) -> String {
        format!(
            "compile {} -E {} -T {}",
            request.source_path.display(),
            request.entry_point,
            request.profile
        )
    }
}

/// The DirectX shader compiler, run as a subprocess per compile.
#[derive(Debug, Clone)]
pub struct Dxc {
    program: PathBuf,
}

impl Dxc {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Dxc {
            program: program.into(),
        }
    }
}

fn scratch_path(output: &Path, suffix: &str) -> PathBuf {
    let mut name = output.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// Scratch copy of the source handed to the compiler.
fn input_path(output: &Path) -> PathBuf {
    scratch_path(output, ".src.hlsl")
}

/// Scratch file the compiler writes bytecode to.
fn bytecode_path(output: &Path) -> PathBuf {
    scratch_path(output, ".tmp")
}

/// Command-line arguments for a request, compiling the copy at `input` and
/// writing bytecode to `out`.
pub fn dxc_args(request: &CompileRequest, input: &Path, out: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = Vec::new();
    let mut arg = |a: &str| args.push(a.into());
    arg("-E");
    arg(request.entry_point);
    arg("-T");
    arg(&request.profile.to_string());
    // Warnings are errors; every declared resource is assumed bound.
    arg("-WX");
    arg("-all_resources_bound");
    arg("-Zpr");
    match request.optimization {
        OptimizationLevel::Debug => {
            arg("-Zi");
            arg("-Od");
        }
        OptimizationLevel::O0 => arg("-O0"),
        OptimizationLevel::O1 => arg("-O1"),
        OptimizationLevel::O2 => arg("-O2"),
        OptimizationLevel::O3 => arg("-O3"),
    }
    if request.format == TargetFormat::Spirv {
        arg("-spirv");
        arg("-fspv-target-env=vulkan1.3");
    }
    // The compiler sees a copy, so quoted includes need the original's dir.
    if let Some(dir) = request.source_path.parent() {
        args.push("-I".into());
        args.push(dir.into());
    }
    for dir in request.include_dirs {
        args.push("-I".into());
        args.push(dir.into());
    }
    args.push("-Fo".into());
    args.push(out.into());
    args.push(input.into());
    args
}

impl Toolchain for Dxc {
    type Compiler = DxcCompiler;

    fn instantiate(&self) -> anyhow::Result<DxcCompiler> {
        Ok(DxcCompiler {
            program: self.program.clone(),
        })
    }

    fn describe(&self, request: &CompileRequest) -> String {
        let mut line = self.program.to_string_lossy().into_owned();
        let output = request.output;
        for arg in dxc_args(request, &input_path(output), &bytecode_path(output)) {
            line.push(' ');
            line.push_str(&arg.to_string_lossy());
        }
        line
    }
}

pub struct DxcCompiler {
    program: PathBuf,
}

#[cfg(unix)]
fn termination(status: std::process::ExitStatus, output: &mut Vec<u8>) -> Termination {
    use std::os::unix::process::ExitStatusExt;
    if status.success() {
        return Termination::Success;
    }
    match status.signal() {
        Some(libc::SIGINT) => {
            let _ = write!(output, "interrupted");
            Termination::Interrupted
        }
        Some(sig) => {
            let _ = write!(output, "signal {}", sig);
            Termination::Failure
        }
        None => Termination::Failure,
    }
}

#[cfg(not(unix))]
fn termination(status: std::process::ExitStatus, output: &mut Vec<u8>) -> Termination {
    if status.success() {
        return Termination::Success;
    }
    if let Some(code) = status.code() {
        let _ = write!(output, "exit code {}", code);
    }
    Termination::Failure
}

impl Compiler for DxcCompiler {
    fn compile(&mut self, request: &CompileRequest) -> anyhow::Result<CompileOutput> {
        let input = input_path(request.output);
        let scratch = bytecode_path(request.output);
        if let Some(parent) = scratch.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&input, request.source)
            .map_err(|err| anyhow!("write {}: {}", input.display(), err))?;
        let run = std::process::Command::new(&self.program)
            .args(dxc_args(request, &input, &scratch))
            .output();
        let _ = std::fs::remove_file(&input);
        let mut cmd = run.map_err(|err| anyhow!("run {}: {}", self.program.display(), err))?;
        let mut output = Vec::new();
        output.append(&mut cmd.stdout);
        output.append(&mut cmd.stderr);
        let termination = termination(cmd.status, &mut output);

        let bytecode = if termination == Termination::Success {
            let bytes = std::fs::read(&scratch)
                .map_err(|err| anyhow!("read {}: {}", scratch.display(), err))?;
            std::fs::remove_file(&scratch)?;
            bytes
        } else {
            let _ = std::fs::remove_file(&scratch);
            Vec::new()
        };
        Ok(CompileOutput {
            termination,
            bytecode,
            diagnostics: String::from_utf8_lossy(&output).replace(
                &*input.to_string_lossy(),
                &request.source_path.to_string_lossy(),
            ),
        })
    }
}
