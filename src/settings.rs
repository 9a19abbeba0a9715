//! Build settings, read from a TOML manifest:
//!
//! ```toml
//! input_dir = "assets/hlsl"
//! output_dir = "assets/hlsl/generated"
//! shaders = ["geometry.gfx.hlsl", "shading.comp.hlsl"]
//! optimization = "o3"        # debug, o0, o1, o2, o3
//! shader_model = "6.6"
//! target = "spirv"           # spirv, dxil
//! include_dirs = ["assets/hlsl/include"]
//! ```
//!
//! Relative paths are relative to the manifest's directory.

use crate::entry::ShaderModel;
use crate::hash::{Fingerprint, Hash};
use anyhow::{anyhow, Context};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Copy, Clone, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizationLevel {
    /// Unoptimized, with debug info.
    Debug,
    O0,
    O1,
    O2,
    O3,
}

impl OptimizationLevel {
    pub fn name(self) -> &'static str {
        match self {
            OptimizationLevel::Debug => "debug",
            OptimizationLevel::O0 => "o0",
            OptimizationLevel::O1 => "o1",
            OptimizationLevel::O2 => "o2",
            OptimizationLevel::O3 => "o3",
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetFormat {
    Spirv,
    Dxil,
}

impl TargetFormat {
    pub fn name(self) -> &'static str {
        match self {
            TargetFormat::Spirv => "spirv",
            TargetFormat::Dxil => "dxil",
        }
    }

    /// Output file extension.
    pub fn extension(self) -> &'static str {
        match self {
            TargetFormat::Spirv => "spv",
            TargetFormat::Dxil => "dxil",
        }
    }
}

/// The manifest as written on disk.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct Manifest {
    input_dir: PathBuf,
    output_dir: PathBuf,
    cache_dir: Option<PathBuf>,
    #[serde(default)]
    shaders: Vec<PathBuf>,
    optimization: Option<OptimizationLevel>,
    shader_model: Option<String>,
    target: Option<TargetFormat>,
    include_dirs: Option<Vec<PathBuf>>,
    compiler: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct BuildSettings {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Where the staleness cache lives between sessions.
    pub cache_dir: PathBuf,
    /// Top-level shader files, relative to input_dir.
    pub shaders: Vec<PathBuf>,
    pub optimization: OptimizationLevel,
    pub shader_model: ShaderModel,
    pub target: TargetFormat,
    /// Include search path, handed to the compiler and used for `<...>`
    /// includes.
    pub include_dirs: Vec<PathBuf>,
    /// The compiler executable.
    pub compiler: PathBuf,
}

pub const DEFAULT_SHADER_MODEL: ShaderModel = match ShaderModel::new(6, 6) {
    Some(model) => model,
    None => ShaderModel::LATEST,
};

impl BuildSettings {
    /// Settings with defaults for everything but the two directories.
    pub fn new(input_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        let input_dir = input_dir.into();
        let output_dir = output_dir.into();
        BuildSettings {
            cache_dir: output_dir.join(".hsb_cache"),
            include_dirs: vec![input_dir.join("include")],
            input_dir,
            output_dir,
            shaders: Vec::new(),
            optimization: OptimizationLevel::O3,
            shader_model: DEFAULT_SHADER_MODEL,
            target: TargetFormat::Spirv,
            compiler: PathBuf::from("dxc"),
        }
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|err| anyhow!("read {}: {}", path.display(), err))?;
        let base = path.parent().unwrap_or_else(|| Path::new(""));
        Self::parse(&text, base).with_context(|| format!("load {}", path.display()))
    }

    /// Parse manifest text, resolving relative paths against `base`.
    pub fn parse(text: &str, base: &Path) -> anyhow::Result<Self> {
        let manifest: Manifest = toml::from_str(text)?;
        let mut settings = BuildSettings::new(
            base.join(manifest.input_dir),
            base.join(manifest.output_dir),
        );
        settings.shaders = manifest.shaders;
        if let Some(dir) = manifest.cache_dir {
            settings.cache_dir = base.join(dir);
        }
        if let Some(level) = manifest.optimization {
            settings.optimization = level;
        }
        if let Some(model) = manifest.shader_model {
            settings.shader_model = model.parse()?;
        }
        if let Some(target) = manifest.target {
            settings.target = target;
        }
        if let Some(dirs) = manifest.include_dirs {
            settings.include_dirs = dirs.into_iter().map(|d| base.join(d)).collect();
        }
        if let Some(compiler) = manifest.compiler {
            // A bare program name is looked up on PATH, not next to the manifest.
            settings.compiler = if compiler.components().count() > 1 {
                base.join(compiler)
            } else {
                compiler
            };
        }
        Ok(settings)
    }

    /// Paths of the top-level shader files.
    pub fn shader_paths(&self) -> impl Iterator<Item = PathBuf> + '_ {
        self.shaders.iter().map(|s| self.input_dir.join(s))
    }

    /// Hash of every setting that affects compiler output.  Outputs built
    /// under a different fingerprint are out of date.
    pub fn fingerprint(&self) -> Hash {
        let mut fp = Fingerprint::new();
        fp.write_str(self.optimization.name());
        fp.write_str(&self.shader_model.to_string());
        fp.write_str(self.target.name());
        fp.write_str(&self.output_dir.to_string_lossy());
        for dir in &self.include_dirs {
            fp.write_str(&dir.to_string_lossy());
        }
        fp.write_str(&self.compiler.to_string_lossy());
        fp.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() -> anyhow::Result<()> {
        let settings = BuildSettings::parse(
            "input_dir = \"hlsl\"\noutput_dir = \"out\"\nshaders = [\"a.hlsl\"]\n",
            Path::new("/proj"),
        )?;
        assert_eq!(settings.input_dir, Path::new("/proj/hlsl"));
        assert_eq!(settings.cache_dir, Path::new("/proj/out/.hsb_cache"));
        assert_eq!(settings.include_dirs, vec![PathBuf::from("/proj/hlsl/include")]);
        assert_eq!(settings.optimization, OptimizationLevel::O3);
        assert_eq!(settings.shader_model, DEFAULT_SHADER_MODEL);
        assert_eq!(settings.target, TargetFormat::Spirv);
        assert_eq!(settings.compiler, Path::new("dxc"));
        assert_eq!(
            settings.shader_paths().collect::<Vec<_>>(),
            vec![PathBuf::from("/proj/hlsl/a.hlsl")]
        );
        Ok(())
    }

    #[test]
    fn everything() -> anyhow::Result<()> {
        let settings = BuildSettings::parse(
            r#"
input_dir = "hlsl"
output_dir = "gen"
cache_dir = "/tmp/hsb"
shaders = ["a.hlsl", "b.hlsl"]
optimization = "debug"
shader_model = "6.2"
target = "dxil"
include_dirs = ["inc", "/sdk/inc"]
compiler = "tools/dxc"
"#,
            Path::new("/proj"),
        )?;
        assert_eq!(settings.cache_dir, Path::new("/tmp/hsb"));
        assert_eq!(settings.optimization, OptimizationLevel::Debug);
        assert_eq!(settings.shader_model.to_string(), "6.2");
        assert_eq!(settings.target, TargetFormat::Dxil);
        assert_eq!(
            settings.include_dirs,
            vec![PathBuf::from("/proj/inc"), PathBuf::from("/sdk/inc")]
        );
        assert_eq!(settings.compiler, Path::new("/proj/tools/dxc"));
        Ok(())
    }

    #[test]
    fn rejects_bad_input() {
        let base = Path::new("/proj");
        assert!(BuildSettings::parse("output_dir = \"o\"", base).is_err());
        assert!(BuildSettings::parse(
            "input_dir = \"i\"\noutput_dir = \"o\"\nshader_model = \"7.0\"",
            base
        )
        .is_err());
        assert!(BuildSettings::parse(
            "input_dir = \"i\"\noutput_dir = \"o\"\ntarget = \"metal\"",
            base
        )
        .is_err());
        assert!(BuildSettings::parse("input_dir = \"i\"\noutput_dir = \"o\"\nbogus = 1", base).is_err());
    }

    #[test]
    fn fingerprint_tracks_output_settings() {
        let a = BuildSettings::new("/s", "/o");
        let mut b = a.clone();
        assert_eq!(a.fingerprint(), b.fingerprint());
        b.optimization = OptimizationLevel::Debug;
        assert_ne!(a.fingerprint(), b.fingerprint());
        let mut c = a.clone();
        c.shaders.push(PathBuf::from("new.hlsl"));
        assert_eq!(a.fingerprint(), c.fingerprint());
    }
}
