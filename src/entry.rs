//! Entry-point extraction.  A top-level shader file carries several entry
//! points by naming convention: a two-letter stage code followed by `_MAIN`,
//! e.g. `VS_MAIN`, `PS_MAIN`.  Each recognized entry point becomes one
//! compilation unit.

use crate::diag::Diagnostic;
use crate::graph::NodeId;
use crate::scanner::line_of;
use crate::settings::{BuildSettings, OptimizationLevel, TargetFormat};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Stage {
    Vertex,
    Pixel,
    Compute,
    Geometry,
    Hull,
    Domain,
    Mesh,
}

impl Stage {
    pub const ALL: [Stage; 7] = [
        Stage::Vertex,
        Stage::Pixel,
        Stage::Compute,
        Stage::Geometry,
        Stage::Hull,
        Stage::Domain,
        Stage::Mesh,
    ];

    /// The two-letter code used in entry-point names and output file names.
    pub fn code(self) -> &'static str {
        match self {
            Stage::Vertex => "VS",
            Stage::Pixel => "PS",
            Stage::Compute => "CS",
            Stage::Geometry => "GS",
            Stage::Hull => "HS",
            Stage::Domain => "DS",
            Stage::Mesh => "MS",
        }
    }

    pub fn from_code(code: &str) -> Option<Stage> {
        Stage::ALL.iter().copied().find(|stage| stage.code() == code)
    }

    fn index(self) -> u32 {
        self as u32
    }
}

/// A shader model version, 6.0 through 6.8.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct ShaderModel {
    minor: u8,
}

impl ShaderModel {
    /// The model every profile table starts from.
    pub const BASE: ShaderModel = ShaderModel { minor: 0 };
    pub const LATEST: ShaderModel = ShaderModel { minor: 8 };

    pub const fn new(major: u8, minor: u8) -> Option<ShaderModel> {
        if major != 6 || minor > Self::LATEST.minor {
            return None;
        }
        Some(ShaderModel { minor })
    }

    pub fn minor(self) -> u8 {
        self.minor
    }

    pub fn all() -> impl Iterator<Item = ShaderModel> {
        (Self::BASE.minor..=Self::LATEST.minor).map(|minor| ShaderModel { minor })
    }
}

impl std::fmt::Display for ShaderModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "6.{}", self.minor)
    }
}

impl std::str::FromStr for ShaderModel {
    type Err = anyhow::Error;
    /// Accepts "6.6", "6_6" and "sm_6_6".
    fn from_str(s: &str) -> anyhow::Result<Self> {
        let trimmed = s.trim().trim_start_matches("sm_");
        let (major, minor) = match trimmed.split_once(|c: char| c == '.' || c == '_') {
            Some(parts) => parts,
            None => anyhow::bail!("invalid shader model {:?}, expected e.g. \"6.6\"", s),
        };
        let (major, minor) = match (major.parse::<u8>(), minor.parse::<u8>()) {
            (Ok(major), Ok(minor)) => (major, minor),
            _ => anyhow::bail!("invalid shader model {:?}, expected e.g. \"6.6\"", s),
        };
        match ShaderModel::new(major, minor) {
            Some(model) => Ok(model),
            None => anyhow::bail!(
                "unsupported shader model {:?}, expected {} through {}",
                s,
                ShaderModel::BASE,
                ShaderModel::LATEST
            ),
        }
    }
}

/// Number of profiles each stage owns in the profile table, one per model.
const PROFILES_PER_STAGE: u32 = (ShaderModel::LATEST.minor - ShaderModel::BASE.minor) as u32 + 1;

/// A (stage, shader model) pair the compiler targets, e.g. `ps_6_6`.
///
/// Profiles are numbered like the toolchain's profile table: each stage owns
/// a contiguous run starting at its base profile (the stage at the base
/// shader model), so a profile is its stage's base offset by how far the
/// configured model is past the base model.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct TargetProfile(u32);

impl TargetProfile {
    pub fn base(stage: Stage) -> TargetProfile {
        TargetProfile(stage.index() * PROFILES_PER_STAGE)
    }

    pub fn new(stage: Stage, model: ShaderModel) -> TargetProfile {
        let offset = (model.minor - ShaderModel::BASE.minor) as u32;
        TargetProfile(Self::base(stage).0 + offset)
    }

    pub fn ordinal(self) -> u32 {
        self.0
    }

    pub fn stage(self) -> Stage {
        Stage::ALL[(self.0 / PROFILES_PER_STAGE) as usize]
    }

    pub fn model(self) -> ShaderModel {
        ShaderModel {
            minor: ShaderModel::BASE.minor + (self.0 % PROFILES_PER_STAGE) as u8,
        }
    }
}

impl std::fmt::Display for TargetProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}_6_{}",
            self.stage().code().to_ascii_lowercase(),
            self.model().minor
        )
    }
}

/// A word shaped like an entry-point marker, whether or not its stage code is
/// known.
#[derive(Debug, Clone, PartialEq)]
pub struct Marker<'a> {
    pub name: &'a str,
    pub code: &'a str,
    pub ofs: usize,
}

impl<'a> Marker<'a> {
    pub fn stage(&self) -> Option<Stage> {
        Stage::from_code(self.code)
    }
}

fn marker_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b([A-Z]{2})_MAIN\b").unwrap_or_else(|err| panic!("marker regex: {}", err))
    })
}

/// All marker-shaped words in `text`, in order.
pub fn markers(text: &str) -> impl Iterator<Item = Marker<'_>> {
    marker_regex().captures_iter(text).filter_map(|caps| {
        let name = caps.get(0)?;
        let code = caps.get(1)?;
        Some(Marker {
            name: name.as_str(),
            code: code.as_str(),
            ofs: name.start(),
        })
    })
}

/// One (source file, entry point) pair, compiled independently.
#[derive(Debug, Clone, PartialEq)]
pub struct CompilationUnit {
    pub source: PathBuf,
    /// The source file's node in the dependency graph.
    pub root: NodeId,
    pub entry_point: String,
    pub stage: Stage,
    pub profile: TargetProfile,
    pub optimization: OptimizationLevel,
    pub format: TargetFormat,
    pub output: PathBuf,
}

impl CompilationUnit {
    /// Short display name, e.g. "lighting.hlsl:PS_MAIN".
    pub fn name(&self) -> String {
        let file = self
            .source
            .file_name()
            .map(|f| f.to_string_lossy())
            .unwrap_or_else(|| self.source.to_string_lossy());
        format!("{}:{}", file, self.entry_point)
    }
}

/// Output path for a stage of a source file: the source file name, the stage
/// code and the format extension, in the output directory.
pub fn output_path(settings: &BuildSettings, source: &Path, stage: Stage) -> PathBuf {
    let file = source
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_default();
    settings.output_dir.join(format!(
        "{}.{}.{}",
        file,
        stage.code(),
        settings.target.extension()
    ))
}

/// Find the compilation units of one top-level file.  Markers with an
/// unknown stage code produce an "invalid shader type" diagnostic instead of
/// a unit.  Each entry point yields one unit however often it is mentioned.
pub fn extract(
    root: NodeId,
    path: &Path,
    text: &str,
    settings: &BuildSettings,
) -> (Vec<CompilationUnit>, Vec<Diagnostic>) {
    let mut units: Vec<CompilationUnit> = Vec::new();
    let mut diagnostics = Vec::new();
    let mut invalid: Vec<&str> = Vec::new();
    for marker in markers(text) {
        let stage = match marker.stage() {
            Some(stage) => stage,
            None => {
                if !invalid.contains(&marker.name) {
                    invalid.push(marker.name);
                    diagnostics.push(Diagnostic::new(
                        path,
                        Some(line_of(text, marker.ofs)),
                        format!("invalid shader type {:?}", marker.name),
                    ));
                }
                continue;
            }
        };
        if units.iter().any(|u| u.entry_point == marker.name) {
            continue;
        }
        units.push(CompilationUnit {
            source: path.to_path_buf(),
            root,
            entry_point: marker.name.to_string(),
            stage,
            profile: TargetProfile::new(stage, settings.shader_model),
            optimization: settings.optimization,
            format: settings.target,
            output: output_path(settings, path, stage),
        });
    }
    (units, diagnostics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn settings() -> BuildSettings {
        let mut settings = BuildSettings::new("/s", "/out");
        settings.shader_model = ShaderModel::new(6, 6).unwrap();
        settings
    }

    fn root() -> NodeId {
        NodeId::from(0)
    }

    #[test]
    fn stage_codes() {
        for stage in Stage::ALL {
            assert_eq!(Stage::from_code(stage.code()), Some(stage));
        }
        assert_eq!(Stage::from_code("XX"), None);
        assert_eq!(Stage::from_code("vs"), None);
    }

    #[test]
    fn profiles() {
        let sm66 = ShaderModel::new(6, 6).unwrap();
        assert_eq!(TargetProfile::new(Stage::Pixel, sm66).to_string(), "ps_6_6");
        assert_eq!(TargetProfile::new(Stage::Hull, sm66).to_string(), "hs_6_6");
        assert_eq!(
            TargetProfile::new(Stage::Vertex, ShaderModel::BASE).to_string(),
            "vs_6_0"
        );
        assert_eq!(
            TargetProfile::new(Stage::Mesh, ShaderModel::LATEST).to_string(),
            "ms_6_8"
        );
    }

    #[test]
    fn parse_models() {
        assert_eq!("6.6".parse::<ShaderModel>().ok(), ShaderModel::new(6, 6));
        assert_eq!("sm_6_2".parse::<ShaderModel>().ok(), ShaderModel::new(6, 2));
        assert!("6.9".parse::<ShaderModel>().is_err());
        assert!("5.1".parse::<ShaderModel>().is_err());
        assert!("six".parse::<ShaderModel>().is_err());
    }

    #[test]
    fn one_invalid_one_valid() {
        let text = "float4 XX_MAIN() {}\nfloat4 PS_MAIN() : SV_Target { return 0; }\n";
        let (units, diags) = extract(root(), Path::new("/s/a.hlsl"), text, &settings());
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].entry_point, "PS_MAIN");
        assert_eq!(units[0].stage, Stage::Pixel);
        assert_eq!(units[0].profile.to_string(), "ps_6_6");
        assert_eq!(units[0].output, Path::new("/out/a.hlsl.PS.spv"));
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].line, Some(1));
        assert!(diags[0].message.contains("invalid shader type"));
        assert!(diags[0].message.contains("XX_MAIN"));
    }

    #[test]
    fn graphics_file() {
        let text = "
struct VSOut { float4 pos : SV_Position; };
VSOut VS_MAIN(uint id : SV_VertexID) { VSOut o; return o; }
float4 PS_MAIN(VSOut i) : SV_Target { return 1; }
";
        let (units, diags) = extract(root(), Path::new("/s/geometry.gfx.hlsl"), text, &settings());
        assert!(diags.is_empty());
        let names: Vec<&str> = units.iter().map(|u| u.entry_point.as_str()).collect();
        assert_eq!(names, vec!["VS_MAIN", "PS_MAIN"]);
        assert_eq!(units[0].name(), "geometry.gfx.hlsl:VS_MAIN");
    }

    #[test]
    fn repeated_and_lookalike_markers() {
        let text = "
// entry: CS_MAIN
[numthreads(8, 8, 1)] void CS_MAIN(uint3 id : SV_DispatchThreadID) {}
void CS_MAIN_helper() {}
void XCS_MAIN() {}
void cs_main() {}
";
        let (units, diags) = extract(root(), Path::new("/s/c.hlsl"), text, &settings());
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].stage, Stage::Compute);
        assert!(diags.is_empty());
    }

    #[test]
    fn no_markers() {
        let (units, diags) = extract(root(), Path::new("/s/h.hlsli"), "float3 f();", &settings());
        assert!(units.is_empty());
        assert!(diags.is_empty());
    }

    fn any_stage() -> impl Strategy<Value = Stage> {
        (0..Stage::ALL.len()).prop_map(|i| Stage::ALL[i])
    }

    fn any_model() -> impl Strategy<Value = ShaderModel> {
        (ShaderModel::BASE.minor..=ShaderModel::LATEST.minor)
            .prop_map(|minor| ShaderModel { minor })
    }

    proptest! {
        #[test]
        fn profile_arithmetic(stage in any_stage(), model in any_model()) {
            let profile = TargetProfile::new(stage, model);
            prop_assert_eq!(
                profile.ordinal(),
                TargetProfile::base(stage).ordinal()
                    + (model.minor() - ShaderModel::BASE.minor()) as u32
            );
            prop_assert_eq!(profile.stage(), stage);
            prop_assert_eq!(profile.model(), model);
            prop_assert_eq!(
                profile.to_string(),
                format!("{}_6_{}", stage.code().to_lowercase(), model.minor())
            );
        }

        #[test]
        fn profiles_distinct(a in any_stage(), b in any_stage(), m in any_model(), n in any_model()) {
            let same = TargetProfile::new(a, m) == TargetProfile::new(b, n);
            prop_assert_eq!(same, a == b && m == n);
        }

        #[test]
        fn extraction_is_total(text in "\\PC{0,200}") {
            let (units, diags) = extract(root(), Path::new("/s/f.hlsl"), &text, &settings());
            prop_assert!(units.len() <= Stage::ALL.len());
            for d in diags {
                prop_assert!(d.line.is_some());
            }
        }
    }
}
