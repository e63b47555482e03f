use std::{
    fmt::{self, Formatter},
    fs,
    path::{Path, PathBuf},
    result,
    sync::Arc,
};

use flipm_shared::{
    indoc::formatdoc,
    log::{info, trace, warn},
    serde_json, thiserror,
};

use crate::{
    common::{extract_file_name_from_path, path_to_str, with_suffix},
    config,
    encoder::ToolRunner,
    material, scene_lights, xml_document, AssetKind, Error, Result, Settings,
};

/// Source files whose name contains this marker are game boards and get a `.scene` file.
pub const BOARD_MARKER: &str = "Board-";

/// Font sizes that are rasterized into the font bundle.
pub const FONT_SIZES: &str = "8,16,24,32,64,96";

/// One unit of work in a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    EncodeXml,
    FixXml,
    ConvertXmlToJson,
    EncodeGpb,
    CreateScene,
    FixMaterial,
    EncodeFont,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::EncodeXml => "FBX encode (xml)",
            Stage::FixXml => "XML fix",
            Stage::ConvertXmlToJson => "XML to JSON conversion",
            Stage::EncodeGpb => "FBX encode",
            Stage::CreateScene => "scene creation",
            Stage::FixMaterial => "material fix",
            Stage::EncodeFont => "TTF encode",
        };
        f.write_str(name)
    }
}

/// The first failure of a pipeline. The stages after it were not executed.
#[derive(Debug, thiserror::Error)]
#[error("{stage} failed for '{}': {source}", .path.display())]
pub struct PipelineError {
    pub stage: Stage,
    pub path: PathBuf,
    pub source: Error,
}

/// Source file of a pipeline and the paths of the files that are derived from it.
#[derive(Debug, Clone)]
pub struct SourceAsset {
    path: PathBuf,
    base: PathBuf,
}

impl SourceAsset {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let base = path.with_extension("");
        Self { path, base }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the source file without extension.
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Path of a derived file, e.g. `artifact("gpb")` for `res/box.fbx` is `res/box.gpb`.
    pub fn artifact(&self, extension: &str) -> PathBuf {
        with_suffix(&self.base, &format!(".{extension}"))
    }

    /// Returns `true` when the file name contains [`BOARD_MARKER`].
    pub fn is_board(&self) -> bool {
        extract_file_name_from_path(&self.path)
            .map(|file_name| file_name.contains(BOARD_MARKER))
            .unwrap_or(false)
    }

    fn stage<T>(&self, stage: Stage, run: impl FnOnce() -> Result<T>) -> result::Result<T, PipelineError> {
        trace!("Starting {stage} for '{}'", self.path.display());
        run().map_err(|source| PipelineError {
            stage,
            path: self.path.clone(),
            source,
        })
    }
}

/// Runs the stages that turn a source asset into the files the game loads.
///
/// ```text
/// FBX: EncodeXml -> FixXml -> ConvertXmlToJson -> EncodeGpb -> [CreateScene] -> FixMaterial
/// TTF: EncodeFont
/// ```
///
/// Every stage only runs when the previous one succeeded. `CreateScene` only runs for
/// boards (see [`SourceAsset::is_board`]).
pub struct AssetPipeline {
    settings: Settings,
    runner: Arc<dyn ToolRunner>,
}

impl AssetPipeline {
    pub fn new(settings: Settings, runner: Arc<dyn ToolRunner>) -> Self {
        Self { settings, runner }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Runs the pipeline for the given kind of asset and stops at the first failing stage.
    pub fn run(&self, kind: AssetKind, path: &Path) -> result::Result<(), PipelineError> {
        let asset = SourceAsset::new(path);
        match kind {
            AssetKind::Fbx => self.process_fbx(&asset),
            AssetKind::Ttf => self.process_ttf(&asset),
        }
    }

    fn process_fbx(&self, asset: &SourceAsset) -> result::Result<(), PipelineError> {
        asset.stage(Stage::EncodeXml, || self.encode_fbx(asset, true))?;
        asset.stage(Stage::FixXml, || fix_xml(asset))?;
        asset.stage(Stage::ConvertXmlToJson, || convert_xml_to_json(asset))?;
        asset.stage(Stage::EncodeGpb, || self.encode_fbx(asset, false))?;
        if asset.is_board() {
            asset.stage(Stage::CreateScene, || self.create_scene(asset))?;
        }
        asset.stage(Stage::FixMaterial, || self.fix_material(asset))?;
        Ok(())
    }

    fn process_ttf(&self, asset: &SourceAsset) -> result::Result<(), PipelineError> {
        asset.stage(Stage::EncodeFont, || self.encode_ttf(asset))
    }

    /// Encodes the model into the `.gpb` bundle. With `text` the encoder also writes the
    /// scene as `.xml` document.
    fn encode_fbx(&self, asset: &SourceAsset, text: bool) -> Result<()> {
        let source = path_to_str(asset.path())?.to_owned();
        let gpb = asset.artifact("gpb");
        let mut args = Vec::new();
        if text {
            args.push("-t".to_owned());
        }
        args.extend(["-m", "-g:auto", "-oa"].map(str::to_owned));
        args.push(source.clone());
        args.push(path_to_str(&gpb)?.to_owned());

        let label = if text {
            format!("FBX encode (xml) '{source}'")
        } else {
            format!("FBX encode '{source}'")
        };
        self.runner.run(&label, &args)?.check()?;
        info!("{label} done");
        Ok(())
    }

    fn encode_ttf(&self, asset: &SourceAsset) -> Result<()> {
        let source = path_to_str(asset.path())?.to_owned();
        let gpb = asset.artifact("gpb");
        let mut args = ["-p", "-f:b", "-s", FONT_SIZES].map(str::to_owned).to_vec();
        args.push(source.clone());
        args.push(path_to_str(&gpb)?.to_owned());

        let label = format!("TTF encode '{source}'");
        self.runner.run(&label, &args)?.check()?;
        info!("{label} done");
        Ok(())
    }

    /// Writes the scene descriptor for a board unless there already is one.
    fn create_scene(&self, asset: &SourceAsset) -> Result<()> {
        let scene_path = asset.artifact("scene");
        if scene_path.exists() {
            warn!("Scene '{}' already exists and is not overwritten", scene_path.display());
            return Ok(());
        }
        let gpb = self.settings.relative_to_resource_parent(&asset.artifact("gpb"));
        let scene = formatdoc! {"
            scene {{
              path = {gpb}
              ambientColor = 0, 0, 0
              physics {{
                gravity = 0.0, -9.8, 0.0
              }}
            }}"
        };
        fs::write(&scene_path, scene).map_err(Error::io("write", &scene_path))?;
        info!("Wrote scene '{}'", scene_path.display());
        Ok(())
    }

    /// Makes the paths in the generated material relative and adds the light defines.
    fn fix_material(&self, asset: &SourceAsset) -> Result<()> {
        let material_path = asset.artifact("material");
        if !material_path.exists() {
            trace!("No material '{}' to fix", material_path.display());
            return Ok(());
        }
        let content = fs::read_to_string(&material_path).map_err(Error::io("read", &material_path))?;
        let mut root = config::parse(&content).map_err(|err| Error::ParseFailure {
            path: material_path.clone(),
            message: err.to_string(),
        })?;

        let lights = scene_lights::count_lights_in_file(&asset.artifact("json"))?;
        let prefix = self.settings.resource_parent_prefix();
        if prefix.is_none() {
            warn!("Resource directory is directly below the file system root, paths in '{}' stay absolute", material_path.display());
        }
        material::fix_material(&mut root, prefix.as_deref(), &lights);

        fs::write(&material_path, root.serialize()).map_err(Error::io("write", &material_path))?;
        info!("Fixed material '{}'", material_path.display());
        Ok(())
    }
}

/// Reformats the `.xml` file the encoder wrote.
fn fix_xml(asset: &SourceAsset) -> Result<()> {
    let xml_path = asset.artifact("xml");
    if !xml_path.exists() {
        trace!("No XML '{}' to fix", xml_path.display());
        return Ok(());
    }
    let xml = fs::read_to_string(&xml_path).map_err(Error::io("read", &xml_path))?;
    let pretty = xml_document::pretty_print(&xml).map_err(|err| Error::ParseFailure {
        path: xml_path.clone(),
        message: err.to_string(),
    })?;
    fs::write(&xml_path, pretty).map_err(Error::io("write", &xml_path))?;
    info!("Fixed XML '{}'", xml_path.display());
    Ok(())
}

/// Converts the `.xml` file into a `.json` file that is used to inspect the scene.
fn convert_xml_to_json(asset: &SourceAsset) -> Result<()> {
    let xml_path = asset.artifact("xml");
    if !xml_path.exists() {
        trace!("No XML '{}' to convert", xml_path.display());
        return Ok(());
    }
    let json_path = asset.artifact("json");
    let xml = fs::read_to_string(&xml_path).map_err(Error::io("read", &xml_path))?;
    let document = xml_document::to_json(&xml).map_err(|err| Error::ParseFailure {
        path: xml_path.clone(),
        message: err.to_string(),
    })?;
    let json = serde_json::to_string_pretty(&document).map_err(|err| Error::ParseFailure {
        path: json_path.clone(),
        message: err.to_string(),
    })?;
    fs::write(&json_path, json).map_err(Error::io("write", &json_path))?;
    info!("Converted '{}' to '{}'", xml_path.display(), json_path.display());
    Ok(())
}
