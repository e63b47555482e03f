//! Resource watcher of the Flip'M asset pipeline.
//!
//! The [`AssetWatcher`] watches the resource directory and runs the [`AssetPipeline`] for
//! every `.fbx` and `.ttf` file that is created or changed. The pipeline drives the gameplay
//! encoder and post-processes what it produces:
//!
//! * FBX: encode the scene description, pretty-print and convert it to JSON, encode the
//!   `.gpb` bundle, create a `.scene` file for boards and fix the `.material` file.
//! * TTF: encode the `.gpb` font bundle in the supported sizes.
//!
//! Files of other types are ignored. Removing a source file leaves its derived files in place.
pub mod asset_pipeline;
pub mod asset_watcher;
mod common;
pub mod config;
pub mod encoder;
pub mod material;
pub mod scene_lights;
mod settings;
pub mod xml_document;

pub use asset_pipeline::{AssetPipeline, PipelineError, SourceAsset, Stage};
pub use asset_watcher::{AssetWatcher, Event};
pub use common::*;
pub use encoder::{Encoder, ToolOutput, ToolRunner};
pub use settings::*;
