//! Authoring core for step-by-step screenshot guides.
//!
//! A [`model::Project`] is an ordered list of captured steps, each holding the
//! original screenshot plus a stack of annotation layers (click marker, blur,
//! zoom inset, arrow, icon, info box, spotlight, free text). Layer geometry is
//! always stored in full-image coordinates; the optional crop viewport is a
//! rendering-time transform handled by [`geom`].
//!
//! Rendering is split in two over one shared paint plan ([`paint`]): the
//! interactive surface ([`surface`]) draws editing chrome on a cropped canvas,
//! and the flatten path ([`render::raster`]) bakes final images for export.

#![forbid(unsafe_code)]

pub mod blur;
pub mod capture;
pub mod color;
pub mod error;
pub mod export;
pub mod geom;
pub mod model;
pub mod paint;
pub mod project_io;
pub mod render;
pub mod surface;
pub mod text;
pub mod undo;

pub use color::{FontSpec, Rgba8};
pub use error::{StepdocError, StepdocResult};
pub use geom::{ActiveCrop, CropViewport, StoredPoint, StoredRect};
pub use model::{Layer, LayerBody, LayerId, LayerTarget, MarkerAppearance, Project, Step};
pub use render::raster::{FlattenParams, flatten_step};
pub use render::scene::SceneRenderer;
pub use undo::UndoStack;
