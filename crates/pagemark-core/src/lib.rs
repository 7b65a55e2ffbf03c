//! Pagemark Core Library
//!
//! Annotation canvas engine for paginated raster documents: freehand strokes
//! and placed images per page, kept in a fixed-DPI canonical space and
//! persisted through an asynchronous remote store.

pub mod config;
pub mod engine;
pub mod error;
pub mod geometry;
pub mod objects;
pub mod paint;
pub mod remote;
pub mod strokes;
pub mod sync;

pub use config::{ConfigError, EngineConfig, EraserStyle};
pub use engine::{Brush, Engine, Notice, PageState, Tool};
pub use error::{EngineError, EngineResult};
pub use geometry::{PageFit, rotated_local_offset};
pub use objects::{DeleteConfirmation, ImageId, ImageTransform, Interaction, ObjectManager, PlacedImage};
pub use paint::{DisplayList, PaintItem};
pub use remote::{DocumentId, MemoryRemote, RemoteError, RemoteOp, RemoteStore};
pub use strokes::{Stroke, StrokeColor, StrokeId, StrokeStore, ToolKind};
pub use sync::{Synchronizer, UndoStack};
