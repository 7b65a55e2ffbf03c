//! In-memory remote store.
//!
//! Behaves like the document server: page bounds are validated, strokes list
//! in creation order, images can be limited by an upload quota, and exports
//! convert canonical coordinates to PDF points. Latency and one-shot failures
//! can be injected for tests.

use super::{BoxFuture, DocumentId, RemoteError, RemoteOp, RemoteResult, RemoteStore};
use crate::config::DEFAULT_DPI;
use crate::geometry::{canonical_to_points, points_to_canonical};
use crate::objects::{ImageFormat, ImageId, ImageTransform, NewImage, PlacedImage};
use crate::strokes::{MIN_STROKE_POINTS, Stroke, StrokeColor, StrokeId, ToolKind};
use base64::{Engine, engine::general_purpose::STANDARD};
use kurbo::Size;
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

struct DocumentRecord {
    page_count: u32,
    /// Page size in PDF points.
    page_size: Size,
    raster_overrides: HashMap<u32, Vec<u8>>,
}

struct StoredImage {
    document: DocumentId,
    record: PlacedImage,
    format: ImageFormat,
    bytes: Vec<u8>,
}

#[derive(Default)]
struct State {
    documents: BTreeMap<DocumentId, DocumentRecord>,
    strokes: Vec<(DocumentId, Stroke)>,
    images: BTreeMap<ImageId, StoredImage>,
    next_document: u64,
    next_stroke: u64,
    next_image: u64,
    image_quota: Option<u32>,
}

impl State {
    fn check_page(&self, document: DocumentId, page: u32) -> RemoteResult<&DocumentRecord> {
        let record = self
            .documents
            .get(&document)
            .ok_or_else(|| RemoteError::NotFound(document.to_string()))?;
        if page < 1 || page > record.page_count {
            return Err(RemoteError::Rejected(format!(
                "Invalid page number. Must be 1~{}",
                record.page_count
            )));
        }
        Ok(record)
    }
}

/// In-memory [`RemoteStore`] for tests and the replay tool.
pub struct MemoryRemote {
    state: RefCell<State>,
    dpi: u32,
    latency: Cell<Option<Duration>>,
    failures: RefCell<HashMap<RemoteOp, RemoteError>>,
    calls: RefCell<HashMap<RemoteOp, usize>>,
}

impl Default for MemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRemote {
    /// Create an empty store whose canonical space is at the default DPI.
    pub fn new() -> Self {
        Self::with_dpi(DEFAULT_DPI)
    }

    /// Create an empty store; `dpi` is used to convert canonical coordinates
    /// on export.
    pub fn with_dpi(dpi: u32) -> Self {
        Self {
            state: RefCell::new(State::default()),
            dpi,
            latency: Cell::new(None),
            failures: RefCell::new(HashMap::new()),
            calls: RefCell::new(HashMap::new()),
        }
    }

    /// Register a document with `page_count` pages of `page_size` points.
    pub fn add_document(&self, page_count: u32, page_size: Size) -> DocumentId {
        let mut state = self.state.borrow_mut();
        state.next_document += 1;
        let id = DocumentId(state.next_document);
        state.documents.insert(
            id,
            DocumentRecord {
                page_count,
                page_size,
                raster_overrides: HashMap::new(),
            },
        );
        id
    }

    /// Delay every call by `latency`. `None` still yields once per call.
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.latency.set(latency);
    }

    /// Make the next call of kind `op` fail with `error`.
    pub fn fail_next(&self, op: RemoteOp, error: RemoteError) {
        self.failures.borrow_mut().insert(op, error);
    }

    /// Number of calls of kind `op` made so far.
    pub fn calls(&self, op: RemoteOp) -> usize {
        self.calls.borrow().get(&op).copied().unwrap_or(0)
    }

    /// Limit how many more images may be created. `None` is unlimited.
    pub fn set_image_quota(&self, quota: Option<u32>) {
        self.state.borrow_mut().image_quota = quota;
    }

    /// Serve `bytes` as the raster of `page` instead of a blank page.
    pub fn set_raster(&self, document: DocumentId, page: u32, bytes: Vec<u8>) {
        if let Some(record) = self.state.borrow_mut().documents.get_mut(&document) {
            record.raster_overrides.insert(page, bytes);
        }
    }

    /// Persisted strokes of a document, in creation order.
    pub fn strokes(&self, document: DocumentId) -> Vec<Stroke> {
        self.state
            .borrow()
            .strokes
            .iter()
            .filter(|(doc, _)| *doc == document)
            .map(|(_, stroke)| stroke.clone())
            .collect()
    }

    /// Persisted images of a document.
    pub fn images(&self, document: DocumentId) -> Vec<PlacedImage> {
        self.state
            .borrow()
            .images
            .values()
            .filter(|image| image.document == document)
            .map(|image| image.record.clone())
            .collect()
    }

    /// Count the call and capture the latency in effect when it was made.
    fn begin_call(&self, op: RemoteOp) -> Option<Duration> {
        *self.calls.borrow_mut().entry(op).or_insert(0) += 1;
        self.latency.get()
    }

    async fn settle(&self, op: RemoteOp, latency: Option<Duration>) -> RemoteResult<()> {
        match latency {
            Some(latency) => tokio::time::sleep(latency).await,
            None => tokio::task::yield_now().await,
        }
        match self.failures.borrow_mut().remove(&op) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn export(&self, document: DocumentId) -> RemoteResult<ExportedDocument> {
        let state = self.state.borrow();
        let record = state
            .documents
            .get(&document)
            .ok_or_else(|| RemoteError::NotFound(document.to_string()))?;
        let dpi = self.dpi;
        let pt = |value: f64| canonical_to_points(value, dpi);

        let pages = (1..=record.page_count)
            .map(|page| {
                let images = state
                    .images
                    .values()
                    .filter(|image| image.document == document && image.record.page == page)
                    .map(|image| {
                        let t = &image.record.transform;
                        ExportedImage {
                            id: image.record.id,
                            x: pt(t.position.x),
                            y: pt(t.position.y),
                            width: pt(t.size.width),
                            height: pt(t.size.height),
                            rotation: t.rotation,
                            format: image.format,
                            data: STANDARD.encode(&image.bytes),
                        }
                    })
                    .collect();
                let strokes = state
                    .strokes
                    .iter()
                    .filter(|(doc, stroke)| *doc == document && stroke.page == page)
                    .filter_map(|(_, stroke)| {
                        let id = stroke.id?;
                        let (color, opacity) = match stroke.tool {
                            ToolKind::Eraser => (StrokeColor::white(), 1.0),
                            _ => (stroke.color, stroke.opacity),
                        };
                        Some(ExportedStroke {
                            id,
                            tool: stroke.tool,
                            color,
                            width: pt(stroke.width),
                            opacity,
                            points: stroke.points.iter().map(|p| [pt(p.x), pt(p.y)]).collect(),
                        })
                    })
                    .collect();
                ExportedPage {
                    page,
                    width: record.page_size.width,
                    height: record.page_size.height,
                    images,
                    strokes,
                }
            })
            .collect();

        Ok(ExportedDocument { document, pages })
    }
}

/// Export artifact produced by [`MemoryRemote`]. Lengths are PDF points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportedDocument {
    pub document: DocumentId,
    pub pages: Vec<ExportedPage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportedPage {
    pub page: u32,
    pub width: f64,
    pub height: f64,
    /// Drawn first, under the strokes.
    pub images: Vec<ExportedImage>,
    pub strokes: Vec<ExportedStroke>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportedImage {
    pub id: ImageId,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub rotation: f64,
    pub format: ImageFormat,
    /// Base64-encoded image bytes.
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportedStroke {
    pub id: StrokeId,
    pub tool: ToolKind,
    pub color: StrokeColor,
    pub width: f64,
    pub opacity: f64,
    pub points: Vec<[f64; 2]>,
}

fn blank_png(width: u32, height: u32) -> RemoteResult<Vec<u8>> {
    let encode_error = |e: png::EncodingError| RemoteError::Serialization(e.to_string());
    let mut bytes = Vec::new();
    let mut encoder = png::Encoder::new(&mut bytes, width, height);
    encoder.set_color(png::ColorType::Grayscale);
    encoder.set_depth(png::BitDepth::Eight);
    let mut writer = encoder.write_header().map_err(encode_error)?;
    let pixels = vec![255u8; width as usize * height as usize];
    writer.write_image_data(&pixels).map_err(encode_error)?;
    writer.finish().map_err(encode_error)?;
    Ok(bytes)
}

impl RemoteStore for MemoryRemote {
    fn create_stroke(&self, document: DocumentId, stroke: &Stroke) -> BoxFuture<'_, RemoteResult<StrokeId>> {
        let latency = self.begin_call(RemoteOp::CreateStroke);
        let stroke = stroke.clone();
        Box::pin(async move {
            self.settle(RemoteOp::CreateStroke, latency).await?;
            let mut state = self.state.borrow_mut();
            state.check_page(document, stroke.page)?;
            if stroke.points.len() < MIN_STROKE_POINTS {
                return Err(RemoteError::Rejected("Stroke needs at least two points".into()));
            }
            if stroke.width <= 0.0 {
                return Err(RemoteError::Rejected("Stroke width must be positive".into()));
            }
            state.next_stroke += 1;
            let id = StrokeId(state.next_stroke);
            state.strokes.push((document, stroke.with_id(id)));
            Ok(id)
        })
    }

    fn list_strokes(&self, document: DocumentId, page: u32) -> BoxFuture<'_, RemoteResult<Vec<Stroke>>> {
        let latency = self.begin_call(RemoteOp::ListStrokes);
        Box::pin(async move {
            self.settle(RemoteOp::ListStrokes, latency).await?;
            let state = self.state.borrow();
            state.check_page(document, page)?;
            Ok(state
                .strokes
                .iter()
                .filter(|(doc, stroke)| *doc == document && stroke.page == page)
                .map(|(_, stroke)| stroke.clone())
                .collect())
        })
    }

    fn delete_stroke(&self, id: StrokeId) -> BoxFuture<'_, RemoteResult<()>> {
        let latency = self.begin_call(RemoteOp::DeleteStroke);
        Box::pin(async move {
            self.settle(RemoteOp::DeleteStroke, latency).await?;
            let mut state = self.state.borrow_mut();
            let index = state
                .strokes
                .iter()
                .position(|(_, stroke)| stroke.id == Some(id))
                .ok_or_else(|| RemoteError::NotFound(id.to_string()))?;
            state.strokes.remove(index);
            Ok(())
        })
    }

    fn clear_page_strokes(&self, document: DocumentId, page: u32) -> BoxFuture<'_, RemoteResult<()>> {
        let latency = self.begin_call(RemoteOp::ClearStrokes);
        Box::pin(async move {
            self.settle(RemoteOp::ClearStrokes, latency).await?;
            let mut state = self.state.borrow_mut();
            state.check_page(document, page)?;
            state
                .strokes
                .retain(|(doc, stroke)| !(*doc == document && stroke.page == page));
            Ok(())
        })
    }

    fn list_page_images(&self, document: DocumentId, page: u32) -> BoxFuture<'_, RemoteResult<Vec<PlacedImage>>> {
        let latency = self.begin_call(RemoteOp::ListImages);
        Box::pin(async move {
            self.settle(RemoteOp::ListImages, latency).await?;
            let state = self.state.borrow();
            state.check_page(document, page)?;
            Ok(state
                .images
                .values()
                .filter(|image| image.document == document && image.record.page == page)
                .map(|image| image.record.clone())
                .collect())
        })
    }

    fn fetch_image_bytes(&self, id: ImageId) -> BoxFuture<'_, RemoteResult<Vec<u8>>> {
        let latency = self.begin_call(RemoteOp::FetchImage);
        Box::pin(async move {
            self.settle(RemoteOp::FetchImage, latency).await?;
            self.state
                .borrow()
                .images
                .get(&id)
                .map(|image| image.bytes.clone())
                .ok_or_else(|| RemoteError::NotFound(id.to_string()))
        })
    }

    fn create_image(&self, document: DocumentId, image: &NewImage) -> BoxFuture<'_, RemoteResult<ImageId>> {
        let latency = self.begin_call(RemoteOp::CreateImage);
        let image = image.clone();
        Box::pin(async move {
            self.settle(RemoteOp::CreateImage, latency).await?;
            let mut state = self.state.borrow_mut();
            state.check_page(document, image.page)?;
            if let Some(quota) = state.image_quota {
                if quota == 0 {
                    return Err(RemoteError::Rejected("Insufficient quota".into()));
                }
                state.image_quota = Some(quota - 1);
            }
            state.next_image += 1;
            let id = ImageId(state.next_image);
            state.images.insert(
                id,
                StoredImage {
                    document,
                    record: PlacedImage::new(id, image.page, image.transform),
                    format: image.format,
                    bytes: image.bytes,
                },
            );
            Ok(id)
        })
    }

    fn update_image_transform(&self, id: ImageId, transform: ImageTransform) -> BoxFuture<'_, RemoteResult<()>> {
        let latency = self.begin_call(RemoteOp::UpdateImage);
        Box::pin(async move {
            self.settle(RemoteOp::UpdateImage, latency).await?;
            let mut state = self.state.borrow_mut();
            let image = state
                .images
                .get_mut(&id)
                .ok_or_else(|| RemoteError::NotFound(id.to_string()))?;
            image.record.transform = transform;
            Ok(())
        })
    }

    fn delete_image(&self, id: ImageId) -> BoxFuture<'_, RemoteResult<()>> {
        let latency = self.begin_call(RemoteOp::DeleteImage);
        Box::pin(async move {
            self.settle(RemoteOp::DeleteImage, latency).await?;
            self.state
                .borrow_mut()
                .images
                .remove(&id)
                .map(|_| ())
                .ok_or_else(|| RemoteError::NotFound(id.to_string()))
        })
    }

    fn fetch_page_raster(&self, document: DocumentId, page: u32, dpi: u32) -> BoxFuture<'_, RemoteResult<Vec<u8>>> {
        let latency = self.begin_call(RemoteOp::FetchRaster);
        Box::pin(async move {
            self.settle(RemoteOp::FetchRaster, latency).await?;
            let (width, height) = {
                let state = self.state.borrow();
                let record = state.check_page(document, page)?;
                if let Some(bytes) = record.raster_overrides.get(&page) {
                    return Ok(bytes.clone());
                }
                (
                    points_to_canonical(record.page_size.width, dpi).round() as u32,
                    points_to_canonical(record.page_size.height, dpi).round() as u32,
                )
            };
            blank_png(width, height)
        })
    }

    fn export_document(&self, document: DocumentId) -> BoxFuture<'_, RemoteResult<Vec<u8>>> {
        let latency = self.begin_call(RemoteOp::Export);
        Box::pin(async move {
            self.settle(RemoteOp::Export, latency).await?;
            let exported = self.export(document)?;
            serde_json::to_vec_pretty(&exported).map_err(|e| RemoteError::Serialization(e.to_string()))
        })
    }
}
