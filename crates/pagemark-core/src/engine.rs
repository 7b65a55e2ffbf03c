//! The annotation canvas engine.
//!
//! [`Engine`] owns the page state machine and routes pointer input to the
//! stroke store or the object manager. Remote work is dispatched through the
//! [`Synchronizer`]; results come back through [`Engine::poll_events`], which
//! applies them only if they still belong to the page on screen.

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::geometry::PageFit;
use crate::objects::{
    DeleteConfirmation, Effect, HandleKind, ImageFormat, Interaction, NewImage, ObjectManager, SelectionChrome,
    Write, default_placement,
};
use crate::paint::{DisplayList, PaintContext};
use crate::remote::{BoxFuture, DocumentId, RemoteError, RemoteOp, RemoteResult, RemoteStore};
use crate::strokes::{StrokeColor, StrokeStore, ToolKind};
use crate::sync::{Outcome, PageLoad, Synchronizer};
use kurbo::{Point, Size, Vec2};
use serde::{Deserialize, Serialize};
use std::rc::Rc;

/// Page-level state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageState {
    /// Waiting for the first load after navigation. Gestures are ignored.
    Loading,
    Ready,
}

/// What pointer input does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tool {
    Draw(ToolKind),
    Select,
}

impl Default for Tool {
    fn default() -> Self {
        Tool::Draw(ToolKind::Pen)
    }
}

/// Color, width and opacity for new strokes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Brush {
    pub color: StrokeColor,
    pub width: f64,
    pub opacity: f64,
}

impl Default for Brush {
    fn default() -> Self {
        Self {
            color: StrokeColor::black(),
            width: 2.0,
            opacity: 1.0,
        }
    }
}

/// One-shot notification drained by [`Engine::poll_events`].
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    /// A remote call failed. Nothing is retried.
    Failed { op: RemoteOp, error: RemoteError },
    /// A page load was applied.
    PageLoaded { page: u32 },
    /// The page raster is missing or unreadable; coordinates fall back to
    /// identity.
    Degraded { page: u32 },
}

/// The annotation canvas engine for one document.
pub struct Engine {
    config: EngineConfig,
    sync: Synchronizer,
    page_count: u32,
    page: u32,
    state: PageState,
    epoch: u64,
    /// Epoch of the last applied load.
    loaded_epoch: u64,
    page_size: Size,
    raster: Option<Rc<[u8]>>,
    viewport: Size,
    strokes: StrokeStore,
    objects: ObjectManager,
    tool: Tool,
    brush: Brush,
    pointer: Option<Point>,
    needs_redraw: bool,
}

impl Engine {
    /// Create an engine with no page loaded. Call [`Engine::navigate`] to
    /// load the first page.
    pub fn new(config: EngineConfig, store: Rc<dyn RemoteStore>, document: DocumentId, page_count: u32) -> Self {
        Self {
            sync: Synchronizer::new(store, document),
            strokes: StrokeStore::new(config.eraser),
            objects: ObjectManager::new(&config),
            config,
            page_count,
            page: 0,
            state: PageState::Loading,
            epoch: 0,
            loaded_epoch: 0,
            page_size: Size::ZERO,
            raster: None,
            viewport: Size::ZERO,
            tool: Tool::default(),
            brush: Brush::default(),
            pointer: None,
            needs_redraw: true,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn document(&self) -> DocumentId {
        self.sync.document()
    }

    /// Current 1-based page, or 0 before the first navigation.
    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    pub fn state(&self) -> PageState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == PageState::Ready
    }

    /// Canonical page size; zero until a readable raster is loaded.
    pub fn page_size(&self) -> Size {
        self.page_size
    }

    pub fn strokes(&self) -> &StrokeStore {
        &self.strokes
    }

    pub fn objects(&self) -> &ObjectManager {
        &self.objects
    }

    pub fn synchronizer(&self) -> &Synchronizer {
        &self.sync
    }

    pub fn undo_len(&self) -> usize {
        self.sync.undo_stack().len()
    }

    pub fn set_viewport(&mut self, viewport: Size) {
        self.viewport = viewport;
        self.needs_redraw = true;
    }

    pub fn viewport(&self) -> Size {
        self.viewport
    }

    /// Placement of the page in the current viewport.
    pub fn fit(&self) -> PageFit {
        PageFit::contain(self.viewport, self.page_size)
    }

    pub fn tool(&self) -> Tool {
        self.tool
    }

    /// Switch tools. An unfinished stroke or image gesture is abandoned.
    pub fn set_tool(&mut self, tool: Tool) {
        if tool != self.tool {
            self.cancel_gestures();
        }
        self.tool = tool;
    }

    pub fn brush(&self) -> Brush {
        self.brush
    }

    pub fn set_brush(&mut self, brush: Brush) {
        self.brush = brush;
    }

    /// Whether anything visible changed since the last call.
    pub fn take_redraw(&mut self) -> bool {
        std::mem::take(&mut self.needs_redraw)
    }

    /// Go to `page`. Unfinished gestures are discarded; in-flight writes keep
    /// running and their results are ignored if they belong to another page.
    pub fn navigate(&mut self, page: u32) -> EngineResult<()> {
        if page < 1 || page > self.page_count {
            return Err(EngineError::InvalidPage {
                page,
                page_count: self.page_count,
            });
        }
        log::info!("Navigating to page {page}");
        self.cancel_gestures();
        self.page = page;
        self.state = PageState::Loading;
        self.page_size = Size::ZERO;
        self.raster = None;
        self.strokes.load(Vec::new());
        self.objects.load(Vec::new());
        self.sync.undo_stack_mut().rebuild([]);
        self.reload_page();
        Ok(())
    }

    /// Resynchronize the current page with the store. Only the latest reload
    /// is applied.
    pub fn reload_page(&mut self) {
        if self.page == 0 {
            return;
        }
        self.epoch += 1;
        self.sync
            .spawn_load_page(self.page, self.epoch, self.config.dpi, self.objects.cached_ids());
    }

    fn cancel_gestures(&mut self) {
        if self.strokes.cancel_stroke() {
            log::debug!("Discarded in-progress stroke");
        }
        self.objects.cancel();
        self.pointer = None;
        self.needs_redraw = true;
    }

    /// Open a stroke at a screen point with the current brush.
    pub fn begin_stroke(&mut self, screen: Point) {
        if !self.is_ready() {
            return;
        }
        let tool = match self.tool {
            Tool::Draw(kind) => kind,
            Tool::Select => return,
        };
        let Brush { color, width, opacity } = self.brush;
        self.strokes.begin_stroke(self.page, tool, color, width, opacity);
        self.strokes.append_point(self.fit().to_canonical(screen));
        self.needs_redraw = true;
    }

    pub fn extend_stroke(&mut self, screen: Point) {
        let point = self.fit().to_canonical(screen);
        if self.strokes.append_point(point) {
            self.needs_redraw = true;
        }
    }

    /// Close the stroke and persist it in the background.
    pub fn end_stroke(&mut self) {
        if let Some(stroke) = self.strokes.end_stroke() {
            self.sync.spawn_create_stroke(stroke);
            self.needs_redraw = true;
        }
    }

    pub fn select_image(&mut self, index: usize) {
        if self.is_ready() {
            let effects = self.objects.select(index);
            self.apply(effects);
        }
    }

    pub fn clear_selection(&mut self) {
        let effects = self.objects.clear_selection();
        self.apply(effects);
    }

    pub fn begin_drag(&mut self, index: usize) {
        if self.is_ready() {
            let effects = self.objects.begin_drag(index);
            self.apply(effects);
        }
    }

    /// Move the dragged image by a screen delta.
    pub fn drag_by(&mut self, delta: Vec2) {
        let effects = self.objects.drag_by(delta, self.fit().scale());
        self.apply(effects);
    }

    pub fn end_drag(&mut self) {
        let effects = self.objects.end_drag();
        self.apply(effects);
    }

    pub fn begin_resize(&mut self, index: usize) {
        if self.is_ready() {
            let effects = self.objects.begin_resize(index);
            self.apply(effects);
        }
    }

    /// Resize the image by a screen delta of the resize handle.
    pub fn resize_by(&mut self, delta: Vec2) {
        let effects = self.objects.resize_by(delta, self.fit().scale());
        self.apply(effects);
    }

    pub fn end_resize(&mut self) {
        let effects = self.objects.end_resize();
        self.apply(effects);
    }

    pub fn begin_rotate(&mut self, index: usize) {
        if self.is_ready() {
            let effects = self.objects.begin_rotate(index);
            self.apply(effects);
        }
    }

    /// Rotate by a horizontal screen drag distance.
    pub fn rotate_by(&mut self, dx: f64) {
        let effects = self.objects.rotate_by(dx);
        self.apply(effects);
    }

    pub fn end_rotate(&mut self) {
        let effects = self.objects.end_rotate();
        self.apply(effects);
    }

    fn apply(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Redraw => self.needs_redraw = true,
                Effect::Persist(Write::UpdateTransform { image, transform }) => {
                    self.sync.spawn_update_image(self.page, image, transform);
                }
            }
        }
    }

    pub fn pointer_down(&mut self, screen: Point) {
        if !self.is_ready() {
            return;
        }
        self.pointer = Some(screen);
        match self.tool {
            Tool::Draw(_) => self.begin_stroke(screen),
            Tool::Select => {
                let fit = self.fit();
                let handle = self.objects.selected().zip(self.objects.selected_image()).and_then(
                    |(index, image)| {
                        SelectionChrome::new(&image.transform, &fit, self.config.rotate_arm_length)
                            .hit_test(screen, self.config.handle_hit_radius)
                            .map(|kind| (index, kind))
                    },
                );
                match handle {
                    Some((index, HandleKind::Resize)) => self.begin_resize(index),
                    Some((index, HandleKind::Rotate)) => self.begin_rotate(index),
                    None => match self.objects.image_at(fit.to_canonical(screen)) {
                        Some(index) => self.begin_drag(index),
                        None => self.clear_selection(),
                    },
                }
            }
        }
    }

    pub fn pointer_move(&mut self, screen: Point) {
        let Some(last) = self.pointer else {
            return;
        };
        self.pointer = Some(screen);
        let delta = screen - last;
        match self.tool {
            Tool::Draw(_) => self.extend_stroke(screen),
            Tool::Select => match self.objects.interaction() {
                Interaction::Idle => {}
                Interaction::Dragging(_) => self.drag_by(delta),
                Interaction::Resizing(_) => self.resize_by(delta),
                Interaction::Rotating(_) => self.rotate_by(delta.x),
            },
        }
    }

    pub fn pointer_up(&mut self, screen: Point) {
        if self.pointer.is_none() {
            return;
        }
        self.pointer_move(screen);
        self.pointer = None;
        match self.tool {
            Tool::Draw(_) => self.end_stroke(),
            Tool::Select => match self.objects.interaction() {
                Interaction::Idle => {}
                Interaction::Dragging(_) => self.end_drag(),
                Interaction::Resizing(_) => self.end_resize(),
                Interaction::Rotating(_) => self.end_rotate(),
            },
        }
    }

    /// Undo the most recent confirmed stroke. Returns false when there is
    /// nothing to undo; no remote call is made then.
    pub fn undo(&mut self) -> bool {
        if !self.is_ready() {
            return false;
        }
        let Some(id) = self.sync.undo_stack_mut().pop() else {
            return false;
        };
        log::debug!("Undoing {id}");
        self.sync.spawn_delete_stroke(self.page, self.loaded_epoch, id);
        true
    }

    /// Delete every stroke of the current page.
    pub fn clear_page(&mut self) -> EngineResult<()> {
        if !self.is_ready() {
            return Err(EngineError::NotReady);
        }
        self.sync.spawn_clear_page(self.page);
        Ok(())
    }

    /// Delete the selected image if `confirmation` agrees. Returns whether a
    /// delete was issued.
    pub fn delete_selected(&mut self, confirmation: &dyn DeleteConfirmation) -> EngineResult<bool> {
        if !self.is_ready() {
            return Err(EngineError::NotReady);
        }
        let image = self.objects.selected_image().ok_or(EngineError::NothingSelected)?;
        if !confirmation.confirm_delete(image) {
            return Ok(false);
        }
        self.sync.spawn_delete_image(self.page, image.id);
        Ok(true)
    }

    /// Insert an image centered on the page. Nothing is shown until the
    /// store accepts it and the page reloads.
    pub fn insert_image(&mut self, bytes: Vec<u8>, natural: Size) -> EngineResult<()> {
        if !self.is_ready() {
            return Err(EngineError::NotReady);
        }
        let format = ImageFormat::from_magic_bytes(&bytes).ok_or(EngineError::UnsupportedImage)?;
        let transform = default_placement(natural, self.page_size, self.config.max_insert_fraction)?;
        self.sync.spawn_create_image(NewImage {
            page: self.page,
            format,
            bytes,
            transform,
        });
        Ok(())
    }

    /// Resolve once every write pending now has settled.
    pub fn flush(&self) -> BoxFuture<'static, ()> {
        self.sync.flush()
    }

    /// Flush, then export the finished document.
    pub fn export(&self) -> BoxFuture<'static, RemoteResult<Vec<u8>>> {
        self.sync.export()
    }

    /// Wait for background work and apply it until nothing is in flight.
    pub async fn run_until_idle(&mut self) -> Vec<Notice> {
        let mut notices = Vec::new();
        loop {
            self.sync.wait_idle().await;
            notices.extend(self.poll_events());
            if self.sync.pending() == 0 {
                return notices;
            }
        }
    }

    /// Apply settled background results and return notices for the host.
    pub fn poll_events(&mut self) -> Vec<Notice> {
        let mut notices = Vec::new();
        for outcome in self.sync.drain() {
            self.apply_outcome(outcome, &mut notices);
        }
        notices
    }

    fn apply_outcome(&mut self, outcome: Outcome, notices: &mut Vec<Notice>) {
        match outcome {
            Outcome::StrokeCreated { page, key, result } => match result {
                Ok(id) => {
                    if page == self.page && self.strokes.confirm(key, id) {
                        self.sync.undo_stack_mut().push(id);
                        self.needs_redraw = true;
                    } else {
                        log::debug!("Ignoring confirmation of {id} for a stroke no longer shown");
                    }
                }
                Err(error) => failed(RemoteOp::CreateStroke, error, notices),
            },
            Outcome::StrokeDeleted { page, epoch, id, result } => match result {
                Ok(()) if page == self.page => self.reload_page(),
                Ok(()) => {}
                Err(error) => {
                    // Skip if a load rebuilt the stack after the undo.
                    let undo = self.sync.undo_stack_mut();
                    if page == self.page && epoch == self.loaded_epoch && !undo.ids().contains(&id) {
                        undo.restore(id);
                    }
                    failed(RemoteOp::DeleteStroke, error, notices);
                }
            },
            Outcome::PageCleared { page, result } => match result {
                Ok(()) if page == self.page => self.reload_page(),
                Ok(()) => {}
                Err(error) => failed(RemoteOp::ClearStrokes, error, notices),
            },
            Outcome::ImageCreated { page, result } => match result {
                Ok(id) => {
                    log::debug!("Created {id}");
                    if page == self.page {
                        self.reload_page();
                    }
                }
                Err(error) => failed(RemoteOp::CreateImage, error, notices),
            },
            Outcome::ImageUpdated { result, .. } => {
                if let Err(error) = result {
                    failed(RemoteOp::UpdateImage, error, notices);
                }
            }
            Outcome::ImageDeleted { page, id, result } => match result {
                Ok(()) if page == self.page => {
                    self.objects.remove(id);
                    self.needs_redraw = true;
                    self.reload_page();
                }
                Ok(()) => {}
                Err(error) => failed(RemoteOp::DeleteImage, error, notices),
            },
            Outcome::PageLoaded(load) => {
                if load.page != self.page || load.epoch != self.epoch {
                    log::debug!("Dropping stale load of page {} (epoch {})", load.page, load.epoch);
                    return;
                }
                self.loaded_epoch = load.epoch;
                self.apply_load(*load, notices);
            }
        }
    }

    fn apply_load(&mut self, load: PageLoad, notices: &mut Vec<Notice>) {
        let page = load.page;

        match load.strokes {
            Ok(strokes) => {
                self.sync
                    .undo_stack_mut()
                    .rebuild(strokes.iter().filter_map(|stroke| stroke.id));
                self.strokes.load(strokes);
            }
            Err(error) => failed(RemoteOp::ListStrokes, error, notices),
        }

        match load.images {
            Ok(images) => self.objects.load(images),
            Err(error) => {
                self.objects.clear_selection();
                failed(RemoteOp::ListImages, error, notices);
            }
        }
        for (id, bytes) in load.bytes {
            match bytes {
                Ok(bytes) => self.objects.cache_bytes(id, Rc::from(bytes)),
                Err(error) => failed(RemoteOp::FetchImage, error, notices),
            }
        }

        let size = match load.raster {
            Ok(bytes) => {
                let size = raster_size(&bytes);
                self.raster = size.map(|_| Rc::from(bytes));
                size
            }
            Err(error) => {
                self.raster = None;
                failed(RemoteOp::FetchRaster, error, notices);
                None
            }
        };
        match size {
            Some(size) => self.page_size = size,
            None => {
                log::warn!("Page {page} raster unavailable; using identity mapping");
                self.page_size = Size::ZERO;
                notices.push(Notice::Degraded { page });
            }
        }

        self.pointer = None;
        self.state = PageState::Ready;
        self.needs_redraw = true;
        log::info!(
            "Loaded page {page}: {} strokes, {} images",
            self.strokes.persisted().len(),
            self.objects.images().len()
        );
        notices.push(Notice::PageLoaded { page });
    }

    /// Display list for the current viewport.
    pub fn paint(&self) -> DisplayList {
        PaintContext::new(self.fit(), &self.strokes, &self.objects, &self.config)
            .with_raster(self.raster.as_ref())
            .build()
    }
}

fn failed(op: RemoteOp, error: RemoteError, notices: &mut Vec<Notice>) {
    log::warn!("{op} failed: {error}");
    notices.push(Notice::Failed { op, error });
}

/// Pixel size of a PNG raster, read from its header.
fn raster_size(bytes: &[u8]) -> Option<Size> {
    let reader = png::Decoder::new(std::io::Cursor::new(bytes)).read_info().ok()?;
    let info = reader.info();
    (info.width > 0 && info.height > 0).then(|| Size::new(f64::from(info.width), f64::from(info.height)))
}
