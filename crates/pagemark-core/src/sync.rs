//! Synchronizer: tracked background writes, the flush barrier and the undo
//! stack.
//!
//! Every remote call runs as a `spawn_local` task registered in a pending
//! set. When a task settles it deposits exactly one [`Outcome`] into a shared
//! outbox and leaves the pending set; the engine drains the outbox on its own
//! turn. The engine must therefore be driven inside a `tokio::task::LocalSet`.

use crate::objects::{ImageId, ImageTransform, NewImage, PlacedImage};
use crate::remote::{BoxFuture, DocumentId, RemoteOp, RemoteResult, RemoteStore};
use crate::strokes::{Stroke, StrokeId};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::future::Future;
use std::rc::Rc;
use tokio::sync::Notify;
use uuid::Uuid;

/// Result of one page reload. Each part succeeds or fails on its own.
#[derive(Debug)]
pub struct PageLoad {
    pub page: u32,
    pub epoch: u64,
    pub strokes: RemoteResult<Vec<Stroke>>,
    pub raster: RemoteResult<Vec<u8>>,
    pub images: RemoteResult<Vec<PlacedImage>>,
    /// Bytes of listed images that were not cached when the load started.
    pub bytes: Vec<(ImageId, RemoteResult<Vec<u8>>)>,
}

/// A settled background task.
#[derive(Debug)]
pub enum Outcome {
    StrokeCreated {
        page: u32,
        key: Uuid,
        result: RemoteResult<StrokeId>,
    },
    StrokeDeleted {
        page: u32,
        /// Epoch of the load the undo stack was built from.
        epoch: u64,
        id: StrokeId,
        result: RemoteResult<()>,
    },
    PageCleared {
        page: u32,
        result: RemoteResult<()>,
    },
    ImageCreated {
        page: u32,
        result: RemoteResult<ImageId>,
    },
    ImageUpdated {
        page: u32,
        id: ImageId,
        result: RemoteResult<()>,
    },
    ImageDeleted {
        page: u32,
        id: ImageId,
        result: RemoteResult<()>,
    },
    PageLoaded(Box<PageLoad>),
}

/// Confirmed stroke ids of the current page, most recent last.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UndoStack {
    ids: Vec<StrokeId>,
}

impl UndoStack {
    /// Replace the stack with ids in server order.
    pub fn rebuild(&mut self, ids: impl IntoIterator<Item = StrokeId>) {
        self.ids = ids.into_iter().collect();
    }

    pub fn push(&mut self, id: StrokeId) {
        self.ids.push(id);
    }

    pub fn pop(&mut self) -> Option<StrokeId> {
        self.ids.pop()
    }

    /// Put back an id whose delete failed.
    pub fn restore(&mut self, id: StrokeId) {
        self.ids.push(id);
    }

    pub fn peek(&self) -> Option<StrokeId> {
        self.ids.last().copied()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> &[StrokeId] {
        &self.ids
    }
}

#[derive(Default)]
struct Tracker {
    next_task: Cell<u64>,
    pending: RefCell<HashMap<u64, RemoteOp>>,
    outbox: RefCell<Vec<Outcome>>,
    settled: Notify,
}

impl Tracker {
    fn begin(&self, op: RemoteOp) -> u64 {
        let task = self.next_task.get() + 1;
        self.next_task.set(task);
        self.pending.borrow_mut().insert(task, op);
        task
    }

    fn settle(&self, task: u64, outcome: Outcome) {
        self.outbox.borrow_mut().push(outcome);
        if let Some(op) = self.pending.borrow_mut().remove(&task) {
            log::debug!("Settled {op} (task {task})");
        }
        self.settled.notify_waiters();
    }

    fn snapshot(&self, writes_only: bool) -> Vec<u64> {
        self.pending
            .borrow()
            .iter()
            .filter(|(_, op)| !writes_only || op.is_write())
            .map(|(task, _)| *task)
            .collect()
    }

    async fn wait_for(&self, tasks: Vec<u64>) {
        loop {
            let notified = self.settled.notified();
            let mut notified = std::pin::pin!(notified);
            notified.as_mut().enable();
            let done = {
                let pending = self.pending.borrow();
                tasks.iter().all(|task| !pending.contains_key(task))
            };
            if done {
                return;
            }
            notified.await;
        }
    }
}

/// Dispatches remote calls as tracked background tasks.
pub struct Synchronizer {
    store: Rc<dyn RemoteStore>,
    document: DocumentId,
    tracker: Rc<Tracker>,
    undo: UndoStack,
}

impl Synchronizer {
    pub fn new(store: Rc<dyn RemoteStore>, document: DocumentId) -> Self {
        Self {
            store,
            document,
            tracker: Rc::new(Tracker::default()),
            undo: UndoStack::default(),
        }
    }

    pub fn document(&self) -> DocumentId {
        self.document
    }

    pub fn undo_stack(&self) -> &UndoStack {
        &self.undo
    }

    pub fn undo_stack_mut(&mut self) -> &mut UndoStack {
        &mut self.undo
    }

    /// Number of tracked tasks, reads included.
    pub fn pending(&self) -> usize {
        self.tracker.pending.borrow().len()
    }

    /// Number of tracked writes.
    pub fn pending_writes(&self) -> usize {
        self.tracker.snapshot(true).len()
    }

    /// Take every outcome settled since the last drain.
    pub fn drain(&self) -> Vec<Outcome> {
        std::mem::take(&mut *self.tracker.outbox.borrow_mut())
    }

    /// Resolve once every write pending now has settled. Writes started
    /// afterwards are not awaited.
    pub fn flush(&self) -> BoxFuture<'static, ()> {
        let tasks = self.tracker.snapshot(true);
        let tracker = self.tracker.clone();
        Box::pin(async move { tracker.wait_for(tasks).await })
    }

    /// Resolve once every task pending now, reads included, has settled.
    pub fn wait_idle(&self) -> BoxFuture<'static, ()> {
        let tasks = self.tracker.snapshot(false);
        let tracker = self.tracker.clone();
        Box::pin(async move { tracker.wait_for(tasks).await })
    }

    /// Flush, then export the document.
    pub fn export(&self) -> BoxFuture<'static, RemoteResult<Vec<u8>>> {
        let flush = self.flush();
        let store = self.store.clone();
        let document = self.document;
        Box::pin(async move {
            flush.await;
            log::info!("Exporting {document}");
            store.export_document(document).await
        })
    }

    fn track<F>(&self, op: RemoteOp, task: F)
    where
        F: Future<Output = Outcome> + 'static,
    {
        let id = self.tracker.begin(op);
        log::debug!("Dispatching {op} (task {id})");
        let tracker = self.tracker.clone();
        tokio::task::spawn_local(async move {
            let outcome = task.await;
            tracker.settle(id, outcome);
        });
    }

    pub fn spawn_create_stroke(&self, stroke: Stroke) {
        let store = self.store.clone();
        let document = self.document;
        self.track(RemoteOp::CreateStroke, async move {
            let result = store.create_stroke(document, &stroke).await;
            Outcome::StrokeCreated {
                page: stroke.page,
                key: stroke.local_key(),
                result,
            }
        });
    }

    pub fn spawn_delete_stroke(&self, page: u32, epoch: u64, id: StrokeId) {
        let store = self.store.clone();
        self.track(RemoteOp::DeleteStroke, async move {
            let result = store.delete_stroke(id).await;
            Outcome::StrokeDeleted { page, epoch, id, result }
        });
    }

    pub fn spawn_clear_page(&self, page: u32) {
        let store = self.store.clone();
        let document = self.document;
        self.track(RemoteOp::ClearStrokes, async move {
            let result = store.clear_page_strokes(document, page).await;
            Outcome::PageCleared { page, result }
        });
    }

    pub fn spawn_create_image(&self, image: NewImage) {
        let store = self.store.clone();
        let document = self.document;
        self.track(RemoteOp::CreateImage, async move {
            let result = store.create_image(document, &image).await;
            Outcome::ImageCreated {
                page: image.page,
                result,
            }
        });
    }

    pub fn spawn_update_image(&self, page: u32, id: ImageId, transform: ImageTransform) {
        let store = self.store.clone();
        self.track(RemoteOp::UpdateImage, async move {
            let result = store.update_image_transform(id, transform).await;
            Outcome::ImageUpdated { page, id, result }
        });
    }

    pub fn spawn_delete_image(&self, page: u32, id: ImageId) {
        let store = self.store.clone();
        self.track(RemoteOp::DeleteImage, async move {
            let result = store.delete_image(id).await;
            Outcome::ImageDeleted { page, id, result }
        });
    }

    /// Fetch strokes, raster and images concurrently, then the bytes of any
    /// image not in `cached`.
    pub fn spawn_load_page(&self, page: u32, epoch: u64, dpi: u32, cached: Vec<ImageId>) {
        let store = self.store.clone();
        let document = self.document;
        self.track(RemoteOp::LoadPage, async move {
            let (strokes, raster, images) = tokio::join!(
                store.list_strokes(document, page),
                store.fetch_page_raster(document, page, dpi),
                store.list_page_images(document, page),
            );
            let mut bytes = Vec::new();
            if let Ok(images) = &images {
                for image in images.iter().filter(|image| !cached.contains(&image.id)) {
                    bytes.push((image.id, store.fetch_image_bytes(image.id).await));
                }
            }
            Outcome::PageLoaded(Box::new(PageLoad {
                page,
                epoch,
                strokes,
                raster,
                images,
                bytes,
            }))
        });
    }
}
