//! Drives an [`Engine`] through a script.

use crate::ReplayError;
use crate::script::Step;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use kurbo::{Point, Size, Vec2};
use pagemark_core::{Engine, Notice, PlacedImage};
use std::io::Write;

/// Run `steps` in order. Exports are written to `out`.
pub async fn run(engine: &mut Engine, steps: Vec<Step>, out: &mut impl Write) -> Result<(), ReplayError> {
    for (index, step) in steps.into_iter().enumerate() {
        log::debug!("Step {index}: {step:?}");
        match step {
            Step::Viewport { width, height } => engine.set_viewport(Size::new(width, height)),
            Step::Goto { page } => {
                engine.navigate(page)?;
                settle(engine).await;
            }
            Step::Tool { tool } => engine.set_tool(tool),
            Step::Brush(brush) => engine.set_brush(brush),
            Step::Stroke { points } => {
                let mut points = points.into_iter().map(|[x, y]| Point::new(x, y));
                let Some(first) = points.next() else {
                    continue;
                };
                engine.pointer_down(first);
                let mut last = first;
                for point in points {
                    engine.pointer_move(point);
                    last = point;
                }
                engine.pointer_up(last);
            }
            Step::InsertImage { data, width, height } => {
                let bytes = STANDARD.decode(data)?;
                engine.insert_image(bytes, Size::new(width, height))?;
            }
            Step::Select { index } => engine.select_image(index),
            Step::Drag { index, dx, dy } => {
                engine.begin_drag(index);
                engine.drag_by(Vec2::new(dx, dy));
                engine.end_drag();
            }
            Step::Resize { index, dx, dy } => {
                engine.begin_resize(index);
                engine.resize_by(Vec2::new(dx, dy));
                engine.end_resize();
            }
            Step::Rotate { index, dx } => {
                engine.begin_rotate(index);
                engine.rotate_by(dx);
                engine.end_rotate();
            }
            Step::DeleteImage { index } => {
                engine.select_image(index);
                engine.delete_selected(&|image: &PlacedImage| {
                    log::info!("Deleting {}", image.id);
                    true
                })?;
            }
            Step::Undo => {
                if !engine.undo() {
                    log::info!("Nothing to undo");
                }
            }
            Step::Clear => engine.clear_page()?,
            Step::Settle => settle(engine).await,
            Step::Export => {
                let bytes = engine.export().await?;
                out.write_all(&bytes)?;
                writeln!(out)?;
            }
        }
    }
    settle(engine).await;
    Ok(())
}

async fn settle(engine: &mut Engine) {
    for notice in engine.run_until_idle().await {
        match notice {
            Notice::Failed { op, error } => log::warn!("{op} failed: {error}"),
            Notice::Degraded { page } => log::warn!("Page {page} is degraded"),
            Notice::PageLoaded { page } => log::info!("Page {page} ready"),
        }
    }
}
