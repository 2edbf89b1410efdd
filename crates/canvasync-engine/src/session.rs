//! One open canvas: loader, controller and notices wired together.

use std::sync::Arc;

use canvasync_config::CanvasyncConfig;
use canvasync_core::{CanvasPatch, Edge, ProjectId, Viewport};
use canvasync_store::GraphStore;
use tokio::sync::broadcast;
use tracing::info;

use crate::controller::{LoadSource, PersistenceController, SaveOutcome};
use crate::error::{LoadError, SaveError};
use crate::loader::ViewportLoader;
use crate::notify::{Notice, Notifier};

/// Viewport loader and persistence controller sharing one store.
pub struct CanvasSession {
    loader: ViewportLoader,
    controller: PersistenceController,
    notifier: Notifier,
    canvas_size: (f64, f64),
}

impl CanvasSession {
    pub fn new(store: Arc<dyn GraphStore>, config: &CanvasyncConfig) -> Self {
        let notifier = Notifier::new();
        let loader = ViewportLoader::new(
            Arc::clone(&store),
            config.loader.clone(),
            notifier.clone(),
        );
        let controller =
            PersistenceController::new(store, config.persistence.clone(), notifier.clone());
        // Debounced saves run inside the controller, so the loader hears about every write
        controller.set_on_saved(loader.count_invalidator());

        Self {
            loader,
            controller,
            notifier,
            canvas_size: (
                config.loader.default_canvas_width,
                config.loader.default_canvas_height,
            ),
        }
    }

    pub fn loader(&self) -> &ViewportLoader {
        &self.loader
    }

    pub fn controller(&self) -> &PersistenceController {
        &self.controller
    }

    pub fn notices(&self) -> broadcast::Receiver<Notice> {
        self.notifier.subscribe()
    }

    /// Canvas area in screen pixels used for viewport loads
    pub fn set_canvas_size(&mut self, width: f64, height: f64) {
        self.canvas_size = (width, height);
    }

    /// Open `project`, saving pending changes of the previous one first.
    ///
    /// The loader starts on the stored viewport once the canvas is loaded.
    pub async fn open_project(&self, project: Option<ProjectId>) -> Result<LoadSource, LoadError> {
        let loaded = self.controller.switch_project(project).await;
        self.loader.set_project(project);
        if project.is_some() {
            let viewport = self.controller.state().viewport;
            self.update_viewport(viewport);
        }
        if let (Some(project), Ok(source)) = (project, &loaded) {
            info!("Opened project {} ({:?})", project, source);
        }
        loaded
    }

    /// Forward a viewport change to the (debounced) loader.
    pub fn update_viewport(&self, viewport: Viewport) {
        let (width, height) = self.canvas_size;
        self.loader.update_viewport(viewport, width, height);
    }

    pub fn update_canvas(&self, patch: CanvasPatch) -> Vec<Edge> {
        self.controller.update_canvas(patch)
    }

    /// Save now; a written save makes the loader re-count the project.
    pub async fn manual_save(&self) -> bool {
        self.controller.manual_save().await
    }

    pub async fn save(&self) -> Result<SaveOutcome, SaveError> {
        self.controller.save().await
    }

    /// Flush unsaved changes and stop background work.
    pub async fn close(&self) -> Result<(), SaveError> {
        self.loader.cancel_pending();
        match self.controller.flush().await {
            Ok(_) | Err(SaveError::NoProject) => Ok(()),
            Err(e) => Err(e),
        }
    }
}
