//! Cancellable, double-buffered page rasterization.
//!
//! A page is drawn into an off-screen bitmap first and handed to the presenter
//! only if no newer request arrived meanwhile, so the visible surface never shows
//! a stale or half-drawn page.

use std::cell::Cell;
use std::rc::Rc;

use async_trait::async_trait;

use crate::cancel::{CancellationToken, Generations};
use crate::error::{Result, ViewerError};

#[async_trait(?Send)]
pub trait Rasterizer {
    type Bitmap;

    /// Implementations may stop early once `cancel` is set; the result is then discarded.
    async fn rasterize(
        &self,
        page: u32,
        scale: f64,
        cancel: &CancellationToken,
    ) -> std::result::Result<Self::Bitmap, String>;
}

pub trait Presenter<B> {
    fn present(&self, page: u32, bitmap: B);
}

pub struct PageRenderer<R: Rasterizer, P> {
    rasterizer: Rc<R>,
    presenter: P,
    scale: f64,
    page_count: u32,
    generations: Generations,
    displayed: Cell<Option<u32>>,
}

impl<R, P> PageRenderer<R, P>
where
    R: Rasterizer,
    P: Presenter<R::Bitmap>,
{
    pub fn new(rasterizer: Rc<R>, presenter: P, scale: f64, page_count: u32) -> Self {
        Self {
            rasterizer,
            presenter,
            scale,
            page_count,
            generations: Generations::new(),
            displayed: Cell::new(None),
        }
    }

    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    /// The last page that reached the visible surface.
    pub fn displayed_page(&self) -> Option<u32> {
        self.displayed.get()
    }

    /// Supersedes any render in flight. Resolves to `RenderCancelled` if this
    /// request is itself superseded before presenting.
    pub async fn render_page(&self, page: u32) -> Result<u32> {
        if page == 0 || page > self.page_count {
            return Err(ViewerError::PageOutOfRange {
                page,
                page_count: self.page_count,
            });
        }
        let (generation, token) = self.generations.begin();
        let outcome = self.rasterizer.rasterize(page, self.scale, &token).await;
        if token.is_cancelled() || !self.generations.is_current(generation) {
            log::debug!("render of page {page} superseded");
            return Err(ViewerError::RenderCancelled);
        }
        self.generations.finish(generation);
        let bitmap = outcome.map_err(ViewerError::RenderFailed)?;
        self.presenter.present(page, bitmap);
        self.displayed.set(Some(page));
        Ok(page)
    }

    pub fn cancel(&self) {
        self.generations.cancel();
    }
}
