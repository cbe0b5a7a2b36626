//! The renderer seam shared by all rendering strategies.

use crate::Image;

/// A progressive rendering strategy. Each `render` call accumulates one
/// sample per pixel into the image; `reset` restarts progressive state
/// when the camera moves or the strategy is swapped in.
pub trait Renderer {
    /// Short name used to select the renderer from the command line.
    fn name(&self) -> &'static str;

    /// Restart progressive accumulation.
    fn reset(&mut self);

    /// Render one iteration into the accumulating image.
    fn render(&mut self, img: &mut Image);
}
