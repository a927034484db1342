pub mod colormap;
pub mod heatmap;
pub mod overlay;
pub mod plotter;

pub use heatmap::{amplitude_image, ptt_image, HeatmapRenderer, RenderInput};
pub use overlay::Overlay;
pub use plotter::plot_psd;
