pub mod composite;
pub mod context;
pub(crate) mod path;
pub(crate) mod raster;
pub(crate) mod sample;
pub mod style;
pub mod text;

pub use context::Context2D;
pub use style::{CompositeMode, FontSpec, LineCap, LineJoin};
pub use text::TextEngine;
