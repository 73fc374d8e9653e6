/// The map surface model
///
/// - viewport.rs: centre, zoom, bearing and the screen/geo conversions
/// - gesture.rs: pointer and two-finger touch handling
/// - engine.rs: the `MapEngine` seam and the canvas-backed `Scene`
/// - markers.rs: marker set construction and the redraw layer
/// - popup.rs: popup text and the details panel model

pub mod engine;
pub mod gesture;
pub mod markers;
pub mod popup;
pub mod viewport;

pub use engine::{MapEngine, Scene};
pub use markers::{MarkerInput, MarkerLayer, MarkerTarget};
pub use viewport::ViewportEvent;
