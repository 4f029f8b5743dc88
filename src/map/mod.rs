pub mod headless;
pub mod markers;
pub mod viewport;
pub mod widget;

pub use headless::{HeadlessMap, WidgetCall};
pub use markers::{MarkerStateMachine, PopupSession};
pub use viewport::{CameraPhase, ViewportBridge};
pub use widget::{CameraSurface, CameraTarget, MapWidget, MarkerState, MarkerSurface, PopupContent};
