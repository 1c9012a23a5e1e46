pub mod controls;
pub mod progress;
pub mod reel_canvas;
