pub mod assembly;
pub mod markers;
pub mod media;
pub mod playback;
pub mod project;
pub mod render;
pub mod session;
pub mod timeline;
