pub mod animation;
pub mod cell;
pub mod chunk;
pub mod convolution;
pub mod grid_manager;
pub mod kernel;
pub mod observer;
pub mod overlay;
pub mod pixel;
pub mod render;
pub mod utils;
