pub mod constants;
pub mod goal;
pub mod input_buffer;
pub mod interpolation;
pub mod movement;
pub mod state;
