pub mod allocation;
pub mod allocator;
pub mod buffer;
pub mod image;
pub mod sampler;
