pub mod growable_allocator;
pub mod layout_builder;
pub mod writer;
