pub mod draw_context;
pub mod scene_data;
pub mod scene_graph;
