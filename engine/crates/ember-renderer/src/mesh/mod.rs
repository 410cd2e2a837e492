pub mod mesh_asset;
pub mod upload;
pub mod vertex;
