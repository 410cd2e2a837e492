pub mod frame_counter;
pub mod frame_loop;
pub mod frame_slot;
