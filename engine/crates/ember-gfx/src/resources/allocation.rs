slotmap::new_key_type! {
    /// 后端内部的内存分配记录的 key
    ///
    /// Vulkan 后端中对应一个 `vk_mem::Allocation`，headless 后端中对应一段 host 内存
    pub struct AllocationKey;
}
