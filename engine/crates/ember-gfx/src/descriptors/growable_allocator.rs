use std::rc::Rc;

use ash::vk;
use itertools::Itertools;

use crate::{error::GfxResult, foundation::device::GfxDevice};

/// 每种 descriptor 类型占 set 数量的比例
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoolSizeRatio {
    pub descriptor_type: vk::DescriptorType,
    pub ratio: f32,
}

impl PoolSizeRatio {
    pub const fn new(descriptor_type: vk::DescriptorType, ratio: f32) -> Self {
        Self { descriptor_type, ratio }
    }
}

/// 可增长的 descriptor 分配器
///
/// 维护两个列表：ready 中的 pool 还有余量，full 中的 pool 已经耗尽。
/// - pool 只有在分配失败（OUT_OF_POOL_MEMORY / FRAGMENTED_POOL）之后才会进入 full
/// - full 中的 pool 只有在 [`Self::clear_pools`] 之后才会回到 ready
/// - 每创建一个新 pool，下一次的尺寸乘以 1.5，直到上限
///
/// 每次分配后都把使用的 pool 放回 ready 的栈顶，下一次分配仍然会取到同一个 pool，
/// 直到它耗尽为止。
pub struct DescriptorAllocatorGrowable {
    device: Rc<dyn GfxDevice>,
    ratios: Vec<PoolSizeRatio>,
    ready_pools: Vec<vk::DescriptorPool>,
    full_pools: Vec<vk::DescriptorPool>,
    sets_per_pool: u32,
    max_sets_per_pool: u32,
    name: String,

    /// 一共创建过的 pool 数量，用于日志和调试名
    created_pools: usize,
}

impl DescriptorAllocatorGrowable {
    pub const GROWTH_FACTOR: f32 = 1.5;
    pub const DEFAULT_MAX_SETS_PER_POOL: u32 = 4092;
}

// new & init
impl DescriptorAllocatorGrowable {
    pub fn new(device: Rc<dyn GfxDevice>, max_sets: u32, ratios: &[PoolSizeRatio], name: &str) -> GfxResult<Self> {
        Self::new_with_cap(device, max_sets, ratios, Self::DEFAULT_MAX_SETS_PER_POOL, name)
    }

    /// `cap` 为单个 pool 的 set 数量上限
    pub fn new_with_cap(
        device: Rc<dyn GfxDevice>,
        max_sets: u32,
        ratios: &[PoolSizeRatio],
        cap: u32,
        name: &str,
    ) -> GfxResult<Self> {
        let max_sets = max_sets.max(1);
        let mut allocator = Self {
            device,
            ratios: ratios.to_vec(),
            ready_pools: vec![],
            full_pools: vec![],
            sets_per_pool: 0,
            max_sets_per_pool: cap.max(max_sets),
            name: name.to_string(),
            created_pools: 0,
        };

        let first_pool = allocator.create_pool(max_sets)?;
        allocator.ready_pools.push(first_pool);
        allocator.sets_per_pool = allocator.grow(max_sets);

        Ok(allocator)
    }
}

// getters
impl DescriptorAllocatorGrowable {
    /// 下一次新建 pool 时使用的 set 数量
    #[inline]
    pub fn sets_per_pool(&self) -> u32 {
        self.sets_per_pool
    }

    #[inline]
    pub fn max_sets_per_pool(&self) -> u32 {
        self.max_sets_per_pool
    }

    #[inline]
    pub fn ready_pool_count(&self) -> usize {
        self.ready_pools.len()
    }

    #[inline]
    pub fn full_pool_count(&self) -> usize {
        self.full_pools.len()
    }

    #[inline]
    pub fn created_pool_count(&self) -> usize {
        self.created_pools
    }
}

// tools
impl DescriptorAllocatorGrowable {
    /// 优先复用 ready 中的 pool，否则按照当前尺寸新建一个，并让下一次的尺寸增长
    ///
    /// 取出的 pool 不在任何列表中，调用方负责放回 ready 或者 full
    pub fn get_pool(&mut self) -> GfxResult<vk::DescriptorPool> {
        if let Some(pool) = self.ready_pools.pop() {
            return Ok(pool);
        }

        let pool = self.create_pool(self.sets_per_pool)?;
        self.sets_per_pool = self.grow(self.sets_per_pool);
        Ok(pool)
    }

    /// 分配一个 descriptor set
    ///
    /// 当前 pool 耗尽时换一个新的 pool 重试一次，第二次失败直接返回错误：
    /// 一个全新的 pool 也放不下，说明 layout 与 ratio 的配置有问题
    pub fn allocate(&mut self, layout: vk::DescriptorSetLayout) -> GfxResult<vk::DescriptorSet> {
        let mut pool = self.get_pool()?;

        let set = match self.device.allocate_descriptor_set(pool, layout) {
            Ok(set) => set,
            Err(e) if e.is_pool_exhausted() => {
                self.full_pools.push(pool);
                pool = self.get_pool()?;
                match self.device.allocate_descriptor_set(pool, layout) {
                    Ok(set) => set,
                    Err(e) => {
                        log::error!("descriptor allocator `{}`: retry on a fresh pool failed: {}", self.name, e);
                        self.ready_pools.push(pool);
                        return Err(e);
                    }
                }
            }
            Err(e) => {
                self.ready_pools.push(pool);
                return Err(e);
            }
        };

        self.ready_pools.push(pool);
        Ok(set)
    }

    /// 重置所有 pool，full 中的 pool 回到 ready
    ///
    /// 之前分配的 descriptor set 全部失效，只能在 GPU 不再使用它们时调用
    pub fn clear_pools(&mut self) -> GfxResult<()> {
        for &pool in &self.ready_pools {
            self.device.reset_descriptor_pool(pool)?;
        }
        while let Some(pool) = self.full_pools.pop() {
            self.device.reset_descriptor_pool(pool)?;
            self.ready_pools.push(pool);
        }
        Ok(())
    }

    /// 销毁所有的 pool，只在 shutdown 时使用
    pub fn destroy_pools(&mut self) {
        for pool in self.ready_pools.drain(..).chain(self.full_pools.drain(..)) {
            self.device.destroy_descriptor_pool(pool);
        }
    }

    fn grow(&self, sets: u32) -> u32 {
        let grown = (sets as f32 * Self::GROWTH_FACTOR) as u32;
        grown.clamp(sets, self.max_sets_per_pool)
    }

    fn create_pool(&mut self, set_count: u32) -> GfxResult<vk::DescriptorPool> {
        let pool_sizes = self
            .ratios
            .iter()
            .map(|ratio| vk::DescriptorPoolSize {
                ty: ratio.descriptor_type,
                descriptor_count: ((ratio.ratio * set_count as f32) as u32).max(1),
            })
            .collect_vec();

        let debug_name = format!("{}-{}", self.name, self.created_pools);
        let pool = self.device.create_descriptor_pool(set_count, &pool_sizes, &debug_name)?;
        self.created_pools += 1;
        log::info!("descriptor allocator `{}`: created pool #{} with {} sets", self.name, self.created_pools, set_count);
        Ok(pool)
    }
}

impl Drop for DescriptorAllocatorGrowable {
    fn drop(&mut self) {
        if !self.ready_pools.is_empty() || !self.full_pools.is_empty() {
            log::warn!("descriptor allocator `{}` dropped without destroy_pools", self.name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        descriptors::layout_builder::DescriptorLayoutBuilder,
        headless::{GpuEvent, HeadlessDevice},
    };

    const UBO: [PoolSizeRatio; 1] = [PoolSizeRatio::new(vk::DescriptorType::UNIFORM_BUFFER, 1.0)];

    fn ubo_layout(device: &HeadlessDevice) -> vk::DescriptorSetLayout {
        DescriptorLayoutBuilder::new()
            .add_binding(0, vk::DescriptorType::UNIFORM_BUFFER)
            .build(device, vk::ShaderStageFlags::VERTEX, vk::DescriptorSetLayoutCreateFlags::empty(), "ubo")
            .unwrap()
    }

    fn created_pool_sizes(device: &HeadlessDevice) -> Vec<u32> {
        device
            .events()
            .into_iter()
            .filter_map(|e| match e {
                GpuEvent::DescriptorPoolCreated { max_sets, .. } => Some(max_sets),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn init_sizes_next_pool_one_and_a_half_times() {
        let headless = Rc::new(HeadlessDevice::new());
        let mut allocator = DescriptorAllocatorGrowable::new(headless.clone(), 10, &UBO, "test").unwrap();
        assert_eq!(allocator.sets_per_pool(), 15);
        assert_eq!(allocator.ready_pool_count(), 1);
        assert_eq!(created_pool_sizes(&headless), vec![10]);
        allocator.destroy_pools();
    }

    #[test]
    fn pool_growth_is_monotonic_and_capped() {
        let headless = Rc::new(HeadlessDevice::new());
        let mut allocator = DescriptorAllocatorGrowable::new_with_cap(headless.clone(), 8, &UBO, 40, "growth").unwrap();

        // 第一次取到的是 init 创建的 pool
        let mut pools = vec![allocator.get_pool().unwrap()];
        for _ in 0..6 {
            pools.push(allocator.get_pool().unwrap());
        }

        let sizes = created_pool_sizes(&headless);
        assert_eq!(sizes, vec![8, 12, 18, 27, 40, 40, 40]);
        assert!(sizes.windows(2).all(|w| w[0] <= w[1]));
        assert!(sizes.iter().all(|&s| s <= 40));
        assert_eq!(allocator.sets_per_pool(), 40);

        for pool in pools {
            headless.destroy_descriptor_pool(pool);
        }
        allocator.destroy_pools();
    }

    #[test]
    fn exhaustion_grows_exactly_once() {
        const M: u32 = 4;
        let headless = Rc::new(HeadlessDevice::new());
        let layout = ubo_layout(&headless);
        let mut allocator = DescriptorAllocatorGrowable::new(headless.clone(), M, &UBO, "exhaust").unwrap();

        let sets = (0..=M).map(|_| allocator.allocate(layout).unwrap()).collect::<Vec<_>>();

        assert_eq!(sets.len(), M as usize + 1);
        assert_eq!(sets.iter().unique().count(), sets.len());
        assert!(sets.iter().all(|&set| headless.is_descriptor_set_valid(set)));
        assert_eq!(created_pool_sizes(&headless), vec![M, 6]);
        assert_eq!(allocator.full_pool_count(), 1);
        assert_eq!(allocator.ready_pool_count(), 1);

        allocator.destroy_pools();
        headless.destroy_descriptor_set_layout(layout);
    }

    #[test]
    fn clear_pools_recycles_full_pools() {
        let headless = Rc::new(HeadlessDevice::new());
        let layout = ubo_layout(&headless);
        let mut allocator = DescriptorAllocatorGrowable::new(headless.clone(), 2, &UBO, "clear").unwrap();

        let old_sets = (0..3).map(|_| allocator.allocate(layout).unwrap()).collect::<Vec<_>>();
        assert_eq!(allocator.full_pool_count(), 1);

        allocator.clear_pools().unwrap();
        assert_eq!(allocator.full_pool_count(), 0);
        assert_eq!(allocator.ready_pool_count(), 2);
        // reset 之后之前的 set 都失效
        assert!(old_sets.iter().all(|&set| !headless.is_descriptor_set_valid(set)));

        // 复用已有的 pool，不再创建新的
        let created = allocator.created_pool_count();
        for _ in 0..4 {
            allocator.allocate(layout).unwrap();
        }
        assert_eq!(allocator.created_pool_count(), created);

        allocator.destroy_pools();
        headless.destroy_descriptor_set_layout(layout);
    }

    #[test]
    fn second_failure_is_an_error() {
        let headless = Rc::new(HeadlessDevice::new());
        // layout 需要 4 个 uniform buffer，任何一个 pool 都放不下
        let layout = DescriptorLayoutBuilder::new()
            .add_binding(0, vk::DescriptorType::UNIFORM_BUFFER)
            .add_binding(1, vk::DescriptorType::UNIFORM_BUFFER)
            .add_binding(2, vk::DescriptorType::UNIFORM_BUFFER)
            .add_binding(3, vk::DescriptorType::UNIFORM_BUFFER)
            .build(&*headless, vk::ShaderStageFlags::ALL, vk::DescriptorSetLayoutCreateFlags::empty(), "wide")
            .unwrap();
        let ratios = [PoolSizeRatio::new(vk::DescriptorType::UNIFORM_BUFFER, 0.5)];
        let mut allocator = DescriptorAllocatorGrowable::new(headless.clone(), 2, &ratios, "fail").unwrap();

        let err = allocator.allocate(layout).unwrap_err();
        assert!(err.is_pool_exhausted());
        // 只重试了一次：init 的 pool + 一个新 pool
        assert_eq!(allocator.created_pool_count(), 2);

        allocator.destroy_pools();
        headless.destroy_descriptor_set_layout(layout);
    }

    #[test]
    fn destroy_pools_releases_everything() {
        let headless = Rc::new(HeadlessDevice::new());
        let layout = ubo_layout(&headless);
        let mut allocator = DescriptorAllocatorGrowable::new(headless.clone(), 1, &UBO, "destroy").unwrap();
        allocator.allocate(layout).unwrap();
        allocator.allocate(layout).unwrap();
        allocator.destroy_pools();
        headless.destroy_descriptor_set_layout(layout);

        assert_eq!(allocator.ready_pool_count() + allocator.full_pool_count(), 0);
        assert_eq!(headless.live_object_count(), 0);
    }
}
