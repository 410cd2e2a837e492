/// 帧序号与 frame slot 的对应关系
pub struct FrameCounter {
    /// 当前的帧序号，一直累加
    frame_id: u64,
    fif_count: usize,
}
// new & init
impl FrameCounter {
    pub fn new(init_frame_id: u64, fif_count: usize) -> Self {
        Self {
            frame_id: init_frame_id,
            fif_count: fif_count.max(1),
        }
    }
}
// update
impl FrameCounter {
    #[inline]
    pub fn next_frame(&mut self) {
        self.frame_id = self.frame_id.wrapping_add(1);
    }
}
// getters
impl FrameCounter {
    #[inline]
    pub fn frame_id(&self) -> u64 {
        self.frame_id
    }

    #[inline]
    pub fn fif_count(&self) -> usize {
        self.fif_count
    }

    /// `frame_id mod N`
    #[inline]
    pub fn slot_index(&self) -> usize {
        (self.frame_id % self.fif_count as u64) as usize
    }

    /// slot 的标签：A, B, C
    #[inline]
    pub fn frame_label(&self) -> char {
        Self::slot_label(self.slot_index())
    }

    #[inline]
    pub fn slot_label(slot_index: usize) -> char {
        (b'A' + (slot_index % 26) as u8) as char
    }

    #[inline]
    pub fn frame_name(&self) -> String {
        format!("[F{}{}]", self.frame_id, self.frame_label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_index_cycles() {
        let mut counter = FrameCounter::new(0, 3);
        let slots = (0..7)
            .map(|_| {
                let slot = counter.slot_index();
                counter.next_frame();
                slot
            })
            .collect::<Vec<_>>();
        assert_eq!(slots, vec![0, 1, 2, 0, 1, 2, 0]);
        assert_eq!(counter.frame_name(), "[F7B]");
    }

    #[test]
    fn frame_id_wraps() {
        let mut counter = FrameCounter::new(u64::MAX, 2);
        assert_eq!(counter.slot_index(), 1);
        counter.next_frame();
        assert_eq!(counter.frame_id(), 0);
        assert_eq!(counter.slot_index(), 0);
    }
}
