use std::collections::VecDeque;

use log::debug;

use crate::hardware::mmu::Mmu;
use crate::paging::{Pfn, Vpn};
use crate::process::{Pid, ProcessManager};
use crate::replacement::PageReplacementPolicy;

pub const MAX_FRAMES: usize = 128;

pub struct MemoryManager<P: PageReplacementPolicy> {
    pub frame_table: FrameTable,
    pub mmu: Mmu,
    free_frames: VecDeque<Pfn>,
    policy: P,
}
impl<P: PageReplacementPolicy> MemoryManager<P> {
    pub fn new(policy: P, num_frames: usize) -> Self {
        Self {
            frame_table: FrameTable::new(num_frames),
            mmu: Mmu::new(),
            free_frames: (0..num_frames).map(Pfn).collect(),
            policy,
        }
    }

    /// Free frames are handed out in queue order; the policy is consulted
    /// only once the queue is empty.
    pub fn allocate_frame(&mut self, pm: &mut ProcessManager, now: u64) -> Pfn {
        if let Some(pfn) = self.free_frames.pop_front() {
            debug!("allocated free frame {}", pfn.0);
            return pfn;
        }
        let victim = self.policy.pick_victim(&mut self.frame_table, pm, now);
        debug!("selected victim frame {}", victim.0);
        victim
    }

    /// Return a frame to the free queue (process exit teardown).
    pub fn release_frame(&mut self, pfn: Pfn) {
        self.frame_table.entries[pfn.0].clear();
        self.free_frames.push_back(pfn);
    }

    pub fn reset_age(&mut self, pfn: Pfn) {
        self.policy.reset_age(&mut self.frame_table, pfn);
    }

    pub fn free_frame_count(&self) -> usize {
        self.free_frames.len()
    }
}

pub struct FrameTable {
    pub entries: Vec<FrameTableEntry>,
}
impl FrameTable {
    pub fn new(num_frames: usize) -> Self {
        let mut entries = Vec::with_capacity(num_frames);
        for _ in 0..num_frames {
            entries.push(FrameTableEntry::new());
        }
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub struct FrameTableEntry {
    pub pid: Option<Pid>,
    pub vpn: Option<Vpn>,
    pub age: u32,
    pub last_used: u64,
}
impl FrameTableEntry {
    pub fn new() -> Self {
        Self {
            pid: None,
            vpn: None,
            age: 0,
            last_used: 0,
        }
    }

    pub fn is_free(&self) -> bool {
        self.pid.is_none()
    }

    pub fn clear(&mut self) {
        self.pid = None;
        self.vpn = None;
    }

    pub fn assign(&mut self, pid: Pid, vpn: Vpn) {
        self.pid = Some(pid);
        self.vpn = Some(vpn);
    }
}
impl Default for FrameTableEntry {
    fn default() -> Self {
        Self::new()
    }
}
