use crate::memory::FrameTable;
use crate::paging::Pfn;
use crate::process::ProcessManager;

/// Working-set window, in instructions.
pub const TAU: u64 = 49;

/// NRU clears all reference bits once this many instructions have passed.
const REFERENCE_RESET_PERIOD: u64 = 10;

/// Victim selection runs only when no free frame exists, so every frame a
/// policy scans is occupied.
pub trait PageReplacementPolicy {
    fn pick_victim(&mut self, frame_table: &mut FrameTable, pm: &mut ProcessManager, now: u64)
        -> Pfn;

    fn reset_age(&mut self, _frame_table: &mut FrameTable, _pfn: Pfn) {}
}

pub struct Fifo {
    hand: usize,
}
impl Fifo {
    pub fn new() -> Self {
        Self { hand: 0 }
    }
}
impl PageReplacementPolicy for Fifo {
    fn pick_victim(
        &mut self,
        frame_table: &mut FrameTable,
        _pm: &mut ProcessManager,
        _now: u64,
    ) -> Pfn {
        let victim = self.hand;
        self.hand = (self.hand + 1) % frame_table.len();
        Pfn(victim)
    }
}
impl Default for Fifo {
    fn default() -> Self {
        Self::new()
    }
}

/// Replays a pre-generated ring of numbers, wrapping on exhaustion.
pub struct Random {
    values: Vec<i32>,
    ofs: usize,
}
impl Random {
    pub fn new(values: Vec<i32>) -> Self {
        Self { values, ofs: 0 }
    }
}
impl PageReplacementPolicy for Random {
    fn pick_victim(
        &mut self,
        frame_table: &mut FrameTable,
        _pm: &mut ProcessManager,
        _now: u64,
    ) -> Pfn {
        let r = self.values[self.ofs];
        self.ofs = (self.ofs + 1) % self.values.len();
        Pfn(r.rem_euclid(frame_table.len() as i32) as usize)
    }
}

pub struct Clock {
    hand: usize,
}
impl Clock {
    pub fn new() -> Self {
        Self { hand: 0 }
    }
}
impl PageReplacementPolicy for Clock {
    fn pick_victim(
        &mut self,
        frame_table: &mut FrameTable,
        pm: &mut ProcessManager,
        _now: u64,
    ) -> Pfn {
        let n = frame_table.len();
        loop {
            let fte = &frame_table.entries[self.hand];
            let pid = fte.pid.expect("clock scanned a free frame");
            let vpn = fte.vpn.expect("clock scanned a free frame");
            let pte = pm.get_mut_pte(pid, vpn);
            if pte.referenced() {
                pte.set_referenced(false);
                self.hand = (self.hand + 1) % n;
            } else {
                let victim = self.hand;
                self.hand = (self.hand + 1) % n;
                return Pfn(victim);
            }
        }
    }
}
impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

/// Not-recently-used: victims are ranked by the class `(R << 1) | M`,
/// lowest first, scan order breaking ties.
pub struct Nru {
    hand: usize,
    last_reset: u64,
}
impl Nru {
    pub fn new() -> Self {
        Self {
            hand: 0,
            last_reset: 0,
        }
    }
}
impl PageReplacementPolicy for Nru {
    fn pick_victim(
        &mut self,
        frame_table: &mut FrameTable,
        pm: &mut ProcessManager,
        now: u64,
    ) -> Pfn {
        let n = frame_table.len();

        if now - self.last_reset >= REFERENCE_RESET_PERIOD {
            for fte in frame_table.entries.iter() {
                if let (Some(pid), Some(vpn)) = (fte.pid, fte.vpn) {
                    pm.get_mut_pte(pid, vpn).set_referenced(false);
                }
            }
            self.last_reset = now;
        }

        let start = self.hand;
        let mut best_class = 4u32;
        let mut victim = start;
        let mut idx = start;
        loop {
            let fte = &frame_table.entries[idx];
            if let (Some(pid), Some(vpn)) = (fte.pid, fte.vpn) {
                let pte = pm.get_mut_pte(pid, vpn);
                let class = (u32::from(pte.referenced()) << 1) | u32::from(pte.modified());
                if class < best_class {
                    best_class = class;
                    victim = idx;
                }
                if best_class == 0 {
                    break;
                }
            }
            idx = (idx + 1) % n;
            if idx == start {
                break;
            }
        }

        // the hand moves by one per selection, wherever the victim was
        self.hand = (start + 1) % n;
        Pfn(victim)
    }
}
impl Default for Nru {
    fn default() -> Self {
        Self::new()
    }
}

/// Exponentially decayed reference history: one 32-bit shift register per
/// frame, refreshed on every selection.
pub struct Aging {
    hand: usize,
}
impl Aging {
    pub fn new() -> Self {
        Self { hand: 0 }
    }
}
impl PageReplacementPolicy for Aging {
    fn pick_victim(
        &mut self,
        frame_table: &mut FrameTable,
        pm: &mut ProcessManager,
        _now: u64,
    ) -> Pfn {
        let n = frame_table.len();
        let start = self.hand;
        let mut min_age = u32::MAX;
        let mut victim = start;
        let mut idx = start;
        loop {
            let fte = &mut frame_table.entries[idx];
            if let (Some(pid), Some(vpn)) = (fte.pid, fte.vpn) {
                let pte = pm.get_mut_pte(pid, vpn);
                fte.age >>= 1;
                if pte.referenced() {
                    fte.age |= 0x8000_0000;
                    pte.set_referenced(false);
                }
                if fte.age < min_age {
                    min_age = fte.age;
                    victim = idx;
                }
            }
            idx = (idx + 1) % n;
            if idx == start {
                break;
            }
        }

        frame_table.entries[victim].age = 0;
        self.hand = (victim + 1) % n;
        Pfn(victim)
    }

    fn reset_age(&mut self, frame_table: &mut FrameTable, pfn: Pfn) {
        frame_table.entries[pfn.0].age = 0;
    }
}
impl Default for Aging {
    fn default() -> Self {
        Self::new()
    }
}

/// A frame idle for more than TAU instructions has left the working set
/// and is taken immediately; otherwise the least recently used frame goes.
pub struct WorkingSet {
    hand: usize,
}
impl WorkingSet {
    pub fn new() -> Self {
        Self { hand: 0 }
    }
}
impl PageReplacementPolicy for WorkingSet {
    fn pick_victim(
        &mut self,
        frame_table: &mut FrameTable,
        pm: &mut ProcessManager,
        now: u64,
    ) -> Pfn {
        let n = frame_table.len();
        let start = self.hand;
        let mut oldest = u64::MAX;
        let mut victim = start;
        let mut idx = start;
        loop {
            let fte = &mut frame_table.entries[idx];
            if let (Some(pid), Some(vpn)) = (fte.pid, fte.vpn) {
                let pte = pm.get_mut_pte(pid, vpn);
                if pte.referenced() {
                    fte.last_used = now;
                    pte.set_referenced(false);
                } else if now - fte.last_used > TAU {
                    self.hand = (idx + 1) % n;
                    return Pfn(idx);
                }
                if fte.last_used < oldest {
                    oldest = fte.last_used;
                    victim = idx;
                }
            }
            idx = (idx + 1) % n;
            if idx == start {
                break;
            }
        }

        self.hand = (victim + 1) % n;
        Pfn(victim)
    }
}
impl Default for WorkingSet {
    fn default() -> Self {
        Self::new()
    }
}
