use crate::paging::{PageTable, Pte, Vpn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Pid(pub usize);

/// Contiguous range of virtual pages with uniform protection and backing.
/// Both bounds are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Vma {
    pub start_vpage: usize,
    pub end_vpage: usize,
    pub write_protected: bool,
    pub file_mapped: bool,
}
impl Vma {
    pub fn contains(&self, vpage: Vpn) -> bool {
        (self.start_vpage..=self.end_vpage).contains(&vpage.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcStats {
    pub unmaps: u64,
    pub maps: u64,
    pub ins: u64,
    pub outs: u64,
    pub fins: u64,
    pub fouts: u64,
    pub zeros: u64,
    pub segv: u64,
    pub segprot: u64,
}

#[derive(Debug)]
pub struct Process {
    pub pid: Pid,
    pub page_table: PageTable,
    pub vmas: Vec<Vma>,
    pub stats: ProcStats,
}
impl Process {
    pub fn new(pid: Pid, vmas: Vec<Vma>) -> Self {
        Self {
            pid,
            page_table: PageTable::new(),
            vmas,
            stats: ProcStats::default(),
        }
    }

    /// VMAs do not overlap, so the first match is the only match.
    pub fn find_vma(&self, vpage: Vpn) -> Option<&Vma> {
        self.vmas.iter().find(|vma| vma.contains(vpage))
    }
}

pub struct ProcessManager {
    processes: Vec<Process>,
}
impl ProcessManager {
    pub fn new() -> Self {
        Self { processes: vec![] }
    }

    pub fn spawn_process(&mut self, process: Process) {
        self.processes.push(process);
    }

    pub fn process_count(&self) -> usize {
        self.processes.len()
    }

    pub fn get(&self, pid: Pid) -> &Process {
        &self.processes[pid.0]
    }

    pub fn get_mut_process(&mut self, pid: Pid) -> Option<&mut Process> {
        self.processes.get_mut(pid.0)
    }

    pub fn get_mut_pte(&mut self, pid: Pid, vpn: Vpn) -> &mut Pte {
        &mut self.processes[pid.0].page_table.entries[vpn.0]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Process> {
        self.processes.iter()
    }
}
impl Default for ProcessManager {
    fn default() -> Self {
        Self::new()
    }
}
