use std::fmt;

use log::debug;

use crate::error::SimError;
use crate::hardware::mmu::{Operation, TranslationResult};
use crate::memory::MemoryManager;
use crate::paging::{Pfn, Vpn, MAX_VPAGES};
use crate::process::{Pid, Process, ProcessManager};
use crate::replacement::PageReplacementPolicy;

/// Cycle charges per simulated operation.
pub mod cost {
    pub const READ_WRITE: u64 = 1;
    pub const CTX_SWITCH: u64 = 130;
    pub const PROC_EXIT: u64 = 400;
    pub const MAP: u64 = 300;
    pub const UNMAP: u64 = 400;
    pub const IN: u64 = 3200;
    pub const OUT: u64 = 3000;
    pub const FIN: u64 = 1500;
    pub const FOUT: u64 = 1523;
    pub const ZERO: u64 = 140;
    pub const SEGV: u64 = 444;
    pub const SEGPROT: u64 = 340;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    ContextSwitch(Pid),
    Exit(Pid),
    Read(Vpn),
    Write(Vpn),
}
impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::ContextSwitch(pid) => write!(f, "c {}", pid.0),
            Instruction::Exit(pid) => write!(f, "e {}", pid.0),
            Instruction::Read(vpn) => write!(f, "r {}", vpn.0),
            Instruction::Write(vpn) => write!(f, "w {}", vpn.0),
        }
    }
}

/// Paging events in the order the handler raised them, one trace line each.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Unmap { pid: Pid, vpage: Vpn },
    Out,
    In,
    Fin,
    Fout,
    Zero,
    Map(Pfn),
    Segv,
    Segprot,
}
impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Unmap { pid, vpage } => write!(f, "UNMAP {}:{}", pid.0, vpage.0),
            Event::Out => write!(f, "OUT"),
            Event::In => write!(f, "IN"),
            Event::Fin => write!(f, "FIN"),
            Event::Fout => write!(f, "FOUT"),
            Event::Zero => write!(f, "ZERO"),
            Event::Map(pfn) => write!(f, "MAP {}", pfn.0),
            Event::Segv => write!(f, "SEGV"),
            Event::Segprot => write!(f, "SEGPROT"),
        }
    }
}

pub struct Kernel<P: PageReplacementPolicy> {
    pub mm: MemoryManager<P>,
    pub pm: ProcessManager,
    pub current: Option<Pid>,
    pub inst_count: u64,
    pub ctx_switches: u64,
    pub process_exits: u64,
    pub cost: u64,
}

impl<P: PageReplacementPolicy> Kernel<P> {
    pub fn new(policy: P, num_frames: usize, processes: Vec<Process>) -> Self {
        let mut pm = ProcessManager::new();
        for process in processes {
            pm.spawn_process(process);
        }
        Self {
            mm: MemoryManager::new(policy, num_frames),
            pm,
            current: None,
            inst_count: 0,
            ctx_switches: 0,
            process_exits: 0,
            cost: 0,
        }
    }

    /// Execute one instruction and return the paging events it produced.
    pub fn exec(&mut self, inst: Instruction) -> Result<Vec<Event>, SimError> {
        let mut events = Vec::new();
        match inst {
            Instruction::ContextSwitch(pid) => self.context_switch(pid),
            Instruction::Exit(pid) => self.exit_process(pid, &mut events),
            Instruction::Read(vpage) => self.reference(vpage, Operation::Read, &mut events)?,
            Instruction::Write(vpage) => self.reference(vpage, Operation::Write, &mut events)?,
        }
        self.inst_count += 1;
        Ok(events)
    }

    /// Switching to the process already running is free, as is the switch
    /// away from a just-exited process; the very first switch still counts.
    fn context_switch(&mut self, pid: Pid) {
        if self.current != Some(pid) && (self.current.is_some() || self.ctx_switches == 0) {
            self.ctx_switches += 1;
            self.cost += cost::CTX_SWITCH;
        }
        self.current = Some(pid);
    }

    fn exit_process(&mut self, pid: Pid, events: &mut Vec<Event>) {
        debug!("process {} exiting", pid.0);
        for i in 0..MAX_VPAGES {
            let vpn = Vpn(i);
            let pte = *self.pm.get_mut_pte(pid, vpn);
            if pte.present() {
                events.push(Event::Unmap { pid, vpage: vpn });
                self.stats_mut(pid).unmaps += 1;
                self.cost += cost::UNMAP;
                if pte.modified() && pte.file_mapped() {
                    events.push(Event::Fout);
                    self.stats_mut(pid).fouts += 1;
                    self.cost += cost::FOUT;
                }
                self.mm.release_frame(pte.frame());
            }
            // swap and file history dies with the process
            self.pm.get_mut_pte(pid, vpn).clear();
        }
        self.process_exits += 1;
        self.cost += cost::PROC_EXIT;
        if self.current == Some(pid) {
            self.current = None;
        }
    }

    fn reference(
        &mut self,
        vpage: Vpn,
        operation: Operation,
        events: &mut Vec<Event>,
    ) -> Result<(), SimError> {
        let pid = self.current.ok_or(SimError::NoCurrentProcess {
            inst: self.inst_count,
        })?;

        let mut result = self.mm.mmu.translate(
            &mut self
                .pm
                .get_mut_process(pid)
                .expect("current process exists")
                .page_table,
            vpage,
            operation,
        );

        if result == TranslationResult::PageFault {
            if !self.handle_page_fault(pid, vpage, events) {
                self.cost += cost::READ_WRITE;
                return Ok(());
            }
            // the page is mapped now; re-run the access itself
            result = self.mm.mmu.translate(
                &mut self
                    .pm
                    .get_mut_process(pid)
                    .expect("current process exists")
                    .page_table,
                vpage,
                operation,
            );
            debug_assert!(result != TranslationResult::PageFault);
        }

        if result == TranslationResult::ProtectionFault {
            events.push(Event::Segprot);
            self.stats_mut(pid).segprot += 1;
            self.cost += cost::SEGPROT;
        }

        self.cost += cost::READ_WRITE;
        Ok(())
    }

    /// Map `vpage` for `pid`, evicting whatever holds the chosen frame.
    /// Returns false when the page lies outside every VMA.
    fn handle_page_fault(&mut self, pid: Pid, vpage: Vpn, events: &mut Vec<Event>) -> bool {
        let proc = self
            .pm
            .get_mut_process(pid)
            .expect("current process exists");
        let Some(vma) = proc.find_vma(vpage).copied() else {
            events.push(Event::Segv);
            proc.stats.segv += 1;
            self.cost += cost::SEGV;
            return false;
        };

        let pfn = self.mm.allocate_frame(&mut self.pm, self.inst_count);

        let occupant = {
            let fte = &self.mm.frame_table.entries[pfn.0];
            fte.pid.zip(fte.vpn)
        };
        if let Some((old_pid, old_vpn)) = occupant {
            debug!("evicting {}:{} from frame {}", old_pid.0, old_vpn.0, pfn.0);
            events.push(Event::Unmap {
                pid: old_pid,
                vpage: old_vpn,
            });
            self.stats_mut(old_pid).unmaps += 1;
            self.cost += cost::UNMAP;

            let old_pte = self.pm.get_mut_pte(old_pid, old_vpn);
            let was_modified = old_pte.modified();
            let was_file_mapped = old_pte.file_mapped();
            old_pte.evict();
            if was_modified {
                if was_file_mapped {
                    events.push(Event::Fout);
                    self.stats_mut(old_pid).fouts += 1;
                    self.cost += cost::FOUT;
                } else {
                    // the page now has a swap copy to come back from
                    self.pm.get_mut_pte(old_pid, old_vpn).set_pagedout(true);
                    events.push(Event::Out);
                    self.stats_mut(old_pid).outs += 1;
                    self.cost += cost::OUT;
                }
            }
        }

        let pagedout = self.pm.get_mut_pte(pid, vpage).pagedout();
        let proc = self
            .pm
            .get_mut_process(pid)
            .expect("current process exists");
        if vma.file_mapped {
            events.push(Event::Fin);
            proc.stats.fins += 1;
            self.cost += cost::FIN;
        } else if pagedout {
            events.push(Event::In);
            proc.stats.ins += 1;
            self.cost += cost::IN;
        } else {
            events.push(Event::Zero);
            proc.stats.zeros += 1;
            self.cost += cost::ZERO;
        }

        events.push(Event::Map(pfn));
        proc.stats.maps += 1;
        self.cost += cost::MAP;

        let pte = &mut proc.page_table.entries[vpage.0];
        pte.set_present(true);
        pte.set_frame(pfn);
        pte.set_write_protect(vma.write_protected);
        pte.set_file_mapped(vma.file_mapped);
        pte.set_referenced(true);

        let fte = &mut self.mm.frame_table.entries[pfn.0];
        fte.assign(pid, vpage);
        fte.last_used = self.inst_count;
        self.mm.reset_age(pfn);
        debug!("mapped {}:{} into frame {}", pid.0, vpage.0, pfn.0);
        true
    }

    fn stats_mut(&mut self, pid: Pid) -> &mut crate::process::ProcStats {
        &mut self
            .pm
            .get_mut_process(pid)
            .expect("pids are validated at parse time")
            .stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::Workload;
    use crate::replacement::Fifo;

    fn run(input: &str, num_frames: usize) -> (Kernel<Fifo>, Vec<Vec<Event>>) {
        let workload = Workload::parse(input).unwrap();
        let mut kernel = Kernel::new(Fifo::new(), num_frames, workload.processes);
        let events = workload
            .instructions
            .iter()
            .map(|&inst| kernel.exec(inst).unwrap())
            .collect();
        (kernel, events)
    }

    #[test]
    fn pages_zero_fill_until_frames_run_out() {
        let (kernel, events) = run(
            "1\n1\n0 7 0 0\nc 0\nr 0\nr 1\nr 2\nr 3\nr 4\n",
            4,
        );
        for (i, frame) in (1..=4).zip(0..4) {
            assert_eq!(events[i], vec![Event::Zero, Event::Map(Pfn(frame))]);
        }
        // the fifth reference evicts the first frame handed out
        assert_eq!(
            events[5],
            vec![
                Event::Unmap {
                    pid: Pid(0),
                    vpage: Vpn(0)
                },
                Event::Zero,
                Event::Map(Pfn(0)),
            ]
        );
        let stats = kernel.pm.get(Pid(0)).stats;
        assert_eq!(stats.maps, 5);
        assert_eq!(stats.unmaps, 1);
        assert_eq!(stats.zeros, 5);
    }

    #[test]
    fn two_processes_ping_pong_on_one_frame() {
        let (kernel, events) = run(
            "2\n1\n0 0 0 0\n1\n0 0 0 0\nc 0\nr 0\nc 1\nr 0\nc 0\nr 0\n",
            1,
        );
        assert_eq!(events[1], vec![Event::Zero, Event::Map(Pfn(0))]);
        assert_eq!(
            events[3],
            vec![
                Event::Unmap {
                    pid: Pid(0),
                    vpage: Vpn(0)
                },
                Event::Zero,
                Event::Map(Pfn(0)),
            ]
        );
        assert_eq!(
            events[5],
            vec![
                Event::Unmap {
                    pid: Pid(1),
                    vpage: Vpn(0)
                },
                Event::Zero,
                Event::Map(Pfn(0)),
            ]
        );
        assert_eq!(kernel.ctx_switches, 3);
    }

    #[test]
    fn out_of_vma_reference_is_a_segv_and_nothing_else() {
        let (kernel, events) = run("1\n1\n0 0 0 0\nc 0\nr 5\n", 4);
        assert_eq!(events[1], vec![Event::Segv]);
        let proc = kernel.pm.get(Pid(0));
        assert_eq!(proc.stats.segv, 1);
        assert_eq!(proc.stats.maps, 0);
        assert!(proc.page_table.entries.iter().all(|pte| !pte.present()));
        assert_eq!(kernel.mm.free_frame_count(), 4);
    }

    #[test]
    fn protected_write_faults_in_the_page_then_raises_segprot() {
        let (kernel, events) = run("1\n1\n0 0 1 0\nc 0\nw 0\nw 0\n", 4);
        assert_eq!(
            events[1],
            vec![Event::Zero, Event::Map(Pfn(0)), Event::Segprot]
        );
        assert_eq!(events[2], vec![Event::Segprot]);
        let pte = kernel.pm.get(Pid(0)).page_table.entries[0];
        assert!(pte.present());
        assert!(pte.referenced());
        assert!(!pte.modified());
        assert_eq!(kernel.pm.get(Pid(0)).stats.segprot, 2);
    }

    #[test]
    fn file_mapped_write_protected_write_does_not_dirty() {
        let (kernel, events) = run("1\n1\n0 0 1 1\nc 0\nw 0\n", 1);
        assert_eq!(
            events[1],
            vec![Event::Fin, Event::Map(Pfn(0)), Event::Segprot]
        );
        assert!(!kernel.pm.get(Pid(0)).page_table.entries[0].modified());
    }

    #[test]
    fn file_mapped_reads_dirty_the_page() {
        let (kernel, events) = run("1\n1\n0 0 0 1\nc 0\nr 0\n", 1);
        assert_eq!(events[1], vec![Event::Fin, Event::Map(Pfn(0))]);
        assert!(kernel.pm.get(Pid(0)).page_table.entries[0].modified());
    }

    #[test]
    fn dirty_anonymous_pages_swap_out_and_back_in() {
        let (kernel, events) = run("1\n1\n0 1 0 0\nc 0\nw 0\nr 1\nr 0\n", 1);
        // page 0 is dirty when page 1 claims the only frame
        assert_eq!(
            events[2],
            vec![
                Event::Unmap {
                    pid: Pid(0),
                    vpage: Vpn(0)
                },
                Event::Out,
                Event::Zero,
                Event::Map(Pfn(0)),
            ]
        );
        // page 1 is clean, so no OUT; page 0 returns from swap
        assert_eq!(
            events[3],
            vec![
                Event::Unmap {
                    pid: Pid(0),
                    vpage: Vpn(1)
                },
                Event::In,
                Event::Map(Pfn(0)),
            ]
        );
        let stats = kernel.pm.get(Pid(0)).stats;
        assert_eq!(stats.outs, 1);
        assert_eq!(stats.ins, 1);
        assert_eq!(stats.zeros, 2);
        assert!(kernel.pm.get(Pid(0)).page_table.entries[0].pagedout());
    }

    #[test]
    fn clean_fault_in_does_not_mark_pagedout() {
        let (kernel, _) = run("1\n1\n0 0 0 0\nc 0\nr 0\n", 1);
        assert!(!kernel.pm.get(Pid(0)).page_table.entries[0].pagedout());
    }

    #[test]
    fn exit_unmaps_writes_back_and_frees() {
        let (kernel, events) = run("1\n2\n0 0 0 1\n1 1 0 0\nc 0\nw 0\nw 1\ne 0\n", 4);
        assert_eq!(
            events[3],
            vec![
                Event::Unmap {
                    pid: Pid(0),
                    vpage: Vpn(0)
                },
                Event::Fout,
                Event::Unmap {
                    pid: Pid(0),
                    vpage: Vpn(1)
                },
            ]
        );
        assert_eq!(kernel.mm.free_frame_count(), 4);
        assert!(kernel.mm.frame_table.entries.iter().all(|f| f.is_free()));
        let proc = kernel.pm.get(Pid(0));
        assert!(proc
            .page_table
            .entries
            .iter()
            .all(|pte| *pte == crate::paging::Pte::default()));
        assert_eq!(proc.stats.fouts, 1);
        assert_eq!(kernel.process_exits, 1);
        assert_eq!(kernel.current, None);
    }

    #[test]
    fn exit_clears_swap_history_of_non_present_pages() {
        // page 0 gets swapped out, then sits non-present while the process exits
        let (kernel, _) = run("1\n1\n0 1 0 0\nc 0\nw 0\nr 1\ne 0\n", 1);
        assert!(!kernel.pm.get(Pid(0)).page_table.entries[0].pagedout());
    }

    #[test]
    fn context_switch_accounting() {
        let (kernel, _) = run(
            "2\n1\n0 0 0 0\n1\n0 0 0 0\nc 0\nc 0\nc 1\ne 1\nc 0\n",
            1,
        );
        // counted: the first c 0 and c 1; the repeat c 0 is a no-op and the
        // switch after the exit finds no current process
        assert_eq!(kernel.ctx_switches, 2);
        assert_eq!(kernel.cost, 2 * cost::CTX_SWITCH + cost::PROC_EXIT);
    }

    #[test]
    fn first_context_switch_always_counts() {
        let (kernel, _) = run("1\n1\n0 0 0 0\nc 0\n", 1);
        assert_eq!(kernel.ctx_switches, 1);
        assert_eq!(kernel.cost, cost::CTX_SWITCH);
    }

    #[test]
    fn reference_without_current_process_is_an_input_error() {
        let workload = Workload::parse("1\n1\n0 0 0 0\nr 0\n").unwrap();
        let mut kernel = Kernel::new(Fifo::new(), 1, workload.processes);
        assert!(kernel.exec(workload.instructions[0]).is_err());
    }

    #[test]
    fn cost_accounting_matches_the_table() {
        let (kernel, _) = run("1\n1\n0 1 0 0\nc 0\nr 0\nw 0\ne 0\n", 2);
        // c 0: 130; r 0: 140 + 300 + 1; w 0: 1; e 0: 400 + 400
        assert_eq!(kernel.cost, 130 + 441 + 1 + 800);
        assert_eq!(kernel.inst_count, 4);
    }

    #[test]
    fn instruction_and_event_display_forms() {
        assert_eq!(Instruction::ContextSwitch(Pid(2)).to_string(), "c 2");
        assert_eq!(Instruction::Read(Vpn(17)).to_string(), "r 17");
        assert_eq!(
            Event::Unmap {
                pid: Pid(1),
                vpage: Vpn(44)
            }
            .to_string(),
            "UNMAP 1:44"
        );
        assert_eq!(Event::Map(Pfn(7)).to_string(), "MAP 7");
        assert_eq!(Event::Segprot.to_string(), "SEGPROT");
    }
}
