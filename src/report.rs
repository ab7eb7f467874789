//! Line formatting for the page-table, frame-table, and summary output.
//! Builders return `String`s so the byte layout can be asserted in tests.

use std::fmt::Write;

use crate::memory::FrameTable;
use crate::paging::Pte;
use crate::process::Process;

/// `PT[0]: * 1:RMS # ...` — one token per virtual page, each followed by a
/// space: `R/M/S` flags when present, `#` for a swapped-out page, `*`
/// otherwise.
pub fn page_table_line(proc: &Process) -> String {
    let mut line = format!("PT[{}]: ", proc.pid.0);
    for (vpage, pte) in proc.page_table.entries.iter().enumerate() {
        if pte.present() {
            let _ = write!(
                line,
                "{}:{}{}{} ",
                vpage,
                if pte.referenced() { 'R' } else { '-' },
                if pte.modified() { 'M' } else { '-' },
                if pte.pagedout() { 'S' } else { '-' },
            );
        } else if pte.pagedout() {
            line.push_str("# ");
        } else {
            line.push_str("* ");
        }
    }
    line
}

/// `FT: 0:3 1:12 * ...` — occupant per frame, `*` when free.
pub fn frame_table_line(frame_table: &FrameTable) -> String {
    let mut line = String::from("FT:");
    for fte in &frame_table.entries {
        match (fte.pid, fte.vpn) {
            (Some(pid), Some(vpn)) => {
                let _ = write!(line, " {}:{}", pid.0, vpn.0);
            }
            _ => line.push_str(" *"),
        }
    }
    line
}

pub fn process_summary_line(proc: &Process) -> String {
    let s = &proc.stats;
    format!(
        "PROC[{}]: U={} M={} I={} O={} FI={} FO={} Z={} SV={} SP={}",
        proc.pid.0,
        s.unmaps,
        s.maps,
        s.ins,
        s.outs,
        s.fins,
        s.fouts,
        s.zeros,
        s.segv,
        s.segprot
    )
}

pub fn total_cost_line(inst_count: u64, ctx_switches: u64, process_exits: u64, cost: u64) -> String {
    format!(
        "TOTALCOST {} {} {} {} {}",
        inst_count,
        ctx_switches,
        process_exits,
        cost,
        std::mem::size_of::<Pte>()
    )
}
