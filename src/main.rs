use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use pagesim::error::SimError;
use pagesim::input::{self, Workload};
use pagesim::kernel::Kernel;
use pagesim::memory::MAX_FRAMES;
use pagesim::replacement::{
    Aging, Clock, Fifo, Nru, PageReplacementPolicy, Random, WorkingSet,
};
use pagesim::report;

/// Trace-driven virtual memory paging simulator.
#[derive(Parser)]
#[command(name = "pagesim", version, about)]
struct Cli {
    /// Number of physical frames (1..=128)
    #[arg(short = 'f', value_name = "NUM")]
    num_frames: usize,

    /// Replacement algorithm: f=FIFO r=Random c=Clock e=NRU a=Aging w=WorkingSet
    #[arg(short = 'a', value_name = "ALGO")]
    algorithm: char,

    /// Output selection, any of "OPFSxyf"
    #[arg(short = 'o', value_name = "OPTS", default_value = "")]
    options: String,

    /// Processes, VMAs and the instruction stream
    input_file: PathBuf,

    /// Pre-generated random numbers for the Random policy
    random_file: PathBuf,
}

struct OutputOptions {
    trace: bool,
    final_page_tables: bool,
    final_frame_table: bool,
    summary: bool,
    current_page_table: bool,
    all_page_tables: bool,
    frame_table_each: bool,
}
impl OutputOptions {
    fn parse(opts: &str) -> Self {
        Self {
            trace: opts.contains('O'),
            final_page_tables: opts.contains('P'),
            final_frame_table: opts.contains('F'),
            summary: opts.contains('S'),
            current_page_table: opts.contains('x'),
            all_page_tables: opts.contains('y'),
            frame_table_each: opts.contains('f'),
        }
    }
}

fn main() -> ExitCode {
    env_logger::init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            use clap::error::ErrorKind;
            let _ = err.print();
            // help and version are not argument errors
            return match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::FAILURE,
            };
        }
    };

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("pagesim: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<(), SimError> {
    if cli.num_frames == 0 || cli.num_frames > MAX_FRAMES {
        return Err(SimError::FrameCount(cli.num_frames));
    }

    let workload = Workload::from_file(&cli.input_file)?;
    let opts = OutputOptions::parse(&cli.options);
    let stdout = io::stdout();
    let mut out = stdout.lock();

    match cli.algorithm {
        'f' => simulate(workload, cli.num_frames, Fifo::new(), &opts, &mut out),
        'r' => {
            let values = input::read_random_file(&cli.random_file)?;
            simulate(workload, cli.num_frames, Random::new(values), &opts, &mut out)
        }
        'c' => simulate(workload, cli.num_frames, Clock::new(), &opts, &mut out),
        'e' => simulate(workload, cli.num_frames, Nru::new(), &opts, &mut out),
        'a' => simulate(workload, cli.num_frames, Aging::new(), &opts, &mut out),
        'w' => simulate(workload, cli.num_frames, WorkingSet::new(), &opts, &mut out),
        other => Err(SimError::UnknownAlgorithm(other)),
    }
}

fn simulate<P: PageReplacementPolicy>(
    workload: Workload,
    num_frames: usize,
    policy: P,
    opts: &OutputOptions,
    out: &mut impl Write,
) -> Result<(), SimError> {
    let Workload {
        processes,
        instructions,
    } = workload;
    let mut kernel = Kernel::new(policy, num_frames, processes);

    for &inst in &instructions {
        if opts.trace {
            writeln!(out, "{}: ==> {}", kernel.inst_count, inst)?;
        }
        let events = kernel.exec(inst)?;
        if opts.trace {
            for event in &events {
                writeln!(out, "{event}")?;
            }
        }
        if opts.current_page_table {
            if let Some(pid) = kernel.current {
                writeln!(out, "{}", report::page_table_line(kernel.pm.get(pid)))?;
            }
        }
        if opts.all_page_tables {
            for proc in kernel.pm.iter() {
                writeln!(out, "{}", report::page_table_line(proc))?;
            }
        }
        if opts.frame_table_each {
            writeln!(out, "{}", report::frame_table_line(&kernel.mm.frame_table))?;
        }
    }

    if opts.final_page_tables {
        for proc in kernel.pm.iter() {
            writeln!(out, "{}", report::page_table_line(proc))?;
        }
    }
    if opts.final_frame_table {
        writeln!(out, "{}", report::frame_table_line(&kernel.mm.frame_table))?;
    }
    if opts.summary {
        for proc in kernel.pm.iter() {
            writeln!(out, "{}", report::process_summary_line(proc))?;
        }
        writeln!(
            out,
            "{}",
            report::total_cost_line(
                kernel.inst_count,
                kernel.ctx_switches,
                kernel.process_exits,
                kernel.cost
            )
        )?;
    }

    Ok(())
}
