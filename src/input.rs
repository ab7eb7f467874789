//! Parsing of the simulation input (processes, VMAs, instruction stream)
//! and the pre-generated random number file. All trace validation happens
//! here; the engine never sees an out-of-range pid or vpage.

use std::fs;
use std::path::Path;
use std::str::FromStr;

use crate::error::SimError;
use crate::kernel::Instruction;
use crate::paging::{Vpn, MAX_VPAGES};
use crate::process::{Pid, Process, Vma};

#[derive(Debug)]
pub struct Workload {
    pub processes: Vec<Process>,
    pub instructions: Vec<Instruction>,
}

impl Workload {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SimError> {
        let content = fs::read_to_string(path.as_ref()).map_err(|source| SimError::ReadFile {
            path: path.as_ref().to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Sections in order: process count, then per process a VMA count and
    /// that many VMA lines, then instructions until end of input. Lines
    /// starting with `#` and blank lines are skipped everywhere.
    pub fn parse(content: &str) -> Result<Self, SimError> {
        let mut lines = data_lines(content);

        let (ln, line) = next_line(&mut lines, "process count")?;
        let num_processes: usize = parse_field(ln, line.trim(), "process count")?;

        let mut processes = Vec::with_capacity(num_processes);
        for pid in 0..num_processes {
            let (ln, line) = next_line(&mut lines, "VMA count")?;
            let num_vmas: usize = parse_field(ln, line.trim(), "VMA count")?;
            let mut vmas = Vec::with_capacity(num_vmas);
            for _ in 0..num_vmas {
                let (ln, line) = next_line(&mut lines, "VMA specification")?;
                vmas.push(parse_vma(ln, line)?);
            }
            processes.push(Process::new(Pid(pid), vmas));
        }

        let mut instructions = Vec::new();
        for (ln, line) in lines {
            instructions.push(parse_instruction(ln, line, num_processes)?);
        }

        Ok(Self {
            processes,
            instructions,
        })
    }
}

/// Load the random number ring. The first value in the file is a count
/// and is not part of the ring.
pub fn read_random_file<P: AsRef<Path>>(path: P) -> Result<Vec<i32>, SimError> {
    let content = fs::read_to_string(path.as_ref()).map_err(|source| SimError::ReadFile {
        path: path.as_ref().to_path_buf(),
        source,
    })?;
    parse_random(&content)
}

pub fn parse_random(content: &str) -> Result<Vec<i32>, SimError> {
    let mut values = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        for token in line.split_whitespace() {
            values.push(parse_field::<i32>(idx + 1, token, "random value")?);
        }
    }
    if values.len() < 2 {
        return Err(SimError::UnexpectedEof {
            expected: "a count and at least one random value".into(),
        });
    }
    values.remove(0);
    Ok(values)
}

fn data_lines(content: &str) -> impl Iterator<Item = (usize, &str)> {
    content
        .lines()
        .enumerate()
        .map(|(idx, line)| (idx + 1, line))
        .filter(|(_, line)| !line.starts_with('#') && !line.trim().is_empty())
}

fn next_line<'a>(
    lines: &mut impl Iterator<Item = (usize, &'a str)>,
    expected: &str,
) -> Result<(usize, &'a str), SimError> {
    lines.next().ok_or_else(|| SimError::UnexpectedEof {
        expected: expected.into(),
    })
}

fn parse_field<T: FromStr>(line: usize, token: &str, what: &str) -> Result<T, SimError> {
    token.parse().map_err(|_| SimError::Parse {
        line,
        msg: format!("invalid {what}: `{token}`"),
    })
}

fn parse_flag(line: usize, token: &str, what: &str) -> Result<bool, SimError> {
    match token {
        "0" => Ok(false),
        "1" => Ok(true),
        _ => Err(SimError::Parse {
            line,
            msg: format!("{what} must be 0 or 1, got `{token}`"),
        }),
    }
}

fn parse_vma(ln: usize, line: &str) -> Result<Vma, SimError> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() != 4 {
        return Err(SimError::Parse {
            line: ln,
            msg: format!("expected 4 VMA fields, got {}", fields.len()),
        });
    }
    let start_vpage: usize = parse_field(ln, fields[0], "start vpage")?;
    let end_vpage: usize = parse_field(ln, fields[1], "end vpage")?;
    if end_vpage >= MAX_VPAGES || start_vpage > end_vpage {
        return Err(SimError::Parse {
            line: ln,
            msg: format!("VMA range {start_vpage}..={end_vpage} is not within 0..{MAX_VPAGES}"),
        });
    }
    Ok(Vma {
        start_vpage,
        end_vpage,
        write_protected: parse_flag(ln, fields[2], "write_protected")?,
        file_mapped: parse_flag(ln, fields[3], "file_mapped")?,
    })
}

fn parse_instruction(ln: usize, line: &str, num_processes: usize) -> Result<Instruction, SimError> {
    let mut fields = line.split_whitespace();
    let op = fields.next().unwrap_or_default();
    let value_token = fields.next().ok_or_else(|| SimError::Parse {
        line: ln,
        msg: "instruction is missing its operand".into(),
    })?;
    // anything after the operand is ignored
    let value: usize = parse_field(ln, value_token, "instruction operand")?;

    match op {
        "c" | "e" => {
            if value >= num_processes {
                return Err(SimError::Parse {
                    line: ln,
                    msg: format!("pid {value} out of range, {num_processes} processes declared"),
                });
            }
            let pid = Pid(value);
            Ok(if op == "c" {
                Instruction::ContextSwitch(pid)
            } else {
                Instruction::Exit(pid)
            })
        }
        "r" | "w" => {
            if value >= MAX_VPAGES {
                return Err(SimError::Parse {
                    line: ln,
                    msg: format!("vpage {value} out of range 0..{MAX_VPAGES}"),
                });
            }
            let vpn = Vpn(value);
            Ok(if op == "r" {
                Instruction::Read(vpn)
            } else {
                Instruction::Write(vpn)
            })
        }
        other => Err(SimError::Parse {
            line: ln,
            msg: format!("unknown instruction `{other}`"),
        }),
    }
}
