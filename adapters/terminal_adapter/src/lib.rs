use std::io::{self, BufRead, BufReader, Stdin, Stdout, Write};
use std::sync::Mutex;
use sweeper_core::domain::{AnnotateChoice, ScanSummary};
use sweeper_core::error::SweepError;
use sweeper_core::ports::{Operator, Result};
use sweeper_core::utils::describe_timestamp;

const DELETE_TOKEN: &str = "yes";
const MARK_CHOICE: &str = "1";

/// Interactive operator reading answers line by line from a terminal
pub struct TerminalOperator<R, W> {
    input: Mutex<R>,
    output: Mutex<W>,
    assume_yes: bool,
}

impl TerminalOperator<BufReader<Stdin>, Stdout> {
    pub fn stdio(assume_yes: bool) -> Self {
        Self::new(BufReader::new(io::stdin()), io::stdout(), assume_yes)
    }
}

impl<R: BufRead, W: Write> TerminalOperator<R, W> {
    /// With `assume_yes` the summary is still printed but no line is read
    pub fn new(input: R, output: W, assume_yes: bool) -> Self {
        Self {
            input: Mutex::new(input),
            output: Mutex::new(output),
            assume_yes,
        }
    }

    pub fn into_output(self) -> W {
        self.output.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_summary(&self, out: &mut W, summary: &ScanSummary, with_ranges: bool) -> io::Result<()> {
        writeln!(out)?;
        writeln!(out, "发现 {} 条时间戳错误的记录", summary.count)?;
        if with_ranges {
            if let Some((earliest, latest)) = &summary.event_at_range {
                writeln!(
                    out,
                    "时间范围: {} ~ {}",
                    describe_timestamp(earliest),
                    describe_timestamp(latest)
                )?;
            }
            if let Some((lowest, highest)) = &summary.id_range {
                writeln!(out, "ID 范围: {} ~ {}", lowest, highest)?;
            }
        }
        Ok(())
    }

    /// Prints `prompt` and returns the answer without its line terminator.
    /// EOF reads as an empty answer.
    fn ask(&self, out: &mut W, prompt: &str, assumed: &str) -> io::Result<String> {
        write!(out, "{}", prompt)?;
        if self.assume_yes {
            writeln!(out, "{}", assumed)?;
            out.flush()?;
            return Ok(assumed.to_string());
        }
        out.flush()?;

        let mut line = String::new();
        let mut input = self.input.lock().map_err(|_| poisoned())?;
        input.read_line(&mut line)?;
        Ok(strip_line_terminator(&line).to_string())
    }
}

fn poisoned() -> io::Error {
    io::Error::new(io::ErrorKind::Other, "terminal lock poisoned")
}

fn strip_line_terminator(line: &str) -> &str {
    line.strip_suffix('\n')
        .map(|rest| rest.strip_suffix('\r').unwrap_or(rest))
        .unwrap_or(line)
}

/// Only the exact token counts, ignoring ASCII case; surrounding spaces do not.
pub fn is_delete_confirmation(answer: &str) -> bool {
    answer.eq_ignore_ascii_case(DELETE_TOKEN)
}

pub fn parse_annotate_choice(answer: &str) -> AnnotateChoice {
    if answer == MARK_CHOICE {
        AnnotateChoice::Mark
    } else {
        AnnotateChoice::StatsOnly
    }
}

impl<R, W> Operator for TerminalOperator<R, W>
where
    R: BufRead + Send,
    W: Write + Send,
{
    fn confirm_deletion(&self, summary: &ScanSummary) -> Result<bool> {
        let mut out = self.output.lock().map_err(|_| SweepError::Prompt(poisoned()))?;
        self.write_summary(&mut *out, summary, false)?;
        let answer = self.ask(&mut *out, "确认删除这些记录? (yes/no): ", DELETE_TOKEN)?;
        Ok(is_delete_confirmation(&answer))
    }

    fn choose_annotation(&self, summary: &ScanSummary) -> Result<AnnotateChoice> {
        let mut out = self.output.lock().map_err(|_| SweepError::Prompt(poisoned()))?;
        self.write_summary(&mut *out, summary, true)?;
        let answer = self.ask(
            &mut *out,
            "\n选择操作:\n1. 标记这些记录（在 extra 字段添加标记）\n2. 仅显示统计信息\n请输入 (1/2): ",
            MARK_CHOICE,
        )?;
        Ok(parse_annotate_choice(&answer))
    }
}
