use std::io::{self, Write};

use serde::Serialize;

use crate::app::{BatchReport, CheckResult, ProgressEvent, ProgressSink};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Human,
    Json,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_batch(result: &BatchReport) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_check(result: &CheckResult) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

pub struct HumanOutput;

impl HumanOutput {
    pub fn print_batch(result: &BatchReport) {
        let ok: Vec<_> = result.succeeded.iter().map(|s| s.data_id.as_str()).collect();
        let bad: Vec<_> = result.failed.iter().map(|f| f.data_id.as_str()).collect();
        for success in &result.succeeded {
            println!("{} (sub-{}):", success.data_id, success.report.subject_id);
            for output in &success.report.outputs {
                for file in &output.files {
                    println!("  {file}");
                }
            }
            for skipped in &success.report.skipped {
                println!("  skipped {skipped}");
            }
        }
        for failure in &result.failed {
            println!("{} failed: {}", failure.data_id, failure.error);
        }
        println!("Data that ran: {ok:?}");
        println!("Data that did NOT run: {bad:?}");
    }

    pub fn print_check(result: &CheckResult) {
        if result.unknown.is_empty() {
            println!("All scan descriptions already known ({}).", result.known.len());
            return;
        }
        println!("Scan descriptions missing from the modality rules:");
        for entry in &result.unknown {
            println!("  {:?}  ({})", entry.description, entry.file);
        }
    }
}

impl ProgressSink for HumanOutput {
    fn event(&self, event: ProgressEvent) {
        eprintln!("{}", event.message);
    }
}
