use crate::source::{DumpSource, Origin};
use crate::tokenizer::StatementTokenizer;
use anyhow::Context;
use std::io::{self, Write};
use std::time::Instant;

pub fn run(source: String, limit: Option<usize>, json: bool) -> anyhow::Result<()> {
    let origin = Origin::resolve(&source);
    let dump = DumpSource::open(&origin)
        .with_context(|| format!("failed to open {}", origin.describe()))?;

    let start = Instant::now();
    let statements = StatementTokenizer::new(dump).take(limit.unwrap_or(usize::MAX));

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut count = 0u64;

    if json {
        let collected = statements.collect::<Result<Vec<_>, _>>()?;
        count = collected.len() as u64;
        writeln!(out, "{}", serde_json::to_string_pretty(&collected)?)?;
    } else {
        for statement in statements {
            let statement = statement?;
            count += 1;
            writeln!(out, "-- statement #{}", count)?;
            writeln!(out, "{}", statement)?;
            writeln!(out)?;
        }
    }
    out.flush()?;

    eprintln!(
        "{} statements from {} in {:.3?}",
        count,
        origin.describe(),
        start.elapsed()
    );
    Ok(())
}
