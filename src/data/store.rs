use crate::backtest::engine::SimulationResult;
use crate::error::Result;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// Save all run results as a pretty-printed JSON array
pub fn save_results(results: &[SimulationResult], path: &Path) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, results)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

/// Load results written by `save_results`. Per-step records are not
/// persisted and come back empty.
pub fn load_results(path: &Path) -> Result<Vec<SimulationResult>> {
    let file = File::open(path)?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}
