use std::io::Write;
use std::path::Path;
use std::{fs::File, io::BufWriter};

use anyhow::{Context, Result};
use itertools::Itertools;

use crate::multilayer::PowerResult;
use crate::ray::Ray;
use crate::summary::TraceSummary;


/// Writes a summary as pretty JSON.
pub fn write_summary(path: &Path, summary: &TraceSummary) -> Result<()> {
    let file = File::create(path).with_context(|| format!("failed to create {:?}", path))?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, summary).context("failed to write summary")?;
    Ok(())
}

/// Writes one line per recorded point: `id status index x y z t`.
pub fn write_rays<'a>(path: &Path, rays: impl IntoIterator<Item = &'a Ray>) -> Result<()> {
    let file = File::create(path).with_context(|| format!("failed to create {:?}", path))?;
    let mut writer = BufWriter::new(file);
    writeln!(writer, "# id status point x y z t")?;
    for ray in rays {
        for (i, point) in ray.points().iter().enumerate() {
            let coords = point.position.iter().map(|c| format!("{:.9e}", c)).join(" ");
            writeln!(
                writer,
                "{} {} {} {} {:.9e}",
                ray.id(),
                ray.status(),
                i,
                coords,
                point.time
            )?;
        }
    }
    writer.flush()?;
    Ok(())
}

/// Writes `x R T A` columns of a multilayer sweep.
pub fn write_tmm_sweep(path: &Path, x: &[f64], results: &[PowerResult]) -> Result<()> {
    let file = File::create(path).with_context(|| format!("failed to create {:?}", path))?;
    let mut writer = BufWriter::new(file);
    writeln!(writer, "# x reflectance transmittance absorptance")?;
    for (x, r) in x.iter().zip(results) {
        writeln!(
            writer,
            "{:.9e} {:.9} {:.9} {:.9}",
            x,
            r.reflectance,
            r.transmittance,
            r.absorptance()
        )?;
    }
    writer.flush()?;
    Ok(())
}
