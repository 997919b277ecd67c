use anyhow::{bail, Context, Result};
use hgtcache::{Interpolation, TileCache, VersionTag};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use super::CacheOptions;

/// Points resolved per call to the batch helper.
const CHUNK_SIZE: usize = 4096;

pub fn run(
    options: &CacheOptions,
    input: PathBuf,
    output: Option<PathBuf>,
    lat_col: &str,
    lon_col: &str,
    mode: Interpolation,
    version: Option<VersionTag>,
) -> Result<()> {
    let extension = input
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();
    if extension != "csv" {
        bail!("Unsupported file format: {}. Use .csv", extension);
    }

    // One resident tile at a time; input is grouped by tile per chunk
    let cache = options
        .builder(version)?
        .batch_mode(true)
        .build()
        .context("Failed to create tile cache")?;

    process_csv(&cache, &input, output, lat_col, lon_col, mode)
}

fn process_csv(
    cache: &TileCache,
    input: &Path,
    output: Option<PathBuf>,
    lat_col: &str,
    lon_col: &str,
    mode: Interpolation,
) -> Result<()> {
    let file = File::open(input).context("Failed to open input file")?;
    let mut reader = csv::Reader::from_reader(BufReader::new(file));

    // Find column indices
    let headers = reader.headers()?.clone();
    let lat_idx = headers
        .iter()
        .position(|h| h == lat_col)
        .with_context(|| format!("Column '{}' not found in CSV", lat_col))?;
    let lon_idx = headers
        .iter()
        .position(|h| h == lon_col)
        .with_context(|| format!("Column '{}' not found in CSV", lon_col))?;

    let records: Vec<csv::StringRecord> = reader.records().collect::<Result<_, _>>()?;

    let coords = records
        .iter()
        .enumerate()
        .map(|(line, record)| {
            let field = |idx: usize, what: &str| -> Result<f64> {
                record
                    .get(idx)
                    .with_context(|| format!("Missing {} on record {}", what, line + 1))?
                    .trim()
                    .parse()
                    .with_context(|| format!("Invalid {} on record {}", what, line + 1))
            };
            Ok((field(lat_idx, "latitude")?, field(lon_idx, "longitude")?))
        })
        .collect::<Result<Vec<(f64, f64)>>>()?;

    let pb = ProgressBar::new(coords.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
            )?
            .progress_chars("#>-"),
    );

    let mut elevations = Vec::with_capacity(coords.len());
    let mut failures = 0usize;
    for chunk in coords.chunks(CHUNK_SIZE) {
        for (result, &(lat, lon)) in cache.get_elevations_batch(chunk, mode).into_iter().zip(chunk) {
            let cell = match result {
                Ok(Some(elev)) if mode == Interpolation::Nearest => elev.to_string(),
                Ok(Some(elev)) => format!("{:.2}", elev),
                Ok(None) => "void".to_string(),
                Err(e) => {
                    tracing::warn!(lat, lon, error = %e, "elevation lookup failed");
                    failures += 1;
                    "error".to_string()
                }
            };
            elevations.push(cell);
        }
        pb.inc(chunk.len() as u64);
    }
    pb.finish_with_message("done");

    // Prepare output
    let output_path = match output {
        Some(path) => path,
        None => {
            let stem = input
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "points".to_string());
            input.with_file_name(format!("{}_elevation.csv", stem))
        }
    };
    let output_file = File::create(&output_path).context("Failed to create output file")?;
    let mut writer = csv::Writer::from_writer(BufWriter::new(output_file));

    let mut new_headers: Vec<&str> = headers.iter().collect();
    new_headers.push("elevation");
    writer.write_record(&new_headers)?;

    for (record, elevation) in records.iter().zip(&elevations) {
        let mut new_record: Vec<&str> = record.iter().collect();
        new_record.push(elevation);
        writer.write_record(&new_record)?;
    }
    writer.flush()?;

    if failures > 0 {
        eprintln!("{} of {} lookups failed", failures, coords.len());
    }
    let stats = cache.stats();
    tracing::info!(
        points = coords.len(),
        tiles_loaded = stats.miss_count,
        hit_rate = stats.hit_rate(),
        "batch finished"
    );

    println!("Output written to: {}", output_path.display());
    Ok(())
}
