use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use serde::Serialize;

use crate::compressed_sink::{CompressedSink, Compression};
use crate::errors::HprofStripError;
use crate::keep_set::{KeepSet, KeepSetBuilder, PassStats};
use crate::paged_reader::PagedReader;
use crate::parser::gc_record::IdSize;
use crate::parser::record_cursor::HprofCursor;
use crate::rewriter::Rewriter;
use crate::utils::pretty_bytes_size;

const OUTPUT_BUFFER_SIZE: usize = 1024 * 1024;

#[derive(Debug, Clone, Default)]
pub struct StripOptions {
    pub compression: Compression,
    pub show_progress: bool,
}

#[derive(Debug, Serialize)]
pub struct StripSummary {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub input_bytes: u64,
    pub output_bytes: u64,
    pub format: String,
    pub id_size: IdSize,
    pub compression: Compression,
    pub passes: Vec<PassStats>,
    pub kept_ids: usize,
    pub classes: usize,
    pub records: u64,
    pub sub_records: u64,
    pub zeroed_bytes: u64,
    pub bytes_by_tag: BTreeMap<&'static str, u64>,
}

/// Strips `input` into a compressed, scrubbed copy at `output`.
pub fn strip(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
) -> Result<StripSummary, HprofStripError> {
    strip_with(input, output, &StripOptions::default())
}

pub fn strip_with(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    options: &StripOptions,
) -> Result<StripSummary, HprofStripError> {
    let input = input.as_ref();
    let output = output.as_ref();
    let mut cursor = HprofCursor::new(PagedReader::open(input)?)?;
    let input_bytes = cursor.length();
    info!(
        "Processing {} binary hprof file in '{}' format.",
        pretty_bytes_size(input_bytes),
        cursor.header().format
    );

    let pb = progress_bar(input_bytes, options.show_progress);
    let (keep, passes) = KeepSetBuilder::new(cursor.id_size()).build(&mut cursor, &pb)?;
    info!(
        "{} identifiers kept, {} classes, after {} passes",
        keep.len(),
        keep.class_count(),
        passes.len()
    );

    let compression = options.compression.resolve();
    info!("Writing {compression} output to {}", output.display());
    let partial = partial_path(output);
    pb.set_position(0);
    pb.set_message("rewrite");
    let rewritten = rewrite_into(&mut cursor, &keep, &partial, compression, &pb)
        .and_then(|stats| {
            fs::rename(&partial, output)?;
            Ok(stats)
        });
    pb.finish_and_clear();
    let (stats, output_bytes) = match rewritten {
        Ok(res) => res,
        Err(e) => {
            if let Err(cleanup) = fs::remove_file(&partial) {
                warn!("unable to remove {}: {cleanup}", partial.display());
            }
            return Err(e);
        }
    };

    Ok(StripSummary {
        input_path: input.to_path_buf(),
        output_path: output.to_path_buf(),
        input_bytes,
        output_bytes,
        format: cursor.header().format.clone(),
        id_size: cursor.id_size(),
        compression,
        passes,
        kept_ids: keep.len(),
        classes: keep.class_count(),
        records: stats.records,
        sub_records: stats.sub_records,
        zeroed_bytes: stats.zeroed_bytes,
        bytes_by_tag: stats.bytes_by_tag,
    })
}

fn rewrite_into(
    cursor: &mut HprofCursor<File>,
    keep: &KeepSet,
    path: &Path,
    compression: Compression,
    pb: &ProgressBar,
) -> Result<(crate::rewriter::RewriteStats, u64), HprofStripError> {
    let file = File::create(path)?;
    let sink = CompressedSink::new(BufWriter::with_capacity(OUTPUT_BUFFER_SIZE, file), compression)?;
    let (sink, stats) = Rewriter::new(keep, cursor.id_size(), sink).run(cursor, pb)?;
    let mut writer = sink.finish()?;
    writer.flush()?;
    let file = writer.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;
    let output_bytes = file.metadata()?.len();
    Ok((stats, output_bytes))
}

/// Default destination next to the input: `<stem>_stripped.hprof.<zstd|gz>`.
pub fn default_output_path(input: &Path, compression: Compression) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "dump".to_string());
    let file_name = format!("{stem}_stripped.hprof.{}", compression.file_extension());
    input.with_file_name(file_name)
}

fn partial_path(output: &Path) -> PathBuf {
    let mut name = output
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".partial");
    output.with_file_name(name)
}

fn progress_bar(len: u64, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {msg} [{bar:40.cyan/blue}] {bytes}/{total_bytes} (speed:{bytes_per_sec}) (eta:{eta})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    pb
}
