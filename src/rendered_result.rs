use std::fmt::Write;
use std::fs::File;
use std::io::BufWriter;

use chrono::Utc;
use hprof_strip::utils::{pretty_bytes_size, pretty_ratio};
use hprof_strip::{HprofStripError, StripSummary};
use indoc::formatdoc;

pub fn render_summary(summary: &StripSummary) -> String {
    let mut rendered = formatdoc!(
        "\nStripped heap dump summary:\n
        Input: {} ({})
        Output: {} ({}, {} of input)
        Format: {} with {}-byte identifiers
        Container: {}
        Keep passes: {}
        Identifiers kept: {}
        Classes: {}
        Records: {} ({} heap dump sub-records)
        Zeroed bytes: {}\n",
        summary.input_path.display(),
        pretty_bytes_size(summary.input_bytes),
        summary.output_path.display(),
        pretty_bytes_size(summary.output_bytes),
        pretty_ratio(summary.output_bytes, summary.input_bytes),
        summary.format,
        summary.id_size.bytes(),
        summary.compression,
        summary.passes.len(),
        summary.kept_ids,
        summary.classes,
        summary.records,
        summary.sub_records,
        pretty_bytes_size(summary.zeroed_bytes),
    );
    rendered.push_str("\nInput bytes per record tag:\n");
    let mut by_size: Vec<_> = summary.bytes_by_tag.iter().collect();
    by_size.sort_by(|a, b| b.1.cmp(a.1));
    for (tag, bytes) in by_size {
        writeln!(rendered, "{tag:>20} {:>12}", pretty_bytes_size(*bytes))
            .expect("could not write to rendered summary");
    }
    rendered
}

pub fn save_as_file(summary: &StripSummary) -> Result<(), HprofStripError> {
    let file_path = format!("hprof-strip-{}.json", Utc::now().timestamp_millis());
    let file = File::create(&file_path)?;
    let writer = BufWriter::new(file);
    serde_json::to_writer(writer, summary)?;
    println!("Output JSON summary file {file_path}");
    Ok(())
}
