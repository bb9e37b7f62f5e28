//! Flat reports: the per-function totals table and the JSON node-array
//! interchange consumed by the visualization front end.

use std::io::{self, Write};

use callprof_protocol::ProfNode;
use callprof_protocol::path::TOTAL;

use crate::merge::{FuncTotals, MergedProfile, Totals};

/// Write the function totals table, sorted ascending by total time.
///
/// Columns: total call count, total time in seconds, percent of the grand
/// total, function name. An undefined percentage (zero-duration run)
/// prints `NA` rather than a wrong number.
pub fn write_totals<W: Write>(out: &mut W, totals: &Totals) -> io::Result<()> {
    let grand_total = totals.get(TOTAL).map(|t| t.tot_time).unwrap_or(0.0);

    writeln!(out)?;
    writeln!(out, "Total     Total           Function")?;
    writeln!(out, "Calls     Time (s)    %   Name")?;

    let mut rows: Vec<(&String, &FuncTotals)> = totals.iter().collect();
    rows.sort_by(|a, b| a.1.tot_time.total_cmp(&b.1.tot_time));

    for (func, t) in rows {
        if grand_total > 0.0 {
            writeln!(
                out,
                "{:6} {:11.6} {:6.2} {}",
                t.tot_count,
                t.tot_time,
                t.tot_time / grand_total * 100.0,
                func,
            )?;
        } else {
            writeln!(out, "{:6} {:11.6} {:>6} {}", t.tot_count, t.tot_time, "NA", func)?;
        }
    }
    Ok(())
}

/// Serialize the call tree as the JSON node-array interchange format.
///
/// The array is sorted by path and excludes internal-only fields; feeding
/// it back through serde reproduces identical numeric fields.
pub fn write_tree_json<W: Write>(
    out: &mut W,
    profile: &MergedProfile,
    pretty: bool,
) -> Result<(), serde_json::Error> {
    let nodes: Vec<&ProfNode> = profile.nodes.values().collect();
    if pretty {
        serde_json::to_writer_pretty(out, &nodes)
    } else {
        serde_json::to_writer(out, &nodes)
    }
}
