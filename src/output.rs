//! Writes a finished grid out as text: the viewport on the first line,
//! then one line per row of iteration counts.

use std::io::Write;

use errors::Result;
use grid::Grid;
use planes::Viewport;

/// Write `grid` to `out`.  The first line is `xmin ymin dx dy`; each
/// following line is a row, values separated by single spaces.
pub fn write_grid<W: Write>(out: &mut W, viewport: &Viewport, grid: &Grid) -> Result<()> {
    writeln!(
        out,
        "{} {} {} {}",
        viewport.xmin, viewport.ymin, viewport.dx, viewport.dy
    )?;
    for row in grid.rows()? {
        let line: Vec<String> = row.iter().map(|v| v.to_string()).collect();
        writeln!(out, "{}", line.join(" "))?;
    }
    out.flush()?;
    Ok(())
}
