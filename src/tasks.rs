//! Task descriptors, and the partitioner that cuts a grid into them.
//!
//! A partitioner walks the grid with a cursor and hands out tasks in a
//! fixed order: spans of the flattened grid in linear mode, or blocks
//! that advance along a band of rows, then wrap to the next band.  Any
//! task touching the right or bottom edge is clipped, never padded, so
//! the union of all tasks is exactly the grid.

use itertools::Either;
use std::cmp::min;

use planes::Pixel;

/// The dimensions of a grid.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Shape {
    /// Number of rows (the height).
    pub rows: usize,
    /// Number of columns (the width).
    pub cols: usize,
}

impl Shape {
    /// Constructor, rows first.
    pub fn new(rows: usize, cols: usize) -> Shape {
        Shape { rows, cols }
    }

    /// Total number of cells.
    pub fn len(&self) -> usize {
        self.rows * self.cols
    }

    /// True if either dimension is zero.
    pub fn is_empty(&self) -> bool {
        self.rows == 0 || self.cols == 0
    }

    /// The row-major offset of a cell.
    #[inline]
    pub fn offset(&self, pixel: &Pixel) -> usize {
        pixel.1 * self.cols + pixel.0
    }
}

/// How the grid is cut into tasks.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Tiling {
    /// Contiguous spans of the flattened grid, `task_size` cells each.
    Linear,
    /// Square blocks with an edge of `task_size` cells.
    Rectangular,
    /// Blocks one row high and `task_size` cells wide.
    RowSegments,
}

impl Tiling {
    /// Block height and width for a given task size, or `None` for the
    /// linear tiling.
    fn tile(self, task_size: usize) -> Option<(usize, usize)> {
        match self {
            Tiling::Linear => None,
            Tiling::Rectangular => Some((task_size, task_size)),
            Tiling::RowSegments => Some((1, task_size)),
        }
    }
}

/// One unit of work.  Immutable once made.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Task {
    /// `len` cells of the flattened grid starting at `offset`.
    Span {
        /// Row-major offset of the first cell.
        offset: usize,
        /// Number of cells.
        len: usize,
    },
    /// A rectangle with its upper-left cell at `(row, col)`.
    Block {
        /// First row.
        row: usize,
        /// First column.
        col: usize,
        /// Number of rows.
        height: usize,
        /// Number of columns.
        width: usize,
    },
}

impl Task {
    /// Number of cells the task covers.
    pub fn len(&self) -> usize {
        match *self {
            Task::Span { len, .. } => len,
            Task::Block { height, width, .. } => height * width,
        }
    }

    /// Number of cells, or `None` if a block's area overflows.
    pub fn checked_len(&self) -> Option<usize> {
        match *self {
            Task::Span { len, .. } => Some(len),
            Task::Block { height, width, .. } => height.checked_mul(width),
        }
    }

    /// True if the task covers no cells.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True if every cell of the task lies inside the grid.
    pub fn fits(&self, shape: Shape) -> bool {
        match *self {
            Task::Span { offset, len } => offset
                .checked_add(len)
                .map_or(false, |end| end <= shape.len()),
            Task::Block {
                row,
                col,
                height,
                width,
            } => {
                row.checked_add(height).map_or(false, |end| end <= shape.rows)
                    && col.checked_add(width).map_or(false, |end| end <= shape.cols)
            }
        }
    }

    /// The `i`th cell of the task, in row-major order.
    #[inline]
    pub fn cell(&self, i: usize, cols: usize) -> Pixel {
        match *self {
            Task::Span { offset, .. } => {
                let offset = offset + i;
                Pixel(offset % cols, offset / cols)
            }
            Task::Block { row, col, width, .. } => Pixel(col + i % width, row + i / width),
        }
    }

    /// Every cell of the task, in row-major order.
    pub fn cells(&self, cols: usize) -> impl Iterator<Item = Pixel> {
        match *self {
            Task::Span { offset, len } => {
                Either::Left((offset..offset + len).map(move |o| Pixel(o % cols, o / cols)))
            }
            Task::Block {
                row,
                col,
                height,
                width,
            } => Either::Right(
                iproduct!(row..row + height, col..col + width).map(|(r, c)| Pixel(c, r)),
            ),
        }
    }
}

/// Where the partitioner resumes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Cursor {
    /// Offset of the next span.
    Linear(usize),
    /// Row and column of the next block.
    Block(usize, usize),
}

/// Cuts a grid into tasks.
#[derive(Copy, Clone, Debug)]
pub struct Partitioner {
    shape: Shape,
    tiling: Tiling,
    task_size: usize,
}

impl Partitioner {
    /// A partitioner for the grid.  `task_size` is the span length in
    /// linear mode and the tile edge otherwise; it must be at least one.
    pub fn new(shape: Shape, tiling: Tiling, task_size: usize) -> Partitioner {
        assert!(task_size > 0, "task size must be positive");
        Partitioner {
            shape,
            tiling,
            task_size,
        }
    }

    /// The grid being partitioned.
    pub fn shape(&self) -> Shape {
        self.shape
    }

    /// The cursor of the first task.
    pub fn start(&self) -> Cursor {
        match self.tiling {
            Tiling::Linear => Cursor::Linear(0),
            _ => Cursor::Block(0, 0),
        }
    }

    /// The task at `cursor` and the cursor after it, or `None` once the
    /// grid is exhausted.
    pub fn next(&self, cursor: Cursor) -> Option<(Task, Cursor)> {
        let Shape { rows, cols } = self.shape;
        match (cursor, self.tiling.tile(self.task_size)) {
            (Cursor::Linear(offset), None) => {
                if offset >= self.shape.len() {
                    return None;
                }
                let len = min(self.task_size, self.shape.len() - offset);
                Some((Task::Span { offset, len }, Cursor::Linear(offset + len)))
            }
            (Cursor::Block(row, col), Some((tile_height, tile_width))) => {
                if row >= rows || col >= cols {
                    return None;
                }
                let task = Task::Block {
                    row,
                    col,
                    height: min(tile_height, rows - row),
                    width: min(tile_width, cols - col),
                };
                // Check the column bound before moving down a band, so
                // the band is finished before the next one starts.
                let next = if col.saturating_add(tile_width) >= cols {
                    Cursor::Block(row.saturating_add(tile_height), 0)
                } else {
                    Cursor::Block(row, col + tile_width)
                };
                Some((task, next))
            }
            _ => None,
        }
    }

    /// Every task, in order.
    pub fn tasks(&self) -> Tasks {
        Tasks {
            partitioner: *self,
            cursor: Some(self.start()),
        }
    }

    /// How many tasks the grid is cut into.
    pub fn count(&self) -> usize {
        match self.tiling.tile(self.task_size) {
            None => div_ceil(self.shape.len(), self.task_size),
            Some((h, w)) => div_ceil(self.shape.rows, h) * div_ceil(self.shape.cols, w),
        }
    }

    /// The number of cells in the largest task.
    pub fn max_task_len(&self) -> usize {
        match self.tiling.tile(self.task_size) {
            None => min(self.task_size, self.shape.len()),
            Some((h, w)) => min(h, self.shape.rows) * min(w, self.shape.cols),
        }
    }
}

fn div_ceil(extent: usize, size: usize) -> usize {
    if extent == 0 {
        0
    } else {
        (extent - 1) / size + 1
    }
}

/// Iterator over a partitioner's tasks.
#[derive(Clone, Debug)]
pub struct Tasks {
    partitioner: Partitioner,
    cursor: Option<Cursor>,
}

impl Iterator for Tasks {
    type Item = Task;

    fn next(&mut self) -> Option<Task> {
        let cursor = self.cursor.take()?;
        let (task, next) = self.partitioner.next(cursor)?;
        self.cursor = Some(next);
        Some(task)
    }
}

/// The smallest task size that cuts the grid into no more than `count`
/// tasks.  Block tilings cannot always get that low (row segments never
/// make fewer tasks than there are rows); those get the largest size.
pub fn task_size_for_count(shape: Shape, tiling: Tiling, count: usize) -> usize {
    let count = count.max(1);
    let largest = shape.rows.max(shape.cols).max(1);
    match tiling {
        Tiling::Linear => div_ceil(shape.rows.saturating_mul(shape.cols), count).max(1),
        _ => (1..=largest)
            .find(|&size| Partitioner::new(shape, tiling, size).count() <= count)
            .unwrap_or(largest),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cmp::min;
    use std::collections::HashSet;

    fn covered(partitioner: &Partitioner) -> Vec<usize> {
        let shape = partitioner.shape();
        let mut hits = vec![0; shape.len()];
        for task in partitioner.tasks() {
            assert!(task.fits(shape), "{:?} leaves {:?}", task, shape);
            for pixel in task.cells(shape.cols) {
                hits[shape.offset(&pixel)] += 1;
            }
        }
        hits
    }

    #[test]
    fn every_cell_covered_once() {
        for &tiling in &[Tiling::Linear, Tiling::Rectangular, Tiling::RowSegments] {
            for rows in 2..9 {
                for cols in 2..9 {
                    for task_size in 1..11 {
                        let p = Partitioner::new(Shape::new(rows, cols), tiling, task_size);
                        let hits = covered(&p);
                        assert!(
                            hits.iter().all(|&h| h == 1),
                            "{:?} {}x{} size {}: {:?}",
                            tiling,
                            rows,
                            cols,
                            task_size,
                            hits
                        );
                        assert_eq!(p.tasks().count(), p.count());
                    }
                }
            }
        }
    }

    #[test]
    fn four_by_four_blocks_of_three() {
        let p = Partitioner::new(Shape::new(4, 4), Tiling::Rectangular, 3);
        let tasks: Vec<Task> = p.tasks().collect();
        assert_eq!(
            tasks,
            vec![
                Task::Block { row: 0, col: 0, height: 3, width: 3 },
                Task::Block { row: 0, col: 3, height: 3, width: 1 },
                Task::Block { row: 3, col: 0, height: 1, width: 3 },
                Task::Block { row: 3, col: 3, height: 1, width: 1 },
            ]
        );
        assert_eq!(tasks.iter().map(Task::len).sum::<usize>(), 16);
    }

    #[test]
    fn four_by_four_spans_of_three() {
        let p = Partitioner::new(Shape::new(4, 4), Tiling::Linear, 3);
        let lens: Vec<usize> = p.tasks().map(|t| t.len()).collect();
        assert_eq!(lens, vec![3, 3, 3, 3, 3, 1]);
    }

    #[test]
    fn edge_tasks_are_clipped_not_padded() {
        let p = Partitioner::new(Shape::new(7, 5), Tiling::Rectangular, 4);
        for task in p.tasks() {
            if let Task::Block { row, col, height, width } = task {
                assert!(height <= 4 && width <= 4);
                assert_eq!(height, min(4, 7 - row));
                assert_eq!(width, min(4, 5 - col));
            }
        }
        let last = Partitioner::new(Shape::new(3, 3), Tiling::Linear, 4).tasks().last();
        assert_eq!(last, Some(Task::Span { offset: 8, len: 1 }));
    }

    #[test]
    fn row_segments_stay_in_one_row() {
        let p = Partitioner::new(Shape::new(3, 5), Tiling::RowSegments, 2);
        let tasks: Vec<Task> = p.tasks().collect();
        assert_eq!(tasks.len(), 9);
        assert_eq!(tasks[2], Task::Block { row: 0, col: 4, height: 1, width: 1 });
        assert_eq!(tasks[3], Task::Block { row: 1, col: 0, height: 1, width: 2 });
    }

    #[test]
    fn partitioning_is_deterministic() {
        let p = Partitioner::new(Shape::new(13, 29), Tiling::Rectangular, 5);
        let a: Vec<Task> = p.tasks().collect();
        let b: Vec<Task> = p.tasks().collect();
        assert_eq!(a, b);
    }

    #[test]
    fn next_past_the_end_is_none() {
        let p = Partitioner::new(Shape::new(2, 2), Tiling::Rectangular, 2);
        let (_, cursor) = p.next(p.start()).unwrap();
        assert_eq!(cursor, Cursor::Block(2, 0));
        assert_eq!(p.next(cursor), None);
        assert_eq!(p.next(Cursor::Linear(0)), None);
    }

    #[test]
    fn task_cells_match_cell_index() {
        let task = Task::Block { row: 2, col: 1, height: 2, width: 3 };
        let cells: Vec<Pixel> = task.cells(10).collect();
        let indexed: Vec<Pixel> = (0..task.len()).map(|i| task.cell(i, 10)).collect();
        assert_eq!(cells, indexed);
        assert_eq!(cells[0], Pixel(1, 2));
        assert_eq!(cells[5], Pixel(3, 3));

        let span = Task::Span { offset: 8, len: 4 };
        let cells: HashSet<Pixel> = span.cells(5).collect();
        assert!(cells.contains(&Pixel(3, 1)) && cells.contains(&Pixel(1, 2)));
    }

    #[test]
    fn fits_rejects_overhang() {
        let shape = Shape::new(4, 4);
        assert!(!Task::Span { offset: 14, len: 3 }.fits(shape));
        assert!(!Task::Block { row: 3, col: 0, height: 2, width: 1 }.fits(shape));
        assert!(Task::Block { row: 3, col: 3, height: 1, width: 1 }.fits(shape));
    }

    #[test]
    fn max_task_len_bounds_every_task() {
        for &tiling in &[Tiling::Linear, Tiling::Rectangular, Tiling::RowSegments] {
            let p = Partitioner::new(Shape::new(5, 3), tiling, 4);
            let largest = p.tasks().map(|t| t.len()).max().unwrap();
            assert_eq!(largest, p.max_task_len());
        }
    }

    #[test]
    fn task_count_picks_a_size() {
        let shape = Shape::new(10, 10);
        assert_eq!(task_size_for_count(shape, Tiling::Linear, 3), 34);
        let size = task_size_for_count(shape, Tiling::Rectangular, 4);
        assert_eq!(size, 5);
        assert_eq!(Partitioner::new(shape, Tiling::Rectangular, size).count(), 4);
        assert_eq!(task_size_for_count(shape, Tiling::RowSegments, 10), 10);
        assert_eq!(task_size_for_count(shape, Tiling::RowSegments, 3), 10);
    }

    #[test]
    fn oversized_tasks_make_one_task() {
        let shape = Shape::new(4, 4);
        let huge = usize::max_value();
        for &tiling in &[Tiling::Linear, Tiling::Rectangular] {
            let p = Partitioner::new(shape, tiling, huge);
            assert_eq!(p.count(), 1);
            assert_eq!(p.tasks().count(), 1);
            assert_eq!(p.max_task_len(), 16);
        }
        assert_eq!(Partitioner::new(shape, Tiling::RowSegments, huge).count(), 4);
        assert_eq!(task_size_for_count(shape, Tiling::Linear, huge), 1);
        assert_eq!(task_size_for_count(shape, Tiling::Rectangular, huge), 1);
    }

    #[test]
    fn block_area_overflow_is_detected() {
        let huge = Task::Block { row: 0, col: 0, height: 1 << 40, width: 1 << 40 };
        assert_eq!(huge.checked_len(), None);
        assert_eq!(Task::Block { row: 0, col: 0, height: 3, width: 5 }.checked_len(), Some(15));
    }
}
