//! Column-slice parity plan for the concurrent collision solve.
//!
//! The grid's columns are cut into an even number of equal slices. Even
//! slices run together in the first pass, odd slices in the second, with a
//! barrier in between. A task working on columns `[c0, c1)` resolves contacts
//! against the neighbouring column on each side, so it reads and writes
//! particles living in columns `c0 - 1 ..= c1`. Two tasks of the same pass
//! therefore need at least two untouched columns between them, which holds
//! as long as every slice is at least two columns wide: the slice of the
//! other parity sits in the gap.

use std::ops::Range;

/// Narrowest slice that keeps same-pass tasks from sharing a particle.
pub const MIN_SLICE_COLUMNS: usize = 2;

/// A contiguous run of whole grid columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnRange {
    /// First column (inclusive).
    pub start: usize,
    /// One past the last column.
    pub end: usize,
}

impl ColumnRange {
    /// Number of columns covered.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// `true` when the range covers no column.
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// Flat cell indices covered, for a column-major grid of `height` rows.
    pub fn cells(&self, height: usize) -> Range<usize> {
        self.start * height..self.end * height
    }
}

/// Which slices run in each of the two passes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParityPlan {
    width: usize,
    slice_columns: usize,
    even: Vec<ColumnRange>,
    odd: Vec<ColumnRange>,
}

impl ParityPlan {
    /// Plan `2 * workers` slices over `width` columns.
    ///
    /// The slice count is reduced when the grid is too narrow for slices of
    /// [`MIN_SLICE_COLUMNS`]. Columns left over by the integer division form
    /// one extra range appended to the even pass; it starts a full odd slice
    /// after the last even slice, so it is as well separated as the others.
    /// A grid narrower than two slices gets a single even range.
    pub fn new(width: usize, workers: usize) -> Self {
        let workers = workers.max(1);
        let pairs = workers.min(width / (2 * MIN_SLICE_COLUMNS));

        let mut even = Vec::with_capacity(pairs + 1);
        let mut odd = Vec::with_capacity(pairs);
        let slice_columns = if pairs == 0 { width } else { width / (2 * pairs) };

        if pairs == 0 {
            even.push(ColumnRange { start: 0, end: width });
        } else {
            for i in 0..pairs {
                let even_start = 2 * i * slice_columns;
                even.push(ColumnRange {
                    start: even_start,
                    end: even_start + slice_columns,
                });
                odd.push(ColumnRange {
                    start: even_start + slice_columns,
                    end: even_start + 2 * slice_columns,
                });
            }
            let covered = 2 * pairs * slice_columns;
            if covered < width {
                even.push(ColumnRange {
                    start: covered,
                    end: width,
                });
            }
        }

        let plan = Self {
            width,
            slice_columns,
            even,
            odd,
        };
        debug_assert!(plan.is_race_free(), "parity plan overlaps: {plan:?}");
        plan
    }

    /// Number of grid columns the plan covers.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Width of a regular slice in columns.
    pub fn slice_columns(&self) -> usize {
        self.slice_columns
    }

    /// First pass: even slices plus the remainder.
    pub fn even_pass(&self) -> &[ColumnRange] {
        &self.even
    }

    /// Second pass: odd slices.
    pub fn odd_pass(&self) -> &[ColumnRange] {
        &self.odd
    }

    /// Both passes in execution order.
    pub fn passes(&self) -> [&[ColumnRange]; 2] {
        [&self.even, &self.odd]
    }

    /// Check that the passes tile `[0, width)` exactly once and that no two
    /// ranges of the same pass can touch the same column of particles.
    pub fn is_race_free(&self) -> bool {
        let mut all: Vec<ColumnRange> = self.even.iter().chain(&self.odd).copied().collect();
        all.sort_by_key(|r| r.start);
        let mut next = 0;
        for range in &all {
            if range.start != next || range.is_empty() {
                return false;
            }
            next = range.end;
        }
        if next != self.width {
            return false;
        }

        self.passes().iter().all(|pass| {
            let mut sorted = pass.to_vec();
            sorted.sort_by_key(|r| r.start);
            // Left task reaches column `end`, right task reaches `start - 1`.
            sorted
                .windows(2)
                .all(|pair| pair[1].start - pair[0].end >= MIN_SLICE_COLUMNS)
        })
    }
}
