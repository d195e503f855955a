//! Counts of traced rays by terminal status.
//!
//! Summaries from separate batches add together, so a long run can be split
//! into chunks and combined afterwards.

use std::{fmt, ops::*};

use serde::Serialize;

use crate::ray::{RayCollection, RayStatus};


/// Terminal status counts of a trace.
///
/// **Context**: After a batch of rays has been traced, most questions are
/// about where the rays ended up: how many were absorbed, how many reached a
/// focal surface, how many were cut off by the point limit. These counts are
/// also the quickest check that no ray was lost.
///
/// **How it Works**: One counter per [`RayStatus`] plus the total and the
/// number of recorded points. Summaries add field by field, and
/// [`TraceSummary::unaccounted`] reports rays missing from every partition.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TraceSummary {
    pub total: usize,
    pub running: usize,
    pub absorbed: usize,
    pub exited: usize,
    pub focused: usize,
    pub stopped: usize,
    pub suspended: usize,
    /// Points recorded over all rays, start points included.
    pub total_points: usize,
}

impl Add for TraceSummary {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            total: self.total + other.total,
            running: self.running + other.running,
            absorbed: self.absorbed + other.absorbed,
            exited: self.exited + other.exited,
            focused: self.focused + other.focused,
            stopped: self.stopped + other.stopped,
            suspended: self.suspended + other.suspended,
            total_points: self.total_points + other.total_points,
        }
    }
}

impl AddAssign for TraceSummary {
    fn add_assign(&mut self, other: Self) {
        *self = *self + other;
    }
}

impl TraceSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rays(rays: &RayCollection) -> Self {
        Self {
            total: rays.len(),
            running: rays.count(RayStatus::Running),
            absorbed: rays.count(RayStatus::Absorbed),
            exited: rays.count(RayStatus::Exited),
            focused: rays.count(RayStatus::Focused),
            stopped: rays.count(RayStatus::Stopped),
            suspended: rays.count(RayStatus::Suspended),
            total_points: rays.iter().map(|r| r.num_points()).sum(),
        }
    }

    pub fn count(&self, status: RayStatus) -> usize {
        match status {
            RayStatus::Running => self.running,
            RayStatus::Absorbed => self.absorbed,
            RayStatus::Exited => self.exited,
            RayStatus::Focused => self.focused,
            RayStatus::Stopped => self.stopped,
            RayStatus::Suspended => self.suspended,
        }
    }

    pub fn fraction(&self, status: RayStatus) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.count(status) as f64 / self.total as f64
    }

    pub fn mean_points(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.total_points as f64 / self.total as f64
    }

    /// Rays not in any partition. Zero for a summary built from a collection.
    pub fn unaccounted(&self) -> usize {
        let counted: usize = RayStatus::ALL.iter().map(|&s| self.count(s)).sum();
        self.total.saturating_sub(counted)
    }
}

impl fmt::Display for TraceSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Trace Summary:")?;
        writeln!(f, "  Total:            {}", self.total)?;
        writeln!(f, "  Exited:           {}", self.exited)?;
        writeln!(f, "  Absorbed:         {}", self.absorbed)?;
        writeln!(f, "  Focused:          {}", self.focused)?;
        writeln!(f, "  Stopped:          {}", self.stopped)?;
        writeln!(f, "  Suspended:        {}", self.suspended)?;
        writeln!(f, "  Running:          {}", self.running)?;
        writeln!(f, "  Mean Points:      {:.3}", self.mean_points())
    }
}
