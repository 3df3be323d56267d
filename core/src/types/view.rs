use super::{Laterality, ViewPosition};
use std::fmt;

/// Mammogram view combining laterality and view position
///
/// Identifies one slot of a four-view exam, such as "L MLO" or "R CC".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MammogramView {
    pub laterality: Laterality,
    pub view: ViewPosition,
}

impl MammogramView {
    /// Creates a new MammogramView
    pub fn new(laterality: Laterality, view: ViewPosition) -> Self {
        Self { laterality, view }
    }
}

impl fmt::Display for MammogramView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.laterality, self.view)
    }
}

/// Standard mammogram views (4 views for complete bilateral study)
pub const STANDARD_MAMMO_VIEWS: [MammogramView; 4] = [
    MammogramView {
        laterality: Laterality::Left,
        view: ViewPosition::Cc,
    },
    MammogramView {
        laterality: Laterality::Right,
        view: ViewPosition::Cc,
    },
    MammogramView {
        laterality: Laterality::Left,
        view: ViewPosition::Mlo,
    },
    MammogramView {
        laterality: Laterality::Right,
        view: ViewPosition::Mlo,
    },
];

/// Number of images making up one exam
pub const EXAM_SIZE: usize = STANDARD_MAMMO_VIEWS.len();
