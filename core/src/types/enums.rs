use std::fmt;

/// Breast laterality of a single mammogram
///
/// Sequence code used by the risk transformer: R=0, L=1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Laterality {
    Left,
    Right,
}

impl Laterality {
    /// Integer code fed to the model as `side_seq`
    pub fn code(&self) -> i64 {
        match self {
            Laterality::Right => 0,
            Laterality::Left => 1,
        }
    }

    /// Returns short string representation
    pub fn short_str(&self) -> &'static str {
        match self {
            Laterality::Left => "L",
            Laterality::Right => "R",
        }
    }

    /// Parses a DICOM laterality code ("L"/"R", case-insensitive)
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "L" => Some(Laterality::Left),
            "R" => Some(Laterality::Right),
            _ => None,
        }
    }
}

impl fmt::Display for Laterality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.short_str())
    }
}

/// Standard screening view position
///
/// Sequence code used by the risk transformer: CC=0, MLO=1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewPosition {
    Cc,  // Cranio-caudal
    Mlo, // Medio-lateral oblique
}

impl ViewPosition {
    /// Integer code fed to the model as `view_seq`
    pub fn code(&self) -> i64 {
        match self {
            ViewPosition::Cc => 0,
            ViewPosition::Mlo => 1,
        }
    }

    /// Returns short string representation
    pub fn short_str(&self) -> &'static str {
        match self {
            ViewPosition::Cc => "CC",
            ViewPosition::Mlo => "MLO",
        }
    }

    /// Parses a view code ("CC"/"MLO", case-insensitive)
    ///
    /// Only the two screening views are accepted; exaggerated or
    /// supplementary views are rejected.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "CC" => Some(ViewPosition::Cc),
            "MLO" => Some(ViewPosition::Mlo),
            _ => None,
        }
    }
}

impl fmt::Display for ViewPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.short_str())
    }
}

/// Photometric interpretation, reduced to what pixel conversion needs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PhotometricInterpretation {
    Unknown,
    Monochrome1,
    Monochrome2,
    Color,
}

impl PhotometricInterpretation {
    /// Returns whether this is a monochrome interpretation
    pub fn is_monochrome(&self) -> bool {
        matches!(
            self,
            PhotometricInterpretation::Monochrome1 | PhotometricInterpretation::Monochrome2
        )
    }

    /// Returns whether this is inverted (MONOCHROME1)
    pub fn is_inverted(&self) -> bool {
        matches!(self, PhotometricInterpretation::Monochrome1)
    }

    /// Parses photometric interpretation from string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Self {
        match s.trim().to_uppercase().as_str() {
            "MONOCHROME1" => PhotometricInterpretation::Monochrome1,
            "MONOCHROME2" => PhotometricInterpretation::Monochrome2,
            "" => PhotometricInterpretation::Unknown,
            _ => PhotometricInterpretation::Color,
        }
    }
}
