use crate::normalize::ExamImage;
use crate::report::PredictionReport;
use crate::types::STANDARD_MAMMO_VIEWS;
use std::fmt;

/// Text report formatter for exam predictions
pub struct TextReport<'a> {
    report: &'a PredictionReport,
}

impl<'a> TextReport<'a> {
    /// Creates a new text report
    pub fn new(report: &'a PredictionReport) -> Self {
        Self { report }
    }
}

impl<'a> fmt::Display for TextReport<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Mirai Risk Predictions")?;
        writeln!(f, "======================")?;
        writeln!(f)?;
        for (label, p) in self.report.years() {
            writeln!(f, "{:<8} {:.4}", format!("{}:", label), p)?;
        }
        writeln!(f)?;
        writeln!(f, "Model version: {}", self.report.model_version)?;
        Ok(())
    }
}

/// Summary of the images selected for an exam, used by dry runs
pub struct SelectionReport<'a> {
    images: &'a [ExamImage],
}

impl<'a> SelectionReport<'a> {
    pub fn new(images: &'a [ExamImage]) -> Self {
        Self { images }
    }
}

impl<'a> fmt::Display for SelectionReport<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Selected Images")?;
        writeln!(f, "===============")?;
        writeln!(f)?;
        for image in self.images {
            let (width, height) = image.pixels.dimensions();
            writeln!(
                f,
                "{:<6} {}x{}  {}",
                image.view.to_string(),
                width,
                height,
                image.source
            )?;
        }

        let missing: Vec<String> = STANDARD_MAMMO_VIEWS
            .iter()
            .filter(|view| !self.images.iter().any(|img| img.view == **view))
            .map(|view| view.to_string())
            .collect();
        if !missing.is_empty() {
            writeln!(f)?;
            writeln!(f, "Missing: {}", missing.join(", "))?;
        }
        Ok(())
    }
}
