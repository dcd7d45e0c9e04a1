//! Shared fixtures for the core crate's tests.

use std::path::{Path, PathBuf};

use image::{ImageBuffer, Rgba, RgbaImage};

use packetmaker_pdf::test_support::write_test_pdf;
use packetmaker_shared::{Cohort, ConverterConfig, CurriculumContext, Reading};

use crate::converter::DocumentConverter;

/// 40x20 logo: white border around a dark mark.
pub fn write_logo(path: &Path) {
    let mut img: RgbaImage = ImageBuffer::from_pixel(40, 20, Rgba([255, 255, 255, 255]));
    for x in 10..30 {
        for y in 5..15 {
            img.put_pixel(x, y, Rgba([31, 56, 100, 255]));
        }
    }
    img.save(path).unwrap();
}

pub fn reading(title: &str, url: &str, trimmed: Option<&str>, on_device: bool) -> Reading {
    Reading {
        title: title.into(),
        subsection: None,
        author: "Doe".into(),
        year: "2024".into(),
        url: url.into(),
        read_on_device: on_device,
        trimmed_pdf: trimmed.map(PathBuf::from),
        thumbnail_path: None,
    }
}

/// A curriculum with a pre-trimmed first reading (3 pages) and an on-device second reading.
pub fn context(dir: &Path) -> CurriculumContext {
    let logo = dir.join("logo0.png");
    write_logo(&logo);
    let trimmed = dir.join("model_evaluation_trimmed.pdf");
    write_test_pdf(&trimmed, 3, "evals");

    let mut device = reading(
        "Frontier AI Regulation",
        "https://arxiv.org/abs/2307.03718",
        None,
        true,
    );
    device.author = "Anderljung et al.".into();
    device.year = "2023".into();

    CurriculumContext {
        curriculum_name: "AISF Governance Meeting 4".into(),
        program_name: "AISF".into(),
        program_long_name: "AI Safety Fundamentals".into(),
        time_period: "Spring 2024".into(),
        chron_info: "Week 4".into(),
        title: "Self and Corporate Governance".into(),
        subtitle: "Readings".into(),
        logo_path: logo,
        color_primary: "1F3864".into(),
        color_primary_faded: "8EA9DB".into(),
        color_secondary: "C00000".into(),
        core_readings: vec![
            reading(
                "Model Evaluation for Extreme Risks",
                "",
                Some(trimmed.to_string_lossy().as_ref()),
                false,
            ),
            device,
        ],
        further_readings: vec![],
        cohorts: vec![Cohort {
            name: "Cohort A".into(),
            global_cohort_i: 1,
            num_members: 6,
        }],
        meeting_ta_guide_pdf: None,
        base_ta_guide_pdf: None,
    }
}

/// One-page placeholder document.
pub fn placeholder_pdf(dir: &Path) -> PathBuf {
    let path = dir.join("ERROR.pdf");
    write_test_pdf(&path, 1, "ERROR");
    path
}

/// Converter that copies `<fixtures>/<intermediate stem>.pdf` to the output.
///
/// Documents without a fixture fail to convert.
pub fn fixture_converter(fixtures: &Path) -> DocumentConverter {
    DocumentConverter::new(&ConverterConfig {
        program: "sh".into(),
        args: vec![
            "-c".into(),
            r#"cp "$0/$(basename "$1" .fodt).pdf" "$2""#.into(),
            fixtures.to_string_lossy().to_string(),
            "{input}".into(),
            "{output}".into(),
        ],
        timeout_secs: 30,
    })
}

/// Converter that always exits non-zero.
pub fn failing_converter() -> DocumentConverter {
    DocumentConverter::new(&ConverterConfig {
        program: "false".into(),
        args: vec![],
        timeout_secs: 30,
    })
}
