//! Read/write model JSON files.
//!
//! A model file is the portable representation of a fit: the classifier
//! settings, the full `RegimeModel` (parameters, series and probabilities) and
//! the recession indicator it was compared against, if any. `rr plot --model`
//! re-renders it without refitting.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::{ClassifierConfig, RecessionIndicator, RegimeModel};
use crate::error::AppError;

pub const TOOL_NAME: &str = "rr";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelFile {
    pub tool: String,
    pub config: ClassifierConfig,
    pub model: RegimeModel,
    #[serde(default)]
    pub recession: Option<RecessionIndicator>,
}

impl ModelFile {
    pub fn new(config: &ClassifierConfig, model: &RegimeModel, recession: Option<&RecessionIndicator>) -> Self {
        Self {
            tool: TOOL_NAME.to_string(),
            config: config.clone(),
            model: model.clone(),
            recession: recession.cloned(),
        }
    }
}

/// Write a model JSON file.
pub fn write_model_json(path: &Path, file: &ModelFile) -> Result<(), AppError> {
    let out = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create model JSON '{}': {e}", path.display())))?;
    serde_json::to_writer_pretty(BufWriter::new(out), file)
        .map_err(|e| AppError::new(2, format!("Failed to write model JSON: {e}")))?;
    Ok(())
}

/// Read a model JSON file.
pub fn read_model_json(path: &Path) -> Result<ModelFile, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open model JSON '{}': {e}", path.display())))?;
    let model: ModelFile =
        serde_json::from_reader(file).map_err(|e| AppError::new(2, format!("Invalid model JSON: {e}")))?;
    model
        .model
        .check_dimensions()
        .map_err(|e| AppError::new(2, format!("Invalid model JSON '{}': {e}", path.display())))?;
    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::sample::{simulate, SimulationSpec};
    use crate::regime::fit;

    fn fitted_file() -> ModelFile {
        let sim = simulate(&SimulationSpec {
            n_obs: 80,
            ..SimulationSpec::default()
        })
        .unwrap();
        let config = ClassifierConfig::default();
        let model = fit(&sim.endog, sim.exog.as_ref(), &config).unwrap();
        ModelFile::new(&config, &model, Some(&sim.recession))
    }

    fn temp_json(name: &str, value: &serde_json::Value) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("rr-model-{}-{name}.json", std::process::id()));
        std::fs::write(&path, serde_json::to_string(value).unwrap()).unwrap();
        path
    }

    #[test]
    fn model_file_survives_json() {
        let file = fitted_file();
        let model = file.model.clone();

        let json = serde_json::to_string_pretty(&file).unwrap();
        let back: ModelFile = serde_json::from_str(&json).unwrap();
        assert_eq!(back.tool, "rr");
        assert_eq!(back.model.dates(), model.dates());
        assert_eq!(back.model.k_regimes(), 2);
        assert_eq!(back.recession.as_ref().map(|r| r.series().len()), Some(80));
        for (a, b) in back.model.smoothed_rows().iter().zip(model.smoothed_rows()) {
            for (x, y) in a.iter().zip(b) {
                assert!((x - y).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn written_file_reads_back_from_disk() {
        let file = fitted_file();
        let path = std::env::temp_dir().join(format!("rr-model-{}-roundtrip.json", std::process::id()));
        write_model_json(&path, &file).unwrap();
        let back = read_model_json(&path).unwrap();
        assert_eq!(back.model.n_obs(), 80);
        assert_eq!(back.config, file.config);
    }

    #[test]
    fn inconsistent_model_files_are_rejected() {
        let good = serde_json::to_value(fitted_file()).unwrap();

        let mut more_regimes = good.clone();
        more_regimes["model"]["k_regimes"] = 3.into();

        let mut narrow_row = good.clone();
        narrow_row["model"]["smoothed"][5] = serde_json::json!([1.0]);

        let mut short_filtered = good.clone();
        if let Some(rows) = good["model"]["filtered"].as_array() {
            short_filtered["model"]["filtered"] = serde_json::Value::Array(rows[1..].to_vec());
        }

        let mut small_transition = good.clone();
        small_transition["model"]["transition"] = serde_json::json!([[1.0]]);

        let mut swapped_dates = good.clone();
        let dates = &mut swapped_dates["model"]["endog"]["dates"];
        let (first, second) = (dates[0].clone(), dates[1].clone());
        dates[0] = second;
        dates[1] = first;

        let mut bad_flag = good.clone();
        bad_flag["recession"]["series"]["values"][0] = 2.0.into();

        for (name, value) in [
            ("k", more_regimes),
            ("row", narrow_row),
            ("filtered", short_filtered),
            ("transition", small_transition),
            ("dates", swapped_dates),
            ("flag", bad_flag),
        ] {
            let err = read_model_json(&temp_json(name, &value)).unwrap_err();
            assert_eq!(err.exit_code(), 2, "{name}");
        }
    }

    #[test]
    fn missing_file_is_a_usage_error() {
        let err = read_model_json(Path::new("/definitely/not/here.json")).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
