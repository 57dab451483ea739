//! Decision-threshold selection and per-drug evaluation reports

use crate::data::{Phenotype, Resistance};
use crate::error::{PrepError, PrepResult};
use crate::utils::io::FileWriter;
use anyhow::{Context, Result};
use ndarray::ArrayView2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;
use tracing::{debug, info, warn};

/// Number of grid steps; thresholds are `i * 0.01` for `i` in `0..=THRESHOLD_STEPS`
pub const THRESHOLD_STEPS: usize = 100;

/// Selected threshold with the sensitivity and specificity it achieves
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdResult {
    pub threshold: f64,
    /// True positive rate on resistant isolates
    pub sensitivity: f64,
    /// True negative rate on sensitive isolates
    pub specificity: f64,
}

impl ThresholdResult {
    /// Youden-style objective: sensitivity + specificity
    pub fn objective(&self) -> f64 {
        self.sensitivity + self.specificity
    }
}

/// Confusion counts at one threshold
#[derive(Debug, Clone, Copy, Default)]
struct SweepPoint {
    true_positives: usize,
    false_positives: usize,
}

/// Pick the threshold maximizing sensitivity + specificity.
///
/// Labels use the phenotype codes (0 resistant, 1 sensitive, -1 ignored);
/// a low score means resistant, so an isolate is called resistant when its
/// score is below the threshold. Ties go to the highest threshold.
///
/// The grid is built in `f64` as `i * 0.01`, so some points sit just above
/// their decimal value (35 gives 0.35000000000000003) and an `f32` score of
/// 0.35 falls below it.
pub fn select_threshold(labels: &[i8], scores: &[f32]) -> PrepResult<ThresholdResult> {
    if labels.len() != scores.len() {
        return Err(PrepError::shape("scores", &[labels.len()], &[scores.len()]));
    }

    let observed: Vec<(Resistance, f32)> = labels
        .iter()
        .zip(scores)
        .filter_map(|(&code, &score)| {
            Phenotype::from_code(code)
                .and_then(Phenotype::resistance)
                .map(|r| (r, score))
        })
        .collect();

    let n_resistant = observed
        .iter()
        .filter(|(r, _)| *r == Resistance::Resistant)
        .count();
    let n_sensitive = observed.len() - n_resistant;

    if n_resistant == 0 || n_sensitive == 0 {
        return Err(PrepError::DegenerateLabels {
            drug: String::new(),
            resistant: n_resistant,
            sensitive: n_sensitive,
        });
    }

    let sweep: Vec<SweepPoint> = (0..=THRESHOLD_STEPS)
        .into_par_iter()
        .map(|i| {
            let threshold = grid_threshold(i);
            let mut point = SweepPoint::default();
            for &(label, score) in &observed {
                if f64::from(score) < threshold {
                    match label {
                        Resistance::Resistant => point.true_positives += 1,
                        Resistance::Sensitive => point.false_positives += 1,
                    }
                }
            }
            point
        })
        .collect();

    let mut best: Option<ThresholdResult> = None;
    for (i, point) in sweep.iter().enumerate() {
        let candidate = ThresholdResult {
            threshold: grid_threshold(i),
            sensitivity: point.true_positives as f64 / n_resistant as f64,
            specificity: 1.0 - point.false_positives as f64 / n_sensitive as f64,
        };
        match best {
            Some(b) if candidate.objective() < b.objective() => {}
            _ => best = Some(candidate),
        }
    }

    best.ok_or_else(|| PrepError::EmptyInput("threshold grid".to_string()))
}

fn grid_threshold(i: usize) -> f64 {
    if i == THRESHOLD_STEPS {
        1.0
    } else {
        i as f64 * (1.0 / THRESHOLD_STEPS as f64)
    }
}

/// Threshold selection outcome of one drug
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrugThreshold {
    pub drug: String,
    pub resistant: usize,
    pub sensitive: usize,
    /// `None` when the drug has no resistant or no sensitive isolates
    pub result: Option<ThresholdResult>,
}

/// Per-drug thresholds for a label matrix and a score matrix
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub drugs: Vec<DrugThreshold>,
}

impl EvaluationReport {
    /// Drugs skipped because of a degenerate label distribution
    pub fn degenerate_drugs(&self) -> Vec<&str> {
        self.drugs
            .iter()
            .filter(|d| d.result.is_none())
            .map(|d| d.drug.as_str())
            .collect()
    }

    pub fn get(&self, drug: &str) -> Option<&DrugThreshold> {
        self.drugs.iter().find(|d| d.drug == drug)
    }

    /// Export as CSV; degenerate drugs get empty threshold fields
    pub fn to_csv(&self) -> Result<String> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(["drug", "resistant", "sensitive", "threshold", "sensitivity", "specificity"])?;

        for drug in &self.drugs {
            let (threshold, sensitivity, specificity) = match drug.result {
                Some(r) => (
                    format!("{:.2}", r.threshold),
                    format!("{:.6}", r.sensitivity),
                    format!("{:.6}", r.specificity),
                ),
                None => (String::new(), String::new(), String::new()),
            };
            writer.write_record([
                drug.drug.clone(),
                drug.resistant.to_string(),
                drug.sensitive.to_string(),
                threshold,
                sensitivity,
                specificity,
            ])?;
        }

        let bytes = writer
            .into_inner()
            .map_err(|e| anyhow::anyhow!("Failed to flush report: {}", e.error()))?;
        Ok(String::from_utf8(bytes)?)
    }

    /// Save as JSON or CSV, chosen by the file extension
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::to_string_pretty(self)?,
            _ => self.to_csv()?,
        };

        let mut writer = FileWriter::create(path)?;
        writer
            .write_all(content.as_bytes())
            .with_context(|| format!("Failed to write report {:?}", path))?;
        writer.finish()?;
        info!("Threshold report saved to: {:?}", path);
        Ok(())
    }

    /// Print summary to stdout
    pub fn print(&self) {
        println!("\n=== Threshold Summary ===");
        for drug in &self.drugs {
            match drug.result {
                Some(r) => println!(
                    "{:<14} t={:.2}  sens={:.4}  spec={:.4}  (R={}, S={})",
                    drug.drug, r.threshold, r.sensitivity, r.specificity, drug.resistant, drug.sensitive
                ),
                None => println!(
                    "{:<14} skipped (R={}, S={})",
                    drug.drug, drug.resistant, drug.sensitive
                ),
            }
        }
        println!("=========================\n");
    }
}

/// Select a threshold for every drug column.
///
/// Degenerate drugs are recorded in the report instead of failing the run.
pub fn evaluate_drugs(
    labels: ArrayView2<i8>,
    scores: ArrayView2<f32>,
    drugs: &[String],
) -> PrepResult<EvaluationReport> {
    if labels.dim() != scores.dim() {
        let (lr, lc) = labels.dim();
        let (sr, sc) = scores.dim();
        return Err(PrepError::shape("score matrix", &[lr, lc], &[sr, sc]));
    }
    if labels.ncols() != drugs.len() {
        return Err(PrepError::shape("label matrix columns", &[drugs.len()], &[labels.ncols()]));
    }

    let mut report = EvaluationReport { drugs: Vec::with_capacity(drugs.len()) };

    for (j, drug) in drugs.iter().enumerate() {
        let column_labels: Vec<i8> = labels.column(j).to_vec();
        let column_scores: Vec<f32> = scores.column(j).to_vec();

        let resistant = column_labels.iter().filter(|&&c| c == Resistance::Resistant.code()).count();
        let sensitive = column_labels.iter().filter(|&&c| c == Resistance::Sensitive.code()).count();

        let result = match select_threshold(&column_labels, &column_scores) {
            Ok(r) => {
                info!(
                    "{}: threshold {:.2}, sensitivity {:.4}, specificity {:.4}",
                    drug, r.threshold, r.sensitivity, r.specificity
                );
                Some(r)
            }
            Err(PrepError::DegenerateLabels { .. }) => {
                warn!("{}: skipped (resistant={}, sensitive={})", drug, resistant, sensitive);
                None
            }
            Err(e) => return Err(e),
        };

        report.drugs.push(DrugThreshold {
            drug: drug.clone(),
            resistant,
            sensitive,
            result,
        });
    }

    debug!("Evaluated {} drugs", report.drugs.len());
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_perfect_separation() {
        let result = select_threshold(&[0, 0, 1, 1], &[0.1, 0.2, 0.8, 0.9]).unwrap();

        assert!(close(result.threshold, 0.80));
        assert_eq!(result.sensitivity, 1.0);
        assert_eq!(result.specificity, 1.0);
    }

    #[test]
    fn test_missing_labels_ignored() {
        let with_missing = select_threshold(&[0, -1, 0, 1, 1, -1], &[0.1, 0.95, 0.2, 0.8, 0.9, 0.0]).unwrap();
        let without = select_threshold(&[0, 0, 1, 1], &[0.1, 0.2, 0.8, 0.9]).unwrap();
        assert_eq!(with_missing, without);
    }

    #[test]
    fn test_overlapping_scores() {
        // resistant: 0.3, 0.6; sensitive: 0.4, 0.7
        let result = select_threshold(&[0, 1, 0, 1], &[0.3, 0.4, 0.6, 0.7]).unwrap();
        // t in (0.6, 0.7): sens 1, spec 0.5; t in (0.3, 0.4): sens 0.5, spec 1.
        // The 0.70 grid point is 0.7000000000000001 and calls the 0.7 score resistant.
        assert!(close(result.threshold, 0.69));
        assert_eq!(result.sensitivity, 1.0);
        assert_eq!(result.specificity, 0.5);
    }

    #[test]
    fn test_grid_points_above_decimal() {
        assert_eq!(grid_threshold(35), 0.35000000000000003);
        assert_eq!(grid_threshold(THRESHOLD_STEPS), 1.0);

        let result = select_threshold(&[0, 1], &[0.1, 0.35]).unwrap();
        assert!(close(result.threshold, 0.34));
        assert_eq!(result.objective(), 2.0);
    }

    #[test]
    fn test_degenerate_labels() {
        assert!(matches!(
            select_threshold(&[1, 1, -1], &[0.2, 0.4, 0.1]),
            Err(PrepError::DegenerateLabels { resistant: 0, sensitive: 2, .. })
        ));
        assert!(select_threshold(&[0, 1], &[0.2]).is_err());
    }

    #[test]
    fn test_random_scores_in_range() {
        let mut rng = ChaCha8Rng::seed_from_u64(2026);

        for _ in 0..20 {
            let n = rng.gen_range(4..60);
            let mut labels: Vec<i8> = (0..n).map(|_| rng.gen_range(-1..=1)).collect();
            labels[0] = 0;
            labels[1] = 1;
            let scores: Vec<f32> = (0..n).map(|_| rng.gen::<f32>()).collect();

            let result = select_threshold(&labels, &scores).unwrap();
            assert!((0.0..=1.0).contains(&result.threshold));
            assert!((0.0..=1.0).contains(&result.sensitivity));
            assert!((0.0..=1.0).contains(&result.specificity));
            // t = 0 calls nothing resistant: objective 1
            assert!(result.objective() >= 1.0);
        }
    }

    #[test]
    fn test_evaluate_drugs() {
        let labels = array![[0i8, 1], [0, 1], [1, -1], [1, 1]];
        let scores = array![[0.1f32, 0.5], [0.2, 0.5], [0.8, 0.5], [0.9, 0.5]];
        let drugs = vec!["RIFAMPICIN".to_string(), "ISONIAZID".to_string()];

        let report = evaluate_drugs(labels.view(), scores.view(), &drugs).unwrap();

        assert_eq!(report.degenerate_drugs(), vec!["ISONIAZID"]);
        let rif = report.get("RIFAMPICIN").unwrap();
        assert_eq!(rif.resistant, 2);
        assert!(rif.result.is_some_and(|r| close(r.threshold, 0.80)));
        assert_eq!(report.get("ISONIAZID").map(|d| d.sensitive), Some(3));

        let csv = report.to_csv().unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "drug,resistant,sensitive,threshold,sensitivity,specificity");
        assert_eq!(lines[1], "RIFAMPICIN,2,2,0.80,1.000000,1.000000");
        assert_eq!(lines[2], "ISONIAZID,0,3,,,");

        assert!(evaluate_drugs(labels.view(), scores.view(), &drugs[..1]).is_err());
    }

    #[test]
    fn test_report_save() {
        let dir = tempfile::tempdir().unwrap();
        let report = EvaluationReport {
            drugs: vec![DrugThreshold {
                drug: "AMIKACIN".to_string(),
                resistant: 3,
                sensitive: 7,
                result: Some(ThresholdResult { threshold: 0.5, sensitivity: 1.0, specificity: 0.75 }),
            }],
        };

        let json_path = dir.path().join("report.json");
        report.save(&json_path).unwrap();
        let loaded: EvaluationReport =
            serde_json::from_str(&std::fs::read_to_string(&json_path).unwrap()).unwrap();
        assert_eq!(loaded, report);

        let csv_path = dir.path().join("report.csv");
        report.save(&csv_path).unwrap();
        assert!(std::fs::read_to_string(&csv_path).unwrap().contains("AMIKACIN,3,7,0.50"));
    }
}
