//! Labeled transaction data: CSV loading, stratified splitting and
//! class-balance statistics.

use crate::error::{PipelineError, Result, SchemaError};
use crate::features::{FeatureVector, FEATURE_COUNT, FEATURE_NAMES, LABEL_COLUMN};
use crate::types::report::ClassBalance;
use crate::types::verdict::Label;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand::rngs::StdRng;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info};

/// A feature vector with its ground-truth class
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabeledExample {
    pub features: FeatureVector,
    pub label: Label,
}

/// Ordered sequence of labeled examples
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    examples: Vec<LabeledExample>,
}

impl Dataset {
    pub fn new(examples: Vec<LabeledExample>) -> Self {
        Self { examples }
    }

    /// Load a labeled CSV file.
    ///
    /// Fails with `DataNotFound` when the file is absent and with a schema
    /// error when required columns are missing or cells are malformed.
    pub fn load_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(PipelineError::DataNotFound {
                path: path.to_path_buf(),
            });
        }

        let file = File::open(path).map_err(|e| PipelineError::io(path, e))?;
        let dataset = Self::from_reader(file)?;

        info!(
            path = %path.display(),
            rows = dataset.len(),
            positives = dataset.positive_count(),
            "Dataset loaded"
        );

        Ok(dataset)
    }

    /// Parse labeled rows from any CSV source with a header line
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv = csv_reader(reader);
        let columns = ColumnMap::resolve(csv.headers()?, true)?;
        let label_idx = columns.label.ok_or_else(|| SchemaError::MissingColumns {
            columns: vec![LABEL_COLUMN.to_string()],
        })?;

        let mut examples = Vec::new();
        for (row, record) in csv.records().enumerate() {
            let record = record?;
            let features = columns.parse_row(&record, row)?;
            let raw_label = record.get(label_idx).ok_or_else(|| SchemaError::MissingField {
                field: LABEL_COLUMN.to_string(),
                row: Some(row),
            })?;
            let label = parse_label(raw_label).ok_or_else(|| SchemaError::InvalidLabel {
                value: raw_label.to_string(),
                row: Some(row),
            })?;
            examples.push(LabeledExample { features, label });
        }

        Ok(Self { examples })
    }

    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    pub fn examples(&self) -> &[LabeledExample] {
        &self.examples
    }

    pub fn features(&self) -> Vec<FeatureVector> {
        self.examples.iter().map(|e| e.features).collect()
    }

    pub fn labels(&self) -> Vec<Label> {
        self.examples.iter().map(|e| e.label).collect()
    }

    pub fn positive_count(&self) -> usize {
        self.examples.iter().filter(|e| e.label.is_fraud()).count()
    }

    /// Uniformly random example
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&LabeledExample> {
        self.examples.choose(rng)
    }

    /// Class-balance statistics over the whole dataset
    pub fn class_balance(&self) -> ClassBalance {
        let total = self.examples.len();
        let mut fraud_count = 0;
        let mut legit_amount = 0.0;
        let mut fraud_amount = 0.0;

        for example in &self.examples {
            if example.label.is_fraud() {
                fraud_count += 1;
                fraud_amount += example.features.amount();
            } else {
                legit_amount += example.features.amount();
            }
        }
        let legit_count = total - fraud_count;

        ClassBalance {
            total_transactions: total,
            fraud_count,
            fraud_rate: mean_or_zero(fraud_count as f64, total),
            avg_amount_legit: mean_or_zero(legit_amount, legit_count),
            avg_amount_fraud: mean_or_zero(fraud_amount, fraud_count),
        }
    }

    /// Split into (train, test) preserving class proportions.
    ///
    /// The test partition holds `ceil(len * test_size)` rows. Each class is
    /// allotted test rows by largest remainder, then any class with at least
    /// two members keeps at least one row on each side. Row order inside
    /// each partition follows the original order.
    pub fn stratified_split(&self, test_size: f64, seed: u64) -> Result<(Dataset, Dataset)> {
        if !(test_size > 0.0 && test_size < 1.0) {
            return Err(PipelineError::Training(format!(
                "test_size must be in (0, 1), got {}",
                test_size
            )));
        }
        if self.examples.len() < 2 {
            return Err(PipelineError::Training(format!(
                "need at least 2 examples to split, got {}",
                self.examples.len()
            )));
        }

        let n = self.examples.len();
        let n_test = ((n as f64 * test_size).ceil() as usize).clamp(1, n - 1);

        let classes = [Label::Legitimate, Label::Fraudulent];
        let members: Vec<Vec<usize>> = classes
            .iter()
            .map(|class| {
                self.examples
                    .iter()
                    .enumerate()
                    .filter(|(_, e)| e.label == *class)
                    .map(|(i, _)| i)
                    .collect()
            })
            .collect();
        let counts: Vec<usize> = members.iter().map(Vec::len).collect();
        let allotment = allot_test_rows(&counts, n_test);

        let mut rng = StdRng::seed_from_u64(seed);
        let mut test_idx = Vec::with_capacity(n_test);
        for (indices, &take) in members.iter().zip(&allotment) {
            let mut shuffled = indices.clone();
            shuffled.shuffle(&mut rng);
            test_idx.extend_from_slice(&shuffled[..take]);
        }
        test_idx.sort_unstable();

        let mut in_test = vec![false; n];
        for &i in &test_idx {
            in_test[i] = true;
        }

        let (test, train): (Vec<_>, Vec<_>) = self
            .examples
            .iter()
            .enumerate()
            .partition(|(i, _)| in_test[*i]);
        let train = Dataset::new(train.into_iter().map(|(_, e)| *e).collect());
        let test = Dataset::new(test.into_iter().map(|(_, e)| *e).collect());

        debug!(
            train = train.len(),
            test = test.len(),
            train_positives = train.positive_count(),
            test_positives = test.positive_count(),
            "Stratified split"
        );

        Ok((train, test))
    }
}

/// Per-class test-row counts summing to `n_test` where possible
fn allot_test_rows(counts: &[usize], n_test: usize) -> Vec<usize> {
    let total: usize = counts.iter().sum();
    let quotas: Vec<f64> = counts
        .iter()
        .map(|&c| c as f64 * n_test as f64 / total as f64)
        .collect();
    let mut allotment: Vec<usize> = quotas.iter().map(|q| q.floor() as usize).collect();

    let mut by_remainder: Vec<usize> = (0..counts.len()).collect();
    by_remainder.sort_by(|&a, &b| {
        let ra = quotas[a] - quotas[a].floor();
        let rb = quotas[b] - quotas[b].floor();
        rb.total_cmp(&ra).then(a.cmp(&b))
    });
    let mut remaining = n_test.saturating_sub(allotment.iter().sum());
    for &class in by_remainder.iter().cycle().take(counts.len() * 2) {
        if remaining == 0 {
            break;
        }
        if allotment[class] < counts[class] {
            allotment[class] += 1;
            remaining -= 1;
        }
    }

    // Keep every class with two or more members on both sides
    for class in 0..counts.len() {
        if counts[class] < 2 {
            continue;
        }
        if allotment[class] == 0 {
            if let Some(donor) = largest_other(&allotment, counts, class, |a, _| a > 1) {
                allotment[donor] -= 1;
                allotment[class] = 1;
            }
        } else if allotment[class] == counts[class] {
            if let Some(receiver) = largest_other(&allotment, counts, class, |a, c| a + 1 < c) {
                allotment[receiver] += 1;
                allotment[class] -= 1;
            }
        }
    }

    allotment
}

fn largest_other(
    allotment: &[usize],
    counts: &[usize],
    skip: usize,
    eligible: impl Fn(usize, usize) -> bool,
) -> Option<usize> {
    (0..counts.len())
        .filter(|&c| c != skip && eligible(allotment[c], counts[c]))
        .max_by_key(|&c| (counts[c], std::cmp::Reverse(c)))
}

fn mean_or_zero(sum: f64, count: usize) -> f64 {
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

fn parse_label(raw: &str) -> Option<Label> {
    let value: f64 = raw.trim().parse().ok()?;
    if value == 0.0 {
        Some(Label::Legitimate)
    } else if value == 1.0 {
        Some(Label::Fraudulent)
    } else {
        None
    }
}

/// Parse unlabeled feature rows from CSV for batch scoring.
///
/// The label column is tolerated and ignored; any other unknown column,
/// missing feature or malformed cell rejects the whole input.
pub fn read_feature_rows<R: Read>(reader: R) -> Result<Vec<FeatureVector>> {
    let mut csv = csv_reader(reader);
    let columns = ColumnMap::resolve(csv.headers()?, false)?;

    let mut rows = Vec::new();
    for (row, record) in csv.records().enumerate() {
        rows.push(columns.parse_row(&record?, row)?);
    }
    Ok(rows)
}

/// Rows of uneven width reach `ColumnMap::parse_row`, which reports them
/// as schema errors naming the field and row.
fn csv_reader<R: Read>(reader: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new().flexible(true).from_reader(reader)
}

/// Header name → column position for every contract field
struct ColumnMap {
    features: [usize; FEATURE_COUNT],
    label: Option<usize>,
    width: usize,
}

impl ColumnMap {
    fn resolve(headers: &csv::StringRecord, require_label: bool) -> Result<Self> {
        let position = |name: &str| headers.iter().position(|h| h.trim() == name);

        let mut missing: Vec<String> = FEATURE_NAMES
            .iter()
            .filter(|name| position(name).is_none())
            .map(|name| name.to_string())
            .collect();
        let label = position(LABEL_COLUMN);
        if require_label && label.is_none() {
            missing.push(LABEL_COLUMN.to_string());
        }
        if !missing.is_empty() {
            return Err(SchemaError::MissingColumns { columns: missing }.into());
        }

        if let Some(extra) = headers
            .iter()
            .map(str::trim)
            .find(|h| *h != LABEL_COLUMN && !FEATURE_NAMES.contains(h))
        {
            return Err(SchemaError::UnexpectedField {
                field: extra.to_string(),
                row: None,
            }
            .into());
        }

        let mut features = [0; FEATURE_COUNT];
        for (slot, name) in features.iter_mut().zip(FEATURE_NAMES.iter()) {
            *slot = position(name).unwrap_or_default();
        }

        Ok(Self {
            features,
            label,
            width: headers.len(),
        })
    }

    fn parse_row(&self, record: &csv::StringRecord, row: usize) -> Result<FeatureVector> {
        if record.len() > self.width {
            return Err(SchemaError::UnexpectedField {
                field: format!("column {}", self.width + 1),
                row: Some(row),
            }
            .into());
        }

        let mut values = [0.0; FEATURE_COUNT];
        for ((value, &col), name) in values.iter_mut().zip(&self.features).zip(FEATURE_NAMES) {
            let raw = record.get(col).ok_or_else(|| SchemaError::MissingField {
                field: name.to_string(),
                row: Some(row),
            })?;
            let parsed: f64 = raw.trim().parse().map_err(|_| SchemaError::NonNumeric {
                field: name.to_string(),
                value: raw.to_string(),
                row: Some(row),
            })?;
            if !parsed.is_finite() {
                return Err(SchemaError::NonFinite {
                    field: name.to_string(),
                    row: Some(row),
                }
                .into());
            }
            *value = parsed;
        }
        Ok(FeatureVector::from_values(values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn example(amount: f64, label: Label) -> LabeledExample {
        let mut values = [0.0; FEATURE_COUNT];
        values[crate::features::AMOUNT_INDEX] = amount;
        LabeledExample {
            features: FeatureVector::from_values(values),
            label,
        }
    }

    fn dataset(negatives: usize, positives: usize) -> Dataset {
        let mut examples = Vec::new();
        for i in 0..negatives {
            examples.push(example(i as f64, Label::Legitimate));
        }
        for i in 0..positives {
            examples.push(example(1000.0 + i as f64, Label::Fraudulent));
        }
        Dataset::new(examples)
    }

    fn csv_text(header: &[&str], rows: &[Vec<String>]) -> String {
        let mut text = header.join(",");
        text.push('\n');
        for row in rows {
            text.push_str(&row.join(","));
            text.push('\n');
        }
        text
    }

    fn full_header() -> Vec<&'static str> {
        let mut header: Vec<&str> = FEATURE_NAMES.to_vec();
        header.push(LABEL_COLUMN);
        header
    }

    fn row(amount: f64, class: &str) -> Vec<String> {
        let mut row: Vec<String> = (0..FEATURE_COUNT - 1).map(|i| format!("{}", i)).collect();
        row.push(format!("{}", amount));
        row.push(class.to_string());
        row
    }

    #[test]
    fn test_split_ten_rows_two_positive() {
        let data = dataset(8, 2);
        let (train, test) = data.stratified_split(0.2, 42).unwrap();

        assert_eq!(train.len(), 8);
        assert_eq!(test.len(), 2);
        assert_eq!(train.positive_count(), 1);
        assert_eq!(test.positive_count(), 1);
    }

    #[test]
    fn test_split_preserves_proportions() {
        let data = dataset(950, 50);
        let (train, test) = data.stratified_split(0.2, 7).unwrap();

        assert_eq!(train.len() + test.len(), 1000);
        assert_eq!(test.len(), 200);
        let train_rate = train.positive_count() as f64 / train.len() as f64;
        let test_rate = test.positive_count() as f64 / test.len() as f64;
        assert!((train_rate - test_rate).abs() < 0.01);
    }

    #[test]
    fn test_split_is_seeded() {
        let data = dataset(90, 10);
        let (_, a) = data.stratified_split(0.2, 42).unwrap();
        let (_, b) = data.stratified_split(0.2, 42).unwrap();
        assert_eq!(a.examples(), b.examples());
    }

    #[test]
    fn test_split_rejects_tiny_dataset() {
        assert!(dataset(1, 0).stratified_split(0.2, 42).is_err());
    }

    #[test]
    fn test_class_balance() {
        let balance = dataset(3, 1).class_balance();
        assert_eq!(balance.total_transactions, 4);
        assert_eq!(balance.fraud_count, 1);
        assert!((balance.fraud_rate - 0.25).abs() < 1e-12);
        assert!((balance.avg_amount_legit - 1.0).abs() < 1e-12);
        assert!((balance.avg_amount_fraud - 1000.0).abs() < 1e-12);

        let empty = Dataset::default().class_balance();
        assert_eq!(empty.avg_amount_fraud, 0.0);
    }

    #[test]
    fn test_from_reader() {
        let text = csv_text(&full_header(), &[row(12.5, "0"), row(99.0, "\"1\"")]);
        let data = Dataset::from_reader(text.as_bytes()).unwrap();

        assert_eq!(data.len(), 2);
        assert_eq!(data.positive_count(), 1);
        assert_eq!(data.examples()[0].features.amount(), 12.5);
    }

    #[test]
    fn test_missing_column_reported() {
        let header: Vec<&str> = full_header().into_iter().filter(|h| *h != "V7").collect();
        let err = Dataset::from_reader(csv_text(&header, &[]).as_bytes()).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Schema(SchemaError::MissingColumns { ref columns }) if columns == &["V7".to_string()]
        ));
    }

    #[test]
    fn test_bad_cell_names_row_and_field() {
        let mut bad = row(1.0, "0");
        bad[3] = "oops".to_string();
        let text = csv_text(&full_header(), &[row(1.0, "0"), bad]);

        let err = Dataset::from_reader(text.as_bytes()).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Schema(SchemaError::NonNumeric { ref field, row: Some(1), .. }) if field == "V3"
        ));
    }

    #[test]
    fn test_uneven_rows_are_schema_errors() {
        // Feature-only header: a short row loses its trailing `Amount` cell
        let mut short = row(5.0, "0");
        short.truncate(FEATURE_COUNT - 1);
        let text = csv_text(&FEATURE_NAMES, &[row(5.0, "0")[..FEATURE_COUNT].to_vec(), short]);
        let err = read_feature_rows(text.as_bytes()).unwrap_err();
        assert!(err.is_recoverable());
        assert!(matches!(
            err,
            PipelineError::Schema(SchemaError::MissingField { ref field, row: Some(1) }) if field == "Amount"
        ));

        // Labeled header: a row without its class cell
        let mut unlabeled = row(5.0, "0");
        unlabeled.pop();
        let text = csv_text(&full_header(), &[row(5.0, "0"), unlabeled]);
        let err = Dataset::from_reader(text.as_bytes()).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Schema(SchemaError::MissingField { ref field, row: Some(1) }) if field == LABEL_COLUMN
        ));

        let mut long = row(5.0, "0");
        long.push("7".to_string());
        let text = csv_text(&full_header(), &[long]);
        let err = Dataset::from_reader(text.as_bytes()).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Schema(SchemaError::UnexpectedField { row: Some(0), .. })
        ));
    }

    #[test]
    fn test_missing_file() {
        let err = Dataset::load_csv("/nonexistent/creditcard.csv").unwrap_err();
        assert!(matches!(err, PipelineError::DataNotFound { .. }));
    }

    #[test]
    fn test_feature_rows_tolerate_label_but_not_extras() {
        let text = csv_text(&full_header(), &[row(5.0, "1")]);
        let rows = read_feature_rows(text.as_bytes()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].amount(), 5.0);

        let mut header = full_header();
        header.push("merchant");
        let mut extra = row(5.0, "1");
        extra.push("x".to_string());
        let err = read_feature_rows(csv_text(&header, &[extra]).as_bytes()).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Schema(SchemaError::UnexpectedField { ref field, .. }) if field == "merchant"
        ));
    }
}
