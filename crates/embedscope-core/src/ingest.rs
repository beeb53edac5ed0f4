//! Corpus ingestion boundary
//!
//! Consumes already-decoded, line-oriented JSON records: one stream of
//! embedded report records and one of patient records, joined by patient
//! identifier into `EmbeddingPoint`s. The engine stays agnostic to how
//! the bytes arrived (file, archive, network).

use crate::error::{ExploreError, ExploreResult};
use crate::types::EmbeddingPoint;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::io::BufRead;
use tracing::info;

/// Label categories attached to every corpus point, in display order.
pub const LABEL_CATEGORIES: &[&str] = &[
    "cancer_type",
    "race",
    "ethnicity",
    "gender",
    "vital_status",
    "age_at_index",
];

/// One embedded document record.
#[derive(Debug, Clone, Deserialize)]
pub struct ReportRecord {
    pub id: String,
    #[serde(default)]
    pub text: String,
    pub properties: ReportProperties,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportProperties {
    #[serde(default)]
    pub patient_id: String,
    #[serde(default)]
    pub cancer_type: String,
}

/// One patient demographics record.
#[derive(Debug, Clone, Deserialize)]
pub struct PatientRecord {
    pub submitter_id: String,
    #[serde(default)]
    pub demographic: Option<Demographic>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Demographic {
    #[serde(default)]
    pub race: Option<String>,
    #[serde(default)]
    pub ethnicity: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub vital_status: Option<String>,
    #[serde(default)]
    pub age_at_index: Option<f64>,
}

/// Parse one JSON record per line, skipping blank lines.
pub fn parse_jsonl<T: DeserializeOwned>(reader: impl BufRead) -> ExploreResult<Vec<T>> {
    let mut records = Vec::new();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| ExploreError::InvalidInput(format!("read failed: {e}")))?;
        if line.trim().is_empty() {
            continue;
        }
        let record: T = serde_json::from_str(&line).map_err(|e| {
            ExploreError::InvalidInput(format!("bad record on line {}: {e}", line_no + 1))
        })?;
        records.push(record);
    }
    Ok(records)
}

/// Join report records with patient demographics into a corpus.
///
/// All embeddings must share one dimensionality; reports without a
/// matching patient keep their own labels and simply lack demographics.
pub fn join_corpus(
    reports: Vec<ReportRecord>,
    patients: &[PatientRecord],
) -> ExploreResult<Vec<EmbeddingPoint>> {
    if reports.is_empty() {
        return Err(ExploreError::InvalidInput(
            "no report records to ingest".to_string(),
        ));
    }

    let dims = reports[0].embedding.len();
    if dims == 0 {
        return Err(ExploreError::InvalidInput(
            "report embeddings are empty".to_string(),
        ));
    }

    let by_patient: BTreeMap<&str, &PatientRecord> = patients
        .iter()
        .map(|p| (p.submitter_id.as_str(), p))
        .collect();

    let mut corpus = Vec::with_capacity(reports.len());
    for report in reports {
        if report.embedding.len() != dims {
            return Err(ExploreError::DimensionMismatch {
                expected: dims,
                actual: report.embedding.len(),
            });
        }

        let mut labels = BTreeMap::new();
        if !report.properties.cancer_type.is_empty() {
            labels.insert(
                "cancer_type".to_string(),
                report.properties.cancer_type.clone(),
            );
        }
        if let Some(demographic) = by_patient
            .get(report.properties.patient_id.as_str())
            .and_then(|p| p.demographic.as_ref())
        {
            insert_label(&mut labels, "race", demographic.race.as_deref());
            insert_label(&mut labels, "ethnicity", demographic.ethnicity.as_deref());
            insert_label(&mut labels, "gender", demographic.gender.as_deref());
            insert_label(
                &mut labels,
                "vital_status",
                demographic.vital_status.as_deref(),
            );
            if let Some(age) = demographic.age_at_index {
                labels.insert("age_at_index".to_string(), format_age(age));
            }
        }

        corpus.push(EmbeddingPoint::new(
            report.id,
            report.properties.patient_id,
            labels,
            report.embedding,
        ));
    }

    info!("ingested corpus: {} points, {} dims", corpus.len(), dims);
    Ok(corpus)
}

fn insert_label(labels: &mut BTreeMap<String, String>, key: &str, value: Option<&str>) {
    if let Some(value) = value {
        if !value.is_empty() {
            labels.insert(key.to_string(), value.to_string());
        }
    }
}

fn format_age(age: f64) -> String {
    if age.fract() == 0.0 {
        format!("{}", age as i64)
    } else {
        format!("{age}")
    }
}

/// Distinct sorted values observed per label category, for UI filters
/// and category color maps.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabelCatalog {
    values: BTreeMap<String, Vec<String>>,
}

impl LabelCatalog {
    pub fn from_corpus(corpus: &[EmbeddingPoint]) -> Self {
        let mut values: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for &category in LABEL_CATEGORIES {
            let mut seen: Vec<String> = corpus
                .iter()
                .filter_map(|p| p.labels.get(category).cloned())
                .collect();
            seen.sort();
            seen.dedup();
            values.insert(category.to_string(), seen);
        }
        Self { values }
    }

    pub fn values(&self, category: &str) -> &[String] {
        self.values.get(category).map_or(&[], Vec::as_slice)
    }

    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    const REPORTS: &str = r#"
{"id":"r1","text":"first report","properties":{"patient_id":"TCGA-01","cancer_type":"BRCA"},"embedding":[1.0,2.0,3.0]}
{"id":"r2","properties":{"patient_id":"TCGA-02","cancer_type":"LUAD"},"embedding":[4.0,5.0,6.0]}
{"id":"r3","properties":{"patient_id":"TCGA-99","cancer_type":"BRCA"},"embedding":[7.0,8.0,9.0]}
"#;

    const PATIENTS: &str = r#"
{"submitter_id":"TCGA-01","demographic":{"race":"white","ethnicity":"not hispanic or latino","gender":"female","vital_status":"Alive","age_at_index":61}}
{"submitter_id":"TCGA-02","demographic":{"gender":"male","vital_status":"Dead","age_at_index":72.5}}
"#;

    fn corpus() -> Vec<EmbeddingPoint> {
        let reports: Vec<ReportRecord> = parse_jsonl(Cursor::new(REPORTS)).unwrap();
        let patients: Vec<PatientRecord> = parse_jsonl(Cursor::new(PATIENTS)).unwrap();
        join_corpus(reports, &patients).unwrap()
    }

    #[test]
    fn join_attaches_demographics_by_patient_id() {
        let corpus = corpus();
        assert_eq!(corpus.len(), 3);

        assert_eq!(corpus[0].source_id, "TCGA-01");
        assert_eq!(corpus[0].labels["cancer_type"], "BRCA");
        assert_eq!(corpus[0].labels["race"], "white");
        assert_eq!(corpus[0].labels["gender"], "female");
        assert_eq!(corpus[0].labels["age_at_index"], "61");

        assert_eq!(corpus[1].labels["gender"], "male");
        assert_eq!(corpus[1].labels["age_at_index"], "72.5");
        assert!(!corpus[1].labels.contains_key("race"));

        // No matching patient record: cancer_type only.
        assert_eq!(corpus[2].labels.len(), 1);
    }

    #[test]
    fn ragged_embeddings_rejected() {
        let reports = vec![
            ReportRecord {
                id: "a".into(),
                text: String::new(),
                properties: ReportProperties {
                    patient_id: String::new(),
                    cancer_type: String::new(),
                },
                embedding: vec![1.0, 2.0],
            },
            ReportRecord {
                id: "b".into(),
                text: String::new(),
                properties: ReportProperties {
                    patient_id: String::new(),
                    cancer_type: String::new(),
                },
                embedding: vec![1.0],
            },
        ];
        assert_eq!(
            join_corpus(reports, &[]).unwrap_err(),
            ExploreError::DimensionMismatch {
                expected: 2,
                actual: 1
            }
        );
    }

    #[test]
    fn malformed_line_reports_its_number() {
        let input = "{\"id\":\"ok\",\"properties\":{},\"embedding\":[1.0]}\nnot json\n";
        let err = parse_jsonl::<ReportRecord>(Cursor::new(input)).unwrap_err();
        match err {
            ExploreError::InvalidInput(msg) => assert!(msg.contains("line 2"), "{msg}"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn catalog_lists_distinct_sorted_values() {
        let catalog = LabelCatalog::from_corpus(&corpus());
        assert_eq!(catalog.values("cancer_type"), &["BRCA", "LUAD"]);
        assert_eq!(catalog.values("gender"), &["female", "male"]);
        assert_eq!(catalog.values("unknown_category"), &[] as &[String]);
        assert!(catalog.categories().any(|c| c == "vital_status"));
    }
}
