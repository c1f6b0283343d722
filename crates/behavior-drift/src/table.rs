//! CSV table reader/writer for observations, representations, scores, and explanations.
//!
//! Columns are located by header name, so column order is free. Any
//! malformed cell aborts the whole load with the offending line number.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use crate::config::FeatureSet;
use crate::types::{
    DriftError, DriftResult, DriftScore, Direction, Explanation, Observation, Representation,
};

/// Default file name of the representations table.
pub const REPRESENTATIONS_FILE: &str = "behavior_representations.csv";

/// Default file name of the drift scores table.
pub const SCORES_FILE: &str = "drift_scores.csv";

/// Default file name of the explanations table.
pub const EXPLANATIONS_FILE: &str = "drift_explanations.csv";

const ENTITY_COLUMN: &str = "entity_id";
const DAY_COLUMN: &str = "day";

/// Reader for drift tables.
pub struct TableReader;

/// Writer for drift tables.
pub struct TableWriter;

/// Parsed CSV: header plus records tagged with their 1-based line numbers.
struct RawTable {
    columns: HashMap<String, usize>,
    header: Vec<String>,
    records: Vec<(usize, Vec<String>)>,
}

impl RawTable {
    fn parse<R: BufRead>(reader: R) -> DriftResult<Self> {
        let mut lines = reader.lines().enumerate();

        let header = loop {
            match lines.next() {
                Some((i, line)) => {
                    let line = line?;
                    if line.trim().is_empty() {
                        continue;
                    }
                    break split_record(&line, i + 1)?
                        .into_iter()
                        .map(|h| h.trim().to_string())
                        .collect::<Vec<_>>();
                }
                None => {
                    return Err(DriftError::MalformedInput(
                        "table is empty: missing header row".to_string(),
                    ))
                }
            }
        };

        let mut columns = HashMap::with_capacity(header.len());
        for (pos, name) in header.iter().enumerate() {
            if columns.insert(name.clone(), pos).is_some() {
                return Err(DriftError::MalformedInput(format!(
                    "line 1: duplicate column '{name}'"
                )));
            }
        }

        let mut records = Vec::new();
        for (i, line) in lines {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let line_no = i + 1;
            let fields = split_record(&line, line_no)?;
            if fields.len() != header.len() {
                return Err(DriftError::MalformedInput(format!(
                    "line {line_no}: {} fields, header has {}",
                    fields.len(),
                    header.len()
                )));
            }
            records.push((line_no, fields));
        }

        Ok(Self {
            columns,
            header,
            records,
        })
    }

    fn column(&self, name: &str) -> DriftResult<usize> {
        self.columns.get(name).copied().ok_or_else(|| {
            DriftError::MalformedInput(format!("missing required column '{name}'"))
        })
    }
}

/// Split one CSV line, honoring double-quoted fields with `""` escapes.
fn split_record(line: &str, line_no: usize) -> DriftResult<Vec<String>> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut chars = line.chars().peekable();
    let mut in_quotes = false;
    let mut quoted = false;

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    field.push('"');
                    chars.next();
                }
                '"' => in_quotes = false,
                _ => field.push(c),
            }
            continue;
        }
        match c {
            ',' => {
                fields.push(std::mem::take(&mut field));
                quoted = false;
            }
            '"' if field.is_empty() && !quoted => {
                in_quotes = true;
                quoted = true;
            }
            '"' => {
                return Err(DriftError::MalformedInput(format!(
                    "line {line_no}: stray quote in unquoted field"
                )))
            }
            _ => field.push(c),
        }
    }

    if in_quotes {
        return Err(DriftError::MalformedInput(format!(
            "line {line_no}: unterminated quoted field"
        )));
    }
    fields.push(field);
    Ok(fields)
}

/// Quote a text cell for writing. Records are one per line, so line breaks are refused.
fn text_field(value: &str, column: &str) -> DriftResult<String> {
    if value.contains(['\n', '\r']) {
        return Err(DriftError::MalformedInput(format!(
            "column '{column}' value {value:?} contains a line break"
        )));
    }
    if value.contains([',', '"']) || value.trim() != value {
        Ok(format!("\"{}\"", value.replace('"', "\"\"")))
    } else {
        Ok(value.to_string())
    }
}

fn parse_entity(raw: &str, line_no: usize) -> DriftResult<String> {
    if raw.is_empty() {
        return Err(DriftError::MalformedInput(format!(
            "line {line_no}: empty entity_id"
        )));
    }
    if raw.contains('\r') {
        return Err(DriftError::MalformedInput(format!(
            "line {line_no}: entity_id contains a line break"
        )));
    }
    Ok(raw.to_string())
}

fn parse_day(raw: &str, line_no: usize) -> DriftResult<u32> {
    raw.trim().parse::<u32>().map_err(|_| {
        DriftError::MalformedInput(format!(
            "line {line_no}: day '{raw}' is not a non-negative integer"
        ))
    })
}

fn parse_value(raw: &str, column: &str, line_no: usize) -> DriftResult<f64> {
    let value = raw.trim().parse::<f64>().map_err(|_| {
        DriftError::MalformedInput(format!(
            "line {line_no}: column '{column}' value '{raw}' is not numeric"
        ))
    })?;
    if !value.is_finite() {
        return Err(DriftError::MalformedInput(format!(
            "line {line_no}: column '{column}' value '{raw}' is not finite"
        )));
    }
    Ok(value)
}

impl TableReader {
    /// Read observations, inferring the feature list from the header when `features` is `None`.
    pub fn read_observations_file(
        path: &Path,
        features: Option<&FeatureSet>,
    ) -> DriftResult<(FeatureSet, Vec<Observation>)> {
        let file = File::open(path)?;
        let result = Self::read_observations(BufReader::new(file), features)?;
        tracing::info!(
            "Loaded {} observations from {}",
            result.1.len(),
            path.display()
        );
        Ok(result)
    }

    pub fn read_observations<R: BufRead>(
        reader: R,
        features: Option<&FeatureSet>,
    ) -> DriftResult<(FeatureSet, Vec<Observation>)> {
        let table = RawTable::parse(reader)?;
        let entity_col = table.column(ENTITY_COLUMN)?;
        let day_col = table.column(DAY_COLUMN)?;

        let features = match features {
            Some(f) => f.clone(),
            None => FeatureSet::new(
                table
                    .header
                    .iter()
                    .filter(|h| h.as_str() != ENTITY_COLUMN && h.as_str() != DAY_COLUMN)
                    .cloned(),
            )
            .map_err(|e| DriftError::MalformedInput(format!("cannot infer features: {e}")))?,
        };
        let feature_cols = features
            .iter()
            .map(|f| table.column(f))
            .collect::<DriftResult<Vec<_>>>()?;

        let mut rows = Vec::with_capacity(table.records.len());
        for (line_no, fields) in &table.records {
            let values = features
                .iter()
                .zip(feature_cols.iter())
                .map(|(name, &col)| parse_value(&fields[col], name, *line_no))
                .collect::<DriftResult<Vec<_>>>()?;
            rows.push(Observation {
                entity_id: parse_entity(&fields[entity_col], *line_no)?,
                day: parse_day(&fields[day_col], *line_no)?,
                values,
            });
        }
        Ok((features, rows))
    }

    /// Read representations, inferring features from `{feature}_mean_{W}d` columns when `features` is `None`.
    pub fn read_representations_file(
        path: &Path,
        features: Option<&FeatureSet>,
        window_size: usize,
    ) -> DriftResult<(FeatureSet, Vec<Representation>)> {
        let file = File::open(path)?;
        let result = Self::read_representations(BufReader::new(file), features, window_size)?;
        tracing::info!(
            "Loaded {} representations from {}",
            result.1.len(),
            path.display()
        );
        Ok(result)
    }

    pub fn read_representations<R: BufRead>(
        reader: R,
        features: Option<&FeatureSet>,
        window_size: usize,
    ) -> DriftResult<(FeatureSet, Vec<Representation>)> {
        let table = RawTable::parse(reader)?;
        let entity_col = table.column(ENTITY_COLUMN)?;
        let day_col = table.column(DAY_COLUMN)?;

        let features = match features {
            Some(f) => f.clone(),
            None => {
                let suffix = format!("_mean_{window_size}d");
                let names: Vec<&str> = table
                    .header
                    .iter()
                    .filter_map(|h| h.strip_suffix(suffix.as_str()))
                    .collect();
                FeatureSet::new(names).map_err(|e| {
                    DriftError::MalformedInput(format!(
                        "cannot infer features from '*{suffix}' columns: {e}"
                    ))
                })?
            }
        };
        let columns: Vec<String> = features
            .iter()
            .map(|f| FeatureSet::representation_column(f, window_size))
            .collect();
        let value_cols = columns
            .iter()
            .map(|c| table.column(c))
            .collect::<DriftResult<Vec<_>>>()?;

        let mut rows = Vec::with_capacity(table.records.len());
        for (line_no, fields) in &table.records {
            let values = columns
                .iter()
                .zip(value_cols.iter())
                .map(|(name, &col)| parse_value(&fields[col], name, *line_no))
                .collect::<DriftResult<Vec<_>>>()?;
            rows.push(Representation {
                entity_id: parse_entity(&fields[entity_col], *line_no)?,
                day: parse_day(&fields[day_col], *line_no)?,
                values,
            });
        }
        Ok((features, rows))
    }

    pub fn read_scores_file(path: &Path) -> DriftResult<Vec<DriftScore>> {
        let file = File::open(path)?;
        let rows = Self::read_scores(BufReader::new(file))?;
        tracing::info!("Loaded {} drift scores from {}", rows.len(), path.display());
        Ok(rows)
    }

    pub fn read_scores<R: BufRead>(reader: R) -> DriftResult<Vec<DriftScore>> {
        let table = RawTable::parse(reader)?;
        let entity_col = table.column(ENTITY_COLUMN)?;
        let day_col = table.column(DAY_COLUMN)?;
        let score_col = table.column("drift_score")?;

        table
            .records
            .iter()
            .map(|(line_no, fields)| {
                let drift_score = parse_value(&fields[score_col], "drift_score", *line_no)?;
                if drift_score < 0.0 {
                    return Err(DriftError::MalformedInput(format!(
                        "line {line_no}: negative drift_score {drift_score}"
                    )));
                }
                Ok(DriftScore {
                    entity_id: parse_entity(&fields[entity_col], *line_no)?,
                    day: parse_day(&fields[day_col], *line_no)?,
                    drift_score,
                })
            })
            .collect()
    }

    pub fn read_explanations_file(path: &Path) -> DriftResult<Vec<Explanation>> {
        let file = File::open(path)?;
        let rows = Self::read_explanations(BufReader::new(file))?;
        tracing::info!("Loaded {} explanations from {}", rows.len(), path.display());
        Ok(rows)
    }

    pub fn read_explanations<R: BufRead>(reader: R) -> DriftResult<Vec<Explanation>> {
        let table = RawTable::parse(reader)?;
        let entity_col = table.column(ENTITY_COLUMN)?;
        let day_col = table.column(DAY_COLUMN)?;
        let feature_col = table.column("feature")?;
        let contribution_col = table.column("contribution")?;
        let direction_col = table.column("direction")?;

        table
            .records
            .iter()
            .map(|(line_no, fields)| {
                let direction = fields[direction_col].trim().parse::<Direction>().map_err(|e| {
                    DriftError::MalformedInput(format!("line {line_no}: {e}"))
                })?;
                Ok(Explanation {
                    entity_id: parse_entity(&fields[entity_col], *line_no)?,
                    day: parse_day(&fields[day_col], *line_no)?,
                    feature: fields[feature_col].clone(),
                    contribution: parse_value(&fields[contribution_col], "contribution", *line_no)?,
                    direction,
                })
            })
            .collect()
    }
}

impl TableWriter {
    /// Write a table through a sibling temp file, renamed into place once flushed.
    fn write_file<F>(path: &Path, write: F) -> DriftResult<()>
    where
        F: FnOnce(&mut BufWriter<File>) -> DriftResult<()>,
    {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut tmp_name = path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = std::path::PathBuf::from(tmp_name);

        let result = (|| {
            let mut writer = BufWriter::new(File::create(&tmp_path)?);
            write(&mut writer)?;
            writer.flush()?;
            Ok::<_, DriftError>(())
        })();

        match result {
            Ok(()) => {
                std::fs::rename(&tmp_path, path)?;
                tracing::debug!("Wrote table {}", path.display());
                Ok(())
            }
            Err(e) => {
                let _ = std::fs::remove_file(&tmp_path);
                Err(e)
            }
        }
    }

    pub fn write_observations_file(
        path: &Path,
        features: &FeatureSet,
        rows: &[Observation],
    ) -> DriftResult<()> {
        Self::write_file(path, |w| Self::write_observations(w, features, rows))
    }

    pub fn write_observations<W: Write>(
        writer: &mut W,
        features: &FeatureSet,
        rows: &[Observation],
    ) -> DriftResult<()> {
        write!(writer, "{ENTITY_COLUMN},{DAY_COLUMN}")?;
        for f in features.iter() {
            write!(writer, ",{f}")?;
        }
        writeln!(writer)?;
        for row in rows {
            write_vector_row(writer, &row.entity_id, row.day, &row.values)?;
        }
        Ok(())
    }

    pub fn write_representations_file(
        path: &Path,
        features: &FeatureSet,
        window_size: usize,
        rows: &[Representation],
    ) -> DriftResult<()> {
        Self::write_file(path, |w| {
            Self::write_representations(w, features, window_size, rows)
        })?;
        tracing::info!("Saved {} representations to {}", rows.len(), path.display());
        Ok(())
    }

    pub fn write_representations<W: Write>(
        writer: &mut W,
        features: &FeatureSet,
        window_size: usize,
        rows: &[Representation],
    ) -> DriftResult<()> {
        write!(writer, "{ENTITY_COLUMN},{DAY_COLUMN}")?;
        for f in features.iter() {
            write!(writer, ",{}", FeatureSet::representation_column(f, window_size))?;
        }
        writeln!(writer)?;
        for row in rows {
            write_vector_row(writer, &row.entity_id, row.day, &row.values)?;
        }
        Ok(())
    }

    pub fn write_scores_file(path: &Path, rows: &[DriftScore]) -> DriftResult<()> {
        Self::write_file(path, |w| Self::write_scores(w, rows))?;
        tracing::info!("Saved {} drift scores to {}", rows.len(), path.display());
        Ok(())
    }

    pub fn write_scores<W: Write>(writer: &mut W, rows: &[DriftScore]) -> DriftResult<()> {
        writeln!(writer, "{ENTITY_COLUMN},{DAY_COLUMN},drift_score")?;
        for row in rows {
            writeln!(
                writer,
                "{},{},{}",
                text_field(&row.entity_id, ENTITY_COLUMN)?,
                row.day,
                row.drift_score
            )?;
        }
        Ok(())
    }

    pub fn write_explanations_file(path: &Path, rows: &[Explanation]) -> DriftResult<()> {
        Self::write_file(path, |w| Self::write_explanations(w, rows))?;
        tracing::info!("Saved {} explanations to {}", rows.len(), path.display());
        Ok(())
    }

    pub fn write_explanations<W: Write>(writer: &mut W, rows: &[Explanation]) -> DriftResult<()> {
        writeln!(
            writer,
            "{ENTITY_COLUMN},{DAY_COLUMN},feature,contribution,direction"
        )?;
        for row in rows {
            writeln!(
                writer,
                "{},{},{},{},{}",
                text_field(&row.entity_id, ENTITY_COLUMN)?,
                row.day,
                text_field(&row.feature, "feature")?,
                row.contribution,
                row.direction
            )?;
        }
        Ok(())
    }
}

fn write_vector_row<W: Write>(
    writer: &mut W,
    entity_id: &str,
    day: u32,
    values: &[f64],
) -> DriftResult<()> {
    write!(writer, "{},{}", text_field(entity_id, ENTITY_COLUMN)?, day)?;
    for v in values {
        write!(writer, ",{v}")?;
    }
    writeln!(writer)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn features() -> FeatureSet {
        FeatureSet::new(["session_count", "avg_session_duration"]).unwrap()
    }

    #[test]
    fn test_read_observations_any_column_order() {
        let csv = "avg_session_duration,day,entity_id,session_count\n12.5,0,u1,3\n13,1,u1,4\n";
        let (features, rows) = TableReader::read_observations(csv.as_bytes(), Some(&features())).unwrap();
        assert_eq!(features.names(), ["session_count", "avg_session_duration"]);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].values, vec![3.0, 12.5]);
        assert_eq!(rows[1].day, 1);
    }

    #[test]
    fn test_infer_features_from_header() {
        let csv = "entity_id,day,a,b,c\nu1,0,1,2,3\n";
        let (features, rows) = TableReader::read_observations(csv.as_bytes(), None).unwrap();
        assert_eq!(features.names(), ["a", "b", "c"]);
        assert_eq!(rows[0].values, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_missing_column() {
        let csv = "entity_id,day,session_count\nu1,0,3\n";
        let err = TableReader::read_observations(csv.as_bytes(), Some(&features())).unwrap_err();
        assert!(err.to_string().contains("avg_session_duration"));
    }

    #[test]
    fn test_non_numeric_value_reports_line() {
        let csv = "entity_id,day,session_count,avg_session_duration\nu1,0,3,1\nu1,1,three,1\n";
        let err = TableReader::read_observations(csv.as_bytes(), Some(&features())).unwrap_err();
        assert!(matches!(err, DriftError::MalformedInput(_)));
        assert!(err.to_string().contains("line 3"));
    }

    #[test]
    fn test_non_finite_value_rejected() {
        let csv = "entity_id,day,session_count,avg_session_duration\nu1,0,NaN,1\n";
        assert!(TableReader::read_observations(csv.as_bytes(), Some(&features())).is_err());
    }

    #[test]
    fn test_negative_day_rejected() {
        let csv = "entity_id,day,session_count,avg_session_duration\nu1,-1,1,1\n";
        assert!(TableReader::read_observations(csv.as_bytes(), Some(&features())).is_err());
    }

    #[test]
    fn test_ragged_row_rejected() {
        let csv = "entity_id,day,session_count,avg_session_duration\nu1,0,1\n";
        let err = TableReader::read_observations(csv.as_bytes(), Some(&features())).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_empty_table_rejected() {
        assert!(TableReader::read_scores("".as_bytes()).is_err());
    }

    #[test]
    fn test_quoted_entity_ids() {
        let rows = vec![DriftScore {
            entity_id: "acme, inc \"west\"".to_string(),
            day: 50,
            drift_score: 0.25,
        }];
        let mut buf = Vec::new();
        TableWriter::write_scores(&mut buf, &rows).unwrap();
        let text = String::from_utf8(buf.clone()).unwrap();
        assert!(text.contains("\"acme, inc \"\"west\"\"\""));
        let loaded = TableReader::read_scores(&buf[..]).unwrap();
        assert_eq!(loaded, rows);
    }

    #[test]
    fn test_line_break_in_entity_id_refused() {
        let rows = vec![DriftScore {
            entity_id: "a\nb".to_string(),
            day: 50,
            drift_score: 0.25,
        }];
        let mut buf = Vec::new();
        let err = TableWriter::write_scores(&mut buf, &rows).unwrap_err();
        assert!(matches!(err, DriftError::MalformedInput(_)));

        let rows = vec![Representation {
            entity_id: "a\rb".to_string(),
            day: 13,
            values: vec![1.0, 2.0],
        }];
        assert!(TableWriter::write_representations(&mut Vec::new(), &features(), 14, &rows).is_err());

        let text = "entity_id,day,drift_score\n\"a\rb\",50,0.25\n";
        assert!(TableReader::read_scores(text.as_bytes()).is_err());
    }

    #[test]
    fn test_split_record_errors() {
        assert!(split_record("a,\"b", 4).is_err());
        assert!(split_record("a,b\"c", 4).is_err());
        assert_eq!(split_record("a,,c\r", 1).unwrap(), vec!["a", "", "c"]);
    }

    #[test]
    fn test_representation_columns() {
        let rows = vec![Representation {
            entity_id: "u1".to_string(),
            day: 13,
            values: vec![3.5, 0.1 + 0.2],
        }];
        let mut buf = Vec::new();
        TableWriter::write_representations(&mut buf, &features(), 14, &rows).unwrap();
        let text = String::from_utf8(buf.clone()).unwrap();
        assert!(text.starts_with(
            "entity_id,day,session_count_mean_14d,avg_session_duration_mean_14d\n"
        ));
        let (_, loaded) = TableReader::read_representations(&buf[..], Some(&features()), 14).unwrap();
        assert_eq!(loaded, rows);
        assert!(TableReader::read_representations(&buf[..], Some(&features()), 7).is_err());

        let (inferred, _) = TableReader::read_representations(&buf[..], None, 14).unwrap();
        assert_eq!(inferred, features());
        assert!(TableReader::read_representations(&buf[..], None, 7).is_err());
    }

    #[test]
    fn test_explanations_direction_column() {
        let csv = "entity_id,day,feature,contribution,direction\nu1,60,session_count,0.4,increase\n";
        let rows = TableReader::read_explanations(csv.as_bytes()).unwrap();
        assert_eq!(rows[0].direction, Direction::Increase);

        let bad = "entity_id,day,feature,contribution,direction\nu1,60,session_count,0.4,up\n";
        let err = TableReader::read_explanations(bad.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_negative_score_rejected() {
        let csv = "entity_id,day,drift_score\nu1,60,-0.5\n";
        assert!(TableReader::read_scores(csv.as_bytes()).is_err());
    }

    #[test]
    fn test_file_write_replaces_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(SCORES_FILE);
        let rows = vec![DriftScore {
            entity_id: "u1".to_string(),
            day: 43,
            drift_score: 0.0,
        }];
        TableWriter::write_scores_file(&path, &rows).unwrap();
        TableWriter::write_scores_file(&path, &rows).unwrap();
        assert_eq!(TableReader::read_scores_file(&path).unwrap(), rows);
        assert!(!dir.path().join("nested").join("drift_scores.csv.tmp").exists());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = TableReader::read_scores_file(&dir.path().join("nope.csv")).unwrap_err();
        assert!(matches!(err, DriftError::Io(_)));
    }
}
