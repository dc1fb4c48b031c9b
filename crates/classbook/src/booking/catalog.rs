//! Class catalog loading: CSV import and the default seed schedule.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use serde::Deserialize;

use super::domain::{ClassSession, NewClassSession};
use super::repository::{ClassRepository, RepositoryError};

#[derive(Debug)]
pub enum CatalogImportError {
    Io(std::io::Error),
    Csv(csv::Error),
    InvalidSchedule { line: usize, value: String },
    InvalidCapacity { line: usize, title: String },
    Repository(RepositoryError),
}

impl std::fmt::Display for CatalogImportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CatalogImportError::Io(err) => write!(f, "failed to read class catalog: {}", err),
            CatalogImportError::Csv(err) => write!(f, "invalid class catalog CSV: {}", err),
            CatalogImportError::InvalidSchedule { line, value } => write!(
                f,
                "line {}: schedule '{}' is neither RFC 3339 nor YYYY-MM-DD HH:MM",
                line, value
            ),
            CatalogImportError::InvalidCapacity { line, title } => {
                write!(f, "line {}: class '{}' needs a capacity of at least 1", line, title)
            }
            CatalogImportError::Repository(err) => {
                write!(f, "could not store imported classes: {}", err)
            }
        }
    }
}

impl std::error::Error for CatalogImportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CatalogImportError::Io(err) => Some(err),
            CatalogImportError::Csv(err) => Some(err),
            CatalogImportError::Repository(err) => Some(err),
            CatalogImportError::InvalidSchedule { .. }
            | CatalogImportError::InvalidCapacity { .. } => None,
        }
    }
}

impl From<std::io::Error> for CatalogImportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<csv::Error> for CatalogImportError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err)
    }
}

impl From<RepositoryError> for CatalogImportError {
    fn from(err: RepositoryError) -> Self {
        Self::Repository(err)
    }
}

#[derive(Debug, Deserialize)]
struct CatalogRow {
    #[serde(rename = "Title")]
    title: String,
    #[serde(rename = "Instructor")]
    instructor: String,
    #[serde(rename = "Schedule")]
    schedule: String,
    #[serde(rename = "Capacity")]
    capacity: i64,
}

/// Parse a `Title,Instructor,Schedule,Capacity` CSV export.
pub fn parse_classes<R: Read>(reader: R) -> Result<Vec<NewClassSession>, CatalogImportError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut classes = Vec::new();

    for (index, record) in csv_reader.deserialize::<CatalogRow>().enumerate() {
        let row = record?;
        // Header occupies line 1.
        let line = index + 2;

        let schedule =
            parse_schedule(&row.schedule).ok_or_else(|| CatalogImportError::InvalidSchedule {
                line,
                value: row.schedule.clone(),
            })?;
        let capacity = u32::try_from(row.capacity)
            .ok()
            .filter(|capacity| *capacity >= 1)
            .ok_or_else(|| CatalogImportError::InvalidCapacity {
                line,
                title: row.title.clone(),
            })?;

        classes.push(NewClassSession {
            title: row.title,
            instructor: row.instructor,
            schedule,
            capacity,
        });
    }

    Ok(classes)
}

pub fn load_csv(path: &Path) -> Result<Vec<NewClassSession>, CatalogImportError> {
    let file = File::open(path)?;
    parse_classes(file)
}

/// Store every class, returning the persisted sessions with their ids.
pub fn import_classes<C>(
    repository: &C,
    classes: Vec<NewClassSession>,
) -> Result<Vec<ClassSession>, CatalogImportError>
where
    C: ClassRepository + ?Sized,
{
    classes
        .into_iter()
        .map(|class| repository.create_class(class).map_err(CatalogImportError::from))
        .collect()
}

/// Two starter classes, one and two days after `now`.
pub fn default_classes(now: DateTime<Utc>) -> Vec<NewClassSession> {
    vec![
        NewClassSession {
            title: "Clase gi avanzado".to_string(),
            instructor: "Coach Ana".to_string(),
            schedule: now + Duration::days(1),
            capacity: 12,
        },
        NewClassSession {
            title: "Fundamentos NoGi".to_string(),
            instructor: "Coach Luis".to_string(),
            schedule: now + Duration::days(2),
            capacity: 16,
        },
    ]
}

fn parse_schedule(value: &str) -> Option<DateTime<Utc>> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }

    if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M") {
        return Some(dt.and_utc());
    }

    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}
