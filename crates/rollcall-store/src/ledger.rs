//! The attendance ledger: an append-only, self-migrating CSV table.
//!
//! On disk the ledger is positional:
//!
//! ```text
//! Date,Section,Ada (100),Bob (200)
//! 2024-01-10,BSCS 5A,P,A
//! ```
//!
//! In memory it is a [`LedgerSnapshot`]: an ordered list of student columns
//! plus rows whose marks are keyed by identity, so adding a column can never
//! shift an existing mark. Columns are only ever appended. Rows written before
//! a column existed read as [`Mark::Absent`] for it.
//!
//! Legacy files predate the Section column (`Date,Ada (100),...`). They are
//! migrated by inserting `Section` at index 1 and backfilling
//! [`UNKNOWN_SECTION`] into every row; readers see the migrated shape, and the
//! file itself is rewritten on the next mutation.
//!
//! Every mutation reads the whole file, changes it, and replaces it through a
//! temp file in the same directory. Callers that share a ledger across threads
//! serialize access themselves.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::LedgerError;

type Result<T, E = LedgerError> = std::result::Result<T, E>;

pub const DATE_COLUMN: &str = "Date";
pub const SECTION_COLUMN: &str = "Section";
/// Section backfilled into rows that predate the Section column.
pub const UNKNOWN_SECTION: &str = "Unknown";
pub const DATE_FORMAT: &str = "%Y-%m-%d";

const PRESENT: &str = "P";
const ABSENT: &str = "A";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mark {
    Present,
    Absent,
}

impl Mark {
    pub fn as_str(self) -> &'static str {
        match self {
            Mark::Present => PRESENT,
            Mark::Absent => ABSENT,
        }
    }

    /// Only `P` counts as present; anything else is absent.
    fn parse(cell: &str) -> Self {
        if cell.trim() == PRESENT {
            Mark::Present
        } else {
            Mark::Absent
        }
    }
}

/// What to do when a (date, section) pair is recorded twice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordPolicy {
    /// Every call adds a row; one row per marking session.
    #[default]
    Append,
    /// Overwrite the existing row for the same date and section, if any.
    Replace,
}

impl FromStr for RecordPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "append" => Ok(RecordPolicy::Append),
            "replace" => Ok(RecordPolicy::Replace),
            other => Err(format!("unknown record policy {other:?} (expected append or replace)")),
        }
    }
}

/// One marking event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRow {
    /// Kept as written so rows with unparseable dates survive a rewrite.
    pub date: String,
    pub section: String,
    /// Only students with an explicit cell; missing students read as absent.
    marks: BTreeMap<String, Mark>,
}

impl AttendanceRow {
    pub fn parsed_date(&self) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(self.date.trim(), DATE_FORMAT).ok()
    }

    pub fn mark(&self, identity: &str) -> Mark {
        self.marks.get(identity).copied().unwrap_or(Mark::Absent)
    }

    /// Marks aligned with `students`.
    pub fn marks_for(&self, students: &[String]) -> Vec<Mark> {
        students.iter().map(|s| self.mark(s)).collect()
    }

    pub fn present_count(&self, students: &[String]) -> usize {
        students.iter().filter(|s| self.mark(s) == Mark::Present).count()
    }

    pub fn absent_count(&self, students: &[String]) -> usize {
        students.len() - self.present_count(students)
    }

    fn to_record(&self, students: &[String]) -> Vec<String> {
        let mut record = Vec::with_capacity(students.len() + 2);
        record.push(self.date.clone());
        record.push(self.section.clone());
        record.extend(self.marks_for(students).into_iter().map(|m| m.as_str().to_string()));
        record
    }
}

/// The full ledger as read at one moment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    students: Vec<String>,
    /// Whether the file on disk already had a Section column.
    section_column: bool,
    rows: Vec<AttendanceRow>,
}

impl LedgerSnapshot {
    /// Student columns in header order.
    pub fn students(&self) -> &[String] {
        &self.students
    }

    pub fn rows(&self) -> &[AttendanceRow] {
        &self.rows
    }

    pub fn has_section_column(&self) -> bool {
        self.section_column
    }

    pub fn contains_student(&self, identity: &str) -> bool {
        self.students.iter().any(|s| s == identity)
    }

    /// `Date, Section, <students...>`; empty when the ledger has never been written.
    pub fn header(&self) -> Vec<String> {
        if self.students.is_empty() && self.rows.is_empty() && !self.section_column {
            return Vec::new();
        }
        let mut header = vec![DATE_COLUMN.to_string(), SECTION_COLUMN.to_string()];
        header.extend(self.students.iter().cloned());
        header
    }

    /// Positional `P`/`A` table matching [`header`](Self::header).
    pub fn table(&self) -> Vec<Vec<String>> {
        self.rows.iter().map(|r| r.to_record(&self.students)).collect()
    }

    /// Same schema, only the rows matching `keep`.
    pub fn filter(&self, mut keep: impl FnMut(&AttendanceRow) -> bool) -> LedgerSnapshot {
        LedgerSnapshot {
            students: self.students.clone(),
            section_column: self.section_column,
            rows: self.rows.iter().filter(|r| keep(r)).cloned().collect(),
        }
    }

    /// Append a column for `identity` if it is new. Existing rows read it as absent.
    pub fn ensure_student(&mut self, identity: &str) -> Result<bool> {
        validate_identity(identity)?;
        if self.contains_student(identity) {
            return Ok(false);
        }
        self.students.push(identity.to_string());
        self.section_column = true;
        Ok(true)
    }

    /// Build a row marking exactly `present` as present, over the current columns.
    ///
    /// Call [`ensure_student`](Self::ensure_student) for new identities first;
    /// present identities without a column are ignored.
    pub fn build_row(&self, date: NaiveDate, section: &str, present: &BTreeSet<String>) -> AttendanceRow {
        let marks = self
            .students
            .iter()
            .map(|s| {
                let mark = if present.contains(s) { Mark::Present } else { Mark::Absent };
                (s.clone(), mark)
            })
            .collect();
        AttendanceRow {
            date: date.format(DATE_FORMAT).to_string(),
            section: normalize_section(section),
            marks,
        }
    }

    /// Add `row` according to `policy`. Returns true if an existing row was replaced.
    pub fn insert_row(&mut self, row: AttendanceRow, policy: RecordPolicy) -> bool {
        self.section_column = true;
        if policy == RecordPolicy::Replace {
            if let Some(existing) = self
                .rows
                .iter_mut()
                .find(|r| r.date == row.date && r.section == row.section)
            {
                *existing = row;
                return true;
            }
        }
        self.rows.push(row);
        false
    }

    /// Interpret raw CSV records, migrating a legacy header in memory.
    fn from_records(mut records: Vec<Vec<String>>) -> Self {
        let section_column = !migrate_legacy(&mut records);
        let mut records = records.into_iter();
        let Some(header) = records.next() else {
            return Self::default();
        };

        let students: Vec<String> = header.into_iter().skip(2).collect();

        let rows = records
            .map(|record| {
                let mut cells = record.into_iter();
                let date = cells.next().unwrap_or_default();
                let section = cells.next().unwrap_or_else(|| UNKNOWN_SECTION.to_string());
                let marks = students
                    .iter()
                    .zip(cells)
                    .map(|(s, cell)| (s.clone(), Mark::parse(&cell)))
                    .collect();
                AttendanceRow {
                    date,
                    section,
                    marks,
                }
            })
            .collect();

        Self {
            students,
            section_column,
            rows,
        }
    }

    fn to_records(&self) -> Vec<Vec<String>> {
        let mut records = Vec::with_capacity(self.rows.len() + 1);
        records.push(self.header());
        records.extend(self.table());
        records
    }
}

/// Bring a legacy ledger (no Section column) into the current shape.
///
/// A header is legacy when its second field is not exactly `Section`. The
/// field is inserted at index 1 of the header and [`UNKNOWN_SECTION`] at
/// index 1 of every row. Returns whether anything changed; running it on a
/// migrated ledger is a no-op.
pub fn migrate_legacy(records: &mut [Vec<String>]) -> bool {
    let Some(header) = records.first() else {
        return false;
    };
    if header.get(1).map(String::as_str) == Some(SECTION_COLUMN) {
        return false;
    }

    for (i, record) in records.iter_mut().enumerate() {
        let value = if i == 0 { SECTION_COLUMN } else { UNKNOWN_SECTION };
        let at = record.len().min(1);
        record.insert(at, value.to_string());
    }
    true
}

fn validate_identity(identity: &str) -> Result<()> {
    let trimmed = identity.trim();
    if trimmed.is_empty() || trimmed != identity || identity == DATE_COLUMN || identity == SECTION_COLUMN {
        return Err(LedgerError::InvalidIdentity(identity.to_string()));
    }
    Ok(())
}

fn normalize_section(section: &str) -> String {
    let section = section.trim();
    if section.is_empty() {
        UNKNOWN_SECTION.to_string()
    } else {
        section.to_string()
    }
}

/// Handle to the ledger file. Holds no state between calls.
#[derive(Debug, Clone)]
pub struct Ledger {
    path: PathBuf,
    policy: RecordPolicy,
}

impl Ledger {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            policy: RecordPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: RecordPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn policy(&self) -> RecordPolicy {
        self.policy
    }

    /// Current contents; an absent file reads as an empty ledger.
    pub fn read_all(&self) -> Result<LedgerSnapshot> {
        Ok(self
            .read_records()?
            .map(LedgerSnapshot::from_records)
            .unwrap_or_default())
    }

    /// Make sure the ledger has a Section column and a column for `identity`.
    ///
    /// Writes only when something changed, so repeated calls are free.
    pub fn ensure_schema(&self, identity: &str) -> Result<()> {
        validate_identity(identity)?;

        let Some(mut records) = self.read_records()? else {
            tracing::info!(path = %self.path.display(), identity, "creating attendance ledger");
            let header = vec![DATE_COLUMN.to_string(), SECTION_COLUMN.to_string(), identity.to_string()];
            return self.write_records(&[header]);
        };

        let migrated = migrate_legacy(&mut records);
        if migrated {
            tracing::info!(path = %self.path.display(), "migrated legacy ledger: added Section column");
        }

        let mut snapshot = LedgerSnapshot::from_records(records);
        let added = snapshot.ensure_student(identity)?;
        if added {
            tracing::info!(identity, "added student column");
        }

        if migrated || added {
            self.write_records(&snapshot.to_records())?;
        }
        Ok(())
    }

    /// Append one marking event for `date` and `section`.
    ///
    /// Present identities without a column get one first. Every student column
    /// is marked present iff its identity is in `present`. With
    /// [`RecordPolicy::Replace`] an existing row for the same pair is
    /// overwritten instead.
    pub fn record(
        &self,
        date: NaiveDate,
        section: &str,
        present: &BTreeSet<String>,
    ) -> Result<AttendanceRow> {
        self.record_with_roster(date, section, &[], present)
    }

    /// Like [`record`](Self::record), but first gives every identity in
    /// `roster` a column, so absent students without one are still counted.
    pub fn record_with_roster(
        &self,
        date: NaiveDate,
        section: &str,
        roster: &[String],
        present: &BTreeSet<String>,
    ) -> Result<AttendanceRow> {
        let mut snapshot = self.read_all()?;
        for identity in roster.iter().chain(present) {
            if snapshot.ensure_student(identity)? {
                tracing::info!(identity = %identity, "added student column");
            }
        }

        let row = snapshot.build_row(date, section, present);
        let replaced = snapshot.insert_row(row.clone(), self.policy);
        self.write_records(&snapshot.to_records())?;

        tracing::info!(
            date = %row.date,
            section = %row.section,
            present = row.present_count(snapshot.students()),
            students = snapshot.students().len(),
            replaced,
            "attendance recorded"
        );
        Ok(row)
    }

    fn read_records(&self) -> Result<Option<Vec<Vec<String>>>> {
        let file = match fs::File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(LedgerError::from_io(&self.path, e)),
        };

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(file);

        let mut records = Vec::new();
        for record in reader.records() {
            let record = record?;
            records.push(record.iter().map(str::to_string).collect::<Vec<_>>());
        }

        if records.is_empty() {
            return Ok(None);
        }
        Ok(Some(records))
    }

    /// Replace the file with `records` via a sibling temp file.
    fn write_records(&self, records: &[Vec<String>]) -> Result<()> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(|e| LedgerError::from_io(&dir, e))?;

        let mut tmp = NamedTempFile::new_in(&dir).map_err(|e| LedgerError::from_io(&dir, e))?;
        let tmp_path = tmp.path().to_path_buf();
        {
            let mut writer = csv::WriterBuilder::new().flexible(true).from_writer(tmp.as_file_mut());
            for record in records {
                writer.write_record(record)?;
            }
            writer.flush().map_err(|e| LedgerError::from_io(&tmp_path, e))?;
        }

        if let Ok(meta) = fs::metadata(&self.path) {
            fs::set_permissions(&tmp_path, meta.permissions())
                .map_err(|e| LedgerError::from_io(&tmp_path, e))?;
        }

        tmp.persist(&self.path)
            .map_err(|e| LedgerError::from_io(&self.path, e.error))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, DATE_FORMAT).unwrap()
    }

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn records(rows: &[&[&str]]) -> Vec<Vec<String>> {
        rows.iter().map(|r| r.iter().map(|c| c.to_string()).collect()).collect()
    }

    fn ledger_in(dir: &tempfile::TempDir) -> Ledger {
        Ledger::open(dir.path().join("attendance.csv"))
    }

    fn file_lines(ledger: &Ledger) -> Vec<String> {
        fs::read_to_string(ledger.path())
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_migrate_legacy_inserts_section() {
        let mut recs = records(&[&["Date", "Ada (1)", "Bob (2)"], &["2024-01-01", "P", "A"]]);
        assert!(migrate_legacy(&mut recs));
        assert_eq!(
            recs,
            records(&[&["Date", "Section", "Ada (1)", "Bob (2)"], &["2024-01-01", "Unknown", "P", "A"]])
        );
    }

    #[test]
    fn test_migrate_legacy_is_idempotent() {
        let mut recs = records(&[&["Date", "Ada (1)"], &["2024-01-01", "P"]]);
        assert!(migrate_legacy(&mut recs));
        let once = recs.clone();
        assert!(!migrate_legacy(&mut recs));
        assert_eq!(recs, once);
    }

    #[test]
    fn test_migrate_legacy_date_only_header() {
        let mut recs = records(&[&["Date"], &["2024-01-01"]]);
        assert!(migrate_legacy(&mut recs));
        assert_eq!(recs, records(&[&["Date", "Section"], &["2024-01-01", "Unknown"]]));
        assert!(!migrate_legacy(&mut []));
    }

    #[test]
    fn test_short_rows_read_as_absent() {
        let snapshot = LedgerSnapshot::from_records(records(&[
            &["Date", "Section", "Ada (1)", "Bob (2)", "Cy (3)"],
            &["2024-01-01", "X", "P"],
        ]));
        let row = &snapshot.rows()[0];
        assert_eq!(row.marks_for(snapshot.students()), vec![Mark::Present, Mark::Absent, Mark::Absent]);
        assert_eq!(snapshot.table()[0], vec!["2024-01-01", "X", "P", "A", "A"]);
    }

    #[test]
    fn test_record_policy_parse() {
        assert_eq!("append".parse::<RecordPolicy>(), Ok(RecordPolicy::Append));
        assert_eq!(" Replace ".parse::<RecordPolicy>(), Ok(RecordPolicy::Replace));
        assert!("upsert".parse::<RecordPolicy>().is_err());
    }

    #[test]
    fn test_read_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = ledger_in(&dir).read_all().unwrap();
        assert!(snapshot.rows().is_empty());
        assert!(snapshot.students().is_empty());
        assert!(snapshot.header().is_empty());
    }

    #[test]
    fn test_ensure_schema_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger_in(&dir);
        ledger.ensure_schema("Ada (1)").unwrap();
        assert_eq!(file_lines(&ledger), vec!["Date,Section,Ada (1)"]);
    }

    #[test]
    fn test_ensure_schema_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger_in(&dir);
        ledger.ensure_schema("Ada (1)").unwrap();
        ledger.record(date("2024-01-01"), "X", &set(&["Ada (1)"])).unwrap();

        ledger.ensure_schema("Bob (2)").unwrap();
        let once = fs::read_to_string(ledger.path()).unwrap();
        ledger.ensure_schema("Bob (2)").unwrap();
        assert_eq!(fs::read_to_string(ledger.path()).unwrap(), once);
    }

    #[test]
    fn test_new_column_backfills_absent_and_keeps_old_marks() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger_in(&dir);
        ledger.ensure_schema("Ada (1)").unwrap();
        ledger.ensure_schema("Bob (2)").unwrap();
        ledger.record(date("2024-01-01"), "X", &set(&["Bob (2)"])).unwrap();
        ledger.record(date("2024-01-02"), "X", &set(&["Ada (1)"])).unwrap();

        ledger.ensure_schema("Cy (3)").unwrap();
        assert_eq!(
            file_lines(&ledger),
            vec![
                "Date,Section,Ada (1),Bob (2),Cy (3)",
                "2024-01-01,X,A,P,A",
                "2024-01-02,X,P,A,A",
            ]
        );
    }

    #[test]
    fn test_record_scenario_row() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger_in(&dir);
        for s in ["A", "B", "C"] {
            ledger.ensure_schema(s).unwrap();
        }
        let row = ledger.record(date("2024-01-10"), "X", &set(&["A", "B"])).unwrap();

        let snapshot = ledger.read_all().unwrap();
        assert_eq!(snapshot.table(), vec![vec!["2024-01-10", "X", "P", "P", "A"]]);
        assert_eq!(row.marks_for(snapshot.students()), vec![Mark::Present, Mark::Present, Mark::Absent]);
    }

    #[test]
    fn test_record_adds_unseen_students() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger_in(&dir);
        ledger.record(date("2024-01-01"), "X", &set(&["Bob (2)", "Ada (1)"])).unwrap();
        ledger.record(date("2024-01-02"), "X", &set(&["Cy (3)"])).unwrap();

        assert_eq!(
            file_lines(&ledger),
            vec![
                "Date,Section,Ada (1),Bob (2),Cy (3)",
                "2024-01-01,X,P,P,A",
                "2024-01-02,X,A,A,P",
            ]
        );
    }

    #[test]
    fn test_record_with_roster_adds_absent_students() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger_in(&dir);
        ledger.ensure_schema("Ada (1)").unwrap();
        ledger.record(date("2024-01-01"), "X", &set(&["Ada (1)"])).unwrap();

        let roster = vec!["Ada (1)".to_string(), "Zed (9)".to_string(), "Bob (2)".to_string()];
        ledger
            .record_with_roster(date("2024-01-02"), "X", &roster, &set(&["Ada (1)"]))
            .unwrap();

        assert_eq!(
            file_lines(&ledger),
            vec![
                "Date,Section,Ada (1),Zed (9),Bob (2)",
                "2024-01-01,X,P,A,A",
                "2024-01-02,X,P,A,A",
            ]
        );
    }

    #[test]
    fn test_record_empty_present_set() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger_in(&dir);
        ledger.ensure_schema("Ada (1)").unwrap();
        ledger.record(date("2024-01-01"), "  ", &BTreeSet::new()).unwrap();
        assert_eq!(file_lines(&ledger)[1], "2024-01-01,Unknown,A");
    }

    #[test]
    fn test_record_append_policy_keeps_both_rows() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger_in(&dir);
        ledger.record(date("2024-01-01"), "X", &set(&["Ada (1)"])).unwrap();
        ledger.record(date("2024-01-01"), "X", &BTreeSet::new()).unwrap();
        assert_eq!(ledger.read_all().unwrap().rows().len(), 2);
    }

    #[test]
    fn test_record_replace_policy_upserts() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger_in(&dir).with_policy(RecordPolicy::Replace);
        ledger.record(date("2024-01-01"), "X", &set(&["Ada (1)"])).unwrap();
        ledger.record(date("2024-01-01"), "Y", &set(&["Ada (1)"])).unwrap();
        ledger.record(date("2024-01-01"), "X", &set(&["Bob (2)"])).unwrap();

        assert_eq!(
            file_lines(&ledger),
            vec![
                "Date,Section,Ada (1),Bob (2)",
                "2024-01-01,X,A,P",
                "2024-01-01,Y,P,A",
            ]
        );
    }

    #[test]
    fn test_legacy_file_migrated_on_write() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger_in(&dir);
        fs::write(ledger.path(), "Date,Ada (1),Bob (2)\n2023-12-01,P,A\n").unwrap();

        // Reads see the migrated shape without touching the file.
        let snapshot = ledger.read_all().unwrap();
        assert!(!snapshot.has_section_column());
        assert_eq!(snapshot.rows()[0].section, UNKNOWN_SECTION);
        assert_eq!(file_lines(&ledger)[0], "Date,Ada (1),Bob (2)");

        ledger.record(date("2024-01-01"), "X", &set(&["Bob (2)"])).unwrap();
        assert_eq!(
            file_lines(&ledger),
            vec![
                "Date,Section,Ada (1),Bob (2)",
                "2023-12-01,Unknown,P,A",
                "2024-01-01,X,A,P",
            ]
        );
        assert!(ledger.read_all().unwrap().has_section_column());
    }

    #[test]
    fn test_ensure_schema_migrates_legacy_even_for_known_student() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger_in(&dir);
        fs::write(ledger.path(), "Date,Ada (1)\n2023-12-01,P\n").unwrap();
        ledger.ensure_schema("Ada (1)").unwrap();
        assert_eq!(file_lines(&ledger), vec!["Date,Section,Ada (1)", "2023-12-01,Unknown,P"]);
    }

    #[test]
    fn test_names_with_delimiters_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger_in(&dir);
        let tricky = "O'Neil, \"Jo\" (7)";
        ledger.record(date("2024-01-01"), "BSCS, 5A", &set(&[tricky])).unwrap();

        let snapshot = ledger.read_all().unwrap();
        assert_eq!(snapshot.students(), &[tricky.to_string()]);
        assert_eq!(snapshot.rows()[0].section, "BSCS, 5A");
        assert_eq!(snapshot.rows()[0].mark(tricky), Mark::Present);
    }

    #[test]
    fn test_invalid_identity_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger_in(&dir);
        for bad in ["", "  ", "Date", "Section", " padded "] {
            assert!(matches!(ledger.ensure_schema(bad), Err(LedgerError::InvalidIdentity(_))), "{bad:?}");
        }
        assert!(!ledger.path().exists());
    }

    #[test]
    fn test_unwritable_location_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, "").unwrap();
        let ledger = Ledger::open(blocker.join("attendance.csv"));
        let err = ledger.ensure_schema("Ada (1)").unwrap_err();
        assert!(matches!(err, LedgerError::Io { .. }), "{err:?}");
    }

    #[test]
    fn test_unparseable_date_survives_rewrite() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger_in(&dir);
        fs::write(ledger.path(), "Date,Section,Ada (1)\nyesterday,X,P\n").unwrap();
        ledger.record(date("2024-01-01"), "X", &BTreeSet::new()).unwrap();
        let snapshot = ledger.read_all().unwrap();
        assert_eq!(snapshot.rows()[0].date, "yesterday");
        assert!(snapshot.rows()[0].parsed_date().is_none());
    }
}
