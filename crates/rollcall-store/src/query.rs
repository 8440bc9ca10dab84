//! Reports over a [`LedgerSnapshot`].
//!
//! Everything here is a pure function of one snapshot; callers take a fresh
//! snapshot with [`Ledger::read_all`](crate::Ledger::read_all) for every
//! report. Functions that depend on the current date take it as `today`.

use std::collections::{BTreeMap, HashMap};

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::ledger::{AttendanceRow, LedgerSnapshot, Mark};

/// Section filter value meaning "every section".
pub const ALL_SECTIONS: &str = "All";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentRate {
    pub identity: String,
    /// Percentage in `[0, 100]`.
    pub rate: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyCount {
    pub present: usize,
    pub absent: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionTally {
    pub present: usize,
    pub total: usize,
}

impl SectionTally {
    pub fn rate(&self) -> f64 {
        percentage(self.present, self.total)
    }
}

/// Present counts per section for one day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayAttendance {
    pub date: NaiveDate,
    pub sections: BTreeMap<String, usize>,
}

/// Present count for one (date, section) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    pub date: String,
    pub section: String,
    pub present: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub date: String,
    pub section: String,
    pub mark: Mark,
}

fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

/// `None` and [`ALL_SECTIONS`] both mean no filter.
fn section_filter(section: Option<&str>) -> Option<&str> {
    section.filter(|s| *s != ALL_SECTIONS)
}

/// Ledgers without a Section column ignore the section filter.
fn matches_section(snapshot: &LedgerSnapshot, row: &AttendanceRow, section: Option<&str>) -> bool {
    match section_filter(section) {
        Some(wanted) if snapshot.has_section_column() => row.section == wanted,
        _ => true,
    }
}

/// Student columns in header order.
pub fn students(snapshot: &LedgerSnapshot) -> Vec<String> {
    snapshot.students().to_vec()
}

/// Case-insensitive substring search over student columns.
pub fn search_students(snapshot: &LedgerSnapshot, query: &str) -> Vec<String> {
    let query = query.to_lowercase();
    snapshot
        .students()
        .iter()
        .filter(|s| s.to_lowercase().contains(&query))
        .cloned()
        .collect()
}

/// Share of all rows marking `identity` present. Not date filtered.
pub fn rate(snapshot: &LedgerSnapshot, identity: &str) -> f64 {
    if !snapshot.contains_student(identity) {
        return 0.0;
    }
    let rows = snapshot.rows();
    let present = rows.iter().filter(|r| r.mark(identity) == Mark::Present).count();
    percentage(present, rows.len())
}

/// One [`rate`] per student, in header order. Empty when there are no rows.
pub fn all_rates(snapshot: &LedgerSnapshot) -> Vec<StudentRate> {
    if snapshot.rows().is_empty() {
        return Vec::new();
    }
    snapshot
        .students()
        .iter()
        .map(|identity| StudentRate {
            identity: identity.clone(),
            rate: rate(snapshot, identity),
        })
        .collect()
}

/// Students whose rate is strictly below `threshold`.
pub fn low_rate(snapshot: &LedgerSnapshot, threshold: f64) -> Vec<StudentRate> {
    all_rates(snapshot)
        .into_iter()
        .filter(|r| r.rate < threshold)
        .collect()
}

/// Rows within `[start, end]` (either bound optional), then by section.
///
/// Rows whose date does not parse are dropped.
pub fn by_date_range(
    snapshot: &LedgerSnapshot,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    section: Option<&str>,
) -> LedgerSnapshot {
    snapshot.filter(|row| {
        let Some(date) = row.parsed_date() else {
            return false;
        };
        start.map_or(true, |s| date >= s)
            && end.map_or(true, |e| date <= e)
            && matches_section(snapshot, row, section)
    })
}

/// Rows for one section; `None` or [`ALL_SECTIONS`] keeps every row.
pub fn by_section(snapshot: &LedgerSnapshot, section: Option<&str>) -> LedgerSnapshot {
    snapshot.filter(|row| matches_section(snapshot, row, section))
}

/// Present/absent totals for each of the `days` days ending at `today`.
///
/// Every day in the window has an entry, zeroed when nothing was recorded.
/// `total` is the number of marks counted that day across all its rows.
pub fn daily_counts(
    snapshot: &LedgerSnapshot,
    days: u32,
    section: Option<&str>,
    today: NaiveDate,
) -> BTreeMap<NaiveDate, DailyCount> {
    let mut counts = BTreeMap::new();
    let Some(start) = days
        .checked_sub(1)
        .and_then(|back| today.checked_sub_days(Days::new(back.into())))
    else {
        return counts;
    };

    for day in start.iter_days().take(days as usize) {
        counts.insert(day, DailyCount::default());
    }

    let students = snapshot.students();
    for row in by_date_range(snapshot, Some(start), Some(today), section).rows() {
        let Some(date) = row.parsed_date() else {
            continue;
        };
        if let Some(count) = counts.get_mut(&date) {
            let present = row.present_count(students);
            let absent = row.absent_count(students);
            count.present += present;
            count.absent += absent;
            count.total += present + absent;
        }
    }
    counts
}

/// Present and total marks per section across all rows.
///
/// Empty when the ledger has no Section column.
pub fn section_comparison(snapshot: &LedgerSnapshot) -> BTreeMap<String, SectionTally> {
    let mut tallies: BTreeMap<String, SectionTally> = BTreeMap::new();
    if !snapshot.has_section_column() {
        return tallies;
    }

    let students = snapshot.students();
    for row in snapshot.rows() {
        let tally = tallies.entry(row.section.clone()).or_default();
        tally.present += row.present_count(students);
        tally.total += students.len();
    }
    tallies
}

/// Present counts per section for `today`, or for the latest recorded date
/// when today has no rows.
pub fn latest_by_section(snapshot: &LedgerSnapshot, today: NaiveDate) -> DayAttendance {
    let most_recent = snapshot.rows().iter().filter_map(AttendanceRow::parsed_date).max();
    let date = match most_recent {
        Some(latest) if latest != today => {
            let has_today = snapshot.rows().iter().any(|r| r.parsed_date() == Some(today));
            if has_today {
                today
            } else {
                latest
            }
        }
        _ => today,
    };

    let students = snapshot.students();
    let mut sections = BTreeMap::new();
    for row in snapshot.rows().iter().filter(|r| r.parsed_date() == Some(date)) {
        *sections.entry(row.section.clone()).or_insert(0) += row.present_count(students);
    }
    DayAttendance { date, sections }
}

/// Present counts per (date, section), newest date first, at most `limit` entries.
pub fn recent_activity(snapshot: &LedgerSnapshot, limit: usize) -> Vec<Activity> {
    let students = snapshot.students();
    let mut activities: Vec<Activity> = Vec::new();
    let mut index: HashMap<(&str, &str), usize> = HashMap::new();

    for row in snapshot.rows() {
        if row.date.is_empty() {
            continue;
        }
        let present = row.present_count(students);
        match index.get(&(row.date.as_str(), row.section.as_str())) {
            Some(&i) => activities[i].present += present,
            None => {
                index.insert((row.date.as_str(), row.section.as_str()), activities.len());
                activities.push(Activity {
                    date: row.date.clone(),
                    section: row.section.clone(),
                    present,
                });
            }
        }
    }

    // Stable: same-date entries keep ledger order.
    activities.sort_by(|a, b| b.date.cmp(&a.date));
    activities.truncate(limit);
    activities
}

/// Every row's mark for one student, in ledger order. Empty for an unknown student.
pub fn student_history(snapshot: &LedgerSnapshot, identity: &str) -> Vec<HistoryEntry> {
    if !snapshot.contains_student(identity) {
        return Vec::new();
    }
    snapshot
        .rows()
        .iter()
        .map(|row| HistoryEntry {
            date: row.date.clone(),
            section: row.section.clone(),
            mark: row.mark(identity),
        })
        .collect()
}
