//! `rollcall` — face-recognition attendance from the command line.
//!
//! # Usage
//!
//! ```text
//! rollcall enroll --name "Ada Lovelace" --id 100 photos/ada-*.jpg
//! rollcall mark --section "BSCS 5A" class.jpg
//! rollcall report --from 2024-01-01 --to 2024-01-31 --section "BSCS 5A"
//! rollcall low --threshold 80
//! ```
//!
//! Configuration comes from `ROLLCALL_*` environment variables and the
//! optional TOML file named by `ROLLCALL_CONFIG`.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use rollcall_core::FaceStatus;
use rollcall_engine::{Config, Engine, EngineError};
use rollcall_store::{query, EnrollmentStore, Ledger, LedgerError, LedgerSnapshot};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

const EXIT_STORAGE_BUSY: u8 = 2;

#[derive(Parser)]
#[command(name = "rollcall", about = "Face-recognition attendance")]
struct Cli {
    /// Print results as JSON.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll a student from a set of face photos
    Enroll {
        #[arg(long)]
        name: String,
        /// Student ID (e.g. SAP ID)
        #[arg(long)]
        id: String,
        /// Photos of the student, one face each
        #[arg(required = true)]
        images: Vec<PathBuf>,
    },
    /// Recognize faces in a class photo and record attendance
    Mark {
        #[arg(long)]
        section: String,
        /// Attendance date, YYYY-MM-DD (default: today)
        #[arg(long)]
        date: Option<NaiveDate>,
        image: PathBuf,
    },
    /// List students in the ledger
    Students {
        /// Case-insensitive name filter
        #[arg(long)]
        search: Option<String>,
    },
    /// Attendance rows, optionally filtered by date range and section
    Report {
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long)]
        to: Option<NaiveDate>,
        /// Section name, or "All"
        #[arg(long)]
        section: Option<String>,
    },
    /// Attendance rate per student
    Rates,
    /// Students below an attendance threshold
    Low {
        /// Percentage (default: configured low-attendance threshold)
        #[arg(long)]
        threshold: Option<f64>,
    },
    /// Present/absent counts for each recent day
    Daily {
        #[arg(long, default_value_t = 7)]
        days: u32,
        #[arg(long)]
        section: Option<String>,
    },
    /// Attendance totals per section
    Sections,
    /// Latest marking sessions
    Recent {
        #[arg(long, default_value_t = 5)]
        limit: usize,
    },
    /// Show configuration and store status
    Status,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) if is_storage_busy(&err) => {
            eprintln!("error: {err}");
            eprintln!("The attendance file is open in another program. Close it there and try again.");
            ExitCode::from(EXIT_STORAGE_BUSY)
        }
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn is_storage_busy(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause.downcast_ref::<EngineError>().is_some_and(EngineError::is_storage_busy)
            || cause.downcast_ref::<LedgerError>().is_some_and(LedgerError::is_busy)
    })
}

fn run(cli: Cli) -> Result<()> {
    let config = Config::from_env().context("loading configuration")?;
    tracing::debug!(?config, "configuration loaded");
    let json = cli.json;
    let today = Local::now().date_naive();

    match cli.command {
        Commands::Enroll { name, id, images } => {
            let engine = Engine::from_config(config)?;
            let report = engine.enroll(&name, &id, &images)?;
            emit(json, &report, |r| {
                println!("Enrolled {} from {} images", r.identity, r.images);
                println!("Photos saved to {}", r.dataset_dir.display());
                if !r.ledger_updated {
                    println!("Note: ledger column will be added when attendance is next recorded");
                }
            })
        }
        Commands::Mark { section, date, image } => {
            let engine = Engine::from_config(config)?;
            let report = engine.mark_attendance(&image, &section, date.unwrap_or(today))?;
            emit(json, &report, |r| {
                println!("{} faces detected, {} recognized", r.face_count, r.present.len());
                for face in &r.faces {
                    let line = match &face.status {
                        FaceStatus::Recognized { identity, distance } => format!("{identity} (distance {distance:.3})"),
                        FaceStatus::Unknown { distance } => format!("Unknown (closest {distance:.3})"),
                        FaceStatus::Skipped => "skipped (empty region)".to_string(),
                        FaceStatus::Failed { reason } => format!("failed: {reason}"),
                    };
                    println!("  face {}: {line}", face.index);
                }
                println!("Recorded {} / {}", r.row.date, r.row.section);
            })
        }
        Commands::Students { search } => {
            let snapshot = read_ledger(&config)?;
            let students = match search {
                Some(q) => query::search_students(&snapshot, &q),
                None => query::students(&snapshot),
            };
            emit(json, &students, |s| {
                for name in s {
                    println!("{name}");
                }
            })
        }
        Commands::Report { from, to, section } => {
            let snapshot = read_ledger(&config)?;
            let filtered = query::by_date_range(&snapshot, from, to, section.as_deref());
            let table = Table {
                header: filtered.header(),
                rows: filtered.table(),
            };
            emit(json, &table, |t| {
                if t.header.is_empty() {
                    println!("No attendance recorded");
                    return;
                }
                println!("{}", t.header.join("\t"));
                for row in &t.rows {
                    println!("{}", row.join("\t"));
                }
            })
        }
        Commands::Rates => {
            let snapshot = read_ledger(&config)?;
            emit(json, &query::all_rates(&snapshot), |rates| {
                for r in rates {
                    println!("{:6.1}%  {}", r.rate, r.identity);
                }
            })
        }
        Commands::Low { threshold } => {
            let snapshot = read_ledger(&config)?;
            let threshold = threshold.unwrap_or(config.low_attendance_threshold);
            emit(json, &query::low_rate(&snapshot, threshold), |rates| {
                if rates.is_empty() {
                    println!("No students below {threshold:.1}%");
                }
                for r in rates {
                    println!("{:6.1}%  {}", r.rate, r.identity);
                }
            })
        }
        Commands::Daily { days, section } => {
            let snapshot = read_ledger(&config)?;
            let counts = query::daily_counts(&snapshot, days, section.as_deref(), today);
            emit(json, &counts, |counts| {
                for (day, c) in counts {
                    println!("{day}  present {:4}  absent {:4}  total {:4}", c.present, c.absent, c.total);
                }
            })
        }
        Commands::Sections => {
            let snapshot = read_ledger(&config)?;
            emit(json, &query::section_comparison(&snapshot), |tallies| {
                for (section, t) in tallies {
                    println!("{section}: {}/{} ({:.1}%)", t.present, t.total, t.rate());
                }
            })
        }
        Commands::Recent { limit } => {
            let snapshot = read_ledger(&config)?;
            emit(json, &query::recent_activity(&snapshot, limit), |activities| {
                for a in activities {
                    println!("{}  {}  {} present", a.date, a.section, a.present);
                }
            })
        }
        Commands::Status => {
            let snapshot = read_ledger(&config)?;
            let status = Status {
                enrolled: enrolled_count(&config)?,
                ledger_students: snapshot.students().len(),
                ledger_rows: snapshot.rows().len(),
                detector_model: config.detector_model_path(),
                detector_model_present: PathBuf::from(config.detector_model_path()).exists(),
                embedder_model: config.embedder_model_path(),
                embedder_model_present: PathBuf::from(config.embedder_model_path()).exists(),
                enrollment_db: config.enrollment_db.clone(),
                ledger_path: config.ledger_path.clone(),
                match_threshold: config.match_threshold,
                today: query::latest_by_section(&snapshot, today),
            };
            emit(json, &status, |s| {
                println!("enrolled students: {}", s.enrolled);
                println!("ledger:            {} ({} students, {} rows)", s.ledger_path.display(), s.ledger_students, s.ledger_rows);
                println!("enrollment db:     {}", s.enrollment_db.display());
                println!("detector model:    {} ({})", s.detector_model, present_label(s.detector_model_present));
                println!("embedder model:    {} ({})", s.embedder_model, present_label(s.embedder_model_present));
                println!("match threshold:   {}", s.match_threshold);
                for (section, present) in &s.today.sections {
                    println!("{}  {section}: {present} present", s.today.date);
                }
            })
        }
    }
}

fn read_ledger(config: &Config) -> Result<LedgerSnapshot> {
    Ledger::open(&config.ledger_path)
        .read_all()
        .with_context(|| format!("reading {}", config.ledger_path.display()))
}

/// Number of enrolled students. A missing database counts as none and is
/// not created.
fn enrolled_count(config: &Config) -> Result<usize> {
    if !config.enrollment_db.exists() {
        return Ok(0);
    }
    EnrollmentStore::open(&config.enrollment_db)
        .and_then(|store| store.len())
        .with_context(|| format!("reading {}", config.enrollment_db.display()))
}

/// Print `value` as JSON, or through `human` otherwise.
fn emit<T: Serialize>(json: bool, value: &T, human: impl FnOnce(&T)) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        human(value);
    }
    Ok(())
}

fn present_label(present: bool) -> &'static str {
    if present {
        "found"
    } else {
        "missing"
    }
}

#[derive(Serialize)]
struct Table {
    header: Vec<String>,
    rows: Vec<Vec<String>>,
}

#[derive(Serialize)]
struct Status {
    enrolled: usize,
    ledger_students: usize,
    ledger_rows: usize,
    detector_model: String,
    detector_model_present: bool,
    embedder_model: String,
    embedder_model_present: bool,
    enrollment_db: PathBuf,
    ledger_path: PathBuf,
    match_threshold: f32,
    today: query::DayAttendance,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    fn busy() -> LedgerError {
        LedgerError::StorageBusy {
            path: "attendance.csv".into(),
            source: io::Error::from(io::ErrorKind::PermissionDenied),
        }
    }

    #[test]
    fn test_storage_busy_through_context() {
        let err = anyhow::Error::from(EngineError::Ledger(busy())).context("marking attendance");
        assert!(is_storage_busy(&err));

        let err = anyhow::Error::from(busy()).context("reading attendance.csv");
        assert!(is_storage_busy(&err));
    }

    #[test]
    fn test_other_errors_are_not_storage_busy() {
        let err = anyhow::Error::from(EngineError::NoStudentsEnrolled).context("marking attendance");
        assert!(!is_storage_busy(&err));

        let io_err = LedgerError::Io {
            path: "attendance.csv".into(),
            source: io::Error::from(io::ErrorKind::NotFound),
        };
        assert!(!is_storage_busy(&anyhow::Error::from(EngineError::Ledger(io_err))));
    }

    #[test]
    fn test_enrolled_count_does_not_create_database() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::in_dir(dir.path());
        assert_eq!(enrolled_count(&config).unwrap(), 0);
        assert!(!config.enrollment_db.exists());

        EnrollmentStore::open(&config.enrollment_db).unwrap();
        assert_eq!(enrolled_count(&config).unwrap(), 0);
    }
}
