//! Append-only CSV flight log.
//!
//! One file per flight, no header, columns
//! `time_ms,pressure_hpa,altitude_m,<reserved>,abs_altitude_m`.
//! Row 0 carries the calibration baseline instead of a live sample: its last
//! column holds the baseline temperature.

use crate::error::FlightError;
use crate::estimator::altitude_from_baseline;
use crate::types::{AltitudeSample, CalibrationBaseline};
use std::fs::File;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// An open flight log. Every line must be durable once `append_line` returns.
pub trait FlightLog {
    fn append_line(&mut self, line: &str) -> Result<(), FlightError>;
    fn close(&mut self) -> Result<(), FlightError>;
}

/// Creates a fresh log for each session, discarding the previous one.
pub trait FlightLogStore {
    type Log: FlightLog;

    fn create(&mut self) -> Result<Self::Log, FlightError>;
}

pub struct CsvLogStore {
    path: PathBuf,
}

impl CsvLogStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FlightLogStore for CsvLogStore {
    type Log = CsvFlightLog;

    fn create(&mut self) -> Result<CsvFlightLog, FlightError> {
        let file = File::create(&self.path).map_err(|e| FlightError::log_io("create", e))?;
        info!("Flight log opened at {}", self.path.display());
        Ok(CsvFlightLog { file: Some(file) })
    }
}

pub struct CsvFlightLog {
    file: Option<File>,
}

impl FlightLog for CsvFlightLog {
    fn append_line(&mut self, line: &str) -> Result<(), FlightError> {
        let file = self.file.as_mut().ok_or_else(|| {
            FlightError::log_io(
                "append",
                std::io::Error::new(std::io::ErrorKind::NotConnected, "log already closed"),
            )
        })?;
        file.write_all(line.as_bytes())
            .and_then(|_| file.write_all(b"\n"))
            .and_then(|_| file.sync_data())
            .map_err(|e| FlightError::log_io("append", e))
    }

    fn close(&mut self) -> Result<(), FlightError> {
        match self.file.take() {
            Some(file) => file.sync_all().map_err(|e| FlightError::log_io("close", e)),
            None => Ok(()),
        }
    }
}

/// Keeps the latest session's lines in memory. Clones share the same buffer.
#[derive(Clone, Default)]
pub struct MemoryLogStore {
    lines: Arc<Mutex<Vec<String>>>,
}

impl MemoryLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl FlightLogStore for MemoryLogStore {
    type Log = MemoryLogStore;

    fn create(&mut self) -> Result<MemoryLogStore, FlightError> {
        self.lines.lock().unwrap_or_else(|e| e.into_inner()).clear();
        Ok(self.clone())
    }
}

impl FlightLog for MemoryLogStore {
    fn append_line(&mut self, line: &str) -> Result<(), FlightError> {
        self.lines
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(line.to_string());
        Ok(())
    }

    fn close(&mut self) -> Result<(), FlightError> {
        Ok(())
    }
}

pub fn calibration_row(baseline: &CalibrationBaseline) -> String {
    format!("0,{:.2},0.00,,{:.2}", baseline.pressure_hpa, baseline.temperature_c)
}

pub fn sample_row(sample: &AltitudeSample, abs_altitude_m: f32) -> String {
    format!(
        "{},{:.2},{:.2},,{:.2}",
        sample.time_ms, sample.pressure_hpa, sample.altitude_m, abs_altitude_m
    )
}

/// Session-side view of a flight log. Best effort: a log that failed to open
/// turns every later write into a no-op instead of an error storm.
pub struct Recorder<L: FlightLog> {
    log: Option<L>,
    rows: usize,
    last_time_ms: Option<u64>,
}

impl<L: FlightLog> Recorder<L> {
    pub fn open<S>(store: &mut S) -> Result<Self, FlightError>
    where
        S: FlightLogStore<Log = L>,
    {
        let log = store.create()?;
        Ok(Self {
            log: Some(log),
            rows: 0,
            last_time_ms: None,
        })
    }

    /// A recorder with nothing behind it, used when opening the log failed.
    pub fn disabled() -> Self {
        Self {
            log: None,
            rows: 0,
            last_time_ms: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.log.is_some()
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Row 0. Must be the first row written.
    pub fn write_calibration(&mut self, baseline: &CalibrationBaseline) -> Result<(), FlightError> {
        if self.log.is_none() {
            return Ok(());
        }
        if self.rows != 0 {
            return Err(FlightError::LogFormat {
                line: self.rows,
                reason: "calibration row must come first".into(),
            });
        }
        self.write(0, &calibration_row(baseline))
    }

    pub fn append(&mut self, sample: &AltitudeSample, abs_altitude_m: f32) -> Result<(), FlightError> {
        if self.log.is_none() {
            return Ok(());
        }
        if self.rows == 0 {
            return Err(FlightError::LogFormat {
                line: 0,
                reason: "sample written before calibration row".into(),
            });
        }
        if let Some(last) = self.last_time_ms {
            if sample.time_ms <= last {
                return Err(FlightError::LogFormat {
                    line: self.rows,
                    reason: format!("time {} ms does not advance past {} ms", sample.time_ms, last),
                });
            }
        }
        self.write(sample.time_ms, &sample_row(sample, abs_altitude_m))
    }

    pub fn close(&mut self) -> Result<(), FlightError> {
        match self.log.take() {
            Some(mut log) => {
                debug!("Closing flight log after {} rows", self.rows);
                log.close()
            }
            None => Ok(()),
        }
    }

    fn write(&mut self, time_ms: u64, line: &str) -> Result<(), FlightError> {
        let Some(log) = self.log.as_mut() else {
            return Ok(());
        };
        log.append_line(line)?;
        self.rows += 1;
        self.last_time_ms = Some(time_ms);
        Ok(())
    }
}

/// One parsed data row of a replayed log.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReplayedRow {
    pub time_ms: u64,
    pub pressure_hpa: f32,
    pub altitude_m: f32,
    pub abs_altitude_m: Option<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReplayedFlight {
    /// Rebuilt from row 0. The absolute altitude is not persisted and reads as 0.
    pub baseline: CalibrationBaseline,
    pub rows: Vec<ReplayedRow>,
}

impl ReplayedFlight {
    /// Altitudes recomputed from each row's pressure against the replayed baseline.
    pub fn rederived_altitudes(&self) -> Result<Vec<f32>, FlightError> {
        self.rows
            .iter()
            .map(|row| altitude_from_baseline(row.pressure_hpa, &self.baseline).map_err(FlightError::from))
            .collect()
    }
}

/// Parses a flight log written by [`Recorder`].
pub fn replay<R: BufRead>(reader: R) -> Result<ReplayedFlight, FlightError> {
    let mut baseline = None;
    let mut rows = Vec::new();

    for (index, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| FlightError::log_io("read", e))?;
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        if fields.len() != 5 {
            return Err(FlightError::LogFormat {
                line: index,
                reason: format!("expected 5 columns, found {}", fields.len()),
            });
        }

        let time_ms = parse_field::<u64>(fields[0], index, "time")?;
        let pressure_hpa = parse_field::<f32>(fields[1], index, "pressure")?;
        let altitude_m = parse_field::<f32>(fields[2], index, "altitude")?;

        match baseline {
            None => {
                if time_ms != 0 || altitude_m != 0.0 {
                    return Err(FlightError::LogFormat {
                        line: index,
                        reason: "first row is not a calibration row".into(),
                    });
                }
                let temperature_c = parse_field::<f32>(fields[4], index, "temperature")?;
                baseline = Some(CalibrationBaseline {
                    temperature_c,
                    pressure_hpa,
                    absolute_altitude_m: 0.0,
                });
            }
            Some(_) => {
                let abs_altitude_m = if fields[4].is_empty() {
                    None
                } else {
                    Some(parse_field::<f32>(fields[4], index, "absolute altitude")?)
                };
                rows.push(ReplayedRow {
                    time_ms,
                    pressure_hpa,
                    altitude_m,
                    abs_altitude_m,
                });
            }
        }
    }

    let baseline = baseline.ok_or_else(|| FlightError::LogFormat {
        line: 0,
        reason: "log is empty".into(),
    })?;
    Ok(ReplayedFlight { baseline, rows })
}

fn parse_field<T: std::str::FromStr>(field: &str, line: usize, name: &str) -> Result<T, FlightError> {
    field.parse::<T>().map_err(|_| FlightError::LogFormat {
        line,
        reason: format!("invalid {} {:?}", name, field),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimator::{pressure_at_altitude, relative_altitude};
    use std::io::{BufReader, Cursor};

    fn baseline() -> CalibrationBaseline {
        CalibrationBaseline {
            temperature_c: 21.5,
            pressure_hpa: 1009.87,
            absolute_altitude_m: 29.0,
        }
    }

    fn sample(time_ms: u64, altitude_m: f32) -> Result<AltitudeSample, FlightError> {
        let b = baseline();
        let pressure_hpa = pressure_at_altitude(altitude_m, b.pressure_hpa, b.temperature_c);
        Ok(AltitudeSample {
            time_ms,
            pressure_hpa,
            altitude_m: relative_altitude(pressure_hpa, b.pressure_hpa, b.temperature_c)?,
        })
    }

    #[test]
    fn test_row_layout() -> Result<(), FlightError> {
        assert_eq!(calibration_row(&baseline()), "0,1009.87,0.00,,21.50");
        let row = sample_row(
            &AltitudeSample {
                time_ms: 40,
                pressure_hpa: 1001.5,
                altitude_m: 70.126,
            },
            99.3,
        );
        assert_eq!(row, "40,1001.50,70.13,,99.30");
        Ok(())
    }

    #[test]
    fn test_calibration_row_first() -> Result<(), FlightError> {
        let mut store = MemoryLogStore::new();
        let mut recorder = Recorder::open(&mut store)?;
        assert!(recorder.append(&sample(20, 3.0)?, 0.0).is_err());

        recorder.write_calibration(&baseline())?;
        recorder.append(&sample(20, 3.0)?, 0.0)?;
        assert!(recorder.write_calibration(&baseline()).is_err());
        assert_eq!(store.lines().len(), 2);
        Ok(())
    }

    #[test]
    fn test_time_must_advance() -> Result<(), FlightError> {
        let mut store = MemoryLogStore::new();
        let mut recorder = Recorder::open(&mut store)?;
        recorder.write_calibration(&baseline())?;
        recorder.append(&sample(40, 3.0)?, 0.0)?;
        assert!(recorder.append(&sample(40, 4.0)?, 0.0).is_err());
        assert!(recorder.append(&sample(20, 4.0)?, 0.0).is_err());
        assert_eq!(recorder.rows(), 2);
        Ok(())
    }

    #[test]
    fn test_new_log_truncates_previous() -> Result<(), FlightError> {
        let mut store = MemoryLogStore::new();
        let mut first = Recorder::open(&mut store)?;
        first.write_calibration(&baseline())?;
        first.append(&sample(20, 3.0)?, 0.0)?;
        first.close()?;

        let mut second = Recorder::open(&mut store)?;
        second.write_calibration(&baseline())?;
        assert_eq!(store.lines(), vec![calibration_row(&baseline())]);
        Ok(())
    }

    #[test]
    fn test_disabled_recorder_is_silent() -> Result<(), FlightError> {
        let mut recorder: Recorder<MemoryLogStore> = Recorder::disabled();
        recorder.write_calibration(&baseline())?;
        for time_ms in [20, 40, 60] {
            recorder.append(&sample(time_ms, 3.0)?, 0.0)?;
        }
        // Out of order is not checked either; nothing is being written.
        recorder.append(&sample(20, 3.0)?, 0.0)?;
        assert!(!recorder.is_open());
        assert_eq!(recorder.rows(), 0);
        recorder.close()?;
        Ok(())
    }

    #[test]
    fn test_csv_file_replays_baseline() -> anyhow::Result<()> {
        let path = std::env::temp_dir().join(format!("apogee-core-{}.csv", std::process::id()));
        let mut store = CsvLogStore::new(&path);
        let mut recorder = Recorder::open(&mut store)?;
        recorder.write_calibration(&baseline())?;
        for (i, altitude) in [6.0, 35.5, 80.25, 120.0, 117.0].iter().enumerate() {
            recorder.append(&sample((i as u64 + 1) * 20, *altitude)?, 0.0)?;
        }
        recorder.close()?;

        let flight = replay(BufReader::new(File::open(&path)?))?;
        std::fs::remove_file(&path).ok();

        assert_eq!(flight.baseline.pressure_hpa, 1009.87);
        assert_eq!(flight.baseline.temperature_c, 21.5);
        assert_eq!(flight.rows.len(), 5);

        let rederived = flight.rederived_altitudes()?;
        for (row, altitude) in flight.rows.iter().zip(rederived) {
            assert!(
                (row.altitude_m - altitude).abs() < 0.1,
                "row {} recorded {} but pressure gives {}",
                row.time_ms,
                row.altitude_m,
                altitude
            );
        }
        Ok(())
    }

    #[test]
    fn test_replay_rejects_missing_calibration() {
        let log = "20,1000.00,50.00,,0.00\n";
        assert!(matches!(
            replay(Cursor::new(log)),
            Err(FlightError::LogFormat { line: 0, .. })
        ));
        assert!(replay(Cursor::new("")).is_err());
        assert!(replay(Cursor::new("0,1013.25,0.00,,20.00\n20,abc,1.0,,0.0\n")).is_err());
    }
}
