//! Append-only result log shared by concurrent worker runs.
//!
//! Every run appends one self-contained text block (a header line,
//! one `gen` line per generation, the best decoded count model, and a
//! terminator) under an exclusive advisory file lock. The lock is the
//! only coordination between writers: blocks from different processes may
//! land in any order, but a block is always written whole. Floats are
//! printed with Rust's shortest round-trip formatting so a re-parse
//! reproduces them exactly.

use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use fs2::FileExt;

use crate::error::{Error, Result};
use crate::genetic::GenerationStats;

/// One parsed run block from the log.
#[derive(Debug, Clone, PartialEq)]
pub struct RunRecord {
    pub label: String,
    pub stats: Vec<GenerationStats>,
    pub model: Vec<u64>,
}

/// Writer half of the result log.
#[derive(Debug, Clone)]
pub struct ResultSink {
    path: PathBuf,
    max_attempts: u32,
    base_delay: Duration,
}

impl ResultSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            max_attempts: 20,
            base_delay: Duration::from_millis(250),
        }
    }

    /// Override the lock retry budget (attempts and initial delay; the
    /// delay doubles per attempt, capped at five seconds).
    pub fn with_retry(mut self, max_attempts: u32, base_delay: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.base_delay = base_delay;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one run block under an exclusive lock. Never truncates.
    pub fn append_run(
        &self,
        label: &str,
        history: &[GenerationStats],
        model: &[u64],
    ) -> Result<()> {
        let mut block = String::new();
        // Whitespace would break the line-oriented parser.
        let label: String = label
            .chars()
            .map(|c| if c.is_whitespace() { '-' } else { c })
            .collect();
        block.push_str(&format!("run {label}\n"));
        for s in history {
            block.push_str(&format!(
                "gen {} min {} max {} mean {} std {} elapsed {}\n",
                s.generation, s.min, s.max, s.mean, s.std, s.elapsed_secs
            ));
        }
        block.push_str("model");
        for count in model {
            block.push_str(&format!(" {count}"));
        }
        block.push_str("\nend\n");

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        let mut delay = self.base_delay;
        let mut locked = false;
        for attempt in 0..self.max_attempts {
            match file.try_lock_exclusive() {
                Ok(()) => {
                    locked = true;
                    break;
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    log::debug!(
                        "result log {} is locked (attempt {}/{}), retrying in {:?}",
                        self.path.display(),
                        attempt + 1,
                        self.max_attempts,
                        delay
                    );
                    std::thread::sleep(delay);
                    delay = (delay * 2).min(Duration::from_secs(5));
                }
                Err(e) => return Err(e.into()),
            }
        }
        if !locked {
            log::error!(
                "giving up on result log {} after {} lock attempts",
                self.path.display(),
                self.max_attempts
            );
            return Err(Error::LockTimeout {
                path: self.path.clone(),
                attempts: self.max_attempts,
            });
        }

        let mut write_result = file.write_all(block.as_bytes());
        if write_result.is_ok() {
            write_result = file.flush();
        }
        let unlock_result = file.unlock();
        write_result?;
        unlock_result?;
        Ok(())
    }
}

/// Re-parse every run block in a result log.
pub fn read_log(path: impl AsRef<Path>) -> Result<Vec<RunRecord>> {
    let file = std::fs::File::open(path.as_ref())?;
    let reader = BufReader::new(file);

    let mut records = Vec::new();
    let mut current: Option<RunRecord> = None;

    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        let line_no = i as u64 + 1;
        let mut tokens = line.split_whitespace();
        let keyword = match tokens.next() {
            Some(k) => k,
            None => continue,
        };

        match keyword {
            "run" => {
                if current.is_some() {
                    return Err(corrupt(line_no, "run block opened inside another block"));
                }
                current = Some(RunRecord {
                    label: tokens.collect::<Vec<_>>().join(" "),
                    stats: Vec::new(),
                    model: Vec::new(),
                });
            }
            "gen" => {
                let record = current
                    .as_mut()
                    .ok_or_else(|| corrupt(line_no, "gen line outside a run block"))?;
                record.stats.push(parse_gen_line(&line, line_no)?);
            }
            "model" => {
                let record = current
                    .as_mut()
                    .ok_or_else(|| corrupt(line_no, "model line outside a run block"))?;
                for token in tokens {
                    record.model.push(token.parse().map_err(|_| {
                        corrupt(line_no, &format!("non-integer model count {token:?}"))
                    })?);
                }
            }
            "end" => {
                let record = current
                    .take()
                    .ok_or_else(|| corrupt(line_no, "end without an open run block"))?;
                records.push(record);
            }
            other => return Err(corrupt(line_no, &format!("unknown keyword {other:?}"))),
        }
    }

    if current.is_some() {
        return Err(Error::Parse {
            line: 0,
            reason: "log ends with an unterminated run block".into(),
        });
    }
    Ok(records)
}

fn corrupt(line: u64, reason: &str) -> Error {
    Error::Parse {
        line,
        reason: reason.to_string(),
    }
}

fn parse_gen_line(line: &str, line_no: u64) -> Result<GenerationStats> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let expected = [
        "gen", "", "min", "", "max", "", "mean", "", "std", "", "elapsed", "",
    ];
    if tokens.len() != expected.len() {
        return Err(corrupt(line_no, "gen line has the wrong field count"));
    }
    for (i, keyword) in expected.iter().enumerate() {
        if !keyword.is_empty() && tokens[i] != *keyword {
            return Err(corrupt(
                line_no,
                &format!("expected keyword {keyword:?}, found {:?}", tokens[i]),
            ));
        }
    }

    fn num<T: std::str::FromStr>(token: &str, line_no: u64) -> Result<T> {
        token.parse().map_err(|_| Error::Parse {
            line: line_no,
            reason: format!("non-numeric field {token:?}"),
        })
    }

    Ok(GenerationStats {
        generation: num(tokens[1], line_no)?,
        min: num(tokens[3], line_no)?,
        max: num(tokens[5], line_no)?,
        mean: num(tokens[7], line_no)?,
        std: num(tokens[9], line_no)?,
        elapsed_secs: num(tokens[11], line_no)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn stats(generation: usize) -> GenerationStats {
        GenerationStats {
            generation,
            min: -151.695104,
            max: -120.25 + generation as f64,
            mean: -130.5,
            std: 4.257_812_5,
            elapsed_secs: 0.125 * (generation + 1) as f64,
        }
    }

    #[test]
    fn round_trips_a_block_exactly() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("results.log");
        let sink = ResultSink::new(&path);

        let history = vec![stats(0), stats(1), stats(2)];
        let model = vec![3, 0, 0, 1];
        sink.append_run("cx0-mu12-se23", &history, &model).unwrap();

        let records = read_log(&path).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].label, "cx0-mu12-se23");
        assert_eq!(records[0].stats, history);
        assert_eq!(records[0].model, model);
    }

    #[test]
    fn appends_never_truncate() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("results.log");
        let sink = ResultSink::new(&path);

        sink.append_run("first", &[stats(0)], &[1]).unwrap();
        sink.append_run("second", &[stats(0), stats(1)], &[2]).unwrap();

        let records = read_log(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].label, "first");
        assert_eq!(records[1].label, "second");
        assert_eq!(records[1].stats.len(), 2);
    }

    #[test]
    fn whitespace_in_labels_is_sanitized() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("results.log");
        let sink = ResultSink::new(&path);
        sink.append_run("year 2005 run", &[stats(0)], &[0]).unwrap();
        let records = read_log(&path).unwrap();
        assert_eq!(records[0].label, "year-2005-run");
    }

    #[test]
    fn lock_contention_times_out_with_a_bounded_retry() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("results.log");

        // Hold the lock from another handle for the duration of the call.
        let holder = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .unwrap();
        holder.lock_exclusive().unwrap();

        let sink =
            ResultSink::new(&path).with_retry(3, Duration::from_millis(10));
        let err = sink.append_run("blocked", &[stats(0)], &[0]).unwrap_err();
        assert!(matches!(err, Error::LockTimeout { attempts: 3, .. }));

        holder.unlock().unwrap();
    }

    #[test]
    fn detects_interleaved_blocks() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("results.log");
        std::fs::write(&path, "run a\nrun b\nend\n").unwrap();
        assert!(read_log(&path).is_err());

        std::fs::write(&path, "gen 0 min 1 max 2 mean 1.5 std 0 elapsed 0.1\n").unwrap();
        assert!(read_log(&path).is_err());
    }
}
