use std::cell::RefCell;
use std::time::{Duration, Instant};

/// Counters collected while a pipeline run is in progress
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessingStats {
    pub files_matched: usize,
    pub lines_read: usize,
    pub records_parsed: usize,
    pub malformed_lines: usize,
    pub records_normalized: usize,
    pub records_written: usize,
    pub records_skipped: usize,
    pub batches_flushed: usize,
    pub files_written: usize,
    pub rows_joined: usize,
    pub rows_unmatched: usize,
    pub rows_loaded: usize,
    pub processing_time: Duration,
}

// The pipeline is single-threaded, so one accumulator per thread is enough
thread_local! {
    static THREAD_STATS: RefCell<ProcessingStats> = RefCell::new(ProcessingStats::default());
    static START_TIME: RefCell<Option<Instant>> = const { RefCell::new(None) };
}

fn with_stats(f: impl FnOnce(&mut ProcessingStats)) {
    THREAD_STATS.with(|stats| f(&mut stats.borrow_mut()));
}

pub fn stats_reset() {
    with_stats(|stats| *stats = ProcessingStats::default());
    START_TIME.with(|start| *start.borrow_mut() = Some(Instant::now()));
}

pub fn stats_add_file_matched() {
    with_stats(|stats| stats.files_matched += 1);
}

pub fn stats_add_line_read() {
    with_stats(|stats| stats.lines_read += 1);
}

pub fn stats_add_record_parsed() {
    with_stats(|stats| stats.records_parsed += 1);
}

pub fn stats_add_malformed_line() {
    with_stats(|stats| stats.malformed_lines += 1);
}

pub fn stats_add_record_normalized() {
    with_stats(|stats| stats.records_normalized += 1);
}

pub fn stats_add_records_written(count: usize) {
    with_stats(|stats| stats.records_written += count);
}

pub fn stats_add_record_skipped() {
    with_stats(|stats| stats.records_skipped += 1);
}

pub fn stats_add_batch_flushed(files: usize) {
    with_stats(|stats| {
        stats.batches_flushed += 1;
        stats.files_written += files;
    });
}

pub fn stats_add_join(joined: usize, unmatched: usize) {
    with_stats(|stats| {
        stats.rows_joined += joined;
        stats.rows_unmatched += unmatched;
    });
}

pub fn stats_add_rows_loaded(count: usize) {
    with_stats(|stats| stats.rows_loaded += count);
}

pub fn stats_finish_processing() {
    let elapsed = START_TIME.with(|start| start.borrow().map(|s| s.elapsed()));
    if let Some(elapsed) = elapsed {
        with_stats(|stats| stats.processing_time = elapsed);
    }
}

pub fn get_thread_stats() -> ProcessingStats {
    THREAD_STATS.with(|stats| stats.borrow().clone())
}

impl ProcessingStats {
    /// Every input line ends up either parsed or in the error sink
    pub fn lines_accounted_for(&self) -> bool {
        self.records_parsed + self.malformed_lines == self.lines_read
    }

    pub fn format_stats(&self) -> String {
        let mut output = format!(
            "Lines processed: {} total, {} parsed, {} malformed",
            self.lines_read, self.records_parsed, self.malformed_lines
        );

        if self.files_matched > 0 {
            output.push_str(&format!(", {} files", self.files_matched));
        }

        output.push_str(&format!(
            "; Records written: {} in {} batches ({} files)",
            self.records_written, self.batches_flushed, self.files_written
        ));

        if self.records_skipped > 0 {
            output.push_str(&format!(", {} skipped", self.records_skipped));
        }

        output.push_str(&format!(
            "; Rows joined: {}, {} unmatched; Rows loaded: {}",
            self.rows_joined, self.rows_unmatched, self.rows_loaded
        ));

        let processing_time_ms = self.processing_time.as_millis();
        output.push_str(&format!(" in {}ms", processing_time_ms));

        if processing_time_ms > 0 && self.lines_read > 0 {
            let lines_per_sec = (self.lines_read as f64 * 1000.0) / processing_time_ms as f64;
            output.push_str(&format!(" ({:.0} lines/s)", lines_per_sec));
        }

        output
    }
}
