//! Filesystem battery
//!
//! Checks 2 and 3 verify the text written by check 1, 5 reads what 4 wrote,
//! and 8 and 9 rename and delete those same files. Every other check stands
//! on its own.

extern crate alloc;
use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;

use log::{info, warn};

use super::{CheckFailure, CheckOutcome, Finding, run_battery};
use crate::config::HarnessConfig;
use crate::storage::{EntryInfo, FileStore, FlashVolume, OpenMode, StorageResult};

struct FileBattery<'a, V: FlashVolume> {
    fs: &'a mut FileStore<V>,
    config: &'a HarnessConfig,
    uptime_ms: u64,
    /// Lines the text file should hold after the latest write or append
    expected_lines: Vec<String>,
}

impl<V: FlashVolume> FileBattery<'_, V> {
    fn write_text(&mut self) -> StorageResult<Finding> {
        let mut lines = self.config.header_lines.clone();
        lines.push(format!(
            "Line {}: Uptime = {} ms",
            self.config.header_lines.len().saturating_sub(1),
            self.uptime_ms
        ));

        let mut file = self.fs.open(&self.config.text_path, OpenMode::WriteTruncate)?;
        for line in &lines {
            file.write_line(line)?;
        }
        file.close()?;

        // Each line is followed by its newline
        let expected: usize = lines.iter().map(|l| l.len() + 1).sum();
        let stored = self.fs.open(&self.config.text_path, OpenMode::Read)?.size();

        let count = lines.len();
        self.expected_lines = lines;
        Ok(Finding::pass_if(
            stored == expected,
            CheckFailure::Mismatch,
            format!(
                "Wrote {} lines ({} of {} bytes stored) to {}",
                count, stored, expected, self.config.text_path
            ),
        ))
    }

    fn read_text(&mut self) -> StorageResult<Finding> {
        let lines = read_text_file(self.fs, &self.config.text_path)?;
        Ok(Finding::pass_if(
            lines == self.expected_lines,
            CheckFailure::Mismatch,
            format!(
                "Read {} lines, expected {}",
                lines.len(),
                self.expected_lines.len()
            ),
        ))
    }

    fn append_text(&mut self) -> StorageResult<Finding> {
        let mut file = self.fs.open(&self.config.text_path, OpenMode::Append)?;
        for line in &self.config.appended_lines {
            file.write_line(line)?;
        }
        file.close()?;
        info!("  ✓ Data appended successfully");

        self.expected_lines
            .extend(self.config.appended_lines.iter().cloned());

        let lines = read_text_file(self.fs, &self.config.text_path)?;
        Ok(Finding::pass_if(
            lines == self.expected_lines,
            CheckFailure::Mismatch,
            format!(
                "File holds {} lines, expected original + appended = {}",
                lines.len(),
                self.expected_lines.len()
            ),
        ))
    }

    fn write_binary(&mut self) -> StorageResult<Finding> {
        let payload = &self.config.binary_payload;

        let mut file = self.fs.open(&self.config.binary_path, OpenMode::WriteTruncate)?;
        let written = file.write_bytes(payload)?;
        file.close()?;

        Ok(Finding::pass_if(
            written == payload.len(),
            CheckFailure::Mismatch,
            format!("Written {} of {} bytes to binary file", written, payload.len()),
        ))
    }

    fn read_binary(&mut self) -> StorageResult<Finding> {
        let payload = &self.config.binary_payload;

        let mut file = self.fs.open(&self.config.binary_path, OpenMode::Read)?;
        let size = file.size();
        info!("  File size: {} bytes", size);

        let mut data = Vec::with_capacity(size);
        while let Some(byte) = file.read_byte() {
            data.push(byte);
        }
        file.close()?;
        info!("  Data: {:?}", data);

        Ok(Finding::pass_if(
            size == payload.len() && data == *payload,
            CheckFailure::Mismatch,
            format!("Read {} bytes, expected {}", data.len(), payload.len()),
        ))
    }

    fn list_files(&mut self) -> StorageResult<Finding> {
        let entries = list_and_log(self.fs)?;

        let mut consistent = true;
        for entry in &entries {
            if self.fs.open(&entry.name, OpenMode::Read)?.size() != entry.size {
                warn!("  Size of {} differs from its listing", entry.name);
                consistent = false;
            }
        }
        let has_text = listed(&entries, &self.config.text_path);
        let has_binary = listed(&entries, &self.config.binary_path);

        Ok(Finding::pass_if(
            consistent && has_text && has_binary,
            CheckFailure::Mismatch,
            format!("Listed {} files", entries.len()),
        ))
    }

    fn check_existence(&mut self) -> StorageResult<Finding> {
        let present = self.fs.exists(&self.config.text_path);
        let absent = self.fs.exists(&self.config.absent_path);
        info!("  {} exists: {}", self.config.text_path, yes_no(present));
        info!("  {} exists: {}", self.config.absent_path, yes_no(absent));

        Ok(Finding::pass_if(
            present && !absent,
            CheckFailure::Mismatch,
            format!("Present: {}, absent: {}", yes_no(present), yes_no(!absent)),
        ))
    }

    fn rename_binary(&mut self) -> StorageResult<Finding> {
        let from = &self.config.binary_path;
        let to = &self.config.renamed_path;

        self.fs.rename(from, to)?;
        info!("  ✓ File renamed successfully");

        let entries = list_and_log(self.fs)?;
        let moved = listed(&entries, to) && !listed(&entries, from);
        let exists_agrees = self.fs.exists(to) && !self.fs.exists(from);

        Ok(Finding::pass_if(
            moved && exists_agrees,
            CheckFailure::Mismatch,
            format!("{} -> {}", from, to),
        ))
    }

    fn delete_files(&mut self) -> StorageResult<Finding> {
        let targets = [&self.config.text_path, &self.config.renamed_path];

        let mut all_deleted = true;
        for path in targets {
            match self.fs.remove(path) {
                Ok(()) => info!("  ✓ Deleted: {}", path),
                Err(e) => {
                    warn!("  ✗ Failed to delete {}: {}", path, e);
                    all_deleted = false;
                }
            }
        }

        info!("");
        info!("Final file list:");
        let entries = list_and_log(self.fs)?;
        let leftovers = targets.iter().filter(|p| listed(&entries, p.as_str())).count();

        Ok(Finding::pass_if(
            all_deleted && leftovers == 0,
            CheckFailure::Mismatch,
            format!("{} of {} test files left on volume", leftovers, targets.len()),
        ))
    }
}

fn yes_no(value: bool) -> &'static str {
    if value { "YES" } else { "NO" }
}

fn listed(entries: &[EntryInfo], path: &str) -> bool {
    entries.iter().any(|e| e.name == path)
}

/// Read a text file line by line, echoing each line
fn read_text_file<V: FlashVolume>(fs: &mut FileStore<V>, path: &str) -> StorageResult<Vec<String>> {
    let mut file = fs.open(path, OpenMode::Read)?;
    info!("  File: {}", path);
    info!("  Size: {} bytes", file.size());
    info!("  Contents:");
    info!("  ---");

    let mut lines = Vec::new();
    while file.available() > 0 {
        let line = file.read_line_until(b'\n');
        info!("  {}", line);
        lines.push(line);
    }
    info!("  ---");

    file.close()?;
    Ok(lines)
}

/// List the root directory to the log and return the entries
fn list_and_log<V: FlashVolume>(fs: &mut FileStore<V>) -> StorageResult<Vec<EntryInfo>> {
    let entries: Vec<EntryInfo> = fs.list_root()?.collect();

    info!("  Files on volume:");
    if entries.is_empty() {
        info!("    (no files)");
    } else {
        for entry in &entries {
            info!("    - {} ({} bytes)", entry.name, entry.size);
        }
        info!("  Total files: {}", entries.len());
    }
    Ok(entries)
}

/// Log total / used / free bytes and the usage percentage
fn log_volume_info<V: FlashVolume>(fs: &mut FileStore<V>) {
    info!("");
    info!("--- Filesystem Information ---");
    match fs.usage() {
        Ok(usage) => {
            info!("  Total bytes: {}", usage.total);
            info!("  Used bytes:  {}", usage.used);
            info!("  Free bytes:  {}", usage.free());
            info!("  Usage: {:.1}%", usage.percent());
        }
        Err(e) => warn!("  Usage unavailable: {}", e),
    }
    info!("------------------------------");
}

type FileCheck<'a, V> = fn(&mut FileBattery<'a, V>) -> StorageResult<Finding>;

/// The checks in running order
fn file_check_table<'a, V: FlashVolume>() -> [(&'static str, FileCheck<'a, V>); 9] {
    [
        ("Write text file", FileBattery::write_text),
        ("Read text file", FileBattery::read_text),
        ("Append to file", FileBattery::append_text),
        ("Write binary file", FileBattery::write_binary),
        ("Read binary file", FileBattery::read_binary),
        ("List all files", FileBattery::list_files),
        ("Check file existence", FileBattery::check_existence),
        ("Rename file", FileBattery::rename_binary),
        ("Delete files", FileBattery::delete_files),
    ]
}

/// Run the nine filesystem checks against a mounted filesystem
///
/// `uptime_ms` goes into the dynamic line of the text file.
pub fn run_file_checks<V: FlashVolume>(
    fs: &mut FileStore<V>,
    config: &HarnessConfig,
    uptime_ms: u64,
) -> Vec<CheckOutcome> {
    log_volume_info(fs);

    let mut battery = FileBattery {
        fs: &mut *fs,
        config,
        uptime_ms,
        expected_lines: Vec::new(),
    };
    let outcomes = run_battery(&mut battery, &file_check_table());

    log_volume_info(fs);
    outcomes
}
