use chrono::Local;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

/// Appends a timestamped message to `<log_dir>/<filename>`.
///
/// # Arguments
///
/// * `log_dir` - Directory holding the log file (created if missing)
/// * `filename` - The name of the log file
/// * `message` - The message to log
pub fn log_to_file(log_dir: &Path, filename: &str, message: &str) -> io::Result<()> {
    fs::create_dir_all(log_dir)?;

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join(filename))?;

    let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S%.3f");

    writeln!(file, "\n--- Log entry at {} ---", timestamp)?;
    writeln!(file, "{}", message)?;
    writeln!(file, "--- End of entry ---\n")?;

    file.flush()
}

/// Logs a message under a formatted header.
///
/// # Arguments
///
/// * `log_dir` - Directory holding the log file
/// * `filename` - The name of the log file
/// * `header` - A descriptive header for this log entry
/// * `message` - The message to log
pub fn log_with_header(log_dir: &Path, filename: &str, header: &str, message: &str) -> io::Result<()> {
    let formatted_message = format!(
        "===== {} =====\n{}\n====================",
        header, message
    );
    log_to_file(log_dir, filename, &formatted_message)
}

/// Appends one row to a CSV file, writing `headers` first if the file is new.
pub fn log_csv(log_dir: &Path, filename: &str, headers: &[&str], data: &[&str]) -> csv::Result<()> {
    fs::create_dir_all(log_dir)?;

    let path = log_dir.join(filename);
    let file_exists = path.exists();

    let file = OpenOptions::new().create(true).append(true).open(&path)?;
    let mut writer = csv::Writer::from_writer(file);

    if !file_exists && !headers.is_empty() {
        writer.write_record(headers)?;
    }
    writer.write_record(data)?;
    writer.flush()?;

    Ok(())
}
