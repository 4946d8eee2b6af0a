use std::{
    fs::{self, File},
    io::{self, BufReader, BufWriter, StdoutLock, Write as _},
    path::{Path, PathBuf},
};

use anyhow::Context;
use trajreg_analysis::{config::RegressionOptions, trajectory::Experiment};

/// Destination of a command's JSON output: stdout or a file.
#[derive(Debug)]
pub enum Output {
    Stdout(StdoutLock<'static>),
    File {
        writer: BufWriter<File>,
        path: PathBuf,
    },
}

impl Output {
    /// Writes `value` as pretty JSON to `path`, or to stdout without one.
    ///
    /// Returns a label of where the JSON went, for progress messages.
    pub fn save_json<T>(value: &T, path: Option<&Path>) -> anyhow::Result<String>
    where
        T: serde::Serialize + ?Sized,
    {
        let mut output = match path {
            Some(path) => Self::create(path)?,
            None => Self::Stdout(io::stdout().lock()),
        };
        output.write_json(value)?;
        Ok(output.label())
    }

    fn create(path: &Path) -> anyhow::Result<Self> {
        let file = File::create(path)
            .with_context(|| format!("Failed to create output file: {}", path.display()))?;
        Ok(Self::File {
            writer: BufWriter::new(file),
            path: path.to_owned(),
        })
    }

    fn label(&self) -> String {
        match self {
            Self::Stdout(_) => "stdout".to_owned(),
            Self::File { path, .. } => path.display().to_string(),
        }
    }

    fn write_json<T>(&mut self, value: &T) -> anyhow::Result<()>
    where
        T: serde::Serialize + ?Sized,
    {
        let label = self.label();
        serde_json::to_writer_pretty(&mut *self, value)
            .with_context(|| format!("Failed to write JSON to {label}"))?;
        writeln!(self)
            .and_then(|()| self.flush())
            .with_context(|| format!("Failed to finish writing {label}"))
    }
}

impl io::Write for Output {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Stdout(writer) => writer.write(buf),
            Self::File { writer, .. } => writer.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Stdout(writer) => writer.flush(),
            Self::File { writer, .. } => writer.flush(),
        }
    }
}

/// Deserializes a JSON file; `file_kind` names the file in error messages.
pub fn read_json_file<T, P>(file_kind: &str, path: P) -> anyhow::Result<T>
where
    T: serde::de::DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let file = File::open(path)
        .with_context(|| format!("Failed to open {file_kind} file: {}", path.display()))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse {file_kind} file: {}", path.display()))
}

/// Read an experiment (subject, layout and trials) from a JSON file
pub fn read_experiment_file<P>(path: P) -> anyhow::Result<Experiment>
where
    P: AsRef<Path>,
{
    read_json_file("experiment", path)
}

/// Read regression options from a JSON file
///
/// Unknown keys are rejected with an error naming the key.
pub fn read_options_file<P>(path: P) -> anyhow::Result<RegressionOptions>
where
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let json = fs::read_to_string(path)
        .with_context(|| format!("Failed to read options file: {}", path.display()))?;
    RegressionOptions::from_json(&json)
        .with_context(|| format!("Invalid options file: {}", path.display()))
}
