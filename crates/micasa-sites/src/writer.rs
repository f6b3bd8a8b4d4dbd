use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::sync::Mutex;
use std::thread::{self, JoinHandle};

use anyhow::{anyhow, bail, Result};
use crossbeam_channel::{bounded, select, unbounded, Receiver, Sender};
use micasa_crawler::{Record, Sink};
use serde::{Deserialize, Serialize};

/// Layout of CSV output.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CsvOptions {
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
    /// Escape quotes with this character instead of doubling them
    #[serde(default)]
    pub escape: Option<char>,
    /// Accept records whose width differs from the first one
    #[serde(default)]
    pub flexible: bool,
    #[serde(default)]
    pub crlf: bool,
    /// Start with the field names of the first record
    #[serde(default = "default_header")]
    pub header: bool,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            delimiter: default_delimiter(),
            escape: None,
            flexible: false,
            crlf: false,
            header: default_header(),
        }
    }
}

fn default_delimiter() -> char {
    ','
}

fn default_header() -> bool {
    true
}

impl CsvOptions {
    fn writer<W: Write>(&self, out: W) -> csv::Writer<W> {
        let mut builder = csv::WriterBuilder::new();
        builder
            .delimiter(self.delimiter as u8)
            .flexible(self.flexible)
            .terminator(if self.crlf {
                csv::Terminator::CRLF
            } else {
                csv::Terminator::Any(b'\n')
            })
            .double_quote(self.escape.is_none());
        if let Some(escape) = self.escape {
            builder.escape(escape as u8);
        }
        builder.from_writer(out)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub enum RecordFormat {
    Csv(CsvOptions),
    JsonLines,
}

impl Default for RecordFormat {
    fn default() -> Self {
        Self::Csv(CsvOptions::default())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub enum FileMode {
    /// Truncate an existing file
    #[default]
    Create,
    Append,
}

impl From<FileMode> for fs_err::OpenOptions {
    fn from(mode: FileMode) -> Self {
        let mut opts = fs_err::OpenOptions::new();
        match mode {
            FileMode::Create => opts.write(true).create(true).truncate(true),
            FileMode::Append => opts.append(true).create(true),
        };
        opts
    }
}

/// Where records end up, `None` meaning stdout.
#[derive(Debug, Clone, Default)]
pub struct WriterConfig {
    pub output: Option<PathBuf>,
    pub file_mode: FileMode,
    pub format: RecordFormat,
}

enum Encoder {
    Csv {
        wtr: csv::Writer<Box<dyn Write + Send>>,
        header: bool,
        flexible: bool,
        width: Option<usize>,
    },
    JsonLines(BufWriter<Box<dyn Write + Send>>),
}

impl Encoder {
    fn new(config: &WriterConfig) -> Result<Self> {
        let out: Box<dyn Write + Send> = match &config.output {
            Some(path) => {
                let opts: fs_err::OpenOptions = config.file_mode.into();
                Box::new(opts.open(path)?)
            }
            None => Box::new(io::stdout()),
        };
        let encoder = match &config.format {
            RecordFormat::Csv(options) => Self::Csv {
                wtr: options.writer(out),
                header: options.header,
                flexible: options.flexible,
                width: None,
            },
            RecordFormat::JsonLines => Self::JsonLines(BufWriter::new(out)),
        };
        Ok(encoder)
    }

    /// Rejected records leave nothing behind in the output.
    fn write(&mut self, record: &Record) -> Result<()> {
        match self {
            Self::Csv {
                wtr,
                header,
                flexible,
                width,
            } => {
                if let Some(expected) = *width {
                    if !*flexible && record.len() != expected {
                        bail!("Record has {} fields, expected {expected}", record.len());
                    }
                }
                if *header {
                    wtr.write_record(record.names())?;
                    *header = false;
                }
                wtr.write_record(record.values())?;
                width.get_or_insert(record.len());
            }
            Self::JsonLines(wtr) => {
                let mut line = serde_json::to_vec(record)?;
                line.push(b'\n');
                wtr.write_all(&line)?;
            }
        }
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Csv { wtr, .. } => wtr.flush(),
            Self::JsonLines(wtr) => wtr.flush(),
        }
    }
}

type Reply = Sender<Result<()>>;

/// A [`Sink`] handing records to a dedicated writer thread.
///
/// Every `write` waits for the thread to encode its record, so a rejected
/// record fails the task that produced it.
pub struct RecordWriter {
    tx_record: Sender<(Record, Reply)>,
    tx_stop: Sender<()>,
    writer: Mutex<Option<JoinHandle<io::Result<usize>>>>,
}

impl RecordWriter {
    /// Opens the output and starts the writer thread.
    pub fn spawn(config: &WriterConfig) -> Result<Self> {
        let encoder = Encoder::new(config)?;
        let (tx_record, rx_record) = unbounded::<(Record, Reply)>();
        let (tx_stop, rx_stop) = bounded::<()>(1);

        let writer = thread::Builder::new()
            .name(String::from("record-writer"))
            .spawn(move || write_loop(encoder, rx_record, rx_stop))?;

        Ok(Self {
            tx_record,
            tx_stop,
            writer: Mutex::new(Some(writer)),
        })
    }
}

fn write_loop(
    mut encoder: Encoder,
    rx_record: Receiver<(Record, Reply)>,
    rx_stop: Receiver<()>,
) -> io::Result<usize> {
    let mut written = 0;
    let mut write = |(record, reply): (Record, Reply)| {
        let res = encoder.write(&record);
        if res.is_ok() {
            written += 1;
        }
        reply.send(res).ok();
    };

    loop {
        select! {
            recv(rx_record) -> msg => match msg {
                Ok(msg) => write(msg),
                Err(_) => break,
            },
            recv(rx_stop) -> _ => {
                rx_record.try_iter().for_each(&mut write);
                break;
            }
        }
    }

    encoder.flush()?;
    Ok(written)
}

impl Sink for RecordWriter {
    fn write(&self, record: Record) -> Result<()> {
        let (tx_reply, rx_reply) = bounded(1);
        self.tx_record
            .send((record, tx_reply))
            .map_err(|_| anyhow!("Record writer is closed"))?;
        rx_reply
            .recv()
            .map_err(|_| anyhow!("Record writer stopped before writing"))?
    }

    /// Fails only when buffered records cannot be flushed.
    fn close(&self) -> Result<()> {
        let writer = self
            .writer
            .lock()
            .map_err(|_| anyhow!("Record writer lock poisoned"))?
            .take();
        let Some(writer) = writer else {
            return Ok(());
        };
        self.tx_stop.send(()).ok();
        let written = writer
            .join()
            .map_err(|_| anyhow!("Record writer thread panicked"))?
            .map_err(|e| anyhow!("Couldn't flush records got: {e}"))?;
        log::info!("Wrote {written} records");
        Ok(())
    }
}

impl Drop for RecordWriter {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::error!("Couldn't close record writer: {e}");
        }
    }
}
