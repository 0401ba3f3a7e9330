//! Sources, batch operation and sinks used by the CLI. Stand-ins for the cloud collaborators:
//! keys and messages come from a line-oriented input, batches go to a JSON-lines log.

use anyhow::{Context, Result, bail};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::pipeline::IterSource;
use crate::{RemoteBatchOperation, Sink};

pub type LineReader = Box<dyn BufRead + Send>;
pub type LineIter<T> = Box<dyn Iterator<Item = Result<T>> + Send>;

/// Open `path` for line reading; `None` or `-` is stdin.
pub fn open_input(path: Option<&Path>) -> Result<LineReader> {
    match path {
        None => Ok(Box::new(BufReader::new(std::io::stdin()))),
        Some(p) if p == Path::new("-") => Ok(Box::new(BufReader::new(std::io::stdin()))),
        Some(p) => {
            let f = File::open(p).with_context(|| format!("open input {}", p.display()))?;
            Ok(Box::new(BufReader::new(f)))
        }
    }
}

/// Non-empty trimmed lines of `reader` as keys. `display` prints each key to stdout as it is read.
pub fn key_source(reader: LineReader, display: bool) -> IterSource<LineIter<String>> {
    let iter = reader
        .lines()
        .filter_map(|line| match line {
            Ok(l) if l.trim().is_empty() => None,
            Ok(l) => Some(Ok(l.trim().to_string())),
            Err(e) => Some(Err(anyhow::Error::new(e).context("read key"))),
        })
        .inspect(move |key| {
            if display && let Ok(k) = key {
                println!("Key={}", k);
            }
        });
    let iter: LineIter<String> = Box::new(iter);
    IterSource::new(iter)
}

/// A received message: what the dump variant writes per record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReceivedMessage {
    pub id: String,
    pub data: String,
    #[serde(rename = "attr")]
    pub attributes: BTreeMap<String, String>,
}

/// Each input line is one message; ids are 1-based line numbers.
pub fn message_source(reader: LineReader) -> IterSource<LineIter<ReceivedMessage>> {
    let iter = reader.lines().enumerate().map(|(i, line)| {
        let data = line.context("read message")?;
        Ok(ReceivedMessage {
            id: (i + 1).to_string(),
            data,
            attributes: BTreeMap::new(),
        })
    });
    let iter: LineIter<ReceivedMessage> = Box::new(iter);
    IterSource::new(iter)
}

/// Batch operation that appends each batch as one JSON array line to a writer.
/// Optional latency and an injected failure stand in for a remote backend.
pub struct JsonlBatchWriter {
    out: Mutex<Box<dyn Write + Send>>,
    latency: Option<Duration>,
    fail_after_batches: Option<usize>,
    calls: AtomicUsize,
}

impl JsonlBatchWriter {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            out: Mutex::new(out),
            latency: None,
            fail_after_batches: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create {}", parent.display()))?;
        }
        let f = File::create(path).with_context(|| format!("create {}", path.display()))?;
        Ok(Self::new(Box::new(BufWriter::new(f))))
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = (!latency.is_zero()).then_some(latency);
        self
    }

    pub fn fail_after_batches(mut self, n: Option<usize>) -> Self {
        self.fail_after_batches = n;
        self
    }
}

impl RemoteBatchOperation<String> for JsonlBatchWriter {
    fn apply(&self, batch: &[String]) -> Result<()> {
        let call = self.calls.fetch_add(1, Ordering::Relaxed);
        if let Some(latency) = self.latency {
            std::thread::sleep(latency);
        }
        if self.fail_after_batches.is_some_and(|n| call >= n) {
            bail!("simulated backend failure on batch {}", call + 1);
        }
        let line = serde_json::to_string(batch).context("encode batch")?;
        let mut out = self
            .out
            .lock()
            .map_err(|_| anyhow::anyhow!("batch log writer poisoned"))?;
        writeln!(out, "{}", line).context("write batch")?;
        out.flush().context("flush batch log")?;
        Ok(())
    }
}

/// Writes one message per line: a JSON record, or the body only when `raw`.
pub struct JsonLinesSink<W: Write> {
    out: BufWriter<W>,
    raw: bool,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(out: W, raw: bool) -> Self {
        Self {
            out: BufWriter::new(out),
            raw,
        }
    }

    pub fn into_inner(self) -> Result<W> {
        self.out
            .into_inner()
            .map_err(|e| anyhow::Error::new(e.into_error()).context("flush sink"))
    }
}

impl<W: Write + Send> Sink<ReceivedMessage> for JsonLinesSink<W> {
    fn write(&mut self, record: &ReceivedMessage) -> Result<()> {
        if self.raw {
            self.out
                .write_all(record.data.as_bytes())
                .context("write record")?;
        } else {
            serde_json::to_writer(&mut self.out, record).context("encode record")?;
        }
        self.out.write_all(b"\n").context("write record")?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.out.flush().context("flush sink")
    }
}

pub type BoxedSink = Box<dyn Sink<ReceivedMessage>>;

/// Path of worker `index`'s output file: `<prefix>000`, `<prefix>001`, ...
pub fn worker_output_path(prefix: &str, index: usize) -> PathBuf {
    PathBuf::from(format!("{prefix}{index:03}"))
}

/// One stdout sink, or one file sink per worker when `out_prefix` is set.
pub fn open_sinks(out_prefix: Option<&str>, workers: usize, raw: bool) -> Result<Vec<BoxedSink>> {
    let Some(prefix) = out_prefix else {
        let stdout: BoxedSink = Box::new(JsonLinesSink::new(std::io::stdout(), raw));
        return Ok(vec![stdout]);
    };
    (0..workers)
        .map(|i| {
            let path = worker_output_path(prefix, i);
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("create {}", parent.display()))?;
            }
            let f = File::create(&path).with_context(|| format!("create {}", path.display()))?;
            log::info!("out={}", path.display());
            Ok(Box::new(JsonLinesSink::new(f, raw)) as BoxedSink)
        })
        .collect()
}
