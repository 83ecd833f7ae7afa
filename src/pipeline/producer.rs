//! Producers turn one work unit into one artifact file.
//!
//! The real work (speech synthesis, translation, download) happens in an
//! external tool. [`CommandProducer`] drives such a tool from a command
//! template; [`MockProducer`] writes silent WAV files with scripted delays
//! and failures.

use crate::audio::codec::{AudioCodec, WavCodec};
use crate::error::{Result, VoxreelError};
use crate::pipeline::cancel::CancellationToken;
use crate::pipeline::types::{Artifact, WorkUnit};
use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Per-job context handed to a producer.
#[derive(Debug)]
pub struct JobContext<'a> {
    /// Where the artifact must be written.
    pub output: PathBuf,
    /// Polled at safe points; a cancelled job should return quickly.
    pub cancel: &'a CancellationToken,
}

/// Trait for the opaque unit-of-work function.
///
/// Implementations run on worker threads and must not touch shared state
/// other than the output file.
pub trait Producer: Send + Sync {
    /// Processes `unit`, leaving a file at `ctx.output`.
    fn produce(&self, unit: &WorkUnit, ctx: &JobContext<'_>) -> Result<Artifact>;

    /// Short name for logs.
    fn name(&self) -> &str;
}

impl<T: Producer + ?Sized> Producer for Arc<T> {
    fn produce(&self, unit: &WorkUnit, ctx: &JobContext<'_>) -> Result<Artifact> {
        (**self).produce(unit, ctx)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Substitutes `{text}`, `{output}` and `{index}` in a command template.
pub fn render_template(template: &[String], unit: &WorkUnit, output: &Path) -> Vec<String> {
    template
        .iter()
        .map(|arg| {
            arg.replace("{output}", &output.to_string_lossy())
                .replace("{index}", &unit.index.to_string())
                .replace("{text}", &unit.payload)
        })
        .collect()
}

/// Producer that runs an external tool once per unit.
pub struct CommandProducer {
    template: Vec<String>,
    codec: Arc<dyn AudioCodec>,
    poll_interval: Duration,
}

impl CommandProducer {
    /// Creates a producer from a command template such as
    /// `["espeak-ng", "-w", "{output}", "{text}"]`.
    pub fn new(template: Vec<String>) -> Result<Self> {
        if template.first().is_none_or(|program| program.trim().is_empty()) {
            return Err(VoxreelError::ConfigInvalidValue {
                key: "producer.command".to_string(),
                message: "command template is empty".to_string(),
            });
        }
        Ok(Self {
            template,
            codec: Arc::new(WavCodec::default()),
            poll_interval: Duration::from_millis(50),
        })
    }

    /// Sets the codec used to probe artifact durations.
    pub fn with_codec(mut self, codec: Arc<dyn AudioCodec>) -> Self {
        self.codec = codec;
        self
    }

    fn tail(log_path: &Path) -> String {
        let text = fs::read_to_string(log_path).unwrap_or_default();
        let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
        let start = lines.len().saturating_sub(3);
        lines[start..].join(" | ")
    }
}

impl Producer for CommandProducer {
    fn produce(&self, unit: &WorkUnit, ctx: &JobContext<'_>) -> Result<Artifact> {
        let args = render_template(&self.template, unit, &ctx.output);
        let (program, rest) = args
            .split_first()
            .ok_or_else(|| VoxreelError::Other("empty command".to_string()))?;

        let log_path = ctx.output.with_extension("log");
        let log_file = File::create(&log_path)?;

        let mut child = Command::new(program)
            .args(rest)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::from(log_file))
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    VoxreelError::ProducerToolNotFound {
                        tool: program.clone(),
                    }
                } else {
                    VoxreelError::Production {
                        index: unit.index,
                        message: format!("Failed to execute {}: {}", program, e),
                    }
                }
            })?;

        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if ctx.cancel.is_cancelled() {
                if let Err(e) = child.kill() {
                    log::debug!("chunk {}: kill {} failed: {}", unit.index, program, e);
                }
                if let Err(e) = child.wait() {
                    log::debug!("chunk {}: reaping {} failed: {}", unit.index, program, e);
                }
                if let Err(e) = fs::remove_file(&log_path) {
                    log::debug!("could not remove {}: {}", log_path.display(), e);
                }
                return Err(VoxreelError::Cancelled);
            }
            thread::sleep(self.poll_interval);
        };

        let stderr = Self::tail(&log_path);
        if let Err(e) = fs::remove_file(&log_path) {
            log::debug!("could not remove {}: {}", log_path.display(), e);
        }

        if !status.success() {
            return Err(VoxreelError::Production {
                index: unit.index,
                message: format!("{} exited with {}: {}", program, status, stderr),
            });
        }
        if !ctx.output.exists() {
            return Err(VoxreelError::Production {
                index: unit.index,
                message: format!("{} produced no output file", program),
            });
        }

        let duration_ms = match self.codec.duration_ms(&ctx.output) {
            Ok(ms) => Some(ms),
            Err(e) => {
                log::debug!("chunk {}: duration unknown: {}", unit.index, e);
                None
            }
        };

        Ok(Artifact {
            index: unit.index,
            path: ctx.output.clone(),
            duration_ms,
        })
    }

    fn name(&self) -> &str {
        &self.template[0]
    }
}

/// Producer that writes silent WAV files, for tests and dry runs.
#[derive(Debug, Clone)]
pub struct MockProducer {
    codec: WavCodec,
    default_duration_ms: u64,
    durations: HashMap<usize, u64>,
    delays: HashMap<usize, Duration>,
    failures: HashSet<usize>,
    panics: HashSet<usize>,
}

impl Default for MockProducer {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProducer {
    /// Every unit yields one second of silence, immediately.
    pub fn new() -> Self {
        Self {
            codec: WavCodec::new(8000),
            default_duration_ms: 1000,
            durations: HashMap::new(),
            delays: HashMap::new(),
            failures: HashSet::new(),
            panics: HashSet::new(),
        }
    }

    /// Duration for every unit without an explicit override.
    pub fn with_default_duration(mut self, ms: u64) -> Self {
        self.default_duration_ms = ms;
        self
    }

    /// Duration of unit `index`.
    pub fn with_duration(mut self, index: usize, ms: u64) -> Self {
        self.durations.insert(index, ms);
        self
    }

    /// Unit `index` takes `delay` before completing.
    pub fn with_delay(mut self, index: usize, delay: Duration) -> Self {
        self.delays.insert(index, delay);
        self
    }

    /// Unit `index` fails.
    pub fn with_failure(mut self, index: usize) -> Self {
        self.failures.insert(index);
        self
    }

    /// Unit `index` panics inside the producer.
    pub fn with_panic(mut self, index: usize) -> Self {
        self.panics.insert(index);
        self
    }

    fn wait(&self, index: usize, cancel: &CancellationToken) -> Result<()> {
        let Some(delay) = self.delays.get(&index) else {
            return Ok(());
        };
        let step = Duration::from_millis(5);
        let mut waited = Duration::ZERO;
        while waited < *delay {
            if cancel.is_cancelled() {
                return Err(VoxreelError::Cancelled);
            }
            thread::sleep(step);
            waited += step;
        }
        Ok(())
    }
}

impl Producer for MockProducer {
    fn produce(&self, unit: &WorkUnit, ctx: &JobContext<'_>) -> Result<Artifact> {
        self.wait(unit.index, ctx.cancel)?;

        if self.panics.contains(&unit.index) {
            panic!("mock producer panic on chunk {}", unit.index);
        }
        if self.failures.contains(&unit.index) {
            return Err(VoxreelError::Production {
                index: unit.index,
                message: "mock production failure".to_string(),
            });
        }

        let requested = self
            .durations
            .get(&unit.index)
            .copied()
            .unwrap_or(self.default_duration_ms);
        let duration_ms = self.codec.silence(requested, &ctx.output)?;

        Ok(Artifact {
            index: unit.index,
            path: ctx.output.clone(),
            duration_ms: Some(duration_ms),
        })
    }

    fn name(&self) -> &str {
        "mock"
    }
}
