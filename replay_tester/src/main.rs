use anyhow::{Context, Result, bail};
use futures::future::{self, BoxFuture};
use std::env;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tracing_subscriber::EnvFilter;
use zen_posture::{
    AppConfig, Collaborators, ConfigStore, JsonWeightsLoader, KeypointSet, KeypointSource, MemoryConfigStore,
    ModelSelection, PersistenceService, PostureError, PostureResult, PostureSample, Scheduler, TomlConfigStore,
    TracingNotifier, Unavailable, select_model,
};

/// Feeds a recorded session to the detection task, one line per tick.
struct ReplaySource {
    frames: std::vec::IntoIter<Option<KeypointSet>>,
    finished: Arc<Notify>,
}

impl KeypointSource for ReplaySource {
    fn next_keypoints(&mut self) -> BoxFuture<'_, PostureResult<Option<KeypointSet>>> {
        let frame = match self.frames.next() {
            Some(frame) => frame,
            None => {
                self.finished.notify_one();
                None
            }
        };
        Box::pin(future::ready(Ok(frame)))
    }
}

/// Appends every sample to a JSON-lines file.
struct JsonLinesPersistence {
    writer: Mutex<BufWriter<File>>,
}

impl JsonLinesPersistence {
    fn create(path: &Path) -> Result<Self> {
        let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    fn append(&self, sample: &PostureSample) -> PostureResult<()> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| PostureError::sink("sample writer lock poisoned"))?;
        serde_json::to_writer(&mut *writer, sample)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }
}

impl PersistenceService for JsonLinesPersistence {
    fn record_sample(&self, sample: PostureSample) -> BoxFuture<'_, PostureResult<()>> {
        Box::pin(future::ready(self.append(&sample)))
    }
}

/// Each line is a keypoint set, or `null` for a tick without a detection.
fn read_recording(path: &Path) -> Result<Vec<Option<KeypointSet>>> {
    let file = File::open(path).with_context(|| format!("opening recording {}", path.display()))?;
    let mut frames = Vec::new();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let frame: Option<KeypointSet> =
            serde_json::from_str(&line).with_context(|| format!("line {} of {}", index + 1, path.display()))?;
        frames.push(frame);
    }
    Ok(frames)
}

fn choose_model(config: &AppConfig) -> ModelSelection {
    let Some(path) = &config.model_weights_path else {
        return select_model(&Unavailable("no model_weights_path configured".to_string()));
    };
    match fs::read_to_string(path) {
        Ok(document) => select_model(&JsonWeightsLoader::new(path.display().to_string(), document)),
        Err(e) => select_model(&Unavailable(format!("reading {}: {e}", path.display()))),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    // --- 1. Argument Parsing & Setup ---
    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        println!("Usage: replay_tester <recording.jsonl> <samples_out.jsonl> [config.toml]");
        return Ok(());
    }
    let recording_path = PathBuf::from(&args[1]);
    let samples_path = PathBuf::from(&args[2]);
    let config_path = args.get(3).map(PathBuf::from);

    let config = match &config_path {
        Some(path) => AppConfig::load(path).with_context(|| format!("loading config {}", path.display()))?,
        None => AppConfig::default(),
    };
    let config_store: Arc<dyn ConfigStore> = match &config_path {
        Some(path) => Arc::new(TomlConfigStore::new(path.with_file_name("preferences.toml"))),
        None => Arc::new(MemoryConfigStore::new()),
    };

    // --- 2. Recording & Model ---
    let frames = read_recording(&recording_path)?;
    if frames.is_empty() {
        bail!("recording {} holds no frames", recording_path.display());
    }
    tracing::info!(frames = frames.len(), recording = %recording_path.display(), "Replaying recording");

    let selection = choose_model(&config);

    // --- 3. Scheduler ---
    let finished = Arc::new(Notify::new());
    let source = ReplaySource {
        frames: frames.into_iter(),
        finished: finished.clone(),
    };
    let collaborators = Collaborators {
        source: Box::new(source),
        persistence: Arc::new(JsonLinesPersistence::create(&samples_path)?),
        notifier: Arc::new(TracingNotifier),
        config_store,
    };
    let handle = Scheduler::start(config, selection, collaborators)?;

    // --- 4. Run until the recording is exhausted or the user interrupts ---
    tokio::select! {
        _ = finished.notified() => tracing::info!("Recording finished"),
        _ = tokio::signal::ctrl_c() => tracing::info!("Interrupted"),
    }

    let report = handle.shutdown().await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
