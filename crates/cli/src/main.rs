use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use engine::{
    ActivityEvent, AspectRatio, ClipId, Command, Engine, EngineConfig, Event, LibraryItemId,
    MediaBackend, ProjectStorage, SourceMeta, TrackKind,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: cutline [--config <file>] [--store <dir>] <command>

commands:
  ingest <file>                 add a media file to the library
  place <item-id> <start> [track]
  text <start>                  add a text clip
  split <clip-id> <at>
  move <clip-id> <start>
  delete <clip-id>
  aspect <16:9|9:16|1:1|4:3>
  show                          print the project snapshot as JSON
  new                           discard the saved project";

#[derive(Debug, Clone, PartialEq)]
struct Invocation {
    config: Option<PathBuf>,
    store: PathBuf,
    action: Action,
}

#[derive(Debug, Clone, PartialEq)]
enum Action {
    Ingest { path: PathBuf },
    Place { item_id: LibraryItemId, start: f64, track: Option<TrackKind> },
    Text { start: f64 },
    Split { clip_id: ClipId, at: f64 },
    Move { clip_id: ClipId, start: f64 },
    Delete { clip_id: ClipId },
    Aspect { aspect_ratio: AspectRatio },
    Show,
    New,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let invocation = parse_args(std::env::args().skip(1))?;
    let config = load_config(invocation.config.as_deref()).await?;
    let mut engine = Engine::with_ffmpeg(invocation.store.clone(), config);

    dispatch(&mut engine, Command::Load)
        .await
        .context("failed to load saved project")?;

    let command = match invocation.action {
        Action::Show => {
            let snapshot = engine.state().snapshot();
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
            return Ok(());
        }
        Action::New => Command::NewProject,
        Action::Ingest { path } => ingest_command(&path).await?,
        Action::Place {
            item_id,
            start,
            track,
        } => Command::PlaceClip {
            item_id,
            track,
            start,
        },
        Action::Text { start } => Command::AddText { start },
        Action::Split { clip_id, at } => Command::Split { clip_id, at },
        Action::Move { clip_id, start } => Command::MoveClip { clip_id, start },
        Action::Delete { clip_id } => Command::DeleteClip { clip_id },
        Action::Aspect { aspect_ratio } => Command::SetAspectRatio { aspect_ratio },
    };

    let events = dispatch(&mut engine, command).await?;
    report(&events)?;

    if engine.is_dirty() {
        dispatch(&mut engine, Command::Save).await?;
        info!(store = %invocation.store.display(), "project saved");
    }
    Ok(())
}

/// Runs one command, printing an `error` activity before propagating a
/// failure so the notification sender sees it.
async fn dispatch<M, S>(engine: &mut Engine<M, S>, command: Command) -> anyhow::Result<Vec<Event>>
where
    M: MediaBackend,
    S: ProjectStorage,
{
    match engine.handle_command(command).await {
        Ok(events) => Ok(events),
        Err(error) => {
            println!("{}", serde_json::to_string(&ActivityEvent::error(&error))?);
            Err(error.into())
        }
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();
}

async fn load_config(path: Option<&Path>) -> anyhow::Result<EngineConfig> {
    let Some(path) = path else {
        return Ok(EngineConfig::default());
    };
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
            return Ok(EngineConfig::default());
        }
        Err(error) => {
            return Err(error).with_context(|| format!("failed to read {}", path.display()));
        }
    };
    serde_json::from_slice(&bytes).with_context(|| format!("invalid config {}", path.display()))
}

async fn ingest_command(path: &Path) -> anyhow::Result<Command> {
    let payload = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let meta = SourceMeta {
        url: path.display().to_string(),
        mime: mime_for(&name).to_string(),
        name,
        ..SourceMeta::default()
    };
    Ok(Command::Ingest {
        meta,
        payload: Some(payload),
    })
}

/// Best-effort MIME type from the file extension.
fn mime_for(name: &str) -> &'static str {
    let extension = name
        .rsplit_once('.')
        .map(|(_, extension)| extension.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "mp4" => "video/mp4",
        "m4v" => "video/x-m4v",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "m4a" => "audio/mp4",
        "ogg" => "audio/ogg",
        _ => "application/octet-stream",
    }
}

fn report(events: &[Event]) -> anyhow::Result<()> {
    for event in events {
        match event {
            Event::Warning(warning) => eprintln!("warning: {}", warning.message),
            Event::Activity(activity) => println!("{}", serde_json::to_string(activity)?),
            Event::ItemIngested { item_id } => println!("item {item_id}"),
            Event::ClipPlaced { clip_id, track } => println!("clip {clip_id} on {track}"),
            Event::ClipSplit { clip_id, second_id } => println!("split {clip_id} -> {second_id}"),
            Event::Cleared => println!("project cleared"),
            Event::ProjectChanged(_)
            | Event::Saved { .. }
            | Event::Loaded { .. } => {}
        }
    }
    Ok(())
}

fn parse_args(args: impl IntoIterator<Item = String>) -> anyhow::Result<Invocation> {
    let mut config = None;
    let mut store = PathBuf::from(".cutline");
    let mut positional = Vec::new();

    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => config = Some(PathBuf::from(value_of(&mut args, "--config")?)),
            "--store" => store = PathBuf::from(value_of(&mut args, "--store")?),
            "-h" | "--help" => bail!("{USAGE}"),
            _ => positional.push(arg),
        }
    }

    let Some((name, rest)) = positional.split_first() else {
        bail!("{USAGE}");
    };
    let action = match (name.as_str(), rest) {
        ("ingest", [path]) => Action::Ingest {
            path: PathBuf::from(path),
        },
        ("place", [item_id, start]) => Action::Place {
            item_id: parse_id(item_id)?,
            start: parse_seconds(start)?,
            track: None,
        },
        ("place", [item_id, start, track]) => Action::Place {
            item_id: parse_id(item_id)?,
            start: parse_seconds(start)?,
            track: Some(parse_tag(track)?),
        },
        ("text", [start]) => Action::Text {
            start: parse_seconds(start)?,
        },
        ("split", [clip_id, at]) => Action::Split {
            clip_id: parse_id(clip_id)?,
            at: parse_seconds(at)?,
        },
        ("move", [clip_id, start]) => Action::Move {
            clip_id: parse_id(clip_id)?,
            start: parse_seconds(start)?,
        },
        ("delete", [clip_id]) => Action::Delete {
            clip_id: parse_id(clip_id)?,
        },
        ("aspect", [ratio]) => Action::Aspect {
            aspect_ratio: parse_tag(ratio)?,
        },
        ("show", []) => Action::Show,
        ("new", []) => Action::New,
        _ => bail!("unrecognised command `{}`\n\n{USAGE}", positional.join(" ")),
    };

    Ok(Invocation {
        config,
        store,
        action,
    })
}

fn value_of(args: &mut impl Iterator<Item = String>, flag: &str) -> anyhow::Result<String> {
    args.next()
        .with_context(|| format!("{flag} requires a value"))
}

fn parse_id(value: &str) -> anyhow::Result<ClipId> {
    ClipId::parse_str(value).with_context(|| format!("invalid id `{value}`"))
}

fn parse_seconds(value: &str) -> anyhow::Result<f64> {
    let seconds: f64 = value
        .parse()
        .with_context(|| format!("invalid time `{value}`"))?;
    if !seconds.is_finite() {
        bail!("invalid time `{value}`");
    }
    Ok(seconds)
}

/// Parses a serde unit-variant tag such as `audio` or `9:16`.
fn parse_tag<T>(value: &str) -> anyhow::Result<T>
where
    T: serde::de::DeserializeOwned,
{
    serde_json::from_value(serde_json::Value::String(value.to_string()))
        .with_context(|| format!("unrecognised value `{value}`"))
}
