use anyhow::Context;
use env_logger::Env;
use lull::audio::{MediaHost, NullHost, RodioHost};
use lull::catalog::Catalog;
use lull::clock::{Clock, SystemClock};
use lull::config::{SessionConfig, load_config};
use lull::gate::{AutoplayProbe, GestureSource};
use lull::model::{PlaybackState, RepeatMode};
use lull::session::Session;
use lull::sleep_timer::format_remaining;
use lull::storage::JsonDirStore;
use std::cell::Cell;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::thread;
use std::time::{Duration, Instant};

const TICK_INTERVAL: Duration = Duration::from_millis(100);
const STATUS_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Default)]
struct CliArgs {
    catalog: Option<PathBuf>,
    category: Option<String>,
    index: usize,
    sleep_minutes: Option<f64>,
    volume: Option<f32>,
    shuffle: bool,
    repeat: Option<RepeatMode>,
    recommend: Option<usize>,
    null_audio: bool,
}

/// Blocks on stdin until the user presses Enter.
struct StdinGesture;

impl GestureSource for StdinGesture {
    fn request_user_gesture(&mut self) -> anyhow::Result<()> {
        print!("Playback needs your go-ahead. Press Enter to start... ");
        io::stdout().flush()?;
        let mut line = String::new();
        let read = io::stdin().lock().read_line(&mut line)?;
        if read == 0 {
            anyhow::bail!("stdin closed before playback was allowed");
        }
        Ok(())
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let args = parse_args(std::env::args().skip(1).collect())?;
    let config = load_config()?;

    let catalog_path = args
        .catalog
        .clone()
        .or_else(|| config.catalog_path.clone())
        .context("no catalog given; pass --catalog or set catalog_path in config.json")?;
    let catalog = load_catalog(&catalog_path)?;
    log::info!(
        "catalog {} has {} tracks",
        catalog_path.display(),
        catalog.len()
    );

    let data_dir = config.resolved_data_dir()?;
    let store = JsonDirStore::new(data_dir);
    let clock: Rc<dyn Clock> = Rc::new(SystemClock::new());

    if args.null_audio {
        let session = Session::new(NullHost::new(), store, catalog, &config, clock);
        run(session, &args, |host| host.advance(TICK_INTERVAL))
    } else {
        let host = RodioHost::new()?;
        let session = Session::new(host, store, catalog, &config, clock);
        run(session, &args, |_| {})
    }
}

fn load_catalog(path: &Path) -> anyhow::Result<Catalog> {
    if path.is_dir() {
        Catalog::scan(path)
    } else {
        Catalog::load(path)
    }
}

fn run<H: MediaHost + AutoplayProbe>(
    mut session: Session<H, JsonDirStore>,
    args: &CliArgs,
    mut drive: impl FnMut(&mut H),
) -> anyhow::Result<()> {
    if let Some(count) = args.recommend {
        print_recommendations(&mut session, count);
        return Ok(());
    }

    let category = match &args.category {
        Some(category) => category.clone(),
        None => session
            .catalog()
            .category_ids()
            .next()
            .map(str::to_string)
            .context("catalog has no categories")?,
    };
    if session.catalog().category(&category).is_none() {
        anyhow::bail!("unknown category {category}");
    }

    let engine = session.engine_mut();
    if let Some(volume) = args.volume {
        engine.set_volume(volume);
    }
    if args.shuffle {
        engine.toggle_shuffle();
    }
    if let Some(mode) = args.repeat {
        engine.set_repeat(mode);
    }

    let slept = Rc::new(Cell::new(false));
    if let Some(minutes) = args.sleep_minutes {
        let flag = Rc::clone(&slept);
        if !engine.set_sleep_timer(minutes, move || flag.set(true)) {
            anyhow::bail!("--sleep needs a positive number of minutes");
        }
    }

    if !session.detect_autoplay() {
        log::info!("autoplay is blocked until you interact");
    }
    session.play_category_gated(&category, args.index, &mut StdinGesture)?;

    let mut last_status = Instant::now();
    loop {
        thread::sleep(TICK_INTERVAL);
        drive(session.engine_mut().host_mut());
        session.tick();

        if slept.get() {
            log::info!("sleep timer ended the session");
            break;
        }
        match session.engine().state() {
            PlaybackState::Ended | PlaybackState::Idle | PlaybackState::Error => break,
            _ => {}
        }
        if last_status.elapsed() >= STATUS_INTERVAL {
            last_status = Instant::now();
            if let Some(remaining) = session.engine().sleep_timer_remaining() {
                log::info!("sleep timer: {} left", format_remaining(remaining));
            }
        }
    }

    session.flush_usage();
    let info = session.usage().storage_info();
    log::info!(
        "{} plays recorded, usage data {}",
        info.total_plays,
        info.size_label()
    );
    Ok(())
}

fn print_recommendations<H: MediaHost>(session: &mut Session<H, JsonDirStore>, count: usize) {
    let items = session.recommendations(count);
    if items.is_empty() {
        println!("No recommendations yet.");
        return;
    }
    for item in items {
        println!(
            "{:<24} {:<32} {}",
            item.track.category_id,
            item.track.display_name,
            item.reason_text()
        );
    }
}

fn parse_args(args: Vec<String>) -> anyhow::Result<CliArgs> {
    let mut out = CliArgs::default();
    let mut index = 0;
    while index < args.len() {
        match args[index].as_str() {
            "--catalog" => out.catalog = Some(PathBuf::from(value_for(&args, &mut index)?)),
            "--category" => out.category = Some(value_for(&args, &mut index)?.to_string()),
            "--index" => {
                let raw = value_for(&args, &mut index)?;
                out.index = raw
                    .parse()
                    .with_context(|| format!("--index expects a track number, got {raw}"))?;
            }
            "--sleep" => {
                let raw = value_for(&args, &mut index)?;
                out.sleep_minutes = Some(
                    raw.parse()
                        .with_context(|| format!("--sleep expects minutes, got {raw}"))?,
                );
            }
            "--volume" => {
                let raw = value_for(&args, &mut index)?;
                out.volume = Some(
                    raw.parse()
                        .with_context(|| format!("--volume expects 0.0..1.0, got {raw}"))?,
                );
            }
            "--repeat" => {
                let raw = value_for(&args, &mut index)?;
                let Some(mode) = RepeatMode::parse(raw) else {
                    anyhow::bail!("--repeat expects none, one or all, got {raw}");
                };
                out.repeat = Some(mode);
            }
            "--recommend" => {
                let raw = value_for(&args, &mut index)?;
                out.recommend = Some(
                    raw.parse()
                        .with_context(|| format!("--recommend expects a count, got {raw}"))?,
                );
            }
            "--shuffle" => out.shuffle = true,
            "--null-audio" => out.null_audio = true,
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            other => anyhow::bail!("unknown argument {other}"),
        }
        index += 1;
    }
    Ok(out)
}

fn value_for<'a>(args: &'a [String], index: &mut usize) -> anyhow::Result<&'a str> {
    let flag = &args[*index];
    *index += 1;
    let Some(value) = args.get(*index) else {
        anyhow::bail!("{flag} requires a value");
    };
    let value = value.trim();
    if value.is_empty() {
        anyhow::bail!("{flag} cannot be empty");
    }
    Ok(value)
}

fn print_help() {
    let defaults = SessionConfig::default();
    println!("lull");
    println!("  --catalog PATH    Catalog JSON file or a folder of category folders");
    println!("  --category NAME   Category to play (default: first in catalog)");
    println!("  --index N         Start at track N of the category");
    println!("  --sleep MIN       Stop playback after MIN minutes");
    println!(
        "  --volume V        Volume 0.0..1.0 (default {})",
        defaults.default_volume
    );
    println!("  --shuffle         Shuffle the queue");
    println!("  --repeat MODE     none, one or all");
    println!("  --recommend N     Print N recommendations and exit");
    println!("  --null-audio      Run without an audio device");
}
