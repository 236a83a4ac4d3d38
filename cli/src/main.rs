use anyhow::{bail, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use itertools::Itertools;
use log::LevelFilter;
use serde::Serialize;
use simplelog::{ColorChoice, ConfigBuilder, TermLogger, TerminalMode};
use wmr::{
    aggregate::GroupKey, filter::PlayFilter, page::paginate, CleaningRules, Granularity,
    PlayLog, Source,
};

const DEFAULT_TREND_ARTISTS: usize = 3;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// CSV file path or http(s) URL
    source: String,

    #[arg(long, value_name = "YYYY-MM-DD")]
    from: Option<NaiveDate>,

    #[arg(long, value_name = "YYYY-MM-DD")]
    to: Option<NaiveDate>,

    /// Repeat to select several artists
    #[arg(short = 'a', long = "artist")]
    artists: Vec<String>,

    #[arg(short = 's', long)]
    song: Option<String>,

    /// Extra artist marker to drop while loading
    #[arg(long)]
    exclude_artist: Vec<String>,

    /// Extra song marker to drop while loading
    #[arg(long)]
    exclude_song: Vec<String>,

    #[arg(long)]
    json: bool,

    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    report: Report,
}

#[derive(Subcommand, Debug)]
enum Report {
    /// Date span, row counts and selection lists
    Summary,
    /// Most played groups
    Top {
        /// Comma separated: artist, song, artwork
        #[arg(long, default_value = "artist")]
        by: String,
        #[arg(short, default_value_t = 10)]
        n: usize,
    },
    /// Plays per day, week or month
    Trend {
        #[arg(long, default_value = "daily")]
        granularity: String,
        /// Break the trend down by the selected artists, or the top 3
        #[arg(long)]
        per_artist: bool,
    },
    Hours,
    Weekdays,
    /// First/last play and the scatter points
    Timeline,
    /// Most recent plays, paginated
    Recent {
        #[arg(long, default_value_t = 10)]
        page_size: usize,
        #[arg(long, default_value_t = 1)]
        page: usize,
    },
    /// Write the filtered rows as CSV to stdout
    Export,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Set the default level based on verbosity
    let default_level = match args.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    let config = ConfigBuilder::new().add_filter_allow_str("wmr").build();

    TermLogger::init(
        default_level,
        config,
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )?;

    log::trace!("Args {:#?}", args);

    let rules = args
        .exclude_artist
        .iter()
        .fold(CleaningRules::default(), |rules, m| rules.exclude_artist(m));
    let rules = args
        .exclude_song
        .iter()
        .fold(rules, |rules, m| rules.exclude_song(m));

    let source: Source = args.source.parse()?;
    let (log, report) = PlayLog::load_with(&source, &rules)?;
    log::info!(
        "Loaded {} plays ({} excluded, {} unparseable)",
        report.retained,
        report.excluded,
        report.unparseable_timestamps
    );

    let log = log.filter(build_filter(&args).build())?;
    if log.is_empty() {
        log::warn!("No plays match the current filters");
    }

    match &args.report {
        Report::Summary => {
            let (min, max) = match log.date_range()? {
                Some((min, max)) => (Some(min), Some(max)),
                None => (None, None),
            };
            let summary = Summary {
                plays: log.len(),
                first_date: min,
                last_date: max,
                artists: log.artists()?,
                songs: log.songs_for_artist(args.artists.first().map(String::as_str))?,
            };
            if args.json {
                emit_json(&summary)?;
            } else {
                match (min, max) {
                    (Some(min), Some(max)) => println!("Data spans from {} to {}", min, max),
                    _ => println!("No data"),
                }
                println!(
                    "{} plays, {} artists, {} songs",
                    summary.plays,
                    summary.artists.len(),
                    summary.songs.len()
                );
                println!("{}", log.head(Some(10)));
            }
        }
        Report::Top { by, n } => {
            let keys: Vec<GroupKey> = by
                .split(',')
                .map(|k| k.trim().parse::<GroupKey>())
                .collect::<Result<_, _>>()
                .map_err(|_| anyhow::anyhow!("Unsupported group key. Use: artist, song, artwork"))?;
            let top = log.top_n(&keys, *n)?;
            if args.json {
                emit_json(&top)?;
            } else {
                for count in top {
                    let label = count
                        .keys
                        .iter()
                        .map(|k| k.as_deref().unwrap_or("-"))
                        .join(" - ");
                    println!("{:>6}  {}", count.plays, label);
                }
            }
        }
        Report::Trend {
            granularity,
            per_artist,
        } => {
            let granularity: Granularity = match granularity.parse() {
                Ok(g) => g,
                Err(_) => bail!("Unsupported granularity. Use: daily, weekly, or monthly"),
            };
            if *per_artist {
                let artists = if args.artists.is_empty() {
                    let top = log.top_artists(DEFAULT_TREND_ARTISTS)?;
                    log::info!("No artists selected, comparing the top {}", top.len());
                    top
                } else {
                    args.artists.clone()
                };
                let trends = log.artist_trends(artists.as_slice(), granularity)?;
                if args.json {
                    emit_json(&trends)?;
                } else {
                    for trend in trends {
                        println!("{}", trend.artist);
                        for bucket in trend.buckets {
                            println!("  {}  {:>6}", bucket.start, bucket.plays);
                        }
                    }
                }
            } else {
                let buckets = log.time_buckets(granularity)?;
                if args.json {
                    emit_json(&buckets)?;
                } else {
                    for bucket in buckets {
                        println!("{}  {:>6}", bucket.start, bucket.plays);
                    }
                }
            }
        }
        Report::Hours => {
            let hours = log.hour_of_day()?;
            if args.json {
                emit_json(&hours)?;
            } else {
                for (hour, plays) in hours {
                    println!("{:02}:00  {:>6}", hour, plays);
                }
            }
        }
        Report::Weekdays => {
            let days = log.day_of_week()?;
            if args.json {
                emit_json(&days)?;
            } else {
                for (day, plays) in days {
                    println!("{:<4} {:>6}", day, plays);
                }
            }
        }
        Report::Timeline => {
            let summary = log.timeline_summary()?;
            if args.json {
                emit_json(&(summary, log.timeline_points()?))?;
            } else {
                let fmt = |t: Option<chrono::NaiveDateTime>| {
                    t.map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                        .unwrap_or_else(|| "N/A".to_string())
                };
                println!("Total plays:  {}", summary.total_plays);
                println!("First played: {}", fmt(summary.first_played));
                println!("Last played:  {}", fmt(summary.last_played));
            }
        }
        Report::Recent { page_size, page } => {
            let recent = log.recent_plays(log.len())?;
            let page = paginate(&recent, *page_size, *page);
            if args.json {
                emit_json(&page)?;
            } else {
                println!("{} (page {} of {})", page.describe(), page.page, page.total_pages);
                for play in &page.items {
                    println!(
                        "{}  {} - {}  [{}]",
                        play.timestamp.format("%Y-%m-%d %H:%M:%S"),
                        play.artist,
                        play.song,
                        play.pick_id.as_deref().unwrap_or("-")
                    );
                }
            }
        }
        Report::Export => {
            log.write_csv(std::io::stdout().lock())?;
        }
    }

    Ok(())
}

fn build_filter(args: &Args) -> PlayFilter {
    let mut filter = PlayFilter::new();
    if let Some(from) = args.from {
        filter = filter.since(from);
    }
    if let Some(to) = args.to {
        filter = filter.until(to);
    }
    match args.artists.as_slice() {
        [] => {}
        [artist] => filter = filter.artist(artist),
        several => filter = filter.any_artist(several),
    }
    if let Some(song) = &args.song {
        filter = filter.song(song);
    }
    filter
}

#[derive(Serialize)]
struct Summary {
    plays: usize,
    first_date: Option<NaiveDate>,
    last_date: Option<NaiveDate>,
    artists: Vec<String>,
    songs: Vec<String>,
}

fn emit_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
