//! TrackStore CLI
//!
//! Command-line interface for a local track dataset.

use std::path::PathBuf;
use std::process;

use clap::{Args as ClapArgs, Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};
use trackstore::{Config, Dataset, IndexKind, StoreError, Track};

/// TrackStore CLI
#[derive(Parser, Debug)]
#[command(name = "trackstore")]
#[command(about = "Embedded track metadata store with B-tree and hash indexes")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./trackstore_data")]
    data_dir: PathBuf,

    /// Index structure (btree or hash); fixed when the dataset is created
    #[arg(short, long, default_value = "btree")]
    index: IndexKind,

    /// B-tree half-order for a new index
    #[arg(long, default_value = "8")]
    order: usize,

    /// Hash bucket capacity for a new index
    #[arg(long, default_value = "32")]
    capacity: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Add a track and print its id
    Add(TrackFields),

    /// Print a track by id
    Get {
        /// The id to read
        id: i32,
    },

    /// Replace a track
    Update {
        /// The id to replace
        id: i32,

        #[command(flatten)]
        fields: TrackFields,
    },

    /// Delete a track
    Delete {
        /// The id to delete
        id: i32,
    },

    /// Print every live track
    List,

    /// Print tracks whose name, album, artists or genres contain the text
    Search {
        /// Text to look for (case-insensitive)
        text: String,
    },

    /// Rebuild the index from the record file
    Reindex,

    /// Print the path of every dataset file
    Files,

    /// Delete every dataset file
    Destroy,
}

#[derive(ClapArgs, Debug)]
struct TrackFields {
    /// 22-character track identifier
    #[arg(long)]
    track_id: String,

    #[arg(long)]
    name: String,

    #[arg(long, default_value = "")]
    album: String,

    /// Artist (repeatable)
    #[arg(long = "artist")]
    artists: Vec<String>,

    /// Genre (repeatable)
    #[arg(long = "genre")]
    genres: Vec<String>,

    #[arg(long, default_value = "0")]
    popularity: i32,

    #[arg(long, default_value = "0")]
    duration_ms: i32,

    #[arg(long)]
    explicit: bool,

    #[arg(long, default_value = "0")]
    danceability: f32,

    #[arg(long, default_value = "0")]
    energy: f32,

    #[arg(long, default_value = "0")]
    tempo: f32,
}

impl From<TrackFields> for Track {
    fn from(fields: TrackFields) -> Self {
        Track {
            id: 0,
            track_id: fields.track_id,
            name: fields.name,
            album: fields.album,
            artists: fields.artists,
            genres: fields.genres,
            popularity: fields.popularity,
            duration_ms: fields.duration_ms,
            explicit: fields.explicit,
            danceability: fields.danceability,
            energy: fields.energy,
            tempo: fields.tempo,
        }
    }
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,trackstore=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = Config::builder()
        .data_dir(&args.data_dir)
        .index_kind(args.index)
        .btree_half_order(args.order)
        .bucket_capacity(args.capacity)
        .build();

    if let Err(e) = run(config, args.command) {
        tracing::error!("{}", e);
        process::exit(match e {
            StoreError::NotFound { .. } | StoreError::Conflict { .. } => 2,
            _ => 1,
        });
    }
}

fn run(config: Config, command: Commands) -> trackstore::Result<()> {
    let mut dataset = Dataset::open(config)?;

    match command {
        Commands::Add(fields) => {
            let id = dataset.create(&fields.into())?;
            println!("{}", id);
        }
        Commands::Get { id } => print_track(&dataset.read(id)?),
        Commands::Update { id, fields } => dataset.update(id, &fields.into())?,
        Commands::Delete { id } => dataset.delete(id)?,
        Commands::List => {
            for track in dataset.iter()? {
                print_track(&track?);
            }
        }
        Commands::Search { text } => {
            for track in dataset.search_text(&text)? {
                print_track(&track);
            }
        }
        Commands::Reindex => {
            let count = dataset.reindex()?;
            println!("indexed {} records", count);
        }
        Commands::Files => {
            for path in dataset.files() {
                println!("{}", path.display());
            }
        }
        Commands::Destroy => return dataset.destruct(),
    }

    dataset.close()
}

fn print_track(track: &Track) {
    println!(
        "{:>6}  {}  {} / {} [{}] ({}) pop={} {}ms{}",
        track.id,
        track.track_id,
        track.name,
        track.album,
        track.artists.join(", "),
        track.genres.join(", "),
        track.popularity,
        track.duration_ms,
        if track.explicit { " explicit" } else { "" }
    );
}
