use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "longshore",
    about = "Media acquisition pipeline - resolve, store, and remux media assets",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Extractor settings profile to use
    #[arg(long, global = true, default_value = "default", value_name = "NAME")]
    pub extractor: String,

    /// Bucket settings profile to use
    #[arg(long, global = true, default_value = "default", value_name = "NAME")]
    pub bucket: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Resolve a source URL and store the video asset
    Download {
        /// Source media URL
        #[arg(value_name = "URL")]
        source_url: String,

        /// Task identifier namespacing the stored object (random if omitted)
        #[arg(long, value_name = "ID")]
        task_id: Option<String>,

        /// Object key for the stored asset
        #[arg(long, value_name = "NAME")]
        object_name: Option<String>,
    },

    /// Extract the audio track from a stored video object
    ExtractAudio {
        /// Storage key of the source video object
        #[arg(value_name = "KEY")]
        source_object_path: String,

        /// Task identifier namespacing the output artifact
        #[arg(long, value_name = "ID")]
        task_id: String,

        /// Override for the audio filename
        #[arg(long, value_name = "NAME")]
        object_name: Option<String>,
    },

    /// Run the download and audio-extraction stages as one pipeline
    Run {
        /// Source media URL
        #[arg(value_name = "URL")]
        source_url: String,

        /// Task identifier namespacing both artifacts (random if omitted)
        #[arg(long, value_name = "ID")]
        task_id: Option<String>,

        /// Object key for the stored video
        #[arg(long, value_name = "NAME")]
        object_name: Option<String>,

        /// Override for the audio filename
        #[arg(long, value_name = "NAME")]
        audio_name: Option<String>,

        /// Attempts per stage unit before giving up
        #[arg(long, default_value = "1", value_name = "COUNT")]
        max_attempts: u32,
    },

    /// Show the active configuration
    Config,
}
