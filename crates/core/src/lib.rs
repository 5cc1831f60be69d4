pub mod config;
pub mod error;
pub mod format;
pub mod keys;
pub mod layout;
pub mod media;
pub mod notes;
pub mod pipeline;
pub mod tts;
pub mod types;
pub mod video;
pub mod wav;

pub use config::{GlobalConfig, config_path, load_config, mask_key, save_config};
pub use error::{Result, SlidecastError};
pub use format::{format_batch_report, format_duration, format_track_report};
pub use keys::{KeyPool, MAX_API_KEYS, normalize_keys};
pub use layout::{get_deck_path, get_language_dir};
pub use media::{ClipRequest, Ffmpeg, MediaTool};
pub use notes::{SplitStrategy, extract_notes};
pub use pipeline::{
    TrackSpec, build_video, generate_narration, read_deck, run_track, run_tracks,
    synthesize_notes,
};
pub use tts::{Backend, LocalBackend, RemoteBackend, RemoteConfig, SpeechAudio, Synthesizer};
pub use types::{
    BatchReport, ConcatOutcome, Language, SlideNote, SlideOutcome, SlideStatus, TrackReport,
};
pub use video::{assemble_clips, concatenate};
pub use wav::{PcmFormat, write_wav};
