// Media-extraction backends

pub mod ytdlp;

pub use ytdlp::YtDlpService;
