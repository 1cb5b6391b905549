fn main() -> std::process::ExitCode {
    playlist_downloader_lib::run()
}
