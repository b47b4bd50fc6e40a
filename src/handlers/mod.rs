use colored::Colorize;

use crate::{
    cli::{Args, ParseArgsError, parse_args},
    models::SyncSettings,
    storage::{default_settings_path, write_settings},
    sync::{SyncClient, SyncServer},
    utils::{Log, unwrap_or_exit},
};

pub fn handle_parse_args() -> Args {
    match parse_args() {
        Ok(args) => args,
        Err(e) => {
            match e {
                ParseArgsError::InvalidArguments => {
                    Log::error("Invalid arguments", None);
                    Log::usage();
                }
                ParseArgsError::InvalidCommand(command) => {
                    Log::error(&format!("Invalid command: {}", command), None);
                    Log::usage();
                }
                ParseArgsError::InvalidPath(path) => {
                    Log::error(&format!("Invalid path: {}", path), None);
                }
                ParseArgsError::InvalidPortNumber(port) => {
                    Log::error(&format!("Invalid port number: '{}'", port), None);
                }
                ParseArgsError::InvalidOption(option) => {
                    Log::error(&format!("Invalid option: {}", option), None);
                    Log::usage();
                }
                ParseArgsError::MissingValue(flag) => {
                    Log::error(&format!("Missing value for {}", flag), None);
                }
            };
            std::process::exit(1);
        }
    }
}

/// Resolve the effective settings, saving them first when asked to
pub fn handle_settings(args: &Args) -> SyncSettings {
    let settings = unwrap_or_exit(args.settings());
    unwrap_or_exit(settings.validate());

    if args.save_config {
        let path = match &args.config {
            Some(path) => path.clone(),
            None => unwrap_or_exit(default_settings_path()),
        };
        unwrap_or_exit(write_settings(&path, &settings));
        Log::info(format!("Saved settings to {}", path.display()), None);
    }

    settings
}

pub async fn handle_serve(settings: SyncSettings) {
    Log::wrench("Indexing sync directory:".bright_yellow(), None);
    let server = unwrap_or_exit(SyncServer::start(settings).await);
    let listener = unwrap_or_exit(server.bind().await);
    unwrap_or_exit(server.run(listener).await);
    Log::info("Server stopped", None);
}

pub async fn handle_connect(settings: SyncSettings, quit_server: bool) {
    Log::wrench(
        format!("Connecting to {}:{}", settings.ip, settings.port).bright_yellow(),
        None,
    );
    let mut client = unwrap_or_exit(SyncClient::connect(settings).await);

    let result = client.sync_pass().await;
    if quit_server {
        if let Err(e) = client.quit_server().await {
            Log::warning(format!("Failed to stop the server: {}", e), None);
        }
    }
    client.disconnect().await;

    unwrap_or_exit(result);
}
