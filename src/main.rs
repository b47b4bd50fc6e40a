use tcpsync::cli::Command;
use tcpsync::handlers::{handle_connect, handle_parse_args, handle_serve, handle_settings};
use tcpsync::utils::Log;

#[tokio::main]
async fn main() {
    Log::banner();

    // Parse the arguments
    let args = handle_parse_args();
    let settings = handle_settings(&args);

    Log::info(
        format!(
            "Starting {} mode for: {}",
            args.command,
            args.abs_workspace_path.display()
        ),
        None,
    );

    match args.command {
        Command::Serve => handle_serve(settings).await,
        Command::Connect => handle_connect(settings, args.quit_server).await,
    }
}
