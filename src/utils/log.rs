use chrono::Local;
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::fmt::Display;

/// CLI output utilities with consistent styling
pub struct Log;

// Presets
impl Log {
    pub fn banner() {
        let ascii_art = r#"
  __
_/  |_  ____ ______  _________.__. ____   ____
\   __\/ ___\\____ \/  ___<   |  |/    \_/ ___\
 |  | \  \___|  |_> >___ \ \___  |   |  \  \___
 |__|  \___  >   __/____  >/ ____|___|  /\___  >
           \/|__|       \/ \/         \/     \/
"#;
        println!("{}", ascii_art.bright_yellow().bold());
    }

    pub fn usage() {
        println!();
        println!("{}", "Usage:".bright_white().bold());
        println!(
            "  {} {} {} {}",
            "tcpsync".bright_cyan(),
            "serve".bright_yellow(),
            "<path>".bright_magenta(),
            "[options]".dimmed()
        );
        println!(
            "  {} {} {} {} {}",
            "tcpsync".bright_cyan(),
            "connect".bright_yellow(),
            "<path>".bright_magenta(),
            "<ip>".bright_magenta(),
            "[options]".dimmed()
        );
        println!();
        println!("{}", "Commands:".bright_white().bold());
        println!(
            "  {}    {}",
            "serve".bright_green().bold(),
            "Serve the specified directory as the authoritative side".dimmed()
        );
        println!(
            "  {}  {}",
            "connect".bright_green().bold(),
            "Run one sync pass of the directory against a server".dimmed()
        );
        println!();
        println!("{}", "Options:".bright_white().bold());
        let options = [
            ("-p, --port <port>", "Port number (default: 8080)"),
            ("--bind <auto|ip>", "Server bind address (default: auto)"),
            ("--timeout <ms>", "Request timeout in milliseconds (default: 5000)"),
            ("--download", "Pull files that differ or only exist on the server"),
            ("--upload", "Push files that differ or only exist locally"),
            ("--delete-client", "Delete local files missing on the server"),
            ("--delete-server", "Delete server files missing locally"),
            ("--quit-server", "Stop the server after the pass"),
            ("--config <file>", "Read settings from a JSON file"),
            ("--save-config", "Write the effective settings back to the file"),
        ];
        for (flag, description) in options {
            println!("  {:<22}{}", flag.bright_yellow(), description.dimmed());
        }
        println!();
    }
}

// Utilities
impl Log {
    pub fn log(message: impl Display, indent: Option<usize>) {
        let time = Local::now().format("%H:%M:%S%.3f").to_string();

        println!(
            "{}[{}]: {}",
            " ".repeat(indent.unwrap_or(0)),
            time.bright_black().bold(),
            message
        );
    }

    pub fn info(message: impl Display, indent: Option<usize>) {
        println!("{}ℹ️  {}", " ".repeat(indent.unwrap_or(0)), message);
    }
    pub fn wrench(message: impl Display, indent: Option<usize>) {
        println!("{}🔧 {}", " ".repeat(indent.unwrap_or(0)), message);
    }

    pub fn error(message: impl Display, indent: Option<usize>) {
        eprintln!("{}❌ {}", " ".repeat(indent.unwrap_or(0)), message);
    }
    pub fn warning(message: impl Display, indent: Option<usize>) {
        println!("{}⚠️ {}", " ".repeat(indent.unwrap_or(0)), message);
    }
    pub fn success(message: impl Display, indent: Option<usize>) {
        println!("{}✅ {}", " ".repeat(indent.unwrap_or(0)), message);
    }

    /// Progress bar for a batch of file transfers
    pub fn transfers(total: u64) -> ProgressBar {
        let bar = ProgressBar::new(total);
        if let Ok(style) =
            ProgressStyle::with_template("     {spinner:.green} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
        {
            bar.set_style(style.progress_chars("=> "));
        }
        bar
    }
}
