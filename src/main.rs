// bundle-serve - development server entry point

mod cli;

use cli::CliHandler;
use colored::Colorize;

#[tokio::main]
async fn main() {
    let handler = CliHandler::new();

    if let Err(e) = handler.run().await {
        eprintln!("{} {}", "❌ Error:".red().bold(), format!("{:#}", e).red());
        std::process::exit(1);
    }
}
