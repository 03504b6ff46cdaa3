mod app;
mod cli;
mod logging;
mod progress;

use clap::{CommandFactory, Parser};

#[tokio::main]
async fn main() {
    let args = cli::Cli::parse();

    if let Err(e) = logging::init(&args) {
        eprintln!("codeagent: logging setup failed: {e}");
    }

    let wants_help = args.task.is_none()
        && !args.parallel
        && !args.cleanup
        && args.command.is_none();
    if wants_help {
        let _ = cli::Cli::command().print_help();
        eprintln!();
        std::process::exit(codeagent_core::error::exit::CONFIG_ERROR);
    }

    let code = match app::run(args).await {
        Ok(code) => code,
        Err(e) => {
            app::report_error(&e);
            app::exit_code_for(&e)
        }
    };
    std::process::exit(code);
}
