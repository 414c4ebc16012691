mod app;
mod cli;

use std::process;

fn main() {
    let cli = cli::parse();

    let config = match app::load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(1);
        }
    };

    if let Err(e) = xuebox::logging::init(
        config.logging.level.as_deref(),
        cli.verbose,
        config.logging.file.as_deref(),
    ) {
        eprintln!("Warning: {:#}", e);
    }

    if let Err(e) = app::run(cli, config) {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}
