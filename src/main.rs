#![allow(clippy::multiple_crate_versions)]

use clap::{Arg, ArgAction, Command};

mod commands;
mod logging;
mod server;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn cli() -> Command {
    Command::new("execgate")
        .version(VERSION)
        .about("execgate - admission-control gateway for sandboxed execution")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("serve")
                .about("Start the HTTP gateway")
                .arg(
                    Arg::new("config")
                        .short('c')
                        .long("config")
                        .value_name("FILE")
                        .help("TOML configuration file (EXECGATE_* variables still apply)"),
                )
                .arg(
                    Arg::new("port")
                        .short('p')
                        .long("port")
                        .value_name("PORT")
                        .value_parser(clap::value_parser!(u16))
                        .help("Port to bind the server to"),
                )
                .arg(
                    Arg::new("host")
                        .long("host")
                        .value_name("HOST")
                        .help("Host address to bind to"),
                )
                .arg(
                    Arg::new("audit-log")
                        .long("audit-log")
                        .value_name("FILE")
                        .help("Append audit entries to this JSON-lines file instead of the log"),
                ),
        )
        .subcommand(
            Command::new("validate")
                .about("Run the admission pipeline on a request file without executing it")
                .arg(
                    Arg::new("file")
                        .short('f')
                        .long("file")
                        .value_name("FILE")
                        .required(true)
                        .help("JSON execution request"),
                )
                .arg(
                    Arg::new("config")
                        .short('c')
                        .long("config")
                        .value_name("FILE")
                        .help("TOML configuration file"),
                ),
        )
        .subcommand(
            Command::new("codes")
                .about("List the rejection taxonomy")
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Print as JSON"),
                ),
        )
}

#[tokio::main]
async fn main() {
    let matches = cli().get_matches();

    let result = match matches.subcommand() {
        Some(("serve", sub_matches)) => commands::serve::run(sub_matches).await,
        Some(("validate", sub_matches)) => commands::validate::run(sub_matches).await,
        Some(("codes", sub_matches)) => commands::codes::run(sub_matches),
        _ => unreachable!("subcommand_required is set"),
    };

    if let Err(e) = result {
        eprintln!("✗ {:#}", e);
        std::process::exit(1);
    }
}
