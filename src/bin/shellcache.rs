use std::env;

fn print_usage() {
    eprintln!("Usage: shellcache <COMMAND> [OPTIONS]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  start               Install the current build and activate it");
    eprintln!("  activate            Reconcile staged resources into the content store");
    eprintln!("  fetch <url>...      Fetch URLs or resource paths through the worker");
    eprintln!("  offline             Cache every resource not cached yet");
    eprintln!("  status              Show store and version state");
    eprintln!("  wipe                Delete all stores");
    eprintln!("  serve               Serve the app over HTTP through the worker");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -c, --config <FILE>     Config file (default: <config dir>/shellcache/config.toml)");
    eprintln!("  -m, --manifest <FILE>   Asset manifest (.json or .toml)");
    eprintln!("  -o, --origin <URL>      Origin the app is served from");
    eprintln!("  -s, --store-dir <DIR>   Directory holding the stores");
    eprintln!("      --host <HOST>       Server bind address (default: 127.0.0.1)");
    eprintln!("  -p, --port <PORT>       Server port (default: 8080)");
    eprintln!("  -h, --help              Show this help");
    eprintln!();
    eprintln!("Set RUST_LOG to change log verbosity (default: info).");
}

#[tokio::main]
async fn main() -> shellcache::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().skip(1).collect();
    if args.is_empty() || args.iter().any(|a| a == "-h" || a == "--help") {
        print_usage();
        std::process::exit(0);
    }

    let cli = match shellcache::cli::parse_args(&args) {
        Ok(cli) => cli,
        Err(msg) => {
            eprintln!("Error: {msg}");
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    };

    shellcache::cli::run(cli).await
}
